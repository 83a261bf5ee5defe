// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of sequence numbering, concurrency tokens and projection
//! folding that must hold for any sequence of writes.

mod projection_folding;
mod sequence_numbers;
