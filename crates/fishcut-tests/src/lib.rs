//! Integration test crate for fishcut.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the fishcut crates to verify they work together.

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod media;
