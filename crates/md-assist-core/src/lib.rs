//! # md-assist core
//!
//! Pure chunking logic for md-assist: the chunk model, paragraph splitting,
//! and the greedy word-bounded chunk packer.
//!
//! This crate performs no filesystem or network I/O. Reading source
//! documents and writing chunk files is left to the `md-assist` app crate.

pub mod chunk;
pub mod models;
