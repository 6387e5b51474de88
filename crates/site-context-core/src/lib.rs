//! # site-context core
//!
//! Pure logic for site-context: the chunk model, the markup-aware chunker,
//! the versioned index schema, cosine ranking, selection policy and context
//! assembly, plus the embedding and generation traits.
//!
//! This crate performs no filesystem or network I/O. The application crate
//! walks the document tree, talks to the embedding and generation services
//! and persists the index.

pub mod chunk;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod models;
pub mod retrieve;
