//! # site-context
//!
//! Retrieval-augmented chat for a personal website.
//!
//! site-context splits the site's pages and notes into addressable chunks,
//! embeds them into a versioned JSON index, and answers visitor questions by
//! ranking chunks against the question, assembling a bounded context with
//! citations, and passing it to a generative model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Site tree  │──▶│   Builder    │──▶│ vectors.json   │
//! │ .html / .md │   │ Chunk+Embed  │   │ (versioned)    │
//! └─────────────┘   └──────────────┘   └───────┬────────┘
//!                                              │
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!                 ┌──────────┐          ┌─────────────┐
//!                 │   CLI    │          │ /api/chat   │
//!                 │(site-ctx)│          │   (HTTP)    │
//!                 └──────────┘          └─────────────┘
//! ```
//!
//! Pure logic (chunking, index schema, ranking, context assembly) lives in
//! the `site-context-core` crate; this crate adds the filesystem, the
//! embedding and generation providers, and the CLI and HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`documents`] | Document discovery |
//! | [`builder`] | Index build pipeline |
//! | [`store`] | Index file persistence |
//! | [`client`] | Shared HTTP client with retries |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`service`] | Query service |
//! | [`search`] | `search` and `ask` commands |
//! | [`server`] | Chat HTTP server |
//! | [`stats`] | Index statistics |
//! | [`progress`] | Build progress reporting |

pub mod builder;
pub mod client;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod generation;
pub mod progress;
pub mod search;
pub mod server;
pub mod service;
pub mod stats;
pub mod store;
