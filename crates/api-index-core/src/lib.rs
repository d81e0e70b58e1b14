//! # API Index Core
//!
//! Shared logic for API Index: endpoint models, format detection,
//! collection parsing, normalization, metadata filters, the vector index
//! abstraction, and the index manager that ties them together.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Storage backends and embedding providers are supplied by
//! the application through the [`index::VectorIndex`] and
//! [`embedding::Embedder`] traits.
//!
//! ## Pipeline
//!
//! ```text
//! document ─▶ detect ─▶ parse ─▶ normalize ─▶ batches of 50 ─▶ VectorIndex
//!                                                                   │
//! query + filter ─▶ IndexManager::search_endpoints ◀────────────────┘
//! ```

pub mod detect;
pub mod embedding;
pub mod filter;
pub mod index;
pub mod manager;
pub mod models;
pub mod normalize;
pub mod parse;

pub use detect::{detect_format, ApiFormat};
pub use manager::{DeleteOutcome, IndexManager, IndexOutcome, SearchError, SkipReason};
pub use models::{Endpoint, IndexedDocument, SearchHit};
