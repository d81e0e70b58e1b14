//! # API Index
//!
//! Semantic search over the endpoints of uploaded API collections.
//!
//! Uploaded Postman collections and OpenAPI/Swagger documents are parsed
//! into normalized endpoints, embedded, and stored in one vector collection
//! per project. Endpoints can then be found by natural-language query,
//! narrowed by metadata filters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Upload file │──▶│ detect / parse / │──▶│   SQLite     │
//! │ JSON / YAML │   │ normalize, embed │   │ vector index │
//! └─────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                 │
//!                                                 ▼
//!                                          ┌──────────────┐
//!                                          │ apidx search │
//!                                          └──────────────┘
//! ```
//!
//! The parsing pipeline, filters, and [`IndexManager`](api_index_core::IndexManager)
//! live in `api-index-core`; this crate supplies configuration, storage,
//! embedding providers, the process-wide client, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! apidx init
//! apidx index shop petstore-v1 ./petstore.yaml
//! apidx search shop "create a new pet" --where has_body=true
//! apidx delete shop petstore-v1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding providers |
//! | [`runtime`] | Process-wide client |
//! | [`ingest`] | Document loading, `detect`/`index`/`delete` |
//! | [`search`] | `search` and `list` |
//! | [`stats`] | Index statistics |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod runtime;
pub mod search;
pub mod sqlite_index;
pub mod stats;
