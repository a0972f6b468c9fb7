//! # a11y-assist
//!
//! A retrieval-grounded assistant for revising HTML toward web accessibility
//! compliance. A fixed guideline document is chunked, embedded, and persisted
//! as a local index; each revision request retrieves the most relevant
//! guideline passages and feeds them, with the user's code, into two
//! chat-completion calls (revise, then explain).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │ guide.txt │──▶│ Chunk+Embed  │──▶│   SQLite    │
//! │ (source)  │   │ (build once) │   │ index+meta │
//! └───────────┘   └──────────────┘   └─────┬──────┘
//!                                          │ top-k
//!                 ┌────────────┐   ┌───────▼──────┐
//!                 │ chat model │◀──│  Assistant   │──▶ revised code
//!                 │ (2 calls)  │──▶│ orchestrator │    + explanation
//!                 └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! a11y index                           # build (or reuse) the index
//! a11y search "alt text"               # inspect retrieval
//! a11y revise --instruction "add alt text" --code '<img src="a.png">'
//! a11y serve                           # web UI + JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`chunk`] | Boundary-preferring text splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Persisted retrieval index lifecycle |
//! | [`generation`] | Chat-completion client |
//! | [`prompts`] | Prompt assembly |
//! | [`assist`] | Interaction orchestrator |
//! | [`server`] | HTTP server and web UI |

pub mod assist;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompts;
pub mod server;
pub mod store;
