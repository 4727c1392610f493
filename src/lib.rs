// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # Quarry
//!
//! A client library for pulling and pushing time-series data against an
//! analytics server's REST API, with Arrow RecordBatch output.
//!
//! ## Features
//!
//! - **Pull**: Signals, conditions and scalars over a time range, reshaped
//!   into a samples or capsules table
//! - **Push**: Create/update items by datasource identity and write samples
//!   and capsules in pages, append or overwrite
//! - **Pagination**: Continuation-token and offset protocols, with page-seam
//!   dedupe and integrity checks
//! - **Concurrency**: Row-level fan-out with a shared rate limit, interrupt
//!   flag and per-row status ledger
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry::{
//!     pull, ErrorHandling, HttpClientConfig, ItemRef, PullOptions, Result,
//!     Session, Status,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = HttpClientConfig::builder()
//!         .base_url("https://analytics.example.com/api")
//!         .auth_token("...")
//!         .build();
//!     let session = Session::new(config);
//!
//!     let items = vec![ItemRef::new("ABC-123", "StoredSignal")];
//!     let options = PullOptions {
//!         start: start_ns,
//!         end: end_ns,
//!         ..PullOptions::default()
//!     };
//!     let status = Status::new(ErrorHandling::Raise);
//!
//!     let result = pull(&session, &items, &options, &status).await?;
//!     // result.table is an Arrow RecordBatch
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the library
pub mod error;

/// Common types: item references, return types, policy enums
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Typed REST API client and wire types
pub mod api;

/// Session: one authenticated connection plus tuning options
pub mod session;

/// Per-row status ledger, interrupt flag and job scheduler
pub mod status;

/// Cell values, series and Arrow table assembly
pub mod table;

/// Pull engine
pub mod pull;

/// Push engine
pub mod push;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use http::HttpClientConfig;
pub use pull::{pull, pull_with_callback, Calculation, Grid, PullOptions, PullResult, RowResult};
pub use push::{push, PushItem, PushRequest, PushResult, PushRow, ReplaceInterval};
pub use session::{PaginationProtocol, Session, SessionOptions};
pub use status::Status;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
