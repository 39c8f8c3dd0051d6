//! Opt-in activity log: every tracing event of a run as one JSON line.
//!
//! ```text
//! <log-dir>/
//! ├── 2026-10-17_sub-1a2b3c4d.jsonl
//! └── 2026-10-17_sync-5e6f7a8b.jsonl
//! ```
//!
//! ```ignore
//! use subvault_core::logging::JsonlLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let layer = JsonlLayer::new("./logs", "sub")?;
//! tracing_subscriber::registry()
//!     .with(layer)
//!     .with(tracing_subscriber::fmt::layer())
//!     .init();
//! ```
//!
//! Query with jq:
//!
//! ```bash
//! jq 'select(.level == "warn")' logs/*.jsonl
//! jq 'select(.fields.domain == "example.com")' logs/*.jsonl
//! ```

pub mod entry;
pub mod layer;

pub use entry::{read_entries, ActivityEntry};
pub use layer::JsonlLayer;
