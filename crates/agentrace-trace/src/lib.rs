//! Trace lifecycle management.
//!
//! One directory per agent invocation under the store root:
//!
//! ```text
//! <store_root>/
//!   index.jsonl
//!   .markers/                 (default marker directory)
//!   oldTraces/                (archive subtree, never scanned)
//!   <trace_id>/
//!     manifest.json
//!     summary.*
//!     compliance.json         (written by an external checker)
//!     artifacts/
//! ```

pub mod id;
pub mod index;
pub mod layout;
pub mod marker;
pub mod resolve;
pub mod store;
pub mod vcs;

pub use layout::TraceLayout;
pub use marker::{FsMarkerStore, Marker, MarkerKey, MarkerStore, MemoryMarkerStore, project_hash};
pub use store::{FinalizeResult, TraceStore};
pub use vcs::{GitVcs, NoVcs, StaticVcs, Vcs};
