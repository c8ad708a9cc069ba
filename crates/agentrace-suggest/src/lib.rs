//! Suggestion state machine.
//!
//! ```text
//! proposed ──> implemented ──> converged
//!    │  ▲            └───────> ineffective
//!    │  └── deferred
//!    ├───> deferred
//!    └───> rejected
//! ```
//!
//! Re-proposal after `ineffective` (or `converged` followed by a relapse)
//! creates a new suggestion carrying the same `signal_id`.

pub mod machine;
pub mod migrate;
pub mod model;
pub mod store;

pub use machine::SuggestionMachine;
pub use model::{CURRENT_VERSION, ImplementedRecord, StateDocument, Suggestion, SuggestionStatus};
pub use store::StateStore;
