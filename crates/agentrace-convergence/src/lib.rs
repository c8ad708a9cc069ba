//! Reads the metrics history and the suggestion document to decide whether
//! implemented fixes are working.
//!
//! - [`trend`] classifies the recent direction of a signal.
//! - [`regression`] splits history at `implemented_at` and judges the post
//!   cohort against the value recorded when the fix was suggested.
//! - [`ConvergenceEngine`] applies both and writes resulting transitions back
//!   to the suggestion document.

pub mod engine;
pub mod regression;
pub mod trend;

pub use engine::{ConvergenceEngine, ConvergenceReport};
pub use trend::{Trend, TrendReport};
