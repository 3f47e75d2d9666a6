//! Page quality scoring and the escalation verdict.

pub mod escalation;
pub mod metrics;
pub mod patterns;

pub use escalation::{verdict, Verdict};
pub use metrics::evaluate;
