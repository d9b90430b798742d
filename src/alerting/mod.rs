pub mod evaluation_service;
pub mod transition;

pub use evaluation_service::{AppliedCheck, EvaluationError, EvaluationService};
