//! Order execution: retry policy, paper gateway, and the submission
//! workflow that keeps entries idempotent across failures.

pub mod paper;
pub mod retry;
pub mod workflow;

pub use paper::PaperGateway;
pub use retry::{AttemptOutcome, OrderAttempt, RetryPolicy};
pub use workflow::{OrderWorkflow, WorkflowError};
