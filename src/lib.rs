pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ai_workflow::{WorkflowError, WorkflowOutcome, WorkflowSummary};
pub use application::commands::AppState;
pub use domain::models::{Frequency, HistoryLog, Target, TargetType, Task, UserPrefs};
pub use infrastructure::error::InfraError;
