pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{AppParts, AppState, CommandOutcome, GoalsView, TaskListView, ViewStatus};
pub use application::timer_engine::{TimerNotifier, TimerSnapshot};
pub use infrastructure::error::InfraError;
