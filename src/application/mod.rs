pub mod bootstrap;
pub mod commands;
pub mod completed_tasks;
pub mod goals_store;
pub mod label_resolver;
pub mod task_loader;
pub mod timer_engine;

#[cfg(test)]
pub(crate) mod fake_todoist;
