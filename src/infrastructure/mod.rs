pub mod cache;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod goals_codec;
pub mod logging;
pub mod settings_repository;
pub mod todoist_client;
pub mod todoist_payload;
