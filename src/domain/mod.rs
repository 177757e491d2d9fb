pub mod local_zone;
pub mod models;
pub mod statistics;
pub mod task_parser;
pub mod timer;
