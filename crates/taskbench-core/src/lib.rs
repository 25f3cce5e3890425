pub mod config;
pub mod file_store;
pub mod harness;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod report;
pub mod sqlite;
