pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod tagging;
pub mod ui;
pub mod utils;
