pub mod api;
pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod jobs;
pub mod processing;
pub mod search;
pub mod security;
pub mod server;
pub mod utils;

pub use errors::{AppError, Result};
