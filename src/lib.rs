pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod message;
pub mod pacing;
pub mod web;

use anyhow::Context;

pub fn work_dir() -> anyhow::Result<std::path::PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}
