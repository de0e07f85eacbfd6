//! Command handlers

pub mod config;
pub mod progress;
pub mod read;
pub mod status;
pub mod storage;
