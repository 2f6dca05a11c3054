pub mod analyzer;
pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod progress;
pub mod retry;
pub mod rules;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod types;

#[cfg(test)]
mod testutils;
