// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod judge;
pub mod llm;
pub mod round;
pub mod state;
pub mod types;
pub mod words;
