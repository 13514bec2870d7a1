// Library root for the draft coordination engine.
//
// Re-exports the engine modules so the app loop, the TUI, and integration
// tests can reach the crate's public API.

pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod local;
pub mod protocol;
pub mod seed;
pub mod service;
