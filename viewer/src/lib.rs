//! Pomodoro Viewer - terminal client for the Pomodoro server.
//!
//! This crate provides a Viewer that:
//! - Fetches Session snapshots and renders them as text
//! - Sends `toggleTimer` and `resetTimer` intents
//! - Submits new focus/break durations after validating them locally
//!
//! The Viewer keeps no timer of its own; every line it prints is derived from
//! the most recent snapshot returned by the server.

pub mod client;
pub mod config;
pub mod error;
pub mod render;
