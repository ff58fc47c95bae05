//! Pomodoro Server - authoritative focus/break timer.
//!
//! This crate provides the server side of the Pomodoro timer, responsible for:
//! - Counting down the current phase once per second
//! - Persisting the Session in a key-value store
//! - Applying Viewer intents (start, pause, toggle, reset, settings)
//! - Pushing Session changes to connected Viewers
//!
//! # Architecture
//!
//! The store is the single source of truth. A [`scheduler::Scheduler`] ticks
//! on a fixed period; Viewers read snapshots and send intents over HTTP or
//! WebSocket. Both kinds of writer go through one
//! [`controller::SessionController`], which serializes every
//! read-modify-write so a tick and an intent never interleave. Viewers keep
//! no timer of their own and re-derive their display from each snapshot.

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod store;
pub mod types;
pub mod view;
