//! # deploy-watcher
//!
//! Keeps a deployed checkout in sync with a remote git branch.
//!
//! The watcher captures the head of the tracked branch at startup, polls the
//! remote on a fixed interval and, the first time the head moves, runs the
//! deploy sequence once:
//!
//! - `git fetch`
//! - `git reset --hard origin/<branch>`
//! - the project build
//! - a fire-and-forget restart through the process supervisor
//!
//! It never polls again after that; the restarted service is expected to
//! replace it.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod exec;
pub mod git;
pub mod log;
