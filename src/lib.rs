//! sermn - Remote process supervisor
//!
//! Owns a fixed registry of workloads (native commands or containers) and
//! exposes their lifecycle over a small HTTP control plane.

pub mod api;
pub mod core;
pub mod platform;

/// Application name constant
pub const APP_NAME: &str = "sermn";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
