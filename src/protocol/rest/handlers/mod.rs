//! REST API Handlers
//!
//! Contains all HTTP endpoint handlers organized by domain.

pub mod actions;
pub mod admin;
pub mod rules;
pub mod sessions;
