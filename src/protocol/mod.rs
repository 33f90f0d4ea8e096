//! `ruleflow` Protocol
//!
//! The HTTP surface in front of the engine.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                    ruleflow Protocol                        |
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - /health: turn, action and rule cache statistics        |
//! |    - /sessions/:id/infer: run one turn                      |
//! |    - /sessions/:id/state: read or update session state      |
//! |    - /sessions/:id/dtmf/{menu,input}: keypad entry          |
//! |    - /sessions/:id/actions/{start,check}: action lifecycle  |
//! |    - /rules/invalidate: drop cached rule sets               |
//! +-------------------------------------------------------------+
//! |  Wire Format: JSON                                          |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `handler` - Handler owning the engine and action supervisor
//! - `rest` - REST API handlers and routing

pub mod handler;
pub mod rest;

pub use handler::Handler;
