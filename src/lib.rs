//! # Ruleflow
//!
//! A weighted rules engine for contact-centre call flows. Each turn of a
//! session loads the session's state, picks a rule set, finds the next rule
//! whose weighted conditions clear its threshold, resolves the rule's
//! parameters and writes the result back for the platform to act on.
//!
//! ## Turn Pipeline
//!
//! ```text
//! TurnInput
//!     ↓
//! [StateStore::load]          → SessionState
//!     ↓
//! [System attributes]         → dialled number, UTC/local time, time of day
//!     ↓
//! [Disambiguation]            → customer account for the caller's address
//!     ↓
//! [Rule set selection]        → directive, current rule set, or trigger
//!     ↓
//! [Activation]                → first rule at or after the cursor whose
//!     ↓                         weights sum to its threshold
//! [Parameter resolution]      → templates, queues, flows, prompts, functions
//!     ↓
//! [StateStore::save_diff]     → only the keys that changed
//!     ↓
//! TurnOutcome
//! ```
//!
//! Asynchronous actions are tracked separately by [`actions::ActionSupervisor`]:
//! it records `START`, dispatches the action and lets the first terminal write
//! (`DONE`, `ERROR` or `TIMEOUT`) win.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ruleflow::{Config, Handler, TurnInput};
//!
//! let config = Config::load()?;
//! let handler = Handler::from_config(&config)?;
//!
//! let outcome = handler
//!     .infer(&TurnInput::new("contact-1").with_trigger("+61300000000"))
//!     .await?;
//! println!("{} -> {}", outcome.rule, outcome.action_type);
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `state` | Session attribute map, dotted paths, diff tracking |
//! | `store` | Durable state store with batching and conditional writes |
//! | `rules` | Rule model, weights, templates, activation, rule set cache |
//! | `engine` | Turn controller, lookups, disambiguation, set-state |
//! | `actions` | Action lifecycle ledger, supervisor and handler registry |
//! | `protocol` | Shared handler and HTTP API |

pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod rules;
pub mod state;
pub mod store;
pub mod telemetry;

pub use actions::{ActionRegistry, ActionStatus, ActionSupervisor};
pub use config::Config;
pub use engine::{InferenceEngine, TurnInput, TurnOutcome};
pub use error::{EngineError, EngineResult};
pub use protocol::Handler;
pub use rules::{Rule, RuleSet};
pub use state::{SessionState, TrackedState};
pub use store::{open_store, StateStore, StoreError};
