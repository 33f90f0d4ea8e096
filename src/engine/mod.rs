//! Inference Engine
//!
//! Composes state, rules and lookups into a per-turn decision.
//!
//! ## Modules
//!
//! - `system`: first-turn `System` attributes and caller capture
//! - `disambiguation`: narrowing caller accounts to one `Customer`
//! - `resolver`: rule set selection and next-rule search
//! - `lookup`: entity name lookups and param resolution
//! - `set_state`: `keyN`/`valueN` state updates
//! - `dtmf`: keypad menu selections and validated input
//! - `inference`: the orchestrator

pub mod disambiguation;
pub mod dtmf;
pub mod inference;
pub mod lookup;
pub mod resolver;
pub mod set_state;
pub mod system;

pub use disambiguation::{
    make_account_item, normalize_address, DisambiguationOutcome, Disambiguator, EntityDirectory,
    StaticDirectory,
};
pub use dtmf::{input_response, menu_target, option_key, InputKind, InputRules};
pub use inference::{InferenceEngine, TurnInput, TurnOutcome};
pub use lookup::{EntityCatalog, EntityLookup, LocatedEntity, ParamResolver};
pub use resolver::{next_activated, prune_scratch, select_rule_set, start_index, Selection};
pub use set_state::{apply_updates, parse_updates, StateUpdate};
pub use system::{capture_caller, ensure_system_attributes, local_offset, time_of_day};
