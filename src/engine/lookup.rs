//! Entity name lookups and rule parameter resolution.
//!
//! After a rule is selected its parameters are templated and well-known
//! names are swapped for platform identifiers:
//!
//! | param | adds |
//! |---|---|
//! | `queueName` | `queueId`, `queueArn` |
//! | `flowName` | `flowId`, `flowArn` |
//! | `functionName` | `functionArn` (looked up as `{stage}-{service}-{name}`) |
//! | `*message*` holding `<speak>` | `<key>Type = ssml` |
//! | `*message*` = `prompt:<name>` | `<key>Type = prompt`, `<key>PromptArn` |

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::rules::{EntityKind, ParamValue, Rule, TemplateResolver};
use crate::state::{format_number, SessionState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Params rendered later in the conversation, after input is collected
pub const UNTEMPLATED_PARAMS: &[&str] = &["confirmationMessage"];

const PROMPT_PREFIX: &str = "prompt:";

/// Identifier and locator of a platform entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedEntity {
    pub id: String,
    pub locator: String,
}

/// Name → entity lookup
pub trait EntityLookup: Send + Sync {
    fn resolve_by_name(&self, kind: EntityKind, name: &str) -> Option<LocatedEntity>;
}

#[derive(Debug, Clone, Deserialize)]
struct NamedEntity {
    name: String,
    #[serde(default)]
    id: String,
    #[serde(alias = "arn")]
    locator: String,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    queues: Vec<NamedEntity>,
    #[serde(default)]
    flows: Vec<NamedEntity>,
    #[serde(default)]
    functions: Vec<NamedEntity>,
    #[serde(default)]
    prompts: Vec<NamedEntity>,
}

/// In-memory catalog of queues, flows, functions and prompts
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entries: HashMap<(EntityKind, String), LocatedEntity>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        kind: EntityKind,
        name: impl Into<String>,
        id: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        self.insert(kind, name, id, locator);
        self
    }

    pub fn insert(
        &mut self,
        kind: EntityKind,
        name: impl Into<String>,
        id: impl Into<String>,
        locator: impl Into<String>,
    ) {
        self.entries.insert(
            (kind, name.into()),
            LocatedEntity {
                id: id.into(),
                locator: locator.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `{"queues": [{"name", "id", "arn"}], "flows": [...], ...}`
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let document: CatalogDocument = serde_json::from_str(text)
            .map_err(|e| EngineError::Configuration(format!("invalid entity catalog: {e}")))?;

        let mut catalog = Self::new();
        let groups = [
            (EntityKind::Queue, document.queues),
            (EntityKind::Flow, document.flows),
            (EntityKind::Function, document.functions),
            (EntityKind::Prompt, document.prompts),
        ];
        for (kind, entities) in groups {
            for e in entities {
                catalog.insert(kind, e.name, e.id, e.locator);
            }
        }
        Ok(catalog)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

impl EntityLookup for EntityCatalog {
    fn resolve_by_name(&self, kind: EntityKind, name: &str) -> Option<LocatedEntity> {
        self.entries.get(&(kind, name.to_string())).cloned()
    }
}

/// Templates and resolves a selected rule's parameters
#[derive(Clone)]
pub struct ParamResolver {
    engine: EngineConfig,
    templates: Arc<dyn TemplateResolver>,
    lookup: Arc<dyn EntityLookup>,
}

impl ParamResolver {
    pub fn new(
        config: &EngineConfig,
        templates: Arc<dyn TemplateResolver>,
        lookup: Arc<dyn EntityLookup>,
    ) -> Self {
        Self {
            engine: config.clone(),
            templates,
            lookup,
        }
    }

    pub fn lookup(&self) -> &Arc<dyn EntityLookup> {
        &self.lookup
    }

    /// Resolve an entity or fail the turn
    pub fn require(&self, kind: EntityKind, name: &str) -> EngineResult<LocatedEntity> {
        self.lookup
            .resolve_by_name(kind, name)
            .ok_or_else(|| EngineError::LookupFailed {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    /// Rendered and resolved parameters of a rule
    pub fn resolve(&self, rule: &Rule, state: &SessionState) -> EngineResult<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();

        for (key, value) in &rule.params {
            match value {
                ParamValue::Text { value } => {
                    params.insert(key.clone(), value.clone());
                }
                ParamValue::Template { value } if UNTEMPLATED_PARAMS.contains(&key.as_str()) => {
                    params.insert(key.clone(), value.clone());
                }
                ParamValue::Template { value } => {
                    params.insert(key.clone(), self.templates.render(value, state)?);
                }
                ParamValue::Number { value } => {
                    params.insert(key.clone(), format_number(*value));
                }
                ParamValue::Reference { entity, name } => {
                    let entity = self.require(*entity, name)?;
                    params.insert(format!("{key}Id"), entity.id);
                    params.insert(key.clone(), entity.locator);
                }
            }
        }

        self.resolve_names(&mut params)?;
        self.resolve_messages(&mut params);
        Ok(params)
    }

    fn resolve_names(&self, params: &mut BTreeMap<String, String>) -> EngineResult<()> {
        if let Some(name) = params.get("queueName").cloned() {
            let queue = self.require(EntityKind::Queue, &name)?;
            params.insert("queueId".to_string(), queue.id);
            params.insert("queueArn".to_string(), queue.locator);
        }

        if let Some(name) = params.get("flowName").cloned() {
            let flow = self.require(EntityKind::Flow, &name)?;
            params.insert("flowId".to_string(), flow.id);
            params.insert("flowArn".to_string(), flow.locator);
        }

        if let Some(name) = params.get("functionName").cloned() {
            let function = self.require(EntityKind::Function, &self.engine.qualify_function(&name))?;
            params.insert("functionArn".to_string(), function.locator);
        }

        Ok(())
    }

    fn resolve_messages(&self, params: &mut BTreeMap<String, String>) {
        let message_keys: Vec<String> = params
            .keys()
            .filter(|k| k.to_lowercase().contains("message"))
            .cloned()
            .collect();

        for key in message_keys {
            let Some(value) = params.get(&key).cloned() else {
                continue;
            };

            if value.contains("<speak>") {
                params.insert(format!("{key}Type"), "ssml".to_string());
            } else if let Some(prompt_name) = value.strip_prefix(PROMPT_PREFIX) {
                match self.lookup.resolve_by_name(EntityKind::Prompt, prompt_name) {
                    Some(prompt) => {
                        params.insert(format!("{key}Type"), "prompt".to_string());
                        params.insert(format!("{key}PromptArn"), prompt.locator);
                    }
                    None => {
                        tracing::error!(param = %key, prompt = prompt_name, "prompt_lookup_failed");
                    }
                }
            }
        }
    }
}
