//! Response Bank Store
//!
//! Holds, per category, an ordered list of response templates plus the
//! authored action fragments used for synthesis, and per intent the generic
//! fallback templates used when no category matches. Template lists are
//! append-only at runtime: synthesized templates are added after being checked
//! against the existing templates and the generated-response log.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::synth::{ActionFragment, Skeleton};

/// Substitution slot for the lower-cased query text
pub const QUERY_SLOT: &str = "{query}";

/// Intent used when nothing else matches
pub const UNKNOWN_INTENT: &str = "unknown";

/// Prefix of persistent scope keys owned by intent fallback templates
const INTENT_SCOPE_PREFIX: &str = "intent:";

/// Built-in bank compiled into the binary
const BUILTIN_BANK: &str = include_str!("../data/response_bank.json");

/// Response bank errors.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("Failed to read response bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse response bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid response bank: {0}")]
    Invalid(String),
}

/// Render a template for the given lower-cased query
pub fn render(template: &str, query_lower: &str) -> String {
    template.replace(QUERY_SLOT, query_lower)
}

/// Category with its keyword set and template list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBank {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, rename = "responses")]
    pub templates: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionFragment>,
}

/// Intent with its keyword set and generic fallback templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentBank {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

/// On-disk layout of a response bank
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BankFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    categories: Vec<CategoryBank>,
    #[serde(default)]
    intents: Vec<IntentBank>,
    #[serde(default)]
    skeletons: Vec<Skeleton>,
    #[serde(default)]
    fallback_actions: Vec<ActionFragment>,
}

fn default_version() -> u32 {
    1
}

/// Selection scope: a category bank or an intent's fallback templates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Category(String),
    Intent(String),
}

impl Scope {
    /// Key used for persistent bookkeeping and the snapshot
    pub fn key(&self) -> String {
        match self {
            Scope::Category(name) => name.clone(),
            Scope::Intent(name) => format!("{}{}", INTENT_SCOPE_PREFIX, name),
        }
    }

    /// Inverse of [`Scope::key`]
    pub fn from_key(key: &str) -> Self {
        match key.strip_prefix(INTENT_SCOPE_PREFIX) {
            Some(intent) => Scope::Intent(intent.to_string()),
            None => Scope::Category(key.to_string()),
        }
    }

    /// Category or intent name without prefix
    pub fn name(&self) -> &str {
        match self {
            Scope::Category(name) | Scope::Intent(name) => name,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Category(name) => write!(f, "category '{}'", name),
            Scope::Intent(name) => write!(f, "intent '{}'", name),
        }
    }
}

/// In-memory response bank
#[derive(Debug, Clone)]
pub struct ResponseBank {
    version: u32,
    categories: Vec<CategoryBank>,
    intents: Vec<IntentBank>,
    skeletons: Vec<Skeleton>,
    fallback_actions: Vec<ActionFragment>,
    /// Synthesized templates per scope key, in append order
    generated: BTreeMap<String, Vec<String>>,
}

impl ResponseBank {
    /// Load the bank compiled into the crate
    pub fn builtin() -> Result<Self, BankError> {
        Self::from_json_str(BUILTIN_BANK)
    }

    /// Load a bank from a JSON file
    pub fn load(path: &Path) -> Result<Self, BankError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a bank from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, BankError> {
        let file: BankFile = serde_json::from_str(json)?;
        let bank = ResponseBank {
            version: file.version,
            categories: file.categories,
            intents: file.intents,
            skeletons: file.skeletons,
            fallback_actions: file.fallback_actions,
            generated: BTreeMap::new(),
        };
        bank.validate()?;
        Ok(bank)
    }

    fn validate(&self) -> Result<(), BankError> {
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(BankError::Invalid("category with empty name".into()));
            }
            if category.name.starts_with(INTENT_SCOPE_PREFIX) {
                return Err(BankError::Invalid(format!(
                    "category name '{}' uses reserved prefix",
                    category.name
                )));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(BankError::Invalid(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
        }

        let unknown = self
            .intents
            .iter()
            .find(|i| i.name == UNKNOWN_INTENT)
            .ok_or_else(|| BankError::Invalid("missing 'unknown' intent".into()))?;
        if unknown.templates.is_empty() {
            return Err(BankError::Invalid(
                "'unknown' intent has no templates".into(),
            ));
        }

        for skeleton in &self.skeletons {
            if !skeleton.text.contains(QUERY_SLOT) || !skeleton.text.contains("{action}") {
                return Err(BankError::Invalid(format!(
                    "skeleton '{}' must contain {{query}} and {{action}}",
                    skeleton.text
                )));
            }
        }

        Ok(())
    }

    /// Bank format version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Categories in declaration order
    pub fn categories(&self) -> &[CategoryBank] {
        &self.categories
    }

    /// Intents in declaration order
    pub fn intents(&self) -> &[IntentBank] {
        &self.intents
    }

    /// Look up a category by name
    pub fn category(&self, name: &str) -> Option<&CategoryBank> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Synthesis skeletons
    pub fn skeletons(&self) -> &[Skeleton] {
        &self.skeletons
    }

    /// Fragments used when a scope has none of its own
    pub fn fallback_actions(&self) -> &[ActionFragment] {
        &self.fallback_actions
    }

    /// Whether the scope exists in this bank
    pub fn contains(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Category(name) => self.category(name).is_some(),
            Scope::Intent(name) => self.intents.iter().any(|i| &i.name == name),
        }
    }

    /// Scope for an intent, falling back to `unknown` when the intent has no
    /// templates
    pub fn intent_scope(&self, intent: &str) -> Scope {
        let usable = self
            .intents
            .iter()
            .any(|i| i.name == intent && !i.templates.is_empty());
        if usable {
            Scope::Intent(intent.to_string())
        } else {
            Scope::Intent(UNKNOWN_INTENT.to_string())
        }
    }

    /// Current templates of a scope (empty when the scope is unknown)
    pub fn templates(&self, scope: &Scope) -> &[String] {
        match scope {
            Scope::Category(name) => self
                .category(name)
                .map(|c| c.templates.as_slice())
                .unwrap_or(&[]),
            Scope::Intent(name) => self
                .intents
                .iter()
                .find(|i| &i.name == name)
                .map(|i| i.templates.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Authored action fragments of a scope
    pub fn actions(&self, scope: &Scope) -> &[ActionFragment] {
        match scope {
            Scope::Category(name) => self
                .category(name)
                .map(|c| c.actions.as_slice())
                .unwrap_or(&[]),
            Scope::Intent(_) => &[],
        }
    }

    /// Whether a template is already known to the scope, either as a bank
    /// template or in the generated-response log
    pub fn knows_template(&self, scope: &Scope, template: &str) -> bool {
        self.templates(scope).iter().any(|t| t == template)
            || self
                .generated
                .get(&scope.key())
                .map(|log| log.iter().any(|t| t == template))
                .unwrap_or(false)
    }

    /// Append a synthesized template to a scope
    ///
    /// Returns false (and changes nothing) when the scope is unknown or the
    /// template is already present in the bank or the generated log.
    pub fn add_template(&mut self, scope: &Scope, template: &str) -> bool {
        if self.knows_template(scope, template) {
            return false;
        }

        let list = match scope {
            Scope::Category(name) => self
                .categories
                .iter_mut()
                .find(|c| &c.name == name)
                .map(|c| &mut c.templates),
            Scope::Intent(name) => self
                .intents
                .iter_mut()
                .find(|i| &i.name == name)
                .map(|i| &mut i.templates),
        };

        match list {
            Some(list) => {
                list.push(template.to_string());
                self.generated
                    .entry(scope.key())
                    .or_default()
                    .push(template.to_string());
                true
            }
            None => false,
        }
    }

    /// Synthesized templates per scope key
    pub fn generated(&self) -> &BTreeMap<String, Vec<String>> {
        &self.generated
    }

    /// Re-append previously synthesized templates after a restart
    ///
    /// Entries whose scope no longer exists are dropped with a warning.
    pub fn restore_generated(&mut self, generated: &BTreeMap<String, Vec<String>>) -> usize {
        let mut restored = 0;
        for (key, templates) in generated {
            let scope = Scope::from_key(key);
            if !self.contains(&scope) {
                log::warn!("Dropping generated templates for unknown {}", scope);
                continue;
            }
            for template in templates {
                if self.add_template(&scope, template) {
                    restored += 1;
                }
            }
        }
        restored
    }
}
