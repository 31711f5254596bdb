//! Configuration resolution and the shared configuration store
//!
//! Two per-item override maps exist (one per [`ItemKind`]), plus category
//! assignments, the category set itself, and the AI-provenance flags that
//! record whether a value was last written by the AI pipeline.
//!
//! The store is shared between the aggregation engine (reads) and the manual
//! edit / AI write-back paths (writes). Every mutation is a whole-entry
//! replacement for its key; partial in-place field edits are never visible
//! mid-computation. Aggregation must be re-run explicitly after mutating.

use crate::types::{ItemId, ItemKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-item override: either field may be absent, meaning "use the default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Minutes saved per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Hourly rate in dollars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Global defaults for one item kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfigDefaults {
    /// Minutes saved per run
    pub time: f64,
    /// Hourly rate in dollars
    pub cost: f64,
}

impl ConfigDefaults {
    /// Default playbook configuration: 5 minutes at $50/hr
    pub fn playbook() -> Self {
        Self { time: 5.0, cost: 50.0 }
    }

    /// Default action configuration: 1 minute at $50/hr
    pub fn action() -> Self {
        Self { time: 1.0, cost: 50.0 }
    }

    /// Default prompt-assistant configuration: 2 minutes at $50/hr
    pub fn prompt() -> Self {
        Self { time: 2.0, cost: 50.0 }
    }
}

/// Fully-resolved effective configuration for one item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveConfig {
    /// Minutes saved per run
    pub time: f64,
    /// Hourly rate in dollars
    pub cost: f64,
}

/// Merge global defaults with any per-item override.
///
/// Pure and total: returns the defaults verbatim when the map has no entry,
/// and overrides field-wise when it does (a stored `time` with no stored
/// `cost` yields `{stored_time, default_cost}`).
pub fn resolve(
    map: &HashMap<ItemId, ItemConfig>,
    id: &ItemId,
    defaults: ConfigDefaults,
) -> EffectiveConfig {
    let custom = map.get(id).copied().unwrap_or_default();
    EffectiveConfig {
        time: custom.time.unwrap_or(defaults.time),
        cost: custom.cost.unwrap_or(defaults.cost),
    }
}

/// Whether the current time/category values were last written by the AI
/// pipeline
///
/// Provenance is field-granular: a manual edit of one field clears only that
/// field's flag. Used for display only, never for computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AiProvenance {
    /// Time value came from the AI pipeline
    #[serde(default)]
    pub time: bool,
    /// Category value came from the AI pipeline
    #[serde(default)]
    pub category: bool,
}

/// A savings category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier, unique within the category set
    pub id: String,
    /// Display name
    pub name: String,
    /// Default categories ship with the product and can only be hidden,
    /// never deleted or edited
    #[serde(default)]
    pub is_default: bool,
    /// Hidden categories stay assigned but are dropped from pickers and
    /// reports
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

/// The built-in category set
pub fn default_categories() -> Vec<Category> {
    const DEFAULTS: &[(&str, &str)] = &[
        ("ai-assisted-analysis", "AI Assisted Analysis"),
        ("collaboration-notification", "Collaboration/Notification"),
        ("continuous-improvement", "Continuous Improvement/Governance"),
        ("detection-analysis", "Detection/Analysis"),
        ("enrichment-context", "Enrichment/Context Building"),
        ("infrastructure-toolchain", "Infrastructure/Toolchain"),
        ("ingestion-normalization", "Ingestion/Normalization"),
        ("reporting-metrics", "Reporting/Metrics"),
        ("response-remediation", "Response/Remediation"),
        ("testing-validation", "Testing/Validation"),
        ("threat-hunting", "Threat Hunting/Proactive Defense"),
    ];
    DEFAULTS
        .iter()
        .map(|(id, name)| Category {
            id: (*id).to_string(),
            name: (*name).to_string(),
            is_default: true,
            visible: true,
        })
        .collect()
}

/// One item kind's slice of the configuration store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindConfig {
    /// Per-item time/cost overrides
    pub configs: HashMap<ItemId, ItemConfig>,
    /// Per-item category assignment (category id)
    pub categories: HashMap<ItemId, String>,
    /// Per-item AI provenance flags
    pub ai_flags: HashMap<ItemId, AiProvenance>,
}

/// Shared configuration store: overrides, category assignments, provenance
/// flags and the category set, for both item kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStore {
    /// Playbook-kind configuration
    pub playbooks: KindConfig,
    /// Action-kind configuration
    pub actions: KindConfig,
    /// The category set (defaults plus custom)
    pub category_set: Vec<Category>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            playbooks: KindConfig::default(),
            actions: KindConfig::default(),
            category_set: default_categories(),
        }
    }
}

impl ConfigStore {
    /// Create a store with the default category set and no overrides
    pub fn new() -> Self {
        Self::default()
    }

    fn kind(&self, kind: ItemKind) -> &KindConfig {
        match kind {
            ItemKind::Playbook => &self.playbooks,
            ItemKind::Action => &self.actions,
        }
    }

    fn kind_mut(&mut self, kind: ItemKind) -> &mut KindConfig {
        match kind {
            ItemKind::Playbook => &mut self.playbooks,
            ItemKind::Action => &mut self.actions,
        }
    }

    /// Resolve the effective time/cost for an item
    pub fn resolve(&self, kind: ItemKind, id: &ItemId, defaults: ConfigDefaults) -> EffectiveConfig {
        resolve(&self.kind(kind).configs, id, defaults)
    }

    /// Whether an item carries any custom time/cost override
    pub fn has_custom_config(&self, kind: ItemKind, id: &ItemId) -> bool {
        self.kind(kind).configs.contains_key(id)
    }

    /// Category id assigned to an item, if any
    pub fn category_of(&self, kind: ItemKind, id: &ItemId) -> Option<&str> {
        self.kind(kind).categories.get(id).map(String::as_str)
    }

    /// Display name for a category id; empty string when unassigned or the
    /// id is unknown
    pub fn category_name(&self, category_id: &str) -> &str {
        self.category_set
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name.as_str())
            .unwrap_or("")
    }

    /// AI provenance flags for an item
    pub fn ai_provenance(&self, kind: ItemKind, id: &ItemId) -> AiProvenance {
        self.kind(kind).ai_flags.get(id).copied().unwrap_or_default()
    }

    /// Manually set an item's time/cost override. Clears the AI time flag:
    /// a human edit always wins provenance for that field.
    pub fn set_config_manual(&mut self, kind: ItemKind, id: ItemId, config: ItemConfig) {
        let slot = self.kind_mut(kind);
        let flags = slot.ai_flags.get(&id).copied().unwrap_or_default();
        if flags.time {
            slot.ai_flags.insert(id.clone(), AiProvenance { time: false, ..flags });
        }
        slot.configs.insert(id, config);
    }

    /// Apply an AI-estimated time. Replaces the whole override with the
    /// estimated minutes and the supplied hourly rate, and marks the time
    /// field as AI-written.
    pub fn set_time_from_ai(&mut self, kind: ItemKind, id: ItemId, minutes: f64, cost: f64) {
        let slot = self.kind_mut(kind);
        let flags = slot.ai_flags.get(&id).copied().unwrap_or_default();
        slot.ai_flags
            .insert(id.clone(), AiProvenance { time: true, ..flags });
        slot.configs
            .insert(id, ItemConfig { time: Some(minutes), cost: Some(cost) });
    }

    /// Manually assign (or clear, with `None`) an item's category. Clears
    /// the AI category flag.
    pub fn set_category_manual(&mut self, kind: ItemKind, id: ItemId, category_id: Option<String>) {
        let slot = self.kind_mut(kind);
        let flags = slot.ai_flags.get(&id).copied().unwrap_or_default();
        if flags.category {
            slot.ai_flags
                .insert(id.clone(), AiProvenance { category: false, ..flags });
        }
        match category_id {
            Some(cat) => {
                slot.categories.insert(id, cat);
            }
            None => {
                slot.categories.remove(&id);
            }
        }
    }

    /// Apply an AI-assigned category. The id must already be validated
    /// against the category set; marks the category field as AI-written.
    pub fn set_category_from_ai(&mut self, kind: ItemKind, id: ItemId, category_id: String) {
        let slot = self.kind_mut(kind);
        let flags = slot.ai_flags.get(&id).copied().unwrap_or_default();
        slot.ai_flags
            .insert(id.clone(), AiProvenance { category: true, ..flags });
        slot.categories.insert(id, category_id);
    }

    /// Whether a category id exists in the current set
    pub fn category_exists(&self, category_id: &str) -> bool {
        self.category_set.iter().any(|c| c.id == category_id)
    }

    /// Visible categories, in set order
    pub fn visible_categories(&self) -> impl Iterator<Item = &Category> {
        self.category_set.iter().filter(|c| c.visible)
    }

    /// Add a custom category. Fails when the id is already taken.
    pub fn add_category(&mut self, id: String, name: String) -> crate::error::Result<()> {
        if self.category_exists(&id) {
            return Err(crate::error::RoistatError::InvalidArgument(format!(
                "a category with id '{id}' already exists"
            )));
        }
        self.category_set.push(Category { id, name, is_default: false, visible: true });
        Ok(())
    }

    /// Rename a custom category, optionally changing its id. Default
    /// categories cannot be edited. When the id changes, every assignment
    /// pointing at the old id is remapped.
    pub fn edit_category(
        &mut self,
        old_id: &str,
        new_id: String,
        new_name: String,
    ) -> crate::error::Result<()> {
        let Some(pos) = self.category_set.iter().position(|c| c.id == old_id) else {
            return Err(crate::error::RoistatError::InvalidArgument(format!(
                "unknown category '{old_id}'"
            )));
        };
        if self.category_set[pos].is_default {
            return Err(crate::error::RoistatError::InvalidArgument(
                "default categories cannot be edited".to_string(),
            ));
        }
        let visible = self.category_set[pos].visible;
        self.category_set[pos] =
            Category { id: new_id.clone(), name: new_name, is_default: false, visible };
        if new_id != old_id {
            for slot in [&mut self.playbooks, &mut self.actions] {
                for cat in slot.categories.values_mut() {
                    if cat == old_id {
                        *cat = new_id.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete a custom category, cascading removal of every assignment to
    /// it. Default categories can only be hidden.
    pub fn delete_category(&mut self, id: &str) -> crate::error::Result<()> {
        let Some(pos) = self.category_set.iter().position(|c| c.id == id) else {
            return Err(crate::error::RoistatError::InvalidArgument(format!(
                "unknown category '{id}'"
            )));
        };
        if self.category_set[pos].is_default {
            return Err(crate::error::RoistatError::InvalidArgument(
                "default categories cannot be deleted, hide them instead".to_string(),
            ));
        }
        self.category_set.remove(pos);
        for slot in [&mut self.playbooks, &mut self.actions] {
            slot.categories.retain(|_, cat| cat != id);
        }
        Ok(())
    }

    /// Flip a category's visibility
    pub fn toggle_category_visibility(&mut self, id: &str) -> crate::error::Result<()> {
        match self.category_set.iter_mut().find(|c| c.id == id) {
            Some(cat) => {
                cat.visible = !cat.visible;
                Ok(())
            }
            None => Err(crate::error::RoistatError::InvalidArgument(format!(
                "unknown category '{id}'"
            ))),
        }
    }

    /// Re-add any missing default categories, preserving custom ones and
    /// the visibility state of defaults already present. Returns how many
    /// defaults were restored.
    pub fn restore_default_categories(&mut self) -> usize {
        let mut restored = 0;
        for default in default_categories() {
            match self.category_set.iter_mut().find(|c| c.id == default.id) {
                Some(existing) => existing.is_default = true,
                None => {
                    self.category_set.push(default);
                    restored += 1;
                }
            }
        }
        // Keep defaults first, custom after, matching initial ordering
        self.category_set.sort_by_key(|c| !c.is_default);
        restored
    }
}
