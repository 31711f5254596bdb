//! AI batch orchestration for time estimates and categorization
//!
//! Item names are deduplicated, batched, and sent sequentially through the
//! streaming chat session; each answer is repaired into a JSON array and
//! matched back to items by exact display name. A failed batch is logged and
//! skipped; the only fatal case is zero successful batches. Raw model minutes
//! are scaled down by tunable constants before storage so estimates stay
//! conservative relative to human baselines.

use crate::chat_session::{ChatEndpoint, send_prompt};
use crate::config::{ConfigDefaults, ConfigStore};
use crate::error::{Result, RoistatError};
use crate::json_repair::parse_model_array;
use crate::types::{ItemId, ItemKind};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

/// Names per AI batch
pub const BATCH_SIZE: usize = 30;

/// Scaling applied to raw model minutes before storage.
///
/// The classification of an action as transformation-style is a display-name
/// substring heuristic; both the markers and the factors are tunable rather
/// than fixed behavior.
#[derive(Debug, Clone)]
pub struct EstimatorTuning {
    /// Factor for orchestration-level playbooks
    pub playbook_scale: f64,
    /// Factor for integration-style actions
    pub integration_scale: f64,
    /// Factor for data-transformation-style actions
    pub transformation_scale: f64,
    /// Lowercased substrings marking an action name as transformation-style
    pub transformation_markers: Vec<String>,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        Self {
            playbook_scale: 0.25,
            integration_scale: 0.05,
            transformation_scale: 0.005,
            transformation_markers: ["transform", "parse", "format", "convert", "extract"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl EstimatorTuning {
    /// Scale raw model minutes for one item, rounded to two decimals
    pub fn scale_minutes(&self, kind: ItemKind, name: &str, raw_minutes: f64) -> f64 {
        let factor = match kind {
            ItemKind::Playbook => self.playbook_scale,
            ItemKind::Action => {
                let lowered = name.to_lowercase();
                if self.transformation_markers.iter().any(|m| lowered.contains(m)) {
                    self.transformation_scale
                } else {
                    self.integration_scale
                }
            }
        };
        (raw_minutes * factor * 100.0).round() / 100.0
    }
}

/// Counts from one estimation or categorization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimateOutcome {
    /// Items that received a value
    pub applied: usize,
    /// Result entries that matched no item or failed validation
    pub skipped: usize,
    /// Batches that failed entirely
    pub failed_batches: usize,
}

/// Batch driver for the streaming estimation endpoints
pub struct Estimator {
    endpoint: ChatEndpoint,
    tuning: EstimatorTuning,
}

impl Estimator {
    /// Create an estimator with the given streaming endpoint and tuning
    pub fn new(endpoint: ChatEndpoint, tuning: EstimatorTuning) -> Self {
        Self { endpoint, tuning }
    }

    /// Ask the model for per-item time estimates and write the scaled values
    /// into the store.
    ///
    /// `items` pairs each configurable id with its display name; every id
    /// sharing a name receives that name's estimate. `progress` fires after
    /// each batch with `(percent, completed, total)`.
    pub async fn estimate_times<P>(
        &self,
        store: &mut ConfigStore,
        kind: ItemKind,
        items: &[(ItemId, String)],
        defaults: ConfigDefaults,
        mut progress: P,
    ) -> Result<EstimateOutcome>
    where
        P: FnMut(f64, usize, usize),
    {
        let names = dedup_names(items);
        let index = name_index(items);
        let batches = batch_count(names.len());
        let mut outcome = EstimateOutcome::default();
        let mut succeeded = 0usize;

        for (batch_number, batch) in names.chunks(BATCH_SIZE).enumerate() {
            let prompt = time_prompt(batch, kind);
            let tracking_id = format!("time-estimate-{}", batch_number + 1);
            match self.run_batch(&prompt, &tracking_id).await {
                Ok(entries) => {
                    succeeded += 1;
                    let (applied, skipped) =
                        apply_time_estimates(store, kind, &index, &entries, &self.tuning, defaults.cost);
                    outcome.applied += applied;
                    outcome.skipped += skipped;
                }
                Err(e) => {
                    outcome.failed_batches += 1;
                    warn!(batch = batch_number + 1, error = %e, "estimation batch failed, skipping");
                }
            }
            let completed = batch_number + 1;
            progress(completed as f64 / batches as f64 * 100.0, completed, batches);
        }

        if succeeded == 0 && batches > 0 {
            return Err(RoistatError::AllBatchesFailed);
        }
        info!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            failed_batches = outcome.failed_batches,
            "time estimation complete"
        );
        Ok(outcome)
    }

    /// Ask the model to pick a category for each item from the currently
    /// visible category set and write validated assignments into the store.
    pub async fn categorize<P>(
        &self,
        store: &mut ConfigStore,
        kind: ItemKind,
        items: &[(ItemId, String)],
        mut progress: P,
    ) -> Result<EstimateOutcome>
    where
        P: FnMut(f64, usize, usize),
    {
        let names = dedup_names(items);
        let index = name_index(items);
        let categories: Vec<(String, String)> = store
            .visible_categories()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        let batches = batch_count(names.len());
        let mut outcome = EstimateOutcome::default();
        let mut succeeded = 0usize;

        for (batch_number, batch) in names.chunks(BATCH_SIZE).enumerate() {
            let prompt = category_prompt(batch, &categories);
            let tracking_id = format!("categorize-{}", batch_number + 1);
            match self.run_batch(&prompt, &tracking_id).await {
                Ok(entries) => {
                    succeeded += 1;
                    let (applied, skipped) = apply_categories(store, kind, &index, &entries);
                    outcome.applied += applied;
                    outcome.skipped += skipped;
                }
                Err(e) => {
                    outcome.failed_batches += 1;
                    warn!(batch = batch_number + 1, error = %e, "categorization batch failed, skipping");
                }
            }
            let completed = batch_number + 1;
            progress(completed as f64 / batches as f64 * 100.0, completed, batches);
        }

        if succeeded == 0 && batches > 0 {
            return Err(RoistatError::AllBatchesFailed);
        }
        info!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            failed_batches = outcome.failed_batches,
            "categorization complete"
        );
        Ok(outcome)
    }

    async fn run_batch(&self, prompt: &str, tracking_id: &str) -> Result<Vec<Value>> {
        let answer = send_prompt(&self.endpoint, prompt, tracking_id).await?;
        parse_model_array(&answer)
    }
}

/// Distinct display names, first occurrence order
pub fn dedup_names(items: &[(ItemId, String)]) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut names = Vec::new();
    for (_, name) in items {
        if seen.insert(name.clone(), ()).is_none() {
            names.push(name.clone());
        }
    }
    names
}

fn name_index(items: &[(ItemId, String)]) -> HashMap<String, Vec<ItemId>> {
    let mut index: HashMap<String, Vec<ItemId>> = HashMap::new();
    for (id, name) in items {
        index.entry(name.clone()).or_default().push(id.clone());
    }
    index
}

fn batch_count(names: usize) -> usize {
    names.div_ceil(BATCH_SIZE)
}

fn time_prompt(names: &[String], kind: ItemKind) -> String {
    let listed = names.join("\n- ");
    format!(
        "For each security automation {kind} below, estimate how many minutes \
         a skilled analyst would need to perform the same work manually once. \
         Respond with only a JSON array of objects shaped like \
         {{\"name\": \"<exact name>\", \"minutes\": <number>}}, one per item, \
         keeping every name exactly as given.\n\nItems:\n- {listed}"
    )
}

fn category_prompt(names: &[String], categories: &[(String, String)]) -> String {
    let listed = names.join("\n- ");
    let choices = categories
        .iter()
        .map(|(id, name)| format!("{id} ({name})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Assign each security automation below to the single best-fitting \
         category id from this list: {choices}. Respond with only a JSON \
         array of objects shaped like \
         {{\"name\": \"<exact name>\", \"category\": \"<category id>\"}}, \
         keeping every name exactly as given.\n\nItems:\n- {listed}"
    )
}

/// Apply one batch of time-estimate entries; returns `(applied, skipped)`
pub fn apply_time_estimates(
    store: &mut ConfigStore,
    kind: ItemKind,
    index: &HashMap<String, Vec<ItemId>>,
    entries: &[Value],
    tuning: &EstimatorTuning,
    cost: f64,
) -> (usize, usize) {
    let mut applied = 0;
    let mut skipped = 0;
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str);
        let minutes = entry.get("minutes").and_then(Value::as_f64);
        let (Some(name), Some(minutes)) = (name, minutes) else {
            skipped += 1;
            continue;
        };
        let Some(ids) = index.get(name) else {
            skipped += 1;
            continue;
        };
        let scaled = tuning.scale_minutes(kind, name, minutes);
        for id in ids {
            store.set_time_from_ai(kind, id.clone(), scaled, cost);
            applied += 1;
        }
    }
    (applied, skipped)
}

/// Apply one batch of categorization entries; unknown category ids and
/// unmatched names are skipped
pub fn apply_categories(
    store: &mut ConfigStore,
    kind: ItemKind,
    index: &HashMap<String, Vec<ItemId>>,
    entries: &[Value],
) -> (usize, usize) {
    let mut applied = 0;
    let mut skipped = 0;
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str);
        let category = entry.get("category").and_then(Value::as_str);
        let (Some(name), Some(category)) = (name, category) else {
            skipped += 1;
            continue;
        };
        if !store.category_exists(category) {
            skipped += 1;
            continue;
        }
        let Some(ids) = index.get(name) else {
            skipped += 1;
            continue;
        };
        for id in ids {
            store.set_category_from_ai(kind, id.clone(), category.to_string());
            applied += 1;
        }
    }
    (applied, skipped)
}
