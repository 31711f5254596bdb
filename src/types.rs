//! Core domain types for roistat
//!
//! Strong typing for the identifiers and records that flow between the fetch
//! pipeline, the configuration store, and the aggregation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly-typed automation item identifier (playbook id or composed
/// action name)
///
/// # Examples
/// ```
/// use roistat::types::ItemId;
///
/// let id = ItemId::new("pb-1234");
/// assert_eq!(id.as_str(), "pb-1234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new ItemId from any string-like type
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strongly-typed tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new TenantId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of automation item a record or configuration refers to
///
/// Playbooks are orchestration-level automations; actions are the individual
/// integration or transformation steps they run. The two kinds carry separate
/// configuration maps and separate defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Orchestration-level automation
    Playbook,
    /// Individual integration/transformation step
    Action,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playbook => write!(f, "playbook"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// A single usage record as returned by the usage query API
///
/// One record per (item, tenant, time-bucket). Records are immutable:
/// produced only by the fetch pipeline and consumed by the aggregation
/// engine. Deserialization is lenient so that schema drift upstream does not
/// break ingestion; missing counts default to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageRecord {
    /// Playbook identifier this record belongs to
    pub playbook_id: Option<String>,
    /// Tenant the run happened in
    pub tenant_id: Option<String>,
    /// Run count for this bucket
    pub count: u64,
    /// Day bucket (present on daily-resolution payloads)
    pub date: Option<String>,
    /// Fully-qualified name of the item
    pub fqn: Option<String>,
    /// Record type, e.g. "classic", "flow", "component" for playbooks or an
    /// action type for action records
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    /// Connector machine name (action records)
    pub connector: Option<String>,
    /// Connector display title (action records)
    pub connector_title: Option<String>,
    /// Action name (action records)
    pub action: Option<String>,
}

/// Metadata for a playbook as returned by the metadata API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    /// Playbook identifier
    pub playbook_id: String,
    /// Playbook type ("classic", "flow", "component")
    #[serde(rename = "type")]
    pub playbook_type: Option<String>,
    /// Parent playbook name
    pub name: String,
    /// Flow name (flows only); the display name when non-empty
    #[serde(default)]
    pub flow_name: Option<String>,
    /// Owning tenant
    pub tenant_id: Option<String>,
}

/// Grand total over all included aggregated rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrandTotal {
    /// Total run/action count
    pub primary_metric: u64,
    /// Total hours saved
    pub hours: f64,
    /// Total dollars saved
    pub dollars: f64,
}

/// Prompt-assistant usage summary (total plus per-day buckets)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUsage {
    /// Total prompt count over the query window
    #[serde(rename = "totalMetricCount")]
    pub total: u64,
    /// Per-day counts, used for daily metrics
    #[serde(rename = "hitsPerDay", default)]
    pub per_day: Vec<PromptDay>,
}

/// One day of prompt-assistant usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDay {
    /// Day bucket (ISO date)
    pub date: String,
    /// Prompt count for the day
    #[serde(default)]
    pub runs: u64,
}

/// Normalize a raw item name for display: underscores become spaces and
/// every word is title-cased.
pub fn normalize_display_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for ch in spaced.chars() {
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.push(ch);
            if !ch.is_alphanumeric() {
                at_word_start = true;
            }
        }
    }
    out
}
