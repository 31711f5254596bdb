//! Usage, metadata, and tenant data loading
//!
//! Thin `reqwest` client plus the chunked fetch pipeline. Bulk usage queries
//! POST a window-scoped body with a long timeout; lookups GET with a shorter
//! one. Long lookback windows are split into 90-day chunks driven through
//! the bounded runner with staggered launches, and a failed chunk is logged
//! and skipped so partial data still aggregates.

use crate::date_range::DateRange;
use crate::error::{Result, RoistatError};
use crate::runner::{DEFAULT_CONCURRENCY, run_bounded};
use crate::types::{ItemMetadata, PromptUsage, UsageRecord, normalize_display_name};
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

/// Timeout for bulk usage POST queries
pub const POST_TIMEOUT_SECS: u64 = 120;
/// Timeout for lookup GET requests
pub const GET_TIMEOUT_SECS: u64 = 60;
/// Launch stagger between chunk requests
const CHUNK_STAGGER: Duration = Duration::from_millis(100);

/// Playbook run counts over a window
pub const PLAYBOOK_USAGE_PATH: &str = "/api/analytics/playbook-usage";
/// Action run counts over a window
pub const ACTION_USAGE_PATH: &str = "/api/analytics/action-usage";
/// Prompt-assistant usage over a window
pub const PROMPT_USAGE_PATH: &str = "/api/analytics/prompt-usage";
/// Playbook metadata lookup
pub const METADATA_PATH: &str = "/api/playbooks/metadata";
/// Tenant list lookup
pub const TENANTS_PATH: &str = "/api/tenants";

/// Account and tenant scope every fetch runs under
#[derive(Debug, Clone)]
pub struct Context {
    /// Service origin, e.g. `https://platform.example.com`
    pub origin: String,
    /// Account identifier
    pub account_id: String,
    /// Optional tenant filter; `None` queries all tenants
    pub tenant_id: Option<String>,
}

impl Context {
    /// Check that enough scope is present to fetch anything at all
    pub fn validate(&self) -> Result<()> {
        if self.origin.is_empty() {
            return Err(RoistatError::MissingContext("origin".to_string()));
        }
        if self.account_id.is_empty() {
            return Err(RoistatError::MissingContext("accountId".to_string()));
        }
        Ok(())
    }
}

/// Body of a bulk usage query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    /// Window start, ISO-8601 with milliseconds
    pub start_date: String,
    /// Window end, ISO-8601 with milliseconds
    pub end_date: String,
    /// Empty means all tenants, one element scopes to that tenant
    pub tenant_ids: Vec<String>,
    /// Playbook-type filter, empty means all
    pub playbook_types: Vec<String>,
    /// Trigger-type filter, empty means all
    pub trigger_types: Vec<String>,
    /// Playbook-id filter, empty means all
    pub playbook_ids: Vec<String>,
}

impl UsageQuery {
    /// Build an unfiltered query for one window, optionally scoped to a
    /// tenant
    pub fn for_range(range: &DateRange, tenant_id: Option<&str>) -> Self {
        Self {
            start_date: range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end_date: range.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            tenant_ids: tenant_id.map(|t| vec![t.to_string()]).unwrap_or_default(),
            playbook_types: Vec::new(),
            trigger_types: Vec::new(),
            playbook_ids: Vec::new(),
        }
    }

    fn with_range(&self, range: &DateRange) -> Self {
        Self {
            start_date: range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end_date: range.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            ..self.clone()
        }
    }
}

/// HTTP client for the usage and lookup endpoints
pub struct UsageClient {
    http: Client,
    context: Context,
}

impl UsageClient {
    /// Create a client for the given account scope
    pub fn new(context: Context) -> Result<Self> {
        context.validate()?;
        let http = Client::builder().build()?;
        Ok(Self { http, context })
    }

    /// The scope this client fetches under
    pub fn context(&self) -> &Context {
        &self.context
    }

    fn url(&self, path: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!("{}{}{}accountId={}", self.context.origin, path, separator, self.context.account_id)
    }

    async fn post_json(&self, path: &str, body: &impl Serialize) -> Result<Value> {
        let send = self
            .http
            .post(self.url(path))
            .json(body)
            .timeout(Duration::from_secs(POST_TIMEOUT_SECS))
            .send()
            .await;
        match send {
            Ok(response) => Self::check(response).await,
            Err(e) if e.is_timeout() => Err(RoistatError::Timeout(POST_TIMEOUT_SECS)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let send = self
            .http
            .get(self.url(path))
            .timeout(Duration::from_secs(GET_TIMEOUT_SECS))
            .send()
            .await;
        match send {
            Ok(response) => Self::check(response).await,
            Err(e) if e.is_timeout() => Err(RoistatError::Timeout(GET_TIMEOUT_SECS)),
            Err(e) => Err(e.into()),
        }
    }

    async fn check(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RoistatError::Http { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }

    /// Fetch usage records for one window from `path`.
    ///
    /// A payload that is not an array yields zero records rather than an
    /// error.
    pub async fn fetch_usage(&self, path: &str, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        let payload = self.post_json(path, query).await?;
        Ok(records_from_payload(payload))
    }

    /// Fetch usage for a full range, chunking long windows.
    ///
    /// Chunks go through the bounded runner with staggered launches; results
    /// come back in window order. A failed chunk is logged and skipped, so
    /// its window's data is simply missing from the result. Only a range
    /// where every chunk failed comes back empty.
    pub async fn load_usage(
        &self,
        path: &str,
        query: &UsageQuery,
        range: &DateRange,
    ) -> Result<Vec<UsageRecord>> {
        if !range.needs_chunking() {
            return self.fetch_usage(path, query).await;
        }

        let chunks = range.chunks(crate::date_range::CHUNK_SIZE_DAYS);
        info!(chunks = chunks.len(), "fetching usage in chunks");
        let queries: Vec<UsageQuery> = chunks.iter().map(|c| query.with_range(c)).collect();
        let results = run_bounded(
            queries,
            DEFAULT_CONCURRENCY,
            |chunk_query, index| async move {
                // Stagger launches so the burst of bulk posts does not land
                // on the service at once
                sleep(CHUNK_STAGGER * index as u32).await;
                self.fetch_usage(path, &chunk_query).await
            },
            |_, _, _| {},
        )
        .await;

        let mut records = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(mut chunk_records) => {
                    debug!(chunk = index + 1, records = chunk_records.len(), "chunk fetched");
                    records.append(&mut chunk_records);
                }
                Err(e) => {
                    warn!(chunk = index + 1, error = %e, "chunk failed, skipping its window");
                }
            }
        }
        Ok(records)
    }

    /// Fetch playbook metadata for name and parent resolution
    pub async fn load_metadata(&self) -> Result<Vec<ItemMetadata>> {
        let payload = self.get_json(METADATA_PATH).await?;
        match payload {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect()),
            _ => {
                warn!("metadata payload was not an array, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Fetch the tenant id → name map
    pub async fn load_tenant_names(&self) -> Result<BTreeMap<String, String>> {
        let payload = self.get_json(TENANTS_PATH).await?;
        let mut names = BTreeMap::new();
        if let Some(models) = payload.get("viewModels").and_then(Value::as_array) {
            for model in models {
                if let (Some(id), Some(name)) = (
                    model.get("id").and_then(Value::as_str),
                    model.get("name").and_then(Value::as_str),
                ) {
                    names.insert(id.to_string(), name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Fetch prompt-assistant usage for the window
    pub async fn load_prompt_usage(&self, range: &DateRange) -> Result<PromptUsage> {
        let path = format!(
            "{}?startDate={}&endDate={}",
            PROMPT_USAGE_PATH,
            range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            range.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let payload = self.get_json(&path).await?;
        Ok(serde_json::from_value(payload).unwrap_or_default())
    }

    /// Backfill display names from each tenant's installed solutions and
    /// components.
    ///
    /// Tenants are queried through the bounded runner; a tenant whose lookup
    /// fails contributes nothing and the rest still land.
    pub async fn backfill_component_names(
        &self,
        tenant_ids: &[String],
        names: &mut BTreeMap<String, String>,
    ) -> usize {
        let results = run_bounded(
            tenant_ids.to_vec(),
            DEFAULT_CONCURRENCY,
            |tenant_id, _| async move {
                self.get_json(&format!("/api/solutions?tenantId={tenant_id}")).await
            },
            |_, _, _| {},
        )
        .await;

        let mut failed = 0usize;
        for (tenant_id, result) in tenant_ids.iter().zip(results) {
            match result {
                Ok(Value::Array(solutions)) => {
                    for solution in solutions {
                        if let (Some(id), Some(name)) = (
                            solution.get("id").and_then(Value::as_str),
                            solution.get("name").and_then(Value::as_str),
                        ) {
                            names.insert(id.to_string(), normalize_display_name(name));
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    warn!(%tenant_id, error = %e, "component name lookup failed for tenant");
                }
            }
        }
        failed
    }
}

/// Turn a usage payload into records; non-array payloads are empty
pub fn records_from_payload(payload: Value) -> Vec<UsageRecord> {
    match payload {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => {
            warn!("usage payload was not an array, treating as empty");
            Vec::new()
        }
    }
}

/// Display name for a metadata entry: flows show their flow name, everything
/// else the playbook name, normalized either way
pub fn display_name(metadata: &ItemMetadata) -> String {
    let raw = match metadata.playbook_type.as_deref() {
        Some("flow") => metadata
            .flow_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&metadata.name),
        _ => &metadata.name,
    };
    normalize_display_name(raw)
}

/// Parent grouping name for a metadata entry
pub fn parent_name(metadata: &ItemMetadata) -> String {
    match metadata.playbook_type.as_deref() {
        Some("classic") => "Classic".to_string(),
        Some("flow") => normalize_display_name(&metadata.name),
        Some("component") => "Component".to_string(),
        Some(other) => other.to_string(),
        None => "Unknown".to_string(),
    }
}
