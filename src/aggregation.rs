//! Aggregation engine
//!
//! Turns raw usage records into grouped savings rows. The pipeline per
//! invocation is fixed: group, resolve configuration, filter, partition by
//! exclusion, total, sort. Aggregation is a pure function of the records and
//! the configuration store; rows are derived values and never persisted.

use crate::config::{ConfigDefaults, ConfigStore};
use crate::types::{GrandTotal, ItemId, ItemKind, PromptUsage, UsageRecord};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Bucket label for records that carry no date
pub const TOTAL_BUCKET: &str = "total";

/// How usage records are grouped into rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One row per item id
    ItemId,
    /// One row per fully-qualified name
    Fqn,
    /// One row per tenant
    TenantId,
}

/// Sortable row column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    /// Display name, case-insensitive
    Name,
    /// Parent grouping name, case-insensitive
    ParentName,
    /// Tenant name, case-insensitive
    TenantName,
    /// Category name, case-insensitive
    CategoryName,
    /// Total run/action count
    TotalCount,
    /// Total hours saved
    TotalHours,
    /// Total dollars saved
    TotalDollars,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// Current sort selection with the column-click transition rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    /// Column rows are ordered by
    pub column: SortColumn,
    /// Order within that column
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self { column: SortColumn::TotalDollars, direction: SortDirection::Descending }
    }
}

impl SortState {
    /// Select a column: re-selecting the current column toggles direction,
    /// a different column resets to descending.
    pub fn click(self, column: SortColumn) -> Self {
        if column == self.column {
            let direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
            Self { column, direction }
        } else {
            Self { column, direction: SortDirection::Descending }
        }
    }
}

/// One aggregated savings row
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AggregatedRow {
    /// Group key (item id, fqn, tenant id, or composed action name)
    pub id: String,
    /// Display name
    pub name: String,
    /// Parent grouping name, empty when not applicable
    pub parent_name: String,
    /// Tenant display name, empty when unknown
    pub tenant_name: String,
    /// Assigned category id, empty when unassigned
    pub category: String,
    /// Assigned category display name, empty when unassigned
    pub category_name: String,
    /// Total run/action count
    pub total_count: u64,
    /// `total_count * minutes / 60`
    pub total_hours: f64,
    /// `total_hours * hourly rate`
    pub total_dollars: f64,
    /// Whether the row sits in the excluded partition
    pub is_excluded: bool,
    /// Whether any custom time/cost override applies
    pub has_custom_config: bool,
}

/// Name lookup tables consumed during row building
#[derive(Debug, Clone, Default)]
pub struct NameMaps {
    /// Item id → display name
    pub display: BTreeMap<String, String>,
    /// Item id → parent grouping name
    pub parents: BTreeMap<String, String>,
    /// Tenant id → tenant name
    pub tenants: BTreeMap<String, String>,
}

/// Parameters for one aggregation pass
#[derive(Debug, Clone)]
pub struct AggregationRequest<'a> {
    /// Which configuration map and defaults apply
    pub kind: ItemKind,
    /// Grouping key
    pub group_by: GroupBy,
    /// Defaults merged under per-item overrides
    pub defaults: ConfigDefaults,
    /// Keep only rows assigned to this category id
    pub category_filter: Option<&'a str>,
    /// Action records must match one of these types (empty means all)
    pub type_filter: &'a [String],
    /// Action records must match one of these connectors (empty means all)
    pub connector_filter: &'a [String],
    /// Row ids excluded from totals but still rendered
    pub excluded: &'a HashSet<String>,
    /// Sort selection, applied to each partition independently
    pub sort: SortState,
}

impl<'a> AggregationRequest<'a> {
    /// A request with no filters and the default sort
    pub fn new(
        kind: ItemKind,
        group_by: GroupBy,
        defaults: ConfigDefaults,
        excluded: &'a HashSet<String>,
    ) -> Self {
        Self {
            kind,
            group_by,
            defaults,
            category_filter: None,
            type_filter: &[],
            connector_filter: &[],
            excluded,
            sort: SortState::default(),
        }
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone)]
pub struct AggregationResult {
    /// Included rows first, excluded rows after, each partition sorted
    pub rows: Vec<AggregatedRow>,
    /// Fold of the included partition only
    pub grand_total: GrandTotal,
    /// Length of the included partition
    pub included_len: usize,
}

struct Group {
    count: u64,
    tenant: Option<String>,
}

/// Run one aggregation pass over `records`.
pub fn aggregate(
    records: &[UsageRecord],
    store: &ConfigStore,
    names: &NameMaps,
    request: &AggregationRequest<'_>,
) -> AggregationResult {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for record in records {
        if request.kind == ItemKind::Action && !action_record_matches(record, request) {
            continue;
        }
        let Some(key) = group_key(record, request.kind, request.group_by, names) else {
            continue;
        };
        let group = groups.entry(key).or_insert(Group { count: 0, tenant: None });
        group.count += record.count;
        if group.tenant.is_none() {
            group.tenant = record.tenant_id.clone();
        }
    }

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut grand_total = GrandTotal::default();

    for (key, group) in groups {
        let item_id = ItemId::new(key.clone());
        let effective = store.resolve(request.kind, &item_id, request.defaults);
        let category =
            store.category_of(request.kind, &item_id).unwrap_or_default().to_string();
        if let Some(filter) = request.category_filter {
            if category != filter {
                continue;
            }
        }

        let hours = group.count as f64 * effective.time / 60.0;
        let dollars = hours * effective.cost;
        let is_excluded = request.excluded.contains(&key);
        let row = AggregatedRow {
            name: row_name(&key, request.group_by, request.kind, names),
            parent_name: names.parents.get(&key).cloned().unwrap_or_default(),
            tenant_name: tenant_name(&key, group.tenant.as_deref(), request.group_by, names),
            category_name: store.category_name(&category).to_string(),
            category,
            total_count: group.count,
            total_hours: hours,
            total_dollars: dollars,
            is_excluded,
            has_custom_config: store.has_custom_config(request.kind, &item_id),
            id: key,
        };

        if is_excluded {
            excluded.push(row);
        } else {
            grand_total.primary_metric += row.total_count;
            grand_total.hours += row.total_hours;
            grand_total.dollars += row.total_dollars;
            included.push(row);
        }
    }

    sort_rows(&mut included, request.sort);
    sort_rows(&mut excluded, request.sort);
    debug!(
        included = included.len(),
        excluded = excluded.len(),
        "aggregation pass complete"
    );

    let included_len = included.len();
    let mut rows = included;
    rows.append(&mut excluded);
    AggregationResult { rows, grand_total, included_len }
}

fn action_record_matches(record: &UsageRecord, request: &AggregationRequest<'_>) -> bool {
    let type_ok = request.type_filter.is_empty()
        || record
            .record_type
            .as_deref()
            .is_some_and(|t| request.type_filter.iter().any(|f| f == t));
    let connector_ok = request.connector_filter.is_empty()
        || record
            .connector
            .as_deref()
            .is_some_and(|c| request.connector_filter.iter().any(|f| f == c));
    type_ok && connector_ok
}

fn group_key(
    record: &UsageRecord,
    kind: ItemKind,
    group_by: GroupBy,
    names: &NameMaps,
) -> Option<String> {
    if group_by == GroupBy::TenantId {
        return record.tenant_id.clone();
    }
    match kind {
        ItemKind::Action => Some(action_row_name(record, names)),
        ItemKind::Playbook => match group_by {
            GroupBy::ItemId => record.playbook_id.clone(),
            GroupBy::Fqn => record.fqn.clone().or_else(|| record.playbook_id.clone()),
            GroupBy::TenantId => unreachable!("handled above"),
        },
    }
}

/// Composed display name for one action record: connector title (or machine
/// name) plus action name, falling back to the owning playbook and type.
pub fn action_row_name(record: &UsageRecord, names: &NameMaps) -> String {
    let connector = record
        .connector_title
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(record.connector.as_deref())
        .filter(|c| !c.is_empty());
    if let (Some(connector), Some(action)) = (connector, record.action.as_deref()) {
        return format!("{connector} - {action}");
    }
    let playbook = record.playbook_id.as_deref().unwrap_or_default();
    let playbook_name = names.display.get(playbook).map(String::as_str).unwrap_or(playbook);
    format!("{} - {}", playbook_name, record.record_type.as_deref().unwrap_or_default())
}

fn row_name(key: &str, group_by: GroupBy, kind: ItemKind, names: &NameMaps) -> String {
    match (group_by, kind) {
        (GroupBy::TenantId, _) => names.tenants.get(key).cloned().unwrap_or_else(|| key.to_string()),
        // Action keys are already display names
        (_, ItemKind::Action) => key.to_string(),
        (_, ItemKind::Playbook) => {
            names.display.get(key).cloned().unwrap_or_else(|| key.to_string())
        }
    }
}

fn tenant_name(
    key: &str,
    record_tenant: Option<&str>,
    group_by: GroupBy,
    names: &NameMaps,
) -> String {
    let tenant_id = match group_by {
        GroupBy::TenantId => Some(key),
        _ => record_tenant,
    };
    match tenant_id {
        Some(id) => names.tenants.get(id).cloned().unwrap_or_else(|| id.to_string()),
        None => String::new(),
    }
}

fn sort_rows(rows: &mut [AggregatedRow], sort: SortState) {
    // Vec::sort_by is stable, so equal keys keep their grouping order
    rows.sort_by(|a, b| {
        let ordering = compare_rows(a, b, sort.column);
        match sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

fn compare_rows(a: &AggregatedRow, b: &AggregatedRow, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Name => cmp_str(&a.name, &b.name),
        SortColumn::ParentName => cmp_str(&a.parent_name, &b.parent_name),
        SortColumn::TenantName => cmp_str(&a.tenant_name, &b.tenant_name),
        SortColumn::CategoryName => cmp_str(&a.category_name, &b.category_name),
        SortColumn::TotalCount => a.total_count.cmp(&b.total_count),
        SortColumn::TotalHours => a.total_hours.total_cmp(&b.total_hours),
        SortColumn::TotalDollars => a.total_dollars.total_cmp(&b.total_dollars),
    }
}

fn cmp_str(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Distinct action type and connector values present in `records`, for
/// building filter pickers
pub fn action_filter_values(records: &[UsageRecord]) -> (Vec<String>, Vec<String>) {
    let mut types: Vec<String> = records
        .iter()
        .filter_map(|r| r.record_type.clone())
        .collect();
    types.sort();
    types.dedup();
    let mut connectors: Vec<String> = records.iter().filter_map(|r| r.connector.clone()).collect();
    connectors.sort();
    connectors.dedup();
    (types, connectors)
}

/// One day of aggregated savings, for sparkline feeds
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DailyBucket {
    /// Day bucket, or [`TOTAL_BUCKET`] for dateless records
    pub date: String,
    /// Run/action count for the day
    pub primary_metric: u64,
    /// Hours saved for the day
    pub hours: f64,
    /// Dollars saved for the day
    pub dollars: f64,
}

/// Fold records into per-day savings buckets. Records without a date land in
/// the [`TOTAL_BUCKET`] sentinel bucket.
pub fn daily_metrics(
    records: &[UsageRecord],
    store: &ConfigStore,
    names: &NameMaps,
    kind: ItemKind,
    defaults: ConfigDefaults,
) -> Vec<DailyBucket> {
    let mut buckets: BTreeMap<String, DailyBucket> = BTreeMap::new();
    for record in records {
        let config_key = match kind {
            ItemKind::Playbook => match &record.playbook_id {
                Some(id) => id.clone(),
                None => continue,
            },
            ItemKind::Action => action_row_name(record, names),
        };
        let effective = store.resolve(kind, &ItemId::new(config_key), defaults);
        let hours = record.count as f64 * effective.time / 60.0;
        let date = record.date.clone().unwrap_or_else(|| TOTAL_BUCKET.to_string());

        let bucket = buckets.entry(date.clone()).or_insert(DailyBucket {
            date,
            primary_metric: 0,
            hours: 0.0,
            dollars: 0.0,
        });
        bucket.primary_metric += record.count;
        bucket.hours += hours;
        bucket.dollars += hours * effective.cost;
    }
    buckets.into_values().collect()
}

/// Grand total for prompt-assistant usage using the prompt defaults
pub fn prompt_grand_total(usage: &PromptUsage, defaults: ConfigDefaults) -> GrandTotal {
    let hours = usage.total as f64 * defaults.time / 60.0;
    GrandTotal { primary_metric: usage.total, hours, dollars: hours * defaults.cost }
}

/// Savings rolled up per category for reporting
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryRollup {
    /// Category id, empty for the unassigned bucket
    pub category_id: String,
    /// Category display name, "No Category" for the unassigned bucket
    pub category_name: String,
    /// Run/action count in the category
    pub runs: u64,
    /// Hours saved in the category
    pub hours: f64,
    /// Dollars saved in the category
    pub dollars: f64,
    /// License cost allocated to the category (action rollups only)
    pub license_cost: f64,
    /// Share of the whole, 0..=100
    pub percentage: f64,
}

/// Display name for rows with no category assignment
pub const NO_CATEGORY: &str = "No Category";

fn fold_by_category(rows: &[AggregatedRow], store: &ConfigStore) -> Vec<CategoryRollup> {
    let mut folded: BTreeMap<String, CategoryRollup> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_excluded) {
        // Hidden categories drop out of reports; unassigned rows stay
        if !row.category.is_empty() {
            let visible = store
                .category_set
                .iter()
                .find(|c| c.id == row.category)
                .is_some_and(|c| c.visible);
            if !visible {
                continue;
            }
        }
        let name = if row.category.is_empty() {
            NO_CATEGORY.to_string()
        } else {
            row.category_name.clone()
        };
        let rollup = folded.entry(row.category.clone()).or_insert(CategoryRollup {
            category_id: row.category.clone(),
            category_name: name,
            runs: 0,
            hours: 0.0,
            dollars: 0.0,
            license_cost: 0.0,
            percentage: 0.0,
        });
        rollup.runs += row.total_count;
        rollup.hours += row.total_hours;
        rollup.dollars += row.total_dollars;
    }
    folded.into_values().collect()
}

/// Per-category playbook rollup; percentages are shares of total runs.
pub fn playbook_rollup(rows: &[AggregatedRow], store: &ConfigStore) -> Vec<CategoryRollup> {
    let mut rollups = fold_by_category(rows, store);
    let total_runs: u64 = rollups.iter().map(|r| r.runs).sum();
    if total_runs > 0 {
        for rollup in &mut rollups {
            rollup.percentage = rollup.runs as f64 / total_runs as f64 * 100.0;
        }
    }
    rollups
}

/// Per-category action rollup; the annual license cost is allocated evenly
/// per action run, and percentages are shares of allocated cost.
pub fn action_rollup(
    rows: &[AggregatedRow],
    store: &ConfigStore,
    annual_license_cost: f64,
) -> Vec<CategoryRollup> {
    let mut rollups = fold_by_category(rows, store);
    let total_runs: u64 = rollups.iter().map(|r| r.runs).sum();
    if total_runs > 0 {
        let per_run = annual_license_cost / total_runs as f64;
        for rollup in &mut rollups {
            rollup.license_cost = per_run * rollup.runs as f64;
            if annual_license_cost > 0.0 {
                rollup.percentage = rollup.license_cost / annual_license_cost * 100.0;
            } else {
                rollup.percentage = rollup.runs as f64 / total_runs as f64 * 100.0;
            }
        }
    }
    rollups
}

/// Everything a totals computation depends on; any component change means a
/// different key
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    /// Tenant filter in effect
    pub tenant: Option<String>,
    /// Lookback window length
    pub lookback_days: u32,
    /// Default minutes per run
    pub default_time: f64,
    /// Default hourly rate
    pub default_cost: f64,
}

/// Single-slot memo for the grand total; a hit skips the whole fetch
#[derive(Debug, Default)]
pub struct TotalsCache {
    slot: Option<(CacheKey, GrandTotal)>,
}

impl TotalsCache {
    /// An empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached total for exactly this key, if present
    pub fn get(&self, key: &CacheKey) -> Option<GrandTotal> {
        match &self.slot {
            Some((cached_key, total)) if cached_key == key => Some(*total),
            _ => None,
        }
    }

    /// Store a total, replacing whatever was cached
    pub fn put(&mut self, key: CacheKey, total: GrandTotal) {
        self.slot = Some((key, total));
    }

    /// Drop the cached value
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

/// Memoized playbook grand total for cross-view display.
///
/// A cache hit for `key` returns immediately without invoking `fetch`; on a
/// miss the records are fetched, aggregated with the defaults the key
/// describes, and the resulting total is stored under `key`. Callers pass
/// the usage fetch as a closure so a hit short-circuits the network
/// entirely.
pub async fn load_total_savings<F, Fut>(
    cache: &mut TotalsCache,
    store: &ConfigStore,
    key: CacheKey,
    fetch: F,
) -> crate::error::Result<GrandTotal>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<Vec<UsageRecord>>>,
{
    if let Some(total) = cache.get(&key) {
        debug!("total savings served from cache");
        return Ok(total);
    }

    let records = fetch().await?;
    let defaults = ConfigDefaults { time: key.default_time, cost: key.default_cost };
    let excluded = HashSet::new();
    let request =
        AggregationRequest::new(ItemKind::Playbook, GroupBy::ItemId, defaults, &excluded);
    let result = aggregate(&records, store, &NameMaps::default(), &request);
    cache.put(key, result.grand_total);
    Ok(result.grand_total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(playbook_id: &str, tenant: &str, count: u64) -> UsageRecord {
        UsageRecord {
            playbook_id: Some(playbook_id.to_string()),
            tenant_id: Some(tenant.to_string()),
            count,
            ..Default::default()
        }
    }

    fn playbook_request<'a>(excluded: &'a HashSet<String>) -> AggregationRequest<'a> {
        AggregationRequest::new(
            ItemKind::Playbook,
            GroupBy::ItemId,
            ConfigDefaults::playbook(),
            excluded,
        )
    }

    #[test]
    fn test_group_and_compute_with_defaults() {
        let records = vec![record("pb-1", "t1", 6), record("pb-1", "t1", 6), record("pb-2", "t1", 12)];
        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let result =
            aggregate(&records, &store, &NameMaps::default(), &playbook_request(&excluded));

        assert_eq!(result.rows.len(), 2);
        let pb1 = result.rows.iter().find(|r| r.id == "pb-1").unwrap();
        assert_eq!(pb1.total_count, 12);
        assert!((pb1.total_hours - 1.0).abs() < 1e-9);
        assert!((pb1.total_dollars - 50.0).abs() < 1e-9);
        // Unassigned category renders empty
        assert_eq!(pb1.category_name, "");
    }

    #[test]
    fn test_exclusion_partition_and_grand_total() {
        let records = vec![record("pb-1", "t1", 60), record("pb-2", "t1", 30), record("pb-3", "t1", 10)];
        let store = ConfigStore::new();
        let excluded: HashSet<String> = ["pb-1".to_string()].into_iter().collect();
        let result =
            aggregate(&records, &store, &NameMaps::default(), &playbook_request(&excluded));

        // result = included ++ excluded, lengths preserved
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.included_len, 2);
        assert!(result.rows[..2].iter().all(|r| !r.is_excluded));
        assert!(result.rows[2].is_excluded);
        assert_eq!(result.rows[2].id, "pb-1");

        // Grand total folds included rows only (40 runs at 5min/$50)
        assert_eq!(result.grand_total.primary_metric, 40);
        assert!((result.grand_total.hours - 40.0 * 5.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_filter_drops_rows_before_totaling() {
        let records = vec![record("pb-1", "t1", 10), record("pb-2", "t1", 20)];
        let mut store = ConfigStore::new();
        store.set_category_manual(
            ItemKind::Playbook,
            ItemId::new("pb-1"),
            Some("threat-hunting".to_string()),
        );
        let excluded = HashSet::new();
        let mut request = playbook_request(&excluded);
        request.category_filter = Some("threat-hunting");

        let result = aggregate(&records, &store, &NameMaps::default(), &request);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].id, "pb-1");
        assert_eq!(result.grand_total.primary_metric, 10);
    }

    #[test]
    fn test_sort_click_transitions() {
        let sort = SortState::default();
        assert_eq!(sort.column, SortColumn::TotalDollars);
        assert_eq!(sort.direction, SortDirection::Descending);

        let toggled = sort.click(SortColumn::TotalDollars);
        assert_eq!(toggled.direction, SortDirection::Ascending);
        // Double toggle restores the original direction
        assert_eq!(toggled.click(SortColumn::TotalDollars), sort);

        // A new column resets to descending
        let switched = toggled.click(SortColumn::Name);
        assert_eq!(switched.column, SortColumn::Name);
        assert_eq!(switched.direction, SortDirection::Descending);
    }

    #[test]
    fn test_string_sort_is_case_insensitive() {
        let records = vec![record("alpha", "t1", 1), record("Beta", "t1", 1), record("gamma", "t1", 1)];
        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let mut request = playbook_request(&excluded);
        request.sort = SortState { column: SortColumn::Name, direction: SortDirection::Ascending };

        let result = aggregate(&records, &store, &NameMaps::default(), &request);
        let order: Vec<&str> = result.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["alpha", "Beta", "gamma"]);
    }

    #[test]
    fn test_action_rows_group_by_composed_name() {
        let action = UsageRecord {
            playbook_id: Some("pb-1".to_string()),
            tenant_id: Some("t1".to_string()),
            count: 30,
            connector: Some("virustotal".to_string()),
            connector_title: Some("VirusTotal".to_string()),
            action: Some("scan_file".to_string()),
            record_type: Some("integration".to_string()),
            ..Default::default()
        };
        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let request = AggregationRequest::new(
            ItemKind::Action,
            GroupBy::ItemId,
            ConfigDefaults::action(),
            &excluded,
        );
        let result =
            aggregate(&[action.clone(), action], &store, &NameMaps::default(), &request);

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].name, "VirusTotal - scan_file");
        assert_eq!(result.rows[0].total_count, 60);
        // 60 actions at 1 min = 1 hour
        assert!((result.rows[0].total_hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_action_type_filter() {
        let mut integration = UsageRecord {
            playbook_id: Some("pb-1".to_string()),
            count: 5,
            connector: Some("jira".to_string()),
            action: Some("create_issue".to_string()),
            record_type: Some("integration".to_string()),
            ..Default::default()
        };
        let mut transformation = integration.clone();
        transformation.record_type = Some("transformation".to_string());
        transformation.action = Some("map_fields".to_string());
        integration.count = 5;

        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let type_filter = vec!["integration".to_string()];
        let mut request = AggregationRequest::new(
            ItemKind::Action,
            GroupBy::ItemId,
            ConfigDefaults::action(),
            &excluded,
        );
        request.type_filter = &type_filter;

        let result =
            aggregate(&[integration, transformation], &store, &NameMaps::default(), &request);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].name, "jira - create_issue");
    }

    #[test]
    fn test_filter_value_collection() {
        let records = vec![
            UsageRecord {
                record_type: Some("integration".to_string()),
                connector: Some("jira".to_string()),
                ..Default::default()
            },
            UsageRecord {
                record_type: Some("integration".to_string()),
                connector: Some("slack".to_string()),
                ..Default::default()
            },
        ];
        let (types, connectors) = action_filter_values(&records);
        assert_eq!(types, vec!["integration"]);
        assert_eq!(connectors, vec!["jira", "slack"]);
    }

    #[test]
    fn test_daily_metrics_sentinel_bucket() {
        let mut dated = record("pb-1", "t1", 12);
        dated.date = Some("2024-03-01".to_string());
        let dateless = record("pb-1", "t1", 6);

        let store = ConfigStore::new();
        let buckets = daily_metrics(
            &[dated, dateless],
            &store,
            &NameMaps::default(),
            ItemKind::Playbook,
            ConfigDefaults::playbook(),
        );

        assert_eq!(buckets.len(), 2);
        let day = buckets.iter().find(|b| b.date == "2024-03-01").unwrap();
        assert!((day.hours - 1.0).abs() < 1e-9);
        assert!(buckets.iter().any(|b| b.date == TOTAL_BUCKET && b.primary_metric == 6));
    }

    #[test]
    fn test_prompt_grand_total() {
        let usage = PromptUsage { total: 90, per_day: Vec::new() };
        let total = prompt_grand_total(&usage, ConfigDefaults::prompt());
        assert_eq!(total.primary_metric, 90);
        assert!((total.hours - 3.0).abs() < 1e-9);
        assert!((total.dollars - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_playbook_rollup_percentages_by_runs() {
        let records = vec![record("pb-1", "t1", 75), record("pb-2", "t1", 25)];
        let mut store = ConfigStore::new();
        store.set_category_manual(
            ItemKind::Playbook,
            ItemId::new("pb-1"),
            Some("detection-analysis".to_string()),
        );
        let excluded = HashSet::new();
        let result =
            aggregate(&records, &store, &NameMaps::default(), &playbook_request(&excluded));

        let rollups = playbook_rollup(&result.rows, &store);
        assert_eq!(rollups.len(), 2);
        let detection =
            rollups.iter().find(|r| r.category_id == "detection-analysis").unwrap();
        assert!((detection.percentage - 75.0).abs() < 1e-9);
        let none = rollups.iter().find(|r| r.category_id.is_empty()).unwrap();
        assert_eq!(none.category_name, NO_CATEGORY);
        assert!((none.percentage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_hidden_category_dropped_from_rollups() {
        let records = vec![record("pb-1", "t1", 10), record("pb-2", "t1", 10)];
        let mut store = ConfigStore::new();
        store.set_category_manual(
            ItemKind::Playbook,
            ItemId::new("pb-1"),
            Some("testing-validation".to_string()),
        );
        store.toggle_category_visibility("testing-validation").unwrap();
        let excluded = HashSet::new();
        let result =
            aggregate(&records, &store, &NameMaps::default(), &playbook_request(&excluded));

        let rollups = playbook_rollup(&result.rows, &store);
        assert!(rollups.iter().all(|r| r.category_id != "testing-validation"));
        assert!(rollups.iter().any(|r| r.category_name == NO_CATEGORY));
    }

    #[test]
    fn test_action_rollup_license_allocation() {
        let store = ConfigStore::new();
        let rows = vec![
            AggregatedRow {
                id: "a".to_string(),
                name: "a".to_string(),
                parent_name: String::new(),
                tenant_name: String::new(),
                category: String::new(),
                category_name: String::new(),
                total_count: 80,
                total_hours: 1.0,
                total_dollars: 50.0,
                is_excluded: false,
                has_custom_config: false,
            },
            AggregatedRow {
                id: "b".to_string(),
                name: "b".to_string(),
                parent_name: String::new(),
                tenant_name: String::new(),
                category: "response-remediation".to_string(),
                category_name: "Response/Remediation".to_string(),
                total_count: 20,
                total_hours: 0.5,
                total_dollars: 25.0,
                is_excluded: false,
                has_custom_config: false,
            },
        ];

        let rollups = action_rollup(&rows, &store, 1000.0);
        let remediation =
            rollups.iter().find(|r| r.category_id == "response-remediation").unwrap();
        assert!((remediation.license_cost - 200.0).abs() < 1e-9);
        assert!((remediation.percentage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_cache_hit_and_invalidate() {
        let mut cache = TotalsCache::new();
        let key = CacheKey {
            tenant: Some("t1".to_string()),
            lookback_days: 30,
            default_time: 5.0,
            default_cost: 50.0,
        };
        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), GrandTotal { primary_metric: 10, hours: 1.0, dollars: 50.0 });
        assert!(cache.get(&key).is_some());

        // Any key component change misses
        let other = CacheKey { lookback_days: 90, ..key.clone() };
        assert!(cache.get(&other).is_none());

        cache.invalidate();
        assert!(cache.get(&key).is_none());
    }
}
