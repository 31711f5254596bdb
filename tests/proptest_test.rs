//! Property-based tests for the chunker and the sorting rules

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use roistat::aggregation::{
    AggregationRequest, GroupBy, NameMaps, SortColumn, SortDirection, SortState, aggregate,
};
use roistat::config::{ConfigDefaults, ConfigStore};
use roistat::date_range::{CHUNK_SIZE_DAYS, DateRange};
use roistat::types::{ItemKind, UsageRecord};
use std::collections::HashSet;

fn records_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::vec(("[a-e]{1,3}", 0u64..1000), 1..40)
}

fn to_records(raw: &[(String, u64)]) -> Vec<UsageRecord> {
    raw.iter()
        .map(|(id, count)| UsageRecord {
            playbook_id: Some(id.clone()),
            count: *count,
            ..Default::default()
        })
        .collect()
}

proptest! {
    #[test]
    fn chunks_exactly_cover_any_lookback(lookback in 1u32..800) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let range = DateRange::from_lookback_at(now, lookback);
        let chunks = range.chunks(CHUNK_SIZE_DAYS);

        prop_assert!(!chunks.is_empty());
        prop_assert_eq!(chunks.first().map(|c| c.start), Some(range.start));
        prop_assert_eq!(chunks.last().map(|c| c.end), Some(range.end));
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[1].start, pair[0].end + Duration::milliseconds(1));
        }
        for chunk in &chunks {
            prop_assert!(chunk.start <= chunk.end);
            prop_assert!(chunk.end - chunk.start <= Duration::days(CHUNK_SIZE_DAYS));
        }

        let total_days = (range.end - range.start).num_days() + 1;
        let expected = (total_days + CHUNK_SIZE_DAYS - 1) / CHUNK_SIZE_DAYS;
        prop_assert_eq!(chunks.len() as i64, expected);
    }

    #[test]
    fn sorting_is_idempotent(raw in records_strategy()) {
        let records = to_records(&raw);
        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let mut request = AggregationRequest::new(
            ItemKind::Playbook,
            GroupBy::ItemId,
            ConfigDefaults::playbook(),
            &excluded,
        );
        request.sort = SortState {
            column: SortColumn::TotalCount,
            direction: SortDirection::Descending,
        };

        let first = aggregate(&records, &store, &NameMaps::default(), &request);
        let second = aggregate(&records, &store, &NameMaps::default(), &request);
        prop_assert_eq!(&first.rows, &second.rows);

        for pair in first.rows.windows(2) {
            prop_assert!(pair[0].total_count >= pair[1].total_count);
        }
    }

    #[test]
    fn double_toggle_restores_the_original_order(raw in records_strategy()) {
        let records = to_records(&raw);
        let store = ConfigStore::new();
        let excluded = HashSet::new();
        let mut request = AggregationRequest::new(
            ItemKind::Playbook,
            GroupBy::ItemId,
            ConfigDefaults::playbook(),
            &excluded,
        );

        let baseline = aggregate(&records, &store, &NameMaps::default(), &request);

        // Two clicks on the active column toggle direction there and back
        let sort = request.sort;
        request.sort = sort.click(sort.column).click(sort.column);
        prop_assert_eq!(request.sort, sort);
        let round_trip = aggregate(&records, &store, &NameMaps::default(), &request);
        prop_assert_eq!(&baseline.rows, &round_trip.rows);
    }

    #[test]
    fn partitions_stay_intact_under_any_exclusion(
        raw in records_strategy(),
        excluded_names in prop::collection::hash_set("[a-e]{1,3}", 0..6),
    ) {
        let records = to_records(&raw);
        let store = ConfigStore::new();
        let excluded: HashSet<String> = excluded_names;
        let request = AggregationRequest::new(
            ItemKind::Playbook,
            GroupBy::ItemId,
            ConfigDefaults::playbook(),
            &excluded,
        );

        let result = aggregate(&records, &store, &NameMaps::default(), &request);

        // Included rows strictly precede excluded rows
        prop_assert!(result.rows[..result.included_len].iter().all(|r| !r.is_excluded));
        prop_assert!(result.rows[result.included_len..].iter().all(|r| r.is_excluded));

        // The grand total is exactly the fold of the included partition
        let runs: u64 = result.rows[..result.included_len].iter().map(|r| r.total_count).sum();
        prop_assert_eq!(result.grand_total.primary_metric, runs);
        let hours: f64 = result.rows[..result.included_len].iter().map(|r| r.total_hours).sum();
        prop_assert!((result.grand_total.hours - hours).abs() < 1e-9);
    }
}
