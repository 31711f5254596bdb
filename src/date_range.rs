//! Query-window derivation and range chunking
//!
//! The query window is the single source of truth for every fetch in one
//! aggregation pass: it always ends at yesterday 23:59:59.999 UTC and starts
//! `lookback_days` before that at 00:00:00.000 UTC. Windows longer than the
//! chunk threshold are split into contiguous sub-windows so individual
//! requests stay small enough for the upstream service.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Lookback windows above this many days are fetched in chunks
pub const CHUNK_SIZE_DAYS: i64 = 90;

/// An inclusive query window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Window start (00:00:00.000 UTC)
    pub start: DateTime<Utc>,
    /// Window end (23:59:59.999 UTC)
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Derive the query window for a lookback period, anchored at `now`.
    ///
    /// End = yesterday end-of-day UTC; start = (yesterday − lookback_days)
    /// start-of-day UTC.
    pub fn from_lookback_at(now: DateTime<Utc>, lookback_days: u32) -> Self {
        let yesterday = now.date_naive() - Duration::days(1);
        let end = Utc
            .from_utc_datetime(&yesterday.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default());
        let start_day = yesterday - Duration::days(i64::from(lookback_days));
        let start =
            Utc.from_utc_datetime(&start_day.and_hms_milli_opt(0, 0, 0, 0).unwrap_or_default());
        Self { start, end }
    }

    /// Derive the query window for a lookback period anchored at the current
    /// time
    pub fn from_lookback(lookback_days: u32) -> Self {
        Self::from_lookback_at(Utc::now(), lookback_days)
    }

    /// Split this range into contiguous, non-overlapping sub-windows of at
    /// most `chunk_days` days; the last window is clipped to `end`.
    ///
    /// The union of the returned windows exactly covers `[start, end]`: each
    /// window starts one millisecond after the previous one ends.
    pub fn chunks(&self, chunk_days: i64) -> Vec<DateRange> {
        let mut windows = Vec::new();
        let step = Duration::days(chunk_days);
        let mut current_start = self.start;
        while current_start <= self.end {
            let tentative_end = current_start + step - Duration::milliseconds(1);
            let current_end = tentative_end.min(self.end);
            windows.push(DateRange { start: current_start, end: current_end });
            current_start = current_end + Duration::milliseconds(1);
        }
        windows
    }

    /// Whether this range needs chunked fetching
    pub fn needs_chunking(&self) -> bool {
        self.end - self.start > Duration::days(CHUNK_SIZE_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_anchored_at_yesterday() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let range = DateRange::from_lookback_at(now, 7);

        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 59).unwrap() + Duration::milliseconds(999));
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_short_window_is_single_chunk() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let range = DateRange::from_lookback_at(now, 30);
        assert!(!range.needs_chunking());

        let chunks = range.chunks(CHUNK_SIZE_DAYS);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], range);
    }

    #[test]
    fn test_chunks_are_contiguous_and_cover_range() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let range = DateRange::from_lookback_at(now, 365);
        assert!(range.needs_chunking());

        let chunks = range.chunks(CHUNK_SIZE_DAYS);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.first().map(|c| c.start), Some(range.start));
        assert_eq!(chunks.last().map(|c| c.end), Some(range.end));

        for pair in chunks.windows(2) {
            // No gap, no overlap: next starts exactly 1ms after previous ends
            assert_eq!(pair[1].start, pair[0].end + Duration::milliseconds(1));
        }
        for chunk in &chunks {
            assert!(chunk.end - chunk.start <= Duration::days(CHUNK_SIZE_DAYS));
            assert!(chunk.start <= chunk.end);
        }
    }

    #[test]
    fn test_chunk_count_matches_ceiling() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        // 181 days of data spanning start-of-day to end-of-day
        let range = DateRange::from_lookback_at(now, 180);
        let chunks = range.chunks(90);
        let total_days = (range.end - range.start).num_days() + 1;
        let expected = (total_days + 89) / 90;
        assert_eq!(chunks.len() as i64, expected);
    }
}
