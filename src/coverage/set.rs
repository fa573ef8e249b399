//! Sorted, merged interval set.

use crate::error::Result;
use crate::types::{check_range, Interval};

/// Per-channel record of which time ranges are cached.
///
/// Intervals are kept sorted by `start`; no two stored intervals overlap or
/// touch. Merging binary-searches for the run of intervals it absorbs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntervalCoverage {
    intervals: Vec<Interval>,
}

impl IntervalCoverage {
    /// Create an empty coverage set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from already-normalized intervals (used when loading from disk).
    pub(crate) fn from_sorted(intervals: Vec<Interval>) -> Self {
        let mut coverage = Self::new();
        // Re-merging keeps the invariant even if the file was hand edited.
        for iv in intervals {
            if iv.start < iv.end {
                coverage.merge(iv.start, iv.end);
            }
        }
        coverage
    }

    /// Mark `[start, end)` as loaded.
    ///
    /// Any stored interval that overlaps or touches the new range is absorbed
    /// into a single merged interval. `start == end` is a no-op.
    pub fn mark_loaded(&mut self, start: f64, end: f64) -> Result<()> {
        check_range(start, end)?;
        if start == end {
            return Ok(());
        }
        self.merge(start, end);
        Ok(())
    }

    fn merge(&mut self, start: f64, end: f64) {
        // Matched intervals form one contiguous run: end >= start and start <= end.
        let lo = self.intervals.partition_point(|iv| iv.end < start);
        let hi = self.intervals.partition_point(|iv| iv.start <= end);

        let mut merged = Interval { start, end };
        if lo < hi {
            merged.start = merged.start.min(self.intervals[lo].start);
            merged.end = merged.end.max(self.intervals[hi - 1].end);
        }

        self.intervals.splice(lo..hi, std::iter::once(merged));
    }

    /// Gaps inside `[start, end)` not covered by any stored interval.
    ///
    /// Gaps are ascending and clipped to the requested range. A fully covered
    /// range yields an empty vector.
    pub fn unloaded_ranges(&self, start: f64, end: f64) -> Result<Vec<Interval>> {
        check_range(start, end)?;

        let mut gaps = Vec::new();
        if start == end {
            return Ok(gaps);
        }

        let mut cursor = start;
        for iv in self.overlapping(start, end) {
            if iv.start > cursor {
                gaps.push(Interval {
                    start: cursor,
                    end: iv.start,
                });
            }
            if iv.end > cursor {
                cursor = iv.end;
            }
            if cursor >= end {
                break;
            }
        }

        if cursor < end {
            gaps.push(Interval { start: cursor, end });
        }

        Ok(gaps)
    }

    /// Stored coverage inside `[start, end)`, clipped to the range.
    pub fn covered_within(&self, start: f64, end: f64) -> Result<Vec<Interval>> {
        check_range(start, end)?;
        Ok(self
            .overlapping(start, end)
            .map(|iv| Interval {
                start: iv.start.max(start),
                end: iv.end.min(end),
            })
            .collect())
    }

    /// True if `[start, end)` has no gaps.
    pub fn is_covered(&self, start: f64, end: f64) -> Result<bool> {
        Ok(self.unloaded_ranges(start, end)?.is_empty())
    }

    /// Stored intervals, ascending.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Intervals with a non-empty intersection with `[start, end)`.
    fn overlapping(&self, start: f64, end: f64) -> impl Iterator<Item = &Interval> {
        let lo = self.intervals.partition_point(|iv| iv.end <= start);
        self.intervals[lo..]
            .iter()
            .take_while(move |iv| iv.start < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    fn pairs(intervals: &[Interval]) -> Vec<(f64, f64)> {
        intervals.iter().map(|iv| (iv.start, iv.end)).collect()
    }

    #[test]
    fn test_adjacent_intervals_merge() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(10.0, 20.0).unwrap();
        cov.mark_loaded(20.0, 30.0).unwrap();

        assert_eq!(pairs(cov.intervals()), vec![(10.0, 30.0)]);
    }

    #[test]
    fn test_gaps_between_intervals() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(10.0, 20.0).unwrap();
        cov.mark_loaded(25.0, 30.0).unwrap();

        let gaps = cov.unloaded_ranges(0.0, 40.0).unwrap();
        assert_eq!(
            pairs(&gaps),
            vec![(0.0, 10.0), (20.0, 25.0), (30.0, 40.0)]
        );
    }

    #[test]
    fn test_bridge_merges_many() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 1.0).unwrap();
        cov.mark_loaded(2.0, 3.0).unwrap();
        cov.mark_loaded(4.0, 5.0).unwrap();
        cov.mark_loaded(10.0, 11.0).unwrap();

        cov.mark_loaded(0.5, 4.5).unwrap();
        assert_eq!(pairs(cov.intervals()), vec![(0.0, 5.0), (10.0, 11.0)]);
    }

    #[test]
    fn test_insert_out_of_order_stays_sorted() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(50.0, 60.0).unwrap();
        cov.mark_loaded(10.0, 20.0).unwrap();
        cov.mark_loaded(30.0, 40.0).unwrap();

        assert_eq!(
            pairs(cov.intervals()),
            vec![(10.0, 20.0), (30.0, 40.0), (50.0, 60.0)]
        );
    }

    #[test]
    fn test_contained_range_is_absorbed() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 100.0).unwrap();
        cov.mark_loaded(10.0, 20.0).unwrap();
        assert_eq!(pairs(cov.intervals()), vec![(0.0, 100.0)]);
    }

    #[test]
    fn test_empty_range_is_noop() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(5.0, 5.0).unwrap();
        assert!(cov.is_empty());
        assert!(cov.unloaded_ranges(5.0, 5.0).unwrap().is_empty());
    }

    #[test]
    fn test_inverted_range_rejected_without_mutation() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 10.0).unwrap();

        let result = cov.mark_loaded(30.0, 20.0);
        assert!(matches!(result, Err(CacheError::InvalidRange { .. })));
        assert_eq!(pairs(cov.intervals()), vec![(0.0, 10.0)]);

        assert!(cov.unloaded_ranges(30.0, 20.0).is_err());
    }

    #[test]
    fn test_fully_covered_has_no_gaps() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 100.0).unwrap();
        assert!(cov.unloaded_ranges(10.0, 90.0).unwrap().is_empty());
        assert!(cov.is_covered(0.0, 100.0).unwrap());
    }

    #[test]
    fn test_gaps_clipped_to_request() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 10.0).unwrap();
        cov.mark_loaded(20.0, 30.0).unwrap();

        let gaps = cov.unloaded_ranges(5.0, 25.0).unwrap();
        assert_eq!(pairs(&gaps), vec![(10.0, 20.0)]);

        let covered = cov.covered_within(5.0, 25.0).unwrap();
        assert_eq!(pairs(&covered), vec![(5.0, 10.0), (20.0, 25.0)]);
    }

    #[test]
    fn test_request_outside_coverage() {
        let mut cov = IntervalCoverage::new();
        cov.mark_loaded(0.0, 10.0).unwrap();

        let gaps = cov.unloaded_ranges(10.0, 20.0).unwrap();
        assert_eq!(pairs(&gaps), vec![(10.0, 20.0)]);
    }
}
