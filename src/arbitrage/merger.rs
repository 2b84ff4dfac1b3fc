// src/arbitrage/merger.rs
//! K-way merge of per-provider price series into one chronological timeline.

use crate::pricing::{PriceObservation, PriceSeries};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Heap key. Field order is the ordering: timestamp first, then the series'
/// position in the input slice (provider priority), then the position inside
/// that series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MergeKey {
    timestamp: DateTime<Utc>,
    series_index: usize,
    position: usize,
}

/// Lazy, globally non-decreasing view over N sorted series.
///
/// Borrows its inputs and never mutates them; merging the same slice again
/// yields the same sequence.
#[derive(Debug)]
pub struct MergedTimeline<'a> {
    series: &'a [PriceSeries],
    heap: BinaryHeap<Reverse<MergeKey>>,
    remaining: usize,
}

impl<'a> MergedTimeline<'a> {
    pub fn new(series: &'a [PriceSeries]) -> Self {
        let mut heap = BinaryHeap::with_capacity(series.len());
        for (series_index, s) in series.iter().enumerate() {
            if let Some(first) = s.observations().first() {
                heap.push(Reverse(MergeKey {
                    timestamp: first.timestamp(),
                    series_index,
                    position: 0,
                }));
            }
        }
        Self {
            series,
            heap,
            remaining: series.iter().map(PriceSeries::len).sum(),
        }
    }
}

impl<'a> Iterator for MergedTimeline<'a> {
    type Item = &'a PriceObservation;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(key) = self.heap.pop()?;
        let observations = self.series[key.series_index].observations();

        let next_position = key.position + 1;
        if let Some(next) = observations.get(next_position) {
            self.heap.push(Reverse(MergeKey {
                timestamp: next.timestamp(),
                series_index: key.series_index,
                position: next_position,
            }));
        }

        self.remaining -= 1;
        Some(&observations[key.position])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for MergedTimeline<'_> {}

/// Convenience entry point.
pub fn merge(series: &[PriceSeries]) -> MergedTimeline<'_> {
    MergedTimeline::new(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn series(provider: &str, points: &[(i64, f64)]) -> PriceSeries {
        let obs = points
            .iter()
            .map(|(t, p)| PriceObservation::new(provider, *p, ts(*t)).unwrap())
            .collect();
        PriceSeries::new(provider, obs).unwrap()
    }

    #[test]
    fn test_interleaves_by_timestamp() {
        let inputs = vec![
            series("a", &[(0, 1.0), (2, 0.5), (7, 0.9)]),
            series("b", &[(1, 0.8), (3, 0.2)]),
        ];
        let order: Vec<(String, i64)> = merge(&inputs)
            .map(|o| (o.provider().to_string(), o.timestamp().timestamp()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 3),
                ("a".to_string(), 7),
            ]
        );
    }

    #[test]
    fn test_simultaneous_timestamps_follow_series_order() {
        let inputs = vec![
            series("a", &[(5, 1.0), (5, 1.1)]),
            series("b", &[(5, 2.0)]),
        ];
        let prices: Vec<f64> = merge(&inputs).map(|o| o.price()).collect();
        assert_eq!(prices, vec![1.0, 1.1, 2.0]);
    }

    #[test]
    fn test_empty_inputs_are_skipped() {
        let inputs = vec![
            PriceSeries::empty("a"),
            series("b", &[(1, 0.3)]),
            PriceSeries::empty("c"),
        ];
        let merged: Vec<_> = merge(&inputs).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provider().as_str(), "b");

        let none: Vec<PriceSeries> = vec![];
        assert_eq!(merge(&none).count(), 0);
    }

    #[test]
    fn test_restartable_and_exact_size() {
        let inputs = vec![series("a", &[(0, 1.0), (4, 2.0)]), series("b", &[(2, 3.0)])];
        let first: Vec<_> = merge(&inputs).cloned().collect();
        let second: Vec<_> = merge(&inputs).cloned().collect();
        assert_eq!(first, second);
        assert_eq!(merge(&inputs).len(), 3);
    }
}
