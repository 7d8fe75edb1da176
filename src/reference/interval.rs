use std::collections::HashMap;

use crate::site::ChromKey;

/// Closed, 1-based annotation interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// First covered base.
    pub begin: u64,
    /// Last covered base.
    pub end: u64,
    /// Annotation class, e.g. `SINE/Alu` or `CDS`.
    pub kind: String,
}

impl Interval {
    /// Construct an interval.
    pub fn new(begin: u64, end: u64, kind: &str) -> Self {
        Self {
            begin,
            end,
            kind: kind.to_string(),
        }
    }

    /// Whether `position` lies inside the interval.
    pub fn contains(&self, position: u64) -> bool {
        self.begin <= position && position <= self.end
    }
}

#[derive(Debug, Default)]
struct ChromIntervals {
    // Sorted by begin.
    intervals: Vec<Interval>,
    // max_end[i] = max(intervals[..=i].end)
    max_end: Vec<u64>,
}

/// Per-chromosome interval lists supporting point-containment queries.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    by_chrom: HashMap<ChromKey, ChromIntervals>,
}

/// Accumulates intervals before sorting them into an [`IntervalIndex`].
#[derive(Debug, Default)]
pub struct IntervalIndexBuilder {
    by_chrom: HashMap<ChromKey, Vec<Interval>>,
}

impl IntervalIndexBuilder {
    /// Add an interval on `chrom`.
    pub fn push(&mut self, chrom: &str, interval: Interval) {
        self.by_chrom
            .entry(ChromKey::new(chrom))
            .or_default()
            .push(interval);
    }

    /// Sort and index.
    pub fn build(self) -> IntervalIndex {
        let by_chrom = self
            .by_chrom
            .into_iter()
            .map(|(chrom, mut intervals)| {
                intervals.sort_by_key(|iv| (iv.begin, iv.end));
                let mut running = 0;
                let max_end = intervals
                    .iter()
                    .map(|iv| {
                        running = running.max(iv.end);
                        running
                    })
                    .collect();
                (chrom, ChromIntervals { intervals, max_end })
            })
            .collect();
        IntervalIndex { by_chrom }
    }
}

impl IntervalIndex {
    /// Start an empty builder.
    pub fn builder() -> IntervalIndexBuilder {
        IntervalIndexBuilder::default()
    }

    /// Number of indexed intervals.
    pub fn len(&self) -> usize {
        self.by_chrom.values().map(|c| c.intervals.len()).sum()
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every interval on `chrom` containing `position`.
    pub fn covering(&self, chrom: &ChromKey, position: u64) -> Vec<&Interval> {
        let Some(entry) = self.by_chrom.get(chrom) else {
            return Vec::new();
        };
        // Candidates begin at or before the position; walk left until no
        // earlier interval can reach it.
        let upper = entry.intervals.partition_point(|iv| iv.begin <= position);
        let mut hits = Vec::new();
        for i in (0..upper).rev() {
            if entry.max_end[i] < position {
                break;
            }
            if entry.intervals[i].contains(position) {
                hits.push(&entry.intervals[i]);
            }
        }
        hits
    }

    /// All interval boundaries (begin and end coordinates).
    pub fn boundaries(&self) -> BoundaryIndex {
        let by_chrom = self
            .by_chrom
            .iter()
            .map(|(chrom, entry)| {
                let mut points: Vec<u64> = entry
                    .intervals
                    .iter()
                    .flat_map(|iv| [iv.begin, iv.end])
                    .collect();
                points.sort_unstable();
                points.dedup();
                (chrom.clone(), points)
            })
            .collect();
        BoundaryIndex { by_chrom }
    }
}

/// Sorted boundary coordinates per chromosome.
#[derive(Debug, Default)]
pub struct BoundaryIndex {
    by_chrom: HashMap<ChromKey, Vec<u64>>,
}

impl BoundaryIndex {
    /// Whether any boundary on `chrom` lies within `edge` bases of `position`.
    pub fn near(&self, chrom: &ChromKey, position: u64, edge: u64) -> bool {
        let Some(points) = self.by_chrom.get(chrom) else {
            return false;
        };
        let low = position.saturating_sub(edge);
        let high = position.saturating_add(edge);
        let first = points.partition_point(|&p| p < low);
        points.get(first).is_some_and(|&p| p <= high)
    }
}
