//! Pure time-window planning. No I/O: the planner only turns a `[start, end]`
//! range into ordered, fixed-size batches of step-aligned timestamps.

use anyhow::{bail, Result};

/// Lazy sequence of timestamp batches over `{start, start+step, ..., end}`.
///
/// Each batch holds up to `batch_size` timestamps in ascending order; the
/// last batch may be shorter. Callers resume an interrupted range by
/// constructing a new window whose `start` is one step past the greatest
/// timestamp already persisted.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    next: u64,
    end: u64,
    step: u64,
    batch_size: usize,
    exhausted: bool,
}

impl TimeWindow {
    pub fn generate(start: u64, end: u64, step: u64, batch_size: usize) -> Result<Self> {
        if step == 0 {
            bail!("step must be greater than 0");
        }
        if end < start {
            bail!("end ({end}) must not precede start ({start})");
        }
        if batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        Ok(Self {
            next: start,
            end,
            step,
            batch_size,
            exhausted: false,
        })
    }

    /// Total number of timestamps the window will yield.
    pub fn len(&self) -> u64 {
        if self.exhausted || self.next > self.end {
            return 0;
        }
        (self.end - self.next) / self.step + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for TimeWindow {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.next > self.end {
            self.exhausted = true;
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size && self.next <= self.end {
            batch.push(self.next);
            match self.next.checked_add(self.step) {
                Some(next) => self.next = next,
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;

    #[test]
    fn yields_step_aligned_batches() {
        let window = TimeWindow::generate(1_701_950_400, 1_701_950_400 + 6 * DAY, DAY, 5)
            .expect("window must build");
        let batches: Vec<_> = window.collect();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[0][0], 1_701_950_400);
        assert_eq!(batches[1][1], 1_701_950_400 + 6 * DAY);
    }

    #[test]
    fn single_timestamp_range_yields_one_batch() {
        let window = TimeWindow::generate(100, 100, DAY, 5).unwrap();
        let batches: Vec<_> = window.collect();
        assert_eq!(batches, vec![vec![100]]);
    }

    #[test]
    fn range_not_divisible_by_step_stops_before_end() {
        let window = TimeWindow::generate(0, 250, 100, 10).unwrap();
        let batches: Vec<_> = window.collect();
        assert_eq!(batches, vec![vec![0, 100, 200]]);
    }

    #[test]
    fn len_matches_yielded_count() {
        let window = TimeWindow::generate(0, 9 * DAY, DAY, 4).unwrap();
        assert_eq!(window.len(), 10);
        let yielded: usize = window.map(|batch| batch.len()).sum();
        assert_eq!(yielded, 10);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(TimeWindow::generate(0, 10, 0, 5).is_err());
        assert!(TimeWindow::generate(10, 0, 1, 5).is_err());
        assert!(TimeWindow::generate(0, 10, 1, 0).is_err());
    }

    #[test]
    fn resumed_window_never_revisits_earlier_timestamps() {
        let full: Vec<u64> = TimeWindow::generate(0, 10 * DAY, DAY, 3)
            .unwrap()
            .flatten()
            .collect();
        let resumed: Vec<u64> = TimeWindow::generate(4 * DAY, 10 * DAY, DAY, 3)
            .unwrap()
            .flatten()
            .collect();

        assert_eq!(resumed.first(), Some(&(4 * DAY)));
        assert_eq!(&full[4..], resumed.as_slice());
    }
}
