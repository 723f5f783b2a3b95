//! Progress and timing.

use std::time::{Duration, Instant};

use crate::kernel::{KernelObject, Query, QueryValue, SlotCursor, Teardown};
use crate::util::Result;

/// Pure progress arithmetic, separated from the clock for testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    pub passes: usize,
    pub warmup: Duration,
    /// Passes counted as done once the current dispatch completes.
    pub done: usize,
}

impl ProgressState {
    pub fn new(passes: usize, warmup: Duration) -> Self {
        Self {
            passes,
            warmup,
            done: 0,
        }
    }

    /// Record that `pass` is about to run. It counts as done from here on.
    pub fn advance(&mut self, pass: usize) {
        self.done = (pass + 1).min(self.passes);
    }

    /// Fraction of passes done, `(pass + 1) / passes` after `pass`.
    pub fn progress(&self) -> f64 {
        self.done as f64 / self.passes.max(1) as f64
    }

    /// Remaining time given `elapsed` since the start, `None` during warm-up
    /// or before any pass ran.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        if self.done == 0 || elapsed < self.warmup {
            return None;
        }
        let left = self.passes.saturating_sub(self.done) as f64;
        Some(Duration::from_secs_f64(
            elapsed.as_secs_f64() * left / self.done as f64,
        ))
    }
}

/// Tracks elapsed and estimated remaining time. Owns no device resources.
///
/// The clock is read when queried, so a snapshot taken after a pass covers
/// that pass.
pub struct Progress {
    start: Option<Instant>,
    state: ProgressState,
}

impl Progress {
    pub const NAME: &'static str = "Progress";

    pub fn new(passes: usize, warmup: Duration) -> Self {
        Self {
            start: None,
            state: ProgressState::new(passes, warmup),
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    fn elapsed(&self) -> Duration {
        self.start.map(|s| s.elapsed()).unwrap_or_default()
    }
}

impl KernelObject for Progress {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, _cursor: &mut SlotCursor<'_>) -> Result<()> {
        self.start = Some(Instant::now());
        Ok(())
    }

    fn update(&mut self, pass: usize) -> Result<()> {
        self.start.get_or_insert_with(Instant::now);
        self.state.advance(pass);
        Ok(())
    }

    fn query(&self, query: Query) -> Option<QueryValue> {
        match query {
            Query::Progress => Some(QueryValue::Fraction(self.state.progress())),
            Query::ElapsedTime => Some(QueryValue::Seconds(self.elapsed().as_secs_f64())),
            Query::EstimatedTime => Some(match self.state.remaining(self.elapsed()) {
                Some(d) => QueryValue::Seconds(d.as_secs_f64()),
                None => QueryValue::Indeterminate,
            }),
            Query::TriangleCount => None,
        }
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let mut s = ProgressState::new(4, Duration::from_secs(5));
        assert_eq!(s.progress(), 0.0);
        s.advance(0);
        assert_eq!(s.progress(), 0.25);
        s.advance(3);
        assert_eq!(s.progress(), 1.0);
    }

    #[test]
    fn test_estimate_waits_for_warmup() {
        let mut s = ProgressState::new(10, Duration::from_secs(5));
        s.advance(1);
        assert_eq!(s.remaining(Duration::from_secs(4)), None);

        // 2 passes in 6 s, 8 left: 24 s.
        assert_eq!(s.remaining(Duration::from_secs(6)), Some(Duration::from_secs(24)));

        s.advance(9);
        assert_eq!(s.remaining(Duration::from_secs(30)), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_estimate_before_first_pass() {
        let s = ProgressState::new(2, Duration::ZERO);
        assert_eq!(s.remaining(Duration::from_secs(1)), None);
    }

    #[test]
    fn test_estimate_scales_with_pass_time() {
        // One of four passes took 2 s: three more take 6 s.
        let mut s = ProgressState::new(4, Duration::ZERO);
        s.advance(0);
        assert_eq!(s.remaining(Duration::from_secs(2)), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_elapsed_read_at_query_time() {
        let mut p = Progress::new(2, Duration::ZERO);
        p.update(0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        match p.query(Query::ElapsedTime) {
            Some(QueryValue::Seconds(s)) => assert!(s >= 0.02),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_queries() {
        let mut p = Progress::new(2, Duration::from_secs(3600));
        assert_eq!(p.query(Query::Progress), Some(QueryValue::Fraction(0.0)));
        p.update(0).unwrap();
        assert_eq!(p.query(Query::Progress), Some(QueryValue::Fraction(0.5)));
        assert_eq!(p.query(Query::EstimatedTime), Some(QueryValue::Indeterminate));
        assert!(matches!(p.query(Query::ElapsedTime), Some(QueryValue::Seconds(_))));
        assert_eq!(p.query(Query::TriangleCount), None);
    }
}
