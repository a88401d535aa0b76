//! Decode progress reporting.
//!
//! The reporter only observes byte counts; no decode decision depends on
//! it.

/// Snapshot passed to the progress callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressInfo {
    /// Bytes consumed from the start of the stream, header included.
    pub current_bytes: u64,
    /// Total size of the stream in bytes.
    pub total_bytes: u64,
}

impl ProgressInfo {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            (self.current_bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Boxed progress callback.
pub type ProgressCallback = Box<dyn FnMut(ProgressInfo)>;

/// Counts consumed bytes and fires the callback at each granularity step.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a mut dyn FnMut(ProgressInfo)>,
    granularity: u64,
    next_report: u64,
    consumed: u64,
    total: u64,
}

impl<'a> ProgressReporter<'a> {
    /// Reporter starting at `start` bytes (usually the header size).
    pub fn new(
        callback: Option<&'a mut dyn FnMut(ProgressInfo)>,
        granularity: u64,
        start: u64,
        total: u64,
    ) -> Self {
        let granularity = granularity.max(1);
        Self {
            callback,
            granularity,
            next_report: (start / granularity + 1).saturating_mul(granularity),
            consumed: start,
            total,
        }
    }

    /// Reporter with no callback.
    pub fn silent(start: u64) -> Self {
        Self::new(None, u64::MAX, start, 0)
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Record `n` more consumed bytes.
    #[inline]
    pub fn advance(&mut self, n: u64) {
        self.consumed += n;
        if self.consumed >= self.next_report {
            self.report();
        }
    }

    fn report(&mut self) {
        self.next_report = (self.consumed / self.granularity + 1).saturating_mul(self.granularity);
        if let Some(cb) = self.callback.as_mut() {
            cb(ProgressInfo {
                current_bytes: self.consumed,
                total_bytes: self.total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_on_granularity_crossings() {
        let mut seen = Vec::new();
        let mut cb = |info: ProgressInfo| seen.push(info.current_bytes);
        {
            let mut reporter = ProgressReporter::new(Some(&mut cb as &mut dyn FnMut(ProgressInfo)), 10, 3, 100);
            reporter.advance(4); // 7
            reporter.advance(4); // 11 -> report
            reporter.advance(5); // 16
            reporter.advance(30); // 46 -> report once
            assert_eq!(reporter.consumed(), 46);
        }
        assert_eq!(seen, vec![11, 46]);
    }

    #[test]
    fn test_silent_reporter_counts() {
        let mut reporter = ProgressReporter::silent(5);
        reporter.advance(u32::MAX as u64);
        assert_eq!(reporter.consumed(), 5 + u32::MAX as u64);
    }

    #[test]
    fn test_fraction() {
        let info = ProgressInfo { current_bytes: 25, total_bytes: 100 };
        assert_eq!(info.fraction(), 0.25);
        let empty = ProgressInfo { current_bytes: 0, total_bytes: 0 };
        assert_eq!(empty.fraction(), 1.0);
    }
}
