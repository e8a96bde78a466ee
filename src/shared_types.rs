/// Inclusive range of integers `[start, end]`. Empty when `end < start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interval {
    pub(crate) start: u64,
    pub(crate) end: u64,
}

impl Interval {
    pub(crate) fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// An empty interval positioned at `start` (at 1 when `start` is 0).
    pub(crate) fn empty_at(start: u64) -> Self {
        let start = start.max(1);
        Self {
            start,
            end: start - 1,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub(crate) fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).saturating_add(1)
        }
    }
}

pub(crate) type PrimeCount = u64;
pub(crate) type WorkerIndex = usize;
