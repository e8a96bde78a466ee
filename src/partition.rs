use crate::shared_types::{Interval, WorkerIndex};

/// Boundary offsets splitting `interval` items into contiguous parts.
///
/// `bounds[0] == 0` and `bounds[partitions] == interval`. Part sizes differ by
/// at most one; the first `interval % partitions` parts carry the extra item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PartitionPlan {
    bounds: Vec<u64>,
}

impl PartitionPlan {
    pub(crate) fn bounds(&self) -> &[u64] {
        &self.bounds
    }

    pub(crate) fn partitions(&self) -> usize {
        self.bounds.len() - 1
    }

    pub(crate) fn part_size(&self, index: WorkerIndex) -> u64 {
        self.bounds[index + 1] - self.bounds[index]
    }

    /// Sub-range of part `index` shifted by `offset`, i.e.
    /// `[offset + bounds[i], offset + bounds[i + 1] - 1]`.
    pub(crate) fn interval(&self, index: WorkerIndex, offset: u64) -> Interval {
        let start = offset + self.bounds[index];
        match self.part_size(index) {
            0 => Interval::empty_at(start),
            size => Interval::new(start, start + size - 1),
        }
    }

    pub(crate) fn intervals(&self, offset: u64) -> impl Iterator<Item = Interval> + '_ {
        (0..self.partitions()).map(move |i| self.interval(i, offset))
    }
}

/// Splits `interval` items into `partitions` near-equal parts. Returns `None`
/// when `partitions` is zero.
pub(crate) fn partition(interval: u64, partitions: usize) -> Option<PartitionPlan> {
    if partitions == 0 {
        return None;
    }
    let parts = partitions as u64;
    let base = interval / parts;
    let rem = interval % parts;

    let mut bounds = Vec::with_capacity(partitions + 1);
    bounds.push(0);
    let mut acc = 0u64;
    for i in 0..parts {
        acc += base + u64::from(i < rem);
        bounds.push(acc);
    }
    Some(PartitionPlan { bounds })
}
