use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::partition::{self, PartitionPlan};
use crate::primality;
use crate::shared_types::{Interval, PrimeCount, WorkerIndex};
use crate::transport::{ResultSender, ResultTransport, TransportMode, WorkerFailure, WorkerHandle};

/// Smallest integer of the counted domain `[2, limit]`.
const DOMAIN_START: u64 = 2;

pub(crate) struct ParallelPreferences {
    pub(crate) limit: u64,
    /// 0 means one worker per available processing unit.
    pub(crate) worker_hint: usize,
    pub(crate) transport: TransportMode,
}

/// Aggregate of one parallel run. Failed workers contribute 0 to `total`
/// and are listed in `failures`.
#[derive(Debug, Default)]
pub(crate) struct ParallelCount {
    pub(crate) total: PrimeCount,
    pub(crate) workers: usize,
    pub(crate) failures: Vec<(WorkerIndex, WorkerFailure)>,
}

#[derive(Error, Debug)]
#[error("{failed} of {workers} workers failed, partial total is {partial}")]
pub(crate) struct DegradedRun {
    pub(crate) failed: usize,
    pub(crate) workers: usize,
    pub(crate) partial: PrimeCount,
}

impl ParallelCount {
    pub(crate) fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    /// All-or-nothing view of the run.
    pub(crate) fn strict(self) -> Result<PrimeCount, DegradedRun> {
        if self.is_degraded() {
            return Err(DegradedRun {
                failed: self.failures.len(),
                workers: self.workers,
                partial: self.total,
            });
        }
        Ok(self.total)
    }
}

/// Picks the number of workers: the hint when positive, otherwise the host's
/// available parallelism (1 if unknown). Never more than the `limit - 1`
/// integers in `[2, limit]`, never zero.
pub(crate) fn resolve_worker_count(limit: u64, worker_hint: usize) -> usize {
    let requested = if worker_hint > 0 {
        worker_hint
    } else {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    };
    let items = usize::try_from(limit.saturating_sub(1)).unwrap_or(usize::MAX);
    requested.min(items).max(1)
}

/// Counts primes in `[2, limit]` across independent workers and sums their
/// partial results. `s_progress`, when given, receives the number of integers
/// each worker scanned once it finishes.
pub(crate) async fn count_parallel(
    prefs: ParallelPreferences,
    s_progress: Option<mpsc::Sender<u64>>,
) -> ParallelCount {
    if prefs.limit < DOMAIN_START {
        return ParallelCount::default();
    }

    let workers = resolve_worker_count(prefs.limit, prefs.worker_hint);
    let Some(plan) = partition::partition(prefs.limit - 1, workers) else {
        warn!("could not partition [2, {}] into {workers} parts", prefs.limit);
        return ParallelCount::default();
    };
    debug!(
        "counting [2, {}] with {workers} workers over {} (bounds {:?})",
        prefs.limit,
        prefs.transport,
        plan.bounds()
    );

    run_workers(&plan, prefs.transport, primality::count_range, s_progress).await
}

/// Launches one worker per part of `plan`, each running `job` over its
/// sub-range of `[2, ..]`, and folds their results through the transport.
pub(crate) async fn run_workers<F>(
    plan: &PartitionPlan,
    mode: TransportMode,
    job: F,
    s_progress: Option<mpsc::Sender<u64>>,
) -> ParallelCount
where
    F: Fn(Interval) -> PrimeCount + Clone + Send + 'static,
{
    let workers = plan.partitions();
    let mut transport = ResultTransport::new(mode, workers);
    let mut handles = Vec::with_capacity(workers);

    for (index, range) in plan.intervals(DOMAIN_START).enumerate() {
        debug!("worker {index}: [{}, {}]", range.start, range.end);
        let handle = match transport.open_endpoint(index) {
            Ok(sender) => Ok(spawn_counting_worker(
                range,
                sender,
                job.clone(),
                s_progress.clone(),
            )),
            Err(e) => Err(WorkerFailure::Launch(e)),
        };
        handles.push(handle);
    }
    // the reporter finishes once every worker drops its clone
    drop(s_progress);

    let mut result = ParallelCount {
        workers,
        ..Default::default()
    };
    for (index, outcome) in transport.collect(handles).await.into_iter().enumerate() {
        match outcome {
            Ok(count) => result.total += count,
            Err(failure) => {
                warn!("worker {index} contributed nothing: {failure}");
                result.failures.push((index, failure));
            }
        }
    }
    debug!(
        "collected {} primes from {workers} workers over {} ({} failed)",
        result.total,
        mode,
        result.failures.len()
    );
    result
}

fn spawn_counting_worker<F>(
    range: Interval,
    sender: ResultSender,
    job: F,
    s_progress: Option<mpsc::Sender<u64>>,
) -> WorkerHandle
where
    F: Fn(Interval) -> PrimeCount + Send + 'static,
{
    tokio::spawn(async move {
        let count = tokio::task::spawn_blocking(move || job(range)).await?;
        if let Some(s_progress) = s_progress {
            s_progress.try_send(range.len()).ok();
        }
        sender.send_result(count).await.map_err(WorkerFailure::Send)
    })
}
