use std::fmt;
use std::io;
use std::sync::{Arc, OnceLock};

use futures::future;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::task::{JoinError, JoinHandle};

use crate::shared_types::{PrimeCount, WorkerIndex};

const RESULT_SIZE: usize = std::mem::size_of::<PrimeCount>();

/// How partial results travel from workers back to the coordinator.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransportMode {
    #[value(name = "shm")]
    SharedMemory,
    #[value(name = "pipe")]
    Pipe,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::SharedMemory => write!(f, "shm"),
            TransportMode::Pipe => write!(f, "pipe"),
        }
    }
}

#[derive(Error, Debug)]
pub(crate) enum TransportError {
    #[error("failed to create pipe: {0}")]
    PipeCreate(io::Error),
    #[error("failed to write result: {0}")]
    Write(io::Error),
    #[error("slot {0} already holds a result")]
    SlotWritten(WorkerIndex),
    #[error("endpoint {0} was already handed out")]
    EndpointTaken(WorkerIndex),
    #[error("endpoint {index} out of range for {workers} workers")]
    OutOfRange {
        index: WorkerIndex,
        workers: usize,
    },
}

/// Why a worker contributed nothing to the total.
#[derive(Error, Debug)]
pub(crate) enum WorkerFailure {
    #[error("worker was not launched: {0}")]
    Launch(TransportError),
    #[error("worker panicked")]
    Panicked,
    #[error("worker was cancelled")]
    Cancelled,
    #[error("worker could not send its result: {0}")]
    Send(TransportError),
    #[error("short read from worker pipe: {0}")]
    ShortRead(io::Error),
    #[error("worker left its slot empty")]
    MissingResult,
}

impl From<JoinError> for WorkerFailure {
    fn from(e: JoinError) -> Self {
        if e.is_cancelled() {
            WorkerFailure::Cancelled
        } else {
            WorkerFailure::Panicked
        }
    }
}

pub(crate) type WorkerHandle = JoinHandle<Result<(), WorkerFailure>>;
pub(crate) type WorkerOutcome = Result<PrimeCount, WorkerFailure>;

/// Write capability for exactly one slot of the shared result array.
#[derive(Debug)]
pub(crate) struct SlotWriter {
    slots: Arc<[OnceLock<PrimeCount>]>,
    index: WorkerIndex,
}

impl SlotWriter {
    fn write(self, count: PrimeCount) -> Result<(), TransportError> {
        self.slots[self.index]
            .set(count)
            .map_err(|_| TransportError::SlotWritten(self.index))
    }
}

/// Write end of one worker's pipe. Dropping it closes the pipe.
#[derive(Debug)]
pub(crate) struct PipeWriter {
    sender: pipe::Sender,
}

impl PipeWriter {
    async fn write(mut self, count: PrimeCount) -> Result<(), TransportError> {
        self.sender
            .write_all(&count.to_le_bytes())
            .await
            .map_err(TransportError::Write)
    }
}

/// The only endpoint a worker ever sees.
#[derive(Debug)]
pub(crate) enum ResultSender {
    Slot(SlotWriter),
    Pipe(PipeWriter),
}

impl ResultSender {
    pub(crate) async fn send_result(self, count: PrimeCount) -> Result<(), TransportError> {
        match self {
            ResultSender::Slot(slot) => slot.write(count),
            ResultSender::Pipe(pipe) => pipe.write(count).await,
        }
    }
}

pub(crate) struct SharedSlots {
    slots: Arc<[OnceLock<PrimeCount>]>,
    issued: Vec<bool>,
}

pub(crate) struct PipeSet {
    readers: Vec<Option<pipe::Receiver>>,
}

/// Coordinator side of a run: hands out one endpoint per worker and later
/// gathers one result per worker in index order.
pub(crate) enum ResultTransport {
    SharedMemory(SharedSlots),
    Pipe(PipeSet),
}

impl ResultTransport {
    pub(crate) fn new(mode: TransportMode, workers: usize) -> Self {
        match mode {
            TransportMode::SharedMemory => ResultTransport::SharedMemory(SharedSlots {
                slots: (0..workers).map(|_| OnceLock::new()).collect(),
                issued: vec![false; workers],
            }),
            TransportMode::Pipe => ResultTransport::Pipe(PipeSet {
                readers: (0..workers).map(|_| None).collect(),
            }),
        }
    }

    pub(crate) fn workers(&self) -> usize {
        match self {
            ResultTransport::SharedMemory(shm) => shm.issued.len(),
            ResultTransport::Pipe(pipes) => pipes.readers.len(),
        }
    }

    /// Creates the endpoint for worker `index`. Each index can be opened once.
    /// Must be called from within a tokio runtime for the pipe transport.
    pub(crate) fn open_endpoint(
        &mut self,
        index: WorkerIndex,
    ) -> Result<ResultSender, TransportError> {
        let workers = self.workers();
        if index >= workers {
            return Err(TransportError::OutOfRange { index, workers });
        }
        match self {
            ResultTransport::SharedMemory(shm) => {
                if shm.issued[index] {
                    return Err(TransportError::EndpointTaken(index));
                }
                shm.issued[index] = true;
                Ok(ResultSender::Slot(SlotWriter {
                    slots: Arc::clone(&shm.slots),
                    index,
                }))
            }
            ResultTransport::Pipe(pipes) => {
                if pipes.readers[index].is_some() {
                    return Err(TransportError::EndpointTaken(index));
                }
                let (sender, receiver) = pipe::pipe().map_err(TransportError::PipeCreate)?;
                pipes.readers[index] = Some(receiver);
                Ok(ResultSender::Pipe(PipeWriter { sender }))
            }
        }
    }

    /// Gathers one outcome per worker in index order. `handles[i]` is the
    /// running worker `i`, or the reason it never started.
    pub(crate) async fn collect(
        self,
        handles: Vec<Result<WorkerHandle, WorkerFailure>>,
    ) -> Vec<WorkerOutcome> {
        match self {
            ResultTransport::SharedMemory(shm) => collect_slots(shm, handles).await,
            ResultTransport::Pipe(pipes) => collect_pipes(pipes, handles).await,
        }
    }
}

async fn join_worker(handle: Result<WorkerHandle, WorkerFailure>) -> Result<(), WorkerFailure> {
    match handle?.await {
        Ok(result) => result,
        Err(e) => Err(e.into()),
    }
}

// Slots are read only after every worker has been joined; the array is
// released when `shm` drops at the end.
async fn collect_slots(
    shm: SharedSlots,
    handles: Vec<Result<WorkerHandle, WorkerFailure>>,
) -> Vec<WorkerOutcome> {
    let joined = future::join_all(handles.into_iter().map(join_worker)).await;
    joined
        .into_iter()
        .enumerate()
        .map(|(index, joined)| {
            joined?;
            shm.slots
                .get(index)
                .and_then(|slot| slot.get().copied())
                .ok_or(WorkerFailure::MissingResult)
        })
        .collect()
}

async fn collect_pipes(
    pipes: PipeSet,
    handles: Vec<Result<WorkerHandle, WorkerFailure>>,
) -> Vec<WorkerOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for (reader, handle) in pipes.readers.into_iter().zip(handles) {
        let handle = match handle {
            Ok(handle) => handle,
            Err(failure) => {
                outcomes.push(Err(failure));
                continue;
            }
        };
        let received = match reader {
            Some(reader) => read_result(reader).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no pipe for worker",
            )),
        };
        let joined = join_worker(Ok(handle)).await;
        outcomes.push(match (received, joined) {
            (Ok(count), _) => Ok(count),
            (Err(_), Err(failure)) => Err(failure),
            (Err(e), Ok(())) => Err(WorkerFailure::ShortRead(e)),
        });
    }
    outcomes
}

// Consumes the read end so it is closed before the worker is joined.
async fn read_result(mut reader: pipe::Receiver) -> io::Result<PrimeCount> {
    let mut buf = [0u8; RESULT_SIZE];
    reader.read_exact(&mut buf).await?;
    Ok(PrimeCount::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_sender(sender: ResultSender, count: PrimeCount) -> WorkerHandle {
        tokio::spawn(async move { sender.send_result(count).await.map_err(WorkerFailure::Send) })
    }

    fn spawn_panicking(sender: ResultSender) -> WorkerHandle {
        tokio::spawn(async move {
            let _held = sender;
            panic!("worker blew up");
        })
    }

    async fn happy_path(mode: TransportMode) {
        let mut transport = ResultTransport::new(mode, 3);
        let handles = (0..3)
            .map(|i| {
                let sender = transport.open_endpoint(i).unwrap();
                Ok(spawn_sender(sender, i as PrimeCount * 10))
            })
            .collect();
        let outcomes = transport.collect(handles).await;
        let counts: Vec<_> = outcomes.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(counts, vec![0, 10, 20]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_memory_collects_every_slot() {
        happy_path(TransportMode::SharedMemory).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipe_collects_every_worker() {
        happy_path(TransportMode::Pipe).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn endpoints_are_handed_out_once() {
        for mode in [TransportMode::SharedMemory, TransportMode::Pipe] {
            let mut transport = ResultTransport::new(mode, 2);
            let _first = transport.open_endpoint(1).unwrap();
            assert!(matches!(
                transport.open_endpoint(1),
                Err(TransportError::EndpointTaken(1))
            ));
            assert!(matches!(
                transport.open_endpoint(2),
                Err(TransportError::OutOfRange { index: 2, workers: 2 })
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unwritten_slot_is_a_missing_result() {
        let mut transport = ResultTransport::new(TransportMode::SharedMemory, 2);
        let writer = transport.open_endpoint(0).unwrap();
        let silent = transport.open_endpoint(1).unwrap();
        let handles = vec![
            Ok(spawn_sender(writer, 5)),
            Ok(tokio::spawn(async move {
                drop(silent);
                Ok(())
            })),
        ];
        let outcomes = transport.collect(handles).await;
        assert_eq!(outcomes[0].as_ref().unwrap(), &5);
        assert!(matches!(outcomes[1], Err(WorkerFailure::MissingResult)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_pipe_without_value_is_a_short_read() {
        let mut transport = ResultTransport::new(TransportMode::Pipe, 2);
        let silent = transport.open_endpoint(0).unwrap();
        let writer = transport.open_endpoint(1).unwrap();
        let handles = vec![
            Ok(tokio::spawn(async move {
                drop(silent);
                Ok(())
            })),
            Ok(spawn_sender(writer, 9)),
        ];
        let outcomes = transport.collect(handles).await;
        assert!(matches!(outcomes[0], Err(WorkerFailure::ShortRead(_))));
        assert_eq!(outcomes[1].as_ref().unwrap(), &9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_worker_is_reported_not_awaited_forever() {
        for mode in [TransportMode::SharedMemory, TransportMode::Pipe] {
            let mut transport = ResultTransport::new(mode, 2);
            let doomed = transport.open_endpoint(0).unwrap();
            let writer = transport.open_endpoint(1).unwrap();
            let handles = vec![
                Ok(spawn_panicking(doomed)),
                Ok(spawn_sender(writer, 3)),
            ];
            let outcomes = transport.collect(handles).await;
            assert!(matches!(outcomes[0], Err(WorkerFailure::Panicked)), "{mode}");
            assert_eq!(outcomes[1].as_ref().unwrap(), &3);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn launch_failures_pass_through() {
        for mode in [TransportMode::SharedMemory, TransportMode::Pipe] {
            let mut transport = ResultTransport::new(mode, 2);
            let writer = transport.open_endpoint(1).unwrap();
            let handles = vec![
                Err(WorkerFailure::Launch(TransportError::PipeCreate(
                    io::Error::from(io::ErrorKind::Other),
                ))),
                Ok(spawn_sender(writer, 4)),
            ];
            let outcomes = transport.collect(handles).await;
            assert!(matches!(outcomes[0], Err(WorkerFailure::Launch(_))));
            assert_eq!(outcomes[1].as_ref().unwrap(), &4);
        }
    }

    #[test]
    fn mode_tokens() {
        assert_eq!(TransportMode::SharedMemory.to_string(), "shm");
        assert_eq!(TransportMode::Pipe.to_string(), "pipe");
    }
}
