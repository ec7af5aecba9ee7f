//! Concurrent publish pipeline.
//!
//! ```text
//! decoder ──▶ [bounded queue] ──▶ dispatcher ──┬─▶ sink.append
//!                                              ├─▶ sink.append   (≤ concurrency)
//!                                              └─▶ sink.append
//! ```
//!
//! One task decodes the input sequentially and feeds a queue holding at most
//! `concurrency` events. The dispatcher takes a permit, then an event, and
//! spawns the append; a full pool stalls the queue, which stalls decoding.
//! Delivery order is unspecified once `concurrency > 1`.
//!
//! Two tokens govern a run. `stop`, a child of the caller's token, gates
//! decoding and dispatch: once it fires no new append starts. `abort` fires
//! only on a decode or append failure and also cuts off the appends already
//! in flight. A caller cancelling the run therefore lets in-flight appends
//! finish and counts them as published.

use std::sync::Arc;

use async_trait::async_trait;
use evrys_types::Event;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::decode::Decoder;
use crate::error::PublishError;

/// Worker pool size used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Destination of dispatched events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn append(&self, event: &Event) -> Result<(), PublishError>;
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Events read from the input.
    pub decoded: u64,
    /// Events the sink accepted.
    pub published: u64,
    /// Whether the run ended because the caller cancelled it.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    concurrency: usize,
    span: Span,
}

impl Pipeline {
    pub fn new(span: Span) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            span,
        }
    }

    /// Sets the number of concurrent appends. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Publishes every event from `decoder` to `sink`.
    ///
    /// Returns the first decode or append failure. Cancelling `shutdown` is
    /// not a failure: the run stops taking new work, waits for in-flight
    /// appends and reports `cancelled = true`.
    pub async fn run<D, S>(
        &self,
        decoder: D,
        sink: Arc<S>,
        shutdown: CancellationToken,
    ) -> Result<PipelineReport, PublishError>
    where
        D: Decoder + 'static,
        S: EventSink + ?Sized,
    {
        let halt = Halt {
            stop: shutdown.child_token(),
            abort: CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(self.concurrency);

        let decoding = tokio::spawn(
            decode_stage(decoder, tx, halt.clone()).instrument(self.span.clone()),
        );
        let dispatched = self
            .dispatch_stage(rx, sink, halt.clone())
            .instrument(self.span.clone())
            .await;
        let decoded = match decoding.await {
            Ok(result) => result,
            Err(e) => Err(PublishError::Task(e)),
        };

        let (decoded, published) = match (decoded, dispatched) {
            (Ok(decoded), Ok(published)) => (decoded, published),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(parent: &self.span, error = %e, "publish pipeline failed");
                return Err(e);
            }
        };

        let report = PipelineReport {
            decoded,
            published,
            cancelled: shutdown.is_cancelled(),
        };
        tracing::info!(
            parent: &self.span,
            decoded = report.decoded,
            published = report.published,
            cancelled = report.cancelled,
            "publish pipeline finished"
        );
        Ok(report)
    }

    async fn dispatch_stage<S>(
        &self,
        mut rx: mpsc::Receiver<Event>,
        sink: Arc<S>,
        halt: Halt,
    ) -> Result<u64, PublishError>
    where
        S: EventSink + ?Sized,
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut tally = Tally::default();

        loop {
            let permit = tokio::select! {
                biased;
                () = halt.stop.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };
            let event = tokio::select! {
                biased;
                () = halt.stop.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let sink = sink.clone();
            let worker_halt = halt.clone();
            workers.spawn(
                async move {
                    let _permit = permit;
                    tokio::select! {
                        biased;
                        () = worker_halt.abort.cancelled() => Ok(false),
                        appended = sink.append(&event) => {
                            if let Err(e) = &appended {
                                tracing::warn!(event_id = %event.id, error = %e, "append failed");
                                worker_halt.fail();
                            }
                            appended.map(|()| true)
                        }
                    }
                }
                .in_current_span(),
            );

            while let Some(done) = workers.try_join_next() {
                tally.record(done, &halt);
            }
        }

        drop(rx);
        while let Some(done) = workers.join_next().await {
            tally.record(done, &halt);
        }
        tally.finish()
    }
}

#[derive(Debug, Clone)]
struct Halt {
    stop: CancellationToken,
    abort: CancellationToken,
}

impl Halt {
    fn fail(&self) {
        self.abort.cancel();
        self.stop.cancel();
    }
}

/// Reads events until end of input, a decode failure, or `stop`.
async fn decode_stage<D: Decoder>(
    mut decoder: D,
    tx: mpsc::Sender<Event>,
    halt: Halt,
) -> Result<u64, PublishError> {
    let mut decoded = 0;
    loop {
        let next = tokio::select! {
            biased;
            () = halt.stop.cancelled() => return Ok(decoded),
            next = decoder.next_event() => next,
        };
        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(decoded),
            Err(e) => {
                halt.fail();
                return Err(e);
            }
        };
        decoded += 1;

        tokio::select! {
            biased;
            () = halt.stop.cancelled() => return Ok(decoded),
            sent = tx.send(event) => {
                if sent.is_err() {
                    return Ok(decoded);
                }
            }
        }
    }
}

/// Outcome of the dispatch workers.
#[derive(Default)]
struct Tally {
    published: u64,
    error: Option<PublishError>,
}

impl Tally {
    fn record(
        &mut self,
        done: Result<Result<bool, PublishError>, tokio::task::JoinError>,
        halt: &Halt,
    ) {
        let failure = match done {
            Ok(Ok(true)) => {
                self.published += 1;
                return;
            }
            Ok(Ok(false)) => return,
            Ok(Err(e)) => e,
            Err(e) => PublishError::Task(e),
        };
        halt.fail();
        self.error.get_or_insert(failure);
    }

    fn finish(self) -> Result<u64, PublishError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.published),
        }
    }
}
