// src/worker/mod.rs
use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::ingest::{self, CancelFlag, LoadOptions, LoadReport};
use crate::store::SqliteStore;

/// Terminal outcome of one background ingestion request. Every request gets
/// exactly one of these.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The archive was loaded; carries the report and the populated store
    /// serialized to bytes.
    Completed {
        report: LoadReport,
        database: Vec<u8>,
    },
    /// The archive could not be loaded at all (bad blob, store failure).
    Failed { message: String },
    /// The caller cancelled mid-load; the report covers the finished part.
    Cancelled { report: LoadReport },
}

struct IngestRequest {
    archive: Vec<u8>,
    options: LoadOptions,
    reply: oneshot::Sender<IngestOutcome>,
}

/// Handle for one submitted request: a cancel flag and the one-shot outcome.
pub struct IngestTicket {
    pub cancel: CancelFlag,
    pub outcome: oneshot::Receiver<IngestOutcome>,
}

/// A single background task draining a request queue, one ingestion at a
/// time. Servicing requests strictly in submission order is what keeps the
/// at-most-one-load-per-store rule: each request gets its own fresh
/// in-memory store, and no two loads ever run concurrently.
pub struct IngestWorker {
    tx: mpsc::Sender<IngestRequest>,
}

impl IngestWorker {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<IngestRequest>(16);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let IngestRequest {
                    archive,
                    options,
                    reply,
                } = request;

                let outcome =
                    match tokio::task::spawn_blocking(move || run_request(archive, &options)).await
                    {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            error!("ingest task panicked: {err}");
                            IngestOutcome::Failed {
                                message: format!("ingest task panicked: {err}"),
                            }
                        }
                    };
                // The submitter may have walked away; that is not our problem.
                let _ = reply.send(outcome);
            }
            info!("ingest worker shutting down");
        });
        IngestWorker { tx }
    }

    /// Queue one archive for ingestion. The returned ticket resolves exactly
    /// once; its cancel flag stops the load between tables or rows.
    pub async fn submit(&self, archive: Vec<u8>, options: LoadOptions) -> Result<IngestTicket> {
        let cancel = options.cancel.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(IngestRequest {
                archive,
                options,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow!("ingest worker is gone"))?;
        Ok(IngestTicket {
            cancel,
            outcome: reply_rx,
        })
    }
}

fn run_request(archive: Vec<u8>, options: &LoadOptions) -> IngestOutcome {
    let mut store = match SqliteStore::open_in_memory() {
        Ok(store) => store,
        Err(err) => {
            return IngestOutcome::Failed {
                message: format!("failed to open store: {err}"),
            }
        }
    };

    match ingest::load_archive(&mut store, &archive, options) {
        Ok(report) if report.cancelled => IngestOutcome::Cancelled { report },
        Ok(report) => match store.export_bytes() {
            Ok(database) => IngestOutcome::Completed { report, database },
            Err(err) => IngestOutcome::Failed {
                message: format!("failed to export store: {err}"),
            },
        },
        Err(err) => IngestOutcome::Failed {
            message: err.to_string(),
        },
    }
}
