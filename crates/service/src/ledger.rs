//! Background ledger writer.
//!
//! Rows are queued on a bounded channel and appended one at a time by a
//! single task, so a slow spreadsheet never holds up the customer's lock
//! and rows reach the sink in the order they were queued.

use model::LedgerRow;
use repository::LedgerRepository;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::ServiceError;

const QUEUE_CAPACITY: usize = 1024;

enum LedgerCommand {
    Append(LedgerRow),
    /// Acknowledged once every row queued before it has been attempted.
    Flush(oneshot::Sender<()>),
}

impl std::fmt::Debug for LedgerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerCommand::Append(row) => f.debug_tuple("Append").field(&row.order_id).finish(),
            LedgerCommand::Flush(_) => f.write_str("Flush"),
        }
    }
}

/// Handle to the ledger task. Dropping every handle stops the task after
/// it has drained the queue.
#[derive(Debug, Clone)]
pub(crate) struct LedgerWriter {
    tx: mpsc::Sender<LedgerCommand>,
}

impl LedgerWriter {
    /// Spawns the writer task on the current Tokio runtime.
    pub(crate) fn start<R: LedgerRepository>(ledger: R) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(process_rows(ledger, rx));
        Self { tx }
    }

    /// Queues a row. Waits only when the queue is full.
    pub(crate) async fn append(&self, row: LedgerRow) {
        if let Err(mpsc::error::SendError(command)) =
            self.tx.send(LedgerCommand::Append(row)).await
        {
            error!(command = ?command, "ledger writer stopped, row dropped");
        }
    }

    /// Waits until every row queued so far has been attempted.
    pub(crate) async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(LedgerCommand::Flush(ack)).await.is_err() {
            return;
        }
        if done.await.is_err() {
            error!("ledger writer stopped before flushing");
        }
    }
}

async fn process_rows<R: LedgerRepository>(ledger: R, mut rx: mpsc::Receiver<LedgerCommand>) {
    debug!("ledger writer started");

    while let Some(command) = rx.recv().await {
        match command {
            LedgerCommand::Append(row) => {
                if let Err(e) = ledger.append_row(&row).await.map_err(ServiceError::from) {
                    error!(
                        order_id = %row.order_id,
                        phone = %row.phone,
                        status = %row.status.as_str(),
                        error = %e,
                        "ledger append failed"
                    );
                }
            }
            LedgerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("ledger writer stopped");
}
