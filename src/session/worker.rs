//! Background chat worker.
//!
//! A single task drains a bounded job queue and answers one message at a
//! time. Callers wait on a per-job oneshot with a deadline; when the deadline
//! passes the caller gets an apology and the receiver is dropped, so a reply
//! that arrives later has nowhere to go and is discarded.
//!
//! In-flight model calls are never cancelled. A `Stop` job or the shutdown
//! token ends the loop between jobs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::ChatEngine;
use crate::error::AppError;

/// Apology returned when the worker misses the reply deadline.
pub const TIMEOUT_REPLY: &str = "I'm sorry, I'm having trouble responding right now. Please try again.";

/// The engine the worker answers with. Resets swap the inner `Arc`.
pub type EngineSlot = Arc<RwLock<Arc<ChatEngine>>>;

pub type ReplyFuture = Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'static>>;

enum Job {
    Chat {
        message: String,
        reply_tx: oneshot::Sender<Result<String, AppError>>,
    },
    Stop,
}

pub struct ChatWorker<F> {
    rx: mpsc::Receiver<Job>,
    respond: F,
}

/// Cheap, cloneable handle for submitting messages to the worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Job>,
    reply_timeout: Duration,
}

impl<F> ChatWorker<F>
where
    F: Fn(String) -> ReplyFuture + Send + Sync + 'static,
{
    /// Spawn the worker loop. The returned task ends after `Stop`, after
    /// every handle is dropped, or when `shutdown` is cancelled.
    pub fn spawn(
        respond: F,
        queue_capacity: usize,
        reply_timeout: Duration,
        shutdown: CancellationToken,
    ) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = ChatWorker { rx, respond };
        let task = tokio::spawn(worker.run(shutdown));
        (WorkerHandle { tx, reply_timeout }, task)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        debug!("chat worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("chat worker: shutdown signal");
                    break;
                }
                job = self.rx.recv() => match job {
                    Some(Job::Chat { message, reply_tx }) => {
                        let result = (self.respond)(message).await;
                        if reply_tx.send(result).is_err() {
                            debug!("chat worker: caller gave up, reply discarded");
                        }
                    }
                    Some(Job::Stop) | None => break,
                },
            }
        }
        info!("chat worker stopped");
    }
}

impl WorkerHandle {
    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Submit `message` and wait for the reply.
    ///
    /// Never fails: errors render as `"Error: <e>"` and a missed deadline as
    /// [`TIMEOUT_REPLY`]. The deadline covers time spent queued.
    pub async fn ask(&self, message: impl Into<String>) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job::Chat { message: message.into(), reply_tx };

        let exchange = async {
            self.tx
                .send(job)
                .await
                .map_err(|_| AppError::Session("chat worker is not running".into()))?;
            reply_rx
                .await
                .map_err(|_| AppError::Session("chat worker dropped the request".into()))?
        };

        match tokio::time::timeout(self.reply_timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("chat turn failed: {e}");
                format!("Error: {e}")
            }
            Err(_) => {
                warn!(timeout_secs = self.reply_timeout.as_secs(), "chat reply timed out");
                TIMEOUT_REPLY.to_string()
            }
        }
    }

    /// Queue the stop sentinel. Jobs queued before it are still answered.
    pub async fn stop(&self) {
        if self.tx.send(Job::Stop).await.is_err() {
            debug!("chat worker already stopped");
        }
    }
}

/// Responder that answers with whatever engine is in `slot` when the job
/// is picked up.
pub fn engine_responder(slot: EngineSlot) -> impl Fn(String) -> ReplyFuture + Send + Sync + 'static {
    move |message: String| -> ReplyFuture {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            let engine = Arc::clone(&*slot.read().await);
            engine.chat(&message).await
        })
    }
}
