use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::{ResolveError, Result};

/// Upper bound on the random jitter added to each backoff sleep.
const JITTER_MS: u64 = 250;

type TaskResult = Result<Value>;
type TaskFuture = BoxFuture<'static, TaskResult>;
type TaskFn = Box<dyn Fn() -> TaskFuture + Send + Sync>;

struct QueueItem {
    task: TaskFn,
    retries: u32,
    reply: oneshot::Sender<TaskResult>,
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("retries", &self.retries)
            .finish()
    }
}

/// FIFO scheduler serializing all requests to one rate-limited upstream.
///
/// A single worker task pulls items one at a time, always sleeping at least
/// the configured minimum interval between pulls. A rate-limit response puts
/// the item back at the *head* of the queue (it retries before later-queued
/// work) behind an exponential backoff; any other error rejects immediately.
/// Sustained rate limiting can therefore starve later items; that tradeoff
/// keeps request order fair in the common occasional-429 case.
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("worker_alive", &!self.tx.is_closed())
            .finish()
    }
}

impl SerialQueue {
    /// Spawn the worker task and return its handle. Dropping the handle
    /// closes the channel and lets the worker drain and stop.
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, config));
        Self { tx }
    }

    /// Enqueue one task and await its terminal outcome. The task closure is
    /// re-invoked for every retry attempt.
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();

        let task: TaskFn = Box::new(move || {
            let fut = task();
            async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(ResolveError::from)
            }
            .boxed()
        });

        self.tx
            .send(QueueItem {
                task,
                retries: 0,
                reply,
            })
            .map_err(|_| {
                ResolveError::Backend(
                    "request queue worker has shut down".to_string(),
                )
            })?;

        match rx.await {
            Ok(Ok(json)) => Ok(serde_json::from_value(json)?),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ResolveError::Backend(
                "request queue dropped the reply".to_string(),
            )),
        }
    }
}

fn backoff_delay(config: &QueueConfig, retries: u32) -> Duration {
    let exp = config
        .backoff_base
        .saturating_mul(1u32 << (retries - 1).min(16))
        .min(config.max_backoff);
    let jitter = rand::rng().random_range(0..=JITTER_MS);
    exp + Duration::from_millis(jitter)
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    config: QueueConfig,
) {
    info!("serial request queue worker started");

    let mut pending: VecDeque<QueueItem> = VecDeque::new();

    loop {
        if pending.is_empty() {
            match rx.recv().await {
                Some(item) => pending.push_back(item),
                None => break,
            }
        }
        // Pull in everything already waiting so head reinsertion keeps its
        // place relative to later submissions.
        while let Ok(item) = rx.try_recv() {
            pending.push_back(item);
        }

        let Some(mut item) = pending.pop_front() else {
            continue;
        };

        let attempt = item.retries + 1;
        let delay = match (item.task)().await {
            Err(ResolveError::RateLimited) if attempt < config.max_retries => {
                item.retries = attempt;
                let delay = backoff_delay(&config, attempt);
                debug!(
                    "rate limited on attempt {}, retrying at queue head in {:?}",
                    attempt, delay
                );
                pending.push_front(item);
                delay
            }
            result => {
                if let Err(ref err) = result {
                    debug!("queued request failed terminally: {}", err);
                }
                // The caller may have stopped waiting; that is not an error.
                let _ = item.reply.send(result);
                config.min_interval
            }
        };

        tokio::time::sleep(delay).await;
    }

    info!("serial request queue worker stopped");
}
