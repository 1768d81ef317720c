//! Async runtime
//!
//! Owns the background tasks around an [`Engine`]:
//! - inbound worker shards (one single-writer task per shard, users hashed onto shards)
//! - the feedback task
//! - the recommendation tick, which also fires the break reminder
//! - the periodic status snapshot
//!
//! Every loop exits when the shutdown watch flips to `true`.

use crate::engine::{Engine, IngestOutcome};
use crate::recommend::FeedbackReport;
use crate::telemetry::RecommendationSink;
use chrono::{DateTime, Utc};
use drivesense_common::{DriveSenseError, OutboundMessage, RawActionRecord, RawFeedbackRecord, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

struct ActionJob {
    raw: RawActionRecord,
    received_at: DateTime<Utc>,
    reply: Option<oneshot::Sender<Result<IngestOutcome>>>,
}

struct FeedbackJob {
    raw: RawFeedbackRecord,
    received_at: DateTime<Utc>,
    reply: Option<oneshot::Sender<Result<FeedbackReport>>>,
}

/// Cloneable entry point into the inbound queues
#[derive(Clone)]
pub struct RuntimeHandle {
    shards: Arc<Vec<mpsc::Sender<ActionJob>>>,
    feedback: mpsc::Sender<FeedbackJob>,
}

impl RuntimeHandle {
    /// Queue an action and wait for its outcome
    pub async fn submit_action(&self, raw: RawActionRecord) -> Result<IngestOutcome> {
        let (tx, rx) = oneshot::channel();
        self.route(ActionJob {
            raw,
            received_at: Utc::now(),
            reply: Some(tx),
        })
        .await?;
        rx.await
            .map_err(|_| DriveSenseError::Transport("ingest worker dropped reply".into()))?
    }

    /// Queue an action without waiting (transport bridges)
    pub async fn enqueue_action(&self, raw: RawActionRecord) -> Result<()> {
        self.route(ActionJob {
            raw,
            received_at: Utc::now(),
            reply: None,
        })
        .await
    }

    /// Queue feedback and wait for the report
    pub async fn submit_feedback(&self, raw: RawFeedbackRecord) -> Result<FeedbackReport> {
        let (tx, rx) = oneshot::channel();
        self.feedback
            .send(FeedbackJob {
                raw,
                received_at: Utc::now(),
                reply: Some(tx),
            })
            .await
            .map_err(|_| DriveSenseError::Transport("feedback channel closed".into()))?;
        rx.await
            .map_err(|_| DriveSenseError::Transport("feedback worker dropped reply".into()))?
    }

    pub async fn enqueue_feedback(&self, raw: RawFeedbackRecord) -> Result<()> {
        self.feedback
            .send(FeedbackJob {
                raw,
                received_at: Utc::now(),
                reply: None,
            })
            .await
            .map_err(|_| DriveSenseError::Transport("feedback channel closed".into()))
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    async fn route(&self, job: ActionJob) -> Result<()> {
        let shard = shard_for(job.raw.user_id.as_deref().unwrap_or_default(), self.shards.len());
        self.shards[shard]
            .send(job)
            .await
            .map_err(|_| DriveSenseError::Transport(format!("ingest shard {} closed", shard)))
    }
}

/// Stable shard index for a user within this process
pub fn shard_for(user_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

pub struct Runtime {
    handle: RuntimeHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Start every background task
    pub fn spawn(
        engine: Arc<Engine>,
        sink: Arc<dyn RecommendationSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let cfg = engine.config().clone();
        let workers = cfg.ingest.workers.max(1);
        let buffer = cfg.ingest.channel_buffer.max(1);

        let mut tasks = Vec::with_capacity(workers + 3);
        let mut shards = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(buffer);
            shards.push(tx);
            tasks.push(tokio::spawn(ingest_worker(
                shard,
                Arc::clone(&engine),
                rx,
                shutdown.clone(),
            )));
        }

        let (feedback_tx, feedback_rx) = mpsc::channel(buffer);
        tasks.push(tokio::spawn(feedback_worker(
            Arc::clone(&engine),
            feedback_rx,
            shutdown.clone(),
        )));

        tasks.push(tokio::spawn(tick_loop(
            Arc::clone(&engine),
            sink,
            cfg.learning.tick_interval(),
            shutdown.clone(),
        )));

        tasks.push(tokio::spawn(status_loop(
            engine,
            Duration::from_secs(cfg.telemetry.snapshot_interval_secs.max(1)),
            shutdown,
        )));

        info!(workers, "Runtime started");

        Self {
            handle: RuntimeHandle {
                shards: Arc::new(shards),
                feedback: feedback_tx,
            },
            tasks,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Wait for every task to finish after shutdown
    pub async fn join(self) {
        drop(self.handle);
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Runtime task failed");
            }
        }
        info!("Runtime stopped");
    }
}

async fn ingest_worker(
    shard: usize,
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<ActionJob>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else {
                    debug!(shard, "Ingest channel closed");
                    break;
                };
                let result = engine.ingest(&job.raw, job.received_at);
                if let Some(reply) = job.reply {
                    let _ = reply.send(result);
                }
            }
            _ = shutdown.changed() => {
                debug!(shard, "Ingest worker shutting down");
                break;
            }
        }
    }
}

async fn feedback_worker(
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<FeedbackJob>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                let result = engine.feedback(&job.raw, job.received_at);
                if let Some(reply) = job.reply {
                    let _ = reply.send(result);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn tick_loop(
    engine: Arc<Engine>,
    sink: Arc<dyn RecommendationSink>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                if let Some(notice) = engine.break_reminder(now) {
                    publish(sink.as_ref(), OutboundMessage::Notice(notice)).await;
                }
                if let Some(suggestion) = engine.tick(now) {
                    publish(sink.as_ref(), OutboundMessage::Suggestion(suggestion)).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn status_loop(engine: Arc<Engine>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.report_status(Utc::now());
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn publish(sink: &dyn RecommendationSink, message: OutboundMessage) {
    if let Err(e) = sink.publish(message).await {
        warn!(error = %e, "Failed to publish outbound message");
    }
}
