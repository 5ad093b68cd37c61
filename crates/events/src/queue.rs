//! Notification Delivery Queue.
//!
//! Intents are persisted `PENDING` by [`NotificationQueue::enqueue`] and
//! delivered by drain cycles: one every `drain_interval`, plus one right
//! after each enqueue. A cycle does nothing while the gateway is
//! disconnected, so outages never consume retry budget; connectivity is
//! re-checked before every send and a cycle stops as soon as the channel
//! drops. Each real attempt
//! either marks the intent `SENT` or increments its `retry_count`; the
//! attempt that reaches `max_retries` marks it `FAILED`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldops_core::channels::CHANNEL_WHATSAPP;
use fieldops_core::roles::ROLE_ADMIN;
use fieldops_core::types::DbId;
use fieldops_db::models::notification_intent::{
    CreateNotificationIntent, NotificationIntent, NotificationStats,
};
use fieldops_db::models::status::NotificationStatus;
use fieldops_db::NotificationStore;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::event::{ChannelStatus, HubEvent, Target};
use crate::gateway::{ChannelGateway, GatewayError};

/// Default seconds between scheduled drain cycles.
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;

/// Default number of intents attempted per cycle.
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Default number of attempts before an intent is marked `FAILED`.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Default pause between consecutive sends within a cycle.
pub const DEFAULT_SEND_DELAY_MS: u64 = 1000;

/// Floor for the scheduled drain interval; `tokio::time::interval` panics
/// on zero.
const MIN_DRAIN_INTERVAL: Duration = Duration::from_millis(100);

const CONNECTIVITY_UNKNOWN: u8 = 0;
const CONNECTIVITY_DOWN: u8 = 1;
const CONNECTIVITY_UP: u8 = 2;

/// Tuning for the delivery queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub drain_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
    pub send_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(DEFAULT_DRAIN_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            send_delay: Duration::from_millis(DEFAULT_SEND_DELAY_MS),
        }
    }
}

/// What a single drain cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Another drain was already running; this trigger was folded into it.
    pub coalesced: bool,
    /// Gateway connectivity observed at the start of the cycle.
    pub connected: bool,
    pub attempted: usize,
    pub sent: usize,
    /// Attempts that failed but left the intent `PENDING`.
    pub retried: usize,
    /// Attempts that exhausted the retry budget.
    pub failed: usize,
    /// The channel went down mid-cycle and the rest of the batch was left
    /// `PENDING` untouched.
    pub halted: bool,
}

/// Durable, retrying delivery of notification intents.
pub struct NotificationQueue {
    store: Arc<dyn NotificationStore>,
    gateway: Arc<dyn ChannelGateway>,
    bus: Arc<EventBus>,
    config: QueueConfig,
    trigger: Notify,
    drain_lock: Mutex<()>,
    last_connectivity: AtomicU8,
}

impl NotificationQueue {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        gateway: Arc<dyn ChannelGateway>,
        bus: Arc<EventBus>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            config,
            trigger: Notify::new(),
            drain_lock: Mutex::new(()),
            last_connectivity: AtomicU8::new(CONNECTIVITY_UNKNOWN),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn gateway_connected(&self) -> bool {
        self.gateway.is_connected()
    }

    /// Persist an intent as `PENDING` and signal an immediate drain.
    ///
    /// Never waits on delivery.
    pub async fn enqueue(
        &self,
        input: &CreateNotificationIntent,
    ) -> Result<NotificationIntent, sqlx::Error> {
        let intent = self.store.insert_intent(input).await?;
        tracing::debug!(
            intent_id = intent.id,
            recipient = %intent.recipient,
            channel = %intent.channel,
            "Notification intent enqueued"
        );
        self.trigger.notify_one();
        Ok(intent)
    }

    /// Enqueue a plain-text message on the default channel.
    pub async fn enqueue_text(
        &self,
        recipient: &str,
        text: &str,
        job_id: Option<DbId>,
    ) -> Result<NotificationIntent, sqlx::Error> {
        self.enqueue(&CreateNotificationIntent {
            recipient: recipient.to_string(),
            payload: text.to_string(),
            channel: CHANNEL_WHATSAPP.to_string(),
            job_id,
        })
        .await
    }

    /// Run one drain cycle.
    ///
    /// Returns immediately with `coalesced` set if another cycle is in
    /// progress. Per-intent store errors are logged and the cycle moves on;
    /// an error selecting the batch aborts the cycle.
    pub async fn drain_once(&self) -> Result<DrainReport, sqlx::Error> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::trace!("Drain already running, trigger coalesced");
            return Ok(DrainReport {
                coalesced: true,
                ..DrainReport::default()
            });
        };

        let connected = self.gateway.is_connected();
        self.observe_connectivity(connected);

        let mut report = DrainReport {
            connected,
            ..DrainReport::default()
        };
        if !connected {
            tracing::debug!("Channel disconnected, skipping drain");
            return Ok(report);
        }

        let batch = self
            .store
            .pending_batch(self.config.batch_size, self.config.max_retries)
            .await?;

        for (i, intent) in batch.iter().enumerate() {
            if i > 0 && !self.config.send_delay.is_zero() {
                tokio::time::sleep(self.config.send_delay).await;
            }
            if !self.gateway.is_connected() {
                self.halt_drain(&mut report, intent.id);
                break;
            }
            report.attempted += 1;

            match self.gateway.send(&intent.recipient, &intent.payload).await {
                Ok(()) => match self.store.mark_sent(intent.id).await {
                    Ok(_) => {
                        report.sent += 1;
                        tracing::info!(intent_id = intent.id, "Notification sent");
                    }
                    Err(e) => {
                        tracing::error!(intent_id = intent.id, error = %e, "Failed to mark notification sent");
                    }
                },
                Err(send_err)
                    if matches!(send_err, GatewayError::NotConnected)
                        || !self.gateway.is_connected() =>
                {
                    tracing::debug!(intent_id = intent.id, error = %send_err, "Send failed on a dropped channel");
                    self.halt_drain(&mut report, intent.id);
                    break;
                }
                Err(send_err) => {
                    let message = send_err.to_string();
                    match self
                        .store
                        .record_failure(intent.id, &message, self.config.max_retries)
                        .await
                    {
                        Ok(Some(updated)) if updated.status() == Some(NotificationStatus::Failed) => {
                            report.failed += 1;
                            tracing::warn!(
                                intent_id = intent.id,
                                retry_count = updated.retry_count,
                                error = %message,
                                "Notification failed permanently"
                            );
                        }
                        Ok(_) => {
                            report.retried += 1;
                            tracing::warn!(
                                intent_id = intent.id,
                                error = %message,
                                "Notification send failed, will retry"
                            );
                        }
                        Err(e) => {
                            tracing::error!(intent_id = intent.id, error = %e, "Failed to record notification failure");
                        }
                    }
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "Drain cycle finished"
            );
        }
        Ok(report)
    }

    /// Drive drain cycles until `cancel` fires.
    ///
    /// A cycle runs on every interval tick and on every enqueue signal;
    /// signals arriving mid-cycle are remembered by the `Notify` and picked
    /// up on the next iteration.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.drain_interval.max(MIN_DRAIN_INTERVAL);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification queue cancelled");
                    break;
                }
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {}
            }

            if let Err(e) = self.drain_once().await {
                tracing::error!(error = %e, "Notification drain failed");
            }
        }
    }

    pub async fn stats(&self) -> Result<NotificationStats, sqlx::Error> {
        self.store.stats().await
    }

    pub async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        self.store.list_intents(status, limit).await
    }

    /// Reset a `FAILED` intent to `PENDING` with a fresh retry budget.
    ///
    /// Returns `false` if the intent does not exist or is not `FAILED`.
    pub async fn requeue(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let changed = self.store.requeue(id).await?;
        if changed {
            tracing::info!(intent_id = id, "Notification requeued");
            self.trigger.notify_one();
        }
        Ok(changed)
    }

    /// Stop the current cycle because the channel dropped. The intent at hand
    /// and everything after it keep their retry budget.
    fn halt_drain(&self, report: &mut DrainReport, next_intent: DbId) {
        report.halted = true;
        self.observe_connectivity(false);
        tracing::warn!(
            next_intent,
            sent = report.sent,
            "Channel disconnected mid-drain, leaving remaining intents pending"
        );
    }

    /// Publish a channel status event when connectivity differs from the
    /// previous observation (including the first one).
    fn observe_connectivity(&self, connected: bool) {
        let now = if connected {
            CONNECTIVITY_UP
        } else {
            CONNECTIVITY_DOWN
        };
        let previous = self.last_connectivity.swap(now, Ordering::Relaxed);
        if previous == now {
            return;
        }

        tracing::info!(connected, "Channel connectivity changed");
        self.bus.publish(
            Target::role(ROLE_ADMIN),
            HubEvent::ChannelStatus(ChannelStatus {
                channel: CHANNEL_WHATSAPP.to_string(),
                connected,
                observed_at: Utc::now(),
            }),
        );
    }
}
