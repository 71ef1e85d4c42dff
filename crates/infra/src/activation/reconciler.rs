//! Pause expiry reconciler.
//!
//! Fixed-interval sweep that resolves elapsed pauses. Each sweep finishes
//! before the next tick is taken; a tick that falls due while a sweep is still
//! running is skipped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use assistsync_activation::{ConversationAiState, ReactivationDecision};
use assistsync_core::TenantId;
use assistsync_events::{RealtimeEvent, RealtimeEventType, Room};

use crate::cache::CacheDomain;
use crate::store::StoreError;

use super::engine::ActivationRuleEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rows with an elapsed pause found by the scan.
    pub examined: usize,
    /// Rows turned back on.
    pub reactivated: usize,
    /// Rows whose pause was cleared but stay off (tenant verdict is off).
    pub held_off: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            name: "pause-expiry-reconciler".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to stop a running reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Request shutdown and wait for the in-flight sweep (if any) to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.join.await;
    }
}

#[derive(Debug, Clone)]
pub struct PauseExpiryReconciler {
    engine: Arc<ActivationRuleEngine>,
}

impl PauseExpiryReconciler {
    pub fn new(engine: Arc<ActivationRuleEngine>) -> Self {
        Self { engine }
    }

    /// One sweep at `now`.
    ///
    /// Idempotent: the store re-checks the expiry predicate on every write, so
    /// a second sweep (or an overlapping one) finds nothing left to do. A
    /// tenant whose verdict is off never gets conversations reactivated.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let expired = self.engine.conversations().find_expired_pauses(now).await?;
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        let mut by_tenant: BTreeMap<TenantId, Vec<ConversationAiState>> = BTreeMap::new();
        for state in expired {
            by_tenant.entry(state.tenant_id).or_default().push(state);
        }

        for (tenant_id, states) in by_tenant {
            let verdict = self.engine.should_activate(tenant_id).await;
            let mut reactivated = Vec::new();
            let mut held_off = Vec::new();

            for state in states {
                let reactivate = match state.reactivation(now, verdict.active) {
                    ReactivationDecision::Reactivate => true,
                    ReactivationDecision::HoldOff => false,
                    ReactivationDecision::NotDue => continue,
                };

                let resolved = self
                    .engine
                    .conversations()
                    .resolve_expired_pause(tenant_id, state.conversation_id, reactivate, now)
                    .await?;

                match resolved {
                    Some(s) if reactivate => reactivated.push(s),
                    Some(s) => held_off.push(s),
                    None => debug!(conversation_id = %state.conversation_id, "pause already resolved"),
                }
            }

            if reactivated.is_empty() && held_off.is_empty() {
                continue;
            }

            report.reactivated += reactivated.len();
            report.held_off += held_off.len();

            self.engine
                .invalidate(tenant_id, &[CacheDomain::AiState, CacheDomain::Conversations, CacheDomain::Dashboard])
                .await;
            self.publish(tenant_id, &reactivated, &held_off);
        }

        if report.reactivated + report.held_off > 0 {
            info!(
                examined = report.examined,
                reactivated = report.reactivated,
                held_off = report.held_off,
                "pause expiry sweep"
            );
        }
        Ok(report)
    }

    fn publish(&self, tenant_id: TenantId, reactivated: &[ConversationAiState], held_off: &[ConversationAiState]) {
        let fanout = self.engine.fanout();

        for state in reactivated {
            fanout.publish_to(
                &[Room::conversation(tenant_id, state.conversation_id), Room::tenant(tenant_id)],
                RealtimeEvent::conversation(
                    RealtimeEventType::AiReactivated,
                    tenant_id,
                    state.conversation_id,
                    json!({ "conversation_id": state.conversation_id, "ai_state": state }),
                ),
            );
        }

        if !held_off.is_empty() {
            let ids: Vec<_> = held_off.iter().map(|s| s.conversation_id).collect();
            fanout.publish(
                &Room::tenant(tenant_id),
                RealtimeEvent::tenant(
                    RealtimeEventType::ConversationListUpdated,
                    tenant_id,
                    json!({ "pause_cleared": ids }),
                ),
            );
        }
    }

    /// Run sweeps on a fixed interval until the handle is shut down.
    pub fn spawn(self, config: ReconcilerConfig) -> ReconcilerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            info!(name = %config.name, interval_secs = config.interval.as_secs(), "reconciler started");

            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        info!(name = %config.name, "reconciler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep(Utc::now()).await {
                            error!(name = %config.name, error = %e, "pause expiry sweep failed");
                        }
                    }
                }
            }
        });

        ReconcilerHandle { shutdown, join }
    }
}
