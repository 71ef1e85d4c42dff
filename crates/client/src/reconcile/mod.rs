//! Optimistic action layer.
//!
//! `perform_optimistic` applies the predicted state at once, then settles it
//! against the server:
//!
//! - success: the server's view replaces the prediction; the action is kept as
//!   `Confirmed` for `confirm_grace`, then dropped
//! - failure or no answer within `rollback_timeout`: the snapshot is restored
//!   and the request is retried once after `retry_delay`; a second failure is
//!   surfaced as [`OptimisticActionFailure`]
//!
//! Actions are single-flight per [`Affordance`]: a second action on the same
//! control waits until the first has settled. Starting an action bumps the
//! conversation's epoch, which discards the result of any refetch that was in
//! flight for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use assistsync_activation::ConversationAiState;
use assistsync_core::ConversationId;
use assistsync_events::{RealtimeEvent, RealtimeEventType};

use crate::offline::Connectivity;
use crate::transport::{ActionTransport, TransportError};
use crate::types::{ActionKind, ActionStatus, Affordance, ConversationView, PendingAction};

#[cfg(test)]
mod tests;

/// Timings of the optimistic layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on how long one attempt may stay unanswered.
    pub rollback_timeout: Duration,
    pub retry_delay: Duration,
    /// How long a confirmed action stays visible before it is dropped.
    pub confirm_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rollback_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            confirm_grace: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn with_rollback_timeout(mut self, timeout: Duration) -> Self {
        self.rollback_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_confirm_grace(mut self, grace: Duration) -> Self {
        self.confirm_grace = grace;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no response within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptimisticActionFailure {
    #[error("conversation {0} is not loaded")]
    UnknownConversation(ConversationId),

    #[error("action {action_id} was rolled back")]
    RolledBack { action_id: Uuid },

    #[error("action {action_id} failed after {attempts} attempts: {last}")]
    Failed {
        action_id: Uuid,
        attempts: u32,
        last: AttemptError,
    },
}

/// What a realtime event did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEffect {
    Applied(ConversationId),
    /// The conversation has an action in flight; its settlement decides.
    Deferred(ConversationId),
    /// Tenant-wide change; call [`ReconciliationLayer::resync_all`].
    ResyncNeeded,
    Ignored,
}

#[derive(Deserialize)]
struct StatePayload {
    ai_state: ConversationAiState,
}

#[derive(Deserialize)]
struct ArchivedPayload {
    conversation_id: ConversationId,
    archived: bool,
}

struct Entry {
    action: PendingAction,
    cancel: Arc<Notify>,
}

#[derive(Default)]
struct State {
    views: HashMap<ConversationId, ConversationView>,
    epochs: HashMap<ConversationId, u64>,
    pending: HashMap<Uuid, Entry>,
}

impl State {
    fn epoch(&self, id: ConversationId) -> u64 {
        self.epochs.get(&id).copied().unwrap_or(0)
    }

    fn bump(&mut self, id: ConversationId) {
        *self.epochs.entry(id).or_insert(0) += 1;
    }

    fn has_pending(&self, id: ConversationId) -> bool {
        self.pending
            .values()
            .any(|e| in_flight(e.action.status) && e.action.kind.conversation_id() == id)
    }

    fn set_status(&mut self, action_id: Uuid, status: ActionStatus) {
        if let Some(entry) = self.pending.get_mut(&action_id) {
            entry.action.status = status;
        }
    }
}

/// Pending, or failed once and waiting for its retry.
fn in_flight(status: ActionStatus) -> bool {
    matches!(status, ActionStatus::Pending | ActionStatus::Failed)
}

struct Inner {
    transport: Arc<dyn ActionTransport>,
    config: ClientConfig,
    state: Mutex<State>,
    affordances: Mutex<HashMap<Affordance, Arc<tokio::sync::Mutex<()>>>>,
    connectivity: Connectivity,
}

/// Client reconciliation layer. Cheap to clone.
#[derive(Clone)]
pub struct ReconciliationLayer {
    inner: Arc<Inner>,
}

impl ReconciliationLayer {
    pub fn new(transport: Arc<dyn ActionTransport>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(State::default()),
                affordances: Mutex::new(HashMap::new()),
                connectivity: Connectivity::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn view(&self, conversation_id: ConversationId) -> Option<ConversationView> {
        self.state().views.get(&conversation_id).cloned()
    }

    pub fn views(&self) -> Vec<ConversationView> {
        let mut views: Vec<_> = self.state().views.values().cloned().collect();
        views.sort_by_key(|v| v.conversation_id());
        views
    }

    /// Actions not yet dropped (pending, or confirmed within the grace period).
    pub fn pending_actions(&self) -> Vec<PendingAction> {
        let mut actions: Vec<_> = self.state().pending.values().map(|e| e.action.clone()).collect();
        actions.sort_by_key(|a| a.submitted_at);
        actions
    }

    /// Seed local state from a server snapshot (initial load).
    pub fn load(&self, views: impl IntoIterator<Item = ConversationView>) {
        let mut state = self.state();
        for view in views {
            state.views.insert(view.conversation_id(), view);
        }
    }

    /// Apply `action` optimistically and settle it against the server.
    pub async fn perform_optimistic(&self, action: ActionKind) -> Result<ConversationView, OptimisticActionFailure> {
        let affordance = action.affordance();
        let slot = self.affordance_slot(affordance);
        let flight = slot.clone().lock_owned().await;

        let result = self.settle(action).await;

        drop(flight);
        self.release_slot(affordance, slot);
        result
    }

    async fn settle(&self, action: ActionKind) -> Result<ConversationView, OptimisticActionFailure> {
        let conversation_id = action.conversation_id();
        let action_id = Uuid::now_v7();
        let cancel = Arc::new(Notify::new());
        let snapshot = {
            let mut state = self.state();
            let Some(snapshot) = state.views.get(&conversation_id).cloned() else {
                return Err(OptimisticActionFailure::UnknownConversation(conversation_id));
            };
            let predicted = action.predict(&snapshot);

            state.bump(conversation_id);
            state.views.insert(conversation_id, predicted.clone());
            state.pending.insert(
                action_id,
                Entry {
                    action: PendingAction {
                        id: action_id,
                        kind: action.clone(),
                        snapshot: snapshot.clone(),
                        predicted,
                        submitted_at: Utc::now(),
                        status: ActionStatus::Pending,
                        attempts: 0,
                    },
                    cancel: cancel.clone(),
                },
            );
            snapshot
        };
        debug!(%action_id, %conversation_id, ?action, "optimistic action applied");

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.record_attempt(action_id, attempts);

            let outcome = tokio::select! {
                _ = cancel.notified() => return Err(OptimisticActionFailure::RolledBack { action_id }),
                res = tokio::time::timeout(self.inner.config.rollback_timeout, self.inner.transport.submit(&action)) => res,
            };

            let error = match outcome {
                Ok(Ok(view)) => return Ok(self.confirm(action_id, view)),
                Ok(Err(e)) => AttemptError::Transport(e),
                Err(_) => AttemptError::TimedOut(self.inner.config.rollback_timeout),
            };

            if matches!(&error, AttemptError::Transport(e) if e.is_connectivity()) {
                self.inner.connectivity.set_offline();
            }
            self.restore(action_id, &action, &snapshot);
            warn!(%action_id, attempts, error = %error, "optimistic action failed; rolled back");

            if attempts >= 2 {
                self.state().pending.remove(&action_id);
                return Err(OptimisticActionFailure::Failed {
                    action_id,
                    attempts,
                    last: error,
                });
            }

            tokio::select! {
                _ = cancel.notified() => return Err(OptimisticActionFailure::RolledBack { action_id }),
                _ = tokio::time::sleep(self.inner.config.retry_delay) => {}
            }

            {
                let mut state = self.state();
                if let Some(current) = state.views.get(&conversation_id).cloned() {
                    state.views.insert(conversation_id, action.predict(&current));
                }
                state.bump(conversation_id);
                state.set_status(action_id, ActionStatus::Pending);
            }
        }
    }

    /// Roll back a pending action before it settles. Returns `false` if the
    /// action is unknown or already settled.
    pub fn rollback(&self, action_id: Uuid) -> bool {
        let mut state = self.state();
        let Some(entry) = state.pending.remove(&action_id) else {
            return false;
        };
        if !in_flight(entry.action.status) {
            state.pending.insert(action_id, entry);
            return false;
        }

        let id = entry.action.kind.conversation_id();
        if let Some(current) = state.views.get(&id) {
            let reverted = entry.action.kind.revert(current, &entry.action.snapshot);
            state.views.insert(id, reverted);
        }
        state.bump(id);
        entry.cancel.notify_one();
        info!(%action_id, conversation_id = %id, "optimistic action rolled back manually");
        true
    }

    /// Apply a realtime event. Conversations with an action in flight are left
    /// to that action's settlement.
    pub fn apply_event(&self, event: &RealtimeEvent) -> EventEffect {
        match event.event_type {
            RealtimeEventType::AiConfigChanged => EventEffect::ResyncNeeded,
            RealtimeEventType::AiReactivated | RealtimeEventType::ConversationListUpdated => {
                if let Ok(StatePayload { ai_state }) = serde_json::from_value(event.payload.clone()) {
                    let id = ai_state.conversation_id;
                    return self.apply_authoritative(id, |view| view.state = ai_state);
                }
                if let Ok(ArchivedPayload {
                    conversation_id,
                    archived,
                }) = serde_json::from_value(event.payload.clone())
                {
                    return self.apply_authoritative(conversation_id, |view| view.archived = archived);
                }
                if event.payload.get("pause_cleared").is_some() || event.payload.get("created").is_some() {
                    return EventEffect::ResyncNeeded;
                }
                EventEffect::Ignored
            }
            RealtimeEventType::MessageNew | RealtimeEventType::MessageUpdated => EventEffect::Ignored,
        }
    }

    /// Refetch one conversation. The result is dropped if an action started
    /// (or is still pending) for it meanwhile.
    pub async fn refresh(&self, conversation_id: ConversationId) -> Result<bool, TransportError> {
        let epoch = self.state().epoch(conversation_id);
        let view = self.inner.transport.fetch_conversation(conversation_id).await?;

        let mut state = self.state();
        if state.epoch(conversation_id) != epoch || state.has_pending(conversation_id) {
            debug!(%conversation_id, "refetch superseded by a local action");
            return Ok(false);
        }
        state.views.insert(conversation_id, view);
        Ok(true)
    }

    /// Reload every conversation, e.g. after a reconnect. Returns how many
    /// views were applied.
    pub async fn resync_all(&self) -> Result<usize, TransportError> {
        let epochs = self.state().epochs.clone();
        let views = match self.inner.transport.fetch_conversations().await {
            Ok(views) => views,
            Err(e) => {
                if e.is_connectivity() {
                    self.inner.connectivity.set_offline();
                }
                return Err(e);
            }
        };
        self.inner.connectivity.set_online();

        let mut state = self.state();
        let mut applied = 0;
        for view in views {
            let id = view.conversation_id();
            let unchanged = state.epoch(id) == epochs.get(&id).copied().unwrap_or(0);
            if unchanged && !state.has_pending(id) {
                state.views.insert(id, view);
                applied += 1;
            }
        }
        info!(applied, "conversations resynchronized");
        Ok(applied)
    }

    /// Mark the client online again and resynchronize if it had been offline.
    pub async fn on_reconnect(&self) -> Result<usize, TransportError> {
        if self.inner.connectivity.set_online() {
            info!("back online; resynchronizing");
        }
        self.resync_all().await
    }

    fn apply_authoritative(&self, id: ConversationId, update: impl FnOnce(&mut ConversationView)) -> EventEffect {
        let mut state = self.state();
        if state.has_pending(id) {
            return EventEffect::Deferred(id);
        }
        let Some(view) = state.views.get_mut(&id) else {
            return EventEffect::ResyncNeeded;
        };
        update(view);
        state.bump(id);
        EventEffect::Applied(id)
    }

    /// Take the server's view, keeping the predictions of other actions still
    /// in flight on the conversation on top of it.
    fn confirm(&self, action_id: Uuid, view: ConversationView) -> ConversationView {
        let id = view.conversation_id();
        {
            let mut state = self.state();
            let others: Vec<ActionKind> = state
                .pending
                .iter()
                .filter(|(other, e)| {
                    **other != action_id && in_flight(e.action.status) && e.action.kind.conversation_id() == id
                })
                .map(|(_, e)| e.action.kind.clone())
                .collect();
            let shown = others.iter().fold(view.clone(), |acc, kind| kind.predict(&acc));

            state.bump(id);
            state.views.insert(id, shown);
            state.set_status(action_id, ActionStatus::Confirmed);
        }
        self.inner.connectivity.set_online();
        debug!(%action_id, "optimistic action confirmed");

        let inner = Arc::downgrade(&self.inner);
        let grace = self.inner.config.confirm_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.state.lock().unwrap_or_else(|p| p.into_inner());
                state.pending.remove(&action_id);
            }
        });
        view
    }

    /// Undo `action`'s own fields and mark it failed.
    fn restore(&self, action_id: Uuid, action: &ActionKind, snapshot: &ConversationView) {
        let mut state = self.state();
        let id = snapshot.conversation_id();
        if let Some(current) = state.views.get(&id) {
            let reverted = action.revert(current, snapshot);
            state.views.insert(id, reverted);
        }
        state.bump(id);
        state.set_status(action_id, ActionStatus::Failed);
    }

    fn record_attempt(&self, action_id: Uuid, attempts: u32) {
        if let Some(entry) = self.state().pending.get_mut(&action_id) {
            entry.action.attempts = attempts;
        }
    }

    fn affordance_slot(&self, affordance: Affordance) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.inner.affordances.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(affordance).or_default().clone()
    }

    /// Forget a slot nobody else holds or waits on.
    fn release_slot(&self, affordance: Affordance, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut slots = self.inner.affordances.lock().unwrap_or_else(|p| p.into_inner());
        drop(slot);
        if slots.get(&affordance).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(&affordance);
        }
    }

    /// Number of affordances with an action running or queued.
    pub fn busy_affordances(&self) -> usize {
        self.inner.affordances.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl core::fmt::Debug for ReconciliationLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReconciliationLayer")
            .field("config", &self.inner.config)
            .field("connectivity", &self.inner.connectivity.state())
            .finish_non_exhaustive()
    }
}
