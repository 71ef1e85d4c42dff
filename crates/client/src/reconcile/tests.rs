use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use assistsync_activation::PauseReason;
use assistsync_core::{TenantId, UserId};

use super::*;

/// What the stub does for one `submit` call.
enum Reply {
    Ok,
    Fail(TransportError),
    /// Wait for `release` before answering Ok.
    Gated,
    /// Wait for `release` before failing.
    GatedFail(TransportError),
    /// Never answer.
    Hang,
}

struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    server: Mutex<HashMap<ConversationId, ConversationView>>,
    calls: AtomicUsize,
    order: Mutex<Vec<ActionKind>>,
    release: Notify,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>, server: Vec<ConversationView>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            server: Mutex::new(server.into_iter().map(|v| (v.conversation_id(), v)).collect()),
            calls: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
            release: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_server(&self, view: ConversationView) {
        self.server.lock().unwrap().insert(view.conversation_id(), view);
    }

    fn apply(&self, action: &ActionKind) -> ConversationView {
        let mut server = self.server.lock().unwrap();
        let current = server[&action.conversation_id()].clone();
        let next = action.predict(&current);
        server.insert(next.conversation_id(), next.clone());
        next
    }
}

#[async_trait]
impl ActionTransport for ScriptedTransport {
    async fn submit(&self, action: &ActionKind) -> Result<ConversationView, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(action.clone());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => Ok(self.apply(action)),
            Reply::Fail(e) => Err(e),
            Reply::Gated => {
                self.release.notified().await;
                Ok(self.apply(action))
            }
            Reply::GatedFail(e) => {
                self.release.notified().await;
                Err(e)
            }
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn fetch_conversation(&self, conversation_id: ConversationId) -> Result<ConversationView, TransportError> {
        self.server
            .lock()
            .unwrap()
            .get(&conversation_id)
            .cloned()
            .ok_or(TransportError::Api(404, "not found".into()))
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationView>, TransportError> {
        let mut views: Vec<_> = self.server.lock().unwrap().values().cloned().collect();
        views.sort_by_key(|v| v.conversation_id());
        Ok(views)
    }
}

fn conv(id: i64) -> ConversationId {
    ConversationId::new(id)
}

fn view(id: i64, ai_active: bool) -> ConversationView {
    ConversationView::new(ConversationAiState::new(TenantId::new(1), conv(id), ai_active))
}

fn fast() -> ClientConfig {
    ClientConfig::default()
        .with_rollback_timeout(Duration::from_millis(150))
        .with_retry_delay(Duration::from_millis(20))
        .with_confirm_grace(Duration::from_millis(30))
}

fn layer(transport: Arc<ScriptedTransport>, initial: Vec<ConversationView>) -> ReconciliationLayer {
    let layer = ReconciliationLayer::new(transport, fast());
    layer.load(initial);
    layer
}

fn archive(id: i64) -> ActionKind {
    ActionKind::ArchiveConversation {
        conversation_id: conv(id),
    }
}

fn toggle(id: i64, ai_active: bool) -> ActionKind {
    ActionKind::SetAiActive {
        conversation_id: conv(id),
        ai_active,
    }
}

async fn wait_for_calls(transport: &ScriptedTransport, n: usize) {
    for _ in 0..200 {
        if transport.calls() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("transport never reached {n} calls");
}

#[tokio::test]
async fn prediction_is_visible_at_once_and_replaced_by_the_server_view() {
    let transport = ScriptedTransport::new(vec![Reply::Gated], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let task = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;

    assert!(layer.view(conv(7)).unwrap().archived);
    let pending = layer.pending_actions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, ActionStatus::Pending);
    assert!(!pending[0].snapshot.archived);

    transport.release.notify_one();
    let confirmed = task.await.unwrap().unwrap();
    assert!(confirmed.archived);
    assert_eq!(layer.view(conv(7)).unwrap(), confirmed);
    assert_eq!(layer.pending_actions()[0].status, ActionStatus::Confirmed);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(layer.pending_actions().is_empty());
}

#[tokio::test]
async fn failed_archive_rolls_back_and_is_retried_exactly_once() {
    let network = TransportError::Network("connection reset".into());
    let transport = ScriptedTransport::new(
        vec![Reply::Fail(network.clone()), Reply::Fail(network.clone())],
        vec![view(7, true)],
    );
    let layer = layer(transport.clone(), vec![view(7, true)]);
    let before = layer.view(conv(7)).unwrap();

    let err = layer.perform_optimistic(archive(7)).await.unwrap_err();

    assert!(matches!(
        err,
        OptimisticActionFailure::Failed { attempts: 2, last: AttemptError::Transport(TransportError::Network(_)), .. }
    ));
    assert_eq!(transport.calls(), 2);
    assert_eq!(layer.view(conv(7)).unwrap(), before);
    assert!(layer.pending_actions().is_empty());
    assert!(layer.connectivity().is_offline());
}

#[tokio::test]
async fn retry_success_settles_on_the_server_view() {
    let transport = ScriptedTransport::new(
        vec![Reply::Fail(TransportError::Api(503, "busy".into())), Reply::Ok],
        vec![view(7, true)],
    );
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let result = layer.perform_optimistic(toggle(7, false)).await.unwrap();

    assert!(!result.state.ai_active);
    assert_eq!(transport.calls(), 2);
    assert_eq!(layer.view(conv(7)).unwrap(), result);
}

#[tokio::test]
async fn unanswered_request_is_rolled_back_by_the_timeout() {
    let transport = ScriptedTransport::new(vec![Reply::Hang, Reply::Hang], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let started = Instant::now();
    let err = layer.perform_optimistic(archive(7)).await.unwrap_err();

    assert!(matches!(
        err,
        OptimisticActionFailure::Failed { last: AttemptError::TimedOut(_), .. }
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!layer.view(conv(7)).unwrap().archived);
}

#[tokio::test]
async fn snapshot_is_restored_while_waiting_for_the_retry() {
    let transport = ScriptedTransport::new(
        vec![Reply::Fail(TransportError::Offline), Reply::Gated],
        vec![view(7, true)],
    );
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let task = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });

    // Inside the retry delay the snapshot is shown and the action is marked failed.
    tokio::time::sleep(Duration::from_millis(5)).await;
    if transport.calls() == 1 {
        assert!(!layer.view(conv(7)).unwrap().archived);
        assert_eq!(layer.pending_actions()[0].status, ActionStatus::Failed);
    }

    wait_for_calls(&transport, 2).await;
    assert!(layer.view(conv(7)).unwrap().archived);
    transport.release.notify_one();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn actions_on_one_affordance_run_one_at_a_time() {
    let transport = ScriptedTransport::new(vec![Reply::Gated, Reply::Ok], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let first = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(toggle(7, false)).await }
    });
    wait_for_calls(&transport, 1).await;

    let second = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(toggle(7, true)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(layer.pending_actions().len(), 1);

    transport.release.notify_one();
    first.await.unwrap().unwrap();
    let last = second.await.unwrap().unwrap();

    assert!(last.state.ai_active);
    assert_eq!(*transport.order.lock().unwrap(), vec![toggle(7, false), toggle(7, true)]);
}

#[tokio::test]
async fn different_affordances_do_not_wait_for_each_other() {
    let transport = ScriptedTransport::new(vec![Reply::Gated, Reply::Ok], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let toggling = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(toggle(7, false)).await }
    });
    wait_for_calls(&transport, 1).await;

    let archived = layer.perform_optimistic(archive(7)).await.unwrap();
    assert!(archived.archived);

    transport.release.notify_one();
    toggling.await.unwrap().unwrap();
}

#[tokio::test]
async fn manual_rollback_restores_the_snapshot() {
    let transport = ScriptedTransport::new(vec![Reply::Hang], vec![view(7, true)]);
    let layer = ReconciliationLayer::new(
        transport.clone(),
        ClientConfig::default().with_rollback_timeout(Duration::from_secs(30)),
    );
    layer.load(vec![view(7, true)]);

    let task = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;

    let action_id = layer.pending_actions()[0].id;
    assert!(layer.rollback(action_id));
    assert!(!layer.rollback(action_id));

    assert_eq!(
        task.await.unwrap().unwrap_err(),
        OptimisticActionFailure::RolledBack { action_id }
    );
    assert!(!layer.view(conv(7)).unwrap().archived);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn unknown_conversation_is_refused_without_a_request() {
    let transport = ScriptedTransport::new(vec![], vec![]);
    let layer = layer(transport.clone(), vec![]);

    assert_eq!(
        layer.perform_optimistic(archive(9)).await.unwrap_err(),
        OptimisticActionFailure::UnknownConversation(conv(9))
    );
    assert_eq!(transport.calls(), 0);
}

fn paused(id: i64) -> ConversationAiState {
    let mut state = ConversationAiState::new(TenantId::new(1), conv(id), false);
    state.paused_until = Some(Utc::now());
    state.pause_reason = Some(PauseReason::ManualMessage);
    state.paused_by_user_id = Some(UserId::new(3));
    state
}

#[tokio::test]
async fn fanout_state_is_applied_to_idle_conversations() {
    let transport = ScriptedTransport::new(vec![], vec![]);
    let layer = layer(transport, vec![view(7, true)]);
    let paused_state = paused(7);

    let event = RealtimeEvent::tenant(
        RealtimeEventType::ConversationListUpdated,
        TenantId::new(1),
        json!({ "conversation_id": 7, "ai_state": paused_state }),
    );
    assert_eq!(layer.apply_event(&event), EventEffect::Applied(conv(7)));
    assert_eq!(layer.view(conv(7)).unwrap().state, paused_state);

    let reactivated = RealtimeEvent::conversation(
        RealtimeEventType::AiReactivated,
        TenantId::new(1),
        conv(7),
        json!({ "conversation_id": 7, "ai_state": ConversationAiState::new(TenantId::new(1), conv(7), true) }),
    );
    assert_eq!(layer.apply_event(&reactivated), EventEffect::Applied(conv(7)));
    assert!(layer.view(conv(7)).unwrap().state.ai_active);

    let archived = RealtimeEvent::tenant(
        RealtimeEventType::ConversationListUpdated,
        TenantId::new(1),
        json!({ "conversation_id": 7, "archived": true }),
    );
    assert_eq!(layer.apply_event(&archived), EventEffect::Applied(conv(7)));
    assert!(layer.view(conv(7)).unwrap().archived);
}

#[tokio::test]
async fn fanout_state_waits_for_an_action_in_flight() {
    let transport = ScriptedTransport::new(vec![Reply::Gated], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let task = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(toggle(7, false)).await }
    });
    wait_for_calls(&transport, 1).await;

    let event = RealtimeEvent::tenant(
        RealtimeEventType::ConversationListUpdated,
        TenantId::new(1),
        json!({ "conversation_id": 7, "ai_state": paused(7) }),
    );
    assert_eq!(layer.apply_event(&event), EventEffect::Deferred(conv(7)));
    assert!(!layer.view(conv(7)).unwrap().state.ai_active);
    assert_eq!(layer.view(conv(7)).unwrap().state.pause_reason, None);

    transport.release.notify_one();
    task.await.unwrap().unwrap();
}

#[test]
fn tenant_wide_events_ask_for_a_resync() {
    let transport = ScriptedTransport::new(vec![], vec![]);
    let layer = ReconciliationLayer::new(transport, fast());

    let config = RealtimeEvent::tenant(
        RealtimeEventType::AiConfigChanged,
        TenantId::new(1),
        json!({ "verdict": { "active": true, "reason": "channel_connected" }, "updated": 3 }),
    );
    let cleared = RealtimeEvent::tenant(
        RealtimeEventType::ConversationListUpdated,
        TenantId::new(1),
        json!({ "pause_cleared": [4, 5] }),
    );
    let message = RealtimeEvent::tenant(RealtimeEventType::MessageNew, TenantId::new(1), json!({}));

    assert_eq!(layer.apply_event(&config), EventEffect::ResyncNeeded);
    assert_eq!(layer.apply_event(&cleared), EventEffect::ResyncNeeded);
    assert_eq!(layer.apply_event(&message), EventEffect::Ignored);
}

#[tokio::test]
async fn resync_skips_conversations_with_actions_in_flight() {
    let transport = ScriptedTransport::new(vec![Reply::Gated], vec![view(7, true), view(8, true)]);
    let layer = layer(transport.clone(), vec![view(7, true), view(8, true)]);

    let task = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;

    // Server changed conversation 8 while we were offline.
    transport.set_server(view(8, false));
    layer.connectivity().set_offline();

    let applied = layer.on_reconnect().await.unwrap();
    assert_eq!(applied, 1);
    assert!(!layer.view(conv(8)).unwrap().state.ai_active);
    assert!(layer.view(conv(7)).unwrap().archived);
    assert!(!layer.connectivity().is_offline());

    transport.release.notify_one();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn refresh_applies_when_no_action_is_in_flight() {
    let transport = ScriptedTransport::new(vec![], vec![view(7, false)]);
    let layer = layer(transport, vec![view(7, true)]);

    assert!(layer.refresh(conv(7)).await.unwrap());
    assert!(!layer.view(conv(7)).unwrap().state.ai_active);
}

#[tokio::test]
async fn failing_actions_on_one_conversation_only_undo_their_own_fields() {
    let network = || TransportError::Network("connection reset".into());
    let transport = ScriptedTransport::new(
        vec![
            Reply::GatedFail(network()),
            Reply::Fail(network()),
            Reply::Fail(network()),
            Reply::Fail(network()),
        ],
        vec![view(7, true)],
    );
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let archiving = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;

    let toggled = layer.perform_optimistic(toggle(7, false)).await.unwrap_err();
    assert!(matches!(toggled, OptimisticActionFailure::Failed { attempts: 2, .. }));

    // The archive is still in flight and keeps its prediction.
    let shown = layer.view(conv(7)).unwrap();
    assert!(shown.archived);
    assert!(shown.state.ai_active);

    transport.release.notify_one();
    assert!(archiving.await.unwrap().is_err());

    assert_eq!(transport.calls(), 4);
    assert_eq!(layer.view(conv(7)).unwrap(), view(7, true));
    assert!(layer.pending_actions().is_empty());
}

#[tokio::test]
async fn confirmed_view_keeps_the_prediction_of_a_sibling_action() {
    let transport = ScriptedTransport::new(vec![Reply::Gated, Reply::Ok], vec![view(7, true)]);
    let layer = layer(transport.clone(), vec![view(7, true)]);

    let archiving = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;

    let confirmed = layer.perform_optimistic(toggle(7, false)).await.unwrap();
    assert!(!confirmed.archived);
    let shown = layer.view(conv(7)).unwrap();
    assert!(shown.archived);
    assert!(!shown.state.ai_active);

    transport.release.notify_one();
    let archived = archiving.await.unwrap().unwrap();
    assert!(archived.archived);
    assert!(!archived.state.ai_active);
}

#[tokio::test]
async fn affordance_slots_are_dropped_once_settled() {
    let transport = ScriptedTransport::new(vec![Reply::Gated], vec![view(7, true), view(8, true)]);
    let layer = layer(transport.clone(), vec![view(7, true), view(8, true)]);

    let archiving = tokio::spawn({
        let layer = layer.clone();
        async move { layer.perform_optimistic(archive(7)).await }
    });
    wait_for_calls(&transport, 1).await;
    assert_eq!(layer.busy_affordances(), 1);

    layer.perform_optimistic(toggle(8, false)).await.unwrap();
    assert_eq!(layer.busy_affordances(), 1);

    transport.release.notify_one();
    archiving.await.unwrap().unwrap();
    assert_eq!(layer.busy_affordances(), 0);
}
