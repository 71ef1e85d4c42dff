//! Per-conversation AI state.
//!
//! The tenant-level verdict is projected onto every conversation in bulk; a
//! human intervening in a conversation overrides that projection with a
//! time-boxed pause.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use assistsync_core::{ConversationId, DomainError, TenantId, UserId};

/// Why a conversation is paused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// A human sent a message (text or file) into the conversation.
    ManualMessage,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::ManualMessage => "manual_message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual_message" => Some(PauseReason::ManualMessage),
            _ => None,
        }
    }
}

/// How long a human intervention silences the assistant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PausePolicy {
    window: Duration,
}

impl PausePolicy {
    pub const DEFAULT_WINDOW_MINUTES: i64 = 15;
    /// One week.
    pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Window of `minutes`, clamped to `1..=MAX_WINDOW_MINUTES`.
    pub fn from_minutes(minutes: i64) -> Self {
        let minutes = minutes.clamp(1, Self::MAX_WINDOW_MINUTES);
        Self::new(Duration::try_minutes(minutes).unwrap_or_else(|| Duration::minutes(Self::DEFAULT_WINDOW_MINUTES)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for PausePolicy {
    fn default() -> Self {
        Self::from_minutes(Self::DEFAULT_WINDOW_MINUTES)
    }
}

/// Result of checking a paused conversation against the sweep clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReactivationDecision {
    /// Pause elapsed and the tenant verdict allows the assistant.
    Reactivate,
    /// Pause elapsed but the tenant verdict is off; clear the pause, stay inactive.
    HoldOff,
    /// Nothing to do (not paused, or pause still running).
    NotDue,
}

/// Assistant state of one conversation.
///
/// Invariants:
/// - `ai_active == false` whenever `paused_until` lies in the future;
/// - `paused_until.is_some()` implies `pause_reason.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAiState {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    pub ai_active: bool,
    pub paused_until: Option<DateTime<Utc>>,
    pub pause_reason: Option<PauseReason>,
    pub paused_by_user_id: Option<UserId>,
}

impl ConversationAiState {
    /// State of a freshly created conversation: the current tenant verdict, unpaused.
    pub fn new(tenant_id: TenantId, conversation_id: ConversationId, ai_active: bool) -> Self {
        Self {
            conversation_id,
            tenant_id,
            ai_active,
            paused_until: None,
            pause_reason: None,
            paused_by_user_id: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_reason.is_some()
    }

    /// `true` when the pause window has elapsed at `now` and the row still
    /// carries its pause marker.
    pub fn pause_expired(&self, now: DateTime<Utc>) -> bool {
        !self.ai_active
            && self.pause_reason.is_some()
            && self.paused_until.is_some_and(|until| until <= now)
    }

    /// Apply the tenant-level verdict. Pause markers are cleared: the bulk
    /// decision supersedes any earlier per-conversation override.
    pub fn with_bulk_verdict(&self, active: bool) -> Self {
        Self {
            ai_active: active,
            ..self.cleared()
        }
    }

    /// Pause the assistant on behalf of `user_id`.
    pub fn paused_by(&self, user_id: UserId, now: DateTime<Utc>, policy: PausePolicy) -> Self {
        Self {
            ai_active: false,
            paused_until: Some(
                now.checked_add_signed(policy.window())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            pause_reason: Some(PauseReason::ManualMessage),
            paused_by_user_id: Some(user_id),
            ..self.clone()
        }
    }

    /// Reactivate and clear pause fields.
    pub fn reactivated(&self) -> Self {
        Self {
            ai_active: true,
            ..self.cleared()
        }
    }

    /// Drop pause markers, keeping `ai_active` as it is.
    pub fn cleared(&self) -> Self {
        Self {
            paused_until: None,
            pause_reason: None,
            paused_by_user_id: None,
            ..self.clone()
        }
    }

    /// Decide what the expiry sweep does with this row.
    pub fn reactivation(&self, now: DateTime<Utc>, tenant_active: bool) -> ReactivationDecision {
        if !self.pause_expired(now) {
            ReactivationDecision::NotDue
        } else if tenant_active {
            ReactivationDecision::Reactivate
        } else {
            ReactivationDecision::HoldOff
        }
    }

    pub fn check_invariants(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.paused_until.is_some() && self.pause_reason.is_none() {
            return Err(DomainError::invariant("paused_until set without pause_reason"));
        }
        if self.ai_active && self.paused_until.is_some_and(|until| until > now) {
            return Err(DomainError::invariant("ai_active while pause window is running"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(active: bool) -> ConversationAiState {
        ConversationAiState::new(TenantId::new(9), ConversationId::new(42), active)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn pause_sets_window_reason_and_sender() {
        let paused = state(true).paused_by(UserId::new(5), t0(), PausePolicy::default());
        assert!(!paused.ai_active);
        assert_eq!(paused.paused_until, Some(t0() + Duration::minutes(15)));
        assert_eq!(paused.pause_reason, Some(PauseReason::ManualMessage));
        assert_eq!(paused.paused_by_user_id, Some(UserId::new(5)));
        paused.check_invariants(t0()).unwrap();
    }

    #[test]
    fn pause_window_is_clamped_and_never_overflows() {
        assert_eq!(PausePolicy::from_minutes(0).window(), Duration::minutes(1));
        assert_eq!(PausePolicy::from_minutes(i64::MAX).window(), Duration::days(7));

        let huge = PausePolicy::new(Duration::MAX);
        let paused = state(true).paused_by(UserId::new(5), t0(), huge);
        assert_eq!(paused.paused_until, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn pause_expiry_is_inclusive_at_the_boundary() {
        let paused = state(true).paused_by(UserId::new(5), t0(), PausePolicy::default());
        assert!(!paused.pause_expired(t0() + Duration::minutes(14)));
        assert!(paused.pause_expired(t0() + Duration::minutes(15)));
        assert!(paused.pause_expired(t0() + Duration::minutes(16)));
    }

    #[test]
    fn tenant_off_holds_expired_pause() {
        let paused = state(true).paused_by(UserId::new(5), t0(), PausePolicy::default());
        let later = t0() + Duration::minutes(16);
        assert_eq!(paused.reactivation(later, true), ReactivationDecision::Reactivate);
        assert_eq!(paused.reactivation(later, false), ReactivationDecision::HoldOff);
        assert_eq!(state(true).reactivation(later, true), ReactivationDecision::NotDue);
    }

    #[test]
    fn reactivated_clears_all_pause_fields() {
        let paused = state(true).paused_by(UserId::new(5), t0(), PausePolicy::default());
        let back = paused.reactivated();
        assert!(back.ai_active);
        assert!(back.paused_until.is_none());
        assert!(back.pause_reason.is_none());
        assert!(back.paused_by_user_id.is_none());
    }

    #[test]
    fn invariant_check_rejects_active_during_pause() {
        let mut broken = state(true).paused_by(UserId::new(5), t0(), PausePolicy::default());
        broken.ai_active = true;
        assert!(broken.check_invariants(t0()).is_err());

        let mut orphan = state(false);
        orphan.paused_until = Some(t0());
        assert!(orphan.check_invariants(t0()).is_err());
    }

    #[test]
    fn pause_policy_never_drops_below_one_minute() {
        assert_eq!(PausePolicy::from_minutes(0).window(), Duration::minutes(1));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the bulk projection always yields exactly the verdict and a valid row.
        #[test]
        fn bulk_verdict_is_exact_and_valid(
            initially_active in any::<bool>(),
            paused in any::<bool>(),
            verdict in any::<bool>(),
            minutes in 0i64..120,
        ) {
            let mut s = state(initially_active);
            if paused {
                s = s.paused_by(UserId::new(1), t0(), PausePolicy::from_minutes(minutes));
            }
            let projected = s.with_bulk_verdict(verdict);
            prop_assert_eq!(projected.ai_active, verdict);
            prop_assert!(projected.check_invariants(t0()).is_ok());
        }
    }
}
