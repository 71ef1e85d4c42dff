//! Activation services: the rule engine over the stores and the pause expiry
//! reconciler.

pub mod engine;
pub mod reconciler;


pub use engine::{ActivationRuleEngine, OutboundMessage, PauseOutcome, RuleApplication, ToggleError};
pub use reconciler::{PauseExpiryReconciler, ReconcilerConfig, ReconcilerHandle, SweepReport};
