//! Token lifecycle state machine.
//!
//! `Pending -> Claimed -> Consumed`, with `Expired` and `Cancelled` as the
//! other terminal states. The transition function is pure: it owns no runtime
//! state and is always reconstructed from a freshly loaded row, so the
//! persisted `state` column is the single source of truth. The store's
//! conditional update is what makes a computed transition stick (or not)
//! under concurrency.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a login token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    Cancelled,
    Claimed,
    Consumed,
    Expired,
    #[default]
    Pending,
}

impl TokenState {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TokenState::Cancelled | TokenState::Consumed | TokenState::Expired
        )
    }

    /// States in which a token is still awaiting mobile action.
    pub fn is_active(&self) -> bool {
        matches!(self, TokenState::Pending | TokenState::Claimed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenState::Cancelled => "cancelled",
            TokenState::Claimed => "claimed",
            TokenState::Consumed => "consumed",
            TokenState::Expired => "expired",
            TokenState::Pending => "pending",
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive a token through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    Cancel,
    Claim,
    Consume,
    Expire,
}

impl TokenEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEvent::Cancel => "cancel",
            TokenEvent::Claim => "claim",
            TokenEvent::Consume => "consume",
            TokenEvent::Expire => "expire",
        }
    }
}

impl std::fmt::Display for TokenEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition was rejected.
///
/// `AlreadyConsumed` and `Expired` are split out from the generic variant
/// because they are expected outcomes of retried requests and race losers;
/// callers map them to specific user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error("token expired")]
    Expired,
    #[error("invalid transition: {event} from {from}")]
    InvalidTransition { event: TokenEvent, from: TokenState },
}

/// Compute the successor state for `event` applied to `state`.
///
/// `expired` is the time guard, evaluated by the caller against the row's
/// `expires_at`. Claim is advisory: consuming straight from `Pending` is
/// legal.
pub fn transition(
    state: TokenState,
    event: TokenEvent,
    expired: bool,
) -> Result<TokenState, TransitionError> {
    use TokenEvent::*;
    use TokenState::*;

    match (state, event) {
        (Pending, Claim) | (Pending, Consume) | (Claimed, Consume) if expired => {
            Err(TransitionError::Expired)
        }
        (Pending, Claim) => Ok(Claimed),
        (Pending, Consume) | (Claimed, Consume) => Ok(Consumed),
        (Pending, Cancel) | (Claimed, Cancel) => Ok(Cancelled),
        (Pending, Expire) | (Claimed, Expire) if expired => Ok(Expired),
        (Pending, Expire) | (Claimed, Expire) => Err(TransitionError::InvalidTransition {
            event,
            from: state,
        }),
        (Consumed, Consume) => Err(TransitionError::AlreadyConsumed),
        (Expired, Claim) | (Expired, Consume) => Err(TransitionError::Expired),
        (from, event) => Err(TransitionError::InvalidTransition { event, from }),
    }
}
