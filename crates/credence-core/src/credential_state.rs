use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle of a credential offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferState {
    /// Offer is live and its pre-authorized code can be redeemed.
    Created,
    /// The code was redeemed. Final state.
    Consumed,
    /// The TTL elapsed before redemption. Final state.
    Expired,
}

impl OfferState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Consumed | Self::Expired)
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Consumed => write!(f, "Consumed"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

/// Events that move an offer through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferEvent {
    /// A holder redeemed the pre-authorized code before expiry.
    Redeem,
    /// The TTL elapsed (observed at redemption time or by the sweeper).
    Expire,
}

/// Offer transitions:
/// - Created → Consumed (Redeem)
/// - Created → Expired (Expire)
pub struct OfferStateMachine;

impl OfferStateMachine {
    pub fn transition(current: OfferState, event: OfferEvent) -> Result<OfferState, CoreError> {
        let new_state = match (current, event) {
            (OfferState::Created, OfferEvent::Redeem) => OfferState::Consumed,
            (OfferState::Created, OfferEvent::Expire) => OfferState::Expired,
            _ => {
                return Err(CoreError::InvalidOfferTransition {
                    from: current,
                    event: format!("{:?}", event),
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "offer state transition"
        );

        Ok(new_state)
    }
}

/// Status of an issued credential in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    Active,
    /// Permanently revoked. Final state.
    Revoked,
}

impl CredentialStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Revoked => write!(f, "Revoked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEvent {
    /// Issuer permanently revokes the credential.
    Revoke,
}

/// Issued credential transitions:
/// - Active → Revoked (Revoke)
pub struct CredentialStateMachine;

impl CredentialStateMachine {
    pub fn transition(
        current: CredentialStatus,
        event: CredentialEvent,
    ) -> Result<CredentialStatus, CoreError> {
        let new_state = match (current, event) {
            (CredentialStatus::Active, CredentialEvent::Revoke) => CredentialStatus::Revoked,
            _ => {
                return Err(CoreError::InvalidCredentialTransition {
                    from: current,
                    event: format!("{:?}", event),
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "credential state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(current: CredentialStatus, event: CredentialEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
