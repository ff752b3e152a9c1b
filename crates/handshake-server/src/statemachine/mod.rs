// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Challenge state machine (spec §4.7): a closed set of states and a
//! transition table. This module is pure — no I/O — so the record store
//! and any caller can both guard against illegal transitions with the
//! same logic.

use serde::{Deserialize, Serialize};

/// The lifecycle states of a `Challenge` (spec §3). Persisted as the raw
/// `&str` from [`ChallengeState::as_str`] in a `TEXT` column — converted at
/// the repository boundary in [`crate::db::challenges`] rather than via a
/// derived `sqlx::Type`, so the transition guard stays the single source of
/// truth independent of the column's on-disk representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeState {
    Pending,
    Notifying,
    WaitingResponse,
    Active,
    Declined,
    Timeout,
    Expired,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Notifying => "NOTIFYING",
            Self::WaitingResponse => "WAITING_RESPONSE",
            Self::Active => "ACTIVE",
            Self::Declined => "DECLINED",
            Self::Timeout => "TIMEOUT",
            Self::Expired => "EXPIRED",
        }
    }

    /// `state ∈ terminal ⇒` no further transitions (spec §3 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Declined | Self::Timeout | Self::Expired)
    }

    /// True iff `self -> next` is a permitted edge of the closed transition
    /// graph in spec §4.7. Any non-listed transition is rejected.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use ChallengeState::*;
        matches!(
            (self, next),
            (Pending, Notifying)
                | (Pending, Expired)
                | (Notifying, WaitingResponse)
                | (WaitingResponse, Active)
                | (WaitingResponse, Declined)
                | (WaitingResponse, Timeout)
        )
    }
}

impl std::fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChallengeState {
    type Err = crate::error::HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "NOTIFYING" => Ok(Self::Notifying),
            "WAITING_RESPONSE" => Ok(Self::WaitingResponse),
            "ACTIVE" => Ok(Self::Active),
            "DECLINED" => Ok(Self::Declined),
            "TIMEOUT" => Ok(Self::Timeout),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(crate::error::HandshakeError::Internal(format!(
                "unknown challenge state: {other}"
            ))),
        }
    }
}

/// Validate a transition, returning a `Conflict` error (spec §7: "transition
/// table violations [map] to Conflict") when the edge is not permitted.
pub fn guard_transition(
    from: ChallengeState,
    to: ChallengeState,
) -> Result<(), crate::error::HandshakeError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(crate::error::HandshakeError::Conflict(format!(
            "illegal challenge transition {from} -> {to}"
        )))
    }
}

/// A response to a wake-up, as a closed tagged variant (Design Note:
/// "Dynamic validation of response values... express them as closed
/// tagged variants with an explicit validator at the boundary").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeUpResponse {
    Accept,
    Decline,
}

impl std::str::FromStr for WakeUpResponse {
    type Err = crate::error::HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPT" => Ok(Self::Accept),
            "DECLINE" => Ok(Self::Decline),
            other => Err(crate::error::HandshakeError::Validation(format!(
                "invalid response: {other}, expected ACCEPT or DECLINE"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
