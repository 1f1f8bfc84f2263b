use crate::foundation::{BabylonPublicKey, BtcPublicKey, ChainId, KeyName, ProviderError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a finality provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Created,
    Registered,
    Active,
    Inactive,
    Slashed,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderStatus::Created => "CREATED",
            ProviderStatus::Registered => "REGISTERED",
            ProviderStatus::Active => "ACTIVE",
            ProviderStatus::Inactive => "INACTIVE",
            ProviderStatus::Slashed => "SLASHED",
        };
        write!(f, "{}", name)
    }
}

const VALID_TRANSITIONS: &[(ProviderStatus, ProviderStatus)] = &[
    (ProviderStatus::Created, ProviderStatus::Registered),
    (ProviderStatus::Registered, ProviderStatus::Active),
    (ProviderStatus::Active, ProviderStatus::Inactive),
    (ProviderStatus::Inactive, ProviderStatus::Active),
    (ProviderStatus::Created, ProviderStatus::Slashed),
    (ProviderStatus::Registered, ProviderStatus::Slashed),
    (ProviderStatus::Active, ProviderStatus::Slashed),
    (ProviderStatus::Inactive, ProviderStatus::Slashed),
];

pub fn is_terminal(status: ProviderStatus) -> bool {
    matches!(status, ProviderStatus::Slashed)
}

/// A same-status transition is a no-op and always allowed.
pub fn validate_transition(from: ProviderStatus, to: ProviderStatus) -> Result<(), ProviderError> {
    if from == to || VALID_TRANSITIONS.contains(&(from, to)) {
        return Ok(());
    }
    Err(ProviderError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
}

/// Two signatures binding the Babylon key and the BTC key to each other:
/// `babylon_sig = sign_babylon(btc_pk)`, `btc_sig = sign_btc(babylon_sig)`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProofOfPossession {
    pub babylon_sig: Vec<u8>,
    pub btc_sig: Vec<u8>,
}

/// The persisted finality provider record, keyed by `btc_pk`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderRecord {
    pub babylon_pk: BabylonPublicKey,
    pub btc_pk: BtcPublicKey,
    pub key_name: KeyName,
    pub chain_id: ChainId,
    pub description: String,
    pub commission: String,
    pub pop: ProofOfPossession,
    pub last_voted_height: u64,
    pub last_processed_height: u64,
    pub status: ProviderStatus,
}

impl ProviderRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        babylon_pk: BabylonPublicKey,
        btc_pk: BtcPublicKey,
        key_name: KeyName,
        chain_id: ChainId,
        description: String,
        commission: String,
        pop: ProofOfPossession,
    ) -> Self {
        Self {
            babylon_pk,
            btc_pk,
            key_name,
            chain_id,
            description,
            commission,
            pop,
            last_voted_height: 0,
            last_processed_height: 0,
            status: ProviderStatus::Created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_allowed() {
        assert!(validate_transition(ProviderStatus::Created, ProviderStatus::Registered).is_ok());
        assert!(validate_transition(ProviderStatus::Registered, ProviderStatus::Active).is_ok());
        assert!(validate_transition(ProviderStatus::Active, ProviderStatus::Inactive).is_ok());
        assert!(validate_transition(ProviderStatus::Inactive, ProviderStatus::Active).is_ok());
    }

    #[test]
    fn every_non_terminal_status_can_be_slashed() {
        for status in [
            ProviderStatus::Created,
            ProviderStatus::Registered,
            ProviderStatus::Active,
            ProviderStatus::Inactive,
        ] {
            assert!(validate_transition(status, ProviderStatus::Slashed).is_ok());
        }
    }

    #[test]
    fn slashed_is_terminal() {
        assert!(is_terminal(ProviderStatus::Slashed));
        for to in [
            ProviderStatus::Created,
            ProviderStatus::Registered,
            ProviderStatus::Active,
            ProviderStatus::Inactive,
        ] {
            assert!(validate_transition(ProviderStatus::Slashed, to).is_err());
        }
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        assert!(validate_transition(ProviderStatus::Registered, ProviderStatus::Created).is_err());
        assert!(validate_transition(ProviderStatus::Active, ProviderStatus::Registered).is_err());
        assert!(validate_transition(ProviderStatus::Created, ProviderStatus::Active).is_err());
    }

    #[test]
    fn status_serializes_as_enum_name() {
        let json = serde_json::to_string(&ProviderStatus::Registered).unwrap();
        assert_eq!(json, "\"REGISTERED\"");
        let back: ProviderStatus = serde_json::from_str("\"SLASHED\"").unwrap();
        assert_eq!(back, ProviderStatus::Slashed);
    }
}
