//! Registration states reported by the features and resource-provider APIs.

use crate::status::Status;
use crate::{Error, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegistrationState {
    /// Waiting on manual approval. Never self-resolves.
    Pending,
    Registering,
    Registered,
    Unregistering,
    NotRegistered,
    Unregistered,
    Processing,
}

impl RegistrationState {
    pub const ALL: [RegistrationState; 7] = [
        RegistrationState::Pending,
        RegistrationState::Registering,
        RegistrationState::Registered,
        RegistrationState::Unregistering,
        RegistrationState::NotRegistered,
        RegistrationState::Unregistered,
        RegistrationState::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Pending => "Pending",
            RegistrationState::Registering => "Registering",
            RegistrationState::Registered => "Registered",
            RegistrationState::Unregistering => "Unregistering",
            RegistrationState::NotRegistered => "NotRegistered",
            RegistrationState::Unregistered => "Unregistered",
            RegistrationState::Processing => "Processing",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| {
                Error::validation_with_context(
                    "unknown registration state",
                    ErrorContext::new()
                        .with_details(s)
                        .with_source("registration_state"),
                )
            })
    }
}

impl TryFrom<String> for RegistrationState {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RegistrationState> for String {
    fn from(s: RegistrationState) -> Self {
        s.as_str().to_string()
    }
}

impl From<RegistrationState> for Status {
    fn from(s: RegistrationState) -> Self {
        Status::new(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_case() {
        for raw in ["registered", "REGISTERED", "Registered"] {
            assert_eq!(
                raw.parse::<RegistrationState>().unwrap(),
                RegistrationState::Registered
            );
        }
        assert_eq!(
            "notregistered".parse::<RegistrationState>().unwrap(),
            RegistrationState::NotRegistered
        );
    }

    #[test]
    fn test_parse_unknown_is_validation_error() {
        let err = "RequiresApproval".parse::<RegistrationState>().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("RequiresApproval"));
    }

    #[test]
    fn test_every_state_roundtrips_through_display() {
        for st in RegistrationState::ALL {
            assert_eq!(st.to_string().parse::<RegistrationState>().unwrap(), st);
        }
    }

    #[test]
    fn test_serde_accepts_any_casing() {
        let st: RegistrationState = serde_json::from_str("\"UNREGISTERING\"").unwrap();
        assert_eq!(st, RegistrationState::Unregistering);
        assert_eq!(serde_json::to_string(&st).unwrap(), "\"Unregistering\"");
    }

    #[test]
    fn test_into_status_matches_reported_casing() {
        let status: Status = RegistrationState::Registered.into();
        assert_eq!(status, Status::new("REGISTERED"));
    }
}
