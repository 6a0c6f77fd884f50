//! Behaviour selector

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PolicyError;

/// Admission policy for a domain. Persisted as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Behaviour {
    /// Reject everything not whitelisted
    Deny = 0,
    /// Accept session cookies and session storage only
    AllowSession = 1,
    /// Accept everything
    AllowAll = 2,
}

impl Behaviour {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Behaviour::Deny => "deny",
            Behaviour::AllowSession => "allow_session",
            Behaviour::AllowAll => "allow_all",
        }
    }

    /// Decode a value read back from extension storage.
    pub fn from_value(value: &Value) -> Result<Self, PolicyError> {
        match value.as_i64() {
            Some(raw) => Behaviour::try_from(raw),
            None => Err(PolicyError::MalformedBehaviour(value.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::from(self.as_i64())
    }
}

impl TryFrom<i64> for Behaviour {
    type Error = PolicyError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Behaviour::Deny),
            1 => Ok(Behaviour::AllowSession),
            2 => Ok(Behaviour::AllowAll),
            other => Err(PolicyError::InvalidBehaviour(other)),
        }
    }
}

impl From<Behaviour> for i64 {
    fn from(behaviour: Behaviour) -> Self {
        behaviour.as_i64()
    }
}

impl std::fmt::Display for Behaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_round_trip() {
        for behaviour in [Behaviour::Deny, Behaviour::AllowSession, Behaviour::AllowAll] {
            assert_eq!(Behaviour::try_from(behaviour.as_i64()).unwrap(), behaviour);
        }
        assert_eq!(serde_json::to_value(Behaviour::AllowAll).unwrap(), json!(2));
    }

    #[test]
    fn test_unknown_integer_rejected() {
        assert!(matches!(
            Behaviour::try_from(3),
            Err(PolicyError::InvalidBehaviour(3))
        ));
        assert!(serde_json::from_value::<Behaviour>(json!(7)).is_err());
        assert!(matches!(
            Behaviour::from_value(&json!("2")),
            Err(PolicyError::MalformedBehaviour(raw)) if raw == "\"2\""
        ));
    }
}
