//! Tracked account model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an account came to be tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountCategory {
    /// The operator's own wallet
    Master,
    /// Added manually by the operator
    Followed,
    /// Promoted from a discovery candidate
    Discovered,
}

impl std::fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountCategory::Master => write!(f, "master"),
            AccountCategory::Followed => write!(f, "followed"),
            AccountCategory::Discovered => write!(f, "discovered"),
        }
    }
}

impl std::str::FromStr for AccountCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "master" => Ok(AccountCategory::Master),
            "followed" => Ok(AccountCategory::Followed),
            "discovered" => Ok(AccountCategory::Discovered),
            _ => Err(format!("Unknown account category: {}", s)),
        }
    }
}

/// A watched wallet. One record per address; removal only clears `active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub address: String,
    pub category: AccountCategory,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

impl TrackedAccount {
    pub fn new(address: impl Into<String>, category: AccountCategory) -> Self {
        Self {
            address: address.into(),
            category,
            active: true,
            added_at: Utc::now(),
        }
    }
}
