use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raised when an identifier cannot be parsed from user input or storage.
#[derive(Debug, Error)]
#[error("invalid {kind} identifier '{value}'")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! guid_id {
    ($name:ident, $kind:literal) => {
        #[derive(
            Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| IdParseError {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

guid_id!(AccountId, "account");
guid_id!(TransactionId, "transaction");

/// Unique commodity name such as `ISO4217::USD`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommodityId(String);

impl CommodityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommodityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CommodityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CommodityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommodityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdParseError {
                kind: "commodity",
                value: s.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}
