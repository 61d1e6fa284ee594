use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reconciliation status carried by each split.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    #[default]
    New,
    Cleared,
    Reconciled,
    Frozen,
    Void,
}

impl ReconcileState {
    /// Single-character flag persisted in storage.
    pub fn as_flag(self) -> char {
        match self {
            ReconcileState::New => 'n',
            ReconcileState::Cleared => 'c',
            ReconcileState::Reconciled => 'y',
            ReconcileState::Frozen => 'f',
            ReconcileState::Void => 'v',
        }
    }

    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            'n' => Some(ReconcileState::New),
            'c' => Some(ReconcileState::Cleared),
            'y' => Some(ReconcileState::Reconciled),
            'f' => Some(ReconcileState::Frozen),
            'v' => Some(ReconcileState::Void),
            _ => None,
        }
    }

    /// Whether the split contributes to the cleared balance.
    pub fn counts_as_cleared(self) -> bool {
        matches!(
            self,
            ReconcileState::Cleared | ReconcileState::Reconciled | ReconcileState::Frozen
        )
    }

    /// Whether the split contributes to the reconciled balance.
    pub fn counts_as_reconciled(self) -> bool {
        matches!(self, ReconcileState::Reconciled | ReconcileState::Frozen)
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_flag())
    }
}

impl FromStr for ReconcileState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(flag), None) => {
                Self::from_flag(flag).ok_or_else(|| format!("unknown reconcile flag: {s}"))
            }
            _ => match s {
                "new" => Ok(ReconcileState::New),
                "cleared" => Ok(ReconcileState::Cleared),
                "reconciled" => Ok(ReconcileState::Reconciled),
                "frozen" => Ok(ReconcileState::Frozen),
                "void" => Ok(ReconcileState::Void),
                other => Err(format!("unknown reconcile state: {other}")),
            },
        }
    }
}
