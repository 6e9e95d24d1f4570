//! Three-valued query outcome
//!
//! A policy query can end in an explicit yes, an explicit no, or no
//! applicable rule at all. The last case is a first-class outcome and is
//! kept apart from "explicitly denied".

use serde::{Deserialize, Serialize};

/// Outcome of a statement query or a condition group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Verdict {
    /// The requested effect applies
    Yes,
    /// A rule applied, but with a different effect
    No,
    /// No applicable rule
    #[default]
    Undetermined,
}

impl Verdict {
    /// `Some(true)`, `Some(false)` or `None` for undetermined
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Verdict::Yes => Some(true),
            Verdict::No => Some(false),
            Verdict::Undetermined => None,
        }
    }

    pub fn is_yes(self) -> bool {
        self == Verdict::Yes
    }

    pub fn is_undetermined(self) -> bool {
        self == Verdict::Undetermined
    }
}

impl From<bool> for Verdict {
    fn from(value: bool) -> Self {
        if value {
            Verdict::Yes
        } else {
            Verdict::No
        }
    }
}

impl From<Option<bool>> for Verdict {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(b) => b.into(),
            None => Verdict::Undetermined,
        }
    }
}

impl From<Verdict> for Option<bool> {
    fn from(value: Verdict) -> Self {
        value.as_bool()
    }
}
