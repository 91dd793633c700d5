//! IEC 61850 functional constraints.
//!
//! A functional constraint classifies the role of a data attribute. It is
//! part of every MMS variable name a client reads or writes.

use crate::error::{IedClientError, Result};

/// Functional constraint (FC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionalConstraint {
    /// Status information
    ST,
    /// Measurands (analog values)
    MX,
    /// Setpoint
    SP,
    /// Substitution
    SV,
    /// Configuration
    CF,
    /// Description
    DC,
    /// Setting group
    SG,
    /// Setting group editable
    SE,
    /// Service response / service tracking
    SR,
    /// Operate received
    OR,
    /// Blocking
    BL,
    /// Extended definition
    EX,
    /// Control
    CO,
}

impl FunctionalConstraint {
    /// All functional constraints in definition order.
    pub const ALL: [Self; 13] = [
        Self::ST,
        Self::MX,
        Self::SP,
        Self::SV,
        Self::CF,
        Self::DC,
        Self::SG,
        Self::SE,
        Self::SR,
        Self::OR,
        Self::BL,
        Self::EX,
        Self::CO,
    ];

    /// Two-letter code of this FC.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ST => "ST",
            Self::MX => "MX",
            Self::SP => "SP",
            Self::SV => "SV",
            Self::CF => "CF",
            Self::DC => "DC",
            Self::SG => "SG",
            Self::SE => "SE",
            Self::SR => "SR",
            Self::OR => "OR",
            Self::BL => "BL",
            Self::EX => "EX",
            Self::CO => "CO",
        }
    }

    /// Parse a two-letter FC code.
    pub fn from_str_code(code: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|fc| fc.as_str() == code)
            .ok_or_else(|| {
                IedClientError::object_reference_invalid(format!("unknown functional constraint {code:?}"))
            })
    }
}

impl std::str::FromStr for FunctionalConstraint {
    type Err = IedClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_code(s)
    }
}

impl std::fmt::Display for FunctionalConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
