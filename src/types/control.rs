//! Control service enumerations (IEC 61850-7-2 / 8-1).

use crate::error::{IedClientError, Result};
use crate::types::MmsValue;

/// Control model of a controllable data object (`ctlModel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlModel {
    /// Status only, no control (0)
    StatusOnly = 0,

    /// Direct control with normal security (1)
    DirectNormal = 1,

    /// Select before operate with normal security (2)
    SboNormal = 2,

    /// Direct control with enhanced security (3)
    DirectEnhanced = 3,

    /// Select before operate with enhanced security (4)
    SboEnhanced = 4,
}

impl ControlModel {
    /// Create from the raw `ctlModel` value.
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::StatusOnly),
            1 => Ok(Self::DirectNormal),
            2 => Ok(Self::SboNormal),
            3 => Ok(Self::DirectEnhanced),
            4 => Ok(Self::SboEnhanced),
            _ => Err(IedClientError::Decode(format!("invalid ctlModel {value}"))),
        }
    }

    /// Convert to raw value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the model requires a selection before operate.
    #[inline]
    pub const fn is_sbo(&self) -> bool {
        matches!(self, Self::SboNormal | Self::SboEnhanced)
    }

    /// Check if the model allows operate without selection.
    #[inline]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::DirectNormal | Self::DirectEnhanced)
    }

    /// Check if the model uses enhanced security.
    #[inline]
    pub const fn is_enhanced(&self) -> bool {
        matches!(self, Self::DirectEnhanced | Self::SboEnhanced)
    }
}

impl TryFrom<i64> for ControlModel {
    type Error = IedClientError;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_i64(value)
    }
}

impl std::fmt::Display for ControlModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StatusOnly => write!(f, "status-only"),
            Self::DirectNormal => write!(f, "direct-with-normal-security"),
            Self::SboNormal => write!(f, "sbo-with-normal-security"),
            Self::DirectEnhanced => write!(f, "direct-with-enhanced-security"),
            Self::SboEnhanced => write!(f, "sbo-with-enhanced-security"),
        }
    }
}

/// Originator category (`orCat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OrCat {
    /// Not supported (0)
    #[default]
    NotSupported = 0,

    /// Bay control (1)
    BayControl = 1,

    /// Station control (2)
    StationControl = 2,

    /// Remote control (3)
    RemoteControl = 3,

    /// Automatic bay (4)
    AutomaticBay = 4,

    /// Automatic station (5)
    AutomaticStation = 5,

    /// Automatic remote (6)
    AutomaticRemote = 6,

    /// Maintenance (7)
    Maintenance = 7,

    /// Process (8)
    Process = 8,
}

impl OrCat {
    /// Create from the raw `orCat` value.
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::NotSupported),
            1 => Ok(Self::BayControl),
            2 => Ok(Self::StationControl),
            3 => Ok(Self::RemoteControl),
            4 => Ok(Self::AutomaticBay),
            5 => Ok(Self::AutomaticStation),
            6 => Ok(Self::AutomaticRemote),
            7 => Ok(Self::Maintenance),
            8 => Ok(Self::Process),
            _ => Err(IedClientError::Decode(format!("invalid orCat {value}"))),
        }
    }

    /// Convert to raw value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Originator of a control action (`origin`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    /// Originator category
    pub category: OrCat,
    /// Originator identification, sent as an octet string
    pub identifier: Option<String>,
}

impl Origin {
    /// Create an origin.
    pub fn new(identifier: impl Into<String>, category: OrCat) -> Self {
        Self {
            category,
            identifier: Some(identifier.into()),
        }
    }

    /// Encode as the `origin` structure `{orCat, orIdent}`.
    pub fn to_mms_value(&self) -> MmsValue {
        let ident = self
            .identifier
            .as_deref()
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();
        MmsValue::structure([
            MmsValue::Integer(i64::from(self.category.as_u8())),
            MmsValue::octet_string(ident),
        ])
    }

    /// Decode the `origin` structure.
    pub fn from_mms_value(value: &MmsValue) -> Result<Self> {
        let category = OrCat::from_i64(value.element(0)?.as_i64()?)?;
        let ident = value.element(1)?.as_bytes()?;
        let identifier = if ident.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(ident).into_owned())
        };
        Ok(Self {
            category,
            identifier,
        })
    }
}

/// `Error` field of a LastApplError report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlError {
    /// No error (0)
    NoError = 0,
    /// Unknown (1)
    Unknown = 1,
    /// Timeout test not ok (2)
    TimeoutTestNotOk = 2,
    /// Operator test not ok (3)
    OperatorTestNotOk = 3,
}

impl ControlError {
    /// Create from raw value.
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::NoError),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::TimeoutTestNotOk),
            3 => Ok(Self::OperatorTestNotOk),
            _ => Err(IedClientError::Decode(format!("invalid control error {value}"))),
        }
    }
}

/// Additional cause of a negative control response (`AddCause`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlAddCause {
    /// Unknown cause
    Unknown = 0,
    /// Service not supported
    NotSupported = 1,
    /// Blocked by switching hierarchy
    BlockedBySwitchingHierarchy = 2,
    /// Select failed
    SelectFailed = 3,
    /// Invalid position
    InvalidPosition = 4,
    /// Position already reached
    PositionReached = 5,
    /// Parameter change in execution
    ParameterChangeInExecution = 6,
    /// Step limit reached
    StepLimit = 7,
    /// Blocked by mode
    BlockedByMode = 8,
    /// Blocked by process
    BlockedByProcess = 9,
    /// Blocked by interlocking
    BlockedByInterlocking = 10,
    /// Blocked by synchrocheck
    BlockedBySynchrocheck = 11,
    /// Command already in execution
    CommandAlreadyInExecution = 12,
    /// Blocked by health
    BlockedByHealth = 13,
    /// 1-of-n control active
    OneOfNControl = 14,
    /// Aborted by cancel
    AbortionByCancel = 15,
    /// Time limit over
    TimeLimitOver = 16,
    /// Aborted by trip
    AbortionByTrip = 17,
    /// Object not selected
    ObjectNotSelected = 18,
    /// Object already selected
    ObjectAlreadySelected = 19,
    /// No access authority
    NoAccessAuthority = 20,
    /// Ended with overshoot
    EndedWithOvershoot = 21,
    /// Aborted due to deviation
    AbortionDueToDeviation = 22,
    /// Aborted by communication loss
    AbortionByCommunicationLoss = 23,
    /// Blocked by command
    BlockedByCommand = 24,
    /// No additional cause
    None = 25,
    /// Inconsistent parameters
    InconsistentParameters = 26,
    /// Locked by another client
    LockedByOtherClient = 27,
}

impl ControlAddCause {
    const ALL: [Self; 28] = [
        Self::Unknown,
        Self::NotSupported,
        Self::BlockedBySwitchingHierarchy,
        Self::SelectFailed,
        Self::InvalidPosition,
        Self::PositionReached,
        Self::ParameterChangeInExecution,
        Self::StepLimit,
        Self::BlockedByMode,
        Self::BlockedByProcess,
        Self::BlockedByInterlocking,
        Self::BlockedBySynchrocheck,
        Self::CommandAlreadyInExecution,
        Self::BlockedByHealth,
        Self::OneOfNControl,
        Self::AbortionByCancel,
        Self::TimeLimitOver,
        Self::AbortionByTrip,
        Self::ObjectNotSelected,
        Self::ObjectAlreadySelected,
        Self::NoAccessAuthority,
        Self::EndedWithOvershoot,
        Self::AbortionDueToDeviation,
        Self::AbortionByCommunicationLoss,
        Self::BlockedByCommand,
        Self::None,
        Self::InconsistentParameters,
        Self::LockedByOtherClient,
    ];

    /// Create from raw value.
    pub fn from_i64(value: i64) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| IedClientError::Decode(format!("invalid AddCause {value}")))
    }

    /// Convert to raw value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Negative control response reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastApplError {
    /// Control object reference `LD/LN.DO`
    pub object_reference: String,
    /// Error class
    pub error: ControlError,
    /// Originator of the refused action, if reported
    pub origin: Option<Origin>,
    /// Control number of the refused action
    pub ctl_num: u8,
    /// Detailed cause
    pub add_cause: ControlAddCause,
}

impl LastApplError {
    /// Decode the `LastApplError` report structure
    /// `[CntrlObj, Error, Origin, ctlNum, AddCause]`.
    ///
    /// `CntrlObj` carries the MMS name (`LD/LN$CO$DO$Oper`); it is mapped back
    /// to the control object reference.
    pub fn from_mms_value(value: &MmsValue) -> Result<Self> {
        if value.size()? < 5 {
            return Err(IedClientError::Decode("LastApplError: too few elements".into()));
        }

        let cntrl_obj = value.element(0)?.as_str()?;
        let object_reference = cntrl_obj
            .split_once('/')
            .and_then(|(domain, item)| super::control_reference_from_mms(domain, item))
            .ok_or_else(|| IedClientError::Decode(format!("LastApplError: bad CntrlObj {cntrl_obj}")))?;

        let ctl_num = value.element(3)?.as_u32()?;

        Ok(Self {
            object_reference,
            error: ControlError::from_i64(value.element(1)?.as_i64()?)?,
            origin: Origin::from_mms_value(value.element(2)?).ok(),
            ctl_num: u8::try_from(ctl_num)
                .map_err(|_| IedClientError::Decode(format!("LastApplError: ctlNum {ctl_num}")))?,
            add_cause: ControlAddCause::from_i64(value.element(4)?.as_i64()?)?,
        })
    }
}
