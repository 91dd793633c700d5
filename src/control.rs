//! Control objects: select, operate and cancel.
//!
//! A control object lives in the registry of its
//! [`IedConnection`](crate::IedConnection) and is addressed by a
//! [`ControlHandle`]. All protocol actions go through the short-lived
//! [`ControlObjectClient`] view returned by
//! [`IedConnection::control`](crate::IedConnection::control).
//!
//! ```text
//!            select / select_with_value
//!   Idle  ──────────────────────────────▶  Selected
//!    ▲  ▲                                     │
//!    │  └────────── operate / cancel ─────────┘
//!    │
//!    └── cancel ── OperatePending { oper_time } ◀── timed operate
//! ```
//!
//! A refusal by the server (interlock, synchrocheck, selected by another
//! client) is `Ok(false)`. Errors are reserved for local misuse, a missing
//! or unsupported object and connection failures.

use tracing::{debug, info, warn};

use crate::client::Session;
use crate::error::{IedClientError, Result};
use crate::transport::{MmsRequest, MmsResponse};
use crate::types::{
    ControlModel, FunctionalConstraint, LastApplError, MmsValue, ObjectReference, OrCat, Origin,
};

/// Handle of a control object registered with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlHandle(pub(crate) u32);

impl std::fmt::Display for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "control#{}", self.0)
    }
}

/// Client side state of a control object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    /// Nothing selected, nothing pending
    #[default]
    Idle,
    /// Exclusive access granted by the server (SBO models)
    Selected,
    /// A time activated operate was accepted and has not been cancelled
    OperatePending {
        /// Activation time, ms since epoch
        oper_time: u64,
    },
}

/// Which control elements the server exposes under `LN$CO$DO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ControlElements {
    pub sbo: bool,
    pub sbow: bool,
    pub cancel: bool,
    pub oper_tm: bool,
}

/// Registry entry of a controllable data object.
#[derive(Debug, Clone)]
pub(crate) struct ControlObject {
    reference: ObjectReference,
    domain: String,
    item: String,
    model: ControlModel,
    elements: ControlElements,
    ctl_val: MmsValue,
    ctl_num: u8,
    origin: Origin,
    interlock_check: bool,
    synchro_check: bool,
    test: bool,
    state: ControlState,
}

impl ControlObject {
    pub(crate) fn new(
        reference: ObjectReference,
        model: ControlModel,
        elements: ControlElements,
        ctl_val: MmsValue,
    ) -> Result<Self> {
        let domain = reference.domain_id()?;
        let item = reference.item_id(FunctionalConstraint::CO)?;

        Ok(Self {
            reference,
            domain,
            item,
            model,
            elements,
            ctl_val,
            ctl_num: 0,
            origin: Origin::default(),
            interlock_check: false,
            synchro_check: false,
            test: false,
            state: ControlState::Idle,
        })
    }

    pub(crate) fn object_reference(&self) -> &str {
        self.reference.element()
    }

    pub(crate) fn state(&self) -> ControlState {
        self.state
    }

    pub(crate) fn reset(&mut self) {
        self.state = ControlState::Idle;
    }

    fn variable(&self, element: &str) -> (String, String) {
        (self.domain.clone(), format!("{}${element}", self.item))
    }

    fn check(&self) -> MmsValue {
        let mut bits = 0u32;
        if self.interlock_check {
            bits |= 1 << 1;
        }
        if self.synchro_check {
            bits |= 1;
        }
        MmsValue::bit_string_from_integer(bits, 2)
    }

    fn check_ctl_val(&self, value: &MmsValue) -> Result<()> {
        if value.kind() != self.ctl_val.kind() {
            return Err(IedClientError::TypeMismatch {
                expected: self.ctl_val.kind(),
                actual: value.kind(),
            });
        }
        Ok(())
    }

    /// Oper / SBOw structure:
    /// `[ctlVal, operTm?, origin, ctlNum, T, Test, Check]`.
    fn operate_parameters(&self, ctl_val: MmsValue, oper_time: u64, now: u64) -> MmsValue {
        let mut params = Vec::with_capacity(7);
        params.push(ctl_val);
        if self.elements.oper_tm {
            params.push(MmsValue::utc_time(oper_time));
        }
        params.push(self.origin.to_mms_value());
        params.push(MmsValue::Unsigned(u32::from(self.ctl_num)));
        params.push(MmsValue::utc_time(now));
        params.push(MmsValue::Boolean(self.test));
        params.push(self.check());
        MmsValue::structure(params)
    }

    /// Cancel structure: `[ctlVal, operTm?, origin, ctlNum, T, Test]`.
    fn cancel_parameters(&self, oper_time: u64, now: u64) -> MmsValue {
        let mut params = Vec::with_capacity(6);
        params.push(self.ctl_val.clone());
        if self.elements.oper_tm {
            params.push(MmsValue::utc_time(oper_time));
        }
        params.push(self.origin.to_mms_value());
        params.push(MmsValue::Unsigned(u32::from(self.ctl_num)));
        params.push(MmsValue::utc_time(now));
        params.push(MmsValue::Boolean(self.test));
        MmsValue::structure(params)
    }

    fn require_controllable(&self) -> Result<()> {
        if self.model == ControlModel::StatusOnly {
            warn!(object = %self.reference, "control model is status-only");
            return Err(IedClientError::ServiceNotSupported);
        }
        Ok(())
    }

    fn require_sbo(&self, element_present: bool, element: &str) -> Result<()> {
        self.require_controllable()?;
        if !self.model.is_sbo() {
            warn!(object = %self.reference, model = %self.model, "select on a direct control model");
            return Err(IedClientError::ServiceNotSupported);
        }
        if !element_present {
            warn!(object = %self.reference, element, "control element not provided by server");
            return Err(IedClientError::ObjectAccessUnsupported);
        }
        Ok(())
    }
}

/// Current UTC time in ms since epoch.
fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Interpret the response to a control write.
///
/// A refused write is `Ok(false)`, except when the object is gone.
fn write_outcome(object: &ObjectReference, element: &str, response: MmsResponse) -> Result<bool> {
    match response {
        MmsResponse::WriteSuccess => Ok(true),
        MmsResponse::WriteFailure(err) if err.is_missing_object() => {
            warn!(object = %object, element, error = %err, "control element does not exist");
            Err(IedClientError::ObjectDoesNotExist)
        }
        MmsResponse::WriteFailure(err) => {
            warn!(object = %object, element, error = %err, "control action refused by server");
            Ok(false)
        }
        other => Err(IedClientError::Decode(format!(
            "unexpected response to write: {other:?}"
        ))),
    }
}

/// Operations on one control object of a connection.
pub struct ControlObjectClient<'a> {
    pub(crate) session: &'a mut Session,
    pub(crate) object: &'a mut ControlObject,
}

impl ControlObjectClient<'_> {
    /// Object reference `LD/LN.DO`.
    pub fn object_reference(&self) -> &str {
        self.object.object_reference()
    }

    /// Control model read at creation.
    pub fn control_model(&self) -> ControlModel {
        self.object.model
    }

    /// Current client side state.
    pub fn state(&self) -> ControlState {
        self.object.state
    }

    /// Check if the object supports time activated operate.
    pub fn has_time_activated_mode(&self) -> bool {
        self.object.elements.oper_tm
    }

    /// Control number of the last select with value or operate.
    pub fn ctl_num(&self) -> u8 {
        self.object.ctl_num
    }

    /// Ask the server to check interlocking on select and operate.
    pub fn enable_interlock_check(&mut self) {
        self.object.interlock_check = true;
    }

    /// Ask the server to check synchronism on select and operate.
    pub fn enable_synchro_check(&mut self) {
        self.object.synchro_check = true;
    }

    /// Originator attached to every following action.
    pub fn set_origin(&mut self, identifier: impl Into<String>, category: OrCat) {
        self.object.origin = Origin::new(identifier, category);
    }

    /// Set the `Test` flag of following actions.
    pub fn set_test_mode(&mut self, test: bool) {
        self.object.test = test;
    }

    /// Last LastApplError reported by the server for this object.
    pub fn last_appl_error(&self) -> Option<LastApplError> {
        self.session.last_appl_error_for(self.object.object_reference())
    }

    /// Select (SBO with normal security) by reading `SBO`.
    ///
    /// Returns `true` if the server granted the selection.
    pub async fn select(&mut self) -> Result<bool> {
        let object = &mut *self.object;
        object.require_sbo(object.elements.sbo, "SBO")?;

        let (domain, item) = object.variable("SBO");
        let response = self.session.request(MmsRequest::Read { domain, item }).await?;

        let selected = match response {
            MmsResponse::Read(MmsValue::VisibleString(s)) => !s.is_empty(),
            MmsResponse::Read(MmsValue::DataAccessError(err)) => {
                warn!(object = %object.reference, error = %err, "select refused by server");
                false
            }
            MmsResponse::Read(other) => {
                return Err(IedClientError::UnexpectedValueReceived(other.kind()));
            }
            other => {
                return Err(IedClientError::Decode(format!(
                    "unexpected response to read: {other:?}"
                )))
            }
        };

        if selected {
            object.state = ControlState::Selected;
            info!(object = %object.reference, "selected");
        } else {
            warn!(object = %object.reference, "select not granted");
        }
        Ok(selected)
    }

    /// Select with value (SBO with enhanced security) by writing `SBOw`.
    pub async fn select_with_value(&mut self, ctl_val: MmsValue) -> Result<bool> {
        let object = &mut *self.object;
        object.require_sbo(object.elements.sbow, "SBOw")?;
        object.check_ctl_val(&ctl_val)?;

        object.ctl_num = object.ctl_num.wrapping_add(1);
        let value = object.operate_parameters(ctl_val.clone(), 0, now_millis());
        let (domain, item) = object.variable("SBOw");
        let response = self
            .session
            .request(MmsRequest::Write {
                domain,
                item,
                value,
            })
            .await?;

        let selected = write_outcome(&object.reference, "SBOw", response)?;
        if selected {
            object.ctl_val = ctl_val;
            object.state = ControlState::Selected;
            info!(object = %object.reference, ctl_num = object.ctl_num, "selected with value");
        }
        Ok(selected)
    }

    /// Operate immediately.
    pub async fn operate(&mut self, ctl_val: MmsValue) -> Result<bool> {
        self.operate_at(ctl_val, 0).await
    }

    /// Operate at `oper_time` (UTC ms since epoch); `0` means immediately.
    ///
    /// Under an SBO model the object must be selected first, otherwise
    /// nothing is sent and `false` is returned. The selection is consumed
    /// whatever the outcome.
    pub async fn operate_at(&mut self, ctl_val: MmsValue, oper_time: u64) -> Result<bool> {
        let object = &mut *self.object;
        object.require_controllable()?;
        if oper_time != 0 && !object.elements.oper_tm {
            return Err(IedClientError::invalid_argument(format!(
                "{}: time activated operate not supported",
                object.reference
            )));
        }
        object.check_ctl_val(&ctl_val)?;

        if object.model.is_sbo() && object.state != ControlState::Selected {
            warn!(object = %object.reference, state = ?object.state, "operate without selection");
            return Ok(false);
        }

        object.ctl_num = object.ctl_num.wrapping_add(1);
        let value = object.operate_parameters(ctl_val.clone(), oper_time, now_millis());
        let (domain, item) = object.variable("Oper");
        object.state = ControlState::Idle;

        let response = self
            .session
            .request(MmsRequest::Write {
                domain,
                item,
                value,
            })
            .await?;

        let success = write_outcome(&object.reference, "Oper", response)?;
        if success {
            object.ctl_val = ctl_val;
            if oper_time != 0 {
                object.state = ControlState::OperatePending { oper_time };
            }
            info!(object = %object.reference, ctl_num = object.ctl_num, oper_time, "operated");
        }
        Ok(success)
    }

    /// Release a selection or abort a pending time activated operate.
    ///
    /// Returns `false` without contacting the server if nothing is
    /// selected or pending.
    pub async fn cancel(&mut self) -> Result<bool> {
        let object = &mut *self.object;
        let oper_time = match object.state {
            ControlState::Idle => {
                debug!(object = %object.reference, "nothing to cancel");
                return Ok(false);
            }
            ControlState::Selected => 0,
            ControlState::OperatePending { oper_time } => oper_time,
        };
        if !object.elements.cancel {
            warn!(object = %object.reference, "control element Cancel not provided by server");
            return Err(IedClientError::ObjectAccessUnsupported);
        }

        let value = object.cancel_parameters(oper_time, now_millis());
        let (domain, item) = object.variable("Cancel");
        let response = self
            .session
            .request(MmsRequest::Write {
                domain,
                item,
                value,
            })
            .await?;

        let cancelled = write_outcome(&object.reference, "Cancel", response)?;
        if cancelled {
            object.state = ControlState::Idle;
            info!(object = %object.reference, ctl_num = object.ctl_num, "cancelled");
        }
        Ok(cancelled)
    }
}
