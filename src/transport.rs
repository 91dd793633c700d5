//! MMS transport seam.
//!
//! The ISO/ACSE/MMS stack (association, BER encoding, TCP) lives behind
//! [`MmsTransport`]. The client hands it fully mapped MMS variable names and
//! typed values and gets typed values back. Unsolicited information reports
//! and the close of the association arrive on the event channel returned by
//! [`MmsTransport::connect`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{IedClientError, MmsError, Result};
use crate::types::{DataAccessError, MmsValue, VariableSpec};

/// Default MMS port (ISO-on-TCP).
pub const DEFAULT_PORT: u16 = 102;

/// A single confirmed MMS service request.
#[derive(Debug, Clone, PartialEq)]
pub enum MmsRequest {
    /// Read a named variable
    Read { domain: String, item: String },
    /// Write a named variable
    Write {
        domain: String,
        item: String,
        value: MmsValue,
    },
    /// Get the type description of a named variable
    GetVariableAccessAttributes { domain: String, item: String },
}

impl MmsRequest {
    /// Domain the request addresses.
    pub fn domain(&self) -> &str {
        match self {
            Self::Read { domain, .. }
            | Self::Write { domain, .. }
            | Self::GetVariableAccessAttributes { domain, .. } => domain,
        }
    }

    /// Item the request addresses.
    pub fn item(&self) -> &str {
        match self {
            Self::Read { item, .. }
            | Self::Write { item, .. }
            | Self::GetVariableAccessAttributes { item, .. } => item,
        }
    }
}

/// Confirmed response to an [`MmsRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum MmsResponse {
    /// Read result; may itself be a data access error
    Read(MmsValue),
    /// Write accepted
    WriteSuccess,
    /// Write refused for the item
    WriteFailure(DataAccessError),
    /// Variable access attributes
    VariableAccessAttributes(VariableSpec),
}

/// Unsolicited events from the association.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Information report. `domain` is `None` for a named variable list
    /// (e.g. `LastApplError`) and set for a domain specific variable.
    InformationReport {
        domain: Option<String>,
        name: String,
        value: MmsValue,
    },
    /// The association is gone
    Closed,
}

/// The MMS stack the client drives.
///
/// One request is outstanding at a time; the client serializes calls.
#[async_trait]
pub trait MmsTransport: Send {
    /// Open the TCP connection and the MMS association.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        params: &ConnectionParameters,
    ) -> std::result::Result<mpsc::Receiver<TransportEvent>, MmsError>;

    /// Send one confirmed request and wait for its response.
    async fn request(&mut self, request: MmsRequest) -> std::result::Result<MmsResponse, MmsError>;

    /// Graceful conclude/release handshake.
    async fn release(&mut self) -> std::result::Result<(), MmsError>;

    /// Abort the association without handshake.
    async fn abort(&mut self) -> std::result::Result<(), MmsError>;

    /// Drop the underlying socket.
    async fn close(&mut self);
}

/// ACSE/ISO layer parameters of an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Remote AP-title as object identifier arcs
    pub remote_ap_title: Vec<u32>,
    /// Remote AE-qualifier
    pub remote_ae_qualifier: i32,
    /// Local AP-title as object identifier arcs
    pub local_ap_title: Vec<u32>,
    /// Local AE-qualifier
    pub local_ae_qualifier: i32,
    /// Remote presentation selector
    pub remote_p_selector: u32,
    /// Remote session selector
    pub remote_s_selector: u16,
    /// Remote transport selector
    pub remote_t_selector: u16,
    /// Local presentation selector
    pub local_p_selector: u32,
    /// Local session selector
    pub local_s_selector: u16,
    /// Local transport selector
    pub local_t_selector: u16,
    password: Option<String>,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            remote_ap_title: vec![1, 1, 1, 999, 1],
            remote_ae_qualifier: 12,
            local_ap_title: vec![1, 1, 1, 999],
            local_ae_qualifier: 12,
            remote_p_selector: 1,
            remote_s_selector: 1,
            remote_t_selector: 1,
            local_p_selector: 1,
            local_s_selector: 1,
            local_t_selector: 1,
            password: None,
        }
    }
}

impl ConnectionParameters {
    /// Create parameters with the default AP-titles and selectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote AP-title from dotted notation (`1.1.1.999.1`).
    pub fn remote_ap_title(mut self, ap_title: &str, ae_qualifier: i32) -> Result<Self> {
        self.remote_ap_title = parse_ap_title(ap_title)?;
        self.remote_ae_qualifier = ae_qualifier;
        Ok(self)
    }

    /// Set the local AP-title from dotted notation.
    pub fn local_ap_title(mut self, ap_title: &str, ae_qualifier: i32) -> Result<Self> {
        self.local_ap_title = parse_ap_title(ap_title)?;
        self.local_ae_qualifier = ae_qualifier;
        Ok(self)
    }

    /// Set remote presentation, session and transport selectors.
    pub fn remote_addresses(mut self, p_selector: u32, s_selector: u16, t_selector: u16) -> Self {
        self.remote_p_selector = p_selector;
        self.remote_s_selector = s_selector;
        self.remote_t_selector = t_selector;
        self
    }

    /// Set local presentation, session and transport selectors.
    pub fn local_addresses(mut self, p_selector: u32, s_selector: u16, t_selector: u16) -> Self {
        self.local_p_selector = p_selector;
        self.local_s_selector = s_selector;
        self.local_t_selector = t_selector;
        self
    }

    /// Authenticate the association with a password.
    ///
    /// Fails if a password has already been set.
    pub fn use_password_authentication(&mut self, password: impl Into<String>) -> Result<()> {
        if self.password.is_some() {
            return Err(IedClientError::invalid_argument(
                "authentication parameter already set",
            ));
        }
        self.password = Some(password.into());
        Ok(())
    }

    /// Password, when password authentication is used.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

fn parse_ap_title(text: &str) -> Result<Vec<u32>> {
    let arcs = text
        .split('.')
        .map(|arc| arc.parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| IedClientError::invalid_argument(format!("invalid AP-title {text:?}")))?;
    if arcs.len() < 2 {
        return Err(IedClientError::invalid_argument(format!(
            "AP-title {text:?} needs at least two arcs"
        )));
    }
    Ok(arcs)
}
