//! IEC 61850 client connection.
//!
//! [`IedConnection`] owns one MMS association through an [`MmsTransport`],
//! maps object references to MMS variable names, normalizes every error into
//! [`IedClientError`] and keeps the registry of control objects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::control::{ControlElements, ControlHandle, ControlObject, ControlObjectClient, ControlState};
use crate::error::{IedClientError, MmsError, Result};
use crate::transport::{
    ConnectionParameters, MmsRequest, MmsResponse, MmsTransport, TransportEvent, DEFAULT_PORT,
};
use crate::types::{
    control_reference_from_mms, ControlModel, FunctionalConstraint, LastApplError, MmsValue,
    ObjectReference, Quality, VariableSpec,
};

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 5;

/// Capacity of the event channel handed out by [`IedConnection::subscribe`].
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Time allowed for TCP connect and association
    pub connect_timeout: Duration,
    /// Time allowed for each confirmed request
    pub request_timeout: Duration,
    /// ISO/ACSE parameters
    pub parameters: ConnectionParameters,
}

impl ClientConfig {
    /// Create a new configuration for the given host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            parameters: ConnectionParameters::default(),
        }
    }

    /// Set server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set ISO/ACSE parameters.
    pub fn parameters(mut self, parameters: ConnectionParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No association
    #[default]
    Disconnected,
    /// Association established
    Connected,
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Graceful release by this client
    Released,
    /// Abort by this client
    Aborted,
    /// Transport dropped by this client
    Closed,
    /// Closed by the server or the network
    Peer,
    /// Lost while a request was outstanding
    ConnectionLost,
}

/// Events emitted by the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum IedEvent {
    /// The connection closed. Sent exactly once per close.
    ConnectionClosed(CloseReason),
    /// Command termination report for a control object
    CommandTermination {
        /// Control object reference `LD/LN.DO`
        object_reference: String,
    },
    /// Negative control response
    LastApplError(LastApplError),
}

struct SharedState {
    state: ConnectionState,
    cancel: CancellationToken,
    subscriber: Option<mpsc::Sender<IedEvent>>,
    last_appl_error: Option<LastApplError>,
    last_appl_errors: HashMap<String, LastApplError>,
}

/// State shared between the connection and its notification pump.
pub(crate) struct Shared {
    inner: Mutex<SharedState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SharedState {
                state: ConnectionState::Disconnected,
                cancel: CancellationToken::new(),
                subscriber: None,
                last_appl_error: None,
                last_appl_errors: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Enter `Connected` with a fresh cancellation token.
    fn open(&self) -> CancellationToken {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Connected;
        inner.cancel = CancellationToken::new();
        inner.last_appl_error = None;
        inner.last_appl_errors.clear();
        inner.cancel.clone()
    }

    fn token(&self) -> CancellationToken {
        self.inner.lock().cancel.clone()
    }

    /// Leave `Connected`. Returns `false` if already closed, in which case
    /// no event is sent.
    fn mark_closed(&self, reason: CloseReason) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return false;
        }
        inner.state = ConnectionState::Disconnected;
        inner.cancel.cancel();
        info!(?reason, "connection closed");
        Self::emit(&mut inner, IedEvent::ConnectionClosed(reason));
        true
    }

    fn emit(inner: &mut SharedState, event: IedEvent) {
        let Some(subscriber) = inner.subscriber.as_ref() else {
            return;
        };
        match subscriber.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                inner.subscriber = None;
            }
        }
    }

    fn subscribe(&self) -> mpsc::Receiver<IedEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.inner.lock().subscriber = Some(tx);
        rx
    }

    fn handle_report(&self, domain: Option<&str>, name: &str, value: &MmsValue) {
        match domain {
            None if name == "LastApplError" => match LastApplError::from_mms_value(value) {
                Ok(err) => {
                    warn!(
                        object = %err.object_reference,
                        error = ?err.error,
                        add_cause = ?err.add_cause,
                        ctl_num = err.ctl_num,
                        "LastApplError received"
                    );
                    let mut inner = self.inner.lock();
                    inner
                        .last_appl_errors
                        .insert(err.object_reference.clone(), err.clone());
                    inner.last_appl_error = Some(err.clone());
                    Self::emit(&mut inner, IedEvent::LastApplError(err));
                }
                Err(e) => warn!(error = %e, "malformed LastApplError report"),
            },
            None => debug!(name, "report for unknown variable list ignored"),
            Some(domain) => match control_reference_from_mms(domain, name) {
                Some(object_reference) => {
                    info!(object = %object_reference, "command termination");
                    let mut inner = self.inner.lock();
                    Self::emit(&mut inner, IedEvent::CommandTermination { object_reference });
                }
                None => debug!(domain, name, "information report ignored"),
            },
        }
    }
}

/// A failed connect or association is always a connection error.
fn connect_error(err: MmsError) -> IedClientError {
    let reason = err.to_string();
    match IedClientError::from(err) {
        e if e.is_connection_error() => e,
        _ => IedClientError::ConnectionRejected(reason),
    }
}

/// Drain transport events until the association closes or the session is
/// cancelled.
async fn run_pump(
    mut events: mpsc::Receiver<TransportEvent>,
    shared: Arc<Shared>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::InformationReport {
                domain,
                name,
                value,
            }) => shared.handle_report(domain.as_deref(), &name, &value),
            Some(TransportEvent::Closed) | None => {
                shared.mark_closed(CloseReason::Peer);
                break;
            }
        }
    }
    debug!("notification pump stopped");
}

/// The transport session: everything a request needs.
pub(crate) struct Session {
    transport: Box<dyn MmsTransport>,
    config: ClientConfig,
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    /// Send one request. Resolves to `ConnectionLost` if the connection
    /// closes while waiting.
    pub(crate) async fn request(&mut self, request: MmsRequest) -> Result<MmsResponse> {
        if self.shared.state() != ConnectionState::Connected {
            return Err(IedClientError::NotConnected);
        }
        debug!(domain = request.domain(), item = request.item(), "MMS request");

        let token = self.shared.token();
        let request_timeout = self.config.request_timeout;

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(IedClientError::ConnectionLost),
            response = timeout(request_timeout, self.transport.request(request)) => match response {
                Ok(response) => response.map_err(IedClientError::from),
                Err(_) => Err(IedClientError::Timeout),
            },
        };

        if matches!(result, Err(IedClientError::ConnectionLost)) {
            self.shared.mark_closed(CloseReason::ConnectionLost);
        }
        result
    }

    /// Read a variable. A data access error in place of the value is mapped.
    pub(crate) async fn read(&mut self, domain: String, item: String) -> Result<MmsValue> {
        match self.request(MmsRequest::Read { domain, item }).await? {
            MmsResponse::Read(MmsValue::DataAccessError(err)) => Err(err.to_client_error()),
            MmsResponse::Read(value) => Ok(value),
            other => Err(IedClientError::Decode(format!(
                "unexpected response to read: {other:?}"
            ))),
        }
    }

    pub(crate) async fn write(&mut self, domain: String, item: String, value: MmsValue) -> Result<()> {
        match self.request(MmsRequest::Write { domain, item, value }).await? {
            MmsResponse::WriteSuccess => Ok(()),
            MmsResponse::WriteFailure(err) => Err(err.to_client_error()),
            other => Err(IedClientError::Decode(format!(
                "unexpected response to write: {other:?}"
            ))),
        }
    }

    pub(crate) async fn variable_spec(&mut self, domain: String, item: String) -> Result<VariableSpec> {
        match self
            .request(MmsRequest::GetVariableAccessAttributes { domain, item })
            .await?
        {
            MmsResponse::VariableAccessAttributes(spec) => Ok(spec),
            other => Err(IedClientError::Decode(format!(
                "unexpected response to get variable access attributes: {other:?}"
            ))),
        }
    }

    pub(crate) fn last_appl_error_for(&self, object_reference: &str) -> Option<LastApplError> {
        self.shared
            .inner
            .lock()
            .last_appl_errors
            .get(object_reference)
            .cloned()
    }

    async fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            self.shared.token().cancel();
            let _ = pump.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.token().cancel();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// IEC 61850 client connection.
pub struct IedConnection {
    session: Session,
    controls: HashMap<ControlHandle, ControlObject>,
    next_handle: u32,
}

impl IedConnection {
    /// Create a connection over the given transport. Nothing is sent yet.
    pub fn new(config: ClientConfig, transport: impl MmsTransport + 'static) -> Self {
        Self {
            session: Session {
                transport: Box::new(transport),
                config,
                shared: Arc::new(Shared::new()),
                pump: None,
            },
            controls: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.shared.state()
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.session.config
    }

    /// Subscribe to connection events.
    ///
    /// Only one subscriber exists: subscribing again replaces (and closes)
    /// the previous receiver.
    pub fn subscribe(&mut self) -> mpsc::Receiver<IedEvent> {
        self.session.shared.subscribe()
    }

    /// Connect and establish the MMS association.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            return Err(IedClientError::AlreadyConnected);
        }
        self.session.stop_pump().await;

        let config = &self.session.config;
        info!(host = %config.host, port = config.port, "connecting");

        let events = match timeout(
            config.connect_timeout,
            self.session
                .transport
                .connect(&config.host, config.port, &config.parameters),
        )
        .await
        {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                warn!(error = %e, "connect failed");
                return Err(connect_error(e));
            }
            Err(_) => {
                warn!(timeout = ?config.connect_timeout, "connect timed out");
                return Err(IedClientError::ConnectionRejected(format!(
                    "connect timeout after {:?}",
                    config.connect_timeout
                )));
            }
        };

        let token = self.session.shared.open();
        for object in self.controls.values_mut() {
            object.reset();
        }
        self.session.pump = Some(tokio::spawn(run_pump(
            events,
            Arc::clone(&self.session.shared),
            token,
        )));

        info!("connected");
        Ok(())
    }

    /// Abort the association without release handshake.
    pub async fn abort(&mut self) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(IedClientError::NotConnected);
        }

        self.session.shared.mark_closed(CloseReason::Aborted);
        if let Err(e) = self.session.transport.abort().await {
            warn!(error = %e, "transport abort failed");
        }
        self.session.stop_pump().await;

        info!("aborted");
        Ok(())
    }

    /// Release the association gracefully.
    pub async fn release(&mut self) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(IedClientError::NotConnected);
        }

        let result = match timeout(self.session.config.request_timeout, self.session.transport.release()).await {
            Ok(result) => result.map_err(IedClientError::from),
            Err(_) => Err(IedClientError::Timeout),
        };

        match result {
            Ok(()) => {
                self.session.shared.mark_closed(CloseReason::Released);
                self.session.transport.close().await;
                self.session.stop_pump().await;
                info!("released");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "release failed");
                if e.is_connection_error() {
                    self.session.shared.mark_closed(CloseReason::ConnectionLost);
                    self.session.stop_pump().await;
                }
                Err(e)
            }
        }
    }

    /// Drop the transport without abort or release.
    pub async fn close(&mut self) {
        self.session.shared.mark_closed(CloseReason::Closed);
        self.session.transport.close().await;
        self.session.stop_pump().await;
    }

    /// Read a data attribute or object.
    pub async fn read_value(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<MmsValue> {
        let (domain, item) = ObjectReference::parse(reference)?.mms_variable(Some(fc))?;
        self.session.read(domain, item).await
    }

    /// Write a data attribute or object.
    pub async fn write_value(
        &mut self,
        reference: &str,
        fc: FunctionalConstraint,
        value: MmsValue,
    ) -> Result<()> {
        let (domain, item) = ObjectReference::parse(reference)?.mms_variable(Some(fc))?;
        self.session.write(domain, item, value).await
    }

    async fn read_typed<T>(
        &mut self,
        reference: &str,
        fc: FunctionalConstraint,
        convert: impl FnOnce(&MmsValue) -> Result<T>,
    ) -> Result<T> {
        let value = self.read_value(reference, fc).await?;
        convert(&value).map_err(|_| IedClientError::UnexpectedValueReceived(value.kind()))
    }

    /// Read a boolean attribute.
    pub async fn read_boolean(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<bool> {
        self.read_typed(reference, fc, MmsValue::as_bool).await
    }

    /// Read a floating point attribute.
    pub async fn read_float(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<f32> {
        self.read_typed(reference, fc, MmsValue::as_f32).await
    }

    /// Read a visible or unicode string attribute.
    pub async fn read_string(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<String> {
        self.read_typed(reference, fc, |v| v.as_str().map(str::to_owned))
            .await
    }

    /// Read a signed integer attribute.
    pub async fn read_i64(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<i64> {
        self.read_typed(reference, fc, MmsValue::as_i64).await
    }

    /// Read an unsigned integer attribute.
    pub async fn read_u32(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<u32> {
        self.read_typed(reference, fc, MmsValue::as_u32).await
    }

    /// Read a UTC time attribute as ms since epoch.
    pub async fn read_timestamp(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<u64> {
        self.read_typed(reference, fc, MmsValue::as_utc_time_millis)
            .await
    }

    /// Read a quality attribute (13 bit bit string).
    pub async fn read_quality(&mut self, reference: &str, fc: FunctionalConstraint) -> Result<Quality> {
        self.read_typed(reference, fc, Quality::from_mms_value).await
    }

    /// Get the MMS type description of a data attribute or object.
    pub async fn get_variable_specification(
        &mut self,
        reference: &str,
        fc: FunctionalConstraint,
    ) -> Result<VariableSpec> {
        let (domain, item) = ObjectReference::parse(reference)?.mms_variable(Some(fc))?;
        self.session.variable_spec(domain, item).await
    }

    /// Last LastApplError received on this connection.
    pub fn last_appl_error(&self) -> Option<LastApplError> {
        self.session.shared.inner.lock().last_appl_error.clone()
    }

    /// Create a control object for `LD/LN.DO`.
    ///
    /// Reads the control model and the available control elements from the
    /// server.
    pub async fn create_control_object(&mut self, reference: &str) -> Result<ControlHandle> {
        let parsed = ObjectReference::parse(reference)?;
        let reference = ObjectReference::new(parsed.element())?;
        let domain = reference.domain_id()?;

        let ctl_model = format!("{}$ctlModel", reference.item_id(FunctionalConstraint::CF)?);
        let model = match self.session.read(domain.clone(), ctl_model).await? {
            MmsValue::Integer(v) => ControlModel::from_i64(v)?,
            MmsValue::Unsigned(v) => ControlModel::from_i64(i64::from(v))?,
            other => return Err(IedClientError::UnexpectedValueReceived(other.kind())),
        };

        let spec = self
            .session
            .variable_spec(domain, reference.item_id(FunctionalConstraint::CO)?)
            .await?;
        let Some(oper) = spec.child("Oper") else {
            warn!(object = %reference, "control is missing required element Oper");
            return Err(IedClientError::ObjectDoesNotExist);
        };
        let Some(ctl_val) = oper.child("ctlVal") else {
            warn!(object = %reference, "Oper is missing ctlVal");
            return Err(IedClientError::ObjectDoesNotExist);
        };

        let elements = ControlElements {
            sbo: spec.has_child("SBO"),
            sbow: spec.has_child("SBOw"),
            cancel: spec.has_child("Cancel"),
            oper_tm: oper.has_child("operTm"),
        };
        let object = ControlObject::new(reference, model, elements, ctl_val.default_value())?;

        let handle = ControlHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        info!(object = object.object_reference(), %model, %handle, "control object created");
        self.controls.insert(handle, object);
        Ok(handle)
    }

    /// Access a control object.
    pub fn control(&mut self, handle: ControlHandle) -> Result<ControlObjectClient<'_>> {
        let object = self
            .controls
            .get_mut(&handle)
            .ok_or_else(|| IedClientError::invalid_argument(format!("unknown {handle}")))?;
        Ok(ControlObjectClient {
            session: &mut self.session,
            object,
        })
    }

    /// Remove a control object from the registry. No protocol action is
    /// sent; a selection held on the server is not cancelled.
    pub fn release_control_object(&mut self, handle: ControlHandle) -> Result<()> {
        let object = self
            .controls
            .remove(&handle)
            .ok_or_else(|| IedClientError::invalid_argument(format!("unknown {handle}")))?;
        if object.state() == ControlState::Selected {
            warn!(object = object.object_reference(), "control object released while selected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHandle, MockTransport};
    use crate::types::{ControlAddCause, DataAccessError, OrCat, Origin, TypeSpec, Validity};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Clone, Copy)]
    struct TestServer {
        model: i64,
        oper_tm: bool,
        interlocked: bool,
        grant_select: bool,
    }

    impl TestServer {
        fn new(model: ControlModel) -> Self {
            Self {
                model: i64::from(model.as_u8()),
                oper_tm: false,
                interlocked: false,
                grant_select: true,
            }
        }

        fn control_spec(&self) -> VariableSpec {
            let mut oper = vec![VariableSpec::new("ctlVal", TypeSpec::Boolean)];
            if self.oper_tm {
                oper.push(VariableSpec::new("operTm", TypeSpec::UtcTime));
            }
            oper.extend([
                VariableSpec::new(
                    "origin",
                    TypeSpec::Structure(vec![
                        VariableSpec::new("orCat", TypeSpec::Integer(8)),
                        VariableSpec::new("orIdent", TypeSpec::OctetString),
                    ]),
                ),
                VariableSpec::new("ctlNum", TypeSpec::Unsigned(8)),
                VariableSpec::new("T", TypeSpec::UtcTime),
                VariableSpec::new("Test", TypeSpec::Boolean),
                VariableSpec::new("Check", TypeSpec::BitString(2)),
            ]);
            let oper = VariableSpec::new("Oper", TypeSpec::Structure(oper));

            let mut sbow = oper.clone();
            sbow.name = "SBOw".into();
            VariableSpec::new(
                "Pos",
                TypeSpec::Structure(vec![
                    VariableSpec::new("SBO", TypeSpec::VisibleString),
                    sbow,
                    oper,
                    VariableSpec::new("Cancel", TypeSpec::Structure(vec![])),
                ]),
            )
        }

        fn respond(&self, request: &MmsRequest) -> std::result::Result<MmsResponse, MmsError> {
            match request {
                MmsRequest::Read { item, .. } if item == "CSWI1$CF$Pos$ctlModel" => {
                    Ok(MmsResponse::Read(MmsValue::Integer(self.model)))
                }
                MmsRequest::Read { item, .. } if item == "CSWI1$CO$Pos$SBO" => {
                    let granted = if self.grant_select { "LD1/CSWI1$CO$Pos$SBO" } else { "" };
                    Ok(MmsResponse::Read(MmsValue::visible_string(granted)))
                }
                MmsRequest::Read { item, .. } if item == "MMXU1$MX$TotW$q" => {
                    let mut q = Quality::default();
                    q.set_validity(Validity::Questionable);
                    Ok(MmsResponse::Read(q.to_mms_value()))
                }
                MmsRequest::Read { item, .. } if item == "MMXU1$MX$TotW$mag$f" => {
                    Ok(MmsResponse::Read(MmsValue::Float(12.5)))
                }
                MmsRequest::Read { .. } => Ok(MmsResponse::Read(MmsValue::data_access_error(
                    DataAccessError::ObjectNonExistent,
                ))),
                MmsRequest::GetVariableAccessAttributes { item, .. } if item == "CSWI1$CO$Pos" => {
                    Ok(MmsResponse::VariableAccessAttributes(self.control_spec()))
                }
                MmsRequest::GetVariableAccessAttributes { .. } => Err(MmsError::ObjectNonExistent),
                MmsRequest::Write { value, .. } => {
                    let interlock_requested = value
                        .elements()
                        .ok()
                        .and_then(|mut e| e.find_map(|v| v.bit_string_bit(1).ok()))
                        .unwrap_or(false);
                    if self.interlocked && interlock_requested {
                        Ok(MmsResponse::WriteFailure(DataAccessError::TemporarilyUnavailable))
                    } else {
                        Ok(MmsResponse::WriteSuccess)
                    }
                }
            }
        }
    }

    async fn connected(server: TestServer) -> (IedConnection, MockHandle) {
        let (transport, mock) = MockTransport::new();
        mock.on_request(move |req| server.respond(req));
        let mut conn = IedConnection::new(ClientConfig::new("localhost"), transport);
        assert_ok!(conn.connect().await);
        (conn, mock)
    }

    async fn with_control(server: TestServer) -> (IedConnection, MockHandle, ControlHandle) {
        let (mut conn, mock) = connected(server).await;
        let handle = assert_ok!(conn.create_control_object("LD1/CSWI1.Pos").await);
        mock.clear_requests();
        (conn, mock, handle)
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("10.0.0.1")
            .port(10102)
            .request_timeout(Duration::from_secs(2));
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 10102);
        assert_eq!(config.connect_timeout, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(ClientConfig::new("x").port, 102);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let (transport, _mock) = MockTransport::new();
        let mut conn = IedConnection::new(ClientConfig::new("localhost"), transport);

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(conn.abort().await, Err(IedClientError::NotConnected)));
        assert!(matches!(conn.release().await, Err(IedClientError::NotConnected)));
        assert!(matches!(
            conn.read_value("LD1/LLN0.Mod.stVal", FunctionalConstraint::ST).await,
            Err(IedClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_already_connected() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(matches!(conn.connect().await, Err(IedClientError::AlreadyConnected)));
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let (transport, mock) = MockTransport::new();
        mock.fail_connect(MmsError::ConnectionRejected("ACSE refused".into()));
        let mut conn = IedConnection::new(ClientConfig::new("localhost"), transport);

        let err = assert_err!(conn.connect().await);
        assert!(matches!(err, IedClientError::ConnectionRejected(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert_ok!(conn.connect().await);
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        for failure in [
            MmsError::AccessDenied,
            MmsError::Other("acse".into()),
            MmsError::Decode("bad aare".into()),
            MmsError::ServiceTimeout,
        ] {
            let (transport, mock) = MockTransport::new();
            mock.fail_connect(failure);
            let mut conn = IedConnection::new(ClientConfig::new("localhost"), transport);

            let err = assert_err!(conn.connect().await);
            assert!(err.is_connection_error(), "{err:?}");
            assert!(matches!(err, IedClientError::ConnectionRejected(_)));
            assert_eq!(conn.state(), ConnectionState::Disconnected);
        }

        let (transport, mock) = MockTransport::new();
        mock.fail_connect(MmsError::ConnectionLost);
        let mut conn = IedConnection::new(ClientConfig::new("localhost"), transport);
        assert!(matches!(conn.connect().await, Err(IedClientError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_abort_fires_closed_once() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let mut events = conn.subscribe();

        assert_ok!(conn.abort().await);
        assert_eq!(mock.aborts(), 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.try_recv().unwrap(),
            IedEvent::ConnectionClosed(CloseReason::Aborted)
        );

        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
        assert!(matches!(conn.abort().await, Err(IedClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_release() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let mut events = conn.subscribe();

        assert_ok!(conn.release().await);
        assert_eq!(mock.releases(), 1);
        assert_eq!(mock.closes(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            IedEvent::ConnectionClosed(CloseReason::Released)
        );
        assert!(events.try_recv().is_err());

        assert_ok!(conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_server_close() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let mut events = conn.subscribe();

        mock.inject(TransportEvent::Closed).await;
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(IedEvent::ConnectionClosed(CloseReason::Peer)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.close().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resubscribe_replaces() {
        let (mut conn, _mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let mut first = conn.subscribe();
        let mut second = conn.subscribe();

        conn.close().await;
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(
            second.try_recv().unwrap(),
            IedEvent::ConnectionClosed(CloseReason::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_outstanding_request() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        mock.delay_requests(Duration::from_secs(3));

        let injector = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            injector.inject(TransportEvent::Closed).await;
        });

        let err = assert_err!(conn.read_value("LD1/MMXU1.TotW.mag.f", FunctionalConstraint::MX).await);
        assert!(matches!(err, IedClientError::ConnectionLost));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        mock.delay_requests(Duration::from_secs(60));

        let err = assert_err!(conn.read_value("LD1/MMXU1.TotW.mag.f", FunctionalConstraint::MX).await);
        assert!(matches!(err, IedClientError::Timeout));
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_typed_reads() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;

        let f = assert_ok!(conn.read_float("LD1/MMXU1.TotW.mag.f", FunctionalConstraint::MX).await);
        assert_eq!(f, 12.5);
        assert_eq!(
            mock.requests()[0],
            MmsRequest::Read {
                domain: "LD1".into(),
                item: "MMXU1$MX$TotW$mag$f".into()
            }
        );

        let q = assert_ok!(conn.read_quality("LD1/MMXU1.TotW.q", FunctionalConstraint::MX).await);
        assert_eq!(q.validity(), Validity::Questionable);

        let err = assert_err!(conn.read_boolean("LD1/MMXU1.TotW.mag.f", FunctionalConstraint::MX).await);
        assert!(matches!(err, IedClientError::UnexpectedValueReceived(_)));

        let err = assert_err!(conn.read_i64("LD1/LLN0.Missing.stVal", FunctionalConstraint::ST).await);
        assert!(matches!(err, IedClientError::ObjectDoesNotExist));

        let err = assert_err!(conn.read_i64("bad reference", FunctionalConstraint::ST).await);
        assert!(matches!(err, IedClientError::ObjectReferenceInvalid(_)));
    }

    #[tokio::test]
    async fn test_write_value() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        assert_ok!(
            conn.write_value("LD1/GGIO1.NamPlt.vendor", FunctionalConstraint::DC, "acme".into())
                .await
        );
        assert_eq!(mock.writes()[0].0, "GGIO1$DC$NamPlt$vendor");
    }

    #[tokio::test]
    async fn test_create_control_object() {
        let (mut conn, _mock, handle) = with_control(TestServer::new(ControlModel::SboNormal)).await;
        let control = assert_ok!(conn.control(handle));
        assert_eq!(control.object_reference(), "LD1/CSWI1.Pos");
        assert_eq!(control.control_model(), ControlModel::SboNormal);
        assert_eq!(control.state(), ControlState::Idle);
        assert!(!control.has_time_activated_mode());
    }

    #[tokio::test]
    async fn test_create_control_object_missing() {
        let (mut conn, _mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let err = assert_err!(conn.create_control_object("LD1/XCBR1.Pos").await);
        assert!(matches!(err, IedClientError::ObjectDoesNotExist));

        let err = assert_err!(conn.create_control_object("LD1/XCBR1").await);
        assert!(matches!(err, IedClientError::ObjectReferenceInvalid(_)));
    }

    #[tokio::test]
    async fn test_direct_operate_without_select() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::DirectNormal)).await;
        let mut control = assert_ok!(conn.control(handle));

        assert!(assert_ok!(control.operate(MmsValue::Boolean(true)).await));
        assert_eq!(control.state(), ControlState::Idle);
        assert_eq!(control.ctl_num(), 1);

        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "CSWI1$CO$Pos$Oper");
        assert_eq!(writes[0].1.element(0).unwrap(), &MmsValue::Boolean(true));

        assert!(!assert_ok!(control.cancel().await));
        assert_eq!(mock.writes().len(), 1);

        let err = assert_err!(control.select().await);
        assert!(matches!(err, IedClientError::ServiceNotSupported));
    }

    #[tokio::test]
    async fn test_sbo_operate_requires_select() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::SboNormal)).await;
        let mut control = assert_ok!(conn.control(handle));

        assert!(!assert_ok!(control.operate(MmsValue::Boolean(true)).await));
        assert!(mock.requests().is_empty());

        assert!(assert_ok!(control.select().await));
        assert_eq!(control.state(), ControlState::Selected);

        assert!(assert_ok!(control.operate(MmsValue::Boolean(true)).await));
        assert_eq!(control.state(), ControlState::Idle);

        assert!(!assert_ok!(control.operate(MmsValue::Boolean(false)).await));
        assert_eq!(mock.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_select_not_granted() {
        let mut server = TestServer::new(ControlModel::SboNormal);
        server.grant_select = false;
        let (mut conn, _mock, handle) = with_control(server).await;
        let mut control = assert_ok!(conn.control(handle));

        assert!(!assert_ok!(control.select().await));
        assert_eq!(control.state(), ControlState::Idle);
    }

    #[tokio::test]
    async fn test_select_with_value_and_cancel() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::SboEnhanced)).await;
        let mut control = assert_ok!(conn.control(handle));

        assert!(assert_ok!(control.select_with_value(MmsValue::Boolean(true)).await));
        assert_eq!(control.state(), ControlState::Selected);
        assert_eq!(control.ctl_num(), 1);

        assert!(assert_ok!(control.cancel().await));
        assert_eq!(control.state(), ControlState::Idle);

        let writes = mock.writes();
        assert_eq!(writes[0].0, "CSWI1$CO$Pos$SBOw");
        assert_eq!(writes[1].0, "CSWI1$CO$Pos$Cancel");
        let cancel = &writes[1].1;
        assert_eq!(cancel.size().unwrap(), 5);
        assert_eq!(cancel.element(0).unwrap(), &MmsValue::Boolean(true));
        assert_eq!(cancel.element(2).unwrap(), &MmsValue::Unsigned(1));
    }

    #[tokio::test]
    async fn test_interlock_refusal_is_false() {
        let mut server = TestServer::new(ControlModel::DirectNormal);
        server.interlocked = true;
        let (mut conn, mock, handle) = with_control(server).await;
        let mut control = assert_ok!(conn.control(handle));

        assert!(assert_ok!(control.operate(MmsValue::Boolean(true)).await));

        control.enable_interlock_check();
        assert!(!assert_ok!(control.operate(MmsValue::Boolean(true)).await));
        assert_eq!(control.state(), ControlState::Idle);

        let check = mock.writes()[1].1.element(5).unwrap().clone();
        assert!(check.bit_string_bit(1).unwrap());
    }

    #[tokio::test]
    async fn test_interlock_refusal_on_select_is_false() {
        let mut server = TestServer::new(ControlModel::SboEnhanced);
        server.interlocked = true;
        let (mut conn, mock, handle) = with_control(server).await;
        let mut control = assert_ok!(conn.control(handle));

        control.enable_interlock_check();
        assert!(!assert_ok!(control.select_with_value(MmsValue::Boolean(true)).await));
        assert_eq!(control.state(), ControlState::Idle);

        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "CSWI1$CO$Pos$SBOw");
        let check = writes[0].1.element(5).unwrap();
        assert!(check.bit_string_bit(1).unwrap());
        assert!(!check.bit_string_bit(0).unwrap());

        // Not selected, so operate sends nothing.
        assert!(!assert_ok!(control.operate(MmsValue::Boolean(true)).await));
        assert_eq!(mock.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_origin_attached() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::DirectNormal)).await;
        let mut control = assert_ok!(conn.control(handle));

        control.set_origin("opX", OrCat::RemoteControl);
        control.set_test_mode(true);
        assert!(assert_ok!(control.operate(MmsValue::Boolean(false)).await));

        let oper = &mock.writes()[0].1;
        let origin = Origin::from_mms_value(oper.element(1).unwrap()).unwrap();
        assert_eq!(origin, Origin::new("opX", OrCat::RemoteControl));
        assert_eq!(oper.element(4).unwrap(), &MmsValue::Boolean(true));
    }

    #[tokio::test]
    async fn test_timed_operate_and_cancel() {
        let mut server = TestServer::new(ControlModel::DirectNormal);
        server.oper_tm = true;
        let (mut conn, mock, handle) = with_control(server).await;
        let mut control = assert_ok!(conn.control(handle));
        assert!(control.has_time_activated_mode());

        let at = 1_900_000_000_000;
        assert!(assert_ok!(control.operate_at(MmsValue::Boolean(true), at).await));
        assert_eq!(control.state(), ControlState::OperatePending { oper_time: at });

        assert!(assert_ok!(control.cancel().await));
        assert_eq!(control.state(), ControlState::Idle);

        let writes = mock.writes();
        assert_eq!(writes[0].1.element(1).unwrap(), &MmsValue::utc_time(at));
        assert_eq!(writes[1].0, "CSWI1$CO$Pos$Cancel");
        assert_eq!(writes[1].1.size().unwrap(), 6);
        assert_eq!(writes[1].1.element(1).unwrap(), &MmsValue::utc_time(at));
    }

    #[tokio::test]
    async fn test_timed_operate_unsupported() {
        let (mut conn, _mock, handle) = with_control(TestServer::new(ControlModel::DirectNormal)).await;
        let mut control = assert_ok!(conn.control(handle));
        let err = assert_err!(control.operate_at(MmsValue::Boolean(true), 1_000).await);
        assert!(matches!(err, IedClientError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_status_only() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::StatusOnly)).await;
        let mut control = assert_ok!(conn.control(handle));
        let err = assert_err!(control.operate(MmsValue::Boolean(true)).await);
        assert!(matches!(err, IedClientError::ServiceNotSupported));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_ctl_val_type() {
        let (mut conn, _mock, handle) = with_control(TestServer::new(ControlModel::DirectNormal)).await;
        let mut control = assert_ok!(conn.control(handle));
        let err = assert_err!(control.operate(MmsValue::Integer(1)).await);
        assert!(matches!(err, IedClientError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_release_control_object() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::SboNormal)).await;
        assert!(assert_ok!(assert_ok!(conn.control(handle)).select().await));
        let sent = mock.requests().len();

        assert_ok!(conn.release_control_object(handle));
        assert_eq!(mock.requests().len(), sent);
        assert!(conn.control(handle).is_err());
        assert!(conn.release_control_object(handle).is_err());
    }

    #[tokio::test]
    async fn test_reconnect_resets_selection() {
        let (mut conn, _mock, handle) = with_control(TestServer::new(ControlModel::SboNormal)).await;
        assert!(assert_ok!(assert_ok!(conn.control(handle)).select().await));

        assert_ok!(conn.abort().await);
        assert_ok!(conn.connect().await);
        assert_eq!(assert_ok!(conn.control(handle)).state(), ControlState::Idle);
    }

    #[tokio::test]
    async fn test_last_appl_error_routed() {
        let (mut conn, mock, handle) = with_control(TestServer::new(ControlModel::DirectNormal)).await;
        let mut events = conn.subscribe();

        let report = MmsValue::structure([
            MmsValue::visible_string("LD1/CSWI1$CO$Pos$Oper"),
            MmsValue::Integer(1),
            Origin::default().to_mms_value(),
            MmsValue::Unsigned(1),
            MmsValue::Integer(10),
        ]);
        mock.inject(TransportEvent::InformationReport {
            domain: None,
            name: "LastApplError".into(),
            value: report,
        })
        .await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        let err = match event {
            IedEvent::LastApplError(err) => err,
            other => panic!("unexpected event {other:?}"),
        };
        assert_eq!(err.add_cause, ControlAddCause::BlockedByInterlocking);

        let control = assert_ok!(conn.control(handle));
        assert_eq!(control.last_appl_error(), Some(err.clone()));
        assert_eq!(conn.last_appl_error(), Some(err));
    }

    #[tokio::test]
    async fn test_command_termination_event() {
        let (mut conn, mock) = connected(TestServer::new(ControlModel::DirectNormal)).await;
        let mut events = conn.subscribe();

        mock.inject(TransportEvent::InformationReport {
            domain: Some("LD1".into()),
            name: "CSWI1$CO$Pos$Oper".into(),
            value: MmsValue::structure([MmsValue::Boolean(true)]),
        })
        .await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(IedEvent::CommandTermination {
                object_reference: "LD1/CSWI1.Pos".into()
            })
        );
    }
}
