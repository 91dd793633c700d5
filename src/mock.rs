//! Scripted in-memory transport for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::MmsError;
use crate::transport::{ConnectionParameters, MmsRequest, MmsResponse, MmsTransport, TransportEvent};
use crate::types::MmsValue;

type Handler = Box<dyn FnMut(&MmsRequest) -> Result<MmsResponse, MmsError> + Send>;

#[derive(Default)]
struct MockState {
    requests: Vec<MmsRequest>,
    handler: Option<Handler>,
    events: Option<mpsc::Sender<TransportEvent>>,
    connect_error: Option<MmsError>,
    delay: Option<Duration>,
    connects: usize,
    releases: usize,
    aborts: usize,
    closes: usize,
}

/// Transport side handed to the connection under test.
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test side: scripts answers and inspects traffic.
#[derive(Clone)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Answer every request with `handler`.
    pub(crate) fn on_request<F>(&self, handler: F)
    where
        F: FnMut(&MmsRequest) -> Result<MmsResponse, MmsError> + Send + 'static,
    {
        self.state.lock().handler = Some(Box::new(handler));
    }

    /// Fail the next connect.
    pub(crate) fn fail_connect(&self, err: MmsError) {
        self.state.lock().connect_error = Some(err);
    }

    /// Hold every response back for `delay`.
    pub(crate) fn delay_requests(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub(crate) fn requests(&self) -> Vec<MmsRequest> {
        self.state.lock().requests.clone()
    }

    /// `(item, value)` of every write, in order.
    pub(crate) fn writes(&self) -> Vec<(String, MmsValue)> {
        self.state
            .lock()
            .requests
            .iter()
            .filter_map(|r| match r {
                MmsRequest::Write { item, value, .. } => Some((item.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Deliver an unsolicited event as the server would.
    pub(crate) async fn inject(&self, event: TransportEvent) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            let _ = events.send(event).await;
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub(crate) fn releases(&self) -> usize {
        self.state.lock().releases
    }

    pub(crate) fn aborts(&self) -> usize {
        self.state.lock().aborts
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl MmsTransport for MockTransport {
    async fn connect(
        &mut self,
        _host: &str,
        _port: u16,
        _params: &ConnectionParameters,
    ) -> Result<mpsc::Receiver<TransportEvent>, MmsError> {
        let mut state = self.state.lock();
        if let Some(err) = state.connect_error.take() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(16);
        state.events = Some(tx);
        state.connects += 1;
        Ok(rx)
    }

    async fn request(&mut self, request: MmsRequest) -> Result<MmsResponse, MmsError> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        match state.handler.as_mut() {
            Some(handler) => handler(&request),
            None => Err(MmsError::ServiceNotSupported),
        }
    }

    async fn release(&mut self) -> Result<(), MmsError> {
        self.state.lock().releases += 1;
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), MmsError> {
        let mut state = self.state.lock();
        state.aborts += 1;
        state.events = None;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.events = None;
    }
}
