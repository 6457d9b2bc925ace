//! Gateway session client.
//!
//! A [`GatewayClient`] is a handle to a session task that owns the socket,
//! the pending request table and the reconnect timer. The task is the only
//! place session state changes, so transport events, caller commands and
//! timer expiry are applied one at a time in arrival order.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingChallenge -> Authenticating -> Ready
//!       ^______________________________ close ______________________|
//! ```
//!
//! After an abnormal close the session reconnects with backoff
//! (`base × 1.5^(n-1)`) up to `max_reconnect_attempts` times. A close with
//! code 1000 or an explicit [`GatewayClient::disconnect`] stops reconnecting.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::events::{HandlerId, SharedDispatcher};
use super::frame::{
    decode, encode, Frame, RequestFrame, ResponseFrame, CLOSE_ABNORMAL, CLOSE_AUTH_FAILED,
    CLOSE_NORMAL,
};
use super::methods::{self, SessionsListParams, EVENT_CONNECT_CHALLENGE, EVENT_HELLO};
use super::options::{ClientOptions, MAX_RECONNECT_DELAY};
use super::pending::{Completion, PendingRequests, Resolved, ResponseSender};
use crate::error::{GatewayError, GatewayResult};
use crate::traits::{GatewayConnector, TransportCommand, TransportEvent};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Socket open, waiting for `connect.challenge`.
    AwaitingChallenge,
    /// `connect` sent, waiting for its response.
    Authenticating,
    Ready,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingChallenge => "awaiting-challenge",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Snapshot of the session published after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// True only after a successful handshake.
    pub connected: bool,
    pub authenticated: bool,
    pub reconnect_attempts: u32,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            connected: false,
            authenticated: false,
            reconnect_attempts: 0,
        }
    }
}

/// Code and reason of a closed socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

type ConnectCallback = Box<dyn Fn(&ResponseFrame) + Send + Sync>;
type DisconnectCallback = Box<dyn Fn(&CloseInfo) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    on_error: Option<ErrorCallback>,
}

/// Run a lifecycle callback; a panic is logged instead of killing the session.
fn guarded(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("{} callback panicked", name);
    }
}

/// Builder for [`GatewayClient`].
pub struct GatewayClientBuilder {
    options: ClientOptions,
    callbacks: Callbacks,
    dispatcher: SharedDispatcher,
}

impl GatewayClientBuilder {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            callbacks: Callbacks::default(),
            dispatcher: SharedDispatcher::new(),
        }
    }

    /// Called with the `connect` response after each successful handshake.
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseFrame) + Send + Sync + 'static,
    {
        self.callbacks.on_connect = Some(Box::new(f));
        self
    }

    /// Called on every socket close, before any reconnect is scheduled.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&CloseInfo) + Send + Sync + 'static,
    {
        self.callbacks.on_disconnect = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    /// Register an event handler before the session starts.
    pub fn on_event<F>(self, event: &str, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.dispatcher.on(event, handler);
        self
    }

    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn<C: GatewayConnector>(self, connector: C) -> GatewayClient {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let session_key = self.options.session_key.clone();

        let session = Session {
            options: self.options,
            connector,
            callbacks: self.callbacks,
            dispatcher: self.dispatcher.clone(),
            commands: command_rx,
            status_tx,
            transport: None,
            transport_events: None,
            pending: PendingRequests::new(),
            state: SessionState::Disconnected,
            connected: false,
            authenticated: false,
            reconnect_attempts: 0,
            reconnect_at: None,
        };
        tokio::spawn(session.run());

        GatewayClient {
            commands: command_tx,
            status_rx,
            dispatcher: self.dispatcher,
            session_key,
        }
    }
}

enum Command {
    Connect,
    Disconnect,
    Request {
        frame: RequestFrame,
        reply: ResponseSender,
    },
}

/// Handle to a gateway session.
///
/// Dropping the handle closes the socket and ends the session task.
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<SessionStatus>,
    dispatcher: SharedDispatcher,
    session_key: String,
}

impl GatewayClient {
    pub fn builder(options: ClientOptions) -> GatewayClientBuilder {
        GatewayClientBuilder::new(options)
    }

    /// Start connecting. A no-op while a socket is already connecting or open.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the socket with code 1000 and stop reconnecting.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Gateway session task has stopped");
        }
    }

    /// Send a request frame and wait for the matching response.
    ///
    /// Fails immediately with [`GatewayError::TransportUnavailable`] when the
    /// socket is not open. Rejects with the server's message when the
    /// response has `ok: false`.
    pub async fn send_frame(&self, frame: RequestFrame) -> GatewayResult<ResponseFrame> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Request { frame, reply })
            .map_err(|_| GatewayError::ClientShutdown)?;
        rx.await.map_err(|_| GatewayError::ClientShutdown)?
    }

    /// Send `method` with `params` under a fresh request id.
    pub async fn send_request(&self, method: &str, params: Value) -> GatewayResult<ResponseFrame> {
        self.send_frame(RequestFrame::new(method, params)).await
    }

    /// `chat.send` on this client's session key.
    pub async fn send_chat_message(
        &self,
        message: &str,
        attachments: Vec<Value>,
    ) -> GatewayResult<ResponseFrame> {
        self.send_frame(methods::chat_send_request(&self.session_key, message, attachments))
            .await
    }

    pub async fn chat_history(&self, limit: u32) -> GatewayResult<ResponseFrame> {
        self.send_frame(methods::chat_history_request(&self.session_key, limit))
            .await
    }

    pub async fn abort_chat(&self) -> GatewayResult<ResponseFrame> {
        self.send_frame(methods::chat_abort_request(&self.session_key))
            .await
    }

    pub async fn list_sessions(&self, params: SessionsListParams) -> GatewayResult<ResponseFrame> {
        self.send_frame(methods::sessions_list_request(params)).await
    }

    /// Register a handler for a server event. `"hello"` receives `hello-ok` frames.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.dispatcher.on(event, handler)
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.dispatcher.off(event, id)
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.status_rx.borrow().authenticated
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Wait until the handshake has completed.
    ///
    /// Returns [`GatewayError::ClientShutdown`] if the session task ends
    /// first. Never resolves if the gateway keeps rejecting us, so callers
    /// usually wrap this in a timeout.
    pub async fn wait_until_ready(&self) -> GatewayResult<()> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(|status| status.state == SessionState::Ready)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::ClientShutdown)
    }
}

/// The socket currently owned by the session.
struct Transport {
    commands: mpsc::UnboundedSender<TransportCommand>,
    open: bool,
    closing: bool,
}

impl Transport {
    fn close(&mut self, code: u16, reason: &str) {
        self.closing = true;
        let _ = self.commands.send(TransportCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

enum Wake {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Reconnect,
}

struct Session<C> {
    options: ClientOptions,
    connector: C,
    callbacks: Callbacks,
    dispatcher: SharedDispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<SessionStatus>,
    transport: Option<Transport>,
    transport_events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    pending: PendingRequests,
    state: SessionState,
    connected: bool,
    authenticated: bool,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
}

impl<C: GatewayConnector> Session<C> {
    async fn run(mut self) {
        debug!("Gateway session started for {}", self.options.url);
        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                event = next_transport_event(&mut self.transport_events) => Wake::Transport(event),
                _ = sleep_until_deadline(self.reconnect_at) => Wake::Reconnect,
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => {
                    self.shutdown();
                    break;
                }
                Wake::Transport(Some(event)) => self.handle_transport_event(event),
                Wake::Transport(None) => {
                    warn!("Transport ended without a close event");
                    self.handle_close(CLOSE_ABNORMAL, "Transport ended".to_string());
                }
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    info!(
                        "Reconnecting to gateway (attempt {}/{})",
                        self.reconnect_attempts, self.options.max_reconnect_attempts
                    );
                    self.connect();
                }
            }
        }
        debug!("Gateway session ended");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Request { frame, reply } => {
                self.send_request(frame, Completion::Caller(reply));
            }
        }
    }

    fn connect(&mut self) {
        if self.transport.as_ref().is_some_and(|t| !t.closing) {
            debug!("Already connected or connecting, reusing existing connection");
            return;
        }

        // A manual connect supersedes a scheduled reconnect.
        self.reconnect_at = None;
        if let Some(mut stale) = self.transport.take() {
            info!("Discarding closing socket before reconnecting");
            stale.close(CLOSE_NORMAL, "Superseded");
        }
        self.transport_events = None;
        self.connected = false;
        self.authenticated = false;
        self.pending.fail_all(CLOSE_NORMAL, "Connection replaced");

        info!("Connecting to gateway at {}", self.options.url);
        let handle = self.connector.open(&self.options.url);
        self.transport = Some(Transport {
            commands: handle.commands,
            open: false,
            closing: false,
        });
        self.transport_events = Some(handle.events);
        self.set_state(SessionState::Connecting);
    }

    fn disconnect(&mut self) {
        info!("Disconnecting from gateway");
        self.reconnect_attempts = self.options.max_reconnect_attempts;
        self.reconnect_at = None;
        if let Some(transport) = self.transport.as_mut() {
            transport.close(CLOSE_NORMAL, "User disconnected");
        }
        self.publish();
    }

    fn send_request(&mut self, frame: RequestFrame, completion: Completion) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.open && !t.closing) else {
            reject(completion, GatewayError::TransportUnavailable);
            return;
        };
        let id = frame.id.clone();
        let method = frame.method.clone();
        let text = match encode(&Frame::Request(frame)) {
            Ok(text) => text,
            Err(e) => {
                reject(completion, e);
                return;
            }
        };
        let commands = transport.commands.clone();

        if let Err((completion, e)) = self.pending.insert(&id, &method, completion) {
            warn!("Could not register request {}: {}", id, e);
            reject(completion, e);
            return;
        }
        debug!("Sending request {} ({})", id, method);
        if commands.send(TransportCommand::Send(text)).is_err() {
            if let Some(entry) = self.pending.remove(&id) {
                reject(entry.completion, GatewayError::TransportUnavailable);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.open = true;
                }
                info!("WebSocket connected, waiting for connect.challenge");
                self.set_state(SessionState::AwaitingChallenge);
            }
            TransportEvent::Message(text) => match decode(&text) {
                Ok(frame) => self.handle_frame(frame),
                Err(e) => warn!("Failed to parse message: {} - {}", e, text),
            },
            TransportEvent::Error(message) => {
                error!("WebSocket error: {}", message);
                if let Some(on_error) = self.callbacks.on_error.as_ref() {
                    guarded("on_error", || on_error(message.as_str()));
                }
            }
            TransportEvent::Closed { code, reason } => self.handle_close(code, reason),
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Response(response) => match self.pending.resolve(response) {
                Ok(Resolved::Delivered) => {}
                Ok(Resolved::Handshake(response)) => self.finish_handshake(response),
                Err(e) => warn!("[{}] Dropping response: {}", e.error_code(), e),
            },
            Frame::Event(event) => {
                if event.event == EVENT_CONNECT_CHALLENGE {
                    self.answer_challenge(&event.payload);
                }
                self.dispatcher.emit(&event.event, &event.payload);
            }
            Frame::HelloOk(fields) => {
                let mut hello = Map::new();
                hello.insert("type".to_string(), Value::String("hello-ok".to_string()));
                hello.extend(fields);
                self.dispatcher.emit(EVENT_HELLO, &Value::Object(hello));
            }
            Frame::Request(request) => {
                warn!("Unhandled message type: req ({})", request.method);
            }
        }
    }

    fn answer_challenge(&mut self, payload: &Value) {
        if self.state != SessionState::AwaitingChallenge {
            warn!("Ignoring connect.challenge while {}", self.state);
            return;
        }
        match payload.get("nonce").and_then(Value::as_str) {
            Some(nonce) => debug!("Received connect.challenge (nonce {})", nonce),
            None => debug!("Received connect.challenge without nonce"),
        }

        let request = methods::connect_request(&self.options);
        self.set_state(SessionState::Authenticating);
        self.send_request(request, Completion::Handshake);
    }

    fn finish_handshake(&mut self, response: ResponseFrame) {
        if response.ok {
            info!("Successfully authenticated with gateway");
            self.connected = true;
            self.authenticated = true;
            self.reconnect_attempts = 0;
            self.set_state(SessionState::Ready);
            if let Some(on_connect) = self.callbacks.on_connect.as_ref() {
                guarded("on_connect", || on_connect(&response));
            }
        } else {
            let err = GatewayError::AuthenticationFailed(response.error_message());
            error!("{}", err);
            if let Some(transport) = self.transport.as_mut() {
                transport.close(CLOSE_AUTH_FAILED, "Authentication failed");
            }
        }
    }

    fn handle_close(&mut self, code: u16, reason: String) {
        info!("WebSocket closed: {} {}", code, reason);
        self.transport = None;
        self.transport_events = None;
        self.connected = false;
        self.authenticated = false;
        self.set_state(SessionState::Disconnected);

        let failed = self.pending.fail_all(code, &reason);
        if failed > 0 {
            debug!("Failed {} pending request(s) on close", failed);
        }

        let info = CloseInfo { code, reason };
        if let Some(on_disconnect) = self.callbacks.on_disconnect.as_ref() {
            guarded("on_disconnect", || on_disconnect(&info));
        }

        if code != CLOSE_NORMAL && self.reconnect_attempts < self.options.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            let delay = self.options.reconnect_delay(self.reconnect_attempts);
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay, self.reconnect_attempts, self.options.max_reconnect_attempts
            );
            let now = Instant::now();
            self.reconnect_at = now
                .checked_add(delay)
                .or_else(|| now.checked_add(MAX_RECONNECT_DELAY));
            if self.reconnect_at.is_none() {
                warn!("Reconnect delay {:?} is out of range, not reconnecting", delay);
            }
            self.publish();
        } else if code != CLOSE_NORMAL {
            warn!("Giving up on gateway after {} reconnect attempts", self.reconnect_attempts);
        }
    }

    fn shutdown(&mut self) {
        debug!("Gateway client dropped, shutting down session");
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close(CLOSE_NORMAL, "Client dropped");
        }
        self.pending.fail_all(CLOSE_NORMAL, "Client dropped");
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state: {} -> {}", self.state, state);
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            connected: self.connected,
            authenticated: self.authenticated,
            reconnect_attempts: self.reconnect_attempts,
        });
    }
}

fn reject(completion: Completion, err: GatewayError) {
    match completion {
        Completion::Caller(reply) => {
            let _ = reply.send(Err(err));
        }
        Completion::Handshake => warn!("Could not send connect request: {}", err),
    }
}

async fn next_transport_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
