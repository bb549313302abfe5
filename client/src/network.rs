//! Connection state machine.
//!
//! `connect` performs the login handshake and, on success, starts two tasks
//! for the session: the receive loop and the liveness monitor. Both watch a
//! per-session `CancellationToken`; `disconnect` and the connection-lost
//! path cancel it. Sessions are numbered, and a loss reported by a task that
//! belongs to an older session is ignored.
//!
//! The handshake has a token of its own, so a `disconnect` issued while the
//! client is still `Connecting` aborts the login instead of being ignored.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{
    CommandResponseHandler, ConnectionHandler, DisconnectReason, ListenerId, Listeners,
    MessageHandler,
};
use crate::liveness::run_monitor;
use crate::receiver::run_receiver;
use crate::session::Session;
use berc_shared::{
    decode, Command, Packet, PacketKind, LOGIN_FAILURE, LOGIN_SUCCESS, MAX_DATAGRAM_SIZE,
};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Lost = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Lost,
            _ => ConnectionState::Disconnected,
        }
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A logged-in session together with the tasks serving it.
struct ActiveSession {
    session: Arc<Session>,
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    state: StateCell,
    password: Mutex<Option<String>>,
    active: AsyncMutex<Option<ActiveSession>>,
    generation: AtomicU64,
    listeners: Listeners,
    closed: AtomicBool,
    pending_reconnect: Mutex<CancellationToken>,
    handshake: Mutex<CancellationToken>,
}

impl ClientInner {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    fn stored_password(&self) -> Option<String> {
        self.password
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn connect(self: &Arc<Self>, password: &str) -> Result<()> {
        // The state change and the new token happen under one lock, so
        // `disconnect` sees either no handshake or this one.
        let handshake = {
            let mut slot = self.handshake.lock().unwrap_or_else(PoisonError::into_inner);
            if !self
                .state
                .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            {
                return Err(ClientError::AlreadyConnected);
            }
            *slot = CancellationToken::new();
            slot.clone()
        };

        *self.password.lock().unwrap_or_else(PoisonError::into_inner) = Some(password.to_string());
        info!("Connecting to {}...", self.config.server_addr);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let login = tokio::select! {
            biased;
            _ = handshake.cancelled() => Err(ClientError::Cancelled),
            result = self.login(generation, password) => result,
        };
        let session = match login {
            Ok(session) => Arc::new(session),
            Err(ClientError::Cancelled) => {
                self.abort_handshake();
                return Err(ClientError::Cancelled);
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                warn!("Login to {} failed: {}", self.config.server_addr, e);
                self.listeners.fire_connection_failed();
                return Err(e);
            }
        };

        {
            // The slot is filled before either task runs, so a loss they
            // report always finds its session.
            let mut active = self.active.lock().await;
            // A disconnect that raced the login reply wins.
            if handshake.is_cancelled() {
                drop(active);
                self.abort_handshake();
                return Err(ClientError::Cancelled);
            }
            self.state.set(ConnectionState::Connected);

            let cancel = CancellationToken::new();
            let receiver = tokio::spawn(run_receiver(
                Arc::clone(self),
                Arc::clone(&session),
                cancel.clone(),
            ));
            let monitor = tokio::spawn(run_monitor(
                Arc::clone(self),
                Arc::clone(&session),
                cancel.clone(),
            ));

            *active = Some(ActiveSession {
                session,
                cancel,
                receiver,
                monitor,
            });

            // Fired under the lock so a concurrent `disconnect` reports
            // after it.
            info!("Connected to {}", self.config.server_addr);
            self.listeners.fire_connected();
        }
        Ok(())
    }

    /// Finishes a login cut short by `disconnect`.
    fn abort_handshake(&self) {
        self.state.set(ConnectionState::Disconnected);
        info!("Login to {} abandoned", self.config.server_addr);
        self.listeners.fire_disconnected(DisconnectReason::Manual);
    }

    /// Opens the socket, sends the password and waits for the verdict.
    async fn login(&self, generation: u64, password: &str) -> Result<Session> {
        let session = Session::open(
            self.config.server_addr,
            generation,
            self.config.queue_capacity,
        )
        .await?;
        session.send(&Packet::login(password)).await?;

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let len = timeout(self.config.login_timeout, session.socket.recv(&mut buffer))
            .await
            .map_err(|_| ClientError::LoginTimeout(self.config.login_timeout))??;

        let packet = decode(&buffer[..len])?;
        session.timestamps.mark_received();

        match (packet.kind, packet.payload.as_slice()) {
            (PacketKind::Login, [LOGIN_SUCCESS]) => Ok(session),
            (PacketKind::Login, [LOGIN_FAILURE]) => Err(ClientError::LoginFailed),
            (kind, payload) => Err(ClientError::UnexpectedLoginReply(format!(
                "{:?} packet with {} byte payload",
                kind,
                payload.len()
            ))),
        }
    }

    fn cancel_pending_reconnect(&self) {
        self.pending_reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn cancel_handshake(&self) {
        self.handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    async fn disconnect(&self) -> Result<()> {
        self.cancel_pending_reconnect();
        self.cancel_handshake();
        let taken = self.active.lock().await.take();
        let Some(active) = taken else {
            debug!("Disconnect requested while {:?}", self.state.get());
            return Ok(());
        };

        active.cancel.cancel();
        for (name, handle) in [("receive loop", active.receiver), ("monitor", active.monitor)] {
            if let Err(e) = handle.await {
                error!("The {} of session {} failed: {}", name, active.session.generation, e);
            }
        }
        active.session.clear().await;

        self.state.set(ConnectionState::Disconnected);
        info!("Disconnected from {}", self.config.server_addr);
        self.listeners.fire_disconnected(DisconnectReason::Manual);
        Ok(())
    }

    /// Tears down the session numbered `generation`, if it is still current.
    ///
    /// Called from the session's own tasks, so it must not wait for them.
    pub(crate) async fn connection_lost(self: &Arc<Self>, generation: u64) {
        let taken = {
            let mut active = self.active.lock().await;
            match active.as_ref() {
                Some(current) if current.session.generation == generation => active.take(),
                _ => None,
            }
        };
        let Some(active) = taken else {
            debug!("Ignoring loss reported by stale session {}", generation);
            return;
        };

        self.state.set(ConnectionState::Lost);
        warn!("Connection to {} lost", self.config.server_addr);

        active.cancel.cancel();
        active.session.clear().await;

        self.state.set(ConnectionState::Disconnected);
        // Scheduled before the event fires so a `disconnect` issued in
        // response to it finds the pending attempt.
        if self.config.auto_reconnect && !self.closed.load(Ordering::Acquire) {
            self.schedule_reconnect();
        }
        self.listeners
            .fire_disconnected(DisconnectReason::ConnectionLost);
    }

    /// Runs the reconnect attempt on its own task so the caller (one of the
    /// session loops) can finish.
    fn schedule_reconnect(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let delay = self.config.reconnect_delay;
        let cancel = CancellationToken::new();
        *self
            .pending_reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        info!("Reconnecting in {:?}", delay);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Scheduled reconnect cancelled");
                    return;
                }
                _ = sleep(delay) => {}
            }
            if client.closed.load(Ordering::Acquire) {
                return;
            }
            let Some(password) = client.stored_password() else {
                return;
            };

            match client.connect(&password).await {
                Ok(()) => {}
                Err(ClientError::AlreadyConnected) => {
                    debug!("Already reconnected, dropping scheduled attempt");
                }
                Err(ClientError::Cancelled) => {
                    debug!("Scheduled reconnect cancelled during login");
                }
                Err(e) => {
                    warn!("Reconnect to {} failed: {}", client.config.server_addr, e);
                    client
                        .listeners
                        .fire_disconnected(DisconnectReason::ConnectionFailed);
                }
            }
        });
    }

    async fn current_session(&self) -> Result<Arc<Session>> {
        let active = self.active.lock().await;
        match (active.as_ref(), self.state.get()) {
            (Some(current), ConnectionState::Connected) => Ok(Arc::clone(&current.session)),
            (_, ConnectionState::Lost) => Err(ClientError::ConnectionLost),
            _ => Err(ClientError::NotConnected),
        }
    }
}

/// BattlEye RCon client.
///
/// ```rust,no_run
/// use berc_client::{BattlEyeClient, ClientConfig};
/// use berc_shared::Command;
///
/// # async fn run() -> berc_client::Result<()> {
/// let client = BattlEyeClient::new(ClientConfig::new("127.0.0.1:2302".parse().unwrap()))?;
/// client.add_command_response_handler(|text: &str, id: u8| println!("[{}] {}", id, text));
/// client.connect("changeme").await?;
/// client.send(Command::Players, &[]).await?;
/// # Ok(())
/// # }
/// ```
pub struct BattlEyeClient {
    inner: Arc<ClientInner>,
}

impl BattlEyeClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                state: StateCell::new(),
                password: Mutex::new(None),
                active: AsyncMutex::new(None),
                generation: AtomicU64::new(0),
                listeners: Listeners::new(),
                closed: AtomicBool::new(false),
                pending_reconnect: Mutex::new(CancellationToken::new()),
                handshake: Mutex::new(CancellationToken::new()),
            }),
        })
    }

    /// Logs in with `password`, which is kept for `reconnect` and automatic
    /// reconnection.
    ///
    /// Fails with `AlreadyConnected` unless the client is disconnected. A
    /// rejected password yields `LoginFailed` and fires
    /// `on_connection_failed`.
    pub async fn connect(&self, password: &str) -> Result<()> {
        self.inner.connect(password).await
    }

    /// Logs in again with the password from the last `connect`.
    pub async fn reconnect(&self) -> Result<()> {
        let password = self
            .inner
            .stored_password()
            .ok_or(ClientError::NoStoredCredentials)?;
        self.inner.connect(&password).await
    }

    /// Stops both session tasks and closes the socket, and cancels a
    /// scheduled automatic reconnect. A login still in progress is abandoned
    /// and its `connect` returns `Cancelled`. Does nothing else when
    /// disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Queues a raw command and returns its sequence number. The response is
    /// delivered to the command response handlers with the same number.
    pub async fn send_command(&self, command: &str) -> Result<u8> {
        let session = self.inner.current_session().await?;
        let id = session.submit(command).await?;
        debug!("Command {} submitted: {}", id, command);
        Ok(id)
    }

    pub async fn send(&self, command: Command, args: &[&str]) -> Result<u8> {
        self.send_command(&command.with_args(args)).await
    }

    /// Commands waiting for a response, including the one in flight.
    pub async fn pending_commands(&self) -> usize {
        match self.inner.current_session().await {
            Ok(session) => session.pending_commands().await,
            Err(_) => 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.inner.config.server_addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn add_connection_handler(&self, handler: impl ConnectionHandler + 'static) -> ListenerId {
        self.inner.listeners.add_connection_handler(handler)
    }

    pub fn add_command_response_handler(
        &self,
        handler: impl CommandResponseHandler + 'static,
    ) -> ListenerId {
        self.inner.listeners.add_command_response_handler(handler)
    }

    pub fn add_message_handler(&self, handler: impl MessageHandler + 'static) -> ListenerId {
        self.inner.listeners.add_message_handler(handler)
    }

    pub fn remove_handler(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn listeners(&self) -> &Listeners {
        &self.inner.listeners
    }
}

impl Drop for BattlEyeClient {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.cancel_pending_reconnect();
        self.inner.cancel_handshake();
        if let Ok(mut active) = self.inner.active.try_lock() {
            if let Some(active) = active.take() {
                active.cancel.cancel();
            }
        }
    }
}
