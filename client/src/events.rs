//! Listener registries for connection events, command responses and server
//! messages.
//!
//! Handlers are invoked synchronously from the receive loop or the liveness
//! monitor. They should return quickly; anything slow belongs on a channel.
//! The registry is snapshotted before handlers run, so a handler may add or
//! remove listeners without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Manual,
    /// The liveness monitor or the receive loop gave up on the server
    ConnectionLost,
    /// An automatic reconnect attempt did not get back in
    ConnectionFailed,
}

pub trait ConnectionHandler: Send + Sync {
    fn on_connected(&self) {}

    fn on_connection_failed(&self) {}

    fn on_disconnected(&self, _reason: DisconnectReason) {}
}

pub trait CommandResponseHandler: Send + Sync {
    fn on_command_response(&self, response: &str, id: u8);
}

impl<F> CommandResponseHandler for F
where
    F: Fn(&str, u8) + Send + Sync,
{
    fn on_command_response(&self, response: &str, id: u8) {
        self(response, id)
    }
}

pub trait MessageHandler: Send + Sync {
    fn on_server_message(&self, message: &str);
}

impl<F> MessageHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_server_message(&self, message: &str) {
        self(message)
    }
}

/// Handle returned when registering a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry<T: ?Sized> {
    entries: RwLock<Vec<(ListenerId, Arc<T>)>>,
}

impl<T: ?Sized> Registry<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: ListenerId, handler: Arc<T>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

pub struct Listeners {
    next_id: AtomicU64,
    connection: Registry<dyn ConnectionHandler>,
    responses: Registry<dyn CommandResponseHandler>,
    messages: Registry<dyn MessageHandler>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connection: Registry::new(),
            responses: Registry::new(),
            messages: Registry::new(),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_connection_handler(&self, handler: impl ConnectionHandler + 'static) -> ListenerId {
        let id = self.allocate_id();
        self.connection.add(id, Arc::new(handler));
        id
    }

    pub fn add_command_response_handler(
        &self,
        handler: impl CommandResponseHandler + 'static,
    ) -> ListenerId {
        let id = self.allocate_id();
        self.responses.add(id, Arc::new(handler));
        id
    }

    pub fn add_message_handler(&self, handler: impl MessageHandler + 'static) -> ListenerId {
        let id = self.allocate_id();
        self.messages.add(id, Arc::new(handler));
        id
    }

    /// Removes a listener from whichever registry holds it.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.connection.remove(id) || self.responses.remove(id) || self.messages.remove(id)
    }

    pub fn clear_connection_handlers(&self) {
        self.connection.clear();
    }

    pub fn clear_command_response_handlers(&self) {
        self.responses.clear();
    }

    pub fn clear_message_handlers(&self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.connection.len() + self.responses.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn fire_connected(&self) {
        for handler in self.connection.snapshot() {
            handler.on_connected();
        }
    }

    pub(crate) fn fire_connection_failed(&self) {
        for handler in self.connection.snapshot() {
            handler.on_connection_failed();
        }
    }

    pub(crate) fn fire_disconnected(&self, reason: DisconnectReason) {
        for handler in self.connection.snapshot() {
            handler.on_disconnected(reason);
        }
    }

    pub(crate) fn fire_command_response(&self, response: &str, id: u8) {
        for handler in self.responses.snapshot() {
            handler.on_command_response(response, id);
        }
    }

    pub(crate) fn fire_server_message(&self, message: &str) {
        for handler in self.messages.snapshot() {
            handler.on_server_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ConnectionHandler for Recorder {
        fn on_connected(&self) {
            self.events.lock().unwrap().push("connected".into());
        }

        fn on_disconnected(&self, reason: DisconnectReason) {
            self.events
                .lock()
                .unwrap()
                .push(format!("disconnected {:?}", reason));
        }
    }

    #[test]
    fn test_fire_reaches_every_listener() {
        let listeners = Listeners::new();
        let first = Recorder::default();
        let second = Recorder::default();
        listeners.add_connection_handler(first.clone());
        listeners.add_connection_handler(second.clone());

        listeners.fire_connected();
        listeners.fire_disconnected(DisconnectReason::Manual);

        for recorder in [first, second] {
            assert_eq!(recorder.events(), vec!["connected", "disconnected Manual"]);
        }
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        let listeners = Listeners::new();
        let recorder = Recorder::default();
        listeners.add_connection_handler(recorder.clone());

        listeners.fire_connection_failed();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_closure_handlers() {
        let listeners = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        listeners.add_command_response_handler(move |text: &str, id: u8| {
            sink.lock().unwrap().push(format!("{}:{}", id, text));
        });
        let sink = Arc::clone(&seen);
        listeners.add_message_handler(move |text: &str| {
            sink.lock().unwrap().push(format!("msg:{}", text));
        });

        listeners.fire_command_response("ok", 3);
        listeners.fire_server_message("hi");

        assert_eq!(*seen.lock().unwrap(), vec!["3:ok", "msg:hi"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let listeners = Listeners::new();
        let id = listeners.add_message_handler(|_: &str| {});
        listeners.add_command_response_handler(|_: &str, _: u8| {});
        assert_eq!(listeners.len(), 2);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.len(), 1);

        listeners.clear_command_response_handlers();
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_handler_may_register_during_fire() {
        let listeners = Arc::new(Listeners::new());
        let inner = Arc::clone(&listeners);
        listeners.add_message_handler(move |_: &str| {
            inner.add_message_handler(|_: &str| {});
        });

        listeners.fire_server_message("first");
        assert_eq!(listeners.len(), 2);
    }
}
