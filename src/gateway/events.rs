//! In-process pub/sub for server-pushed events.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::error;

/// Callback invoked with an event payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by [`EventDispatcher::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered handler lists keyed by event name.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Vec<(HandlerId, EventHandler)>>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers for one name run in registration order.
    pub fn on(&mut self, event: &str, handler: EventHandler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove the first registration matching `id`. Returns whether one was found.
    pub fn off(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|(h, _)| *h == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.handlers.remove(event);
        }
        true
    }

    /// Handlers currently registered for `event`, in order.
    pub fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler for `event`. Returns how many ran without panicking.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        invoke_isolated(event, &self.handlers_for(event), payload)
    }
}

/// Run handlers in order; a panicking handler is logged and skipped.
fn invoke_isolated(event: &str, handlers: &[EventHandler], payload: &Value) -> usize {
    let mut delivered = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(()) => delivered += 1,
            Err(_) => error!("Handler for '{}' panicked; continuing delivery", event),
        }
    }
    delivered
}

/// Dispatcher shared between the client handle and the session task.
///
/// Emitting snapshots the handler list and releases the lock before any
/// handler runs, so handlers may register or remove handlers themselves.
#[derive(Clone, Default)]
pub struct SharedDispatcher {
    inner: Arc<Mutex<EventDispatcher>>,
}

impl SharedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.lock().on(event, Arc::new(handler))
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.lock().off(event, id)
    }

    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let handlers = self.lock().handlers_for(event);
        invoke_isolated(event, &handlers, payload)
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handler_count(event)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EventDispatcher> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_make = Arc::clone(&log);
        let make = move |tag: &'static str| -> EventHandler {
            let log = Arc::clone(&log_for_make);
            Arc::new(move |payload: &Value| {
                log.lock().unwrap().push(format!("{}:{}", tag, payload));
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.on("chat", make("first"));
        dispatcher.on("chat", make("second"));
        dispatcher.on("other", make("other"));

        let delivered = dispatcher.emit("chat", &json!(1));

        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first:1", "second:1"]);
    }

    #[test]
    fn test_off_removes_only_that_registration() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        let a = dispatcher.on("chat", make("a"));
        dispatcher.on("chat", make("b"));

        assert!(dispatcher.off("chat", a));
        assert!(!dispatcher.off("chat", a));
        dispatcher.emit("chat", &json!("x"));

        assert_eq!(*log.lock().unwrap(), vec![r#"b:"x""#]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.on("chat", make("before"));
        dispatcher.on("chat", Arc::new(|_: &Value| panic!("handler blew up")));
        dispatcher.on("chat", make("after"));

        let delivered = dispatcher.emit("chat", &json!(null));

        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["before:null", "after:null"]);
    }

    #[test]
    fn test_emit_without_handlers_is_noop() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.emit("nobody", &json!({})), 0);
    }

    #[test]
    fn test_shared_dispatcher_allows_reentrant_registration() {
        let shared = SharedDispatcher::new();
        let inner = shared.clone();
        shared.on("hello", move |_| {
            inner.on("later", |_| {});
        });

        assert_eq!(shared.emit("hello", &json!({})), 1);
        assert_eq!(shared.handler_count("later"), 1);
    }
}
