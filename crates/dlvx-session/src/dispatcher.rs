//! Response correlation.
//!
//! Tracks pending requests by ID, routes backend replies to waiting callers
//! via oneshot channels, and forwards server-pushed notifications.
use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::codec::RpcMessage;

/// Callback type for handling notifications from the backend.
pub type NotificationHandler = Box<dyn Fn(String, serde_json::Value) + Send + Sync>;

/// The result dispatched to a waiting request.
#[derive(Debug)]
pub enum DispatchResult {
    /// Successful reply with the result value.
    Success(serde_json::Value),
    /// The backend refused the request.
    Error(String),
    /// The connection went away before a reply arrived.
    Disconnected(String),
}

/// Manages pending requests and routes replies.
pub struct Dispatcher {
    pending: HashMap<i64, oneshot::Sender<DispatchResult>>,
    notification_handler: Option<NotificationHandler>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            notification_handler: None,
        }
    }

    /// Set the handler for server-pushed notifications.
    pub fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notification_handler = Some(handler);
    }

    /// Register a pending request and return a receiver for its reply.
    pub fn register_request(&mut self, id: i64) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// How many requests are pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Route an incoming message.
    ///
    /// Replies for unknown ids are stale (their caller timed out or the
    /// session moved on) and are dropped.
    pub fn dispatch(&mut self, message: RpcMessage) {
        match message {
            RpcMessage::Response { id, result, error } => {
                let Some(sender) = self.pending.remove(&id) else {
                    tracing::warn!("received response for unknown request id: {}", id);
                    return;
                };
                let dispatch_result = match error {
                    Some(message) => DispatchResult::Error(message),
                    None => DispatchResult::Success(result),
                };
                // The caller may have given up already.
                let _ = sender.send(dispatch_result);
            }
            RpcMessage::Notification { method, params } => {
                if let Some(handler) = &self.notification_handler {
                    handler(method, params);
                } else {
                    tracing::debug!("unhandled notification: {}", method);
                }
            }
        }
    }

    /// Forget a pending request. Returns true if it was found.
    pub fn cancel(&mut self, id: i64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Resolve every pending request with a disconnect failure.
    pub fn fail_all(&mut self, reason: &str) {
        for (_, sender) in self.pending.drain() {
            let _ = sender.send(DispatchResult::Disconnected(reason.to_string()));
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending.len())
            .field("has_notification_handler", &self.notification_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: i64, result: serde_json::Value) -> RpcMessage {
        RpcMessage::Response {
            id,
            result,
            error: None,
        }
    }

    #[test]
    fn dispatcher_new_empty() {
        let disp = Dispatcher::new();
        assert_eq!(disp.pending_count(), 0);
    }

    #[tokio::test]
    async fn dispatcher_register_and_resolve() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(1);
        assert_eq!(disp.pending_count(), 1);

        disp.dispatch(response(1, serde_json::json!({"id": 7})));
        assert_eq!(disp.pending_count(), 0);

        match rx.await.unwrap() {
            DispatchResult::Success(val) => assert_eq!(val["id"], 7),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dispatcher_resolve_error() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(1);

        disp.dispatch(RpcMessage::Response {
            id: 1,
            result: serde_json::Value::Null,
            error: Some("invalid location".into()),
        });

        match rx.await.unwrap() {
            DispatchResult::Error(message) => assert_eq!(message, "invalid location"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn dispatcher_unknown_id_ignored() {
        let mut disp = Dispatcher::new();
        let _rx = disp.register_request(1);
        disp.dispatch(response(999, serde_json::Value::Null));
        assert_eq!(disp.pending_count(), 1);
    }

    #[tokio::test]
    async fn dispatcher_out_of_order_replies() {
        let mut disp = Dispatcher::new();
        let rx1 = disp.register_request(1);
        let rx2 = disp.register_request(2);
        let rx3 = disp.register_request(3);

        disp.dispatch(response(3, serde_json::json!("third")));
        disp.dispatch(response(1, serde_json::json!("first")));
        disp.dispatch(response(2, serde_json::json!("second")));

        for (rx, expected) in [(rx1, "first"), (rx2, "second"), (rx3, "third")] {
            match rx.await.unwrap() {
                DispatchResult::Success(val) => assert_eq!(val, expected),
                other => panic!("expected success, got {:?}", other),
            }
        }
    }

    #[test]
    fn dispatcher_notification_routed() {
        use std::sync::{Arc, Mutex};

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        let mut disp = Dispatcher::new();
        disp.set_notification_handler(Box::new(move |method, params| {
            received_clone.lock().unwrap().push((method, params));
        }));

        disp.dispatch(RpcMessage::Notification {
            method: "State".into(),
            params: serde_json::json!({"exited": true}),
        });

        let captured = received.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "State");
    }

    #[test]
    fn dispatcher_notification_without_handler() {
        let mut disp = Dispatcher::new();
        disp.dispatch(RpcMessage::Notification {
            method: "State".into(),
            params: serde_json::Value::Null,
        });
    }

    #[test]
    fn dispatcher_cancel() {
        let mut disp = Dispatcher::new();
        let _rx = disp.register_request(1);
        assert!(disp.cancel(1));
        assert!(!disp.cancel(1));
        assert_eq!(disp.pending_count(), 0);
    }

    #[tokio::test]
    async fn dispatcher_fail_all_resolves_waiters() {
        let mut disp = Dispatcher::new();
        let rx1 = disp.register_request(1);
        let rx2 = disp.register_request(2);

        disp.fail_all("connection closed");
        assert_eq!(disp.pending_count(), 0);

        for rx in [rx1, rx2] {
            match rx.await.unwrap() {
                DispatchResult::Disconnected(reason) => assert_eq!(reason, "connection closed"),
                other => panic!("expected disconnect, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn dispatcher_dropped_receiver_doesnt_panic() {
        let mut disp = Dispatcher::new();
        let rx = disp.register_request(1);
        drop(rx);
        disp.dispatch(response(1, serde_json::Value::Null));
        assert_eq!(disp.pending_count(), 0);
    }
}
