//! Command processor: sends typed requests over the single backend
//! connection and resolves each call when its reply arrives.
//!
//! Replies may arrive in any order; correlation happens in the
//! [`Dispatcher`] by request id.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::codec::{encode_request, next_request_id, parse_message};
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::dispatcher::{DispatchResult, Dispatcher, NotificationHandler};
use crate::error::DlvError;
use crate::request::DlvRequest;

/// Outgoing half of the current connection. `generation` tells a
/// superseded connection's reader task apart from the live one.
#[derive(Clone)]
struct Writer {
    generation: u64,
    tx: mpsc::Sender<Vec<u8>>,
}

type WriterSlot = Arc<StdMutex<Option<Writer>>>;

/// Sends requests to the backend and correlates replies.
pub struct CommandProcessor {
    connection: Arc<ConnectionState>,
    dispatcher: Arc<Mutex<Dispatcher>>,
    writer_tx: WriterSlot,
    generation: AtomicU64,
    request_timeout: Duration,
}

impl CommandProcessor {
    /// Create a processor that is not yet attached to a connection.
    pub fn new(connection: Arc<ConnectionState>, request_timeout: Duration) -> Self {
        Self::with_dispatcher(connection, request_timeout, Dispatcher::new())
    }

    /// Like [`CommandProcessor::new`], routing server-pushed notifications
    /// to `handler`.
    pub fn with_notification_handler(
        connection: Arc<ConnectionState>,
        request_timeout: Duration,
        handler: NotificationHandler,
    ) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_notification_handler(handler);
        Self::with_dispatcher(connection, request_timeout, dispatcher)
    }

    fn with_dispatcher(
        connection: Arc<ConnectionState>,
        request_timeout: Duration,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            connection,
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            writer_tx: Arc::new(StdMutex::new(None)),
            generation: AtomicU64::new(0),
            request_timeout,
        }
    }

    /// The connection status this processor publishes to.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// Number of requests still waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.dispatcher.lock().await.pending_count()
    }

    /// Open a TCP connection to the backend and attach to it.
    pub async fn connect(&self, addr: &str, connect_timeout: Duration) -> Result<(), DlvError> {
        self.connection
            .set_status(ConnectionStatus::WaitingForConnection);

        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.connection.set_status(ConnectionStatus::ConnectionFailed);
                return Err(DlvError::Io(e));
            }
            Err(_) => {
                self.connection.set_status(ConnectionStatus::ConnectionFailed);
                return Err(DlvError::Timeout {
                    method: format!("connect {}", addr),
                    secs: connect_timeout.as_secs(),
                });
            }
        };
        tracing::info!(addr, "connected to debugger backend");

        let (reader, writer) = stream.into_split();
        self.attach(reader, writer);
        Ok(())
    }

    /// Start the reader and writer tasks over an established byte stream
    /// and mark the connection as connected.
    ///
    /// Attaching again replaces the previous connection; the old reader no
    /// longer affects the connection status when its stream closes.
    pub fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // Writer task: sends encoded requests to the backend
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(msg) = writer_rx.recv().await {
                if writer.write_all(&msg).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self
            .writer_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Writer {
            generation,
            tx: writer_tx,
        });
        self.connection.set_status(ConnectionStatus::Connected);

        // Reader task: one reply or notification per line
        let dispatcher = self.dispatcher.clone();
        let connection = self.connection.clone();
        let writer_slot = self.writer_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read from debugger backend");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_message(&line) {
                    Ok(message) => dispatcher.lock().await.dispatch(message),
                    Err(e) => tracing::warn!(error = %e, "dropping malformed backend message"),
                }
            }

            let current = {
                let mut slot = writer_slot
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if slot.as_ref().map(|w| w.generation) == Some(generation) {
                    slot.take();
                    true
                } else {
                    false
                }
            };
            if !current {
                tracing::debug!(generation, "superseded backend connection closed");
                return;
            }
            connection.set_status(ConnectionStatus::Disconnected);
            dispatcher
                .lock()
                .await
                .fail_all("debugger backend closed the connection");
            tracing::info!("debugger backend connection closed");
        });
    }

    fn writer(&self) -> Option<Writer> {
        self.writer_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Send a request and wait for its reply.
    ///
    /// Single attempt: transport failures, backend errors and timeouts are
    /// returned to the caller as-is. Only bounded requests
    /// ([`DlvRequest::is_bounded`]) are subject to the request timeout.
    pub async fn send<R: DlvRequest>(&self, request: R) -> Result<R::Response, DlvError> {
        let writer = self.writer().ok_or(DlvError::NotConnected)?;

        let method = request.method();
        let params = request.params()?;
        let id = next_request_id();

        let rx = {
            let mut disp = self.dispatcher.lock().await;
            disp.register_request(id)
        };

        // The connection may have closed (and failed all pending requests)
        // between taking the writer and registering.
        if self.writer().map(|w| w.generation) != Some(writer.generation) {
            self.dispatcher.lock().await.cancel(id);
            return Err(DlvError::Transport(
                "debugger backend connection is closed".into(),
            ));
        }

        tracing::debug!(id, method, "sending request");
        if writer
            .tx
            .send(encode_request(id, method, params))
            .await
            .is_err()
        {
            self.dispatcher.lock().await.cancel(id);
            return Err(DlvError::Transport(
                "debugger backend connection is closed".into(),
            ));
        }

        let received = if request.is_bounded() {
            match timeout(self.request_timeout, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.dispatcher.lock().await.cancel(id);
                    return Err(DlvError::Timeout {
                        method: method.to_string(),
                        secs: self.request_timeout.as_secs(),
                    });
                }
            }
        } else {
            rx.await
        };
        let result =
            received.map_err(|_| DlvError::Transport("reply channel dropped".into()))?;

        match result {
            DispatchResult::Success(value) => serde_json::from_value(value)
                .map_err(|e| DlvError::InvalidResponse(format!("{}: {}", method, e))),
            DispatchResult::Error(message) => Err(DlvError::Rpc { message }),
            DispatchResult::Disconnected(reason) => Err(DlvError::Transport(reason)),
        }
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("status", &self.connection.status())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_response;
    use crate::protocol::CommandKind;
    use crate::request::{ClearBreakpoint, Command, SetBreakpoint};
    use tokio::io::{duplex, AsyncBufReadExt, DuplexStream};

    fn processor() -> CommandProcessor {
        CommandProcessor::new(Arc::new(ConnectionState::new()), Duration::from_secs(5))
    }

    /// Attach a processor to an in-memory pipe and return the backend side.
    fn attached(proc: &CommandProcessor) -> (BufReader<tokio::io::ReadHalf<DuplexStream>>, tokio::io::WriteHalf<DuplexStream>) {
        let (client, server) = duplex(16 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        proc.attach(client_read, client_write);
        let (server_read, server_write) = tokio::io::split(server);
        (BufReader::new(server_read), server_write)
    }

    async fn read_request(reader: &mut BufReader<tokio::io::ReadHalf<DuplexStream>>) -> serde_json::Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[tokio::test]
    async fn send_before_attach_fails() {
        let proc = processor();
        let err = proc.send(Command::new(CommandKind::Next)).await.unwrap_err();
        assert!(matches!(err, DlvError::NotConnected));
    }

    #[tokio::test]
    async fn attach_marks_connected() {
        let proc = processor();
        let _backend = attached(&proc);
        assert!(proc.connection().is_connected());
    }

    #[tokio::test]
    async fn send_resolves_with_decoded_result() {
        let proc = Arc::new(processor());
        let (mut reader, mut writer) = attached(&proc);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(SetBreakpoint::new("/src/main.go", 10)).await })
        };

        let req = read_request(&mut reader).await;
        assert_eq!(req["method"], "RPCServer.CreateBreakpoint");
        assert_eq!(req["params"][0]["line"], 10);
        let id = req["id"].as_i64().unwrap();
        writer
            .write_all(&encode_response(id, Ok(serde_json::json!({"id": 7, "file": "/src/main.go", "line": 10}))))
            .await
            .unwrap();

        let bp = task.await.unwrap().unwrap().unwrap();
        assert_eq!(bp.id, 7);
        assert_eq!(proc.pending_count().await, 0);
    }

    #[tokio::test]
    async fn backend_error_becomes_rpc_error() {
        let proc = Arc::new(processor());
        let (mut reader, mut writer) = attached(&proc);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(ClearBreakpoint::new(3)).await })
        };

        let req = read_request(&mut reader).await;
        let id = req["id"].as_i64().unwrap();
        writer
            .write_all(&encode_response(id, Err("no breakpoint with id 3".into())))
            .await
            .unwrap();

        match task.await.unwrap() {
            Err(DlvError::Rpc { message }) => assert_eq!(message, "no breakpoint with id 3"),
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn out_of_order_replies_reach_their_callers() {
        let proc = Arc::new(processor());
        let (mut reader, mut writer) = attached(&proc);

        let first = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(ClearBreakpoint::new(1)).await })
        };
        let req1 = read_request(&mut reader).await;
        let second = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(ClearBreakpoint::new(2)).await })
        };
        let req2 = read_request(&mut reader).await;

        // Answer in reverse order, echoing the cleared id.
        for req in [&req2, &req1] {
            let id = req["id"].as_i64().unwrap();
            let bp_id = req["params"][0].as_i64().unwrap();
            writer
                .write_all(&encode_response(id, Ok(serde_json::json!({"id": bp_id}))))
                .await
                .unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap().unwrap().id, 1);
        assert_eq!(second.await.unwrap().unwrap().unwrap().id, 2);
    }

    #[tokio::test]
    async fn disconnect_fails_pending_requests() {
        let proc = Arc::new(processor());
        let (mut reader, writer) = attached(&proc);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(Command::new(CommandKind::Continue)).await })
        };
        let _ = read_request(&mut reader).await;
        drop(writer);
        drop(reader);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, DlvError::Transport(_)), "got: {err:?}");
        assert_eq!(
            proc.connection().status(),
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resuming_command_outlives_request_timeout() {
        let conn = Arc::new(ConnectionState::new());
        let proc = Arc::new(CommandProcessor::new(conn, Duration::from_secs(1)));
        let (mut reader, mut writer) = attached(&proc);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(Command::new(CommandKind::Continue)).await })
        };
        let req = read_request(&mut reader).await;

        // The debuggee runs well past the request timeout.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!task.is_finished());
        assert_eq!(proc.pending_count().await, 1);

        let id = req["id"].as_i64().unwrap();
        writer
            .write_all(&encode_response(
                id,
                Ok(serde_json::json!({"exited": false, "currentThread": {"id": 4}})),
            ))
            .await
            .unwrap();

        let state = task.await.unwrap().unwrap().expect("debugger state");
        assert_eq!(state.current_thread_id(), 4);
    }

    #[tokio::test]
    async fn reattach_ignores_old_connection_closing() {
        let proc = Arc::new(processor());
        let (old_reader, old_writer) = attached(&proc);
        let (mut reader, mut writer) = attached(&proc);

        drop(old_reader);
        drop(old_writer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(proc.connection().status(), ConnectionStatus::Connected);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(ClearBreakpoint::new(5)).await })
        };
        let req = read_request(&mut reader).await;
        let id = req["id"].as_i64().unwrap();
        writer
            .write_all(&encode_response(id, Ok(serde_json::json!({"id": 5}))))
            .await
            .unwrap();
        assert_eq!(task.await.unwrap().unwrap().unwrap().id, 5);
    }

    #[tokio::test]
    async fn send_after_disconnect_fails_without_waiting() {
        let proc = Arc::new(processor());
        let (reader, writer) = attached(&proc);
        let mut status = proc.connection().subscribe();
        drop(reader);
        drop(writer);
        status
            .wait_for(|s| *s == ConnectionStatus::Disconnected)
            .await
            .unwrap();

        let err = timeout(Duration::from_secs(1), proc.send(Command::new(CommandKind::Continue)))
            .await
            .expect("send must not hang after disconnect")
            .unwrap_err();
        assert!(matches!(err, DlvError::NotConnected), "got: {err:?}");
        assert_eq!(proc.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_and_late_reply_is_ignored() {
        let conn = Arc::new(ConnectionState::new());
        let proc = Arc::new(CommandProcessor::new(conn, Duration::from_secs(2)));
        let (mut reader, mut writer) = attached(&proc);

        let task = {
            let proc = proc.clone();
            tokio::spawn(async move { proc.send(Command::new(CommandKind::Halt)).await })
        };
        let req = read_request(&mut reader).await;

        match task.await.unwrap() {
            Err(DlvError::Timeout { method, secs }) => {
                assert_eq!(method, "RPCServer.Command");
                assert_eq!(secs, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(proc.pending_count().await, 0);

        let id = req["id"].as_i64().unwrap();
        writer
            .write_all(&encode_response(id, Ok(serde_json::Value::Null)))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(proc.connection().is_connected());
    }
}
