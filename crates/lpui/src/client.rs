//! Bus client for the LinphoneUI daemon.
//!
//! [`BusClient`] connects to the daemon's Unix socket, performs the
//! protocol handshake, and then either runs method calls or, once
//! subscribed, streams state-change signals.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::path::Path;

use lpui_protocol::{ClientMessage, ControlRequest, DaemonMessage, ProtocolVersion, ReplyValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::error::{CtlError, Result};

/// A handshaken connection to the daemon.
pub struct BusClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
    next_request: u64,
}

impl BusClient {
    /// Connects to `socket_path` and performs the handshake.
    pub async fn connect(socket_path: &Path, client_id: Option<String>) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| CtlError::Connect {
                path: socket_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
            next_request: 1,
        };

        client.send(&ClientMessage::connect(client_id)).await?;

        match client.recv().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(version_mismatch(protocol_version));
                }
                debug!(client_id, protocol_version = %protocol_version, "Handshake complete");
                client.client_id = client_id;
                Ok(client)
            }
            DaemonMessage::Rejected {
                reason,
                protocol_version,
            } => {
                warn!(reason, "Daemon rejected connection");
                Err(version_mismatch(protocol_version))
            }
            other => Err(CtlError::Protocol(format!(
                "Unexpected response to connect: {other:?}"
            ))),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Runs one method call and returns its reply.
    ///
    /// Signals arriving before the reply are skipped.
    pub async fn call(&mut self, request: ControlRequest) -> Result<ReplyValue> {
        let request_id = self.next_request;
        self.next_request = self.next_request.wrapping_add(1);

        debug!(request_id, method = request.method_name(), "Calling");
        self.send(&ClientMessage::call(request_id, request)).await?;

        loop {
            match self.recv().await? {
                DaemonMessage::Reply {
                    request_id: id,
                    value,
                } if id == request_id => return Ok(value),
                DaemonMessage::Error { message, .. } => return Err(CtlError::Daemon(message)),
                other => debug!(message = ?other, "Skipping message while awaiting reply"),
            }
        }
    }

    /// Asks the daemon for signals. The current state follows immediately.
    pub async fn subscribe(&mut self) -> Result<()> {
        self.send(&ClientMessage::subscribe()).await
    }

    /// Waits for the next signal.
    ///
    /// Returns `Ok(None)` when the daemon closes the connection.
    pub async fn next_signal(&mut self) -> Result<Option<DaemonMessage>> {
        loop {
            let message = match self.recv().await {
                Ok(message) => message,
                Err(CtlError::Closed) => return Ok(None),
                Err(e) => return Err(e),
            };

            match message {
                DaemonMessage::RegistrationStateChanged { .. }
                | DaemonMessage::CallStateChanged { .. } => return Ok(Some(message)),
                DaemonMessage::Error { message, .. } => return Err(CtlError::Daemon(message)),
                other => debug!(message = ?other, "Ignoring non-signal message"),
            }
        }
    }

    /// Says goodbye; the daemon closes its side.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&ClientMessage::disconnect()).await?;
        info!(client_id = %self.client_id, "Disconnected");
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<DaemonMessage> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(CtlError::Closed);
        }
        Ok(serde_json::from_str(line.trim())?)
    }
}

fn version_mismatch(daemon_version: ProtocolVersion) -> CtlError {
    CtlError::VersionMismatch {
        client_version: ProtocolVersion::CURRENT.to_string(),
        daemon_version: daemon_version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpui_protocol::MessageType;
    use tokio::net::UnixListener;

    /// Serves one connection, answering each request line with `respond`.
    async fn fake_daemon<F>(listener: UnixListener, mut respond: F)
    where
        F: FnMut(ClientMessage) -> Vec<DaemonMessage> + Send + 'static,
    {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await.unwrap() {
            let msg: ClientMessage = serde_json::from_str(&line).unwrap();
            for reply in respond(msg) {
                let json = serde_json::to_string(&reply).unwrap();
                writer.write_all(json.as_bytes()).await.unwrap();
                writer.write_all(b"\n").await.unwrap();
            }
        }
    }

    fn handshake_then(
        mut rest: impl FnMut(MessageType) -> Vec<DaemonMessage> + Send + 'static,
    ) -> impl FnMut(ClientMessage) -> Vec<DaemonMessage> + Send + 'static {
        move |msg| match msg.message {
            MessageType::Connect { client_id } => vec![DaemonMessage::connected(
                client_id.unwrap_or_else(|| "client-0".to_string()),
            )],
            other => rest(other),
        }
    }

    #[tokio::test]
    async fn test_call_skips_signals_until_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lpui.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(fake_daemon(
            listener,
            handshake_then(|msg| match msg {
                MessageType::Call { request_id, .. } => vec![
                    DaemonMessage::RegistrationStateChanged { registered: true },
                    DaemonMessage::reply(request_id, "No active call".to_string()),
                ],
                _ => vec![],
            }),
        ));

        let mut client = BusClient::connect(&path, Some("test".to_string()))
            .await
            .unwrap();
        assert_eq!(client.client_id(), "test");

        let reply = client.call(ControlRequest::GetCurrentCallInfo).await.unwrap();
        assert_eq!(reply.as_text(), Some("No active call"));
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lpui.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(fake_daemon(listener, |_| {
            vec![DaemonMessage::rejected("too old")]
        }));

        let err = BusClient::connect(&path, None).await.err().unwrap();
        assert!(matches!(err, CtlError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_signals_then_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lpui.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            lines.next_line().await.unwrap();
            for msg in [
                DaemonMessage::connected("ui".to_string()),
                DaemonMessage::pong(1),
                DaemonMessage::CallStateChanged {
                    state: "incoming".to_string(),
                    identity: "1001".to_string(),
                },
            ] {
                let json = serde_json::to_string(&msg).unwrap();
                writer.write_all(format!("{json}\n").as_bytes()).await.unwrap();
            }
            // Wait for subscribe, then hang up
            lines.next_line().await.unwrap();
        });

        let mut client = BusClient::connect(&path, None).await.unwrap();
        client.subscribe().await.unwrap();

        match client.next_signal().await.unwrap() {
            Some(DaemonMessage::CallStateChanged { state, identity }) => {
                assert_eq!(state, "incoming");
                assert_eq!(identity, "1001");
            }
            other => panic!("Expected call signal, got {other:?}"),
        }
        assert!(client.next_signal().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let err = BusClient::connect(&dir.path().join("absent.sock"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CtlError::Connect { .. }));
    }
}
