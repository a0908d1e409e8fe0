//! Signal subscribers.
//!
//! Slots are keyed by the server's connection number, never by the
//! client-chosen id: a front-end reconnecting under the same id gets a
//! slot of its own, and the old connection's teardown only frees the old
//! slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lpui_core::NotificationEvent;
use lpui_protocol::DaemonMessage;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error};

use super::connection::ConnectionError;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of a client connection, shared between its handler and the
/// broadcaster.
pub type SignalWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

struct Slot {
    client_id: String,
    writer: SignalWriter,
}

/// Returned by [`Subscribers::join`] when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Too many subscribers (max: {capacity})")]
pub struct SubscribersFull {
    pub capacity: usize,
}

/// Connections currently receiving signals.
#[derive(Clone)]
pub struct Subscribers {
    slots: Arc<RwLock<HashMap<u64, Slot>>>,
    capacity: usize,
}

impl Subscribers {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribes `connection`. Subscribing twice keeps the one slot.
    pub async fn join(
        &self,
        connection: u64,
        client_id: &str,
        writer: SignalWriter,
    ) -> Result<(), SubscribersFull> {
        let mut slots = self.slots.write().await;

        if slots.len() >= self.capacity && !slots.contains_key(&connection) {
            return Err(SubscribersFull {
                capacity: self.capacity,
            });
        }

        slots.insert(
            connection,
            Slot {
                client_id: client_id.to_string(),
                writer,
            },
        );
        Ok(())
    }

    /// Frees the slot of `connection`. Returns whether it had one.
    pub async fn leave(&self, connection: u64) -> bool {
        self.slots.write().await.remove(&connection).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }

    /// Sends `event` as a signal to every subscriber.
    ///
    /// Subscribers whose write fails or times out lose their slot.
    pub async fn broadcast(&self, event: &NotificationEvent) {
        let json = match serde_json::to_string(&DaemonMessage::signal(event)) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize signal");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let slots = self.slots.read().await;
            for (connection, slot) in slots.iter() {
                if let Err(e) = write_line(&slot.writer, &json).await {
                    debug!(client_id = %slot.client_id, connection, error = %e, "Signal not delivered");
                    dead.push(*connection);
                }
            }
        }

        if !dead.is_empty() {
            let mut slots = self.slots.write().await;
            for connection in dead {
                if let Some(slot) = slots.remove(&connection) {
                    debug!(client_id = %slot.client_id, connection, "Dropped unreachable subscriber");
                }
            }
        }
    }
}

/// Writes one JSON line and flushes, bounded by the write timeout.
pub(crate) async fn write_line(writer: &SignalWriter, json: &str) -> Result<(), ConnectionError> {
    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpui_core::CallSignal;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::unix::OwnedReadHalf;
    use tokio::net::UnixStream;

    /// A subscriber writer plus the peer end it writes to.
    fn pipe() -> (SignalWriter, BufReader<OwnedReadHalf>) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (_, write) = ours.into_split();
        let (read, _) = theirs.into_split();
        (Arc::new(Mutex::new(BufWriter::new(write))), BufReader::new(read))
    }

    async fn read_signal(reader: &mut BufReader<OwnedReadHalf>) -> DaemonMessage {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_same_client_id_keeps_separate_slots() {
        let subs = Subscribers::with_capacity(10);
        let (old_writer, _old_reader) = pipe();
        let (new_writer, mut new_reader) = pipe();

        subs.join(1, "linphone-ui", old_writer).await.unwrap();
        subs.join(2, "linphone-ui", new_writer).await.unwrap();
        assert_eq!(subs.len().await, 2);

        // The stale connection goes away after the reconnect
        assert!(subs.leave(1).await);
        assert!(!subs.leave(1).await);

        subs.broadcast(&NotificationEvent::call(CallSignal::Incoming, "1001"))
            .await;
        assert_eq!(
            read_signal(&mut new_reader).await,
            DaemonMessage::CallStateChanged {
                state: "incoming".to_string(),
                identity: "1001".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_capacity() {
        let subs = Subscribers::with_capacity(1);
        let (first, _r1) = pipe();
        let (second, _r2) = pipe();

        subs.join(1, "a", Arc::clone(&first)).await.unwrap();
        assert_eq!(
            subs.join(2, "b", second).await,
            Err(SubscribersFull { capacity: 1 })
        );

        // Re-subscribing an existing connection is not a new slot
        assert!(subs.join(1, "a", first).await.is_ok());
        assert_eq!(subs.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_peer() {
        let subs = Subscribers::with_capacity(10);
        let (gone, reader) = pipe();
        let (alive, mut alive_reader) = pipe();
        drop(reader);

        subs.join(1, "gone", gone).await.unwrap();
        subs.join(2, "alive", alive).await.unwrap();

        subs.broadcast(&NotificationEvent::registration(true)).await;

        assert_eq!(
            read_signal(&mut alive_reader).await,
            DaemonMessage::RegistrationStateChanged { registered: true }
        );
        assert_eq!(subs.len().await, 1);
    }
}
