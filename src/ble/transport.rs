//! Abstract BLE transport.
//!
//! The engine never talks to a BLE stack directly. It drives a [`Transport`]
//! for connect, subscribe and write, and receives everything the device sends
//! as [`TransportEvent`] messages on a single queue handed to the transport at
//! connect time. When the session ends the queue's receiver is dropped, so
//! late notifications from a dead session can never reach the next one.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Capacity of the per-session event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Message pushed by the transport into the session's event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A notification arrived on a characteristic.
    Notification {
        /// UUID of the characteristic that sent the notification.
        characteristic: Uuid,
        /// The notification data.
        data: Bytes,
    },
    /// The link to the device dropped.
    Disconnected,
}

impl TransportEvent {
    /// Build a notification event.
    pub fn notification(characteristic: Uuid, data: impl Into<Bytes>) -> Self {
        Self::Notification {
            characteristic,
            data: data.into(),
        }
    }
}

/// GATT operations the engine needs from a BLE stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the link and start forwarding events into `events`.
    ///
    /// The transport must push [`TransportEvent::Disconnected`] when the link
    /// drops, and stop forwarding once the receiver is gone.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<()>;

    /// Tear down the link. Must be safe to call when already disconnected.
    async fn disconnect(&self) -> Result<()>;

    /// Enable notifications on a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Disable notifications on a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Write a frame to a characteristic (without response).
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;
}
