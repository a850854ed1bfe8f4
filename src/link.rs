//! Link abstraction over the host BLE stack.
//!
//! The engine never talks to a platform Bluetooth API directly; it consumes
//! an abstract [`Link`] with the read/write/notify/MTU operations of one
//! physical connection. GATT discovery, connection management and MTU
//! negotiation live behind this trait.
//!
//! Notifications arrive on a [`broadcast`] channel so the correlator and any
//! number of feature subscribers can each hold an independent receiver; the
//! stream is ordered per sender but independent of the write queue beyond
//! "after the write completed on the link".

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Result;

/// Default ATT MTU before negotiation.
pub const DEFAULT_MTU: usize = 23;

/// Default usable payload of one characteristic write (MTU 23 minus the
/// 3-byte ATT header).
pub const DEFAULT_WRITE_PAYLOAD_SIZE: usize = 20;

/// CCC descriptor value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCC descriptor value disabling notifications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Handle of one characteristic on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicId(pub u16);

/// Handle of one descriptor on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub u16);

/// One discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// 128-bit service UUID, textual form.
    pub uuid: String,
    /// Characteristics exposed by the service.
    pub characteristics: Vec<CharacteristicId>,
}

/// One incoming characteristic notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Source characteristic.
    pub characteristic: CharacteristicId,
    /// Notified value.
    pub value: Bytes,
}

/// Link configuration: negotiated MTU and derived write chunk size.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Negotiated ATT MTU.
    pub mtu: usize,
    /// Usable payload per characteristic write (MTU minus ATT overhead).
    pub write_payload_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            write_payload_size: DEFAULT_WRITE_PAYLOAD_SIZE,
        }
    }
}

/// One physical BLE connection, as seen by the engine.
///
/// Implementations wrap a platform stack (or a test double). All methods may
/// be called concurrently; serialization of actual link transactions is the
/// [`OperationQueue`](crate::queue::OperationQueue)'s job, not the link's.
pub trait Link: Send + Sync + 'static {
    /// Enumerate the connection's GATT services.
    fn discover_services(&self) -> impl std::future::Future<Output = Result<Vec<ServiceInfo>>> + Send;

    /// Read a characteristic value, bounded by `timeout`.
    fn read_characteristic(
        &self,
        id: CharacteristicId,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Bytes>> + Send;

    /// Write a characteristic value, chunking into `payload_size` pieces if
    /// `value` exceeds one packet, bounded by `timeout`.
    fn write_characteristic(
        &self,
        id: CharacteristicId,
        value: &[u8],
        payload_size: usize,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a descriptor value (e.g. the CCC descriptor).
    fn write_descriptor(
        &self,
        id: DescriptorId,
        value: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Register or unregister host-side interest in notifications from `id`.
    ///
    /// This is the local toggle; the remote side is armed by writing the CCC
    /// descriptor through the operation queue.
    fn set_notification(
        &self,
        id: CharacteristicId,
        enabled: bool,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Subscribe to the incoming notification stream.
    fn notifications(&self) -> broadcast::Receiver<Notification>;

    /// Request an MTU change; returns the value actually granted.
    fn change_mtu(&self, value: usize) -> impl std::future::Future<Output = Result<usize>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.mtu, 23);
        assert_eq!(config.write_payload_size, 20);
    }

    #[test]
    fn test_ccc_values() {
        assert_eq!(ENABLE_NOTIFICATION_VALUE, [0x01, 0x00]);
        assert_eq!(DISABLE_NOTIFICATION_VALUE, [0x00, 0x00]);
    }
}
