//! Operation queue - single-flight serialization over one link connection.
//!
//! Every link transaction (discover, read, write, descriptor write, MTU
//! change) is enqueued and executed by exactly one consumer task, strictly
//! in arrival order, no matter how many callers are concurrently waiting:
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Operation> ─► Consumer Task ─► Link
//! Caller N ─┘          (FIFO)            (one at a time)
//! ```
//!
//! Each operation carries a `oneshot` reply channel resolved exactly once by
//! the consumer. A failure inside one operation resolves that operation's
//! reply to its failure value and never stops the loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::link::{CharacteristicId, DescriptorId, Link, ServiceInfo};

/// Default operation channel capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Capacity of the operation channel; enqueue suspends when full.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The closed set of link operations.
///
/// Each kind has a fixed result type: service list for discovery, byte
/// buffer for reads, boolean for writes, integer for MTU changes. Adding a
/// new link operation means adding a variant here, not inferring a type.
#[derive(Debug)]
pub enum Operation {
    /// Enumerate GATT services.
    DiscoverServices {
        /// Resolves with the services, or `None` on failure.
        reply: oneshot::Sender<Option<Vec<ServiceInfo>>>,
    },
    /// Read one characteristic.
    ReadCharacteristic {
        /// Target characteristic.
        id: CharacteristicId,
        /// Link-level timeout.
        timeout: Duration,
        /// Resolves with the value, or `None` on failure.
        reply: oneshot::Sender<Option<Bytes>>,
    },
    /// Write one characteristic (chunked by the link if needed).
    WriteCharacteristic {
        /// Target characteristic.
        id: CharacteristicId,
        /// Bytes to write.
        value: Bytes,
        /// Usable payload per packet for chunking.
        payload_size: usize,
        /// Link-level timeout.
        timeout: Duration,
        /// Resolves `true` on success.
        reply: oneshot::Sender<bool>,
    },
    /// Write one descriptor.
    WriteDescriptor {
        /// Target descriptor.
        id: DescriptorId,
        /// Bytes to write.
        value: Bytes,
        /// Resolves `true` on success.
        reply: oneshot::Sender<bool>,
    },
    /// Request an MTU change.
    ChangeMtu {
        /// Requested MTU.
        value: usize,
        /// Resolves with the granted MTU, or `None` on failure.
        reply: oneshot::Sender<Option<usize>>,
    },
}

/// Single-consumer, multi-producer serialization layer over one [`Link`].
pub struct OperationQueue<L: Link> {
    link: Arc<L>,
    config: QueueConfig,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    tx: Option<mpsc::Sender<Operation>>,
    task: Option<JoinHandle<()>>,
}

impl<L: Link> OperationQueue<L> {
    /// Create a stopped queue over `link`.
    pub fn new(link: Arc<L>) -> Self {
        Self::with_config(link, QueueConfig::default())
    }

    /// Create a stopped queue with explicit configuration.
    pub fn with_config(link: Arc<L>, config: QueueConfig) -> Self {
        Self {
            link,
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Open the consumption channel and spawn the single consumer task.
    ///
    /// Idempotent: a second call on a running queue is a no-op.
    pub fn start(&self) {
        let mut state = self.state.lock().expect("queue state poisoned");
        if state.tx.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel(self.config.capacity);
        let link = Arc::clone(&self.link);
        state.tx = Some(tx);
        state.task = Some(tokio::spawn(consumer_loop(link, rx)));
    }

    /// Close the channel and cancel the consumer.
    ///
    /// Operations still queued are never executed; their reply channels are
    /// dropped, which the enqueue methods surface as the operation's failure
    /// value rather than hanging forever.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("queue state poisoned");
        state.tx = None;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    /// True while the consumer is running.
    pub fn is_running(&self) -> bool {
        self.state.lock().expect("queue state poisoned").tx.is_some()
    }

    fn sender(&self) -> Option<mpsc::Sender<Operation>> {
        self.state.lock().expect("queue state poisoned").tx.clone()
    }

    /// Enqueue a service discovery; suspends until executed.
    pub async fn discover_services(&self) -> Option<Vec<ServiceInfo>> {
        let (reply, rx) = oneshot::channel();
        self.submit(Operation::DiscoverServices { reply }).await?;
        rx.await.ok().flatten()
    }

    /// Enqueue a characteristic read; suspends until executed.
    pub async fn read_characteristic(
        &self,
        id: CharacteristicId,
        timeout: Duration,
    ) -> Option<Bytes> {
        let (reply, rx) = oneshot::channel();
        self.submit(Operation::ReadCharacteristic { id, timeout, reply })
            .await?;
        rx.await.ok().flatten()
    }

    /// Enqueue a characteristic write; suspends until executed.
    ///
    /// Returns `true` on success, `false` on link failure or a stopped queue.
    pub async fn write_characteristic(
        &self,
        id: CharacteristicId,
        value: Bytes,
        payload_size: usize,
        timeout: Duration,
    ) -> bool {
        let (reply, rx) = oneshot::channel();
        let submitted = self
            .submit(Operation::WriteCharacteristic {
                id,
                value,
                payload_size,
                timeout,
                reply,
            })
            .await;
        if submitted.is_none() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Enqueue a descriptor write; suspends until executed.
    pub async fn write_descriptor(&self, id: DescriptorId, value: Bytes) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .submit(Operation::WriteDescriptor { id, value, reply })
            .await
            .is_none()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Enqueue an MTU change; suspends until executed.
    pub async fn change_mtu(&self, value: usize) -> Option<usize> {
        let (reply, rx) = oneshot::channel();
        self.submit(Operation::ChangeMtu { value, reply }).await?;
        rx.await.ok().flatten()
    }

    async fn submit(&self, operation: Operation) -> Option<()> {
        let tx = self.sender()?;
        tx.send(operation).await.ok()
    }
}

impl<L: Link> Drop for OperationQueue<L> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
    }
}

/// The single consumer: dequeue, execute, resolve, repeat.
///
/// Every link failure is caught here and turned into the operation's failure
/// value; one bad operation must never stop the queue.
async fn consumer_loop<L: Link>(link: Arc<L>, mut rx: mpsc::Receiver<Operation>) {
    while let Some(operation) = rx.recv().await {
        match operation {
            Operation::DiscoverServices { reply } => {
                let result = match link.discover_services().await {
                    Ok(services) => Some(services),
                    Err(e) => {
                        tracing::warn!(error = %e, "discover_services failed");
                        None
                    }
                };
                let _ = reply.send(result);
            }
            Operation::ReadCharacteristic { id, timeout, reply } => {
                let result = match link.read_characteristic(id, timeout).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(characteristic = id.0, error = %e, "read failed");
                        None
                    }
                };
                let _ = reply.send(result);
            }
            Operation::WriteCharacteristic {
                id,
                value,
                payload_size,
                timeout,
                reply,
            } => {
                let ok = match link.write_characteristic(id, &value, payload_size, timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(characteristic = id.0, error = %e, "write failed");
                        false
                    }
                };
                let _ = reply.send(ok);
            }
            Operation::WriteDescriptor { id, value, reply } => {
                let ok = match link.write_descriptor(id, &value).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(descriptor = id.0, error = %e, "descriptor write failed");
                        false
                    }
                };
                let _ = reply.send(ok);
            }
            Operation::ChangeMtu { value, reply } => {
                let result = match link.change_mtu(value).await {
                    Ok(granted) => Some(granted),
                    Err(e) => {
                        tracing::warn!(requested = value, error = %e, "mtu change failed");
                        None
                    }
                };
                let _ = reply.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GattLinkError;
    use crate::link::Notification;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    /// Link double that records execution order and can fail on demand.
    struct RecordingLink {
        sequence: AtomicUsize,
        executed: Mutex<Vec<(String, usize)>>,
        fail_reads: bool,
        notify_tx: broadcast::Sender<Notification>,
    }

    impl RecordingLink {
        fn new(fail_reads: bool) -> Self {
            let (notify_tx, _) = broadcast::channel(16);
            Self {
                sequence: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
                fail_reads,
                notify_tx,
            }
        }

        fn record(&self, what: impl Into<String>) -> usize {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            self.executed.lock().unwrap().push((what.into(), seq));
            seq
        }
    }

    impl Link for RecordingLink {
        async fn discover_services(&self) -> crate::error::Result<Vec<ServiceInfo>> {
            self.record("discover");
            Ok(vec![ServiceInfo {
                uuid: "0000180f-0000-1000-8000-00805f9b34fb".into(),
                characteristics: vec![CharacteristicId(0x10)],
            }])
        }

        async fn read_characteristic(
            &self,
            id: CharacteristicId,
            _timeout: Duration,
        ) -> crate::error::Result<Bytes> {
            self.record(format!("read {}", id.0));
            if self.fail_reads {
                return Err(GattLinkError::Link("read refused".into()));
            }
            Ok(Bytes::from_static(&[0xAB]))
        }

        async fn write_characteristic(
            &self,
            id: CharacteristicId,
            _value: &[u8],
            _payload_size: usize,
            _timeout: Duration,
        ) -> crate::error::Result<()> {
            self.record(format!("write {}", id.0));
            Ok(())
        }

        async fn write_descriptor(
            &self,
            id: DescriptorId,
            _value: &[u8],
        ) -> crate::error::Result<()> {
            self.record(format!("descriptor {}", id.0));
            Ok(())
        }

        async fn set_notification(
            &self,
            _id: CharacteristicId,
            _enabled: bool,
        ) -> crate::error::Result<()> {
            Ok(())
        }

        fn notifications(&self) -> broadcast::Receiver<Notification> {
            self.notify_tx.subscribe()
        }

        async fn change_mtu(&self, value: usize) -> crate::error::Result<usize> {
            self.record("mtu");
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let queue = OperationQueue::new(Arc::new(RecordingLink::new(false)));
        queue.start();
        queue.start();
        assert!(queue.is_running());
    }

    #[tokio::test]
    async fn test_all_operation_kinds_resolve() {
        let link = Arc::new(RecordingLink::new(false));
        let queue = OperationQueue::new(Arc::clone(&link));
        queue.start();

        let services = queue.discover_services().await.unwrap();
        assert_eq!(services.len(), 1);

        let value = queue
            .read_characteristic(CharacteristicId(0x10), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&value[..], &[0xAB]);

        assert!(
            queue
                .write_characteristic(
                    CharacteristicId(0x11),
                    Bytes::from_static(b"hi"),
                    20,
                    Duration::from_millis(100),
                )
                .await
        );

        assert!(
            queue
                .write_descriptor(DescriptorId(0x12), Bytes::from_static(&[1, 0]))
                .await
        );

        assert_eq!(queue.change_mtu(185).await, Some(185));
    }

    #[tokio::test]
    async fn test_failed_read_resolves_none_and_loop_continues() {
        let link = Arc::new(RecordingLink::new(true));
        let queue = OperationQueue::new(Arc::clone(&link));
        queue.start();

        assert!(queue
            .read_characteristic(CharacteristicId(1), Duration::from_millis(10))
            .await
            .is_none());

        // Loop survived the failure.
        assert_eq!(queue.change_mtu(64).await, Some(64));
    }

    #[tokio::test]
    async fn test_stopped_queue_resolves_failure_values() {
        let queue = OperationQueue::new(Arc::new(RecordingLink::new(false)));
        queue.start();
        queue.stop();
        assert!(!queue.is_running());

        assert!(queue.discover_services().await.is_none());
        assert!(
            !queue
                .write_characteristic(
                    CharacteristicId(1),
                    Bytes::new(),
                    20,
                    Duration::from_millis(10),
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_fifo_order_single_producer() {
        let link = Arc::new(RecordingLink::new(false));
        let queue = Arc::new(OperationQueue::new(Arc::clone(&link)));
        queue.start();

        for i in 0..10u16 {
            queue
                .write_characteristic(
                    CharacteristicId(i),
                    Bytes::new(),
                    20,
                    Duration::from_millis(10),
                )
                .await;
        }

        let executed = link.executed.lock().unwrap();
        let writes: Vec<_> = executed.iter().map(|(what, _)| what.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("write {i}")).collect();
        assert_eq!(writes, expected);
    }
}
