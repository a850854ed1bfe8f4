//! # gattlink
//!
//! Device-communication engine for BLE GATT peripherals.
//!
//! Everything a connection needs between the platform BLE stack and typed
//! application data: segmentation transports for payloads larger than one
//! MTU, a feature codec layer for typed samples and commands, a single-flight
//! operation queue serializing all link transactions, and a command/response
//! correlator.
//!
//! ## Architecture
//!
//! - **Link** ([`Link`]): thin async trait over the platform GATT stack
//! - **Operation queue** ([`OperationQueue`]): one consumer task, strict FIFO
//! - **Transports** ([`transport`]): Legacy-Split / JSON-Split / Audio-Split
//!   reassembly over MTU-sized packets
//! - **Features** ([`feature`]): typed decode/encode per data channel
//! - **Correlator** ([`Correlator`]): framed command out, matched response in
//! - **Audio** ([`audio`]): ADPCM codec pipeline over the Audio-Split
//!   transport
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gattlink::{
//!     BatteryFeature, CommandOptions, Correlator, FeatureCommand, OperationQueue,
//! };
//!
//! # async fn run(link: Arc<impl gattlink::Link>) {
//! let queue = Arc::new(OperationQueue::new(Arc::clone(&link)));
//! queue.start();
//!
//! let correlator = Correlator::new(
//!     Arc::clone(&link),
//!     Arc::clone(&queue),
//!     gattlink::CharacteristicId(0x10),
//!     gattlink::CharacteristicId(0x11),
//!     gattlink::DescriptorId(0x12),
//!     gattlink::DEFAULT_WRITE_PAYLOAD_SIZE,
//! );
//!
//! let battery = BatteryFeature::new();
//! let command = FeatureCommand::bare(0x02, 0x01);
//! let outcome = correlator
//!     .send_command(&battery, &command, &CommandOptions::default())
//!     .await;
//! # let _ = outcome;
//! # }
//! ```

pub mod audio;
pub mod error;
pub mod feature;
pub mod transport;

mod correlator;
mod link;
mod queue;

pub use correlator::{
    CommandOptions, CommandOutcome, Correlator, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY,
    DEFAULT_RETRY_DELAY, DEFAULT_WRITE_TIMEOUT,
};
pub use error::{GattLinkError, Result};
pub use feature::{
    BatteryFeature, BatteryReading, BatteryStatus, ExtendedFeature, Feature, FeatureCommand,
    FeatureField, FeatureInfo, FeatureResponse, FeatureUpdate,
};
pub use link::{
    CharacteristicId, DescriptorId, Link, LinkConfig, Notification, ServiceInfo,
    DEFAULT_MTU, DEFAULT_WRITE_PAYLOAD_SIZE, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE,
};
pub use queue::{Operation, OperationQueue, QueueConfig, DEFAULT_QUEUE_CAPACITY};
pub use transport::{AudioSplit, JsonSplit, LegacySplit};
