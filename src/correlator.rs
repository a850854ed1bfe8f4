//! Command/response correlation.
//!
//! Writes a framed command through the operation queue, then awaits the
//! response notification on the dedicated response characteristic:
//!
//! 1. Arm response notifications, once per connection (memoized).
//! 2. Pack the command via the feature codec; `None` means unsupported and
//!    the link is never touched.
//! 3. Write through the queue, bounded by `write_timeout`.
//! 4. On write failure, retry up to `retry` times with `retry_delay` between
//!    attempts; exhaustion yields [`CommandOutcome::WriteFailed`].
//! 5. On write success, await a response within `response_timeout`; absence
//!    or a non-decoding notification yields [`CommandOutcome::NoResponse`].
//!
//! By default the correlator also requires the response's command id to
//! match the command just sent, skipping non-matching notifications until
//! the deadline. Disabling [`CommandOptions::match_command_id`] restores the
//! historical first-notification-wins behavior, under which two commands in
//! flight against the same connection can misattribute responses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::feature::{Feature, FeatureCommand, FeatureResponse};
use crate::link::{CharacteristicId, DescriptorId, Link, ENABLE_NOTIFICATION_VALUE};
use crate::queue::OperationQueue;

/// Default bound on one queued write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on the response wait.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default write retry budget.
pub const DEFAULT_RETRY: u32 = 0;

/// Default delay between write retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Per-command tuning knobs.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Bound on each queued write attempt.
    pub write_timeout: Duration,
    /// Bound on the response wait after a successful write.
    pub response_timeout: Duration,
    /// How many times a failed write is retried.
    pub retry: u32,
    /// Pause between write retries.
    pub retry_delay: Duration,
    /// Require the response's command id to match the command sent.
    ///
    /// `false` restores first-notification-wins matching.
    pub match_command_id: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry: DEFAULT_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY,
            match_command_id: true,
        }
    }
}

/// Result of one correlated command.
///
/// Failures are data: an unsupported command, an exhausted write, and an
/// absent response are all ordinary values, distinguishable from each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The feature does not support this command type; the link was never
    /// touched.
    Unsupported,
    /// The write failed after exhausting the retry budget.
    WriteFailed {
        /// Target feature identifier.
        feature_id: u8,
        /// Command that failed.
        command_id: u8,
    },
    /// The write succeeded but no decodable response arrived in time.
    NoResponse,
    /// A correlated, decoded response.
    Response(FeatureResponse),
}

impl CommandOutcome {
    /// The decoded response, if any.
    pub fn response(self) -> Option<FeatureResponse> {
        match self {
            CommandOutcome::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// Correlator over one connection's command/response characteristic pair.
pub struct Correlator<L: Link> {
    link: Arc<L>,
    queue: Arc<OperationQueue<L>>,
    /// Characteristic commands are written to.
    command_characteristic: CharacteristicId,
    /// Characteristic responses are notified on.
    response_characteristic: CharacteristicId,
    /// CCC descriptor of the response characteristic.
    response_cccd: DescriptorId,
    /// Usable payload per write packet (link MTU minus ATT overhead).
    write_payload_size: usize,
    /// Response notifications armed for this connection. Set at most once;
    /// the check-then-set race only risks a harmless redundant enable.
    notifications_enabled: AtomicBool,
}

impl<L: Link> Correlator<L> {
    /// Create a correlator for the given characteristic pair.
    pub fn new(
        link: Arc<L>,
        queue: Arc<OperationQueue<L>>,
        command_characteristic: CharacteristicId,
        response_characteristic: CharacteristicId,
        response_cccd: DescriptorId,
        write_payload_size: usize,
    ) -> Self {
        Self {
            link,
            queue,
            command_characteristic,
            response_characteristic,
            response_cccd,
            write_payload_size,
            notifications_enabled: AtomicBool::new(false),
        }
    }

    /// Send `command` to `feature` and await its correlated response.
    pub async fn send_command<F: Feature>(
        &self,
        feature: &F,
        command: &FeatureCommand,
        options: &CommandOptions,
    ) -> CommandOutcome {
        let Some(packed) = feature.pack_command(feature.info().mask, command) else {
            tracing::debug!(
                feature = feature.info().name,
                command = command.command_id,
                "command unsupported by feature"
            );
            return CommandOutcome::Unsupported;
        };

        self.enable_response_notifications().await;

        // Subscribe before writing so the response cannot slip past.
        let mut notifications = self.link.notifications();

        let packed = Bytes::from(packed);
        let mut attempts_left = options.retry;
        loop {
            let write = self.queue.write_characteristic(
                self.command_characteristic,
                packed.clone(),
                self.write_payload_size,
                options.write_timeout,
            );
            let ok = tokio::time::timeout(options.write_timeout, write)
                .await
                .unwrap_or(false);
            if ok {
                break;
            }
            if attempts_left == 0 {
                tracing::debug!(
                    feature = feature.info().name,
                    command = command.command_id,
                    "write retry budget exhausted"
                );
                return CommandOutcome::WriteFailed {
                    feature_id: command.feature_id,
                    command_id: command.command_id,
                };
            }
            attempts_left -= 1;
            tokio::time::sleep(options.retry_delay).await;
        }

        self.await_response(feature, command, options, &mut notifications)
            .await
    }

    /// Wait for the response notification within `response_timeout`.
    async fn await_response<F: Feature>(
        &self,
        feature: &F,
        command: &FeatureCommand,
        options: &CommandOptions,
        notifications: &mut tokio::sync::broadcast::Receiver<crate::link::Notification>,
    ) -> CommandOutcome {
        let deadline = Instant::now() + options.response_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return CommandOutcome::NoResponse;
            }

            let notification = match tokio::time::timeout(remaining, notifications.recv()).await {
                Ok(Ok(notification)) => notification,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "notification stream lagged during response wait");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return CommandOutcome::NoResponse,
                Err(_) => return CommandOutcome::NoResponse,
            };

            if notification.characteristic != self.response_characteristic {
                continue;
            }

            let decoded = feature.parse_response(&notification.value);
            if options.match_command_id {
                match decoded {
                    Some(response) if response.command_id == command.command_id => {
                        return CommandOutcome::Response(response);
                    }
                    // Wrong command or not ours: keep listening until the
                    // deadline.
                    _ => continue,
                }
            } else {
                // Historical behavior: the first notification on the response
                // characteristic decides the outcome.
                return match decoded {
                    Some(response) => CommandOutcome::Response(response),
                    None => CommandOutcome::NoResponse,
                };
            }
        }
    }

    /// Arm response notifications once per connection.
    ///
    /// Local registration plus the remote CCC descriptor write through the
    /// queue. Never reset implicitly.
    async fn enable_response_notifications(&self) {
        if self.notifications_enabled.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = self
            .link
            .set_notification(self.response_characteristic, true)
            .await
        {
            tracing::warn!(error = %e, "local notification registration failed");
        }
        let armed = self
            .queue
            .write_descriptor(
                self.response_cccd,
                Bytes::copy_from_slice(&ENABLE_NOTIFICATION_VALUE),
            )
            .await;
        if !armed {
            tracing::warn!("response CCC descriptor write failed");
        }

        self.notifications_enabled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CommandOptions::default();
        assert_eq!(options.write_timeout, Duration::from_millis(1000));
        assert_eq!(options.response_timeout, Duration::from_millis(2000));
        assert_eq!(options.retry, 0);
        assert_eq!(options.retry_delay, Duration::from_millis(250));
        assert!(options.match_command_id);
    }

    #[test]
    fn test_outcome_response_accessor() {
        let response = FeatureResponse {
            feature_id: 1,
            command_id: 2,
            payload: Bytes::new(),
        };
        assert_eq!(
            CommandOutcome::Response(response.clone()).response(),
            Some(response)
        );
        assert_eq!(CommandOutcome::NoResponse.response(), None);
        assert_eq!(CommandOutcome::Unsupported.response(), None);
    }
}
