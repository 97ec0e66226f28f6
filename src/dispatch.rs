//! Notification dispatcher — fans one escalation step out over its channel
//! set. Channels are attempted independently: one channel failing never
//! blocks the others, and total failure never halts the state machine
//! (under-notifying is worse than escalating on schedule).
//!
//! Concrete providers (SMS gateway, push service, telephony, email) live
//! behind `ChannelSender`; this crate only ships test fakes.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::{Channel, DeliveryStatus, RecipientTier, Severity};
use crate::policy::EscalationStep;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{channel} delivery failed: {reason}")]
    SendFailed { channel: &'static str, reason: String },
}

/// What a channel provider needs to deliver one notification.
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub alert_id: Uuid,
    pub result_id: String,
    pub step_index: u32,
    pub recipient_tier: RecipientTier,
    pub severity: Severity,
    pub message: String,
}

/// A single notification channel (SMS gateway, push service, ...).
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Attempt one delivery. The dispatcher handles retries.
    fn send(&self, notice: &AlertNotice) -> Result<(), DispatchError>;
}

/// Per-channel retry policy: exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 250 }
    }
}

/// Delivery outcome for one channel of one step.
#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub detail: Option<String>,
}

pub struct NotificationDispatcher {
    senders: HashMap<Channel, Box<dyn ChannelSender>>,
    retry: RetryConfig,
}

impl NotificationDispatcher {
    pub fn new(senders: Vec<Box<dyn ChannelSender>>, retry: RetryConfig) -> Self {
        let senders = senders.into_iter().map(|s| (s.channel(), s)).collect();
        Self { senders, retry }
    }

    /// Dispatch a notice over every channel of the step.
    ///
    /// Always returns one outcome per channel; the caller records them into
    /// the alert's escalation history and proceeds regardless.
    pub fn dispatch(&self, notice: &AlertNotice, step: &EscalationStep) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(step.channels.len());

        for &channel in &step.channels {
            let outcome = match self.senders.get(&channel) {
                Some(sender) => self.send_with_retry(sender.as_ref(), notice),
                None => {
                    tracing::warn!(
                        alert_id = %notice.alert_id,
                        channel = channel.as_str(),
                        "No sender registered for channel"
                    );
                    ChannelOutcome {
                        channel,
                        status: DeliveryStatus::Failed,
                        attempts: 0,
                        detail: Some("no sender registered".into()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let delivered = outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Delivered)
            .count();
        if delivered == 0 {
            tracing::error!(
                alert_id = %notice.alert_id,
                step = notice.step_index,
                "All channels failed for escalation step; escalation continues on schedule"
            );
        } else {
            tracing::info!(
                alert_id = %notice.alert_id,
                step = notice.step_index,
                delivered,
                total = outcomes.len(),
                "Escalation step dispatched"
            );
        }

        outcomes
    }

    fn send_with_retry(&self, sender: &dyn ChannelSender, notice: &AlertNotice) -> ChannelOutcome {
        let channel = sender.channel();
        let mut last_error = None;

        for attempt in 1..=self.retry.max_attempts {
            match sender.send(notice) {
                Ok(()) => {
                    return ChannelOutcome {
                        channel,
                        status: DeliveryStatus::Delivered,
                        attempts: attempt,
                        detail: None,
                    };
                }
                Err(e) => {
                    tracing::debug!(
                        alert_id = %notice.alert_id,
                        channel = channel.as_str(),
                        attempt,
                        error = %e,
                        "Channel delivery attempt failed"
                    );
                    last_error = Some(e.to_string());
                    if attempt < self.retry.max_attempts {
                        std::thread::sleep(backoff_delay(self.retry.base_delay_ms, attempt));
                    }
                }
            }
        }

        ChannelOutcome {
            channel,
            status: DeliveryStatus::Failed,
            attempts: self.retry.max_attempts,
            detail: last_error,
        }
    }
}

/// Development/default sender: logs the notice instead of delivering it.
///
/// Stands in for a real provider integration so the engine runs end to end
/// without SMS/push/telephony credentials. Production deployments replace
/// these with real `ChannelSender` implementations.
pub struct LogSender {
    channel: Channel,
}

impl LogSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// One log sender per supported channel.
    pub fn all_channels() -> Vec<Box<dyn ChannelSender>> {
        [Channel::Sms, Channel::Push, Channel::Phone, Channel::Email]
            .into_iter()
            .map(|c| Box::new(LogSender::new(c)) as Box<dyn ChannelSender>)
            .collect()
    }
}

impl ChannelSender for LogSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn send(&self, notice: &AlertNotice) -> Result<(), DispatchError> {
        tracing::warn!(
            alert_id = %notice.alert_id,
            channel = self.channel.as_str(),
            tier = notice.recipient_tier.as_str(),
            severity = notice.severity.as_str(),
            message = %notice.message,
            "CRITICAL ALERT notification (log-only sender)"
        );
        Ok(())
    }
}

/// Exponential backoff with up to 50% jitter.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << (attempt - 1).min(8));
    let jitter = if exp > 0 {
        rand::thread_rng().gen_range(0..=exp / 2)
    } else {
        0
    };
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
pub mod testing {
    //! Recording and failing channel fakes shared by engine and scheduler tests.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every notice it delivers.
    pub struct RecordingSender {
        channel: Channel,
        pub sent: Arc<Mutex<Vec<AlertNotice>>>,
    }

    impl RecordingSender {
        pub fn new(channel: Channel) -> (Self, Arc<Mutex<Vec<AlertNotice>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (Self { channel, sent: sent.clone() }, sent)
        }
    }

    impl ChannelSender for RecordingSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn send(&self, notice: &AlertNotice) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    /// Always fails.
    pub struct FailingSender {
        channel: Channel,
    }

    impl FailingSender {
        pub fn new(channel: Channel) -> Self {
            Self { channel }
        }
    }

    impl ChannelSender for FailingSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn send(&self, _notice: &AlertNotice) -> Result<(), DispatchError> {
            Err(DispatchError::SendFailed {
                channel: self.channel.as_str(),
                reason: "provider unavailable".into(),
            })
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    pub struct FlakySender {
        channel: Channel,
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySender {
        pub fn new(channel: Channel, failures: u32) -> Self {
            Self { channel, failures, calls: AtomicU32::new(0) }
        }
    }

    impl ChannelSender for FlakySender {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn send(&self, _notice: &AlertNotice) -> Result<(), DispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DispatchError::SendFailed {
                    channel: self.channel.as_str(),
                    reason: "transient failure".into(),
                })
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn notice() -> AlertNotice {
        AlertNotice {
            alert_id: Uuid::new_v4(),
            result_id: "RES-001".into(),
            step_index: 0,
            recipient_tier: RecipientTier::OrderingPhysician,
            severity: Severity::Severe,
            message: "K 6.8 mmol/L beyond critical bound 6.0".into(),
        }
    }

    fn step(channels: Vec<Channel>) -> EscalationStep {
        EscalationStep {
            wait_minutes: 0,
            recipient_tier: RecipientTier::OrderingPhysician,
            channels,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig { max_attempts: 3, base_delay_ms: 0 }
    }

    #[test]
    fn all_channels_attempted() {
        let (push, push_log) = RecordingSender::new(Channel::Push);
        let (sms, sms_log) = RecordingSender::new(Channel::Sms);
        let dispatcher =
            NotificationDispatcher::new(vec![Box::new(push), Box::new(sms)], fast_retry());

        let outcomes = dispatcher.dispatch(&notice(), &step(vec![Channel::Push, Channel::Sms]));

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == DeliveryStatus::Delivered));
        assert_eq!(push_log.lock().unwrap().len(), 1);
        assert_eq!(sms_log.lock().unwrap().len(), 1);
    }

    #[test]
    fn one_failing_channel_does_not_block_others() {
        let (sms, sms_log) = RecordingSender::new(Channel::Sms);
        let dispatcher = NotificationDispatcher::new(
            vec![Box::new(FailingSender::new(Channel::Push)), Box::new(sms)],
            fast_retry(),
        );

        let outcomes = dispatcher.dispatch(&notice(), &step(vec![Channel::Push, Channel::Sms]));

        assert_eq!(outcomes[0].status, DeliveryStatus::Failed);
        assert_eq!(outcomes[1].status, DeliveryStatus::Delivered);
        assert_eq!(sms_log.lock().unwrap().len(), 1);
    }

    #[test]
    fn transient_failure_is_retried() {
        let dispatcher = NotificationDispatcher::new(
            vec![Box::new(FlakySender::new(Channel::Phone, 2))],
            fast_retry(),
        );

        let outcomes = dispatcher.dispatch(&notice(), &step(vec![Channel::Phone]));

        assert_eq!(outcomes[0].status, DeliveryStatus::Delivered);
        assert_eq!(outcomes[0].attempts, 3);
    }

    #[test]
    fn retries_exhausted_reports_failure_detail() {
        let dispatcher = NotificationDispatcher::new(
            vec![Box::new(FailingSender::new(Channel::Phone))],
            fast_retry(),
        );

        let outcomes = dispatcher.dispatch(&notice(), &step(vec![Channel::Phone]));

        assert_eq!(outcomes[0].status, DeliveryStatus::Failed);
        assert_eq!(outcomes[0].attempts, 3);
        assert!(outcomes[0].detail.as_deref().unwrap().contains("provider unavailable"));
    }

    #[test]
    fn unregistered_channel_fails_without_panicking() {
        let dispatcher = NotificationDispatcher::new(vec![], fast_retry());

        let outcomes = dispatcher.dispatch(&notice(), &step(vec![Channel::Email]));

        assert_eq!(outcomes[0].status, DeliveryStatus::Failed);
        assert_eq!(outcomes[0].attempts, 0);
        assert_eq!(outcomes[0].detail.as_deref(), Some("no sender registered"));
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = backoff_delay(100, 1);
        let third = backoff_delay(100, 3);
        assert!(first >= Duration::from_millis(100));
        assert!(third >= Duration::from_millis(400));
    }
}
