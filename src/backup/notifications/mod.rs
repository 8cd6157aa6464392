use crate::backup::notifications::pushover::PushoverConfig;
use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::result_error::result::Result;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::result;
use validator::{Validate, ValidationErrors};

pub mod pushover;
pub mod smtp;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    Urgent,
}

/// Where run events end up. Implementations must be shareable with the
/// worker threads, every finished job notifies from its own worker.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, priority: Priority) -> Result<()>;
}

#[derive(Clone, From, Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum NotificationConfig {
    Smtp(SmtpNotificationConfig),
    Pushover(PushoverConfig),
}

impl Validate for NotificationConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Self::Smtp(inner) => inner.validate(),
            Self::Pushover(inner) => inner.validate(),
        }
    }
}

impl Notifier for NotificationConfig {
    fn notify(&self, message: &str, priority: Priority) -> Result<()> {
        match self {
            Self::Smtp(inner) => inner.notify(message, priority),
            Self::Pushover(inner) => inner.notify(message, priority),
        }
    }
}

/// Used when no notification service is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, priority: Priority) -> Result<()> {
        match priority {
            Priority::Urgent => tracing::warn!("[notify {priority}] {message}"),
            _ => tracing::debug!("[notify {priority}] {message}"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(String, Priority)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<(String, Priority)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, priority: Priority) -> Result<()> {
        self.sent.lock().unwrap().push((message.to_string(), priority));
        Ok(())
    }
}
