//! Pushover push notifications.
//!
//! Urgent messages are sent with Pushover's emergency priority, which makes
//! the Pushover service re-alert every `retry` until acknowledged or until
//! `expire` has passed.

use crate::backup::function_path;
use crate::backup::notifications::{Notifier, Priority};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

static PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
/// Pushover rejects emergency retries below 30 seconds.
static MIN_RETRY: Duration = Duration::from_secs(30);
/// Pushover caps emergency expiry at 3 hours.
static MAX_EXPIRE: Duration = Duration::from_secs(3 * 60 * 60);

fn default_api_url() -> String {
    PUSHOVER_API_URL.to_string()
}

fn default_retry() -> Duration {
    MIN_RETRY
}

fn default_expire() -> Duration {
    Duration::from_secs(6 * 60)
}

fn validate_retry(retry: &Duration) -> std::result::Result<(), ValidationError> {
    if *retry < MIN_RETRY {
        return Err(ValidationError::new("InvalidRetry")
            .with_message(format!("retry must be at least {:?}", MIN_RETRY).into()));
    }
    Ok(())
}

fn validate_expire(expire: &Duration) -> std::result::Result<(), ValidationError> {
    if *expire > MAX_EXPIRE || expire.is_zero() {
        return Err(ValidationError::new("InvalidExpire")
            .with_message(format!("expire must be within (0, {:?}]", MAX_EXPIRE).into()));
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct PushoverConfig {
    #[validate(nested)]
    #[builder(into)]
    token: RedactedString,
    #[validate(nested)]
    #[builder(into)]
    user: RedactedString,
    #[builder(into)]
    title: Option<String>,
    #[serde(default = "default_retry", with = "humantime_serde")]
    #[validate(custom(function = validate_retry))]
    #[builder(default = default_retry())]
    retry: Duration,
    #[serde(default = "default_expire", with = "humantime_serde")]
    #[validate(custom(function = validate_expire))]
    #[builder(default = default_expire())]
    expire: Duration,
    #[serde(default = "default_api_url")]
    #[builder(default = default_api_url(), into)]
    api_url: String,
}

impl PushoverConfig {
    fn form(&self, message: &str, priority: Priority) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("token", self.token.inner().to_string()),
            ("user", self.user.inner().to_string()),
            ("message", message.to_string()),
        ];
        if let Some(title) = &self.title {
            form.push(("title", title.clone()));
        }
        match priority {
            Priority::Low => form.push(("priority", "-1".to_string())),
            Priority::Normal => form.push(("priority", "0".to_string())),
            Priority::Urgent => {
                form.push(("priority", "2".to_string()));
                form.push(("retry", self.retry.as_secs().to_string()));
                form.push(("expire", self.expire.as_secs().to_string()));
            }
        }
        form
    }
}

impl Notifier for PushoverConfig {
    #[named]
    fn notify(&self, message: &str, priority: Priority) -> Result<()> {
        tracing::debug!("Sending pushover notification with priority {priority}");
        reqwest::blocking::Client::new()
            .post(self.api_url.as_str())
            .form(&self.form(message, priority))
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map(|_| ())
            .map_err(Error::from)
            .add_msg(format!("Pushover notification to {:?} failed", self.api_url))
            .add_fn_name(function_path!())
    }
}
