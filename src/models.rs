use serde::{Deserialize, Serialize};
use sqlx::types::{time::OffsetDateTime, uuid::Uuid};
use std::fmt;

use crate::crypto;
use crate::error::RegistrationError;

const MAX_TOKEN_LEN: usize = 255;
const MAX_NOTIFY_TYPE_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub created_at: OffsetDateTime,
    pub notification_settings: Vec<NotificationSetting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationSetting {
    pub id: Uuid,
    pub device_id: Uuid,
    pub name: String,
    pub send: bool,
}

/// A push token as issued by the delivery platform for one app install.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn parse(raw: impl Into<String>) -> Result<Self, RegistrationError> {
        let raw = raw.into();
        let token = raw.trim();
        if token.is_empty() {
            return Err(RegistrationError::InvalidInput(
                "device token must not be empty".to_string(),
            ));
        }
        if token.chars().count() > MAX_TOKEN_LEN {
            return Err(RegistrationError::InvalidInput(format!(
                "device token is longer than {} characters",
                MAX_TOKEN_LEN
            )));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short digest safe to put in logs.
    pub fn fingerprint(&self) -> String {
        crypto::token_fingerprint(&self.0)
    }
}

impl TryFrom<&str> for DeviceToken {
    type Error = RegistrationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for DeviceToken {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<Uuid> for DeviceToken {
    type Error = RegistrationError;

    fn try_from(value: Uuid) -> Result<Self, Self::Error> {
        Ok(Self(value.hyphenated().to_string()))
    }
}

impl AsRef<str> for DeviceToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification categories requested at registration time. Accepts either a
/// single name or a list of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotifyTypes {
    One(String),
    Many(Vec<String>),
}

impl NotifyTypes {
    /// Ordered list of distinct names. Repeats keep their first position and
    /// blank names are dropped, so `""` means no notification types.
    pub fn normalize(&self) -> Result<Vec<String>, RegistrationError> {
        let raw: Vec<&str> = match self {
            NotifyTypes::One(name) => vec![name.as_str()],
            NotifyTypes::Many(names) => names.iter().map(String::as_str).collect(),
        };

        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if name.chars().count() > MAX_NOTIFY_TYPE_LEN {
                return Err(RegistrationError::InvalidInput(format!(
                    "notify type '{}' is longer than {} characters",
                    name, MAX_NOTIFY_TYPE_LEN
                )));
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

impl From<&str> for NotifyTypes {
    fn from(value: &str) -> Self {
        NotifyTypes::One(value.to_string())
    }
}

impl From<String> for NotifyTypes {
    fn from(value: String) -> Self {
        NotifyTypes::One(value)
    }
}

impl From<Vec<String>> for NotifyTypes {
    fn from(value: Vec<String>) -> Self {
        NotifyTypes::Many(value)
    }
}

impl From<&[&str]> for NotifyTypes {
    fn from(value: &[&str]) -> Self {
        NotifyTypes::Many(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Everything the store needs to swap in a freshly registered device.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: Uuid,
    pub token: DeviceToken,
    pub notify_types: Vec<String>,
}

/// Result of a store-side registration: the new device and how many rows
/// holding the same token were removed.
#[derive(Debug, Clone)]
pub struct ReplacedDevice {
    pub device: PushDevice,
    pub superseded: u64,
}
