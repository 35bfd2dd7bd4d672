//! In-memory collaborators for exercising registration without Postgres or
//! the network.

use sqlx::types::{time::OffsetDateTime, uuid::Uuid};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::db::DeviceStore;
use crate::error::PushServiceError;
use crate::models::{DeviceToken, NewRegistration, NotificationSetting, PushDevice, ReplacedDevice};
use crate::zeropush::PushRegistrar;

#[derive(Default)]
struct Inner {
    users: HashSet<Uuid>,
    devices: Vec<PushDevice>,
    fail_writes: bool,
}

#[derive(Default)]
pub struct MemoryDeviceStore {
    inner: Mutex<Inner>,
}

impl MemoryDeviceStore {
    pub async fn add_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().await.users.insert(id);
        id
    }

    pub async fn fail_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }

    pub async fn device_count(&self) -> usize {
        self.inner.lock().await.devices.len()
    }

    pub async fn setting_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .devices
            .iter()
            .map(|d| d.notification_settings.len())
            .sum()
    }
}

impl DeviceStore for MemoryDeviceStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.inner.lock().await.users.contains(&user_id))
    }

    async fn replace_device(
        &self,
        registration: &NewRegistration,
    ) -> Result<ReplacedDevice, sqlx::Error> {
        let mut inner = self.inner.lock().await;

        // Work on a copy and only swap it in at the end, like a transaction
        let token = registration.token.as_str();
        let mut staged = inner.devices.clone();
        let before = staged.len();
        staged.retain(|d| d.token != token);
        let superseded = (before - staged.len()) as u64;

        let device_id = Uuid::new_v4();
        let mut settings: Vec<NotificationSetting> = Vec::new();
        for name in &registration.notify_types {
            if settings.iter().any(|s| &s.name == name) {
                continue;
            }
            settings.push(NotificationSetting {
                id: Uuid::new_v4(),
                device_id,
                name: name.clone(),
                send: true,
            });
        }
        settings.sort_by(|a, b| a.name.cmp(&b.name));

        let device = PushDevice {
            id: device_id,
            user_id: registration.user_id,
            token: token.to_string(),
            created_at: OffsetDateTime::now_utc(),
            notification_settings: settings,
        };
        staged.push(device.clone());

        if inner.fail_writes {
            return Err(sqlx::Error::Protocol("injected write failure".to_string()));
        }
        inner.devices = staged;

        Ok(ReplacedDevice { device, superseded })
    }

    async fn devices_by_token(&self, token: &DeviceToken) -> Result<Vec<PushDevice>, sqlx::Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .devices
            .iter()
            .filter(|d| d.token == token.as_str())
            .cloned()
            .collect())
    }

    async fn devices_for_user(&self, user_id: Uuid) -> Result<Vec<PushDevice>, sqlx::Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .devices
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_notification_send(
        &self,
        device_id: Uuid,
        name: &str,
        send: bool,
    ) -> Result<Option<NotificationSetting>, sqlx::Error> {
        let mut inner = self.inner.lock().await;
        let setting = inner
            .devices
            .iter_mut()
            .filter(|d| d.id == device_id)
            .flat_map(|d| d.notification_settings.iter_mut())
            .find(|s| s.name == name);

        Ok(setting.map(|s| {
            s.send = send;
            s.clone()
        }))
    }
}

/// Push registrar that either accepts every token or rejects with a fixed status.
pub struct StubRegistrar {
    calls: AtomicUsize,
    reject_status: Option<u16>,
}

impl StubRegistrar {
    pub fn accepting() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject_status: None,
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject_status: Some(status),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PushRegistrar for StubRegistrar {
    async fn submit_registration(&self, _token: &DeviceToken) -> Result<(), PushServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reject_status {
            Some(status) => Err(PushServiceError::Rejected {
                status,
                body: r#"{"error":"invalid device token"}"#.to_string(),
            }),
            None => Ok(()),
        }
    }
}
