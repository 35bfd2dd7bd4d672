use sqlx::types::uuid::Uuid;
use tracing::{info, warn};

use crate::db::DeviceStore;
use crate::error::RegistrationError;
use crate::metrics;
use crate::models::{DeviceToken, NewRegistration, NotifyTypes, PushDevice};
use crate::zeropush::PushRegistrar;

/// Registers `token` for `user_id` with the push service and records it
/// locally.
///
/// Input is validated before the push service is contacted, and nothing is
/// written unless the push service accepted the token. Any existing device
/// holding the same token is replaced, whoever owns it, so a token maps to at
/// most one device. The new device starts with exactly the requested
/// notification settings, all enabled.
#[tracing::instrument(name = "register_push_device", skip_all, fields(user_id = %user_id))]
pub async fn register_push_device<S, R, T>(
    store: &S,
    registrar: &R,
    user_id: Uuid,
    token: T,
    notify_types: Option<NotifyTypes>,
) -> Result<PushDevice, RegistrationError>
where
    S: DeviceStore + Sync,
    R: PushRegistrar + Sync,
    T: TryInto<DeviceToken, Error = RegistrationError>,
{
    let timer = metrics::REGISTRATION_TIME.start_timer();
    let result = register(store, registrar, user_id, token, notify_types).await;
    timer.observe_duration();

    match &result {
        Ok(_) => metrics::REGISTRATIONS.inc(),
        Err(e) => {
            metrics::REGISTRATION_FAILURES
                .with_label_values(&[e.kind()])
                .inc();
            warn!(error = %e, "Device registration failed");
        }
    }

    result
}

async fn register<S, R, T>(
    store: &S,
    registrar: &R,
    user_id: Uuid,
    token: T,
    notify_types: Option<NotifyTypes>,
) -> Result<PushDevice, RegistrationError>
where
    S: DeviceStore + Sync,
    R: PushRegistrar + Sync,
    T: TryInto<DeviceToken, Error = RegistrationError>,
{
    let token: DeviceToken = token.try_into()?;
    let notify_types = match notify_types {
        Some(types) => types.normalize()?,
        None => Vec::new(),
    };

    if !store.user_exists(user_id).await? {
        return Err(RegistrationError::InvalidInput(format!(
            "unknown user {}",
            user_id
        )));
    }

    registrar.submit_registration(&token).await?;

    let replaced = store
        .replace_device(&NewRegistration {
            user_id,
            token: token.clone(),
            notify_types,
        })
        .await?;

    if replaced.superseded > 0 {
        metrics::SUPERSEDED_DEVICES.inc_by(replaced.superseded as f64);
        info!(
            token = %token.fingerprint(),
            superseded = replaced.superseded,
            "Removed devices previously holding this token"
        );
    }

    info!(
        device_id = %replaced.device.id,
        token = %token.fingerprint(),
        settings = replaced.device.notification_settings.len(),
        "Device registered"
    );

    Ok(replaced.device)
}
