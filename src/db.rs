use anyhow::Result;
use sqlx::{
    postgres::PgPoolOptions,
    types::{time::OffsetDateTime, uuid::Uuid},
    Pool, Postgres,
};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{
    DeviceToken, NewRegistration, NotificationSetting, PushDevice, ReplacedDevice,
};

pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>> {
    info!("Initializing database connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Persistence for push devices and their notification settings.
#[trait_variant::make(DeviceStore: Send)]
pub trait LocalDeviceStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Removes every device holding `registration.token`, then inserts the new
    /// device and its settings. All or nothing. Settings come back ordered by
    /// name, as on every read path.
    async fn replace_device(
        &self,
        registration: &NewRegistration,
    ) -> Result<ReplacedDevice, sqlx::Error>;

    async fn devices_by_token(&self, token: &DeviceToken) -> Result<Vec<PushDevice>, sqlx::Error>;

    async fn devices_for_user(&self, user_id: Uuid) -> Result<Vec<PushDevice>, sqlx::Error>;

    async fn set_notification_send(
        &self,
        device_id: Uuid,
        name: &str,
        send: bool,
    ) -> Result<Option<NotificationSetting>, sqlx::Error>;
}

#[derive(sqlx::FromRow)]
struct PushDeviceRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    created_at: OffsetDateTime,
}

impl PushDeviceRow {
    fn into_device(self, notification_settings: Vec<NotificationSetting>) -> PushDevice {
        PushDevice {
            id: self.id,
            user_id: self.user_id,
            token: self.token,
            created_at: self.created_at,
            notification_settings,
        }
    }
}

#[derive(Clone)]
pub struct PgDeviceStore {
    pool: Pool<Postgres>,
}

impl PgDeviceStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn with_settings(
        &self,
        rows: Vec<PushDeviceRow>,
    ) -> Result<Vec<PushDevice>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let settings: Vec<NotificationSetting> = sqlx::query_as(
            r#"
            SELECT id, device_id, name, send
            FROM notification_settings
            WHERE device_id = ANY($1)
            ORDER BY name COLLATE "C"
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut by_device: HashMap<Uuid, Vec<NotificationSetting>> = HashMap::new();
        for setting in settings {
            by_device.entry(setting.device_id).or_default().push(setting);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let settings = by_device.remove(&row.id).unwrap_or_default();
                row.into_device(settings)
            })
            .collect())
    }
}

impl DeviceStore for PgDeviceStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn replace_device(
        &self,
        registration: &NewRegistration,
    ) -> Result<ReplacedDevice, sqlx::Error> {
        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query("DELETE FROM push_devices WHERE token = $1")
            .bind(registration.token.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // A registration racing on the same token may have inserted after our
        // delete; take its row over instead of failing on the unique index
        let row: PushDeviceRow = sqlx::query_as(
            r#"
            INSERT INTO push_devices (id, user_id, token)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE
            SET user_id = EXCLUDED.user_id, created_at = EXCLUDED.created_at
            RETURNING id, user_id, token, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(registration.user_id)
        .bind(registration.token.as_str())
        .fetch_one(&mut *tx)
        .await?;

        // Only non-empty when the row above was taken over
        sqlx::query("DELETE FROM notification_settings WHERE device_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        let mut settings = Vec::with_capacity(registration.notify_types.len());
        for name in &registration.notify_types {
            let setting: Option<NotificationSetting> = sqlx::query_as(
                r#"
                INSERT INTO notification_settings (id, device_id, name, send)
                VALUES ($1, $2, $3, TRUE)
                ON CONFLICT (device_id, name) DO NOTHING
                RETURNING id, device_id, name, send
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(row.id)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

            settings.extend(setting);
        }
        settings.sort_by(|a, b| a.name.cmp(&b.name));

        tx.commit().await?;

        debug!(
            device_id = %row.id,
            superseded,
            settings = settings.len(),
            "Stored device registration"
        );

        Ok(ReplacedDevice {
            device: row.into_device(settings),
            superseded,
        })
    }

    async fn devices_by_token(&self, token: &DeviceToken) -> Result<Vec<PushDevice>, sqlx::Error> {
        let rows: Vec<PushDeviceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, token, created_at
            FROM push_devices
            WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.with_settings(rows).await
    }

    async fn devices_for_user(&self, user_id: Uuid) -> Result<Vec<PushDevice>, sqlx::Error> {
        let rows: Vec<PushDeviceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, token, created_at
            FROM push_devices
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_settings(rows).await
    }

    async fn set_notification_send(
        &self,
        device_id: Uuid,
        name: &str,
        send: bool,
    ) -> Result<Option<NotificationSetting>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE notification_settings
            SET send = $1
            WHERE device_id = $2 AND name = $3
            RETURNING id, device_id, name, send
            "#,
        )
        .bind(send)
        .bind(device_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }
}
