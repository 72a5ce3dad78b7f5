pub mod admin;
pub mod config;
pub mod error;
pub mod event;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info};

pub use admin::{BackupAdmin, BackupOperation, SpannerAdminClient};
pub use config::{AdminConfig, Credentials};
pub use error::{format_expire_time, BackupError};
pub use event::{BackupRequest, PubSubMessage};

// Backup ids are unique per prefix only at one-second granularity.
pub fn generate_backup_id(prefix: &str, timestamp: i64) -> String {
    format!("schedule-{}-{}", prefix, timestamp)
}

pub fn parse_request(data: &[u8]) -> Result<BackupRequest, BackupError> {
    serde_json::from_slice(data).map_err(|source| BackupError::Decode {
        payload: String::from_utf8_lossy(data).into_owned(),
        source,
    })
}

pub fn parse_expire(expire: &str) -> Result<Duration, BackupError> {
    humantime::parse_duration(expire).map_err(|source| BackupError::Duration {
        expire: expire.to_string(),
        source,
    })
}

/// Everything needed for the single start-backup call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupPlan {
    pub backup_id: String,
    pub database: String,
    pub expire_time: DateTime<Utc>,
}

impl BackupPlan {
    pub fn new(request: BackupRequest, now: DateTime<Utc>) -> Result<Self, BackupError> {
        let ttl = parse_expire(&request.expire)?;
        let expire_time = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| BackupError::ExpireOutOfRange {
                expire: request.expire.clone(),
            })?;

        Ok(Self {
            backup_id: generate_backup_id(&request.backup_id_prefix, now.timestamp()),
            database: request.database,
            expire_time,
        })
    }

    pub fn from_payload(data: &[u8], now: DateTime<Utc>) -> Result<Self, BackupError> {
        Self::new(parse_request(data)?, now)
    }
}

/// Turns scheduler events into backup requests against a shared admin client.
///
/// The client is built once at start-up. A handler whose client could not be
/// built stays usable but rejects every event with
/// [`BackupError::ClientUnavailable`].
#[derive(Clone)]
pub struct BackupHandler {
    client: Option<Arc<dyn BackupAdmin>>,
}

impl BackupHandler {
    pub fn new(client: Arc<dyn BackupAdmin>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn unavailable() -> Self {
        Self { client: None }
    }

    pub async fn connect(config: AdminConfig) -> Self {
        match SpannerAdminClient::connect(config).await {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                error!("Failed to create backup admin client: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub async fn handle(&self, message: &PubSubMessage) -> Result<(), BackupError> {
        self.handle_at(message, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        message: &PubSubMessage,
        now: DateTime<Utc>,
    ) -> Result<(), BackupError> {
        let Some(client) = self.client.as_ref() else {
            let err = BackupError::ClientUnavailable;
            error!("{}", err);
            return Err(err);
        };

        let plan =
            BackupPlan::from_payload(&message.data, now).inspect_err(|e| error!("{}", e))?;

        match client
            .start_backup_operation(&plan.backup_id, &plan.database, plan.expire_time)
            .await
        {
            Ok(operation) => {
                info!(
                    operation = %operation.name,
                    "Backup {} of database {} with expire time {} is being created",
                    plan.backup_id,
                    plan.database,
                    format_expire_time(&plan.expire_time)
                );
                Ok(())
            }
            Err(source) => {
                let err = BackupError::Remote {
                    database: plan.database,
                    expire_time: plan.expire_time,
                    backup_id: plan.backup_id,
                    source,
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}
