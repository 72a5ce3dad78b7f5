use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::AUTHORIZATION;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AdminConfig, Credentials};

const SPANNER_ADMIN_SCOPE: &str = "https://www.googleapis.com/auth/spanner.admin";

/// Handle to the long-running backup operation started on the remote service.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BackupOperation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(
        "database name {0:?} should conform to pattern projects/<project>/instances/<instance>/databases/<database>"
    )]
    InvalidDatabase(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error: code = {status} ({code}) desc = {message}")]
    Api {
        code: u16,
        status: String,
        message: String,
    },

    #[error("failed to obtain access token: {0}")]
    Credentials(String),
}

/// The one capability the handler needs from the database admin service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackupAdmin: Send + Sync {
    async fn start_backup_operation(
        &self,
        backup_id: &str,
        database: &str,
        expire_time: DateTime<Utc>,
    ) -> Result<BackupOperation, AdminError>;
}

/// Returns the `projects/<p>/instances/<i>` part of a fully-qualified database name.
pub fn instance_parent(database: &str) -> Result<&str, AdminError> {
    let parts: Vec<&str> = database.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "instances", instance, "databases", name]
            if !project.is_empty() && !instance.is_empty() && !name.is_empty() =>
        {
            let end = database.len() - "/databases/".len() - name.len();
            Ok(&database[..end])
        }
        _ => Err(AdminError::InvalidDatabase(database.to_string())),
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateBackupBody<'a> {
    database: &'a str,
    expire_time: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

fn api_error(http_status: u16, body: &str) -> AdminError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => AdminError::Api {
            code: if error.code == 0 { http_status } else { error.code },
            status: error.status,
            message: error.message,
        },
        Err(_) => AdminError::Api {
            code: http_status,
            status: "UNKNOWN".to_string(),
            message: body.trim().to_string(),
        },
    }
}

/// Database admin client speaking the Spanner REST API.
pub struct SpannerAdminClient {
    http: HttpClient,
    config: AdminConfig,
    service_account: Option<CustomServiceAccount>,
}

impl SpannerAdminClient {
    pub async fn connect(config: AdminConfig) -> Result<Self, AdminError> {
        let http = HttpClient::builder()
            .user_agent(concat!("scheduled-backup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let service_account = match &config.credentials {
            Credentials::ServiceAccount(path) => {
                Some(CustomServiceAccount::from_file(path).map_err(|e| {
                    AdminError::Credentials(format!(
                        "service account key {}: {e}",
                        path.display()
                    ))
                })?)
            }
            _ => None,
        };

        let client = Self {
            http,
            config,
            service_account,
        };

        // Fail at start-up rather than on the first event when no identity is attached.
        if matches!(
            client.config.credentials,
            Credentials::Metadata | Credentials::ServiceAccount(_)
        ) {
            client.access_token().await?;
        }

        info!("Backup admin client ready for {}", client.config.endpoint);
        Ok(client)
    }

    async fn access_token(&self) -> Result<Option<String>, AdminError> {
        match &self.config.credentials {
            Credentials::None => Ok(None),
            Credentials::Static(token) => Ok(Some(token.clone())),
            Credentials::ServiceAccount(path) => {
                let account = self.service_account.as_ref().ok_or_else(|| {
                    AdminError::Credentials(format!(
                        "service account key {} not loaded",
                        path.display()
                    ))
                })?;
                let token = account
                    .token(&[SPANNER_ADMIN_SCOPE])
                    .await
                    .map_err(|e| AdminError::Credentials(format!("service account token: {e}")))?;
                Ok(Some(token.as_str().to_string()))
            }
            Credentials::Metadata => {
                let url = format!(
                    "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
                    self.config.metadata_host
                );
                let resp = self
                    .http
                    .get(&url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| AdminError::Credentials(format!("metadata server: {e}")))?;

                if !resp.status().is_success() {
                    return Err(AdminError::Credentials(format!(
                        "metadata server returned {}",
                        resp.status()
                    )));
                }

                let token: MetadataToken = resp
                    .json()
                    .await
                    .map_err(|e| AdminError::Credentials(format!("metadata token json: {e}")))?;
                Ok(Some(token.access_token))
            }
        }
    }
}

#[async_trait]
impl BackupAdmin for SpannerAdminClient {
    async fn start_backup_operation(
        &self,
        backup_id: &str,
        database: &str,
        expire_time: DateTime<Utc>,
    ) -> Result<BackupOperation, AdminError> {
        let parent = instance_parent(database)?;
        let url = format!(
            "{}/v1/{}/backups",
            self.config.endpoint.trim_end_matches('/'),
            parent
        );
        let body = CreateBackupBody {
            database,
            expire_time: expire_time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };

        let mut request = self
            .http
            .post(&url)
            .query(&[("backupId", backup_id)])
            .json(&body);
        if let Some(token) = self.access_token().await? {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        debug!("POST {} backupId={}", url, backup_id);
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(api_error(status.as_u16(), &text));
        }

        Ok(resp.json::<BackupOperation>().await?)
    }
}
