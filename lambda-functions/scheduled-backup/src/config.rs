use std::path::PathBuf;

use bon::Builder;

pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// How requests to the admin endpoint are authorized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Access token from the instance metadata server, fetched per request.
    #[default]
    Metadata,
    /// Fixed bearer token.
    Static(String),
    /// Service account key file, as named by `GOOGLE_APPLICATION_CREDENTIALS`.
    ServiceAccount(PathBuf),
    /// No authorization header, as used against the emulator.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct AdminConfig {
    #[builder(into, default = DEFAULT_ENDPOINT.to_string())]
    pub endpoint: String,
    #[builder(default)]
    pub credentials: Credentials,
    #[builder(into, default = DEFAULT_METADATA_HOST.to_string())]
    pub metadata_host: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let metadata_host =
            lookup("GCE_METADATA_HOST").unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());

        if let Some(host) = lookup("SPANNER_EMULATOR_HOST").filter(|h| !h.is_empty()) {
            return Self {
                endpoint: format!("http://{}", host),
                credentials: Credentials::None,
                metadata_host,
            };
        }

        let endpoint = lookup("SPANNER_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let key_file = lookup("GOOGLE_APPLICATION_CREDENTIALS").filter(|p| !p.is_empty());
        let credentials = match lookup("GOOGLE_OAUTH_ACCESS_TOKEN") {
            Some(token) if !token.is_empty() => Credentials::Static(token),
            _ => match key_file {
                Some(path) => Credentials::ServiceAccount(PathBuf::from(path)),
                None => Credentials::Metadata,
            },
        };

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            metadata_host,
        }
    }
}
