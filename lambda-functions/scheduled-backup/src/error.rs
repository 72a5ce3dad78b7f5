use chrono::{DateTime, SecondsFormat, Utc};

use crate::admin::AdminError;

/// Why an invocation did not enqueue a backup.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup admin client should not be nil")]
    ClientUnavailable,

    #[error("failed to parse data {payload}: {source}")]
    Decode {
        payload: String,
        source: serde_json::Error,
    },

    #[error("failed to parse expire duration {expire}: {source}")]
    Duration {
        expire: String,
        source: humantime::DurationError,
    },

    #[error("expire duration {expire} is out of range")]
    ExpireOutOfRange { expire: String },

    #[error(
        "failed to start backup for database {database} with expire time {time} (backup id {backup_id}): {source}",
        time = format_expire_time(.expire_time)
    )]
    Remote {
        database: String,
        expire_time: DateTime<Utc>,
        backup_id: String,
        source: AdminError,
    },
}

/// RFC 3339 in UTC, whole seconds.
pub fn format_expire_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::error::Error as _;

    #[test]
    fn test_client_unavailable_message() {
        assert_eq!(
            BackupError::ClientUnavailable.to_string(),
            "backup admin client should not be nil"
        );
    }

    #[test]
    fn test_remote_message_embeds_context() {
        let err = BackupError::Remote {
            database: "projects/p/instances/i/databases/d".to_string(),
            expire_time: Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap(),
            backup_id: "schedule-nightly-1736121600".to_string(),
            source: AdminError::Api {
                code: 403,
                status: "PERMISSION_DENIED".to_string(),
                message: "denied".to_string(),
            },
        };

        assert_eq!(
            err.to_string(),
            "failed to start backup for database projects/p/instances/i/databases/d \
             with expire time 2025-01-07T00:00:00Z (backup id schedule-nightly-1736121600): \
             rpc error: code = PERMISSION_DENIED (403) desc = denied"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_format_expire_time_drops_fraction() {
        let time = Utc.timestamp_opt(1736121600, 999_000_000).unwrap();
        assert_eq!(format_expire_time(&time), "2025-01-06T00:00:00Z");
    }
}
