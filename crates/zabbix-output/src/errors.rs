// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Fatal errors raised while building the output from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid combination of send_key_count and max_key_count: {send_key_count} must be >= 1 and <= {max_key_count}")]
    KeyCounts {
        send_key_count: usize,
        max_key_count: usize,
    },

    #[error("Invalid combination of zabbix_checks_poll_interval and receive_timeout: {poll_interval:?} must be > {receive_timeout:?}")]
    PollInterval {
        poll_interval: Duration,
        receive_timeout: Duration,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("Unknown encoder: {0}")]
    UnknownEncoder(String),
}

/// A record is missing a field it needs or carries it with the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Unable to find field: {0}")]
    MissingField(String),

    #[error("Unable to cast field to string: {0}")]
    NotAString(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures talking to the Zabbix server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("Invalid frame header from server")]
    InvalidHeader,

    #[error("Frame of {0} bytes exceeds the maximum accepted size")]
    FrameTooLarge(u64),

    #[error("Invalid JSON from server: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
