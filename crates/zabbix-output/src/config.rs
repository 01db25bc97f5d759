// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:10051";
pub const DEFAULT_ENCODER: &str = "ZabbixEncoder";

/// Configuration for the Zabbix output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZabbixOutputConfig {
    /// Zabbix server address (e.g., "zabbix.internal:10051")
    pub address: String,
    /// Maximum interval between two sends
    pub ticker_interval: Duration,
    /// Time between each refresh of the active checks used for key filtering.
    /// Zero disables filtering and every record is forwarded.
    pub zabbix_checks_poll_interval: Duration,
    /// Maximum number of records retained while the server isn't accepting data
    pub max_key_count: usize,
    /// This many buffered records trigger a send, and no frame carries more
    pub send_key_count: usize,
    /// Encoder turning records into wire payloads
    pub encoder: String,
    /// Read deadline
    pub receive_timeout: Duration,
    /// Write deadline
    pub send_timeout: Duration,
    /// Hostname seeded into the key filter instead of the system hostname
    pub override_hostname: Option<String>,
    /// Forget keys that haven't been seen for this long. Zero disables tracking.
    pub key_seen_window: Duration,
}

impl Default for ZabbixOutputConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            ticker_interval: Duration::from_secs(15),
            zabbix_checks_poll_interval: Duration::from_secs(300),
            max_key_count: 2000,
            send_key_count: 1000,
            encoder: DEFAULT_ENCODER.to_string(),
            receive_timeout: Duration::from_millis(3000),
            send_timeout: Duration::from_millis(1000),
            override_hostname: None,
            key_seen_window: Duration::ZERO,
        }
    }
}

impl ZabbixOutputConfig {
    /// Create configuration from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            address: env::var("ZABBIX_ADDRESS").unwrap_or(defaults.address),
            ticker_interval: env_secs("ZABBIX_TICKER_INTERVAL")?
                .unwrap_or(defaults.ticker_interval),
            zabbix_checks_poll_interval: env_secs("ZABBIX_CHECKS_POLL_INTERVAL")?
                .unwrap_or(defaults.zabbix_checks_poll_interval),
            max_key_count: env_parse("ZABBIX_MAX_KEY_COUNT")?.unwrap_or(defaults.max_key_count),
            send_key_count: env_parse("ZABBIX_SEND_KEY_COUNT")?
                .unwrap_or(defaults.send_key_count),
            encoder: env::var("ZABBIX_ENCODER").unwrap_or(defaults.encoder),
            receive_timeout: env_millis("ZABBIX_RECEIVE_TIMEOUT")?
                .unwrap_or(defaults.receive_timeout),
            send_timeout: env_millis("ZABBIX_SEND_TIMEOUT")?.unwrap_or(defaults.send_timeout),
            override_hostname: env::var("ZABBIX_OVERRIDE_HOSTNAME")
                .ok()
                .filter(|hostname| !hostname.trim().is_empty()),
            key_seen_window: env_secs("ZABBIX_KEY_SEEN_WINDOW")?
                .unwrap_or(defaults.key_seen_window),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_key_count < 1 || self.send_key_count > self.max_key_count {
            return Err(ConfigError::KeyCounts {
                send_key_count: self.send_key_count,
                max_key_count: self.max_key_count,
            });
        }

        if self.filtering_enabled() && self.zabbix_checks_poll_interval <= self.receive_timeout {
            return Err(ConfigError::PollInterval {
                poll_interval: self.zabbix_checks_poll_interval,
                receive_timeout: self.receive_timeout,
            });
        }

        if self.ticker_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "ticker_interval",
                value: "0".to_string(),
            });
        }

        // Periods are added to the current instant to schedule ticks
        check_period("ticker_interval", self.ticker_interval)?;
        check_period("zabbix_checks_poll_interval", self.zabbix_checks_poll_interval)?;
        check_period("key_seen_window", self.key_seen_window)?;

        Ok(())
    }

    pub fn filtering_enabled(&self) -> bool {
        !self.zabbix_checks_poll_interval.is_zero()
    }

    pub fn key_seen_enabled(&self) -> bool {
        !self.key_seen_window.is_zero()
    }
}

fn check_period(name: &'static str, period: Duration) -> Result<(), ConfigError> {
    if Instant::now().checked_add(period).is_none() {
        return Err(ConfigError::InvalidValue {
            name,
            value: format!("{}s", period.as_secs()),
        });
    }
    Ok(())
}

fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_secs(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

fn env_millis(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}
