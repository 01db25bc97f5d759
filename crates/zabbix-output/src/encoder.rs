// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::{ConfigError, EncodeError};
use crate::record::{Record, HOST_FIELD, KEY_FIELD, VALUE_FIELD};
use serde::Serialize;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Turns one admitted record into the bytes placed in an `agent data` frame.
pub trait Encoder: Send + Sync {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError>;
}

/// Returns the encoder registered under `name`.
pub fn for_name(name: &str) -> Result<Box<dyn Encoder>, ConfigError> {
    match name {
        "ZabbixEncoder" | "OpenTsdbToZabbixEncoder" => Ok(Box::new(ZabbixEncoder)),
        other => Err(ConfigError::UnknownEncoder(other.to_string())),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ZabbixMetric<'a> {
    host: &'a str,
    key: &'a str,
    value: &'a str,
    clock: String,
}

/// Encodes records as the JSON objects Zabbix expects in agent data:
/// `{"Host":…,"Key":…,"Value":…,"Clock":"<unix seconds>"}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZabbixEncoder;

impl Encoder for ZabbixEncoder {
    fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let metric = ZabbixMetric {
            key: record.str_field(KEY_FIELD)?,
            host: record.str_field(HOST_FIELD)?,
            value: record.str_field(VALUE_FIELD)?,
            clock: record.timestamp.div_euclid(NANOS_PER_SECOND).to_string(),
        };
        Ok(serde_json::to_vec(&metric)?)
    }
}
