// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound metric records.
//!
//! A record is a bag of named, typed fields plus a nanosecond timestamp. The
//! output only relies on a handful of string fields (`host`, `key`, `value`);
//! everything else is carried along untouched.

use crate::errors::RecordError;
use std::time::{SystemTime, UNIX_EPOCH};

pub const HOST_FIELD: &str = "host";
pub const KEY_FIELD: &str = "key";
pub const VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
    /// Nanoseconds since the unix epoch
    pub timestamp: i64,
}

impl Record {
    #[must_use]
    pub fn new(timestamp: i64) -> Self {
        Self {
            fields: Vec::new(),
            timestamp,
        }
    }

    /// Builds a record stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::new(now_nanos())
    }

    /// Convenience constructor for the common host/key/value shape.
    #[must_use]
    pub fn metric(host: &str, key: &str, value: &str, timestamp: i64) -> Self {
        Self::new(timestamp)
            .with_field(HOST_FIELD, FieldValue::String(host.to_string()))
            .with_field(KEY_FIELD, FieldValue::String(key.to_string()))
            .with_field(VALUE_FIELD, FieldValue::String(value.to_string()))
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Looks a field up by exact name first, then ignoring ASCII case, so that
    /// producers may send either `host` or `Host`.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.fields.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, value)| value)
    }

    pub fn str_field(&self, name: &str) -> Result<&str, RecordError> {
        match self.field(name) {
            Some(FieldValue::String(value)) => Ok(value),
            Some(_) => Err(RecordError::NotAString(name.to_string())),
            None => Err(RecordError::MissingField(name.to_string())),
        }
    }

    pub fn host(&self) -> Result<&str, RecordError> {
        self.str_field(HOST_FIELD)
    }

    pub fn key(&self) -> Result<&str, RecordError> {
        self.str_field(KEY_FIELD)
    }
}

pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
