// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP listener turning JSON lines into records for the output service.
//!
//! Each datagram carries one or more newline separated JSON objects, for
//! example `{"host":"web01","key":"cpu.load","value":"0.25"}`. String,
//! integer, float and boolean members become record fields; other members
//! are ignored. Records are stamped with the time they were received.

use std::net::SocketAddr;

use crate::errors::ListenerError;
use crate::output_service::OutputHandle;
use crate::record::{now_nanos, FieldValue, Record};
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

// Large enough for a full UDP datagram
const BUFFER_SIZE: usize = 65_536;

/// Configuration for the record listener
pub struct ListenerConfig {
    /// Host to bind UDP socket to (e.g., "127.0.0.1")
    pub host: String,
    /// Port to bind UDP socket to, 0 picks a free one
    pub port: u16,
}

pub struct RecordListener {
    cancel_token: CancellationToken,
    output_handle: OutputHandle,
    socket: UdpSocket,
}

impl RecordListener {
    pub async fn bind(
        config: &ListenerConfig,
        output_handle: OutputHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ListenerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            cancel_token,
            output_handle,
            socket,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams until cancelled.
    pub async fn spin(self) {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let received = tokio::select! {
                result = self.socket.recv_from(&mut buf) => result,
                _ = self.cancel_token.cancelled() => break,
            };

            match received {
                Ok((amt, src)) => self.consume(&buf[..amt], src),
                Err(e) => error!("Failed to receive datagram: {e}"),
            }
        }
        debug!("Record listener stopped");
    }

    fn consume(&self, datagram: &[u8], src: SocketAddr) {
        let text = match std::str::from_utf8(datagram) {
            Ok(text) => text,
            Err(e) => {
                error!("Discarding non UTF-8 datagram from {src}: {e}");
                return;
            }
        };
        trace!("Received message: {} from {}", text, src);

        let records = parse_records(text, now_nanos());
        if records.is_empty() {
            return;
        }
        debug!("Inserting {} records into output", records.len());
        if let Err(e) = self.output_handle.insert_batch(records) {
            error!("Failed to send records to output: {e}");
        }
    }
}

/// Parses every non-empty line of `text`, skipping the ones that aren't JSON
/// objects.
pub fn parse_records(text: &str, timestamp: i64) -> Vec<Record> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(object) => Some(record_from_object(object, timestamp)),
            Err(e) => {
                error!("Failed to parse record {line}: {e}");
                None
            }
        })
        .collect()
}

fn record_from_object(object: Map<String, Value>, timestamp: i64) -> Record {
    let mut record = Record::new(timestamp);
    for (name, value) in object {
        let field = match value {
            Value::String(s) => FieldValue::String(s),
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => match n.as_f64() {
                    Some(f) => FieldValue::Double(f),
                    None => continue,
                },
            },
            Value::Null | Value::Array(_) | Value::Object(_) => continue,
        };
        record.set_field(&name, field);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_single_record() {
        let records = parse_records(
            r#"{"host":"web01","key":"cpu.load","value":"0.25"}"#,
            42,
        );
        assert_eq!(records, vec![Record::metric("web01", "cpu.load", "0.25", 42)]);
    }

    #[test]
    fn test_parse_multiple_lines() {
        let records = parse_records(
            "{\"host\":\"a\",\"key\":\"k1\",\"value\":\"1\"}\n\n{\"host\":\"b\",\"key\":\"k2\",\"value\":\"2\"}\n",
            0,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].host(), Ok("b"));
    }

    #[test]
    fn test_parse_field_types() {
        let records = parse_records(
            r#"{"host":"a","count":3,"ratio":0.5,"up":true,"tags":["x"],"meta":null}"#,
            0,
        );
        let record = &records[0];
        assert_eq!(record.field("count"), Some(&FieldValue::Integer(3)));
        assert_eq!(record.field("ratio"), Some(&FieldValue::Double(0.5)));
        assert_eq!(record.field("up"), Some(&FieldValue::Bool(true)));
        assert_eq!(record.field("tags"), None);
        assert_eq!(record.field("meta"), None);
    }

    #[test]
    #[traced_test]
    fn test_parse_skips_garbage() {
        let records = parse_records("not json\n[1,2]\n{\"host\":\"a\"}", 0);
        assert_eq!(records.len(), 1);
        assert!(logs_contain("Failed to parse record not json"));
    }
}
