// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Zabbix active agent wire protocol.
//!
//! Every message travels as `ZBXD\x01`, an 8 byte little-endian payload
//! length, then the JSON payload itself.

use crate::errors::ClientError;
use crate::filter::HostActiveKeys;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const FRAME_MAGIC: &[u8; 5] = b"ZBXD\x01";
pub const FRAME_HEADER_LEN: usize = FRAME_MAGIC.len() + 8;
/// Largest reply we are willing to buffer from the server
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

pub const AGENT_DATA_HEADER: &[u8] = br#"{"request":"agent data","data":["#;
pub const AGENT_DATA_TRAILER: &[u8] = b"]}";
pub const AGENT_DATA_SEPARATOR: u8 = b',';

/// Wraps a payload in a Zabbix frame.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(FRAME_MAGIC);
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Reads one frame and returns its payload.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ClientError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    if &header[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Err(ClientError::InvalidHeader);
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[FRAME_MAGIC.len()..]);
    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(ClientError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Builds one `agent data` message out of already encoded records.
#[must_use]
pub fn agent_data_message(records: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = records.iter().map(Vec::len).sum();
    let mut message = Vec::with_capacity(
        AGENT_DATA_HEADER.len() + payload_len + records.len() + AGENT_DATA_TRAILER.len(),
    );
    message.extend_from_slice(AGENT_DATA_HEADER);
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            message.push(AGENT_DATA_SEPARATOR);
        }
        message.extend_from_slice(record);
    }
    message.extend_from_slice(AGENT_DATA_TRAILER);
    message
}

#[derive(Debug, Serialize)]
pub struct ActiveChecksRequest<'a> {
    pub request: &'static str,
    pub host: &'a str,
}

impl<'a> ActiveChecksRequest<'a> {
    #[must_use]
    pub fn new(host: &'a str) -> Self {
        Self {
            request: "active checks",
            host,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActiveChecksResponse {
    pub response: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub data: Vec<ActiveCheck>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveCheck {
    pub key: String,
    #[serde(default)]
    pub delay: Option<Delay>,
}

/// Older servers send the interval as a number of seconds, newer ones as a
/// string which may carry a time suffix.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Seconds(u64),
    Text(String),
}

impl Delay {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Delay::Seconds(secs) => Some(Duration::from_secs(*secs)),
            Delay::Text(text) => parse_delay(text),
        }
    }
}

fn parse_delay(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((i, 's')) => (&text[..i], 1),
        Some((i, 'm')) => (&text[..i], 60),
        Some((i, 'h')) => (&text[..i], 3_600),
        Some((i, 'd')) => (&text[..i], 86_400),
        Some((i, 'w')) => (&text[..i], 604_800),
        _ => (text, 1),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .map(Duration::from_secs)
}

impl ActiveChecksResponse {
    /// Converts the reply into the key set used for filtering. Keys whose
    /// interval can't be understood are still allowed, with a zero interval.
    pub fn into_active_keys(self) -> Result<HostActiveKeys, ClientError> {
        if self.response != "success" {
            return Err(ClientError::Rejected(
                self.info.unwrap_or(self.response),
            ));
        }

        Ok(self
            .data
            .into_iter()
            .map(|check| {
                let interval = check
                    .delay
                    .as_ref()
                    .and_then(Delay::as_duration)
                    .unwrap_or_default();
                (check.key, interval)
            })
            .collect())
    }
}
