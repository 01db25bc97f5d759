// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ClientError;
use crate::filter::HostActiveKeys;
use crate::protocol::{encode_frame, read_frame, ActiveChecksRequest, ActiveChecksResponse};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

#[async_trait]
pub trait ZabbixClient: Send + Sync {
    /// Sends one message to the server without waiting for, or parsing, a
    /// reply. Only transport failures are reported.
    async fn send_and_forget(&self, message: &[u8]) -> Result<(), ClientError>;

    /// Asks the server which checks it expects `host` to report.
    async fn fetch_active_checks(&self, host: &str) -> Result<HostActiveKeys, ClientError>;
}

/// Talks to a Zabbix server or proxy over TCP, one connection per request.
#[derive(Debug, Clone)]
pub struct ActiveZabbixClient {
    address: String,
    receive_timeout: Duration,
    send_timeout: Duration,
}

impl ActiveZabbixClient {
    #[must_use]
    pub fn new(address: &str, receive_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            receive_timeout,
            send_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        let stream = deadline(
            self.send_timeout,
            "connecting",
            TcpStream::connect(&self.address),
        )
        .await??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn write_frame(&self, stream: &mut TcpStream, message: &[u8]) -> Result<(), ClientError> {
        let frame = encode_frame(message);
        deadline(self.send_timeout, "sending", async {
            stream.write_all(&frame).await?;
            stream.flush().await
        })
        .await??;
        Ok(())
    }
}

async fn deadline<F: Future>(
    limit: Duration,
    action: &'static str,
    future: F,
) -> Result<F::Output, ClientError> {
    timeout(limit, future)
        .await
        .map_err(|_| ClientError::Timeout(action))
}

#[async_trait]
impl ZabbixClient for ActiveZabbixClient {
    async fn send_and_forget(&self, message: &[u8]) -> Result<(), ClientError> {
        let mut stream = self.connect().await?;
        self.write_frame(&mut stream, message).await?;
        trace!("Sent {} bytes to {}", message.len(), self.address);
        // Best effort, the server may already have closed its side
        let _ = stream.shutdown().await;
        Ok(())
    }

    async fn fetch_active_checks(&self, host: &str) -> Result<HostActiveKeys, ClientError> {
        let request = serde_json::to_vec(&ActiveChecksRequest::new(host))?;
        let mut stream = self.connect().await?;
        self.write_frame(&mut stream, &request).await?;

        let payload = deadline(self.receive_timeout, "receiving", read_frame(&mut stream)).await??;
        let response: ActiveChecksResponse = serde_json::from_slice(&payload)?;
        response.into_active_keys()
    }
}
