// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::client::ZabbixClient;
use crate::errors::ClientError;
use crate::protocol::agent_data_message;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records left over after a send failed, oldest first, with the failure.
#[derive(Debug, thiserror::Error)]
#[error("Failed to send {} records: {source}", .records.len())]
pub struct Unsent {
    pub records: Vec<Vec<u8>>,
    #[source]
    pub source: ClientError,
}

/// Frames buffered records into `agent data` messages of at most
/// `send_key_count` records and pushes them through the client in order.
#[derive(Clone)]
pub struct BatchSender {
    client: Arc<dyn ZabbixClient>,
    send_key_count: usize,
}

impl BatchSender {
    #[must_use]
    pub fn new(client: Arc<dyn ZabbixClient>, send_key_count: usize) -> Self {
        Self {
            client,
            send_key_count: send_key_count.max(1),
        }
    }

    /// Sends every record. On the first transport error the failing chunk and
    /// everything after it are handed back; chunks sent before it are
    /// considered delivered.
    pub async fn send_records(&self, mut records: Vec<Vec<u8>>) -> Result<(), Unsent> {
        let total = records.len();
        let mut offset = 0;

        while offset < total {
            let end = (offset + self.send_key_count).min(total);
            let message = agent_data_message(&records[offset..end]);

            if let Err(source) = self.client.send_and_forget(&message).await {
                records.drain(..offset);
                return Err(Unsent { records, source });
            }
            offset = end;
        }

        debug!("Sent {total} records");
        Ok(())
    }
}

/// Bounds the buffer after a failed send. When more than `max_key_count`
/// records are left, only the oldest `max_key_count - send_key_count` are
/// kept so the next few records fit without truncating again. Returns how
/// many records were dropped.
pub fn truncate_overflow(
    records: &mut Vec<Vec<u8>>,
    max_key_count: usize,
    send_key_count: usize,
) -> usize {
    if records.len() <= max_key_count {
        return 0;
    }

    let keep = max_key_count.saturating_sub(send_key_count);
    let dropped = records.len() - keep;
    records.truncate(keep);
    warn!("Dropped {dropped} newest metrics from in-memory buffer");
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::MockClient;
    use tracing_test::traced_test;

    fn payloads(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|n| n.as_bytes().to_vec()).collect()
    }

    fn frame(names: &str) -> String {
        format!(r#"{{"request":"agent data","data":[{names}]}}"#)
    }

    #[tokio::test]
    async fn test_send_in_chunks() {
        let client = Arc::new(MockClient::default());
        let sender = BatchSender::new(client.clone(), 2);

        sender
            .send_records(payloads(&["a", "b", "c", "d", "e"]))
            .await
            .expect("send failed");

        assert_eq!(
            client.sent(),
            vec![frame("a,b"), frame("c,d"), frame("e")]
        );
    }

    #[tokio::test]
    async fn test_send_nothing() {
        let client = Arc::new(MockClient::default());
        let sender = BatchSender::new(client.clone(), 2);
        sender.send_records(Vec::new()).await.expect("send failed");
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failure_returns_unsent_suffix() {
        let client = Arc::new(MockClient::default());
        client.fail_after(1);
        let sender = BatchSender::new(client.clone(), 2);

        let unsent = sender
            .send_records(payloads(&["a", "b", "c", "d", "e"]))
            .await
            .expect_err("second chunk should fail");

        assert_eq!(client.sent(), vec![frame("a,b")]);
        assert_eq!(unsent.records, payloads(&["c", "d", "e"]));
        assert!(matches!(unsent.source, ClientError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_failure_on_first_chunk_returns_everything() {
        let client = Arc::new(MockClient::default());
        client.set_failing(true);
        let sender = BatchSender::new(client.clone(), 2);

        let unsent = sender
            .send_records(payloads(&["a", "b", "c"]))
            .await
            .expect_err("send should fail");
        assert_eq!(unsent.records, payloads(&["a", "b", "c"]));
        assert_eq!(unsent.to_string(), "Failed to send 3 records: Timed out while sending");
    }

    #[test]
    #[traced_test]
    fn test_truncate_keeps_oldest() {
        let mut records = payloads(&["1", "2", "3", "4", "5", "6"]);
        let dropped = truncate_overflow(&mut records, 5, 2);

        assert_eq!(dropped, 3);
        assert_eq!(records, payloads(&["1", "2", "3"]));
        assert!(logs_contain("Dropped 3 newest metrics"));
    }

    #[test]
    fn test_truncate_within_bounds_is_noop() {
        let mut records = payloads(&["1", "2", "3", "4", "5"]);
        assert_eq!(truncate_overflow(&mut records, 5, 2), 0);
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn test_truncate_with_equal_counts_empties_buffer() {
        let mut records = payloads(&["1", "2", "3"]);
        assert_eq!(truncate_overflow(&mut records, 2, 2), 3);
        assert!(records.is_empty());
    }
}
