// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Simple mock Zabbix server for testing the output

use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use zabbix_output::protocol::{encode_frame, read_frame};

#[derive(Clone)]
pub struct MockZabbixServer {
    pub addr: SocketAddr,
    /// Keys returned for each host asking for active checks
    active_checks: Arc<Mutex<HashMap<String, Vec<String>>>>,
    /// Payloads of every `agent data` frame received
    received_data: Arc<Mutex<Vec<Value>>>,
}

impl MockZabbixServer {
    /// Start a mock Zabbix server on a random port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let active_checks = Arc::new(Mutex::new(HashMap::<String, Vec<String>>::new()));
        let received_data = Arc::new(Mutex::new(Vec::new()));
        let checks = active_checks.clone();
        let data = received_data.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let checks = checks.clone();
                let data = data.clone();

                tokio::spawn(async move {
                    let Ok(payload) = read_frame(&mut stream).await else {
                        return;
                    };
                    let request: Value =
                        serde_json::from_slice(&payload).expect("Request is not JSON");

                    let kind = request["request"].as_str().map(str::to_string);
                    match kind.as_deref() {
                        Some("active checks") => {
                            let host = request["host"].as_str().unwrap_or_default();
                            let reply = match checks.lock().unwrap().get(host) {
                                Some(keys) => serde_json::json!({
                                    "response": "success",
                                    "data": keys
                                        .iter()
                                        .map(|key| serde_json::json!({"key": key, "delay": 30}))
                                        .collect::<Vec<_>>(),
                                }),
                                None => serde_json::json!({
                                    "response": "failed",
                                    "info": format!("host [{host}] not found"),
                                }),
                            };
                            let frame = encode_frame(reply.to_string().as_bytes());
                            let _ = stream.write_all(&frame).await;
                        }
                        Some("agent data") => data.lock().unwrap().push(request),
                        _ => {}
                    }
                });
            }
        });

        MockZabbixServer {
            addr,
            active_checks,
            received_data,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn set_active_checks(&self, host: &str, keys: &[&str]) {
        self.active_checks.lock().unwrap().insert(
            host.to_string(),
            keys.iter().map(|key| key.to_string()).collect(),
        );
    }

    /// Keys of every record received so far, in arrival order
    pub fn received_keys(&self) -> Vec<String> {
        self.received_data
            .lock()
            .unwrap()
            .iter()
            .flat_map(|frame| frame["data"].as_array().cloned().unwrap_or_default())
            .filter_map(|record| record["Key"].as_str().map(str::to_string))
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.received_data.lock().unwrap().len()
    }

    /// Polls until at least `count` agent data frames arrived
    pub async fn wait_for_frames(&self, count: usize) {
        for _ in 0..200 {
            if self.frame_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {count} frames");
    }
}
