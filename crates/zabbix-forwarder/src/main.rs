// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use zabbix_output::{
    client::ActiveZabbixClient,
    config::ZabbixOutputConfig,
    listener::{ListenerConfig, RecordListener},
    output_service::OutputService,
};

const DEFAULT_FORWARDER_PORT: u16 = 10060;
const FORWARDER_HOST: &str = "0.0.0.0";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("ZABBIX_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let forwarder_host =
        env::var("ZABBIX_FORWARDER_HOST").unwrap_or_else(|_| FORWARDER_HOST.to_string());
    let forwarder_port: u16 = env::var("ZABBIX_FORWARDER_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_FORWARDER_PORT);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ZabbixOutputConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on zabbix forwarder startup: {e}");
            process::exit(1);
        }
    };

    let client = Arc::new(ActiveZabbixClient::new(
        &config.address,
        config.receive_timeout,
        config.send_timeout,
    ));
    info!("Forwarding records to Zabbix server at {}", client.address());

    let (service, handle) = match OutputService::new(config, client) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to create zabbix output service: {e}");
            process::exit(1);
        }
    };
    let service_task = tokio::spawn(service.run());

    let listener_cancel_token = CancellationToken::new();
    let listener_config = ListenerConfig {
        host: forwarder_host,
        port: forwarder_port,
    };
    let listener = match RecordListener::bind(
        &listener_config,
        handle.clone(),
        listener_cancel_token.clone(),
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to start record listener: {e}");
            let _ = handle.shutdown();
            let _ = service_task.await;
            process::exit(1);
        }
    };
    info!(
        "zabbix-udp: starting to listen on {}:{}",
        listener_config.host, listener_config.port
    );
    let listener_task = tokio::spawn(listener.spin());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down zabbix forwarder");

    listener_cancel_token.cancel();
    if let Err(e) = listener_task.await {
        error!("Record listener task failed: {e}");
    }
    match handle.report().await {
        Ok(report) if !report.is_empty() => info!("Known keys at shutdown:\n{report}"),
        Ok(_) => {}
        Err(e) => error!("Failed to get key report: {e}"),
    }
    if let Err(e) = handle.shutdown() {
        error!("Failed to stop zabbix output service: {e}");
    }
    if let Err(e) = service_task.await {
        error!("Zabbix output service task failed: {e}");
    }
}
