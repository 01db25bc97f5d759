// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The output service owns the send buffer and is the only task touching it.
//!
//! Producers and report callers talk to it through a cloneable
//! [`OutputHandle`]. Two optional background tasks run next to it: one
//! refreshes the active checks used by the key filter, the other forgets keys
//! that stopped reporting. They only share the filter and seen maps with the
//! service, each behind its own lock.
//!
//! Sends happen inline: while the server is slow the service doesn't accept
//! records, tick or answer reports.

use crate::client::ZabbixClient;
use crate::config::ZabbixOutputConfig;
use crate::encoder::{self, Encoder};
use crate::errors::{ConfigError, RecordError};
use crate::filter::KeyFilter;
use crate::hostname::resolve_hostname;
use crate::record::Record;
use crate::report::{Report, ReportMsg};
use crate::seen::KeySeen;
use crate::sender::{truncate_overflow, BatchSender, Unsent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum OutputCommand {
    Insert(Record),
    InsertBatch(Vec<Record>),
    /// The service sends one message per report field, then drops the sender.
    Report(mpsc::UnboundedSender<ReportMsg>),
    Shutdown,
}

#[derive(Clone)]
pub struct OutputHandle {
    tx: mpsc::UnboundedSender<OutputCommand>,
}

impl OutputHandle {
    pub fn insert(&self, record: Record) -> Result<(), mpsc::error::SendError<OutputCommand>> {
        self.tx.send(OutputCommand::Insert(record))
    }

    pub fn insert_batch(
        &self,
        records: Vec<Record>,
    ) -> Result<(), mpsc::error::SendError<OutputCommand>> {
        self.tx.send(OutputCommand::InsertBatch(records))
    }

    /// Snapshot of the active checks and seen keys, taken by the service
    /// between two records.
    pub async fn report(&self) -> Result<Report, String> {
        let (response_tx, mut response_rx) = mpsc::unbounded_channel();
        self.tx
            .send(OutputCommand::Report(response_tx))
            .map_err(|e| format!("Failed to send report command: {}", e))?;

        let mut report = Report::default();
        while let Some(msg) = response_rx.recv().await {
            report.add(msg);
        }
        Ok(report)
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<OutputCommand>> {
        self.tx.send(OutputCommand::Shutdown)
    }
}

pub struct OutputService {
    config: ZabbixOutputConfig,
    filter: Arc<KeyFilter>,
    seen: Arc<KeySeen>,
    client: Arc<dyn ZabbixClient>,
    sender: BatchSender,
    encoder: Box<dyn Encoder>,
    buffer: Vec<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<OutputCommand>,
}

impl OutputService {
    pub fn new(
        config: ZabbixOutputConfig,
        client: Arc<dyn ZabbixClient>,
    ) -> Result<(Self, OutputHandle), ConfigError> {
        config.validate()?;
        let encoder = encoder::for_name(&config.encoder)?;

        let hostname = resolve_hostname(config.override_hostname.as_deref());
        let filter = Arc::new(KeyFilter::new(config.filtering_enabled(), &hostname));
        let sender = BatchSender::new(Arc::clone(&client), config.send_key_count);
        let buffer = Vec::with_capacity(config.max_key_count);

        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            config,
            filter,
            seen: Arc::new(KeySeen::new()),
            client,
            sender,
            encoder,
            buffer,
            rx,
        };

        Ok((service, OutputHandle { tx }))
    }

    /// Runs until shut down through a handle or until every handle is
    /// dropped. Buffered records get one last send attempt, then the
    /// background tasks are stopped and awaited.
    pub async fn run(mut self) {
        debug!("Zabbix output service started");

        let cancel_token = CancellationToken::new();
        let background_tasks = self.spawn_background_tasks(&cancel_token);

        let period = self.config.ticker_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(OutputCommand::Insert(record)) => self.handle_record(record).await,
                    Some(OutputCommand::InsertBatch(records)) => {
                        for record in records {
                            self.handle_record(record).await;
                        }
                    }
                    Some(OutputCommand::Report(response_tx)) => self.report(response_tx),
                    Some(OutputCommand::Shutdown) | None => break,
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }

        debug!("Zabbix output service draining");
        self.rx.close();
        self.drain().await;

        cancel_token.cancel();
        for task in background_tasks {
            if let Err(e) = task.await {
                error!("Background task failed: {e}");
            }
        }

        debug!("Zabbix output service stopped");
    }

    fn spawn_background_tasks(&self, cancel_token: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if self.config.filtering_enabled() {
            tasks.push(tokio::spawn(refresh_active_checks(
                Arc::clone(&self.filter),
                Arc::clone(&self.client),
                self.config.zabbix_checks_poll_interval,
                cancel_token.clone(),
            )));
        }

        if self.config.key_seen_enabled() {
            tasks.push(tokio::spawn(sweep_seen_keys(
                Arc::clone(&self.seen),
                self.config.key_seen_window,
                cancel_token.clone(),
            )));
        }

        tasks
    }

    async fn handle_record(&mut self, record: Record) {
        if self.filter.is_enabled() {
            match self.admit(&record) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    error!("Dropping malformed record: {e}");
                    return;
                }
            }
        }

        match self.encoder.encode(&record) {
            Ok(payload) => self.buffer.push(payload),
            Err(e) => {
                error!("Encoder failure: {e}");
                return;
            }
        }

        if self.buffer.len() >= self.config.send_key_count {
            self.flush().await;
        }
    }

    /// Records the key as seen, whatever the filter decides, then asks the
    /// filter.
    fn admit(&self, record: &Record) -> Result<bool, RecordError> {
        let key = record.key()?;
        let host = record.host()?;

        if self.config.key_seen_enabled() {
            self.seen.touch(host, key, std::time::Instant::now());
        }

        Ok(self.filter.admit(host, key))
    }

    async fn flush(&mut self) {
        let records = std::mem::take(&mut self.buffer);
        if let Err(unsent) = self.sender.send_records(records).await {
            error!("{unsent}");
            let Unsent { mut records, .. } = unsent;
            truncate_overflow(
                &mut records,
                self.config.max_key_count,
                self.config.send_key_count,
            );
            self.buffer = records;
        }
    }

    async fn drain(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.flush().await;
        if !self.buffer.is_empty() {
            warn!(
                "Dropping {} unsent metrics on shutdown",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    fn report(&self, response_tx: mpsc::UnboundedSender<ReportMsg>) {
        let active = self
            .filter
            .active_keys()
            .into_iter()
            .map(|(host, keys)| ReportMsg::active_checks(&host, keys));
        let seen = self
            .seen
            .seen_keys()
            .into_iter()
            .map(|(host, keys)| ReportMsg::key_seen(&host, keys));

        for msg in active.chain(seen) {
            if response_tx.send(msg).is_err() {
                debug!("Report receiver dropped");
                return;
            }
        }
    }
}

async fn refresh_active_checks(
    filter: Arc<KeyFilter>,
    client: Arc<dyn ZabbixClient>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    // The first tick completes immediately, so checks are fetched at startup
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = filter.refresh_all(client.as_ref()) => {}
                }
            }
        }
    }
    info!("Exiting active checks refresh task");
}

async fn sweep_seen_keys(seen: Arc<KeySeen>, window: Duration, cancel_token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = seen.sweep(std::time::Instant::now(), window);
                debug!("Cleaned up {evicted} keys not seen in {window:?}");
            }
        }
    }
    info!("Exiting key seen cleanup task");
}
