// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-host allow-list of the keys Zabbix expects, built from active checks.
//!
//! Each host is in one of three states:
//!
//! - absent: never seen
//! - pending (`None`): seen, but no successful fetch yet, every record is discarded
//! - known (`Some(keys)`): only records whose key is in `keys` are admitted.
//!   An empty map means the server has no active check for that host.

use crate::client::ZabbixClient;
use fnv::FnvHashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Active check keys for one host, with the interval Zabbix expects them at.
pub type HostActiveKeys = FnvHashMap<String, Duration>;

#[derive(Debug)]
pub struct KeyFilter {
    enabled: bool,
    hosts: RwLock<FnvHashMap<String, Option<HostActiveKeys>>>,
}

#[allow(clippy::expect_used)]
impl KeyFilter {
    /// Creates a filter with `local_host` already pending so that it is
    /// fetched on the first refresh. A disabled filter admits everything.
    #[must_use]
    pub fn new(enabled: bool, local_host: &str) -> Self {
        let mut hosts = FnvHashMap::default();
        hosts.insert(local_host.to_string(), None);
        Self {
            enabled,
            hosts: RwLock::new(hosts),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decides whether a record for `(host, key)` should be forwarded.
    /// Unknown hosts are registered as pending and their records discarded
    /// until the next refresh resolves them.
    pub fn admit(&self, host: &str, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        {
            let hosts = self.hosts.read().expect("lock poisoned");
            match hosts.get(host) {
                Some(Some(keys)) => return keys.contains_key(key),
                Some(None) => return false,
                None => {}
            }
        }

        self.note_host_if_unknown(host);
        false
    }

    /// Registers `host` as pending unless it is already tracked.
    pub fn note_host_if_unknown(&self, host: &str) {
        let mut hosts = self.hosts.write().expect("lock poisoned");
        if !hosts.contains_key(host) {
            debug!("New host {host}, active checks will be fetched on next refresh");
            hosts.insert(host.to_string(), None);
        }
    }

    /// Replaces the key set of `host` with a freshly fetched one.
    pub fn replace(&self, host: &str, keys: HostActiveKeys) {
        let mut hosts = self.hosts.write().expect("lock poisoned");
        hosts.insert(host.to_string(), Some(keys));
    }

    pub fn hosts(&self) -> Vec<String> {
        let hosts = self.hosts.read().expect("lock poisoned");
        hosts.keys().cloned().collect()
    }

    /// Fetches the active checks of every tracked host. The host list is
    /// copied up front and no lock is held while talking to the server, so
    /// admission checks keep running during a slow refresh. A failed fetch
    /// keeps whatever was known before for that host.
    pub async fn refresh_all<C: ZabbixClient + ?Sized>(&self, client: &C) {
        debug!("Updating key filter with active checks");
        let hosts = self.hosts();

        let mut refreshed = 0;
        for host in hosts {
            match client.fetch_active_checks(&host).await {
                Ok(keys) => {
                    debug!("Host {host} has {} active checks", keys.len());
                    self.replace(&host, keys);
                    refreshed += 1;
                }
                Err(e) => {
                    warn!("Zabbix server unable to provide active check list for host {host}: {e}");
                }
            }
        }
        debug!("Refreshed active checks for {refreshed} hosts");
    }

    /// Every host whose active checks are known, with its keys. Pending hosts
    /// are left out.
    pub fn active_keys(&self) -> Vec<(String, Vec<String>)> {
        let hosts = self.hosts.read().expect("lock poisoned");
        hosts
            .iter()
            .filter_map(|(host, keys)| {
                keys.as_ref()
                    .map(|keys| (host.clone(), keys.keys().cloned().collect()))
            })
            .collect()
    }

    pub fn is_pending(&self, host: &str) -> bool {
        let hosts = self.hosts.read().expect("lock poisoned");
        matches!(hosts.get(host), Some(None))
    }
}
