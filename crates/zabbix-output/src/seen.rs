// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use fnv::FnvHashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub type HostSeenKeys = FnvHashMap<String, Instant>;

/// Last time each host/key pair went through the output.
#[derive(Debug, Default)]
pub struct KeySeen {
    hosts: RwLock<FnvHashMap<String, HostSeenKeys>>,
}

#[allow(clippy::expect_used)]
impl KeySeen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, host: &str, key: &str, now: Instant) {
        let mut hosts = self.hosts.write().expect("lock poisoned");
        match hosts.get_mut(host) {
            Some(keys) => {
                keys.insert(key.to_string(), now);
            }
            None => {
                let mut keys = HostSeenKeys::default();
                keys.insert(key.to_string(), now);
                hosts.insert(host.to_string(), keys);
            }
        }
    }

    /// Forgets every key last seen more than `window` before `now`, and every
    /// host left without keys. Returns how many keys were dropped.
    pub fn sweep(&self, now: Instant, window: Duration) -> usize {
        let mut evicted = 0;
        let mut hosts = self.hosts.write().expect("lock poisoned");
        hosts.retain(|_, keys| {
            keys.retain(|_, seen| {
                let stale = now.saturating_duration_since(*seen) > window;
                if stale {
                    evicted += 1;
                }
                !stale
            });
            !keys.is_empty()
        });
        evicted
    }

    pub fn seen_keys(&self) -> Vec<(String, Vec<String>)> {
        let hosts = self.hosts.read().expect("lock poisoned");
        hosts
            .iter()
            .map(|(host, keys)| (host.clone(), keys.keys().cloned().collect()))
            .collect()
    }

    pub fn last_seen(&self, host: &str, key: &str) -> Option<Instant> {
        let hosts = self.hosts.read().expect("lock poisoned");
        hosts.get(host).and_then(|keys| keys.get(key)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_sweep_after_window_removes_entry() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "k1", t0);

        assert_eq!(seen.sweep(t0 + Duration::from_secs(15), WINDOW), 1);
        assert_eq!(seen.last_seen("h1", "k1"), None);
        assert!(seen.seen_keys().is_empty());
    }

    #[test]
    fn test_sweep_within_window_retains_entry() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "k1", t0);

        assert_eq!(seen.sweep(t0 + Duration::from_secs(5), WINDOW), 0);
        assert_eq!(seen.last_seen("h1", "k1"), Some(t0));
    }

    #[test]
    fn test_sweep_at_window_boundary_retains_entry() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "k1", t0);
        assert_eq!(seen.sweep(t0 + WINDOW, WINDOW), 0);
    }

    #[test]
    fn test_sweep_with_huge_window_retains_entry() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "k1", t0);
        assert_eq!(seen.sweep(t0, Duration::from_secs(u64::MAX)), 0);
    }

    #[test]
    fn test_touch_refreshes_timestamp() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "k1", t0);
        seen.touch("h1", "k1", t0 + Duration::from_secs(8));

        assert_eq!(seen.sweep(t0 + Duration::from_secs(15), WINDOW), 0);
        assert_eq!(seen.last_seen("h1", "k1"), Some(t0 + Duration::from_secs(8)));
    }

    #[test]
    fn test_host_kept_while_any_key_is_fresh() {
        let seen = KeySeen::new();
        let t0 = Instant::now();
        seen.touch("h1", "old", t0);
        seen.touch("h1", "new", t0 + Duration::from_secs(10));
        seen.touch("h2", "old", t0);

        assert_eq!(seen.sweep(t0 + Duration::from_secs(15), WINDOW), 2);
        let keys = seen.seen_keys();
        assert_eq!(keys, vec![("h1".to_string(), vec!["new".to_string()])]);
    }
}
