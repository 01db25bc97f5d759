// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection utilities

use std::env;
use tracing::warn;

/// Hostname the output registers in its key filter at startup.
///
/// Tries, in order:
/// 1. the configured override
/// 2. the system hostname via `nix::unistd::gethostname()`
/// 3. the `HOSTNAME` environment variable
/// 4. `"unknown"`
#[must_use]
pub fn resolve_hostname(override_hostname: Option<&str>) -> String {
    if let Some(hostname) = override_hostname.filter(|h| !h.is_empty()) {
        return hostname.to_string();
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str().filter(|h| !h.is_empty()) {
                return hostname.to_string();
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        assert_eq!(
            resolve_hostname(Some("web01.example.com")),
            "web01.example.com"
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let hostname = resolve_hostname(Some(""));
        assert!(!hostname.is_empty());
    }

    #[test]
    fn test_system_hostname_not_empty() {
        assert!(!resolve_hostname(None).is_empty());
    }
}
