// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Introspection snapshot of the key filter and the seen keys.

use std::collections::BTreeMap;
use std::fmt;

/// One named list of keys, produced by the output service while answering a
/// report request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMsg {
    pub name: String,
    pub values: Vec<String>,
}

impl ReportMsg {
    #[must_use]
    pub fn active_checks(host: &str, values: Vec<String>) -> Self {
        Self {
            name: format!("ActiveChecks-{}", report_host(host)),
            values,
        }
    }

    #[must_use]
    pub fn key_seen(host: &str, values: Vec<String>) -> Self {
        Self {
            name: format!("KeySeen-{}", report_host(host)),
            values,
        }
    }
}

/// Report field names can't contain dots.
#[must_use]
pub fn report_host(host: &str) -> String {
    host.replace('.', "_")
}

/// Report fields by name, each value being the sorted, space separated keys.
///
/// Hosts that only differ by `.` and `_` share a field name; their keys are
/// merged into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    fields: BTreeMap<String, Vec<String>>,
}

impl Report {
    pub fn add(&mut self, msg: ReportMsg) {
        let values = self.fields.entry(msg.name).or_default();
        values.extend(msg.values);
        values.sort();
        values.dedup();
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|values| values.join(" "))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.fields {
            writeln!(f, "{name}: {}", values.join(" "))?;
        }
        Ok(())
    }
}
