//! Cluster Configuration Flattening
//!
//! Turns a nested cluster description into flat dotted keys and emits the
//! shell variable assignments that deployment scripts source to learn which
//! hosts run each role.

use std::collections::BTreeMap;
use std::io::Write;

use serde_json::Value;

use crate::error::{Error, Result};

/// Recognized top-level role sections, in emission order
const SECTIONS: [&str; 4] = ["manager", "monitor", "gc", "tserver"];

/// Flatten a nested key-value document into dotted keys.
///
/// Nested maps contribute their path as a dotted prefix. A list flattens to
/// its scalar elements joined by single spaces, which is the host-list shape
/// the shell output expects. Scalars stringify as written.
pub fn flatten(doc: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    if let Value::Object(map) = doc {
        for (key, value) in map {
            flatten_into(key, value, &mut flat);
        }
    }
    flat
}

fn flatten_into(key: &str, value: &Value, flat: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(&format!("{}.{}", key, child_key), child, flat);
            }
        }
        Value::Array(items) => {
            let mut scalars = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => flatten_into(key, item, flat),
                    scalar => scalars.push(scalar_to_string(scalar)),
                }
            }
            if !scalars.is_empty() {
                flat.insert(key.to_string(), scalars.join(" "));
            }
        }
        scalar => {
            flat.insert(key.to_string(), scalar_to_string(scalar));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `NAME="value"` assignment lines for the recognized sections.
///
/// A cluster without a manager or tserver section cannot run, so those are
/// fatal; a missing monitor or gc section only warrants a warning.
pub fn format_shell_variables<W: Write>(
    config: &BTreeMap<String, String>,
    out: &mut W,
) -> Result<()> {
    for section in SECTIONS {
        match config.get(section) {
            Some(hosts) => {
                writeln!(out, "{}_HOSTS=\"{}\"", section.to_uppercase(), hosts)?;
            }
            None if section == "manager" || section == "tserver" => {
                return Err(Error::Config(format!(
                    "required configuration section is missing: {}",
                    section
                )));
            }
            None => {
                tracing::warn!(section, "configuration section is missing");
            }
        }
    }

    if let Some(hosts) = config.get("compaction.coordinator") {
        writeln!(out, "COORDINATOR_HOSTS=\"{}\"", hosts)?;
    }
    if let Some(queues) = config.get("compaction.compactor.queue") {
        writeln!(out, "COMPACTION_QUEUES=\"{}\"", queues)?;
        for queue in queues.split(' ').filter(|q| !q.is_empty()) {
            if let Some(hosts) = config.get(&format!("compaction.compactor.{}", queue)) {
                writeln!(out, "COMPACTOR_HOSTS_{}=\"{}\"", queue, hosts)?;
            }
        }
    }
    Ok(())
}
