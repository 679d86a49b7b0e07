//! Decoding of discovery output into typed site records.
//!
//! The management surface reports everything as text. Booleans are
//! coerced after decoding so an empty field can stay unset instead of
//! collapsing to false.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Ensure, SiteRecord, parse_bool};

/// Raw wire shape of one discovered site, lowercase field names as the
/// enumeration script projects them.
#[derive(Debug, Deserialize)]
struct RawSite {
    #[serde(default)]
    state: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    physicalpath: String,
    #[serde(default)]
    applicationpool: String,
    #[serde(default)]
    serverautostart: String,
    #[serde(default)]
    enabledprotocols: String,
    #[serde(default)]
    logpath: String,
    #[serde(default)]
    logperiod: String,
    #[serde(default)]
    logtruncatesize: String,
    #[serde(default)]
    loglocaltimerollover: String,
    #[serde(default)]
    logformat: String,
    #[serde(default)]
    logextfileflags: String,
}

fn opt(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn opt_bool(text: &str) -> Result<Option<bool>> {
    if text.is_empty() {
        Ok(None)
    } else {
        parse_bool(text).map(Some)
    }
}

fn record_from_raw(raw: RawSite) -> Result<SiteRecord> {
    let ensure = Ensure::parse(&raw.state).ok_or_else(|| Error::EnsureParse {
        value: raw.state.clone(),
    })?;

    Ok(SiteRecord {
        name: raw.name,
        ensure,
        physical_path: opt(raw.physicalpath),
        application_pool: opt(raw.applicationpool),
        enabled_protocols: opt(raw.enabledprotocols),
        server_autostart: opt_bool(&raw.serverautostart)?,
        log_path: opt(raw.logpath),
        log_period: opt(raw.logperiod),
        log_truncate_size: opt(raw.logtruncatesize),
        log_local_time_rollover: opt_bool(&raw.loglocaltimerollover)?,
        log_format: opt(raw.logformat),
        log_flags: opt(raw.logextfileflags),
    })
}

/// Parse discovery output into site records.
///
/// Accepts a single JSON object or an array of objects; a single object
/// is treated as a one-element batch. A record that fails to decode is
/// logged at warn level and skipped, so one bad site does not sink the
/// whole batch. Output that is not JSON at all fails the batch.
pub fn parse_sites(raw: &str) -> Result<Vec<SiteRecord>> {
    let value: Value = serde_json::from_str(raw)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let raw_site: RawSite = match serde_json::from_value(item) {
            Ok(site) => site,
            Err(err) => {
                log::warn!("skipping undecodable site record: {err}");
                continue;
            }
        };
        let name = raw_site.name.clone();
        match record_from_raw(raw_site) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping site record {name:?}: {err}"),
        }
    }
    Ok(records)
}
