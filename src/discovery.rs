//! Bulk discovery: enumerate every site once per reconciliation pass.
//!
//! One enumeration command replaces a lookup per managed site, which is
//! the difference between constant and linear channel traffic per pass.
//! The resulting records are matched to declared sites by exact name and
//! discarded when the pass ends.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::channel::Channel;
use crate::error::Result;
use crate::mapper;
use crate::provider::SiteProvider;
use crate::template;
use crate::types::{SiteRecord, SiteSpec};

/// Enumerate every site on the target in a single command.
///
/// No output at all decodes as an empty set (a server with no sites).
pub fn discover_all(channel: &dyn Channel) -> Result<Vec<SiteRecord>> {
    let result = channel.execute(&template::get_websites())?;
    if !result.succeeded() {
        log::warn!(
            "error listing websites: {}",
            result.error_message.as_deref().unwrap_or("nonzero exit")
        );
    }
    match result.stdout {
        Some(text) => mapper::parse_sites(&text),
        None => Ok(Vec::new()),
    }
}

/// Bind each declared site to its discovered record by exact name.
///
/// Discovery runs once for the whole set. Site names are expected to be
/// unique; duplicate records are resolved first-wins with a warn-level
/// diagnostic so matching stays deterministic.
pub fn prefetch<'a>(
    specs: Vec<SiteSpec>,
    channel: &'a dyn Channel,
) -> Result<Vec<SiteProvider<'a>>> {
    let mut by_name: HashMap<String, SiteRecord> = HashMap::new();
    for record in discover_all(channel)? {
        match by_name.entry(record.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(_) => {
                log::warn!(
                    "duplicate site record for {:?}; keeping the first",
                    record.name
                );
            }
        }
    }

    let mut providers = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut provider = SiteProvider::new(spec, channel);
        if let Some(record) = by_name.remove(&provider.spec().name) {
            provider.bind(record);
        }
        providers.push(provider);
    }
    Ok(providers)
}
