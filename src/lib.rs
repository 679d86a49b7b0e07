//! # iiskit
//!
//! Desired-state management for IIS websites over a persistent
//! PowerShell session.
//!
//! This crate provides functionality for:
//! - Rendering WebAdministration commands from typed site specs
//! - Executing them over a shared, long-lived PowerShell session
//! - Decoding discovery output into typed site records
//! - Converging each declared site toward its desired state
//!
//! ## Example
//!
//! ```no_run
//! use iiskit::{Ensure, PowerShellChannel, SiteSpec, reconcile_all};
//!
//! let channel = PowerShellChannel::local().expect("PowerShell not available");
//!
//! let site = SiteSpec::new("Default Web Site", Ensure::Started)
//!     .expect("valid spec")
//!     .with_physical_path(r"C:\inetpub\wwwroot")
//!     .with_application_pool("DefaultAppPool");
//!
//! for (name, outcome) in reconcile_all(vec![site], channel.as_ref()).expect("pass failed") {
//!     println!("{name}: {outcome:?}");
//! }
//! ```
//!
//! ## Failure model
//!
//! A failed create/destroy/start/stop is not an error: the driver logs a
//! warning and reports success observationally, from a post-operation
//! existence check. Errors are reserved for the channel itself (process
//! gone, pipes broken), for templates referencing properties a spec does
//! not carry, and for undecodable discovery output. See
//! [`error::Error`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod discovery;
pub mod error;
pub mod mapper;
pub mod provider;
pub mod template;
pub mod types;

pub use channel::{Channel, POWERSHELL_ARGS, PowerShellChannel};
pub use discovery::{discover_all, prefetch};
pub use error::{Error, Result};
pub use provider::SiteProvider;
pub use types::{ApplyResult, Ensure, ExecutionResult, SiteRecord, SiteSpec, parse_bool};

/// Reconcile a whole set of declared sites in one pass.
///
/// Discovery runs once up front, each site is converged in declaration
/// order, and the per-site outcomes come back in that order. A channel
/// failure aborts the pass; any other per-site error (say, a template
/// rejecting an incomplete spec) fails that one site and the pass moves
/// on.
pub fn reconcile_all(
    specs: Vec<SiteSpec>,
    channel: &dyn Channel,
) -> Result<Vec<(String, ApplyResult)>> {
    let mut providers = discovery::prefetch(specs, channel)?;
    let mut outcomes = Vec::with_capacity(providers.len());
    for provider in &mut providers {
        let name = provider.spec().name.clone();
        let outcome = match provider.reconcile() {
            Ok(outcome) => outcome,
            Err(err @ (Error::Channel { .. } | Error::PowerShellNotFound)) => return Err(err),
            Err(err) => {
                log::warn!("error reconciling website {name}: {err}");
                ApplyResult::Failed {
                    error: err.to_string(),
                }
            }
        };
        outcomes.push((name, outcome));
    }
    Ok(outcomes)
}
