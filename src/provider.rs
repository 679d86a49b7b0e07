//! The reconciliation driver: converge one site toward its declared state.

use std::collections::BTreeMap;

use crate::channel::Channel;
use crate::error::Result;
use crate::template;
use crate::types::{ApplyResult, Ensure, ExecutionResult, SiteRecord, SiteSpec};

/// Binds one declared site to its observed record and converges it.
///
/// Success of a mutation is observational: every create/destroy/start/
/// stop re-checks existence afterwards and reports that, rather than
/// trusting the interpreter's exit code alone. A nonzero exit or an
/// error message is still logged at warn level. Failed mutations never
/// raise; the divergence stays visible to the next discovery pass, and
/// retry policy belongs to the host engine.
pub struct SiteProvider<'a> {
    channel: &'a dyn Channel,
    spec: SiteSpec,
    current: Option<SiteRecord>,
    property_flush: BTreeMap<String, String>,
}

impl<'a> SiteProvider<'a> {
    /// Create a provider for one declared site.
    pub fn new(spec: SiteSpec, channel: &'a dyn Channel) -> Self {
        Self {
            channel,
            spec,
            current: None,
            property_flush: BTreeMap::new(),
        }
    }

    /// Attach the discovery record matched to this site, if any.
    pub fn bind(&mut self, record: SiteRecord) {
        self.current = Some(record);
    }

    /// The declared desired state.
    pub fn spec(&self) -> &SiteSpec {
        &self.spec
    }

    /// Observed properties from the discovery pass, if the site matched.
    pub fn current(&self) -> Option<&SiteRecord> {
        self.current.as_ref()
    }

    /// Observed ensure state: the matched record's state, or absent.
    pub fn current_ensure(&self) -> Ensure {
        self.current.as_ref().map_or(Ensure::Absent, |r| r.ensure)
    }

    /// Targeted existence check, scoped by exact site name. Non-empty
    /// output means the site exists, whatever state it is in.
    pub fn exists(&self) -> Result<bool> {
        let result = self.run(&template::get_website(&self.spec.name))?;
        Ok(result.stdout.is_some())
    }

    /// Create the site with every managed property as one composed
    /// script. Returns the post-operation existence check, so `true` is
    /// the success outcome.
    pub fn create(&self) -> Result<bool> {
        let script = template::create_website(&self.spec)?;
        let result = self.run(&script)?;
        self.warn_on_failure("creating", &result);
        self.exists()
    }

    /// Remove the site. Returns the post-operation existence check, so
    /// `false` is the success outcome. Destroying an already-absent site
    /// does not raise.
    pub fn destroy(&self) -> Result<bool> {
        let result = self.run(&template::remove_website(&self.spec.name))?;
        self.warn_on_failure("destroying", &result);
        self.exists()
    }

    /// Start the site, creating it first when absent. Returns the
    /// post-operation existence check.
    pub fn start(&mut self) -> Result<bool> {
        if !self.exists()? {
            self.create()?;
        }
        let result = self.run(&template::start_website(&self.spec.name))?;
        self.warn_on_failure("starting", &result);

        let exists = self.exists()?;
        if exists && result.succeeded() {
            self.spec.ensure = Ensure::Started;
        }
        Ok(exists)
    }

    /// Stop the site, creating it first when absent. Returns the
    /// post-operation existence check.
    pub fn stop(&mut self) -> Result<bool> {
        if !self.exists()? {
            self.create()?;
        }
        let result = self.run(&template::stop_website(&self.spec.name))?;
        self.warn_on_failure("stopping", &result);

        let exists = self.exists()?;
        if exists && result.succeeded() {
            self.spec.ensure = Ensure::Stopped;
        }
        Ok(exists)
    }

    /// One step of the desired-state machine.
    ///
    /// Issues at most one corrective operation and reports what
    /// happened. Channel failures propagate as errors; operation
    /// failures fold into [`ApplyResult::Failed`].
    pub fn reconcile(&mut self) -> Result<ApplyResult> {
        match (self.spec.ensure, self.current_ensure()) {
            (Ensure::Present, Ensure::Absent) => {
                if self.create()? {
                    Ok(ApplyResult::Created)
                } else {
                    Ok(self.failed("still absent after create"))
                }
            }
            (Ensure::Absent, current) if current.is_present() => {
                if self.destroy()? {
                    Ok(self.failed("still present after destroy"))
                } else {
                    Ok(ApplyResult::Removed)
                }
            }
            (Ensure::Started, current) if current != Ensure::Started => {
                if self.start()? {
                    Ok(ApplyResult::Started)
                } else {
                    Ok(self.failed("absent after start"))
                }
            }
            (Ensure::Stopped, current) if current != Ensure::Stopped => {
                if self.stop()? {
                    Ok(ApplyResult::Stopped)
                } else {
                    Ok(self.failed("absent after stop"))
                }
            }
            _ => Ok(ApplyResult::NoChange),
        }
    }

    /// Stage a property update to be applied on the next flush.
    pub fn stage(&mut self, property: impl Into<String>, value: impl Into<String>) {
        self.property_flush.insert(property.into(), value.into());
    }

    /// Apply every staged property update as one command and clear the
    /// staging set. A no-op when nothing is staged. Returns the
    /// post-operation existence check.
    pub fn flush(&mut self) -> Result<bool> {
        if self.property_flush.is_empty() {
            return Ok(true);
        }
        let staged = std::mem::take(&mut self.property_flush);
        let script = template::set_properties(&self.spec.name, staged.iter());
        let result = self.run(&script)?;
        self.warn_on_failure("updating", &result);
        self.exists()
    }

    /// Execute a command on the channel, echoing raw output at debug
    /// level.
    fn run(&self, command: &str) -> Result<ExecutionResult> {
        let result = self.channel.execute(command)?;
        for line in &result.stderr {
            if !line.is_empty() {
                log::debug!("stderr: {line}");
            }
        }
        if let Some(stdout) = &result.stdout {
            log::debug!("stdout: {stdout}");
        }
        Ok(result)
    }

    fn warn_on_failure(&self, action: &str, result: &ExecutionResult) {
        if result.exit_code != 0 {
            log::warn!(
                "error {action} website {}: exit code {}",
                self.spec.name,
                result.exit_code
            );
        }
        if let Some(message) = &result.error_message {
            log::warn!("error {action} website {}: {message}", self.spec.name);
        }
    }

    fn failed(&self, detail: &str) -> ApplyResult {
        ApplyResult::Failed {
            error: format!("site {} {detail}", self.spec.name),
        }
    }
}
