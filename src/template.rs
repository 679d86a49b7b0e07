//! Command rendering for the WebAdministration surface.
//!
//! Every function here is a pure function from a typed spec to PowerShell
//! text. Rendering never executes anything, and required fields are
//! validated before interpolation so a template can never silently emit
//! an empty value.
//!
//! Single-site lookups always pass `-Name`. An unscoped `Get-Website`
//! slows down linearly with the number of sites on the server, and that
//! cost multiplies across a reconciliation pass; the only unscoped
//! enumeration lives in [`get_websites`], which runs once per pass.

use crate::error::{Error, Result};
use crate::types::SiteSpec;

/// Quote a value for single-quoted PowerShell interpolation.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The `IIS:` provider path for a site.
fn site_path(name: &str) -> String {
    format!(r"IIS:\Sites\{name}")
}

/// One `Set-ItemProperty` invocation against a site.
fn set_item(site: &str, property: &str, value: &str) -> String {
    format!(
        "Set-ItemProperty {} -Name {} -Value {} -ErrorAction Stop",
        quote(&site_path(site)),
        property,
        quote(value)
    )
}

/// Targeted existence lookup, scoped by exact name.
pub fn get_website(name: &str) -> String {
    format!("Get-Website -Name {}", quote(name))
}

/// Remove a website.
pub fn remove_website(name: &str) -> String {
    format!("Remove-Website -Name {} -ErrorAction Stop", quote(name))
}

/// Start a website.
pub fn start_website(name: &str) -> String {
    format!("Start-Website -Name {} -ErrorAction Stop", quote(name))
}

/// Stop a website.
pub fn stop_website(name: &str) -> String {
    format!("Stop-Website -Name {} -ErrorAction Stop", quote(name))
}

/// Site creation command.
///
/// A physical path is required: creating a site without a root leaves
/// IIS with a broken binding, so its absence is a render-time error
/// rather than an empty interpolation. The application pool is created
/// first when the spec names one that may not exist yet.
pub fn new_website(spec: &SiteSpec) -> Result<String> {
    let path = spec
        .physical_path
        .as_deref()
        .ok_or(Error::MissingProperty {
            operation: "new_website",
            property: "physical_path",
        })?;

    let mut cmds = Vec::new();
    if let Some(pool) = &spec.application_pool {
        cmds.push(format!(
            "if (-not (Test-Path {0})) {{ New-WebAppPool -Name {1} | Out-Null }}",
            quote(&format!(r"IIS:\AppPools\{pool}")),
            quote(pool)
        ));
    }

    let mut create = format!(
        "New-Website -Name {} -PhysicalPath {} -ErrorAction Stop",
        quote(&spec.name),
        quote(path)
    );
    if let Some(pool) = &spec.application_pool {
        create.push_str(&format!(" -ApplicationPool {}", quote(pool)));
    }
    create.push_str(" | Out-Null");
    cmds.push(create);

    Ok(cmds.join("\n"))
}

/// `Set-ItemProperty` lines for the general site properties the spec
/// manages. Absent fields render nothing.
pub fn general_properties(spec: &SiteSpec) -> Vec<String> {
    let mut cmds = Vec::new();
    if !spec.enabled_protocols.is_empty() {
        cmds.push(set_item(
            &spec.name,
            "enabledProtocols",
            &spec.enabled_protocols.join(","),
        ));
    }
    if let Some(autostart) = spec.server_autostart {
        cmds.push(set_item(
            &spec.name,
            "serverAutoStart",
            if autostart { "True" } else { "False" },
        ));
    }
    cmds
}

/// `Set-ItemProperty` lines for the logging properties the spec manages.
pub fn log_properties(spec: &SiteSpec) -> Vec<String> {
    let mut cmds = Vec::new();
    if let Some(path) = &spec.log_path {
        cmds.push(set_item(&spec.name, "logFile.directory", path));
    }
    if let Some(period) = &spec.log_period {
        cmds.push(set_item(&spec.name, "logFile.period", period));
    }
    if let Some(size) = spec.log_truncate_size {
        cmds.push(set_item(
            &spec.name,
            "logFile.truncateSize",
            &size.to_string(),
        ));
    }
    if let Some(rollover) = spec.log_local_time_rollover {
        cmds.push(set_item(
            &spec.name,
            "logFile.localTimeRollover",
            if rollover { "True" } else { "False" },
        ));
    }
    if let Some(format) = &spec.log_format {
        cmds.push(set_item(&spec.name, "logFile.logFormat", format));
    }
    if !spec.log_flags.is_empty() {
        cmds.push(set_item(
            &spec.name,
            "logFile.logExtFileFlags",
            &spec.log_flags.join(","),
        ));
    }
    cmds
}

/// Composed creation script: site creation plus every managed property,
/// sent as one command so the caller observes an atomic create.
pub fn create_website(spec: &SiteSpec) -> Result<String> {
    let mut cmds = vec![new_website(spec)?];
    cmds.extend(general_properties(spec));
    cmds.extend(log_properties(spec));
    Ok(cmds.join("\n"))
}

/// Property flush: one `Set-ItemProperty` per staged property.
pub fn set_properties<'a, I>(site: &str, staged: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    staged
        .into_iter()
        .map(|(property, value)| set_item(site, property, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bulk enumeration of every site, projected into the discovery schema
/// and emitted as JSON. One object per site; PowerShell collapses a
/// single-element pipeline to a bare object, which the mapper normalizes
/// back into a one-element batch.
pub fn get_websites() -> String {
    r#"Get-Website | ForEach-Object {
    @{
        name                 = $_.name
        state                = "$($_.state)"
        physicalpath         = "$($_.physicalPath)"
        applicationpool      = "$($_.applicationPool)"
        serverautostart      = "$($_.serverAutoStart)"
        enabledprotocols     = "$($_.enabledProtocols)"
        logpath              = "$($_.logFile.directory)"
        logperiod            = "$($_.logFile.period)"
        logtruncatesize      = "$($_.logFile.truncateSize)"
        loglocaltimerollover = "$($_.logFile.localTimeRollover)"
        logformat            = "$($_.logFile.logFormat)"
        logextfileflags      = "$($_.logFile.logExtFileFlags)"
    }
} | ConvertTo-Json"#
        .to_string()
}
