//! Persistent PowerShell session channel.
//!
//! Spawning `powershell.exe` costs on the order of a second. Paying that
//! once per managed site dominates a reconciliation pass, so the channel
//! keeps one warm interpreter per launch command and feeds it scripts
//! over stdin, reading one JSON envelope back per script. Channels are
//! process-wide singletons keyed by the launch command plus its
//! arguments, so every caller targeting the same interpreter shares the
//! warm process. A mutex around the session guarantees at most one
//! command is in flight per channel.
//!
//! No timeout is enforced at this layer: a hung interpreter blocks the
//! pass. Cancellation belongs to the host engine.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::ExecutionResult;

/// Executes command text against an external management surface.
///
/// An `Err` means the channel itself failed (process gone, pipe broken);
/// a command that ran and exited nonzero is an `Ok` carrying the failure
/// details. The trait exists so the driver can be exercised against a
/// scripted fake in tests.
pub trait Channel: Send + Sync {
    /// Execute one command and return its structured result.
    fn execute(&self, command: &str) -> Result<ExecutionResult>;
}

/// Arguments for a non-interactive administrative session reading
/// scripts from stdin.
pub const POWERSHELL_ARGS: &[&str] = &[
    "-NoProfile",
    "-NonInteractive",
    "-NoLogo",
    "-ExecutionPolicy",
    "Bypass",
    "-Command",
    "-",
];

/// A long-lived PowerShell session fed scripts over stdin.
///
/// The session is established lazily on first use and re-established on
/// the call after a failure; between the failure and re-establishment
/// every operation routed here reports a channel error.
pub struct PowerShellChannel {
    program: String,
    args: Vec<String>,
    session: Mutex<Option<Session>>,
    sequence: AtomicU64,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl PowerShellChannel {
    /// Get (or create) the shared channel for a launch command.
    pub fn instance(program: &str, args: &[&str]) -> Arc<PowerShellChannel> {
        static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<PowerShellChannel>>>> =
            OnceLock::new();

        let key = launch_key(program, args);
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(key)
                .or_insert_with(|| Arc::new(PowerShellChannel::new(program, args))),
        )
    }

    /// Shared channel for the local PowerShell installation.
    pub fn local() -> Result<Arc<PowerShellChannel>> {
        let program = find_powershell()?;
        Ok(Self::instance(&program, POWERSHELL_ARGS))
    }

    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            session: Mutex::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    fn spawn(&self) -> Result<Session> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Channel {
                message: format!("failed to launch {}: {e}", self.program),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| Error::Channel {
            message: "interpreter has no stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Channel {
            message: "interpreter has no stdout pipe".to_string(),
        })?;

        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl Channel for PowerShellChannel {
    fn execute(&self, command: &str) -> Result<ExecutionResult> {
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(Error::Channel {
                message: "session could not be established".to_string(),
            });
        };

        let boundary = format!(
            "#<iiskit:{:016x}>#",
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );
        let script = wrap_command(command, &boundary);

        match run_script(session, &script, &boundary) {
            Ok(result) => Ok(result),
            Err(err) => {
                // The session state is unknown after a pipe failure; tear
                // it down so the next call re-establishes the interpreter.
                if let Some(mut dead) = guard.take() {
                    let _ = dead.child.kill();
                    let _ = dead.child.wait();
                }
                Err(err)
            }
        }
    }
}

fn run_script(session: &mut Session, script: &str, boundary: &str) -> Result<ExecutionResult> {
    session
        .stdin
        .write_all(script.as_bytes())
        .map_err(channel_io)?;
    session.stdin.flush().map_err(channel_io)?;

    let mut envelope = String::new();
    loop {
        let mut line = String::new();
        let read = session.stdout.read_line(&mut line).map_err(channel_io)?;
        if read == 0 {
            return Err(Error::Channel {
                message: "interpreter closed its output pipe".to_string(),
            });
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == boundary {
            break;
        }
        envelope.push_str(trimmed);
    }

    parse_envelope(envelope.trim())
}

fn channel_io(err: std::io::Error) -> Error {
    Error::Channel {
        message: err.to_string(),
    }
}

/// Wrap a command so the session emits exactly one JSON envelope and a
/// boundary marker, whether or not the command succeeds.
///
/// The command text is carried in a literal here-string, so it must not
/// contain a line consisting of `'@` (no rendered template does).
fn wrap_command(command: &str, boundary: &str) -> String {
    format!(
        "$__cmd = @'\n\
         {command}\n\
         '@\n\
         $ErrorActionPreference = 'Stop'\n\
         try {{\n\
             $__out = Invoke-Expression $__cmd | Out-String\n\
             $__envelope = @{{ stdout = $__out; stderr = @(); exitcode = 0; errormessage = $null }}\n\
         }} catch {{\n\
             $__envelope = @{{ stdout = $null; stderr = @(\"$_\"); exitcode = 1; errormessage = $_.Exception.Message }}\n\
         }}\n\
         $__envelope | ConvertTo-Json -Compress\n\
         Write-Output '{boundary}'\n"
    )
}

#[derive(Debug, Deserialize)]
struct Envelope {
    stdout: Option<String>,
    #[serde(default)]
    stderr: Vec<String>,
    exitcode: i32,
    errormessage: Option<String>,
}

/// Decode the session's JSON envelope into an [`ExecutionResult`].
///
/// Whitespace-only stdout collapses to `None`: the administration
/// cmdlets emit nothing for a missing site, and "no output" is the
/// existence signal the driver keys on.
fn parse_envelope(raw: &str) -> Result<ExecutionResult> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| Error::Channel {
        message: format!("malformed envelope from interpreter: {e}"),
    })?;

    let stdout = envelope.stdout.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    });

    Ok(ExecutionResult {
        stdout,
        stderr: envelope.stderr,
        exit_code: envelope.exitcode,
        error_message: envelope.errormessage,
    })
}

fn launch_key(program: &str, args: &[&str]) -> String {
    let mut key = program.to_string();
    for arg in args {
        key.push(' ');
        key.push_str(arg);
    }
    key
}

/// Find the PowerShell executable.
fn find_powershell() -> Result<String> {
    // Check well-known locations
    let paths = [
        r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe",
        r"C:\Program Files\PowerShell\7\pwsh.exe",
    ];

    for path in &paths {
        if std::path::Path::new(path).exists() {
            return Ok((*path).to_string());
        }
    }

    // Fall back to PATH lookup
    for name in ["powershell", "pwsh"] {
        if let Ok(output) = Command::new("where.exe").arg(name).output() {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if let Some(path) = stdout.lines().next() {
                    let path = path.trim();
                    if !path.is_empty() {
                        return Ok(path.to_string());
                    }
                }
            }
        }
    }

    Err(Error::PowerShellNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_key_includes_args() {
        let key = launch_key("powershell.exe", &["-NoProfile", "-Command", "-"]);
        assert_eq!(key, "powershell.exe -NoProfile -Command -");
    }

    #[test]
    fn test_instance_is_singleton_per_launch_command() {
        let a = PowerShellChannel::instance("fake-interpreter", &["-x"]);
        let b = PowerShellChannel::instance("fake-interpreter", &["-x"]);
        let c = PowerShellChannel::instance("fake-interpreter", &["-y"]);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_wrap_command_embeds_command_and_boundary() {
        let script = wrap_command("Get-Website -Name 'x'", "#<iiskit:0>#");
        assert!(script.contains("Get-Website -Name 'x'"));
        assert!(script.contains("Write-Output '#<iiskit:0>#'"));
        assert!(script.contains("ConvertTo-Json -Compress"));
    }

    #[test]
    fn test_parse_envelope_success() {
        let result = parse_envelope(
            r#"{"stdout":"Default Web Site\r\n","stderr":[],"exitcode":0,"errormessage":null}"#,
        )
        .unwrap();
        assert_eq!(result.stdout.as_deref(), Some("Default Web Site"));
        assert!(result.succeeded());
    }

    #[test]
    fn test_parse_envelope_whitespace_stdout_is_none() {
        let result =
            parse_envelope(r#"{"stdout":"  \r\n","stderr":[],"exitcode":0,"errormessage":null}"#)
                .unwrap();
        assert!(result.stdout.is_none());
        assert!(result.succeeded());
    }

    #[test]
    fn test_parse_envelope_failure() {
        let result = parse_envelope(
            r#"{"stdout":null,"stderr":["boom"],"exitcode":1,"errormessage":"boom"}"#,
        )
        .unwrap();
        assert!(!result.succeeded());
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert_eq!(result.stderr, vec!["boom".to_string()]);
    }

    #[test]
    fn test_parse_envelope_rejects_garbage() {
        assert!(matches!(
            parse_envelope("not json"),
            Err(Error::Channel { .. })
        ));
    }
}
