//! Adapter for the external subdomain discovery tool.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::normalize::normalize_host;

pub const DEFAULT_SCANNER: &str = "subfinder";
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Source of freshly discovered hostnames for a root domain.
#[allow(async_fn_in_trait)]
pub trait Scanner {
    /// Normalized, deduplicated hostnames found for `domain`.
    async fn scan(&self, domain: &str) -> VaultResult<BTreeSet<String>>;
}

/// One JSON line of subfinder output
#[derive(Debug, Deserialize)]
struct ScanRow {
    #[serde(default)]
    host: String,
}

/// Runs `subfinder -d <domain> -all -silent -json` and parses its output.
#[derive(Debug, Clone)]
pub struct SubfinderScanner {
    program: PathBuf,
    timeout: Duration,
}

impl Default for SubfinderScanner {
    fn default() -> Self {
        Self::new(DEFAULT_SCANNER, DEFAULT_SCAN_TIMEOUT)
    }
}

impl SubfinderScanner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl Scanner for SubfinderScanner {
    async fn scan(&self, domain: &str) -> VaultResult<BTreeSet<String>> {
        let program = self.program.display().to_string();
        info!(domain, scanner = %program, "Starting subdomain scan");

        let child = Command::new(&self.program)
            .args(["-d", domain, "-all", "-silent", "-json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VaultError::ToolNotFound(format!(
                    "{} not found in PATH; install from https://github.com/projectdiscovery/subfinder",
                    program
                )),
                _ => VaultError::ScanFailed(format!("failed to start {}: {}", program, e)),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VaultError::ScanFailed(format!("{} timed out after {:?}", program, self.timeout))
            })?
            .map_err(|e| VaultError::ScanFailed(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VaultError::ScanFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        let hosts = parse_scan_output(&String::from_utf8_lossy(&output.stdout));
        info!(domain, found = hosts.len(), "Scan finished");
        Ok(hosts)
    }
}

/// Parse JSON-lines scanner output into normalized, unique hostnames.
///
/// Blank lines are ignored; malformed lines are skipped with a warning.
pub fn parse_scan_output(stdout: &str) -> BTreeSet<String> {
    let mut hosts = BTreeSet::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ScanRow>(line) {
            Ok(row) => {
                let host = normalize_host(&row.host);
                if !host.is_empty() {
                    hosts.insert(host);
                }
            }
            Err(e) => warn!(line, error = %e, "Skipping malformed scanner line"),
        }
    }
    debug!(count = hosts.len(), "Parsed scanner output");
    hosts
}
