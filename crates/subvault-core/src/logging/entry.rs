//! One line of the activity log.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// RFC 3339 UTC timestamp with millisecond precision
    pub ts: String,
    /// trace, debug, info, warn or error
    pub level: String,
    /// Identifier of the CLI invocation that wrote the entry
    pub run: String,
    /// Module path of the event (e.g. "subvault_core::network::gateway")
    pub target: String,
    pub msg: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
    /// Enclosing spans, outermost first, joined by " > "
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl ActivityEntry {
    pub fn new(
        level: impl Into<String>,
        run: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            run: run.into(),
            target: target.into(),
            msg: msg.into(),
            fields: serde_json::Map::new(),
            span: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Read every well-formed entry of one log file, skipping lines that do not parse.
pub fn read_entries(path: impl AsRef<Path>) -> std::io::Result<Vec<ActivityEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Ok(entry) = serde_json::from_str::<ActivityEntry>(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
