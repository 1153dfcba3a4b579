//! Line protocol spoken with the external dealiaser: one JSON object per
//! line on stdin (commands) and one per line on stdout (lookup results).

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};

/// Command kinds accepted by the dealiaser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Lookup,
    Insert,
    Quit,
}

impl CommandKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "lookup" => Some(CommandKind::Lookup),
            "insert" => Some(CommandKind::Insert),
            "quit" => Some(CommandKind::Quit),
            _ => None,
        }
    }

    /// Whether this kind carries a payload in `Data`.
    fn takes_data(self) -> bool {
        matches!(self, CommandKind::Lookup | CommandKind::Insert)
    }
}

/// A single command line sent to the dealiaser's stdin.
///
/// `lookup` and `insert` carry an IP or CIDR prefix in `Data`; `quit` has no
/// payload and tells the dealiaser to terminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "Type")]
    pub kind: CommandKind,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Command {
    /// Build a command from an untyped kind string, rejecting unknown kinds
    /// and a missing/empty payload where one is required.
    pub fn new(kind: &str, data: Option<&str>) -> Result<Self> {
        let kind = CommandKind::parse(kind)
            .ok_or_else(|| HarnessError::Protocol(format!("unknown command type: {kind}")))?;
        let data = data.map(str::trim).filter(|d| !d.is_empty());
        if kind.takes_data() && data.is_none() {
            return Err(HarnessError::Protocol(format!(
                "{kind:?} command requires a non-empty payload"
            )));
        }
        Ok(Self {
            kind,
            data: data.map(String::from),
        })
    }

    pub fn lookup(ip: &str) -> Result<Self> {
        Self::new("lookup", Some(ip))
    }

    pub fn insert(prefix: &str) -> Result<Self> {
        Self::new("insert", Some(prefix))
    }

    pub fn quit() -> Self {
        Self {
            kind: CommandKind::Quit,
            data: None,
        }
    }

    /// Serialize to a single newline-terminated JSON line.
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// How a lookup ended on the dealiaser side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "no-match")]
    NoMatch,
    #[serde(rename = "unknown-error")]
    UnknownError,
}

/// Verdict payload inside a lookup result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasResult {
    pub aliased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl AliasResult {
    /// An IP counts as dealiased when the dealiaser saw no alias, or when it
    /// claimed an alias without naming the aliased prefix in `metadata`.
    pub fn is_dealiased(&self) -> bool {
        !self.aliased || self.metadata.is_none()
    }
}

/// One result line read back from the dealiaser, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub ip: String,
    pub status: LookupStatus,
    #[serde(default)]
    pub timestamp: String,
    pub result: AliasResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LookupResult {
    /// Parse a single JSON result line. Malformed input is fatal and
    /// propagated to the caller.
    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
