use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level harness configuration, assembled from CLI flags or loaded from
/// a JSON file. Every component receives the piece it needs by reference;
/// there is no global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// External dealiaser invocation
    pub dealiaser: DealiaserConfig,

    /// TCP bridge endpoints
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Batch driver behavior
    #[serde(default)]
    pub driver: DriverConfig,

    /// Show verbose output instead of spinners
    #[serde(default)]
    pub verbose: bool,
}

impl HarnessConfig {
    /// Load a full configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Command line of the external `aliasv6` binary:
/// `aliasv6 [--flush] -c <aliases> [-o <out>] [-m <meta>] [-l <log>]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealiaserConfig {
    /// Binary name or path; resolved on PATH when not absolute
    pub binary: String,

    /// Sorted aliased-prefix list the dealiaser builds its trie from
    pub aliases_file: PathBuf,

    /// Where the dealiaser writes its own copy of the results
    #[serde(default)]
    pub output_file: Option<PathBuf>,

    /// Metadata file
    #[serde(default)]
    pub meta_file: Option<PathBuf>,

    /// Log file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Flush after each output line (needed when results are drained in
    /// lockstep with the command stream)
    #[serde(default)]
    pub flush: bool,
}

impl Default for DealiaserConfig {
    fn default() -> Self {
        Self {
            binary: "aliasv6".to_string(),
            aliases_file: PathBuf::new(),
            output_file: None,
            meta_file: None,
            log_file: None,
            flush: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host both bridge sockets live on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the sender side listens on for the command stream
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Port the feeder side listens on for the teed result stream
    #[serde(default = "default_results_port")]
    pub results_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_command_port() -> u16 {
    6001
}

fn default_results_port() -> u16 {
    6002
}

impl BridgeConfig {
    pub fn command_addr(&self) -> String {
        format!("{}:{}", self.host, self.command_port)
    }

    pub fn results_addr(&self) -> String {
        format!("{}:{}", self.host, self.results_port)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            command_port: default_command_port(),
            results_port: default_results_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Commands in flight before a synchronous drain
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Send a terminal quit command at end of input instead of just closing
    /// the stream
    #[serde(default)]
    pub send_quit: bool,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            send_quit: false,
        }
    }
}

/// Checkpoint plotting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Directory holding the checkpoint stats files
    pub stats_dir: PathBuf,

    /// File name prefix; files are named `<prefix>-<N>.txt`
    pub prefix: String,

    /// IP-count interval between checkpoints
    #[serde(default = "default_step_size")]
    pub step_size: u64,

    /// Total number of IPs inserted across the run
    pub total: u64,

    /// Checkpoints per rendered figure
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Directory PNGs are written to
    #[serde(default = "default_figures_dir")]
    pub figures_dir: PathBuf,
}

fn default_step_size() -> u64 {
    1_000_000
}

fn default_group_size() -> usize {
    24
}

fn default_figures_dir() -> PathBuf {
    PathBuf::from(".")
}

impl PlotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_size == 0 {
            return Err(HarnessError::Config("step size must be non-zero".into()));
        }
        if self.total < self.step_size {
            return Err(HarnessError::Config(format!(
                "total ({}) is smaller than the step size ({})",
                self.total, self.step_size
            )));
        }
        if self.group_size == 0 {
            return Err(HarnessError::Config("group size must be non-zero".into()));
        }
        Ok(())
    }

    /// Checkpoint labels in file order: step, 2*step, .., total.
    pub fn labels(&self) -> Vec<u64> {
        (1..=self.total / self.step_size)
            .map(|i| i * self.step_size)
            .collect()
    }

    pub fn checkpoint_path(&self, label: u64) -> PathBuf {
        self.stats_dir.join(format!("{}-{}.txt", self.prefix, label))
    }
}
