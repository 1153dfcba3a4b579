use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dealias-harness")]
#[command(about = "Measurement harness for the aliasv6 IPv6 dealiaser", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the dealiaser over subprocess pipes: feed lookup commands from a
    /// file, drain results in fixed batches, collect the dealiased IPs
    Run {
        /// File of newline-delimited IPv6 addresses to look up
        #[arg(short, long)]
        input: PathBuf,

        /// File the dealiased IPs are written to
        #[arg(short, long)]
        output: PathBuf,

        /// Dealiaser binary name or path
        #[arg(short, long, default_value = "aliasv6")]
        binary: String,

        /// Sorted aliased-prefix list the dealiaser constructs its trie from
        #[arg(short = 'c', long)]
        aliases: PathBuf,

        /// Metadata file handed to the dealiaser (-m)
        #[arg(short, long)]
        meta_file: Option<PathBuf>,

        /// Log file handed to the dealiaser (-l)
        #[arg(short, long)]
        log_file: Option<PathBuf>,

        /// Commands in flight before a synchronous drain
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// Send a terminal quit command at end of input
        #[arg(long)]
        quit: bool,

        /// Load the full harness configuration from a JSON file instead
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Host the dealiaser between two TCP sockets: accept the command stream
    /// on one port and forward the dealiaser's output to the peer's results
    /// port
    Bridge {
        /// Dealiaser binary name or path
        #[arg(short, long, default_value = "aliasv6")]
        binary: String,

        /// Sorted aliased-prefix list the dealiaser constructs its trie from
        #[arg(short = 'c', long)]
        aliases: PathBuf,

        /// File the dealiaser writes its own results copy to (-o)
        #[arg(short = 'o', long)]
        dealiaser_output: Option<PathBuf>,

        /// Metadata file handed to the dealiaser (-m)
        #[arg(short, long)]
        meta_file: Option<PathBuf>,

        /// Log file handed to the dealiaser (-l)
        #[arg(short, long)]
        log_file: Option<PathBuf>,

        /// Host to bind/connect on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to accept the command stream on
        #[arg(long, default_value_t = 6001)]
        command_port: u16,

        /// Peer port the dealiaser output is forwarded to
        #[arg(long, default_value_t = 6002)]
        results_port: u16,

        /// Load the full harness configuration from a JSON file instead
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Connect to a bridge, tee the result stream to a file in the
    /// background, and stream lookup commands from an input file
    Feed {
        /// File of newline-delimited IPv6 addresses to look up
        #[arg(short, long)]
        input: PathBuf,

        /// File the teed result stream is written to
        #[arg(short, long, default_value = "dealiasing_results")]
        results_file: PathBuf,

        /// Host the bridge runs on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bridge command port
        #[arg(long, default_value_t = 6001)]
        command_port: u16,

        /// Local port the result stream is received on
        #[arg(long, default_value_t = 6002)]
        results_port: u16,
    },

    /// Parse checkpoint trie statistics and render them as PNG line charts
    Plot {
        /// Directory holding the checkpoint stats files
        #[arg(short, long)]
        stats_dir: PathBuf,

        /// Checkpoint file name prefix; files are named `<prefix>-<N>.txt`
        #[arg(short, long)]
        prefix: String,

        /// IP-count interval between checkpoints
        #[arg(long, default_value_t = 1_000_000)]
        step_size: u64,

        /// Total number of IPs inserted across the run
        #[arg(short, long)]
        total: u64,

        /// Checkpoints per rendered figure
        #[arg(long, default_value_t = 24)]
        group_size: usize,

        /// Directory the PNGs are written to
        #[arg(short, long, default_value = ".")]
        figures_dir: PathBuf,
    },
}
