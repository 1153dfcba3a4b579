mod bridge;
mod checkpoints;
mod cli;
mod config;
mod dealiaser;
mod driver;
mod error;
mod figures;
mod monitor;
mod protocol;

use clap::Parser;
use cli::{Cli, Commands};
use config::{BridgeConfig, DealiaserConfig, DriverConfig, HarnessConfig, PlotConfig};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dealias_harness=debug,info"
    } else {
        "dealias_harness=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> error::Result<()> {
    let verbose = cli.verbose;
    match cli.command {
        Commands::Run {
            input,
            output,
            binary,
            aliases,
            meta_file,
            log_file,
            batch_size,
            quit,
            config,
        } => {
            let config = match config {
                Some(path) => {
                    let mut config = HarnessConfig::from_file(&path)?;
                    config.verbose |= verbose;
                    config
                }
                None => HarnessConfig {
                    dealiaser: DealiaserConfig {
                        binary,
                        aliases_file: aliases,
                        output_file: None,
                        meta_file,
                        log_file,
                        // results are drained in lockstep with the command
                        // stream, so the dealiaser must not buffer them
                        flush: true,
                    },
                    bridge: BridgeConfig::default(),
                    driver: DriverConfig {
                        batch_size,
                        send_quit: quit,
                    },
                    verbose,
                },
            };
            driver::run_pipe(&config, &input, &output).await
        }

        Commands::Bridge {
            binary,
            aliases,
            dealiaser_output,
            meta_file,
            log_file,
            host,
            command_port,
            results_port,
            config,
        } => {
            let config = match config {
                Some(path) => {
                    let mut config = HarnessConfig::from_file(&path)?;
                    config.verbose |= verbose;
                    config
                }
                None => HarnessConfig {
                    dealiaser: DealiaserConfig {
                        binary,
                        aliases_file: aliases,
                        output_file: dealiaser_output,
                        meta_file,
                        log_file,
                        flush: false,
                    },
                    bridge: BridgeConfig {
                        host,
                        command_port,
                        results_port,
                    },
                    driver: DriverConfig::default(),
                    verbose,
                },
            };
            bridge::run_bridge(&config).await
        }

        Commands::Feed {
            input,
            results_file,
            host,
            command_port,
            results_port,
        } => {
            let config = HarnessConfig {
                bridge: BridgeConfig {
                    host,
                    command_port,
                    results_port,
                },
                verbose,
                ..Default::default()
            };
            bridge::run_feed(&config, &input, &results_file).await
        }

        Commands::Plot {
            stats_dir,
            prefix,
            step_size,
            total,
            group_size,
            figures_dir,
        } => {
            let plot = PlotConfig {
                stats_dir,
                prefix,
                step_size,
                total,
                group_size,
                figures_dir,
            };
            figures::render_all(&plot, verbose).map(|_| ())
        }
    }
}
