//! Batch driver: streams lookup commands to the dealiaser and drains results
//! in fixed-size batches.
//!
//! The drain step is a hard synchronization barrier. After every
//! `batch_size` commands the stream is flushed and exactly `batch_size`
//! result lines are read back before more commands are written, so at most
//! one batch of commands is ever in flight.

use crate::config::{DriverConfig, HarnessConfig};
use crate::dealiaser::Dealiaser;
use crate::error::{HarnessError, Result};
use crate::monitor::ProgressMonitor;
use crate::protocol::{Command, LookupResult};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, info};

/// Outcome of a drive session.
#[derive(Debug)]
pub struct DriveReport {
    /// Lookup commands submitted
    pub submitted: u64,
    /// Full batch drains performed before the final partial drain
    pub full_batches: u64,
    /// IPs classified as dealiased, in first-classification order
    pub dealiased: Vec<String>,
}

pub struct BatchDriver<'a> {
    config: &'a DriverConfig,
}

impl<'a> BatchDriver<'a> {
    pub fn new(config: &'a DriverConfig) -> Self {
        Self { config }
    }

    /// Stream one lookup command per input line, draining `batch_size`
    /// results after every `batch_size` commands, then the remainder at end
    /// of input. The command writer is dropped on return, which closes the
    /// stream for pipe and socket transports alike.
    pub async fn drive<I, W, R>(
        &self,
        input: I,
        mut commands: W,
        results: R,
    ) -> Result<DriveReport>
    where
        I: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        let batch_size = self.config.batch_size.max(1) as u64;
        let mut input_lines = input.lines();
        let mut result_lines = results.lines();
        let mut monitor = ProgressMonitor::new();
        let mut report = DriveReport {
            submitted: 0,
            full_batches: 0,
            dealiased: Vec::new(),
        };

        while let Some(line) = input_lines.next_line().await? {
            let target = line.trim();
            if target.is_empty() {
                continue;
            }
            let command = Command::lookup(target)?;
            commands.write_all(command.encode()?.as_bytes()).await?;
            report.submitted += 1;

            if report.submitted % batch_size == 0 {
                commands.flush().await?;
                drain(&mut result_lines, batch_size, &mut monitor, &mut report).await?;
                report.full_batches += 1;
                debug!("Drained batch {}", report.full_batches);
            }
            monitor.maybe_report();
        }
        info!("No more input is coming: {}", Utc::now().to_rfc3339());

        if self.config.send_quit {
            commands.write_all(Command::quit().encode()?.as_bytes()).await?;
        }
        commands.flush().await?;

        let remainder = report.submitted % batch_size;
        if remainder > 0 {
            drain(&mut result_lines, remainder, &mut monitor, &mut report).await?;
        }
        commands.shutdown().await?;
        monitor.summarize();
        Ok(report)
    }
}

/// Read exactly `count` result lines, classifying each as it arrives.
async fn drain<R>(
    result_lines: &mut Lines<R>,
    count: u64,
    monitor: &mut ProgressMonitor,
    report: &mut DriveReport,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    for read in 0..count {
        let line = result_lines.next_line().await?.ok_or_else(|| {
            HarnessError::Protocol(format!(
                "result stream closed after {read} of {count} expected results"
            ))
        })?;
        let result = LookupResult::decode(&line)?;
        monitor.record(result.status);
        if result.result.is_dealiased() {
            report.dealiased.push(result.ip);
        }
    }
    Ok(())
}

/// Pipe-mode session: spawn the dealiaser with piped stdio, drive it from an
/// input file, and write the dealiased set to `output_path`.
pub async fn run_pipe(
    config: &HarnessConfig,
    input_path: &Path,
    output_path: &Path,
) -> Result<()> {
    let dealiaser = Dealiaser::new(config.dealiaser.clone());
    let mut child = dealiaser.spawn_piped()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| HarnessError::Spawn("dealiaser stdin was not piped".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HarnessError::Spawn("dealiaser stdout was not piped".into()))?;

    let spinner = if !config.verbose {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| HarnessError::Config(e.to_string()))?,
        );
        pb.set_message("Feeding the dealiaser...");
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        Some(pb)
    } else {
        None
    };

    let input = BufReader::new(File::open(input_path).await?);
    let results = BufReader::new(stdout);
    let driver = BatchDriver::new(&config.driver);
    let report = driver.drive(input, stdin, results).await?;

    if let Some(pb) = spinner {
        pb.finish_with_message(format!(
            "{} lookups done, {} dealiased",
            report.submitted,
            report.dealiased.len()
        ));
    }

    write_dealiased(output_path, &report.dealiased).await?;
    info!(
        "Wrote {} dealiased IPs to {}",
        report.dealiased.len(),
        output_path.display()
    );

    Dealiaser::wait(child).await
}

/// Write the dealiased set, one IP per line.
pub async fn write_dealiased(path: &Path, dealiased: &[String]) -> Result<()> {
    let mut out = File::create(path).await?;
    for ip in dealiased {
        out.write_all(ip.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AliasResult, LookupStatus};
    use tokio::io::AsyncReadExt;

    /// Answer every incoming command line with a canned result, echoing the
    /// looked-up IP back. IPs ending in an even hex digit are reported as
    /// aliased with metadata.
    async fn respond<R, W>(commands: R, mut results: W)
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = commands.lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            let command: Command = serde_json::from_str(&line).unwrap();
            let ip = match command.kind {
                crate::protocol::CommandKind::Lookup => command.data.unwrap(),
                _ => break,
            };
            let aliased = ip
                .chars()
                .last()
                .and_then(|c| c.to_digit(16))
                .is_some_and(|d| d % 2 == 0);
            let result = LookupResult {
                ip,
                status: if aliased {
                    LookupStatus::Success
                } else {
                    LookupStatus::NoMatch
                },
                timestamp: "2024-03-01T10:00:00Z".to_string(),
                result: AliasResult {
                    aliased,
                    metadata: aliased.then(|| "2001:db8::/32".to_string()),
                },
                error: None,
            };
            let mut line = serde_json::to_string(&result).unwrap();
            line.push('\n');
            results.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn input_of(count: usize) -> String {
        (0..count)
            .map(|i| format!("2001:db8::{:x}\n", i + 1))
            .collect()
    }

    #[tokio::test]
    async fn drains_2500_commands_in_two_batches_and_a_final_500() {
        let (command_rx, command_tx) = tokio::io::duplex(1 << 20);
        let (result_rx, result_tx) = tokio::io::duplex(1 << 20);
        let responder = tokio::spawn(respond(
            BufReader::new(command_rx),
            result_tx,
        ));

        let config = DriverConfig {
            batch_size: 1000,
            send_quit: false,
        };
        let driver = BatchDriver::new(&config);
        let input = std::io::Cursor::new(input_of(2500));
        let report = driver
            .drive(BufReader::new(input), command_tx, BufReader::new(result_rx))
            .await
            .unwrap();

        assert_eq!(report.submitted, 2500);
        assert_eq!(report.full_batches, 2);
        // every submitted command produced exactly one consumed result;
        // the responder dealiases roughly half of them
        assert!(!report.dealiased.is_empty());
        assert!(report.dealiased.len() < 2500);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn classification_follows_the_metadata_rule() {
        let (command_rx, command_tx) = tokio::io::duplex(1 << 16);
        let (result_rx, mut result_tx) = tokio::io::duplex(1 << 16);

        // hand-written results for three IPs: not aliased, aliased with
        // metadata, aliased without metadata
        let canned = concat!(
            r#"{"ip":"2001:db8::1","status":"no-match","timestamp":"t","result":{"aliased":false}}"#,
            "\n",
            r#"{"ip":"2001:db8::2","status":"success","timestamp":"t","result":{"aliased":true,"metadata":"2001:db8::/32"}}"#,
            "\n",
            r#"{"ip":"2001:db8::3","status":"success","timestamp":"t","result":{"aliased":true}}"#,
            "\n",
        );
        let sink = tokio::spawn(async move {
            // consume the command stream so writes never block
            let mut drain = Vec::new();
            BufReader::new(command_rx).read_to_end(&mut drain).await.unwrap();
        });
        result_tx.write_all(canned.as_bytes()).await.unwrap();
        drop(result_tx);

        let config = DriverConfig {
            batch_size: 1000,
            send_quit: false,
        };
        let driver = BatchDriver::new(&config);
        let input = std::io::Cursor::new("2001:db8::1\n2001:db8::2\n2001:db8::3\n");
        let report = driver
            .drive(BufReader::new(input), command_tx, BufReader::new(result_rx))
            .await
            .unwrap();

        assert_eq!(report.submitted, 3);
        assert_eq!(report.full_batches, 0);
        assert_eq!(report.dealiased, vec!["2001:db8::1", "2001:db8::3"]);
        sink.await.unwrap();
    }

    #[tokio::test]
    async fn early_result_stream_close_is_a_protocol_error() {
        let (command_rx, command_tx) = tokio::io::duplex(1 << 16);
        let (result_rx, result_tx) = tokio::io::duplex(1 << 16);
        drop(result_tx); // no results will ever arrive
        let sink = tokio::spawn(async move {
            let mut drain = Vec::new();
            BufReader::new(command_rx).read_to_end(&mut drain).await.unwrap();
        });

        let config = DriverConfig {
            batch_size: 2,
            send_quit: false,
        };
        let driver = BatchDriver::new(&config);
        let input = std::io::Cursor::new("2001:db8::1\n2001:db8::2\n");
        let err = driver
            .drive(BufReader::new(input), command_tx, BufReader::new(result_rx))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Protocol(_)));
        sink.await.unwrap();
    }

    #[tokio::test]
    async fn quit_command_terminates_the_stream() {
        let (command_rx, command_tx) = tokio::io::duplex(1 << 16);
        let (result_rx, result_tx) = tokio::io::duplex(1 << 16);
        let responder = tokio::spawn(respond(
            BufReader::new(command_rx),
            result_tx,
        ));

        let config = DriverConfig {
            batch_size: 1000,
            send_quit: true,
        };
        let driver = BatchDriver::new(&config);
        let input = std::io::Cursor::new(input_of(3));
        let report = driver
            .drive(BufReader::new(input), command_tx, BufReader::new(result_rx))
            .await
            .unwrap();
        assert_eq!(report.submitted, 3);
        // responder exits on the quit command
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn blank_input_lines_are_skipped() {
        let (command_rx, command_tx) = tokio::io::duplex(1 << 16);
        let (result_rx, result_tx) = tokio::io::duplex(1 << 16);
        let responder = tokio::spawn(respond(
            BufReader::new(command_rx),
            result_tx,
        ));

        let config = DriverConfig::default();
        let driver = BatchDriver::new(&config);
        let input = std::io::Cursor::new("2001:db8::1\n\n   \n2001:db8::2\n");
        let report = driver
            .drive(BufReader::new(input), command_tx, BufReader::new(result_rx))
            .await
            .unwrap();
        assert_eq!(report.submitted, 2);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn writes_dealiased_set_one_per_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dealiased.txt");
        let ips = vec!["2001:db8::1".to_string(), "2001:db8::3".to_string()];
        write_dealiased(&path, &ips).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "2001:db8::1\n2001:db8::3\n");
    }
}
