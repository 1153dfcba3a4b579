//! Parser for the trie statistics the dealiaser exports at fixed
//! IP-count checkpoints.
//!
//! One file per checkpoint, named `<prefix>-<N>.txt`. Each non-final line
//! describes one trie level as tab-separated `Key=Value` fields (`Prefix`,
//! `NumNodes`, `AvgChildren`, `MaxChildren`, `MaxValue`, and others we do
//! not consume); the final line is `TotalNodes=<count>`, possibly without a
//! trailing newline. Any missing or malformed file aborts the run.

use crate::config::PlotConfig;
use crate::error::{HarnessError, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Trie levels are keyed by prefix length, 0 through 128 in steps of four
/// (one level per nibble).
pub fn prefixes() -> impl Iterator<Item = u32> {
    (0..=128).step_by(4)
}

/// Stats for one trie level at one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    pub prefix: u32,
    pub num_nodes: u64,
    pub avg_children: f64,
    pub max_children: u64,
    pub max_value: u64,
}

/// All levels of one checkpoint, plus the whole-trie node count.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// IPs inserted when this checkpoint was taken
    pub label: u64,
    pub levels: BTreeMap<u32, LevelStats>,
    pub total_nodes: u64,
}

impl Checkpoint {
    pub fn level(&self, prefix: u32) -> Result<&LevelStats> {
        self.levels.get(&prefix).ok_or_else(|| {
            HarnessError::Checkpoint(format!(
                "checkpoint {} has no stats for prefix {prefix}",
                self.label
            ))
        })
    }
}

/// The full run: one checkpoint per step, in label order.
#[derive(Debug, Clone)]
pub struct CheckpointSeries {
    pub checkpoints: Vec<Checkpoint>,
}

impl CheckpointSeries {
    /// Read every checkpoint file named by `config`, in step order.
    pub fn load(config: &PlotConfig) -> Result<Self> {
        config.validate()?;
        let mut checkpoints = Vec::new();
        for label in config.labels() {
            let path = config.checkpoint_path(label);
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                HarnessError::Checkpoint(format!("cannot read {}: {e}", path.display()))
            })?;
            let checkpoint = parse_checkpoint(&contents, label).map_err(|e| {
                HarnessError::Checkpoint(format!("{}: {e}", path.display()))
            })?;
            debug!(
                "Loaded checkpoint {} ({} levels, {} nodes total)",
                label,
                checkpoint.levels.len(),
                checkpoint.total_nodes
            );
            checkpoints.push(checkpoint);
        }
        Ok(Self { checkpoints })
    }
}

/// Parse one checkpoint file. The last non-empty line carries the total;
/// every other line is a level record.
pub fn parse_checkpoint(contents: &str, label: u64) -> Result<Checkpoint> {
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let (total_line, level_lines) = lines.split_last().ok_or_else(|| {
        HarnessError::Checkpoint("empty checkpoint file".to_string())
    })?;

    let total_nodes = parse_field_u64(total_line, "TotalNodes")?;
    let mut levels = BTreeMap::new();
    for line in level_lines {
        let stats = parse_level_line(line)?;
        levels.insert(stats.prefix, stats);
    }
    Ok(Checkpoint {
        label,
        levels,
        total_nodes,
    })
}

fn parse_level_line(line: &str) -> Result<LevelStats> {
    let mut fields = HashMap::new();
    for field in line.trim().split('\t') {
        let (key, value) = field.split_once('=').ok_or_else(|| {
            HarnessError::Checkpoint(format!("malformed field: {field}"))
        })?;
        fields.insert(key, value);
    }
    Ok(LevelStats {
        prefix: lookup_f64(&fields, "Prefix")? as u32,
        num_nodes: lookup_f64(&fields, "NumNodes")? as u64,
        avg_children: lookup_f64(&fields, "AvgChildren")?,
        max_children: lookup_f64(&fields, "MaxChildren")? as u64,
        max_value: lookup_f64(&fields, "MaxValue")? as u64,
    })
}

/// The exporter prints counts in float notation; everything numeric is
/// parsed as f64 first.
fn lookup_f64(fields: &HashMap<&str, &str>, key: &str) -> Result<f64> {
    let value = fields.get(key).ok_or_else(|| {
        HarnessError::Checkpoint(format!("missing field {key}"))
    })?;
    value.parse::<f64>().map_err(|e| {
        HarnessError::Checkpoint(format!("bad value for {key}: {value}: {e}"))
    })
}

fn parse_field_u64(line: &str, key: &str) -> Result<u64> {
    let (found, value) = line.trim().split_once('=').ok_or_else(|| {
        HarnessError::Checkpoint(format!("malformed line: {line}"))
    })?;
    if found != key {
        return Err(HarnessError::Checkpoint(format!(
            "expected {key}, found {found}"
        )));
    }
    value.parse::<u64>().map_err(|e| {
        HarnessError::Checkpoint(format!("bad value for {key}: {value}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_file(levels: u32) -> String {
        let mut out = String::new();
        for i in 0..levels {
            out.push_str(&format!(
                "Prefix={}\tNumNodes={}.000000\tAvgChildren={}.500000\tMinChildren=1.000000\tMinValue=0001\tMaxChildren=16.000000\tMaxValue=1111\n",
                i * 4,
                (i + 1) * 10,
                i + 2,
            ));
        }
        // the exporter does not end the total line with a newline
        out.push_str("TotalNodes=420");
        out
    }

    #[test]
    fn parses_levels_and_total() {
        let checkpoint = parse_checkpoint(&sample_file(33), 1_000_000).unwrap();
        assert_eq!(checkpoint.total_nodes, 420);
        assert_eq!(checkpoint.levels.len(), 33);
        let level = checkpoint.level(8).unwrap();
        assert_eq!(level.num_nodes, 30);
        assert_eq!(level.avg_children, 4.5);
        assert_eq!(level.max_children, 16);
        assert_eq!(level.max_value, 1111);
    }

    #[test]
    fn prefix_axis_covers_0_to_128_step_4() {
        let all: Vec<u32> = prefixes().collect();
        assert_eq!(all.len(), 33);
        assert_eq!(all.first(), Some(&0));
        assert_eq!(all.last(), Some(&128));
        assert_eq!(all[1], 4);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let line = "Prefix=4\tNumNodes=2.0\tAvgChildren=1.0\tSomethingNew=9\tMaxChildren=3.0\tMaxValue=1\n\
                    TotalNodes=2";
        let checkpoint = parse_checkpoint(line, 1).unwrap();
        assert_eq!(checkpoint.level(4).unwrap().num_nodes, 2);
    }

    #[test]
    fn missing_required_field_fails() {
        let line = "Prefix=4\tAvgChildren=1.0\tMaxChildren=3.0\tMaxValue=1\nTotalNodes=2";
        assert!(parse_checkpoint(line, 1).is_err());
    }

    #[test]
    fn malformed_total_line_fails() {
        let mut contents = sample_file(2);
        contents.truncate(contents.len() - "TotalNodes=420".len());
        contents.push_str("Totals 420");
        assert!(parse_checkpoint(&contents, 1).is_err());
    }

    #[test]
    fn missing_prefix_is_an_error() {
        let checkpoint = parse_checkpoint(&sample_file(2), 1).unwrap();
        assert!(checkpoint.level(128).is_err());
    }

    #[test]
    fn loads_a_series_from_disk_and_aborts_on_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PlotConfig {
            stats_dir: dir.path().to_path_buf(),
            prefix: "run".into(),
            step_size: 1000,
            total: 2000,
            group_size: 24,
            figures_dir: PathBuf::from("."),
        };
        std::fs::write(dir.path().join("run-1000.txt"), sample_file(33)).unwrap();
        std::fs::write(dir.path().join("run-2000.txt"), sample_file(33)).unwrap();

        let series = CheckpointSeries::load(&config).unwrap();
        assert_eq!(series.checkpoints.len(), 2);
        assert_eq!(series.checkpoints[0].label, 1000);
        assert_eq!(series.checkpoints[1].label, 2000);

        std::fs::remove_file(dir.path().join("run-2000.txt")).unwrap();
        assert!(matches!(
            CheckpointSeries::load(&config),
            Err(HarnessError::Checkpoint(_))
        ));
    }
}
