use agentrace_utils::error::Result;
use agentrace_utils::jsonl::{append_json_lines, read_json_lines};
use agentrace_utils::types::HistoryRow;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;

/// Append-only `metrics-history.jsonl`. Rows are never rewritten; order is
/// append order.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: Utf8PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn append(&self, rows: &[HistoryRow]) -> Result<()> {
        append_json_lines(&self.path, rows)
    }

    /// Every row; a missing log is empty.
    pub fn read_all(&self) -> Result<Vec<HistoryRow>> {
        read_json_lines(&self.path)
    }

    /// Rows for one signal, in append order.
    pub fn series(&self, agent_type: &str, artifact: &str) -> Result<Vec<HistoryRow>> {
        Ok(select(self.read_all()?, agent_type, artifact))
    }

    /// Distinct `(agent_type, artifact)` keys present in the log.
    pub fn keys(&self) -> Result<BTreeSet<(String, String)>> {
        Ok(self
            .read_all()?
            .into_iter()
            .map(|r| (r.agent_type, r.artifact))
            .collect())
    }
}

/// Filter already-loaded rows down to one signal.
#[must_use]
pub fn select(rows: Vec<HistoryRow>, agent_type: &str, artifact: &str) -> Vec<HistoryRow> {
    rows.into_iter()
        .filter(|r| r.agent_type == agent_type && r.artifact == artifact)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{base_time, history_series, utf8_path};
    use tempfile::TempDir;

    #[test]
    fn test_append_then_series() {
        let td = TempDir::new().unwrap();
        let log = HistoryLog::new(utf8_path(&td).join("obs/metrics-history.jsonl"));

        log.append(&history_series("implementer", "summary.md", base_time(), &[Some(0.5), None]))
            .unwrap();
        log.append(&history_series("tester", "summary.md", base_time(), &[Some(0.9)]))
            .unwrap();
        log.append(&history_series("implementer", "summary.md", base_time(), &[Some(0.7)]))
            .unwrap();

        let series = log.series("implementer", "summary.md").unwrap();
        let rates: Vec<_> = series.iter().map(|r| r.rate).collect();
        assert_eq!(rates, [Some(0.5), None, Some(0.7)]);
        assert_eq!(log.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let td = TempDir::new().unwrap();
        let log = HistoryLog::new(utf8_path(&td).join("metrics-history.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.keys().unwrap().is_empty());
    }
}
