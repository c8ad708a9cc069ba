//! Version-control probe. Every query is best effort: a project outside
//! version control, a missing `git` binary or a failing command all yield
//! `None`, never an error.

use camino::Utf8Path;
use std::path::PathBuf;
use std::process::Command;

pub trait Vcs: Send + Sync {
    /// Current head revision of `project`.
    fn head_revision(&self, project: &Utf8Path) -> Option<String>;

    /// Current branch name of `project`.
    fn current_branch(&self, project: &Utf8Path) -> Option<String>;

    /// Number of files changed between `start` and `end`, or in the single
    /// commit `end` when there is no start revision.
    fn changed_files(&self, project: &Utf8Path, start: Option<&str>, end: &str) -> Option<u64>;
}

/// `git` located on `PATH`, invoked argv-style.
#[derive(Debug, Clone)]
pub struct GitVcs {
    git: Option<PathBuf>,
}

impl GitVcs {
    /// Locate `git` on `PATH`. Without it every query returns `None`.
    #[must_use]
    pub fn discover() -> Self {
        let git = which::which("git").ok();
        if git.is_none() {
            tracing::debug!("git not found on PATH; commits and diffs will be empty");
        }
        Self { git }
    }

    fn run(&self, project: &Utf8Path, args: &[&str]) -> Option<String> {
        let git = self.git.as_ref()?;
        let output = Command::new(git)
            .arg("-C")
            .arg(project.as_std_path())
            .args(args)
            .output()
            .ok()?;
        if !output.status.success() {
            tracing::debug!(
                project = %project,
                args = ?args,
                status = ?output.status.code(),
                "git command failed"
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn count_lines(text: &str) -> u64 {
    text.lines().filter(|l| !l.trim().is_empty()).count() as u64
}

impl Vcs for GitVcs {
    fn head_revision(&self, project: &Utf8Path) -> Option<String> {
        self.run(project, &["rev-parse", "HEAD"]).filter(|s| !s.is_empty())
    }

    fn current_branch(&self, project: &Utf8Path) -> Option<String> {
        self.run(project, &["rev-parse", "--abbrev-ref", "HEAD"])
            .filter(|s| !s.is_empty())
    }

    fn changed_files(&self, project: &Utf8Path, start: Option<&str>, end: &str) -> Option<u64> {
        if end.is_empty() {
            return None;
        }
        let out = match start.filter(|s| !s.is_empty()) {
            Some(start) => self.run(project, &["diff", "--name-only", start, end])?,
            None => self.run(project, &["show", "--name-only", "--format=", end])?,
        };
        Some(count_lines(&out))
    }
}

/// Probe for projects known not to be under version control.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcs;

impl Vcs for NoVcs {
    fn head_revision(&self, _project: &Utf8Path) -> Option<String> {
        None
    }

    fn current_branch(&self, _project: &Utf8Path) -> Option<String> {
        None
    }

    fn changed_files(&self, _project: &Utf8Path, _start: Option<&str>, _end: &str) -> Option<u64> {
        None
    }
}

/// Fixed answers, for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticVcs {
    pub head: Option<String>,
    pub branch: Option<String>,
    pub changed: Option<u64>,
}

impl Vcs for StaticVcs {
    fn head_revision(&self, _project: &Utf8Path) -> Option<String> {
        self.head.clone()
    }

    fn current_branch(&self, _project: &Utf8Path) -> Option<String> {
        self.branch.clone()
    }

    fn changed_files(&self, _project: &Utf8Path, _start: Option<&str>, end: &str) -> Option<u64> {
        if end.is_empty() { None } else { self.changed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::utf8_path;
    use tempfile::TempDir;

    #[test]
    fn test_count_lines_skips_blanks() {
        assert_eq!(count_lines("a.rs\n\nb.rs\n"), 2);
        assert_eq!(count_lines(""), 0);
    }

    #[test]
    fn test_git_outside_repository_yields_none() {
        let td = TempDir::new().unwrap();
        let vcs = GitVcs::discover();
        assert!(vcs.head_revision(&utf8_path(&td)).is_none());
        assert!(vcs.changed_files(&utf8_path(&td), None, "").is_none());
    }

    #[test]
    fn test_static_vcs_needs_end_revision() {
        let vcs = StaticVcs {
            head: Some("abc".into()),
            branch: Some("main".into()),
            changed: Some(3),
        };
        let p = Utf8Path::new("/p");
        assert_eq!(vcs.changed_files(p, Some("aaa"), "abc"), Some(3));
        assert_eq!(vcs.changed_files(p, Some("aaa"), ""), None);
        assert_eq!(NoVcs.head_revision(p), None);
    }
}
