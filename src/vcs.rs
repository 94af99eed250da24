//! Read-only queries against the local git repository.
//!
//! Nothing here fails the caller: when git is missing, the directory is not a repository, or
//! the repository has no commits, the answers degrade to [`UNKNOWN`] placeholders.

use std::{path::Path, process::Command};
use tracing::{debug, warn};

pub const UNKNOWN: &str = "unknown";

const SHORT_HASH_LEN: usize = 7;

/// Identity of the commit a build was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub date: String,
}

impl CommitInfo {
    /// All fields set to [`UNKNOWN`].
    pub fn unknown() -> Self {
        Self {
            hash: UNKNOWN.to_owned(),
            short_hash: UNKNOWN.to_owned(),
            author: UNKNOWN.to_owned(),
            date: UNKNOWN.to_owned(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.hash == UNKNOWN
    }
}

impl Default for CommitInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Runs git in `repo_dir`; `None` if it could not run, failed, or printed nothing.
fn git(repo_dir: &Path, args: &[&str]) -> Option<String> {
    let output = match Command::new("git").args(args).current_dir(repo_dir).output() {
        Ok(output) => output,
        Err(e) => {
            warn!("failed to run git: {e}");
            return None;
        }
    };

    if !output.status.success() {
        debug!(
            ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git exited unsuccessfully"
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    (!stdout.is_empty()).then_some(stdout)
}

/// Parses the output of `git log -1 --format=%H%n%h%n%an%n%cs`.
fn parse_log(output: &str) -> Option<CommitInfo> {
    let mut lines = output.lines().map(str::trim);
    let hash = lines.next().filter(|h| !h.is_empty())?.to_owned();
    let short_hash = lines
        .next()
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| hash.chars().take(SHORT_HASH_LEN).collect());
    let author = lines.next().filter(|a| !a.is_empty()).unwrap_or(UNKNOWN).to_owned();
    let date = lines.next().filter(|d| !d.is_empty()).unwrap_or(UNKNOWN).to_owned();
    Some(CommitInfo {
        hash,
        short_hash,
        author,
        date,
    })
}

/// The `HEAD` commit of the repository at `repo_dir`, or [`CommitInfo::unknown`].
pub fn head_commit(repo_dir: &Path) -> CommitInfo {
    git(repo_dir, &["log", "-1", "--format=%H%n%h%n%an%n%cs"])
        .as_deref()
        .and_then(parse_log)
        .unwrap_or_else(|| {
            warn!(repo = %repo_dir.display(), "commit information unavailable");
            CommitInfo::unknown()
        })
}

/// The checked-out branch, or `None` when detached or unavailable.
pub fn current_branch(repo_dir: &Path) -> Option<String> {
    git(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
}
