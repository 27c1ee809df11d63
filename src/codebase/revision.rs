//! Revision resolution
//!
//! Derives commit, branch, tag and remote identity from git state with CI
//! webhook fallbacks. Each of the five git queries is tolerated failing
//! individually; only the total absence of remote, branch and tag is fatal.

use crate::env::EnvSource;
use crate::exec::CommandRunner;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// CI webhook trigger of the form `branch/<name>` or `tag/<name>`
pub const WEBHOOK_TRIGGER_VAR: &str = "CODEBUILD_WEBHOOK_TRIGGER";

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("codebase has no .git directory")]
    NoVcsData,

    #[error("revision has no remote, branch or tag")]
    MissingData,

    #[error("cannot determine repository name from remote {0:?}")]
    UnparseableRemote(Option<String>),
}

/// Resolved revision identity, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub remote: Option<String>,
    pub commit: Option<String>,
    pub long_commit: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
}

fn remote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([^:/.]+/[^:/.]+)(?:\.git)?$").expect("remote pattern is valid")
    })
}

impl Revision {
    /// Constructs a revision, requiring at least one identity signal
    pub fn new(
        remote: Option<String>,
        commit: Option<String>,
        long_commit: Option<String>,
        tag: Option<String>,
        branch: Option<String>,
    ) -> Result<Self, RevisionError> {
        if remote.is_none() && branch.is_none() && tag.is_none() {
            return Err(RevisionError::MissingData);
        }
        Ok(Self {
            remote,
            commit,
            long_commit,
            branch,
            tag,
        })
    }

    /// Extracts `owner/repo` from the remote URL (SSH or HTTPS form)
    pub fn repository_name(&self) -> Result<String, RevisionError> {
        let remote = self
            .remote
            .as_deref()
            .ok_or_else(|| RevisionError::UnparseableRemote(None))?;

        remote_pattern()
            .captures(remote)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().to_string())
            .ok_or_else(|| RevisionError::UnparseableRemote(self.remote.clone()))
    }

    pub fn repository_url(&self) -> Result<String, RevisionError> {
        Ok(format!("https://github.com/{}", self.repository_name()?))
    }

    /// Image tags in canonical order
    ///
    /// `commit-{commit}` first, then `tag-{tag}` and `tag-latest` when a tag
    /// is present, then `branch-{branch}` with slashes replaced by dashes.
    pub fn docker_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(commit) = &self.commit {
            tags.push(format!("commit-{}", commit));
        }

        if let Some(tag) = &self.tag {
            tags.push(format!("tag-{}", tag));
            tags.push("tag-latest".to_string());
        }

        if let Some(branch) = &self.branch {
            tags.push(format!("branch-{}", branch.replace('/', "-")));
        }

        tags
    }
}

/// Resolves the revision from live git state
///
/// Ref matching takes the first ref line whose hash matches the long commit,
/// in the order `git show-ref` returns them. When ref inspection finds no
/// branch or tag, the CI webhook trigger string is consulted.
pub fn load_revision(
    path: &Path,
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
) -> Result<Revision, RevisionError> {
    if !path.join(".git").exists() {
        return Err(RevisionError::NoVcsData);
    }

    let commit = query(runner, "git rev-parse --short HEAD");
    let long_commit = query(runner, "git rev-parse HEAD");

    let mut branch = long_commit
        .as_deref()
        .and_then(|hash| matching_ref(runner, "git show-ref --heads", hash, "refs/heads/"));
    if branch.is_none() {
        branch = webhook_fallback(env, "branch/");
    }

    let mut tag = long_commit
        .as_deref()
        .and_then(|hash| matching_ref(runner, "git show-ref --tags", hash, "refs/tags/"));
    if tag.is_none() {
        tag = webhook_fallback(env, "tag/");
    }

    let remote = query(runner, "git ls-remote --get-url origin");

    Revision::new(remote, commit, long_commit, tag, branch)
}

fn query(runner: &dyn CommandRunner, command: &str) -> Option<String> {
    match runner.run(command) {
        Ok(output) if output.success() => {
            let value = output.stdout.trim().to_string();
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }
        _ => None,
    }
}

fn matching_ref(
    runner: &dyn CommandRunner,
    command: &str,
    long_commit: &str,
    ref_prefix: &str,
) -> Option<String> {
    let refs = query(runner, command)?;

    for line in refs.lines() {
        let line = line.trim();
        if !line.starts_with(long_commit) {
            continue;
        }
        if let Some(reference) = line.split_whitespace().nth(1) {
            return Some(
                reference
                    .strip_prefix(ref_prefix)
                    .unwrap_or(reference)
                    .to_string(),
            );
        }
    }

    None
}

fn webhook_fallback(env: &dyn EnvSource, kind_prefix: &str) -> Option<String> {
    env.get(WEBHOOK_TRIGGER_VAR)
        .and_then(|trigger| trigger.strip_prefix(kind_prefix).map(str::to_string))
}
