//! The checked-out repository the bot patches
//!
//! `git apply` and `git push` shell out so their output lands in the job log
//! verbatim. Staging and committing go through git2.

use super::apply::{
    ApplyStrategy, AttemptReport, CommitOutcome, ConflictArtifact, PatchWorkspace, PushStatus,
};
use crate::util::{resolve_repo_path, run_command_with_timeout, CommandRunResult};
use anyhow::{Context, Result};
use git2::{Commit, IndexAddOption, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use walkdir::WalkDir;

pub const BOT_NAME: &str = "chat-fix-bot";
pub const BOT_EMAIL: &str = "actions@github.com";
pub const COMMIT_MESSAGE: &str = "chore: apply chat-fix patch";

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const PUSH_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_REJECT_FILES: usize = 10;

/// Read-only view of the pull request's source.
pub trait SourceTree {
    fn unified_diff(&self, base: &str, head: &str) -> Result<String>;

    /// Paths touched between `base` and `head`, repository-relative.
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>>;

    fn read_file(&self, path: &str) -> Option<String>;
}

pub struct GitWorkspace {
    root: PathBuf,
    patch_path: PathBuf,
    push_enabled: bool,
}

impl GitWorkspace {
    pub fn open(root: &Path, push_enabled: bool) -> Result<Self> {
        Repository::open(root)
            .with_context(|| format!("Not a git repository: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            patch_path: std::env::temp_dir().join("chat_fix.diff"),
            push_enabled,
        })
    }

    pub fn with_patch_path(mut self, path: PathBuf) -> Self {
        self.patch_path = path;
        self
    }

    fn git(&self, args: &[&str], timeout: Duration) -> Result<CommandRunResult> {
        tracing::info!("$ git {}", args.join(" "));
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.root)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_command_with_timeout(&mut cmd, timeout).map_err(|e| anyhow::anyhow!(e))
    }

    fn write_patch(&self, patch: &str) -> Result<String> {
        fs::write(&self.patch_path, patch)
            .with_context(|| format!("Failed to write {}", self.patch_path.display()))?;
        Ok(self.patch_path.to_string_lossy().into_owned())
    }

    fn reject_files(&self) -> Vec<ConflictArtifact> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "rej"))
            .take(MAX_REJECT_FILES)
            .filter_map(|e| {
                let bytes = fs::read(e.path()).ok()?;
                let path = e.path().strip_prefix(&self.root).unwrap_or(e.path());
                Some(ConflictArtifact {
                    path: path.display().to_string(),
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                })
            })
            .collect()
    }

    fn unmerged_files(&self) -> Vec<ConflictArtifact> {
        let listing = match self.git(&["diff", "--name-only", "--diff-filter=U"], GIT_TIMEOUT) {
            Ok(result) if result.success() => result.stdout,
            _ => return Vec::new(),
        };
        listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|path| {
                Some(ConflictArtifact {
                    path: path.to_string(),
                    content: self.read_file(path)?,
                })
            })
            .collect()
    }
}

impl SourceTree for GitWorkspace {
    fn unified_diff(&self, base: &str, head: &str) -> Result<String> {
        let range = format!("{}..{}", base, head);
        let result = self.git(&["diff", "--unified", range.as_str()], GIT_TIMEOUT)?;
        if !result.success() {
            tracing::warn!("{}", result.diagnostic_output().trim_end());
        }
        Ok(result.stdout)
    }

    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let range = format!("{}..{}", base, head);
        let result = self.git(&["diff", "--name-only", range.as_str()], GIT_TIMEOUT)?;
        if !result.success() {
            anyhow::bail!("git diff --name-only failed: {}", result.diagnostic_output());
        }
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn read_file(&self, path: &str) -> Option<String> {
        let full = resolve_repo_path(&self.root, Path::new(path)).ok()?;
        let bytes = fs::read(full).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl PatchWorkspace for GitWorkspace {
    fn apply(&mut self, patch: &str, strategy: ApplyStrategy) -> Result<AttemptReport> {
        let file = self.write_patch(patch)?;
        let args: Vec<&str> = match strategy {
            ApplyStrategy::Direct => vec!["apply", "--whitespace=fix", file.as_str()],
            ApplyStrategy::ThreeWay => vec!["apply", "--3way", "--whitespace=fix", file.as_str()],
        };
        let result = self.git(&args, GIT_TIMEOUT)?;
        Ok(AttemptReport {
            strategy,
            succeeded: result.success(),
            output: result.diagnostic_output().to_string(),
        })
    }

    fn is_already_applied(&mut self, patch: &str) -> Result<bool> {
        let file = self.write_patch(patch)?;
        let result = self.git(&["apply", "--reverse", "--check", file.as_str()], GIT_TIMEOUT)?;
        Ok(result.success())
    }

    fn conflict_artifacts(&mut self) -> Vec<ConflictArtifact> {
        let mut artifacts = self.reject_files();
        artifacts.extend(self.unmerged_files());
        artifacts
    }

    fn commit_all(&mut self, message: &str) -> Result<CommitOutcome> {
        let repo = Repository::open(&self.root)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let tree = repo.find_tree(tree_id)?;
        let sig = Signature::now(BOT_NAME, BOT_EMAIL)?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .context("Failed to commit patch")?;
        tracing::info!("Committed {}", oid);
        Ok(CommitOutcome::Committed(oid.to_string()))
    }

    fn push(&mut self) -> PushStatus {
        if !self.push_enabled {
            tracing::info!("Push disabled; leaving commit local");
            return PushStatus::Skipped;
        }
        match self.git(&["push"], PUSH_TIMEOUT) {
            Ok(result) if result.success() => PushStatus::Pushed,
            Ok(result) if result.timed_out => PushStatus::Failed("git push timed out".to_string()),
            Ok(result) => PushStatus::Failed(result.diagnostic_output().trim().to_string()),
            Err(e) => PushStatus::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchbot::apply::{apply_candidate, ApplyOutcome};
    use crate::patchbot::validate::PatchCandidate;
    use crate::util::command_on_path;

    fn create_temp_repo() -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let repo_path = temp_dir.path().join("repo");
        fs::create_dir_all(&repo_path).unwrap();

        let repo = Repository::init(&repo_path).expect("Failed to init repo");
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        (temp_dir, repo_path)
    }

    fn commit_file(repo_path: &Path, rel_path: &str, content: &str) -> String {
        fs::write(repo_path.join(rel_path), content).unwrap();
        let repo = Repository::open(repo_path).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(rel_path)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "test", &tree, &parents)
            .unwrap()
            .to_string()
    }

    fn workspace(temp: &tempfile::TempDir, repo_path: &Path) -> GitWorkspace {
        GitWorkspace::open(repo_path, false)
            .unwrap()
            .with_patch_path(temp.path().join("chat_fix.diff"))
    }

    #[test]
    fn test_open_rejects_non_repo() {
        let temp = tempfile::tempdir().unwrap();
        assert!(GitWorkspace::open(temp.path(), false).is_err());
    }

    #[test]
    fn test_commit_all_reports_nothing_to_commit() {
        let (temp, repo_path) = create_temp_repo();
        commit_file(&repo_path, "api.py", "old\n");
        let mut ws = workspace(&temp, &repo_path);

        assert_eq!(
            ws.commit_all(COMMIT_MESSAGE).unwrap(),
            CommitOutcome::NothingToCommit
        );
    }

    #[test]
    fn test_commit_all_commits_as_bot() {
        let (temp, repo_path) = create_temp_repo();
        commit_file(&repo_path, "api.py", "old\n");
        fs::write(repo_path.join("api.py"), "new\n").unwrap();
        fs::write(repo_path.join("extra.py"), "added\n").unwrap();
        let mut ws = workspace(&temp, &repo_path);

        let CommitOutcome::Committed(oid) = ws.commit_all(COMMIT_MESSAGE).unwrap() else {
            panic!("expected a commit");
        };
        let repo = Repository::open(&repo_path).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), oid);
        assert_eq!(head.author().name(), Some(BOT_NAME));
        assert_eq!(head.author().email(), Some(BOT_EMAIL));
        assert_eq!(head.message(), Some(COMMIT_MESSAGE));
        assert!(head.tree().unwrap().get_name("extra.py").is_some());

        assert_eq!(
            ws.commit_all(COMMIT_MESSAGE).unwrap(),
            CommitOutcome::NothingToCommit
        );
    }

    #[test]
    fn test_commit_all_picks_up_deletions() {
        let (temp, repo_path) = create_temp_repo();
        commit_file(&repo_path, "a.py", "a\n");
        commit_file(&repo_path, "b.py", "b\n");
        fs::remove_file(repo_path.join("b.py")).unwrap();
        let mut ws = workspace(&temp, &repo_path);

        assert!(matches!(
            ws.commit_all(COMMIT_MESSAGE).unwrap(),
            CommitOutcome::Committed(_)
        ));
        let repo = Repository::open(&repo_path).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_name("b.py").is_none());
    }

    #[test]
    fn test_push_disabled_is_skipped() {
        let (temp, repo_path) = create_temp_repo();
        let mut ws = workspace(&temp, &repo_path);
        assert_eq!(ws.push(), PushStatus::Skipped);
    }

    #[test]
    fn test_read_file_stays_inside_repo() {
        let (temp, repo_path) = create_temp_repo();
        commit_file(&repo_path, "api.py", "old\n");
        let ws = workspace(&temp, &repo_path);

        assert_eq!(ws.read_file("api.py").as_deref(), Some("old\n"));
        assert_eq!(ws.read_file("../outside.txt"), None);
        assert_eq!(ws.read_file("missing.py"), None);
    }

    #[test]
    fn test_reject_files_are_collected() {
        let (temp, repo_path) = create_temp_repo();
        fs::create_dir_all(repo_path.join("pkg")).unwrap();
        fs::write(repo_path.join("pkg/api.py.rej"), "@@ -1 +1 @@\n-x\n+y\n").unwrap();
        let ws = workspace(&temp, &repo_path);

        let rejects = ws.reject_files();
        assert_eq!(rejects.len(), 1);
        assert!(rejects[0].path.ends_with("api.py.rej"));
        assert!(rejects[0].content.contains("+y"));
    }

    #[test]
    fn test_apply_chain_against_real_repo() {
        if !command_on_path("git") {
            return;
        }
        let (temp, repo_path) = create_temp_repo();
        let base = commit_file(&repo_path, "api.py", "old\n");
        let head = commit_file(&repo_path, "api.py", "older\n");
        let mut ws = workspace(&temp, &repo_path);

        assert_eq!(ws.changed_files(&base, &head).unwrap(), vec!["api.py"]);
        assert!(ws.unified_diff(&base, &head).unwrap().contains("+older"));

        let patch = "diff --git a/api.py b/api.py\n--- a/api.py\n+++ b/api.py\n@@ -1 +1 @@\n-older\n+new\n";
        let candidate = PatchCandidate::new(patch);

        let first = apply_candidate(&mut ws, &candidate, COMMIT_MESSAGE).unwrap();
        assert!(matches!(
            first,
            ApplyOutcome::Applied {
                strategy: ApplyStrategy::Direct,
                push: PushStatus::Skipped,
                ..
            }
        ));
        assert_eq!(fs::read_to_string(repo_path.join("api.py")).unwrap(), "new\n");

        let second = apply_candidate(&mut ws, &candidate, COMMIT_MESSAGE).unwrap();
        assert_eq!(second, ApplyOutcome::NoOp);
    }
}
