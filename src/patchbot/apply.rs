//! Apply chain for a validated patch
//!
//! Proposed → Validated → AppliedDirect | AppliedThreeWay | Rejected.
//! A patch gets at most two apply attempts: strict, then three-way. A
//! successful apply is committed and pushed; a commit with nothing staged is
//! reported as a no-op.

use super::validate::PatchCandidate;
use crate::util::clip;
use anyhow::Result;

/// Largest payload posted back to the pull request, in characters
pub const MAX_SURFACED_CHARS: usize = 65_000;
/// Portions of a rejection comment reserved for git output and `.rej` contents
const GIT_OUTPUT_SHARE: usize = 10_000;
const ARTIFACT_SHARE: usize = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    Direct,
    ThreeWay,
}

impl ApplyStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyStrategy::Direct => "direct",
            ApplyStrategy::ThreeWay => "3way",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub strategy: ApplyStrategy,
    pub succeeded: bool,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(String),
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    Skipped,
    Failed(String),
}

/// A leftover from a failed merge: a `.rej` file or a file with conflict markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictArtifact {
    pub path: String,
    pub content: String,
}

/// The working tree the bot owns for the duration of a run.
pub trait PatchWorkspace {
    fn apply(&mut self, patch: &str, strategy: ApplyStrategy) -> Result<AttemptReport>;

    /// True when the patch reverse-applies cleanly, i.e. its changes are already present.
    fn is_already_applied(&mut self, patch: &str) -> Result<bool>;

    fn conflict_artifacts(&mut self) -> Vec<ConflictArtifact>;

    /// Stage everything and commit as the bot.
    fn commit_all(&mut self, message: &str) -> Result<CommitOutcome>;

    fn push(&mut self) -> PushStatus;
}

/// Everything a human needs to finish a rejected patch by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub attempts: Vec<AttemptReport>,
    pub patch: String,
    pub artifacts: Vec<ConflictArtifact>,
}

impl Diagnostics {
    /// One comment body, never longer than `MAX_SURFACED_CHARS`.
    ///
    /// git output and conflict artifacts get fixed shares; the patch gets
    /// whatever remains.
    pub fn render(&self) -> String {
        let separator = format!("\n-- {} --\n", ApplyStrategy::ThreeWay.label());
        let attempt_output = self
            .attempts
            .iter()
            .map(|a| a.output.trim_end().to_string())
            .collect::<Vec<_>>()
            .join(separator.as_str());

        let head = format!(
            "❌ Patch failed to apply.\n\n**git apply output:**\n```\n{}\n```\n\n\
             **Proposed patch (save as patch.diff and run `git apply --3way patch.diff`)**:\n```diff\n",
            clip(&attempt_output, GIT_OUTPUT_SHARE)
        );

        let mut tail = String::from("\n```");
        if !self.artifacts.is_empty() {
            let joined: String = self
                .artifacts
                .iter()
                .map(|a| format!("\n--- {} ---\n{}\n", a.path, a.content))
                .collect();
            tail.push_str("\n\n**Conflict artifacts**:\n```\n");
            tail.push_str(clip(&joined, ARTIFACT_SHARE));
            tail.push_str("\n```");
        }

        let used = head.chars().count() + tail.chars().count();
        let patch_budget = MAX_SURFACED_CHARS.saturating_sub(used);
        let mut body = head;
        body.push_str(clip(&self.patch, patch_budget));
        body.push_str(&tail);
        body
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing unified-diff markers; carries the raw text, clipped.
    InvalidFormat { excerpt: String },
    Conflict(Diagnostics),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        strategy: ApplyStrategy,
        commit: String,
        push: PushStatus,
        /// Output of the failed strict attempt when the three-way attempt rescued it
        strict_failure: Option<AttemptReport>,
    },
    NoOp,
    Rejected(RejectReason),
}

/// Run one candidate through the chain.
///
/// `Err` is reserved for workspace failures outside the chain (e.g. the commit
/// itself erroring); every chain outcome is an `Ok`.
pub fn apply_candidate<W: PatchWorkspace>(
    workspace: &mut W,
    candidate: &PatchCandidate,
    commit_message: &str,
) -> Result<ApplyOutcome> {
    if !candidate.is_well_formed {
        return Ok(ApplyOutcome::Rejected(RejectReason::InvalidFormat {
            excerpt: clip(&candidate.raw_text, MAX_SURFACED_CHARS).to_string(),
        }));
    }

    let patch = candidate.patch_text();

    let direct = workspace.apply(&patch, ApplyStrategy::Direct)?;
    if direct.succeeded {
        return finish(workspace, ApplyStrategy::Direct, None, commit_message);
    }
    tracing::info!("Normal apply failed; trying 3-way merge...");

    if workspace.is_already_applied(&patch)? {
        tracing::info!("Patch is already present in the working tree");
        return finish(workspace, ApplyStrategy::Direct, None, commit_message);
    }

    let three_way = workspace.apply(&patch, ApplyStrategy::ThreeWay)?;
    if three_way.succeeded {
        return finish(
            workspace,
            ApplyStrategy::ThreeWay,
            Some(direct),
            commit_message,
        );
    }

    let artifacts = workspace.conflict_artifacts();
    Ok(ApplyOutcome::Rejected(RejectReason::Conflict(Diagnostics {
        attempts: vec![direct, three_way],
        patch,
        artifacts,
    })))
}

fn finish<W: PatchWorkspace>(
    workspace: &mut W,
    strategy: ApplyStrategy,
    strict_failure: Option<AttemptReport>,
    commit_message: &str,
) -> Result<ApplyOutcome> {
    match workspace.commit_all(commit_message)? {
        CommitOutcome::NothingToCommit => Ok(ApplyOutcome::NoOp),
        CommitOutcome::Committed(commit) => Ok(ApplyOutcome::Applied {
            strategy,
            commit,
            push: workspace.push(),
            strict_failure,
        }),
    }
}
