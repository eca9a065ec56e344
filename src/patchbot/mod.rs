//! Pull-request fix bot
//!
//! Fetches the pull request, asks a model for a corrective patch, runs it
//! through the apply chain and reports every outcome back as a comment.

pub mod apply;
pub mod escalate;
pub mod git_ops;
pub mod github;
pub mod model;
pub mod validate;

pub use apply::{apply_candidate, ApplyOutcome, ApplyStrategy, PatchWorkspace, PushStatus, RejectReason};
pub use escalate::{request_patch, FileContext, PatchRequest};
pub use git_ops::{GitWorkspace, SourceTree, COMMIT_MESSAGE};
pub use github::{trigger_hint, GitHubClient, PullRequest, ReviewHost};
pub use model::{ChatCompletionsClient, PatchModel};

use anyhow::{Context, Result};
use apply::MAX_SURFACED_CHARS;
use escalate::MAX_CONTEXT_FILES;

pub const EMPTY_DIFF_MESSAGE: &str = "ℹ️ No changes to patch (diff is empty).";
pub const NOTHING_TO_COMMIT_MESSAGE: &str =
    "ℹ️ Nothing to commit (patch was empty or already applied).";
pub const APPLIED_MESSAGE: &str = "✅ Patch applied by Chat Fix Bot.";

/// How a run ended. Every variant is a handled outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    EmptyDiff,
    /// The model could not be reached; nothing was applied
    ModelUnavailable,
    Finished(ApplyOutcome),
}

pub struct ChatFixBot<H, M> {
    host: H,
    model: M,
    event: Option<String>,
    hint: Option<String>,
}

impl<H: ReviewHost, M: PatchModel> ChatFixBot<H, M> {
    pub fn new(host: H, model: M) -> Self {
        Self {
            host,
            model,
            event: None,
            hint: None,
        }
    }

    pub fn with_event(mut self, event: Option<String>) -> Self {
        self.event = event;
        self
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Post a comment, falling back to the log when the host refuses it.
    pub async fn say(&self, body: &str) {
        if let Err(err) = self.host.comment(body).await {
            tracing::warn!("Could not post comment ({:#}); printing instead:\n{}", err, body);
        }
    }

    pub async fn run<W>(&self, workspace: &mut W) -> Result<RunOutcome>
    where
        W: PatchWorkspace + SourceTree,
    {
        let pr = self
            .host
            .pull_request()
            .await
            .context("Failed to fetch pull request")?;
        tracing::info!(
            "PR #{}: base={} head={} (event={})",
            pr.number,
            short_sha(&pr.base_sha),
            short_sha(&pr.head_sha),
            self.event.as_deref().unwrap_or("unknown")
        );

        let diff = workspace.unified_diff(&pr.base_sha, &pr.head_sha)?;
        if diff.trim().is_empty() {
            self.say(EMPTY_DIFF_MESSAGE).await;
            return Ok(RunOutcome::EmptyDiff);
        }

        let comments = match self.host.discussion().await {
            Ok(comments) => comments,
            Err(err) => {
                tracing::warn!("Could not load PR comments: {:#}", err);
                Vec::new()
            }
        };

        let request = PatchRequest {
            diff,
            title: pr.title.clone(),
            description: pr.body.clone(),
            hint: trigger_hint(self.hint.as_deref(), &comments),
        };

        let source: &W = workspace;
        let escalation = match request_patch(&self.model, &request, || {
            touched_files(source, &pr.base_sha, &pr.head_sha)
        })
        .await
        {
            Ok(escalation) => escalation,
            Err(err) => {
                tracing::warn!("{:#}", err);
                self.say(&format!("❌ {:#}", err)).await;
                return Ok(RunOutcome::ModelUnavailable);
            }
        };
        tracing::info!(
            "Model answered after {} call(s); well-formed={}",
            escalation.model_calls,
            escalation.candidate.is_well_formed
        );

        let outcome = apply_candidate(workspace, &escalation.candidate, COMMIT_MESSAGE)?;
        self.say(&report(&outcome)).await;
        Ok(RunOutcome::Finished(outcome))
    }
}

/// Current contents of the files the pull request touches, for the escalated prompt.
fn touched_files<S: SourceTree>(source: &S, base: &str, head: &str) -> Vec<FileContext> {
    let paths = match source.changed_files(base, head) {
        Ok(paths) => paths,
        Err(err) => {
            tracing::warn!("Could not list changed files: {:#}", err);
            return Vec::new();
        }
    };
    paths
        .into_iter()
        .filter_map(|path| {
            let content = source.read_file(&path)?;
            Some(FileContext { path, content })
        })
        .take(MAX_CONTEXT_FILES)
        .collect()
}

/// Comment body for a finished apply chain.
pub fn report(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Rejected(RejectReason::InvalidFormat { excerpt }) => format!(
            "⚠️ Model did not return a valid unified diff. Skipping apply.\n\n```diff\n{}\n```",
            excerpt
        ),
        ApplyOutcome::Rejected(RejectReason::Conflict(diagnostics)) => diagnostics.render(),
        ApplyOutcome::NoOp => NOTHING_TO_COMMIT_MESSAGE.to_string(),
        ApplyOutcome::Applied { push, commit, strategy, .. } => match push {
            PushStatus::Pushed => APPLIED_MESSAGE.to_string(),
            PushStatus::Skipped => format!(
                "✅ Patch applied by Chat Fix Bot as {} ({} apply); push is disabled for this run.",
                short_sha(commit),
                strategy.label()
            ),
            PushStatus::Failed(output) => format!(
                "⚠️ Patch committed as {} but push failed:\n```\n{}\n```",
                short_sha(commit),
                crate::util::clip(output, MAX_SURFACED_CHARS)
            ),
        },
    }
}

/// Comment posted when a run dies on an unexpected error.
pub fn failure_report(err: &anyhow::Error) -> String {
    format!(
        "❌ Chat Fix Bot failed unexpectedly.\n\n```\n{}\n```",
        crate::util::clip(&format!("{:#}", err), MAX_SURFACED_CHARS)
    )
}

fn short_sha(sha: &str) -> &str {
    crate::util::clip(sha, 7)
}
