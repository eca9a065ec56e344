//! Prompting with one round of context escalation
//!
//! The first request carries the rules, the pull request diff, its
//! description and the triggering hint. Only when that answer is not a usable
//! diff does a second request go out, this time with the current contents of
//! the touched files. There is never a third request.

use super::model::PatchModel;
use super::validate::PatchCandidate;
use crate::util::clip;
use anyhow::{Context, Result};

pub const MAX_CONTEXT_FILES: usize = 8;
pub const MAX_FILE_CHARS: usize = 12_000;

pub const SYSTEM_PROMPT: &str = "You are a careful code refactoring assistant. \
Given a git unified diff (base..head), return a new unified diff that applies cleanly on top of HEAD. \
Only include changed hunks. No prose.";

pub const RULES: &str = "\
Fix CropManage API endpoint mistakes using these rules:
1) List ranches: GET /v2/ranches.json
2) List plantings for a ranch (prefer): GET /v2/ranches/{Ranch_External_GUID}/plantings.json?active=true
   Fallback numeric: GET /v2/plantings/list-by-ranch.json?ranchId={numericId}&active=true
3) Ranch objects from /v2/ranches.json contain Name, Id, and may include Ranch_External_GUID.
4) Normalize ranch name comparisons with .strip().lower().
5) Do NOT produce whitespace-only diffs.
6) Return a valid unified diff ONLY; no explanations or extra text.
";

/// What the bot knows about the pull request before asking for a patch.
#[derive(Debug, Clone, Default)]
pub struct PatchRequest {
    pub diff: String,
    pub title: String,
    pub description: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    pub path: String,
    pub content: String,
}

/// Result of the (at most two) model calls.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub candidate: PatchCandidate,
    pub model_calls: usize,
    /// Whether the final prompt carried file contents
    pub escalated: bool,
}

pub fn build_prompt(request: &PatchRequest, files: &[FileContext]) -> String {
    let mut prompt = String::from(RULES);

    let title = request.title.trim();
    let description = request.description.trim();
    if !title.is_empty() || !description.is_empty() {
        prompt.push_str("\nPull request: ");
        prompt.push_str(title);
        if !description.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(description);
        }
        prompt.push('\n');
    }

    if let Some(hint) = request.hint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        prompt.push_str("\nRequested fix: ");
        prompt.push_str(hint);
        prompt.push('\n');
    }

    prompt.push_str("\n\nInput diff (base..head):\n");
    prompt.push_str(&request.diff);

    if !files.is_empty() {
        prompt.push_str(
            "\n\nYour previous answer was not a valid unified diff. \
             Current contents of the files touched by the diff at HEAD:\n",
        );
        for file in files.iter().take(MAX_CONTEXT_FILES) {
            prompt.push_str(&format!(
                "\n--- {} ---\n```\n{}\n```\n",
                file.path,
                clip(&file.content, MAX_FILE_CHARS)
            ));
        }
    }

    prompt
}

/// Ask for a patch, escalating once with file context if the first answer is unusable.
///
/// `load_files` runs only when escalation happens. A model transport failure
/// is returned as `Err` and ends the run; it is never retried.
pub async fn request_patch<M, F>(
    model: &M,
    request: &PatchRequest,
    load_files: F,
) -> Result<Escalation>
where
    M: PatchModel,
    F: FnOnce() -> Vec<FileContext>,
{
    let first = model
        .complete(SYSTEM_PROMPT, &build_prompt(request, &[]))
        .await
        .context("OpenAI request failed")?;
    let candidate = PatchCandidate::new(&first);
    if candidate.is_well_formed {
        return Ok(Escalation {
            candidate,
            model_calls: 1,
            escalated: false,
        });
    }

    let mut files = load_files();
    files.truncate(MAX_CONTEXT_FILES);
    tracing::info!(
        "Model answer was not a unified diff; retrying with {} file(s) of context",
        files.len()
    );

    let second = model
        .complete(SYSTEM_PROMPT, &build_prompt(request, &files))
        .await
        .context("OpenAI request failed")?;
    Ok(Escalation {
        candidate: PatchCandidate::new(&second),
        model_calls: 2,
        escalated: true,
    })
}
