//! Shape checks and hygiene for model-proposed patches

use regex::Regex;
use std::sync::OnceLock;

/// Every token a usable unified diff must contain.
pub const REQUIRED_MARKERS: [&str; 4] = ["diff --git", "--- a/", "+++ b/", "@@"];

/// One model response, checked once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCandidate {
    pub raw_text: String,
    pub is_well_formed: bool,
}

impl PatchCandidate {
    pub fn new(model_output: &str) -> Self {
        let raw_text = strip_code_fence(model_output);
        let is_well_formed = missing_markers(&raw_text).is_empty();
        Self {
            raw_text,
            is_well_formed,
        }
    }

    /// Text handed to `git apply`.
    pub fn patch_text(&self) -> String {
        let mut text = sanitize_whitespace(&self.raw_text);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}

/// Markers absent from `text`, in declaration order.
pub fn missing_markers(text: &str) -> Vec<&'static str> {
    REQUIRED_MARKERS
        .iter()
        .copied()
        .filter(|marker| !text.contains(marker))
        .collect()
}

fn trailing_ws() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+(\r?\n)").expect("static regex"))
}

/// Strip trailing blanks from every line so `git apply` sees a quiet diff.
pub fn sanitize_whitespace(patch: &str) -> String {
    trailing_ws().replace_all(patch, "$1").into_owned()
}

/// Models like to wrap diffs in a ```diff fence; unwrap a single outer fence.
fn strip_code_fence(output: &str) -> String {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return output.to_string();
    };
    let Some(body_start) = rest.find('\n') else {
        return output.to_string();
    };
    let body = &rest[body_start + 1..];
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner.to_string(),
        None => output.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "diff --git a/api.py b/api.py\n--- a/api.py\n+++ b/api.py\n@@ -1 +1 @@\n-old\n+new\n";

    #[test]
    fn test_well_formed_patch() {
        let candidate = PatchCandidate::new(PATCH);
        assert!(candidate.is_well_formed);
        assert_eq!(candidate.raw_text, PATCH);
    }

    #[test]
    fn test_each_missing_marker_rejects() {
        for marker in REQUIRED_MARKERS {
            let broken = PATCH.replace(marker, "");
            let candidate = PatchCandidate::new(&broken);
            assert!(!candidate.is_well_formed, "missing {:?} should reject", marker);
            assert!(missing_markers(&broken).contains(&marker));
        }
    }

    #[test]
    fn test_prose_is_rejected() {
        let candidate = PatchCandidate::new("Sure! Here is the fix you asked for.");
        assert!(!candidate.is_well_formed);
        assert_eq!(missing_markers(&candidate.raw_text).len(), 4);
    }

    #[test]
    fn test_fenced_patch_is_unwrapped() {
        let fenced = format!("```diff\n{}```\n", PATCH);
        let candidate = PatchCandidate::new(&fenced);
        assert!(candidate.is_well_formed);
        assert_eq!(candidate.raw_text, PATCH);
    }

    #[test]
    fn test_unterminated_fence_left_alone() {
        let text = "```diff\nno closing fence";
        assert_eq!(strip_code_fence(text), text);
    }

    #[test]
    fn test_sanitize_trailing_whitespace() {
        assert_eq!(sanitize_whitespace("+a  \n b\t\r\n c\n"), "+a\n b\r\n c\n");
        assert_eq!(sanitize_whitespace("no change\n"), "no change\n");
    }

    #[test]
    fn test_patch_text_ends_with_newline() {
        let candidate = PatchCandidate::new(PATCH.trim_end());
        assert!(candidate.patch_text().ends_with("+new\n"));
    }
}
