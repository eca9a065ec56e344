use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_URL: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = "chat-fix-bot";
const COMMENTS_PER_PAGE: usize = 100;
/// Stop paging after this many pages (3,000 comments).
const MAX_COMMENT_PAGES: usize = 30;

/// Comment keyword that triggers a run and carries the requested fix
pub const TRIGGER_KEYWORD: &str = "/chat-fix";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Truncate an API error body and redact anything that looks like a credential.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghs_",
        "github_pat_",
    ];

    let truncated = crate::util::truncate(body, MAX_ERROR_BODY_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }
    truncated
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub base_sha: String,
    pub head_sha: String,
}

/// The collaboration platform hosting the pull request.
#[allow(async_fn_in_trait)]
pub trait ReviewHost {
    async fn pull_request(&self) -> Result<PullRequest>;

    /// Bodies of the pull request's conversation comments, oldest first.
    async fn discussion(&self) -> Result<Vec<String>>;

    async fn comment(&self, body: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    base: RefResponse,
    head: RefResponse,
}

#[derive(Deserialize)]
struct RefResponse {
    sha: String,
}

#[derive(Deserialize)]
struct CommentResponse {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
}

impl From<PullResponse> for PullRequest {
    fn from(pr: PullResponse) -> Self {
        Self {
            number: pr.number,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            base_sha: pr.base.sha,
            head_sha: pr.head.sha,
        }
    }
}

pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    repo: String,
    pr_number: u64,
    api_url: String,
}

impl GitHubClient {
    pub fn new(token: &str, repo: &str, pr_number: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            token: token.to_string(),
            repo: repo.to_string(),
            pr_number,
            api_url: API_URL.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}{}", self.api_url, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<String> {
        let resp = builder
            .send()
            .await
            .context("Failed to send GitHub request")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(body);
        }
        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            anyhow::bail!("GitHub API error ({}): {}", status, api_error.message);
        }
        anyhow::bail!("GitHub API error ({}): {}", status, sanitize_error_body(&body))
    }

    async fn comment_page(&self, page: usize) -> Result<String> {
        let url = self.url(&format!("/issues/{}/comments", self.pr_number));
        let builder = self.request(reqwest::Method::GET, &url).query(&[
            ("per_page", COMMENTS_PER_PAGE.to_string()),
            ("page", page.to_string()),
        ]);
        self.send(builder).await
    }
}

impl ReviewHost for GitHubClient {
    async fn pull_request(&self) -> Result<PullRequest> {
        let url = self.url(&format!("/pulls/{}", self.pr_number));
        let body = self.send(self.request(reqwest::Method::GET, &url)).await?;
        let pr: PullResponse =
            serde_json::from_str(&body).context("Failed to parse pull request response")?;
        Ok(pr.into())
    }

    async fn discussion(&self) -> Result<Vec<String>> {
        collect_comment_pages(|page| self.comment_page(page)).await
    }

    async fn comment(&self, body: &str) -> Result<()> {
        let url = self.url(&format!("/issues/{}/comments", self.pr_number));
        let builder = self
            .request(reqwest::Method::POST, &url)
            .json(&CreateCommentRequest { body });
        self.send(builder).await?;
        Ok(())
    }
}

/// Walk comment pages (1-based) until a short page, keeping bodies oldest first.
async fn collect_comment_pages<F, Fut>(mut fetch: F) -> Result<Vec<String>>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut bodies = Vec::new();
    for page in 1..=MAX_COMMENT_PAGES {
        let body = fetch(page).await?;
        let comments: Vec<CommentResponse> =
            serde_json::from_str(&body).context("Failed to parse comments response")?;
        let full = comments.len() == COMMENTS_PER_PAGE;
        bodies.extend(comments.into_iter().filter_map(|c| c.body));
        if !full {
            break;
        }
    }
    Ok(bodies)
}

/// The instruction that triggered this run.
///
/// An explicit hint wins; otherwise the most recent comment mentioning the
/// trigger keyword, with the keyword itself stripped.
pub fn trigger_hint(explicit: Option<&str>, comments: &[String]) -> Option<String> {
    if let Some(hint) = explicit.map(str::trim).filter(|h| !h.is_empty()) {
        return Some(hint.to_string());
    }
    comments
        .iter()
        .rev()
        .find(|c| c.contains(TRIGGER_KEYWORD))
        .map(|c| c.replacen(TRIGGER_KEYWORD, "", 1).trim().to_string())
        .filter(|h| !h.is_empty())
}
