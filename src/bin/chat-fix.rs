//! chat-fix - repair CropManage API usage in a pull request
//!
//! Runs inside CI on a checkout of the pull request head. Every handled
//! outcome exits 0; only an unexpected error exits non-zero, after posting
//! a diagnostic comment.

use anyhow::{Context, Result};
use clap::Parser;
use cropmanage_agent::config::BotConfig;
use cropmanage_agent::logging;
use cropmanage_agent::patchbot::{
    failure_report, ChatCompletionsClient, ChatFixBot, GitHubClient, GitWorkspace, RunOutcome,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "chat-fix",
    about = "Ask a model for a corrective patch and apply it to the current pull request",
    version
)]
struct Args {
    /// Path to the checked-out repository
    #[arg(long, default_value = ".")]
    repo_path: PathBuf,

    /// Commit locally but don't push (same as CHAT_FIX_DISABLE_PUSH=1)
    #[arg(long)]
    no_push: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logging::init("info");
    let args = Args::parse();

    let config = BotConfig::from_env();
    let missing = config.missing_required();
    if !missing.is_empty() {
        tracing::info!("Missing one of: {}. Exiting.", missing.join(", "));
        return Ok(());
    }
    let (Some(api_key), Some(token), Some(repo)) = (
        config.openai_api_key.as_deref(),
        config.github_token.as_deref(),
        config.repo.as_deref(),
    ) else {
        return Ok(());
    };
    let Some(pr_number) = config.pr_number else {
        tracing::info!("❗ No REPO/PR_NUMBER found in env; nothing to do.");
        return Ok(());
    };

    let host = GitHubClient::new(token, repo, pr_number)?;
    let model = ChatCompletionsClient::new(api_key, &config.model)?;
    let bot = ChatFixBot::new(host, model)
        .with_event(config.event_name.clone())
        .with_hint(config.hint.clone());

    let result = run(&bot, &args, config.push_enabled && !args.no_push).await;
    match result {
        Ok(outcome) => {
            tracing::info!("Finished: {}", summary(&outcome));
            Ok(())
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            bot.say(&failure_report(&err)).await;
            std::process::exit(1);
        }
    }
}

async fn run(
    bot: &ChatFixBot<GitHubClient, ChatCompletionsClient>,
    args: &Args,
    push_enabled: bool,
) -> Result<RunOutcome> {
    let mut workspace = GitWorkspace::open(&args.repo_path, push_enabled)
        .context("Failed to open the pull request checkout")?;
    bot.run(&mut workspace).await
}

fn summary(outcome: &RunOutcome) -> &'static str {
    use cropmanage_agent::patchbot::{ApplyOutcome, RejectReason};
    match outcome {
        RunOutcome::EmptyDiff => "empty diff",
        RunOutcome::ModelUnavailable => "model unavailable",
        RunOutcome::Finished(ApplyOutcome::Applied { .. }) => "applied",
        RunOutcome::Finished(ApplyOutcome::NoOp) => "nothing to commit",
        RunOutcome::Finished(ApplyOutcome::Rejected(RejectReason::InvalidFormat { .. })) => {
            "invalid patch"
        }
        RunOutcome::Finished(ApplyOutcome::Rejected(RejectReason::Conflict(_))) => "conflict",
    }
}
