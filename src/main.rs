//! cropmanage - talk to CropManage from the terminal
//!
//! With no subcommand this starts the conversational loop; the other
//! subcommands answer one question and exit.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cropmanage_agent::agent::CropManageAgent;
use cropmanage_agent::announce::{Announcer, Silent, SpeechAnnouncer};
use cropmanage_agent::api::auth::authenticate;
use cropmanage_agent::api::{HttpTransport, RecommendationKind};
use cropmanage_agent::config::{ApiConfig, Settings};
use cropmanage_agent::intent::{self, Intent};
use cropmanage_agent::{keyring, logging, util};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

#[derive(Parser, Debug)]
#[command(
    name = "cropmanage",
    about = "Irrigation, fertilizer, weather and plantings answers from CropManage",
    version
)]
struct Cli {
    /// CropManage base URL (overrides CROPMANAGE_API_BASE and the settings file)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Don't speak answers aloud
    #[arg(long, global = true)]
    no_speech: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Conversational assistant (default)
    Chat,
    /// List ranch names
    Ranches,
    /// List crop names
    Crops,
    /// Count active plantings on a ranch
    Plantings { ranch: String },
    /// Current weather for a ranch
    Weather { location: String },
    /// Irrigation recommendation for a crop on a ranch
    Irrigation(RecommendationArgs),
    /// Nitrogen recommendation for a crop on a ranch
    Fertilizer(RecommendationArgs),
    /// Remember the account name and store the password in the system keychain
    Login { username: String },
}

#[derive(Args, Debug)]
struct RecommendationArgs {
    crop: String,
    location: String,
}

type Agent = CropManageAgent<HttpTransport>;
type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logging::init("warn");
    let cli = Cli::parse();

    let mut settings = Settings::load();

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if let Some(Command::Login { username }) = &cli.command {
        return login(&mut settings, username, &mut input).await;
    }

    let config = match &cli.api_base {
        Some(base) => ApiConfig::new(base)?,
        None => ApiConfig::from_settings(&settings)?,
    };

    let announcer: Box<dyn Announcer> = if cli.no_speech || !settings.announce {
        Box::new(Silent)
    } else {
        Box::new(SpeechAnnouncer::detect())
    };

    let Some(agent) = connect(config, &settings).await? else {
        println!("❌ Login failed");
        std::process::exit(1);
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&agent, announcer.as_ref(), &mut input).await,
        Command::Ranches => {
            print_names(agent.list_ranches().await?.iter().map(|e| e.name.as_str()));
            Ok(())
        }
        Command::Crops => {
            print_names(agent.list_crop_types().await?.iter().map(|e| e.name.as_str()));
            Ok(())
        }
        Command::Plantings { ranch } => answer(announcer.as_ref(), agent.count_plantings(&ranch).await),
        Command::Weather { location } => answer(announcer.as_ref(), agent.weather(&location).await),
        Command::Irrigation(args) => answer(
            announcer.as_ref(),
            agent
                .recommendation(RecommendationKind::Irrigation, &args.crop, &args.location)
                .await,
        ),
        Command::Fertilizer(args) => answer(
            announcer.as_ref(),
            agent
                .recommendation(RecommendationKind::Fertilizer, &args.crop, &args.location)
                .await,
        ),
        Command::Login { .. } => Ok(()),
    }
}

/// Exchange credentials for a token and build an authenticated agent.
async fn connect(config: ApiConfig, settings: &Settings) -> Result<Option<Agent>> {
    let Some(credentials) = keyring::resolve_credentials(settings) else {
        eprintln!(
            "No CropManage credentials. Set CROP_USERNAME and CROP_PASSWORD, or run `cropmanage login <username>`."
        );
        return Ok(None);
    };

    let transport = HttpTransport::new()?;
    let token = authenticate(&transport, &config, &credentials.username, &credentials.password).await;
    Ok(token.map(|token| CropManageAgent::new(transport.with_bearer(&token), config)))
}

async fn login(settings: &mut Settings, username: &str, input: &mut InputLines) -> Result<()> {
    let password = match std::env::var("CROP_PASSWORD").ok().filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => ask(input, "Password: ")
            .await?
            .context("No password entered")?,
    };

    keyring::set_password(username, &password).map_err(|e| anyhow::anyhow!(e))?;
    settings.username = Some(username.to_string());
    settings.save()?;
    println!("✅ Saved credentials for {} ({})", username, Settings::location());
    Ok(())
}

async fn chat(agent: &Agent, announcer: &dyn Announcer, input: &mut InputLines) -> Result<()> {
    println!("🌱 CropManage Voice Agent");
    println!("Available commands:");
    println!("- Irrigation: 'How much water for strawberries in Salinas?'");
    println!("- Fertilizer: 'Nitrogen recommendation for lettuce in Salinas'");
    println!("- Weather: 'What's the weather in Watsonville?'");
    println!("- Plantings: 'How many plantings in Pryor Ranch?'");
    println!("Type 'exit' to quit\n");

    let crops = agent.crop_names().await;
    let locations = agent.location_names().await;

    // Ctrl-C ends the whole session, including follow-up prompts and requests.
    let session = converse(agent, announcer, input, &crops, &locations);
    if let Some(result) = util::interruptible(tokio::signal::ctrl_c(), session).await {
        result?;
    }
    farewell(announcer);
    Ok(())
}

/// Answer lines until an exit word or end of input.
async fn converse(
    agent: &Agent,
    announcer: &dyn Announcer,
    input: &mut InputLines,
    crops: &[String],
    locations: &[String],
) -> Result<()> {
    loop {
        let Some(line) = ask(input, "You: ").await? else {
            return Ok(());
        };
        if line.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&line.to_lowercase().as_str()) {
            return Ok(());
        }

        let (intent, mut params) = intent::recognize(&line, crops, locations);
        if !params.is_empty() {
            println!("🔎 Detected: {}", params.describe());
        }

        if matches!(intent, Intent::Irrigation | Intent::Fertilizer) {
            if params.crop.is_none() {
                println!("Available crops: {}", crops.join(", "));
                params.crop = ask(input, "Which crop? ").await?.map(|c| c.to_lowercase());
            }
            if params.location.is_none() {
                println!("Available locations: {}", locations.join(", "));
                params.location = ask(input, "Which location? ").await?.map(|l| l.to_lowercase());
            }
        }

        let response = agent.handle_intent(intent, &params).await;
        println!("Agent: {}", response);
        announcer.announce(&response);
    }
}

/// Prompt and read one trimmed line; `None` at end of input.
async fn ask(input: &mut InputLines, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let line = input.next_line().await.context("Failed to read input")?;
    Ok(line.map(|l| l.trim().to_string()))
}

fn answer(announcer: &dyn Announcer, response: String) -> Result<()> {
    println!("{}", response);
    announcer.announce(&response);
    Ok(())
}

fn print_names<'a>(names: impl Iterator<Item = &'a str>) {
    for name in names {
        println!("{}", name);
    }
}

fn farewell(announcer: &dyn Announcer) {
    println!("\n👋 Goodbye!");
    announcer.announce("Goodbye!");
}
