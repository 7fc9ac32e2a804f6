//! votebox: command-line client for a suggestion-voting board.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use votebox_client::{
    ApiClient, AuthClient, HttpSuggestionService, MemorySession, SessionStore, SuggestionService,
};
use votebox_core::{
    Board, ClientError, Resolution, ResolutionState, SimilarityStatus, SimilarityView, SortOrder,
};
use votebox_types::{
    DraftSuggestion, SimilarityMatch, Suggestion, SuggestionId, SuggestionStatus, VoteKind,
    VotingMode,
};
use votebox_utils::{format_age, init_logging, LogFormat};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "votebox", about = "Browse, vote on and submit suggestions")]
struct Cli {
    /// Backend base URL. Overrides the config file.
    #[arg(long, env = "VOTEBOX_API_URL")]
    api_url: Option<String>,

    /// Bearer token from `votebox login`.
    #[arg(long, env = "VOTEBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds. Overrides the config file.
    #[arg(long, env = "VOTEBOX_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Voting contract of the backend: "toggle" or "directional".
    #[arg(long, env = "VOTEBOX_VOTING_MODE")]
    voting_mode: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "VOTEBOX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "VOTEBOX_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "VOTEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// List suggestions.
    List {
        /// Ordering: "feed", "top" or "new".
        #[arg(long, default_value = "feed")]
        sort: String,
        /// Only show suggestions with this status.
        #[arg(long)]
        status: Option<String>,
    },
    /// Vote on a suggestion (toggles in toggle mode).
    Vote {
        id: String,
        /// Direction in directional mode: "up" or "down".
        #[arg(long, default_value = "up")]
        direction: String,
    },
    /// Remove your vote from a suggestion.
    Unvote { id: String },
    /// Show existing suggestions similar to some text.
    Similar { text: String },
    /// Submit a new suggestion, checking for duplicates first.
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// If duplicates are found, create the suggestion anyway.
        #[arg(long, conflicts_with = "vote_existing")]
        create_anyway: bool,
        /// If duplicates are found, vote on the best match instead.
        #[arg(long)]
        vote_existing: bool,
    },
    /// Suggestions you have voted on.
    MyVotes,
    /// Log in and print a token for VOTEBOX_TOKEN.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "VOTEBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "VOTEBOX_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Show the signed-in account.
    Me,
    /// Check that the backend is up.
    Health,
}

fn merge_config(cli: &Cli) -> anyhow::Result<CliConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = CliConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => CliConfig::default(),
    };

    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout_secs = secs;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = LogFormat::from_name(format);
    }
    if let Some(mode) = &cli.voting_mode {
        config.core.voting_mode = parse_voting_mode(mode)?;
    }
    config.validate()?;
    Ok(config)
}

fn parse_voting_mode(s: &str) -> anyhow::Result<VotingMode> {
    match s.to_ascii_lowercase().as_str() {
        "toggle" => Ok(VotingMode::Toggle),
        "directional" | "updown" => Ok(VotingMode::Directional),
        other => bail!("unknown voting mode {other:?} (expected \"toggle\" or \"directional\")"),
    }
}

fn parse_sort(s: &str) -> anyhow::Result<SortOrder> {
    match s.to_ascii_lowercase().as_str() {
        "feed" | "all" => Ok(SortOrder::Feed),
        "top" => Ok(SortOrder::Top),
        "new" => Ok(SortOrder::New),
        other => bail!("unknown sort {other:?} (expected feed, top or new)"),
    }
}

fn vote_kind(mode: VotingMode, direction: &str) -> anyhow::Result<VoteKind> {
    match (mode, direction.to_ascii_lowercase().as_str()) {
        (VotingMode::Toggle, _) => Ok(VoteKind::Vote),
        (VotingMode::Directional, "up") => Ok(VoteKind::Upvote),
        (VotingMode::Directional, "down") => Ok(VoteKind::Downvote),
        (_, other) => bail!("unknown direction {other:?} (expected up or down)"),
    }
}

fn print_suggestion(s: &Suggestion, now: i64) {
    let marker = if s.vote_state.has_voted() { "*" } else { " " };
    println!(
        "{marker}{:>5}  {:<10} {:<12} {}  ({}, {})",
        s.vote_count,
        s.id.as_str(),
        s.status.as_str(),
        s.title,
        s.author,
        format_age(now - s.created_at.timestamp()),
    );
}

fn print_matches(matches: &[SimilarityMatch]) {
    for m in matches {
        println!(
            "{:>3}%  {:<10} {:>5} votes  {}",
            m.percent(),
            m.suggestion_id.as_str(),
            m.snapshot_vote_count,
            m.snapshot_text
        );
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Feed `text` to the similarity scheduler and wait for its answer.
async fn wait_for_similarity(board: &Board, text: &str) -> anyhow::Result<SimilarityView> {
    let mut rx = board.subscribe_similarity();
    board.typed(text);
    loop {
        rx.changed().await.context("similarity scheduler stopped")?;
        let view = rx.borrow().clone();
        if view.status != SimilarityStatus::Checking {
            return Ok(view);
        }
    }
}

async fn submit(
    board: &Board,
    draft: DraftSuggestion,
    create_anyway: bool,
    vote_existing: bool,
) -> anyhow::Result<()> {
    board.begin()?;
    board.edit(draft)?;
    let mut state = board.submit().await?;

    if let ResolutionState::AwaitingDecision {
        matches, message, ..
    } = &state
    {
        println!(
            "{}",
            message.as_deref().unwrap_or("Similar suggestions already exist:")
        );
        print_matches(matches);
        let top = matches.first().map(|m| m.suggestion_id.clone());
        state = match (create_anyway, vote_existing, top) {
            (true, _, _) => board.choose_create_anyway().await?,
            (_, true, Some(id)) => board.choose_vote_existing(&id).await?,
            _ => {
                board.cancel()?;
                println!("Nothing submitted. Re-run with --vote-existing or --create-anyway.");
                return Ok(());
            }
        };
    }

    match state {
        ResolutionState::Resolved {
            outcome: Resolution::Created(created),
        } => println!("Created {} \"{}\"", created.id, created.title),
        ResolutionState::Resolved {
            outcome: Resolution::VotedExisting { id, state },
        } => println!("Voted for {id} instead ({} votes)", state.vote_count),
        other => bail!("submission ended in unexpected state: {}", other.name()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = merge_config(&cli)?;
    init_logging(config.log_format, &config.log_level);

    let session = Arc::new(MemorySession::new());
    if let Some(token) = &cli.token {
        session.set_token(token.clone());
    }
    let api = ApiClient::new(
        config.api_url.clone(),
        session.clone(),
        config.request_timeout(),
    )?;
    let service = Arc::new(HttpSuggestionService::new(api.clone()));
    let board = Board::new(service, session.clone(), config.core.clone());
    tracing::info!(api_url = %config.api_url, mode = ?config.core.voting_mode, "votebox starting");

    let result = run(cli.command, &config, &board, &api).await;
    if session.reauth_required() {
        eprintln!("Your session has expired or is missing. Run `votebox login` and set VOTEBOX_TOKEN.");
    }
    tracing::debug!(stats = %board.vote_stats(), "done");
    result
}

async fn run(command: Command, config: &CliConfig, board: &Board, api: &ApiClient) -> anyhow::Result<()> {
    match command {
        Command::List { sort, status } => {
            let order = parse_sort(&sort)?;
            let status = status.as_deref().map(SuggestionStatus::parse).transpose()?;
            board.refresh(status).await?;
            let now = now_secs();
            for s in board.suggestions(order) {
                print_suggestion(&s, now);
            }
        }
        Command::Vote { id, direction } => {
            let kind = vote_kind(config.core.voting_mode, &direction)?;
            vote(board, &id, kind).await?;
        }
        Command::Unvote { id } => vote(board, &id, VoteKind::Unvote).await?,
        Command::Similar { text } => {
            if text.trim().chars().count() < config.core.min_query_len {
                bail!(
                    "text must be at least {} characters",
                    config.core.min_query_len
                );
            }
            let view = wait_for_similarity(board, &text).await?;
            match view.status {
                SimilarityStatus::Results => print_matches(&view.matches),
                SimilarityStatus::NoMatches => println!("No similar suggestions."),
                _ => bail!(
                    "{}",
                    view.error.unwrap_or_else(|| "similarity check failed".into())
                ),
            }
        }
        Command::Submit {
            title,
            description,
            create_anyway,
            vote_existing,
        } => {
            // Load the feed so a vote-existing decision can update it.
            board.refresh(None).await?;
            submit(
                board,
                DraftSuggestion::new(title, description),
                create_anyway,
                vote_existing,
            )
            .await?;
        }
        Command::MyVotes => {
            let now = now_secs();
            for s in board.my_votes().await? {
                print_suggestion(&s, now);
            }
        }
        Command::Login { email, password } => {
            let auth = AuthClient::new(api.clone());
            auth.login(&email, &password).await?;
            let token = api.session().token().context("login returned no token")?;
            println!("{token}");
        }
        Command::Register {
            email,
            password,
            full_name,
        } => {
            let user = AuthClient::new(api.clone())
                .register(&email, &password, full_name.as_deref())
                .await?;
            println!("Registered {} ({})", user.email, user.id);
        }
        Command::Me => {
            let user = AuthClient::new(api.clone()).me().await?;
            println!(
                "{} <{}>{}",
                user.full_name.as_deref().unwrap_or("(no name)"),
                user.email,
                user.role.map(|r| format!(" [{r}]")).unwrap_or_default()
            );
        }
        Command::Health => {
            let status = HttpSuggestionService::new(api.clone()).health().await?;
            println!("{status}");
        }
    }
    Ok(())
}

async fn vote(board: &Board, id: &str, kind: VoteKind) -> anyhow::Result<()> {
    board.refresh(None).await?;
    let id = SuggestionId::new(id);
    match board.vote(&id, kind).await {
        Ok(state) => {
            let verb = if state.vote_state.has_voted() {
                "Voted"
            } else {
                "Removed vote"
            };
            println!("{verb}: {id} now has {} votes", state.vote_count);
            Ok(())
        }
        Err(ClientError::NotFound(id)) => bail!("no suggestion with id {id}"),
        Err(e) => bail!("{}", e.user_message()),
    }
}
