//! CampusAccess - accessibility reviews for university campuses
//!
//! A CLI client for a hosted review backend: search schools, read
//! per-category accessibility ratings and submit reviews.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (connection, config, failed save, etc.)
//!   2   - Review rejected by validation
//!   3   - Sign-in required
//!   130 - Interrupted while a request was in flight

mod backend;
mod cli;
mod config;
mod error;
mod models;
mod ratings;
mod report;
mod session;
mod submission;
mod views;

use anyhow::{Context, Result};
use backend::{IdentityProvider, ReviewBackend, SignUpOutcome, SupabaseBackend, SupabaseConfig};
use chrono::Utc;
use cli::{Args, Command, OutputFormat};
use config::Config;
use error::SubmissionError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{Category, Session};
use serde_json::json;
use session::{SessionManager, SessionStore, SessionSubscription};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use submission::{ReviewDraft, ReviewPipeline};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use views::{InstitutionRef, PageLoader};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_INVALID: i32 = 2;
const EXIT_SIGN_IN: i32 = 3;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_FAILURE);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Load configuration first so the config file can turn on verbose logging
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("CampusAccess v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

/// Handle init-config: generate a default .campusaccess.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", config::CONFIG_FILE);
        std::process::exit(EXIT_FAILURE);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Set backend.url and backend.anon_key for your project.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", config::CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Everything a command handler needs.
struct App {
    config: Config,
    backend: Arc<SupabaseBackend>,
    loader: PageLoader,
    sessions: SessionManager,
    format: OutputFormat,
    quiet: bool,
}

impl App {
    fn print_json(&self, value: &impl serde::Serialize) -> Result<()> {
        println!("{}", report::generate_json(value)?);
        Ok(())
    }

    /// Run a request behind a spinner unless output is quiet.
    async fn with_spinner<F: Future>(&self, message: &str, future: F) -> F::Output {
        if self.quiet {
            return future.await;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        let output = future.await;
        spinner.finish_and_clear();
        output
    }
}

/// Run the selected command. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let backend = Arc::new(
        SupabaseBackend::new(SupabaseConfig::from(&config.backend))
            .context("Failed to set up the backend client")?,
    );

    info!("Using {} backend at {}", backend.backend_tag(), config.backend.url);

    let store = SessionStore::new(config.session.file.clone());
    debug!("Session file: {}", store.path().display());
    let sessions = SessionManager::load(store);
    let watcher = tokio::spawn(log_session_changes(sessions.subscribe()));

    if let Err(e) = sessions.refresh_if_expired(&*backend).await {
        warn!("{:#}", e);
    }

    let app = App {
        loader: PageLoader::new(backend.clone()),
        backend,
        sessions,
        config,
        format: args.format,
        quiet: args.quiet,
    };

    let result = match args.command {
        Command::Search { query } => search(&app, &query).await,
        Command::Schools => schools(&app).await,
        Command::Show { school } => show(&app, &school).await,
        Command::Review {
            school,
            recreation,
            dining,
            main_area,
            comment,
        } => {
            let draft = ReviewDraft::new(comment)
                .rate(Category::RecreationCenter, recreation)
                .rate(Category::DiningHall, dining)
                .rate(Category::MainArea, main_area);
            review(&app, &school, &draft).await
        }
        Command::Signup {
            email,
            display_name,
            password,
        } => sign_up(&app, &email, &password, display_name.trim()).await,
        Command::Signin { email, password } => sign_in(&app, &email, &password).await,
        Command::Signout => sign_out(&app).await,
        Command::Whoami => whoami(&app).await,
        Command::DeleteAccount { yes } => delete_account(&app, yes).await,
        Command::InitConfig => handle_init_config().map(|_| EXIT_OK),
    };

    watcher.abort();
    result
}

/// Log session changes for as long as the command runs.
async fn log_session_changes(mut subscription: SessionSubscription) {
    while let Some(change) = subscription.changed().await {
        match change {
            Some(session) => debug!("Session changed: signed in as {}", session.identity.id),
            None => debug!("Session changed: signed out"),
        }
    }
    subscription.unsubscribe();
}

async fn search(app: &App, query: &str) -> Result<i32> {
    let results = app
        .with_spinner("Searching...", app.loader.search(query))
        .await?;

    match app.format {
        OutputFormat::Json => app.print_json(&results)?,
        OutputFormat::Text => print!("{}", report::generate_search_text(&results)),
    }
    Ok(EXIT_OK)
}

async fn schools(app: &App) -> Result<i32> {
    let institutions = app
        .with_spinner("Loading schools...", app.loader.list_institutions())
        .await?;

    match app.format {
        OutputFormat::Json => app.print_json(&institutions)?,
        OutputFormat::Text => print!("{}", report::generate_institutions_text(&institutions)),
    }
    Ok(EXIT_OK)
}

async fn show(app: &App, school: &str) -> Result<i32> {
    let reference = InstitutionRef::parse(school);
    let page = app
        .with_spinner("Loading school...", app.loader.load_school(&reference))
        .await?;

    match app.format {
        OutputFormat::Json => app.print_json(&page)?,
        OutputFormat::Text => print!(
            "{}",
            report::generate_school_text(&page, app.config.general.max_reviews_shown, Utc::now())
        ),
    }
    Ok(EXIT_OK)
}

async fn review(app: &App, school: &str, draft: &ReviewDraft) -> Result<i32> {
    let reference = InstitutionRef::parse(school);
    let mut page = app
        .with_spinner("Loading school...", app.loader.load_school(&reference))
        .await?;

    let session = app.sessions.current();
    let mut pipeline = ReviewPipeline::new(app.backend.clone());

    // Abandon the in-flight request on Ctrl-C; nothing to clean up.
    let outcome = tokio::select! {
        outcome = app.with_spinner(
            "Submitting review...",
            pipeline.submit(draft, session.as_ref(), &mut page),
        ) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; the review may or may not have been saved");
            return Ok(EXIT_INTERRUPTED);
        }
    };
    debug!("Submission ended in state {}", pipeline.state().name());

    match outcome {
        Ok(submitted) => {
            match app.format {
                OutputFormat::Json => app.print_json(&json!({
                    "disposition": submitted.disposition.to_string(),
                    "review": submitted.review,
                    "page": page,
                }))?,
                OutputFormat::Text => {
                    print!("{}", report::generate_submission_text(&submitted, &page))
                }
            }
            Ok(EXIT_OK)
        }
        Err(SubmissionError::Validation(e)) => {
            eprintln!("⚠️  {}", e);
            Ok(EXIT_INVALID)
        }
        Err(SubmissionError::AuthenticationRequired) => {
            if session.is_some() {
                // The backend rejected the stored credentials (401)
                app.sessions.sign_out()?;
            }
            eprintln!("🔒 You need to be signed in to submit a review.");
            eprintln!("   Run `campusaccess signin --email <EMAIL>` and try again.");
            Ok(EXIT_SIGN_IN)
        }
        Err(e @ SubmissionError::Persistence(_)) => {
            eprintln!("❌ {}", e);
            if e.is_retryable() {
                eprintln!("   Nothing was saved. Run the same command again to retry.");
            }
            Ok(EXIT_FAILURE)
        }
    }
}

async fn sign_up(app: &App, email: &str, password: &str, display_name: &str) -> Result<i32> {
    let outcome = app
        .with_spinner(
            "Creating account...",
            app.backend.sign_up(email, password, display_name),
        )
        .await?;

    match outcome {
        SignUpOutcome::SignedIn(session) => {
            app.sessions.sign_in(session.clone())?;
            println!("✅ Welcome, {}! You are signed in.", greeting_name(&session));
        }
        SignUpOutcome::ConfirmationPending(identity) => {
            println!(
                "📧 Account created for {}. Confirm your email, then run `campusaccess signin`.",
                identity.email.as_deref().unwrap_or(email)
            );
        }
    }
    Ok(EXIT_OK)
}

async fn sign_in(app: &App, email: &str, password: &str) -> Result<i32> {
    let session = app
        .with_spinner("Signing in...", app.backend.sign_in(email, password))
        .await?;

    app.sessions.sign_in(session.clone())?;
    println!("✅ Signed in as {}.", greeting_name(&session));
    Ok(EXIT_OK)
}

async fn sign_out(app: &App) -> Result<i32> {
    if let Some(session) = app.sessions.current() {
        if let Err(e) = app.backend.sign_out(&session).await {
            warn!("Backend sign-out failed, clearing local session anyway: {}", e);
        }
    }

    app.sessions.sign_out()?;
    println!("👋 Signed out.");
    Ok(EXIT_OK)
}

async fn whoami(app: &App) -> Result<i32> {
    let Some(session) = app.sessions.current() else {
        println!("Not signed in.");
        return Ok(EXIT_SIGN_IN);
    };

    let identity = app
        .with_spinner("Checking session...", app.backend.lookup_session(&session))
        .await?;

    match identity {
        Some(identity) => {
            match app.format {
                OutputFormat::Json => app.print_json(&identity)?,
                OutputFormat::Text => println!(
                    "{} <{}> ({})",
                    identity.display_name.as_deref().unwrap_or("(no display name)"),
                    identity.email.as_deref().unwrap_or("no email"),
                    identity.id
                ),
            }
            Ok(EXIT_OK)
        }
        None => {
            app.sessions.sign_out()?;
            println!("Your session is no longer valid. Please sign in again.");
            Ok(EXIT_SIGN_IN)
        }
    }
}

async fn delete_account(app: &App, confirmed: bool) -> Result<i32> {
    let Some(session) = app.sessions.current() else {
        eprintln!("You need to be signed in to delete your account.");
        return Ok(EXIT_SIGN_IN);
    };

    if !confirmed {
        eprintln!("⚠️  This permanently deletes your account. Re-run with --yes to confirm.");
        return Ok(EXIT_FAILURE);
    }

    app.with_spinner("Deleting account...", app.backend.delete_account(&session))
        .await
        .context("Failed to delete account. Try again later")?;

    app.sessions.sign_out()?;
    println!("Account deleted successfully.");
    Ok(EXIT_OK)
}

fn greeting_name(session: &Session) -> &str {
    session
        .identity
        .display_name
        .as_deref()
        .or(session.identity.email.as_deref())
        .unwrap_or("you")
}
