use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reqwest::blocking::Client;

mod config;
mod failure;
mod fetch;
mod history;
mod payload;
mod recency;
mod schedule;
mod service;
mod store;

use crate::config::{default_config_path, default_db_path, load_config, save_config};
use crate::failure::{FailureKind, classify_error, should_deactivate};
use crate::fetch::{fetch_history_page, validate_cookie};
use crate::history::{PlayRecord, parse_history};
use crate::payload::extract_initial_data;
use crate::recency::{collect_unknown_phrases, detected_today_languages, played_today};
use crate::schedule::{Decision, Reason, plan_scrobbles, scrobble_timestamp};
use crate::service::{ScrobbleClient, fetch_mobile_session};
use crate::store::HistoryStore;

#[derive(Parser)]
#[command(
    name = "ytmscrobble",
    version,
    about = "Scrobble YouTube Music listening history to Last.fm"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store Last.fm API credentials
    SetKeys {
        #[arg(long, help = "API key")]
        api_key: String,
        #[arg(long, help = "API secret")]
        api_secret: String,
        #[arg(long, value_name = "PATH")]
        config_path: Option<PathBuf>,
    },
    /// Store the YouTube Music browser cookie
    SetCookie {
        #[arg(long, help = "Raw cookie header value; prompted for when omitted")]
        cookie: Option<String>,
        #[arg(long, value_name = "PATH")]
        config_path: Option<PathBuf>,
    },
    /// Obtain and store a Last.fm session key
    Login {
        #[arg(long, help = "Last.fm username")]
        username: String,
        #[arg(long, help = "Last.fm password")]
        password: Option<String>,
        #[arg(long, value_name = "PATH")]
        config_path: Option<PathBuf>,
    },
    /// Fetch today's history and scrobble new plays
    Run(RunArgs),
}

#[derive(Parser)]
struct RunArgs {
    #[arg(long, value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Path to the play-position database")]
    db_path: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = false,
        help = "Plan and report without scrobbling or persisting"
    )]
    dry_run: bool,
    #[arg(long, help = "Cap on submissions for a first run (default 10)")]
    max_first_time: Option<usize>,
    #[arg(
        long,
        default_value_t = false,
        help = "Use the tighter pro submission window"
    )]
    pro: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Print raw scrobble API responses"
    )]
    debug_response: bool,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::SetKeys {
            api_key,
            api_secret,
            config_path,
        } => {
            let config_path = config_path.unwrap_or_else(default_config_path);
            let mut config = load_config(&config_path)?;
            config.api_key = api_key;
            config.api_secret = api_secret;
            save_config(&config, &config_path)?;
            println!("Saved Last.fm API keys in {}", config_path.display());
        }
        Commands::SetCookie {
            cookie,
            config_path,
        } => {
            let config_path = config_path.unwrap_or_else(default_config_path);
            let mut config = load_config(&config_path)?;
            let cookie = match cookie {
                Some(value) => value,
                None => prompt_cookie()?,
            };
            validate_cookie(&cookie)?;
            config.cookie = Some(cookie);
            save_config(&config, &config_path)?;
            println!("Saved YouTube Music cookie in {}", config_path.display());
        }
        Commands::Login {
            username,
            password,
            config_path,
        } => {
            let config_path = config_path.unwrap_or_else(default_config_path);
            let mut config = load_config(&config_path)?;
            if config.api_key.is_empty() || config.api_secret.is_empty() {
                bail!("Missing Last.fm API keys. Run `ytmscrobble set-keys` first.");
            }
            let password = match password {
                Some(value) => value,
                None => rpassword::prompt_password("Last.fm password: ")?,
            };
            let session_key =
                fetch_mobile_session(&config.api_key, &config.api_secret, &username, &password)?;
            config.session_key = Some(session_key);
            save_config(&config, &config_path)?;
            println!("Saved Last.fm session for {username}");
        }
        Commands::Run(args) => handle_run(args)?,
    }
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config_path = args.config_path.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;
    let cookie = config
        .cookie
        .clone()
        .context("No YouTube Music cookie configured. Run `ytmscrobble set-cookie` first.")?;

    let http = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed building HTTP client")?;

    println!("Fetching YouTube Music history...");
    let records = match fetch_records(&http, &cookie) {
        Ok(records) => records,
        Err(err) => {
            let kind = classify_error(&format!("{err:#}"));
            if kind == FailureKind::Auth {
                print_auth_guidance();
            } else {
                println!("Error fetching history ({})", kind.label());
            }
            return Err(err);
        }
    };
    println!("Retrieved {} songs from history", records.len());

    let unknown = collect_unknown_phrases(&records);
    if !unknown.is_empty() {
        println!("Unknown played-at phrases: {}", unknown.join(", "));
        log::warn!("unrecognized played-at phrases: {unknown:?}");
    }
    let languages = detected_today_languages(&records);
    if !languages.is_empty() {
        println!(
            "Detected languages in today's songs: {}",
            languages.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    let today: Vec<PlayRecord> = records.iter().filter(|r| played_today(r)).cloned().collect();
    println!("Found {} songs played today", today.len());
    if today.is_empty() {
        println!("No songs played today. Nothing to scrobble.");
        return Ok(());
    }

    let db_path = args.db_path.unwrap_or_else(default_db_path);
    let store = HistoryStore::open(&db_path)?;
    let stored = store.all()?;
    let first_time = stored.is_empty();

    let max_first_time = args.max_first_time.unwrap_or(config.max_first_time_songs);
    let pro = args.pro || config.pro;
    let decisions = plan_scrobbles(&today, &stored, first_time, max_first_time);
    let total_submissions = decisions.iter().filter(|d| d.should_submit).count();
    println!(
        "Processing {} songs ({} will be scrobbled)",
        decisions.len(),
        total_submissions
    );
    if first_time && total_submissions > 0 {
        println!("First run: limiting scrobbles to the {max_first_time} most recent songs");
    }

    if args.dry_run {
        for decision in &decisions {
            let verb = if decision.should_submit {
                "would scrobble"
            } else {
                "would skip"
            };
            println!(
                "{verb} [{}] {} by {}",
                decision.reason.label(),
                decision.record.title,
                decision.record.artist
            );
        }
        return Ok(());
    }

    // Tracks that fell out of today's window are forgotten so a later
    // reappearance counts as a new listen.
    let stale: Vec<_> = stored
        .iter()
        .filter(|row| !today.iter().any(|record| row.matches(record)))
        .collect();
    if !stale.is_empty() {
        println!(
            "Removing {} songs no longer in today's history",
            stale.len()
        );
        for row in &stale {
            store.remove(&row.title, &row.artist, &row.album)?;
        }
    }

    let client = if total_submissions > 0 {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            bail!("Missing Last.fm API keys. Run `ytmscrobble set-keys` first.");
        }
        let session_key = config
            .session_key
            .as_deref()
            .context("No Last.fm session configured. Run `ytmscrobble login` first.")?;
        Some(ScrobbleClient::new(
            &config.api_key,
            &config.api_secret,
            session_key,
            args.debug_response,
        )?)
    } else {
        None
    };

    let now = chrono::Utc::now().timestamp();
    let mut submitted = 0usize;
    let mut submission_index = 0usize;
    let mut processed = 0usize;
    let mut consecutive_failures = 0u32;

    for decision in &decisions {
        let outcome = apply_decision(
            &store,
            client.as_ref(),
            decision,
            submission_index,
            total_submissions,
            now,
            pro,
            first_time,
        );
        match outcome {
            Ok(did_submit) => {
                processed += 1;
                consecutive_failures = 0;
                if did_submit {
                    submitted += 1;
                    submission_index += 1;
                    println!(
                        "{}: {} by {}",
                        action_label(decision.reason),
                        decision.record.title,
                        decision.record.artist
                    );
                }
            }
            Err(err) => {
                let rendered = format!("{err:#}");
                let kind = classify_error(&rendered);
                println!(
                    "ERROR processing '{}' by {}: {rendered}",
                    decision.record.title, decision.record.artist
                );
                println!("Error type: {}", kind.label());
                if kind == FailureKind::Auth {
                    println!("Authentication error detected. Stopping execution.");
                    break;
                }
                consecutive_failures += 1;
                if should_deactivate(kind, consecutive_failures) {
                    println!(
                        "{consecutive_failures} consecutive {} failures; check the account before running again.",
                        kind.label()
                    );
                }
            }
        }
    }

    println!();
    println!("Scrobbling completed.");
    println!("  Songs in today's history: {}", today.len());
    println!("  Songs scrobbled: {submitted}");
    println!("  Songs processed: {processed}");
    Ok(())
}

fn fetch_records(http: &Client, cookie: &str) -> Result<Vec<PlayRecord>> {
    let html = fetch_history_page(http, cookie)?;
    let tree = extract_initial_data(&html)?;
    parse_history(&tree)
}

/// Submits if the decision calls for it, then persists the new position.
/// Either step failing skips the persist so the next run retries.
#[allow(clippy::too_many_arguments)]
fn apply_decision(
    store: &HistoryStore,
    client: Option<&ScrobbleClient>,
    decision: &Decision,
    submission_index: usize,
    total_submissions: usize,
    now: i64,
    pro: bool,
    first_time: bool,
) -> Result<bool> {
    let mut did_submit = false;
    if decision.should_submit {
        let client = client.context("scrobble client not initialized")?;
        let timestamp =
            scrobble_timestamp(now, submission_index, total_submissions, pro, first_time);
        client.scrobble(
            &decision.record.title,
            &decision.record.artist,
            &decision.record.album,
            timestamp,
        )?;
        did_submit = true;
    }
    store.record_position(&decision.record, decision.position, first_time)?;
    Ok(did_submit)
}

fn action_label(reason: Reason) -> &'static str {
    match reason {
        Reason::NewSong => "NEW",
        Reason::Reproduction => "RE-SCROBBLE",
        Reason::FirstTime => "FIRST-TIME",
        Reason::PositionUpdate | Reason::FirstTimeNoScrobble => "TRACKED",
    }
}

fn prompt_cookie() -> Result<String> {
    println!("To get your cookie:");
    println!("1. Sign in at https://music.youtube.com");
    println!("2. Open Developer Tools, Network tab, and refresh the page");
    println!("3. Copy the entire 'Cookie' header of any music.youtube.com request");
    println!("The value must contain '__Secure-3PAPISID='.");
    print!("Paste your YouTube Music cookie: ");
    use std::io::Write;
    std::io::stdout().flush().context("Failed flushing stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed reading cookie from stdin")?;
    Ok(line.trim().to_string())
}

fn print_auth_guidance() {
    println!("YouTube Music authentication failed.");
    println!("Your cookie appears to be expired or invalid.");
    println!("1. Sign in again at https://music.youtube.com");
    println!("2. Copy the new cookie from Developer Tools");
    println!("3. Run `ytmscrobble set-cookie` and try again");
    println!("Note: cookies typically expire after a few hours or days.");
}
