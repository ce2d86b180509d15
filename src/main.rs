use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use code_swipe::api::SessionResponse;
use code_swipe::card::{Card, CardId};
use code_swipe::config::Config;
use code_swipe::controller::{Action, ReviewController, ReviewState, SubmitOutcome};
use code_swipe::report;
use code_swipe::session::{Progress, SessionStore};
use code_swipe::source::{CardSource, FixtureSource, ManifestSource};
use code_swipe::submit::{DryRunSubmitter, GitHubSubmitter, PullRequestSubmitter};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

/// Code Swipe: review auto-extracted functions one card at a time
/// (approve, edit or skip) and submit the result as a GitHub Pull Request.
#[derive(Parser, Debug)]
#[command(name = "code-swipe", version, about)]
struct Cli {
    /// Repository to review (owner/name or https://github.com/owner/name)
    ///
    /// Not required when --mock is used.
    repo: Option<String>,

    /// JSON card manifest produced by the extractor
    #[arg(long)]
    cards: Option<PathBuf>,

    /// Use built-in sample cards and a dry-run submitter (no GitHub token needed)
    #[arg(long)]
    mock: bool,

    /// Optional output file path for the markdown session report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the final session snapshot as JSON
    #[arg(long)]
    json: bool,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;

    let (repo, source, submitter) = if cli.mock {
        info!("using sample cards and dry-run submitter");
        let repo = cli.repo.clone().unwrap_or_else(|| "demo/code-swipe".to_string());
        let source: Arc<dyn CardSource> = Arc::new(FixtureSource);
        let submitter: Arc<dyn PullRequestSubmitter> = Arc::new(DryRunSubmitter);
        (repo, source, submitter)
    } else {
        let repo = cli.repo.clone().ok_or(
            "Repository is required unless --mock is used. Usage: code-swipe <OWNER/NAME> --cards <FILE> or code-swipe --mock",
        )?;
        let cards = cli
            .cards
            .clone()
            .ok_or("A card manifest (--cards <FILE>) is required unless --mock is used")?;
        let source: Arc<dyn CardSource> = Arc::new(ManifestSource::new(cards));
        let submitter: Arc<dyn PullRequestSubmitter> = Arc::new(GitHubSubmitter::from_config(&config)?);
        (repo, source, submitter)
    };

    let review_span = info_span!("review", repo = %repo);
    async {
        let store = Arc::new(SessionStore::with_branch_prefix(config.submission.branch_prefix()));
        let session = store.create(&repo, source.as_ref()).await?;
        info!(session = %session.id(), "session ready");

        let mut controller = ReviewController::new(store.clone(), submitter)
            .with_submit_timeout(config.submission.timeout());
        controller.start(session.id())?;

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        run_review(&mut controller, &mut input).await?;
        controller.exit();

        let snapshot = session.snapshot();
        let built_report = report::build(&snapshot);
        report::output(&built_report, cli.output.as_deref())?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&SessionResponse::from(&snapshot))?);
        }
        info!(status = %snapshot.status(), "done");

        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .instrument(review_span)
    .await
}

/// Read commands until the reviewer quits or a pull request is opened.
async fn run_review(
    controller: &mut ReviewController,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let progress = controller.progress()?;
        let shown: Option<CardId> = match controller.state() {
            ReviewState::Showing(card) => {
                render_card(card, &progress);
                println!("[a]pprove  [e]dit  [s]kip  [p]ull request  [q]uit");
                Some(card.id())
            }
            ReviewState::Exhausted => {
                println!("{}", "All cards reviewed!".green().bold());
                println!("[p]ull request  [q]uit");
                None
            }
            _ => return Ok(()),
        };

        let Some(command) = input.next_line().await? else {
            return Ok(());
        };
        let (card_id, action) = match (command.trim(), shown) {
            ("q", _) => return Ok(()),
            ("p", _) => {
                match controller.request_pull_request().await {
                    Ok(result) => {
                        println!("Pull request opened: {}", result.pr_url.green().bold());
                        return Ok(());
                    }
                    Err(e) => println!("{} {}", "Could not open pull request:".red(), e),
                }
                continue;
            }
            ("a", Some(card_id)) => (card_id, Action::Approve),
            ("s", Some(card_id)) => (card_id, Action::Skip),
            ("e", Some(card_id)) => {
                println!("Enter the new code, then a line with a single '.':");
                (card_id, Action::Edit(read_block(input).await?))
            }
            _ => {
                println!("Unknown command: {:?}", command.trim());
                continue;
            }
        };

        match controller.submit(card_id, action) {
            Ok(SubmitOutcome::Applied(state)) => println!("Card {}.", state),
            Ok(SubmitOutcome::Ignored(reason)) => warn!(%reason, "card already handled"),
            Err(e) => println!("{} {}", "Not applied:".red(), e),
        }
    }
}

async fn read_block(input: &mut Input) -> std::io::Result<String> {
    let mut lines = Vec::new();
    while let Some(line) = input.next_line().await? {
        if line == "." {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn render_card(card: &Card, progress: &Progress) {
    println!();
    println!(
        "[{}/{}] {}:{}-{}",
        progress.processed + 1,
        progress.total,
        card.file_path().bold(),
        card.start_line(),
        card.end_line()
    );
    println!("{}", card.signature().cyan());
    println!("{}", "─".repeat(60).dimmed());
    println!("{}", card.original_content());
    println!("{}", "─".repeat(60).dimmed());
}
