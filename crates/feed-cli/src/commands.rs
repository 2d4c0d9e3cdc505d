use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use feed_crypto::{AddressDeriver, ContentHasher, DerivedAddress};
use feed_ledger::{InMemoryLedger, LedgerClock, WriteError};
use feed_sdk::{
    CommentDraft, FeedSession, FeedView, Identity, PostDraft, ProgramId, SdkError, SdkResult,
    SessionConfig, WriteReceipt,
};
use feed_types::AccountLocator;
use tracing::warn;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    match cli.command {
        Command::Derive(args) => cmd_derive(args, &config, cli.format),
        Command::Hash(args) => cmd_hash(args, cli.format).await,
        Command::Simulate(args) => cmd_simulate(args, config, cli.format).await,
        Command::Config => cmd_config(&config),
    }
}

#[derive(Serialize)]
struct DeriveReport {
    locator: String,
    address: String,
    bump: u8,
    program_id: String,
}

fn cmd_derive(args: DeriveArgs, config: &SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let program = match &args.program {
        Some(hex) => ProgramId::from_hex(hex).context("invalid --program")?,
        None => config.program_id,
    };
    let locator = match args.target {
        DeriveTarget::State => AccountLocator::State,
        DeriveTarget::Post { index } => AccountLocator::post(index),
        DeriveTarget::Comment {
            post_index,
            comment_index,
        } => AccountLocator::comment(post_index, comment_index),
    };
    let derived: DerivedAddress = AddressDeriver::new(program).derive(&locator)?;

    match format {
        OutputFormat::Json => print_json(&DeriveReport {
            locator: locator.to_string(),
            address: derived.address.to_hex(),
            bump: derived.bump,
            program_id: program.to_hex(),
        }),
        OutputFormat::Text => {
            println!("{} {}", locator.to_string().yellow().bold(), derived.address.to_hex());
            println!("  Bump: {}", derived.bump.to_string().cyan());
            println!("  Program: {}", program.to_hex().dimmed());
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct HashReport {
    file: String,
    digest: String,
    post_text: String,
}

async fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let digest = ContentHasher::hash_file(&args.file)
        .await
        .with_context(|| format!("hashing {}", args.file.display()))?;
    let post_text = PostDraft::media(digest).text.unwrap_or_default();

    match format {
        OutputFormat::Json => print_json(&HashReport {
            file: args.file.display().to_string(),
            digest: digest.to_hex(),
            post_text,
        }),
        OutputFormat::Text => {
            println!("{}  {}", digest.to_hex(), args.file.display().to_string().bold());
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct ClientReport {
    identity: String,
    posts_written: u64,
    comments_written: u64,
    /// Derivations beyond the first, i.e. races lost to other clients.
    rederivations: u64,
    /// Writes that exhausted the retry limit and were resubmitted.
    conflicts: u64,
}

#[derive(Serialize)]
struct SimulationReport {
    clients: Vec<ClientReport>,
    total_posts: usize,
    expected_posts: u64,
    comments_on_first_post: usize,
    view: FeedView,
}

async fn cmd_simulate(
    args: SimulateArgs,
    config: SessionConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    anyhow::ensure!(args.clients > 0, "--clients must be at least 1");
    let ledger = Arc::new(InMemoryLedger::with_clock(
        config.program_id,
        LedgerClock::manual(1_700_000_000),
    ));

    let mut tasks = Vec::with_capacity(args.clients);
    for client in 0..args.clients {
        let session = FeedSession::new(ledger.clone(), Identity::ephemeral(), config.clone())?;
        let ledger = ledger.clone();
        let (posts, comments) = (args.posts, args.comments);
        tasks.push(tokio::spawn(async move {
            let mut report = ClientReport {
                identity: session.identity().short_id(),
                posts_written: 0,
                comments_written: 0,
                rederivations: 0,
                conflicts: 0,
            };
            for i in 0..posts {
                ledger.advance_clock(1);
                let text = format!("client {client} post {i}");
                let receipt = resubmitting(&mut report.conflicts, || {
                    session.create_post(PostDraft::text(text.clone()))
                })
                .await?;
                report.posts_written += u64::from(receipt.is_written());
                report.rederivations += u64::from(receipt.attempts.saturating_sub(1));
                tokio::task::yield_now().await;
            }
            // Comments go on post 0, which exists once any post does.
            let comments = if posts > 0 { comments } else { 0 };
            for i in 0..comments {
                ledger.advance_clock(1);
                let text = format!("client {client} comment {i}");
                let receipt = resubmitting(&mut report.conflicts, || {
                    session.create_comment(0, CommentDraft::text(text.clone()))
                })
                .await?;
                report.comments_written += u64::from(receipt.is_written());
                report.rederivations += u64::from(receipt.attempts.saturating_sub(1));
            }
            if posts > 0 {
                session.like_post(0).await?;
            }
            anyhow::Ok(report)
        }));
    }

    let mut clients = Vec::with_capacity(tasks.len());
    for task in tasks {
        clients.push(task.await??);
    }

    let observer = FeedSession::new(ledger.clone(), Identity::ephemeral(), config)?;
    let view = observer.refresh_now().await?;
    let comments = if view.is_empty() {
        Vec::new()
    } else {
        observer.fetch_comments(0).await?
    };

    let report = SimulationReport {
        clients,
        total_posts: view.len(),
        expected_posts: args.posts * args.clients as u64,
        comments_on_first_post: comments.len(),
        view: FeedView::clone(&view),
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print_simulation(&report, args.show);
            Ok(())
        }
    }
}

fn print_simulation(report: &SimulationReport, show: usize) {
    let converged = report.total_posts as u64 == report.expected_posts;
    let mark = if converged { "✓".green().bold() } else { "✗".red().bold() };
    println!(
        "{} {} posts from {} clients (expected {})",
        mark,
        report.total_posts.to_string().bold(),
        report.clients.len(),
        report.expected_posts
    );
    for c in &report.clients {
        println!(
            "  client {}: {} posts, {} comments, {} re-derivations, {} conflicts",
            c.identity.cyan(),
            c.posts_written,
            c.comments_written,
            c.rederivations.to_string().yellow(),
            c.conflicts.to_string().yellow()
        );
    }
    println!(
        "  Comments on post 0: {}",
        report.comments_on_first_post.to_string().bold()
    );
    println!("  View fingerprint: {}", report.view.fingerprint_hex().dimmed());
    println!();
    for entry in report.view.posts().iter().take(show) {
        let post = &entry.post;
        println!(
            "{}  {}  {}",
            format!("#{}", post.index).yellow(),
            post.post_time.to_string().dimmed(),
            post.text
        );
        println!(
            "    by {} ({}), {} likes, {} comments",
            post.display_name,
            post.author.short_id().cyan(),
            post.like_count,
            post.comment_count
        );
    }
}

/// Resubmit a write that lost too many races in a row. Each conflict means
/// another client advanced the counter, so this terminates.
async fn resubmitting<F, Fut>(conflicts: &mut u64, mut op: F) -> SdkResult<WriteReceipt>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SdkResult<WriteReceipt>>,
{
    loop {
        match op().await {
            Err(SdkError::Write(WriteError::ConcurrentWriteConflict { scope, attempts })) => {
                warn!(%scope, attempts, "write conflict, resubmitting");
                *conflicts += 1;
            }
            other => return other,
        }
    }
}

fn cmd_config(config: &SessionConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
