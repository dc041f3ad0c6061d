// Command-line entry point.
// Wires config, the GitHub client, and the local manager into a few one-shot commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use tokio::sync::mpsc;

use repobar::Config;
use repobar::error::{RepoBarError, Result};
use repobar::github::{GitHubClient, RepoApi};
use repobar::local::LocalRepoManager;
use repobar::sync::{RecentMenuKind, RecentMenuService, RepoDetailCoordinator, Repository};

#[derive(Parser)]
#[command(name = "repobar")]
#[command(about = "GitHub repository status with per-field caching and local clone sync")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the merged status of a repository
    Repo {
        /// Repository as owner/name
        repo: String,
    },
    /// Show a recent-item list (commits, issues, pulls, releases, runs, discussions, tags, branches, contributors)
    Recent {
        kind: String,
        /// Repository as owner/name
        repo: String,
    },
    /// Scan local clones and report their sync state
    Local {
        /// Root directory to scan (defaults to the configured root)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Fast-forward clones that are cleanly behind
        #[arg(long)]
        sync: bool,
    },
    /// Delete cached repository details
    ClearCache,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e.user_facing_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Repo { repo } => {
            let (owner, name) = split_full_name(&repo)?;
            let coordinator = RepoDetailCoordinator::from_config(client(&config)?, &config);
            let repository = coordinator.full_repository(owner, name).await;
            print_repository(&repository);
        }
        Commands::Recent { kind, repo } => {
            let (owner, name) = split_full_name(&repo)?;
            let kind = RecentMenuKind::parse(&kind)
                .ok_or_else(|| RepoBarError::Other(format!("Unknown list kind: {}", kind)))?;
            let service = RecentMenuService::new(client(&config)?, &config.recent_lists);
            let items = service
                .load(kind, owner, name)
                .await
                .map_err(|e| RepoBarError::Other(e.user_facing_message()))?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Local { root, sync } => {
            let mut settings = config.local.clone();
            if root.is_some() {
                settings.root_path = root;
            }
            settings.auto_sync_enabled |= sync;
            run_local(settings).await?;
        }
        Commands::ClearCache => {
            let coordinator = RepoDetailCoordinator::from_config(client(&config)?, &config);
            coordinator.clear_cache();
            println!("Cache cleared");
        }
    }
    Ok(())
}

async fn run_local(settings: repobar::config::LocalProjectsSettings) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = LocalRepoManager::new().with_notifier(tx);

    // Git runs as blocking child processes.
    let index = tokio::task::spawn_blocking(move || manager.snapshot(&settings))
        .await
        .map_err(|e| RepoBarError::Other(e.to_string()))?;

    while let Some(notification) = rx.recv().await {
        println!("{}", notification.message);
    }

    for status in index.all() {
        println!(
            "{:<40} {:<20} {}",
            status.display_name(),
            status.branch,
            status.sync_detail()
        );
    }
    if index.is_empty() {
        println!("No local clones found");
    }
    Ok(())
}

fn client(config: &Config) -> Result<Arc<dyn RepoApi>> {
    let token = repobar::config::token_from_env()?;
    Ok(Arc::new(GitHubClient::new(&token, &config.api_host)?))
}

fn split_full_name(value: &str) -> Result<(&str, &str)> {
    match value.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(RepoBarError::Other(format!(
            "Expected owner/name, got {:?}",
            value
        ))),
    }
}

fn print_repository(repo: &Repository) {
    println!("{}", repo.full_name());
    if let Some(description) = &repo.description {
        println!("  {}", description);
    }
    println!("  stars {}  forks {}", repo.stars, repo.forks);
    println!("  open pulls {}  open issues {}", repo.open_pulls, repo.open_issues);
    match repo.ci_run_count {
        Some(runs) => println!("  ci {:?} ({} runs)", repo.ci_status, runs),
        None => println!("  ci {:?}", repo.ci_status),
    }
    if let Some(release) = &repo.latest_release {
        println!("  release {}", release.display_name());
    }
    if let Some(line) = repo.activity_line() {
        println!("  {}", line);
    }
    if let Some(traffic) = &repo.traffic {
        println!(
            "  views {} ({} unique)  clones {} ({} unique)",
            traffic.views, traffic.unique_visitors, traffic.clones, traffic.unique_cloners
        );
    }
    if !repo.heatmap.is_empty() {
        let commits: u64 = repo.heatmap.iter().map(|cell| cell.count).sum();
        println!("  {} commits in the last year", commits);
    }
    if let Some(state) = &repo.detail_cache_state {
        println!("  {} stale fields", state.stale_field_count());
    }
    if let Some(error) = &repo.error {
        println!("  error: {}", error);
    }
    if let Some(until) = repo.rate_limited_until {
        println!("  rate limited until {}", until.to_rfc3339());
    }
}
