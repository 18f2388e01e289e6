//! iftttwh - IFTTT Twitter webhook receiver CLI
//!
//! Main entry point for the iftttwh command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use iftttwh::server::AppState;
use iftttwh::*;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .without_time()
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<IftttwhError>() {
                eprintln!("{}", format_error(err));
            } else {
                eprintln!("{} {e:#}", "✗".red().bold());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Serve(args) => cmd_serve(cli, args),
        Commands::Migrate => cmd_migrate(cli),
        Commands::Restore(args) => cmd_restore(cli, args),
        Commands::Import(args) => cmd_import(cli, args),
        Commands::Export(args) => cmd_export(cli, args),
        Commands::Latest(args) => cmd_latest(cli, args),
        Commands::Search(args) => cmd_search(cli, args),
        Commands::Config(args) => cmd_config(args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = Config::load();
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }
    if let Some(migrations) = &cli.migrations {
        config.paths.migrations = Some(migrations.clone());
    }
    config
}

fn get_db_path(cli: &Cli) -> PathBuf {
    load_config(cli).db_path()
}

fn open_storage(cli: &Cli) -> Result<Storage> {
    let db_path = get_db_path(cli);
    if !db_path.exists() {
        return Err(IftttwhError::DatabaseNotFound { path: db_path }.into());
    }
    let storage = Storage::open(&db_path)?;
    Ok(storage)
}

fn cmd_serve(cli: &Cli, args: &cli::ServeArgs) -> Result<ExitCode> {
    let mut config = load_config(cli);
    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(csv) = &args.csv {
        config.paths.csv = Some(csv.clone());
    }
    if args.require_signature {
        config.security.require_signature = true;
    }

    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Migrations run before the database is opened for serving. A failed
    // migration leaves its backup on disk and aborts startup.
    let migrations_dir = config.migrations_dir();
    if migrations_dir.is_dir() {
        let migrator = Migrator::new(&db_path, &migrations_dir);
        let report = migrator.run()?;
        print_migration_report(&report);
        if !report.is_success() {
            return Ok(ExitCode::FAILURE);
        }
    } else {
        debug!(
            "No migrations directory at {}, skipping",
            migrations_dir.display()
        );
    }

    let storage = Storage::open(&db_path)?;
    storage.bootstrap()?;

    if let Some(csv_path) = &config.paths.csv {
        if csv_path.exists() {
            info!("Seeding database from {}", csv_path.display());
            let stats = csv_io::import_tweets(&storage, csv_path, !cli.quiet)?;
            info!(
                "Imported {} tweet(s), skipped {} duplicate(s)",
                stats.inserted, stats.skipped_duplicates
            );
        }
    }

    let embedder = embedder::HashEmbedder::default();
    storage.backfill_embeddings(&embedder)?;

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = Arc::new(AppState::new(storage, config));

    println!(
        "{} http://{host}:{port}",
        "Serving iftttwh at".bold().cyan()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(server::serve(state, &host, port))?;

    Ok(ExitCode::SUCCESS)
}

fn cmd_migrate(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli);
    let migrator = Migrator::new(config.db_path(), config.migrations_dir());
    let report = migrator.run()?;
    print_migration_report(&report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_migration_report(report: &MigrationReport) {
    if report.applied.is_empty() && report.failure.is_none() {
        println!("{} Nothing to migrate", "✓".green());
        return;
    }

    for applied in &report.applied {
        if applied.rows_changed > 0 {
            println!(
                "{} Applied {} ({} row(s) changed)",
                "✓".green(),
                applied.name.bold(),
                format_number(i64::try_from(applied.rows_changed).unwrap_or(i64::MAX)),
            );
        } else {
            println!("{} Applied {}", "✓".green(), applied.name.bold());
        }
    }

    if let Some(failure) = &report.failure {
        println!(
            "{} Migration {} failed: {}",
            "✗".red().bold(),
            failure.name.bold(),
            failure.cause
        );
        if let Some(snapshot) = &failure.snapshot {
            println!(
                "  Backup kept at {}. Restore with: iftttwh restore {}",
                snapshot.display(),
                failure.name
            );
        }
    }
}

fn cmd_restore(cli: &Cli, args: &cli::RestoreArgs) -> Result<ExitCode> {
    let config = load_config(cli);
    let migrator = Migrator::new(config.db_path(), config.migrations_dir());
    let snapshot = migrator.restore(&args.migration_name)?;
    println!(
        "{} Restored database from {}",
        "✓".green(),
        snapshot.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_import(cli: &Cli, args: &cli::ImportArgs) -> Result<ExitCode> {
    let db_path = get_db_path(cli);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let storage = Storage::open(&db_path)?;
    storage.bootstrap()?;

    let stats = csv_io::import_tweets(&storage, &args.csv, !cli.quiet)?;
    println!(
        "{} Imported {} tweet(s), skipped {} duplicate(s)",
        "✓".green(),
        format_number(i64::try_from(stats.inserted).unwrap_or(i64::MAX)),
        format_number(i64::try_from(stats.skipped_duplicates).unwrap_or(i64::MAX)),
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_export(cli: &Cli, args: &cli::ExportArgs) -> Result<ExitCode> {
    let storage = open_storage(cli)?;
    let count = csv_io::export_tweets(&storage, &args.output)?;
    println!(
        "{} Exported {} tweet(s) to {}",
        "✓".green(),
        format_number(i64::try_from(count).unwrap_or(i64::MAX)),
        args.output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_latest(cli: &Cli, args: &cli::LatestArgs) -> Result<ExitCode> {
    let storage = open_storage(cli)?;
    let tweets = storage.latest_tweets(args.limit.max(1))?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&tweets)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&tweets)?),
        OutputFormat::Text => print_tweets(&tweets),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_search(cli: &Cli, args: &cli::SearchArgs) -> Result<ExitCode> {
    let storage = open_storage(cli)?;
    let limit = args.limit.max(1);

    if args.semantic {
        let embedder = embedder::HashEmbedder::default();
        let hits = storage.semantic_search(&embedder, &args.query, limit)?;
        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&hits)?),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&hits)?),
            OutputFormat::Text => {
                for hit in &hits {
                    let similarity = hit.similarity.unwrap_or(0.0);
                    println!(
                        "{} [{similarity:.3}] {}",
                        format!("@{}", hit.tweet.user_name).cyan(),
                        truncate_text(&hit.tweet.text, 120)
                    );
                }
                println!("\n{} result(s)", hits.len());
            }
        }
    } else {
        let tweets = storage.search_tweets(&args.query, limit)?;
        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&tweets)?),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&tweets)?),
            OutputFormat::Text => print_tweets(&tweets),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_tweets(tweets: &[Tweet]) {
    if tweets.is_empty() {
        println!("No tweets found");
        return;
    }

    for tweet in tweets {
        let date = tweet
            .created_at_parsed
            .map_or_else(|| tweet.created_at.clone(), |dt| dt.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{} {}",
            format!("@{}", tweet.user_name).cyan().bold(),
            date.dimmed()
        );
        let wrapped = textwrap::fill(&tweet.text, CONTENT_DIVIDER_WIDTH.saturating_sub(4));
        println!("{}", textwrap::indent(&wrapped, "  "));
        println!("  {}", tweet.link_to_tweet.dimmed());
        println!("{}", "-".repeat(CONTENT_DIVIDER_WIDTH).dimmed());
    }
    println!("{} tweet(s)", tweets.len());
}

fn cmd_config(args: &cli::ConfigArgs) -> Result<ExitCode> {
    let config = Config::load();

    if args.show {
        let toml = toml::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{toml}");
        if let Some(path) = Config::user_config_path() {
            println!("# Config file location: {}", path.display());
        }
    } else {
        println!("Use --show to display the current configuration");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<ExitCode> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(args.shell, &mut cmd, name, &mut io::stdout());
    Ok(ExitCode::SUCCESS)
}
