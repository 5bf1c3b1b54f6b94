use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;

use diskclean::classifier::RiskLevel;
use diskclean::cleaner::{CleanupEngine, CleanupReport, Selection};
use diskclean::cli::args::{CacheAction, Cli, Commands, ConfigAction, OutputFormat, RiskFilter};
use diskclean::cli::{logging, output};
use diskclean::common::config::Config;
use diskclean::common::format;
use diskclean::common::progress::{CancellationToken, NoProgress};
use diskclean::scanner::cache::FileCacheStore;
use diskclean::scanner::ScanLimits;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let _log_guard = logging::init_logger(&Config::logs_dir(), cli.verbose);

    match &cli.command {
        Commands::Analyze {
            path,
            no_cache,
            max_files,
            max_seconds,
            detailed,
        } => cmd_analyze(&cli, path, *no_cache, *max_files, *max_seconds, *detailed),

        Commands::Clean {
            path,
            confirm,
            risk,
            duplicates,
            yes_confirm_all,
            no_cache,
        } => cmd_clean(
            &cli,
            path,
            confirm,
            *risk,
            *duplicates,
            *yes_confirm_all,
            *no_cache,
        ),

        Commands::Cache { action } => cmd_cache(&cli, action),
        Commands::Config { action } => cmd_config(action),
    }
}

fn build_engine(target: &Path, no_cache: bool) -> Result<CleanupEngine> {
    let config = Config::load_layered(Some(target))?;
    let store = FileCacheStore::new(config.cache_dir(), config.cache.ttl_days);
    let mut engine = CleanupEngine::new(config, Box::new(store))?;
    if no_cache {
        engine = engine.without_cache();
    }
    Ok(engine)
}

fn show_progress(cli: &Cli) -> bool {
    cli.format == OutputFormat::Human
}

fn run_analysis(cli: &Cli, engine: &CleanupEngine, path: &Path) -> Result<CleanupReport> {
    let report = if show_progress(cli) {
        let spinner = output::SpinnerProgress::new("Scanning");
        let result = engine.analyze_with_progress(path, &spinner);
        spinner.finish();
        result?
    } else {
        engine.analyze(path)?
    };
    Ok(report)
}

// ─── Analyze ──────────────────────────────────────────────────────────────────

fn cmd_analyze(
    cli: &Cli,
    path: &Path,
    no_cache: bool,
    max_files: Option<u64>,
    max_seconds: Option<u64>,
    detailed: bool,
) -> Result<()> {
    let mut engine = build_engine(path, no_cache)?;
    if max_files.is_some() || max_seconds.is_some() {
        let current = engine.limits();
        engine = engine.with_limits(ScanLimits {
            max_files: max_files.map(|n| n as usize).or(current.max_files),
            max_duration: max_seconds
                .map(std::time::Duration::from_secs)
                .or(current.max_duration),
        });
    }

    let report = run_analysis(cli, &engine, path)?;

    match cli.format {
        OutputFormat::Human => output::print_report(&report, detailed),
        OutputFormat::Json => output::print_report_json(&report),
        OutputFormat::Quiet => output::print_report_quiet(&report),
    }
    Ok(())
}

// ─── Clean ────────────────────────────────────────────────────────────────────

fn cmd_clean(
    cli: &Cli,
    path: &Path,
    token: &str,
    risk: RiskFilter,
    duplicates: bool,
    yes_confirm_all: bool,
    no_cache: bool,
) -> Result<()> {
    let engine = build_engine(path, no_cache)?;
    let report = run_analysis(cli, &engine, path)?;
    let selection = select(&report, risk, duplicates, yes_confirm_all);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!("Ctrl-C will not cancel this run: {}", e);
        }
    }

    let log = if show_progress(cli) && !selection.is_empty() {
        let spinner = output::SpinnerProgress::new("Deleting");
        let log = engine.execute_with(&report, &selection, token, &cancel, &spinner);
        spinner.finish();
        log
    } else {
        engine.execute_with(&report, &selection, token, &cancel, &NoProgress)
    };

    let log_path = if log.token_accepted {
        match log.save(&Config::logs_dir()) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("Failed to write deletion log: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    match cli.format {
        OutputFormat::Human => output::print_deletion_log(&log, log_path.as_deref()),
        OutputFormat::Json => output::print_deletion_json(&log),
        OutputFormat::Quiet => output::print_deletion_quiet(&log),
    }
    Ok(())
}

/// Turn command-line filters into a selection over the report's candidates
fn select(report: &CleanupReport, risk: RiskFilter, duplicates: bool, confirm_all: bool) -> Selection {
    let mut selection = Selection::new();
    for candidate in &report.candidates {
        if candidate.duplicate_of.is_some() && duplicates {
            // --duplicates is the explicit approval for copies
            selection.select_confirmed(candidate.entry.path.clone());
            continue;
        }
        match candidate.risk {
            RiskLevel::Safe => selection.select(candidate.entry.path.clone()),
            RiskLevel::ConfirmNeeded if risk == RiskFilter::Confirm => {
                if confirm_all {
                    selection.select_confirmed(candidate.entry.path.clone());
                } else {
                    selection.select(candidate.entry.path.clone());
                }
            }
            _ => {}
        }
    }
    selection
}

// ─── Cache ────────────────────────────────────────────────────────────────────

fn cmd_cache(cli: &Cli, action: &CacheAction) -> Result<()> {
    let config = Config::load()?;
    let store = FileCacheStore::new(config.cache_dir(), config.cache.ttl_days);

    match action {
        CacheAction::Clear => {
            let removed = store.clear_all()?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "removed": removed })),
                OutputFormat::Quiet => println!("{}", removed),
                OutputFormat::Human => println!(
                    "  {} Removed {} cached snapshots. Next scan will be fresh.",
                    "✓".green(),
                    removed
                ),
            }
        }
        CacheAction::Stats => {
            let count = store.record_count();
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "dir": store.dir(),
                        "records": count,
                        "ttl_days": config.cache.ttl_days,
                    })
                ),
                OutputFormat::Quiet => println!("{}", count),
                OutputFormat::Human => {
                    format::print_header("Snapshot cache");
                    format::print_kv("Location", &format::format_path(store.dir()));
                    format::print_kv("Records", &count.to_string());
                    format::print_kv("TTL", &format!("{} days", config.cache.ttl_days));
                    println!();
                }
            }
        }
    }
    Ok(())
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { project } => {
            let config = Config::load_layered(project.as_deref())?;
            config.validate().context("Configuration is invalid")?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigAction::Init => {
            let config = Config::default();
            config.init_dirs()?;
            config.save()?;
            println!(
                "  {} diskclean initialized at {}",
                "✓".green(),
                format::format_path(&Config::data_dir())
            );
            println!("  Created: config.toml, cache/, logs/, backup/");
            Ok(())
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
            Ok(())
        }
    }
}
