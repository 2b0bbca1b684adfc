//! `kvguard` - one-shot driver for KVGuard adaptation cycles

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kvguard_core::scanner::aliases;
use kvguard_core::{
    AuditSink, Collaborators, CsvFileLedgerStore, CycleOrchestrator, GuardFile, InMemoryStore,
    JsonFileLedgerStore, LedgerAuditSink, LogPager, MemoryLedgerStore, StoreEntry,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "KVGUARD_LOG";

fn cli() -> Command {
    Command::new("kvguard")
        .version(kvguard_core::VERSION)
        .about("Audit key-value configuration groups and remediate sensitive data")
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("audit")
                .about("Run one adaptation cycle per configured group")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML file with engine settings and [[groups]]"),
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of raw store entries ({\"Key\", \"Value\"})"),
                )
                .arg(
                    Arg::new("ledger")
                        .long("ledger")
                        .value_parser(value_parser!(PathBuf))
                        .help("Audit ledger file (CSV, or JSON with a .json extension)"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Parse a configuration file and list its groups")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML file to validate"),
                ),
        )
        .subcommand(Command::new("aliases").about("List built-in guard pattern aliases"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    let result = match matches.subcommand() {
        Some(("audit", args)) => audit(args).await,
        Some(("validate", args)) => validate(args),
        Some(("aliases", _)) => {
            for (name, pattern) in aliases() {
                println!("{name}\t{pattern}");
            }
            Ok(true)
        }
        _ => Ok(true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "kvguard failed");
            ExitCode::FAILURE
        }
    }
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing --{name}"))
}

async fn load_snapshot(path: &Path) -> Result<Vec<StoreEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn ledger_sink(path: Option<&Path>, link: String) -> Arc<dyn AuditSink> {
    match path {
        Some(path) if is_json(path) => {
            Arc::new(LedgerAuditSink::new(JsonFileLedgerStore::new(path), link))
        }
        Some(path) => Arc::new(LedgerAuditSink::new(CsvFileLedgerStore::new(path), link)),
        None => Arc::new(LedgerAuditSink::new(MemoryLedgerStore::new(), link)),
    }
}

/// Returns `Ok(false)` when any group's cycle aborted
async fn audit(args: &ArgMatches) -> Result<bool> {
    let config_path = path_arg(args, "config")?;
    let file = GuardFile::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let entries = load_snapshot(path_arg(args, "snapshot")?).await?;

    let link = file.config.reference_link.clone();
    let audit = ledger_sink(args.get_one::<PathBuf>("ledger").map(PathBuf::as_path), link);

    let orchestrator = CycleOrchestrator::new(
        &file.config,
        Collaborators {
            store: Arc::new(InMemoryStore::with_entries(entries)),
            pager: Arc::new(LogPager),
            audit,
        },
    );

    tracing::info!(groups = file.groups.len(), "starting audit");
    let results =
        futures::future::join_all(file.groups.iter().map(|spec| orchestrator.run_group(spec)))
            .await;

    let mut all_ok = true;
    let report: Vec<_> = file
        .groups
        .iter()
        .zip(results)
        .map(|(spec, result)| match result {
            Ok(outcome) => json!(outcome),
            Err(e) => {
                all_ok = false;
                json!({
                    "group": spec.key(),
                    "error": e.to_string(),
                    "retryable": e.is_retryable(),
                })
            }
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("rendering report")?
    );
    Ok(all_ok)
}

fn validate(args: &ArgMatches) -> Result<bool> {
    let path = path_arg(args, "config")?;
    let file =
        GuardFile::load(path).with_context(|| format!("loading config {}", path.display()))?;

    println!(
        "debounce window: {}s, pattern cache: {}",
        file.config.debounce_window_secs, file.config.pattern_cache_capacity
    );
    for spec in &file.groups {
        println!(
            "{}\tqos={}\tpaths={}\tguards={}",
            spec.key(),
            spec.qos,
            spec.paths.len(),
            spec.guard_against.join(",")
        );
    }
    Ok(true)
}
