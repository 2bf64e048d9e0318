mod adapter;
mod catalog;
mod compose;
mod config;
mod controller;
mod export;
mod fit;
mod input;
mod session;
mod store;

use crate::adapter::TerminalAdapter;
use crate::catalog::BoardCatalog;
use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::controller::{InteractionController, Outcome, Step};
use crate::export::{DirSink, ExportService};
use crate::store::{FileStorage, FitResultStore, MemoryStorage};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let path_arg = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .value_name("PATH")
            .help(help)
            .value_parser(clap::value_parser!(PathBuf))
    };

    Command::new("board-fit")
        .version("0.1.0")
        .about("Interactive board-to-avatar fitting tool")
        .arg(
            path_arg("config", "Tool configuration file")
                .default_value(DEFAULT_CONFIG_FILE)
                .global(true),
        )
        .arg(path_arg("metadata", "Board metadata document (boards_metadata.json)").global(true))
        .arg(path_arg("assets-root", "Directory board paths are relative to").global(true))
        .arg(path_arg("results-dir", "Where fit results are persisted").global(true))
        .arg(path_arg("export-dir", "Where exports are written").global(true))
        .subcommand(
            Command::new("fit").about("Fit boards interactively (default)").arg(
                Arg::new("scratch")
                    .long("scratch")
                    .help("Keep fit results in memory only; nothing is read from or saved to disk")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("scan")
                .about("Regenerate board metadata from <boards-dir>/<W>x<H>/*.png")
                .arg(path_arg("boards-dir", "Board asset directory"))
                .arg(path_arg("out", "Output metadata file")),
        )
        .subcommand(
            Command::new("export")
                .about("Export all persisted fit results")
                .arg(path_arg("out", "Output file (defaults to <export-dir>/<export file name>)")),
        )
        .subcommand(Command::new("report").about("Print fit results of every catalog board that has one"))
}

fn resolve_config(matches: &ArgMatches) -> Result<Config> {
    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;

    if let Some(v) = matches.get_one::<PathBuf>("metadata") {
        config.metadata_path = v.clone();
    }
    if let Some(v) = matches.get_one::<PathBuf>("assets-root") {
        config.assets_root = v.clone();
    }
    if let Some(v) = matches.get_one::<PathBuf>("results-dir") {
        config.results_dir = v.clone();
    }
    if let Some(v) = matches.get_one::<PathBuf>("export-dir") {
        config.export_dir = v.clone();
    }
    Ok(config)
}

fn load_catalog(config: &Config) -> Result<BoardCatalog> {
    BoardCatalog::load(&config.metadata_path).with_context(|| {
        format!(
            "Cannot fit boards without metadata (run `board-fit scan` to generate {})",
            config.metadata_path.display()
        )
    })
}

fn load_store(config: &Config) -> FitResultStore {
    FitResultStore::load(
        Box::new(FileStorage::new(&config.results_dir)),
        config.storage_key.clone(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = resolve_config(&matches)?;

    match matches.subcommand() {
        Some(("scan", sub)) => run_scan(&config, sub),
        Some(("export", sub)) => run_export(&config, sub),
        Some(("report", _)) => run_report(&config),
        Some(("fit", sub)) => run_fit(config, sub.get_flag("scratch")).await,
        _ => run_fit(config, false).await,
    }
}

fn run_scan(config: &Config, matches: &ArgMatches) -> Result<()> {
    let boards_dir = matches
        .get_one::<PathBuf>("boards-dir")
        .cloned()
        .unwrap_or_else(|| config.boards_dir.clone());
    let out = matches
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| boards_dir.join("boards_metadata.json"));

    let metadata = catalog::scan_boards_dir(&boards_dir)?;
    let text = serde_json::to_string_pretty(&metadata).context("Failed to encode board metadata")?;
    fs::write(&out, text).with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Found {} board entries.", metadata.len());
    println!("Metadata saved to {}", out.display());
    Ok(())
}

fn run_export(config: &Config, matches: &ArgMatches) -> Result<()> {
    let store = load_store(config);
    let mut exporter = match matches.get_one::<PathBuf>("out") {
        Some(out) => {
            let dir = out
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = out
                .file_name()
                .context("Export path has no file name")?
                .to_string_lossy()
                .into_owned();
            ExportService::new(Box::new(DirSink::new(dir)), name)
        }
        None => ExportService::new(
            Box::new(DirSink::new(&config.export_dir)),
            config.export_file_name.clone(),
        ),
    };

    let location = exporter
        .export_all(&store)
        .context("Failed to export fit results")?;
    println!("Exported {} fit results to {}", store.len(), location);
    Ok(())
}

fn run_report(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    let store = load_store(config);
    let report = export::batch_report(&catalog, &store);
    for (id, record) in &report {
        let json = serde_json::to_string(record).context("Failed to encode fit record")?;
        println!("Board {} => {}", id, json);
    }
    println!("{} of {} boards have fit results.", report.len(), catalog.len());
    Ok(())
}

fn print_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Loading(_) | Outcome::Updated => {}
        Outcome::Saved => println!("Saved."),
        Outcome::Exported(location) => println!("Exported to {}", location),
        Outcome::Batch(report) => println!("Batch results logged: {} boards.", report.len()),
    }
}

async fn run_fit(config: Config, scratch: bool) -> Result<()> {
    let catalog = load_catalog(&config)?;
    let store = if scratch {
        info!("Scratch session: fit results stay in memory");
        FitResultStore::new(Box::new(MemoryStorage::new()), config.storage_key.clone())
    } else {
        load_store(&config)
    };
    let exporter = ExportService::new(
        Box::new(DirSink::new(&config.export_dir)),
        config.export_file_name.clone(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let adapter = TerminalAdapter::new(&config.assets_root, tx.clone());
    let labels: Vec<String> = catalog.boards().iter().map(|b| b.label()).collect();

    let mut controller = InteractionController::new(catalog, store, exporter, adapter, config.anchor);
    println!("{}", input::HELP);
    controller.start().context("Failed to start fitting session")?;

    // Stdin is blocking; the session itself stays on this task
    thread::spawn(move || input::run_input_loop(labels, tx));

    while let Some(event) = rx.recv().await {
        match controller.dispatch(event) {
            Step::Continue(Ok(outcome)) => outcome.into_iter().for_each(print_outcome),
            Step::Continue(Err(e)) => eprintln!("{}", e),
            Step::Quit => break,
        }
        println!("{}", controller.status_line());
    }

    info!(records = controller.store().len(), "Fitting session ended");
    Ok(())
}
