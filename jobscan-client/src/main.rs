//! jobscan - command-line client for the document-processing backend
//!
//! Validates and uploads scanned pages, follows processing progress over the
//! real-time channel, and exports extracted records to a spreadsheet.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobscan_client::config::{is_valid_key, store_api_key, ClientConfig};
use jobscan_client::models::SelectedFile;
use jobscan_client::services::{records, SpreadsheetClient};
use jobscan_client::{ClientContext, ClientError, ClientResult};
use jobscan_common::api::{UploadOptions, DOWNLOAD_ITEMS};
use jobscan_common::config::{load_or_default, ConfigPathResolver};
use jobscan_common::events::{DescriptionMode, Severity, UiEvent};
use jobscan_common::human_size::format_file_size;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "jobscan")]
#[command(about = "Upload scanned job listings for analysis and export the results")]
#[command(version)]
struct Cli {
    /// Config file (overrides JOBSCAN_CONFIG and the platform default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Processing backend base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check files against the selection limits without uploading
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upload files and follow processing progress
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// API key forwarded to the backend
        #[arg(long)]
        api_key: Option<String>,

        /// Skip automatic page orientation correction
        #[arg(long)]
        no_auto_rotate: bool,

        /// Analyze pages one at a time
        #[arg(long)]
        no_parallel: bool,

        /// Export the results to a spreadsheet once processing completes
        #[arg(long)]
        export: bool,

        /// Spreadsheet destination for --export
        #[arg(long, requires = "export")]
        apps_script_url: Option<String>,
    },

    /// Export a processed batch to a new spreadsheet
    Export {
        process_id: String,

        /// Override the configured spreadsheet destination
        #[arg(long)]
        apps_script_url: Option<String>,
    },

    /// Download the results archive of a processed batch
    Download {
        process_id: String,

        /// Item to include; repeat for several (server default when omitted)
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(DOWNLOAD_ITEMS.iter().copied()))]
        include: Vec<String>,

        /// Where to write the ZIP archive
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Send a JSON file of extracted records straight to a spreadsheet endpoint
    PushRecords {
        records: PathBuf,

        #[arg(long)]
        process_id: String,

        #[arg(long)]
        apps_script_url: String,
    },

    /// Store the API key in the config file
    SetApiKey { key: String },
}

impl Command {
    fn api_key(&self) -> Option<&str> {
        match self {
            Command::Upload { api_key, .. } => api_key.as_deref(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = ConfigPathResolver::new(cli.config.clone()).resolve();
    let toml = load_or_default(config_path.as_deref());
    let config = ClientConfig::resolve(toml, cli.server.as_deref(), cli.command.api_key());

    init_tracing(cli.verbose, &config.logging.level);
    info!("jobscan {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        _ => info!("No config file found, using defaults"),
    }
    info!("Server: {}", config.server_url);

    let ctx = ClientContext::new(config)?;
    let stop_renderer = CancellationToken::new();
    let renderer = spawn_renderer(ctx.event_bus.subscribe(), stop_renderer.clone());

    let result = run(cli.command, &ctx, config_path.as_deref()).await;

    // Anything that is not a client error was never shown to the user
    if let Err(e) = &result {
        if e.downcast_ref::<ClientError>().is_none() {
            ctx.notifications.report_uncaught(e);
        }
    }

    stop_renderer.cancel();
    if let Err(e) = renderer.await {
        warn!("Renderer task failed: {}", e);
    }

    result
}

fn init_tracing(verbose: u8, configured_level: &str) {
    let level = match verbose {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };
    let default_filter = format!(
        "warn,jobscan={0},jobscan_client={0},jobscan_common={0}",
        level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(command: Command, ctx: &ClientContext, config_path: Option<&Path>) -> Result<()> {
    match command {
        Command::Validate { files } => {
            let files = load_files(&files).await?;
            let stats = ctx.controller.select_files(files)?;
            for file in ctx.controller.selection().files() {
                println!("  {:<40} {:>10}  {}", file.name, format_file_size(file.size), file.mime_type);
            }
            println!("{} file(s), {} total", stats.count, stats.total_display);
        }

        Command::Upload {
            files,
            api_key: _,
            no_auto_rotate,
            no_parallel,
            export,
            apps_script_url,
        } => {
            let files = load_files(&files).await?;
            ctx.controller.select_files(files)?;
            ctx.controller.set_options(UploadOptions {
                auto_rotate: !no_auto_rotate,
                parallel_process: !no_parallel,
            });

            let channel = ctx.start_progress_channel();
            let controller = ctx.controller.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    controller.cancel();
                }
            });

            let submitted = ctx.controller.submit().await;
            interrupt.abort();
            ctx.subscriber.shutdown();
            if let Err(e) = channel.await {
                warn!("Progress channel task failed: {}", e);
            }

            let outcome = submitted?;
            println!("Process id: {}", outcome.process_id);
            println!("Results:    {}", outcome.results_url);

            if export {
                let result = ctx
                    .export
                    .export(outcome.process_id.as_str(), apps_script_url.as_deref())
                    .await?
                    .into_result()?;
                print_export(&result);
            }
        }

        Command::Export {
            process_id,
            apps_script_url,
        } => {
            let result = ctx
                .export
                .export(&process_id, apps_script_url.as_deref())
                .await?
                .into_result()?;
            print_export(&result);
        }

        Command::Download {
            process_id,
            include,
            output,
        } => {
            let dest = output.unwrap_or_else(|| default_archive_path(&process_id));
            let written = ctx
                .backend
                .download_results(&process_id, &include, &dest)
                .await
                .map_err(|e| ClientError::Download(e.to_string()));
            let written = surface(ctx, written)?;
            ctx.notifications.success(format!(
                "Saved {} ({})",
                dest.display(),
                format_file_size(written)
            ));
        }

        Command::PushRecords {
            records: path,
            process_id,
            apps_script_url,
        } => {
            let response = surface(ctx, push_records(&path, &process_id, &apps_script_url).await)?;
            let url = response.spreadsheet_url.unwrap_or_default();
            ctx.notifications.success(format!(
                "Added {} record(s) to a new spreadsheet",
                response.jobs_added.unwrap_or_default()
            ));
            if !url.is_empty() {
                println!("Spreadsheet: {}", url);
            }
        }

        Command::SetApiKey { key } => {
            if !is_valid_key(&key) {
                ctx.notifications.warning("API key must not be blank");
                return Err(ClientError::MissingInput("API key".to_string()).into());
            }
            let path = config_path
                .map(Path::to_path_buf)
                .context("No config file location available; pass --config")?;
            surface(ctx, store_api_key(&key, &path).map_err(ClientError::from))?;
            ctx.notifications.success("API key saved");
        }
    }

    Ok(())
}

async fn push_records(
    path: &Path,
    process_id: &str,
    apps_script_url: &str,
) -> ClientResult<jobscan_common::api::SpreadsheetResponse> {
    let json = tokio::fs::read_to_string(path).await?;
    let all = records::parse_records(&json)?;
    let total = all.len();
    let valid = records::filter_valid(all);
    info!(
        total,
        valid = valid.len(),
        dropped = total - valid.len(),
        "Filtered placeholder records"
    );

    SpreadsheetClient::new(apps_script_url)?
        .add_jobs(process_id, valid)
        .await
}

/// `jobscan_<id prefix>.zip` in the working directory
fn default_archive_path(process_id: &str) -> PathBuf {
    let prefix: String = process_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(8)
        .collect();
    if prefix.is_empty() {
        PathBuf::from("jobscan_results.zip")
    } else {
        PathBuf::from(format!("jobscan_{}.zip", prefix))
    }
}

/// Post an error notification for failures no component has reported yet
fn surface<T>(ctx: &ClientContext, result: ClientResult<T>) -> ClientResult<T> {
    if let Err(e) = &result {
        ctx.notifications.error(e.to_string());
    }
    result
}

async fn load_files(paths: &[PathBuf]) -> Result<Vec<SelectedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = SelectedFile::from_path(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

fn print_export(result: &jobscan_client::services::ExportResult) {
    if let Some(jobs) = result.jobs_sent {
        println!("Records sent: {}", jobs);
    }
    if let Some(url) = &result.spreadsheet_url {
        println!("Spreadsheet:  {}", url);
    }
}

fn spawn_renderer(mut rx: broadcast::Receiver<UiEvent>, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(event) => render(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Renderer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        render(&event);
                    }
                    break;
                }
            }
        }
    })
}

fn render(event: &UiEvent) {
    match event {
        UiEvent::NotificationPosted { severity, message, .. } => {
            let tag = match severity {
                Severity::Success => "ok",
                Severity::Error => "error",
                Severity::Warning => "warn",
                Severity::Info => "info",
            };
            eprintln!("[{}] {}", tag, message);
        }
        UiEvent::ProgressChanged {
            percentage,
            step,
            description,
            mode,
            ..
        } => {
            let step = step.map(|s| s.as_str()).unwrap_or("-");
            let marker = match mode {
                DescriptionMode::Normal => "",
                DescriptionMode::RateLimitWait => " (waiting on rate limit)",
                DescriptionMode::Retrying => " (retrying)",
            };
            println!("{:>5.1}%  {:<8} {}{}", percentage, step, description, marker);
        }
        UiEvent::SessionStateChanged { .. }
        | UiEvent::ExportFinished { .. }
        | UiEvent::ChannelStatusChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_archive_path() {
        assert_eq!(
            default_archive_path("3f2b9c1a-77e0-4d"),
            PathBuf::from("jobscan_3f2b9c1a.zip")
        );
        assert_eq!(default_archive_path("../"), PathBuf::from("jobscan_results.zip"));
    }

    #[test]
    fn test_download_arguments() {
        let cli = Cli::try_parse_from([
            "jobscan", "download", "p1", "--include", "csv", "--include", "sql", "-o", "out.zip",
        ])
        .unwrap();
        match cli.command {
            Command::Download {
                process_id,
                include,
                output,
            } => {
                assert_eq!(process_id, "p1");
                assert_eq!(include, vec!["csv", "sql"]);
                assert_eq!(output, Some(PathBuf::from("out.zip")));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["jobscan", "download", "p1", "--include", "pdf"]).is_err());
    }
}
