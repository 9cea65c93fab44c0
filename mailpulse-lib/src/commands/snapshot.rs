use super::common::{ColorMode, LogLevel, init_logging};
use super::config::Config;
use super::{Host, ProgressReporter};
use crate::Result;
use crate::reports::{generate_console, generate_csv, generate_json};
use crate::stats::{Client, DiskStore, Progress, Snapshot, SnapshotService};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use core::time::Duration;
use directories::BaseDirs;
use ohno::{IntoAppError, bail};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

const LOG_TARGET: &str = "  snapshot";

#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// OAuth access token for the mailbox
    #[arg(long, value_name = "TOKEN", env = "MAILPULSE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Path to configuration file (default is `mailpulse.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory where snapshots are cached
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Ignore cached snapshots and fetch everything fresh
    #[arg(long)]
    pub ignore_cached: bool,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    pub log_level: LogLevel,

    /// Output the snapshot to a JSON file
    #[arg(long, value_name = "PATH", help_heading = "Report Output")]
    pub json: Option<Utf8PathBuf>,

    /// Output the monthly series to a CSV file
    #[arg(long, value_name = "PATH", help_heading = "Report Output")]
    pub csv: Option<Utf8PathBuf>,

    /// Output the snapshot to the console. If omitted, console output is shown only when no other reports are generated.
    #[arg(long, help_heading = "Report Output")]
    pub console: bool,
}

pub async fn take_snapshot<H: Host>(host: &mut H, args: &SnapshotArgs) -> Result<()> {
    init_logging(args.log_level);

    let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

    let cache_dir = if let Some(cache_path) = &args.cache_dir {
        cache_path.as_std_path().to_path_buf()
    } else {
        default_cache_dir()?
    };
    log::debug!(target: LOG_TARGET, "Using snapshot cache at '{}'", cache_dir.display());

    let delay = if args.log_level == LogLevel::None {
        Duration::from_millis(300)
    } else {
        Duration::from_hours(365 * 24)
    };
    let progress = Arc::new(ProgressReporter::new(delay, args.color.for_stderr()));

    let client = Client::new(config.endpoints.clone(), config.timeouts())?;
    let store = Arc::new(DiskStore::new(cache_dir, args.ignore_cached));
    let service = SnapshotService::with_progress(client, store, config.service_settings(), Arc::clone(&progress) as Arc<dyn Progress>);

    // Dropping the build future on Ctrl-C cancels every outstanding request.
    let outcome = tokio::select! {
        snapshot = service.get_or_build(&args.token) => Some(snapshot),
        () = interrupted() => None,
    };
    progress.done();

    let Some(snapshot) = outcome else {
        bail!("interrupted, no snapshot was produced");
    };

    let Some(snapshot) = snapshot else {
        bail!("unable to identify the account behind the token (is it valid and unexpired?)");
    };

    report(host, &snapshot, args)
}

fn report<H: Host>(host: &mut H, snapshot: &Snapshot, args: &SnapshotArgs) -> Result<()> {
    let generating_reports = args.json.is_some() || args.csv.is_some();

    if args.console || !generating_reports {
        let mut console_output = String::new();
        generate_console(snapshot, args.color.for_stdout(), &mut console_output)?;
        let _ = write!(host.output(), "{console_output}");
    }

    if let Some(filename) = &args.json {
        let mut json_output = String::new();
        generate_json(snapshot, &mut json_output)?;
        fs::write(filename, json_output).into_app_err_with(|| format!("writing JSON report '{filename}'"))?;
    }

    if let Some(filename) = &args.csv {
        let file = fs::File::create(filename).into_app_err_with(|| format!("creating CSV report '{filename}'"))?;
        generate_csv(snapshot, file)?;
    }

    Ok(())
}

fn default_cache_dir() -> Result<PathBuf> {
    Ok(BaseDirs::new()
        .into_app_err("could not determine cache directory")?
        .cache_dir()
        .join("mailpulse"))
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::debug!(target: LOG_TARGET, "Unable to listen for Ctrl-C: {e:#}");
        core::future::pending::<()>().await;
    }
}
