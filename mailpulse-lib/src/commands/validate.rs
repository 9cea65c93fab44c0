use super::Host;
use super::config::{CONFIG_FILE_NAME, Config};
use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file (default is `mailpulse.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
}

pub fn validate_config<H: Host>(host: &mut H, args: &ValidateArgs) -> Result<()> {
    validate_in(host, Utf8Path::new("."), args)
}

fn validate_in<H: Host>(host: &mut H, base_dir: &Utf8Path, args: &ValidateArgs) -> Result<()> {
    let config_path = args.config.as_ref();

    match Config::load(base_dir, config_path) {
        Ok(config) => {
            let _ = writeln!(host.output(), "Configuration file is valid");
            if let Some(path) = config_path {
                let _ = writeln!(host.output(), "Config file: {path}");
            } else if base_dir.join(CONFIG_FILE_NAME).exists() {
                let _ = writeln!(host.output(), "Config file: {}", base_dir.join(CONFIG_FILE_NAME));
            } else {
                let _ = writeln!(host.output(), "Using default configuration (no config file found)");
            }
            let _ = writeln!(
                host.output(),
                "Snapshots are kept for {}s, counting up to {} month(s) at a time",
                config.snapshot_ttl.as_secs(),
                config.worker_width
            );
            Ok(())
        }
        Err(e) => {
            let _ = writeln!(host.error(), "❌ Configuration validation failed: {e}");
            host.exit(1);
            Err(e)
        }
    }
}
