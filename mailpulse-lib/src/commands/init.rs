use super::Host;
use super::config::{CONFIG_FILE_NAME, Config};
use crate::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output configuration file path (default is `mailpulse.toml` in the current directory)
    #[arg(value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,
}

pub fn init_config<H: Host>(host: &mut H, args: &InitArgs) -> Result<()> {
    let output = args.output.clone().unwrap_or_else(|| Utf8PathBuf::from(CONFIG_FILE_NAME));

    Config::save_default(&output)?;
    let _ = writeln!(host.output(), "Generated default configuration file: {output}");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::commands::config::DEFAULT_CONFIG_TOML;
    use crate::commands::host::TestHost;

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_init_writes_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::try_from(tmp.path().join("custom.toml")).unwrap();

        let mut host = TestHost::new();
        init_config(&mut host, &InitArgs { output: Some(output.clone()) }).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), DEFAULT_CONFIG_TOML);
        assert!(host.output_str().contains("custom.toml"));
    }

    #[test]
    fn test_init_into_missing_directory_fails() {
        let mut host = TestHost::new();
        let args = InitArgs {
            output: Some(Utf8PathBuf::from("/definitely/not/a/real/dir/mailpulse.toml")),
        };
        assert!(init_config(&mut host, &args).is_err());
    }
}
