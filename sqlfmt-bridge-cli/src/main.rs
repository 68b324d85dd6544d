//! sqlfmt-bridge CLI
//!
//! Formats SQL from a file or stdin through a provisioned sqlfmt binary.
//! Logs go to stderr; stdout carries only formatted SQL or command output.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use sqlfmt_bridge_core::config::ProvisionerConfig;
use sqlfmt_bridge_core::provision::paths;
use sqlfmt_bridge_core::{
    build_args, BinaryStatus, Database, FormatSettings, FormatterError, ProvisionError,
    Provisioner, SqlFormatter,
};

/// Exit code when sqlfmt rejected the input.
const EXIT_REJECTED: u8 = 1;
/// Exit code for environment problems (network, install root, process).
const EXIT_ENVIRONMENT: u8 = 2;
/// Exit code when `--range` does not fit the input.
const EXIT_INVALID_RANGE: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "sqlfmt-bridge", version, about = "Format SQL with an auto-provisioned sqlfmt")]
struct Cli {
    /// Install root for the sqlfmt binary
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Settings database path
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Seconds allowed for each release request, archive download included
    #[arg(long, global = true, value_name = "SECS")]
    request_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Format SQL from a file or stdin
    Format(FormatArgs),
    /// Install or update sqlfmt and print its path
    Ensure,
    /// Show the installed sqlfmt without checking for updates
    Status,
    /// Print the sqlfmt arguments the current settings map to
    Args {
        /// JSON settings file to use instead of the stored settings
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,
    },
    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// Input file (default: stdin)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only format this byte range, e.g. 10..42
    #[arg(long, value_name = "START..END", value_parser = parse_range)]
    range: Option<Range<usize>>,

    /// JSON settings file to use instead of the stored settings
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Seconds to wait for sqlfmt
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the stored settings as JSON
    Show,
    /// Set one setting, e.g. `set useTabs true`
    Set { key: String, value: String },
    /// Replace the stored settings with a JSON file
    Import { file: PathBuf },
    /// Restore default settings
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!("Starting sqlfmt-bridge v{}", sqlfmt_bridge_core::VERSION);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_ENVIRONMENT)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("warn,sqlfmt_bridge={}", default_level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let root = cli.root.clone().unwrap_or_else(paths::get_default_root);
    let config = provisioner_config(cli.request_timeout);

    match cli.command {
        Command::Format(args) => {
            let settings = resolve_settings(args.settings.as_deref(), cli.db.as_deref())?;
            format(&root, config, settings, args).await
        }
        Command::Ensure => {
            let formatter = SqlFormatter::new(Arc::new(provisioner(config)?), &root);
            match formatter.ensure_binary().await {
                Ok(path) => {
                    println!("{}", path.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    Ok(ExitCode::from(EXIT_ENVIRONMENT))
                }
            }
        }
        Command::Status => {
            let status = match provisioner(config) {
                Ok(p) => SqlFormatter::new(Arc::new(p), &root).status().await,
                Err(e) => match e.downcast_ref::<ProvisionError>() {
                    Some(ProvisionError::UnsupportedPlatform { .. }) => {
                        BinaryStatus::UnsupportedPlatform
                    }
                    _ => return Err(e),
                },
            };
            println!("{}", status);
            Ok(ExitCode::SUCCESS)
        }
        Command::Args { settings } => {
            let settings = resolve_settings(settings.as_deref(), cli.db.as_deref())?;
            println!("{}", serde_json::to_string(&build_args(&settings))?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            self::config(cli.db.as_deref(), action)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn provisioner_config(request_timeout: Option<u64>) -> ProvisionerConfig {
    let config = ProvisionerConfig::default();
    match request_timeout {
        Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
        None => config,
    }
}

fn provisioner(config: ProvisionerConfig) -> anyhow::Result<Provisioner> {
    Ok(Provisioner::new(config)?)
}

async fn format(
    root: &Path,
    config: ProvisionerConfig,
    settings: FormatSettings,
    args: FormatArgs,
) -> anyhow::Result<ExitCode> {
    let text = match &args.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            text
        }
    };

    let formatter = SqlFormatter::new(Arc::new(provisioner(config)?), root)
        .with_timeout(Duration::from_secs(args.timeout));

    let result = match args.range {
        Some(range) => formatter.format_range(&text, range, &settings).await,
        None => formatter.format(&text, &settings).await,
    };

    let formatted = match result {
        Ok(formatted) => formatted,
        Err(e) => return Ok(report_failure(&e)),
    };

    match &args.output {
        Some(path) => tokio::fs::write(path, &formatted.text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(formatted.text.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report_failure(error: &FormatterError) -> ExitCode {
    eprintln!("error: {}", error);
    ExitCode::from(exit_code_for(error))
}

fn exit_code_for(error: &FormatterError) -> u8 {
    match error {
        FormatterError::InvalidRange { .. } => EXIT_INVALID_RANGE,
        e if e.is_content_problem() => EXIT_REJECTED,
        _ => EXIT_ENVIRONMENT,
    }
}

/// Settings from `--settings FILE` if given, else from the database.
fn resolve_settings(file: Option<&Path>, db_path: Option<&Path>) -> anyhow::Result<FormatSettings> {
    if let Some(file) = file {
        return Ok(FormatSettings::from_json_file(file)?);
    }

    match open_db(db_path) {
        Ok(db) => Ok(FormatSettings::load(&db)),
        Err(e) => {
            tracing::warn!("Failed to open settings database: {e:#}, using defaults");
            Ok(FormatSettings::default())
        }
    }
}

fn open_db(db_path: Option<&Path>) -> anyhow::Result<Database> {
    let path = db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Database::default_path);
    let db = Database::open_at(path.clone())
        .with_context(|| format!("Failed to open {}", path.display()))?;
    db.migrate().context("Failed to migrate settings database")?;
    Ok(db)
}

fn config(db_path: Option<&Path>, action: ConfigAction) -> anyhow::Result<()> {
    let db = open_db(db_path)?;

    let settings = match action {
        ConfigAction::Show => FormatSettings::load(&db),
        ConfigAction::Set { key, value } => {
            let updated = FormatSettings::load(&db).with_value(&key, &value)?;
            updated.save(&db)?;
            updated
        }
        ConfigAction::Import { file } => {
            let imported = FormatSettings::from_json_file(&file)?;
            imported.save(&db)?;
            imported
        }
        ConfigAction::Reset => {
            let defaults = FormatSettings::default();
            defaults.save(&db)?;
            defaults
        }
    };

    println!("{}", settings.to_pretty_json()?);
    Ok(())
}

/// Parses `START..END` into a byte range.
fn parse_range(raw: &str) -> Result<Range<usize>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{}'", raw))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid range start '{}'", start))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid range end '{}'", end))?;
    if start > end {
        return Err(format!("range start {} is after end {}", start, end));
    }
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sqlfmt_bridge_core::FormatError;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("10..42"), Ok(10..42));
        assert_eq!(parse_range("0..0"), Ok(0..0));
        assert!(parse_range("10").is_err());
        assert!(parse_range("a..4").is_err());
        assert!(parse_range("5..3").is_err());
    }

    #[test]
    fn test_parse_format_command() {
        let cli = Cli::parse_from([
            "sqlfmt-bridge",
            "--root",
            "/tmp/sqlfmt",
            "format",
            "-i",
            "query.sql",
            "--range",
            "3..9",
        ]);

        assert_eq!(cli.root, Some(PathBuf::from("/tmp/sqlfmt")));
        match cli.command {
            Command::Format(args) => {
                assert_eq!(args.input, Some(PathBuf::from("query.sql")));
                assert_eq!(args.range, Some(3..9));
                assert_eq!(args.timeout, 30);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_request_timeout_flag() {
        let cli = Cli::parse_from(["sqlfmt-bridge", "--request-timeout", "5", "ensure"]);
        assert_eq!(
            provisioner_config(cli.request_timeout).request_timeout,
            Duration::from_secs(5)
        );

        let cli = Cli::parse_from(["sqlfmt-bridge", "status"]);
        assert_eq!(
            provisioner_config(cli.request_timeout).request_timeout,
            ProvisionerConfig::default().request_timeout
        );
    }

    #[test]
    fn test_exit_codes() {
        let range = FormatterError::InvalidRange {
            start: 4,
            end: 90,
            len: 10,
        };
        assert_eq!(exit_code_for(&range), EXIT_INVALID_RANGE);

        let rejected = FormatterError::Format(FormatError::Tool {
            code: 1,
            stderr: "syntax error".to_string(),
        });
        assert_eq!(exit_code_for(&rejected), EXIT_REJECTED);

        let offline = FormatterError::BinaryUnavailable(ProvisionError::MetadataUnavailable(
            "offline".to_string(),
        ));
        assert_eq!(exit_code_for(&offline), EXIT_ENVIRONMENT);
    }

    #[test]
    fn test_config_set_persists() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("settings.db");

        config(
            Some(&db_path),
            ConfigAction::Set {
                key: "useTabs".to_string(),
                value: "true".to_string(),
            },
        )
        .unwrap();

        let settings = resolve_settings(None, Some(&db_path)).unwrap();
        assert!(settings.use_tabs);
        assert_eq!(build_args(&settings), vec!["-t"]);
    }

    #[test]
    fn test_settings_file_overrides_database() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("settings.json");
        std::fs::write(&file, r#"{"useConfigFile": true}"#).unwrap();

        let settings = resolve_settings(Some(&file), Some(&tmp.path().join("unused.db"))).unwrap();
        assert!(settings.use_config_file);
        assert!(!tmp.path().join("unused.db").exists());
    }
}
