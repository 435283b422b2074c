use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use medialib_core::config::Config;
use medialib_core::{paths, BusError, MediaDb};
use medialib_types::{Command, Event, ParameterValue};

#[derive(Parser)]
#[command(name = "medialib")]
#[command(about = "Query and control a media library database")]
#[command(after_help = "\
EXAMPLES:
  medialib browse /               # Top level containers
  medialib object /songs          # One object
  medialib rescan                 # Rescan all sources
  medialib set general export_media_dirs true")]
struct Cli {
    /// Directory holding the medialib/ database directory
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Create a new database (fails if one exists)
    #[arg(long, global = true)]
    create: bool,

    /// Extra settings file, merged over ~/.config/medialib/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for an answer
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    /// Log to the terminal at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the children of a container
    Browse {
        id: String,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long)]
        count: Option<usize>,
    },
    /// Show one object
    Object { id: String },
    /// Rescan every source and wait until done
    Rescan,
    /// Change a setting. VALUE is JSON (true, 3, ["a","b"]) or a plain string
    Set {
        context: String,
        name: String,
        value: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Db(#[from] medialib_core::Error),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("cannot read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },
}

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    if verbose
        && TermLogger::init(log_level, simplelog::Config::default(), TerminalMode::Stderr, ColorChoice::Auto).is_ok()
    {
        return;
    }

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("medialib")
        .join("medialib.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path)
        .or_else(|_| File::create(std::env::temp_dir().join("medialib.log")))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("medialib: logging disabled, cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("medialib: logging disabled: {}", e);
        return;
    }

    log::info!("medialib starting (log level: {:?})", log_level);
}

/// JSON if it parses as a parameter value, else the raw string.
fn parse_value(raw: &str) -> ParameterValue {
    serde_json::from_str(raw).unwrap_or_else(|_| ParameterValue::String(raw.to_string()))
}

fn load_config(extra: Option<&PathBuf>) -> Result<Config, CliError> {
    let mut config = Config::load();
    if let Some(path) = extra {
        let contents = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.clone(),
            source,
        })?;
        config
            .merge_str(&contents)
            .map_err(|source| CliError::ParseConfig {
                path: path.clone(),
                source,
            })?;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<Vec<Event>, CliError> {
    let config = load_config(cli.config.as_ref())?;
    let base_dir = cli.base_dir.unwrap_or_else(|| config.base_dir());
    let create = cli.create || (!paths::db_dir(&base_dir).is_dir() && config.create_if_missing());

    let mut options = config.options(create);
    options.base_dir = base_dir;

    let db = MediaDb::open(options, Vec::new())?;
    let handle = db.handle();
    let timeout = Duration::from_secs(cli.timeout);

    let answers = match cli.command {
        Cmd::Browse { id, start, count } => handle.call(
            |token| Command::BrowseChildren {
                token,
                id,
                start,
                count,
                one_answer: true,
            },
            timeout,
        )?,
        Cmd::Object { id } => handle.call(|token| Command::BrowseObject { token, id }, timeout)?,
        Cmd::Rescan => handle.call(|token| Command::Rescan { token }, timeout)?,
        Cmd::Set { context, name, value } => {
            handle.send_blocking(Command::SetParameter {
                context,
                name,
                value: parse_value(&value),
            })?;
            Vec::new()
        }
    };
    // Stopping writes pending settings.
    drop(db);
    Ok(answers)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let answers = match run(cli) {
        Ok(answers) => answers,
        Err(e) => {
            eprintln!("medialib: {}", e);
            return ExitCode::FAILURE;
        }
    };
    for event in &answers {
        match serde_json::to_string_pretty(event) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("medialib: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if answers.iter().any(|e| matches!(e, Event::NotFound { .. })) {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
