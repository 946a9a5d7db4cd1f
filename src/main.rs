//! Purpose: `turso-loader` CLI entry point for inspecting and exercising library resolution.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Successful commands emit exactly one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

use turso_loader::api::{
    DirBundle, EmbeddedBundle, Error, ErrorKind, LoadStrategy, LoaderConfig, OsProbe,
    PlatformKey, Resolution, Source, StaticBundle, compiled_bundle, load_library_with_bundle,
    resolve_library_with_bundle, to_exit_code,
};

#[derive(Parser, Debug)]
#[command(
    name = "turso-loader",
    version,
    about = "Resolve, verify, and load the native Turso sync library",
    after_help = r#"EXAMPLES
  $ turso-loader platform
  $ turso-loader resolve --strategy mixed
  $ TURSO_GO_CACHE_DIR=/tmp/cache turso-loader load --bundle-dir ./libs"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "embedded",
        value_enum,
        help = "Where to take the library from: embedded|system|mixed"
    )]
    strategy: StrategyArg,
    #[arg(
        long,
        global = true,
        help = "Cache root for extracted libraries (default: $TURSO_GO_CACHE_DIR, then the OS cache dir)",
        value_hint = ValueHint::DirPath
    )]
    cache_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Read the library bundle from a directory instead of the compiled-in one",
        value_hint = ValueHint::DirPath
    )]
    bundle_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    Embedded,
    System,
    Mixed,
}

impl From<StrategyArg> for LoadStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Embedded => LoadStrategy::Embedded,
            StrategyArg::System => LoadStrategy::System,
            StrategyArg::Mixed => LoadStrategy::Mixed,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detected platform key, library file name, and bundle root
    Platform,
    /// Resolve the library path without loading it
    Resolve,
    /// Resolve and load the library into this process
    Load,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `turso-loader --help` for usage."));
            }
        },
    };

    let config = LoaderConfig {
        strategy: cli.strategy.into(),
        cache_root: cli.cache_dir,
        ..LoaderConfig::default()
    };
    let dir_bundle = cli.bundle_dir.map(DirBundle::new);
    let compiled_in: StaticBundle = compiled_bundle();
    let bundle: &dyn EmbeddedBundle = match &dir_bundle {
        Some(bundle) => bundle,
        None => &compiled_in,
    };

    let value = match cli.command {
        Command::Platform => platform_json(&PlatformKey::detect(&OsProbe)?),
        Command::Resolve => resolution_json(&resolve_library_with_bundle(bundle, &config)?),
        Command::Load => {
            let loaded = load_library_with_bundle(bundle, &config)?;
            let mut value = resolution_json(&loaded.resolution);
            if let Value::Object(map) = &mut value {
                map.insert(
                    "handle".to_string(),
                    json!(format!("{:#x}", loaded.handle.addr())),
                );
            }
            value
        }
    };
    emit_json(&value);
    Ok(0)
}

fn platform_json(key: &PlatformKey) -> Value {
    json!({
        "platform": key,
        "key": key.to_string(),
        "filename": key.library_filename(),
        "bundle_root": key.bundle_root(),
        "search_var": key.os.search_path_var(),
    })
}

fn resolution_json(resolution: &Resolution) -> Value {
    let mut map = Map::new();
    map.insert(
        "path".to_string(),
        json!(resolution.path.display().to_string()),
    );
    let (source, outcome) = match resolution.source {
        Source::Embedded(outcome) => ("embedded", Some(outcome)),
        Source::System => ("system", None),
    };
    map.insert("source".to_string(), json!(source));
    if let Some(outcome) = outcome {
        map.insert("cache".to_string(), json!(outcome.as_str()));
    }
    if let Some(hash) = &resolution.hash {
        map.insert("sha256".to_string(), json!(hash));
    }
    map.insert("platform".to_string(), json!(resolution.platform.to_string()));
    Value::Object(map)
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::UnsupportedPlatform => "unsupported platform".to_string(),
        ErrorKind::CorruptMetadata => "corrupt embedded metadata".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::HashMismatch => "hash mismatch".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Load => "failed to load library".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(expected) = err.expected() {
        inner.insert("expected".to_string(), json!(expected));
    }
    if let Some(actual) = err.actual() {
        inner.insert("actual".to_string(), json!(actual));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let (Some(expected), Some(actual)) = (err.expected(), err.actual()) {
        lines.push(format!("expected sha256: {expected}"));
        lines.push(format!("actual sha256: {actual}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    rendered
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .unwrap_or("invalid arguments")
        .trim()
        .to_string()
}
