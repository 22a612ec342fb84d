//! StampKV CLI
//!
//! Command-line interface for a local StampKV data directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stampkv::{
    AtomicWrite, CommitOutcome, Config, Engine, Entry, Key, KeyPart, ListOptions, Result,
    Selector, Value,
};
use tracing_subscriber::{fmt, EnvFilter};

/// StampKV CLI
#[derive(Parser, Debug)]
#[command(name = "stampkv-cli")]
#[command(about = "CLI for the StampKV embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stampkv_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get the entry at a key
    Get {
        /// Key parts separated by '/'
        key: String,
    },

    /// Set a key to a value
    Set {
        /// Key parts separated by '/'
        key: String,

        /// The value to store
        value: String,

        /// Store the value as an unsigned 64-bit integer
        #[arg(long)]
        u64: bool,
    },

    /// Delete a key
    Delete {
        /// Key parts separated by '/'
        key: String,
    },

    /// Add to the integer stored at a key
    Sum {
        /// Key parts separated by '/'
        key: String,

        operand: u64,
    },

    /// List the entries under a prefix
    List {
        /// Key prefix, parts separated by '/' (empty lists everything)
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Maximum entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// List in descending key order
        #[arg(short, long)]
        reverse: bool,

        /// Resume from a cursor printed by an earlier list
        #[arg(short, long)]
        cursor: Option<String>,
    },

    /// Rewrite the WAL as a single snapshot
    Checkpoint,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stampkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder().data_dir(&args.data_dir).build();
    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.data_dir, e);
            return ExitCode::FAILURE;
        }
    };

    match run(&engine, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => match engine.get(&parse_key(&key))? {
            Some(entry) => println!("{}", format_entry(&entry)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value, u64 } => {
            let value = if u64 {
                let n = value.parse::<u64>().map_err(|e| {
                    stampkv::KvError::Validation(format!("invalid u64 '{}': {}", value, e))
                })?;
                Value::U64(n)
            } else {
                Value::Bytes(value.into_bytes())
            };
            let write = AtomicWrite::new().set(parse_key(&key), value);
            print_outcome(engine.atomic_write(write)?);
        }
        Commands::Delete { key } => {
            let write = AtomicWrite::new().delete(parse_key(&key));
            print_outcome(engine.atomic_write(write)?);
        }
        Commands::Sum { key, operand } => {
            let write = AtomicWrite::new().sum(parse_key(&key), operand);
            print_outcome(engine.atomic_write(write)?);
        }
        Commands::List {
            prefix,
            limit,
            reverse,
            cursor,
        } => {
            let mut options = ListOptions::new().reverse(reverse);
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            if let Some(cursor) = cursor {
                options = options.cursor(cursor);
            }

            let selector = Selector::prefix(parse_key(&prefix));
            let mut iter = engine.list(&selector, options)?;
            let mut printed = 0usize;
            for entry in iter.by_ref() {
                println!("{}", format_entry(&entry?));
                printed += 1;
            }
            if printed > 0 {
                println!("cursor: {}", iter.cursor()?);
            }
        }
        Commands::Checkpoint => {
            engine.checkpoint()?;
            println!("OK");
        }
    }
    Ok(())
}

/// Split `a/b/c` into string key parts; the empty string is the empty key
fn parse_key(raw: &str) -> Key {
    raw.split('/')
        .filter(|part| !part.is_empty())
        .map(KeyPart::from)
        .collect()
}

fn format_entry(entry: &Entry) -> String {
    let value = match &entry.value {
        Value::U64(n) => n.to_string(),
        Value::Bytes(bytes) | Value::Opaque(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };
    format!("{} = {} @ {}", entry.key, value, entry.versionstamp)
}

fn print_outcome(outcome: CommitOutcome) {
    match outcome {
        CommitOutcome::Committed(result) => println!("OK {}", result.versionstamp),
        CommitOutcome::CheckFailed(failure) => {
            println!("check failed: {} key(s)", failure.failed_keys.len())
        }
    }
}
