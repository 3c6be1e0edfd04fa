//! tagcall - Type-Tagged Calls into Runtime-Loaded Libraries
//!
//! CLI entry point for resolving and invoking trampolines in shared libraries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagcall::{LibraryLoader, TagcallConfig, TypeTag, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tagcall")]
#[command(version)]
#[command(about = "Call type-tagged trampolines in runtime-loaded libraries", long_about = None)]
struct Cli {
    /// Config file (default: tagcall.toml in the current directory or a parent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a trampoline and print its tagged result
    Call {
        /// Library path or name
        library: String,

        /// Trampoline symbol
        symbol: String,

        /// Arguments as TAG:VALUE (e.g. int32:2, string:hello, bool:true, void)
        #[arg(value_name = "TAG:VALUE")]
        args: Vec<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve symbols and print their addresses
    Resolve {
        /// Library path or name
        library: String,

        /// Symbols to resolve
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// List type tags and their wire values
    Tags,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Call {
            library,
            symbol,
            args,
            json,
        } => cmd_call(cli.config.as_ref(), &library, &symbol, &args, json),
        Commands::Resolve { library, symbols } => {
            cmd_resolve(cli.config.as_ref(), &library, &symbols)
        }
        Commands::Tags => cmd_tags(),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<TagcallConfig> {
    match path {
        Some(path) => TagcallConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => TagcallConfig::load_from_cwd().context("Failed to load config"),
    }
}

fn loader(config: Option<&PathBuf>) -> Result<LibraryLoader> {
    Ok(load_config(config)?.library_loader())
}

fn cmd_call(
    config: Option<&PathBuf>,
    library: &str,
    symbol: &str,
    args: &[String],
    json: bool,
) -> Result<()> {
    let values = args
        .iter()
        .map(|arg| Value::parse_tagged(arg).with_context(|| format!("Bad argument '{}'", arg)))
        .collect::<Result<Vec<_>>>()?;

    let lib = loader(config)?
        .load(library)
        .with_context(|| format!("Failed to open {}", library))?;

    // Safety: the user asserts that `symbol` speaks the trampoline protocol.
    let result = unsafe { lib.call(symbol, &values) }
        .with_context(|| format!("Call to {} failed", symbol))?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{} ({})", result, result.tag());
    }

    lib.close().context("Failed to close library")?;
    Ok(())
}

fn cmd_resolve(config: Option<&PathBuf>, library: &str, symbols: &[String]) -> Result<()> {
    let lib = loader(config)?
        .load(library)
        .with_context(|| format!("Failed to open {}", library))?;

    for symbol in symbols {
        let address = lib.resolve(symbol)?;
        println!("{} {:#x}", symbol, address.addr());
    }

    lib.close().context("Failed to close library")?;
    Ok(())
}

fn cmd_tags() -> Result<()> {
    for tag in TypeTag::ALL {
        println!("{:>2}  {}", tag.to_raw(), tag);
    }
    Ok(())
}
