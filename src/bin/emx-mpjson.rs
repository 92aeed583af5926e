//! emx-mpjson CLI
//!
//! Convert MessagePack to JSON and back (like msgpack2json / json2msgpack).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emx_mpjson::{Base64Mode, ContinuousMode, Decoder, Encoder, Options};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emx-mpjson")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Convert between MessagePack and JSON")]
#[command(after_help = "For viewing MessagePack, you probably want `to-json -d -i <file>`.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log conversion details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert MessagePack to JSON
    #[command(name = "to-json", alias = "msgpack2json")]
    ToJson {
        /// Input file (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Debug viewing mode: print pseudo-JSON instead of failing on bin/ext
        #[arg(short = 'd', long)]
        debug: bool,

        /// Pretty-print JSON output
        #[arg(short = 'p', long)]
        pretty: bool,

        /// Convert bin to base64 strings with a "base64:" prefix
        #[arg(short = 'b', long = "base64")]
        base64: bool,

        /// Convert bin to base64 strings with no prefix
        #[arg(short = 'B', long = "base64-bare", conflicts_with = "base64")]
        base64_bare: bool,

        /// Read a sequence of documents, one per line of output
        #[arg(short = 'c', long)]
        continuous: bool,

        /// Read a sequence of documents, separated by CHAR in the output
        #[arg(short = 'C', long = "delimiter", value_name = "CHAR", conflicts_with = "continuous")]
        delimiter: Option<char>,
    },

    /// Convert JSON to MessagePack
    #[command(name = "to-msgpack", alias = "json2msgpack")]
    ToMsgpack {
        /// Input file (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Lax mode: allow comments and trailing commas
        #[arg(short = 'l', long)]
        lax: bool,

        /// Write floats instead of doubles
        #[arg(short = 'f', long = "float")]
        use_float: bool,

        /// Convert strings with "base64:" / "ext:" prefixes to bin / ext
        #[arg(short = 'b', long = "base64")]
        base64: bool,

        /// Convert any base64 string of at least MIN bytes to bin
        #[arg(short = 'B', long = "base64-min", value_name = "MIN",
              value_parser = clap::value_parser!(u64).range(1..))]
        base64_min: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::ToJson { input, output, debug, pretty, base64, base64_bare, continuous, delimiter } => {
            let base64 = match (base64, base64_bare) {
                (true, _) => Base64Mode::Prefixed,
                (false, true) => Base64Mode::Unprefixed,
                (false, false) => Base64Mode::Disabled,
            };
            let continuous = match (continuous, delimiter) {
                (_, Some(delim)) => ContinuousMode::Delimited(delim),
                (true, None) => ContinuousMode::Undelimited,
                (false, None) => ContinuousMode::Off,
            };
            let options = Options::new()
                .with_debug(debug)
                .with_pretty(pretty)
                .with_base64(base64)
                .with_continuous(continuous);
            to_json(input, output, options)?;
        }
        Commands::ToMsgpack { input, output, lax, use_float, base64, base64_min } => {
            let options = Options::new()
                .with_lax(lax)
                .with_use_float(use_float)
                .with_base64(if base64 { Base64Mode::Prefixed } else { Base64Mode::Disabled })
                .with_base64_min_len(base64_min.unwrap_or(0) as usize);
            to_msgpack(input, output, options)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn to_json(input: Option<PathBuf>, output: Option<PathBuf>, options: Options) -> Result<()> {
    let reader = open_input(input.as_deref())?;
    let writer = open_output(output.as_deref())?;

    let decoder = Decoder::new(options);
    match decoder.convert(reader, writer) {
        Ok(count) => {
            tracing::debug!(documents = count, "done");
            Ok(())
        }
        Err(err) => {
            // Whatever was written is incomplete
            if let Some(path) = &output {
                let _ = fs::remove_file(path);
            }
            Err(err).context("failed to convert MessagePack to JSON")
        }
    }
}

fn to_msgpack(input: Option<PathBuf>, output: Option<PathBuf>, options: Options) -> Result<()> {
    let mut reader = open_input(input.as_deref())?;
    let mut text = Vec::new();
    reader.read_to_end(&mut text).context("Failed to read input")?;

    // Convert fully before touching the output
    let encoder = Encoder::new(options);
    let packed = encoder
        .parse(&text)
        .and_then(|value| encoder.encode_value(&value))
        .context("failed to convert JSON to MessagePack")?;

    let mut writer = open_output(output.as_deref())?;
    writer.write_all(&packed)?;
    writer.flush()?;
    Ok(())
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}
