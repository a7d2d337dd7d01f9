//! tokscope: command-line front end.
//!
//! Runs the analysis manager over files or stdin and prints JSON results
//! on stdout. Logs go to stderr (`RUST_LOG`, default `info`).

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use tokscope::{
    AdvancedManager, CancelSignal, Config, ExecutionMode, ProgressUpdate, TokenizerRegistry,
};

/// Statistical fingerprints of tokenized text.
#[derive(Parser)]
#[command(name = "tokscope")]
#[command(version)]
#[command(about = "Entropy, compression, reuse and drift metrics for tokenizer output")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "TOKSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Force an execution mode instead of choosing by input size.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Compiled-in plugins to apply (comma separated).
    #[arg(long, value_delimiter = ',')]
    plugins: Vec<String>,

    /// Disable the tokenization cache.
    #[arg(long)]
    no_cache: bool,

    /// Load a HuggingFace tokenizer by repo id (repeatable).
    #[cfg(feature = "huggingface")]
    #[arg(long = "hf")]
    hf_tokenizers: Vec<String>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Standard,
    Parallel,
    Streaming,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => ExecutionMode::Standard,
            ModeArg::Parallel => ExecutionMode::Parallel,
            ModeArg::Streaming => ExecutionMode::Streaming,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Analyze files; one file is analyzed whole or streamed by size, several
    /// files are analyzed as a batch of documents.
    Analyze {
        /// Input files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Tokenizer name.
        #[arg(short, long, default_value = "whitespace")]
        tokenizer: String,
    },

    /// Compare tokenizers on one document.
    Compare {
        /// Input file, or `-` for stdin.
        file: PathBuf,
        /// Tokenizers to compare (comma separated, at least two).
        #[arg(short, long, value_delimiter = ',', default_value = "whitespace,character")]
        tokenizers: Vec<String>,
    },

    /// Stream a file or stdin in line chunks.
    Stream {
        /// Input file, or `-` for stdin.
        #[arg(default_value = "-")]
        file: PathBuf,
        /// Tokenizer name.
        #[arg(short, long, default_value = "whitespace")]
        tokenizer: String,
    },

    /// List registered tokenizers and available plugins.
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;
    let manager = build_manager(&args, &config)?;

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing current item");
            on_interrupt.cancel();
        }
    });

    let output = match &args.command {
        Command::Analyze { files, tokenizer } => {
            if let [file] = files.as_slice() {
                serde_json::to_value(manager.analyze_file(file, tokenizer, &cancel).await?)?
            } else {
                let mut documents = Vec::with_capacity(files.len());
                for file in files {
                    let bytes = tokio::fs::read(file).await?;
                    documents.push(String::from_utf8_lossy(&bytes).into_owned());
                }
                serde_json::to_value(
                    manager
                        .analyze_documents(&documents, tokenizer, &cancel)
                        .await?,
                )?
            }
        }

        Command::Compare { file, tokenizers } => {
            let document = read_input(file).await?;
            let names: Vec<&str> = tokenizers.iter().map(String::as_str).collect();
            serde_json::to_value(manager.compare_tokenizers(&document, &names).await?)?
        }

        Command::Stream { file, tokenizer } => {
            let result = if file.as_os_str() == "-" {
                if io::stdin().is_terminal() {
                    info!("reading from terminal, end input with Ctrl-D");
                }
                manager
                    .analyze_reader(tokio::io::stdin(), tokenizer, &cancel)
                    .await?
            } else {
                let reader = tokio::fs::File::open(file).await?;
                manager.analyze_reader(reader, tokenizer, &cancel).await?
            };
            serde_json::to_value(result)?
        }

        Command::List => serde_json::json!({
            "tokenizers": manager.tokenizer_names(),
            "plugins": tokscope::PluginRegistry::BUILTIN,
        }),
    };

    if let Some(stats) = manager.cache_stats() {
        info!(
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            size = stats.size,
            "cache"
        );
    }
    manager.close();

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}

fn build_manager(args: &Args, config: &Config) -> tokscope::Result<AdvancedManager> {
    #[allow(unused_mut)]
    let mut registry = TokenizerRegistry::with_builtins();
    #[cfg(feature = "huggingface")]
    for repo in &args.hf_tokenizers {
        registry.register(std::sync::Arc::new(tokscope::HfTokenizer::from_hub(repo)?));
    }

    let mut builder = AdvancedManager::builder()
        .config(config)
        .registry(registry)
        .on_progress(report_progress);
    if let Some(mode) = args.mode {
        builder = builder.mode(mode.into());
    }
    if !args.plugins.is_empty() {
        builder = builder.plugins(args.plugins.as_slice());
    }
    if args.no_cache {
        builder = builder.without_cache();
    }
    builder.build()
}

fn report_progress(update: ProgressUpdate) {
    info!(
        chunks = update.chunks_processed,
        lines = update.lines_processed,
        failed = update.failed_chunks,
        elapsed_ms = update.elapsed.as_millis() as u64,
        "progress"
    );
}

async fn read_input(path: &Path) -> io::Result<String> {
    let bytes = if path.as_os_str() == "-" {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(path).await?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
