//! # Corpus Chat CLI (`cchat`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cchat ingest <source>` | Extract, decode, and report on an archive |
//! | `cchat files <source>` | List every extracted file, unfiltered |
//! | `cchat chat` | Interactive conversation on stdin |
//! | `cchat serve` | Start the HTTP serving layer |
//!
//! `<source>` is a local path or an `http(s)://` URL to a zip archive.
//!
//! ## Examples
//!
//! ```bash
//! cchat ingest ./akutagawa.zip
//! cchat ingest https://example.com/corpus.zip --json
//! RUST_LOG=debug cchat ingest ./akutagawa.zip --cleanse
//! cchat chat --archive ./akutagawa.zip --config ./config/cchat.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use corpus_chat::archive::ArchiveSource;
use corpus_chat::completion::create_provider;
use corpus_chat::config::{self, Config};
use corpus_chat::corpus::CorpusReport;
use corpus_chat::ingest::{CleansedTexts, Ingestion, Ingestor};
use corpus_chat::normalize::{Normalizer, Utf8Cleanser};
use corpus_chat::secrets;
use corpus_chat::server;
use corpus_chat::session::{compose_seed, Conversation, Message, Role};

/// Corpus Chat: normalize a legacy text archive and talk to an LLM about it.
#[derive(Parser)]
#[command(
    name = "cchat",
    about = "Ingest a text archive into a UTF-8 corpus and chat with an LLM seeded from it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// `ingest` and `files` fall back to built-in defaults when the file is
    /// absent; `chat` and `serve` require it.
    #[arg(long, global = true, default_value = "./config/cchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an archive and decode every candidate text file.
    ///
    /// Prints how many files loaded, which failed and why, and the corpus
    /// length. Per-file encoding decisions are logged at `info`.
    Ingest {
        /// Local path or http(s) URL of the zip archive.
        source: String,

        /// Also run the normalization pass and print the cleansed texts.
        #[arg(long)]
        cleanse: bool,

        /// Print the concatenated corpus after the report.
        #[arg(long)]
        print_corpus: bool,

        /// Emit the report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// List every file in the extracted archive, including metadata noise.
    Files {
        source: String,
    },

    /// Interactive conversation.
    ///
    /// Type a message and press enter. `/history` prints the conversation
    /// (newest first), `/quit` ends the session.
    Chat {
        /// Ingest this archive first; with `session.attach_corpus` the corpus
        /// is appended to the seed message.
        #[arg(long)]
        archive: Option<String>,
    },

    /// Start the HTTP serving layer on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            source,
            cleanse,
            print_corpus,
            json,
        } => {
            let cfg = config::load_or_default(&cli.config)?;
            run_ingest(&cfg, &source, cleanse, print_corpus, json).await?;
        }
        Commands::Files { source } => {
            let cfg = config::load_or_default(&cli.config)?;
            let ingestor = Ingestor::uncached(&cfg)?;
            for entry in ingestor.list_entries(ArchiveSource::parse(&source)).await? {
                println!("{}", entry.display());
            }
        }
        Commands::Chat { archive } => {
            let cfg = config::load_config(&cli.config)?;
            run_chat(&cfg, archive).await?;
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct IngestJson<'a> {
    key: &'a str,
    cached: bool,
    total: usize,
    chars: usize,
    #[serde(flatten)]
    report: &'a CorpusReport,
    /// `(file name, text)` pairs and skipped files, with `--cleanse` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    cleansed: Option<&'a CleansedTexts>,
}

async fn run_ingest(
    cfg: &Config,
    source: &str,
    cleanse: bool,
    print_corpus: bool,
    json: bool,
) -> Result<()> {
    let ingestor = Ingestor::uncached(cfg)?;
    let cleanser = Utf8Cleanser::new(ingestor.decoder().clone());
    let normalizer = cleanse.then_some(&cleanser as &dyn Normalizer);

    let ingestion = ingestor
        .ingest(ArchiveSource::parse(source), normalizer)
        .await?;
    let report = &ingestion.report;

    if json {
        let out = IngestJson {
            key: &ingestion.key,
            cached: ingestion.cached,
            total: report.total(),
            chars: report.char_len(),
            report,
            cleansed: ingestion.cleansed.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_report(source, &ingestion);

    if print_corpus {
        println!();
        print!("{}", report.text);
    }

    Ok(())
}

fn print_report(source: &str, ingestion: &Ingestion) {
    let report = &ingestion.report;
    println!("ingest {}", source);
    println!("  candidate files: {}", report.total());
    println!("  loaded: {}", report.success_count);
    for file in &report.decoded {
        println!("    {}  ({})", file.path.display(), file.encoding);
    }
    println!("  failed: {}", report.failed.len());
    for file in &report.failed {
        let tried = if file.attempted.is_empty() {
            String::new()
        } else {
            format!("; tried {}", file.attempted.join(", "))
        };
        println!("    {}  ({}{})", file.path.display(), file.kind, tried);
    }
    println!("  corpus length: {} chars", report.char_len());

    if let Some(cleansed) = &ingestion.cleansed {
        println!("  cleansed: {}", cleansed.texts.len());
        for failure in &cleansed.failures {
            println!("    skipped: {}", failure);
        }
        for (name, text) in &cleansed.texts {
            println!();
            println!("== {} ==", name);
            println!("{}", text);
        }
    }
    println!("ok");
}

async fn run_chat(cfg: &Config, archive: Option<String>) -> Result<()> {
    // Fail before the first turn if credential or seed is missing.
    let resolved = secrets::resolve(cfg)?;
    let provider = create_provider(&cfg.completion, resolved.api_key.clone())?;

    let corpus = match archive {
        Some(source) => {
            let ingestor = Ingestor::uncached(cfg)?;
            let ingestion = ingestor.ingest(ArchiveSource::parse(&source), None).await?;
            print_report(&source, &ingestion);
            Some(ingestion.report)
        }
        None => None,
    };

    let seed = if cfg.session.attach_corpus {
        compose_seed(
            &resolved.seed_message,
            corpus.as_deref(),
            cfg.session.max_corpus_chars,
        )
    } else {
        resolved.seed_message.clone()
    };
    let mut conversation = Conversation::new(seed);

    println!("model: {}  (/history, /quit)", provider.model_name());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/history" => {
                for message in conversation.display_history() {
                    println!("{}", render(message));
                }
            }
            _ => match conversation.submit(provider.as_ref(), &line).await {
                Ok(Some(reply)) => println!("{}", render(reply)),
                Ok(None) => {}
                Err(e) => eprintln!("completion failed: {}", e),
            },
        }
    }

    Ok(())
}

fn render(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "🙂",
        Role::Assistant => "🤖",
        Role::System => "⚙",
    };
    format!("{}: {}", speaker, message.content)
}
