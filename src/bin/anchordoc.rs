//! CLI binary for anchordoc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use anchordoc::{
    check_citations_text, client_from_config, edit_to_file, encode_docx, strip_markup,
    CitationReport, CitationStatus, PipelineConfig, Provider,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Flatten a document to anchored text (stdout)
  anchordoc encode brief.docx

  # Plain text, anchors and tags stripped
  anchordoc encode --clean brief.docx

  # Edit a document in place of its formatting
  anchordoc edit brief.docx -o brief.edited.docx \
      "Fix grammatical errors. Do not change legal terms of art."

  # Audit citations, JSON report to a file
  anchordoc check-citations brief.docx --json -o report.json

  # Use OpenAI instead of the default Llama backend
  anchordoc edit --provider openai --model gpt-4 brief.docx -o out.docx "..."

  # Verify credentials and connectivity
  anchordoc check-connection --provider openai

ENVIRONMENT VARIABLES:
  LLAMA_API_KEY       API key for the Llama backend (default provider)
  OPENAI_API_KEY      API key for the OpenAI backend
  ANCHORDOC_MODEL     Override model ID
  ANCHORDOC_PROVIDER  Override provider (llama, openai)

SETUP:
  1. Set an API key:  export LLAMA_API_KEY=...
  2. Run:             anchordoc check-citations brief.docx
"#;

/// Edit and audit Word documents with LLMs, preserving formatting.
#[derive(Parser, Debug)]
#[command(
    name = "anchordoc",
    version,
    about = "Edit and audit Word documents with LLMs, preserving formatting",
    long_about = "Flattens DOCX files to anchored text the model can safely edit, then \
realigns the result against the original document structure. Formatting, footnotes, \
lists, and justification survive the round trip untouched.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM provider: llama or openai.
    #[arg(long, global = true, env = "ANCHORDOC_PROVIDER")]
    provider: Option<String>,

    /// Model ID (e.g. llama3.2-3b, gpt-4).
    #[arg(long, global = true, env = "ANCHORDOC_MODEL")]
    model: Option<String>,

    /// Override the provider's endpoint URL.
    #[arg(long, global = true, env = "ANCHORDOC_BASE_URL")]
    base_url: Option<String>,

    /// Override the model's context limit in tokens.
    #[arg(long, global = true)]
    context_limit: Option<usize>,

    /// Retries per LLM call on transport failure.
    #[arg(long, global = true, default_value_t = 3)]
    max_retries: u32,

    /// Delay between sequential batch calls, in milliseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    batch_delay_ms: u64,

    /// Per-call HTTP timeout in seconds.
    #[arg(long, global = true, default_value_t = 120)]
    api_timeout: u64,

    /// Directory for raw dumps of unparseable model responses.
    #[arg(long, global = true)]
    raw_output_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten a document to anchored text.
    Encode {
        /// Path to a .docx file.
        input: PathBuf,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Strip anchors and formatting tags, leaving plain text.
        #[arg(long)]
        clean: bool,
    },

    /// Apply an editing instruction to a document.
    Edit {
        /// Path to a .docx file.
        input: PathBuf,

        /// The editing instruction for the model.
        instruction: String,

        /// Output .docx path.
        #[arg(short, long)]
        output: PathBuf,

        /// Path to a text file containing a custom system prompt.
        #[arg(long)]
        system_prompt: Option<PathBuf>,
    },

    /// Audit citations in a document.
    CheckCitations {
        /// Path to a .docx file.
        input: PathBuf,

        /// Write the JSON report to this file instead of a summary to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full JSON report to stdout.
        #[arg(long)]
        json: bool,

        /// Paragraphs of overlap context between citation batches.
        #[arg(long, default_value_t = 2)]
        overlap: usize,
    },

    /// Verify API credentials and connectivity with one tiny call.
    CheckConnection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;

    match &cli.command {
        Command::Encode {
            input,
            output,
            clean,
        } => {
            let anchored = encode_docx(input).context("Failed to encode document")?;
            let text = if *clean { strip_markup(&anchored) } else { anchored };
            write_output(output.as_deref(), &text)?;
        }

        Command::Edit {
            input,
            instruction,
            output,
            ..
        } => {
            let stats = edit_to_file(input, output, instruction, &config)
                .await
                .context("Edit failed")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}/{} batches  {}ms  →  {}",
                    if stats.failed_batches == 0 {
                        green("✔")
                    } else {
                        yellow("⚠")
                    },
                    stats.batches - stats.failed_batches,
                    stats.batches,
                    stats.total_duration_ms,
                    bold(&output.display().to_string()),
                );
                if stats.failed_batches > 0 {
                    eprintln!(
                        "   {} batches kept their original text",
                        red(&stats.failed_batches.to_string())
                    );
                }
            }
        }

        Command::CheckCitations {
            input,
            output,
            json,
            overlap,
        } => {
            let mut config = config;
            config.context_overlap = *overlap;
            let anchored = encode_docx(input).context("Failed to encode document")?;
            let report = check_citations_text(&anchored, &config)
                .await
                .context("Citation analysis failed")?;

            if let Some(path) = output {
                let body = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                std::fs::write(path, body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!("{} report written to {}", green("✔"), bold(&path.display().to_string()));
                }
            } else if *json {
                let body = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                println!("{body}");
            } else {
                print_report_summary(&report);
            }
        }

        Command::CheckConnection => {
            let client = client_from_config(&config).context("Client construction failed")?;
            eprint!("Testing {} ({})… ", config.provider, client.model());
            if client.ping().await {
                eprintln!("{}", green("connected"));
            } else {
                eprintln!("{}", red("failed"));
                anyhow::bail!("connection test failed");
            }
        }
    }

    Ok(())
}

/// Map global CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_retries(cli.max_retries)
        .batch_delay_ms(cli.batch_delay_ms)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider(parse_provider(provider)?);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(limit) = cli.context_limit {
        builder = builder.context_limit(limit);
    }
    if let Some(ref dir) = cli.raw_output_dir {
        builder = builder.raw_output_dir(dir.clone());
    }
    if let Command::Edit {
        system_prompt: Some(ref path),
        ..
    } = cli.command
    {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn parse_provider(s: &str) -> Result<Provider> {
    match s.to_lowercase().as_str() {
        "llama" => Ok(Provider::Llama),
        "openai" => Ok(Provider::OpenAi),
        other => anyhow::bail!("Unknown provider '{other}' (expected: llama, openai)"),
    }
}

fn write_output(path: Option<&std::path::Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}

/// Human-readable report summary.
fn print_report_summary(report: &CitationReport) {
    let s = &report.analysis_summary;
    println!("{}", bold("Citation analysis"));
    println!("  total:       {}", s.total);
    println!("  correct:     {}", green(&s.correct.to_string()));
    println!(
        "  with errors: {}",
        if s.with_errors > 0 {
            red(&s.with_errors.to_string())
        } else {
            s.with_errors.to_string()
        }
    );
    if let Some(batches) = s.batches_processed {
        println!("  batches:     {batches}");
    }

    let flagged: Vec<_> = report
        .citations
        .iter()
        .filter(|c| c.status == CitationStatus::Error)
        .collect();
    if !flagged.is_empty() {
        println!();
        println!("{}", bold("Citations with errors"));
        for c in flagged {
            println!("  {} {}  {}", red("✗"), c.anchor, c.original_text);
            for e in &c.errors {
                println!("      {}", dim(e));
            }
            if let Some(ref suggestion) = c.suggested_text {
                println!("      suggested: {}", green(suggestion));
            }
        }
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("{}", bold("Recommendations"));
        for r in &report.recommendations {
            println!("  • {r}");
        }
    }

    if !report.failed_batches.is_empty() {
        println!();
        println!("{}", bold(&red("Failed batches")));
        for f in &report.failed_batches {
            println!("  batch {}: {}", f.batch(), f);
        }
    }
}
