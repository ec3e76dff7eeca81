//! ladder: batch driver for the model cascade.
//!
//! # Usage
//!
//! ```bash
//! # Answer every prompt in a JSONL file
//! ladder run ladder.yaml prompts.jsonl --out results.jsonl
//!
//! # Show where a prompt would start
//! ladder route ladder.yaml "Prove that sqrt(2) is irrational"
//!
//! # Check settings, artifacts and backends without calling a model
//! ladder validate ladder.yaml
//!
//! # Verbose logging
//! RUST_LOG=debug ladder run ladder.yaml prompts.jsonl
//! ```

mod dataset;
mod record;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ladder_core::Settings;
use ladder_runtime::{CancelToken, CascadeError, Pipeline, ProviderRegistry};

use record::Record;

/// Confidence-gated model cascade
#[derive(Parser, Debug)]
#[command(name = "ladder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer every prompt in a file, one JSONL record per prompt
    Run {
        /// Settings file (YAML or JSON)
        config: PathBuf,

        /// Prompts: JSONL, or a JSON array when the extension is .json
        prompts: PathBuf,

        /// Output file
        #[arg(short, long, value_name = "FILE", default_value = "results.jsonl")]
        out: PathBuf,
    },

    /// Print the routing decision for one prompt
    Route {
        config: PathBuf,
        prompt: String,
    },

    /// Validate settings, routing artifacts and backend configuration
    Validate { config: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            prompts,
            out,
        } => run(&config, &prompts, &out).await,
        Command::Route { config, prompt } => route(&config, &prompt).await,
        Command::Validate { config } => validate(&config),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries results; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| format!("Failed to load settings: {}", path.display()))
}

fn build_pipeline(settings: &Settings, registry: &ProviderRegistry) -> Result<Pipeline> {
    Pipeline::from_settings(settings, registry).context("Failed to build pipeline")
}

/// Check every backend's options against its factory, without connecting.
fn check_backends(settings: &Settings, registry: &ProviderRegistry) -> Result<()> {
    for model in &settings.models {
        registry
            .validate(&model.provider, &model.options)
            .with_context(|| format!("candidate '{}' ({})", model.name, model.provider))?;
    }
    registry
        .validate(&settings.judge_provider, &settings.judge_options)
        .with_context(|| {
            format!("judge '{}' ({})", settings.judge_model, settings.judge_provider)
        })?;
    if let Some(embedding) = &settings.embedding {
        registry
            .validate(&embedding.provider, &embedding.options)
            .with_context(|| format!("embedding '{}'", embedding.identity()))?;
    }
    Ok(())
}

async fn run(config: &Path, prompts: &Path, out: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let pipeline = build_pipeline(&settings, &ProviderRegistry::with_defaults())?;
    let items = dataset::load_prompts(prompts)?;

    let file =
        File::create(out).with_context(|| format!("Failed to create output: {}", out.display()))?;
    let mut writer = BufWriter::new(file);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    info!(prompts = items.len(), out = %out.display(), "starting run");

    let (mut answered, mut failed) = (0usize, 0usize);
    for (n, item) in items.iter().enumerate() {
        let record = match pipeline.answer(&item.prompt, Some(&cancel)).await {
            Ok(answer) => {
                answered += 1;
                info!(
                    n = n + 1,
                    candidate = %answer.outcome.resolution.candidate(),
                    resolution = answer.outcome.resolution.kind(),
                    confidence = answer.outcome.resolution.confidence(),
                    "answered"
                );
                Record::answered(&item.prompt, &answer)
            }
            Err(CascadeError::Cancelled) => break,
            Err(e) => {
                failed += 1;
                error!(n = n + 1, error = %e, "prompt failed");
                Record::failed(&item.prompt, &e)
            }
        };

        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;
        writer.flush()?;
    }

    let usage = pipeline.cascade().usage();
    info!(
        answered,
        failed,
        skipped = items.len() - answered - failed,
        calls = usage.calls,
        judge_calls = usage.judge_calls,
        tokens = usage.total_tokens(),
        estimated_cost = usage.estimated_cost,
        "run complete"
    );

    if cancel.is_cancelled() {
        bail!("run cancelled after {} of {} prompts", answered + failed, items.len());
    }
    Ok(())
}

async fn route(config: &Path, prompt: &str) -> Result<()> {
    let settings = load_settings(config)?;
    let pipeline = build_pipeline(&settings, &ProviderRegistry::with_defaults())?;

    let decision = pipeline.route(prompt, None).await.context("Routing failed")?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn validate(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let registry = ProviderRegistry::with_defaults();
    check_backends(&settings, &registry)?;
    let pipeline = build_pipeline(&settings, &registry)?;

    println!("Settings OK: {}", config.display());
    println!("  threshold: {}", settings.confidence_threshold());
    println!("  judge:     {} ({})", settings.judge_model, settings.judge_provider);
    println!("  fusion:    {}", settings.fusion.tie_break);
    println!("  candidates:");
    for model in &settings.models {
        println!(
            "    - {} via {} (cost {:.4})",
            model.name,
            model.provider,
            model.cost()
        );
    }

    let router = pipeline.router();
    match (router.taxonomy(), router.learned()) {
        (None, None) => println!("  routing:   none"),
        (taxonomy, learned) => {
            if let Some(t) = taxonomy {
                println!(
                    "  taxonomy:  {} references, encoder {}",
                    t.index().len(),
                    t.index().encoder()
                );
            }
            if let Some(l) = learned {
                println!(
                    "  learned:   {} labels, encoder {}",
                    l.classifier().labels().len(),
                    l.classifier().encoder()
                );
            }
        }
    }
    Ok(())
}
