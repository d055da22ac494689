//! ttp-quiz command line.
//!
//! Usage:
//!   ttp-quiz generate --input techniques.json --output questions.json
//!   ttp-quiz true-false --chunk chunk_1.json --chunk chunk_2.json --out-dir tf/
//!   ttp-quiz answer --input questions.json --output answered.json --model gpt-4o

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use ttp_quiz::answerer::{AnswerReport, QuestionAnswerer};
use ttp_quiz::clients::{CompletionClient, OpenAiClient};
use ttp_quiz::config::Config;
use ttp_quiz::invoker::GenerationInvoker;
use ttp_quiz::orchestrator::{Orchestrator, RunSummary};
use ttp_quiz::throttle::Throttle;
use ttp_quiz::true_false::TrueFalseGenerator;

#[derive(Parser)]
#[command(name = "ttp-quiz")]
#[command(about = "Generate quiz questions from tactic/technique/procedure records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate MCQ questions from a JSON record or array of records
    Generate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "questions.json")]
        output: PathBuf,
        /// Write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        cooldown_ms: Option<u64>,
    },
    /// Generate True/False questions, one request per chunk of procedures
    TrueFalse {
        #[arg(long = "chunk", required = true)]
        chunks: Vec<PathBuf>,
        #[arg(long, default_value = "true_false")]
        out_dir: PathBuf,
    },
    /// Have one or more models answer generated questions
    Answer {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Repeat to answer with several models (defaults to answering.models)
        #[arg(long = "model")]
        models: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before Config::load so its warnings are visible
    ttp_quiz::load_env();
    tracing_subscriber::fmt()
        .with_env_filter(ttp_quiz::log_filter())
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            summary,
            model,
            cooldown_ms,
        } => {
            if let Some(model) = model {
                config.generation.model = model;
            }
            if let Some(ms) = cooldown_ms {
                config.scheduling.cooldown_ms = ms;
            }
            generate(&config, &input, &output, summary.as_deref()).await
        }
        Commands::TrueFalse { chunks, out_dir } => true_false(&config, &chunks, &out_dir).await,
        Commands::Answer {
            input,
            output,
            models,
        } => {
            if !models.is_empty() {
                config.answering.models = models;
            }
            answer(&config, &input, &output).await
        }
    }
}

fn build_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let client = OpenAiClient::from_config(&config.generation, &config.runtime)
        .context("Failed to build completion client")?;
    info!("Using completion endpoint {}", client.endpoint());
    Ok(Arc::new(client))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

async fn generate(config: &Config, input: &Path, output: &Path, summary_path: Option<&Path>) -> Result<()> {
    let records = read_json(input)?;
    let orchestrator = Orchestrator::from_config(build_client(config)?, config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted: finishing the current item, skipping the rest");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run_until_cancelled(&records, &cancel).await;
    write_json(output, &report.questions)?;
    println!("📝 Wrote {} question(s) to {}", report.questions.len(), output.display());

    if let Some(path) = summary_path {
        let doc = json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "input": input.display().to_string(),
            "model": config.generation.model,
            "summary": report.summary,
        });
        write_json(path, &doc)?;
    }

    print_run_summary(&report.summary);
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\n📊 Run {}", summary.run_id);
    println!(
        "  Records: {} seen, {} rejected",
        summary.records_seen, summary.records_rejected
    );
    for (kind, tally) in &summary.by_kind {
        println!(
            "  {:<10} attempted {:>4}  succeeded {:>4}  failed {:>4}",
            kind, tally.attempted, tally.succeeded, tally.failed
        );
    }
    println!("  Questions: {}", summary.questions());
    for (qtype, count) in &summary.questions_by_type {
        println!("    {:<15} {}", qtype.label(), count);
    }
    if summary.skipped > 0 {
        println!("  ⏭️  Skipped after interrupt: {}", summary.skipped);
    }
    if !summary.failures.is_empty() {
        println!("  ❌ Failures: {}", summary.failures.len());
        for f in &summary.failures {
            println!(
                "    [{}] record {} {} '{}': {}",
                f.stage,
                f.record_index,
                f.entity_id,
                f.entity_title,
                f.message
            );
        }
    }
}

async fn true_false(config: &Config, chunks: &[PathBuf], out_dir: &Path) -> Result<()> {
    let generator = TrueFalseGenerator::new(
        GenerationInvoker::new(build_client(config)?),
        &config.true_false,
        Throttle::from_cooldown_ms(config.scheduling.cooldown_ms),
    );

    let outcomes = generator.generate_chunks(chunks).await;
    let mut failed = 0usize;
    let mut total = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(questions) => {
                let stem = outcome
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "chunk".to_string());
                let path = out_dir.join(format!("{stem}_true_false.json"));
                write_json(&path, questions)?;
                total += questions.len();
                println!("✅ {} -> {} ({} questions)", outcome.path.display(), path.display(), questions.len());
            }
            Err(e) => {
                failed += 1;
                println!("❌ {}: {}", outcome.path.display(), e);
            }
        }
    }
    println!(
        "\n📊 {} chunk(s), {} failed, {} question(s) written",
        outcomes.len(),
        failed,
        total
    );
    Ok(())
}

async fn answer(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let questions = match read_json(input)? {
        Value::Array(items) => items,
        single => vec![single],
    };
    let answerer = QuestionAnswerer::new(GenerationInvoker::new(build_client(config)?), &config.answering);
    info!("Answering {} question(s) with {:?}", questions.len(), answerer.models());

    let (answered, report) = answerer.answer_all(&questions).await;
    write_json(output, &answered)?;
    println!("📝 Wrote {} entries to {}", answered.len(), output.display());
    print_answer_report(&report);
    Ok(())
}

fn print_answer_report(report: &AnswerReport) {
    println!(
        "\n📊 {} question(s) answered, {} skipped",
        report.questions_answered, report.skipped
    );
    for (model, tally) in &report.by_model {
        println!(
            "  {:<20} correct {:>4}  incorrect {:>4}  unknown {:>4}  error {:>4}  accuracy {:.1}%",
            model,
            tally.correct,
            tally.incorrect,
            tally.unknown,
            tally.error,
            tally.accuracy() * 100.0
        );
    }
}
