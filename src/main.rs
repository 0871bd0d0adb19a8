//! prefforge CLI - Training record export from rated completions.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use prefforge::{
    summarize_facet, DatasetSnapshot, ExportConfig, ExportOrchestrator, ExportReport, ForgeError,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "prefforge")]
#[command(version)]
#[command(about = "Materialize SFT/DPO/KTO training records from rated completions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to export template file
    #[arg(short, long, global = true, default_value = "export.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export training records for the template
    Export {
        /// Output JSONL file (overrides [output].dir and filename template)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the JSON export report here (overrides [output].report_path)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Seed for `random` sample ordering
        #[arg(long)]
        seed: Option<u64>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Summarize SFT/DPO readiness of one facet
    Summary {
        /// Facet name
        #[arg(short, long)]
        facet: String,

        /// Target model id (defaults to the template's target_model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Validate export template and dataset
    Validate,

    /// Show example export template
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# prefforge export template

[template]
name = "helpfulness"
description = "High-confidence answers for the helpfulness facet"
# sft | dpo | kto
training_type = "dpo"
# Logprobs must be computed with exactly this model id
target_model = "llama3.1:8b-instruct"

[dataset]
path = "dataset.json"

[output]
dir = "exports/${USER}"
filename_template = "export-{name}-{timestamp}.jsonl"
# report_path = "exports/report.json"

# Facet entries run in order; a sample is exported by at most one entry.
[[facets]]
facet = "helpfulness"
# newest | oldest | random
order = "newest"
limit = { count = 200 }
# Optional overrides of the facet's thresholds
min_rating = 8
# max_rating = 4      # KTO "bad" ceiling
# min_logprob = -1.0
# avg_logprob = -0.4

[[facets]]
facet = "tone"
order = "random"
limit = { percentage = 50 }
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<ExportConfig> {
    ExportConfig::from_file(path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn load_dataset(config: &ExportConfig) -> Result<DatasetSnapshot> {
    DatasetSnapshot::from_file(&config.dataset.path)
        .with_context(|| format!("Failed to load dataset from {:?}", config.dataset.path))
}

fn print_report(report: &ExportReport) {
    println!("\n=== Export Complete ===");
    println!("Template:    {} ({})", report.template, report.training_type);
    println!("Run:         {}", report.run_id);
    for facet in &report.facets {
        println!(
            "Facet:       {} - eligible {}, cap {}, exported {}, failed {}, skipped {}",
            facet.facet,
            facet.eligible,
            facet.cap,
            facet.exported.len(),
            facet.failed.len(),
            facet.skipped_claimed
        );
    }
    println!("Samples:     {}", report.total_samples);
    println!("Records:     {}", report.total_records);
    println!("Failed:      {}", report.total_failed);
    println!("Conflicts:   {}", report.total_conflicts);
    println!("Runtime:     {:.2}s", report.runtime_secs);
    if let Some(output) = &report.output_path {
        println!("Output:      {output:?}");
    }
}

fn print_failures(report: &ExportReport) {
    for facet in &report.facets {
        for failed in &facet.failed {
            println!("[{}] Sample #{} {}", facet.facet, failed.sample_id, failed.title);
            for reason in &failed.reasons {
                println!("    {reason}");
            }
        }
        for note in &facet.notes {
            println!("[{}] Sample #{} (exported)", facet.facet, note.sample_id);
            for line in &note.notes {
                println!("    {line}");
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            let dataset = load_dataset(&config)?;

            for entry in &config.facets {
                if dataset.facets().iter().all(|f| f.name != entry.facet) {
                    bail!("Facet not found in dataset: {}", entry.facet);
                }
            }

            info!("Configuration is valid");
            info!(
                "  Template: {} ({})",
                config.template.name, config.template.training_type
            );
            info!("  Facets: {}", config.facets.len());
            info!(
                "  Dataset: {} samples, {} facets",
                dataset.samples().len(),
                dataset.facets().len()
            );
            match &config.template.target_model {
                Some(model) => info!("  Target model: {model}"),
                None => warn!("  No target model: logprob gate applies to SFT only when set"),
            }
            return Ok(());
        }

        Commands::Summary { facet, model } => {
            let config = load_config(&cli.config)?;
            let dataset = load_dataset(&config)?;
            let Some(model) = model.or_else(|| config.template.target_model.clone()) else {
                bail!("No target model: pass --model or set template.target_model");
            };

            let report = summarize_facet(&dataset, &facet, &model)?;

            println!("\n=== Facet Summary ===");
            println!("Facet:       {}", report.facet);
            println!("Model:       {}", report.target_model);
            println!(
                "Thresholds:  rating >= {}, min_logprob >= {}, avg_logprob >= {}",
                report.thresholds.min_rating,
                report.thresholds.min_logprob,
                report.thresholds.avg_logprob
            );
            println!(
                "SFT:         {}/{} finished, total loss {:.3}",
                report.sft.finished, report.sft.total, report.sft.total_loss
            );
            println!(
                "DPO:         {}/{} finished, total loss {:.3}",
                report.dpo.finished, report.dpo.total, report.dpo.total_loss
            );
            for (label, stats) in [("SFT", &report.sft), ("DPO", &report.dpo)] {
                for detail in &stats.unfinished_details {
                    println!("[{label}] {}", detail.sample_name);
                    for reason in &detail.reasons {
                        println!("    {reason}");
                    }
                }
            }
        }

        Commands::Export {
            output,
            report,
            seed,
            no_progress,
        } => {
            let config = load_config(&cli.config)?;
            let dataset = load_dataset(&config)?;
            let output_path = config
                .resolve_output_path(output.as_deref(), Utc::now())
                .context("Failed to resolve output path")?;
            let report_path = report.or_else(|| config.output.report_path.clone());

            let mut orchestrator =
                ExportOrchestrator::new(&dataset, &config).with_progress(!no_progress);
            if let Some(seed) = seed {
                orchestrator = orchestrator.with_seed(seed);
            }

            let export_report = match orchestrator.export_to(&output_path) {
                Ok(report) => report,
                Err(err @ ForgeError::NothingEligible { .. }) => {
                    if let Some(report) = err.report() {
                        print_failures(report);
                        if let Some(path) = &report_path {
                            report.save(path).context("Failed to write report")?;
                        }
                    }
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };

            print_failures(&export_report);
            if let Some(path) = &report_path {
                export_report
                    .save(path)
                    .context("Failed to write report")?;
                info!(path = ?path, "Report written");
            }
            print_report(&export_report);
        }
    }

    Ok(())
}
