//! itemforge CLI
//!
//! The `itemforge` command turns source material into a reviewed exam item bank.
//!
//! ## Commands
//!
//! - `generate`: Run the full pipeline and write the exam documents
//! - `objectives`: List the numbered learning objectives found in a source file
//! - `verify`: Check a run report against its digest and summarise it
//! - `config`: Print the effective pipeline configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use itemforge_core::{
    extract_objectives, read_run_report, write_artifacts, write_run_report, ExamPipeline,
    GenerationProject, GenerativeBackend, HttpBackend, HttpBackendConfig, LogFormat,
    PipelineConfig, TracingProgress,
};

#[derive(Parser)]
#[command(name = "itemforge")]
#[command(author = "Stevedores Org")]
#[command(version = itemforge_core::VERSION)]
#[command(about = "Generate validated multiple-choice exam items from source material", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by `generate` and `config`.
#[derive(clap::Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// Pipeline config file (TOML)
    #[arg(short, long, env = "ITEMFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Items to generate per learning objective
    #[arg(long)]
    items_per_objective: Option<usize>,

    /// Validation passes (repair runs between passes)
    #[arg(long)]
    validation_iterations: Option<u32>,

    /// Review passes (revisions run between passes)
    #[arg(long)]
    review_iterations: Option<u32>,

    /// Objective generation tasks in flight at once
    #[arg(long)]
    max_concurrent: Option<usize>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => PipelineConfig::default(),
        };
        if let Some(n) = self.items_per_objective {
            config.items_per_objective = n;
        }
        if let Some(n) = self.validation_iterations {
            config.validation_iterations = n;
        }
        if let Some(n) = self.review_iterations {
            config.review_iterations = n;
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent_objectives = n;
        }
        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a source file
    Generate {
        /// Source material (plain text)
        #[arg(short, long)]
        source: PathBuf,

        /// Output directory for exam documents and the run report
        #[arg(short, long, default_value = "exam_output")]
        output: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Model name (overrides ITEMFORGE_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// OpenAI-compatible endpoint base URL (overrides ITEMFORGE_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// List the numbered learning objectives in a source file (no backend calls)
    Objectives {
        /// Source material (plain text)
        source: PathBuf,
    },

    /// Verify a run report's digest and print a summary
    Verify {
        /// Output directory of a previous `generate` run
        #[arg(default_value = "exam_output")]
        dir: PathBuf,
    },

    /// Print the effective pipeline configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    itemforge_core::init_tracing(format, level);

    match cli.command {
        Commands::Generate {
            source,
            output,
            config,
            model,
            base_url,
        } => {
            let pipeline_config = config.resolve()?;
            let backend = build_backend(model, base_url)?;
            let summary = cmd_generate(backend, pipeline_config, &source, &output).await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Objectives { source } => cmd_objectives(&source),
        Commands::Verify { dir } => cmd_verify(&dir),
        Commands::Config { config } => cmd_config(&config),
    }
}

fn build_backend(
    model: Option<String>,
    base_url: Option<String>,
) -> Result<Arc<dyn GenerativeBackend>> {
    let mut config = HttpBackendConfig::from_env();
    if let Some(model) = model {
        config = config.with_model(&model);
    }
    if let Some(url) = base_url {
        config = config.with_base_url(&url);
    }
    let backend = HttpBackend::new(config).context("Failed to build HTTP backend")?;
    Ok(Arc::new(backend))
}

/// Outcome of one `generate` run.
#[derive(Debug)]
struct GenerateSummary {
    project_id: String,
    items: usize,
    sections: usize,
    invalid_remaining: usize,
    quality: String,
    approval: String,
    review_passes: usize,
    output: PathBuf,
}

async fn cmd_generate(
    backend: Arc<dyn GenerativeBackend>,
    config: PipelineConfig,
    source: &Path,
    output: &Path,
) -> Result<GenerateSummary> {
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read source {:?}", source))?;
    info!("Generating exam items from {:?}", source);

    let mut project = GenerationProject::new(
        text,
        output,
        config.items_per_objective,
        config.validation_iterations,
    );
    let pipeline = ExamPipeline::new(backend, config).with_progress(Arc::new(TracingProgress));

    let result = pipeline.run(&mut project).await;
    // Written for failed runs too.
    write_run_report(&project, output).context("Failed to write run report")?;
    let exam = result.context("Pipeline failed")?;

    let paths = write_artifacts(&exam, output).context("Failed to write exam documents")?;
    info!("Wrote {:?}, {:?}, {:?}", paths.problems, paths.answers, paths.combined);

    let review = project.latest_review();
    Ok(GenerateSummary {
        project_id: project.id.to_string(),
        items: exam.items.len(),
        sections: exam.sections,
        invalid_remaining: project
            .latest_validation()
            .map(|b| b.invalid_count())
            .unwrap_or(0),
        quality: review
            .map(|r| r.overall_quality.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        approval: review
            .map(|r| r.approval_status.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        review_passes: project.review_history.len(),
        output: output.to_path_buf(),
    })
}

fn print_summary(summary: &GenerateSummary) {
    println!("Project:  {}", summary.project_id);
    println!("Items:    {} in {} sections", summary.items, summary.sections);
    println!("Invalid:  {} after validation", summary.invalid_remaining);
    println!(
        "Review:   {} / {} after {} pass(es)",
        summary.quality, summary.approval, summary.review_passes
    );
    println!("Output:   {:?}", summary.output);
}

fn cmd_objectives(source: &Path) -> Result<()> {
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read source {:?}", source))?;
    let objectives = extract_objectives(&text);
    if objectives.is_empty() {
        println!("No numbered learning objectives found in {:?}", source);
        return Ok(());
    }
    for objective in &objectives {
        println!("{}  {}", objective.number, objective.description);
    }
    println!("\n{} objective(s)", objectives.len());
    Ok(())
}

fn cmd_verify(dir: &Path) -> Result<()> {
    let report = read_run_report(dir)
        .with_context(|| format!("Failed to verify run report in {:?}", dir))?;

    println!("Run report verified: {}", report.project_id);
    println!("  Status:  {:?} (phase {})", report.status, report.phase);
    println!("  Items:   {}", report.items.len());
    if let Some(error) = &report.error {
        println!("  Error:   {}", error);
    }
    if let Some(review) = report.final_review() {
        println!(
            "  Review:  {} / {} (pass {})",
            review.overall_quality, review.approval_status, review.iteration
        );
        for issue in &review.issues {
            println!("    - {}", issue);
        }
    }
    Ok(())
}

fn cmd_config(args: &ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
