use clap::{Parser, ValueEnum};
use dq_pipeline::applier::ApplyMode;
use dq_pipeline::config::{Config, ConfigOverrides};
use dq_pipeline::llm::{LlmGateway, ModelFallbackGateway, Provider};
use dq_pipeline::orchestrator::Orchestrator;
use dq_pipeline::source::{CsvArtifactSink, CsvRowSource, RowSource};
use dq_pipeline::{apply_fixes_mode, detect_issues};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "dqctl")]
#[command(about = "Data Quality Detection & Repair Pipeline")]
struct Args {
    /// Path to the input CSV
    input: PathBuf,

    /// What to do with the issues once detected
    #[arg(long, value_enum, default_value_t = CliApplyMode::Preview)]
    mode: CliApplyMode,

    /// Destination directory for export/commit modes (default: alongside input)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Per-column unit override, e.g. `--unit-preference height_cm=in`. Repeatable.
    #[arg(long = "unit-preference", value_name = "COLUMN=UNIT")]
    unit_preferences: Vec<String>,

    /// LLM API key (or set DQ_LLM_API_KEY / GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// LLM provider
    #[arg(long, value_enum)]
    provider: Option<CliProvider>,

    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliApplyMode {
    Preview,
    Export,
    Commit,
}

impl From<CliApplyMode> for ApplyMode {
    fn from(mode: CliApplyMode) -> Self {
        match mode {
            CliApplyMode::Preview => ApplyMode::Preview,
            CliApplyMode::Export => ApplyMode::Export,
            CliApplyMode::Commit => ApplyMode::Commit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Openai,
    Gemini,
    Claude,
}

impl From<CliProvider> for Provider {
    fn from(provider: CliProvider) -> Self {
        match provider {
            CliProvider::Openai => Provider::OpenAi,
            CliProvider::Gemini => Provider::Gemini,
            CliProvider::Claude => Provider::Claude,
        }
    }
}

fn parse_unit_preferences(raw: &[String]) -> HashMap<String, String> {
    raw.iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(column, unit)| (column.trim().to_string(), unit.trim().to_string()))
        .collect()
}

#[tokio::main]
async fn main() -> dq_pipeline::Result<()> {
    let args = Args::parse();

    let config = Config::load(ConfigOverrides {
        llm_provider: args.provider.map(Provider::from),
        llm_api_key: args.api_key.clone(),
        log_level: args.log_level.clone(),
    });

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level)).init();

    info!(input = %args.input.display(), "loading rows");
    let source = CsvRowSource::new(&args.input);
    let dataset = source.load(None)?;

    let gateway: Option<Arc<dyn LlmGateway>> = if config.llm_api_key == "dummy-api-key" {
        None
    } else {
        Some(Arc::new(ModelFallbackGateway::new(config.llm_provider, config.llm_api_key.clone(), config.max_quota_exhausted_before_cascade_cap)))
    };

    let orchestrator = Orchestrator::new(config.imputation_columns.clone(), config.orchestration_deadline_seconds);
    let (issues, summary) = detect_issues(&dataset, &orchestrator, gateway).await;

    println!("\n=== Data Quality Summary ===");
    println!("rows scanned: {}", summary.total_rows_scanned);
    println!("issues found: {}", summary.total_issues);
    println!("rows affected: {} ({:.1}%)", summary.rows_affected, summary.rows_affected_percent);
    for (category, count) in &summary.category_counts {
        println!("  {category}: {count}");
    }
    if summary.partial {
        println!("warning: run hit its deadline and is partial");
    }
    for (agent, message) in &summary.agent_failures {
        println!("warning: agent '{agent}' failed: {message}");
    }

    let mode: ApplyMode = args.mode.into();
    if matches!(mode, ApplyMode::Preview) && args.output.is_none() {
        return Ok(());
    }

    let unit_preferences = parse_unit_preferences(&args.unit_preferences);
    let output_dir = args.output.clone().unwrap_or_else(|| args.input.parent().map(PathBuf::from).unwrap_or_default());
    let sink = CsvArtifactSink::new(output_dir);
    let source_key = args.input.file_name().and_then(|s| s.to_str()).unwrap_or("dataset.csv").to_string();

    let outcome = apply_fixes_mode(&dataset.rows, &dataset.columns, &issues, &unit_preferences, mode, &source_key, &sink)?;

    println!("\napplied {} change(s)", outcome.applied_count);
    if let Some(locator) = outcome.locator {
        println!("wrote repaired dataset to {locator}");
    }

    Ok(())
}
