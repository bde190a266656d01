//! Synapse CLI - headless harness for the console orchestration core

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use synapse::backend::HttpBackend;
use synapse::chains;
use synapse::error::{FixSuggestion, SynapseError};
use synapse::signal::Signal;
use synapse::types::{BatchSize, Device, ManifestKey, TraceLevel};
use synapse::Dispatcher;

#[derive(Parser)]
#[command(name = "synapse")]
#[command(about = "Synapse - signal-chain orchestration for the inference console")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered signal chains
    Chains,

    /// Boot the console state against a backend and load the catalogs
    Run {
        /// Backend base URL
        #[arg(short, long, default_value = "http://localhost:8088/api")]
        backend: String,
    },

    /// Submit a classification request
    Predict {
        /// Backend base URL
        #[arg(short, long, default_value = "http://localhost:8088/api")]
        backend: String,

        /// Image URL to classify
        #[arg(short, long)]
        url: String,

        /// Model to run, name[:version] (repeatable)
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,

        /// Inference batch size
        #[arg(long, default_value_t = 1)]
        batch_size: u32,

        /// Execution device (CPU or GPU)
        #[arg(long, default_value = "GPU")]
        device: String,

        /// Trace granularity (NO_TRACE .. FULL_TRACE)
        #[arg(long, default_value = "FULL_TRACE")]
        trace_level: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chains => list_chains(),
        Commands::Run { backend } => run_console(&backend).await,
        Commands::Predict {
            backend,
            url,
            models,
            batch_size,
            device,
            trace_level,
        } => predict(&backend, &url, &models, batch_size, &device, &trace_level).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<SynapseError>()
            .and_then(|e| e.fix_suggestion())
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn list_chains() -> Result<()> {
    println!("{}", "Registered chains:".cyan().bold());
    for name in chains::names() {
        let chain = chains::lookup(name).expect("name came from the registry");
        let summary = chain.summary();
        println!(
            "  {} {} ({} ops, {} actions, {} branches)",
            "•".cyan(),
            name,
            summary.ops,
            summary.actions,
            summary.branches
        );
    }
    Ok(())
}

fn connect(backend: &str) -> Result<Dispatcher> {
    let base = url::Url::parse(backend).map_err(SynapseError::Address)?;
    Ok(Dispatcher::new(Arc::new(HttpBackend::new(base))))
}

async fn run_console(backend: &str) -> Result<()> {
    let dispatcher = connect(backend)?;
    println!("{} Backend: {}", "→".cyan(), backend.cyan().bold());

    dispatcher.dispatch(Signal::AppLoaded).await?;
    dispatcher.dispatch(Signal::FrameworksRouted).await?;
    dispatcher.dispatch(Signal::ModelsRouted).await?;

    let view = dispatcher.view();
    println!(
        "{} {} frameworks, {} models loaded",
        "✓".green(),
        view.frameworks.len(),
        view.models.len()
    );
    for framework in &view.frameworks {
        println!(
            "  {} {}:{} ({} agents)",
            "•".cyan(),
            framework.name,
            framework.version,
            framework.agents.len()
        );
    }

    if let Some(error) = &view.error {
        println!("{} {}", "Backend error:".red().bold(), error);
    }

    Ok(())
}

async fn predict(
    backend: &str,
    url: &str,
    models: &[String],
    batch_size: u32,
    device: &str,
    trace_level: &str,
) -> Result<()> {
    // validate the request pieces up front, with usable messages
    let batch_size = BatchSize::new(batch_size).context("invalid batch size")?;
    let device: Device = device.parse().map_err(|e: String| anyhow!(e))?;
    let trace_level: TraceLevel = trace_level.parse().map_err(|e: String| anyhow!(e))?;
    let mut selected_models = BTreeMap::new();
    for model in models {
        let key: ManifestKey = model
            .parse()
            .with_context(|| format!("invalid model '{}'", model))?;
        selected_models.insert(key.to_string(), true);
    }

    let dispatcher = connect(backend)?;
    dispatcher.dispatch(Signal::AppLoaded).await?;
    dispatcher
        .dispatch(Signal::PredictUrlChanged {
            predict_url: url.to_string(),
        })
        .await?;
    dispatcher
        .dispatch(Signal::BatchSizeChanged { batch_size })
        .await?;
    dispatcher.dispatch(Signal::DeviceChanged { device }).await?;
    dispatcher
        .dispatch(Signal::TraceLevelChanged { level: trace_level })
        .await?;

    println!(
        "{} Predicting {} with {} model(s) on {}",
        "→".cyan(),
        url.cyan(),
        selected_models.len(),
        device
    );
    dispatcher
        .dispatch(Signal::InferenceButtonClicked { selected_models })
        .await?;

    let view = dispatcher.view();
    if let Some(error) = &view.error {
        println!("{} {}", "Prediction failed:".red().bold(), error);
        std::process::exit(2);
    }

    println!("{} {} prediction(s)", "✓".green(), view.predictions.len());
    for prediction in &view.predictions {
        println!(
            "  {} {:>6.2}% {}",
            "•".cyan(),
            prediction.probability * 100.0,
            prediction.label
        );
    }

    Ok(())
}
