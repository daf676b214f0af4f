//! deskpilot - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use deskpilot::{
    cli::{Args, Commands},
    config::AssistantConfig,
    handlers::{register_dry_run, HandlerRegistry},
    learning::{JsonTaskStore, LearningEngine},
    nlu::PatternRules,
    runtime::{run, Assistant, BuildOptions, ConsoleSink, FeedbackSink, ScriptedSource, StdinSource},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn load_config(args: &Args) -> Result<AssistantConfig> {
    let config = match &args.config {
        Some(path) => AssistantConfig::load_from(path)?,
        None => AssistantConfig::load()?,
    };
    Ok(config)
}

fn build_assistant(args: &Args, config: &AssistantConfig) -> Result<Assistant> {
    let rules = PatternRules::with_custom(&config.rules)?;
    let mut registry = HandlerRegistry::new();
    register_dry_run(&mut registry, rules.action_types());

    let assistant = Assistant::from_config(
        config,
        registry,
        BuildOptions {
            persist_tasks: !args.no_persist,
            use_classifier: !args.no_classifier,
        },
    )?;
    Ok(assistant)
}

async fn run_loop(args: &Args, config: &AssistantConfig) -> Result<()> {
    let assistant = Arc::new(build_assistant(args, config)?);
    let sink: Arc<dyn FeedbackSink> = Arc::new(ConsoleSink::new(args.detailed));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let summary = match &args.script {
        Some(path) => run(assistant, ScriptedSource::from_file(path)?, sink, shutdown).await,
        None => {
            println!("{}", "deskpilot is listening. Type a command, or Ctrl-D to quit.".dimmed());
            run(assistant, StdinSource::new(), sink, shutdown).await
        }
    };

    println!(
        "{} {} turn(s), {} fully successful, {} interrupt(s)",
        "Session:".bold(),
        summary.turns,
        summary.successful_turns,
        summary.interrupts
    );
    Ok(())
}

async fn interpret(args: &Args, config: &AssistantConfig, utterance: &str) -> Result<()> {
    let assistant = build_assistant(args, config)?;
    let requests = assistant.interpret(utterance).await;
    if requests.is_empty() {
        println!("{}", "(nothing to do)".dimmed());
    }
    for (i, request) in requests.iter().enumerate() {
        let line = serde_json::to_string(request).context("Failed to render request")?;
        println!("{} {}", format!("{}.", i + 1).cyan(), line);
    }
    Ok(())
}

fn open_engine(config: &AssistantConfig) -> Result<LearningEngine> {
    let store = JsonTaskStore::new(&config.learning.store_path)?;
    Ok(LearningEngine::new(Box::new(store))?)
}

fn list_tasks(config: &AssistantConfig) -> Result<()> {
    let engine = open_engine(config)?;
    let names = engine.list();
    if names.is_empty() {
        println!("No learned tasks yet.");
        return Ok(());
    }

    for name in &names {
        if let Some(task) = engine.task(name) {
            let slots = if task.parameter_slots.is_empty() {
                String::new()
            } else {
                format!(
                    " slots: {}",
                    task.parameter_slots.iter().cloned().collect::<Vec<_>>().join(", ")
                )
            };
            println!(
                "{} ({} step(s), used {}x, {:.0}% ok){}",
                task.name.bold(),
                task.steps.len(),
                task.usage_count,
                task.success_rate * 100.0,
                slots
            );
        }
    }

    let stats = engine.stats();
    if let Some(most_used) = stats.most_used {
        println!("Most used: {}", most_used.green());
    }
    Ok(())
}

async fn forget_task(config: &AssistantConfig, name: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let task = engine.forget(name).await?;
    println!("Forgot '{}'.", task.name);
    Ok(())
}

fn show_config(args: &Args, config: &AssistantConfig) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => AssistantConfig::config_path()?,
    };
    println!("{} {}", "Config file:".bold(), path.display());
    println!("{}", toml::to_string_pretty(config).context("Failed to render config")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.verbosity().filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command() {
        Commands::Run => run_loop(&args, &config).await,
        Commands::Interpret { utterance } => interpret(&args, &config, &utterance.join(" ")).await,
        Commands::Tasks => list_tasks(&config),
        Commands::Forget { name } => forget_task(&config, &name.join(" ")).await,
        Commands::Config => show_config(&args, &config),
    }
}
