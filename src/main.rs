//! CloudCap CLI entry point.
//!
//! This binary provides the command-line interface for CloudCap.

use clap::Parser;
use cloudcap::cli::{CheckArgs, Cli, Commands, EstimatesArgs, GraphArgs};
use cloudcap::parser::estimate_skeleton;
use cloudcap::reporter::Reporter;
use cloudcap::{Checker, CloudcapError, Config};
use comfy_table::{ContentArrangement, Table};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            // Codes 0-2 belong to verdicts; errors without a code map to 10
            let code = e.downcast_ref::<CloudcapError>().map_or(10, CloudcapError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,cloudcap={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::debug!("Loading configuration");
    let config = load_config(cli.config.as_deref()).await?;
    tracing::debug!("Configuration loaded successfully");

    match cli.command {
        Commands::Check(args) => check(config, &args).await,
        Commands::Estimates(args) => estimates(config, &args).await,
        Commands::Graph(args) => graph(config, &args).await,

        Commands::Rules => {
            let registry = config.rule_registry()?;
            let mut table = Table::new();
            table
                .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Resource type", "Rule", "Constraint", "Description"]);
            for (resource_type, rule) in registry.iter() {
                table.add_row(vec![
                    resource_type.to_string(),
                    rule.id.clone(),
                    rule.summary(),
                    rule.description.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Init => {
            let config_path = Path::new("cloudcap.yaml");
            if config_path.exists() {
                anyhow::bail!("Configuration file already exists: {}", config_path.display());
            }

            tokio::fs::write(config_path, Config::example_yaml()).await?;
            println!("Created example configuration: cloudcap.yaml");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate(args) => match Config::load(&args.config).await {
            Ok(_) => {
                println!("Configuration is valid: {}", args.config.display());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Configuration error: {e}");
                Ok(ExitCode::from(e.exit_code()))
            }
        },
    }
}

async fn check(mut config: Config, args: &CheckArgs) -> anyhow::Result<ExitCode> {
    tracing::debug!("Executing check command");
    config.merge_check_args(args);
    config.validate()?;

    let checker = Checker::new(config.clone()).with_smtlib(args.dump_smt);
    let report = checker.check(&args.templates, args.estimates.as_deref()).await?;

    let rendered = Reporter::new(&config).generate(&report, args.format)?;
    emit(args.output.as_ref(), &rendered, "Report").await?;

    tracing::info!(verdict = report.verdict.tag(), "Check finished");
    Ok(ExitCode::from(report.verdict.exit_code()))
}

async fn estimates(config: Config, args: &EstimatesArgs) -> anyhow::Result<ExitCode> {
    let registry = config.rule_registry()?;
    let model = Checker::new(config)
        .build_model(&args.templates, args.estimates.as_deref())
        .await?;

    emit(args.output.as_ref(), &estimate_skeleton(&model, &registry), "Estimate skeleton").await?;
    Ok(ExitCode::SUCCESS)
}

async fn graph(mut config: Config, args: &GraphArgs) -> anyhow::Result<ExitCode> {
    config.graph.implicit_references |= args.implicit_references;
    let model = Checker::new(config).build_model(&args.templates, None).await?;

    let graphs: Vec<_> = model.deployments().iter().map(|d| (d.id(), d.graph())).collect();
    let graph_output = cloudcap::graph::export_graph(&graphs, args.format)?;
    emit(args.output.as_ref(), &graph_output, "Graph").await?;

    Ok(ExitCode::SUCCESS)
}

async fn emit(output: Option<&PathBuf>, content: &str, what: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        tokio::fs::write(path, content).await?;
        tracing::info!(path = %path.display(), "{what} written");
    } else {
        println!("{content}");
    }
    Ok(())
}

async fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(config_path) = explicit {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        return Ok(Config::load(config_path).await?);
    }

    let default_paths = ["cloudcap.yaml", "cloudcap.yml", ".cloudcap.yaml"];
    tracing::debug!("Searching for default configuration files");
    for path in default_paths.iter().map(Path::new) {
        if path.exists() {
            tracing::debug!(path = %path.display(), "Found configuration file");
            return Ok(Config::load(path).await?);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}
