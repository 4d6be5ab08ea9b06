use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use casebook_graph::{DiscoveryValidator, PathSolver, SolverConfig};
use casebook_pipeline::{
    load_case, question_facts, FixtureGenerationService, JsonFileStore, Orchestrator,
    PipelineConfig,
};
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("casebook")
        .version(casebook_pipeline::VERSION)
        .about("Daily mystery case generation")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("generate")
                .about("Run the pipeline for one date")
                .arg(
                    Arg::new("date")
                        .long("date")
                        .required(true)
                        .value_parser(value_parser!(NaiveDate))
                        .help("Target date (YYYY-MM-DD)"),
                )
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of per-stage JSON payloads"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory cases are written to"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Pipeline configuration (TOML)"),
                ),
        )
        .subcommand(
            Command::new("solve")
                .about("Recompute the optimal path of a stored case")
                .arg(
                    Arg::new("case")
                        .long("case")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Stored case file"),
                )
                .arg(
                    Arg::new("max-states")
                        .long("max-states")
                        .value_parser(value_parser!(usize))
                        .help("Search state budget"),
                )
                .arg(
                    Arg::new("serial")
                        .long("serial")
                        .action(ArgAction::SetTrue)
                        .help("Expand search layers on one thread"),
                ),
        )
        .subcommand(
            Command::new("check-graph")
                .about("Validate the discovery graph of a stored case")
                .arg(
                    Arg::new("case")
                        .long("case")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Stored case file"),
                ),
        )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn required<'a, T>(args: &'a ArgMatches, id: &str) -> anyhow::Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(id).with_context(|| format!("missing --{id}"))
}

async fn generate(args: &ArgMatches) -> anyhow::Result<bool> {
    let date = *required::<NaiveDate>(args, "date")?;
    let fixtures = required::<PathBuf>(args, "fixtures")?;
    let out = required::<PathBuf>(args, "out")?;
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::new(),
    };

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(FixtureGenerationService::new(fixtures)),
        Arc::new(JsonFileStore::new(out)),
    );

    match orchestrator.run(date).await {
        Ok(success) => {
            println!("{}", success.receipt.location);
            Ok(true)
        }
        Err(failure) => {
            eprintln!("{}: {}", failure.reason, failure.stage);
            for error in &failure.errors {
                eprintln!("  - {error}");
            }
            Ok(false)
        }
    }
}

async fn solve(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = required::<PathBuf>(args, "case")?;
    let case = load_case(path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let mut config = SolverConfig::default();
    if let Some(max) = args.get_one::<usize>("max-states") {
        config.max_states = *max;
    }
    config.parallel = !args.get_flag("serial");

    let graph = case.graph();
    match PathSolver::new(config).solve(&graph, &question_facts(&case.questions)) {
        Ok(solution) => {
            for id in &solution.path {
                println!("{id}");
            }
            if solution.path != case.optimal_path.entries {
                eprintln!("stored path differs from recomputed path");
                return Ok(false);
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(false)
        }
    }
}

async fn check_graph(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = required::<PathBuf>(args, "case")?;
    let case = load_case(path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let result = DiscoveryValidator::validate(&case.graph());
    if result.valid {
        println!("discovery graph is sound");
    }
    for error in &result.errors {
        println!("{error}");
    }
    Ok(result.valid)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    let ok = match matches.subcommand() {
        Some(("generate", args)) => generate(args).await?,
        Some(("solve", args)) => solve(args).await?,
        Some(("check-graph", args)) => check_graph(args).await?,
        _ => anyhow::bail!("unknown subcommand"),
    };

    std::process::exit(if ok { 0 } else { 1 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn generate_parses_date() {
        let matches = cli()
            .try_get_matches_from([
                "casebook", "generate", "--date", "2024-03-01", "--fixtures", "f", "--out", "o",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(
            args.get_one::<NaiveDate>("date"),
            NaiveDate::from_ymd_opt(2024, 3, 1).as_ref()
        );
    }

    #[test]
    fn bad_date_is_rejected() {
        let result = cli().try_get_matches_from([
            "casebook", "generate", "--date", "March", "--fixtures", "f", "--out", "o",
        ]);
        assert!(result.is_err());
    }
}
