use std::time::Duration;

use clap::Parser as ClapParser;
use miette::miette;
use tracing::{error, info};
use wxcheck::{evaluate_parallel, run_suite, ModelConfig, Scenario};

/// Checks MMU translation and W^X permission invariants with an SMT solver
///
/// Runs the built-in scenario table for direct and nested paging and prints one verdict per
/// scenario. Scenarios can be picked by key; `--list` shows the keys.
#[derive(ClapParser)]
#[command(version, about)]
struct Args {
    /// Scenario keys to run (all when omitted)
    scenarios: Vec<String>,
    /// Run in 'check' mode. Exits with 0 only if every verdict is the expected one.
    #[arg(long = "check")]
    check: bool,
    /// Print the witness of every satisfiable scenario
    #[arg(long = "witness")]
    witness: bool,
    /// Evaluate scenarios concurrently, each with its own solver context
    #[arg(long = "parallel")]
    parallel: bool,
    /// List the scenario keys and exit
    #[arg(long = "list")]
    list: bool,
    /// Address width in bits
    #[arg(long = "bits", default_value_t = wxcheck::DEFAULT_ADDRESS_BITS)]
    bits: u32,
    /// Page size in bytes
    #[arg(long = "page-size", default_value_t = wxcheck::DEFAULT_PAGE_SIZE)]
    page_size: u64,
    /// Per-query solver timeout in milliseconds; an expired query reports `unknown`
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
    /// Print debugging output (can be repeated for more detail)
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    debug_level: u8,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true)
        .with_target(false)
        .with_max_level(match args.debug_level {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        })
        .init();

    let suite = Scenario::default_suite();
    if args.list {
        for scenario in &suite {
            println!("{:<40} {scenario}", scenario.key());
        }
        return Ok(());
    }

    if let Some(unknown) = args
        .scenarios
        .iter()
        .find(|key| !suite.iter().any(|s| &s.key() == *key))
    {
        return Err(miette!("unknown scenario `{unknown}`; see --list"));
    }
    let selected: Vec<Scenario> = suite
        .into_iter()
        .filter(|s| args.scenarios.is_empty() || args.scenarios.contains(&s.key()))
        .collect();

    let mut config = ModelConfig::default()
        .with_address_bits(args.bits)
        .with_page_size(args.page_size);
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let report = if args.parallel {
        evaluate_parallel(&config, &selected)?
    } else {
        run_suite(&config, &selected)?
    };

    let verdicts = report.verdict_table();
    let expected = report.expected_table();
    for entry in report.entries {
        match entry.outcome {
            Ok(evaluation) => {
                println!("{} => {}", entry.scenario, evaluation.verdict);
                if let (true, Some(witness)) = (args.witness, evaluation.verdict.witness()) {
                    for (name, value) in witness.iter() {
                        println!("    {name} = {value}");
                    }
                }
            }
            Err(err) => {
                println!("{} => error", entry.scenario);
                eprintln!("{:?}", miette::Report::new(err));
            }
        }
    }

    if args.check {
        if verdicts == expected {
            info!("All verdicts as expected");
        } else {
            error!("Verdicts differ from the expected table");
            let diff = similar::udiff::unified_diff(
                similar::Algorithm::Patience,
                &expected,
                &verdicts,
                3,
                Some(("expected", "actual")),
            );
            println!("{diff}");
            return Err(miette!("unexpected verdicts"));
        }
    }
    Ok(())
}
