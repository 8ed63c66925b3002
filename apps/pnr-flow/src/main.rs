use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pnr_flow::run_flow;
use pnr_io::ProjectConfig;

/// Place and route a gate-level netlist as described by a project file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Project file (JSON).
    project: PathBuf,

    /// Raise log verbosity; repeat for more (RUST_LOG overrides).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Worker threads for placement and routing; 0 uses every core.
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut project = match ProjectConfig::load(&args.project) {
        Ok(project) => project,
        Err(e) => {
            log::error!("{}: {e}", args.project.display());
            return ExitCode::from(2);
        }
    };
    if let Some(threads) = args.threads {
        project.placer.threads = threads;
        project.router.threads = threads;
    }

    match run_flow(&project) {
        Ok(outcome) => {
            let summary = outcome.summary();
            println!(
                "{}: placed {}/{} instances, routed {}/{} nets, HPWL {}, wirelength {}, {} vias, {} violations",
                summary.design,
                summary.placed,
                summary.instances,
                summary.routed,
                summary.nets,
                summary.hpwl,
                summary.wirelength,
                summary.vias,
                summary.violations.len()
            );
            for failure in summary.placement_failures.iter().chain(&summary.route_failures) {
                println!("  failed: {failure}");
            }
            for v in &summary.violations {
                println!("  {:?} {:?}: {}", v.severity, v.kind, v.message);
            }
            if outcome.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(2)
        }
    }
}
