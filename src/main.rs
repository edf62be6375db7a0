use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;

use detsched::config::Config;
use detsched::random::XorShift64;
use detsched::{demo, dlog, dlog_error, linearize, maximize_parallelism, Result, System};

const BASE_DELAY: Duration = Duration::from_millis(500);

/// detsched - deterministic scheduling of task systems over shared memory cells
#[derive(Parser, Debug)]
#[command(name = "detsched")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    DETSCHED_DEBUG=1     Enable debug logging (alternative to --debug)\n    DETSCHED_DEBUG=trace Also log every evaluated instruction"
)]
pub struct Cli {
    /// Seed for --randomize (default: seconds since the epoch)
    #[arg(short = 's', long)]
    pub seed: Option<u64>,

    /// Number of runs for --run, --sequential and --parallelize
    #[arg(long, value_parser = parse_loops)]
    pub loops: Option<usize>,

    /// Run the parallelized system several times and compare the histories
    #[arg(short = 't', long)]
    pub test: bool,

    /// Replace the constants of assignments with random values
    #[arg(short = 'r', long)]
    pub randomize: bool,

    /// Run the system as declared
    #[arg(long)]
    pub run: bool,

    /// Run the linearized system
    #[arg(long)]
    pub sequential: bool,

    /// Run the system with maximized parallelism
    #[arg(short = 'p', long)]
    pub parallelize: bool,

    /// Print the layers and the Graphviz rendering of the system
    #[arg(short = 'v', long)]
    pub view: bool,

    /// Enable debug logging (writes to ~/.detsched/detsched.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Print final snapshots as JSON
    #[arg(long)]
    pub json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    detsched::log::init_with_debug(cli.debug);

    let seed = cli.seed.unwrap_or_else(default_seed);
    dlog!("detsched starting, seed={}", seed);

    let outcome = execute(&cli, seed);
    if let Err(e) = &outcome {
        dlog_error!("{}", e);
        eprintln!("ERROR: {}", e);
    }
    println!("Seed: {}", seed);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn parse_loops(raw: &str) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("loops must be > 0".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn default_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn execute(cli: &Cli, seed: u64) -> Result<()> {
    let config = Config::load()?;
    let loops = cli.loops.unwrap_or_else(|| config.effective_loops());
    let delay = BASE_DELAY.mul_f64(config.effective_delay_scale());

    let mut system = demo::demo_system(delay)?;

    if cli.randomize {
        let mut rng = XorShift64::new(seed);
        for (task, instruction, value) in
            system.randomize_constants(&mut rng, config.effective_random_max())
        {
            println!("{}: changing {} with {}", task, instruction, value);
        }
    }

    if cli.view {
        print!("{}", render_view(&system));
    }

    if cli.test {
        let mut parallel = maximize_parallelism(&system)?;
        parallel.run(config.effective_test_runs())?;
        if parallel.are_histories_equal()? {
            println!(
                "{}: valid over {} runs",
                parallel.name(),
                parallel.run_count()
            );
        } else {
            println!("{}: invalid, runs disagree", parallel.name());
            println!("{}", serde_json::to_string_pretty(parallel.histories())?);
        }
    }

    let mut ran = derived_systems(cli, &system)?;
    if cli.view {
        for derived in &ran {
            print!("{}", render_view(derived));
        }
    }
    if cli.run {
        ran.push(system);
    }

    for system in ran.iter_mut() {
        system.run(loops)?;
        report(system, cli.json)?;
    }

    for (i, first) in ran.iter().enumerate() {
        for second in &ran[i + 1..] {
            let verdict = if first.is_equivalent(second)? {
                "equivalent"
            } else {
                "NOT equivalent"
            };
            println!("{} and {}: {}", first.name(), second.name(), verdict);
        }
    }

    Ok(())
}

/// The sequential and parallelized systems requested on the command line.
fn derived_systems(cli: &Cli, system: &System) -> Result<Vec<System>> {
    let mut derived = Vec::new();
    if cli.sequential {
        derived.push(linearize(system)?);
    }
    if cli.parallelize {
        derived.push(maximize_parallelism(system)?);
    }
    Ok(derived)
}

fn render_view(system: &System) -> String {
    let mut out = format!("{}\n", system.name());
    for (depth, layer) in system.get_layers().iter().enumerate() {
        let names: Vec<String> = layer.iter().map(|t| t.name().to_string()).collect();
        out.push_str(&format!("  layer {}: {}\n", depth, names.join(", ")));
    }
    out.push_str(&system.to_dot());
    out.push('\n');
    out
}

fn report(system: &System, json: bool) -> Result<()> {
    println!("{}", system.name());
    for (run, elapsed) in system.elapsed().iter().enumerate() {
        println!("  run {}: {:.3}s", run + 1, elapsed.as_secs_f64());
    }
    let Some(snapshot) = system.histories().last() else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    for (cell, record) in snapshot {
        match record.value {
            Some(value) => println!("  {} = {} {:?}", cell, value, record.history),
            None => println!("  {} unset", cell),
        }
    }
    Ok(())
}
