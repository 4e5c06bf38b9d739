//! Shift Planner - Command Line Interface
//!
//! Plans a month of work shifts so the balance ends on target without
//! dipping under the minimum.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use shift_planner::batch::{BatchConfig, BatchRunner};
use shift_planner::config::ProblemInput;
use shift_planner::control::ProgressEvent;
use shift_planner::error::Result;
use shift_planner::optimizer::EvolutionEngine;
use shift_planner::reconcile::{ScheduleEdit, ScheduleReconciler};
use shift_planner::session::{write_ledger_csv, Session};
use shift_planner::visualization::BalanceChart;
use shift_planner::ShiftCatalog;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shift-planner")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Genetic planner for a month of work shifts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize the schedule of a problem file
    Optimize {
        /// Problem JSON (config, expenses, deposits, optional shifts)
        #[arg(short, long)]
        input: PathBuf,

        /// Override the random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the population size
        #[arg(short, long)]
        population: Option<usize>,

        /// Override the number of generations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Save the session (input + result) as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the ledger as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Render the balance chart next to the input file
        #[arg(long)]
        visualize: bool,

        /// Print the problem summary and the full ledger
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the same problem under several seeds
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        /// Number of seeds
        #[arg(short, long, default_value = "8")]
        runs: usize,

        /// First seed; the others follow consecutively
        #[arg(long, default_value = "1")]
        first_seed: u64,

        /// Output directory for the CSV and the report
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Run seeds one after the other
        #[arg(long)]
        sequential: bool,
    },

    /// Apply ledger edits to a saved session
    ApplyEdits {
        /// Session JSON written by `optimize --output`
        #[arg(short, long)]
        session: PathBuf,

        /// JSON array of edits: [{"day": 3, "field": {"earnings": 154.0}}]
        #[arg(short, long)]
        edits: PathBuf,

        /// Where to write the edited session (defaults to overwriting it)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the next problem, with the edits learned as manual constraints
        #[arg(long)]
        learn: Option<PathBuf>,
    },

    /// Check a saved session's ledger
    Validate {
        #[arg(short, long)]
        session: PathBuf,
    },

    /// List the shift combinations and their pay
    Catalog {
        /// Problem JSON with a custom catalog; the standard catalog otherwise
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Optimize { input, seed, population, generations, output, csv, visualize, verbose } => {
            optimize(&input, seed, population, generations, output, csv, visualize, verbose)
        }

        Commands::Batch { input, runs, first_seed, output, sequential } => {
            run_batch(&input, runs, first_seed, &output, sequential)
        }

        Commands::ApplyEdits { session, edits, output, learn } => {
            apply_edits(&session, &edits, output, learn)
        }

        Commands::Validate { session } => validate(&session),

        Commands::Catalog { input } => show_catalog(input),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_input(path: &Path) -> Result<ProblemInput> {
    println!("Loading problem from {:?}...", path);
    ProblemInput::from_file(path)
}

#[allow(clippy::too_many_arguments)]
fn optimize(
    path: &Path,
    seed: Option<u64>,
    population: Option<usize>,
    generations: Option<usize>,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    visualize: bool,
    verbose: bool,
) -> Result<()> {
    let mut input = load_input(path)?;
    if let Some(seed) = seed {
        input.config.params.seed = seed;
    }
    if let Some(population) = population {
        input.config.population_size = population;
    }
    if let Some(generations) = generations {
        input.config.generations = generations;
    }

    if verbose {
        println!("{}", input.statistics());
    }

    let mut engine = EvolutionEngine::new(&input)?;
    println!(
        "Mode: {} (required earnings {:.2} over {} available days)",
        engine.resolved().mode,
        engine.resolved().required_earnings,
        engine.resolved().available_days
    );

    let bar = ProgressBar::new(input.config.generations as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} gen  {msg}") {
        bar.set_style(style);
    }
    let mut observer = |event: &ProgressEvent| {
        bar.set_position(event.generation as u64);
        bar.set_message(format!(
            "best {:.2}  balance {:.2}  work days {}  violations {}",
            event.best_fitness, event.balance, event.work_days, event.violations
        ));
    };
    let result = engine.run(&mut observer)?;
    bar.finish_and_clear();

    println!("\n========== Results ==========");
    print!("{}", result);

    if verbose {
        println!("\n{:>4} {:<16} {:>9} {:>9} {:>9} {:>10} {:>10}", "Day", "Shifts", "Earnings", "Expenses", "Deposit", "Start", "End");
        for row in &result.schedule {
            let shifts = if row.shifts.is_empty() { "-".to_string() } else { row.shifts.join("+") };
            println!(
                "{:>4} {:<16} {:>9.2} {:>9.2} {:>9.2} {:>10.2} {:>10.2}{}",
                row.day,
                shifts,
                row.earnings,
                row.expenses,
                row.deposit,
                row.start_balance,
                row.end_balance,
                if row.anchored { " *" } else { "" }
            );
        }
    }

    if let Some(csv_path) = csv {
        write_ledger_csv(&result.schedule, &csv_path)?;
        println!("\nLedger saved to {:?}", csv_path);
    }

    if visualize {
        let chart = BalanceChart::new();
        let svg = chart.generate_svg(&result, &input.config);
        let png_path = path.with_extension("png");
        match chart.save_png(&svg, &png_path) {
            Ok(()) => println!("Chart saved to {:?}", png_path),
            Err(e) => {
                let svg_path = path.with_extension("svg");
                chart.save_svg(&svg, &svg_path)?;
                println!("PNG conversion failed ({}). Saved SVG to {:?}", e, svg_path);
            }
        }
    }

    if let Some(out_path) = output {
        let mut session = Session::new(input, Some(result));
        session.save(&out_path)?;
        println!("Session saved to {:?}", out_path);
    }

    Ok(())
}

fn run_batch(path: &Path, runs: usize, first_seed: u64, output: &Path, sequential: bool) -> Result<()> {
    let input = load_input(path)?;
    std::fs::create_dir_all(output)?;

    let mut config = BatchConfig::consecutive(first_seed, runs);
    config.parallel = !sequential;

    let mut runner = BatchRunner::new(input, config);
    runner.run()?;

    let csv_path = output.join("batch_results.csv");
    runner.export_to_csv(&csv_path)?;

    let report = runner.generate_report();
    let report_path = output.join("batch_report.txt");
    std::fs::write(&report_path, &report)?;

    println!("{}", report);
    println!("Results saved to {:?} and {:?}", csv_path, report_path);
    Ok(())
}

fn apply_edits(session_path: &Path, edits_path: &Path, output: Option<PathBuf>, learn: Option<PathBuf>) -> Result<()> {
    let mut session = Session::load(session_path)?;
    let text = std::fs::read_to_string(edits_path)?;
    let edits: Vec<ScheduleEdit> = serde_json::from_str(&text)?;

    session.apply_edits(&edits)?;
    println!("Applied {} edits", edits.len());

    if let Some(result) = &session.result {
        let report = ScheduleReconciler::validate_schedule(&result.schedule, &session.input.config);
        print!("{}", report);
    }

    let out_path = output.unwrap_or_else(|| session_path.to_path_buf());
    session.save(&out_path)?;
    println!("Session saved to {:?}", out_path);

    if let Some(learn_path) = learn {
        let next = session.next_input()?;
        std::fs::write(&learn_path, serde_json::to_string_pretty(&next)?)?;
        println!(
            "Next problem saved to {:?} ({} manual constraints)",
            learn_path,
            next.config.manual_constraints.len()
        );
    }

    Ok(())
}

fn validate(session_path: &Path) -> Result<()> {
    let session = Session::load(session_path)?;
    let Some(result) = &session.result else {
        println!("Session has no schedule to validate");
        return Ok(());
    };

    let report = ScheduleReconciler::validate_schedule(&result.schedule, &session.input.config);
    print!("{}", report);
    if !report.is_valid() {
        std::process::exit(2);
    }
    Ok(())
}

fn show_catalog(input: Option<PathBuf>) -> Result<()> {
    let catalog = match input {
        Some(path) => load_input(&path)?.catalog()?,
        None => ShiftCatalog::standard(),
    };
    print!("{}", catalog);
    Ok(())
}
