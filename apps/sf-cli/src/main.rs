use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sf_app::{
    AppError, AppResult, CommandValue, ControllerEntry, CycleRecord, CycleStatus,
    SimulationOptions, load_entry, run_scenario,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(about = "solarflow CLI - solar surplus distribution controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check tuning, consumer list and entity references of an entry
    Validate {
        /// Path to the entry YAML file
        entry_path: PathBuf,
    },
    /// Run the entry's surplus scenario against simulated devices
    Run {
        /// Path to the entry YAML file
        entry_path: PathBuf,
        /// Number of cycles (defaults to the scenario length)
        #[arg(long)]
        cycles: Option<usize>,
        /// Seconds between cycles (defaults to the update interval)
        #[arg(long)]
        dt: Option<f64>,
        /// Print full cycle records as YAML
        #[arg(long)]
        yaml: bool,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { entry_path } => cmd_validate(&entry_path),
        Commands::Run {
            entry_path,
            cycles,
            dt,
            yaml,
        } => cmd_run(&entry_path, cycles, dt, yaml),
    }
}

fn cmd_validate(entry_path: &Path) -> AppResult<()> {
    println!("Validating entry: {}", entry_path.display());
    let config = load_entry(entry_path)?;
    tracing::info!(
        entry = %config.entry_id,
        consumers = config.consumers.len(),
        "validating entry"
    );

    match config.options.pid_config().validate() {
        Ok(()) => println!("✓ PID configuration is consistent"),
        Err(err) => println!("⚠ PID configuration: {err}"),
    }

    let report = sf_consumers::validate::validate_consumers(&config.consumers);
    if !report.is_valid() {
        for message in report.messages() {
            println!("✗ {message}");
        }
        return Err(AppError::InvalidConsumers(report.messages()));
    }
    println!("✓ {} consumers are valid", config.consumers.len());

    let states = config.states.clone();
    let entry = ControllerEntry::new(config)?;
    let warnings = entry.check_entities(&states);
    if warnings.is_valid() {
        println!("✓ All referenced entities are present");
    } else {
        for message in warnings.messages() {
            println!("⚠ {message}");
        }
    }
    Ok(())
}

fn cmd_run(entry_path: &Path, cycles: Option<usize>, dt: Option<f64>, yaml: bool) -> AppResult<()> {
    let config = load_entry(entry_path)?;
    let cycles = cycles.unwrap_or_else(|| config.scenario.surplus_w.len().max(1));
    let dt_s = dt.unwrap_or(config.options.update_interval_s);
    println!(
        "Running entry {} for {} cycles (dt = {} s)",
        config.entry_id, cycles, dt_s
    );

    tracing::info!(entry = %config.entry_id, cycles, dt_s, "starting simulation");
    let records = run_scenario(config, SimulationOptions { cycles, dt_s })?;
    let held = records
        .iter()
        .filter(|r| r.report.status != CycleStatus::Stepped)
        .count();
    tracing::debug!(records = records.len(), held, "simulation finished");

    if yaml {
        let text = serde_yaml::to_string(&records)
            .map_err(|e| AppError::InvalidInput(format!("Failed to serialize records: {e}")))?;
        print!("{text}");
        return Ok(());
    }

    println!(
        "{:>5} {:>8} {:>9} {:>9} {:>8}  commands",
        "cycle", "time_s", "surplus", "consumed", "output"
    );
    for record in &records {
        print_record(record);
    }
    println!("✓ Simulation completed");
    Ok(())
}

fn print_record(record: &CycleRecord) {
    let surplus = record
        .surplus_w
        .map_or_else(|| "-".to_string(), |w| format!("{w:.0}"));
    let report = &record.report;
    let commands = match report.status {
        CycleStatus::Stepped => report
            .commands
            .iter()
            .map(|c| match c.value {
                CommandValue::Power(w) => format!("{}={w:.0}W", c.consumer_id),
                CommandValue::Switch(on) => {
                    format!("{}={}", c.consumer_id, if on { "on" } else { "off" })
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        CycleStatus::Held => "(held)".to_string(),
        CycleStatus::Disabled => "(disabled)".to_string(),
    };
    println!(
        "{:>5} {:>8.1} {:>9} {:>9.0} {:>8.2}  {}",
        record.cycle, record.time_s, surplus, record.consumed_w, report.output, commands
    );
}
