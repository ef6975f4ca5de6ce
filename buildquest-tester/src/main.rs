mod common;
mod logic;

use anyhow::{Context, Result};
use buildquest_game::{DetectorRegistry, SolvabilityScope};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use common::{Scenario, split_csv};
use logic::{SimulationReport, Simulator, resolve_seeds};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Solvability {
    /// Keep quests as long as the step being worked on can be solved
    CurrentStep,
    /// Reject quests as soon as any remaining step becomes unsolvable
    RemainingSteps,
}

impl From<Solvability> for SolvabilityScope {
    fn from(value: Solvability) -> Self {
        match value {
            Solvability::CurrentStep => Self::CurrentStep,
            Solvability::RemainingSteps => Self::RemainingSteps,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "buildquest-tester", version)]
#[command(about = "Replays scripted CI builds through the BuildQuest progression engine")]
struct Args {
    /// Scenario file (JSON); the bundled demo scenario runs when omitted
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Seeds to run (comma-separated, decimal or 0x-prefixed hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "console"])]
    report: String,

    /// Override how far ahead quests are checked for solvability
    #[arg(long, value_enum)]
    solvability: Option<Solvability>,

    /// List all registered achievement detectors and exit
    #[arg(long)]
    list_detectors: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_detectors(&args)? {
        return Ok(());
    }

    if wants_banner(&args) {
        announce_banner();
    }

    let start_time = Instant::now();
    let scenario = load_scenario(&args)?;
    let seeds = resolve_seeds(&split_csv(&args.seeds))?;
    let simulator = Simulator::new(scenario.config.clone(), args.verbose);
    let reports = simulator.run_all(&scenario, &seeds)?;

    write_reports(&args, &reports, start_time)?;

    if reports.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_detectors(args: &Args) -> Result<bool> {
    if !args.list_detectors {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available detectors:")?;
    for (name, kind) in DetectorRegistry::with_builtin().names() {
        writeln!(output_target.writer(), "  {name:55} - {kind:?}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

// JSON written to stdout must stay parseable.
fn wants_banner(args: &Args) -> bool {
    args.report != "json" || args.output.is_some()
}

fn announce_banner() {
    println!("{}", "🎯 BuildQuest Simulation Harness".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn load_scenario(args: &Args) -> Result<Scenario> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::load_default()?,
    };
    if let Some(solvability) = args.solvability {
        scenario.config.solvability = solvability.into();
    }
    log::info!(
        "loaded scenario '{}' with {} participants and {} builds",
        scenario.name,
        scenario.participants.len(),
        scenario.builds.len()
    );
    if args.verbose && !scenario.description.is_empty() {
        println!("📜 {}", scenario.description.italic());
    }
    Ok(scenario)
}

fn write_reports(args: &Args, reports: &[SimulationReport], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    if args.report.as_str() == "json" {
        logic::reports::generate_json_report(&mut output_target, reports)?;
    } else {
        let duration = start_time.elapsed();
        if reports.is_empty() {
            writeln!(&mut output_target, "No simulations executed.")?;
        } else {
            logic::reports::generate_console_report(&mut output_target, reports, duration)?;
        }
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_args() -> Args {
        Args {
            scenario: None,
            seeds: "1337".to_string(),
            report: "json".to_string(),
            solvability: None,
            list_detectors: false,
            verbose: false,
            output: None,
        }
    }

    fn temp_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn maybe_list_detectors_writes_output() {
        let dir = temp_dir();
        let temp = dir.path().join("detectors.txt");
        let args = Args {
            list_detectors: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_detectors(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available detectors"));
        assert!(content.contains("buildquest::detectors::solve_x_challenges"));
    }

    #[test]
    fn maybe_list_detectors_returns_false_when_disabled() {
        assert!(!maybe_list_detectors(&base_args()).unwrap());
    }

    #[test]
    fn banner_is_suppressed_for_json_on_stdout() {
        assert!(!wants_banner(&base_args()));
        let dir = temp_dir();
        let to_file = Args {
            output: Some(dir.path().join("unused.json")),
            ..base_args()
        };
        assert!(wants_banner(&to_file));
        let console = Args {
            report: "console".to_string(),
            ..base_args()
        };
        assert!(wants_banner(&console));
    }

    #[test]
    fn solvability_flag_overrides_the_scenario() {
        let args = Args {
            solvability: Some(Solvability::RemainingSteps),
            ..base_args()
        };
        let scenario = load_scenario(&args).unwrap();
        assert_eq!(scenario.config.solvability, SolvabilityScope::RemainingSteps);
    }

    #[test]
    fn missing_scenario_file_is_an_error() {
        let dir = temp_dir();
        let args = Args {
            scenario: Some(dir.path().join("does-not-exist.json")),
            ..base_args()
        };
        let err = load_scenario(&args).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read scenario"));
    }

    #[test]
    fn write_reports_emits_json_for_runs() {
        let dir = temp_dir();
        let temp = dir.path().join("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        let scenario = load_scenario(&args).unwrap();
        let reports = Simulator::new(scenario.config.clone(), false)
            .run_all(&scenario, &[1])
            .unwrap();
        write_reports(&args, &reports, Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn write_reports_console_without_runs() {
        let dir = temp_dir();
        let temp = dir.path().join("empty.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No simulations executed"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
