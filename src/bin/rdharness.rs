//! rdharness command-line tool.

use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rdharness::cli::{
    CliError, CommonArgs, ExitCode, OutputFormat, errors, parse_log_level, parse_output_format,
};
use rdharness::config::{ConfigLoader, HarnessConfig};
use rdharness::lab::{EngineConfig, EngineFaults, SimulatedEngine};
use rdharness::{DeviceId, Harness, HarnessError, RunReport, StatusWord, Transport, UdpTransport};

#[derive(Parser, Debug)]
#[command(
    name = "rdharness",
    version,
    about = "Out-of-order verification harness for recursive-doubling offload engines"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgsCli,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgsCli {
    /// Output format: human, json, json-pretty
    #[arg(short = 'f', long = "format", value_parser = parse_output_format, global = true)]
    format: Option<OutputFormat>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbosity: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// YAML configuration file
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Write the final status word to this file
    #[arg(long = "status-file", global = true)]
    status_file: Option<PathBuf>,
}

impl CommonArgsCli {
    fn to_common_args(&self) -> CommonArgs {
        CommonArgs {
            format: self.format.unwrap_or_default(),
            verbosity: self.verbosity,
            quiet: self.quiet,
            config: self.config.clone(),
            status_file: self.status_file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a device reachable over UDP
    Run(RunArgs),
    /// Verify the in-process simulated engine
    Simulate(SimulateArgs),
}

/// Overrides shared by both subcommands.
#[derive(Args, Debug)]
struct RunOverrides {
    /// Number of test sets
    #[arg(long = "sets")]
    sets: Option<u32>,

    /// Scheduling seed (decimal or 0x hex); derived from the clock if unset
    #[arg(long = "seed", value_parser = parse_u64)]
    seed: Option<u64>,

    /// Offset between stimulus level and reported response level
    #[arg(long = "level-offset")]
    level_offset: Option<u8>,

    /// Hex-dump every frame at trace level
    #[arg(long = "dump-packets", action = ArgAction::SetTrue)]
    dump_packets: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Device address
    #[arg(long = "target")]
    target: SocketAddr,

    /// Local address to bind
    #[arg(long = "bind", default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Per-receive timeout in milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Device identifier to report (12 hex digits)
    #[arg(long = "device-id", value_parser = parse_device_id)]
    device_id: Option<DeviceId>,

    #[command(flatten)]
    overrides: RunOverrides,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Seed for the engine's response reordering
    #[arg(long = "engine-seed", value_parser = parse_u64)]
    engine_seed: Option<u64>,

    /// Inject one fault into the engine
    #[arg(long = "fault", value_enum)]
    fault: Option<FaultKind>,

    /// Level the fault applies to
    #[arg(long = "fault-level", default_value_t = 1)]
    fault_level: u8,

    /// Test set the fault applies to
    #[arg(long = "fault-set", default_value_t = 0)]
    fault_set: u64,

    /// Engine reports stimulus level + this offset
    #[arg(long = "engine-level-offset", default_value_t = 0)]
    engine_level_offset: u8,

    #[command(flatten)]
    overrides: RunOverrides,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    /// Repeat one response
    Duplicate,
    /// Flip one payload byte
    Corrupt,
    /// Shorten one response
    Truncate,
    /// Withhold one response
    Drop,
    /// Send an empty frame
    Empty,
    /// Accumulate from the top level down
    MisorderAccumulate,
}

impl FaultKind {
    fn faults(self, level: u8, set: u64) -> EngineFaults {
        let faults = EngineFaults::none().in_round(set);
        match self {
            Self::Duplicate => faults.with_duplicate(level),
            // First payload byte.
            Self::Corrupt => faults.with_corruption(level, 8, 0x01),
            Self::Truncate => faults.with_truncation(level, 4),
            Self::Drop => faults.with_drop(level),
            Self::Empty => faults.with_empty(level),
            Self::MisorderAccumulate => faults.with_reverse_accumulation(),
        }
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|err| format!("invalid number '{s}': {err}"))
}

fn parse_device_id(s: &str) -> Result<DeviceId, String> {
    DeviceId::parse(s).ok_or_else(|| format!("invalid device id '{s}': expected up to 12 hex digits"))
}

/// Why a command did not produce a report.
enum Failure {
    /// Rejected before the run started.
    Cli(CliError),
    /// The run aborted.
    Run {
        /// Fault that ended the run.
        error: HarnessError,
        /// Seed to replay the run with, once one was chosen.
        seed: Option<u64>,
    },
}

impl From<HarnessError> for Failure {
    fn from(error: HarnessError) -> Self {
        Self::Run { error, seed: None }
    }
}

impl From<CliError> for Failure {
    fn from(err: CliError) -> Self {
        Self::Cli(err)
    }
}

fn main() {
    let cli = Cli::parse();
    let common = cli.common.to_common_args();
    init_logging(&common);

    let outcome = match cli.command {
        Command::Run(args) => run_device(args, &common),
        Command::Simulate(args) => run_simulation(args, &common),
    };
    std::process::exit(finish(&outcome, &common));
}

fn init_logging(common: &CommonArgs) {
    let fallback = std::env::var("RDHARNESS_LOG")
        .ok()
        .and_then(|value| parse_log_level(&value));
    let _ = tracing_subscriber::fmt()
        .with_max_level(common.log_level(fallback))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn load_config(common: &CommonArgs, overrides: &RunOverrides) -> Result<HarnessConfig, CliError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &common.config {
        loader = loader.file(path);
    }
    if let Some(sets) = overrides.sets {
        loader = loader.override_value("RDHARNESS_RUN_TEST_SETS", sets.to_string());
    }
    if let Some(seed) = overrides.seed {
        loader = loader.override_value("RDHARNESS_RUN_SEED", seed.to_string());
    }
    if let Some(offset) = overrides.level_offset {
        loader = loader.override_value("RDHARNESS_RUN_RESPONSE_LEVEL_OFFSET", offset.to_string());
    }
    if overrides.dump_packets {
        loader = loader.override_value("RDHARNESS_RUN_DUMP_PACKETS", "true");
    }
    loader
        .load()
        .map_err(|err| CliError::from(&HarnessError::from(err)))
}

fn execute<T: Transport>(config: HarnessConfig, transport: T) -> Result<RunReport, Failure> {
    let mut harness = Harness::new(config, transport)?;
    let seed = harness.seed();
    harness.run().map_err(|error| Failure::Run {
        error,
        seed: Some(seed),
    })
}

fn run_device(args: RunArgs, common: &CommonArgs) -> Result<RunReport, Failure> {
    let mut config = load_config(common, &args.overrides)?;
    if let Some(ms) = args.timeout_ms {
        config.run.receive_timeout_ms = Some(ms);
    }
    let device_id = args.device_id.unwrap_or_default();
    let transport = UdpTransport::connect(args.bind, args.target, device_id)
        .map_err(|err| errors::connect_failed(&args.target.to_string(), &err.to_string()))?;
    execute(config, transport)
}

fn run_simulation(args: SimulateArgs, common: &CommonArgs) -> Result<RunReport, Failure> {
    let config = load_config(common, &args.overrides)?;
    if args.fault.is_some() && args.fault_level > config.packet.max_level {
        return Err(errors::invalid_argument(
            "--fault-level",
            &format!(
                "level {} exceeds max_level {}",
                args.fault_level, config.packet.max_level
            ),
        )
        .into());
    }

    let mut engine = EngineConfig::default().with_level_offset(args.engine_level_offset);
    if let Some(seed) = args.engine_seed {
        engine.seed = seed;
    }
    if let Some(kind) = args.fault {
        tracing::info!(fault = ?kind, level = args.fault_level, set = args.fault_set, "injecting engine fault");
        engine = engine.with_faults(kind.faults(args.fault_level, args.fault_set));
    }
    execute(config, SimulatedEngine::new(engine))
}

/// Prints the outcome, writes the status file and returns the exit code.
fn finish(outcome: &Result<RunReport, Failure>, common: &CommonArgs) -> i32 {
    let (status, mut exit_code) = match outcome {
        Ok(report) => {
            print_report(report, common.format);
            (StatusWord::SUCCESS, ExitCode::SUCCESS)
        }
        Err(Failure::Run { error, seed }) => {
            let mut cli_error = CliError::from(error);
            if let Some(seed) = seed {
                cli_error = cli_error.context("seed", seed);
            }
            print_error(&cli_error, common.format);
            (
                StatusWord::failure(error.failure_code()),
                ExitCode::for_error(error),
            )
        }
        Err(Failure::Cli(err)) => {
            print_error(err, common.format);
            (StatusWord::failure(0), err.exit_code)
        }
    };

    if let Some(path) = &common.status_file {
        if let Err(err) = status.write_to(path) {
            print_error(
                &errors::write_failed(&path.display().to_string(), &err.to_string()),
                common.format,
            );
            if exit_code == ExitCode::SUCCESS {
                exit_code = ExitCode::USER_ERROR;
            }
        }
    }
    tracing::debug!(status = %status, exit_code, "exiting");
    exit_code
}

fn print_report(report: &RunReport, format: OutputFormat) {
    let mut out = io::stdout().lock();
    let _ = match format {
        OutputFormat::Human => {
            let _ = writeln!(
                out,
                "PASS: {} test set(s), {} responses verified (seed {}, device {}, {} ms)",
                report.sets_completed,
                report.responses_verified,
                report.seed,
                report.device_id,
                report.elapsed_ms,
            );
            report.sets.iter().try_for_each(|set| {
                writeln!(
                    out,
                    "  set {}: sent {:?}, received {:?}",
                    set.index, set.send_order, set.arrival_order
                )
            })
        }
        OutputFormat::Json => writeln!(out, "{}", report.to_json()),
        OutputFormat::JsonPretty => writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        ),
    };
}

fn print_error(err: &CliError, format: OutputFormat) {
    let text = match format {
        OutputFormat::Human => err.human_format(),
        OutputFormat::Json => err.json_format(),
        OutputFormat::JsonPretty => err.json_pretty_format(),
    };
    let _ = writeln!(io::stderr().lock(), "{}", text.trim_end());
}
