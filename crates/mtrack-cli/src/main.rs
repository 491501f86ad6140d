#![forbid(unsafe_code)]

mod output;
mod validate;

use clap::{Parser, ValueEnum};
use mtrack_core::clock::Zone;
use mtrack_core::config::{self, CliOverrides};
use mtrack_core::error::ErrorCode;
use mtrack_core::pipeline;
use mtrack_core::route::Grouping;
use mtrack_core::timing;
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const AFTER_HELP: &str = "\
Output goes to by_id/ for 'id', by_date/ for 'date' and by_all/ for 'all',
under --output-dir (default: the current directory).

The input CSV needs the header columns ID, ONDate, ONTime, OFFDate, OFFTime,
endX and endY. Each output file has the header id,date,time,endX,endY. 'id' and
'date' resolve each machine on its own; 'all' resolves the whole file as one
sequence, one row per hour.

EXAMPLES:
    # One file per machine
    mtrack id log.csv

    # One file per hour, timestamps read and written in UTC
    mtrack date log.csv --timezone utc

    # Everything in one file, machine-readable summary
    mtrack all log.csv --output-dir out --json";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mtrack: hour-bucketed position timelines from machine ON/OFF logs",
    long_about = None,
    after_help = AFTER_HELP
)]
struct Cli {
    /// How resolved rows are split into files.
    #[arg(value_enum)]
    mode: Mode,

    /// Interval log to resolve.
    #[arg(value_name = "INPUT.csv", value_parser = validate::csv_path)]
    input: PathBuf,

    /// Root directory for by_id/, by_date/ and by_all/.
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Clock the date/time columns are read and written in.
    #[arg(long, value_enum)]
    timezone: Option<ZoneArg>,

    /// Resolve overlapping intervals as given instead of failing.
    #[arg(long)]
    allow_overlap: bool,

    /// Output format for the run summary.
    #[arg(long, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, hide = true)]
    json: bool,

    /// Emit stage timing report to stderr.
    #[arg(long)]
    timing: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the run summary.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One file per machine id.
    Id,
    /// One file per hour bucket.
    Date,
    /// One combined file.
    All,
}

impl From<Mode> for Grouping {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Id => Self::Id,
            Mode::Date => Self::Date,
            Mode::All => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ZoneArg {
    Local,
    Utc,
}

impl From<ZoneArg> for Zone {
    fn from(zone: ZoneArg) -> Self {
        match zone {
            ZoneArg::Local => Self::Local,
            ZoneArg::Utc => Self::Utc,
        }
    }
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_dir: self.output_dir.clone(),
            timezone: self.timezone.map(Zone::from),
            allow_overlap: self.allow_overlap,
        }
    }
}

fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if verbose || env::var("DEBUG").is_ok() {
        "mtrack=debug,info"
    } else if quiet {
        "error"
    } else {
        "mtrack=info,warn"
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("MTRACK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    let format = env::var("MTRACK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn print_timing_report(mode: OutputMode) {
    let report = timing::collect_report();
    if report.is_empty() {
        eprintln!("timing report: no samples recorded");
    } else if mode.is_json() {
        eprintln!("{}", report.to_json());
    } else {
        eprintln!("timing report:");
        eprintln!("{}", report.display_table());
    }
}

fn fail(mode: OutputMode, code: ErrorCode, message: String) -> ExitCode {
    debug!(code = %code, "{message}");
    if output::render_error(mode, &CliError::new(code, message)).is_err() {
        eprintln!("error[{code}]: could not render error");
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear_timings();

    let output = cli.output_mode();

    let project_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            return fail(
                output,
                ErrorCode::InternalUnexpected,
                format!("cannot determine working directory: {err}"),
            );
        }
    };

    let config = match config::resolve_config(&project_root, &cli.overrides()) {
        Ok(config) => config,
        Err(err) => return fail(output, ErrorCode::ConfigParseError, format!("{err:#}")),
    };
    debug!(?config, "resolved configuration");

    let result = pipeline::run(&cli.input, cli.mode.into(), &config);

    if timing_enabled {
        print_timing_report(output);
    }

    match result {
        Ok(summary) => {
            if cli.quiet && !output.is_json() {
                return ExitCode::SUCCESS;
            }
            match output::render_summary(output, &summary) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => fail(output, ErrorCode::InternalUnexpected, err.to_string()),
            }
        }
        Err(err) => fail(output, err.code(), err.to_string()),
    }
}
