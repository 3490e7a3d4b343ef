use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use perlinject_core::config::{SessionConfig, DEFAULT_CODE};
use perlinject_core::escalation::KillSender;
use perlinject_core::session::InjectionSession;
use perlinject_core::signals::SignalCatalog;
use perlinject_core::SessionReport;
use perlinject_ui::TerminalPrompter;
use perlinject_utils::{debug, init_logging, init_logging_with_level, LogFormat, LogLevel};

/// How long to wait for stray blocking tasks (a prompt mid-attempt) at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Run a snippet of Perl inside a live Perl process and print what it reports.
#[derive(Parser, Debug)]
#[command(name = "perlinject")]
#[command(version)]
#[command(
    about = "Run a snippet of Perl inside a live Perl process and print what it reports",
    long_about = "Attaches gdb to a running perl, evaluates the given code at the next safe point, and prints \
                  whatever the code writes to $fh. The default code prints the target's current Perl call stack."
)]
struct Cli
{
    /// Process ID of the target perl
    #[arg(short, long)]
    pid: u32,

    /// Perl code to evaluate in the target; print to $fh to report back
    #[arg(short, long, default_value = DEFAULT_CODE)]
    code: String,

    /// How long to wait for output (e.g. 500ms, 5s, 2m, or plain seconds)
    #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
    timeout: Duration,

    /// Skip validation of the code (allows double quotes and empty code)
    #[arg(short, long, default_value_t = false)]
    force: bool,

    /// On timeout, offer to send the target a signal to wake it up
    #[arg(short, long, default_value_t = false)]
    signals: bool,

    /// Log debugger and channel traffic to stderr
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main()
{
    let cli = Cli::parse();

    // --verbose wins; otherwise RUST_LOG decides and defaults to warnings only
    let logging = if cli.verbose {
        init_logging_with_level(LogLevel::Debug, LogFormat::from_env())
    } else {
        init_logging()
    };
    let log_guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let report = rt.block_on(run(cli));
    // A prompt may still be inside its attempt window; don't wait for it.
    rt.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    let code = report_and_exit_code(report);
    drop(log_guard);
    process::exit(code);
}

async fn run(cli: Cli) -> SessionReport
{
    let mut builder = SessionConfig::builder(cli.pid)
        .code(cli.code)
        .timeout(cli.timeout)
        .force(cli.force);
    if cli.signals {
        builder = builder.signal_catalog(SignalCatalog::host());
    }
    let config = builder.build();
    debug!("running with {config:?}");

    let mut session = InjectionSession::new(config);
    session
        .run(Box::new(TerminalPrompter::default()), Arc::new(KillSender))
        .await
}

/// Print the captured output (partial output too) and any error; return the exit code.
fn report_and_exit_code(report: SessionReport) -> i32
{
    let partial = report.partial.clone();
    let code = match report.into_result() {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(e) => {
            print!("{}", partial);
            eprintln!("Error: {}", e);
            1
        }
    };
    let _ = io::stdout().flush();
    code
}

/// Parse `500ms`, `5s`, `2m`, `1h`, or a bare number of seconds.
fn parse_duration(s: &str) -> Result<Duration, String>
{
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(n) = s.strip_suffix("ms") {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid milliseconds: {n}"))?;
        return Ok(Duration::from_millis(val));
    }
    if let Some(n) = s.strip_suffix('s') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid seconds: {n}"))?;
        return Ok(Duration::from_secs(val));
    }
    if let Some(n) = s.strip_suffix('m') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid minutes: {n}"))?;
        return Ok(Duration::from_secs(val * 60));
    }
    if let Some(n) = s.strip_suffix('h') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid hours: {n}"))?;
        return Ok(Duration::from_secs(val * 3600));
    }
    if let Ok(val) = s.parse::<u64>() {
        return Ok(Duration::from_secs(val));
    }

    Err(format!("unrecognized duration format: '{s}'. Expected NNms, NNs, NNm, NNh, or NN."))
}
