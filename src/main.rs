//! rulesplice - IP allow rules for NAS firewall exports
//!
//! Adds one allow rule per address in a plain-text list to a firewall rule
//! export, ahead of the device's default rules, and writes a file that can be
//! imported back.
//!
//! # Usage
//!
//! ```bash
//! # Interactive prompts (double-clicked or run without arguments)
//! rulesplice
//!
//! # Scripted
//! rulesplice --csv QuFirewall_1.csv --ip ip_allow_list.txt
//! rulesplice --csv QuFirewall_1.csv --ip ip_allow_list.txt --in-place --keep-ids
//! rulesplice --csv QuFirewall_1.csv --ip ip_allow_list.txt --dry-run
//!
//! # Defaults and history
//! rulesplice --ip /srv/allow.txt --keep-ids --save-defaults
//! rulesplice --history
//! ```

use clap::{ArgAction, CommandFactory, Parser};
use rulesplice::config::{self, AppConfig};
use rulesplice::core::merge::{MergeOptions, MergeStats, Placement};
use rulesplice::core::output::{OutputTarget, WriteReport};
use rulesplice::core::splice::{self, SpliceJob};
use rulesplice::core::table::MalformedPolicy;
use rulesplice::validators::clean_path_input;
use rulesplice::{Error, Result, audit, utils};
use std::io::{BufRead, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::ExitCode;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "rulesplice", version, long_version = build::CLAP_LONG_VERSION)]
#[command(about = "Splice IP allow rules into a NAS firewall rule export", long_about = None)]
struct Cli {
    /// Exported rule CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// IP allow-list, one address or CIDR per line
    #[arg(long, value_name = "FILE")]
    ip: Option<PathBuf>,

    /// Output file (default: <stem>.updated.<ext> beside the export)
    #[arg(long, value_name = "FILE", conflicts_with = "in_place")]
    out: Option<PathBuf>,

    /// Overwrite the export instead of writing a new file
    #[arg(long)]
    in_place: bool,

    /// Make a .bak copy before an in-place update (default)
    #[arg(long, overrides_with = "no_backup")]
    backup: bool,

    /// Skip the .bak copy made before an in-place update
    #[arg(long, overrides_with = "backup")]
    no_backup: bool,

    /// Keep existing rule ids; new rules get ids after the highest one
    #[arg(long, overrides_with = "renumber_ids")]
    keep_ids: bool,

    /// Renumber all rules from 1 (default)
    #[arg(long, overrides_with = "keep_ids")]
    renumber_ids: bool,

    /// Where the allow block goes
    #[arg(long, value_name = "WHERE")]
    placement: Option<Placement>,

    /// Insert before the last N rules instead
    #[arg(long, value_name = "N", conflicts_with = "placement")]
    before_last: Option<usize>,

    /// Drop rows with the wrong number of fields instead of failing
    #[arg(long, overrides_with = "fail_malformed")]
    skip_malformed: bool,

    /// Stop at the first row with the wrong number of fields (default)
    #[arg(long, overrides_with = "skip_malformed")]
    fail_malformed: bool,

    /// Show what would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Record this run in the audit log (default)
    #[arg(long, overrides_with = "no_audit")]
    audit: bool,

    /// Do not record this run in the audit log
    #[arg(long, overrides_with = "audit")]
    no_audit: bool,

    /// Save --ip, --placement and the on/off flags above as defaults
    #[arg(long)]
    save_defaults: bool,

    /// Show the most recent audit log entries
    #[arg(long, value_name = "COUNT", num_args = 0..=1, default_missing_value = "10")]
    history: Option<usize>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Layers the flags given on the command line over saved defaults.
    fn apply_to(&self, config: AppConfig) -> AppConfig {
        AppConfig {
            ip_list: self.ip.clone().or(config.ip_list),
            placement: self.placement.unwrap_or(config.placement),
            keep_ids: flag_pair(self.keep_ids, self.renumber_ids).unwrap_or(config.keep_ids),
            backup: flag_pair(self.backup, self.no_backup).unwrap_or(config.backup),
            malformed: match flag_pair(self.skip_malformed, self.fail_malformed) {
                Some(true) => MalformedPolicy::Skip,
                Some(false) => MalformedPolicy::Fail,
                None => config.malformed,
            },
            audit_log: flag_pair(self.audit, self.no_audit).unwrap_or(config.audit_log),
        }
    }
}

/// Resolves a `--x`/`--no-x` pair; `None` when neither was given.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.apply_to(config::load_config());

    if cli.save_defaults {
        if let Err(e) = save_defaults(&config) {
            print_error(&e);
            return ExitCode::FAILURE;
        }
        if cli.csv.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    if let Some(count) = cli.history {
        return show_history(count);
    }

    match cli.csv.clone() {
        Some(csv) => {
            let ip_list = ip_list_path(&config);
            let target = if cli.in_place {
                OutputTarget::InPlace {
                    backup: config.backup,
                }
            } else {
                OutputTarget::NewFile(cli.out.clone())
            };
            let job = build_job(&cli, &config, csv, ip_list, target);
            match run_job(&job) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    print_error(&e);
                    ExitCode::FAILURE
                }
            }
        }
        None if stdin_is_terminal() => interactive(&cli, &config),
        None => {
            eprintln!("{}", Cli::command().render_usage());
            eprintln!("Pass --csv and --ip, or run from a terminal for interactive mode.");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn stdin_is_terminal() -> bool {
    nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false)
}

fn print_error(e: &Error) {
    eprintln!("Error: {e}");
    if let Some(hint) = e.hint() {
        eprintln!("Hint: {hint}");
    }
}

/// Allow-list from the flag, the saved defaults, or beside the executable.
fn ip_list_path(config: &AppConfig) -> PathBuf {
    config
        .ip_list
        .clone()
        .unwrap_or_else(utils::default_ip_list_path)
}

fn build_job(
    cli: &Cli,
    config: &AppConfig,
    csv: PathBuf,
    ip_list: PathBuf,
    output: OutputTarget,
) -> SpliceJob {
    SpliceJob {
        csv,
        ip_list,
        output,
        merge: MergeOptions {
            placement: config.placement,
            before_last: cli.before_last,
            keep_ids: config.keep_ids,
            reserved_max_id: 0,
        },
        malformed: config.malformed,
        dry_run: cli.dry_run,
        audit: config.audit_log,
    }
}

fn run_job(job: &SpliceJob) -> Result<()> {
    let report = splice::run(job)?;

    print_stats(&report.stats);
    match report.written {
        Some(written) => print_written(&written),
        None => {
            match report.preview {
                Some(diff) => print!("{diff}"),
                None => println!("No changes."),
            }
            println!("Dry run: would write {}", report.output.display());
        }
    }
    Ok(())
}

fn print_stats(stats: &MergeStats) {
    println!(
        "Added {} rules, moved {} existing ({} duplicates removed).",
        stats.added, stats.moved, stats.deduplicated
    );
    if stats.shadowed > 0 {
        println!(
            "Note: {} non-allow rules for listed addresses were left in place.",
            stats.shadowed
        );
    }
    if stats.skipped_rows > 0 {
        println!("Note: {} malformed rows were dropped.", stats.skipped_rows);
    }
    println!("Rules: {} -> {}", stats.total_before, stats.total_after);
}

fn print_written(report: &WriteReport) {
    if let Some(backup) = &report.backup {
        println!("Backup: {}", backup.display());
    }
    println!("Output: {}", report.path.display());
}

fn save_defaults(config: &AppConfig) -> Result<()> {
    match config::save_config(config)? {
        Some(path) => println!("Saved defaults to {}", path.display()),
        None => eprintln!("No configuration directory available; defaults not saved."),
    }
    Ok(())
}

fn show_history(count: usize) -> ExitCode {
    let log = match audit::AuditLog::new() {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: Failed to open audit log: {e}");
            return ExitCode::FAILURE;
        }
    };
    match log.read_recent(count) {
        Ok(events) if events.is_empty() => println!("No recorded runs."),
        Ok(events) => {
            for event in events {
                let status = if event.success { "ok" } else { "FAILED" };
                let output = event.details["output"].as_str().unwrap_or("?");
                let added = &event.details["stats"]["added"];
                println!(
                    "{}  {:<6}  +{}  {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    added,
                    output
                );
                if let Some(error) = event.error {
                    println!("    {error}");
                }
            }
        }
        Err(e) => {
            eprintln!("Error: Failed to read {}: {e}", log.path().display());
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

/// Prompt-driven mode for users who start the program without arguments.
fn interactive(cli: &Cli, config: &AppConfig) -> ExitCode {
    println!("rulesplice {}", build::PKG_VERSION);
    println!();

    let code = match interactive_session(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    };

    // Keep a double-clicked console window open
    println!();
    let _ = prompt("Press Enter to exit...");
    code
}

fn interactive_session(cli: &Cli, config: &AppConfig) -> Result<()> {
    let csv = loop {
        let path = PathBuf::from(clean_path_input(&prompt("Path to exported CSV: ")?));
        if path.is_file() {
            break path;
        }
        println!("File not found: {}", path.display());
    };

    let default_ip = ip_list_path(config);
    let answer = clean_path_input(&prompt(&format!(
        "Path to IP allow list [{}]: ",
        default_ip.display()
    ))?);
    let ip_list = if answer.is_empty() {
        default_ip
    } else {
        PathBuf::from(answer)
    };

    println!();
    println!("  1) Renumber rule ids, write a new file");
    println!("  2) Keep rule ids, write a new file");
    println!("  3) Renumber rule ids, update the export in place");
    println!("  4) Keep rule ids, update the export in place");
    let (keep_ids, in_place) = loop {
        match prompt("Choice [1]: ")?.trim() {
            "" | "1" => break (false, false),
            "2" => break (true, false),
            "3" => break (false, true),
            "4" => break (true, true),
            _ => println!("Enter a number from 1 to 4."),
        }
    };

    let target = if in_place {
        OutputTarget::InPlace {
            backup: config.backup,
        }
    } else {
        OutputTarget::NewFile(None)
    };
    // The menu choice replaces the flag and config defaults
    let mut job = build_job(cli, config, csv, ip_list, target);
    job.merge.keep_ids = keep_ids;

    let plan = splice::plan(&job)?;
    println!();
    print_stats(&plan.stats);
    let report = plan.commit()?;
    print_written(&report);
    Ok(())
}

/// Prints `message` and reads one line from stdin.
fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "input closed").into());
    }
    Ok(line)
}
