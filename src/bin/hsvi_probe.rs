use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Instant;

use hsvi_bounds::config::{HsviConfig, SolverConfig};
use hsvi_bounds::models::{DecPomdp, OccupancyMdp, TabularMdp, TabularPomdp};
use hsvi_bounds::traits::Horizon;
use hsvi_bounds::{BoundBuilder, Hsvi, Initializer, World};
use sysinfo::{get_current_pid, ProcessRefreshKind, System};

fn main() {
    let options = match Options::parse(env::args().skip(1)) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("hsvi_probe: {err}");
            Options::print_help();
            std::process::exit(2);
        }
    };

    let config = match &options.config {
        Some(path) => match SolverConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("hsvi_probe: cannot load {}: {err}", path.display());
                std::process::exit(2);
            }
        },
        None => SolverConfig::default(),
    };

    eprintln!("\n{}", "=".repeat(80));
    eprintln!("HSVI Probe: convergence and cost across worlds");
    eprintln!("{}", "=".repeat(80));
    eprintln!();
    eprintln!("Every scenario runs HSVI to the configured error (or trial budget) and");
    eprintln!("checks the returned value against an exact solution where one is cheap:");
    eprintln!("  • MDPs: backward induction or value iteration");
    eprintln!("  • POMDP / Dec-POMDP: exhaustive tree search up to horizon {}", options.verify_limit);
    eprintln!();
    eprintln!("Metrics explained:");
    eprintln!("  • wall_s: wall-clock time in seconds");
    eprintln!("  • rss_delta_kib: resident memory delta in KiB");
    eprintln!("  • trials: trials run before stopping");
    eprintln!("  • gap: upper minus lower bound at the root when the search stopped");
    eprintln!();
    eprintln!("{}", "=".repeat(80));
    eprintln!();

    let mut sys = System::new();
    let mut measurements = Vec::new();

    eprintln!("[1/4] Finite-horizon chain MDPs...");
    measurements.extend(run_chain(&config, false, &mut sys));
    eprintln!();

    eprintln!("[2/4] Discounted infinite-horizon chain MDPs...");
    measurements.extend(run_chain(&config, true, &mut sys));
    eprintln!();

    eprintln!("[3/4] Tiger POMDP (max-plan lower bound, sawtooth upper bound)...");
    measurements.extend(run_tiger(&options, &config, &mut sys));
    eprintln!();

    eprintln!("[4/4] Decentralized tiger (occupancy MDP, sawtooth program)...");
    measurements.extend(run_dec_tiger(&options, &config, &mut sys));
    eprintln!();

    print_summary(&measurements, &options);

    if let Err(err) = options.format.write(&measurements) {
        eprintln!("hsvi_probe output error: {err}");
        std::process::exit(1);
    }
}

struct Options {
    format: OutputFormat,
    verify_limit: usize,
    config: Option<PathBuf>,
}

impl Options {
    fn parse<I, T>(mut args: I) -> Result<Self, String>
    where
        I: Iterator<Item = T>,
        T: Into<String>,
    {
        let mut format = OutputFormat::Csv;
        let mut verify_limit = 2usize;
        let mut config = None;

        while let Some(arg) = args.next() {
            let arg = arg.into();
            if arg == "--help" || arg == "-h" {
                Options::print_help();
                std::process::exit(0);
            } else if let Some(value) = arg.strip_prefix("--format=") {
                format = OutputFormat::from_str(value)?;
            } else if arg == "--format" {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value after --format".to_string())?
                    .into();
                format = OutputFormat::from_str(&value)?;
            } else if let Some(value) = arg.strip_prefix("--verify-limit=") {
                verify_limit = parse_limit(value)?;
            } else if arg == "--verify-limit" {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value after --verify-limit".to_string())?
                    .into();
                verify_limit = parse_limit(&value)?;
            } else if let Some(value) = arg.strip_prefix("--config=") {
                config = Some(PathBuf::from(value));
            } else if arg == "--config" {
                let value: String = args
                    .next()
                    .ok_or_else(|| "missing value after --config".to_string())?
                    .into();
                config = Some(PathBuf::from(value));
            } else {
                return Err(format!("unrecognized argument '{arg}'"));
            }
        }

        Ok(Self {
            format,
            verify_limit,
            config,
        })
    }

    fn print_help() {
        println!(
            "\
Usage: cargo run --bin hsvi_probe [-- <options>]

Options:
  --format <csv|table|json>     Output format (default: csv)
  --verify-limit <H>            Largest horizon checked by exhaustive tree search (default: 2)
  --config <path>               JSON solver configuration (default: built-in defaults)
  -h, --help                    Print this help message

Examples:
  cargo run --release --bin hsvi_probe
  cargo run --release --bin hsvi_probe -- --format table --verify-limit 3
"
        );
    }
}

fn parse_limit(value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| "verify limit must be a non-negative integer".to_string())
}

#[derive(Copy, Clone)]
enum OutputFormat {
    Csv,
    Table,
    Json,
}

impl OutputFormat {
    fn from_str(value: &str) -> Result<Self, String> {
        match value {
            "csv" => Ok(Self::Csv),
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}'")),
        }
    }

    fn write(self, measurements: &[Measurement]) -> Result<(), String> {
        match self {
            OutputFormat::Csv => write_csv(measurements),
            OutputFormat::Table => write_table(measurements),
            OutputFormat::Json => write_json(measurements),
        }
    }
}

#[derive(Clone)]
struct Measurement {
    scenario: &'static str,
    size_desc: String,
    wall_s: f64,
    rss_delta_kib: u64,
    trials: usize,
    gap: f64,
    verification_status: VerificationStatus,
    verification_detail: Option<String>,
}

#[derive(Clone, Copy)]
enum VerificationStatus {
    NotChecked,
    Passed,
    Failed,
}

impl VerificationStatus {
    fn label(&self) -> &'static str {
        match self {
            VerificationStatus::NotChecked => "not_checked",
            VerificationStatus::Passed => "passed",
            VerificationStatus::Failed => "failed",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            VerificationStatus::Passed => "✓",
            VerificationStatus::Failed => "✗",
            VerificationStatus::NotChecked => "○",
        }
    }
}

/// What one HSVI run reports back to [`measure`].
struct Outcome {
    trials: usize,
    gap: f64,
    status: VerificationStatus,
    detail: Option<String>,
}

impl Outcome {
    fn failed(detail: String) -> Self {
        Self {
            trials: 0,
            gap: f64::NAN,
            status: VerificationStatus::Failed,
            detail: Some(detail),
        }
    }
}

fn run_hsvi<W: World>(mut hsvi: Hsvi<W>, expected: Option<f64>) -> Outcome {
    let result = hsvi.initialize().and_then(|_| hsvi.solve());
    let value = match result {
        Ok(value) => value,
        Err(err) => return Outcome::failed(err.to_string()),
    };
    let root = hsvi.world().initial_state();
    let upper = hsvi.upper().value_at(&root, 0);
    let gap = upper - value;
    let tolerance = hsvi.config().error + 1e-6;
    let (status, detail) = match expected {
        Some(exact) if value <= exact + 1e-6 && upper >= exact - 1e-6 && exact - value <= tolerance => {
            (VerificationStatus::Passed, None)
        }
        Some(exact) => (
            VerificationStatus::Failed,
            Some(format!("expected {exact:.6}, bounds [{value:.6}, {upper:.6}]")),
        ),
        None => (VerificationStatus::NotChecked, None),
    };
    Outcome {
        trials: hsvi.trial(),
        gap,
        status,
        detail,
    }
}

fn run_chain(config: &SolverConfig, infinite: bool, sys: &mut System) -> Vec<Measurement> {
    const LENGTHS: &[usize] = &[4, 8, 16, 32, 64];
    let scenario = if infinite { "chain_infinite" } else { "chain_finite" };
    let total = LENGTHS.len();
    LENGTHS
        .iter()
        .enumerate()
        .map(|(idx, &len)| {
            eprint!("      [{}/{}] Testing length {}... ", idx + 1, total, len);
            let (horizon, discount) = if infinite {
                (Horizon::Infinite, 0.9)
            } else {
                (Horizon::Finite(2 * len), 1.0)
            };
            let m = measure(scenario, format!("states={len}"), sys, || {
                let mdp = match TabularMdp::chain(len, horizon, discount) {
                    Ok(mdp) => mdp,
                    Err(err) => return Outcome::failed(err.to_string()),
                };
                let expected = mdp.optimal_values().ok().map(|values| values.value(0, 0));
                let lower = BoundBuilder::lower()
                    .with_config(&config.lower)
                    .with_initializer(Initializer::MinReward)
                    .build(&mdp);
                let upper = BoundBuilder::upper()
                    .with_config(&config.upper)
                    .with_initializer(Initializer::MaxReward)
                    .build(&mdp);
                match Hsvi::new(mdp, lower, upper, config.hsvi.clone()) {
                    Ok(hsvi) => run_hsvi(hsvi, expected),
                    Err(err) => Outcome::failed(err.to_string()),
                }
            });
            report(&m);
            m
        })
        .collect()
}

fn run_tiger(options: &Options, config: &SolverConfig, sys: &mut System) -> Vec<Measurement> {
    const HORIZONS: &[usize] = &[2, 3, 4, 5];
    let total = HORIZONS.len();
    HORIZONS
        .iter()
        .enumerate()
        .map(|(idx, &h)| {
            eprint!("      [{}/{}] Testing horizon {}... ", idx + 1, total, h);
            let m = measure("tiger", format!("horizon={h}"), sys, || {
                let tiger = match TabularPomdp::tiger(Horizon::Finite(h), 1.0) {
                    Ok(tiger) => tiger,
                    Err(err) => return Outcome::failed(err.to_string()),
                };
                let relaxation = match tiger.underlying_mdp().and_then(|mdp| mdp.optimal_values()) {
                    Ok(values) => values,
                    Err(err) => return Outcome::failed(err.to_string()),
                };
                let expected = if h <= options.verify_limit {
                    let root = tiger.initial_state();
                    exhaustive_value(&tiger, &root, 0, h).ok()
                } else {
                    None
                };
                let lower = BoundBuilder::lower()
                    .with_config(&config.lower)
                    .max_plan()
                    .with_initializer(Initializer::MinReward)
                    .build(&tiger);
                let upper = BoundBuilder::upper()
                    .with_config(&config.upper)
                    .point_set()
                    .with_initializer(Initializer::relaxation(relaxation))
                    .build(&tiger);
                match Hsvi::new(tiger, lower, upper, config.hsvi.clone()) {
                    Ok(hsvi) => run_hsvi(hsvi, expected),
                    Err(err) => Outcome::failed(err.to_string()),
                }
            });
            report(&m);
            m
        })
        .collect()
}

fn run_dec_tiger(options: &Options, config: &SolverConfig, sys: &mut System) -> Vec<Measurement> {
    const HORIZONS: &[usize] = &[2, 3];
    let total = HORIZONS.len();
    HORIZONS
        .iter()
        .enumerate()
        .map(|(idx, &h)| {
            eprint!("      [{}/{}] Testing horizon {}... ", idx + 1, total, h);
            let m = measure("dec_tiger", format!("horizon={h}"), sys, || {
                let world = match DecPomdp::dec_tiger(h).and_then(OccupancyMdp::new) {
                    Ok(world) => world,
                    Err(err) => return Outcome::failed(err.to_string()),
                };
                let expected = if h <= options.verify_limit {
                    let root = world.initial_state();
                    exhaustive_value(&world, &root, 0, h).ok()
                } else {
                    None
                };
                let lower = BoundBuilder::lower()
                    .with_config(&config.lower)
                    .with_initializer(Initializer::Blind)
                    .build(&world);
                let upper = BoundBuilder::upper()
                    .with_config(&config.upper)
                    .sawtooth(config.sawtooth.clone())
                    .with_initializer(world.relaxation())
                    .build(&world);
                let hsvi_config = HsviConfig {
                    name: format!("dec_tiger_h{h}"),
                    ..config.hsvi.clone()
                };
                match Hsvi::new(world, lower, upper, hsvi_config) {
                    Ok(hsvi) => run_hsvi(hsvi, expected),
                    Err(err) => Outcome::failed(err.to_string()),
                }
            });
            report(&m);
            m
        })
        .collect()
}

/// Optimal value by enumerating every action at every epoch.
fn exhaustive_value<W: World>(world: &W, state: &W::State, t: usize, horizon: usize) -> hsvi_bounds::Result<f64> {
    if t >= horizon {
        return Ok(0.0);
    }
    let mut best = f64::NEG_INFINITY;
    for action in world.actions(state, t)? {
        let mut expected = 0.0;
        for (next, probability) in world.transitions(state, &action, t)? {
            expected += probability * exhaustive_value(world, &next, t + 1, horizon)?;
        }
        best = best.max(world.reward(state, &action, t) + world.discount(t) * expected);
    }
    Ok(best)
}

fn report(m: &Measurement) {
    eprintln!(
        "{} trials={}, gap={:.4}, time={:.3}s, status={}",
        m.verification_status.icon(),
        m.trials,
        m.gap,
        m.wall_s,
        m.verification_status.label()
    );
}

fn print_summary(measurements: &[Measurement], options: &Options) {
    eprintln!("\n{}", "=".repeat(80));
    eprintln!("Probe Summary");
    eprintln!("{}", "=".repeat(80));
    eprintln!();

    let mut passed = 0;
    let mut failed = 0;
    let mut not_checked = 0;
    for m in measurements {
        match m.verification_status {
            VerificationStatus::Passed => passed += 1,
            VerificationStatus::Failed => failed += 1,
            VerificationStatus::NotChecked => not_checked += 1,
        }
    }

    let total = measurements.len().max(1);
    let percent = |count: usize| 100.0 * count as f64 / total as f64;
    eprintln!("Verification Results:");
    eprintln!("  Total runs: {}", measurements.len());
    eprintln!("  ✓ Passed: {} ({:.1}%)", passed, percent(passed));
    eprintln!("  ✗ Failed: {} ({:.1}%)", failed, percent(failed));
    eprintln!(
        "  ○ Not checked (horizon > {}): {} ({:.1}%)",
        options.verify_limit,
        not_checked,
        percent(not_checked)
    );
    eprintln!();

    if failed > 0 {
        eprintln!("Failed Runs:");
        for m in measurements {
            if matches!(m.verification_status, VerificationStatus::Failed) {
                eprintln!("  ✗ {} ({})", m.scenario, m.size_desc);
                if let Some(ref detail) = m.verification_detail {
                    eprintln!("     Error: {}", detail);
                }
            }
        }
        eprintln!();
    }

    eprintln!("Statistics by Scenario:");
    eprintln!();
    let mut by_scenario: BTreeMap<&str, Vec<&Measurement>> = BTreeMap::new();
    for m in measurements {
        by_scenario.entry(m.scenario).or_default().push(m);
    }
    for (scenario, ms) in &by_scenario {
        let min_time = ms.iter().map(|m| m.wall_s).fold(f64::INFINITY, f64::min);
        let max_time = ms.iter().map(|m| m.wall_s).fold(0.0, f64::max);
        let trials: usize = ms.iter().map(|m| m.trials).sum();
        let max_mem = ms.iter().map(|m| m.rss_delta_kib).max().unwrap_or(0);
        eprintln!("  {}:", scenario);
        eprintln!("    Runs: {}", ms.len());
        eprintln!("    Time: min={:.3}s, max={:.3}s", min_time, max_time);
        eprintln!("    Trials: total={}", trials);
        eprintln!("    Memory: max_delta={} KiB", max_mem);
        eprintln!();
    }

    eprintln!("{}", "=".repeat(80));
    if failed == 0 {
        eprintln!("✓ All verified runs matched their exact values.");
    } else {
        eprintln!("✗ {} run(s) failed. Please review the errors above.", failed);
    }
    eprintln!("{}", "=".repeat(80));
    eprintln!();
}

fn measure<F>(scenario: &'static str, size_desc: String, sys: &mut System, compute: F) -> Measurement
where
    F: FnOnce() -> Outcome,
{
    let before = rss_kib(sys);
    let start = Instant::now();
    let outcome = compute();
    let duration = start.elapsed();
    let after = rss_kib(sys);

    Measurement {
        scenario,
        size_desc,
        wall_s: duration.as_secs_f64(),
        rss_delta_kib: after.saturating_sub(before),
        trials: outcome.trials,
        gap: outcome.gap,
        verification_status: outcome.status,
        verification_detail: outcome.detail,
    }
}

fn write_csv(measurements: &[Measurement]) -> Result<(), String> {
    println!("scenario,size_desc,wall_s,rss_delta_kib,trials,gap,verification_status,verification_detail");
    for m in measurements {
        let detail = m
            .verification_detail
            .as_ref()
            .map(|s| s.replace('"', "'"))
            .unwrap_or_default();
        println!(
            "{},{},{:.3},{},{},{:.6},{},\"{}\"",
            m.scenario,
            m.size_desc,
            m.wall_s,
            m.rss_delta_kib,
            m.trials,
            m.gap,
            m.verification_status.label(),
            detail
        );
    }
    Ok(())
}

fn write_table(measurements: &[Measurement]) -> Result<(), String> {
    let mut col1 = "scenario".len();
    let mut col2 = "size".len();
    for m in measurements {
        col1 = col1.max(m.scenario.len());
        col2 = col2.max(m.size_desc.len());
    }

    println!(
        "{:<col1$}  {:<col2$}  {:>10}  {:>14}  {:>8}  {:>10}  {:>12}  {}",
        "scenario", "size", "wall_s", "rss_delta_kib", "trials", "gap", "status", "detail",
    );
    println!(
        "{:-<col1$}  {:-<col2$}  {:-<10}  {:-<14}  {:-<8}  {:-<10}  {:-<12}  {:-<12}",
        "", "", "", "", "", "", "", "",
    );
    for m in measurements {
        println!(
            "{:<col1$}  {:<col2$}  {:>10.3}  {:>14}  {:>8}  {:>10.4}  {:>12}  {}",
            m.scenario,
            m.size_desc,
            m.wall_s,
            m.rss_delta_kib,
            m.trials,
            m.gap,
            m.verification_status.label(),
            m.verification_detail.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn write_json(measurements: &[Measurement]) -> Result<(), String> {
    let rows: Vec<serde_json::Value> = measurements
        .iter()
        .map(|m| {
            let gap = if m.gap.is_finite() {
                serde_json::json!(m.gap)
            } else {
                serde_json::Value::Null
            };
            serde_json::json!({
                "scenario": m.scenario,
                "size": m.size_desc,
                "wall_s": m.wall_s,
                "rss_delta_kib": m.rss_delta_kib,
                "trials": m.trials,
                "gap": gap,
                "verification": {
                    "status": m.verification_status.label(),
                    "detail": m.verification_detail,
                },
            })
        })
        .collect();
    let text = serde_json::to_string_pretty(&rows).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn rss_kib(sys: &mut System) -> u64 {
    sys.refresh_processes_specifics(ProcessRefreshKind::new());
    if let Some(process) = get_current_pid().ok().and_then(|pid| sys.process(pid)) {
        process.memory() / 1024
    } else {
        0
    }
}
