//! StratGate CLI — evaluate reports, run Monte Carlo batteries, manage state.
//!
//! Commands:
//! - `evaluate` — judge a PerformanceReport JSON and advance the hypothesis
//! - `optimize` — judge a parameter sweep and advance past optimization
//! - `validate` — judge an in-sample/out-of-sample pair after walk-forward
//! - `montecarlo` — run the resampling batteries over a report
//! - `state show` / `state list` — inspect persisted hypothesis state
//! - `export` — write the audit trail as CSV

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stratgate_core::{
    decide_backtest, decide_optimization, decide_validation, detect_systematic_failure,
    load_or_create, plateau_width_ratio, run_block_randomization, run_cpcv,
    run_permutation_test, run_trade_bootstrap, AuditLog, AuditRecord, BacktestMetrics,
    BootstrapConfig, BudgetConfig, CancelFlag, CpcvConfig, Decision, IterationStateMachine,
    JsonFileStore, MetricsBundle, OptimizationMetrics, PerformanceReport, PermutationConfig,
    RegimeConfig, StateStore, SweepPoint, TerminalStatus, ThresholdConfig, ValidationMetrics,
};

#[derive(Parser)]
#[command(
    name = "stratgate",
    about = "StratGate CLI — strategy-validation decision engine"
)]
struct Cli {
    /// Thresholds TOML. Defaults apply when absent.
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,

    /// State directory. Defaults to ./state.
    #[arg(long, global = true, default_value = "state")]
    state_dir: PathBuf,

    /// Audit log path. Defaults to ./state/decisions.jsonl.
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a backtest report and advance the hypothesis state machine.
    Evaluate {
        /// Hypothesis identifier.
        #[arg(long)]
        hypothesis: String,

        /// One-line hypothesis description (used when creating fresh state).
        #[arg(long, default_value = "")]
        description: String,

        /// Path to the PerformanceReport JSON.
        report: PathBuf,
    },
    /// Judge a parameter sweep and advance past the optimization phase.
    Optimize {
        /// Hypothesis identifier.
        #[arg(long)]
        hypothesis: String,

        /// Parameter axis the plateau is measured along.
        #[arg(long)]
        plateau_param: String,

        /// Objective band around the peak that still counts as the plateau.
        #[arg(long, default_value_t = 0.90)]
        plateau_tolerance: f64,

        /// JSON array of sweep points: `[{ "params": {...}, "sharpe": ... }]`.
        sweep: PathBuf,
    },
    /// Judge an in-sample/out-of-sample pair after walk-forward validation.
    Validate {
        /// Hypothesis identifier.
        #[arg(long)]
        hypothesis: String,

        /// In-sample PerformanceReport JSON.
        in_sample: PathBuf,

        /// Out-of-sample PerformanceReport JSON.
        out_of_sample: PathBuf,
    },
    /// Run the resampling batteries over a report and print distributions.
    Montecarlo {
        /// Path to the PerformanceReport JSON.
        report: PathBuf,

        /// Resamples per battery.
        #[arg(long, default_value_t = 1000)]
        runs: usize,

        /// Deterministic seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Inspect persisted hypothesis state.
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Write the audit trail as CSV.
    Export {
        /// Output CSV path.
        #[arg(long, default_value = "decisions.csv")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Print one hypothesis state as JSON.
    Show {
        /// Hypothesis identifier.
        hypothesis: String,
    },
    /// List persisted hypothesis ids.
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let thresholds = match &cli.thresholds {
        Some(path) => ThresholdConfig::load(path)
            .with_context(|| format!("loading thresholds from {}", path.display()))?,
        None => ThresholdConfig::default(),
    };
    let store = JsonFileStore::new(cli.state_dir.clone())?;
    let audit = AuditLog::new(
        cli.audit_log
            .clone()
            .unwrap_or_else(|| cli.state_dir.join("decisions.jsonl")),
    );

    match cli.command {
        Commands::Evaluate {
            hypothesis,
            description,
            report,
        } => run_evaluate(&store, &audit, &thresholds, &hypothesis, &description, &report),
        Commands::Optimize {
            hypothesis,
            plateau_param,
            plateau_tolerance,
            sweep,
        } => run_optimize(
            &store,
            &audit,
            &thresholds,
            &hypothesis,
            &plateau_param,
            plateau_tolerance,
            &sweep,
        ),
        Commands::Validate {
            hypothesis,
            in_sample,
            out_of_sample,
        } => run_validate(&store, &audit, &thresholds, &hypothesis, &in_sample, &out_of_sample),
        Commands::Montecarlo { report, runs, seed } => run_montecarlo(&report, runs, seed),
        Commands::State { action } => match action {
            StateAction::Show { hypothesis } => {
                let state = store.load(&hypothesis)?;
                println!("{}", serde_json::to_string_pretty(&state)?);
                Ok(())
            }
            StateAction::List => {
                for id in store.list()? {
                    println!("{id}");
                }
                Ok(())
            }
        },
        Commands::Export { output } => {
            let records = audit.read_all()?;
            stratgate_core::write_decision_csv(&records, &output)?;
            println!("wrote {} decisions to {}", records.len(), output.display());
            Ok(())
        }
    }
}

fn load_report(path: &PathBuf) -> Result<PerformanceReport> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading report {}", path.display()))?;
    let report: PerformanceReport = serde_json::from_str(&text)?;
    report
        .validate()
        .with_context(|| format!("report {} failed consistency checks", path.display()))?;
    Ok(report)
}

fn print_decision(decision: &Decision) {
    println!("verdict: {:?}", decision.verdict);
    println!("reason:  {}", decision.reason);
}

fn run_evaluate(
    store: &JsonFileStore,
    audit: &AuditLog,
    thresholds: &ThresholdConfig,
    hypothesis: &str,
    description: &str,
    report_path: &PathBuf,
) -> Result<()> {
    let report = load_report(report_path)?;
    let mut state = load_or_create(store, hypothesis, description)?;

    let machine = IterationStateMachine::new(BudgetConfig::default());
    // Fresh state starts in research; the backtest already ran, so walk the
    // linear phases forward.
    while state.phase != stratgate_core::Phase::Backtest && !state.is_terminal() {
        machine.progress(&mut state)?;
    }
    if state.is_terminal() {
        bail!(
            "hypothesis {hypothesis} is terminal: {}",
            state.terminal_reason.as_deref().unwrap_or("unknown")
        );
    }

    let metrics = BacktestMetrics::from(&report);
    let decision = decide_backtest(&metrics, thresholds, &state.counters);
    print_decision(&decision);

    audit.append(&AuditRecord::new(hypothesis, decision.clone(), thresholds)?)?;
    let next = machine.advance(&mut state, &decision)?;
    store.save(&state)?;
    println!("phase:   {next:?}");
    if state.terminal_status == Some(TerminalStatus::Abandoned) {
        warn_on_systemic_failure(store);
    }
    Ok(())
}

fn run_optimize(
    store: &JsonFileStore,
    audit: &AuditLog,
    thresholds: &ThresholdConfig,
    hypothesis: &str,
    plateau_param: &str,
    plateau_tolerance: f64,
    sweep_path: &PathBuf,
) -> Result<()> {
    let mut state = store.load(hypothesis)?;
    if state.phase != stratgate_core::Phase::Optimization {
        bail!(
            "hypothesis {hypothesis} is in phase {:?}, not optimization",
            state.phase
        );
    }

    // The un-optimized baseline is whatever the backtest stage recorded.
    let baseline_sharpe = state
        .decisions
        .iter()
        .rev()
        .find_map(|d| match &d.metrics {
            MetricsBundle::Backtest(m) => Some(m.sharpe),
            _ => None,
        })
        .context("no backtest decision on record to supply the baseline Sharpe")?;

    let text = fs::read_to_string(sweep_path)
        .with_context(|| format!("reading sweep {}", sweep_path.display()))?;
    let sweep: Vec<SweepPoint> = serde_json::from_str(&text)?;
    let best = sweep
        .iter()
        .max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
        .context("sweep file contains no points")?
        .clone();

    let axis: Vec<(f64, f64)> = sweep
        .iter()
        .map(|p| {
            p.params
                .get(plateau_param)
                .copied()
                .map(|v| (v, p.sharpe))
                .with_context(|| format!("sweep point missing parameter {plateau_param}"))
        })
        .collect::<Result<_>>()?;
    let plateau = plateau_width_ratio(&axis, plateau_tolerance)?;

    let metrics = OptimizationMetrics {
        baseline_sharpe,
        best,
        sweep,
        plateau_width_ratio: plateau,
    };
    let decision = decide_optimization(&metrics, thresholds, &state.counters);
    print_decision(&decision);

    audit.append(&AuditRecord::new(hypothesis, decision.clone(), thresholds)?)?;
    let machine = IterationStateMachine::new(BudgetConfig::default());
    let next = machine.advance(&mut state, &decision)?;
    store.save(&state)?;
    println!("phase:   {next:?}");
    Ok(())
}

fn run_validate(
    store: &JsonFileStore,
    audit: &AuditLog,
    thresholds: &ThresholdConfig,
    hypothesis: &str,
    in_sample: &PathBuf,
    out_of_sample: &PathBuf,
) -> Result<()> {
    let is_report = load_report(in_sample)?;
    let oos_report = load_report(out_of_sample)?;
    let mut state = store.load(hypothesis)?;
    if state.phase != stratgate_core::Phase::Validation {
        bail!(
            "hypothesis {hypothesis} is in phase {:?}, not validation",
            state.phase
        );
    }

    let metrics = ValidationMetrics {
        in_sample_sharpe: is_report.summary.sharpe_ratio,
        oos_sharpe: oos_report.summary.sharpe_ratio,
        oos_drawdown: oos_report.summary.max_drawdown,
        oos_trades: oos_report.summary.total_trades,
    };
    let decision = decide_validation(&metrics, thresholds, &state.counters);
    print_decision(&decision);

    audit.append(&AuditRecord::new(hypothesis, decision.clone(), thresholds)?)?;
    let machine = IterationStateMachine::new(BudgetConfig::default());
    let next = machine.advance(&mut state, &decision)?;
    store.save(&state)?;
    println!("phase:   {next:?}");
    if state.terminal_status == Some(TerminalStatus::Abandoned) {
        warn_on_systemic_failure(store);
    }
    Ok(())
}

/// After an abandonment, look across every persisted hypothesis for a
/// repeated root cause. Three strikes on the same cause means the problem is
/// upstream of any single strategy idea.
fn warn_on_systemic_failure(store: &JsonFileStore) {
    let Ok(ids) = store.list() else { return };
    let mut history = Vec::new();
    for id in ids {
        if let Ok(state) = store.load(&id) {
            history.push(state);
        }
    }
    if let Some(diagnosis) = detect_systematic_failure(&history, 10, 3) {
        eprintln!("warning: {}", diagnosis.summary);
    }
}

fn run_montecarlo(report_path: &PathBuf, runs: usize, seed: u64) -> Result<()> {
    let report = load_report(report_path)?;
    let pnls = report.pnl_sequence();
    let cancel = CancelFlag::new();

    let bootstrap = run_trade_bootstrap(
        &pnls,
        &BootstrapConfig {
            n_runs: runs,
            seed,
            ..Default::default()
        },
        &cancel,
    )?;
    println!(
        "bootstrap sharpe:        mean {:.2}, p10 {:.2}, p90 {:.2}",
        bootstrap.sharpe.mean, bootstrap.sharpe.p10, bootstrap.sharpe.p90
    );
    println!(
        "drawdown inflation:      {:.2}x (p99 {:.1}% vs observed {:.1}%)",
        bootstrap.drawdown_inflation,
        bootstrap.drawdown_p99 * 100.0,
        bootstrap.observed_drawdown * 100.0
    );

    let permutation = run_permutation_test(
        &pnls,
        &PermutationConfig {
            n_perms: runs,
            seed,
            ..Default::default()
        },
        &cancel,
    )?;
    println!(
        "permutation p-value:     {:.4} (observed Sharpe {:.2})",
        permutation.p_value, permutation.observed_sharpe
    );

    let regime = run_block_randomization(
        &pnls,
        &RegimeConfig {
            n_runs: runs,
            seed,
            ..Default::default()
        },
        &cancel,
    )?;
    println!("regime consistency (CV): {:.3}", regime.sharpe_cv);

    // CPCV needs timestamped trades, which the report carries. Short
    // histories legitimately cannot form enough splits; say so and move on.
    let cpcv_config = CpcvConfig {
        seed,
        ..Default::default()
    };
    match run_cpcv(&report.trades, &cpcv_config, &cancel) {
        Ok(cpcv) => println!(
            "cpcv p10 test sharpe:    {:.2} across {} splits",
            cpcv.p10_test_sharpe,
            cpcv.splits.len()
        ),
        Err(e) => eprintln!("cpcv skipped: {e}"),
    }
    Ok(())
}
