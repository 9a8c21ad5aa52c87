use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hr_snapshot::summary::{self, WorkforceSummary};
use hr_snapshot::{hr, PipelineOutcome, SnapshotConfig, SnapshotPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Reconcile,
    Summary,
    Tui,
}

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    command: Command,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut rest = args.iter().skip(1).peekable();

    let command = match rest.peek().map(|s| s.as_str()) {
        Some("reconcile") => Command::Reconcile,
        Some("summary") => Command::Summary,
        Some("tui") => Command::Tui,
        Some(flag) if flag.starts_with("--") => Command::Tui,
        None => Command::Tui,
        Some(other) => bail!("Unknown command `{}` (expected reconcile, summary or tui)", other),
    };
    if matches!(rest.peek().map(|s| s.as_str()), Some("reconcile" | "summary" | "tui")) {
        rest.next();
    }

    let mut parsed = CliArgs {
        command,
        config: None,
        out: None,
        as_of: None,
        json: false,
    };

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" => {
                let value = rest.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--out" => {
                let value = rest.next().context("--out needs a path")?;
                parsed.out = Some(PathBuf::from(value));
            }
            "--as-of" => {
                let value = rest.next().context("--as-of needs a date")?;
                let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .with_context(|| format!("Invalid --as-of date `{}` (expected YYYY-MM-DD)", value))?;
                parsed.as_of = Some(date);
            }
            "--json" => parsed.json = true,
            other => bail!("Unknown argument `{}`", other),
        }
    }

    Ok(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args)?;

    init_logging();

    let mut config = SnapshotConfig::load(cli.config.as_deref())?;
    if let Some(date) = cli.as_of {
        config.as_of = Some(date);
    }
    if let Some(out) = &cli.out {
        config.output = out.clone();
    }

    match cli.command {
        Command::Reconcile => run_reconcile(config, cli.json)?,
        Command::Summary => run_summary(config, cli.json)?,
        Command::Tui => run_ui_mode(config)?,
    }

    Ok(())
}

/// The only place the wall clock is read
fn run_pipeline(config: SnapshotConfig) -> Result<PipelineOutcome> {
    let as_of = config.as_of_or(Utc::now());
    let mut pipeline = SnapshotPipeline::hr(config);
    pipeline.run(&as_of)
}

fn run_reconcile(config: SnapshotConfig, json: bool) -> Result<()> {
    let output = config.output.clone();
    let marker = config.unknown_marker.clone();
    let outcome = run_pipeline(config)?;
    let report = &outcome.report;

    hr_snapshot::save_csv_table(&report.snapshot, &output, &marker)?;

    if json {
        let dump = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", dump);
        return Ok(());
    }

    println!("🧾 Employee Snapshot");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (table, path) in &outcome.sources {
        println!("📂 {:<10} {}", table, path.display());
    }
    println!();
    for attribute in &report.attributes {
        println!("   {}", attribute.summary());
    }
    println!();
    for diagnostic in report.diagnostics.iter() {
        println!("   {}", diagnostic);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", report.summary());
    println!("✓ Wrote {} ({})", output.display(), &report.fingerprint[..12.min(report.fingerprint.len())]);

    Ok(())
}

fn print_counts(title: &str, groups: &[summary::GroupCount]) {
    if groups.is_empty() {
        return;
    }
    println!("\n{}", title);
    for group in groups {
        println!("   {:<24} {:>6}", group.group, group.count);
    }
}

fn print_means(title: &str, groups: &[summary::GroupMean]) {
    if groups.is_empty() {
        return;
    }
    println!("\n{}", title);
    for group in groups {
        println!("   {:<24} {:>12.2}  ({})", group.group, group.mean, group.count);
    }
}

fn run_summary(config: SnapshotConfig, json: bool) -> Result<()> {
    let marker = config.unknown_marker.clone();
    let outcome = run_pipeline(config)?;
    let stats = WorkforceSummary::build(
        &outcome.report.snapshot,
        outcome.inputs.get(hr::SALARY),
        &marker,
    );

    if json {
        let dump = serde_json::to_string_pretty(&stats).context("Failed to serialize summary")?;
        println!("{}", dump);
        return Ok(());
    }

    println!("📊 {}", outcome.report.summary());

    // Demographics
    print_counts("Headcount by department", &stats.headcount_by_department);
    print_counts("Gender", &stats.gender);
    print_counts("Age groups", &stats.age_groups);
    print_counts("Top job titles", &stats.top_titles);
    print_counts("Employees by location", &stats.location);
    print_counts("Employment type", &stats.employment_type);

    // Compensation
    print_means("Mean salary by year", &stats.salary_by_year);
    print_counts("Latest salary distribution", &stats.salary_histogram);
    print_means("Mean salary by department", &stats.salary_by_department);
    print_means("Mean salary by gender", &stats.salary_by_gender);

    if !stats.salary_growth.is_empty() {
        println!("\nTop salary growth");
        for g in &stats.salary_growth {
            println!("   {:<24} {:>11.1}%", g.entity.to_string(), g.growth_pct);
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: SnapshotConfig) -> Result<()> {
    let marker = config.unknown_marker.clone();
    let outcome = run_pipeline(config)?;
    let stats = WorkforceSummary::build(
        &outcome.report.snapshot,
        outcome.inputs.get(hr::SALARY),
        &marker,
    );
    let mut app = hr_snapshot::ui::App::new(outcome.report).with_summary(stats);
    hr_snapshot::ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: SnapshotConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run: hr-snapshot reconcile");
    std::process::exit(1);
}
