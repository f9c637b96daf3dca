// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::Path;
use tracing::info;

// Use library instead of local modules
use okr_tracker::{
    config::AppConfig, count_key_results, format_br, format_br_date, format_decimal,
    generate_checkpoints, import_key_results, load_import_csv, logging, open_database,
    parse_br_date, parse_decimal, to_canonical, Frequency,
};

const USAGE: &str = "Usage:
  okr-tracker                                   terminal dashboard
  okr-tracker init                              create / migrate the database
  okr-tracker import <file.csv>                 import key results
  okr-tracker parse <value>                     normalize a Brazilian number
  okr-tracker format <value> [decimals]         display a number pt-BR style
  okr-tracker schedule <total> <start> <end> <weekly|monthly|quarterly>";

fn main() -> Result<()> {
    let config = AppConfig::from_env();
    logging::init(&config.log_filter);

    let args: Vec<String> = env::args().skip(1).collect();
    let arg = |i: usize, name: &str| {
        args.get(i)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing <{}>\n\n{}", name, USAGE))
    };

    match args.first().map(String::as_str) {
        None | Some("ui") => run_ui_mode(&config)?,
        Some("init") => run_init(&config)?,
        Some("import") => run_import(&config, Path::new(arg(1, "file.csv")?))?,
        Some("parse") => run_parse(arg(1, "value")?),
        Some("format") => run_format(arg(1, "value")?, args.get(2).map(String::as_str))?,
        Some("schedule") => run_schedule(
            arg(1, "total")?,
            arg(2, "start")?,
            arg(3, "end")?,
            arg(4, "frequency")?,
        )?,
        Some("help") | Some("--help") | Some("-h") => println!("{}", USAGE),
        Some(other) => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

fn run_init(config: &AppConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    let conn = open_database(&config.db_path)?;
    let count = count_key_results(&conn)?;

    println!("✓ Database ready at {:?} (WAL mode)", config.db_path);
    println!("✓ {} key results stored", count);
    Ok(())
}

fn run_import(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Key Result Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let rows = load_import_csv(csv_path)?;
    println!("✓ Loaded {} rows from {:?}", rows.len(), csv_path);

    // 2. Setup database
    println!("\n🔧 Opening database...");
    let conn = open_database(&config.db_path)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Insert key results + checkpoints
    println!("\n💾 Inserting key results...");
    let report = import_key_results(&conn, &rows, "cli")?;
    info!(
        rows = report.rows,
        inserted = report.inserted,
        duplicates = report.duplicates,
        "import finished"
    );

    // 4. Summary
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Objectives created: {}", report.objectives_created);
    println!("✓ Key results inserted: {}", report.inserted);
    if report.duplicates > 0 {
        println!("✓ Already imported (skipped): {}", report.duplicates);
    }
    println!("✅ Database contains {} key results", count_key_results(&conn)?);

    Ok(())
}

fn run_parse(raw: &str) {
    let value = parse_decimal(raw);
    println!("{}", to_canonical(value));
    println!("   pt-BR: {}", format_br(value));
}

fn run_format(raw: &str, decimals: Option<&str>) -> Result<()> {
    let decimals = match decimals {
        Some(d) => d
            .parse::<usize>()
            .with_context(|| format!("invalid decimals '{}'", d))?,
        None => 2,
    };

    println!("{}", format_decimal(parse_decimal(raw), decimals));
    Ok(())
}

fn run_schedule(total: &str, start: &str, end: &str, frequency: &str) -> Result<()> {
    let total = parse_decimal(total);
    let start = parse_br_date(start).ok_or_else(|| anyhow!("invalid start date '{}'", start))?;
    let end = parse_br_date(end).ok_or_else(|| anyhow!("invalid end date '{}'", end))?;
    let frequency: Frequency = frequency.parse()?;

    let plan = generate_checkpoints(total, start, end, frequency)?;

    println!(
        "📅 {} checkpoints ({}) de {} a {}",
        plan.len(),
        frequency.label(),
        format_br_date(start),
        format_br_date(end)
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for cp in &plan {
        println!(
            "{:>3}  {:<12} {:>10}  {:>14}",
            cp.period_index,
            cp.period_label,
            format_br_date(cp.due_date),
            format_br(cp.target_value)
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    use okr_tracker::{get_checkpoints, get_key_results, get_objectives, HierarchyFilter};
    use std::collections::HashMap;

    println!("🖥️  Loading OKR dashboard...\n");

    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.db_path);
        eprintln!("   Run: okr-tracker init");
        eprintln!("   or:  okr-tracker import <file.csv>");
        std::process::exit(1);
    }

    let conn = open_database(&config.db_path)?;

    println!("📊 Loading key results...");
    let everything = HierarchyFilter::default();
    let objectives = get_objectives(&conn, &everything)?;
    let key_results = get_key_results(&conn, &everything)?;

    let mut checkpoints = HashMap::new();
    for kr in &key_results {
        checkpoints.insert(kr.id.clone(), get_checkpoints(&conn, &kr.id)?);
    }

    println!("✓ Loaded {} key results\n", key_results.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let today = chrono::Local::now().date_naive();
    let mut app = ui::App::new(objectives, key_results, checkpoints, today);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin okr-server --features server");
    std::process::exit(1);
}
