use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use veda_migrate::config::Config;
use veda_migrate::constants;
use veda_migrate::db::Store;
use veda_migrate::importer::Importer;
use veda_migrate::initializer::SchemaInitializer;
use veda_migrate::link::{LinkEngine, LogSink, RuleKind, RuleSet, RunReport};
use veda_migrate::logging;
use veda_migrate::metrics;

#[derive(Parser)]
#[command(name = "veda_migrate")]
#[command(about = "Migrate a structural analysis export into the normalized schema and link it")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Normalized database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Source export path
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the empty normalized tables
    Create {
        /// Delete an existing database first
        #[arg(long)]
        recreate: bool,
    },
    /// Copy rows from the source export
    Import,
    /// Fill foreign-key columns and validate links
    Link {
        /// TOML rule file; built-in rules otherwise
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Write the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Create, import and link in order
    Run {
        #[arg(long)]
        recreate: bool,
    },
    /// Run the validation rules only
    Validate {
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Print the rules in execution order
    Rules {
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

impl Commands {
    fn stage(&self) -> &'static str {
        match self {
            Commands::Create { .. } => constants::STAGE_CREATE,
            Commands::Import => constants::STAGE_IMPORT,
            Commands::Link { .. } | Commands::Rules { .. } => constants::STAGE_LINK,
            Commands::Run { .. } => constants::STAGE_RUN,
            Commands::Validate { .. } => constants::STAGE_VALIDATE,
        }
    }
}

fn run_create(config: &Config, recreate: bool) -> anyhow::Result<()> {
    println!("🏗️  Creating normalized schema...");
    let report = SchemaInitializer::new(&config.paths.database, recreate)
        .initialize()
        .context("schema creation failed")?;
    println!("   Database: {}", report.database.display());
    println!("   Tables created: {}", report.tables_created.len());
    println!("   Tables present: {}", report.tables_verified.len());
    println!("✅ Schema ready");
    Ok(())
}

fn run_import(config: &Config) -> anyhow::Result<()> {
    println!("📥 Importing rows from {}...", config.paths.source.display());
    let source = Store::open_read_only(&config.paths.source).context("cannot open source export")?;
    let mut dest = Store::open_existing(&config.paths.database).context("cannot open database")?;
    let report = Importer::new(&source, &mut dest)
        .import_all()
        .context("import failed")?;

    println!("{}", "=".repeat(60));
    for table in &report.tables {
        println!(
            "   {:<64} {:>7} rows  ({:?}{})",
            table.table,
            table.inserted,
            table.status,
            if table.failed > 0 {
                format!(", {} rejected", table.failed)
            } else {
                String::new()
            }
        );
    }
    println!("{}", "-".repeat(60));
    println!("   Total rows inserted: {}", report.total_inserted());
    if !report.flagged.is_empty() {
        println!("⚠️  {} reinforcement rows flagged:", report.flagged.len());
        for row in &report.flagged {
            for issue in &row.issues {
                println!("   #{} {}: {}", row.id, row.name.as_deref().unwrap_or("?"), issue);
            }
        }
    }
    println!("✅ Import complete");
    Ok(())
}

fn load_rules(config: &Config, explicit: Option<&Path>) -> anyhow::Result<RuleSet> {
    let path = explicit.or(config.link.rules_file.as_deref());
    RuleSet::load_or_builtin(path).context("cannot load link rules")
}

fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, report.to_json_pretty()?)
        .with_context(|| format!("cannot write report to {}", path.display()))?;
    println!("   Report written to {}", path.display());
    Ok(())
}

fn run_link(config: &Config, rules: Option<&Path>, report_path: Option<&Path>) -> anyhow::Result<()> {
    println!("🔗 Linking foreign keys...");
    let rules = load_rules(config, rules)?;
    let store = Store::open_existing(&config.paths.database).context("cannot open database")?;
    let sink = LogSink;
    let report = LinkEngine::new(&store, &sink)
        .run(&rules)
        .context("link run aborted")?;

    println!("{}", report.render_summary());
    if let Some(path) = report_path.or(config.link.report_file.as_deref()) {
        write_report(&report, path)?;
    }
    println!("✅ Linking complete");
    Ok(())
}

fn run_validate(config: &Config, rules: Option<&Path>) -> anyhow::Result<()> {
    println!("🔍 Validating links...");
    let rules = load_rules(config, rules)?.only(RuleKind::Validation);
    let store = Store::open_existing(&config.paths.database).context("cannot open database")?;
    let sink = LogSink;
    let report = LinkEngine::new(&store, &sink).validate(&rules)?;
    println!("{}", report.render_summary());
    Ok(())
}

fn print_rules(config: &Config, rules: Option<&Path>) -> anyhow::Result<()> {
    let rules = load_rules(config, rules)?;
    println!("📋 Link rules in execution order");
    println!("{}", "=".repeat(60));
    for rule in rules.ordered() {
        println!("   {:<18} {}", rule.phase().as_str(), rule.describe());
        if let Some(note) = &rule.note {
            println!("      note: {}", note);
        }
    }
    let summary = rules.summary();
    println!("{}", "-".repeat(60));
    println!("   Total rules: {}", summary.total);
    for (kind, count) in &summary.by_kind {
        println!("   {:<16} {}", kind.as_str(), count);
    }
    println!("   Source tables: {}", summary.tables_involved);
    println!("   Fingerprint: {}", rules.fingerprint());
    Ok(())
}

fn dispatch(command: &Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Create { recreate } => run_create(config, *recreate || config.schema.recreate),
        Commands::Import => run_import(config),
        Commands::Link { rules, report } => run_link(config, rules.as_deref(), report.as_deref()),
        Commands::Run { recreate } => {
            for stage in constants::pipeline_stages() {
                let span = tracing::info_span!("stage", stage = %stage);
                let _enter = span.enter();
                info!("Starting stage");
                let result = match stage {
                    constants::STAGE_CREATE => run_create(config, *recreate || config.schema.recreate),
                    constants::STAGE_IMPORT => run_import(config),
                    constants::STAGE_LINK => run_link(config, None, None),
                    other => bail!("unknown stage {}", other),
                };
                if let Err(e) = result {
                    error!("Stage failed: {:#}", e);
                    println!("❌ Stage '{}' failed, stopping", stage);
                    return Err(e);
                }
            }
            println!("🎉 Pipeline complete");
            Ok(())
        }
        Commands::Validate { rules } => run_validate(config, rules.as_deref()),
        Commands::Rules { rules } => print_rules(config, rules.as_deref()),
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(p) = cli.database {
        config.paths.database = p;
    }
    if let Some(p) = cli.source {
        config.paths.source = p;
    }
    if let Some(p) = cli.log_dir {
        config.paths.log_dir = p;
    }

    let _guard = logging::init_logging(&config.paths.log_dir, cli.command.stage());
    if config.metrics.snapshot_file.is_some() {
        metrics::init_metrics();
    }

    let result = dispatch(&cli.command, &config);

    if let Some(path) = &config.metrics.snapshot_file {
        if let Err(e) = metrics::write_snapshot(path) {
            error!("Failed to write metrics snapshot: {}", e);
        }
    }

    if let Err(e) = &result {
        error!("{:#}", e);
        println!("❌ {:#}", e);
    }
    result
}
