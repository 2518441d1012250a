use clap::Parser;
use std::path::PathBuf;

use veda_migrate::config::Config;
use veda_migrate::db::Store;
use veda_migrate::link::{LinkAction, RuleSet};

#[derive(Parser)]
#[command(name = "check-links")]
#[command(about = "Report how many foreign-key cells each fill rule has resolved")]
struct Args {
    /// Normalized database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// TOML rule file; built-in rules otherwise
    #[arg(long)]
    rules: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = Config::load(None)?;

    let path = args.database.unwrap_or(config.paths.database);
    let rules_path = args.rules.or(config.link.rules_file);
    let rules = RuleSet::load_or_builtin(rules_path.as_deref())?;
    let store = Store::open_read_only(&path)?;

    println!("🔍 Checking foreign-key links in {}", path.display());
    println!("{}", "=".repeat(60));

    let mut unresolved_total = 0;
    for rule in rules.ordered().iter().filter(|r| r.is_mutating()) {
        let how = match &rule.action {
            LinkAction::StaticId { value } => format!("static {}", value),
            LinkAction::IdFill { lookup } => format!("via {}", lookup.source),
            LinkAction::IdFillComplex { join_on } => format!(
                "via ({})",
                join_on
                    .iter()
                    .map(|p| p.source.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => continue,
        };

        match (
            store.count_rows(&rule.source.table),
            store.count_nulls(&rule.source.table, &rule.source.column),
        ) {
            (Ok(total), Ok(nulls)) => {
                let marker = if nulls == 0 { "✅" } else { "⚠️ " };
                println!(
                    "{} #{:<3} {} {}: {}/{} resolved",
                    marker,
                    rule.id,
                    rule.source,
                    how,
                    total - nulls,
                    total
                );
                unresolved_total += nulls;
            }
            (Err(e), _) | (_, Err(e)) => {
                println!("❌ #{:<3} {}: {}", rule.id, rule.source, e);
            }
        }
    }

    println!("{}", "-".repeat(60));
    println!("📊 Unresolved cells: {}", unresolved_total);
    Ok(())
}
