use anyhow::{Context, Result};
use card_collection::{
    apply_batch, find_duplicates, load_batch, setup_database, CardStore, CatalogLookup, Config,
    Operation, ReconciliationReport, SqliteCardStore,
};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "card-collection",
    version,
    about = "Reconcile card collection change requests against a SQLite store"
)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Config file (default: card-collection.toml or .card-collection.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides `database` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a CSV or JSON batch of change requests to an owner's collection
    Apply { owner: String, file: PathBuf },
    /// List an owner's cards
    List { owner: String },
    /// Delete every card of an owner
    Clear { owner: String },
    /// Report entries that share an identity (corrupted state)
    Audit { owner: String },
    /// Register catalog references for creation-time validation
    CatalogAdd {
        #[arg(required = true)]
        catalog_refs: Vec<String>,
    },
    /// Show the audit trail of one card
    Events { entry_id: String },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::resolve(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database = db;
    }
    init_tracing(&config);

    let conn = Connection::open(&config.database)
        .with_context(|| format!("Failed to open database: {}", config.database.display()))?;
    setup_database(&conn)?;
    let store = SqliteCardStore::new(&conn, config.actor.as_str());

    match args.command {
        Commands::Apply { owner, file } => run_apply(&store, &config, &owner, &file),
        Commands::List { owner } => run_list(&store, &owner),
        Commands::Clear { owner } => run_clear(&store, &owner),
        Commands::Audit { owner } => run_audit(&store, &owner),
        Commands::CatalogAdd { catalog_refs } => run_catalog_add(&store, &catalog_refs),
        Commands::Events { entry_id } => run_events(&store, &entry_id),
    }
}

fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_apply(
    store: &SqliteCardStore,
    config: &Config,
    owner: &str,
    file: &std::path::Path,
) -> Result<()> {
    println!("📥 Applying {} to collection of {}", file.display(), owner);

    let requests = load_batch(file)?;
    println!("✓ Loaded {} requests", requests.len());

    let catalog = if config.validate_catalog {
        Some(store.load_catalog()?)
    } else {
        None
    };

    let (report, summary) = apply_batch(
        store,
        catalog.as_ref().map(|c| c as &dyn CatalogLookup),
        owner,
        requests,
    )?;

    print_report(&report);
    println!(
        "\n💾 Flushed: {} inserted, {} updated, {} deleted",
        summary.inserted, summary.updated, summary.deleted
    );
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    println!();
    for (index, outcome) in report.outcomes.iter().enumerate() {
        match outcome {
            Ok(results) => {
                for result in results {
                    let id = if result.entry.has_id() {
                        result.entry.id.as_str()
                    } else {
                        "-"
                    };
                    println!(
                        "  [{index}] {:<8} {} {} x{}",
                        result.operation.as_str(),
                        id,
                        result.entry.catalog_ref,
                        result.entry.amount
                    );
                }
            }
            Err(err) => println!("  [{index}] ❌ {err}"),
        }
    }
    println!(
        "\n✓ {} created, {} updated, {} deleted, {} no-op, {} rejected",
        report.count(Operation::Created),
        report.count(Operation::Updated),
        report.count(Operation::Deleted),
        report.count(Operation::Noop),
        report.errors().len()
    );
}

fn run_list(store: &SqliteCardStore, owner: &str) -> Result<()> {
    let entries = store.load_owner_entries(owner)?;
    if entries.is_empty() {
        println!("No cards for {owner}");
        return Ok(());
    }

    println!("🎴 {} cards for {}", entries.len(), owner);
    for entry in &entries {
        let tags: Vec<&str> = entry.tags.iter().map(String::as_str).collect();
        println!(
            "  {}  {:<12} x{:<4} {:<8} foil={} signed={} altered={} misprint={} tags=[{}]",
            entry.id,
            entry.catalog_ref,
            entry.amount,
            entry.condition.as_str(),
            entry.foil,
            entry.signed,
            entry.altered,
            entry.misprint,
            tags.join(", ")
        );
    }
    Ok(())
}

fn run_clear(store: &SqliteCardStore, owner: &str) -> Result<()> {
    let deleted = store.delete_all(owner)?;
    println!("🗑️  Deleted {deleted} cards for {owner}");
    Ok(())
}

fn run_audit(store: &SqliteCardStore, owner: &str) -> Result<()> {
    let entries = store.load_owner_entries(owner)?;
    let groups = find_duplicates(&entries);

    if groups.is_empty() {
        println!("✅ {} entries, no duplicate identities", entries.len());
        return Ok(());
    }

    println!("⚠️  {} duplicate identity groups", groups.len());
    for group in &groups {
        println!("  {} -> {}", group.reason, group.entry_ids.join(", "));
        println!("     merged amount would be {}", group.total_amount);
    }
    Ok(())
}

fn run_catalog_add(store: &SqliteCardStore, catalog_refs: &[String]) -> Result<()> {
    let mut added = 0;
    for catalog_ref in catalog_refs {
        if store.register_catalog_ref(catalog_ref)? {
            added += 1;
        }
    }
    println!(
        "📚 Added {} catalog references ({} already known)",
        added,
        catalog_refs.len() - added
    );
    Ok(())
}

fn run_events(store: &SqliteCardStore, entry_id: &str) -> Result<()> {
    let events = store.events_for_card(entry_id)?;
    if events.is_empty() {
        println!("No events for {entry_id}");
        return Ok(());
    }

    for event in &events {
        println!(
            "  {}  {:<13} by {}  {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.actor,
            event.data
        );
    }
    Ok(())
}
