use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use pagetree::{Database, DatabaseResult, DeleteOutcome, EngineConfig, Record};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "pagetree",
    about = "Disk-backed B+ tree index over a fixed-size record file"
)]
struct Cli {
    /// Directory holding the index, record and free-list files
    #[arg(long, default_value = "data")]
    dir: PathBuf,

    /// JSON engine configuration (order, key_width, payload_size, cache_capacity)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty database
    Init,
    /// Append `key,payload` rows from a CSV file without indexing them
    Import { csv: PathBuf },
    /// Index the first N records of the record file
    Build { n: usize },
    /// Print the record stored under KEY
    Search { key: String },
    /// Print every record with START <= key <= END
    Range { start: String, end: String },
    /// Store and index a new record
    Insert { key: String, payload: String },
    /// Delete the record stored under KEY
    Delete { key: String },
    /// Print every index page
    Dump,
    /// Check the index structure and print its shape
    Check,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run() {
        tracing::error!("{err}");
        process::exit(1);
    }
}

fn run() -> DatabaseResult<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Command::Init = cli.command {
        let mut db = Database::create(&cli.dir, config)?;
        println!("Created database in {}", cli.dir.display());
        return db.close();
    }

    let mut db = Database::open(&cli.dir, config)?;
    match cli.command {
        Command::Init => {}
        Command::Import { csv } => {
            let count = db.import_csv(&csv)?;
            println!("Imported {} records", count);
        }
        Command::Build { n } => {
            let report = db.build(n)?;
            println!(
                "Indexed {} records ({} deleted, {} already indexed)",
                report.inserted, report.tombstoned, report.duplicates
            );
        }
        Command::Search { key } => match db.search(&key)? {
            Some(record) => print_record(&record),
            None => println!("Key {} not found", key),
        },
        Command::Range { start, end } => {
            let records = db.range_search(&start, &end)?;
            if records.is_empty() {
                println!("No records in range");
            }
            for record in &records {
                print_record(record);
            }
        }
        Command::Insert { key, payload } => {
            let slot = db.insert(&key, payload.as_bytes())?;
            println!("Inserted {} at slot {}", key, slot);
        }
        Command::Delete { key } => match db.delete(&key)? {
            DeleteOutcome::Removed(slot) => println!("Deleted {} (slot {})", key, slot),
            DeleteOutcome::SeparatorRetained => {
                println!("Key {} is an index separator and was kept", key)
            }
            DeleteOutcome::NotFound => println!("Key {} not found", key),
        },
        Command::Dump => print!("{}", db.dump()?),
        Command::Check => {
            let stats = db.validate()?;
            println!(
                "OK: height {}, {} pages, {} leaves, {} keys",
                stats.height, stats.pages, stats.leaves, stats.keys
            );
        }
    }

    db.close()
}

fn print_record(record: &Record) {
    println!("{}\t{}", record.key, record.payload_str());
}
