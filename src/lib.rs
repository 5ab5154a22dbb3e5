pub mod btree;
pub mod config;
pub mod database;
pub mod file;
pub mod free_list;
pub mod index;
pub mod record;

pub use btree::{BTree, BTreeError, BTreeResult, DeleteOutcome, Key, KeyId, Location, TreeStats};
pub use config::{ConfigError, EngineConfig};
pub use database::{BuildReport, Database, DatabaseError, DatabaseResult};
pub use file::{CacheStats, NO_RRN, Rrn};
pub use index::{IndexError, PageLayout};
pub use record::{Record, RecordError, RecordLayout};
