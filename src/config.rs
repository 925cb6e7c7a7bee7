use clap::{Parser, Subcommand};
use std::{env, path::PathBuf};

pub const DEFAULT_STORAGE_DIR: &str = "./data/objects";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/meta/cloud_object.db";

/// Where the disk-backed store keeps payloads and metadata.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub storage_dir: String,
    pub database_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cloud objects with preprocessed attribute companions")]
pub struct Args {
    /// Directory where objects are stored (overrides CLOUD_OBJECT_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CLOUD_OBJECT_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema and exit
    Migrate,
    /// Create a bucket together with its `.meta` companion bucket
    CreateBucket { name: String },
    /// Upload a local file as a new cloud object
    Upload { file: PathBuf, uri: String },
    /// Print the cached HEAD metadata of an object and its companion
    Head { uri: String },
    /// Report whether an object has been preprocessed
    Status { uri: String },
    /// Print the preprocessed attributes, or a single one by name
    Attributes { uri: String, name: Option<String> },
}

impl StoreConfig {
    /// Parse environment variables + CLI args into a StoreConfig and the
    /// requested command.
    pub fn from_env_and_args() -> (Self, Command) {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_storage =
            env::var("CLOUD_OBJECT_STORAGE_DIR").unwrap_or_else(|_| DEFAULT_STORAGE_DIR.into());
        let env_db =
            env::var("CLOUD_OBJECT_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());

        // --- Merge ---
        let cfg = Self {
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
        };

        (cfg, args.command)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: DEFAULT_STORAGE_DIR.into(),
            database_url: DEFAULT_DATABASE_URL.into(),
        }
    }
}
