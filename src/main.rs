use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use longbox_indexing_server::config::{resolve_config, FileConfig};
use longbox_indexing_server::db::CatalogDb;
use longbox_indexing_server::indexing::ChangesetState;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Optional TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Log level filter (also honors RUST_LOG).
    #[clap(long)]
    pub logging_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the database schema.
    Init,
    /// Validate the schema and the cached-count invariants.
    Validate,
    /// Print catalog and moderation queue statistics.
    Stats,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let file_config = match &args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = resolve_config(args.catalog_db, args.logging_level, file_config)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = CatalogDb::open(&config.db_path)?;

    match args.command {
        Command::Init => {
            db.validate_schema()?;
            info!("Database ready at {:?}", config.db_path);
        }
        Command::Validate => {
            db.validate_schema()?;
            db.display().verify_cached_counts()?;
            println!("ok");
        }
        Command::Stats => {
            let oi = db.indexing();
            for state in [
                ChangesetState::Open,
                ChangesetState::Pending,
                ChangesetState::Reviewing,
                ChangesetState::Approved,
                ChangesetState::Discarded,
            ] {
                let changesets = oi.changesets_in_state(state)?;
                println!("{:>10}: {}", state.to_db_str(), changesets.len());
                for changeset in changesets.iter().take(10) {
                    let modified = chrono::DateTime::from_timestamp(changeset.modified, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!(
                        "            #{} {} by {} ({})",
                        changeset.id,
                        changeset.change_type.to_db_str(),
                        changeset.indexer,
                        modified
                    );
                }
            }
        }
    }

    Ok(())
}
