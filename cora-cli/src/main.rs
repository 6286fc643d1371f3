mod error;
mod handlers;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cora_core::types::SlotId;

#[derive(Parser)]
#[command(
    name = "cora",
    about = "Cora: room availability and conflict-free slot booking",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Storage backend: "memory" or "sqlite:<path>"
    #[arg(long, default_value = "memory", env = "CORA_STORAGE")]
    storage: String,

    /// JSON file with slots, subjects and the weekly template to load first
    #[arg(long, env = "CORA_SEED")]
    seed: Option<PathBuf>,

    /// Deadline for each store call, in milliseconds
    #[arg(long, default_value_t = 2000, env = "CORA_STORE_TIMEOUT_MS")]
    store_timeout_ms: u64,
}

impl StoreArgs {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    fn client(&self) -> anyhow::Result<cora_core::client::CoraClient> {
        server::create_client(&self.storage, self.seed.as_deref(), self.timeout())
    }

    /// A client for one-shot writes, which are lost unless the store outlives
    /// the process.
    fn persistent_client(&self) -> anyhow::Result<cora_core::client::CoraClient> {
        if !self.storage.starts_with("sqlite:") {
            anyhow::bail!(
                "bookings made here would vanish on exit; pass --storage sqlite:<path> (got '{}')",
                self.storage
            );
        }
        self.client()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Cora HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "42069")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bearer token required by every route except /health
        #[arg(long, env = "CORA_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Load a JSON timetable into a SQLite database
    Seed {
        /// Target database, as "sqlite:<path>"
        #[arg(long, env = "CORA_STORAGE")]
        storage: String,

        /// JSON seed file
        file: PathBuf,
    },

    /// List rooms free in a slot on a date
    FreeRooms {
        #[arg(long)]
        slot: SlotId,
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List free slots of a room on a date
    FreeSlots {
        #[arg(long)]
        room: String,
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show what occupies each slot of a room on a date
    Timetable {
        #[arg(long)]
        room: String,
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Book a slot, or every free slot in a range
    Reserve {
        #[arg(long)]
        room: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        slot: SlotId,
        /// Last slot of the range (inclusive)
        #[arg(long)]
        end_slot: Option<SlotId>,
        #[arg(long)]
        instructor: String,
        #[arg(long)]
        subject: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Release a booked slot
    Cancel {
        #[arg(long)]
        room: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        slot: SlotId,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List an instructor's bookings
    Bookings {
        #[arg(long)]
        instructor: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print version information
    Version,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cora_core=info,cora_cli=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            api_key,
            store,
        } => {
            let state = server::AppState {
                client: store.client()?,
                store_timeout: store.timeout(),
                api_key,
            };
            server::run(&host, port, state).await?;
        }
        Commands::Seed { storage, file } => {
            if !storage.starts_with("sqlite:") {
                anyhow::bail!("seed needs a persistent backend, got '{}'", storage);
            }
            let client = server::create_client(&storage, Some(file.as_path()), Duration::from_secs(5))?;
            let rooms = client.all_rooms()?;
            eprintln!("Seeded {} rooms into {}", rooms.len(), storage);
        }
        Commands::FreeRooms { slot, date, store } => {
            print_json(&store.client()?.free_rooms(slot, date)?)?;
        }
        Commands::FreeSlots { room, date, store } => {
            print_json(&store.client()?.free_slots(&room, date)?)?;
        }
        Commands::Timetable { room, date, store } => {
            print_json(&store.client()?.day_timetable(&room, date)?)?;
        }
        Commands::Reserve {
            room,
            date,
            slot,
            end_slot,
            instructor,
            subject,
            store,
        } => {
            let request = handlers::BookingRequest {
                room,
                date,
                slot,
                end_slot,
                instructor,
                subject,
            };
            request.validate().map_err(anyhow::Error::msg)?;
            let outcome = store
                .persistent_client()?
                .reserve_range_report(
                    &request.room,
                    request.date,
                    request.slot,
                    request.last_slot(),
                    &request.instructor,
                    &request.subject,
                )
                .context("reservation could not be evaluated")?;
            print_json(&outcome)?;
        }
        Commands::Cancel { room, date, slot, store } => {
            print_json(&store.persistent_client()?.cancel(&room, date, slot)?)?;
        }
        Commands::Bookings { instructor, store } => {
            print_json(&store.client()?.bookings_for(&instructor)?)?;
        }
        Commands::Version => {
            println!("cora {}", env!("CARGO_PKG_VERSION"));
            println!("Room availability and conflict-free slot booking");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_args(storage: &str) -> StoreArgs {
        StoreArgs {
            storage: storage.to_string(),
            seed: None,
            store_timeout_ms: 2000,
        }
    }

    #[test]
    fn test_one_shot_writes_need_a_persistent_store() {
        assert!(store_args("memory").persistent_client().is_err());
        assert!(store_args("memory").client().is_ok());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_one_shot_writes_accept_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = format!("sqlite:{}", dir.path().join("cora.db").display());
        assert!(store_args(&storage).persistent_client().is_ok());
    }

    #[test]
    fn test_reserve_parses_range() {
        let cli = Cli::try_parse_from([
            "cora", "reserve", "--room", "A104", "--date", "2024-01-01", "--slot", "3", "--end-slot", "4",
            "--instructor", "fac@x", "--subject", "CS101", "--storage", "sqlite:/tmp/cora.db",
        ])
        .unwrap();
        match cli.command {
            Commands::Reserve { slot, end_slot, store, .. } => {
                assert_eq!((slot, end_slot), (3, Some(4)));
                assert_eq!(store.storage, "sqlite:/tmp/cora.db");
            }
            _ => panic!("Expected reserve"),
        }
    }
}
