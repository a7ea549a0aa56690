mod config;
mod embeddings;
mod error;
mod logging;
mod mail;
mod models;
mod pipeline;
mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::embeddings::download::ensure_model_files;
use crate::embeddings::engine::EmbeddingEngine;
use crate::embeddings::DeviceHint;
use crate::mail::auth::CredentialStore;
use crate::mail::gmail::GmailClient;
use crate::store::emails::EmailStore;
use crate::store::vectors::VectorIndex;

#[derive(Debug, Parser)]
#[command(
    name = "inbox-search",
    version = config::APP_VERSION,
    about = "Pull mail into SQLite, embed it, search it"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch recent messages from Gmail into the email database
    Extract {
        #[arg(long, default_value = config::defaults::EMAILS_DB_PATH)]
        database: PathBuf,
        #[arg(long, default_value_t = config::defaults::MAX_EMAILS)]
        max_emails: u32,
        /// OAuth client secrets downloaded from the Google console
        #[arg(long, default_value = config::defaults::CREDENTIALS_PATH)]
        credentials: PathBuf,
        /// Cached user token (access + refresh)
        #[arg(long, default_value = config::defaults::TOKEN_PATH)]
        token: PathBuf,
    },
    /// Load the body column of a public email CSV into an email database
    ImportDemo {
        #[arg(long, default_value = config::demo::CSV_PATH)]
        csv: PathBuf,
        #[arg(long, default_value = config::demo::DATABASE_PATH)]
        database: PathBuf,
    },
    /// Embed every stored email into the vector index
    Embed {
        #[arg(long, default_value = config::defaults::EMAILS_DB_PATH)]
        sql_path: PathBuf,
        #[arg(long, default_value = config::defaults::EMBEDDINGS_DB_PATH)]
        embeddings_path: PathBuf,
        #[arg(long, default_value = config::embedding::DEFAULT_MODEL_NAME)]
        model_name: String,
        #[arg(long, default_value_t = config::defaults::EMBED_BATCH_SIZE)]
        batch_size: usize,
        #[arg(long, value_enum, default_value_t = DeviceHint::Cpu)]
        device: DeviceHint,
    },
    /// Print the closest emails to QUERY as JSON
    Query {
        query: String,
        #[arg(long, default_value_t = config::defaults::NUM_RESULTS)]
        num_results: usize,
        #[arg(long, default_value = config::defaults::EMBEDDINGS_DB_PATH)]
        embeddings_path: PathBuf,
        #[arg(long, default_value = config::embedding::DEFAULT_MODEL_NAME)]
        model_name: String,
        #[arg(long, value_enum, default_value_t = DeviceHint::Cpu)]
        device: DeviceHint,
    },
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("[inbox-search] fatal error: {e:#}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;

    match cli.command {
        Commands::Extract {
            database,
            max_emails,
            credentials,
            token,
        } => {
            let access_token = CredentialStore::new(credentials, token).access_token()?;
            let provider = GmailClient::new(access_token);
            let mut store = EmailStore::open_or_create(&database)?;

            let summary = pipeline::extract::extract_emails(&provider, &mut store, max_emails)?;
            log::info!(
                "Fetched {} messages, stored {} new emails in {}",
                summary.fetched,
                summary.inserted,
                database.display()
            );
            println!("Inserted {} new emails", summary.inserted);
        }
        Commands::ImportDemo { csv, database } => {
            let summary = pipeline::demo::import_demo_emails(&csv, &database)?;
            log::info!(
                "Imported {} of {} demo rows into {}",
                summary.inserted,
                summary.rows,
                database.display()
            );
            println!("Imported {} demo emails", summary.inserted);
        }
        Commands::Embed {
            sql_path,
            embeddings_path,
            model_name,
            batch_size,
            device,
        } => {
            let store = EmailStore::open_existing(&sql_path)?;
            let model_dir = ensure_model_files(&model_name)?;
            let engine = EmbeddingEngine::load(&model_name, &model_dir, device)?;
            let mut index = VectorIndex::open_or_create(&embeddings_path)?;

            let n = pipeline::embed::embed_emails(&store, &mut index, &engine, batch_size)?;
            println!("Embedded {} emails into {}", n, index.path().display());
        }
        Commands::Query {
            query,
            num_results,
            embeddings_path,
            model_name,
            device,
        } => {
            let result = pipeline::query::run_query(&embeddings_path, &query, num_results, || {
                let model_dir = ensure_model_files(&model_name)?;
                EmbeddingEngine::load(&model_name, &model_dir, device)
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
