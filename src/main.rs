//! # docbox CLI
//!
//! Commands for database initialization, the HTTP API server, and namespace
//! maintenance.
//!
//! ```bash
//! docbox --config ./config/docbox.toml init
//! docbox --config ./config/docbox.toml serve
//! docbox --config ./config/docbox.toml delete-namespace <id>
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docbox::config::load_config;
use docbox::vector::create_vector_index;
use docbox::{db, migrate, server};

/// docbox — a document-grounded chat service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docbox.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docbox",
    about = "docbox — namespaced RAG chat over your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docbox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves the auth, namespace, chat, upload,
    /// ask, landing-page, memory, and inference endpoints.
    Serve,

    /// Delete a namespace's vectors and database rows.
    ///
    /// Maintenance command for cleaning up after the non-transactional
    /// cascade: removes every vector in the namespace from the index, then
    /// the namespace's messages, chats, and the namespace row itself.
    DeleteNamespace {
        /// The namespace id to purge.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::DeleteNamespace { id } => {
            let index = create_vector_index(&config.vector)?;
            index.delete_namespace(&id).await?;

            let pool = db::connect(&config).await?;
            let messages = sqlx::query("DELETE FROM messages WHERE namespace_id = ?")
                .bind(&id)
                .execute(&pool)
                .await?
                .rows_affected();
            let chats = sqlx::query("DELETE FROM chats WHERE namespace_id = ?")
                .bind(&id)
                .execute(&pool)
                .await?
                .rows_affected();
            let namespaces = sqlx::query("DELETE FROM namespaces WHERE id = ?")
                .bind(&id)
                .execute(&pool)
                .await?
                .rows_affected();
            pool.close().await;

            println!("delete-namespace {}", id);
            println!("  vectors: deleted");
            println!("  messages deleted: {}", messages);
            println!("  chats deleted: {}", chats);
            println!("  namespace rows deleted: {}", namespaces);
            println!("ok");
        }
    }

    Ok(())
}
