use clap::{Parser, Subcommand};
use column_rag::Result;
use column_rag::commands;
use column_rag::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "column-rag")]
#[command(about = "Semantic search and RAG over embedding columns in PostgreSQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the database and Gemini settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add a vector column next to every matching text column
    Provision,
    /// Generate embeddings for rows that do not have one yet
    Embed {
        /// Stop after embedding this many rows
        #[arg(long)]
        max_rows: Option<u64>,
    },
    /// Show how many rows of each column have embeddings
    Progress,
    /// Check database, pgvector and API key setup
    Check,
    /// Start the HTTP API
    Serve {
        /// Address to bind, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a semantic search from the command line
    Search {
        /// Text to search for
        query: String,
        /// Maximum number of results
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Config { show } = cli.command {
        if show {
            show_config()?;
        } else {
            run_interactive_config()?;
        }
        return Ok(());
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Provision => {
            commands::provision(&config).await?;
        }
        Commands::Embed { max_rows } => {
            commands::embed(&config, max_rows).await?;
        }
        Commands::Progress => {
            commands::progress(&config).await?;
        }
        Commands::Check => {
            commands::check(&config).await?;
        }
        Commands::Serve { host, port } => {
            commands::serve(&config, host, port).await?;
        }
        Commands::Search { query, limit } => {
            commands::search(&config, &query, limit).await?;
        }
    }

    Ok(())
}
