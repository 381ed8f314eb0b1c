use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohort_rest::{api, config::ServerConfig, db};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BIND: &str = "127.0.0.1";

#[derive(Parser)]
#[command(name = "cohort-rest")]
#[command(about = "REST service for patient cohorts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(short, long, default_value = DEFAULT_BIND)]
        bind: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "cohort_rest=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(bind: &str, port: u16) -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    let db = match &config.database_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    if config.security.api_key.is_none() {
        tracing::warn!("COHORT_REST_API_KEY is not set; every request is treated as authenticated");
    }

    let app = api::create_router_with_config(db, config.security, config.paging);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!("Cohort REST server listening on http://{}:{}", bind, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port, bind }) => serve(&bind, port).await,
        None => serve(DEFAULT_BIND, DEFAULT_PORT).await,
    }
}
