use sqlx::{migrate::Migrator, Executor, Pool, SqlitePool};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api_error;
pub mod config;

pub use api_error::ApiError;

pub type DB = sqlx::Sqlite;

static MIGRATOR: Migrator = sqlx::migrate!(); // defaults to "./migrations"

pub async fn connect_to_db(database_url: &str) -> anyhow::Result<SqlitePool> {
    let sqlx_options = sqlx::pool::PoolOptions::<DB>::new().after_connect(|conn, _meta| {
        Box::pin(async move {
            let statements = vec![
                "PRAGMA journal_mode = WAL;",
                "PRAGMA synchronous = NORMAL;",
                "PRAGMA busy_timeout = 15000;",
            ];

            for statement in statements {
                conn.execute(statement).await?;
            }

            Ok(())
        })
    });

    let sqlx_pool: Pool<DB> = sqlx_options.connect(database_url).await?;
    MIGRATOR.run(&sqlx_pool).await?;
    info!("Database ready, schema up to date");

    Ok(sqlx_pool)
}

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::Layer::new()
                .with_writer(std::io::stdout)
                .compact(),
        )
        .init();
}
