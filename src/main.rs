mod codec;
mod dto;
mod ingest;
mod query;
mod record;
mod store;
mod util;
mod web_interface;

use anyhow::Context;
use std::env;
use tracing::info;
use util::{config::load_settings, connect_to_db, setup_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    if let (Some(git_describe), Some(git_sha), Some(build_timestamp)) = (
        option_env!("VERGEN_GIT_DESCRIBE"),
        option_env!("VERGEN_GIT_SHA"),
        option_env!("VERGEN_BUILD_TIMESTAMP"),
    ) {
        info!("Tracksink {} ({} {})", git_describe, git_sha, build_timestamp);
    }

    let args: Vec<String> = env::args().collect();
    let choice = args.get(1).cloned().unwrap_or_else(|| "serve".into());

    let settings = load_settings()?;

    match choice.as_str() {
        "serve" => {
            let key = settings.shared_key()?;
            let pool = connect_to_db(&settings.database_url).await?;
            web_interface::start_server(pool, key, &settings).await?;
        }
        "encrypt" => {
            let plaintext = args
                .get(2)
                .context("Usage: tracksink encrypt '<json record>'")?;
            let envelope = codec::seal(plaintext, &settings.shared_key()?);
            println!("{}", serde_json::to_string(&envelope)?);
        }
        _ => println!("Make a valid choice (serve, encrypt)"),
    }

    Ok(())
}
