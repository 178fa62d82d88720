use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tictrack::auth::{Argon2Config, CredentialHasher};
use tictrack::config::AppConfig;
use tictrack::main_module::{build_app_state, run_server};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tictrack                       run the HTTP server");
    eprintln!("  tictrack hash-password <pw>    print an Argon2id hash for the directory file");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => {}
        Some("hash-password") => {
            let password = args.get(1).context("hash-password needs a password argument")?;
            let config = AppConfig::load()?;
            let hasher = CredentialHasher::new(Argon2Config::from_auth(&config.auth))?;
            println!("{}", hasher.hash(password)?);
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown command: {other}");
        }
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        "Starting tictrack {} for {}",
        env!("CARGO_PKG_VERSION"),
        config.auth.business_entity
    );
    let state = build_app_state(config).await?;
    run_server(state).await
}
