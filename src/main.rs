use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vendor_bridge::config::Config;
use vendor_bridge::services::{AmoCrmHttp, Dolyame, StaticAccessToken};
use vendor_bridge::{AppError, AppResult};

#[derive(Parser)]
#[command(name = "vendor-bridge", about = "Manual calls to the amoCRM and Dolyame APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    Amocrm(AmoCrmCommand),
    #[command(subcommand)]
    Dolyame(DolyameCommand),
}

#[derive(Subcommand)]
enum AmoCrmCommand {
    /// GET a path relative to AMOCRM_BASE_URL
    Get {
        path: String,
        /// Query parameter as key=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// POST a JSON body
    Post { path: String, data: String },
    /// PATCH a JSON body
    Patch { path: String, data: String },
}

#[derive(Subcommand)]
enum DolyameCommand {
    Info { order_id: String },
    Cancel { order_id: String },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_data(data: &str) -> AppResult<Value> {
    serde_json::from_str(data).map_err(|e| AppError::InvalidInput(format!("Invalid JSON: {}", e)))
}

fn amocrm_client(config: &Config) -> AppResult<AmoCrmHttp> {
    let amocrm = config.amocrm()?;
    let token = amocrm.access_token.clone().ok_or_else(|| {
        AppError::NotConfigured("Set AMOCRM_ACCESS_TOKEN to call amoCRM".to_string())
    })?;

    Ok(AmoCrmHttp::new(
        &amocrm.base_url,
        Arc::new(StaticAccessToken::new(token)),
    )?)
}

async fn run(command: Command, config: &Config) -> anyhow::Result<Value> {
    match command {
        Command::Amocrm(command) => {
            let client = amocrm_client(config)?;
            tracing::info!("amoCRM base URL: {}", client.base_url());

            let response = match command {
                AmoCrmCommand::Get { path, params } => {
                    let params: Vec<(&str, &str)> = params
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    client.get(&path, &params, None).await?
                }
                AmoCrmCommand::Post { path, data } => {
                    client.post(&path, &parse_data(&data)?, None).await?
                }
                AmoCrmCommand::Patch { path, data } => {
                    client.patch(&path, &parse_data(&data)?, None).await?
                }
            };
            Ok(response)
        }
        Command::Dolyame(command) => {
            let client = Dolyame::new(config.dolyame()?)?;
            tracing::info!("Dolyame notifications go to {}", client.notification_url());

            match command {
                DolyameCommand::Info { order_id } => {
                    Ok(serde_json::to_value(client.info(&order_id).await?)?)
                }
                DolyameCommand::Cancel { order_id } => Ok(client.cancel(&order_id).await?),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendor_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env();

    let response = run(cli.command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
