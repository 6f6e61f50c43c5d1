use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use fluxread::{QueryClient, QueryConfig};

#[derive(Debug, Parser)]
#[command(name = "fluxread", about = "Stream a Flux query result, truncated at a byte cap")]
struct Cli {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Server base url, overrides the config file.
    #[arg(long)]
    url: Option<String>,
    /// Organization id.
    #[arg(long)]
    org: Option<String>,
    /// Max bytes before forced truncation.
    #[arg(long)]
    byte_cap: Option<u64>,
    #[arg(long)]
    no_compress: bool,
    /// JSON file holding the `extern` value sent with the query.
    #[arg(long)]
    extern_file: Option<PathBuf>,
    #[arg(long)]
    json_logs: bool,
    /// Query text. Read from stdin when omitted.
    query: Option<String>,
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<QueryConfig, Box<dyn std::error::Error>> {
    let mut config = match (&cli.config, &cli.url) {
        (Some(path), _) => QueryConfig::from_path(path)?,
        (None, Some(url)) => QueryConfig::new(url.clone()),
        (None, None) => return Err("either --config or --url is required".into()),
    };
    if let Some(url) = &cli.url {
        config.base_url = url.clone();
    }
    if let Some(org) = &cli.org {
        config.org_id = Some(org.clone());
    }
    if let Some(byte_cap) = cli.byte_cap {
        config.byte_cap = byte_cap;
    }
    if cli.no_compress {
        config.compress = false;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = load_config(&cli)?;
    let org_id = config
        .org_id
        .clone()
        .ok_or("missing org id (pass --org or set org_id in the config)")?;

    let query = match &cli.query {
        Some(query) => query.clone(),
        None => {
            let mut query = String::new();
            tokio::io::stdin().read_to_string(&mut query).await?;
            query
        }
    };
    if query.trim().is_empty() {
        return Err("query is empty".into());
    }

    let extern_script = match &cli.extern_file {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            Some(serde_json::from_str::<serde_json::Value>(&raw)?)
        }
        None => None,
    };

    let client = QueryClient::from_config(&config)?;
    let handle = client.run_query(&org_id, query, extern_script);

    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = handle.await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(result.text.as_bytes()).await?;
    stdout.flush().await?;

    if result.truncated {
        eprintln!(
            "output truncated: read {} bytes, byte cap is {}",
            result.bytes_read, config.byte_cap
        );
    } else {
        tracing::info!(bytes_read = result.bytes_read, "query complete");
    }
    Ok(())
}
