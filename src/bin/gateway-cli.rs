use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the service gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway and backend health
    Health,
    /// Dump the service registry
    Registry,
    /// Show circuit breaker states
    Breakers,
    /// Register a backend
    Register {
        name: String,
        url: String,
        /// Metadata entries as key=value
        #[arg(short, long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// Remove a backend from the registry
    Unregister { name: String },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Registry => client.get(format!("{}/registry", base)).send().await?,
        Commands::Breakers => client.get(format!("{}/admin/breakers", base)).send().await?,
        Commands::Register { name, url, metadata } => {
            let metadata: Map<String, Value> = metadata
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            client
                .post(format!("{}/registry", base))
                .json(&json!({ "name": name, "url": url, "metadata": metadata }))
                .send()
                .await?
        }
        Commands::Unregister { name } => {
            client.delete(format!("{}/registry/{}", base, name)).send().await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    // /health answers 503 with a useful body when a backend is down.
    if !status.is_success() {
        eprintln!("Gateway returned status {}", status);
    }
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
