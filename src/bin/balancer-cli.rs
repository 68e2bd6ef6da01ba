use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Management CLI for the backend balancer", long_about = None)]
struct Cli {
    #[arg(short, long, env = "BALANCER_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "BALANCER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Balancer status and headline counts
    Status,
    /// Health of every registered server
    Stats,
    /// Show one server
    Server { id: String },
    /// Show which server a session is routed to
    Route { session: String },
    /// Register a server
    Add {
        id: String,
        host: String,
        port: u16,
        #[arg(short, long, default_value_t = 1)]
        weight: u32,
        /// Metadata as key=value, repeatable
        #[arg(short, long, value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },
    /// Remove a server and its sticky bindings
    Remove { id: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');
    let call = |method: Method, path: String| client.request(method, format!("{}{}", base, path));

    let request: RequestBuilder = match cli.command {
        Commands::Status => call(Method::GET, "/admin/status".into()),
        Commands::Stats => call(Method::GET, "/admin/stats".into()),
        Commands::Server { id } => call(Method::GET, format!("/admin/servers/{}", id)),
        Commands::Route { session } => call(Method::GET, format!("/admin/route/{}", session)),
        Commands::Add {
            id,
            host,
            port,
            weight,
            meta,
        } => {
            let metadata: BTreeMap<String, String> = meta.into_iter().collect();
            call(Method::POST, "/admin/servers".into()).json(&json!({
                "id": id,
                "host": host,
                "port": port,
                "weight": weight,
                "metadata": metadata,
            }))
        }
        Commands::Remove { id } => call(Method::DELETE, format!("/admin/servers/{}", id)),
    };

    let ok = print_response(request.send().await?).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(true)
}
