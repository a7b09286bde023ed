use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every block in index order
    Chain,
    /// Print the height and hash of the chain head
    Head,
    /// Ask the node to run its integrity checker
    Verify,
    /// Mine and append a block
    Append {
        /// Payload as a JSON object, e.g. '{"amount": 5}'
        #[arg(long)]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();

    let res = match cli.cmd {
        Command::Chain => client.get(format!("{node}/api/blockchain")).send().await?,
        Command::Head => client.get(format!("{node}/chain/head")).send().await?,
        Command::Verify => {
            client
                .get(format!("{node}/api/blockchain/verify"))
                .send()
                .await?
        }
        Command::Append { payload } => {
            let payload = parse_payload(&payload)?;
            client
                .post(format!("{node}/api/blockchain/add"))
                .json(&payload)
                .send()
                .await?
        }
    };
    print_response(res).await
}

fn parse_payload(raw: &str) -> Result<Value> {
    let payload: Value = serde_json::from_str(raw).context("payload is not valid JSON")?;
    anyhow::ensure!(payload.is_object(), "payload must be a JSON object");
    Ok(payload)
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    debug!(%status, bytes = body.len(), "node replied");
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
