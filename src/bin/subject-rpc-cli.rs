//! Command-line client: call one method and print the JSON reply.
//!
//! ```text
//! subject-rpc-cli example.Add '{"a": 2, "b": 3}' --broker nats://127.0.0.1:4222
//! ```
//!
//! Logs go to stderr and are controlled by `RUST_LOG`.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use subject_rpc::{Result, TransportBuilder};

/// Call a subject-rpc method and print the JSON reply
#[derive(Parser, Debug)]
#[command(name = "subject-rpc-cli")]
#[command(version, about = "Call a subject-rpc method and print the JSON reply")]
struct Args {
    /// Method topic to call, e.g. `example.Add`
    subject: String,

    /// JSON request body
    #[arg(default_value = "{}")]
    body: String,

    /// Broker address
    #[arg(long, env = "BROKER_URI", default_value = "nats://127.0.0.1:4222")]
    broker: String,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Broker type override (`memory`, `nats`)
    #[arg(long)]
    transport: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(reply) => {
            println!("{reply}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("rpc error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<String> {
    // ---
    let body: Value = serde_json::from_str(&args.body)?;

    let mut builder = TransportBuilder::new()
        .uri(args.broker)
        .name("subject-rpc-cli")
        .request_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(transport) = args.transport {
        builder = builder.transport_type(transport);
    }
    let transport = builder.build().await?;

    let outcome = transport
        .request::<Value, Value>(&args.subject, &body, transport.request_options())
        .await;
    transport.close().await?;

    Ok(serde_json::to_string_pretty(&outcome?)?)
}
