//! Sum service over the in-process memory broker.
//!
//! Starts two server instances in one queue group, sends a handful of calls
//! through a [`ServiceClient`], shows an unimplemented method coming back as a
//! status error, then shuts the servers down.
//!
//! Run with: cargo run --example sum_memory
//! Set `RUST_LOG=subject_rpc=debug` to watch the dispatch path.

use serde::{Deserialize, Serialize};
use subject_rpc::{
    //
    shutdown_signal,
    CallContext,
    Code,
    Result,
    ServiceClient,
    ServiceDef,
    ServiceServer,
    SubscribeOptions,
    TransportBuilder,
};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct SumRequest {
    values: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SumResponse {
    sum: i64,
    served_by: String,
}

fn definition() -> ServiceDef {
    ServiceDef::new("example", "Math")
        .with_method("Sum", "SumRequest", "SumResponse")
        .with_method("Product", "SumRequest", "SumResponse")
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_ansi(false)
        .init();

    let transport = TransportBuilder::new()
        .name("sum-demo")
        .transport_type("memory")
        .build()
        .await?;

    let mut stops = Vec::new();
    let mut servers = Vec::new();
    for instance in ["alpha", "beta"] {
        let mut server = ServiceServer::new(transport.clone(), definition());
        server.handle("Sum", move |ctx: CallContext, req: SumRequest| async move {
            println!("  [{instance}] trace_id={} values={:?}", ctx.trace_id, req.values);
            Ok(SumResponse {
                sum: req.values.iter().sum(),
                served_by: instance.to_string(),
            })
        })?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        stops.push(stop_tx);
        servers.push(tokio::spawn(async move {
            let shutdown = async move {
                tokio::select! {
                    _ = stop_rx => {}
                    _ = shutdown_signal() => {}
                }
            };
            server.serve(SubscribeOptions::default(), shutdown).await
        }));
    }

    // Let both servers subscribe before calling.
    while transport.subscriptions().len() < 4 {
        tokio::task::yield_now().await;
    }

    let client = ServiceClient::new(transport.clone(), definition());
    for n in 1..=4 {
        let values: Vec<i64> = (1..=n).collect();
        let resp: SumResponse = client.call("Sum", &SumRequest { values }).await?;
        println!("sum(1..={n}) = {} (served by {})", resp.sum, resp.served_by);
    }

    match client
        .call::<_, SumResponse>("Product", &SumRequest { values: vec![2, 3] })
        .await
    {
        Err(err) if err.code() == Some(Code::Unimplemented) => println!("Product: {err}"),
        other => println!("Product: unexpected outcome {other:?}"),
    }

    for stop in stops {
        let _ = stop.send(());
    }
    for server in servers {
        if let Ok(Err(err)) = server.await {
            eprintln!("server error: {err}");
        }
    }

    transport.close().await
}
