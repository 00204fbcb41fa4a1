use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use subject_rpc::{
    //
    create_memory_broker_with_hub,
    typed,
    Broker,
    CallContext,
    Code,
    Envelope,
    MemoryHub,
    PublishOptions,
    RequestOptions,
    Result,
    RetryConfig,
    RpcError,
    SubscribeOptions,
    Transport,
    TransportConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AddRequest {
    a: i32,
    b: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AddResponse {
    sum: i32,
}

/// One "process" attached to a shared private hub.
async fn connect(hub: &Arc<MemoryHub>, name: &str) -> Result<Transport> {
    // ---
    let config = TransportConfig::memory(name);
    let broker = create_memory_broker_with_hub(&config, hub.clone()).await?;
    Ok(Transport::new(broker, config))
}

fn quick(timeout_ms: u64) -> RequestOptions {
    RequestOptions::default().with_timeout(Duration::from_millis(timeout_ms))
}

fn echo(_ctx: CallContext, env: Envelope) -> impl Future<Output = Result<Option<Bytes>>> {
    async move { Ok::<_, RpcError>(Some(env.payload)) }
}

/// Empty successful reply.
fn ack() -> impl Future<Output = Result<Option<Bytes>>> {
    async { Ok::<Option<Bytes>, RpcError>(None) }
}

#[tokio::test]
async fn test_round_trip_preserves_payload_and_cause() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen_in_handler = seen.clone();
    server
        .subscribe(
            "test.Echo",
            move |ctx: CallContext, env: Envelope| {
                seen_in_handler.lock().unwrap().push(ctx.trace_id.clone());
                echo(ctx, env)
            },
            SubscribeOptions::default(),
        )
        .await?;

    let payload = Bytes::from_static(b"\x00\x01 arbitrary \xff bytes");
    let reply = client
        .request_bytes("test.Echo", payload.clone(), quick(1000))
        .await?;

    assert_eq!(reply.payload, payload);
    assert_eq!(seen.lock().unwrap().as_slice(), [reply.cause.clone()]);
    assert!(reply.effective_status().is_ok());

    server.close().await?;
    client.close().await
}

#[tokio::test]
async fn test_typed_request() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "math.Add",
            typed(|_ctx: CallContext, req: AddRequest| async move {
                Ok(AddResponse { sum: req.a + req.b })
            }),
            SubscribeOptions::default(),
        )
        .await?;

    let (reply, resp): (Envelope, AddResponse) = client
        .request_with_reply("math.Add", &AddRequest { a: 20, b: 3 }, quick(1000))
        .await?;
    assert_eq!(resp, AddResponse { sum: 23 });
    assert!(!reply.cause.is_empty());

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_request_without_subscriber_times_out() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = connect(&hub, "client").await?;

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let err = client
        .request_bytes("nobody.home", Bytes::new(), RequestOptions::default().with_timeout(timeout))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RpcError::Timeout), "unexpected error: {err:?}");
    assert!(err.is_transport());
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_millis(500), "took {elapsed:?}");

    client.close().await
}

#[tokio::test]
async fn test_handler_panic_is_isolated() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "test.Panic",
            typed(|_ctx: CallContext, req: AddRequest| async move {
                if req.b == 0 {
                    panic!("division by zero");
                }
                Ok(req.a / req.b)
            }),
            SubscribeOptions::default(),
        )
        .await?;
    server
        .subscribe("test.Echo", echo, SubscribeOptions::default())
        .await?;

    let err = client
        .request::<_, i32>("test.Panic", &AddRequest { a: 1, b: 0 }, quick(1000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::Unknown));
    assert!(err.to_string().contains("division by zero"), "{err}");

    // The same subscription keeps serving.
    let ok: i32 = client
        .request("test.Panic", &AddRequest { a: 9, b: 3 }, quick(1000))
        .await?;
    assert_eq!(ok, 3);

    // And so does everything else on the transport.
    let reply = client
        .request_bytes("test.Echo", Bytes::from_static(b"still alive"), quick(1000))
        .await?;
    assert_eq!(reply.payload, Bytes::from_static(b"still alive"));

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_queue_group_exclusivity() -> Result<()> {
    // ---
    const SERVERS: usize = 3;
    const MESSAGES: usize = 30;

    let hub = MemoryHub::new();
    let client = connect(&hub, "client").await?;

    let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..SERVERS).map(|_| AtomicUsize::new(0)).collect());
    let mut servers = Vec::new();
    for idx in 0..SERVERS {
        let server = connect(&hub, &format!("worker-{idx}")).await?;
        let counts = counts.clone();
        server
            .subscribe(
                "work.Do",
                move |_ctx: CallContext, _env: Envelope| {
                    counts[idx].fetch_add(1, Ordering::SeqCst);
                    ack()
                },
                SubscribeOptions::default().with_queue_group("workers"),
            )
            .await?;
        servers.push(server);
    }

    for _ in 0..MESSAGES {
        client
            .request_bytes("work.Do", Bytes::new(), quick(1000))
            .await?;
    }

    let per_server: Vec<usize> = counts.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(per_server.iter().sum::<usize>(), MESSAGES, "{per_server:?}");
    assert!(per_server.iter().all(|&n| n > 0), "{per_server:?}");

    for server in servers {
        server.close().await?;
    }
    client.close().await
}

#[tokio::test]
async fn test_broadcast_without_queue_group() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let publisher = connect(&hub, "publisher").await?;

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut listeners = Vec::new();
    for idx in 0..3 {
        let listener = connect(&hub, &format!("listener-{idx}")).await?;
        let delivered = delivered.clone();
        listener
            .subscribe(
                "events.Created",
                move |_ctx: CallContext, _env: Envelope| {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    ack()
                },
                SubscribeOptions::default(),
            )
            .await?;
        listeners.push(listener);
    }

    publisher
        .publish("events.Created", &"hello", PublishOptions::default())
        .await?;

    let deadline = Instant::now() + Duration::from_secs(1);
    while delivered.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 3);

    for listener in listeners {
        listener.close().await?;
    }
    publisher.close().await
}

#[tokio::test]
async fn test_publish_with_no_subscribers() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = connect(&hub, "lonely").await?;

    let started = Instant::now();
    let env = transport
        .publish(
            "nobody.listens",
            &AddRequest { a: 1, b: 2 },
            PublishOptions::default().with_cause("origin-id"),
        )
        .await?;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!env.id.is_empty());
    assert!(env.reply_to.is_empty());
    assert_eq!(env.cause, "origin-id");
    assert_eq!(env.subject, "nobody.listens");

    transport.close().await
}

#[tokio::test]
async fn test_publish_cause_reaches_handler() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = connect(&hub, "self").await?;

    let (tx, rx) = tokio::sync::oneshot::channel::<CallContext>();
    let tx = Mutex::new(Some(tx));
    transport
        .subscribe(
            "audit.Log",
            move |ctx: CallContext, _env: Envelope| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(ctx);
                }
                ack()
            },
            SubscribeOptions::default(),
        )
        .await?;

    let sent = transport
        .publish("audit.Log", &"entry", PublishOptions::default().with_cause("req-42"))
        .await?;

    let ctx = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("handler not called")
        .expect("sender dropped");
    assert_eq!(ctx.trace_id, sent.id);
    assert_eq!(ctx.cause.as_deref(), Some("req-42"));
    assert!(!ctx.expects_reply());

    transport.close().await
}

#[tokio::test]
async fn test_status_fidelity() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "test.Nope",
            |_ctx: CallContext, _env: Envelope| async move {
                Err::<Option<Bytes>, _>(RpcError::unimplemented("nope"))
            },
            SubscribeOptions::default(),
        )
        .await?;

    let err = client
        .request_bytes("test.Nope", Bytes::new(), quick(1000))
        .await
        .unwrap_err();

    match err {
        RpcError::Status(status) => {
            assert_eq!(status.code, Code::Unimplemented);
            assert_eq!(status.message, "nope");
        }
        other => panic!("expected status error, got {other:?}"),
    }

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_decode_failure_is_not_retried_or_answered() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    server
        .subscribe(
            "test.Count",
            move |_ctx: CallContext, _env: Envelope| {
                counter.fetch_add(1, Ordering::SeqCst);
                ack()
            },
            SubscribeOptions::default(),
        )
        .await?;

    // Not an envelope: dropped by the dispatcher, the caller just times out.
    let err = client
        .broker()
        .request("test.Count", Bytes::from_static(b"{not json"), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_legacy_error_field_is_understood() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let legacy = connect(&hub, "legacy").await?;
    let client = connect(&hub, "client").await?;

    // A peer that answers with the old framing: only a plain `error` string.
    let mut sub = legacy.broker().subscribe("old.Service", None).await?;
    let broker = legacy.broker().clone();
    tokio::spawn(async move {
        while let Some(raw) = sub.inbox.recv().await {
            let req = Envelope::unwrap(&raw).unwrap();
            let reply = serde_json::json!({
                "id": "legacy-reply",
                "cause": req.id,
                "error": "legacy failure",
            });
            let data = Bytes::from(serde_json::to_vec(&reply).unwrap());
            broker.publish(&req.reply_to, None, data).await.unwrap();
        }
    });

    let err = client
        .request_bytes("old.Service", Bytes::new(), quick(1000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::Unknown));
    assert_eq!(err.to_string(), "[Unknown] legacy failure");

    client.close().await?;
    legacy.close().await
}

#[tokio::test]
async fn test_malformed_reply_envelope_is_a_decode_error() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let peer = connect(&hub, "peer").await?;
    let client = connect(&hub, "client").await?;

    let mut sub = peer.broker().subscribe("broken.Service", None).await?;
    let broker = peer.broker().clone();
    tokio::spawn(async move {
        while let Some(raw) = sub.inbox.recv().await {
            let reply = raw.reply.clone().unwrap();
            let garbage = Bytes::from_static(b"\x00 not an envelope");
            broker.publish(&reply, None, garbage).await.unwrap();
        }
    });

    let err = client
        .request_bytes("broken.Service", Bytes::new(), quick(1000))
        .await
        .unwrap_err();
    assert!(err.is_decode(), "{err:?}");
    assert_eq!(err.code(), None);

    client.close().await?;
    peer.close().await
}

#[tokio::test]
async fn test_reply_payload_of_wrong_type_is_a_decode_error() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "test.Add",
            typed(|_ctx: CallContext, req: AddRequest| async move {
                Ok(format!("{}", req.a + req.b))
            }),
            SubscribeOptions::default(),
        )
        .await?;

    let err = client
        .request::<_, AddResponse>("test.Add", &AddRequest { a: 1, b: 2 }, quick(1000))
        .await
        .unwrap_err();
    assert!(err.is_decode(), "{err:?}");

    // The same reply read as the type actually sent decodes fine.
    let sum: String = client
        .request("test.Add", &AddRequest { a: 1, b: 2 }, quick(1000))
        .await?;
    assert_eq!(sum, "3");

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_failed_reply_mirrors_legacy_error() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "test.Missing",
            |_ctx: CallContext, _env: Envelope| async move {
                Err::<Option<Bytes>, _>(RpcError::not_found("missing"))
            },
            SubscribeOptions::default(),
        )
        .await?;

    let request = Envelope::wrap(Bytes::from_static(b"{}")).with_subject("test.Missing");
    let raw = client
        .broker()
        .request("test.Missing", request.encode()?, Duration::from_secs(1))
        .await?;

    let wire: serde_json::Value = serde_json::from_slice(&raw.data)?;
    assert_eq!(wire["cause"], request.id.as_str());
    assert_eq!(wire["status"]["code"], 5);
    assert_eq!(wire["status"]["message"], "missing");
    assert_eq!(wire["error"], "missing");
    assert!(wire.get("payload").is_none());

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_concurrent_dispatch() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    server
        .subscribe(
            "test.Slow",
            typed(|_ctx: CallContext, ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            }),
            SubscribeOptions::default(),
        )
        .await?;

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        client.request::<_, u64>("test.Slow", &300u64, quick(2000)),
        client.request::<_, u64>("test.Slow", &300u64, quick(2000)),
        client.request::<_, u64>("test.Slow", &10u64, quick(2000)),
    );
    assert_eq!((a?, b?, c?), (300, 300, 10));
    assert!(started.elapsed() < Duration::from_millis(600), "{:?}", started.elapsed());

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = connect(&hub, "closing").await?;

    transport
        .subscribe("a.One", echo, SubscribeOptions::default())
        .await?;
    transport
        .subscribe("a.Two", echo, SubscribeOptions::default().with_queue_group("g"))
        .await?;
    assert_eq!(transport.subscriptions().len(), 2);

    transport.close().await?;
    transport.close().await?;

    assert!(transport.subscriptions().is_empty());
    assert_eq!(hub.subscriber_count("a.One").await, 0);
    assert_eq!(hub.subscriber_count("a.Two").await, 0);

    let err = transport
        .publish("a.One", &1, PublishOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));

    let err = transport
        .subscribe("a.Three", echo, SubscribeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));
    Ok(())
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    let handle = server
        .subscribe("test.Echo", echo, SubscribeOptions::default())
        .await?;
    client
        .request_bytes("test.Echo", Bytes::new(), quick(1000))
        .await?;

    server.unsubscribe(&handle).await?;
    assert!(server.subscriptions().is_empty());

    let err = client
        .request_bytes("test.Echo", Bytes::new(), quick(100))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout));

    client.close().await?;
    server.close().await
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        multiplier: 1.5,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_caller_retry_recovers_from_timeouts() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "late-server").await?;
    let client = connect(&hub, "client").await?;

    // The server comes up after the first attempts have already timed out.
    let late = server.clone();
    let starter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        late.subscribe(
            "test.Late",
            typed(|_ctx: CallContext, n: i32| async move { Ok(n * 2) }),
            SubscribeOptions::default(),
        )
        .await
    });

    let opts = quick(60).with_retry(fast_retry(10));
    let doubled: i32 = client.request("test.Late", &21, opts).await?;
    assert_eq!(doubled, 42);

    starter.await.expect("starter task panicked")?;
    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_status_errors_are_never_retried() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await?;
    let client = connect(&hub, "client").await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    server
        .subscribe(
            "test.Reject",
            move |_ctx: CallContext, _env: Envelope| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<Option<Bytes>, _>(RpcError::invalid_argument("bad input")) }
            },
            SubscribeOptions::default(),
        )
        .await?;

    let opts = quick(500).with_retry(fast_retry(5));
    let err = client
        .request_bytes("test.Reject", Bytes::new(), opts)
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(Code::InvalidArgument));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.close().await?;
    server.close().await
}

#[tokio::test]
async fn test_without_retry_a_timeout_is_final() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = connect(&hub, "client").await?;

    let started = Instant::now();
    let err = client
        .request_bytes("nobody.home", Bytes::new(), quick(80))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(400));

    client.close().await
}
