//! Starts a host on the in-memory broker, serves `get-widget`, and makes one
//! call against it.

use std::sync::Arc;

use clap::Parser;
use queuecall_core::Route;
use queuecall_server::host::{HostConfig, ServiceHost};
use queuecall_server::telemetry::{init_tracing, LogFormat};
use queuecall_server::{
    handler_fn, BrokerConfig, ClientConfig, InMemoryBroker, ReadinessPolicy, Responder,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct WidgetQuery {
    id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Widget {
    id: u32,
    name: String,
}

const GET_WIDGET: Route<WidgetQuery, Widget> = Route::new("get-widget");

#[derive(Debug, Parser)]
#[command(name = "queuecall-demo", about = "Request/reply over routing keys, end to end")]
struct Args {
    /// Maximum wait on the readiness barrier per call.
    #[arg(long, env = "QUEUECALL_READINESS_TIMEOUT_MS", default_value_t = 30_000)]
    readiness_timeout_ms: u64,

    /// Maximum wait for a reply per call.
    #[arg(long, env = "QUEUECALL_REPLY_TIMEOUT_MS", default_value_t = 30_000)]
    reply_timeout_ms: u64,

    /// Reject calls instead of proceeding when the barrier stays closed.
    #[arg(long, env = "QUEUECALL_FAIL_FAST")]
    fail_fast: bool,

    #[arg(long, env = "QUEUECALL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Widget id to look up.
    #[arg(long, default_value_t = 42)]
    id: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = HostConfig {
        client: ClientConfig {
            readiness_timeout_ms: args.readiness_timeout_ms,
            reply_timeout_ms: args.reply_timeout_ms,
            readiness_policy: if args.fail_fast {
                ReadinessPolicy::FailFast
            } else {
                ReadinessPolicy::Degrade
            },
            ..ClientConfig::default()
        },
        ..HostConfig::default()
    };

    let broker = Arc::new(InMemoryBroker::new(BrokerConfig::default()));
    let host = ServiceHost::new(broker.clone(), config);
    host.register(
        Responder::builder("widgets")
            .route(
                &GET_WIDGET,
                handler_fn(|query: Option<WidgetQuery>, _ctx| async move {
                    Ok(query.map(|q| Widget {
                        id: q.id,
                        name: "Widget".to_string(),
                    }))
                }),
            )
            .build()?,
    )?;
    host.start().await?;

    let widget = host
        .client()
        .call_route(&GET_WIDGET, None, Some(WidgetQuery { id: args.id }))
        .await?;
    info!(?widget, "call returned");

    println!("{}", serde_json::to_string_pretty(&widget)?);
    println!("{}", serde_json::to_string_pretty(&host.health())?);

    host.shutdown(false).await?;
    broker.close();
    Ok(())
}
