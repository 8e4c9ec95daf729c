use std::sync::Arc;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {finmux_config::Settings, finmux_gateway::GatewayContext};

#[derive(Parser)]
#[command(name = "finmux", about = "finmux — multi-provider financial data gateway")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Overall deadline for one tool call, milliseconds.
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading any configuration.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr: stdout carries the JSON-RPC stream.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut settings = Settings::from_env();
    if let Some(deadline_ms) = cli.request_timeout_ms {
        settings.request_deadline_ms = deadline_ms;
    }

    let ctx = Arc::new(GatewayContext::new(settings));
    info!(version = env!("CARGO_PKG_VERSION"), "starting finmux gateway");
    finmux_gateway::serve_stdio(ctx).await?;
    Ok(())
}
