use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use snippet_runner::config::{get_config, init_config, RunnerConfig};
use snippet_runner::jobs::Invoker;
use snippet_runner::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snippet_runner=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    init_config(RunnerConfig::load()?)?;
    let config = get_config();
    info!(
        "Runner config: interpreter={:?}, timeout_ms={}, output_dir={:?}, files_format={:?}",
        config.interpreter, config.timeout_ms, config.output_dir, config.files_format
    );

    let invoker = Invoker::new(config.clone());

    match std::env::args().nth(1).as_deref() {
        // One event on stdin, one response envelope on stdout
        Some("invoke") => invoke_once(&invoker).await,
        Some(other) => anyhow::bail!("Unknown command: {} (expected `invoke` or nothing)", other),
        None => {
            info!("Starting Snippet Runner...");
            server::serve(config.bind_addr, invoker).await
        }
    }
}

async fn invoke_once(invoker: &Invoker) -> Result<()> {
    let mut payload = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut payload)
        .await
        .context("Failed to read event from stdin")?;

    let response = invoker.handle_bytes(&payload).await;
    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
