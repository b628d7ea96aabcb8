//! rechnungswerk server binary.
//!
//! Serves the settings, firm data and processing API on one port.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rechnungswerk::config::ConfigStore;
use rechnungswerk::extract::{ExtractorConfig, LlamaServerConfig, LlamaServerLoader};
use rechnungswerk::pipeline::{JobOrchestrator, PipelineConfig};
use rechnungswerk::server::{AppState, router};
use rechnungswerk::zugferd::{PackagerConfig, ZugferdProfile};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rechnungswerk")]
#[command(version, about = "Turns invoice documents into XRechnung and ZUGFeRD e-invoices")]
struct Args {
    /// Bind address
    #[arg(long, env = "RECHNUNGSWERK_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "RECHNUNGSWERK_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory holding einstellungen.json and firmendaten.json
    #[arg(long, env = "RECHNUNGSWERK_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Job directories are created below this directory
    #[arg(long, env = "RECHNUNGSWERK_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// TrueType font embedded into generated PDFs
    #[arg(long, env = "RECHNUNGSWERK_FONT")]
    font: Option<PathBuf>,

    /// Profile of the CII XML embedded in the PDF
    #[arg(long, env = "RECHNUNGSWERK_ZUGFERD_PROFILE", default_value = "en16931")]
    zugferd_profile: ZugferdProfile,

    /// llama-server executable
    #[arg(long, env = "RECHNUNGSWERK_LLAMA_SERVER", default_value = "llama-server")]
    llama_server: PathBuf,

    #[arg(long, env = "RECHNUNGSWERK_LLAMA_PORT", default_value_t = 7001)]
    llama_port: u16,

    #[arg(long, env = "RECHNUNGSWERK_LLAMA_CTX_SIZE", default_value_t = 8192)]
    llama_ctx_size: u32,

    /// Seconds until a freshly started llama-server must answer
    #[arg(long, env = "RECHNUNGSWERK_LLAMA_STARTUP_SECS", default_value_t = 120)]
    llama_startup_secs: u64,

    /// Seconds allowed for queueing plus inference per document
    #[arg(long, env = "RECHNUNGSWERK_EXTRACTION_TIMEOUT_SECS", default_value_t = 300)]
    extraction_timeout_secs: u64,

    /// Confidence below which a job carries a warning
    #[arg(long, env = "RECHNUNGSWERK_MIN_CONFIDENCE", default_value_t = 0.5)]
    min_confidence: f32,

    /// Largest accepted upload in MiB
    #[arg(long, env = "RECHNUNGSWERK_MAX_DOCUMENT_MB", default_value_t = 20)]
    max_document_mb: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rechnungswerk=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let store = ConfigStore::load(&args.data_dir)
        .await
        .with_context(|| format!("loading configuration from {}", args.data_dir.display()))?;
    let store = Arc::new(store);

    let loader = LlamaServerLoader::new(LlamaServerConfig {
        binary: args.llama_server.clone(),
        port: args.llama_port,
        ctx_size: args.llama_ctx_size,
        startup_timeout: Duration::from_secs(args.llama_startup_secs),
        ..LlamaServerConfig::default()
    });

    let config = PipelineConfig {
        output_root: args.output_dir.clone(),
        extractor: ExtractorConfig {
            max_document_bytes: args.max_document_mb * 1024 * 1024,
            timeout: Duration::from_secs(args.extraction_timeout_secs),
            min_confidence: args.min_confidence,
        },
        packager: PackagerConfig {
            font_path: args.font.clone(),
            profile: args.zugferd_profile,
        },
    };
    tokio::fs::create_dir_all(&config.output_root)
        .await
        .with_context(|| format!("creating {}", config.output_root.display()))?;

    let orchestrator = Arc::new(JobOrchestrator::new(config, store, Arc::new(loader)));
    let app = router(Arc::new(AppState::new(orchestrator)));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    info!(
        "Starting rechnungswerk v{} on http://{}",
        env!("CARGO_PKG_VERSION"),
        addr
    );
    info!(data = %args.data_dir.display(), output = %args.output_dir.display(), "directories");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
