use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use doubao_tts::client::{AudioSink, DoubaoTTS, FileAudioSink};
use doubao_tts::config::TtsClientConfig;
use doubao_tts::protocol::{FrontendListener, FrontendMessage, Operation};

/// Doubao TTS - command line client for the binary websocket synthesis API
#[derive(Parser, Debug)]
#[command(name = "doubao-tts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Streaming synthesis; audio is written as chunks arrive
    Submit(SynthesisArgs),

    /// Single-response synthesis
    Query(SynthesisArgs),
}

#[derive(Args, Debug)]
struct SynthesisArgs {
    /// Text to synthesize
    #[arg(short = 't', long = "text")]
    text: String,

    /// Voice type, overriding the configured one
    #[arg(short = 'v', long = "voice")]
    voice: Option<String>,

    /// Output audio file (defaults to output.<encoding>)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Give up on the whole exchange after this many seconds
    #[arg(long = "timeout", default_value_t = 60)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Must happen before the first wss:// connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        TtsClientConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        TtsClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let (operation, args) = match cli.command {
        Commands::Submit(args) => (Operation::Submit, args),
        Commands::Query(args) => (Operation::Query, args),
    };

    if let Some(voice) = args.voice {
        config.voice_type = voice;
    }
    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("output.{}", config.encoding.file_extension())));

    let listener: FrontendListener = Arc::new(|message: &FrontendMessage| match message.json() {
        Ok(value) => debug!("Frontend message: {}", value),
        Err(_) => debug!("Frontend message: {}", message.text()),
    });
    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing connection");
            ctrl_c_shutdown.cancel();
        }
    });

    let client = DoubaoTTS::new(config)?
        .with_frontend_listener(listener)
        .with_shutdown(shutdown);
    // Nothing is written to disk until the first audio chunk arrives
    let mut sink = FileAudioSink::new(&output_path);

    let exchange = async {
        match operation {
            Operation::Submit => client.submit(&args.text, &mut sink).await,
            Operation::Query => client.query(&args.text, &mut sink).await,
        }
    };
    let outcome = tokio::time::timeout(Duration::from_secs(args.timeout), exchange).await;
    let output = match outcome {
        Ok(result) => result?,
        Err(_) => {
            // The exchange was dropped mid-stream, so discard its partial output here
            if let Err(e) = sink.abort().await {
                warn!("Failed to remove {}: {}", output_path.display(), e);
            }
            return Err(anyhow!("{} timed out after {}s", operation, args.timeout));
        }
    };

    println!(
        "Wrote {} bytes ({} chunks) to {} [request {}]",
        output.audio.len(),
        output.chunks,
        output_path.display(),
        output.request_id
    );
    Ok(())
}
