//! interop - decode, validate, export and stream tactical messages
//!
//! ```text
//! interop parse track.xml
//! interop export a.vmf b.xml --format csv -o out.csv
//! interop pcap capture.pcapng --format ndjson
//! interop sample vmf --lat 38.8977 --lon -77.0365 -o track.vmf
//! interop publish a.vmf b.xml --continuous
//! interop subscribe --topics cot --count 10
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use interop::sample::SampleSpec;
use interop::{
    AppConfig, BatchOutcome, CancellationToken, CanonicalMessage, Capture, Engine, ExportFormat,
    SourceFormat, TopicFilter, ValidatedMessage,
};
use interop_core::config::{LogFormat, LoggingConfig};
use interop_stream::{TcpPublisher, TcpSubscription};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Tactical message normalization engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "INTEROP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode and validate one payload file, printing the canonical message
    Parse {
        input: PathBuf,

        /// Input format (detected from the payload signature if omitted)
        #[arg(long)]
        source: Option<SourceFormat>,
    },

    /// Decode and validate payload files, then export them as one batch
    Export {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        source: Option<SourceFormat>,

        /// Output format (defaults to `export.format` from configuration)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract messages from a .pcap or .pcapng capture
    Pcap {
        input: PathBuf,

        #[arg(short, long)]
        format: Option<ExportFormat>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit with a non-zero code if any frame failed to decode or validate
        #[arg(long)]
        strict: bool,
    },

    /// Generate a sample payload
    Sample {
        #[arg(value_enum)]
        kind: SampleKind,

        #[arg(long)]
        uid: Option<String>,

        #[arg(long, default_value = "38.7")]
        lat: f64,

        #[arg(long, default_value = "-77.2")]
        lon: f64,

        /// Altitude in meters
        #[arg(long, default_value = "0.0")]
        alt: f64,

        /// VMF message type code
        #[arg(long, default_value = "42")]
        msg_type: u16,

        #[arg(long)]
        callsign: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve payload files to TCP subscribers
    Publish {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        source: Option<SourceFormat>,

        /// Listen address (defaults to `stream.bind_addr`)
        #[arg(long)]
        bind: Option<String>,

        /// Delay between messages in milliseconds (defaults to `stream.publish_delay_ms`)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Keep cycling through the inputs until interrupted
        #[arg(long)]
        continuous: bool,

        /// Wait for this many subscribers before publishing
        #[arg(long, default_value = "0")]
        wait_for: usize,
    },

    /// Receive messages from a TCP publisher and print them as NDJSON
    Subscribe {
        /// Publisher address (defaults to `stream.connect_addr`)
        #[arg(long)]
        connect: Option<String>,

        /// Comma-separated topics (`cot`, `vmf`); everything if omitted
        #[arg(long, default_value = "")]
        topics: TopicFilter,

        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,

        /// Receive timeout in milliseconds (defaults to `stream.receive_timeout_ms`)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SampleKind {
    Vmf,
    Cot,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "interop={0},interop_core={0},interop_codec={0},interop_export={0},interop_stream={0}",
                logging.level
            ))
        });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read payload file: {}", path.display()))
}

fn decode_file(
    engine: &Engine,
    path: &Path,
    source: Option<SourceFormat>,
) -> Result<CanonicalMessage> {
    let bytes = read_payload(path)?;
    let message = match source {
        Some(format) => engine.decode(&bytes, format),
        None => engine.decode_detected(&bytes).map(|(_, message)| message),
    };
    message.with_context(|| format!("Failed to decode {}", path.display()))
}

fn ingest_files(
    engine: &Engine,
    inputs: &[PathBuf],
    source: Option<SourceFormat>,
) -> Result<Vec<ValidatedMessage>> {
    inputs
        .iter()
        .map(|path| {
            let candidate = decode_file(engine, path, source)?;
            engine
                .validate(candidate)
                .with_context(|| format!("Validation failed for {}", path.display()))
        })
        .collect()
}

fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, bytes)
            .with_context(|| format!("Failed to write output file: {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}

fn export_format(engine: &Engine, format: Option<ExportFormat>) -> Result<ExportFormat> {
    match format {
        Some(format) => Ok(format),
        None => engine
            .default_export_format()
            .context("Invalid export.format in configuration"),
    }
}

fn report_failures(outcome: &BatchOutcome) {
    for failure in &outcome.failures {
        warn!(frame = failure.index, kind = failure.kind, error = %failure.error, "Frame rejected");
    }
    info!(
        total = outcome.total(),
        accepted = outcome.accepted.len(),
        failed = outcome.failures.len(),
        skipped = outcome.skipped,
        "Extraction finished"
    );
}

fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            cancel.cancel();
        }
    });
}

async fn publish(
    engine: &Engine,
    messages: Vec<CanonicalMessage>,
    bind: String,
    delay: Duration,
    continuous: bool,
    wait_for: usize,
) -> Result<()> {
    let server = TcpPublisher::bind(bind.as_str(), engine.publisher().clone())
        .await
        .with_context(|| format!("Failed to bind publisher to {bind}"))?;
    let addr = server.local_addr()?;
    info!(%addr, messages = messages.len(), continuous, "Publishing");

    let cancel = CancellationToken::new();
    shutdown_on_ctrl_c(cancel.clone());
    let server_task = tokio::spawn(server.serve(cancel.clone()));

    while engine.publisher().subscriber_count() < wait_for {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }

    let summary = if continuous {
        engine
            .publisher()
            .publish_continuous(&messages, delay, &cancel)
            .await
    } else {
        engine.publisher().publish_all(&messages, delay, &cancel).await
    };
    info!(
        published = summary.published,
        rejected = summary.rejected,
        cancelled = summary.cancelled,
        "Publishing finished"
    );

    cancel.cancel();
    server_task.await.context("Publisher task panicked")??;
    Ok(())
}

async fn subscribe(
    engine: &Engine,
    connect: String,
    topics: TopicFilter,
    count: Option<usize>,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut subscription =
        TcpSubscription::connect(connect.as_str(), topics, engine.validator().clone())
            .await
            .with_context(|| format!("Failed to connect to {connect}"))?;
    info!(addr = %connect, filter = %subscription.filter(), "Subscribed");

    let cancel = CancellationToken::new();
    shutdown_on_ctrl_c(cancel.clone());

    let mut received = 0usize;
    while count.map_or(true, |limit| received < limit) {
        let next = async {
            match timeout {
                Some(timeout) => subscription.recv_timeout(timeout).await.map(Some),
                None => subscription.recv().await,
            }
        };
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = next => message?,
        };
        let Some(message) = message else {
            info!("Publisher closed the connection");
            break;
        };

        let bytes = engine.export(std::slice::from_ref(&message), ExportFormat::Ndjson)?;
        write_output(&bytes, None)?;
        received += 1;
    }

    info!(received, stats = ?subscription.stats(), "Subscription finished");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_config_builder(cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    let engine = Engine::new(config).context("Failed to initialize engine")?;

    match cli.command {
        Commands::Parse { input, source } => {
            let candidate = decode_file(&engine, &input, source)?;
            let message = engine
                .validate(candidate)
                .with_context(|| format!("Validation failed for {}", input.display()))?;
            let json = serde_json::to_string_pretty(&message)
                .context("Failed to serialize message")?;
            write_output(format!("{json}\n").as_bytes(), None)
        }

        Commands::Export {
            inputs,
            source,
            format,
            output,
        } => {
            let format = export_format(&engine, format)?;
            let messages = ingest_files(&engine, &inputs, source)?;
            match output {
                Some(path) => engine.export_to_path(&messages, format, &path)?,
                None => write_output(&engine.export(&messages, format)?, None)?,
            }
            Ok(())
        }

        Commands::Pcap {
            input,
            format,
            output,
            strict,
        } => {
            let format = export_format(&engine, format)?;
            let capture = Capture::from_path(&input)
                .with_context(|| format!("Failed to read capture: {}", input.display()))?;
            let outcome = engine.ingest_capture(&capture);
            report_failures(&outcome);

            match output {
                Some(path) => engine.export_to_path(&outcome.accepted, format, &path)?,
                None => write_output(&engine.export(&outcome.accepted, format)?, None)?,
            }

            if strict && !outcome.failures.is_empty() {
                return Err(anyhow!(
                    "{} frame(s) failed to decode or validate",
                    outcome.failures.len()
                ));
            }
            Ok(())
        }

        Commands::Sample {
            kind,
            uid,
            lat,
            lon,
            alt,
            msg_type,
            callsign,
            output,
        } => {
            let spec = SampleSpec {
                uid,
                latitude: lat,
                longitude: lon,
                altitude: alt,
                msg_type,
                callsign,
                timestamp: None,
            };
            let bytes = match kind {
                SampleKind::Vmf => spec.vmf_bytes().context("Failed to encode VMF sample")?,
                SampleKind::Cot => spec.cot_xml().into_bytes(),
            };
            write_output(&bytes, output.as_deref())
        }

        Commands::Publish {
            inputs,
            source,
            bind,
            delay_ms,
            continuous,
            wait_for,
        } => {
            let messages = inputs
                .iter()
                .map(|path| decode_file(&engine, path, source))
                .collect::<Result<Vec<_>>>()?;
            let stream = &engine.config().stream;
            let bind = bind.unwrap_or_else(|| stream.bind_addr.clone());
            let delay = delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| stream.publish_delay());
            publish(&engine, messages, bind, delay, continuous, wait_for).await
        }

        Commands::Subscribe {
            connect,
            topics,
            count,
            timeout_ms,
        } => {
            let stream = &engine.config().stream;
            let connect = connect.unwrap_or_else(|| stream.connect_addr.clone());
            let timeout = match timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => stream.receive_timeout(),
            };
            subscribe(&engine, connect, topics, count, timeout).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
