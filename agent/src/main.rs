//! RadarMap Agent - live map of radar-detected road users
//!
//! Loads a site descriptor, subscribes to a detector feed and publishes a
//! scene after every change:
//! - `--feed tcp://host:port` (newline-delimited JSON) or `--feed -` (stdin)
//! - `--output json` writes scene snapshots to stdout, one per line
//! - `--output log` logs them
//! - `--output rerun` draws them in the Rerun viewer (`visualization` feature)
//!
//! Ctrl-C stops the feed and the sweep timer and exits cleanly.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use radarmap_core::{AgentConfig, JsonLinesSink, LogSink, MapAgent, SceneSink, Site, StopReason};
use radarmap_env::{FeedEndpoint, MessageSource, StdinLineSource, TcpLineSource, TokioContext};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// JSON lines on stdout
    Json,
    /// tracing log lines
    Log,
    /// Rerun viewer
    Rerun,
}

/// RadarMap live map agent
#[derive(Parser, Debug)]
#[command(name = "radarmap-agent")]
#[command(about = "Place radar detections on the map and keep them fresh", long_about = None)]
struct Args {
    /// Site descriptor (JSON)
    #[arg(long)]
    site: PathBuf,

    /// Feed endpoint: tcp://host:port, host:port, or - for stdin
    #[arg(short, long, default_value = "tcp://127.0.0.1:9000")]
    feed: FeedEndpoint,

    /// Scene output
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputMode,

    /// Save the Rerun recording to this file instead of spawning the viewer
    #[arg(long)]
    rerun_save: Option<String>,

    /// Agent name used in logs
    #[arg(long, default_value = "radarmap-agent")]
    name: String,

    /// Sweep interval in milliseconds
    #[arg(long, default_value = "1000")]
    sweep_interval_ms: u64,

    /// Tracks unseen for longer than this are removed (milliseconds)
    #[arg(long, default_value = "3000")]
    track_timeout_ms: u64,

    /// H3 resolution for the spatial index
    #[arg(long, default_value = "11", value_parser = clap::value_parser!(u8).range(0..=15))]
    h3_resolution: u8,

    /// TCP connect timeout in milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries scene JSON
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let site = Site::load(&args.site)
        .with_context(|| format!("loading site {}", args.site.display()))?;
    info!(
        site = %args.site.display(),
        roads = site.roads.len(),
        lat = site.lat,
        lng = site.lng,
        "site loaded"
    );

    let config = AgentConfig {
        name: args.name.clone(),
        sweep_interval: Duration::from_millis(args.sweep_interval_ms),
        track_timeout: Duration::from_millis(args.track_timeout_ms),
        h3_resolution: args.h3_resolution,
    };
    if config.sweep_interval.is_zero() {
        bail!("--sweep-interval-ms must be positive");
    }

    let mut sink = build_sink(&args, &site)?;

    // Ctrl-C cancels the run loop
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => warn!("cannot listen for Ctrl-C: {}", e),
            }
            shutdown.cancel();
        });
    }

    let mut agent = MapAgent::new(TokioContext::shared(), site, config);

    let reason = match args.feed.tcp_addr() {
        Some(addr) => {
            let timeout = Duration::from_millis(args.connect_timeout_ms);
            let mut source = TcpLineSource::connect_timeout(addr, timeout)
                .await
                .with_context(|| format!("connecting to feed {}", args.feed))?;
            run_agent(&mut agent, &mut source, sink.as_mut(), shutdown).await
        }
        None => {
            let mut source = StdinLineSource::new();
            run_agent(&mut agent, &mut source, sink.as_mut(), shutdown).await
        }
    };

    match reason {
        StopReason::SourceError(e) => bail!("feed failed: {}", e),
        StopReason::SourceClosed | StopReason::Cancelled => Ok(()),
    }
}

async fn run_agent<S>(
    agent: &mut MapAgent<TokioContext>,
    source: &mut S,
    sink: &mut dyn SceneSink,
    shutdown: CancellationToken,
) -> StopReason
where
    S: MessageSource,
{
    let summary = agent.run(source, sink, shutdown).await;

    info!(
        reason = ?summary.reason,
        tracks = summary.tracks_at_exit,
        snapshots = summary.stats.snapshots_published,
        "agent finished"
    );
    if summary.stats.snapshots_failed > 0 {
        error!(failed = summary.stats.snapshots_failed, "some scene updates were not delivered");
    }

    summary.reason
}

fn build_sink(args: &Args, site: &Site) -> Result<Box<dyn SceneSink>> {
    match args.output {
        OutputMode::Json => Ok(Box::new(JsonLinesSink::new(std::io::stdout()))),
        OutputMode::Log => Ok(Box::new(LogSink)),
        OutputMode::Rerun => rerun_sink(args, site),
    }
}

#[cfg(feature = "visualization")]
fn rerun_sink(args: &Args, site: &Site) -> Result<Box<dyn SceneSink>> {
    use radarmap_core::RerunSink;

    let sink = match &args.rerun_save {
        Some(path) => RerunSink::new_to_file(&args.name, path, site.center()),
        None => RerunSink::new(&args.name, site.center()),
    }
    .context("starting Rerun")?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "visualization"))]
fn rerun_sink(_args: &Args, _site: &Site) -> Result<Box<dyn SceneSink>> {
    bail!("--output rerun requires the 'visualization' feature (cargo build --features visualization)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["radarmap-agent", "--site", "site.json"]).unwrap();
        assert_eq!(args.feed, FeedEndpoint::Tcp("127.0.0.1:9000".to_string()));
        assert_eq!(args.output, OutputMode::Json);
        assert_eq!(args.track_timeout_ms, 3000);
        assert_eq!(args.h3_resolution, 11);
    }

    #[test]
    fn test_args_stdin_feed_and_log_output() {
        let args = Args::try_parse_from([
            "radarmap-agent", "--site", "site.json", "--feed", "-", "--output", "log",
        ])
        .unwrap();
        assert_eq!(args.feed, FeedEndpoint::Stdin);
        assert_eq!(args.output, OutputMode::Log);
    }

    #[test]
    fn test_args_reject_bad_values() {
        assert!(Args::try_parse_from(["radarmap-agent", "--site", "s.json", "--feed", "nowhere"]).is_err());
        assert!(Args::try_parse_from(["radarmap-agent", "--site", "s.json", "--h3-resolution", "16"]).is_err());
        assert!(Args::try_parse_from(["radarmap-agent"]).is_err());
    }
}
