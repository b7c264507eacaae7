use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use netmux::config::EngineConfig;
use netmux::{
    Configuration, Engine, Headers, LogLevel, PlatformAdapter, PlatformContext, StreamError,
    StreamEvent, StreamId,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "netmux_cli", about = "Drive the netmux engine from the command line")]
struct Cli {
    /// JSON configuration file (defaults to assets/netmux.json, then built-in values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Engine log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send requests through the loopback transport and print every event
    Request {
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value = "/")]
        path: String,
        /// Request body; omitted for a headers-only request
        #[arg(long)]
        body: Option<String>,
        /// Extra request header as name=value
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Ask the loopback transport to fail: timeout, reset, or connection
        #[arg(long)]
        fail: Option<String>,
    },
    /// Record a counter and print the flushed snapshot
    Counter {
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Print the effective configuration
    Config,
    /// Run the engine with the debug HTTP server until interrupted
    #[cfg(feature = "debug_http")]
    Serve,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Request {
            count,
            path,
            body,
            headers,
            fail,
        } => {
            let adapter = start_engine(cli.config.as_deref(), cli.log_level)?;
            run_requests(&adapter, count, &path, body, headers, fail)
        }
        Commands::Counter { name, count } => {
            let adapter = start_engine(cli.config.as_deref(), cli.log_level)?;
            run_counter(&adapter, &name, count)
        }
        Commands::Config => run_config(cli.config.as_deref()),
        #[cfg(feature = "debug_http")]
        Commands::Serve => {
            let adapter = start_engine(cli.config.as_deref(), cli.log_level)?;
            run_serve(adapter)
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

fn configuration(path: Option<&Path>) -> Result<Configuration> {
    match path {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(Configuration::text(text))
        }
        None => Ok(Configuration::from(EngineConfig::load())),
    }
}

fn start_engine(config: Option<&Path>, log_level: LogLevel) -> Result<PlatformAdapter> {
    let adapter = PlatformAdapter::new(PlatformContext::new("netmux_cli"))
        .context("platform preconditions")?;
    adapter
        .run(configuration(config)?, log_level, None)
        .context("starting engine")?;
    Ok(adapter)
}

#[derive(Serialize)]
struct EventLine<'a> {
    stream_id: StreamId,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a StreamError>,
}

impl<'a> EventLine<'a> {
    fn new(stream_id: StreamId, event: &'a StreamEvent) -> Self {
        let mut line = EventLine {
            stream_id,
            event: "",
            headers: None,
            body: None,
            end_stream: None,
            error: None,
        };
        match event {
            StreamEvent::Headers {
                headers,
                end_stream,
            } => {
                line.event = "headers";
                line.headers = Some(headers);
                line.end_stream = Some(*end_stream);
            }
            StreamEvent::Data { data, end_stream } => {
                line.event = "data";
                line.body = Some(String::from_utf8_lossy(data).into_owned());
                line.end_stream = Some(*end_stream);
            }
            StreamEvent::Trailers(trailers) => {
                line.event = "trailers";
                line.headers = Some(trailers);
            }
            StreamEvent::Error(err) => {
                line.event = "error";
                line.error = Some(err);
            }
            StreamEvent::Cancel => line.event = "cancel",
            StreamEvent::Complete => line.event = "complete",
        }
        line
    }
}

fn run_requests(
    adapter: &PlatformAdapter,
    count: usize,
    path: &str,
    body: Option<String>,
    extra_headers: Vec<(String, String)>,
    fail: Option<String>,
) -> Result<ExitCode> {
    let mut headers = Headers::new()
        .with(":method", if body.is_some() { "POST" } else { "GET" })
        .with(":path", path);
    for (name, value) in &extra_headers {
        headers.insert(name, value.as_str());
    }
    if let Some(kind) = fail {
        headers.insert("x-loopback-fail", kind);
    }

    let mut pending = Vec::with_capacity(count);
    for _ in 0..count {
        let (handle, events) = adapter.core().open_stream()?;
        handle.send_headers(headers.clone(), body.is_none())?;
        if let Some(body) = &body {
            handle.send_data(body.clone().into_bytes(), true)?;
        }
        pending.push((handle, events));
    }

    let mut failures = 0;
    for (handle, mut events) in pending {
        while let Some(event) = events.blocking_recv() {
            if matches!(event, StreamEvent::Error(_) | StreamEvent::Cancel) {
                failures += 1;
            }
            println!("{}", serde_json::to_string(&EventLine::new(handle.id(), &event))?);
        }
    }

    Ok(if failures == 0 {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

fn run_counter(adapter: &PlatformAdapter, name: &str, count: u64) -> Result<ExitCode> {
    if let Err(err) = adapter.record_counter(name, count) {
        bail!("recording counter: {err}");
    }
    let snapshot = adapter.core().flush_stats()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(ExitCode::from(0))
}

fn run_config(path: Option<&Path>) -> Result<ExitCode> {
    let config = configuration(path)?
        .resolve()
        .context("resolving configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::from(0))
}

#[cfg(feature = "debug_http")]
fn run_serve(adapter: PlatformAdapter) -> Result<ExitCode> {
    let adapter: &'static PlatformAdapter = Box::leak(Box::new(adapter));
    netmux::http::spawn(adapter.core());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for interrupt")?;
    Ok(ExitCode::from(0))
}
