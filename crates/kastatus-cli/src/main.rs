#![deny(unsafe_code)]

//! kastatus CLI: one-shot and continuous status queries against the
//! Ka-band radar daemons.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kastatus_config::AppConfig;
use kastatus_core::schema::NoXmitReason;
use kastatus_core::{
    Endpoint, KadrxStatus, MonitorEvent, RetryPolicy, StatusClient, StatusMonitor, StatusRecord,
    XmitdStatus, build_info,
};

/// kastatus: status queries for the kadrx and ka_xmitd daemons.
#[derive(Parser)]
#[command(name = "kastatus", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "kastatus.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query kadrx status once.
    Kadrx {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,

        /// Override the configured endpoint (`host:port` or URL).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Query ka_xmitd status once.
    Xmitd {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,

        /// Override the configured endpoint (`host:port` or URL).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Poll a daemon continuously and print each snapshot.
    Watch {
        daemon: Daemon,

        /// Stop after this many snapshots.
        #[arg(long)]
        count: Option<usize>,

        /// Override the configured endpoint (`host:port` or URL).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Daemon {
    Kadrx,
    Xmitd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
    debug!(version = %build_info::version_string(), "kastatus starting");

    match cli.command {
        Commands::Kadrx { json, endpoint } => {
            let endpoint = resolve_endpoint(endpoint.as_deref(), Endpoint::from(&config.kadrx))?;
            cmd_query(Daemon::Kadrx, endpoint, &config, json).await?
        }
        Commands::Xmitd { json, endpoint } => {
            let endpoint = resolve_endpoint(endpoint.as_deref(), Endpoint::from(&config.xmitd))?;
            cmd_query(Daemon::Xmitd, endpoint, &config, json).await?
        }
        Commands::Watch {
            daemon,
            count,
            endpoint,
        } => {
            let configured = match daemon {
                Daemon::Kadrx => Endpoint::from(&config.kadrx),
                Daemon::Xmitd => Endpoint::from(&config.xmitd),
            };
            let endpoint = resolve_endpoint(endpoint.as_deref(), configured)?;
            cmd_watch(daemon, endpoint, &config, count).await?
        }
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

fn resolve_endpoint(arg: Option<&str>, configured: Endpoint) -> Result<Endpoint> {
    match arg {
        Some(text) => text.parse().context("invalid --endpoint"),
        None => Ok(configured),
    }
}

fn make_client(daemon: Daemon, endpoint: Endpoint, config: &AppConfig) -> StatusClient {
    let policy = RetryPolicy::from_config(&config.retry);
    match daemon {
        Daemon::Kadrx => StatusClient::kadrx(endpoint, policy),
        Daemon::Xmitd => StatusClient::xmitd(endpoint, policy),
    }
}

async fn cmd_query(daemon: Daemon, endpoint: Endpoint, config: &AppConfig, json: bool) -> Result<()> {
    info!(endpoint = %endpoint, "Querying status");
    let mut client = make_client(daemon, endpoint, config);
    let record = client
        .get_status()
        .await
        .with_context(|| format!("status query to {} failed", client.endpoint()))?;

    if json {
        println!("{}", render_json(daemon, &record)?);
    } else {
        print!("{}", render_text(daemon, &record));
    }
    Ok(())
}

async fn cmd_watch(
    daemon: Daemon,
    endpoint: Endpoint,
    config: &AppConfig,
    count: Option<usize>,
) -> Result<()> {
    let stale_after = Duration::from_secs(config.monitor.stale_after_secs);
    let interval = Duration::from_millis(config.monitor.poll_interval_ms);

    let mut monitor = StatusMonitor::spawn(make_client(daemon, endpoint, config), interval);
    let mut events = monitor.subscribe();
    let mut snapshots = 0usize;
    let mut last_seen: Option<DateTime<Utc>> = None;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping");
                break;
            }
        };

        match event {
            Ok(MonitorEvent::Status(record)) => {
                println!("{}", snapshot_header(&record, Utc::now(), stale_after));
                print!("{}", render_text(daemon, &record));
                last_seen = Some(record.timestamp_utc());
                snapshots += 1;
                if count.is_some_and(|n| snapshots >= n) {
                    break;
                }
            }
            Ok(MonitorEvent::Error(message)) => {
                if data_is_stale(last_seen, Utc::now(), stale_after) {
                    eprintln!("error: {message} [last snapshot STALE]");
                } else {
                    eprintln!("error: {message}");
                }
            }
            Ok(MonitorEvent::Responsive(true)) => eprintln!("daemon responding"),
            Ok(MonitorEvent::Responsive(false)) => eprintln!("daemon NOT responding"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Output fell behind, skipped events");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    monitor.shutdown();
    monitor.join().await;
    Ok(())
}

fn snapshot_header(record: &StatusRecord, now: DateTime<Utc>, stale_after: Duration) -> String {
    format!(
        "--- {}{}",
        record.timestamp_utc().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
        if record.is_stale_at(now, stale_after) {
            " [STALE]"
        } else {
            ""
        }
    )
}

/// Whether the newest data seen so far is older than `stale_after`.
fn data_is_stale(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    match (last_seen, chrono::TimeDelta::from_std(stale_after)) {
        (Some(at), Ok(limit)) => now - at > limit,
        _ => false,
    }
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("TOML error")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}

fn render_json(daemon: Daemon, record: &StatusRecord) -> Result<String> {
    let view = match daemon {
        Daemon::Kadrx => KadrxStatus::from_record(record)
            .map(serde_json::to_value)
            .ok()
            .transpose()?,
        Daemon::Xmitd => XmitdStatus::from_record(record)
            .map(serde_json::to_value)
            .ok()
            .transpose()?,
    };
    let doc = serde_json::json!({
        "record": record,
        "status": view,
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn render_text(daemon: Daemon, record: &StatusRecord) -> String {
    let rendered = match daemon {
        Daemon::Kadrx => KadrxStatus::from_record(record).map(|s| render_kadrx(&s)),
        Daemon::Xmitd => XmitdStatus::from_record(record).map(|s| render_xmitd(&s)),
    };
    let mut out = rendered.unwrap_or_else(|e| {
        warn!(error = %e, "Snapshot has no typed view, printing raw fields");
        let mut raw = String::new();
        for (name, value) in record.fields() {
            let _ = writeln!(raw, "{name:<24} {value}");
        }
        raw
    });

    if !record.raw_unrecognized_fields().is_empty() {
        let names: Vec<&str> = record
            .raw_unrecognized_fields()
            .keys()
            .map(String::as_str)
            .collect();
        let _ = writeln!(out, "{:<24} {}", "unrecognized fields", names.join(", "));
    }
    out
}

fn flag(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

fn render_kadrx(s: &KadrxStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {}", "transmit allowed", flag(s.transmit_allowed()));
    for reason in NoXmitReason::ALL {
        if s.no_xmit.is_set(reason) {
            let _ = writeln!(out, "{:<24} {reason}", "  no-xmit");
        }
    }
    let _ = writeln!(out, "{:<24} {}", "GPS time server good", flag(s.gps_time_server_good));
    let _ = writeln!(out, "{:<24} {}", "100 MHz locked", flag(s.locked_100mhz));
    let _ = writeln!(out, "{:<24} {}", "N2 pressure good", flag(s.n2_pressure_good));
    if let Some(afc) = s.afc_enabled {
        let _ = writeln!(out, "{:<24} {}", "AFC enabled", flag(afc));
    }
    for (i, freq) in s.osc_frequencies.iter().enumerate() {
        let _ = writeln!(out, "{:<24} {:.6} GHz", format!("osc{i} frequency"), freq / 1e9);
    }
    let _ = writeln!(out, "{:<24} {:.6} GHz", "derived tx frequency", s.derived_tx_frequency / 1e9);
    let _ = writeln!(out, "{:<24} {:.2} dBm", "H tx power", s.h_tx_power);
    let _ = writeln!(out, "{:<24} {:.2} dBm", "V tx power", s.v_tx_power);
    let _ = writeln!(out, "{:<24} {:.2} dBm", "test pulse power", s.test_pulse_power);
    let temps = [
        ("proc DRX temp", s.proc_drx_temp),
        ("proc enclosure temp", s.proc_enclosure_temp),
        ("rx back temp", s.rx_back_temp),
        ("rx front temp", s.rx_front_temp),
        ("rx top temp", s.rx_top_temp),
        ("tx enclosure temp", s.tx_enclosure_temp),
    ];
    for (label, temp) in temps {
        let _ = writeln!(out, "{label:<24} {temp:.1} C");
    }
    let _ = writeln!(out, "{:<24} {:.2} V", "PS voltage", s.ps_voltage);
    if let Some(offset) = s.clock_offset_secs {
        let _ = writeln!(out, "{:<24} {offset:+.6} s", "clock offset");
    }
    out
}

fn render_xmitd(s: &XmitdStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {}", "serial connected", flag(s.serial_connected));
    let _ = writeln!(out, "{:<24} {}", "unit on", flag(s.unit_on));
    let _ = writeln!(out, "{:<24} {}", "remote enabled", flag(s.remote_enabled));
    let _ = writeln!(out, "{:<24} {}", "standby", flag(s.standby));
    let _ = writeln!(out, "{:<24} {}", "heater warmup", flag(s.heater_warmup));
    let _ = writeln!(out, "{:<24} {}", "cooldown", flag(s.cooldown));
    let _ = writeln!(out, "{:<24} {}", "HVPS runup", flag(s.hvps_runup));
    let _ = writeln!(out, "{:<24} {}", "HVPS on", flag(s.hvps_on));
    let _ = writeln!(out, "{:<24} {:.2} kV", "HVPS voltage", s.hvps_voltage);
    let _ = writeln!(out, "{:<24} {:.2} mA", "HVPS current", s.hvps_current);
    let _ = writeln!(out, "{:<24} {:.2} A", "magnetron current", s.magnetron_current);
    let _ = writeln!(out, "{:<24} {:.1} C", "temperature", s.temperature);
    let _ = writeln!(out, "{:<24} {}", "fault summary", flag(s.fault_summary));
    for history in &s.faults {
        let mut line = format!(
            "  {:<22} {}",
            history.fault.status_key(),
            if history.active { "FAULT" } else { "ok" }
        );
        if history.count > 0 {
            let _ = write!(line, " (x{}", history.count);
            if let Some(at) = history.last_seen {
                let _ = write!(line, ", last {}", at.format("%Y-%m-%d %H:%M:%S"));
            }
            line.push(')');
        }
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(
        out,
        "{:<24} {}",
        "auto pulse fault resets", s.auto_pulse_fault_resets
    );
    out
}
