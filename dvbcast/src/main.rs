//! dvbcast: stream locally attached DVB tuners over RTP/UDP or capture the
//! filtered transport stream to a file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use dvbcast_core::transform::TransformSettings;
use dvbcast_core::{
    default_driver, enumerate_frontends, Frontend, RtpOutput, StreamClient, StreamOutput,
    StreamThread, TsFileOutput,
};

mod logging;

/// dvbcast - DVB tuners as network-streamable MPEG-TS sources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DVB adapter tree to enumerate
    #[arg(long, default_value = "/dev/dvb")]
    adapters: PathBuf,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the detected frontends and their capabilities
    List,

    /// Tune and periodically print the signal status
    Monitor {
        /// Frontend number as reported by `list`
        #[arg(short = 'e', long, default_value = "0")]
        frontend: usize,

        /// Stream request, e.g.
        /// "freq=11836&pol=h&msys=dvbs2&sr=27500&fec=23&pids=0"
        #[arg(short, long)]
        request: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Stop after this many samples (default: run until killed)
        #[arg(long)]
        count: Option<u64>,
    },

    /// Tune and stream the filtered transport stream
    Stream {
        /// Frontend number as reported by `list`
        #[arg(short = 'e', long, default_value = "0")]
        frontend: usize,

        /// Stream request, e.g.
        /// "freq=11836&pol=h&msys=dvbs2&sr=27500&fec=23&pids=0,16,17"
        #[arg(short, long)]
        request: String,

        /// RTP/UDP destination; the RTCP sidecar uses the next port up
        #[arg(long, conflicts_with = "out")]
        rtp: Option<SocketAddr>,

        /// Capture file path (raw TS, no RTP framing)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Stop after this many seconds (default: stream until killed)
        #[arg(long)]
        duration: Option<u64>,
    },
}

/// Configuration file format.
#[derive(Debug, Default, serde::Deserialize)]
struct ConfigFile {
    #[serde(default)]
    frontend: FrontendSection,
    #[serde(default)]
    transform: TransformSettings,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FrontendSection {
    dvr_buffer_mb: Option<u32>,
    wait_on_lock_timeout_ms: Option<u64>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

fn apply_config(config: &ConfigFile, frontends: &[Arc<Frontend>]) {
    for frontend in frontends {
        let mut settings = frontend.settings();
        if let Some(mb) = config.frontend.dvr_buffer_mb {
            settings.dvr_buffer_mb = mb;
        }
        if let Some(ms) = config.frontend.wait_on_lock_timeout_ms {
            settings.wait_on_lock_timeout_ms = ms;
        }
        settings.transform = config.transform.clone();
        frontend.apply_settings(&settings);
    }
}

fn select_frontend(
    frontends: &[Arc<Frontend>],
    index: usize,
) -> Result<Arc<Frontend>, Box<dyn std::error::Error>> {
    frontends
        .get(index)
        .cloned()
        .ok_or_else(|| format!("no frontend {index} ({} detected)", frontends.len()).into())
}

/// A fresh SSRC per invocation.
fn make_ssrc() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or(0x6476_6263)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_logging(&args.log_dir, args.log_retention_days, args.verbose)?;

    // Config file: explicit path > dvbcast.toml in the working directory.
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("dvbcast.toml");
        default_path.exists().then_some(default_path)
    });
    let config = match &config_path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => ConfigFile::default(),
    };

    let driver = default_driver();
    let frontends = enumerate_frontends(&driver, &args.adapters);
    apply_config(&config, &frontends);

    match args.command {
        Commands::List => cmd_list(&frontends),
        Commands::Monitor {
            frontend,
            request,
            interval_ms,
            count,
        } => cmd_monitor(
            select_frontend(&frontends, frontend)?,
            &request,
            interval_ms,
            count,
        ),
        Commands::Stream {
            frontend,
            request,
            rtp,
            out,
            duration,
        } => cmd_stream(
            select_frontend(&frontends, frontend)?,
            &request,
            rtp,
            out,
            duration,
        ),
    }
}

fn cmd_list(frontends: &[Arc<Frontend>]) -> Result<(), Box<dyn std::error::Error>> {
    if frontends.is_empty() {
        println!("No frontends detected");
        return Ok(());
    }
    let mut totals = dvbcast_core::frontend::DeliveryCounts::default();
    for frontend in frontends {
        let info = frontend.info();
        println!(
            "FE{}: {} ({})",
            frontend.id(),
            info.name,
            frontend.path().display()
        );
        println!(
            "  freq: {} Hz to {} Hz, symbol rate: {} to {} symbols/s",
            info.frequency_min, info.frequency_max, info.symbol_rate_min, info.symbol_rate_max
        );
        let systems: Vec<String> = info
            .delivery_systems
            .iter()
            .map(|s| s.to_string())
            .collect();
        println!("  delivery systems: {}", systems.join(", "));

        let counts = frontend.delivery_counts();
        totals.dvbs2 += counts.dvbs2;
        totals.dvbt += counts.dvbt;
        totals.dvbt2 += counts.dvbt2;
        totals.dvbc += counts.dvbc;
    }
    println!(
        "Advertised totals: DVB-S2: {}, DVB-T: {}, DVB-T2: {}, DVB-C: {}",
        totals.dvbs2, totals.dvbt, totals.dvbt2, totals.dvbc
    );
    Ok(())
}

fn cmd_monitor(
    frontend: Arc<Frontend>,
    request: &str,
    interval_ms: u64,
    count: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    frontend.parse_stream_string(request, "SETUP")?;
    if !frontend.update() {
        return Err("tuning failed".into());
    }
    let mut remaining = count;
    loop {
        frontend.monitor_signal(true);
        if let Some(left) = remaining.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                break;
            }
        }
        thread::sleep(Duration::from_millis(interval_ms));
    }
    frontend.teardown();
    Ok(())
}

fn cmd_stream(
    frontend: Arc<Frontend>,
    request: &str,
    rtp: Option<SocketAddr>,
    out: Option<PathBuf>,
    duration: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    frontend.parse_stream_string(request, "PLAY")?;
    if !frontend.update() {
        return Err("tuning failed".into());
    }

    let (client, output): (Arc<StreamClient>, Box<dyn StreamOutput>) = match (rtp, out) {
        (Some(addr), _) => (
            Arc::new(StreamClient::new(addr, make_ssrc())),
            Box::new(RtpOutput::new()),
        ),
        (None, Some(path)) => (
            // The file variant never sends; the address is a placeholder.
            Arc::new(StreamClient::new("127.0.0.1:0".parse()?, make_ssrc())),
            Box::new(TsFileOutput::new(path)),
        ),
        (None, None) => return Err("either --rtp or --out is required".into()),
    };

    let mut stream = StreamThread::start(frontend.clone(), client.clone(), output)?;
    info!("Streaming ({})...", stream.protocol());

    let deadline = duration.map(Duration::from_secs);
    let started = std::time::Instant::now();
    loop {
        thread::sleep(Duration::from_secs(1));
        if client.is_self_destructing() {
            warn!("Client went away, stopping stream");
            break;
        }
        if let Some(deadline) = deadline {
            if started.elapsed() >= deadline {
                break;
            }
        }
        if !frontend.is_tuned() {
            error!("Frontend lost its tuning state, stopping stream");
            break;
        }
    }

    stream.terminate();
    frontend.teardown();
    Ok(())
}
