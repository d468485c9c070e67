use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use laplink::config::ClientConfig;
use laplink::records::{
    decode_local_session, decode_session, decode_tracks, encode_device_tracks_with_scale,
    encode_local_tracks, format_ms, Coordinate, CoordinateScale, Track,
};
use laplink::transport::{DeviceProfile, SimulatedDevice};
use laplink::LapTimerClient;

#[derive(Parser)]
#[command(name = "laplink", version, about = "Lap timer link and record tools")]
struct Cli {
    /// Client configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a lap log and print it as JSON
    DecodeSession {
        file: PathBuf,
        /// Comma-separated file with a free-text header
        #[arg(long)]
        local: bool,
    },
    /// Decode a tracks file (either encoding) and print it as JSON
    DecodeTracks { file: PathBuf },
    /// Re-encode a tracks file
    ConvertTracks {
        file: PathBuf,
        #[arg(long, value_enum)]
        to: TargetEncoding,
        /// Fixed-point scale for device coordinates
        #[arg(long, value_enum, default_value_t = ScaleArg::Adaptive)]
        scale: ScaleArg,
    },
    /// Run a full session against the built-in device emulator
    Demo,
    /// Download every session file from a real device
    #[cfg(feature = "btleplug")]
    Fetch {
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Seconds to scan for the device
        #[arg(long, default_value_t = 5)]
        scan_secs: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetEncoding {
    Device,
    Local,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScaleArg {
    /// x 10^7 where it reads back unambiguously, x 10^6 elsewhere
    Adaptive,
    /// Degrees x 10^6
    Micro,
    /// Degrees x 10^7 (lossy within 18 degrees of zero)
    TenthMicro,
}

impl From<ScaleArg> for CoordinateScale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Adaptive => CoordinateScale::Adaptive,
            ScaleArg::Micro => CoordinateScale::Micro,
            ScaleArg::TenthMicro => CoordinateScale::TenthMicro,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    laplink::metrics::init_metrics();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Commands::DecodeSession { file, local } => {
            let text = read_text(&file)?;
            let name = file_name(&file);
            let session = if local {
                decode_local_session(&text, &name)
            } else {
                decode_session(&text, &name)
            };
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::DecodeTracks { file } => {
            let tracks = decode_tracks(&read_text(&file)?);
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }
        Commands::ConvertTracks { file, to, scale } => {
            let tracks = decode_tracks(&read_text(&file)?);
            let out = match to {
                TargetEncoding::Device => encode_device_tracks_with_scale(&tracks, scale.into()),
                TargetEncoding::Local => encode_local_tracks(&tracks),
            };
            println!("{}", out.trim_end());
        }
        Commands::Demo => run_demo(config).await?,
        #[cfg(feature = "btleplug")]
        Commands::Fetch { out, scan_secs } => fetch(config, &out, scan_secs).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("laplink=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("laplink=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

const DEMO_LOG: &str = "track;Tor Poznan
lap_no;lap_start_date;lap_start_time;lap_time_ms;lap_time
1;2025-08-15;09:11:25;65012;1:05.012
2;2025-08-15;09:12:30;64100;1:04.100
3;2025-08-15;09:13:34;63877;1:03.877
4;2025-08-15;09:14:38;64420;1:04.420
";

const DEMO_TRACKS: &str = "1;Tor Poznan;523948000;16796300;523951000;16796800
2;Tor Kielce;508421000;206311000;508423000;206314000
";

async fn run_demo(config: ClientConfig) -> Result<()> {
    let device = SimulatedDevice::new(DeviceProfile {
        ids: config.service,
        ..DeviceProfile::streaming_firmware().with_random_split(7)
    });
    device.add_session("20250814_1702.csv", "lap_no;lap_time_ms\n1;66000\n");
    device.add_session("20250815_0911.csv", DEMO_LOG);
    device.set_tracks(DEMO_TRACKS);

    let settle = config.done_display_delay + Duration::from_millis(100);
    let client = LapTimerClient::new(device.clone(), config);

    let mut status = client.subscribe_status();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let s = status.borrow_and_update().clone();
            match s.progress {
                Some(p) => println!("[{:?}] {} {}%", s.phase, s.file_name, p),
                None => println!("[{:?}] {}", s.phase, s.device_name),
            }
        }
    });

    if let Some(session) = client.connect().await? {
        println!(
            "Session {} at {:?}: {} laps",
            session.name,
            session.track_name,
            session.laps.len()
        );
        if let Some(best) = session.best_lap() {
            for lap in &session.laps {
                println!(
                    "  lap {:>2}  {}  {:+.3}",
                    lap.lap_number,
                    lap.time_text,
                    lap.delta_to(best) as f64 / 1000.0
                );
            }
            println!("  best {}", format_ms(best.time_ms));
        }
    }
    tokio::time::sleep(settle).await;

    let mut tracks = client.load_tracks().await?;
    println!("Device knows {} tracks", tracks.len());
    tokio::time::sleep(settle).await;

    tracks.push(Track::new(
        "Silesia Ring",
        Coordinate::new(50.5265, 18.0940),
        Coordinate::new(50.5267, 18.0942),
    ));
    client.upload_tracks(&tracks).await?;
    println!(
        "Uploaded {} tracks ({} bytes)",
        tracks.len(),
        device.tracks().len()
    );

    client.disconnect().await?;
    drop(client);
    let _ = watcher.await;
    Ok(())
}

#[cfg(feature = "btleplug")]
async fn fetch(config: ClientConfig, out: &Path, scan_secs: u64) -> Result<()> {
    use laplink::engine::DownloadTarget;
    use laplink::transport::BtlePlatform;

    let platform = BtlePlatform::new(Duration::from_secs(scan_secs));
    let config = ClientConfig {
        auto_download_newest: false,
        ..config
    };
    let client = LapTimerClient::new(platform, config);
    client.connect().await?;
    if !client.state().connected {
        anyhow::bail!("no device selected");
    }

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for file in client.state().session_files {
        let target = DownloadTarget::Session(file.name.clone());
        let text = client.engine().download(&target, |_| {}).await?;
        let path = out.join(&file.name);
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        println!("{} ({} bytes)", path.display(), file.size);
    }

    client.disconnect().await?;
    Ok(())
}
