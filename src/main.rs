//! pi-astro-capture - run unattended capture sessions on a tethered camera
//!
//! Subcommands:
//! - `pi-astro-capture capture --subject M42 --frames 20 --exposure 30`
//! - `pi-astro-capture show-config` - print the resolved configuration
//! - `pi-astro-capture query <setting>` - read a setting from the camera

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pi_astro_capture::naming::aperture_label;
use pi_astro_capture::settings::{APERTURE, ISO, SHUTTER_SPEED};
use pi_astro_capture::{
    canon_550d, AppConfig, CameraConfig, Gphoto2Device, Lens, Orchestrator, SessionEvent,
    SessionStatus, ShotPlan,
};

/// Exit code for a session that captured some but not all frames.
const EXIT_PARTIAL: u8 = 2;
/// Exit code for an aborted session.
const EXIT_ABORTED: u8 = 3;

#[derive(Parser)]
#[command(name = "pi-astro-capture")]
#[command(about = "Unattended astrophotography capture through gphoto2")]
#[command(version)]
struct Cli {
    /// Extra config file, loaded after the system and user files
    #[arg(long, global = true, env = "PI_ASTRO_CAPTURE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a sequence of frames
    Capture(CaptureArgs),

    /// Print the resolved configuration as TOML
    ShowConfig,

    /// Read a setting's current value and choices from the camera
    Query {
        /// gphoto2 setting name (e.g. iso, aperture, shutterspeed)
        setting: String,
    },
}

#[derive(clap::Args)]
struct CaptureArgs {
    /// Target name, used as a directory under the date folder
    #[arg(short, long)]
    subject: String,

    /// Number of frames to capture
    #[arg(short = 'n', long, default_value = "1")]
    frames: u32,

    /// Exposure per frame in seconds
    #[arg(short, long, default_value = "30")]
    exposure: f64,

    /// ISO (default 100)
    #[arg(long)]
    iso: Option<String>,

    /// Aperture, with or without the f/ prefix (default: widest stop)
    #[arg(short, long)]
    aperture: Option<String>,

    /// Attached lens
    #[arg(long, value_enum, default_value = "kit18-55")]
    lens: LensArg,

    /// Focal length in mm (default: shortest for the lens)
    #[arg(long)]
    focal_length: Option<u32>,

    /// Artist name written into the image metadata
    #[arg(long)]
    artist: Option<String>,

    /// Output root (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Consecutive failed frames that abort the session
    #[arg(long)]
    threshold: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LensArg {
    #[value(name = "kit18-55")]
    Kit18To55,
    #[value(name = "kit75-300")]
    Kit75To300,
    #[value(name = "prime50")]
    Prime50,
}

impl From<LensArg> for Lens {
    fn from(arg: LensArg) -> Self {
        match arg {
            LensArg::Kit18To55 => Self::Kit18To55,
            LensArg::Kit75To300 => Self::Kit75To300,
            LensArg::Prime50 => Self::Prime50,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, sources) =
        AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for file in &sources.files {
        info!(path = %file.display(), "loaded config file");
    }

    match cli.command {
        Commands::Capture(args) => capture(&config, args),
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query { setting } => {
            let device = Gphoto2Device::with_binary(&config.gphoto2.binary);
            let queried = device
                .query(&setting)
                .with_context(|| format!("querying {setting}"))?;
            println!("{}: {}", queried.name, queried.current);
            for choice in &queried.choices {
                let marker = if *choice == queried.current { '*' } else { ' ' };
                println!("  {marker} {choice}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn capture(config: &AppConfig, args: CaptureArgs) -> Result<ExitCode> {
    let camera = camera_config(&args)?;

    let plan = ShotPlan::new(args.subject)
        .with_frames(args.frames)
        .with_exposure_secs(args.exposure)
        .with_output_root(
            args.output
                .unwrap_or_else(|| config.capture.output_root.clone()),
        );

    let mut options = config.session_options();
    if let Some(threshold) = args.threshold {
        options.failure_threshold = threshold;
    }

    let mut orchestrator =
        Orchestrator::new(Gphoto2Device::with_binary(&config.gphoto2.binary)).with_options(options);
    let mut session = orchestrator
        .start(camera, plan)
        .context("cannot start capture session")?;
    println!("Saving frames to {}", session.session_dir().display());

    session.add_observer(|event| {
        if let SessionEvent::FrameRecorded { frame, planned } = event {
            match frame.failure() {
                None => println!("[{}/{planned}] {}", frame.index(), frame.path().display()),
                Some(failure) => println!("[{}/{planned}] failed: {failure}", frame.index()),
            }
        }
    });

    let result = session.run();
    println!(
        "{}: {} of {} frames captured, {} failed",
        result.status(),
        result.succeeded(),
        result.planned(),
        result.failed()
    );
    if let Some(reason) = result.abort_reason() {
        println!("Stopped: {reason}");
    }

    Ok(match result.status() {
        SessionStatus::Complete => ExitCode::SUCCESS,
        SessionStatus::Partial => ExitCode::from(EXIT_PARTIAL),
        SessionStatus::Aborted => ExitCode::from(EXIT_ABORTED),
    })
}

/// Canon 550D profile with the chosen lens and operator overrides applied.
fn camera_config(args: &CaptureArgs) -> Result<CameraConfig> {
    let lens = Lens::from(args.lens);
    let focal_length = args.focal_length.unwrap_or(lens.focal_range().0);

    let mut builder = lens.apply(canon_550d(), focal_length)?;
    if let Some(iso) = &args.iso {
        builder = builder.select(ISO, iso)?;
    }
    if let Some(aperture) = &args.aperture {
        builder = builder.select(APERTURE, aperture_label(aperture))?;
    }
    if let Some(artist) = &args.artist {
        builder = builder.artist(artist.as_str());
    }

    let camera = builder.build();
    info!(
        lens = lens.name(),
        focal_length,
        iso = camera.current(ISO).unwrap_or_default(),
        aperture = camera.current(APERTURE).unwrap_or_default(),
        shutter = camera.current(SHUTTER_SPEED).unwrap_or_default(),
        "camera configured"
    );
    Ok(camera)
}
