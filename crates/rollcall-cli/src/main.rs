use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rollcall_core::{
    enroll_table, load_metadata, Enrollment, FrameSourceError, Matcher, MatcherConfig,
    PositionalResolver, RecognitionSession,
};
use rollcall_hw::Camera;
use rollcall_vision::OnnxAnalyzer;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::Config;
use console::{Input, MatchView, QuietPresenter, TablePresenter};

type Session<'g> = RecognitionSession<'g, OnnxAnalyzer>;

#[derive(Parser)]
#[command(name = "rollcall", about = "Recognize enrolled people from a camera or an image")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/rollcall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags that take precedence over the config file and environment.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// CSV metadata table
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,
    /// Directory of enrollment images ({row}.jpg)
    #[arg(long, global = true)]
    images: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    /// V4L2 capture device
    #[arg(long, global = true)]
    device: Option<String>,
    /// Match threshold (exclusive maximum distance)
    #[arg(long, global = true)]
    threshold: Option<f32>,
    /// Save annotated live frames to this directory
    #[arg(long, global = true)]
    snapshots: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.metadata {
            config.metadata_path = v;
        }
        if let Some(v) = self.images {
            config.image_dir = v;
        }
        if let Some(v) = self.models {
            config.model_dir = v;
        }
        if let Some(v) = self.device {
            config.camera_device = v;
        }
        if let Some(v) = self.threshold {
            config.distance_threshold = v;
        }
        if let Some(v) = self.snapshots {
            config.snapshot_dir = Some(v);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu: camera, image file or exit (default)
    Menu,
    /// Recognize faces from the camera until 'q' is entered
    Live,
    /// Recognize faces in an image file
    Identify {
        path: PathBuf,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List enrolled identities and enrollment warnings
    Gallery {
        /// Print identities as JSON
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;
    tracing::debug!(?config, "configuration");

    let command = cli.command.unwrap_or(Commands::Menu);
    if let Commands::Devices = command {
        return list_devices();
    }

    let mut analyzer = load_analyzer(&config)?;
    let enrollment = build_gallery(&config, &mut analyzer)?;
    let matcher = Matcher::new(MatcherConfig {
        threshold: config.distance_threshold,
    });
    let mut session = Session::new(&enrollment.gallery, matcher, analyzer);

    match command {
        Commands::Menu => menu(&mut session, &config),
        Commands::Live => live(&mut session, &config, &Input::spawn()),
        Commands::Identify { path, json } => identify(&mut session, &path, json),
        Commands::Gallery { json } => show_gallery(&enrollment, json),
        Commands::Devices => Ok(()),
    }
}

fn load_analyzer(config: &Config) -> Result<OnnxAnalyzer> {
    OnnxAnalyzer::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))
}

/// Enroll every metadata row at startup. A missing or headerless table is
/// fatal; bad rows are reported and skipped.
fn build_gallery(config: &Config, analyzer: &mut OnnxAnalyzer) -> Result<Enrollment> {
    let table = load_metadata(&config.metadata_path).context("loading people metadata")?;
    let resolver = PositionalResolver::new(&config.image_dir);

    let pb = ProgressBar::new(table.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("enrolling");
    let enrollment = enroll_table(&table, &resolver, analyzer, |_| pb.inc(1));
    pb.finish_and_clear();

    for warning in &enrollment.warnings {
        eprintln!("warning: {warning}");
    }
    tracing::info!(
        rows = table.len(),
        enrolled = enrollment.gallery.len(),
        skipped = enrollment.skipped(),
        replaced = enrollment.replaced,
        "gallery built"
    );
    Ok(enrollment)
}

fn live(session: &mut Session<'_>, config: &Config, input: &Input) -> Result<()> {
    let mut renderer = console::ConsoleRenderer::new(config.snapshot_dir.clone()).context("creating snapshot directory")?;
    let device = config.camera_device.as_str();

    println!("Press 'q' to quit the camera.");
    let mut stop = || input.quit_requested();
    let summary = session.run_live(
        || Camera::open(device).map_err(FrameSourceError::from),
        &mut renderer,
        &mut stop,
    )?;

    println!(
        "{} frames, {} faces, {} recognized",
        summary.frames, summary.faces, summary.recognized
    );
    Ok(())
}

fn identify(session: &mut Session<'_>, path: &Path, json: bool) -> Result<()> {
    if json {
        let results = session.recognize_file(path, &mut QuietPresenter)?;
        let views: Vec<MatchView<'_>> = results.iter().map(MatchView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    let mut presenter = TablePresenter::default();
    let results = session.recognize_file(path, &mut presenter)?;
    if results.is_empty() {
        println!("No faces found in {}.", path.display());
    }
    Ok(())
}

fn show_gallery(enrollment: &Enrollment, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&console::gallery_views(&enrollment.gallery))?);
        return Ok(());
    }

    if enrollment.gallery.is_empty() {
        println!("No identities enrolled");
        return Ok(());
    }
    for record in &enrollment.gallery {
        println!(
            "{:<24} {:<24} {:<16} {}",
            record.name,
            record.metadata.university,
            record.metadata.major,
            record.portrait_path.display()
        );
    }
    println!(
        "{} enrolled, {} skipped, {} replaced",
        enrollment.gallery.len(),
        enrollment.skipped(),
        enrollment.replaced
    );
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}

/// Interactive loop. Failures inside an option are reported and the menu
/// comes back.
fn menu(session: &mut Session<'_>, config: &Config) -> Result<()> {
    let input = Input::spawn();
    println!("rollcall: {} identities enrolled", session.gallery().len());

    loop {
        println!("Please select an option:");
        println!("1. Open camera for face recognition");
        println!("2. Import image from files");
        println!("3. Exit");
        println!("Enter your choice (1, 2, or 3): ");

        let Some(choice) = input.read_line() else {
            return Ok(());
        };
        match choice.trim() {
            "1" => {
                if let Err(e) = live(session, config, &input) {
                    eprintln!("Error: {e:#}");
                }
            }
            "2" => {
                println!("Enter the path to the image file: ");
                let Some(path) = input.read_line() else {
                    return Ok(());
                };
                let path = PathBuf::from(path.trim());
                if let Err(e) = identify(session, &path, false) {
                    eprintln!("Error processing image {}: {e:#}", path.display());
                }
            }
            "3" => {
                println!("Exiting the program.");
                return Ok(());
            }
            _ => println!("Invalid choice. Please enter 1, 2, or 3."),
        }
    }
}
