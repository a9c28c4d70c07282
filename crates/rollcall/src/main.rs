use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_core::MatchStrategy;
use rollcall_hw::Camera;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod session;

use attendance::AttendanceTable;
use config::Config;
use session::{Outcome, Session};

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam face attendance")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory of reference face images
    #[arg(long, global = true)]
    references_dir: Option<PathBuf>,
    /// Directory for captured images
    #[arg(long, global = true)]
    captures_dir: Option<PathBuf>,
    /// Attendance spreadsheet (.xlsx)
    #[arg(long, global = true)]
    attendance_file: Option<PathBuf>,
    /// Error log file
    #[arg(long, global = true)]
    error_log: Option<PathBuf>,
    /// V4L2 camera device
    #[arg(long, global = true)]
    camera: Option<String>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Largest encoding distance accepted as a match
    #[arg(long, global = true, value_parser = config::parse_tolerance)]
    tolerance: Option<f32>,
    /// Match strategy: first or nearest
    #[arg(long, global = true)]
    strategy: Option<MatchStrategy>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a photo and mark attendance for the recognized person (default)
    Mark,
    /// Load and list the reference faces
    References {
        #[arg(long)]
        json: bool,
    },
    /// Print the attendance sheet
    Show {
        #[arg(long)]
        json: bool,
    },
    /// List capture devices
    Devices,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(dir) = &self.references_dir {
            config.references_dir = dir.clone();
        }
        if let Some(dir) = &self.captures_dir {
            config.captures_dir = dir.clone();
        }
        if let Some(file) = &self.attendance_file {
            config.attendance_file = file.clone();
        }
        if let Some(file) = &self.error_log {
            config.error_log = file.clone();
        }
        if let Some(device) = &self.camera {
            config.camera_device = device.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(strategy) = self.strategy {
            config.match_strategy = strategy;
        }
        config
    }
}

/// Console report for a `mark` run. An image without a face is also reported
/// as unrecognized.
fn outcome_lines(outcome: &Outcome) -> Vec<String> {
    const NOT_RECOGNIZED: &str = "Student not recognized!";
    match outcome {
        Outcome::Marked(recognition) if recognition.confidence > 0.0 => vec![format!(
            "Attendance marked for {} with confidence {}%",
            recognition.name, recognition.confidence
        )],
        Outcome::Marked(recognition) => vec![format!("Attendance marked for {}", recognition.name)],
        Outcome::NotRecognized => vec![NOT_RECOGNIZED.to_string()],
        Outcome::NoFace => vec![
            "No faces detected in the image.".to_string(),
            NOT_RECOGNIZED.to_string(),
        ],
        Outcome::Cancelled => vec!["Capture cancelled.".to_string()],
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Mark) {
        Commands::Mark => {
            for line in outcome_lines(&session::run_mark(&config)?) {
                println!("{line}");
            }
        }
        Commands::References { json } => {
            let session = Session::prepare(&config)?;
            let entries = session.references().entries();
            if json {
                let list: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "name": e.name,
                            "source": e.source.display().to_string(),
                            "dimensions": e.encoding.len(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if entries.is_empty() {
                println!("No reference faces loaded from {}", config.references_dir.display());
            } else {
                for e in entries {
                    println!("{:<24} {}", e.name, e.source.display());
                }
            }
        }
        Commands::Show { json } => {
            let table = AttendanceTable::load(&config.attendance_file)?;
            if json {
                let rows: Vec<serde_json::Map<String, serde_json::Value>> = table
                    .rows()
                    .iter()
                    .map(|row| {
                        table
                            .columns()
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned().map(serde_json::Value::String))
                            .collect()
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if table.is_empty() {
                println!("No attendance recorded in {}", config.attendance_file.display());
            } else {
                println!("{}", table.columns().join("\t"));
                for row in table.rows() {
                    println!("{}", row.join("\t"));
                }
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}
