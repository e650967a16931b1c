//! Flipbook CLI Tool
//!
//! Command-line interface for editing frame sequences stored as flipbook
//! project archives.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flipbook_codec::{CropRect, FlipRotate, ImageCodec, ImageCrateCodec};
use flipbook_engine::{
    DelayMode, EditorSession, EngineConfig, LogProgress, Scope, SlideFrom, TransformationRequest,
    TransitionKind,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flipbook")]
#[command(about = "Flipbook - frame-by-frame animation editor")]
#[command(version)]
struct Cli {
    /// Log per-operation detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Source and destination shared by every editing command
#[derive(Args)]
struct Edit {
    /// Input project, image, GIF or video
    input: PathBuf,

    /// Output project archive
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlipRotateArg {
    FlipH,
    FlipV,
    RotateLeft,
    RotateRight,
}

impl From<FlipRotateArg> for FlipRotate {
    fn from(arg: FlipRotateArg) -> Self {
        match arg {
            FlipRotateArg::FlipH => FlipRotate::FlipHorizontal,
            FlipRotateArg::FlipV => FlipRotate::FlipVertical,
            FlipRotateArg::RotateLeft => FlipRotate::RotateLeft90,
            FlipRotateArg::RotateRight => FlipRotate::RotateRight90,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Left,
    Right,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a source into a new project archive
    Import(Edit),

    /// Create a project holding one blank frame
    New {
        /// Output project archive
        output: PathBuf,

        #[arg(long, default_value = "640")]
        width: u32,

        #[arg(long, default_value = "480")]
        height: u32,

        /// Fill color as RRGGBB or RRGGBBAA
        #[arg(long, default_value = "ffffff")]
        color: String,
    },

    /// Show project information
    Info {
        /// Input project, image, GIF or video
        input: PathBuf,
    },

    /// Resize every frame
    Resize {
        #[command(flatten)]
        edit: Edit,

        #[arg(long)]
        width: u32,

        /// Ignored with --keep-aspect
        #[arg(long, default_value = "0")]
        height: u32,

        #[arg(long, default_value = "96")]
        dpi: f64,

        /// Derive the height from the current aspect ratio
        #[arg(long)]
        keep_aspect: bool,
    },

    /// Crop every frame (right and bottom are exclusive)
    Crop {
        #[command(flatten)]
        edit: Edit,

        #[arg(long)]
        left: u32,

        #[arg(long)]
        top: u32,

        #[arg(long)]
        right: u32,

        #[arg(long)]
        bottom: u32,
    },

    /// Flip selected frames or rotate the whole sequence
    FlipRotate {
        #[command(flatten)]
        edit: Edit,

        #[arg(long, value_enum)]
        op: FlipRotateArg,

        /// Frame indices to flip; all frames when omitted
        #[arg(long, value_delimiter = ',')]
        frames: Vec<usize>,
    },

    /// Set or shift frame delays
    Delay {
        #[command(flatten)]
        edit: Edit,

        /// New delay in milliseconds
        #[arg(long, conflicts_with = "change", required_unless_present = "change")]
        set: Option<u32>,

        /// Milliseconds to add (negative to subtract)
        #[arg(long, allow_hyphen_values = true)]
        change: Option<i64>,

        #[arg(long, value_delimiter = ',')]
        frames: Vec<usize>,
    },

    /// Reverse frame order
    Reverse {
        #[command(flatten)]
        edit: Edit,

        #[arg(long, value_delimiter = ',')]
        frames: Vec<usize>,
    },

    /// Append the mirrored interior so the animation plays back and forth
    Yoyo {
        #[command(flatten)]
        edit: Edit,

        #[arg(long, value_delimiter = ',')]
        frames: Vec<usize>,
    },

    /// Insert a fade between a frame and the next
    Fade {
        #[command(flatten)]
        edit: Edit,

        #[arg(long)]
        anchor: usize,

        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Insert a slide between a frame and the next
    Slide {
        #[command(flatten)]
        edit: Edit,

        #[arg(long)]
        anchor: usize,

        #[arg(long, default_value = "10")]
        count: usize,

        /// Side the next frame enters from
        #[arg(long, value_enum, default_value = "right")]
        from: SideArg,
    },

    /// Write every frame to a directory as PNG
    Extract {
        /// Input project, image, GIF or video
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Scratch directory for one invocation, removed on drop
struct Workspace(PathBuf);

impl Workspace {
    fn create() -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("flipbook-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).context("Failed to create workspace directory")?;
        Ok(Self(dir))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            tracing::warn!(error = %e, dir = %self.0.display(), "Failed to remove workspace");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Import(edit) => transform(&edit, None)?,

        Commands::New {
            output,
            width,
            height,
            color,
        } => new_project(&output, width, height, &color)?,

        Commands::Info { input } => show_info(&input)?,

        Commands::Resize {
            edit,
            width,
            height,
            dpi,
            keep_aspect,
        } => {
            let request = TransformationRequest::Resize {
                width,
                height: if keep_aspect { width } else { height },
                dpi,
                keep_aspect,
            };
            transform(&edit, Some(request))?
        }

        Commands::Crop {
            edit,
            left,
            top,
            right,
            bottom,
        } => {
            let rect = CropRect {
                left,
                top,
                right,
                bottom,
            };
            transform(&edit, Some(TransformationRequest::Crop(rect)))?
        }

        Commands::FlipRotate { edit, op, frames } => {
            let request = TransformationRequest::FlipRotate {
                op: op.into(),
                scope: scope(frames),
            };
            transform(&edit, Some(request))?
        }

        Commands::Delay {
            edit,
            set,
            change,
            frames,
        } => {
            let mode = match (set, change) {
                (Some(value), _) => DelayMode::Override(value),
                (None, Some(delta)) => DelayMode::Change(delta),
                (None, None) => bail!("Either --set or --change is required"),
            };
            let request = TransformationRequest::Delay {
                mode,
                scope: scope(frames),
            };
            transform(&edit, Some(request))?
        }

        Commands::Reverse { edit, frames } => {
            let request = TransformationRequest::Reverse {
                scope: scope(frames),
            };
            transform(&edit, Some(request))?
        }

        Commands::Yoyo { edit, frames } => {
            let request = TransformationRequest::Yoyo {
                scope: scope(frames),
            };
            transform(&edit, Some(request))?
        }

        Commands::Fade {
            edit,
            anchor,
            count,
        } => {
            let request = TransformationRequest::Transition {
                anchor,
                count,
                kind: TransitionKind::Fade,
            };
            transform(&edit, Some(request))?
        }

        Commands::Slide {
            edit,
            anchor,
            count,
            from,
        } => {
            let side = match from {
                SideArg::Left => SlideFrom::Left,
                SideArg::Right => SlideFrom::Right,
            };
            let request = TransformationRequest::Transition {
                anchor,
                count,
                kind: TransitionKind::Slide(side),
            };
            transform(&edit, Some(request))?
        }

        Commands::Extract { input, output } => extract_frames(&input, &output)?,
    }

    Ok(())
}

fn scope(frames: Vec<usize>) -> Scope {
    if frames.is_empty() {
        Scope::All
    } else {
        Scope::Selected(frames)
    }
}

fn open_session(workspace: &Workspace, input: &Path) -> Result<EditorSession> {
    let mut session = EditorSession::new(
        &workspace.0,
        Arc::new(ImageCrateCodec::new()),
        EngineConfig::default(),
    )
    .with_progress_sink(Arc::new(LogProgress::new()));

    session
        .open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    Ok(session)
}

/// Opens `edit.input`, applies `request` if any and exports the result
fn transform(edit: &Edit, request: Option<TransformationRequest>) -> Result<()> {
    let workspace = Workspace::create()?;
    let mut session = open_session(&workspace, &edit.input)?;

    if let Some(request) = request {
        let label = request.label();
        let range = session
            .apply(request)
            .with_context(|| format!("Failed to apply {label}"))?;
        println!("{label}: frames {}..={} affected", range.start, range.end);
    }

    session
        .export_project(&edit.output)
        .context("Failed to write project archive")?;
    println!("Saved {}", edit.output.display());

    Ok(())
}

fn parse_color(hex: &str) -> Result<[u8; 4]> {
    let hex = hex.trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) {
        bail!("Color must be RRGGBB or RRGGBBAA, got {hex:?}");
    }

    let mut color = [0, 0, 0, 255];
    for (i, channel) in color.iter_mut().enumerate().take(hex.len() / 2) {
        let digits = hex.get(i * 2..i * 2 + 2).context("Invalid color")?;
        *channel = u8::from_str_radix(digits, 16)
            .with_context(|| format!("Invalid color component {digits:?}"))?;
    }
    Ok(color)
}

fn new_project(output: &Path, width: u32, height: u32, color: &str) -> Result<()> {
    let color = parse_color(color)?;
    let workspace = Workspace::create()?;
    let mut session = EditorSession::new(
        &workspace.0,
        Arc::new(ImageCrateCodec::new()),
        EngineConfig::default(),
    );

    session
        .new_blank(width, height, color)
        .context("Failed to create blank frame")?;
    session
        .export_project(output)
        .context("Failed to write project archive")?;
    println!("Created {}x{} project {}", width, height, output.display());

    Ok(())
}

fn show_info(input: &Path) -> Result<()> {
    let workspace = Workspace::create()?;
    let session = open_session(&workspace, input)?;
    let sequence = session.sequence().context("No frames loaded")?;

    println!("\n=== Flipbook Project Information ===");
    println!("Frames: {}", sequence.len());
    if let Some(first) = sequence.frames().first() {
        let (width, height) = image::image_dimensions(&first.image_location)
            .context("Failed to read frame dimensions")?;
        println!("Resolution: {}x{}", width, height);
    }
    println!("DPI: {:.0}", sequence.dpi());

    let total_ms = sequence.total_duration_ms();
    println!(
        "Duration: {} ms ({:.2} seconds)",
        total_ms,
        total_ms as f64 / 1000.0
    );

    println!("\n=== Frames ===");
    for (index, frame) in sequence.iter().enumerate() {
        println!("  Frame {:>5}: {:>6} ms", index, frame.delay_ms());
    }

    Ok(())
}

fn extract_frames(input: &Path, output: &Path) -> Result<()> {
    let workspace = Workspace::create()?;
    let session = open_session(&workspace, input)?;
    let sequence = session.sequence().context("No frames loaded")?;
    let codec = ImageCrateCodec::new();

    std::fs::create_dir_all(output).context("Failed to create output directory")?;
    println!("Extracting {} frames to {}", sequence.len(), output.display());

    for (index, frame) in sequence.iter().enumerate() {
        let raster = codec
            .decode(&frame.image_location)
            .with_context(|| format!("Failed to decode frame {index}"))?;
        let frame_path = output.join(format!("frame_{:06}.png", index));
        codec
            .encode(&raster, &frame_path)
            .with_context(|| format!("Failed to save frame {index}"))?;

        if (index + 1) % 10 == 0 {
            println!("Extracted {} / {} frames", index + 1, sequence.len());
        }
    }

    println!("Successfully extracted all frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("ff8000").unwrap(), [255, 128, 0, 255]);
        assert_eq!(parse_color("#00000080").unwrap(), [0, 0, 0, 128]);
        assert!(parse_color("fff").is_err());
        assert!(parse_color("gg0000").is_err());
    }

    #[test]
    fn test_scope_from_frames() {
        assert_eq!(scope(Vec::new()), Scope::All);
        assert_eq!(scope(vec![2, 0]), Scope::Selected(vec![2, 0]));
    }

    #[test]
    fn test_cli_parses_delay_change() {
        let cli = Cli::try_parse_from([
            "flipbook", "delay", "in.fbk", "-o", "out.fbk", "--change", "-20", "--frames", "0,2",
        ])
        .unwrap();
        match cli.command {
            Commands::Delay { change, frames, .. } => {
                assert_eq!(change, Some(-20));
                assert_eq!(frames, [0, 2]);
            }
            _ => panic!("expected delay"),
        }
    }
}
