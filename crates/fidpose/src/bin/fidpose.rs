//! fidpose CLI: marker pose estimation, marker rendering and normal statistics.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use fidpose::aruco::{render_marker, PredefinedDictionary};
use fidpose::pose::{average_normal, facing_angles};
use fidpose::sink::{read_pose_csv, write_report_json, CsvSink};
use fidpose::{
    load_camera, load_detector_params, load_pipeline_config, overlay, FrameFailure,
    MarkerPipeline, PipelineConfig, RunReport,
};
use nalgebra::Vector3;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "fidpose")]
#[command(about = "Detect ArUco markers in fisheye images and estimate their poses")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect markers and write one pose row per marker.
    Detect(DetectArgs),

    /// Render a dictionary marker to an image file.
    Render(RenderArgs),

    /// Average marker normal and per-marker facing angles from a pose CSV.
    Normals(NormalsArgs),
}

#[derive(Debug, Args)]
struct DetectArgs {
    /// Camera calibration JSON.
    #[arg(short, long)]
    camera: PathBuf,

    /// Pipeline config JSON; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dictionary name (e.g. DICT_4X4_50) or OpenCV id.
    #[arg(short, long)]
    dictionary: Option<PredefinedDictionary>,

    /// Detector parameters JSON; missing keys keep their defaults.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Printed marker side length; translations use the same unit.
    #[arg(short = 'l', long)]
    marker_length: Option<f64>,

    /// Pose CSV output (stdout when omitted).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// JSON report with full per-frame results and per-image errors.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write undistorted images with marker outlines and axes here.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Keep rejected candidates (report and overlays).
    #[arg(short = 'r', long)]
    rejected: bool,

    /// Input images.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(short, long, default_value = "DICT_4X4_50")]
    dictionary: PredefinedDictionary,

    /// Marker id.
    #[arg(short, long)]
    id: u32,

    /// Output side length in pixels.
    #[arg(long, default_value_t = 200)]
    pixels: usize,

    /// Border width in cells.
    #[arg(long, default_value_t = 1)]
    border_bits: usize,

    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct NormalsArgs {
    /// CSV with an `id,tx,ty,tz,rx,ry,rz` header.
    csv: PathBuf,
}

/// `RUST_LOG` overrides `-v` in the `tracing` build.
fn init_logging(verbose: u8) -> CliResult<()> {
    let level = fidpose::core::verbosity_level(verbose);
    #[cfg(feature = "tracing")]
    {
        tracing_log::LogTracer::init().map_err(|e| e.to_string())?;
        fidpose::core::init_tracing(level, false)?;
    }
    #[cfg(not(feature = "tracing"))]
    fidpose::core::init_with_level(level).map_err(|e| e.to_string())?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Render(args) => run_render(&args),
        Commands::Normals(args) => run_normals(&args),
    }
}

fn pipeline_config(args: &DetectArgs) -> CliResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dict) = args.dictionary {
        config.dictionary = dict.into();
    }
    if let Some(path) = &args.params {
        config.detector = load_detector_params(path)?;
    }
    if let Some(len) = args.marker_length {
        config.marker_length = len;
    }
    config.keep_rejected |= args.rejected;
    Ok(config)
}

fn overlay_path(dir: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    dir.join(format!("{stem}_markers.png"))
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let camera = load_camera(&args.camera)?;
    let config = pipeline_config(args)?;
    let pipeline = MarkerPipeline::new(camera, &config)?;
    if let Some(dir) = &args.overlay_dir {
        fs::create_dir_all(dir)?;
    }

    let out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    let mut csv = CsvSink::new(out)?;
    let mut report = RunReport::default();

    for path in &args.images {
        let name = path.display().to_string();
        let _scope = fidpose::core::frame_scope(&name);
        let raw = match overlay::load_rgb(path) {
            Ok(img) => img,
            Err(err) => {
                log::warn!("cannot read image: {err}");
                report.failures.push(FrameFailure {
                    frame: name,
                    error: err.to_string(),
                });
                continue;
            }
        };
        let undistorted = match pipeline.undistort(&raw.view()) {
            Ok(img) => img,
            Err(err) => {
                log::warn!("skipped: {err}");
                report.record(&name, Err(err));
                continue;
            }
        };
        let result = pipeline.process_undistorted(&name, &undistorted.view());
        csv.write_frame(&result)?;

        if let Some(dir) = &args.overlay_dir {
            let intrinsics = pipeline.rectified_intrinsics();
            if let Some(canvas) =
                overlay::draw_frame(&undistorted, &result, &intrinsics, config.marker_length)
            {
                let target = overlay_path(dir, path);
                canvas.save(&target)?;
                log::debug!("overlay written to {}", target.display());
            }
        }
        report.frames.push(result);
    }

    let rows = csv.rows();
    csv.finish()?;
    if let Some(path) = &args.report {
        write_report_json(BufWriter::new(File::create(path)?), &report)?;
        log::info!("report written to {}", path.display());
    }
    log::info!(
        "{} frames processed, {} skipped, {} poses written",
        report.frames.len(),
        report.failures.len(),
        rows
    );
    Ok(())
}

fn run_render(args: &RenderArgs) -> CliResult<()> {
    let dict = args.dictionary.dictionary();
    let marker = render_marker(&dict, args.id, args.pixels, args.border_bits)?;
    let img = overlay::to_image_gray(&marker).ok_or("rendered marker has an invalid size")?;
    img.save(&args.out)?;
    log::info!("{} id {} written to {}", dict.name, args.id, args.out.display());
    Ok(())
}

fn run_normals(args: &NormalsArgs) -> CliResult<()> {
    let records = read_pose_csv(BufReader::new(File::open(&args.csv)?))?;
    let rvecs: Vec<Vector3<f64>> = records.iter().map(|r| Vector3::from(r.rvec)).collect();
    let stats = average_normal(&rvecs).ok_or("no usable poses in the CSV")?;

    println!("poses: {}", stats.count);
    println!(
        "average normal (x,y,z): ({:.4} {:.4} {:.4})",
        stats.mean.x, stats.mean.y, stats.mean.z
    );
    println!(
        "variance (x,y,z): ({:.4} {:.4} {:.4})",
        stats.variance.x, stats.variance.y, stats.variance.z
    );
    println!("id,rotation_z,rotation_to_normal");
    for (r, rvec) in records.iter().zip(&rvecs) {
        let a = facing_angles(rvec);
        println!("{},{:.6},{:.6}", r.id, a.around_z, a.to_normal);
    }
    Ok(())
}
