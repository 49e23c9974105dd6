//! strata: replay an operation log over an image file.
//!
//! Decodes the input image, appends each `--op` record to a
//! [`PipelineStore`], optionally undoes the last few, evaluates, and
//! writes the result. Useful for:
//!
//! - Scripting repeatable edits as a list of JSON operation records
//! - Dumping every intermediate stage to compare the effect of each step
//! - Measuring per-step durations to find the expensive operations
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin strata -- [OPTIONS] <IMAGE_PATH> -o <OUTPUT>
//! strata photo.png -o out.png \
//!     --op '{"kind":"GreyScale"}' \
//!     --op '{"kind":"SobelEdge","threshold":80}'
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use serde_json::Value;
use strata_pipeline::{
    Completion, EngineConfig, EvaluationRequest, EvaluationResponse, Image, ImageEngine,
    Interpolation, Operation, OperationKind, PipelineError, PipelineStore, StagedEvaluation,
    WebClock, evaluate, evaluate_staged, evaluate_with_diagnostics,
};

/// Replay a log of image operations over an image file.
///
/// Operations are JSON records tagged with their kind, for example
/// `{"kind":"Rotation","angle":30}`. They are applied in the order given.
#[derive(Parser)]
#[command(name = "strata", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    #[arg(required_unless_present = "list_kinds")]
    image_path: Option<PathBuf>,

    /// Where to write the final image. The format follows the extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// One operation record as JSON. Repeat to build the log.
    #[arg(long = "op", value_name = "JSON")]
    ops: Vec<String>,

    /// A file holding a JSON array of operation records, appended before
    /// any `--op`.
    #[arg(long, value_name = "PATH")]
    ops_file: Option<PathBuf>,

    /// Undo this many operations from the end of the log before
    /// evaluating.
    #[arg(long, default_value_t = 0)]
    undo: usize,

    /// Write every intermediate image into this directory.
    #[arg(long, value_name = "DIR", conflicts_with = "diagnostics")]
    stages_dir: Option<PathBuf>,

    /// Sampling for rotation and shear.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_INTERPOLATION)]
    interpolation: Sampling,

    /// RGBA fill for uncovered canvas after rotation or shear.
    #[arg(long, value_delimiter = ',', default_values_t = EngineConfig::DEFAULT_FILL)]
    fill: Vec<u8>,

    /// Base seed for salt and pepper noise.
    #[arg(long, default_value_t = EngineConfig::DEFAULT_NOISE_SEED)]
    seed: u64,

    /// Full engine config as a JSON string.
    ///
    /// When provided, `--interpolation`, `--fill` and `--seed` are
    /// ignored. Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print per-step timing diagnostics.
    #[arg(long)]
    diagnostics: bool,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long, requires = "diagnostics")]
    json: bool,

    /// List every operation kind with its parameters, then exit.
    #[arg(long)]
    list_kinds: bool,

    /// More logging (`-v` debug, `-vv` trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Sampling selection for rotation and shear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Sampling {
    /// Closest source pixel.
    Nearest,
    /// Blend of the four surrounding source pixels.
    Bilinear,
}

/// Maps an [`Interpolation`] to the local CLI [`Sampling`] enum.
const fn sampling_from_engine(interpolation: Interpolation) -> Sampling {
    match interpolation {
        Interpolation::Nearest => Sampling::Nearest,
        Interpolation::Bilinear => Sampling::Bilinear,
    }
}

const CLI_DEFAULT_INTERPOLATION: Sampling =
    sampling_from_engine(EngineConfig::DEFAULT_INTERPOLATION);

/// Build an [`EngineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual engine flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let fill = <[u8; 4]>::try_from(cli.fill.as_slice())
        .map_err(|_| format!("--fill needs 4 values, got {}", cli.fill.len()))?;

    Ok(EngineConfig {
        interpolation: match cli.interpolation {
            Sampling::Nearest => Interpolation::Nearest,
            Sampling::Bilinear => Interpolation::Bilinear,
        },
        fill,
        noise_seed: cli.seed,
    })
}

/// Turn one JSON record into an [`Operation`].
///
/// The record's `kind` names the operation; every other field is a
/// parameter and must match that kind's parameter set exactly.
fn operation_from_record(record: &Value) -> Result<Operation, String> {
    let Some(object) = record.as_object() else {
        return Err(format!("operation record must be a JSON object, got {record}"));
    };
    let mut params = object.clone();
    let kind = match params.remove("kind") {
        Some(Value::String(kind)) => kind,
        Some(other) => return Err(format!("operation kind must be a string, got {other}")),
        None => return Err(format!("operation record has no \"kind\": {record}")),
    };
    Operation::from_parts(&kind, &params).map_err(|e| e.to_string())
}

/// Collect the operation log: the `--ops-file` array first, then each
/// `--op` in order.
fn operations_from_cli(cli: &Cli) -> Result<Vec<Operation>, String> {
    let mut operations = Vec::new();

    if let Some(ref path) = cli.ops_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        let records: Vec<Value> = serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()))?;
        for (i, record) in records.iter().enumerate() {
            let op = operation_from_record(record)
                .map_err(|e| format!("{} record {i}: {e}", path.display()))?;
            operations.push(op);
        }
    }

    for (i, text) in cli.ops.iter().enumerate() {
        let record: Value =
            serde_json::from_str(text).map_err(|e| format!("--op #{}: {e}", i + 1))?;
        let op = operation_from_record(&record).map_err(|e| format!("--op #{}: {e}", i + 1))?;
        operations.push(op);
    }

    Ok(operations)
}

/// Install the `env_logger` backend. `RUST_LOG` takes precedence over the
/// `-v`/`-q` flags.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();
    builder.format(|buf, record| {
        writeln!(buf, "[{}] {}", record.level(), record.args())?;
        buf.flush()?;
        Ok(())
    });
    let _ = builder.try_init();
}

fn print_kinds() {
    println!("{:<26} Parameters", "Kind");
    println!("{}", "-".repeat(60));
    for kind in OperationKind::ALL {
        println!("{:<26} {}", kind.name(), kind.fields().join(", "));
    }
}

/// Save `image`, dropping alpha for formats that cannot carry it.
fn save_image(image: &Image, path: &Path) -> Result<(), image::ImageError> {
    match image::ImageFormat::from_path(path) {
        Ok(image::ImageFormat::Jpeg) => {
            image::DynamicImage::ImageRgba8(image.clone())
                .to_rgb8()
                .save(path)
        }
        _ => image.save(path),
    }
}

/// Evaluate `request` the way the flags ask for: plain, with per-step
/// diagnostics, or keeping every stage on disk.
fn run_request(
    cli: &Cli,
    engine: &ImageEngine,
    request: &EvaluationRequest,
) -> Result<EvaluationResponse, String> {
    let (base, operations) = (&request.base, &request.operations);

    let result: Result<Arc<Image>, PipelineError> = if let Some(ref dir) = cli.stages_dir {
        match evaluate_staged(engine, base, operations) {
            Ok(staged) => {
                write_stages(dir, operations, &staged)?;
                Ok(Arc::clone(staged.output()))
            }
            Err(e) => Err(e),
        }
    } else if cli.diagnostics {
        match evaluate_with_diagnostics(engine, base, operations, &WebClock) {
            Ok((output, diagnostics)) => {
                if cli.json {
                    let json = serde_json::to_string_pretty(&diagnostics)
                        .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
                    println!("{json}");
                } else {
                    println!("{}", diagnostics.report());
                }
                Ok(output)
            }
            Err(e) => Err(e),
        }
    } else {
        evaluate(engine, base, operations)
    };

    Ok(EvaluationResponse {
        revision: request.revision,
        result,
    })
}

/// Write `stage-00-base.png`, `stage-01-<kind>.png`, ... into `dir`.
fn write_stages(
    dir: &Path,
    operations: &[Operation],
    staged: &StagedEvaluation,
) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;

    let names = std::iter::once("base").chain(operations.iter().map(|op| op.kind().name()));
    for (i, name) in names.enumerate() {
        let Some(image) = staged.after(i) else {
            break;
        };
        let path = dir.join(format!("stage-{i:02}-{name}.png"));
        if image.width() == 0 || image.height() == 0 {
            log::warn!("stage {i} ({name}) is empty, skipping {}", path.display());
            continue;
        }
        save_image(image, &path).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::debug!("wrote {}", path.display());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let operations = operations_from_cli(cli)?;

    let Some(ref image_path) = cli.image_path else {
        return Err("No input image given".to_owned());
    };
    let base = image::open(image_path)
        .map_err(|e| format!("Error reading {}: {e}", image_path.display()))?
        .into_rgba8();
    log::info!(
        "Image: {} ({}x{})",
        image_path.display(),
        base.width(),
        base.height()
    );
    log::debug!("Config: {config:?}");

    let mut store = PipelineStore::new(ImageEngine::new(config));
    store.set_base_image(base);
    for operation in operations {
        store
            .append_operation(operation)
            .map_err(|e| format!("Rejected operation: {e}"))?;
    }
    for undone in 0..cli.undo {
        if !store.remove_last_operation() {
            log::warn!("log emptied after {undone} undo(s), ignoring the rest");
            break;
        }
    }
    log::info!("Operations: {}", store.log().len());

    if let Some(request) = store.request_evaluation() {
        let response = run_request(cli, store.engine(), &request)?;
        match store.complete_evaluation(response) {
            Completion::Applied => {}
            Completion::Discarded => return Err("Evaluation result was discarded".to_owned()),
            Completion::Failed(e) => return Err(format!("Pipeline error: {e}")),
        }
    }

    let Some(output) = store.output() else {
        return Err("No output image".to_owned());
    };
    log::info!("Output: {}x{}", output.width(), output.height());

    if let Some(ref path) = cli.output {
        if output.width() == 0 || output.height() == 0 {
            return Err(format!(
                "Output image is empty ({}x{}), not writing {}",
                output.width(),
                output.height(),
                path.display()
            ));
        }
        save_image(output, path).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("Written to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if cli.list_kinds {
        print_kinds();
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
