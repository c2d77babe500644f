//! patrolmap CLI — fuse multi-camera detections and plan inspection routes.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use patrolmap_core::{
    export, fuse, nearest_point_index, plan_route, CalibrationTable, ConsensusPoint,
    DetectionBatches, FirstSolutionStrategy, FusionConfig, FusionResult, GroundContact,
    MergeConfig, PlannedRoute, ProjectConfig, RouteConfig, Termination,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "patrolmap")]
#[command(
    about = "Fuse multi-camera ground-plane detections and plan fixed-endpoint inspection routes"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project per-camera detections to the ground plane and merge duplicates.
    Fuse(CliFuseArgs),

    /// Plan a fixed-endpoint route over previously fused points.
    Route(CliRouteArgs),

    /// Full pipeline: fuse, then route, in one invocation.
    Run(CliRunArgs),
}

#[derive(Debug, Clone, Args)]
struct CliFuseArgs {
    /// Path to the calibration table (JSON, camera id → 3×3 homography).
    #[arg(long)]
    calibration: PathBuf,

    /// Path to the detection batches (JSON, camera id → detection list).
    #[arg(long)]
    detections: PathBuf,

    /// Path to write the consensus points.
    #[arg(long)]
    out: PathBuf,

    /// Output format for the consensus points.
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Csv)]
    format: OutputFormatArg,

    #[command(flatten)]
    fusion: CliFusionFlags,
}

#[derive(Debug, Clone, Args)]
struct CliFusionFlags {
    /// Vertical reference for the ground-contact pixel.
    #[arg(long, value_enum, default_value_t = GroundContactArg::BottomEdge)]
    ground_contact: GroundContactArg,

    /// Ignore detections below this confidence.
    #[arg(long, default_value = "0.0")]
    min_conf: f32,

    /// Merge radius for classes without an explicit override (world units).
    #[arg(long, default_value = "10.0")]
    default_radius: f64,

    /// Per-class merge radius as CLASS=RADIUS (repeatable).
    #[arg(long = "radius", value_parser = parse_radius_spec)]
    radius: Vec<(u32, f64)>,
}

impl CliFusionFlags {
    fn to_core(&self) -> FusionConfig {
        let mut merge = MergeConfig {
            default_radius: self.default_radius,
            ..Default::default()
        };
        for &(class_id, radius) in &self.radius {
            merge.radius_by_class.insert(class_id, radius);
        }

        FusionConfig {
            project: ProjectConfig {
                ground_contact: self.ground_contact.to_core(),
                min_confidence: self.min_conf,
            },
            merge,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliRouteArgs {
    /// Path to consensus points (JSON array, as written by `fuse --format json`).
    #[arg(long)]
    points: PathBuf,

    /// Path to write the route table (CSV).
    #[arg(long)]
    out: PathBuf,

    /// Optional path for the structured route document (JSON).
    #[arg(long)]
    json_out: Option<PathBuf>,

    #[command(flatten)]
    endpoints: CliEndpointFlags,

    #[command(flatten)]
    solver: CliSolverFlags,
}

#[derive(Debug, Clone, Args)]
struct CliEndpointFlags {
    /// Start point index.
    #[arg(long, conflicts_with = "start_at")]
    start: Option<usize>,

    /// End point index.
    #[arg(long, conflicts_with = "end_at")]
    end: Option<usize>,

    /// Start at the point nearest these world coordinates, as X,Y.
    #[arg(long, value_parser = parse_xy)]
    start_at: Option<(f64, f64)>,

    /// End at the point nearest these world coordinates, as X,Y.
    #[arg(long, value_parser = parse_xy)]
    end_at: Option<(f64, f64)>,
}

impl CliEndpointFlags {
    /// Resolve the two anchors against the fused point set.
    fn resolve(&self, points: &[ConsensusPoint]) -> CliResult<(usize, usize)> {
        let start = resolve_endpoint(points, self.start, self.start_at, "start")?;
        let end = resolve_endpoint(points, self.end, self.end_at, "end")?;
        Ok((start, end))
    }
}

fn resolve_endpoint(
    points: &[ConsensusPoint],
    index: Option<usize>,
    at: Option<(f64, f64)>,
    name: &str,
) -> CliResult<usize> {
    if let Some(index) = index {
        return Ok(index);
    }
    if let Some((x, y)) = at {
        return nearest_point_index(points, x, y).ok_or_else(|| -> CliError {
            format!("--{}-at given but there are no points", name).into()
        });
    }
    Err(format!("provide --{} or --{}-at", name, name).into())
}

#[derive(Debug, Clone, Args)]
struct CliSolverFlags {
    /// Wall-clock budget for the route search, in milliseconds.
    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Construction strategy for the first heuristic solution.
    #[arg(long, value_enum, default_value_t = FirstSolutionArg::CheapestInsertion)]
    first_solution: FirstSolutionArg,

    /// Largest point count solved exactly.
    #[arg(long, default_value = "13")]
    exact_threshold: usize,

    /// Seed for restart perturbation.
    #[arg(long, default_value = "0")]
    seed: u64,
}

impl CliSolverFlags {
    fn to_core(&self) -> RouteConfig {
        RouteConfig {
            time_budget: self.time_budget_ms.map(std::time::Duration::from_millis),
            first_solution: self.first_solution.to_core(),
            exact_threshold: self.exact_threshold,
            seed: self.seed,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliRunArgs {
    /// Path to the calibration table (JSON, camera id → 3×3 homography).
    #[arg(long)]
    calibration: PathBuf,

    /// Path to the detection batches (JSON, camera id → detection list).
    #[arg(long)]
    detections: PathBuf,

    /// Path to write the route table (CSV).
    #[arg(long)]
    route_out: PathBuf,

    /// Optional path to also write the fused consensus points (JSON).
    #[arg(long)]
    points_out: Option<PathBuf>,

    #[command(flatten)]
    fusion: CliFusionFlags,

    #[command(flatten)]
    endpoints: CliEndpointFlags,

    #[command(flatten)]
    solver: CliSolverFlags,
}

// ── Flag enums ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GroundContactArg {
    BottomEdge,
    BoxCenter,
}

impl GroundContactArg {
    fn to_core(self) -> GroundContact {
        match self {
            Self::BottomEdge => GroundContact::BottomEdge,
            Self::BoxCenter => GroundContact::BoxCenter,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FirstSolutionArg {
    CheapestInsertion,
    NearestNeighbor,
}

impl FirstSolutionArg {
    fn to_core(self) -> FirstSolutionStrategy {
        match self {
            Self::CheapestInsertion => FirstSolutionStrategy::CheapestInsertion,
            Self::NearestNeighbor => FirstSolutionStrategy::NearestNeighbor,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Csv,
    Json,
}

// ── Flag parsers ─────────────────────────────────────────────────────────

fn parse_radius_spec(s: &str) -> Result<(u32, f64), String> {
    let (class_str, radius_str) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS=RADIUS, got {:?}", s))?;
    let class_id: u32 = class_str
        .trim()
        .parse()
        .map_err(|_| format!("bad class id {:?}", class_str))?;
    let radius: f64 = radius_str
        .trim()
        .parse()
        .map_err(|_| format!("bad radius {:?}", radius_str))?;
    if radius <= 0.0 {
        return Err(format!("radius must be positive, got {}", radius));
    }
    Ok((class_id, radius))
}

fn parse_xy(s: &str) -> Result<(f64, f64), String> {
    let (x_str, y_str) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {:?}", s))?;
    let x: f64 = x_str.trim().parse().map_err(|_| format!("bad x {:?}", x_str))?;
    let y: f64 = y_str.trim().parse().map_err(|_| format!("bad y {:?}", y_str))?;
    Ok((x, y))
}

// ── Entry point ──────────────────────────────────────────────────────────

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fuse(args) => run_fuse(&args),
        Commands::Route(args) => run_route(&args),
        Commands::Run(args) => run_pipeline(&args),
    }
}

// ── fuse ─────────────────────────────────────────────────────────────────

fn load_and_fuse(
    calibration: &Path,
    detections: &Path,
    fusion: &CliFusionFlags,
) -> CliResult<FusionResult> {
    let table = CalibrationTable::from_json_file(calibration)?;
    tracing::info!(
        "calibration table: {} cameras from {}",
        table.len(),
        calibration.display(),
    );

    let batches = DetectionBatches::from_json_file(detections)?;
    let result = fuse(&table, &batches, &fusion.to_core());

    if !result.report.cameras_skipped.is_empty() {
        tracing::warn!(
            "skipped uncalibrated cameras: {:?}",
            result.report.cameras_skipped,
        );
    }
    if result.report.dropped_degenerate > 0 {
        tracing::warn!(
            "dropped {} detections projecting to infinity",
            result.report.dropped_degenerate,
        );
    }

    Ok(result)
}

fn run_fuse(args: &CliFuseArgs) -> CliResult<()> {
    let result = load_and_fuse(&args.calibration, &args.detections, &args.fusion)?;

    let output = match args.format {
        OutputFormatArg::Csv => export::consensus_csv(&result.consensus),
        OutputFormatArg::Json => export::consensus_json(&result.consensus)?,
    };
    std::fs::write(&args.out, output)?;
    tracing::info!(
        "{} consensus points written to {}",
        result.consensus.len(),
        args.out.display(),
    );

    Ok(())
}

// ── route ────────────────────────────────────────────────────────────────

fn plan_or_explain(
    points: &[ConsensusPoint],
    start: usize,
    end: usize,
    config: &RouteConfig,
) -> CliResult<PlannedRoute> {
    match plan_route(points, start, end, config) {
        Ok(route) => {
            if route.termination == Termination::BudgetExhausted {
                tracing::warn!(
                    "search stopped by the time budget; a larger --time-budget-ms may shorten the route",
                );
            }
            Ok(route)
        }
        Err(e) if e.is_infeasible_input() => Err(format!("no feasible route: {}", e).into()),
        Err(e) => Err(format!("route search failed (not an input problem): {}", e).into()),
    }
}

fn write_route(
    points: &[ConsensusPoint],
    route: &PlannedRoute,
    out: &Path,
    json_out: Option<&Path>,
) -> CliResult<()> {
    std::fs::write(out, export::route_csv(points, route))?;
    tracing::info!(
        "route of {} stops (length {:.2}) written to {}",
        route.order.len(),
        route.length,
        out.display(),
    );

    if let Some(json_path) = json_out {
        std::fs::write(json_path, export::route_json(points, route)?)?;
        tracing::info!("route document written to {}", json_path.display());
    }

    Ok(())
}

fn run_route(args: &CliRouteArgs) -> CliResult<()> {
    let json = std::fs::read_to_string(&args.points)?;
    let points: Vec<ConsensusPoint> = serde_json::from_str(&json)?;
    tracing::info!("{} points loaded from {}", points.len(), args.points.display());

    let (start, end) = args.endpoints.resolve(&points)?;
    let route = plan_or_explain(&points, start, end, &args.solver.to_core())?;

    write_route(&points, &route, &args.out, args.json_out.as_deref())
}

// ── run ──────────────────────────────────────────────────────────────────

fn run_pipeline(args: &CliRunArgs) -> CliResult<()> {
    let result = load_and_fuse(&args.calibration, &args.detections, &args.fusion)?;

    if let Some(points_path) = &args.points_out {
        std::fs::write(points_path, export::consensus_json(&result.consensus)?)?;
        tracing::info!("consensus points written to {}", points_path.display());
    }

    let (start, end) = args.endpoints.resolve(&result.consensus)?;
    let route = plan_or_explain(&result.consensus, start, end, &args.solver.to_core())?;

    write_route(&result.consensus, &route, &args.route_out, None)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_spec_parses() {
        assert_eq!(parse_radius_spec("2=20"), Ok((2, 20.0)));
        assert_eq!(parse_radius_spec(" 4 = 12.5 "), Ok((4, 12.5)));
        assert!(parse_radius_spec("2").is_err());
        assert!(parse_radius_spec("x=5").is_err());
        assert!(parse_radius_spec("2=-1").is_err());
    }

    #[test]
    fn xy_parses() {
        assert_eq!(parse_xy("1.5,-2"), Ok((1.5, -2.0)));
        assert!(parse_xy("1.5").is_err());
        assert!(parse_xy("a,b").is_err());
    }
}
