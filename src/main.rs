//! Topogrid CLI - Topographic Grid Refinement
//!
//! Command-line interface for refining reduced datasets into topographic grids
//! and evaluating how well they preserve neighbourhoods.

use clap::{Args, Parser, Subcommand};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use topogrid::eval::{
    calc_neighborhood_preservation, distance_distortion, floyd_warshall_with_progress,
};
use topogrid::storage::{
    load_refined_points, synthetic_blobs, write_distance_matrix, write_refined_csv,
};
use topogrid::{Config, Dataset, Grid, GridSnapshot, Refiner, Result, TopoError};

#[derive(Parser)]
#[command(name = "topogrid")]
#[command(author = "Topogrid Contributors")]
#[command(version)]
#[command(about = "Topographic grid refinement for 2D embeddings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Refine a reduced dataset into a topographic grid
    Refine(RefineArgs),

    /// Generate a synthetic reduced dataset of gaussian blobs
    Generate {
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of points
        #[arg(short = 'n', long, default_value = "300")]
        points: usize,

        /// Number of clusters
        #[arg(short, long, default_value = "4")]
        clusters: usize,

        /// Number of features (at least 2)
        #[arg(short, long, default_value = "8")]
        dimension: usize,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },

    /// Show dataset and initial grid statistics
    Info {
        /// Input CSV file
        input: PathBuf,

        /// Grid rows (default: 22)
        #[arg(short, long, default_value = "22")]
        rows: usize,

        /// Grid columns (default: same as rows)
        #[arg(long)]
        columns: Option<usize>,
    },
}

#[derive(Args)]
struct RefineArgs {
    /// Input CSV file (index, x, y, features...)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output CSV file (index, x, y, height, features...)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid rows
    #[arg(short, long)]
    rows: Option<usize>,

    /// Grid columns (default: same as rows)
    #[arg(long)]
    columns: Option<usize>,

    /// Number of refinement iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Neighbourhood radius in cell widths
    #[arg(long)]
    max_distance: Option<f64>,

    /// Percentage of cells updated per iteration
    #[arg(long)]
    cut: Option<f64>,

    /// Write a JSON snapshot of the refined grid
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the per-iteration diagnostics as JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Evaluate neighbourhood preservation after refinement
    #[arg(short, long)]
    evaluate: bool,

    /// Write the geodesic distance matrix (implies --evaluate)
    #[arg(long)]
    matrix: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Refine(args) => refine(args),

        Commands::Generate {
            output,
            points,
            clusters,
            dimension,
            seed,
        } => generate(output, points, clusters, dimension, seed),

        Commands::Info {
            input,
            rows,
            columns,
        } => show_info(input, rows, columns),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn bar_style() -> Result<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .map(|style| style.progress_chars("█▓▒░  "))
        .map_err(|e| TopoError::Config(e.to_string()))
}

/// Merges the optional configuration file with the command-line overrides.
fn resolve_config(args: &RefineArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(rows) = args.rows {
        config.grid.rows = rows;
    }
    if args.columns.is_some() {
        config.grid.columns = args.columns;
    }
    if let Some(iterations) = args.iterations {
        config.refinement.iterations = iterations;
    }
    if let Some(max_distance) = args.max_distance {
        config.refinement.max_distance = max_distance;
    }
    if let Some(cut) = args.cut {
        config.refinement.cut_list_at = cut;
    }
    if args.input.is_some() {
        config.io.input = args.input.clone();
    }
    if args.output.is_some() {
        config.io.output = args.output.clone();
    }
    if args.snapshot.is_some() {
        config.io.snapshot = args.snapshot.clone();
    }
    if args.matrix.is_some() {
        config.io.distance_matrix = args.matrix.clone();
    }

    config.validate()?;
    Ok(config)
}

fn refine(args: RefineArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = resolve_config(&args)?;
    let evaluate = args.evaluate || config.io.distance_matrix.is_some();

    let input = config
        .io
        .input
        .clone()
        .ok_or_else(|| TopoError::Config("no input file given".to_string()))?;
    let output = config
        .io
        .output
        .clone()
        .ok_or_else(|| TopoError::Config("no output file given".to_string()))?;

    println!("Topogrid Grid Refinement");
    println!("   Input: {}", input.display());
    println!();

    // Step 1: Load dataset
    let dataset = Dataset::load_csv(&input)?;
    println!(
        "✓ Loaded {} rows ({} features)",
        format_number(dataset.len()),
        dataset.dimension()
    );

    // Step 2: Build grid
    let mut grid = Grid::from_config(&config.grid, dataset.dimension())?;
    grid.init_points_to_right_cell(&dataset)?;
    println!(
        "✓ Built {}x{} grid ({} cells, sparsity {:.3})",
        grid.rows,
        grid.columns,
        format_number(grid.total_cells()),
        grid.sparsity()
    );

    // Step 3: Refine
    let refiner = Refiner::new(config.refinement.clone());
    let pb = ProgressBar::new(config.refinement.iterations as u64);
    pb.set_style(bar_style()?);
    pb.set_message("Refining grid...");

    let summary = refiner.run_with_progress(&mut grid, |report| {
        pb.set_message(format!(
            "Refining grid... error {:.4}, ICV {:.4}, {} shifts",
            report.global_error, report.global_icv, report.shifts
        ));
        pb.inc(1);
    })?;

    pb.finish_and_clear();
    println!(
        "✓ Refined grid in {} iterations ({} points moved)",
        summary.iterations.len(),
        format_number(summary.total_shifts())
    );

    // Step 4: Write results
    write_refined_csv(&grid, &output)?;
    println!("✓ Wrote refined points to {}", output.display());

    if let Some(path) = &config.io.snapshot {
        GridSnapshot::capture(&grid).save(path)?;
        println!("✓ Wrote grid snapshot to {}", path.display());
    }

    if let Some(path) = &args.summary {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &summary)?;
        writer.flush()?;
        println!("✓ Wrote run summary to {}", path.display());
    }

    // Step 5: Evaluate
    if evaluate {
        let pb = ProgressBar::new(grid.total_cells() as u64);
        pb.set_style(bar_style()?);
        pb.set_message("Computing geodesic distances...");

        let geodesic = floyd_warshall_with_progress(&grid, |k| pb.set_position(k as u64))?;
        pb.finish_and_clear();
        println!("✓ Computed geodesic distances");

        if let Some(path) = &config.io.distance_matrix {
            write_distance_matrix(&geodesic, path)?;
            println!("✓ Wrote distance matrix to {}", path.display());
        }

        let before = dataset.to_datapoints();
        let after = load_refined_points(&output)?;
        let preservation = calc_neighborhood_preservation(&geodesic, &grid, &before, &after)?;
        let distortion = distance_distortion(&geodesic, &grid, &before, &after)?;

        println!();
        println!("Neighbourhood preservation ({} points)", format_number(preservation.points));
        println!(
            "   Reduced:  precision {:.4}, recall {:.4}, avg size {:.2}",
            preservation.precision_reduced, preservation.recall_reduced, preservation.avg_size_reduced
        );
        println!(
            "   Geodesic: precision {:.4}, recall {:.4}, avg size {:.2}",
            preservation.precision_geodesic,
            preservation.recall_geodesic,
            preservation.avg_size_geodesic
        );
        println!("   Original: avg size {:.2}", preservation.avg_size_original);
        println!(
            "Distance distortion ({} pairs): reduced {:.4}, geodesic {:.4}",
            format_number(distortion.pairs),
            distortion.reduced_mean,
            distortion.geodesic_mean
        );
    }

    // Summary
    println!();
    println!("Refinement complete in {}", HumanDuration(start_time.elapsed()));
    if let Some(last) = summary.last() {
        println!("   Global error: {:.6}", last.global_error);
        println!("   Global ICV: {:.6}", last.global_icv);
        println!("   Sparsity: {:.3}", last.sparsity);
    }
    println!("   Output: {}", output.display());

    Ok(())
}

fn generate(output: PathBuf, points: usize, clusters: usize, dimension: usize, seed: u64) -> Result<()> {
    let dataset = synthetic_blobs(points, clusters, dimension, seed)?;
    dataset.save_csv(&output)?;
    println!(
        "✓ Generated {} points in {} clusters ({} features) to {}",
        format_number(dataset.len()),
        clusters,
        dimension,
        output.display()
    );
    Ok(())
}

fn show_info(input: PathBuf, rows: usize, columns: Option<usize>) -> Result<()> {
    let dataset = Dataset::load_csv(&input)?;
    let (min_x, min_y, max_x, max_y) = dataset.bounds();

    println!("Dataset: {:?}", input);
    println!("  Rows: {}", format_number(dataset.len()));
    println!("  Features: {}", dataset.dimension());
    println!("  Extent: [{:.4}, {:.4}] x [{:.4}, {:.4}]", min_x, max_x, min_y, max_y);

    let mut grid = Grid::autogenerated(rows, columns, dataset.dimension(), None, None)?;
    grid.init_points_to_right_cell(&dataset)?;
    grid.calc_all_representatives()?;

    let occupied = grid.cells.iter().filter(|c| !c.is_empty()).count();
    let fullest = grid.cells.iter().map(|c| c.point_count()).max().unwrap_or(0);

    println!("Initial grid: {}x{}", grid.rows, grid.columns);
    println!("  Cell width: {:.4}", grid.cellwidth);
    println!("  Occupied cells: {} / {}", occupied, grid.total_cells());
    println!("  Sparsity: {:.3}", grid.sparsity());
    println!("  Largest cell: {} points", fullest);
    println!("  Neutral variance: {:.6}", grid.neutral_variance);
    println!("  Global ICV: {:.6}", grid.global_icv());

    Ok(())
}

/// Format large numbers with commas for readability
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
