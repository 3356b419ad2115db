use clap::Parser;
use std::path::PathBuf;
use stroketrace::kurbo::PathEl;
use stroketrace::{load_image, Host, PipelineRunner, RasterView, Stage, StageRecord, TracePath, TracingConfig};

#[derive(Parser)]
#[command(name = "stroketrace", about = "Raster regions to clean vector paths")]
struct Cli {
    /// Input image path (PNG, JPEG, BMP)
    #[arg(short, long)]
    input: PathBuf,

    /// Foreground colour to trace (hex RGB or RGBA, e.g. "000000")
    #[arg(short, long)]
    foreground: Option<String>,

    /// Colour distance tolerance (0.0–1.0)
    #[arg(long)]
    fuzz: Option<f64>,

    /// Scan block size in pixels
    #[arg(long)]
    block: Option<u32>,

    /// JSON preset; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Last stage to run (scan, optimize, split, detect-lines, merge, smooth, remove-tiny)
    #[arg(long, default_value = "remove-tiny")]
    until: Stage,

    /// Print the resulting paths as SVG path data on stdout
    #[arg(long)]
    print_paths: bool,
}

/// Prints one summary line per committed stage.
struct ConsoleHost;

impl Host for ConsoleHost {
    fn commit(&self, record: StageRecord) {
        let (curves, lines) = count_segments(&record.current);
        let strokes = record.current.iter().filter(|p| !p.filled).count();
        let mut line = format!(
            "  {:<12}{} \u{2192} {} paths \u{00b7} {} curves + {} lines",
            title(record.stage),
            record.previous.len(),
            record.current.len(),
            curves,
            lines,
        );
        if strokes > 0 {
            line.push_str(&format!(" \u{00b7} {strokes} strokes"));
        }
        if !record.deviations.is_empty() {
            line.push_str(&format!(" \u{00b7} {} replacements", record.deviations.len()));
        }
        eprintln!("{line}  ({}ms)", record.elapsed.as_millis());
    }

    fn finished(&self, stage: Stage, success: bool) {
        if !success {
            eprintln!("  {:<12}failed", title(stage));
        }
    }
}

fn title(stage: Stage) -> &'static str {
    match stage {
        Stage::Scan => "Scan",
        Stage::Optimize => "Optimize",
        Stage::Split => "Split",
        Stage::DetectLines => "Lines",
        Stage::Merge => "Merge",
        Stage::Smooth => "Smooth",
        Stage::RemoveTiny => "Tiny",
    }
}

/// Count (curves, lines) segments in a set of paths.
fn count_segments(paths: &[TracePath]) -> (usize, usize) {
    let mut curves = 0;
    let mut lines = 0;
    for path in paths {
        for el in path.segments() {
            match el {
                PathEl::CurveTo(..) | PathEl::QuadTo(..) => curves += 1,
                PathEl::LineTo(_) => lines += 1,
                _ => {}
            }
        }
    }
    (curves, lines)
}

/// Parse "rrggbb" or "rrggbbaa", with or without a leading '#'.
fn parse_hex_color(s: &str) -> Result<[u8; 4], String> {
    let hex = s.trim_start_matches('#');
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return Err(format!("expected 6 or 8 hex digits, got '{s}'"));
    }
    let mut rgba = [0, 0, 0, 255];
    for (i, channel) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
        *channel = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|e| format!("'{s}': {e}"))?;
    }
    Ok(rgba)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TracingConfig::from_json_file(path)?,
        None => TracingConfig::default(),
    };
    if let Some(fg) = &cli.foreground {
        config.scan.foreground = parse_hex_color(fg)?;
    }
    if let Some(fuzz) = cli.fuzz {
        config.scan.fuzz = fuzz;
    }
    if let Some(block) = cli.block {
        config.scan.block_width = block;
        config.scan.block_height = block;
    }

    eprintln!();
    eprintln!("  stroketrace \u{00b7} {}", cli.input.display());
    eprintln!();

    let image = load_image(&cli.input)?;
    let raster = RasterView::from_image(&image)?;
    eprintln!("  Load        {}x{} px, {:?}", raster.width(), raster.height(), raster.layout());

    let mut runner = PipelineRunner::new(config).with_raster(raster);
    let host = ConsoleHost;
    let mut stage = Some(Stage::Scan);
    while let Some(current) = stage {
        runner.run(current, false, &host)?;
        stage = if current == cli.until { None } else { current.next() };
    }

    let total = runner.paths().len();
    let strokes = runner.paths().iter().filter(|p| !p.filled).count();
    eprintln!();
    eprintln!("  \u{2713} {} paths ({} filled, {} strokes)", total, total - strokes, strokes);
    eprintln!();

    if cli.print_paths {
        for path in runner.paths() {
            if path.filled {
                println!("{}", path.to_bezpath().to_svg());
            } else {
                println!("{}  width={:.2}", path.to_bezpath().to_svg(), path.line_width);
            }
        }
    }
    Ok(())
}
