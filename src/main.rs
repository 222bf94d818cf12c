//! laidout-pdf CLI - renders a laid-out document definition to tagged PDF

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use laidout_pdf::document::{parse_margins, parse_page_size};
use laidout_pdf::model::Orientation;
use laidout_pdf::{Overrides, render_document_file_with_progress};

#[derive(Parser)]
#[command(name = "laidout-pdf")]
#[command(version)]
#[command(about = "Render laid-out pages to tagged, accessible PDF", long_about = None)]
struct Cli {
    /// Input document definition (JSON)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output PDF (defaults to the input path with a .pdf extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Page size: a name such as A4, or WIDTHxHEIGHT in points (HEIGHT may be "auto")
    #[arg(long, value_name = "SIZE")]
    page_size: Option<String>,

    /// Page orientation
    #[arg(long, value_enum)]
    orientation: Option<OrientationArg>,

    /// Margins in points: "40", "40,20" or "left,top,right,bottom"
    #[arg(long, value_name = "MARGINS")]
    margins: Option<String>,

    /// Write an untagged PDF
    #[arg(long)]
    no_tags: bool,

    /// Additional directory to scan for fonts (repeatable)
    #[arg(long = "font-dir", value_name = "DIR")]
    font_dirs: Vec<PathBuf>,

    /// Family used when a requested font is unavailable
    #[arg(long, value_name = "FAMILY")]
    default_font: Option<String>,

    /// Print render progress to stderr
    #[arg(long)]
    progress: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
}

impl From<OrientationArg> for Orientation {
    fn from(value: OrientationArg) -> Self {
        match value {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> laidout_pdf::Result<()> {
    let overrides = Overrides {
        page_size: cli.page_size.as_deref().map(parse_page_size).transpose()?,
        orientation: cli.orientation.map(Orientation::from),
        margins: cli.margins.as_deref().map(parse_margins).transpose()?,
        tagged: cli.no_tags.then_some(false),
        default_font: cli.default_font,
        font_dirs: cli.font_dirs,
    };
    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    let mut report = |fraction: f32| {
        eprint!("\rRendering... {:>3.0}%", fraction * 100.0);
        let _ = std::io::stderr().flush();
    };
    let progress: Option<&mut dyn FnMut(f32)> = if cli.progress { Some(&mut report) } else { None };

    let outcome = render_document_file_with_progress(&cli.input, &output, &overrides, progress)?;
    if cli.progress {
        eprintln!();
    }

    for warning in &outcome.warnings {
        log::info!("Tag warning: {warning}");
    }
    println!(
        "{} -> {} ({} pages, {} tag warnings)",
        cli.input.display(),
        output.display(),
        outcome.pages_rendered,
        outcome.warnings.len()
    );
    Ok(())
}
