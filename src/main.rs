use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use pdfpres::overview::{GridGeometry, OverviewGrid, OverviewRenderer};
use pdfpres::panic_handler;
use pdfpres::pdf::PageCache;
use pdfpres::presentation::Presentation;
use pdfpres::settings::{self, Settings};

#[derive(Parser, Debug)]
#[command(name = "pdfpres", version, about = "Dual-window PDF presenter")]
struct Args {
    /// PDF file to present
    file: PathBuf,

    /// Pixel height pages are rendered at
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Width of the overview grid in pixels
    #[arg(short = 'w', long)]
    overview_page_width: Option<u32>,

    /// Do not compress pages in the background
    #[arg(long)]
    no_cache: bool,

    /// Write the prerendered overview grid to this PNG file
    #[arg(long)]
    overview_out: Option<PathBuf>,

    #[arg(long, default_value = "pdfpres.log")]
    log_file: PathBuf,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(height) = self.height {
            settings.scale_to_height = height;
        }
        if let Some(width) = self.overview_page_width {
            settings.overview_page_width = width;
        }
        if self.no_cache {
            settings.cache_enabled = false;
        }
    }
}

#[cfg(feature = "pdf")]
fn open_document(path: &Path, scale_to_height: f64) -> Result<PageCache> {
    PageCache::load_document(path, scale_to_height)
        .with_context(|| format!("Cannot present {}", path.display()))
}

#[cfg(not(feature = "pdf"))]
fn open_document(path: &Path, _scale_to_height: f64) -> Result<PageCache> {
    bail!(
        "Cannot present {}: pdfpres was built without the `pdf` feature",
        path.display()
    )
}

/// What the console window would show for the current page
fn report_console(presentation: &Presentation, config: &Settings) {
    let console_page = presentation.console_page(config.show_preview);
    let notes = match presentation.shows_notes(config.notes_mode) {
        Ok(true) => "slide + notes",
        Ok(false) => "slide",
        Err(e) => {
            error!("Cannot inspect page {}: {e}", presentation.current_page());
            "unavailable"
        }
    };
    println!(
        "Console: page {}/{} ({notes}, notes mode {})",
        console_page + 1,
        presentation.page_count(),
        config.notes_mode.as_str()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        args.log_level,
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("Cannot create log file {}", args.log_file.display()))?,
    )?;
    panic_handler::initialize_panic_handler();

    info!("Starting pdfpres on {:?}", args.file);

    settings::load_settings();
    let mut config = settings::get_settings();
    args.apply(&mut config);

    let result = run(&args, &config);
    if let Err(e) = &result {
        error!("{e:?}");
    }

    info!("Shutting down pdfpres");
    result
}

fn run(args: &Args, config: &Settings) -> Result<()> {
    let cache = Arc::new(open_document(
        &args.file,
        f64::from(config.scale_to_height),
    )?);
    if config.cache_enabled {
        cache.start_caching();
    }

    let presentation = Presentation::new(Arc::clone(&cache));

    let mut grid = OverviewGrid::new(config.overview_columns);
    grid.update(&cache);
    grid.set_display_rows(config.overview_rows);
    grid.set_page(presentation.current_page());

    let overview = OverviewRenderer::new();
    overview.start(
        Arc::clone(&cache),
        &grid,
        GridGeometry::from_page_width(config.overview_page_width),
    );
    overview.wait();

    if let Some(path) = &args.overview_out {
        match overview.with_surface(|surface| surface.save_png(path)) {
            Some(saved) => {
                saved.with_context(|| format!("Cannot write {}", path.display()))?;
            }
            None => bail!("Overview grid could not be rendered"),
        }
        println!("Overview written to {}", path.display());
    }

    cache.wait_caching();
    println!(
        "{}",
        presentation.status_line(chrono::Local::now().time())
    );
    if config.show_console {
        report_console(&presentation, config);
    }

    drop(presentation);
    drop(overview);
    match Arc::try_unwrap(cache) {
        Ok(cache) => cache.unload_document(),
        Err(_) => error!("Page cache still shared at shutdown"),
    }
    Ok(())
}
