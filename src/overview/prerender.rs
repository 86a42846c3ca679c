//! Overview grid prerenderer
//!
//! Composes the thumbnails of every grid cell into one surface on a
//! background thread. Only one job runs at a time: starting a new one
//! cancels and joins the previous job first.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use super::cancel::CancellationToken;
use super::grid::{GridCell, GridGeometry, OverviewGrid};
use super::surface::GridSurface;
use crate::pdf::{PageCache, lock};

/// State of the published surface, readable without locking
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GridStatus {
    Invalid = 0,
    Valid = 1,
    InProgress = 2,
}

impl From<u8> for GridStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Valid,
            2 => Self::InProgress,
            _ => Self::Invalid,
        }
    }
}

#[derive(Debug)]
struct Shared {
    status: AtomicU8,
    cells_drawn: AtomicUsize,
    surface: Mutex<Option<GridSurface>>,
}

impl Shared {
    fn set_status(&self, status: GridStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn status(&self) -> GridStatus {
        GridStatus::from(self.status.load(Ordering::Acquire))
    }
}

/// Cells to draw, snapshotted from the grid when the job starts
struct GridPlan {
    cells: Vec<GridCell>,
    rows: usize,
    columns: usize,
    geometry: GridGeometry,
}

struct Job {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Job {
    fn join(self) {
        if self.handle.join().is_err() {
            error!("Overview prerender thread panicked");
        }
    }
}

pub struct OverviewRenderer {
    shared: Arc<Shared>,
    job: Mutex<Option<Job>>,
}

impl Default for OverviewRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverviewRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                status: AtomicU8::new(GridStatus::Invalid as u8),
                cells_drawn: AtomicUsize::new(0),
                surface: Mutex::new(None),
            }),
            job: Mutex::new(None),
        }
    }

    /// Start prerendering `grid`. Any job still running is cancelled and
    /// joined before the new one is spawned.
    pub fn start(&self, cache: Arc<PageCache>, grid: &OverviewGrid, geometry: GridGeometry) {
        let mut job = lock(&self.job);
        if let Some(previous) = job.take() {
            debug!("Replacing running overview prerender");
            previous.token.cancel();
            previous.join();
        }

        let (rows, columns) = grid.grid_size();
        let plan = GridPlan {
            cells: grid.cells().to_vec(),
            rows,
            columns,
            geometry,
        };

        *lock(&self.shared.surface) = None;
        self.shared.cells_drawn.store(0, Ordering::Release);
        self.shared.set_status(GridStatus::InProgress);

        let token = CancellationToken::new();
        let job_token = token.clone();
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("overview-grid".to_string())
            .spawn(move || prerender(&cache, &plan, &job_token, &shared));

        match spawned {
            Ok(handle) => *job = Some(Job { token, handle }),
            Err(e) => {
                error!("Failed to spawn overview prerender: {e}");
                self.shared.set_status(GridStatus::Invalid);
            }
        }
    }

    /// Cancel the running job, if any, and wait for it to exit.
    pub fn cancel(&self) {
        if let Some(job) = lock(&self.job).take() {
            job.token.cancel();
            job.join();
        }
        self.settle();
    }

    /// Wait for the running job to finish on its own.
    pub fn wait(&self) {
        if let Some(job) = lock(&self.job).take() {
            job.join();
        }
        self.settle();
    }

    // A job that died without reporting leaves the status at InProgress
    fn settle(&self) {
        let _ = self.shared.status.compare_exchange(
            GridStatus::InProgress as u8,
            GridStatus::Invalid as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    #[must_use]
    pub fn status(&self) -> GridStatus {
        self.shared.status()
    }

    /// Number of cells the current job has drawn so far
    #[must_use]
    pub fn cells_drawn(&self) -> usize {
        self.shared.cells_drawn.load(Ordering::Acquire)
    }

    /// Read the finished surface. `None` unless the status is `Valid`.
    pub fn with_surface<R>(&self, read: impl FnOnce(&GridSurface) -> R) -> Option<R> {
        if self.status() != GridStatus::Valid {
            return None;
        }
        lock(&self.shared.surface).as_ref().map(read)
    }
}

impl Drop for OverviewRenderer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn prerender(cache: &PageCache, plan: &GridPlan, token: &CancellationToken, shared: &Shared) {
    info!(
        "Prerendering overview: {} cells in {}x{}",
        plan.cells.len(),
        plan.rows,
        plan.columns
    );

    let (width, height) = plan.geometry.surface_size(plan.rows, plan.columns);
    let mut surface = GridSurface::new(width, height);

    for row in 0..plan.rows {
        for column in 0..plan.columns {
            if token.is_cancelled() {
                info!("Overview prerender cancelled");
                shared.set_status(GridStatus::Invalid);
                return;
            }
            let Some(cell) = plan.cells.get(row * plan.columns + column) else {
                continue;
            };
            draw_cell(cache, &mut surface, &plan.geometry, cell, row, column);
            shared.cells_drawn.fetch_add(1, Ordering::AcqRel);
        }
    }

    *lock(&shared.surface) = Some(surface);
    shared.set_status(GridStatus::Valid);
    info!("Overview ready");
}

fn draw_cell(
    cache: &PageCache,
    surface: &mut GridSurface,
    geometry: &GridGeometry,
    cell: &GridCell,
    row: usize,
    column: usize,
) {
    if let Err(e) = cache.reference(cell.page) {
        warn!("Overview cell {row}/{column} skipped: {e}");
        return;
    }

    let drawn = match cache.fetch_page(cell.page) {
        Ok(view) => surface
            .draw_thumbnail(
                &view.pixmap,
                geometry.thumbnail_origin(row, column),
                geometry.thumbnail_bounds(),
            )
            .is_some(),
        Err(e) => {
            warn!("Overview thumbnail for page {} failed: {e}", cell.page);
            false
        }
    };

    if let Err(e) = cache.unref(cell.page) {
        warn!("Overview could not release page {}: {e}", cell.page);
    }

    if drawn {
        let anchor = (
            (column as f64 + 0.95) * geometry.cell_width,
            (row + 1) as f64 * geometry.cell_height - 1.0,
        );
        surface.draw_label(&cell.label, anchor);
    }
}
