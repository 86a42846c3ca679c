//! Page overview: grid model, composite surface and its prerenderer

mod cancel;
mod grid;
mod prerender;
mod surface;

pub use cancel::CancellationToken;
pub use grid::{GridCell, GridGeometry, OverviewGrid};
pub use prerender::{GridStatus, OverviewRenderer};
pub use surface::GridSurface;
