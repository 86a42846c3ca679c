//! Overview grid model: which page sits in which cell, and the selection

use crate::pdf::PageCache;

/// One thumbnail of the overview.
///
/// Consecutive pages sharing a label (the build steps of one slide) share a
/// cell, which shows the last of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCell {
    /// Page shown in the cell (0-indexed)
    pub page: usize,
    /// First page of the group the cell stands for
    pub first_page: usize,
    pub label: String,
}

impl GridCell {
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        (self.first_page..=self.page).contains(&index)
    }
}

/// Pixel layout of the overview, derived from the overview page width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridGeometry {
    pub cell_width: f64,
    pub cell_height: f64,
}

impl GridGeometry {
    /// Four 4:3 cells across `page_width` pixels.
    #[must_use]
    pub fn from_page_width(page_width: u32) -> Self {
        let width = f64::from(page_width);
        Self {
            cell_width: 0.25 * width,
            cell_height: 0.1875 * width,
        }
    }

    /// Composite surface size for a `rows` x `columns` grid
    #[must_use]
    pub fn surface_size(&self, rows: usize, columns: usize) -> (u32, u32) {
        (
            (self.cell_width * columns as f64) as u32,
            (self.cell_height * rows as f64) as u32,
        )
    }

    /// Top-left corner of the thumbnail in cell `(row, column)`.
    #[must_use]
    pub fn thumbnail_origin(&self, row: usize, column: usize) -> (f64, f64) {
        (
            (column as f64 + 0.05) * self.cell_width,
            row as f64 * self.cell_height,
        )
    }

    /// Box a thumbnail is fitted into
    #[must_use]
    pub fn thumbnail_bounds(&self) -> (f64, f64) {
        (self.cell_width * 0.9, self.cell_height * 0.9)
    }
}

#[derive(Debug)]
pub struct OverviewGrid {
    cells: Vec<GridCell>,
    columns: usize,
    display_rows: usize,
    offset: usize,
    row: usize,
    column: usize,
}

impl OverviewGrid {
    #[must_use]
    pub fn new(columns: usize) -> Self {
        Self {
            cells: Vec::new(),
            columns: columns.max(1),
            display_rows: 1,
            offset: 0,
            row: 0,
            column: 0,
        }
    }

    /// Rebuild the cells from the document's labels.
    pub fn update(&mut self, cache: &PageCache) {
        let mut labels = Vec::new();
        cache.enum_labels(|label, first_page| labels.push((first_page, label.to_string())));
        self.rebuild(cache.page_count(), labels);
    }

    fn rebuild(&mut self, page_count: usize, mut labels: Vec<(usize, String)>) {
        labels.retain(|(first_page, _)| *first_page < page_count);
        labels.sort_by_key(|(first_page, _)| *first_page);

        let mut cells: Vec<GridCell> = Vec::with_capacity(page_count);
        let mut next_label = 0;
        let mut current: Option<&str> = None;

        for page in 0..page_count {
            while let Some((first_page, label)) = labels.get(next_label) {
                if *first_page > page {
                    break;
                }
                current = Some(label.as_str());
                next_label += 1;
            }

            match (current, cells.last_mut()) {
                (Some(label), Some(last)) if last.label == label && last.page + 1 == page => {
                    last.page = page;
                }
                (Some(label), _) => cells.push(GridCell {
                    page,
                    first_page: page,
                    label: label.to_string(),
                }),
                (None, _) => cells.push(GridCell {
                    page,
                    first_page: page,
                    label: (page + 1).to_string(),
                }),
            }
        }

        self.cells = cells;
        if !self.is_valid(self.row, self.column) {
            let last = self.cells.len().saturating_sub(1);
            self.row = last / self.columns;
            self.column = last % self.columns;
        }
        self.scroll_to_selection();
    }

    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// `(rows, columns)` needed to show every cell
    #[must_use]
    pub fn grid_size(&self) -> (usize, usize) {
        (self.cells.len().div_ceil(self.columns), self.columns)
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&GridCell> {
        if column >= self.columns {
            return None;
        }
        self.cells.get(row * self.columns + column)
    }

    fn is_valid(&self, row: usize, column: usize) -> bool {
        column < self.columns && row * self.columns + column < self.cells.len()
    }

    /// Move the selection along one axis; `dy` wins when both are set.
    /// Moves onto an empty cell are ignored.
    pub fn move_by(&mut self, dx: i32, dy: i32) {
        if dy > 0 {
            if self.is_valid(self.row + 1, self.column) {
                self.row += 1;
            }
        } else if dy < 0 {
            self.row = self.row.saturating_sub(1);
        } else if dx > 0 {
            if self.column + 1 < self.columns {
                if self.is_valid(self.row, self.column + 1) {
                    self.column += 1;
                }
            } else if self.is_valid(self.row + 1, 0) {
                self.row += 1;
                self.column = 0;
            }
        } else if dx < 0 {
            if self.column > 0 {
                self.column -= 1;
            } else if self.row > 0 {
                self.row -= 1;
                self.column = self.columns - 1;
            }
        }
        self.scroll_to_selection();
    }

    /// Selected `(row, column, page)`; the row counts from the top of the
    /// grid, not from the scroll offset.
    #[must_use]
    pub fn selection(&self) -> Option<(usize, usize, usize)> {
        self.cell(self.row, self.column)
            .map(|cell| (self.row, self.column, cell.page))
    }

    /// Select the cell standing for page `index`, or the closest one before it.
    pub fn set_page(&mut self, index: usize) {
        let position = self
            .cells
            .iter()
            .position(|cell| cell.contains(index))
            .or_else(|| self.cells.iter().rposition(|cell| cell.first_page <= index));

        if let Some(position) = position {
            self.row = position / self.columns;
            self.column = position % self.columns;
            self.scroll_to_selection();
        }
    }

    /// Number of rows visible at once; the offset follows the selection.
    pub fn set_display_rows(&mut self, rows: usize) {
        self.display_rows = rows.max(1);
        self.scroll_to_selection();
    }

    /// First visible row
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn scroll_to_selection(&mut self) {
        if self.row < self.offset {
            self.offset = self.row;
        } else if self.row >= self.offset + self.display_rows {
            self.offset = self.row + 1 - self.display_rows;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(entries: &[(usize, &str)]) -> Vec<(usize, String)> {
        entries
            .iter()
            .map(|(page, label)| (*page, (*label).to_string()))
            .collect()
    }

    fn grid(columns: usize, page_count: usize, entries: &[(usize, &str)]) -> OverviewGrid {
        let mut grid = OverviewGrid::new(columns);
        grid.rebuild(page_count, labels(entries));
        grid
    }

    #[test]
    fn unlabelled_document_gets_one_cell_per_page() {
        let grid = grid(4, 6, &[]);
        assert_eq!(grid.grid_size(), (2, 4));
        assert_eq!(grid.cell(1, 1).map(|c| c.label.as_str()), Some("6"));
        assert_eq!(grid.cell(1, 2), None);
        assert_eq!(grid.cell(0, 4), None);
    }

    #[test]
    fn build_steps_collapse_to_their_last_page() {
        let grid = grid(4, 6, &[(0, "1"), (1, "2"), (2, "2"), (3, "2"), (4, "3")]);

        let shown: Vec<_> = grid
            .cells()
            .iter()
            .map(|c| (c.first_page, c.page, c.label.as_str()))
            .collect();
        assert_eq!(shown, vec![(0, 0, "1"), (1, 3, "2"), (4, 5, "3")]);
    }

    #[test]
    fn pages_before_the_first_label_use_their_number() {
        let grid = grid(4, 4, &[(2, "Intro")]);
        let shown: Vec<_> = grid.cells().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(shown, vec!["1", "2", "Intro"]);
        assert_eq!(grid.cells()[2].page, 3);
    }

    #[test]
    fn horizontal_moves_wrap_between_rows() {
        let mut grid = grid(3, 5, &[]);
        assert_eq!(grid.selection(), Some((0, 0, 0)));

        grid.move_by(-1, 0);
        assert_eq!(grid.selection(), Some((0, 0, 0)));

        grid.move_by(1, 0);
        grid.move_by(1, 0);
        grid.move_by(1, 0);
        assert_eq!(grid.selection(), Some((1, 0, 3)));

        grid.move_by(-1, 0);
        assert_eq!(grid.selection(), Some((0, 2, 2)));

        // Nothing below page 2
        grid.move_by(0, 1);
        assert_eq!(grid.selection(), Some((0, 2, 2)));
    }

    #[test]
    fn set_page_finds_the_group() {
        let mut grid = grid(2, 6, &[(0, "a"), (2, "b"), (5, "c")]);
        grid.set_page(3);
        assert_eq!(grid.selection(), Some((0, 1, 4)));
        grid.set_page(5);
        assert_eq!(grid.selection(), Some((1, 0, 5)));
    }

    #[test]
    fn offset_follows_selection() {
        let mut grid = grid(2, 10, &[]);
        grid.set_display_rows(2);
        grid.set_page(0);
        assert_eq!(grid.offset(), 0);

        grid.set_page(7);
        assert_eq!(grid.offset(), 2);

        grid.move_by(0, -1);
        grid.move_by(0, -1);
        grid.move_by(0, -1);
        assert_eq!(grid.offset(), 0);
    }

    #[test]
    fn geometry_matches_four_by_three_cells() {
        let geometry = GridGeometry::from_page_width(1024);
        assert_eq!(geometry.cell_width, 256.0);
        assert_eq!(geometry.cell_height, 192.0);
        assert_eq!(geometry.surface_size(2, 4), (1024, 384));
        let (x, y) = geometry.thumbnail_origin(1, 2);
        assert!((x - 524.8).abs() < 1e-9);
        assert_eq!(y, 192.0);
    }
}
