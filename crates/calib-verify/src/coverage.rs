//! Calibration-target coverage density
//!
//! Splits the image into square cells and measures how many of the cells
//! near the image center already hold a detected target point.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use stereo_geometry::Point2;
use tracing::{debug, warn};

/// Grid cell edge length (pixels)
pub const GRID_CELL_PX: u32 = 40;

/// Frames accumulated before the operator is told to stop capturing
pub const MAX_CAPTURE_FRAMES: usize = 100;

const ACCUMULATED: Rgb<u8> = Rgb([0, 255, 0]);
const EMPTY_CELL: Rgb<u8> = Rgb([255, 0, 0]);
const COVERED_CELL: Rgb<u8> = Rgb([0, 128, 0]);

/// Outcome of one density check
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub valid_cells: usize,
    pub covered_cells: usize,
    pub ratio: f32,
    pub sufficient: bool,
    /// Row-major `Some(covered)` for valid cells, `None` outside the radius
    pub cells: Vec<Option<bool>>,
    pub grid: (u32, u32),
}

impl CoverageReport {
    pub fn summary(&self) -> String {
        format!(
            "coverage {}/{} cells ({:.0}%){}",
            self.covered_cells,
            self.valid_cells,
            self.ratio * 100.0,
            if self.sufficient { "" } else { " insufficient" }
        )
    }
}

/// Fraction of valid grid cells holding at least one accumulated point.
///
/// A cell is valid when its center lies within `valid_radius` of `center`.
/// Coverage is insufficient below `min_ratio` or when no cell is valid.
pub fn check_grid_point_density(
    history: &[Vec<Point2>],
    image_size: (u32, u32),
    min_ratio: f32,
    valid_radius: f64,
    center: Point2,
) -> CoverageReport {
    let cols = image_size.0.div_ceil(GRID_CELL_PX);
    let rows = image_size.1.div_ceil(GRID_CELL_PX);
    let half = GRID_CELL_PX as f64 / 2.0;

    let mut cells: Vec<Option<bool>> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| {
            let cell_center = Point2::new(
                (c * GRID_CELL_PX) as f64 + half,
                (r * GRID_CELL_PX) as f64 + half,
            );
            ((cell_center - center).norm() <= valid_radius).then_some(false)
        })
        .collect();

    for p in history.iter().flatten() {
        if p.x < 0.0 || p.y < 0.0 {
            continue;
        }
        let (c, r) = ((p.x as u32) / GRID_CELL_PX, (p.y as u32) / GRID_CELL_PX);
        if c >= cols || r >= rows {
            continue;
        }
        if let Some(covered) = cells[(r * cols + c) as usize].as_mut() {
            *covered = true;
        }
    }

    let valid_cells = cells.iter().filter(|c| c.is_some()).count();
    let covered_cells = cells.iter().filter(|c| **c == Some(true)).count();
    let ratio = if valid_cells == 0 {
        0.0
    } else {
        covered_cells as f32 / valid_cells as f32
    };
    let sufficient = valid_cells > 0 && ratio >= min_ratio;
    if sufficient {
        debug!("Coverage {}/{} cells", covered_cells, valid_cells);
    } else {
        warn!(
            "Insufficient coverage: {}/{} cells ({:.2} < {:.2})",
            covered_cells, valid_cells, ratio, min_ratio
        );
    }

    CoverageReport {
        valid_cells,
        covered_cells,
        ratio,
        sufficient,
        cells,
        grid: (cols, rows),
    }
}

/// Paint every accumulated point and outline valid cells by coverage state
pub fn render_coverage(history: &[Vec<Point2>], report: &CoverageReport, canvas: &mut RgbImage) {
    let (cols, _) = report.grid;
    for (idx, cell) in report.cells.iter().enumerate() {
        let Some(covered) = cell else {
            continue;
        };
        let (c, r) = (idx as u32 % cols, idx as u32 / cols);
        let rect = Rect::at((c * GRID_CELL_PX) as i32, (r * GRID_CELL_PX) as i32)
            .of_size(GRID_CELL_PX, GRID_CELL_PX);
        draw_hollow_rect_mut(canvas, rect, if *covered { COVERED_CELL } else { EMPTY_CELL });
    }

    let (width, height) = canvas.dimensions();
    for p in history.iter().flatten() {
        let (x, y) = (p.x.round(), p.y.round());
        if x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height {
            canvas.put_pixel(x as u32, y as u32, ACCUMULATED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_is_insufficient() {
        let report = check_grid_point_density(&[], (640, 480), 0.4, 360.0, Point2::new(320.0, 240.0));
        assert_eq!(report.grid, (16, 12));
        assert!(report.valid_cells > 0);
        assert_eq!(report.covered_cells, 0);
        assert!(!report.sufficient);
    }

    #[test]
    fn test_full_coverage() {
        let points: Vec<Point2> = (0..16)
            .flat_map(|c| (0..12).map(move |r| Point2::new(c as f64 * 40.0 + 5.0, r as f64 * 40.0 + 5.0)))
            .collect();
        let report =
            check_grid_point_density(&[points], (640, 480), 0.4, 360.0, Point2::new(320.0, 240.0));
        assert_eq!(report.covered_cells, report.valid_cells);
        assert!((report.ratio - 1.0).abs() < f32::EPSILON);
        assert!(report.sufficient);
    }

    #[test]
    fn test_points_outside_radius_do_not_count() {
        // Only the top-left corner cell is hit; its center is ~372 px from the image center
        let history = vec![vec![Point2::new(1.0, 1.0)], vec![Point2::new(-1.0, 500.0)]];
        let report =
            check_grid_point_density(&history, (640, 480), 0.4, 360.0, Point2::new(320.0, 240.0));
        assert_eq!(report.cells[0], None);
        assert_eq!(report.covered_cells, 0);
    }

    #[test]
    fn test_ratio_threshold() {
        // 2x2 grid, all cells valid; two covered -> 0.5
        let history = vec![vec![Point2::new(10.0, 10.0)], vec![Point2::new(50.0, 50.0)]];
        let center = Point2::new(40.0, 40.0);
        let report = check_grid_point_density(&history, (80, 80), 0.4, 100.0, center);
        assert_eq!(report.valid_cells, 4);
        assert_eq!(report.covered_cells, 2);
        assert!(report.sufficient);
        let strict = check_grid_point_density(&history, (80, 80), 0.6, 100.0, center);
        assert!(!strict.sufficient);
    }

    #[test]
    fn test_render_marks_points() {
        let history = vec![vec![Point2::new(10.0, 12.0)]];
        let report =
            check_grid_point_density(&history, (80, 80), 0.4, 100.0, Point2::new(40.0, 40.0));
        let mut canvas = RgbImage::new(80, 80);
        render_coverage(&history, &report, &mut canvas);
        assert_eq!(*canvas.get_pixel(10, 12), ACCUMULATED);
        assert_eq!(*canvas.get_pixel(0, 0), COVERED_CELL);
        assert_eq!(*canvas.get_pixel(79, 79), EMPTY_CELL);
    }
}
