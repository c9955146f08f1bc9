//! Linear two-view triangulation

use nalgebra::{Matrix3x4, Matrix4, RowVector4};

use crate::{GeometryError, Point2, Point3};

/// Triangulate one correspondence with the direct linear transform.
///
/// `left` and `right` are undistorted normalized coordinates; the projection
/// matrices map homogeneous reference-frame points into each normalized image.
/// The result is expressed in the reference frame of the projection matrices.
pub fn triangulate_linear(
    left_projection: &Matrix3x4<f64>,
    right_projection: &Matrix3x4<f64>,
    left: Point2,
    right: Point2,
) -> Result<Point3, GeometryError> {
    let rows: [RowVector4<f64>; 4] = [
        left_projection.row(2) * left.x - left_projection.row(0),
        left_projection.row(2) * left.y - left_projection.row(1),
        right_projection.row(2) * right.x - right_projection.row(0),
        right_projection.row(2) * right.y - right_projection.row(1),
    ];
    let a = Matrix4::from_rows(&rows);

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| GeometryError::Triangulation("SVD did not converge".into()))?;
    let solution = v_t.row(svd.singular_values.imin());

    let w = solution[3];
    if w.abs() < 1e-12 || !w.is_finite() {
        return Err(GeometryError::Triangulation("point at infinity".into()));
    }
    Ok(Point3::new(solution[0] / w, solution[1] / w, solution[2] / w))
}
