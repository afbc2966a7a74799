//! Lowers SVG path data to PDF path-construction operators.
//!
//! Parsing and arc handling are delegated to `kurbo`, which resolves the full
//! SVG command set (including elliptical arcs) into move/line/quad/cubic
//! segments. Quadratics are elevated to cubics since PDF has no quad
//! operator. Coordinates are emitted snapped, in the path's own (y-down) SVG
//! space; the caller's transformation matrix performs the flip.

use crate::LayoutError;
use imprint_types::geometry::snap;
use kurbo::{BezPath, PathEl, Point};
use lopdf::content::Operation;

fn op(operator: &str, operands: &[f64]) -> Operation {
    Operation::new(
        operator,
        operands.iter().map(|v| (snap(*v) as f32).into()).collect(),
    )
}

/// Converts one `d` attribute into a sequence of `m`/`l`/`c`/`h` operators.
pub fn path_operations(d: &str) -> Result<Vec<Operation>, LayoutError> {
    let path = BezPath::from_svg(d).map_err(|e| LayoutError::SvgPath(e.to_string()))?;

    let mut ops = Vec::new();
    let mut current = Point::ZERO;
    let mut subpath_start = Point::ZERO;

    for element in path.elements() {
        match *element {
            PathEl::MoveTo(p) => {
                ops.push(op("m", &[p.x, p.y]));
                current = p;
                subpath_start = p;
            }
            PathEl::LineTo(p) => {
                ops.push(op("l", &[p.x, p.y]));
                current = p;
            }
            PathEl::CurveTo(p1, p2, p3) => {
                ops.push(op("c", &[p1.x, p1.y, p2.x, p2.y, p3.x, p3.y]));
                current = p3;
            }
            PathEl::QuadTo(q, p) => {
                // Degree elevation: both cubic controls sit 2/3 of the way
                // towards the quadratic control point.
                let c1 = current + (q - current) * (2.0 / 3.0);
                let c2 = p + (q - p) * (2.0 / 3.0);
                ops.push(op("c", &[c1.x, c1.y, c2.x, c2.y, p.x, p.y]));
                current = p;
            }
            PathEl::ClosePath => {
                ops.push(Operation::new("h", vec![]));
                current = subpath_start;
            }
        }
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operators(d: &str) -> Vec<String> {
        path_operations(d)
            .unwrap()
            .into_iter()
            .map(|o| o.operator)
            .collect()
    }

    #[test]
    fn lines_and_close() {
        assert_eq!(operators("M0 0 L10 0 L10 10 Z"), vec!["m", "l", "l", "h"]);
    }

    #[test]
    fn arcs_lower_to_cubics() {
        let ops = operators("M0 0 A5 5 0 0 1 10 0");
        assert_eq!(ops[0], "m");
        assert!(ops[1..].iter().all(|o| o == "c"));
        assert!(!ops[1..].is_empty());
    }

    #[test]
    fn quads_are_elevated() {
        let ops = path_operations("M0 0 Q5 10 10 0").unwrap();
        assert_eq!(ops[1].operator, "c");
        assert_eq!(ops[1].operands.len(), 6);
    }

    #[test]
    fn invalid_path_data_is_an_error() {
        assert!(path_operations("M0 0 L bogus").is_err());
    }
}
