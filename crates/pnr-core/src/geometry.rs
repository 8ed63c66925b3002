use serde::{Deserialize, Serialize};

/// Layout coordinate in database units (DBU).
pub type Coord = i64;

/// A 2D point in layout coordinates (database units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    pub fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: &Point) -> Coord {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn distance_squared(&self, other: &Point) -> i128 {
        let dx = (self.x - other.x) as i128;
        let dy = (self.y - other.y) as i128;
        dx * dx + dy * dy
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An axis-aligned rectangle.
///
/// `overlaps` is the half-open test used for legality: two rectangles that
/// only share an edge or a corner (abutment) do not overlap. `intersects` is
/// the closed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(x1: Coord, y1: Coord, x2: Coord, y2: Coord) -> Self {
        Self {
            min: Point::new(x1.min(x2), y1.min(y2)),
            max: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Rectangle with lower-left corner `origin` and the given size.
    pub fn from_origin_size(origin: Point, width: Coord, height: Coord) -> Self {
        Self::new(origin.x, origin.y, origin.x + width, origin.y + height)
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Rect::from_corners(*first, *first);
        for p in &points[1..] {
            rect.min.x = rect.min.x.min(p.x);
            rect.min.y = rect.min.y.min(p.y);
            rect.max.x = rect.max.x.max(p.x);
            rect.max.y = rect.max.y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> Coord {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> Coord {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> i128 {
        self.width() as i128 * self.height() as i128
    }

    pub fn half_perimeter(&self) -> Coord {
        self.width() + self.height()
    }

    /// Center point, rounded towards negative infinity.
    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x).div_euclid(2),
            (self.min.y + self.max.y).div_euclid(2),
        )
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Strict containment of a point in the open interior.
    pub fn contains_point_strict(&self, p: &Point) -> bool {
        p.x > self.min.x && p.x < self.max.x && p.y > self.min.y && p.y < self.max.y
    }

    /// Closed containment: `other` lies inside `self`, touching edges allowed.
    pub fn contains(&self, other: &Rect) -> bool {
        other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
    }

    /// Interiors overlap. Abutting rectangles do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        ))
    }

    pub fn union(&self, other: &Rect) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn expand(&self, margin: Coord) -> Self {
        Self::new(
            self.min.x - margin,
            self.min.y - margin,
            self.max.x + margin,
            self.max.y + margin,
        )
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        Self {
            min: self.min.translate(dx, dy),
            max: self.max.translate(dx, dy),
        }
    }

    /// The point of this rectangle closest to `p`.
    pub fn clamp_point(&self, p: &Point) -> Point {
        Point::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }
}

/// A simple polygon defined by a list of vertices (implicitly closed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        let mut vertices = vertices;
        // Closed input (first == last) is accepted and normalised.
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        Self { vertices }
    }

    pub fn bbox(&self) -> Option<Rect> {
        Rect::from_points(&self.vertices)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Closed point-in-polygon test (boundary counts as inside).
    pub fn contains_point(&self, p: &Point) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if on_segment(p, &a, &b) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                // x coordinate of the edge at p.y, compared without division
                let lhs = (p.x - a.x) as i128 * (b.y - a.y) as i128;
                let rhs = (b.x - a.x) as i128 * (p.y - a.y) as i128;
                let crosses = if b.y > a.y { lhs < rhs } else { lhs > rhs };
                if crosses {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True when the whole rectangle lies inside the polygon.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        rect.corners().iter().all(|c| self.contains_point(c))
            && !self.edges().any(|(a, b)| segment_crosses_interior(&a, &b, rect))
    }

    /// True when the polygon interior and the rectangle interior overlap.
    pub fn overlaps_rect(&self, rect: &Rect) -> bool {
        match self.bbox() {
            Some(bb) if bb.overlaps(rect) => {}
            _ => return false,
        }
        if rect.is_degenerate() {
            return false;
        }
        if self.contains_point(&rect.center()) && !on_boundary(self, &rect.center()) {
            return true;
        }
        self.edges().any(|(a, b)| segment_crosses_interior(&a, &b, rect))
            || self.vertices.iter().any(|v| rect.contains_point_strict(v))
    }

    /// Interior overlap of two polygons: a vertex strictly inside the other
    /// polygon, or two edges crossing properly.
    pub fn overlaps_polygon(&self, other: &Polygon) -> bool {
        match (self.bbox(), other.bbox()) {
            (Some(a), Some(b)) if a.overlaps(&b) => {}
            _ => return false,
        }
        let strictly_inside =
            |poly: &Polygon, p: &Point| poly.contains_point(p) && !on_boundary(poly, p);
        if self.vertices.iter().any(|v| strictly_inside(other, v))
            || other.vertices.iter().any(|v| strictly_inside(self, v))
        {
            return true;
        }
        if self.edges().any(|(a, b)| {
            other
                .edges()
                .any(|(c, d)| segments_cross_properly(&a, &b, &c, &d))
        }) {
            return true;
        }
        // Coincident outlines: probe the vertex centroids.
        [self.vertex_centroid(), other.vertex_centroid()]
            .iter()
            .flatten()
            .any(|c| strictly_inside(self, c) && strictly_inside(other, c))
    }

    fn vertex_centroid(&self) -> Option<Point> {
        let n = self.vertices.len() as Coord;
        if n == 0 {
            return None;
        }
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0, 0), |(sx, sy), v| (sx + v.x, sy + v.y));
        Some(Point::new(sx.div_euclid(n), sy.div_euclid(n)))
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        Self {
            vertices: self.vertices.iter().map(|p| p.translate(dx, dy)).collect(),
        }
    }
}

fn on_boundary(poly: &Polygon, p: &Point) -> bool {
    poly.edges().any(|(a, b)| on_segment(p, &a, &b))
}

fn orient(a: &Point, b: &Point, c: &Point) -> i128 {
    let v = (b.x - a.x) as i128 * (c.y - a.y) as i128 - (b.y - a.y) as i128 * (c.x - a.x) as i128;
    v.signum()
}

/// Segments a-b and c-d cross at a single interior point of both.
fn segments_cross_properly(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let (o1, o2) = (orient(a, b, c), orient(a, b, d));
    let (o3, o4) = (orient(c, d, a), orient(c, d, b));
    o1 * o2 < 0 && o3 * o4 < 0
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
    let cross = (b.x - a.x) as i128 * (p.y - a.y) as i128 - (b.y - a.y) as i128 * (p.x - a.x) as i128;
    cross == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Does the segment a-b pass through the open interior of `rect`?
fn segment_crosses_interior(a: &Point, b: &Point, rect: &Rect) -> bool {
    if a.x == b.x {
        let (lo, hi) = (a.y.min(b.y), a.y.max(b.y));
        return a.x > rect.min.x && a.x < rect.max.x && lo.max(rect.min.y) < hi.min(rect.max.y);
    }
    if a.y == b.y {
        let (lo, hi) = (a.x.min(b.x), a.x.max(b.x));
        return a.y > rect.min.y && a.y < rect.max.y && lo.max(rect.min.x) < hi.min(rect.max.x);
    }

    // Liang-Barsky clip of a diagonal edge against the closed rectangle. A
    // diagonal chord of non-zero length always has interior points inside.
    let (x0, y0) = (a.x as f64, a.y as f64);
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let checks = [
        (-dx, x0 - rect.min.x as f64),
        (dx, rect.max.x as f64 - x0),
        (-dy, y0 - rect.min.y as f64),
        (dy, rect.max.y as f64 - y0),
    ];
    for (p, q) in checks {
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
    }
    t1 - t0 > 1e-12
}

/// A geometric shape on a layer: a rectangle or a polygon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Rect(Rect),
    Polygon(Polygon),
}

impl Shape {
    pub fn bbox(&self) -> Option<Rect> {
        match self {
            Shape::Rect(r) => Some(*r),
            Shape::Polygon(p) => p.bbox(),
        }
    }

    pub fn contains_rect(&self, rect: &Rect) -> bool {
        match self {
            Shape::Rect(r) => r.contains(rect),
            Shape::Polygon(p) => p.contains_rect(rect),
        }
    }

    pub fn overlaps_rect(&self, rect: &Rect) -> bool {
        match self {
            Shape::Rect(r) => r.overlaps(rect),
            Shape::Polygon(p) => p.overlaps_rect(rect),
        }
    }

    /// Interior overlap between two shapes.
    pub fn overlaps(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Rect(a), b) | (b, Shape::Rect(a)) => b.overlaps_rect(a),
            (Shape::Polygon(a), Shape::Polygon(b)) => a.overlaps_polygon(b),
        }
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        match self {
            Shape::Rect(r) => Shape::Rect(r.translate(dx, dy)),
            Shape::Polygon(p) => Shape::Polygon(p.translate(dx, dy)),
        }
    }
}

/// Placement orientation, following the LEF/DEF naming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    N,
    S,
    E,
    W,
    FN,
    FS,
    FE,
    FW,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::N,
        Orientation::S,
        Orientation::E,
        Orientation::W,
        Orientation::FN,
        Orientation::FS,
        Orientation::FE,
        Orientation::FW,
    ];

    /// Rotations by 90 or 270 degrees exchange width and height.
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Orientation::E | Orientation::W | Orientation::FE | Orientation::FW
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Orientation::N => "N",
            Orientation::S => "S",
            Orientation::E => "E",
            Orientation::W => "W",
            Orientation::FN => "FN",
            Orientation::FS => "FS",
            Orientation::FE => "FE",
            Orientation::FW => "FW",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.name() == name)
    }

    /// Size of the placed footprint of a cell of size `(w, h)`.
    pub fn placed_size(&self, w: Coord, h: Coord) -> (Coord, Coord) {
        if self.swaps_axes() {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Map a cell-local point of a cell of size `(w, h)` into the placed
    /// footprint whose lower-left corner is at the origin.
    pub fn apply(&self, p: &Point, w: Coord, h: Coord) -> Point {
        let (x, y) = (p.x, p.y);
        let (nx, ny) = match self {
            Orientation::N => (x, y),
            Orientation::S => (w - x, h - y),
            Orientation::W => (h - y, x),
            Orientation::E => (y, w - x),
            Orientation::FN => (w - x, y),
            Orientation::FS => (x, h - y),
            Orientation::FW => (y, x),
            Orientation::FE => (h - y, w - x),
        };
        Point::new(nx, ny)
    }

    /// Transform a cell-local rectangle into placed coordinates.
    pub fn transform_rect(&self, rect: &Rect, w: Coord, h: Coord, origin: Point) -> Rect {
        let a = self.apply(&rect.min, w, h);
        let b = self.apply(&rect.max, w, h);
        Rect::from_corners(a, b).translate(origin.x, origin.y)
    }

    pub fn transform_shape(&self, shape: &Shape, w: Coord, h: Coord, origin: Point) -> Shape {
        match shape {
            Shape::Rect(r) => Shape::Rect(self.transform_rect(r, w, h, origin)),
            Shape::Polygon(p) => Shape::Polygon(Polygon::new(
                p.vertices
                    .iter()
                    .map(|v| {
                        let t = self.apply(v, w, h);
                        t.translate(origin.x, origin.y)
                    })
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0, 0);
        let b = Point::new(3, 4);
        assert_eq!(a.manhattan_distance(&b), 7);
        assert_eq!(a.distance_squared(&b), 25);
    }

    #[test]
    fn test_rect_area() {
        let r = Rect::new(10, 5, 0, 0);
        assert_eq!(r.area(), 50);
        assert_eq!(r.min, Point::new(0, 0));
        assert_eq!(r.half_perimeter(), 15);
    }

    #[test]
    fn test_abutting_rects_do_not_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        let c = Rect::new(5, 5, 15, 15);
        assert!(!a.overlaps(&b));
        assert!(a.intersects(&b));
        assert!(a.overlaps(&c));
        assert!(!a.overlaps(&Rect::new(20, 20, 30, 30)));
    }

    #[test]
    fn test_rect_containment() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains(&Rect::new(0, 0, 10, 10)));
        assert!(outer.contains(&Rect::new(90, 90, 100, 100)));
        assert!(!outer.contains(&Rect::new(95, 95, 105, 100)));
    }

    #[test]
    fn test_polygon_contains_rect() {
        // L-shaped region: the notch in the upper right is outside.
        let l = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 50),
            Point::new(50, 50),
            Point::new(50, 100),
            Point::new(0, 100),
        ]);
        assert!(l.contains_rect(&Rect::new(0, 0, 10, 10)));
        assert!(l.contains_rect(&Rect::new(40, 40, 50, 50)));
        assert!(l.contains_rect(&Rect::new(0, 90, 50, 100)));
        assert!(!l.contains_rect(&Rect::new(60, 60, 70, 70)));
        assert!(!l.contains_rect(&Rect::new(40, 40, 60, 60)));
    }

    #[test]
    fn test_polygon_overlaps_rect() {
        let tri = Polygon::new(vec![Point::new(0, 0), Point::new(100, 0), Point::new(0, 100)]);
        assert!(tri.overlaps_rect(&Rect::new(10, 10, 20, 20)));
        assert!(!tri.overlaps_rect(&Rect::new(60, 60, 70, 70)));
        assert!(!tri.overlaps_rect(&Rect::new(100, 0, 110, 10)));
    }

    #[test]
    fn test_polygon_polygon_overlap() {
        let a = Polygon::new(vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)]);
        let b = a.translate(2, 2);
        let far = a.translate(20, 0);
        let mirrored = Polygon::new(vec![Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)]);
        assert!(a.overlaps_polygon(&b));
        assert!(!a.overlaps_polygon(&far));
        // shares only the hypotenuse
        assert!(!a.overlaps_polygon(&mirrored));
        assert!(Shape::Polygon(a.clone()).overlaps(&Shape::Rect(Rect::new(1, 1, 3, 3))));
        assert!(Shape::Polygon(a.clone()).overlaps(&Shape::Polygon(a)));
    }

    #[test]
    fn test_orientation_transform() {
        // 10x20 cell, pin at lower-left corner area
        let pin = Rect::new(0, 0, 2, 4);
        let origin = Point::new(100, 100);
        let n = Orientation::N.transform_rect(&pin, 10, 20, origin);
        assert_eq!(n, Rect::new(100, 100, 102, 104));
        let s = Orientation::S.transform_rect(&pin, 10, 20, origin);
        assert_eq!(s, Rect::new(108, 116, 110, 120));
        let fn_ = Orientation::FN.transform_rect(&pin, 10, 20, origin);
        assert_eq!(fn_, Rect::new(108, 100, 110, 104));
        assert_eq!(Orientation::E.placed_size(10, 20), (20, 10));
        let e = Orientation::E.transform_rect(&pin, 10, 20, origin);
        assert!(Rect::from_origin_size(origin, 20, 10).contains(&e));
    }
}
