//! Terminal ordering for multi-terminal nets.

use pnr_core::{Coord, Point};

/// Order in which Prim's algorithm adds `points` to a rectilinear minimum
/// spanning tree grown from the first point. Ties go to the lower index.
pub fn prim_order(points: &[Point]) -> Vec<usize> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    let mut in_tree = vec![false; n];
    let mut dist: Vec<Coord> = points.iter().map(|p| p.manhattan_distance(&points[0])).collect();
    let mut order = Vec::with_capacity(n);
    in_tree[0] = true;
    order.push(0);

    while order.len() < n {
        let Some(next) = (0..n)
            .filter(|&i| !in_tree[i])
            .min_by_key(|&i| (dist[i], i))
        else {
            break;
        };
        in_tree[next] = true;
        order.push(next);
        for i in 0..n {
            if !in_tree[i] {
                dist[i] = dist[i].min(points[i].manhattan_distance(&points[next]));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_from_first_point() {
        let points = [
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(10, 0),
            Point::new(50, 0),
        ];
        assert_eq!(prim_order(&points), vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let points = [Point::new(0, 0), Point::new(0, 10), Point::new(10, 0)];
        assert_eq!(prim_order(&points), vec![0, 1, 2]);
        assert!(prim_order(&[]).is_empty());
    }
}
