use screenloop_core::Point;
use std::collections::VecDeque;

/// A detection in physical pixels, relative to the full screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl MatchBox {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.left + (self.width / 2) as i32,
            self.top + (self.height / 2) as i32,
        )
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            ..self
        }
    }
}

pub fn distance(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Top-to-bottom, then left-to-right. Stable.
pub fn sort_visual(matches: &mut [MatchBox]) {
    matches.sort_by_key(|m| (m.top, m.left));
}

/// Sorts into visual order, then drops every match whose centre lies closer
/// than `radius` to the centre of a match already kept.
pub fn dedup(mut matches: Vec<MatchBox>, radius: f64) -> Vec<MatchBox> {
    sort_visual(&mut matches);
    let mut kept: Vec<MatchBox> = Vec::with_capacity(matches.len());
    for m in matches {
        let c = m.center();
        if kept.iter().all(|k| distance(k.center(), c) >= radius) {
            kept.push(m);
        }
    }
    kept
}

/// Centres already acted on in sequential mode. Bounded: once full, each
/// new point evicts the oldest.
#[derive(Debug, Clone)]
pub struct VisitedMatches {
    points: VecDeque<Point>,
    capacity: usize,
}

impl VisitedMatches {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// A point sitting exactly on a visited centre is near at any radius.
    pub fn is_near(&self, point: Point, radius: f64) -> bool {
        self.points
            .iter()
            .any(|p| *p == point || distance(*p, point) < radius)
    }

    /// First match, in the given order, not near any visited point.
    pub fn first_unvisited(&self, matches: &[MatchBox], radius: f64) -> Option<MatchBox> {
        matches
            .iter()
            .copied()
            .find(|m| !self.is_near(m.center(), radius))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_rows_before_columns() {
        let mut m = vec![
            MatchBox::new(50, 10, 4, 4),
            MatchBox::new(5, 40, 4, 4),
            MatchBox::new(0, 10, 4, 4),
        ];
        sort_visual(&mut m);
        assert_eq!(
            m,
            vec![
                MatchBox::new(0, 10, 4, 4),
                MatchBox::new(50, 10, 4, 4),
                MatchBox::new(5, 40, 4, 4),
            ]
        );
    }

    #[test]
    fn dedup_keeps_first_and_respects_radius() {
        let input = vec![
            MatchBox::new(103, 100, 10, 10),
            MatchBox::new(100, 100, 10, 10),
            MatchBox::new(200, 100, 10, 10),
            MatchBox::new(100, 108, 10, 10),
            MatchBox::new(100, 130, 10, 10),
        ];
        let radius = 10.0;
        let kept = dedup(input.clone(), radius);

        assert_eq!(
            kept,
            vec![
                MatchBox::new(100, 100, 10, 10),
                MatchBox::new(200, 100, 10, 10),
                MatchBox::new(100, 130, 10, 10),
            ]
        );
        for (i, a) in kept.iter().enumerate() {
            assert!(input.contains(a));
            for b in &kept[i + 1..] {
                assert!(distance(a.center(), b.center()) >= radius);
            }
        }
    }

    #[test]
    fn zero_radius_only_sorts() {
        let input = vec![MatchBox::new(1, 1, 2, 2), MatchBox::new(1, 1, 2, 2)];
        assert_eq!(dedup(input, 0.0).len(), 2);
    }

    #[test]
    fn visited_list_evicts_oldest() {
        let mut visited = VisitedMatches::new(2);
        visited.push(Point::new(0, 0));
        visited.push(Point::new(100, 0));
        assert!(visited.is_near(Point::new(2, 0), 5.0));

        visited.push(Point::new(200, 0));
        assert_eq!(visited.len(), 2);
        assert!(!visited.is_near(Point::new(2, 0), 5.0));
        assert!(visited.is_near(Point::new(199, 1), 5.0));
    }

    #[test]
    fn first_unvisited_skips_nearby_centres() {
        let mut visited = VisitedMatches::new(8);
        let matches = [MatchBox::new(0, 0, 10, 10), MatchBox::new(40, 0, 10, 10)];
        visited.push(matches[0].center());

        assert_eq!(visited.first_unvisited(&matches, 10.0), Some(matches[1]));
        visited.push(matches[1].center());
        assert_eq!(visited.first_unvisited(&matches, 10.0), None);
    }

    #[test]
    fn zero_radius_still_skips_the_same_centre() {
        let mut visited = VisitedMatches::new(8);
        let matches = [MatchBox::new(0, 0, 10, 10), MatchBox::new(11, 0, 10, 10)];
        visited.push(matches[0].center());

        assert_eq!(visited.first_unvisited(&matches, 0.0), Some(matches[1]));
        visited.push(matches[1].center());
        assert_eq!(visited.first_unvisited(&matches, 0.0), None);
    }
}
