use lapwing_proto::{BoundingBox, Vertex};

/// Largest centre shift, as a fraction of the previous centre's
/// coordinates, still treated as the same obstacle.
pub const MVMT_TOLERANCE: f32 = 0.10;
/// Frames an obstacle must be seen in before it is reported.
pub const PERSISTENCE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub bbox: BoundingBox,
    pub center: Vertex,
    /// Consecutive frames this obstacle has been seen in, this one included.
    pub frames_persisted: u32,
}

impl Obstacle {
    fn new(bbox: BoundingBox) -> Self {
        let center = bbox.center();
        Self { bbox, center, frames_persisted: 1 }
    }

    fn matches(&self, center: Vertex) -> bool {
        (center.x - self.center.x).abs() <= MVMT_TOLERANCE * self.center.x.abs()
            && (center.y - self.center.y).abs() <= MVMT_TOLERANCE * self.center.y.abs()
    }
}

/// Frame-to-frame persistence filter for obstacle boxes.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    obstacles: Vec<Obstacle>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held obstacles with `boxes`; each box inherits the count
    /// of the first held obstacle it lines up with.
    pub fn update(&mut self, boxes: Vec<BoundingBox>) {
        let next: Vec<Obstacle> = boxes
            .into_iter()
            .map(|b| {
                let mut o = Obstacle::new(b);
                if let Some(prev) = self.obstacles.iter().find(|p| p.matches(o.center)) {
                    o.frames_persisted = prev.frames_persisted + 1;
                }
                o
            })
            .collect();
        self.obstacles = next;
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn persistent(&self) -> Vec<BoundingBox> {
        self.obstacles
            .iter()
            .filter(|o| o.frames_persisted >= PERSISTENCE_THRESHOLD)
            .map(|o| o.bbox.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapwing_proto::ObjectType;
    use proptest::prelude::*;

    fn square(x: f32, y: f32, side: f32) -> BoundingBox {
        BoundingBox::from_corners(x, y, x + side, y + side, ObjectType::Avoid)
    }

    #[test]
    fn reported_on_the_fifth_frame() {
        let mut t = Tracker::new();
        for frame in 1..=5 {
            t.update(vec![square(100.0, 100.0, 100.0)]);
            if frame < 5 {
                assert!(t.persistent().is_empty(), "frame {}", frame);
            }
        }
        assert_eq!(t.persistent(), vec![square(100.0, 100.0, 100.0)]);
    }

    #[test]
    fn small_drift_keeps_the_count() {
        let mut t = Tracker::new();
        for i in 0..6 {
            t.update(vec![square(100.0 + i as f32 * 2.0, 100.0, 100.0)]);
        }
        assert_eq!(t.obstacles()[0].frames_persisted, 6);
    }

    #[test]
    fn a_jump_or_a_gap_resets() {
        let mut t = Tracker::new();
        for _ in 0..4 {
            t.update(vec![square(100.0, 100.0, 100.0)]);
        }
        t.update(vec![square(300.0, 100.0, 100.0)]);
        assert_eq!(t.obstacles()[0].frames_persisted, 1);

        t.update(vec![]);
        t.update(vec![square(300.0, 100.0, 100.0)]);
        assert_eq!(t.obstacles()[0].frames_persisted, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn only_persistent_boxes_are_reported(
            frames in prop::collection::vec(
                prop::collection::vec((0.0f32..600.0, 0.0f32..400.0), 0..4), 1..12)
        ) {
            let mut t = Tracker::new();
            for boxes in frames {
                t.update(boxes.iter().map(|&(x, y)| square(x, y, 40.0)).collect());
                let reported = t.persistent();
                for b in &reported {
                    let o = t.obstacles().iter().find(|o| &o.bbox == b).unwrap();
                    prop_assert!(o.frames_persisted >= PERSISTENCE_THRESHOLD);
                }
                prop_assert!(reported.len() <= t.obstacles().len());
            }
        }
    }
}
