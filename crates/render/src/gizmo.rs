use glam::Vec3;
use veil_common::Rect;

/// A debug line in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Vec3,
    pub end: Vec3,
}

/// Outline of the visibility area at the given height, as four segments
/// walking the corners in order.
pub fn area_outline(area: Rect, height: f32) -> [LineSegment; 4] {
    let corners = [
        Vec3::new(area.min.x, height, area.min.y),
        Vec3::new(area.max.x, height, area.min.y),
        Vec3::new(area.max.x, height, area.max.y),
        Vec3::new(area.min.x, height, area.max.y),
    ];
    std::array::from_fn(|i| LineSegment {
        start: corners[i],
        end: corners[(i + 1) % 4],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_is_closed_at_height() {
        let lines = area_outline(Rect::from_xywh(0.0, 0.0, 20.0, 10.0), 5.0);
        for pair in lines.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(lines[3].end, lines[0].start);
        assert!(lines.iter().all(|l| l.start.y == 5.0 && l.end.y == 5.0));
        assert_eq!(lines[1].start, Vec3::new(20.0, 5.0, 0.0));
    }
}
