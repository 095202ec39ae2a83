use glam::Vec3;
use serde::{Deserialize, Serialize};
use veil_common::{Aabb, Transform};

/// Handle to a vision source inside a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// Handle to an occluder inside a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccluderId(pub u64);

/// A point that reveals the fog around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionSource {
    pub position: Vec3,
    /// Per-source radius. `None` uses the compositor's configured radius.
    #[serde(default)]
    pub radius: Option<f32>,
}

impl VisionSource {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            radius: None,
        }
    }

    pub fn with_radius(position: Vec3, radius: f32) -> Self {
        Self {
            position,
            radius: Some(radius),
        }
    }

    pub fn radius_or(&self, default: f32) -> f32 {
        self.radius.unwrap_or(default)
    }
}

/// Geometry that blocks line of sight.
///
/// The shape is a local-space box; the world transform places it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occluder {
    pub transform: Transform,
    #[serde(default = "Aabb::unit")]
    pub shape: Aabb,
}

impl Occluder {
    /// A unit cube scaled, rotated and placed by `transform`.
    pub fn cuboid(transform: Transform) -> Self {
        Self {
            transform,
            shape: Aabb::unit(),
        }
    }

    /// Current world-space bounds.
    pub fn world_bounds(&self) -> Aabb {
        self.shape.transformed(&self.transform.matrix())
    }
}

/// Ordered collection of vision sources and occluders.
///
/// Insertion order is kept stable across removals so draw order never
/// depends on handle values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "SceneDesc", into = "SceneDesc")]
pub struct Scene {
    sources: Vec<(SourceId, VisionSource)>,
    occluders: Vec<(OccluderId, Occluder)>,
    next_id: u64,
}

/// Serialized form of a scene: plain ordered lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SceneDesc {
    #[serde(default)]
    sources: Vec<VisionSource>,
    #[serde(default)]
    occluders: Vec<Occluder>,
}

impl From<SceneDesc> for Scene {
    fn from(desc: SceneDesc) -> Self {
        let mut scene = Scene::new();
        for s in desc.sources {
            scene.add_source(s);
        }
        for o in desc.occluders {
            scene.add_occluder(o);
        }
        scene
    }
}

impl From<Scene> for SceneDesc {
    fn from(scene: Scene) -> Self {
        Self {
            sources: scene.sources.into_iter().map(|(_, s)| s).collect(),
            occluders: scene.occluders.into_iter().map(|(_, o)| o).collect(),
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn occluder_count(&self) -> usize {
        self.occluders.len()
    }

    /// True when the compositor has nothing to do this frame.
    pub fn is_passthrough(&self) -> bool {
        self.sources.is_empty() || self.occluders.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &VisionSource> {
        self.sources.iter().map(|(_, s)| s)
    }

    pub fn occluders(&self) -> impl Iterator<Item = &Occluder> {
        self.occluders.iter().map(|(_, o)| o)
    }

    pub fn add_source(&mut self, source: VisionSource) -> SourceId {
        let id = SourceId(self.bump());
        tracing::debug!(?id, position = ?source.position, "vision source added");
        self.sources.push((id, source));
        id
    }

    pub fn add_occluder(&mut self, occluder: Occluder) -> OccluderId {
        let id = OccluderId(self.bump());
        tracing::debug!(?id, "occluder added");
        self.occluders.push((id, occluder));
        id
    }

    pub fn source(&self, id: SourceId) -> Option<&VisionSource> {
        self.sources.iter().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut VisionSource> {
        self.sources
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, s)| s)
    }

    pub fn occluder_mut(&mut self, id: OccluderId) -> Option<&mut Occluder> {
        self.occluders
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, o)| o)
    }

    /// Move a vision source. Returns false if the handle is unknown.
    pub fn set_source_position(&mut self, id: SourceId, position: Vec3) -> bool {
        match self.source_mut(id) {
            Some(s) => {
                s.position = position;
                true
            }
            None => false,
        }
    }

    pub fn remove_source(&mut self, id: SourceId) -> Option<VisionSource> {
        let idx = self.sources.iter().position(|(i, _)| *i == id)?;
        tracing::debug!(?id, "vision source removed");
        Some(self.sources.remove(idx).1)
    }

    pub fn remove_occluder(&mut self, id: OccluderId) -> Option<Occluder> {
        let idx = self.occluders.iter().position(|(i, _)| *i == id)?;
        tracing::debug!(?id, "occluder removed");
        Some(self.occluders.remove(idx).1)
    }

    fn bump(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_starts_empty() {
        let s = Scene::new();
        assert_eq!(s.source_count(), 0);
        assert_eq!(s.occluder_count(), 0);
        assert!(s.is_passthrough());
    }

    #[test]
    fn passthrough_needs_both_lists() {
        let mut s = Scene::new();
        s.add_source(VisionSource::new(Vec3::ZERO));
        assert!(s.is_passthrough());
        s.add_occluder(Occluder::cuboid(Transform::default()));
        assert!(!s.is_passthrough());
    }

    #[test]
    fn removal_keeps_order() {
        let mut s = Scene::new();
        let a = s.add_source(VisionSource::new(Vec3::X));
        let b = s.add_source(VisionSource::new(Vec3::Y));
        let c = s.add_source(VisionSource::new(Vec3::Z));
        assert!(s.remove_source(b).is_some());
        assert!(s.remove_source(b).is_none());
        let order: Vec<Vec3> = s.sources().map(|v| v.position).collect();
        assert_eq!(order, vec![Vec3::X, Vec3::Z]);
        assert!(s.source(a).is_some());
        assert!(s.source(c).is_some());
    }

    #[test]
    fn occluders_edit_and_remove_by_handle() {
        let mut s = Scene::new();
        s.add_source(VisionSource::new(Vec3::ZERO));
        let wall = s.add_occluder(Occluder::cuboid(Transform::default()));
        let pillar = s.add_occluder(Occluder::cuboid(Transform::from_position(Vec3::X)));

        s.occluder_mut(wall).unwrap().transform.position = Vec3::new(4.0, 0.0, 4.0);
        let first = s.occluders().next().unwrap();
        assert_eq!(first.transform.position, Vec3::new(4.0, 0.0, 4.0));

        assert!(s.remove_occluder(wall).is_some());
        assert!(s.remove_occluder(wall).is_none());
        assert!(s.occluder_mut(wall).is_none());
        assert_eq!(s.occluder_count(), 1);
        assert!(!s.is_passthrough());

        assert!(s.remove_occluder(pillar).is_some());
        assert!(s.is_passthrough());
    }

    #[test]
    fn move_source() {
        let mut s = Scene::new();
        let id = s.add_source(VisionSource::with_radius(Vec3::ZERO, 3.0));
        assert!(s.set_source_position(id, Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(s.source(id).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        assert!(!s.set_source_position(SourceId(99), Vec3::ZERO));
    }

    #[test]
    fn radius_falls_back_to_default() {
        assert_eq!(VisionSource::new(Vec3::ZERO).radius_or(10.0), 10.0);
        assert_eq!(VisionSource::with_radius(Vec3::ZERO, 4.0).radius_or(10.0), 4.0);
    }

    #[test]
    fn occluder_world_bounds_follow_transform() {
        let o = Occluder::cuboid(Transform {
            position: Vec3::new(5.0, 1.0, 5.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
            ..Transform::default()
        });
        let b = o.world_bounds();
        assert!((b.min - Vec3::new(4.0, 0.0, 4.0)).length() < 1e-5);
        assert!((b.max - Vec3::new(6.0, 2.0, 6.0)).length() < 1e-5);
    }

    #[test]
    fn scene_yaml_roundtrip_keeps_order() {
        let yaml = r#"
sources:
  - position: [1.0, 0.0, 1.0]
  - position: [2.0, 0.0, 2.0]
    radius: 4.0
occluders:
  - transform:
      position: [3.0, 0.0, 3.0]
      rotation: [0.0, 0.0, 0.0, 1.0]
      scale: [1.0, 2.0, 1.0]
"#;
        let scene: Scene = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scene.source_count(), 2);
        assert_eq!(scene.occluder_count(), 1);
        let radii: Vec<Option<f32>> = scene.sources().map(|s| s.radius).collect();
        assert_eq!(radii, vec![None, Some(4.0)]);
        assert_eq!(scene.occluders().next().unwrap().shape, Aabb::unit());
    }
}
