use glam::Vec3;
use veil_common::Aabb;

use crate::scene::Occluder;

/// The volume a vision source can see into.
///
/// Spans `2 * radius` on both ground axes and `camera_offset` upwards from the
/// source, so geometry under the source or above its clip plane is ignored.
pub fn influence_volume(position: Vec3, radius: f32, camera_offset: f32) -> Aabb {
    let center = Vec3::new(position.x, position.y + camera_offset * 0.5, position.z);
    Aabb::from_center_size(center, Vec3::new(radius * 2.0, camera_offset, radius * 2.0))
}

/// Occluders whose current world bounds intersect `volume`, in input order.
pub fn cull<'a, I>(occluders: I, volume: Aabb) -> impl Iterator<Item = &'a Occluder>
where
    I: IntoIterator<Item = &'a Occluder>,
{
    occluders
        .into_iter()
        .filter(move |o| o.world_bounds().intersects(&volume))
}
