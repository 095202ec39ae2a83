use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use veil_common::Rect;

/// Near plane distance of the top-down vision camera.
pub const VISION_NEAR: f32 = 0.01;

/// View and projection of the synthetic camera that looks straight down onto
/// the visibility area for one vision source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopDownCamera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl TopDownCamera {
    /// Camera above the area centre, its near plane `camera_offset` above the
    /// source and its far plane at the source's height.
    pub fn new(area: Rect, source_height: f32, camera_offset: f32) -> Self {
        let far = VISION_NEAR + camera_offset;
        let center = area.center();
        let eye = Vec3::new(center.x, source_height + far, center.y);
        Self {
            view: top_down_view(eye),
            projection: top_down_projection(area.width(), area.height(), VISION_NEAR, far),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Inverse of a camera placed at `eye` whose local X is world X, local Y is
/// world Z and whose forward axis (local +Z) points down.
pub fn top_down_view(eye: Vec3) -> Mat4 {
    let camera_to_world = Mat4::from_cols(
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.0, -1.0, 0.0, 0.0),
        eye.extend(1.0),
    );
    camera_to_world.inverse()
}

/// Orthographic projection covering exactly `width` x `height`, with depth in
/// `[0, 1]` between `near` and `far` along the camera's +Z.
///
/// Y is flipped so clip-space +Y lands on texel row 0, which makes texel rows
/// increase with world Z.
pub fn top_down_projection(width: f32, height: f32, near: f32, far: f32) -> Mat4 {
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0 / height, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0 / depth, 0.0),
        Vec4::new(0.0, 0.0, -near / depth, 1.0),
    )
}

/// Model matrix of the quad stamped for a vision source: a unit quad in the
/// local XY plane, laid flat on the ground and scaled to the source's diameter.
pub fn vision_quad(position: Vec3, radius: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        Vec3::new(radius * 2.0, radius * 2.0, 1.0),
        Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
        position,
    )
}

/// The main scene camera, as supplied by the host each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MainCamera {
    /// Camera-to-world transform. The camera looks down its local -Z with +Y up.
    pub camera_to_world: Mat4,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
}

impl Default for MainCamera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 20.0, -20.0), Vec3::ZERO, 60.0)
    }
}

impl MainCamera {
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_degrees: f32) -> Self {
        let up = if (target - eye).normalize_or_zero().abs_diff_eq(Vec3::NEG_Y, 1e-4)
            || (target - eye).normalize_or_zero().abs_diff_eq(Vec3::Y, 1e-4)
        {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Self {
            camera_to_world: Mat4::look_at_rh(eye, target, up).inverse(),
            fov_y_degrees,
        }
    }

    /// Distance of the unit-height image plane: `1 / tan(fov / 2)`.
    pub fn focal_distance(&self) -> f32 {
        1.0 / (self.fov_y_degrees.to_radians() * 0.5).tan()
    }

    pub fn position(&self) -> Vec3 {
        self.camera_to_world.w_axis.truncate()
    }

    /// World-space direction through a point in normalized device coordinates.
    pub fn ray_direction(&self, ndc: Vec2, aspect: f32) -> Vec3 {
        let local = Vec3::new(ndc.x * aspect, ndc.y, -self.focal_distance());
        self.camera_to_world.transform_vector3(local).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Rect {
        Rect::from_xywh(0.0, 0.0, 20.0, 10.0)
    }

    #[test]
    fn area_corners_reach_clip_corners() {
        let cam = TopDownCamera::new(area(), 0.0, 5.0);
        let vp = cam.view_projection();
        let min = vp.project_point3(Vec3::new(0.0, 0.0, 0.0));
        let max = vp.project_point3(Vec3::new(20.0, 0.0, 10.0));
        // min corner -> left edge, clip +Y (texel row 0)
        assert!((min.x + 1.0).abs() < 1e-5 && (min.y - 1.0).abs() < 1e-5);
        assert!((max.x - 1.0).abs() < 1e-5 && (max.y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn depth_spans_source_to_clip_plane() {
        let cam = TopDownCamera::new(area(), 2.0, 5.0);
        let vp = cam.view_projection();
        let at_source = vp.project_point3(Vec3::new(10.0, 2.0, 5.0));
        let at_clip = vp.project_point3(Vec3::new(10.0, 7.0, 5.0));
        let midway = vp.project_point3(Vec3::new(10.0, 4.5, 5.0));
        assert!((at_source.z - 1.0).abs() < 1e-4);
        assert!(at_clip.z.abs() < 1e-4);
        assert!(midway.z > 0.0 && midway.z < 1.0);
    }

    #[test]
    fn view_looks_down() {
        let view = top_down_view(Vec3::new(3.0, 10.0, 4.0));
        let below = view.transform_point3(Vec3::new(3.0, 0.0, 4.0));
        assert!((below - Vec3::new(0.0, 0.0, 10.0)).length() < 1e-5);
        let along_z = view.transform_point3(Vec3::new(3.0, 10.0, 6.0));
        assert!((along_z - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn vision_quad_lies_on_the_ground() {
        let m = vision_quad(Vec3::new(5.0, 1.0, 5.0), 2.0);
        let corner = m.transform_point3(Vec3::new(0.5, 0.5, 0.0));
        assert!((corner.y - 1.0).abs() < 1e-5);
        assert!(((corner.x - 5.0).abs() - 2.0).abs() < 1e-5);
        assert!(((corner.z - 5.0).abs() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn focal_distance_of_ninety_degrees_is_one() {
        let cam = MainCamera {
            camera_to_world: Mat4::IDENTITY,
            fov_y_degrees: 90.0,
        };
        assert!((cam.focal_distance() - 1.0).abs() < 1e-5);
        let centre = cam.ray_direction(Vec2::ZERO, 1.0);
        assert!((centre - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn look_at_points_the_centre_ray_at_the_target() {
        let cam = MainCamera::look_at(Vec3::new(0.0, 10.0, 10.0), Vec3::ZERO, 60.0);
        let dir = cam.ray_direction(Vec2::ZERO, 16.0 / 9.0);
        let expected = (Vec3::ZERO - Vec3::new(0.0, 10.0, 10.0)).normalize();
        assert!((dir - expected).length() < 1e-4);
        assert!((cam.position() - Vec3::new(0.0, 10.0, 10.0)).length() < 1e-4);
    }
}
