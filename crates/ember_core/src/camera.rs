//! Perspective camera.
//!
//! Look-at construction with vertical field of view, optional thin-lens
//! aperture, and the raster connection query used by light tracing and
//! bidirectional path tracing to splat onto the film.

use ember_math::sampling::concentric_sample_disk;
use ember_math::{Ray, Vec3};

/// Camera-side result of connecting a scene point to the lens.
#[derive(Debug, Clone, Copy)]
pub struct CameraConnection {
    /// Direction from the scene point toward the lens.
    pub wi: Vec3,
    /// Distance from the scene point to the lens.
    pub dist: f32,
    /// Solid-angle PDF of sampling the lens point from the scene point.
    pub pdf: f32,
    /// Importance carried by the connection.
    pub we: f32,
    /// Continuous raster coordinates the connection lands on.
    pub raster: (f32, f32),
}

/// A perspective camera with optional defocus blur.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Lens radius; zero means a pinhole.
    pub aperture: f32,
    pub focus_dist: f32,
    pub width: u32,
    pub height: u32,

    // Derived frame, built once.
    forward: Vec3,
    right: Vec3,
    cam_up: Vec3,
    /// Half extents of the image window on the plane at unit distance.
    half_w: f32,
    half_h: f32,
}

impl PerspectiveCamera {
    pub fn new(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let mut camera = Self {
            eye,
            target,
            up,
            fov,
            aperture: 0.0,
            focus_dist: (target - eye).length(),
            width,
            height,
            forward: Vec3::Z,
            right: Vec3::X,
            cam_up: Vec3::Y,
            half_w: 1.0,
            half_h: 1.0,
        };
        camera.update_frame();
        camera
    }

    pub fn with_aperture(mut self, aperture: f32, focus_dist: f32) -> Self {
        self.aperture = aperture;
        self.focus_dist = focus_dist;
        self
    }

    fn update_frame(&mut self) {
        self.forward = (self.target - self.eye).normalize();
        self.right = self.up.cross(self.forward).normalize();
        self.cam_up = self.forward.cross(self.right);
        let aspect = self.width as f32 / self.height as f32;
        self.half_h = (self.fov * 0.5).tan();
        self.half_w = self.half_h * aspect;
    }

    /// Generate the primary ray through raster position (x, y).
    ///
    /// `x`/`y` carry the sub-pixel jitter already added. The lens uniforms
    /// select a point on the aperture disk; they are ignored for pinholes.
    pub fn generate_ray(&self, x: f32, y: f32, lens_u: f32, lens_v: f32) -> Ray {
        // NDC in [-1, 1] with y flipped so pixel (0, 0) is top-left.
        let ndc_x = 2.0 * (x / self.width as f32) - 1.0;
        let ndc_y = 1.0 - 2.0 * (y / self.height as f32);

        let dir = (self.forward
            + self.right * (ndc_x * self.half_w)
            + self.cam_up * (ndc_y * self.half_h))
            .normalize();

        if self.aperture <= 0.0 {
            return Ray::spawn(self.eye, dir);
        }

        // Thin lens: focus plane stays sharp, origin jitters on the disk.
        let focus_point = self.eye + dir * (self.focus_dist / dir.dot(self.forward));
        let d = concentric_sample_disk(lens_u, lens_v) * self.aperture;
        let origin = self.eye + self.right * d.x + self.cam_up * d.y;
        Ray::spawn(origin, (focus_point - origin).normalize())
    }

    /// Solid-angle density of the camera emitting a primary ray in `dir`,
    /// for bidirectional weighting. Zero outside the frustum cone.
    pub fn pdf_we(&self, dir: Vec3) -> f32 {
        let cos_theta = dir.dot(self.forward);
        if cos_theta <= 1e-6 {
            return 0.0;
        }
        let a = 4.0 * self.half_w * self.half_h;
        1.0 / (a * cos_theta * cos_theta * cos_theta)
    }

    /// Connect a scene point to the camera, returning the raster coordinates
    /// and the importance terms, or None when the point projects outside the
    /// film or behind the camera.
    ///
    /// The importance follows the standard perspective-camera measure: with
    /// `a` the area of the image window at unit distance,
    /// `we = 1 / (a cos^4 theta)` and the lens PDF in solid angle from the
    /// point is `dist^2 / cos theta` (pinhole lens treated as unit area).
    pub fn connect(&self, p: Vec3) -> Option<CameraConnection> {
        let to_lens = self.eye - p;
        let dist = to_lens.length();
        if dist < 1e-6 {
            return None;
        }
        let wi = to_lens / dist;

        let cos_theta = (-wi).dot(self.forward);
        if cos_theta <= 1e-6 {
            return None;
        }

        // Project onto the image plane at unit distance.
        let scaled = -wi / cos_theta;
        let ndc_x = scaled.dot(self.right) / self.half_w;
        let ndc_y = scaled.dot(self.cam_up) / self.half_h;
        if ndc_x.abs() > 1.0 || ndc_y.abs() > 1.0 {
            return None;
        }

        let raster = (
            (ndc_x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc_y) * 0.5 * self.height as f32,
        );

        let a = 4.0 * self.half_w * self.half_h;
        let cos2 = cos_theta * cos_theta;
        Some(CameraConnection {
            wi,
            dist,
            pdf: dist * dist / cos_theta,
            we: 1.0 / (a * cos2 * cos2),
            raster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Y,
            FRAC_PI_2,
            100,
            100,
        )
    }

    #[test]
    fn test_center_ray_goes_forward() {
        let cam = camera();
        let ray = cam.generate_ray(50.0, 50.0, 0.5, 0.5);
        assert!((ray.direction - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
        assert_eq!(ray.origin, Vec3::ZERO);
    }

    #[test]
    fn test_top_left_ray_points_up_left() {
        let cam = camera();
        let ray = cam.generate_ray(0.0, 0.0, 0.5, 0.5);
        // Pixel (0, 0) is the top-left corner: negative x is left in this
        // frame, positive y is up.
        assert!(ray.direction.y > 0.0);
        assert!(ray.direction.dot(cam.right) < 0.0);
    }

    #[test]
    fn test_connect_roundtrip() {
        let cam = camera();
        let ray = cam.generate_ray(30.0, 70.0, 0.5, 0.5);
        let p = ray.at(5.0);
        let conn = cam.connect(p).expect("point is in view");
        assert!((conn.raster.0 - 30.0).abs() < 1e-2);
        assert!((conn.raster.1 - 70.0).abs() < 1e-2);
        assert!(conn.pdf > 0.0);
        assert!(conn.we > 0.0);
    }

    #[test]
    fn test_connect_behind_camera() {
        let cam = camera();
        assert!(cam.connect(Vec3::new(0.0, 0.0, 5.0)).is_none());
    }
}
