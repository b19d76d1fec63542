use cube_motion::MotionSnapshot;
use glam::{Mat4, Quat, Vec3};

/// The cube posed by the motion pipeline.
pub struct CubeNode {
    pub orientation: Quat,
    pub position: Vec3,
    /// Edge length in scene units.
    pub size: f32,
}

impl CubeNode {
    pub fn new(size: f32) -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            size,
        }
    }

    /// Copy the pose from the latest motion snapshot.
    pub fn apply(&mut self, snapshot: &MotionSnapshot) {
        self.orientation = snapshot.orientation;
        self.position = snapshot.position;
    }

    /// Compute the model matrix for this cube.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.size),
            self.orientation,
            self.position,
        )
    }

    /// World-space positions of the eight corners.
    pub fn corners(&self) -> [Vec3; 8] {
        let model = self.model_matrix();
        let mut out = [Vec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            );
            *corner = model.transform_point3(local);
        }
        out
    }
}

impl Default for CubeNode {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_copies_pose() {
        let snapshot = MotionSnapshot {
            orientation: Quat::from_rotation_y(0.5),
            position: Vec3::new(0.1, -0.2, 0.0),
            ..MotionSnapshot::default()
        };
        let mut cube = CubeNode::default();
        cube.apply(&snapshot);

        assert_eq!(cube.orientation, snapshot.orientation);
        assert_eq!(cube.position, snapshot.position);
    }

    #[test]
    fn model_matrix_translates_and_scales() {
        let mut cube = CubeNode::new(2.0);
        cube.position = Vec3::new(1.0, 0.0, 0.0);

        let p = cube.model_matrix().transform_point3(Vec3::new(0.5, 0.0, 0.0));
        assert!((p - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn corners_follow_rotation() {
        let mut cube = CubeNode::new(1.0);
        cube.orientation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);

        // (+x, -y) local corner maps onto (+x, +y) after a quarter turn about z.
        let corner = cube.corners()[1];
        assert!((corner - Vec3::new(0.5, 0.5, -0.5)).length() < 1e-5);
    }
}
