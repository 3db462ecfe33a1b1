//! Model transform of a primitive.
//!
//! Plain data: nothing here touches the GPU. Shaders that want the matrix must
//! be fed it by the caller.

use glam::{Mat4, Vec3};

/// 4×4 model matrix (column-major, translation in the last column).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ModelTransform {
    matrix: Mat4,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ModelTransform {
    pub const fn identity() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
        }
    }

    pub const fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix }
    }

    /// Replaces the translation; rotation and scale are left untouched.
    pub fn set_position(&mut self, position: Vec3) {
        let w = self.matrix.w_axis.w;
        self.matrix.w_axis = position.extend(w);
    }

    pub fn position(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }
}
