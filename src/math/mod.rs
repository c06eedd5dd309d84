use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Quaternion, Vector3};

/// 3x4 bone transform: `v' = rotation * v + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3x4 {
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
}

impl Transform3x4 {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            translation: Vector3::new(0.0, 0.0, 0.0),
        }
    }

    /// Row-major access, `m[row][col]` with column 3 as translation.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        if col == 3 {
            self.translation[row]
        } else {
            self.rotation[col][row]
        }
    }

    /// `self` applied after `other`.
    pub fn concat(&self, other: &Transform3x4) -> Transform3x4 {
        Transform3x4 {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.rotation * v + self.translation
    }

    pub fn rotate(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.rotation * v
    }
}

pub fn matrix3_from_rows(r0: [f32; 3], r1: [f32; 3], r2: [f32; 3]) -> Matrix3<f32> {
    Matrix3::new(
        r0[0], r1[0], r2[0], //
        r0[1], r1[1], r2[1], //
        r0[2], r1[2], r2[2],
    )
}

/// 3x4 rotation from Euler angles in degrees, ZYX order, no translation.
pub fn angle_matrix(degrees: [f32; 3]) -> Transform3x4 {
    let (sy, cy) = degrees[2].to_radians().sin_cos();
    let (sp, cp) = degrees[1].to_radians().sin_cos();
    let (sr, cr) = degrees[0].to_radians().sin_cos();

    Transform3x4 {
        rotation: matrix3_from_rows(
            [cp * cy, sr * sp * cy - cr * sy, cr * sp * cy + sr * sy],
            [cp * sy, sr * sp * sy + cr * cy, cr * sp * sy - sr * cy],
            [-sp, sr * cp, cr * cp],
        ),
        translation: Vector3::new(0.0, 0.0, 0.0),
    }
}

/// BMD stores bone rotations in radians; the angle matrix takes degrees.
pub fn radians_to_degrees(radians: [f32; 3]) -> [f32; 3] {
    [
        radians[0].to_degrees(),
        radians[1].to_degrees(),
        radians[2].to_degrees(),
    ]
}

pub fn rotation_from_radians(radians: [f32; 3]) -> Matrix3<f32> {
    angle_matrix(radians_to_degrees(radians)).rotation
}

/// Unit vector, or zero for a zero-length input.
pub fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    let len = v.magnitude();
    if len == 0.0 {
        Vector3::new(0.0, 0.0, 0.0)
    } else {
        v / len
    }
}

/// Source space is Z-up; the output is Y-up. Swapping Y and Z also flips handedness.
pub fn swizzle_vec3(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, v.z, v.y)
}

/// Same basis change applied to a rotation: swap rows and columns 1 and 2.
pub fn swizzle_matrix3(m: Matrix3<f32>) -> Matrix3<f32> {
    const PERM: [usize; 3] = [0, 2, 1];
    let at = |row: usize, col: usize| m[PERM[col]][PERM[row]];
    matrix3_from_rows(
        [at(0, 0), at(0, 1), at(0, 2)],
        [at(1, 0), at(1, 1), at(1, 2)],
        [at(2, 0), at(2, 1), at(2, 2)],
    )
}

/// Rotation matrix to unit quaternion (trace method).
pub fn matrix3_to_quaternion(mat: Matrix3<f32>) -> Quaternion<f32> {
    let m00 = mat.x.x;
    let m01 = mat.y.x;
    let m02 = mat.z.x;
    let m10 = mat.x.y;
    let m11 = mat.y.y;
    let m12 = mat.z.y;
    let m20 = mat.x.z;
    let m21 = mat.y.z;
    let m22 = mat.z.z;

    let trace = m00 + m11 + m22;
    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quaternion::new(0.25 * s, (m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s)
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        Quaternion::new((m21 - m12) / s, 0.25 * s, (m01 + m10) / s, (m02 + m20) / s)
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        Quaternion::new((m02 - m20) / s, (m01 + m10) / s, 0.25 * s, (m12 + m21) / s)
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        Quaternion::new((m10 - m01) / s, (m02 + m20) / s, (m12 + m21) / s, 0.25 * s)
    };

    if q.magnitude2() == 0.0 || !q.magnitude2().is_finite() {
        return Quaternion::new(1.0, 0.0, 0.0, 0.0);
    }
    q.normalize()
}

/// glTF order: x, y, z, w
pub fn quaternion_to_xyzw(q: Quaternion<f32>) -> [f32; 4] {
    [q.v.x, q.v.y, q.v.z, q.s]
}

/// Inverse of a rotation + translation with no scale: transpose the rotation
/// and negate the rotated translation.
pub fn rigid_inverse(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Matrix4<f32> {
    let inv_rotation = rotation.transpose();
    let inv_translation = -(inv_rotation * translation);
    let mut out = Matrix4::from(inv_rotation);
    out.w = inv_translation.extend(1.0);
    out
}

/// Column-major flattening, the layout glTF expects for MAT4 accessors.
pub fn matrix4_to_column_major(m: Matrix4<f32>) -> [f32; 16] {
    let cols: [[f32; 4]; 4] = m.into();
    let mut out = [0.0f32; 16];
    for (c, col) in cols.iter().enumerate() {
        out[c * 4..c * 4 + 4].copy_from_slice(col);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn assert_vec_eq(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).magnitude() < 0.0001, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_angle_matrix_zero_is_identity() {
        let m = angle_matrix([0.0, 0.0, 0.0]);
        assert_eq!(m, Transform3x4::identity());
    }

    #[test]
    fn test_angle_matrix_yaw_90() {
        // rotation about Z by 90 degrees maps X onto Y
        let m = angle_matrix([0.0, 0.0, 90.0]);
        assert_vec_eq(m.rotate(Vector3::new(1.0, 0.0, 0.0)), Vector3::new(0.0, 1.0, 0.0));
        assert!((m.at(2, 0) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_concat_adds_translation() {
        let mut parent = angle_matrix([0.0, 0.0, 90.0]);
        parent.translation = Vector3::new(1.0, 2.0, 3.0);
        let child = Transform3x4 {
            translation: Vector3::new(1.0, 0.0, 0.0),
            ..Transform3x4::identity()
        };
        let out = parent.concat(&child);
        assert_vec_eq(out.translation, Vector3::new(1.0, 3.0, 3.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(
            normalize_or_zero(Vector3::new(0.0, 0.0, 0.0)),
            Vector3::new(0.0, 0.0, 0.0)
        );
        assert_vec_eq(
            normalize_or_zero(Vector3::new(0.0, 3.0, 4.0)),
            Vector3::new(0.0, 0.6, 0.8),
        );
    }

    #[test]
    fn test_swizzle_matrix_keeps_rotation_consistent() {
        let m = rotation_from_radians([0.3, -0.7, 1.1]);
        let v = Vector3::new(0.5, -1.0, 2.0);
        let lhs = swizzle_vec3(m * v);
        let rhs = swizzle_matrix3(m) * swizzle_vec3(v);
        assert_vec_eq(lhs, rhs);
    }

    #[test]
    fn test_quaternion_identity() {
        let q = matrix3_to_quaternion(Matrix3::identity());
        assert_eq!(quaternion_to_xyzw(q), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_quaternion_matches_matrix() {
        for angles in [[0.2, 0.4, 0.6], [3.0, 0.1, -2.0], [0.0, 3.1, 0.0]] {
            let m = rotation_from_radians(angles);
            let q = matrix3_to_quaternion(m);
            let back = Matrix3::from(q);
            let v = Vector3::new(1.0, 2.0, 3.0);
            assert_vec_eq(m * v, back * v);
        }
    }

    #[test]
    fn test_rigid_inverse() {
        let r = rotation_from_radians([0.5, 0.25, -1.0]);
        let t = Vector3::new(3.0, -4.0, 5.0);
        let mut forward = Matrix4::from(r);
        forward.w = t.extend(1.0);
        let product = forward * rigid_inverse(r, t);
        let identity = Matrix4::<f32>::identity();
        for c in 0..4 {
            for r in 0..4 {
                assert!((product[c][r] - identity[c][r]).abs() < 0.0001);
            }
        }
    }

    #[test]
    fn test_column_major_translation_last() {
        let m = rigid_inverse(Matrix3::identity(), Vector3::new(1.0, 2.0, 3.0));
        let flat = matrix4_to_column_major(m);
        assert_eq!(&flat[12..16], &[-1.0, -2.0, -3.0, 1.0]);
    }
}
