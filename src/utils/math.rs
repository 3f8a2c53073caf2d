//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Basis columns shorter than this are treated as collapsed by a zero scale.
pub const COLLAPSED_AXIS_EPSILON: f32 = 1e-6;

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Rotation-and-translation first, then scale appended on the right.
pub fn compose(position: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_rotation_translation(rotation, position) * Mat4::from_scale(scale)
}

/// Splits an affine matrix into position, rotation and per-axis scale.
///
/// Scale is the length of each basis column. Columns collapsed by a zero scale are not
/// normalized; the rotation is completed from the surviving columns so the result never
/// contains NaN.
pub fn decompose(matrix: &Mat4) -> (Vec3, Quat, Vec3) {
    let columns = [
        matrix.x_axis.truncate(),
        matrix.y_axis.truncate(),
        matrix.z_axis.truncate(),
    ];
    let scale = Vec3::new(
        columns[0].length(),
        columns[1].length(),
        columns[2].length(),
    );

    let mut axes = [None; 3];
    for (i, column) in columns.iter().enumerate() {
        if scale[i] > COLLAPSED_AXIS_EPSILON {
            axes[i] = Some(*column / scale[i]);
        }
    }

    let rotation = match axes {
        [Some(x), Some(y), Some(z)] => Quat::from_mat3(&Mat3::from_cols(x, y, z)),
        [Some(x), Some(y), None] => Quat::from_mat3(&Mat3::from_cols(x, y, x.cross(y))),
        [None, Some(y), Some(z)] => Quat::from_mat3(&Mat3::from_cols(y.cross(z), y, z)),
        [Some(x), None, Some(z)] => Quat::from_mat3(&Mat3::from_cols(x, z.cross(x), z)),
        [Some(x), None, None] => Quat::from_rotation_arc(Vec3::X, x),
        [None, Some(y), None] => Quat::from_rotation_arc(Vec3::Y, y),
        [None, None, Some(z)] => Quat::from_rotation_arc(Vec3::Z, z),
        [None, None, None] => Quat::IDENTITY,
    };

    let rotation = if rotation.is_finite() && rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    };

    (matrix.w_axis.truncate(), rotation, scale)
}

/// Axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Box enclosing the eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            matrix.transform_point3(corner)
        });
        Self::from_points(corners).unwrap_or_default()
    }
}

/// IEEE 754 binary16 bits for `value`, rounded to nearest.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let full = mantissa | 0x0080_0000;
        let shift = (14 - half_exponent) as u32;
        let half = full >> shift;
        let round = (full >> (shift - 1)) & 1;
        return sign | (half + round) as u16;
    }

    let half = ((half_exponent as u32) << 10) | (mantissa >> 13);
    let round = (mantissa >> 12) & 1;
    sign | (half + round) as u16
}

/// Signed normalized 16-bit encoding of a value in `[-1, 1]`.
pub fn f32_to_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Unsigned normalized 8-bit encoding mapping `[-1, 1]` onto `[0, 255]`.
pub fn f32_to_unorm8(value: f32) -> u8 {
    ((value.clamp(-1.0, 1.0) * 0.5 + 0.5) * u8::MAX as f32).round() as u8
}

/// Inverse of [`f32_to_f16_bits`].
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f32::from(bits & 0x03ff);
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => sign * f32::INFINITY,
        0x1f => f32::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

pub fn snorm16_to_f32(value: i16) -> f32 {
    (f32::from(value) / i16::MAX as f32).max(-1.0)
}

pub fn unorm8_to_f32(value: u8) -> f32 {
    f32::from(value) / u8::MAX as f32 * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decompose_recovers_trs() {
        let rotation = Quat::from_rotation_y(0.7);
        let matrix = compose(Vec3::new(1.0, 2.0, 3.0), rotation, Vec3::new(2.0, 3.0, 4.0));
        let (position, recovered, scale) = decompose(&matrix);
        assert_relative_eq!(position.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(scale.z, 4.0, epsilon = 1e-5);
        assert!(recovered.angle_between(rotation) < 1e-3);
    }

    #[test]
    fn zero_scale_axis_keeps_rotation_finite() {
        let rotation = Quat::from_rotation_z(0.5);
        let matrix = compose(Vec3::ZERO, rotation, Vec3::new(1.0, 0.0, 1.0));
        let (_, recovered, scale) = decompose(&matrix);
        assert_eq!(scale.y, 0.0);
        assert!(recovered.is_finite());
        assert!(recovered.angle_between(rotation) < 1e-3);
    }

    #[test]
    fn fully_collapsed_matrix_gives_identity_rotation() {
        let (_, rotation, scale) = decompose(&Mat4::from_scale(Vec3::ZERO));
        assert_eq!(rotation, Quat::IDENTITY);
        assert_eq!(scale, Vec3::ZERO);
    }

    #[test]
    fn half_float_encoding_matches_known_values() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3c00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xc000);
        assert_eq!(f32_to_f16_bits(0.5), 0x3800);
        assert_eq!(f32_to_f16_bits(0.0), 0);
        assert_eq!(f32_to_f16_bits(1.0e6), 0x7c00);
        assert_eq!(f16_bits_to_f32(0x3c00), 1.0);
        assert_eq!(f16_bits_to_f32(f32_to_f16_bits(-0.25)), -0.25);
    }

    #[test]
    fn half_float_handles_non_finite_and_tiny_values() {
        let nan = f32_to_f16_bits(f32::NAN);
        assert_eq!(nan & 0x7c00, 0x7c00);
        assert_ne!(nan & 0x03ff, 0);
        assert!(f16_bits_to_f32(nan).is_nan());

        assert_eq!(f32_to_f16_bits(f32::INFINITY), 0x7c00);
        assert_eq!(f32_to_f16_bits(f32::NEG_INFINITY), 0xfc00);
        assert_eq!(f16_bits_to_f32(0xfc00), f32::NEG_INFINITY);

        // Below the half range: f32 subnormals flush to signed zero.
        assert_eq!(f32_to_f16_bits(1.0e-40), 0);
        assert_eq!(f32_to_f16_bits(-1.0e-40), 0x8000);

        // Half subnormals survive the round trip exactly.
        let tiny = 2f32.powi(-20);
        assert_eq!(f32_to_f16_bits(tiny), 0x0010);
        assert_eq!(f16_bits_to_f32(f32_to_f16_bits(tiny)), tiny);
        assert_eq!(f32_to_f16_bits(2f32.powi(-24)), 0x0001);
    }

    #[test]
    fn normalized_encodings_clamp() {
        assert_eq!(f32_to_snorm16(2.0), i16::MAX);
        assert_eq!(f32_to_unorm8(-1.0), 0);
        assert_eq!(f32_to_unorm8(1.0), 255);
    }

    #[test]
    fn transformed_box_encloses_rotated_corners() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        assert_relative_eq!(rotated.max.x, 2.0_f32.sqrt(), epsilon = 1e-5);
        assert_relative_eq!(rotated.max.y, 1.0, epsilon = 1e-5);
    }
}
