use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// 正規化時のゼロ長判定しきい値
pub const EPSILON: f64 = 1e-10;

/// 3次元ベクトル（位置・方向の両方に使用）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UNIT_X: Vector3 = Vector3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const UNIT_Y: Vector3 = Vector3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const UNIT_Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 内積
    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// 外積（右手系）
    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// ベクトルの長さ
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// XY平面での長さ
    pub fn norm_xy(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// 正規化（ゼロ長の場合は None）
    pub fn try_normalize(&self) -> Option<Vector3> {
        let n = self.norm();
        if n < EPSILON {
            None
        } else {
            Some(*self * (1.0 / n))
        }
    }

    /// 正規化（ゼロ長の場合は指定したフォールバック方向を返す）
    pub fn normalize_or(&self, fallback: Vector3) -> Vector3 {
        self.try_normalize().unwrap_or(fallback)
    }

    /// `axis` に垂直な平面への射影（`axis` は単位ベクトル）
    pub fn reject_from(&self, axis: &Vector3) -> Vector3 {
        *self - *axis * self.dot(axis)
    }

    /// 3次元ユークリッド距離
    pub fn distance(&self, other: &Vector3) -> f64 {
        (*self - *other).norm()
    }

    /// XY平面でのユークリッド距離
    pub fn distance_xy(&self, other: &Vector3) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// XY平面でのマンハッタン距離（グリッドモード用）
    pub fn manhattan_xy(&self, other: &Vector3) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// 2つの単位ベクトル間の角度（度）
    pub fn angle_to_deg(&self, other: &Vector3) -> f64 {
        self.dot(other).clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// `self` に垂直な任意の単位ベクトル
    ///
    /// `self` がX軸とほぼ平行な場合はY軸を補助軸に使います。
    pub fn any_perpendicular(&self) -> Vector3 {
        let aux = if self.x.abs() < 0.9 { Vector3::UNIT_X } else { Vector3::UNIT_Y };
        aux.cross(self).normalize_or(Vector3::UNIT_Z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from(v: [f64; 3]) -> Self {
        Vector3::new(v[0], v[1], v[2])
    }
}

impl From<Vector3> for [f64; 3] {
    fn from(v: Vector3) -> Self {
        v.to_array()
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// 3x3回転行列（行優先）
///
/// フレーム (T, N, B) を列ベクトルとして並べた行列 `[T | N | B]` を表現します。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3 {
    pub m: [[f64; 3]; 3],
}

impl Matrix3 {
    /// 3本の列ベクトルから行列を作成
    pub fn from_columns(c0: Vector3, c1: Vector3, c2: Vector3) -> Self {
        Self {
            m: [
                [c0.x, c1.x, c2.x],
                [c0.y, c1.y, c2.y],
                [c0.z, c1.z, c2.z],
            ],
        }
    }

    pub fn transpose(&self) -> Self {
        let m = &self.m;
        Self {
            m: [
                [m[0][0], m[1][0], m[2][0]],
                [m[0][1], m[1][1], m[2][1]],
                [m[0][2], m[1][2], m[2][2]],
            ],
        }
    }

    pub fn mul_matrix(&self, other: &Matrix3) -> Self {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Self { m: out }
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// 内因性XYZオイラー角（度）への分解
    ///
    /// `R = Rx(a) · Ry(b) · Rz(c)` として `(a, b, c)` を返します。
    /// ジンバルロック（|b| ≈ 90°）では `c = 0` に固定します。
    pub fn to_intrinsic_xyz_deg(&self) -> (f64, f64, f64) {
        let m = &self.m;
        let sin_b = m[0][2].clamp(-1.0, 1.0);
        let b = sin_b.asin();
        let (a, c) = if sin_b.abs() < 1.0 - 1e-9 {
            ((-m[1][2]).atan2(m[2][2]), (-m[0][1]).atan2(m[0][0]))
        } else {
            (m[2][1].atan2(m[1][1]), 0.0)
        };
        (a.to_degrees(), b.to_degrees(), c.to_degrees())
    }
}
