//! 軌道に沿った移動座標系（T, N, B）の計算
//!
//! 平行移動（parallel transport）でフレームを伝搬しつつ、
//! 各ステップで従法線 B を鉛直方向（`up_hint` の射影）へ重み α でブレンドします。
//! 純粋な平行移動は長い経路で鉛直から漂流するため、このバイアス項で傾きを有界に保ちます。

use crate::geometry::trajectory::{ArcTrajectory, Trajectory};
use crate::geometry::vector::{Matrix3, Vector3};

/// 鉛直補正のデフォルト重み
pub const DEFAULT_CORRECTION_WEIGHT: f64 = 0.1;

/// 正規直交フレーム
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// 接線（進行方向）
    pub tangent: Vector3,
    /// 法線（横方向）
    pub normal: Vector3,
    /// 従法線（上方向の近似）
    pub binormal: Vector3,
}

impl Frame {
    /// 回転行列 `[T | N | B]`
    pub fn rotation(&self) -> Matrix3 {
        Matrix3::from_columns(self.tangent, self.normal, self.binormal)
    }

    /// 正規直交性の最大誤差（長さの1からのずれと内積の絶対値の最大）
    pub fn orthonormality_error(&self) -> f64 {
        let (t, n, b) = (&self.tangent, &self.normal, &self.binormal);
        [
            (t.norm() - 1.0).abs(),
            (n.norm() - 1.0).abs(),
            (b.norm() - 1.0).abs(),
            t.dot(n).abs(),
            t.dot(b).abs(),
            n.dot(b).abs(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    /// 右手系判定用の行列式 det[T N B]
    pub fn handedness(&self) -> f64 {
        self.rotation().determinant()
    }
}

/// 軌道サンプルと1対1に対応するフレーム列
pub type FrameSequence = Vec<Frame>;

/// デフォルトの補正重みでフレーム列を計算
pub fn compute_frames(trajectory: &Trajectory, up_hint: Vector3) -> FrameSequence {
    compute_frames_with(trajectory, up_hint, DEFAULT_CORRECTION_WEIGHT)
}

/// 鉛直バイアス付き平行移動でフレーム列を計算
///
/// # 引数
///
/// * `trajectory` - 対象軌道
/// * `up_hint` - 上方向の参照ベクトル（通常は +Z）
/// * `alpha` - 鉛直補正重み（0: 純粋な平行移動、1: 毎ステップ鉛直へ完全に合わせる）
///
/// # 戻り値
///
/// 軌道と同じ長さのフレーム列。軌道が1点以下の場合は空、または単一フレーム。
pub fn compute_frames_with(trajectory: &Trajectory, up_hint: Vector3, alpha: f64) -> FrameSequence {
    let points = &trajectory.points;
    if points.is_empty() {
        return Vec::new();
    }

    let up = up_hint.normalize_or(Vector3::UNIT_Z);
    let alpha = alpha.clamp(0.0, 1.0);

    let mut tangent = first_tangent(points);
    let mut frames = Vec::with_capacity(points.len());
    frames.push(initial_frame(tangent, up));

    for i in 1..points.len() {
        // 長さ0の区間では直前の接線を流用
        tangent = (points[i] - points[i - 1]).normalize_or(tangent);
        let prev = frames[i - 1];
        frames.push(transport(&prev, tangent, up, alpha));
    }

    frames
}

fn first_tangent(points: &[Vector3]) -> Vector3 {
    points
        .windows(2)
        .find_map(|p| (p[1] - p[0]).try_normalize())
        .unwrap_or(Vector3::UNIT_X)
}

/// 初期フレーム: B を up の射影で初期化し、N = B × T、B = T × N で再直交化
fn initial_frame(tangent: Vector3, up: Vector3) -> Frame {
    let binormal = up
        .reject_from(&tangent)
        .try_normalize()
        .unwrap_or_else(|| tangent.any_perpendicular());
    let normal = binormal.cross(&tangent).normalize_or(tangent.any_perpendicular());
    let binormal = tangent.cross(&normal).normalize_or(binormal);

    Frame { tangent, normal, binormal }
}

/// 1ステップ分の平行移動と鉛直補正
fn transport(prev: &Frame, tangent: Vector3, up: Vector3, alpha: f64) -> Frame {
    let mut normal = prev
        .normal
        .reject_from(&tangent)
        .try_normalize()
        .unwrap_or_else(|| tangent.any_perpendicular());

    // 符号の連続性（180度反転を防ぐ）
    if normal.dot(&prev.normal) < 0.0 {
        normal = -normal;
    }

    let candidate = tangent.cross(&normal).normalize_or(prev.binormal);
    let desired = up.reject_from(&tangent).normalize_or(candidate);

    let binormal = (candidate * (1.0 - alpha) + desired * alpha).normalize_or(candidate);
    let normal = binormal.cross(&tangent).normalize_or(normal);
    let binormal = tangent.cross(&normal);

    Frame { tangent, normal, binormal }
}

/// 円筒円弧軌道用の放射方向フレーム
///
/// 接線は中心差分、法線は円筒軸からの放射方向、B = T × N とし、N を再直交化します。
/// 放射方向が定義できない（軸上の）サンプルでは直前の法線を流用します。
pub fn compute_radial_frames(arc: &ArcTrajectory) -> FrameSequence {
    let points = &arc.trajectory.points;
    let n = points.len();
    if n < 2 {
        return points
            .iter()
            .map(|_| initial_frame(Vector3::UNIT_X, Vector3::UNIT_Z))
            .collect();
    }

    let mut frames: FrameSequence = Vec::with_capacity(n);
    let mut last_tangent = first_tangent(points);

    for i in 0..n {
        let delta = if i == 0 {
            points[1] - points[0]
        } else if i == n - 1 {
            points[n - 1] - points[n - 2]
        } else {
            points[i + 1] - points[i - 1]
        };
        let tangent = delta.normalize_or(last_tangent);
        last_tangent = tangent;

        let p = points[i];
        let c = arc.axis_centers[i];
        let radial = Vector3::new(p.x - c.x, p.y - c.y, 0.0);
        let fallback_normal = frames.last().map(|f| f.normal).unwrap_or_else(|| tangent.any_perpendicular());
        let normal = radial
            .reject_from(&tangent)
            .try_normalize()
            .unwrap_or(fallback_normal);

        let binormal = tangent.cross(&normal).normalize_or(tangent.any_perpendicular());
        let normal = binormal.cross(&tangent).normalize_or(normal);
        frames.push(Frame { tangent, normal, binormal });
    }

    frames
}

/// 従法線 B と鉛直参照との平均角度（度）
pub fn mean_tilt_deg(frames: &[Frame], up: Vector3) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    let up = up.normalize_or(Vector3::UNIT_Z);
    frames.iter().map(|f| f.binormal.angle_to_deg(&up)).sum::<f64>() / frames.len() as f64
}
