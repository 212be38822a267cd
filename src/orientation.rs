//! # Orientation モジュール
//!
//! フレーム列を姿勢角（yaw/pitch/roll）に変換し、制約上限と照合します。
//!
//! ## 角度の定義
//!
//! - **yaw**: 接線 T の方位角 `atan2(T_y, T_x)`
//! - **pitch**: 接線 T の仰角 `atan2(T_z, hypot(T_x, T_y))`
//! - **roll**: T 回りの傾き。T に垂直な平面へ射影した鉛直 U と従法線 B の符号付き角度
//!   （符号は `(U × B)·T` による右手系）。水平飛行で B が鉛直なら 0 度。
//! - **相対変化**: `R_rel = R_i · R_{i-1}ᵀ`（`R = [T | N | B]`）を内因性XYZオイラー角に分解
//!
//! 検証は例外を投げず、違反は `ok = false` として返します。

use serde::{Deserialize, Serialize};

use crate::geometry::{Frame, Vector3};

/// 1サンプル分の絶対姿勢角（度）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OrientationSample {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// 1サンプル分の相対回転（直前フレームとの差、度）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DeltaSample {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

pub type OrientationSeries = Vec<OrientationSample>;
pub type DeltaSeries = Vec<DeltaSample>;

/// 姿勢制約（各上限、度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    pub max_abs_roll: f64,
    pub max_abs_pitch: f64,
    pub max_abs_yaw: f64,
    pub max_delta_roll: f64,
    pub max_delta_pitch: f64,
    pub max_delta_yaw: f64,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            max_abs_roll: 45.0,
            max_abs_pitch: 60.0,
            max_abs_yaw: 90.0,
            max_delta_roll: 10.0,
            max_delta_pitch: 30.0,
            max_delta_yaw: 45.0,
        }
    }
}

impl ConstraintSet {
    /// 全ての上限を同じ値にした制約
    pub fn uniform(limit: f64) -> Self {
        Self {
            max_abs_roll: limit,
            max_abs_pitch: limit,
            max_abs_yaw: limit,
            max_delta_roll: limit,
            max_delta_pitch: limit,
            max_delta_yaw: limit,
        }
    }

    /// 上限値の妥当性チェック（負値・非有限値を拒否）
    pub fn validate(&self) -> Result<(), String> {
        let limits = [
            ("max_abs_roll", self.max_abs_roll),
            ("max_abs_pitch", self.max_abs_pitch),
            ("max_abs_yaw", self.max_abs_yaw),
            ("max_delta_roll", self.max_delta_roll),
            ("max_delta_pitch", self.max_delta_pitch),
            ("max_delta_yaw", self.max_delta_yaw),
        ];
        for (name, value) in limits {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("制約 {} は0以上の有限値である必要があります: {}", name, value));
            }
        }
        Ok(())
    }
}

/// 検証結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub max_abs_roll: f64,
    pub max_abs_pitch: f64,
    pub max_abs_yaw: f64,
    pub max_delta_roll: f64,
    pub max_delta_pitch: f64,
    pub max_delta_yaw: f64,
}

impl ValidationResult {
    /// 上限を超えた項目名の一覧
    pub fn violations(&self, constraints: &ConstraintSet) -> Vec<&'static str> {
        [
            ("abs_roll", self.max_abs_roll, constraints.max_abs_roll),
            ("abs_pitch", self.max_abs_pitch, constraints.max_abs_pitch),
            ("abs_yaw", self.max_abs_yaw, constraints.max_abs_yaw),
            ("delta_roll", self.max_delta_roll, constraints.max_delta_roll),
            ("delta_pitch", self.max_delta_pitch, constraints.max_delta_pitch),
            ("delta_yaw", self.max_delta_yaw, constraints.max_delta_yaw),
        ]
        .into_iter()
        .filter(|(_, value, limit)| value.is_nan() || value > limit)
        .map(|(name, _, _)| name)
        .collect()
    }
}

/// フレーム列から絶対姿勢角を計算（鉛直は +Z）
pub fn absolute_angles(frames: &[Frame]) -> OrientationSeries {
    absolute_angles_with_up(frames, Vector3::UNIT_Z)
}

/// 任意の鉛直参照で絶対姿勢角を計算
pub fn absolute_angles_with_up(frames: &[Frame], up: Vector3) -> OrientationSeries {
    let up = up.normalize_or(Vector3::UNIT_Z);
    frames
        .iter()
        .map(|f| {
            let t = f.tangent;
            let yaw = t.y.atan2(t.x).to_degrees();
            let pitch = t.z.atan2(t.norm_xy()).to_degrees();

            // 接線が鉛直と平行な場合 roll は定義できないため0とする
            let roll = match up.reject_from(&t).try_normalize() {
                Some(u) => u.cross(&f.binormal).dot(&t).atan2(u.dot(&f.binormal)).to_degrees(),
                None => 0.0,
            };

            OrientationSample { yaw, pitch, roll }
        })
        .collect()
}

/// 隣接フレーム間の相対回転
///
/// 先頭サンプルの差分は0と定義します。
pub fn relative_deltas(frames: &[Frame]) -> DeltaSeries {
    let mut deltas = Vec::with_capacity(frames.len());
    if frames.is_empty() {
        return deltas;
    }
    deltas.push(DeltaSample::default());

    for pair in frames.windows(2) {
        let rel = pair[1].rotation().mul_matrix(&pair[0].rotation().transpose());
        let (roll, pitch, yaw) = rel.to_intrinsic_xyz_deg();
        deltas.push(DeltaSample { roll, pitch, yaw });
    }
    deltas
}

fn max_abs(values: impl Iterator<Item = f64>) -> f64 {
    // NaN を含む場合は NaN を返し、検証で不合格にする
    values.fold(0.0, |acc: f64, v| if v.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(v.abs()) })
}

/// 姿勢系列を制約と照合
///
/// # 戻り値
///
/// 各最大値と判定結果。全ての最大値が上限以下の場合のみ `ok = true`
pub fn validate(series: &[OrientationSample], deltas: &[DeltaSample], constraints: &ConstraintSet) -> ValidationResult {
    let mut result = ValidationResult {
        ok: false,
        max_abs_roll: max_abs(series.iter().map(|s| s.roll)),
        max_abs_pitch: max_abs(series.iter().map(|s| s.pitch)),
        max_abs_yaw: max_abs(series.iter().map(|s| s.yaw)),
        max_delta_roll: max_abs(deltas.iter().map(|d| d.roll)),
        max_delta_pitch: max_abs(deltas.iter().map(|d| d.pitch)),
        max_delta_yaw: max_abs(deltas.iter().map(|d| d.yaw)),
    };
    result.ok = result.violations(constraints).is_empty();
    result
}

/// 鉛直からの傾き統計
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TiltReport {
    pub mean_deg: f64,
    pub max_deg: f64,
}

/// 従法線 B と鉛直参照のなす角の統計
pub fn tilt_report(frames: &[Frame], up: Vector3) -> TiltReport {
    if frames.is_empty() {
        return TiltReport { mean_deg: 0.0, max_deg: 0.0 };
    }
    let up = up.normalize_or(Vector3::UNIT_Z);
    let angles: Vec<f64> = frames.iter().map(|f| f.binormal.angle_to_deg(&up)).collect();
    TiltReport {
        mean_deg: angles.iter().sum::<f64>() / angles.len() as f64,
        max_deg: angles.iter().copied().fold(0.0, f64::max),
    }
}

/// フレーム列の総合解析結果
#[derive(Debug, Clone, Serialize)]
pub struct OrientationAnalysis {
    pub series: OrientationSeries,
    pub deltas: DeltaSeries,
    pub validation: ValidationResult,
    pub tilt: TiltReport,
}

/// 絶対角・相対変化・検証・傾き統計をまとめて計算（鉛直は +Z）
pub fn analyze(frames: &[Frame], constraints: &ConstraintSet) -> OrientationAnalysis {
    analyze_with_up(frames, Vector3::UNIT_Z, constraints)
}

/// フレーム計算時と同じ鉛直参照で解析
pub fn analyze_with_up(frames: &[Frame], up: Vector3, constraints: &ConstraintSet) -> OrientationAnalysis {
    let series = absolute_angles_with_up(frames, up);
    let deltas = relative_deltas(frames);
    let validation = validate(&series, &deltas, constraints);
    OrientationAnalysis {
        tilt: tilt_report(frames, up),
        series,
        deltas,
        validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Route, build_trajectory, compute_frames};

    fn level_frame(yaw_deg: f64) -> Frame {
        let a = yaw_deg.to_radians();
        Frame {
            tangent: Vector3::new(a.cos(), a.sin(), 0.0),
            normal: Vector3::new(-a.sin(), a.cos(), 0.0),
            binormal: Vector3::UNIT_Z,
        }
    }

    #[test]
    fn test_level_flight_angles() {
        let series = absolute_angles(&[level_frame(0.0), level_frame(30.0)]);
        assert!(series[0].yaw.abs() < 1e-9);
        assert!(series[0].pitch.abs() < 1e-9);
        assert!(series[0].roll.abs() < 1e-9);
        assert!((series[1].yaw - 30.0).abs() < 1e-9);
        assert!(series[1].roll.abs() < 1e-9);
    }

    #[test]
    fn test_roll_sign_follows_right_hand_rule() {
        // T = +X 回りに 20 度回転したフレーム
        let phi = 20f64.to_radians();
        let frame = Frame {
            tangent: Vector3::UNIT_X,
            normal: Vector3::new(0.0, phi.cos(), phi.sin()),
            binormal: Vector3::new(0.0, -phi.sin(), phi.cos()),
        };
        let series = absolute_angles(&[frame]);
        assert!((series[0].roll - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_delta_is_zero() {
        let deltas = relative_deltas(&[level_frame(0.0), level_frame(5.0)]);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0], DeltaSample::default());
        assert!((deltas[1].yaw - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_injected_jump() {
        // -45 度から +45 度への 90 度の急旋回を注入（絶対 yaw は上限内）
        let frames = [level_frame(-45.0), level_frame(-45.0), level_frame(45.0)];
        let series = absolute_angles(&frames);
        let deltas = relative_deltas(&frames);
        assert!((deltas[2].yaw - 90.0).abs() < 1e-9);

        let result = validate(&series, &deltas, &ConstraintSet::default());
        assert!(!result.ok);
        assert_eq!(result.violations(&ConstraintSet::default()), vec!["delta_yaw"]);
    }

    #[test]
    fn test_analysis_uses_given_up() {
        let route = Route::new(vec![Vector3::ZERO, Vector3::new(4.0, 0.0, 0.0)]).unwrap();
        let traj = build_trajectory(&route, 20).unwrap();
        let frames = compute_frames(&traj, Vector3::UNIT_Y);

        let matched = analyze_with_up(&frames, Vector3::UNIT_Y, &ConstraintSet::default());
        assert!(matched.tilt.max_deg < 1e-6);
        assert!(matched.validation.max_abs_roll < 1e-6);

        let mismatched = analyze(&frames, &ConstraintSet::default());
        assert!((mismatched.tilt.mean_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let series = vec![OrientationSample { yaw: f64::NAN, pitch: 0.0, roll: 0.0 }];
        let result = validate(&series, &[], &ConstraintSet::default());
        assert!(!result.ok);
    }

    #[test]
    fn test_gentle_route_regression() {
        let route = Route::new(vec![
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(3.0, 2.0, 1.8),
            Vector3::new(6.0, 3.0, 2.1),
            Vector3::new(8.0, 3.0, 2.0),
        ])
        .unwrap();
        let traj = build_trajectory(&route, 500).unwrap();
        let frames = compute_frames(&traj, Vector3::UNIT_Z);
        let analysis = analyze(&frames, &ConstraintSet::default());
        let v = analysis.validation;

        for value in [v.max_delta_roll, v.max_delta_pitch, v.max_delta_yaw] {
            assert!(value.is_finite());
        }
        assert!(v.max_delta_roll <= 10.0);
        assert!(v.max_delta_pitch <= 30.0);
        assert!(v.max_delta_yaw <= 45.0);
        assert!(v.ok);
        assert_eq!(analysis.series.len(), 500);
        assert!(frames.iter().all(|f| f.orthonormality_error() < 1e-6));
    }

    #[test]
    fn test_constraint_set_validate() {
        assert!(ConstraintSet::default().validate().is_ok());
        let mut c = ConstraintSet::default();
        c.max_delta_yaw = -1.0;
        assert!(c.validate().is_err());
    }
}
