// ベクトル・回転行列の基本演算
pub mod vector;

// 1軸の自然3次スプライン
pub mod spline;

// 経路と軌道（スプライン補間・円筒円弧補間）
pub mod trajectory;

// 移動座標系（平行移動＋鉛直補正）
pub mod frames;

// 便利な re-export
pub use frames::{
    DEFAULT_CORRECTION_WEIGHT, Frame, FrameSequence, compute_frames, compute_frames_with,
    compute_radial_frames, mean_tilt_deg,
};
pub use trajectory::{ArcTrajectory, Route, Trajectory, Waypoint, build_arc_trajectory, build_trajectory};
pub use vector::{EPSILON, Matrix3, Vector3};
