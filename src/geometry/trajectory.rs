use std::f64::consts::PI;

use crate::error::DegenerateRouteError;
use crate::geometry::spline::NaturalCubicSpline;
use crate::geometry::vector::{EPSILON, Vector3};

/// ウェイポイント
pub type Waypoint = Vector3;

/// 経路（順序付きウェイポイント列）
///
/// 構築時に検証済み: 2点以上、連続する点は互いに異なる、全座標が有限。
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl Route {
    /// ウェイポイント列から経路を作成
    ///
    /// # 戻り値
    ///
    /// 検証に成功した場合は経路、失敗した場合は `DegenerateRouteError`
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, DegenerateRouteError> {
        if waypoints.len() < 2 {
            return Err(DegenerateRouteError::TooFewWaypoints { count: waypoints.len() });
        }
        if let Some(index) = waypoints.iter().position(|w| !w.is_finite()) {
            return Err(DegenerateRouteError::NonFiniteWaypoint { index });
        }
        if let Some(index) = waypoints
            .windows(2)
            .position(|pair| pair[0].distance(&pair[1]) < EPSILON)
        {
            return Err(DegenerateRouteError::CoincidentWaypoints { index });
        }
        Ok(Self { waypoints })
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// ウェイポイント間の折れ線長
    pub fn polyline_length(&self) -> f64 {
        self.waypoints.windows(2).map(|p| p[0].distance(&p[1])).sum()
    }
}

/// 補間済み軌道（密なサンプル点列）
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub points: Vec<Vector3>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 軌道の弧長（折れ線近似）
    pub fn arc_length(&self) -> f64 {
        self.points.windows(2).map(|p| p[0].distance(&p[1])).sum()
    }
}

/// 自然3次スプラインで経路を補間し軌道を生成
///
/// 各軸を独立に `t ∈ [0, 1]` でパラメータ化し、`resolution` 点で等間隔サンプリングします。
///
/// # 引数
///
/// * `route` - 補間する経路
/// * `resolution` - サンプル数（2以上）
pub fn build_trajectory(route: &Route, resolution: usize) -> Result<Trajectory, DegenerateRouteError> {
    if resolution < 2 {
        return Err(DegenerateRouteError::ResolutionTooSmall { resolution });
    }

    let axis = |f: fn(&Vector3) -> f64| {
        let values: Vec<f64> = route.waypoints().iter().map(f).collect();
        NaturalCubicSpline::new(&values)
    };
    let sx = axis(|w| w.x);
    let sy = axis(|w| w.y);
    let sz = axis(|w| w.z);

    let last = (resolution - 1) as f64;
    let points = (0..resolution)
        .map(|i| {
            let t = i as f64 / last;
            Vector3::new(sx.evaluate(t), sy.evaluate(t), sz.evaluate(t))
        })
        .collect();

    Ok(Trajectory { points })
}

/// 円筒面上の円弧補間による軌道
///
/// 各区間の円筒軸（XY中点）を保持し、放射方向フレームの計算に使用します。
#[derive(Debug, Clone, PartialEq)]
pub struct ArcTrajectory {
    pub trajectory: Trajectory,
    /// サンプルごとの円筒軸位置（XY、z=0）
    pub axis_centers: Vec<Vector3>,
}

/// 円筒面上の円弧補間で軌道を生成
///
/// 連続する2点ごとに、XY中点を軸、XY距離の半分を半径とする円筒を考え、
/// 方位角を最短経路で補間します（|Δθ| > π の場合は ∓2π で巻き戻し）。
/// 高さは線形補間し、区間の継ぎ目のサンプルは重複させません。
///
/// # 引数
///
/// * `route` - 補間する経路
/// * `samples_per_segment` - 区間あたりのサンプル数（2以上）
pub fn build_arc_trajectory(
    route: &Route,
    samples_per_segment: usize,
) -> Result<ArcTrajectory, DegenerateRouteError> {
    if samples_per_segment < 2 {
        return Err(DegenerateRouteError::ResolutionTooSmall { resolution: samples_per_segment });
    }

    let mut points = Vec::new();
    let mut axis_centers = Vec::new();
    let last = (samples_per_segment - 1) as f64;

    for (seg, pair) in route.waypoints().windows(2).enumerate() {
        let (p1, p2) = (pair[0], pair[1]);
        let center = Vector3::new((p1.x + p2.x) / 2.0, (p1.y + p2.y) / 2.0, 0.0);
        let radius = p1.distance_xy(&p2) / 2.0;

        let (theta1, theta2) = shortest_arc(
            (p1.y - center.y).atan2(p1.x - center.x),
            (p2.y - center.y).atan2(p2.x - center.x),
        );

        // 2区間目以降は先頭サンプル（前区間の終点と同一）を除く
        let start = if seg == 0 { 0 } else { 1 };
        for i in start..samples_per_segment {
            let t = i as f64 / last;
            let theta = theta1 + t * (theta2 - theta1);
            points.push(Vector3::new(
                center.x + radius * theta.cos(),
                center.y + radius * theta.sin(),
                p1.z + t * (p2.z - p1.z),
            ));
            axis_centers.push(center);
        }
    }

    Ok(ArcTrajectory {
        trajectory: Trajectory { points },
        axis_centers,
    })
}

/// 方位角ペアを最短角度経路に調整
fn shortest_arc(mut theta1: f64, mut theta2: f64) -> (f64, f64) {
    if theta2 - theta1 > PI {
        theta2 -= 2.0 * PI;
    } else if theta1 - theta2 > PI {
        theta1 -= 2.0 * PI;
    }
    (theta1, theta2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gentle_route() -> Route {
        Route::new(vec![
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(3.0, 2.0, 1.8),
            Vector3::new(6.0, 3.0, 2.1),
            Vector3::new(8.0, 3.0, 2.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_route_rejects_degenerate_input() {
        assert_eq!(
            Route::new(vec![Vector3::ZERO]),
            Err(DegenerateRouteError::TooFewWaypoints { count: 1 })
        );
        assert_eq!(
            Route::new(vec![Vector3::ZERO, Vector3::UNIT_X, Vector3::UNIT_X]),
            Err(DegenerateRouteError::CoincidentWaypoints { index: 1 })
        );
        assert!(matches!(
            Route::new(vec![Vector3::ZERO, Vector3::new(f64::NAN, 0.0, 0.0)]),
            Err(DegenerateRouteError::NonFiniteWaypoint { index: 1 })
        ));
    }

    #[test]
    fn test_build_trajectory_endpoints_and_length() {
        let route = gentle_route();
        let traj = build_trajectory(&route, 500).unwrap();
        assert_eq!(traj.len(), 500);
        assert!(traj.points[0].distance(&route.waypoints()[0]) < 1e-9);
        assert!(traj.points[499].distance(&route.waypoints()[3]) < 1e-9);
    }

    #[test]
    fn test_build_trajectory_is_idempotent() {
        let route = gentle_route();
        let a = build_trajectory(&route, 400).unwrap();
        let b = build_trajectory(&route, 400).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolution_too_small() {
        assert_eq!(
            build_trajectory(&gentle_route(), 1),
            Err(DegenerateRouteError::ResolutionTooSmall { resolution: 1 })
        );
    }

    #[test]
    fn test_arc_trajectory_stays_on_cylinder() {
        let route = Route::new(vec![
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(4.0, 6.0, 4.0),
            Vector3::new(2.0, 8.0, 5.0),
        ])
        .unwrap();
        let arc = build_arc_trajectory(&route, 100).unwrap();
        // 継ぎ目は重複しない
        assert_eq!(arc.trajectory.len(), 100 + 99);
        assert_eq!(arc.axis_centers.len(), arc.trajectory.len());

        let radius = Vector3::new(1.0, 2.0, 0.0).distance_xy(&Vector3::new(4.0, 6.0, 0.0)) / 2.0;
        for (p, c) in arc.trajectory.points.iter().zip(&arc.axis_centers).take(100) {
            assert!((p.distance_xy(c) - radius).abs() < 1e-9);
        }
        assert!(arc.trajectory.points[99].distance(&route.waypoints()[1]) < 1e-9);
        assert!(arc.trajectory.points.last().unwrap().distance(&route.waypoints()[2]) < 1e-9);
    }

    #[test]
    fn test_shortest_arc_wraps() {
        let (a, b) = shortest_arc(-3.0, 3.0);
        assert!((b - a).abs() <= PI);
        let (a, b) = shortest_arc(3.0, -3.0);
        assert!((b - a).abs() <= PI);
    }
}
