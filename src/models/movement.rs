use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;
use crate::models::environment::WorldBounds;
use crate::models::traits::IMovementModel;

/// 地上移動の牽引係数
const GROUND_TRACTION: f64 = 0.8;

/// 水中とみなす深度（これより深いと水中コスト）
const AMPHIBIOUS_WATER_LINE: f64 = -0.5;

/// 移動方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locomotion {
    /// 地上（z = 0 固定）
    #[default]
    Ground,
    /// 空中（0 ≤ z ≤ 最大高度）
    Aerial,
    /// 水中（-最大深度 ≤ z ≤ 0）
    Aquatic,
    /// 水陸両用（-最大深度 ≤ z ≤ 最大高度）
    Amphibious,
}

impl Locomotion {
    /// 単位距離あたりのエネルギー係数
    pub fn cost_factor(&self, position: &Vector3) -> f64 {
        match self {
            Locomotion::Ground => 0.5 / GROUND_TRACTION,
            Locomotion::Aerial => 1.2,
            Locomotion::Aquatic => 0.8,
            Locomotion::Amphibious => {
                if position.z < AMPHIBIOUS_WATER_LINE {
                    0.7
                } else {
                    1.0
                }
            }
        }
    }
}

impl IMovementModel for Locomotion {
    fn consume(&self, distance: f64, position: &Vector3) -> f64 {
        distance.max(0.0) * self.cost_factor(position)
    }

    fn clamp(&self, position: Vector3, world: &WorldBounds) -> Vector3 {
        let z = match self {
            Locomotion::Ground => 0.0,
            Locomotion::Aerial => position.z.clamp(0.0, world.max_altitude.max(0.0)),
            Locomotion::Aquatic => position.z.clamp(-world.max_depth.abs(), 0.0),
            Locomotion::Amphibious => position.z.clamp(-world.max_depth.abs(), world.max_altitude.max(0.0)),
        };
        Vector3::new(position.x, position.y, z)
    }
}
