use serde::Serialize;

use crate::geometry::Vector3;
use crate::models::common::{Action, Profile, SimulationMode};
use crate::models::environment::{CollectTarget, Threat, mode_distance};

/// 意思決定の結果（生成後は不変）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// 優先度（大きいほど緊急）
    pub priority: i32,
    pub rationale: String,
    /// 決定時のステップ
    pub tick: u64,
    /// 移動目標（脅威・回収目標・帰還地点など）
    pub target: Option<Vector3>,
    /// 回収対象の目標ID
    pub target_id: Option<u32>,
}

impl Decision {
    pub fn new(action: Action, priority: i32, rationale: impl Into<String>, tick: u64) -> Self {
        Self {
            action,
            priority,
            rationale: rationale.into(),
            tick,
            target: None,
            target_id: None,
        }
    }

    pub fn with_target(mut self, target: Vector3) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_target_id(mut self, id: u32, position: Vector3) -> Self {
        self.target_id = Some(id);
        self.target = Some(position);
        self
    }
}

/// 他エージェントの読み取り専用スナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerSnapshot {
    pub id: u32,
    pub profile: Profile,
    pub position: Vector3,
    pub energy: f64,
    pub operational: bool,
    /// 支援要請中、または低エネルギー
    pub needs_help: bool,
}

/// ミッションの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Active,
    /// 帰還指示後
    Returning,
}

/// 意思決定コンテキスト
///
/// エージェントごとに毎ステップ構築し、ポリシーへ明示的に渡します。
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub agent_id: u32,
    pub position: Vector3,
    pub home: Vector3,
    pub energy: f64,
    pub tick: u64,
    pub mode: SimulationMode,
    /// マップ中心
    pub center: Vector3,
    /// 感知範囲内の最大脅威強度
    pub local_threat_level: f64,
    pub phase: MissionPhase,
    pub has_route: bool,
    pub threats: &'a [Threat],
    pub targets: &'a [CollectTarget],
    pub peers: &'a [PeerSnapshot],
}

impl DecisionContext<'_> {
    pub fn distance_to(&self, other: &Vector3) -> f64 {
        mode_distance(&self.position, other, self.mode)
    }

    /// 強度が `min_level` を超える最寄りの脅威
    pub fn nearest_threat(&self, min_level: f64) -> Option<&Threat> {
        self.threats
            .iter()
            .filter(|t| t.level > min_level)
            .min_by(|a, b| self.distance_to(&a.position).total_cmp(&self.distance_to(&b.position)))
    }

    /// `radius` 以内に強度 `min_level` 超の脅威があるか
    pub fn threat_within(&self, radius: f64, min_level: f64) -> Option<&Threat> {
        self.nearest_threat(min_level)
            .filter(|t| self.distance_to(&t.position) <= radius)
    }

    /// 支援を必要としている最寄りの稼働中エージェント（自身を除く）
    pub fn peer_needing_help(&self) -> Option<&PeerSnapshot> {
        self.peers
            .iter()
            .filter(|p| p.id != self.agent_id && p.operational && p.needs_help)
            .min_by(|a, b| self.distance_to(&a.position).total_cmp(&self.distance_to(&b.position)))
    }

    /// 最寄りの未回収目標
    pub fn nearest_target(&self) -> Option<&CollectTarget> {
        self.targets
            .iter()
            .filter(|t| t.is_available())
            .min_by(|a, b| self.distance_to(&a.position).total_cmp(&self.distance_to(&b.position)))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// テスト用の最小コンテキスト
    pub fn context<'a>(threats: &'a [Threat], targets: &'a [CollectTarget]) -> DecisionContext<'a> {
        DecisionContext {
            agent_id: 1,
            position: Vector3::new(2.0, 2.0, 0.0),
            home: Vector3::ZERO,
            energy: 100.0,
            tick: 0,
            mode: SimulationMode::Grid,
            center: Vector3::new(3.0, 3.0, 0.0),
            local_threat_level: 0.0,
            phase: MissionPhase::Active,
            has_route: false,
            threats,
            targets,
            peers: &[],
        }
    }

    pub fn peer(id: u32, x: f64, y: f64, needs_help: bool) -> PeerSnapshot {
        PeerSnapshot {
            id,
            profile: Profile::Guardian,
            position: Vector3::new(x, y, 0.0),
            energy: if needs_help { 15.0 } else { 80.0 },
            operational: true,
            needs_help,
        }
    }

    pub fn threat(x: f64, y: f64, level: f64) -> Threat {
        Threat {
            id: 0,
            position: Vector3::new(x, y, 0.0),
            level,
            discovered_at: 0,
            expires_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_nearest_threat_filters_level() {
        let threats = [threat(2.0, 3.0, 0.2), threat(5.0, 5.0, 0.8)];
        let ctx = context(&threats, &[]);
        assert_eq!(ctx.nearest_threat(0.0).map(|t| t.level), Some(0.2));
        assert_eq!(ctx.nearest_threat(0.3).map(|t| t.level), Some(0.8));
        assert!(ctx.threat_within(4.0, 0.3).is_none());
        assert!(ctx.threat_within(6.0, 0.3).is_some());
    }

    #[test]
    fn test_peer_needing_help_skips_self_and_healthy() {
        let peers = [peer(1, 2.0, 3.0, true), peer(2, 3.0, 3.0, false), peer(3, 6.0, 2.0, true)];
        let mut ctx = context(&[], &[]);
        ctx.peers = &peers;
        assert_eq!(ctx.peer_needing_help().map(|p| p.id), Some(3));

        ctx.agent_id = 9;
        assert_eq!(ctx.peer_needing_help().map(|p| p.id), Some(1));
    }

    #[test]
    fn test_decision_builder() {
        let d = Decision::new(Action::Collect, 2, "target near", 4).with_target_id(9, Vector3::UNIT_X);
        assert_eq!(d.target_id, Some(9));
        assert_eq!(d.target, Some(Vector3::UNIT_X));
        assert_eq!(d.tick, 4);
    }
}
