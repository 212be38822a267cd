//! 共有環境（脅威・回収目標）
//!
//! 環境はコーディネータのみが更新し、エージェントは意思決定中に読み取り専用で参照します。

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geometry::Vector3;
use crate::models::common::SimulationMode;

/// ワールドの範囲
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
    /// 空中移動の最大高度
    pub max_altitude: f64,
    /// 水中移動の最大深度（正の値）
    pub max_depth: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 8.0,
            height: 8.0,
            max_altitude: 10.0,
            max_depth: 5.0,
        }
    }
}

impl WorldBounds {
    pub fn center(&self, mode: SimulationMode) -> Vector3 {
        match mode {
            SimulationMode::Grid => Vector3::new(((self.width - 1.0) / 2.0).floor(), ((self.height - 1.0) / 2.0).floor(), 0.0),
            SimulationMode::Continuous => Vector3::new(self.width / 2.0, self.height / 2.0, 0.0),
        }
    }

    /// グリッドのセル数（カバレッジ計算用）
    pub fn cell_count(&self) -> usize {
        (self.width.max(1.0).ceil() as usize) * (self.height.max(1.0).ceil() as usize)
    }

    /// XY 位置を範囲内に収める
    ///
    /// グリッドモードは `[0, w-1] × [0, h-1]` にクランプ、
    /// 連続モードは `[0, w) × [0, h)` に周期的に折り返します。z はそのまま。
    pub fn bound(&self, position: Vector3, mode: SimulationMode) -> Vector3 {
        match mode {
            SimulationMode::Grid => Vector3::new(
                position.x.clamp(0.0, (self.width - 1.0).max(0.0)),
                position.y.clamp(0.0, (self.height - 1.0).max(0.0)),
                position.z,
            ),
            SimulationMode::Continuous => Vector3::new(
                position.x.rem_euclid(self.width.max(f64::MIN_POSITIVE)),
                position.y.rem_euclid(self.height.max(f64::MIN_POSITIVE)),
                position.z,
            ),
        }
    }
}

/// モードに応じた距離（グリッド: マンハッタン、連続: ユークリッド）
pub fn mode_distance(a: &Vector3, b: &Vector3, mode: SimulationMode) -> f64 {
    match mode {
        SimulationMode::Grid => a.manhattan_xy(b),
        SimulationMode::Continuous => a.distance(b),
    }
}

/// 脅威生成の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatSettings {
    /// 生成確率（グリッド: セルごと、連続: ステップごと）
    pub probability: f64,
    pub min_intensity: f64,
    pub max_intensity: f64,
    /// 連続モードでの脅威の寿命（ステップ）
    pub lifetime_steps: u64,
    /// エージェントが脅威を感知する距離
    pub sense_radius: f64,
}

impl Default for ThreatSettings {
    fn default() -> Self {
        Self {
            probability: 0.25,
            min_intensity: 0.1,
            max_intensity: 0.9,
            lifetime_steps: 10,
            sense_radius: 1.0,
        }
    }
}

/// 脅威
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threat {
    pub id: u32,
    pub position: Vector3,
    /// 強度 [0, 1]
    pub level: f64,
    pub discovered_at: u64,
    pub expires_at: Option<u64>,
}

/// 回収目標の初期配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub id: u32,
    pub position: Vector3,
}

/// 回収ミッションの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// この距離以内に到達すると回収完了
    pub collect_radius: f64,
    /// 回収対象として考慮する最大距離
    pub near_threshold: f64,
    pub items: Vec<TargetSpec>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            collect_radius: 1.0,
            near_threshold: 10.0,
            items: Vec::new(),
        }
    }
}

/// 回収目標（永続、回収されると除外）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectTarget {
    pub id: u32,
    pub position: Vector3,
    pub collected_by: Option<u32>,
    pub collected_at: Option<u64>,
}

impl CollectTarget {
    pub fn is_available(&self) -> bool {
        self.collected_by.is_none()
    }
}

/// 共有環境
#[derive(Debug, Clone)]
pub struct Environment {
    mode: SimulationMode,
    world: WorldBounds,
    settings: ThreatSettings,
    threats: Vec<Threat>,
    targets: Vec<CollectTarget>,
    next_threat_id: u32,
}

impl Environment {
    pub fn new(mode: SimulationMode, world: WorldBounds, settings: ThreatSettings, targets: &[TargetSpec]) -> Self {
        Self {
            mode,
            world,
            settings,
            threats: Vec::new(),
            targets: targets
                .iter()
                .map(|t| CollectTarget {
                    id: t.id,
                    position: t.position,
                    collected_by: None,
                    collected_at: None,
                })
                .collect(),
            next_threat_id: 0,
        }
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn world(&self) -> &WorldBounds {
        &self.world
    }

    pub fn threats(&self) -> &[Threat] {
        &self.threats
    }

    pub fn targets(&self) -> &[CollectTarget] {
        &self.targets
    }

    pub fn available_targets(&self) -> impl Iterator<Item = &CollectTarget> {
        self.targets.iter().filter(|t| t.is_available())
    }

    pub fn distance(&self, a: &Vector3, b: &Vector3) -> f64 {
        mode_distance(a, b, self.mode)
    }

    /// 脅威を確率的に再生成
    ///
    /// グリッドモードでは毎ステップ全消去し、各セルに確率 `probability` で配置します。
    /// 連続モードでは期限切れを除去し、確率 `probability` で1件を新規生成します。
    pub fn regenerate<R: Rng>(&mut self, tick: u64, rng: &mut R) {
        let p = self.settings.probability.clamp(0.0, 1.0);
        let (lo, hi) = (
            self.settings.min_intensity.min(self.settings.max_intensity),
            self.settings.min_intensity.max(self.settings.max_intensity),
        );

        match self.mode {
            SimulationMode::Grid => {
                self.threats.clear();
                let (w, h) = (self.world.width.max(1.0) as i64, self.world.height.max(1.0) as i64);
                for x in 0..w {
                    for y in 0..h {
                        if rng.gen_bool(p) {
                            let level = rng.gen_range(lo..=hi);
                            self.push_threat(Vector3::new(x as f64, y as f64, 0.0), level, tick, None);
                        }
                    }
                }
            }
            SimulationMode::Continuous => {
                self.threats.retain(|t| t.expires_at.is_none_or(|e| e > tick));
                if rng.gen_bool(p) {
                    let position = Vector3::new(
                        rng.gen_range(0.0..self.world.width.max(f64::EPSILON)),
                        rng.gen_range(0.0..self.world.height.max(f64::EPSILON)),
                        0.0,
                    );
                    let level = rng.gen_range(lo..=hi);
                    let expires = tick + self.settings.lifetime_steps.max(1);
                    self.push_threat(position, level, tick, Some(expires));
                }
            }
        }
        trace!("脅威を更新: {}件 (ステップ {})", self.threats.len(), tick);
    }

    fn push_threat(&mut self, position: Vector3, level: f64, tick: u64, expires_at: Option<u64>) {
        self.threats.push(Threat {
            id: self.next_threat_id,
            position,
            level,
            discovered_at: tick,
            expires_at,
        });
        self.next_threat_id += 1;
    }

    /// 外部から脅威を追加（シナリオ・テスト用）
    pub fn insert_threat(&mut self, position: Vector3, level: f64, tick: u64) {
        self.push_threat(position, level, tick, None);
    }

    /// 位置周辺の局所脅威レベル（感知範囲内の最大強度、なければ0）
    pub fn threat_level_at(&self, position: &Vector3) -> f64 {
        self.threats
            .iter()
            .filter(|t| self.distance(&t.position, position) <= self.settings.sense_radius)
            .map(|t| t.level)
            .fold(0.0, f64::max)
    }

    /// 目標を回収済みにする
    ///
    /// # 戻り値
    ///
    /// 未回収の目標を回収できた場合は true
    pub fn collect(&mut self, target_id: u32, agent_id: u32, tick: u64) -> bool {
        match self.targets.iter_mut().find(|t| t.id == target_id && t.is_available()) {
            Some(target) => {
                target.collected_by = Some(agent_id);
                target.collected_at = Some(tick);
                debug!("目標 {} をエージェント {} が回収 (ステップ {})", target_id, agent_id, tick);
                true
            }
            None => false,
        }
    }

    pub fn remaining_targets(&self) -> usize {
        self.targets.iter().filter(|t| t.is_available()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_grid_bound_clamps_and_continuous_wraps() {
        let world = WorldBounds::default();
        let p = Vector3::new(9.0, -2.0, 0.0);
        assert_eq!(world.bound(p, SimulationMode::Grid), Vector3::new(7.0, 0.0, 0.0));
        assert_eq!(world.bound(p, SimulationMode::Continuous), Vector3::new(1.0, 6.0, 0.0));
    }

    #[test]
    fn test_grid_regeneration_probability_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        let settings = ThreatSettings {
            probability: 1.0,
            ..ThreatSettings::default()
        };
        let mut env = Environment::new(SimulationMode::Grid, WorldBounds::default(), settings, &[]);
        env.regenerate(0, &mut rng);
        assert_eq!(env.threats().len(), 64);
        assert!(env.threats().iter().all(|t| (0.1..=0.9).contains(&t.level)));

        let mut env = Environment::new(
            SimulationMode::Grid,
            WorldBounds::default(),
            ThreatSettings {
                probability: 0.0,
                ..ThreatSettings::default()
            },
            &[],
        );
        env.regenerate(0, &mut rng);
        assert!(env.threats().is_empty());
    }

    #[test]
    fn test_continuous_threats_expire() {
        let mut rng = StdRng::seed_from_u64(2);
        let settings = ThreatSettings {
            probability: 1.0,
            lifetime_steps: 2,
            ..ThreatSettings::default()
        };
        let mut env = Environment::new(SimulationMode::Continuous, WorldBounds::default(), settings, &[]);
        for tick in 0..10 {
            env.regenerate(tick, &mut rng);
            assert!(env.threats().len() <= 2);
        }
    }

    #[test]
    fn test_threat_level_uses_sense_radius() {
        let mut env = Environment::new(SimulationMode::Grid, WorldBounds::default(), ThreatSettings::default(), &[]);
        env.insert_threat(Vector3::new(3.0, 3.0, 0.0), 0.7, 0);
        assert_eq!(env.threat_level_at(&Vector3::new(3.0, 4.0, 0.0)), 0.7);
        assert_eq!(env.threat_level_at(&Vector3::new(4.0, 4.0, 0.0)), 0.0);
    }

    #[test]
    fn test_collect_only_once() {
        let specs = [TargetSpec { id: 5, position: Vector3::new(1.0, 1.0, 0.0) }];
        let mut env = Environment::new(SimulationMode::Continuous, WorldBounds::default(), ThreatSettings::default(), &specs);
        assert!(env.collect(5, 1, 3));
        assert!(!env.collect(5, 2, 4));
        assert_eq!(env.targets()[0].collected_by, Some(1));
        assert_eq!(env.remaining_targets(), 0);
    }
}
