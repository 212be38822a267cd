//! # Agent モジュール
//!
//! 自律エージェントの状態・意思決定・行動を実装します。
//!
//! 1ステップの流れは `idle → deciding → acting → idle` で、
//! エネルギー枯渇（`Depleted`）のエージェントは意思決定・行動を行いません。
//! 移動はエージェント自身の `act` 呼び出しでのみ更新されます。

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::geometry::{Trajectory, Vector3};
use crate::models::common::*;
use crate::models::decision::{Decision, DecisionContext, PeerSnapshot};
use crate::models::environment::Environment;
use crate::models::movement::Locomotion;
use crate::models::traits::{IAgent, IDecisionPolicy, IMovementModel};
use crate::policy::HeuristicPolicy;

/// 保持する意思決定履歴の件数
const HISTORY_CAPACITY: usize = 8;

const CONSERVATIVE_MOVES: [(i32, i32); 3] = [(0, 1), (1, 0), (0, -1)];
const EXPLORE_MOVES: [(i32, i32); 6] = [(0, 1), (1, 0), (0, -1), (-1, 0), (1, 1), (-1, -1)];
const CAUTIOUS_MOVES: [(i32, i32); 2] = [(0, 1), (1, 0)];

/// エネルギー関連の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergySettings {
    pub max_energy: f64,
    /// この値以下で稼働停止
    pub depletion_threshold: f64,
    /// 単位距離あたりの基本コスト
    pub cost_per_unit: f64,
    /// 連続モードでの毎ステップの待機消費
    pub idle_decay: f64,
    /// 停止中の毎ステップ回復量（0 なら回復しない）
    pub recharge_rate: f64,
    /// 回復時に稼働再開するエネルギー
    pub resume_threshold: f64,
    /// 支援要請とみなす低エネルギー水準
    pub low_energy: f64,
}

impl Default for EnergySettings {
    fn default() -> Self {
        Self {
            max_energy: 100.0,
            depletion_threshold: 10.0,
            cost_per_unit: 1.0,
            idle_decay: 0.05,
            recharge_rate: 0.0,
            resume_threshold: 30.0,
            low_energy: 20.0,
        }
    }
}

/// エージェントの初期設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSpec {
    pub id: u32,
    pub profile: Profile,
    pub position: Vector3,
    pub color: Option<String>,
    pub locomotion: Locomotion,
    /// 初期エネルギー（省略時は最大値）
    pub energy: Option<f64>,
    /// 1ステップの移動量（連続モード・経路追従）
    pub speed: f64,
    pub enabled: bool,
    /// 初期化時に経路探索で巡航経路を計画するか
    pub plan_route: bool,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            id: 0,
            profile: Profile::Guardian,
            position: Vector3::ZERO,
            color: None,
            locomotion: Locomotion::Ground,
            energy: None,
            speed: 1.0,
            enabled: true,
            plan_route: false,
        }
    }
}

/// 計画済み巡航経路
#[derive(Debug, Clone)]
struct PlannedRoute {
    points: Vec<Vector3>,
    cursor: usize,
    stride: usize,
}

/// 行動の累計統計
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    pub moves: u32,
    pub distance: f64,
    pub energy_spent: f64,
    visited: HashSet<(i64, i64)>,
}

impl AgentStats {
    pub fn unique_positions(&self) -> usize {
        self.visited.len()
    }

    fn visit(&mut self, position: &Vector3) {
        self.visited.insert((position.x.floor() as i64, position.y.floor() as i64));
    }
}

/// 自律エージェント
#[derive(Debug, Clone)]
pub struct Agent {
    id: u32,
    profile: Profile,
    color: String,
    locomotion: Locomotion,
    position: Vector3,
    home: Vector3,
    energy: f64,
    speed: f64,
    enabled: bool,
    status: AgentStatus,
    history: VecDeque<Decision>,
    route: Option<PlannedRoute>,
    stats: AgentStats,
    plan_route: bool,
    /// 直前の行動での実移動量
    last_step: f64,
}

impl Agent {
    pub fn from_spec(spec: &AgentSpec, settings: &EnergySettings) -> Self {
        let energy = spec.energy.unwrap_or(settings.max_energy).clamp(0.0, settings.max_energy);
        let mut agent = Self {
            id: spec.id,
            profile: spec.profile,
            color: spec.color.clone().unwrap_or_else(|| spec.profile.default_color().to_string()),
            locomotion: spec.locomotion,
            position: spec.position,
            home: spec.position,
            energy,
            speed: spec.speed.max(0.0),
            enabled: spec.enabled,
            status: AgentStatus::Operational,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            route: None,
            stats: AgentStats::default(),
            plan_route: spec.plan_route,
            last_step: 0.0,
        };
        agent.stats.visit(&spec.position);
        agent.refresh_status(settings);
        agent
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn locomotion(&self) -> Locomotion {
        self.locomotion
    }

    pub fn home(&self) -> Vector3 {
        self.home
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn wants_route(&self) -> bool {
        self.plan_route
    }

    /// 直前の `act` で実際に進んだ距離（連続モードの折り返しは含まない）
    pub fn last_step(&self) -> f64 {
        self.last_step
    }

    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn history(&self) -> impl Iterator<Item = &Decision> {
        self.history.iter()
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.history.back()
    }

    /// 支援が必要な状態か（直近の決定が支援要請、または低エネルギー）
    pub fn needs_help(&self, low_energy: f64) -> bool {
        self.last_decision().is_some_and(|d| d.action == Action::RequestHelp) || self.energy < low_energy
    }

    /// 他エージェントへ公開する読み取り専用スナップショット
    pub fn snapshot(&self, low_energy: f64) -> PeerSnapshot {
        PeerSnapshot {
            id: self.id,
            profile: self.profile,
            position: self.position,
            energy: self.energy,
            operational: self.is_operational(),
            needs_help: self.needs_help(low_energy),
        }
    }

    /// 巡航経路を割り当て
    ///
    /// 1ステップで `speed` 程度進むようにサンプル間隔からストライドを決めます。
    pub fn assign_route(&mut self, trajectory: Trajectory) {
        if trajectory.len() < 2 {
            return;
        }
        let spacing = trajectory.arc_length() / (trajectory.len() - 1) as f64;
        let stride = if spacing > 0.0 {
            ((self.speed / spacing).round() as usize).max(1)
        } else {
            1
        };
        debug!(
            "エージェント {} に経路を割り当て ({}点, ストライド {})",
            self.id,
            trajectory.len(),
            stride
        );
        self.route = Some(PlannedRoute {
            points: trajectory.points,
            cursor: 0,
            stride,
        });
    }

    /// ポリシーで行動を決定（失敗時は役割別ヒューリスティックへフォールバック）
    ///
    /// # 戻り値
    ///
    /// 常に何らかの決定を返す
    pub fn decide(
        &self,
        policy: &dyn IDecisionPolicy,
        fallback: &HeuristicPolicy,
        context: &DecisionContext<'_>,
    ) -> Decision {
        let decision = match policy.decide(self.profile, context) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    "エージェント {} ({}) のポリシー '{}' 評価に失敗: {}。ヒューリスティックで代替します",
                    self.id,
                    self.profile,
                    policy.name(),
                    e
                );
                fallback.decide_for(self.profile, context)
            }
        };
        debug!(
            "エージェント {} 決定: {} (優先度 {}, 理由: {})",
            self.id, decision.action, decision.priority, decision.rationale
        );
        decision
    }

    /// 決定に従って行動し、新しい位置を返す
    ///
    /// エネルギーは移動距離に比例して減少し、連続モードでは待機消費も加わります。
    /// 稼働していない場合は移動しません。
    pub fn act<R: Rng>(
        &mut self,
        decision: &Decision,
        env: &Environment,
        settings: &EnergySettings,
        rng: &mut R,
    ) -> Vector3 {
        self.remember(decision.clone());
        self.last_step = 0.0;
        if !self.is_operational() {
            return self.position;
        }

        let mode = env.mode();
        let world = env.world();
        let previous = self.position;

        let (next, distance) = match self.route_step(decision.action) {
            Some(point) => {
                let next = self.locomotion.clamp(world.bound(point, mode), world);
                match mode {
                    // グリッドでは最寄りのセルへ吸着
                    SimulationMode::Grid => {
                        let next = Vector3::new(next.x.round(), next.y.round(), next.z);
                        (next, next.manhattan_xy(&previous))
                    }
                    SimulationMode::Continuous => (next, next.distance(&previous)),
                }
            }
            None => {
                let delta = self.movement_delta(decision, env, rng);
                let next = self.locomotion.clamp(world.bound(previous + delta, mode), world);
                let distance = match mode {
                    SimulationMode::Grid => next.manhattan_xy(&previous),
                    // 折り返しによる見かけの距離ではなく実移動量
                    SimulationMode::Continuous => if next == previous { 0.0 } else { delta.norm() },
                };
                (next, distance)
            }
        };

        let mut cost = self.locomotion.consume(distance, &previous) * settings.cost_per_unit;
        if mode == SimulationMode::Continuous {
            cost += settings.idle_decay;
        }
        self.spend(cost, settings);

        self.last_step = distance;
        if distance > 0.0 {
            self.stats.moves += 1;
            self.stats.distance += distance;
        }
        self.position = next;
        self.stats.visit(&next);
        next
    }

    /// 停止中のエネルギー回復
    pub fn recharge(&mut self, settings: &EnergySettings) {
        if self.status != AgentStatus::Depleted || settings.recharge_rate <= 0.0 {
            return;
        }
        self.energy = (self.energy + settings.recharge_rate).min(settings.max_energy);
        if self.energy >= settings.resume_threshold {
            self.status = AgentStatus::Operational;
            info!("エージェント {} が稼働を再開 (エネルギー {:.1})", self.id, self.energy);
        }
    }

    fn spend(&mut self, cost: f64, settings: &EnergySettings) {
        let before = self.energy;
        self.energy = (self.energy - cost.max(0.0)).max(0.0);
        self.stats.energy_spent += before - self.energy;
        self.refresh_status(settings);
    }

    fn refresh_status(&mut self, settings: &EnergySettings) {
        let next = if !self.enabled {
            AgentStatus::Disabled
        } else if self.energy <= settings.depletion_threshold {
            AgentStatus::Depleted
        } else {
            AgentStatus::Operational
        };
        if next == AgentStatus::Depleted && self.status == AgentStatus::Operational {
            info!("エージェント {} のエネルギーが枯渇しました ({:.1})", self.id, self.energy);
        }
        self.status = next;
    }

    fn remember(&mut self, decision: Decision) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(decision);
    }

    fn route_step(&mut self, action: Action) -> Option<Vector3> {
        if action != Action::FollowRoute {
            return None;
        }
        let route = self.route.as_mut()?;
        route.cursor = (route.cursor + route.stride) % route.points.len();
        Some(route.points[route.cursor])
    }

    /// 行動ごとの移動量
    fn movement_delta<R: Rng>(&self, decision: &Decision, env: &Environment, rng: &mut R) -> Vector3 {
        let grid_step = match decision.action {
            Action::Wait | Action::WaitCentral => return Vector3::ZERO,
            Action::PatrolConservative | Action::RequestHelp => CONSERVATIVE_MOVES.choose(rng).copied(),
            Action::ExploreActive => EXPLORE_MOVES.choose(rng).copied(),
            Action::InvestigateCautious => CAUTIOUS_MOVES.choose(rng).copied(),
            Action::Patrol | Action::FollowRoute => Some((rng.gen_range(-1..=1), rng.gen_range(-1..=1))),
            action if action.is_targeted() => {
                let target = decision.target.unwrap_or_else(|| match action {
                    Action::ReturnHome => self.home,
                    _ => env.world().center(env.mode()),
                });
                return self.step_toward(&target, env.mode());
            }
            _ => None,
        };

        let (dx, dy) = grid_step.unwrap_or((0, 0));
        let step = Vector3::new(dx as f64, dy as f64, 0.0);
        match env.mode() {
            SimulationMode::Grid => step,
            SimulationMode::Continuous => step.try_normalize().map_or(Vector3::ZERO, |d| d * self.speed),
        }
    }

    fn step_toward(&self, target: &Vector3, mode: SimulationMode) -> Vector3 {
        let diff = Vector3::new(target.x - self.position.x, target.y - self.position.y, 0.0);
        match mode {
            SimulationMode::Grid => Vector3::new(sign_step(diff.x), sign_step(diff.y), 0.0),
            SimulationMode::Continuous => {
                let dist = diff.norm();
                diff.try_normalize().map_or(Vector3::ZERO, |d| d * self.speed.min(dist))
            }
        }
    }
}

fn sign_step(v: f64) -> f64 {
    if v > 0.5 {
        1.0
    } else if v < -0.5 {
        -1.0
    } else {
        0.0
    }
}

impl IAgent for Agent {
    fn get_id(&self) -> u32 {
        self.id
    }

    fn get_profile(&self) -> Profile {
        self.profile
    }

    fn get_position(&self) -> Vector3 {
        self.position
    }

    fn get_energy(&self) -> f64 {
        self.energy
    }

    fn is_operational(&self) -> bool {
        self.status == AgentStatus::Operational
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyEvaluationError;
    use crate::models::decision::fixtures;
    use crate::models::environment::{ThreatSettings, WorldBounds};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct FailingPolicy;

    impl IDecisionPolicy for FailingPolicy {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn decide(&self, profile: Profile, _context: &DecisionContext<'_>) -> Result<Decision, PolicyEvaluationError> {
            Err(PolicyEvaluationError::NoMatchingRule { profile, threat_level: 0.0 })
        }
    }

    fn grid_env() -> Environment {
        Environment::new(SimulationMode::Grid, WorldBounds::default(), ThreatSettings::default(), &[])
    }

    fn spec(profile: Profile, x: f64, y: f64) -> AgentSpec {
        AgentSpec {
            id: 1,
            profile,
            position: Vector3::new(x, y, 0.0),
            ..AgentSpec::default()
        }
    }

    #[test]
    fn test_failing_policy_falls_back() {
        let agent = Agent::from_spec(&spec(Profile::Guardian, 2.0, 2.0), &EnergySettings::default());
        let ctx = fixtures::context(&[], &[]);
        let decision = agent.decide(&FailingPolicy, &HeuristicPolicy, &ctx);
        assert_eq!(decision.action, Action::PatrolConservative);
    }

    #[test]
    fn test_grid_moves_are_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let env = grid_env();
        let mut agent = Agent::from_spec(&spec(Profile::Explorer, 7.0, 7.0), &EnergySettings::default());
        for tick in 0..50 {
            let d = Decision::new(Action::ExploreActive, 1, "test", tick);
            let p = agent.act(&d, &env, &EnergySettings::default(), &mut rng);
            assert!((0.0..=7.0).contains(&p.x) && (0.0..=7.0).contains(&p.y));
            assert_eq!(p.x.fract(), 0.0);
        }
    }

    #[test]
    fn test_energy_is_non_increasing_and_depletes() {
        let mut rng = StdRng::seed_from_u64(4);
        let env = grid_env();
        // 1ステップ（斜め移動）で 2 × 0.625 × 30 = 37.5 消費
        let settings = EnergySettings {
            cost_per_unit: 30.0,
            ..EnergySettings::default()
        };
        let mut agent = Agent::from_spec(&spec(Profile::Guardian, 0.0, 0.0), &settings);
        let target = Vector3::new(7.0, 7.0, 0.0);
        let mut last = agent.get_energy();
        for tick in 0..5 {
            let d = Decision::new(Action::ReturnHome, 1, "test", tick).with_target(target);
            agent.act(&d, &env, &settings, &mut rng);
            assert!(agent.get_energy() <= last);
            last = agent.get_energy();
        }
        assert!(!agent.is_operational());
        assert_eq!(agent.status(), AgentStatus::Depleted);

        // 停止中は移動しない
        let frozen = agent.get_position();
        let d = Decision::new(Action::ExploreActive, 1, "test", 41);
        assert_eq!(agent.act(&d, &env, &settings, &mut rng), frozen);
    }

    #[test]
    fn test_recharge_resumes_operation() {
        let settings = EnergySettings {
            recharge_rate: 10.0,
            ..EnergySettings::default()
        };
        let mut agent = Agent::from_spec(
            &AgentSpec {
                energy: Some(5.0),
                ..spec(Profile::Support, 0.0, 0.0)
            },
            &settings,
        );
        assert_eq!(agent.status(), AgentStatus::Depleted);
        agent.recharge(&settings);
        agent.recharge(&settings);
        assert!(!agent.is_operational());
        agent.recharge(&settings);
        assert!(agent.is_operational());
        assert_eq!(agent.get_energy(), 35.0);
    }

    #[test]
    fn test_step_toward_target() {
        let mut rng = StdRng::seed_from_u64(5);
        let env = grid_env();
        let mut agent = Agent::from_spec(&spec(Profile::Explorer, 0.0, 0.0), &EnergySettings::default());
        let d = Decision::new(Action::ApproachThreat, 2, "test", 0).with_target(Vector3::new(3.0, 0.0, 0.0));
        assert_eq!(agent.act(&d, &env, &EnergySettings::default(), &mut rng), Vector3::new(1.0, 0.0, 0.0));
        assert!((agent.get_energy() - (100.0 - 0.625)).abs() < 1e-12);
    }

    #[test]
    fn test_grid_route_snaps_to_cells() {
        let mut rng = StdRng::seed_from_u64(9);
        let env = grid_env();
        let mut agent = Agent::from_spec(&spec(Profile::Observer, 1.0, 1.0), &EnergySettings::default());
        let points = (0..6).map(|i| Vector3::new(1.0 + 0.4 * i as f64, 1.3 + 0.3 * i as f64, 0.0)).collect();
        agent.assign_route(Trajectory { points });
        let d = Decision::new(Action::FollowRoute, 1, "route", 0);
        for _ in 0..8 {
            let p = agent.act(&d, &env, &EnergySettings::default(), &mut rng);
            assert_eq!(p.x.fract(), 0.0, "x={}", p.x);
            assert_eq!(p.y.fract(), 0.0, "y={}", p.y);
            assert_eq!(agent.last_step().fract(), 0.0);
        }
    }

    #[test]
    fn test_wrap_records_actual_step_length() {
        let mut rng = StdRng::seed_from_u64(8);
        let env = Environment::new(SimulationMode::Continuous, WorldBounds::default(), ThreatSettings::default(), &[]);
        let mut agent = Agent::from_spec(&spec(Profile::Explorer, 7.5, 4.0), &EnergySettings::default());
        let d = Decision::new(Action::ApproachThreat, 2, "test", 0).with_target(Vector3::new(20.0, 4.0, 0.0));
        let p = agent.act(&d, &env, &EnergySettings::default(), &mut rng);

        assert!((p.x - 0.5).abs() < 1e-12);
        assert!((agent.last_step() - 1.0).abs() < 1e-12);
        assert!((agent.stats().distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut rng = StdRng::seed_from_u64(6);
        let env = grid_env();
        let mut agent = Agent::from_spec(&spec(Profile::Support, 3.0, 3.0), &EnergySettings::default());
        for tick in 0..20 {
            agent.act(&Decision::new(Action::Wait, 0, "idle", tick), &env, &EnergySettings::default(), &mut rng);
        }
        assert_eq!(agent.history().count(), HISTORY_CAPACITY);
        assert_eq!(agent.last_decision().map(|d| d.tick), Some(19));
    }

    #[test]
    fn test_follow_route_loops() {
        let mut rng = StdRng::seed_from_u64(7);
        let env = Environment::new(SimulationMode::Continuous, WorldBounds::default(), ThreatSettings::default(), &[]);
        let mut agent = Agent::from_spec(
            &AgentSpec {
                locomotion: Locomotion::Aerial,
                ..spec(Profile::Observer, 1.0, 1.0)
            },
            &EnergySettings::default(),
        );
        let points = (0..5).map(|i| Vector3::new(1.0 + i as f64, 1.0, 2.0)).collect();
        agent.assign_route(Trajectory { points });
        let d = Decision::new(Action::FollowRoute, 1, "route", 0);
        let xs: Vec<f64> = (0..6).map(|_| agent.act(&d, &env, &EnergySettings::default(), &mut rng).x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0, 5.0, 1.0, 2.0]);
    }
}
