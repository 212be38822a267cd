//! # Simulation モジュール
//!
//! 群巡回シミュレーションの中核となるシミュレーションエンジンを提供します。
//!
//! エンジンは乱数生成器・環境・エージェント・指標収集器を所有し、
//! 離散ステップでシミュレーションを進めます。
//!
//! ## シミュレーション処理順序
//!
//! 各ステップにおいて、以下の順序で処理が実行されます：
//!
//! 1. **環境更新**: 脅威の再生成
//! 2. **意思決定**: 稼働中の各エージェントが定義順にコンテキストを構築して決定
//! 3. **回収調停**: 同じ目標への回収要求を最寄りのエージェントに割り当て
//! 4. **行動**: 定義順に移動し、回収範囲に到達した目標を回収
//! 5. **回復**: 停止中エージェントのエネルギー回復
//! 6. **指標**: エージェント別記録と群指標を追加し、オブザーバへ通知
//!
//! 中断フラグはステップ境界でのみ確認し、中断時もそれまでの指標は確定します。
//!
//! ## 使用例
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use swarmsim::config::SimulationDocument;
//! use swarmsim::simulation::SimulationEngine;
//!
//! let doc = SimulationDocument::load("scenarios/grid_patrol.yaml")?;
//! let steps = doc.sim.steps;
//! let mut engine = SimulationEngine::new(doc, Arc::new(AtomicBool::new(false)), true);
//! engine.initialize()?;
//! let summary = engine.run(steps);
//! let report = engine.report(&summary);
//! # Ok::<(), swarmsim::error::SimulationError>(())
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::SimulationDocument;
use crate::error::SimulationError;
use crate::geometry::{Trajectory, Vector3};
use crate::metrics::{MetricsCollector, SimulationReport, StepMetrics, StepRecord};
use crate::models::*;
use crate::policy::{HeuristicPolicy, build_policy};
use crate::synthesis::{PathSynthesizer, SearchOutcome};

/// 1ステップ分の読み取り専用スナップショット
#[derive(Debug, Clone, Copy)]
pub struct StepSnapshot<'a> {
    pub step: u64,
    pub agents: &'a [Agent],
    pub threats: &'a [Threat],
    pub targets: &'a [CollectTarget],
    pub metrics: &'a StepMetrics,
}

/// 実行結果の概要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub steps_completed: u64,
    pub interrupted: bool,
    pub targets_collected: usize,
}

/// ステップ通知を受け取るオブザーバ（可視化・ログ出力用）
pub trait ISimulationObserver {
    fn on_step(&mut self, snapshot: &StepSnapshot<'_>);

    fn on_finish(&mut self, _summary: &RunSummary) {}
}

/// ステップごとの概要をログに出すオブザーバ
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ISimulationObserver for TracingObserver {
    fn on_step(&mut self, snapshot: &StepSnapshot<'_>) {
        let m = snapshot.metrics;
        debug!(
            "ステップ {}: カバレッジ {:.1}%, 稼働 {}/{}, 脅威 {}件, 平均エネルギー {:.1}, レジリエンス {:.3}",
            snapshot.step,
            m.coverage * 100.0,
            m.operational_agents,
            snapshot.agents.len(),
            snapshot.threats.len(),
            m.mean_energy,
            m.resilience.overall
        );
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        info!(
            "オブザーバ: {}ステップ完了 (中断: {}, 回収: {}件)",
            summary.steps_completed, summary.interrupted, summary.targets_collected
        );
    }
}

pub struct SimulationEngine {
    doc: SimulationDocument,
    rng: StdRng,
    environment: Environment,
    agents: Vec<Agent>,
    policy: Box<dyn IDecisionPolicy>,
    fallback: HeuristicPolicy,
    collector: MetricsCollector,
    observers: Vec<Box<dyn ISimulationObserver>>,
    planned_routes: Vec<(u32, Trajectory)>,
    interrupt: Arc<AtomicBool>,
    step_delay: Duration,
    step_count: u64,
}

impl SimulationEngine {
    /// エンジンを作成
    ///
    /// # 引数
    ///
    /// * `doc` - 設定ドキュメント
    /// * `interrupt` - 中断フラグ（ステップ境界で確認）
    /// * `headless` - true ならステップ間の待機を行わない
    pub fn new(doc: SimulationDocument, interrupt: Arc<AtomicBool>, headless: bool) -> Self {
        let environment = Environment::new(doc.sim.mode, doc.world, doc.threats, &doc.targets.items);
        let policy = build_policy(doc.sim.policy, &doc.rules, doc.targets.near_threshold, doc.energy.low_energy);
        let collector = MetricsCollector::new(doc.metrics, doc.world.cell_count());
        let step_delay = if headless {
            Duration::ZERO
        } else {
            Duration::from_millis(doc.sim.step_delay_ms)
        };

        Self {
            rng: StdRng::seed_from_u64(doc.sim.seed),
            environment,
            agents: Vec::new(),
            policy,
            fallback: HeuristicPolicy,
            collector,
            observers: Vec::new(),
            planned_routes: Vec::new(),
            interrupt,
            step_delay,
            step_count: 0,
            doc,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn ISimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn document(&self) -> &SimulationDocument {
        &self.doc
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// 初期化時に計画された経路 (エージェントID, 軌道)
    pub fn planned_routes(&self) -> &[(u32, Trajectory)] {
        &self.planned_routes
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// エージェントを生成し、必要なら巡航経路を計画
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        info!("シミュレーションエンジンを初期化中...");
        self.doc.validate()?;

        self.agents = self
            .doc
            .agents
            .iter()
            .map(|spec| Agent::from_spec(spec, &self.doc.energy))
            .collect();

        for i in 0..self.agents.len() {
            if self.agents[i].wants_route() {
                self.plan_route(i);
            }
        }

        self.collector.observe_initial(&self.agents);

        info!("初期化完了:");
        info!("  モード: {:?}", self.doc.sim.mode);
        info!("  ポリシー: {}", self.policy.name());
        info!("  エージェント: {}体", self.agents.len());
        info!("  計画経路: {}本", self.planned_routes.len());
        info!("  回収目標: {}個", self.environment.targets().len());
        Ok(())
    }

    /// エージェントの初期位置を中心に経路探索（`search.routes` 回まで再試行）
    fn plan_route(&mut self, index: usize) {
        let start = self.agents[index].get_position();
        let id = self.agents[index].get_id();
        let mut synthesizer = PathSynthesizer::new(self.doc.search.clone(), self.doc.constraints, self.rng.r#gen());
        synthesizer.set_center(Vector3::new(start.x, start.y, self.doc.search.center.z));

        let tries = self.doc.search.routes.max(1);
        for attempt in 1..=tries {
            match synthesizer.find_route() {
                SearchOutcome::Found(found) => {
                    info!(
                        "エージェント {} の経路を計画しました (試行 {} 回, スケール {:.3})",
                        id, found.attempts, found.scale
                    );
                    self.planned_routes.push((id, found.trajectory.clone()));
                    self.agents[index].assign_route(found.trajectory);
                    return;
                }
                SearchOutcome::NotFound(exhausted) => {
                    debug!(
                        "エージェント {} の経路探索失敗 ({}/{}): 試行 {} 回, 最終スケール {:.3}",
                        id, attempt, tries, exhausted.attempts, exhausted.final_scale
                    );
                }
            }
        }
        warn!("エージェント {} の経路が見つかりません。通常の巡回で行動します", id);
    }

    /// シミュレーションを最大 `n_steps` ステップ実行
    pub fn run(&mut self, n_steps: u64) -> RunSummary {
        info!("=== シミュレーション実行開始 ===");
        let start_step = self.step_count;
        let mut interrupted = false;

        for i in 0..n_steps {
            if self.interrupt.load(Ordering::SeqCst) {
                warn!("中断要求を受信しました。ステップ {} で停止します", self.step_count);
                interrupted = true;
                break;
            }

            self.step();

            let done = i + 1;
            if n_steps >= 10 && done % (n_steps / 10) == 0 {
                info!("進行状況: {:.0}% ({}/{}ステップ)", done as f64 / n_steps as f64 * 100.0, done, n_steps);
            }
            if !self.step_delay.is_zero() && done < n_steps {
                std::thread::sleep(self.step_delay);
            }
        }

        let summary = RunSummary {
            steps_completed: self.step_count - start_step,
            interrupted,
            targets_collected: self.targets_collected(),
        };
        for observer in &mut self.observers {
            observer.on_finish(&summary);
        }

        info!("=== シミュレーション完了 ===");
        info!("総ステップ数: {}", summary.steps_completed);
        info!("回収済み目標: {}個", summary.targets_collected);
        summary
    }

    pub fn targets_collected(&self) -> usize {
        self.environment
            .targets()
            .iter()
            .filter(|t| t.collected_by.is_some())
            .count()
    }

    /// 1ステップ実行
    pub fn step(&mut self) {
        let tick = self.step_count;
        trace!("ステップ {} 開始", tick);

        self.environment.regenerate(tick, &mut self.rng);

        let threat_levels: Vec<f64> = self
            .agents
            .iter()
            .map(|a| self.environment.threat_level_at(&a.get_position()))
            .collect();

        let mut decisions = self.decide_all(tick, &threat_levels);
        let reassigned = arbitrate_claims(&mut decisions, &self.agents, &self.environment, tick);
        if reassigned > 0 {
            debug!("回収要求の競合を調停: {}体を再割り当て", reassigned);
        }

        let mut step_lengths = vec![0.0; self.agents.len()];
        for ((agent, decision), step_length) in self.agents.iter_mut().zip(&decisions).zip(&mut step_lengths) {
            let Some(decision) = decision else {
                continue;
            };
            let position = agent.act(decision, &self.environment, &self.doc.energy, &mut self.rng);
            *step_length = agent.last_step();

            if let (Action::Collect, Some(target_id)) = (decision.action, decision.target_id) {
                let reached = decision
                    .target
                    .is_some_and(|t| self.environment.distance(&position, &t) <= self.doc.targets.collect_radius);
                if reached && self.environment.collect(target_id, agent.get_id(), tick) {
                    info!("エージェント {} が目標 {} を回収しました (ステップ {})", agent.get_id(), target_id, tick);
                }
            }
        }

        for agent in &mut self.agents {
            agent.recharge(&self.doc.energy);
        }

        let timestamp = chrono::Local::now().to_rfc3339();
        for (i, agent) in self.agents.iter().enumerate() {
            let position = agent.get_position();
            let decision = match &decisions[i] {
                Some(d) => d.action.to_string(),
                None => "inactive".to_string(),
            };
            self.collector.push_record(StepRecord {
                timestamp: timestamp.clone(),
                step: tick,
                agent_id: agent.get_id(),
                profile: agent.get_profile(),
                pos_x: position.x,
                pos_y: position.y,
                pos_z: position.z,
                decision,
                threat_level: threat_levels[i],
                needs_help: agent.needs_help(self.doc.energy.low_energy),
                speed: step_lengths[i],
                energy: agent.get_energy(),
                operational: agent.is_operational(),
            });
        }

        let metrics = self
            .collector
            .close_step(tick, &self.agents, &step_lengths, &self.environment, &self.doc.energy, &mut self.rng);
        let snapshot = StepSnapshot {
            step: tick,
            agents: &self.agents,
            threats: self.environment.threats(),
            targets: self.environment.targets(),
            metrics,
        };
        for observer in &mut self.observers {
            observer.on_step(&snapshot);
        }

        self.step_count += 1;
    }

    /// 稼働中の各エージェントの決定（停止中は None）
    fn decide_all(&self, tick: u64, threat_levels: &[f64]) -> Vec<Option<Decision>> {
        let low_energy = self.doc.energy.low_energy;
        let peers: Vec<PeerSnapshot> = self.agents.iter().map(|a| a.snapshot(low_energy)).collect();
        let mode = self.environment.mode();
        let center = self.environment.world().center(mode);
        let phase = match self.doc.sim.return_home_after {
            Some(after) if tick >= after => MissionPhase::Returning,
            _ => MissionPhase::Active,
        };

        self.agents
            .iter()
            .zip(threat_levels)
            .map(|(agent, &level)| {
                if !agent.is_operational() {
                    return None;
                }
                let context = DecisionContext {
                    agent_id: agent.get_id(),
                    position: agent.get_position(),
                    home: agent.home(),
                    energy: agent.get_energy(),
                    tick,
                    mode,
                    center,
                    local_threat_level: level,
                    phase,
                    has_route: agent.has_route(),
                    threats: self.environment.threats(),
                    targets: self.environment.targets(),
                    peers: &peers,
                };
                Some(agent.decide(self.policy.as_ref(), &self.fallback, &context))
            })
            .collect()
    }

    /// 最終レポートを作成
    pub fn report(&self, summary: &RunSummary) -> SimulationReport {
        SimulationReport::build(
            &self.doc.meta.name,
            &self.collector,
            &self.agents,
            summary.steps_completed,
            summary.interrupted,
            summary.targets_collected,
        )
    }
}

/// 回収要求の調停
///
/// 同じ目標を要求したエージェントのうち最寄りのもの（同距離なら定義順で先）が確保し、
/// それ以外は探索行動に置き換えます。
///
/// # 戻り値
///
/// 決定を置き換えたエージェント数
pub fn arbitrate_claims(decisions: &mut [Option<Decision>], agents: &[Agent], env: &Environment, tick: u64) -> usize {
    let mut winners: BTreeMap<u32, (usize, f64)> = BTreeMap::new();
    for (i, decision) in decisions.iter().enumerate() {
        let Some(d) = decision else { continue };
        let (Action::Collect, Some(target_id), Some(target)) = (d.action, d.target_id, d.target) else {
            continue;
        };
        let distance = env.distance(&agents[i].get_position(), &target);
        winners
            .entry(target_id)
            .and_modify(|best| {
                if distance < best.1 {
                    *best = (i, distance);
                }
            })
            .or_insert((i, distance));
    }

    let mut reassigned = 0;
    for (i, slot) in decisions.iter_mut().enumerate() {
        let Some(d) = slot.as_ref() else { continue };
        let Some(target_id) = d.target_id.filter(|_| d.action == Action::Collect) else {
            continue;
        };
        if winners.get(&target_id).is_some_and(|&(winner, _)| winner != i) {
            debug!(
                "エージェント {} の目標 {} は他のエージェントが確保済み",
                agents[i].get_id(),
                target_id
            );
            *slot = Some(Decision::new(
                Action::ExploreActive,
                1,
                format!("目標 {} は他のエージェントが確保済み", target_id),
                tick,
            ));
            reassigned += 1;
        }
    }
    reassigned
}
