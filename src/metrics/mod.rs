//! # Metrics モジュール
//!
//! ステップごとのエージェント記録と群全体の指標を収集します。
//!
//! 記録は完了したステップ × エージェント数だけ蓄積され、
//! 中断時もそれまでの記録はそのまま最終レポートに使われます。

pub mod report;
pub mod resilience;

pub use report::{AgentSummary, SimulationReport};
pub use resilience::{MetricsSettings, ResilienceScores};

use rand::Rng;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use crate::geometry::Vector3;
use crate::models::{Agent, EnergySettings, Environment, IAgent, Profile};

/// エージェント1体・1ステップ分の記録
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub timestamp: String,
    pub step: u64,
    pub agent_id: u32,
    pub profile: Profile,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    /// 行動名（停止中は "inactive"）
    pub decision: String,
    pub threat_level: f64,
    pub needs_help: bool,
    /// このステップの変位量
    pub speed: f64,
    pub energy: f64,
    pub operational: bool,
}

/// 群全体の1ステップ分の指標
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepMetrics {
    pub step: u64,
    /// 訪問済みセルの割合
    pub coverage: f64,
    /// 移動したエージェントの割合
    pub patrol_efficiency: f64,
    /// 重心までの平均距離
    pub cohesion: f64,
    /// 最近傍エージェントまでの平均距離
    pub separation: f64,
    /// 2体以上からなるクラスタ数
    pub clusters: usize,
    pub mean_energy: f64,
    pub operational_agents: usize,
    pub active_threats: usize,
    pub remaining_targets: usize,
    pub resilience: ResilienceScores,
}

/// 重心までの平均距離
pub fn cohesion(positions: &[Vector3]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    let n = positions.len() as f64;
    let centroid = positions.iter().fold(Vector3::ZERO, |acc, p| acc + *p) * (1.0 / n);
    positions.iter().map(|p| p.distance(&centroid)).sum::<f64>() / n
}

/// 最近傍距離の平均（1体以下なら 0）
pub fn separation(positions: &[Vector3]) -> f64 {
    if positions.len() < 2 {
        return 0.0;
    }
    let nearest: Vec<f64> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            positions
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| p.distance(q))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    nearest.iter().sum::<f64>() / nearest.len() as f64
}

/// 密度クラスタ数
///
/// 距離 `eps` 以内を連結とした連結成分のうち、2体以上のものを数えます。
/// 孤立したエージェントはノイズとして数えません。
pub fn count_clusters(positions: &[Vector3], eps: f64) -> usize {
    let n = positions.len();
    let mut visited = vec![false; n];
    let mut clusters = 0;

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut size = 1;
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for j in 0..n {
                if !visited[j] && positions[i].distance(&positions[j]) <= eps {
                    visited[j] = true;
                    size += 1;
                    queue.push_back(j);
                }
            }
        }
        if size >= 2 {
            clusters += 1;
        }
    }
    clusters
}

/// 指標収集器
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    settings: MetricsSettings,
    records: Vec<StepRecord>,
    steps: Vec<StepMetrics>,
    visited_cells: HashSet<(i64, i64)>,
    total_cells: usize,
    previous_energies: Option<Vec<f64>>,
}

impl MetricsCollector {
    pub fn new(settings: MetricsSettings, total_cells: usize) -> Self {
        Self {
            settings,
            records: Vec::new(),
            steps: Vec::new(),
            visited_cells: HashSet::new(),
            total_cells: total_cells.max(1),
            previous_energies: None,
        }
    }

    pub fn settings(&self) -> &MetricsSettings {
        &self.settings
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn steps(&self) -> &[StepMetrics] {
        &self.steps
    }

    /// 初期位置とエネルギーを登録（カバレッジと消費量の基準）
    pub fn observe_initial(&mut self, agents: &[Agent]) {
        for agent in agents {
            self.visit(&agent.get_position());
        }
        self.previous_energies = Some(agents.iter().map(|a| a.get_energy()).collect());
    }

    pub fn push_record(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    fn visit(&mut self, position: &Vector3) {
        self.visited_cells.insert((position.x.floor() as i64, position.y.floor() as i64));
    }

    /// ステップを締めて群指標を計算
    ///
    /// # 引数
    ///
    /// * `step_lengths` - 各エージェントがこのステップで実際に進んだ距離
    pub fn close_step<R: Rng>(
        &mut self,
        step: u64,
        agents: &[Agent],
        step_lengths: &[f64],
        env: &Environment,
        energy: &EnergySettings,
        rng: &mut R,
    ) -> &StepMetrics {
        let positions: Vec<Vector3> = agents.iter().map(|a| a.get_position()).collect();
        let energies: Vec<f64> = agents.iter().map(|a| a.get_energy()).collect();
        for p in &positions {
            self.visit(p);
        }

        let moved = step_lengths.iter().filter(|d| **d > 1e-9).count();

        // 観測された平均消費量（消費がなければ待機消費で推定）
        let observed_decay = match &self.previous_energies {
            Some(prev) if prev.len() == energies.len() && !energies.is_empty() => {
                prev.iter().zip(&energies).map(|(a, b)| (a - b).max(0.0)).sum::<f64>() / energies.len() as f64
            }
            _ => 0.0,
        };
        let decay_rate = if observed_decay > 0.0 { observed_decay } else { energy.idle_decay };

        let resilience = resilience::evaluate(
            &positions,
            step_lengths,
            &energies,
            energy.max_energy,
            decay_rate,
            &self.settings,
            rng,
        );

        let n = agents.len().max(1) as f64;
        let metrics = StepMetrics {
            step,
            coverage: self.visited_cells.len() as f64 / self.total_cells as f64,
            patrol_efficiency: moved as f64 / n,
            cohesion: cohesion(&positions),
            separation: separation(&positions),
            clusters: count_clusters(&positions, self.settings.neighbor_radius * 1.5),
            mean_energy: energies.iter().sum::<f64>() / n,
            operational_agents: agents.iter().filter(|a| a.is_operational()).count(),
            active_threats: env.threats().len(),
            remaining_targets: env.remaining_targets(),
            resilience,
        };

        self.previous_energies = Some(energies);
        self.steps.push(metrics);
        &self.steps[self.steps.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohesion_and_separation() {
        let square = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(2.0, 2.0, 0.0),
        ];
        assert!((cohesion(&square) - 2f64.sqrt()).abs() < 1e-12);
        assert!((separation(&square) - 2.0).abs() < 1e-12);
        assert_eq!(separation(&square[..1]), 0.0);
    }

    #[test]
    fn test_cluster_count_ignores_noise() {
        let points = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(11.0, 0.0, 0.0),
            Vector3::new(50.0, 0.0, 0.0),
        ];
        assert_eq!(count_clusters(&points, 1.5), 2);
        assert_eq!(count_clusters(&points, 100.0), 1);
        assert_eq!(count_clusters(&points, 0.5), 0);
    }
}
