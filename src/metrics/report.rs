use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ExportError;
use crate::metrics::{MetricsCollector, ResilienceScores, StepMetrics};
use crate::models::{Agent, AgentStatus, IAgent, Profile};

/// エージェントごとの集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub id: u32,
    pub profile: Profile,
    pub color: String,
    pub moves: u32,
    pub distance: f64,
    pub most_common_decision: Option<String>,
    pub unique_positions: usize,
    pub mean_speed: f64,
    pub energy_spent: f64,
    pub final_energy: f64,
    pub status: AgentStatus,
}

/// シミュレーション最終レポート
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub generated_at: String,
    pub scenario: String,
    pub steps_completed: u64,
    pub interrupted: bool,
    pub final_coverage: f64,
    pub mean_efficiency: f64,
    pub targets_collected: usize,
    pub final_resilience: Option<ResilienceScores>,
    /// 行動名 → 回数（全エージェント）
    pub decision_histogram: BTreeMap<String, usize>,
    /// 役割 → 行動名 → 回数
    pub decisions_by_profile: BTreeMap<String, BTreeMap<String, usize>>,
    pub agents: Vec<AgentSummary>,
    pub timeline: Vec<StepMetrics>,
}

impl SimulationReport {
    pub fn build(
        scenario: &str,
        collector: &MetricsCollector,
        agents: &[Agent],
        steps_completed: u64,
        interrupted: bool,
        targets_collected: usize,
    ) -> Self {
        let records = collector.records();
        let steps = collector.steps();

        let mut decision_histogram = BTreeMap::new();
        let mut decisions_by_profile: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for r in records {
            *decision_histogram.entry(r.decision.clone()).or_insert(0) += 1;
            *decisions_by_profile
                .entry(r.profile.to_string())
                .or_default()
                .entry(r.decision.clone())
                .or_insert(0) += 1;
        }

        let summaries = agents
            .iter()
            .map(|agent| {
                let own: Vec<_> = records.iter().filter(|r| r.agent_id == agent.get_id()).collect();
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for r in &own {
                    *counts.entry(r.decision.as_str()).or_insert(0) += 1;
                }
                // 同数の場合は名前順で先のもの
                let most_common_decision = counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(name, _)| name.to_string());
                let mean_speed = if own.is_empty() {
                    0.0
                } else {
                    own.iter().map(|r| r.speed).sum::<f64>() / own.len() as f64
                };

                AgentSummary {
                    id: agent.get_id(),
                    profile: agent.get_profile(),
                    color: agent.color().to_string(),
                    moves: agent.stats().moves,
                    distance: agent.stats().distance,
                    most_common_decision,
                    unique_positions: agent.stats().unique_positions(),
                    mean_speed,
                    energy_spent: agent.stats().energy_spent,
                    final_energy: agent.get_energy(),
                    status: agent.status(),
                }
            })
            .collect();

        let mean_efficiency = if steps.is_empty() {
            0.0
        } else {
            steps.iter().map(|s| s.patrol_efficiency).sum::<f64>() / steps.len() as f64
        };

        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            scenario: scenario.to_string(),
            steps_completed,
            interrupted,
            final_coverage: steps.last().map_or(0.0, |s| s.coverage),
            mean_efficiency,
            targets_collected,
            final_resilience: steps.last().map(|s| s.resilience),
            decision_histogram,
            decisions_by_profile,
            agents: summaries,
            timeline: steps.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON ファイルとして保存
    pub fn write_json(&self, path: &Path) -> Result<(), ExportError> {
        let json = self.to_json()?;
        crate::export::ensure_parent(path)?;
        std::fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
