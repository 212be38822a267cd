//! # Config モジュール
//!
//! シミュレーション設定ドキュメント（YAML）の読み込みと検証を行います。
//!
//! すべてのセクションは省略可能で、省略された項目は既定値で補われます。
//! 既定値は 8×8 グリッド上の3体（guardian / explorer / support）による15ステップの巡回です。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::geometry::{Vector3, Waypoint};
use crate::metrics::MetricsSettings;
use crate::models::{AgentSpec, EnergySettings, Profile, SimulationMode, TargetSettings, ThreatSettings, WorldBounds};
use crate::orientation::ConstraintSet;
use crate::policy::{PolicyKind, Rule};
use crate::synthesis::SearchParams;

/// メタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaSection {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl Default for MetaSection {
    fn default() -> Self {
        Self {
            name: "default_patrol".to_string(),
            description: "8x8 グリッド上の3体による巡回".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// 実行設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSection {
    pub mode: SimulationMode,
    pub steps: u64,
    /// ステップ間の待機時間（headless では無視）
    pub step_delay_ms: u64,
    pub seed: u64,
    pub policy: PolicyKind,
    /// このステップ以降は帰還フェーズ
    pub return_home_after: Option<u64>,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Grid,
            steps: 15,
            step_delay_ms: 300,
            seed: 42,
            policy: PolicyKind::RuleTable,
            return_home_after: None,
        }
    }
}

/// 解析用の固定経路
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSection {
    pub waypoints: Vec<Waypoint>,
    pub resolution: usize,
}

impl Default for RouteSection {
    fn default() -> Self {
        Self {
            waypoints: vec![
                Vector3::new(0.0, 0.0, 2.0),
                Vector3::new(3.0, 2.0, 1.8),
                Vector3::new(6.0, 3.0, 2.1),
                Vector3::new(8.0, 3.0, 2.0),
            ],
            resolution: 500,
        }
    }
}

/// 出力先（未指定なら出力しない）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub metrics_csv: Option<String>,
    pub trajectory_csv: Option<String>,
    pub report_json: Option<String>,
}

/// 設定ドキュメント全体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationDocument {
    pub meta: MetaSection,
    pub sim: SimSection,
    pub world: WorldBounds,
    pub agents: Vec<AgentSpec>,
    pub energy: EnergySettings,
    pub threats: ThreatSettings,
    pub targets: TargetSettings,
    /// 空の場合は標準ルールセット
    pub rules: Vec<Rule>,
    pub constraints: ConstraintSet,
    pub search: SearchParams,
    pub route: RouteSection,
    pub metrics: MetricsSettings,
    pub output: OutputSection,
}

impl Default for SimulationDocument {
    fn default() -> Self {
        Self {
            meta: MetaSection::default(),
            sim: SimSection::default(),
            world: WorldBounds::default(),
            agents: default_agents(),
            energy: EnergySettings::default(),
            threats: ThreatSettings::default(),
            targets: TargetSettings::default(),
            rules: Vec::new(),
            constraints: ConstraintSet::default(),
            search: SearchParams::default(),
            route: RouteSection::default(),
            metrics: MetricsSettings::default(),
            output: OutputSection::default(),
        }
    }
}

fn default_agents() -> Vec<AgentSpec> {
    [
        (1, Profile::Guardian, 0.0, 0.0),
        (2, Profile::Explorer, 7.0, 0.0),
        (3, Profile::Support, 0.0, 7.0),
    ]
    .into_iter()
    .map(|(id, profile, x, y)| AgentSpec {
        id,
        profile,
        position: Vector3::new(x, y, 0.0),
        ..AgentSpec::default()
    })
    .collect()
}

impl SimulationDocument {
    /// 設定ファイルを読み込む（ファイルがなければ既定値）
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("設定ファイル {} が見つかりません。既定の設定を使用します", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// 設定ファイルを読み込んで検証
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Self::from_yaml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        doc.validate()?;
        info!("設定ファイルを読み込みました: {} ({})", path.display(), doc.meta.name);
        Ok(doc)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        // 空ファイルは null として解析されるため既定値を使う
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if !(self.world.width >= 1.0 && self.world.height >= 1.0) {
            return fail(format!("ワールドの大きさが不正です: {} x {}", self.world.width, self.world.height));
        }
        if self.world.max_altitude < 0.0 || self.world.max_depth < 0.0 {
            return fail("max_altitude / max_depth は0以上である必要があります".to_string());
        }

        let mut ids = HashSet::new();
        for agent in &self.agents {
            if !ids.insert(agent.id) {
                return fail(format!("エージェントIDが重複しています: {}", agent.id));
            }
            if !agent.position.is_finite() {
                return fail(format!("エージェント {} の位置が不正です", agent.id));
            }
            if !(agent.speed > 0.0) {
                return fail(format!("エージェント {} の speed は正である必要があります", agent.id));
            }
        }

        let e = &self.energy;
        if !(e.max_energy > 0.0) || e.depletion_threshold < 0.0 || e.depletion_threshold >= e.max_energy {
            return fail(format!(
                "エネルギー設定が不正です: max_energy={}, depletion_threshold={}",
                e.max_energy, e.depletion_threshold
            ));
        }
        if e.cost_per_unit < 0.0 || e.idle_decay < 0.0 || e.recharge_rate < 0.0 {
            return fail("エネルギー消費・回復量は0以上である必要があります".to_string());
        }

        let t = &self.threats;
        if !(0.0..=1.0).contains(&t.probability) {
            return fail(format!("脅威の生成確率は [0, 1] の範囲である必要があります: {}", t.probability));
        }
        if !(0.0 <= t.min_intensity && t.min_intensity <= t.max_intensity && t.max_intensity <= 1.0) {
            return fail(format!("脅威の強度範囲が不正です: [{}, {}]", t.min_intensity, t.max_intensity));
        }

        let mut target_ids = HashSet::new();
        for target in &self.targets.items {
            if !target_ids.insert(target.id) {
                return fail(format!("回収目標IDが重複しています: {}", target.id));
            }
        }

        for rule in &self.rules {
            if rule.min_threat > rule.max_threat {
                return fail(format!("ルール {} の脅威範囲が逆転しています", rule.rationale));
            }
        }

        self.constraints.validate().map_err(ConfigError::Validation)?;
        self.search.validate().map_err(ConfigError::Validation)?;

        if self.route.resolution < 2 {
            return fail(format!("route.resolution は2以上である必要があります: {}", self.route.resolution));
        }
        if !(self.metrics.neighbor_radius > 0.0) {
            return fail("metrics.neighbor_radius は正である必要があります".to_string());
        }

        Ok(())
    }

    /// 設定の概要を表示
    pub fn print_summary(&self) {
        println!("=== 設定情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("モード: {:?}", self.sim.mode);
        println!("ステップ数: {}", self.sim.steps);
        println!("ステップ間隔: {}ms", self.sim.step_delay_ms);
        println!("シード値: {}", self.sim.seed);
        println!("ポリシー: {:?}", self.sim.policy);
        if let Some(step) = self.sim.return_home_after {
            println!("帰還開始: ステップ {}", step);
        }
        println!("ワールド: {} x {}", self.world.width, self.world.height);
        println!();

        println!("=== エージェント ===");
        for agent in &self.agents {
            println!(
                "  {}: {} ({:.1}, {:.1}, {:.1}) {:?}{}{}",
                agent.id,
                agent.profile,
                agent.position.x,
                agent.position.y,
                agent.position.z,
                agent.locomotion,
                if agent.plan_route { " [経路計画]" } else { "" },
                if agent.enabled { "" } else { " [無効]" }
            );
        }
        println!();

        println!("=== 環境 ===");
        println!(
            "脅威: 確率 {:.2}, 強度 {:.2}-{:.2}",
            self.threats.probability, self.threats.min_intensity, self.threats.max_intensity
        );
        println!("回収目標: {}個", self.targets.items.len());
        if self.rules.is_empty() {
            println!("ルール: 標準ルールセット");
        } else {
            println!("ルール: {}件", self.rules.len());
        }
        println!();

        let c = &self.constraints;
        println!("=== 姿勢制約 ===");
        println!("絶対角 (roll/pitch/yaw): {}/{}/{}", c.max_abs_roll, c.max_abs_pitch, c.max_abs_yaw);
        println!("変化量 (roll/pitch/yaw): {}/{}/{}", c.max_delta_roll, c.max_delta_pitch, c.max_delta_yaw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reproduce_patrol_setup() {
        let doc = SimulationDocument::default();
        assert!(doc.validate().is_ok());
        assert_eq!(doc.sim.steps, 15);
        assert_eq!(doc.sim.step_delay_ms, 300);
        assert_eq!(doc.agents.len(), 3);
        assert_eq!(doc.agents[1].profile, Profile::Explorer);
        assert_eq!(doc.agents[1].position, Vector3::new(7.0, 0.0, 0.0));
        assert_eq!(doc.route.waypoints.len(), 4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "sim:\n  mode: continuous\n  steps: 5\nthreats:\n  probability: 0.5\n";
        let doc = SimulationDocument::from_yaml_str(yaml).unwrap();
        assert_eq!(doc.sim.mode, SimulationMode::Continuous);
        assert_eq!(doc.sim.steps, 5);
        assert_eq!(doc.sim.step_delay_ms, 300);
        assert_eq!(doc.threats.probability, 0.5);
        assert_eq!(doc.threats.max_intensity, 0.9);
        assert_eq!(doc.agents.len(), 3);
    }

    #[test]
    fn test_agents_and_targets_from_yaml() {
        let yaml = r#"
sim:
  policy: collector
  return_home_after: 20
agents:
  - id: 7
    profile: observer
    position: [1.0, 2.0, 0.0]
    locomotion: aerial
targets:
  items:
    - id: 1
      position: [4.0, 4.0, 0.0]
"#;
        let doc = SimulationDocument::from_yaml_str(yaml).unwrap();
        assert_eq!(doc.sim.policy, PolicyKind::Collector);
        assert_eq!(doc.sim.return_home_after, Some(20));
        assert_eq!(doc.agents.len(), 1);
        assert_eq!(doc.agents[0].profile, Profile::Observer);
        assert_eq!(doc.agents[0].speed, 1.0);
        assert_eq!(doc.targets.items[0].position, Vector3::new(4.0, 4.0, 0.0));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_duplicates_and_ranges() {
        let mut doc = SimulationDocument::default();
        doc.agents[1].id = doc.agents[0].id;
        assert!(matches!(doc.validate(), Err(ConfigError::Validation(_))));

        let mut doc = SimulationDocument::default();
        doc.threats.probability = 1.5;
        assert!(doc.validate().is_err());

        let mut doc = SimulationDocument::default();
        doc.search.reduction_factor = 0.0;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_non_finite_search() {
        for value in [".inf", ".nan", "-.inf"] {
            let yaml = format!("search:\n  initial_scale: {}\n", value);
            let doc = SimulationDocument::from_yaml_str(&yaml).unwrap();
            assert!(matches!(doc.validate(), Err(ConfigError::Validation(_))), "{}", value);
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("swarmsim-does-not-exist.yaml");
        let doc = SimulationDocument::load(&path).unwrap();
        assert_eq!(doc, SimulationDocument::default());
    }

    #[test]
    fn test_bundled_scenarios_validate() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        for name in ["grid_patrol.yaml", "continuous_swarm.yaml", "collection.yaml", "route_analysis.yaml"] {
            let doc = SimulationDocument::from_file(dir.join(name));
            assert!(doc.is_ok(), "{}: {:?}", name, doc.err());
        }
    }

    #[test]
    fn test_malformed_file_is_error() {
        let path = std::env::temp_dir().join(format!("swarmsim-{}-bad.yaml", std::process::id()));
        fs::write(&path, "sim: [unclosed").unwrap();
        assert!(matches!(SimulationDocument::load(&path), Err(ConfigError::Parse { .. })));
        let _ = fs::remove_file(&path);
    }
}
