//! 群レジリエンス指標
//!
//! - 構造: 近傍グラフの平均次数・クラスタ係数・ランダムに1ノード除去後のエッジ残存率
//! - エネルギー: 平均残量・残量の均一性・最初の枯渇までの推定ステップ数
//! - 適応: 1ステップの平均移動量と移動量の多様性（記録がなければ 0.5）
//!
//! 各重みは設定値で、既定値は経験的なものです。距離は常にユークリッド距離。

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;

/// 適応能力の中立値（移動量の記録がない場合）
pub const NEUTRAL_ADAPTIVE: f64 = 0.5;

/// 指標の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// 隣接とみなす距離
    pub neighbor_radius: f64,
    /// 総合 = 構造 / エネルギー / 適応
    pub weights: [f64; 3],
    /// 構造 = 平均次数 / クラスタ係数 / エッジ残存率
    pub structural_weights: [f64; 3],
    /// エネルギー = 平均 / 均一性 / 枯渇までの時間
    pub energy_weights: [f64; 3],
    /// 適応 = 平均変位 / 多様性
    pub adaptive_weights: [f64; 2],
    /// 枯渇までの時間を正規化する基準ステップ数
    pub horizon_steps: f64,
    /// 平均変位を正規化する基準速度
    pub reference_speed: f64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            neighbor_radius: 10.0,
            weights: [0.4, 0.4, 0.2],
            structural_weights: [0.4, 0.3, 0.3],
            energy_weights: [0.6, 0.2, 0.2],
            adaptive_weights: [0.7, 0.3],
            horizon_steps: 100.0,
            reference_speed: 1.0,
        }
    }
}

/// レジリエンススコア
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResilienceScores {
    pub structural: f64,
    pub energy: f64,
    pub adaptive: f64,
    pub overall: f64,
}

/// 近傍グラフ（隣接リスト）
fn neighbor_graph(positions: &[Vector3], radius: f64) -> Vec<Vec<usize>> {
    let n = positions.len();
    let mut adjacency = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if positions[i].distance(&positions[j]) < radius {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }
    adjacency
}

/// 局所クラスタ係数の平均（次数2以上のノードのみ）
fn mean_clustering(adjacency: &[Vec<usize>]) -> f64 {
    let coefficients: Vec<f64> = adjacency
        .iter()
        .filter(|neighbors| neighbors.len() >= 2)
        .map(|neighbors| {
            let k = neighbors.len();
            let links = neighbors
                .iter()
                .enumerate()
                .flat_map(|(a, &u)| neighbors[a + 1..].iter().map(move |&v| (u, v)))
                .filter(|&(u, v)| adjacency[u].contains(&v))
                .count();
            links as f64 / (k * (k - 1) / 2) as f64
        })
        .collect();

    if coefficients.is_empty() {
        0.0
    } else {
        coefficients.iter().sum::<f64>() / coefficients.len() as f64
    }
}

/// 構造レジリエンス
pub fn structural_resilience<R: Rng>(positions: &[Vector3], settings: &MetricsSettings, rng: &mut R) -> f64 {
    let n = positions.len();
    if n < 2 {
        return 0.0;
    }

    let adjacency = neighbor_graph(positions, settings.neighbor_radius);
    let degrees: Vec<usize> = adjacency.iter().map(Vec::len).collect();
    let mean_degree = degrees.iter().sum::<usize>() as f64 / n as f64;
    let degree_term = mean_degree / (n - 1) as f64;

    let edges = degrees.iter().sum::<usize>() / 2;
    let removed = rng.gen_range(0..n);
    let survival = if edges == 0 {
        0.0
    } else {
        (edges - degrees[removed]) as f64 / edges as f64
    };

    let [w_degree, w_cluster, w_survival] = settings.structural_weights;
    w_degree * degree_term + w_cluster * mean_clustering(&adjacency) + w_survival * survival
}

/// エネルギーレジリエンス
///
/// # 引数
///
/// * `decay_rate` - 1ステップあたりの推定消費量（0 以下なら枯渇しないとみなす）
pub fn energy_resilience(energies: &[f64], max_energy: f64, decay_rate: f64, settings: &MetricsSettings) -> f64 {
    if energies.is_empty() || max_energy <= 0.0 {
        return 0.0;
    }
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let std = (energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n).sqrt();
    let min = energies.iter().copied().fold(f64::INFINITY, f64::min);

    let level = (mean / max_energy).clamp(0.0, 1.0);
    let uniformity = (1.0 - std / (max_energy / 2.0)).clamp(0.0, 1.0);
    let time_to_collapse = if decay_rate > 0.0 && settings.horizon_steps > 0.0 {
        (min / decay_rate / settings.horizon_steps).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let [w_level, w_uniform, w_ttc] = settings.energy_weights;
    w_level * level + w_uniform * uniformity + w_ttc * time_to_collapse
}

/// 適応能力
///
/// `displacements` は各エージェントの実移動量で、連続モードの折り返しによる
/// 見かけの跳躍は含めないこと。
pub fn adaptive_capacity(displacements: &[f64], settings: &MetricsSettings) -> f64 {
    if displacements.is_empty() {
        return NEUTRAL_ADAPTIVE;
    }

    let n = displacements.len() as f64;
    let mean = displacements.iter().sum::<f64>() / n;
    let variance = displacements.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    let speed = if settings.reference_speed > 0.0 {
        (mean / settings.reference_speed).min(1.0)
    } else {
        0.0
    };
    let diversity = (variance / (mean + 1e-6)).min(1.0);

    let [w_speed, w_diversity] = settings.adaptive_weights;
    w_speed * speed + w_diversity * diversity
}

/// 3指標と総合スコアを計算
pub fn evaluate<R: Rng>(
    positions: &[Vector3],
    displacements: &[f64],
    energies: &[f64],
    max_energy: f64,
    decay_rate: f64,
    settings: &MetricsSettings,
    rng: &mut R,
) -> ResilienceScores {
    let structural = structural_resilience(positions, settings, rng);
    let energy = energy_resilience(energies, max_energy, decay_rate, settings);
    let adaptive = adaptive_capacity(displacements, settings);
    let [w_s, w_e, w_a] = settings.weights;
    ResilienceScores {
        structural,
        energy,
        adaptive,
        overall: w_s * structural + w_e * energy + w_a * adaptive,
    }
}
