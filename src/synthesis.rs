//! # Synthesis モジュール
//!
//! 姿勢制約を満たす経路をランダム探索で生成します。
//!
//! 現在のスケールで中心の周囲にウェイポイントをサンプリングし、
//! 軌道 → フレーム → 姿勢検証を通過した最初の候補を採用します。
//! 試行回数を使い切るとスケールを縮小して再探索し、
//! 最小スケールを下回った時点で `SearchOutcome::NotFound` を返します。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{Frame, Route, Trajectory, Vector3, Waypoint, build_trajectory, compute_frames_with};
use crate::orientation::{self, ConstraintSet, ValidationResult};

/// 探索パラメータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// 探索中心
    pub center: Vector3,
    /// ウェイポイント数
    pub count: usize,
    /// 軌道サンプル数
    pub resolution: usize,
    pub initial_scale: f64,
    pub min_scale: f64,
    /// スケール縮小率（0 < r < 1）
    pub reduction_factor: f64,
    pub max_attempts_per_scale: usize,
    /// z 座標の許容範囲 [下限, 上限]
    pub z_band: [f64; 2],
    /// z 方向の散布をスケールに対して縮める比率
    pub vertical_ratio: f64,
    /// 共面化を崩すためのガウスノイズ標準偏差
    pub jitter_sigma: f64,
    /// 生成する経路本数（複数経路モード）
    pub routes: usize,
    pub up_hint: Vector3,
    /// 鉛直補正重み α
    pub correction_weight: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            center: Vector3::new(5.0, 5.0, 2.5),
            count: 4,
            resolution: 400,
            initial_scale: 2.5,
            min_scale: 0.8,
            reduction_factor: 0.9,
            max_attempts_per_scale: 300,
            z_band: [1.0, 6.0],
            vertical_ratio: 0.6,
            jitter_sigma: 0.1,
            routes: 1,
            up_hint: Vector3::UNIT_Z,
            correction_weight: crate::geometry::DEFAULT_CORRECTION_WEIGHT,
        }
    }
}

impl SearchParams {
    /// パラメータの妥当性チェック
    pub fn validate(&self) -> Result<(), String> {
        let scalars = [
            ("initial_scale", self.initial_scale),
            ("min_scale", self.min_scale),
            ("reduction_factor", self.reduction_factor),
            ("vertical_ratio", self.vertical_ratio),
            ("jitter_sigma", self.jitter_sigma),
            ("z_band[0]", self.z_band[0]),
            ("z_band[1]", self.z_band[1]),
            ("correction_weight", self.correction_weight),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("{} は有限値である必要があります: {}", name, value));
        }
        if !self.center.is_finite() || !self.up_hint.is_finite() {
            return Err(format!("探索中心と上方向は有限値である必要があります: {:?}, {:?}", self.center, self.up_hint));
        }
        if self.count < 2 {
            return Err(format!("ウェイポイント数は2以上である必要があります: {}", self.count));
        }
        if self.resolution < 2 {
            return Err(format!("解像度は2以上である必要があります: {}", self.resolution));
        }
        if !(self.min_scale > 0.0 && self.initial_scale >= self.min_scale) {
            return Err(format!(
                "スケール設定が不正です: initial={}, min={}",
                self.initial_scale, self.min_scale
            ));
        }
        if !(self.reduction_factor > 0.0 && self.reduction_factor < 1.0) {
            return Err(format!("縮小率は0から1の間である必要があります: {}", self.reduction_factor));
        }
        if self.max_attempts_per_scale == 0 {
            return Err("スケールあたりの試行回数は1以上である必要があります".to_string());
        }
        if self.z_band[0] > self.z_band[1] {
            return Err(format!("z範囲が不正です: {:?}", self.z_band));
        }
        if !(0.0..=1.0).contains(&self.correction_weight) {
            return Err(format!("補正重みは0から1の間である必要があります: {}", self.correction_weight));
        }
        Ok(())
    }
}

/// 採用された経路
#[derive(Debug, Clone)]
pub struct SynthesizedRoute {
    pub route: Route,
    pub trajectory: Trajectory,
    pub frames: Vec<Frame>,
    pub validation: ValidationResult,
    /// 採用までの総試行回数
    pub attempts: usize,
    /// 採用時のスケール
    pub scale: f64,
}

/// 最小スケールまで探索しても見つからなかった
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchExhausted {
    pub attempts: usize,
    /// 最後に試行したスケール
    pub final_scale: f64,
}

/// 探索結果
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found(SynthesizedRoute),
    NotFound(SearchExhausted),
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }

    pub fn found(self) -> Option<SynthesizedRoute> {
        match self {
            SearchOutcome::Found(route) => Some(route),
            SearchOutcome::NotFound(_) => None,
        }
    }
}

/// 制約付きランダム経路探索器
pub struct PathSynthesizer {
    params: SearchParams,
    constraints: ConstraintSet,
    rng: StdRng,
    jitter: Option<Normal<f64>>,
}

impl PathSynthesizer {
    pub fn new(params: SearchParams, constraints: ConstraintSet, seed: u64) -> Self {
        Self::with_rng(params, constraints, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(params: SearchParams, constraints: ConstraintSet, rng: StdRng) -> Self {
        let jitter = if params.jitter_sigma > 0.0 {
            Normal::new(0.0, params.jitter_sigma).ok()
        } else {
            None
        };
        Self { params, constraints, rng, jitter }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// 探索中心を差し替え（エージェントの初期位置周辺で経路を作る場合）
    pub fn set_center(&mut self, center: Vector3) {
        self.params.center = center;
    }

    /// 1本の経路を探索
    pub fn find_route(&mut self) -> SearchOutcome {
        let params = self.params.clone();
        let ladder_ok = params.reduction_factor > 0.0 && params.reduction_factor < 1.0 && params.min_scale > 0.0;
        if !ladder_ok {
            warn!(
                "縮小率 {} / 最小スケール {} では縮小探索ができません。初期スケールのみ探索します",
                params.reduction_factor, params.min_scale
            );
        }

        let mut scale = params.initial_scale;
        let mut last_scale = scale;
        let mut attempts = 0;
        let mut first_rung = true;

        // 初期スケールが最小スケール未満でも1段目は必ず試行する
        while first_rung || scale >= params.min_scale {
            first_rung = false;
            debug!("スケール {:.3} で探索中 (累計試行: {})", scale, attempts);
            last_scale = scale;

            for _ in 0..params.max_attempts_per_scale {
                attempts += 1;
                let waypoints = self.sample_waypoints(scale);

                let route = match Route::new(waypoints) {
                    Ok(route) => route,
                    Err(e) => {
                        debug!("退化した候補を棄却: {}", e);
                        continue;
                    }
                };

                if let Some(found) = self.evaluate(route, attempts, scale) {
                    info!("経路を発見: 試行 {} 回, スケール {:.3}", attempts, scale);
                    return SearchOutcome::Found(found);
                }
            }

            if !ladder_ok {
                break;
            }
            scale *= params.reduction_factor;
        }

        warn!("経路が見つかりません: 試行 {} 回, 最終スケール {:.3}", attempts, last_scale);
        SearchOutcome::NotFound(SearchExhausted {
            attempts,
            final_scale: last_scale,
        })
    }

    /// 互いに独立な経路を `n` 本探索
    pub fn find_routes(&mut self, n: usize) -> Vec<SearchOutcome> {
        (0..n)
            .map(|i| {
                debug!("経路 {}/{} を探索", i + 1, n);
                self.find_route()
            })
            .collect()
    }

    fn sample_waypoints(&mut self, scale: f64) -> Vec<Waypoint> {
        let c = self.params.center;
        let vertical = scale * self.params.vertical_ratio.max(0.0);
        let [z_lo, z_hi] = self.params.z_band;

        (0..self.params.count)
            .map(|_| {
                let mut p = Vector3::new(
                    c.x + self.rng.gen_range(-scale..=scale),
                    c.y + self.rng.gen_range(-scale..=scale),
                    c.z + self.rng.gen_range(-vertical..=vertical),
                );
                if let Some(normal) = &self.jitter {
                    p += Vector3::new(
                        normal.sample(&mut self.rng),
                        normal.sample(&mut self.rng),
                        normal.sample(&mut self.rng),
                    );
                }
                p.z = p.z.max(z_lo).min(z_hi);
                p
            })
            .collect()
    }

    fn evaluate(&self, route: Route, attempts: usize, scale: f64) -> Option<SynthesizedRoute> {
        let trajectory = match build_trajectory(&route, self.params.resolution) {
            Ok(t) => t,
            Err(e) => {
                debug!("軌道生成に失敗: {}", e);
                return None;
            }
        };
        let frames = compute_frames_with(&trajectory, self.params.up_hint, self.params.correction_weight);
        let series = orientation::absolute_angles_with_up(&frames, self.params.up_hint);
        let deltas = orientation::relative_deltas(&frames);
        let validation = orientation::validate(&series, &deltas, &self.constraints);

        validation.ok.then(|| SynthesizedRoute {
            route,
            trajectory,
            frames,
            validation,
            attempts,
            scale,
        })
    }
}
