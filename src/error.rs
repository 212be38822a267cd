//! # Error モジュール
//!
//! シミュレーションコア全体で使用するエラー型を定義します。
//!
//! - `DegenerateRouteError`: 幾何入力の不正（その呼び出しのみ失敗）
//! - `PolicyEvaluationError`: 意思決定ルール評価の失敗（フォールバックで回復）
//! - `ConfigError`: 設定ファイルの読み込み・検証エラー
//! - `ExportError`: CSV/JSON 出力の失敗（シミュレーションは継続）
//!
//! 経路探索の失敗はエラーではなく `synthesis::SearchOutcome::NotFound` として返します。

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Profile;

/// 経路（ウェイポイント列）が補間できない
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DegenerateRouteError {
    #[error("ウェイポイントが不足しています: {count}点 (2点以上必要)")]
    TooFewWaypoints { count: usize },

    #[error("連続するウェイポイント {index} と {next} が一致しています (接線が定義できません)", next = .index + 1)]
    CoincidentWaypoints { index: usize },

    #[error("解像度が小さすぎます: {resolution} (2以上必要)")]
    ResolutionTooSmall { resolution: usize },

    #[error("ウェイポイント {index} に有限でない座標が含まれています")]
    NonFiniteWaypoint { index: usize },
}

/// 意思決定ポリシーの評価失敗
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyEvaluationError {
    #[error("プロファイル {profile} 、脅威レベル {threat_level:.2} に一致するルールがありません")]
    NoMatchingRule { profile: Profile, threat_level: f64 },

    #[error("ポリシー {policy} はプロファイル {profile} に対応していません")]
    UnsupportedProfile { policy: &'static str, profile: Profile },

    #[error("不正なコンテキスト: {0}")]
    InvalidContext(String),
}

/// 設定ファイル読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ファイル読み込みエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML解析エラー {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("設定検証エラー: {0}")]
    Validation(String),
}

/// 出力（CSV/JSON）エラー
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("出力ファイル書き込みエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON変換エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// シミュレーション実行時のエラー
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Geometry(#[from] DegenerateRouteError),
}
