//! # swarmsim
//!
//! 自律エージェント群の巡回シミュレーションと、3次元軌道の姿勢制約検証を行うライブラリです。
//!
//! - `geometry` / `orientation` / `synthesis`: 軌道補間・移動座標系・姿勢検証・経路探索
//! - `models` / `policy`: エージェント・環境・意思決定ポリシー
//! - `simulation` / `metrics`: 離散ステップのシミュレーションと群指標
//! - `config` / `export` / `logging`: 設定ファイル・CSV/JSON 出力・ログ

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orientation;
pub mod policy;
pub mod simulation;
pub mod synthesis;
