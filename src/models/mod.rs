// 基本的な列挙型（役割・行動・状態）
pub mod common;

// エージェントの基本インターフェース（trait）定義
pub mod traits;

// 意思決定の値オブジェクトとコンテキスト
pub mod decision;

// 共有環境（脅威・回収目標）
pub mod environment;

// 移動方式
pub mod movement;

// エージェント本体
pub mod agent;

// 便利な re-export
pub use agent::{Agent, AgentSpec, AgentStats, EnergySettings};
pub use common::*;
pub use decision::{Decision, DecisionContext, MissionPhase, PeerSnapshot};
pub use environment::{
    CollectTarget, Environment, TargetSettings, TargetSpec, Threat, ThreatSettings, WorldBounds, mode_distance,
};
pub use movement::Locomotion;
pub use traits::*;
