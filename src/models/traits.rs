use crate::error::PolicyEvaluationError;
use crate::geometry::Vector3;
use crate::models::common::*;
use crate::models::decision::{Decision, DecisionContext};
use crate::models::environment::WorldBounds;

/// 全てのエージェントが実装する基本インターフェース
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> u32;

    /// 役割の取得
    fn get_profile(&self) -> Profile;

    /// 現在位置の取得
    fn get_position(&self) -> Vector3;

    /// 残りエネルギーの取得
    fn get_energy(&self) -> f64;

    /// 意思決定・行動が可能かどうか
    fn is_operational(&self) -> bool;
}

/// 意思決定ポリシーのインターフェース
///
/// 実装は役割とコンテキストのみの純粋関数であること。
/// 評価できない場合は `PolicyEvaluationError` を返し、呼び出し側がフォールバックする。
pub trait IDecisionPolicy {
    /// ポリシー名（ログ用）
    fn name(&self) -> &'static str;

    /// 行動の決定
    fn decide(&self, profile: Profile, context: &DecisionContext<'_>) -> Result<Decision, PolicyEvaluationError>;
}

/// 移動方式のインターフェース
pub trait IMovementModel {
    /// 移動距離に対するエネルギー消費（単位コスト倍率の適用前）
    fn consume(&self, distance: f64, position: &Vector3) -> f64;

    /// 移動方式に応じた位置の制限
    fn clamp(&self, position: Vector3, world: &WorldBounds) -> Vector3;
}
