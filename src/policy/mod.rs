//! # Policy モジュール
//!
//! 意思決定ポリシーの実装。いずれも `IDecisionPolicy` を実装し、設定で差し替えられます。
//!
//! - `RuleTablePolicy`: 役割 × 脅威帯の宣言的ルールテーブル
//! - `HeuristicPolicy`: 役割別の簡易ヒューリスティック（フォールバック）
//! - `CollectorPolicy`: 回収ミッション用

pub mod collector;
pub mod heuristic;
pub mod rule_table;

pub use collector::CollectorPolicy;
pub use heuristic::HeuristicPolicy;
pub use rule_table::{Rule, RuleTablePolicy};

use serde::{Deserialize, Serialize};

use crate::models::IDecisionPolicy;

/// ポリシーの種類（設定値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    RuleTable,
    Collector,
    Heuristic,
}

/// 設定からポリシーを構築
///
/// `rules` が空の場合、ルールテーブルは標準ルールセットを使用します。
pub fn build_policy(kind: PolicyKind, rules: &[Rule], near_threshold: f64, low_energy: f64) -> Box<dyn IDecisionPolicy> {
    match kind {
        PolicyKind::RuleTable if rules.is_empty() => Box::new(RuleTablePolicy::default()),
        PolicyKind::RuleTable => Box::new(RuleTablePolicy::new(rules.to_vec())),
        PolicyKind::Collector => Box::new(CollectorPolicy {
            near_threshold,
            min_energy: low_energy,
        }),
        PolicyKind::Heuristic => Box::new(HeuristicPolicy),
    }
}
