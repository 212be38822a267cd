use serde::{Deserialize, Serialize};

use crate::error::PolicyEvaluationError;
use crate::models::{Action, Decision, DecisionContext, IDecisionPolicy, Profile};

/// 宣言的ルール（役割 × 脅威帯 → 行動）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub profile: Profile,
    /// 脅威帯の下限（この値を含む）
    #[serde(default)]
    pub min_threat: f64,
    /// 脅威帯の上限（この値を含む）
    #[serde(default = "default_max_threat")]
    pub max_threat: f64,
    /// 適用に必要な最低エネルギー
    #[serde(default)]
    pub min_energy: f64,
    pub action: Action,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rationale: String,
}

fn default_max_threat() -> f64 {
    1.0
}

impl Rule {
    fn matches(&self, profile: Profile, threat: f64, energy: f64) -> bool {
        self.profile == profile && self.min_threat <= threat && threat <= self.max_threat && energy >= self.min_energy
    }
}

/// ルールテーブル方式の意思決定
///
/// ルールは優先度の降順で評価し、最初に一致したものを採用します（同順位は定義順）。
/// 全ルールは共有の不変データで、エージェントごとの状態はコンテキストで渡します。
#[derive(Debug, Clone)]
pub struct RuleTablePolicy {
    rules: Vec<Rule>,
}

impl RuleTablePolicy {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        // 安定ソートなので同順位は定義順を保つ
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 巡回シミュレーションの標準ルールセット
    pub fn default_rules() -> Vec<Rule> {
        let rule = |profile, min_threat, max_threat, action, priority, rationale: &str| Rule {
            profile,
            min_threat,
            max_threat,
            min_energy: 0.0,
            action,
            priority,
            rationale: rationale.to_string(),
        };
        vec![
            rule(Profile::Guardian, 0.6, 1.0, Action::RequestHelp, 3, "high threat: request help"),
            rule(Profile::Guardian, 0.3, 0.6, Action::InvestigateCautious, 2, "medium threat: investigate"),
            rule(Profile::Guardian, 0.0, 0.3, Action::PatrolConservative, 1, "low threat: patrol"),
            rule(Profile::Explorer, 0.5, 1.0, Action::EngageDirect, 3, "high threat: engage"),
            rule(Profile::Explorer, 0.2, 0.5, Action::ApproachThreat, 2, "threat sighted: approach"),
            rule(Profile::Explorer, 0.0, 0.2, Action::ExploreActive, 1, "clear: explore"),
            rule(Profile::Support, 0.4, 1.0, Action::MoveSupport, 2, "threat nearby: support"),
            rule(Profile::Support, 0.0, 0.4, Action::WaitCentral, 1, "standby at center"),
            rule(Profile::Observer, 0.0, 1.0, Action::FollowRoute, 1, "follow planned route"),
        ]
    }
}

impl Default for RuleTablePolicy {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl IDecisionPolicy for RuleTablePolicy {
    fn name(&self) -> &'static str {
        "rule_table"
    }

    fn decide(&self, profile: Profile, ctx: &DecisionContext<'_>) -> Result<Decision, PolicyEvaluationError> {
        let threat = ctx.local_threat_level;
        if !threat.is_finite() {
            return Err(PolicyEvaluationError::InvalidContext(format!("脅威レベルが有限ではありません: {}", threat)));
        }

        let rule = self
            .rules
            .iter()
            .find(|r| r.matches(profile, threat, ctx.energy))
            .ok_or(PolicyEvaluationError::NoMatchingRule { profile, threat_level: threat })?;

        let decision = Decision::new(rule.action, rule.priority, rule.rationale.clone(), ctx.tick);
        let decision = match rule.action {
            Action::ApproachThreat | Action::EngageDirect => {
                match ctx.nearest_threat(0.3).or_else(|| ctx.nearest_threat(0.0)) {
                    Some(t) => decision.with_target(t.position),
                    None => decision,
                }
            }
            // 脅威がなければ支援を必要とする仲間へ向かう
            Action::MoveSupport => {
                let target = ctx
                    .nearest_threat(0.3)
                    .map(|t| t.position)
                    .or_else(|| ctx.peer_needing_help().map(|p| p.position));
                match target {
                    Some(position) => decision.with_target(position),
                    None => decision,
                }
            }
            Action::ReturnHome => decision.with_target(ctx.home),
            Action::Collect => match ctx.nearest_target() {
                Some(t) => decision.with_target_id(t.id, t.position),
                None => {
                    return Err(PolicyEvaluationError::InvalidContext("回収可能な目標がありません".to_string()));
                }
            },
            _ => decision,
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decision::fixtures::{context, peer, threat};

    #[test]
    fn test_priority_order_wins_on_overlap() {
        let policy = RuleTablePolicy::default();
        let mut ctx = context(&[], &[]);
        ctx.local_threat_level = 0.6;
        // 0.6 は request_help と investigate の両方に含まれ、優先度の高い方を採用
        let d = policy.decide(Profile::Guardian, &ctx).unwrap();
        assert_eq!(d.action, Action::RequestHelp);
        assert_eq!(d.priority, 3);
    }

    #[test]
    fn test_missing_rule_is_an_error() {
        let policy = RuleTablePolicy::new(vec![Rule {
            profile: Profile::Explorer,
            min_threat: 0.0,
            max_threat: 1.0,
            min_energy: 0.0,
            action: Action::ExploreActive,
            priority: 1,
            rationale: String::new(),
        }]);
        let ctx = context(&[], &[]);
        assert!(matches!(
            policy.decide(Profile::Guardian, &ctx),
            Err(PolicyEvaluationError::NoMatchingRule { profile: Profile::Guardian, .. })
        ));
    }

    #[test]
    fn test_min_energy_gates_rule() {
        let policy = RuleTablePolicy::new(vec![
            Rule {
                profile: Profile::Explorer,
                min_threat: 0.0,
                max_threat: 1.0,
                min_energy: 50.0,
                action: Action::ExploreActive,
                priority: 2,
                rationale: "enough energy".to_string(),
            },
            Rule {
                profile: Profile::Explorer,
                min_threat: 0.0,
                max_threat: 1.0,
                min_energy: 0.0,
                action: Action::ReturnHome,
                priority: 1,
                rationale: "low energy".to_string(),
            },
        ]);
        let mut ctx = context(&[], &[]);
        ctx.energy = 30.0;
        let d = policy.decide(Profile::Explorer, &ctx).unwrap();
        assert_eq!(d.action, Action::ReturnHome);
        assert_eq!(d.target, Some(ctx.home));
    }

    #[test]
    fn test_engage_targets_threat() {
        let threats = [threat(5.0, 2.0, 0.8)];
        let mut ctx = context(&threats, &[]);
        ctx.local_threat_level = 0.8;
        let d = RuleTablePolicy::default().decide(Profile::Explorer, &ctx).unwrap();
        assert_eq!(d.action, Action::EngageDirect);
        assert_eq!(d.target, Some(threats[0].position));
    }

    #[test]
    fn test_band_edges_pick_higher_band() {
        let policy = RuleTablePolicy::default();
        let mut ctx = context(&[], &[]);
        ctx.local_threat_level = 0.3;
        assert_eq!(policy.decide(Profile::Guardian, &ctx).unwrap().action, Action::InvestigateCautious);
        ctx.local_threat_level = 0.2;
        assert_eq!(policy.decide(Profile::Explorer, &ctx).unwrap().action, Action::ApproachThreat);
    }

    #[test]
    fn test_move_support_falls_back_to_peer() {
        let peers = [peer(4, 6.0, 5.0, true)];
        let mut ctx = context(&[], &[]);
        ctx.peers = &peers;
        ctx.local_threat_level = 0.5;
        let d = RuleTablePolicy::default().decide(Profile::Support, &ctx).unwrap();
        assert_eq!(d.action, Action::MoveSupport);
        assert_eq!(d.target, Some(peers[0].position));
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let yaml = "- profile: support\n  action: wait_central\n";
        let rules: Vec<Rule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules[0].max_threat, 1.0);
        assert_eq!(rules[0].priority, 0);
    }
}
