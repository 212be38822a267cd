use crate::error::PolicyEvaluationError;
use crate::models::{Action, Decision, DecisionContext, IDecisionPolicy, Profile};

/// 支援役が反応する脅威までの距離
const SUPPORT_REACTION_RADIUS: f64 = 4.0;

/// 役割別の簡易ヒューリスティック
///
/// ルール評価に失敗した場合のフォールバックとしても使用し、常に決定を返します。
///
/// | 役割 | 条件 | 行動 |
/// |------|------|------|
/// | guardian | 脅威 ≥ 0.6 / ≥ 0.3 / それ以外 | request_help / investigate_cautious / patrol_conservative |
/// | explorer | 脅威 ≥ 0.5 / ≥ 0.2 / それ以外 | engage_direct / approach_threat / explore_active |
/// | support | 距離4以内に強度 > 0.4 の脅威、支援要請中の仲間 | move_support、なければ中央へ寄って wait_central |
/// | observer | 経路あり | follow_route、なければ patrol |
///
/// 脅威帯の境界値は上位の帯に含めます（ルールテーブルの優先度解決と同じ結果）。
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl HeuristicPolicy {
    pub fn decide_for(&self, profile: Profile, ctx: &DecisionContext<'_>) -> Decision {
        let level = ctx.local_threat_level;
        let tick = ctx.tick;

        match profile {
            Profile::Guardian => {
                if level >= 0.6 {
                    Decision::new(Action::RequestHelp, 3, "高脅威のため支援要請", tick)
                } else if level >= 0.3 {
                    Decision::new(Action::InvestigateCautious, 2, "中程度の脅威を慎重に調査", tick)
                } else {
                    Decision::new(Action::PatrolConservative, 1, "低脅威のため保守的に巡回", tick)
                }
            }
            Profile::Explorer => {
                let nearest = ctx.nearest_threat(0.3).map(|t| t.position);
                let decision = if level >= 0.5 {
                    Decision::new(Action::EngageDirect, 3, "高脅威に直接対処", tick)
                } else if level >= 0.2 {
                    Decision::new(Action::ApproachThreat, 2, "脅威へ接近", tick)
                } else {
                    return Decision::new(Action::ExploreActive, 1, "脅威なし、積極的に探索", tick);
                };
                match nearest {
                    Some(target) => decision.with_target(target),
                    None => decision,
                }
            }
            Profile::Support => {
                if let Some(threat) = ctx.threat_within(SUPPORT_REACTION_RADIUS, 0.4) {
                    return Decision::new(Action::MoveSupport, 2, "近傍の脅威へ支援移動", tick).with_target(threat.position);
                }
                if let Some(peer) = ctx.peer_needing_help() {
                    return Decision::new(Action::MoveSupport, 2, format!("エージェント {} の支援へ移動", peer.id), tick)
                        .with_target(peer.position);
                }
                if ctx.distance_to(&ctx.center) > SUPPORT_REACTION_RADIUS {
                    Decision::new(Action::MoveSupport, 1, "待機位置の中央へ移動", tick).with_target(ctx.center)
                } else {
                    Decision::new(Action::WaitCentral, 1, "中央で待機", tick)
                }
            }
            Profile::Observer => {
                if ctx.has_route {
                    Decision::new(Action::FollowRoute, 1, "計画経路を巡航", tick)
                } else {
                    Decision::new(Action::Patrol, 0, "経路未計画のため巡回", tick)
                }
            }
        }
    }
}

impl IDecisionPolicy for HeuristicPolicy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn decide(&self, profile: Profile, context: &DecisionContext<'_>) -> Result<Decision, PolicyEvaluationError> {
        Ok(self.decide_for(profile, context))
    }
}
