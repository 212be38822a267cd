use crate::error::PolicyEvaluationError;
use crate::models::{Action, Decision, DecisionContext, IDecisionPolicy, MissionPhase, Profile};

/// 回収ミッション用ポリシー
///
/// - 帰還段階、またはエネルギーが `min_energy` 以下なら帰還
/// - `near_threshold` 以内に未回収目標があれば最寄りを回収
/// - それ以外は探索移動
#[derive(Debug, Clone, Copy)]
pub struct CollectorPolicy {
    pub near_threshold: f64,
    pub min_energy: f64,
}

impl Default for CollectorPolicy {
    fn default() -> Self {
        Self {
            near_threshold: 10.0,
            min_energy: 20.0,
        }
    }
}

impl IDecisionPolicy for CollectorPolicy {
    fn name(&self) -> &'static str {
        "collector"
    }

    fn decide(&self, _profile: Profile, ctx: &DecisionContext<'_>) -> Result<Decision, PolicyEvaluationError> {
        if ctx.phase == MissionPhase::Returning {
            return Ok(Decision::new(Action::ReturnHome, 3, "帰還指示", ctx.tick).with_target(ctx.home));
        }
        if ctx.energy <= self.min_energy {
            return Ok(Decision::new(Action::ReturnHome, 3, "エネルギー不足のため帰還", ctx.tick).with_target(ctx.home));
        }

        let decision = match ctx.nearest_target() {
            Some(target) if ctx.distance_to(&target.position) <= self.near_threshold => {
                Decision::new(Action::Collect, 2, format!("目標 {} を回収", target.id), ctx.tick)
                    .with_target_id(target.id, target.position)
            }
            _ => Decision::new(Action::ExploreActive, 1, "近傍に目標なし、探索", ctx.tick),
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3;
    use crate::models::CollectTarget;
    use crate::models::decision::fixtures::context;

    fn target(id: u32, x: f64, y: f64) -> CollectTarget {
        CollectTarget {
            id,
            position: Vector3::new(x, y, 0.0),
            collected_by: None,
            collected_at: None,
        }
    }

    #[test]
    fn test_collects_nearest_available() {
        let mut taken = target(1, 2.0, 3.0);
        taken.collected_by = Some(9);
        let targets = [taken, target(2, 4.0, 4.0), target(3, 7.0, 7.0)];
        let ctx = context(&[], &targets);
        let d = CollectorPolicy::default().decide(Profile::Explorer, &ctx).unwrap();
        assert_eq!(d.action, Action::Collect);
        assert_eq!(d.target_id, Some(2));
    }

    #[test]
    fn test_far_targets_are_ignored() {
        let targets = [target(1, 7.0, 7.0)];
        let ctx = context(&[], &targets);
        let policy = CollectorPolicy {
            near_threshold: 3.0,
            ..CollectorPolicy::default()
        };
        assert_eq!(policy.decide(Profile::Explorer, &ctx).unwrap().action, Action::ExploreActive);
    }

    #[test]
    fn test_low_energy_and_return_phase_go_home() {
        let targets = [target(1, 2.0, 3.0)];
        let mut ctx = context(&[], &targets);
        ctx.energy = 15.0;
        assert_eq!(CollectorPolicy::default().decide(Profile::Guardian, &ctx).unwrap().action, Action::ReturnHome);

        ctx.energy = 90.0;
        ctx.phase = MissionPhase::Returning;
        let d = CollectorPolicy::default().decide(Profile::Guardian, &ctx).unwrap();
        assert_eq!(d.action, Action::ReturnHome);
        assert_eq!(d.target, Some(ctx.home));
    }
}
