use serde::{Deserialize, Serialize};
use std::fmt;

/// エージェントの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// 防衛役（慎重に巡回し、脅威が強ければ支援要請）
    Guardian,
    /// 探索役（積極的に脅威へ接近）
    Explorer,
    /// 支援役（中央で待機し、脅威の近くへ移動）
    Support,
    /// 観測役（計画経路を巡航）
    Observer,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Guardian => "guardian",
            Profile::Explorer => "explorer",
            Profile::Support => "support",
            Profile::Observer => "observer",
        }
    }

    /// 表示用のデフォルト色
    pub fn default_color(&self) -> &'static str {
        match self {
            Profile::Guardian => "blue",
            Profile::Explorer => "red",
            Profile::Support => "green",
            Profile::Observer => "orange",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 意思決定の結果として選ばれる行動
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Wait,
    Patrol,
    PatrolConservative,
    InvestigateCautious,
    RequestHelp,
    ExploreActive,
    ApproachThreat,
    EngageDirect,
    MoveSupport,
    WaitCentral,
    FollowRoute,
    Collect,
    ReturnHome,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Wait => "wait",
            Action::Patrol => "patrol",
            Action::PatrolConservative => "patrol_conservative",
            Action::InvestigateCautious => "investigate_cautious",
            Action::RequestHelp => "request_help",
            Action::ExploreActive => "explore_active",
            Action::ApproachThreat => "approach_threat",
            Action::EngageDirect => "engage_direct",
            Action::MoveSupport => "move_support",
            Action::WaitCentral => "wait_central",
            Action::FollowRoute => "follow_route",
            Action::Collect => "collect",
            Action::ReturnHome => "return_home",
        }
    }

    /// 決定の target（目標位置）に向かって移動する行動か
    pub fn is_targeted(&self) -> bool {
        matches!(
            self,
            Action::ApproachThreat | Action::EngageDirect | Action::MoveSupport | Action::Collect | Action::ReturnHome
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// エージェントの稼働状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Operational, // 稼働中
    Depleted,    // エネルギー枯渇（回復すれば復帰）
    Disabled,    // 設定で無効化
}

/// シミュレーションの移動規律
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// 整数グリッド上の移動。境界でクランプし、距離はマンハッタン距離
    #[default]
    Grid,
    /// 連続空間の移動。境界で周期的に折り返し、距離はユークリッド距離
    Continuous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_serde_names() {
        let p: Profile = serde_yaml::from_str("explorer").unwrap();
        assert_eq!(p, Profile::Explorer);
        assert_eq!(p.to_string(), "explorer");
    }

    #[test]
    fn test_action_names_match_serde() {
        for action in [Action::PatrolConservative, Action::RequestHelp, Action::FollowRoute] {
            let yaml = serde_yaml::to_string(&action).unwrap();
            assert_eq!(yaml.trim(), action.as_str());
        }
    }
}
