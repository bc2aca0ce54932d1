// Player identity, roles, and rank-to-Elo conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type PlayerId = u32;
pub type TeamId = u32;

/// The five positions a team roster needs to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Top,
    Jungle,
    Mid,
    Adc,
    Support,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Adc, Role::Support];

    /// Parse a role from its lowercase wire/CSV form.
    pub fn from_str_role(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "top" => Some(Role::Top),
            "jungle" | "jg" => Some(Role::Jungle),
            "mid" => Some(Role::Mid),
            "adc" | "bot" => Some(Role::Adc),
            "support" | "sup" => Some(Role::Support),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Role::Top => "top",
            Role::Jungle => "jungle",
            Role::Mid => "mid",
            Role::Adc => "adc",
            Role::Support => "support",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Ranked ladder tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankTier {
    Challenger,
    Grandmaster,
    Master,
    Diamond,
    Emerald,
    Platinum,
    Gold,
    Silver,
    Bronze,
    Iron,
    Unranked,
}

impl RankTier {
    /// Base Elo points for the tier, before the division adjustment.
    pub fn base_points(&self) -> u32 {
        match self {
            RankTier::Challenger => 100,
            RankTier::Grandmaster => 90,
            RankTier::Master => 80,
            RankTier::Diamond => 70,
            RankTier::Emerald => 60,
            RankTier::Platinum => 50,
            RankTier::Gold => 40,
            RankTier::Silver => 30,
            RankTier::Bronze => 20,
            RankTier::Iron => 10,
            RankTier::Unranked => 0,
        }
    }

    /// Apex tiers have no fixed divisions; their "division" is a ladder
    /// position that adds on top of the Challenger baseline.
    pub fn is_apex(&self) -> bool {
        matches!(
            self,
            RankTier::Challenger | RankTier::Grandmaster | RankTier::Master
        )
    }

    pub fn from_str_tier(s: &str) -> Option<RankTier> {
        match s.trim().to_lowercase().as_str() {
            "challenger" => Some(RankTier::Challenger),
            "grandmaster" | "grandmasters" => Some(RankTier::Grandmaster),
            "master" | "masters" => Some(RankTier::Master),
            "diamond" => Some(RankTier::Diamond),
            "emerald" => Some(RankTier::Emerald),
            "platinum" => Some(RankTier::Platinum),
            "gold" => Some(RankTier::Gold),
            "silver" => Some(RankTier::Silver),
            "bronze" => Some(RankTier::Bronze),
            "iron" => Some(RankTier::Iron),
            "unranked" | "" => Some(RankTier::Unranked),
            _ => None,
        }
    }
}

/// A tier plus division, e.g. Diamond 2. Division 1 is the strongest
/// within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub tier: RankTier,
    pub division: u32,
}

impl Rank {
    pub const UNRANKED: Rank = Rank {
        tier: RankTier::Unranked,
        division: 0,
    };

    pub fn new(tier: RankTier, division: u32) -> Rank {
        Rank { tier, division }
    }

    /// Convert to a comparable Elo score. Apex tiers score
    /// 100 + division (the division is a ladder position there);
    /// everything else scores base + (10 - division), so Diamond 1
    /// outranks Diamond 4. Unranked is 0 regardless of division.
    pub fn elo(&self) -> u32 {
        if self.tier == RankTier::Unranked {
            return 0;
        }
        if self.tier.is_apex() {
            return 100 + self.division;
        }
        self.tier.base_points() + 10u32.saturating_sub(self.division)
    }
}

/// A participant in the draft pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub secondary_roles: Vec<Role>,
    #[serde(default)]
    pub is_captain: bool,
    /// Set once the player is rostered onto a team; `None` while in the
    /// available pool.
    #[serde(default)]
    pub team_id: Option<TeamId>,
    pub peak_rank: Rank,
    pub solo_rank: Rank,
    pub flex_rank: Rank,
}

impl Player {
    /// The player's strength: the best of their peak, solo-queue, and
    /// flex-queue ranks.
    pub fn elo(&self) -> u32 {
        self.peak_rank
            .elo()
            .max(self.solo_rank.elo())
            .max(self.flex_rank.elo())
    }

    /// True if the player can fill the role with their primary or any
    /// secondary role.
    pub fn plays_role(&self, role: Role) -> bool {
        self.role == role || self.secondary_roles.contains(&role)
    }
}
