use core::str::FromStr;

use serde::{Deserialize, Serialize};

use keyward_core::DomainError;

use crate::Tier;

/// A gated product feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    UnlimitedConversations,
    CheckIns,
    Goals,
    Reflections,
    Memories,
    Inspiration,
    Handreikingen,
    Personalization,
}

const EXTENDED: &[Feature] = &[
    Feature::UnlimitedConversations,
    Feature::CheckIns,
    Feature::Goals,
    Feature::Reflections,
];

impl Feature {
    /// Every gated feature.
    pub const ALL: [Feature; 8] = [
        Feature::UnlimitedConversations,
        Feature::CheckIns,
        Feature::Goals,
        Feature::Reflections,
        Feature::Memories,
        Feature::Inspiration,
        Feature::Handreikingen,
        Feature::Personalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::UnlimitedConversations => "unlimited_conversations",
            Feature::CheckIns => "check_ins",
            Feature::Goals => "goals",
            Feature::Reflections => "reflections",
            Feature::Memories => "memories",
            Feature::Inspiration => "inspiration",
            Feature::Handreikingen => "handreikingen",
            Feature::Personalization => "personalization",
        }
    }

    /// Static feature table. Trial grants everything, like `AllInOne`; whether a trial
    /// is still running is the resolver's concern.
    pub fn granted_by(tier: Tier) -> &'static [Feature] {
        match tier {
            Tier::Free => &[],
            Tier::Extended => EXTENDED,
            Tier::Trial | Tier::AllInOne => &Feature::ALL,
        }
    }
}

impl core::fmt::Display for Feature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown feature '{}'", s.trim())))
    }
}
