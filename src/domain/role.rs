//! Role tiers printed on a card. The table is static, process-wide data.

use std::{fmt, str::FromStr};

use serde::Serialize;

use super::{color::Rgb, error::DomainError};

/// Highest star count a tier can carry.
pub const MAX_STARS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleTier {
    Initiate,
    Ascendant,
    Mage,
    Ritualist,
    RadiantRitualist,
    Forerunner,
}

/// Visual attributes of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStyle {
    pub stars: u8,
    pub rarity_label: &'static str,
    pub emblem: &'static str,
    pub primary: Rgb,
    pub accent: Rgb,
}

impl RoleTier {
    pub const ALL: [RoleTier; 6] = [
        RoleTier::Initiate,
        RoleTier::Ascendant,
        RoleTier::Mage,
        RoleTier::Ritualist,
        RoleTier::RadiantRitualist,
        RoleTier::Forerunner,
    ];

    pub fn style(self) -> TierStyle {
        match self {
            RoleTier::Initiate => TierStyle {
                stars: 1,
                rarity_label: "INITIATE",
                emblem: "\u{25B3}",
                primary: Rgb::new(0x3a, 0x3f, 0x4b),
                accent: Rgb::new(0x9a, 0xa4, 0xb5),
            },
            RoleTier::Ascendant => TierStyle {
                stars: 2,
                rarity_label: "ASCENDANT",
                emblem: "\u{25C7}",
                primary: Rgb::new(0x1d, 0x4e, 0x3f),
                accent: Rgb::new(0x4a, 0xde, 0x80),
            },
            RoleTier::Mage => TierStyle {
                stars: 3,
                rarity_label: "MAGE",
                emblem: "\u{2726}",
                primary: Rgb::new(0x1e, 0x3a, 0x8a),
                accent: Rgb::new(0x60, 0xa5, 0xfa),
            },
            RoleTier::Ritualist => TierStyle {
                stars: 4,
                rarity_label: "RITUALIST",
                emblem: "\u{2742}",
                primary: Rgb::new(0x4c, 0x1d, 0x95),
                accent: Rgb::new(0xc0, 0x84, 0xfc),
            },
            RoleTier::RadiantRitualist => TierStyle {
                stars: 5,
                rarity_label: "RADIANT RITUALIST",
                emblem: "\u{2600}",
                primary: Rgb::new(0x78, 0x35, 0x0f),
                accent: Rgb::new(0xfb, 0xbf, 0x24),
            },
            RoleTier::Forerunner => TierStyle {
                stars: 5,
                rarity_label: "FORERUNNER",
                emblem: "\u{2604}",
                primary: Rgb::new(0x7f, 0x1d, 0x1d),
                accent: Rgb::new(0xf8, 0x71, 0x71),
            },
        }
    }

    /// Human readable name shown in the role picker.
    pub fn name(self) -> &'static str {
        match self {
            RoleTier::Initiate => "Initiate",
            RoleTier::Ascendant => "Ascendant",
            RoleTier::Mage => "Mage",
            RoleTier::Ritualist => "Ritualist",
            RoleTier::RadiantRitualist => "Radiant Ritualist",
            RoleTier::Forerunner => "Forerunner",
        }
    }

    /// Stable identifier used in forms and query strings.
    pub fn slug(self) -> &'static str {
        match self {
            RoleTier::Initiate => "initiate",
            RoleTier::Ascendant => "ascendant",
            RoleTier::Mage => "mage",
            RoleTier::Ritualist => "ritualist",
            RoleTier::RadiantRitualist => "radiant-ritualist",
            RoleTier::Forerunner => "forerunner",
        }
    }

    /// Parse a form value; blank means nothing was selected.
    pub fn from_selection(raw: Option<&str>) -> Result<Self, DomainError> {
        match raw.map(str::trim) {
            None | Some("") => Err(DomainError::MissingRole),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for RoleTier {
    type Err = DomainError;

    /// Accepts the slug or the display name, case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        RoleTier::ALL
            .into_iter()
            .find(|tier| {
                tier.slug().eq_ignore_ascii_case(needle) || tier.name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| DomainError::unknown_role(needle))
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mage_has_three_stars() {
        let style = RoleTier::Mage.style();
        assert_eq!(style.stars, 3);
        assert_eq!(style.rarity_label, "MAGE");
    }

    #[test]
    fn every_tier_has_between_one_and_five_stars() {
        for tier in RoleTier::ALL {
            let stars = tier.style().stars;
            assert!((1..=MAX_STARS).contains(&stars), "{tier} has {stars}");
        }
    }

    #[test]
    fn parses_slug_and_name() {
        assert_eq!("mage".parse::<RoleTier>().unwrap(), RoleTier::Mage);
        assert_eq!("Mage".parse::<RoleTier>().unwrap(), RoleTier::Mage);
        assert_eq!(
            "radiant-ritualist".parse::<RoleTier>().unwrap(),
            RoleTier::RadiantRitualist
        );
        assert_eq!(
            "Radiant Ritualist".parse::<RoleTier>().unwrap(),
            RoleTier::RadiantRitualist
        );
    }

    #[test]
    fn blank_selection_is_missing_role() {
        assert_eq!(RoleTier::from_selection(None), Err(DomainError::MissingRole));
        assert_eq!(
            RoleTier::from_selection(Some("  ")),
            Err(DomainError::MissingRole)
        );
        assert_eq!(
            RoleTier::from_selection(Some("wizard")),
            Err(DomainError::unknown_role("wizard"))
        );
    }

    #[test]
    fn slugs_are_unique() {
        let mut slugs: Vec<_> = RoleTier::ALL.iter().map(|t| t.slug()).collect();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), RoleTier::ALL.len());
    }
}
