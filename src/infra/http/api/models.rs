use serde::{Deserialize, Serialize};

use crate::domain::role::RoleTier;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub slug: &'static str,
    pub name: &'static str,
    pub stars: u8,
    pub rarity_label: &'static str,
    pub emblem: &'static str,
    pub primary_color: String,
    pub accent_color: String,
}

impl From<RoleTier> for RoleResponse {
    fn from(tier: RoleTier) -> Self {
        let style = tier.style();
        Self {
            slug: tier.slug(),
            name: tier.name(),
            stars: style.stars,
            rarity_label: style.rarity_label,
            emblem: style.emblem,
            primary_color: style.primary.to_hex(),
            accent_color: style.accent.to_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleListResponse {
    pub roles: Vec<RoleResponse>,
}
