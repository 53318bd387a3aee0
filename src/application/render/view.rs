use std::f32::consts::{FRAC_PI_2, PI};

use crate::{
    domain::{
        profile::ProfileRecord,
        role::{MAX_STARS, RoleTier},
    },
    util::format::{compact_count, wrap_text},
};

pub const CARD_WIDTH: u32 = 600;
pub const CARD_HEIGHT: u32 = 840;

const BIO_LINE_WIDTH: usize = 38;
const BIO_MAX_LINES: usize = 4;
const BIO_TOP: u32 = 600;
const BIO_LINE_HEIGHT: u32 = 28;

const STAR_ROW_Y: f32 = 500.0;
const STAR_SPACING: f32 = 44.0;
const STAR_OUTER_RADIUS: f32 = 17.0;
const STAR_INNER_RATIO: f32 = 0.42;

#[derive(Debug, Clone, PartialEq)]
pub struct StarView {
    pub points: String,
    pub filled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BioLineView {
    pub text: String,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatView {
    pub label: &'static str,
    pub value: String,
    pub x: u32,
}

/// Everything the card template prints, bound from a profile and a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub handle_label: String,
    pub display_name: String,
    pub initial: String,
    /// Image reference for the avatar. A relay path until the image barrier
    /// swaps in a `data:` URI, or `None` for the placeholder.
    pub avatar_src: Option<String>,
    pub bio_lines: Vec<BioLineView>,
    pub stats: Vec<StatView>,
    pub role_name: &'static str,
    pub rarity_label: &'static str,
    pub emblem: &'static str,
    pub star_count: u8,
    pub stars: Vec<StarView>,
    pub primary: String,
    pub accent: String,
}

impl CardView {
    pub fn bind(profile: &ProfileRecord, role: RoleTier) -> Self {
        let style = role.style();

        let bio_lines = wrap_text(&profile.bio, BIO_LINE_WIDTH, BIO_MAX_LINES)
            .into_iter()
            .zip(0u32..)
            .map(|(text, index)| BioLineView {
                text,
                y: BIO_TOP + index * BIO_LINE_HEIGHT,
            })
            .collect();

        let counts = [
            ("FOLLOWERS", profile.follower_count),
            ("FOLLOWING", profile.following_count),
            ("POSTS", profile.post_count),
        ];
        let present: Vec<_> = counts
            .into_iter()
            .filter_map(|(label, count)| count.map(|value| (label, value)))
            .collect();
        let slots = present.len() as u32 + 1;
        let stats = present
            .into_iter()
            .zip(1u32..)
            .map(|((label, value), slot)| StatView {
                label,
                value: compact_count(value),
                x: CARD_WIDTH * slot / slots,
            })
            .collect();

        let stars = (0..MAX_STARS)
            .map(|index| {
                let offset = f32::from(index) - f32::from(MAX_STARS - 1) / 2.0;
                StarView {
                    points: star_points(
                        CARD_WIDTH as f32 / 2.0 + offset * STAR_SPACING,
                        STAR_ROW_Y,
                    ),
                    filled: index < style.stars,
                }
            })
            .collect();

        Self {
            handle_label: format!("@{}", profile.handle),
            display_name: profile.display_name.clone(),
            initial: profile.handle.initial(),
            avatar_src: profile.avatar_url.clone(),
            bio_lines,
            stats,
            role_name: role.name(),
            rarity_label: style.rarity_label,
            emblem: style.emblem,
            star_count: style.stars,
            stars,
            primary: style.primary.to_hex(),
            accent: style.accent.to_hex(),
        }
    }

    /// Every external image reference the card embeds, in document order.
    pub fn image_sources(&self) -> impl Iterator<Item = &str> {
        self.avatar_src.as_deref().into_iter()
    }

    pub fn filled_stars(&self) -> usize {
        self.stars.iter().filter(|star| star.filled).count()
    }
}

fn star_points(cx: f32, cy: f32) -> String {
    let inner = STAR_OUTER_RADIUS * STAR_INNER_RATIO;
    (0..10)
        .map(|vertex| {
            let radius = if vertex % 2 == 0 {
                STAR_OUTER_RADIUS
            } else {
                inner
            };
            let angle = PI / 5.0 * vertex as f32 - FRAC_PI_2;
            format!(
                "{:.1},{:.1}",
                cx + radius * angle.cos(),
                cy + radius * angle.sin()
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}
