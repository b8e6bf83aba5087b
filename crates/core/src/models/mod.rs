//! Shared domain models.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default top of the rating scale.
pub const DEFAULT_RATING_TOP: f64 = 5.0;

/// Platform a game was released on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform identifier assigned by the catalog.
    pub id: i64,
    /// URL-safe platform name.
    pub slug: String,
    /// Display name.
    pub name: String,
}

/// Canonical game record, produced by validation or by the creation form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Identity key within a source.
    pub id: i64,
    /// URL-safe derived name.
    pub slug: String,
    /// Display name, never empty.
    pub name: String,
    /// Release date, usually `YYYY-MM-DD`.
    pub released: String,
    /// Cover image URI, possibly empty.
    pub background_image: String,
    /// Rating on a `0..=rating_top` scale.
    pub rating: f64,
    /// Maximum of the rating scale.
    pub rating_top: f64,
    /// Short personal note attached to a collected game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Platforms in display order.
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

impl Game {
    /// Returns a user-facing label combining name and release year.
    pub fn display_name(&self) -> String {
        match self.released.get(..4) {
            Some(year) if year.chars().all(|c| c.is_ascii_digit()) => {
                format!("{} ({})", self.name, year)
            }
            _ => self.name.clone(),
        }
    }

    /// Comma separated platform names.
    pub fn platform_names(&self) -> String {
        self.platforms
            .iter()
            .map(|platform| platform.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Apply a partial update, leaving the identity untouched.
    pub fn apply_patch(&mut self, patch: GamePatch) {
        if let Some(slug) = patch.slug {
            self.slug = slug;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(released) = patch.released {
            self.released = released;
        }
        if let Some(background_image) = patch.background_image {
            self.background_image = background_image;
        }
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
        if let Some(rating_top) = patch.rating_top {
            self.rating_top = rating_top;
        }
        if let Some(comment) = patch.comment {
            self.comment = comment;
        }
        if let Some(platforms) = patch.platforms {
            self.platforms = platforms;
        }
    }
}

/// Partial game used by local updates. `None` leaves a field unchanged.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamePatch {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub released: Option<String>,
    pub background_image: Option<String>,
    pub rating: Option<f64>,
    pub rating_top: Option<f64>,
    /// `Some(None)` clears the comment.
    pub comment: Option<Option<String>>,
    pub platforms: Option<Vec<Platform>>,
}

impl GamePatch {
    /// Patch that rewrites every editable field from `game`.
    pub fn from_game(game: &Game) -> Self {
        Self {
            slug: Some(game.slug.clone()),
            name: Some(game.name.clone()),
            released: Some(game.released.clone()),
            background_image: Some(game.background_image.clone()),
            rating: Some(game.rating),
            rating_top: Some(game.rating_top),
            comment: Some(game.comment.clone()),
            platforms: Some(game.platforms.clone()),
        }
    }
}

/// Where a page of games comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// External catalog service.
    Remote,
    /// Personal collection in the local REST store.
    Local,
}

impl Source {
    /// The other source, used by tab switching.
    pub fn toggle(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }

    /// Tab label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Remote => "All games",
            Self::Local => "My games",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Scope of pagination and replacement: one source plus one search term.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    pub source: Source,
    pub search: String,
}

impl Context {
    /// Build a context from a source and a search term.
    pub fn new(source: Source, search: impl Into<String>) -> Self {
        Self {
            source,
            search: search.into(),
        }
    }
}

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Derive a slug by lowercasing and replacing whitespace runs with `-`.
pub fn slugify(name: &str) -> String {
    WHITESPACE_RE
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Game {
        Game {
            id: 3498,
            slug: "grand-theft-auto-v".to_string(),
            name: "Grand Theft Auto V".to_string(),
            released: "2013-09-17".to_string(),
            background_image: String::new(),
            rating: 4.47,
            rating_top: 5.0,
            comment: None,
            platforms: vec![Platform {
                id: 4,
                slug: "pc".to_string(),
                name: "PC".to_string(),
            }],
        }
    }

    #[test]
    fn display_name_includes_year_when_present() {
        let mut game = sample();
        assert_eq!(game.display_name(), "Grand Theft Auto V (2013)");
        game.released = "TBA".to_string();
        assert_eq!(game.display_name(), "Grand Theft Auto V");
    }

    #[test]
    fn patch_keeps_identity_and_untouched_fields() {
        let mut game = sample();
        game.apply_patch(GamePatch {
            rating: Some(3.0),
            comment: Some(Some("replaying".to_string())),
            ..GamePatch::default()
        });
        assert_eq!(game.id, 3498);
        assert_eq!(game.rating, 3.0);
        assert_eq!(game.comment.as_deref(), Some("replaying"));
        assert_eq!(game.name, "Grand Theft Auto V");

        game.apply_patch(GamePatch {
            comment: Some(None),
            ..GamePatch::default()
        });
        assert_eq!(game.comment, None);
    }

    #[test]
    fn slugify_collapses_whitespace() {
        assert_eq!(slugify("  The Witcher  3 "), "the-witcher-3");
        assert_eq!(slugify("Portal"), "portal");
    }
}
