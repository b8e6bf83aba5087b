//! Boundary validation of raw records and of the creation/edit form.

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    error::ValidationFailure,
    models::{slugify, Game, Platform, DEFAULT_RATING_TOP},
};

/// Longest comment accepted, in characters.
pub const MAX_COMMENT_LEN: usize = 40;
/// Lowest rating accepted by the form.
pub const MIN_RATING: f64 = 0.0;
/// Highest rating accepted by the form.
pub const MAX_RATING: f64 = 5.0;

/// Valid games of one page plus the failures that were dropped.
#[derive(Debug, Clone, Default)]
pub struct ValidatedPage {
    /// Records that passed validation, in incoming order.
    pub games: Vec<Game>,
    /// Records that were dropped.
    pub rejected: Vec<ValidationFailure>,
}

/// Validate every record of a page.
///
/// A malformed record is logged and dropped; it never fails the whole page.
pub fn validate_page(records: Vec<Value>) -> ValidatedPage {
    let mut page = ValidatedPage::default();
    for record in &records {
        match validate_record(record) {
            Ok(game) => page.games.push(game),
            Err(failure) => {
                warn!(%failure, "dropping invalid record");
                page.rejected.push(failure);
            }
        }
    }
    page
}

/// Turn a raw record into a [`Game`].
pub fn validate_record(raw: &Value) -> Result<Game, ValidationFailure> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationFailure::new(None, "record", "must be an object"))?;

    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ValidationFailure::new(None, "id", "must be an integer"))?;
    let fields = Fields { object, id };

    let name = fields.string("name")?;
    if name.trim().is_empty() {
        return Err(ValidationFailure::new(Some(id), "name", "must not be empty"));
    }

    let comment = match object.get("comment") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.chars().count() <= MAX_COMMENT_LEN => {
            Some(text.clone())
        }
        Some(Value::String(_)) => {
            return Err(ValidationFailure::new(
                Some(id),
                "comment",
                format!("must be at most {MAX_COMMENT_LEN} characters"),
            ))
        }
        Some(_) => {
            return Err(ValidationFailure::new(Some(id), "comment", "must be a string"))
        }
    };

    let platforms = object
        .get("platforms")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationFailure::new(Some(id), "platforms", "must be a list"))?
        .iter()
        .enumerate()
        .map(|(index, value)| validate_platform(id, index, value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Game {
        id,
        slug: fields.string("slug")?,
        name,
        released: fields.string("released")?,
        background_image: fields.string("background_image")?,
        rating: fields.number("rating")?,
        rating_top: fields.number("rating_top")?,
        comment,
        platforms,
    })
}

struct Fields<'a> {
    object: &'a Map<String, Value>,
    id: i64,
}

impl Fields<'_> {
    fn string(&self, field: &str) -> Result<String, ValidationFailure> {
        self.object
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationFailure::new(Some(self.id), field, "must be a string"))
    }

    fn number(&self, field: &str) -> Result<f64, ValidationFailure> {
        self.object
            .get(field)
            .and_then(Value::as_f64)
            .ok_or_else(|| ValidationFailure::new(Some(self.id), field, "must be a number"))
    }
}

fn validate_platform(game_id: i64, index: usize, raw: &Value) -> Result<Platform, ValidationFailure> {
    let field = |name: &str| format!("platforms[{index}].{name}");
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationFailure::new(Some(game_id), format!("platforms[{index}]"), "must be an object"))?;
    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ValidationFailure::new(Some(game_id), field("id"), "must be an integer"))?;
    let text = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationFailure::new(Some(game_id), field(name), "must be a string"))
    };
    Ok(Platform {
        id,
        slug: text("slug")?,
        name: text("name")?,
    })
}

/// Per-field messages produced by [`GameDraft::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    /// Problem with the name input.
    pub name: Option<String>,
    /// Problem with the release date input.
    pub released: Option<String>,
    /// Problem with the rating input.
    pub rating: Option<String>,
    /// Problem with the comment input.
    pub comment: Option<String>,
}

impl FieldErrors {
    /// True when every field passed.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.released.is_none()
            && self.rating.is_none()
            && self.comment.is_none()
    }
}

/// Editable state of the creation/edit form.
///
/// When the draft starts from an existing game, name and release date are
/// locked and the remaining fields of that game are carried over on submit.
#[derive(Debug, Clone, PartialEq)]
pub struct GameDraft {
    /// Name input.
    pub name: String,
    /// Release date input, `YYYY-MM-DD` or empty.
    pub released: String,
    /// Rating input as typed.
    pub rating: String,
    /// Comment input.
    pub comment: String,
    base: Option<Game>,
}

impl GameDraft {
    /// Empty form for a brand new game.
    pub fn blank() -> Self {
        Self {
            name: String::new(),
            released: String::new(),
            rating: "0".to_string(),
            comment: String::new(),
            base: None,
        }
    }

    /// Form prefilled from an existing game.
    pub fn from_game(game: &Game) -> Self {
        Self {
            name: game.name.clone(),
            released: game.released.clone(),
            rating: format_rating(game.rating),
            comment: game.comment.clone().unwrap_or_default(),
            base: Some(game.clone()),
        }
    }

    /// Game the draft was derived from, if any.
    pub fn base(&self) -> Option<&Game> {
        self.base.as_ref()
    }

    /// Whether name and release date are read-only.
    pub fn identity_locked(&self) -> bool {
        self.base.is_some()
    }

    /// Validate the inputs and build the resulting game.
    ///
    /// New games get a millisecond timestamp id.
    pub fn validate(&self) -> Result<Game, FieldErrors> {
        self.validate_with_id(Utc::now().timestamp_millis())
    }

    /// Same as [`GameDraft::validate`] with an explicit id for new games.
    pub fn validate_with_id(&self, new_id: i64) -> Result<Game, FieldErrors> {
        let mut errors = FieldErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.name = Some("Name is required".to_string());
        }

        // Locked dates come from the stored record and are kept as they are.
        let released = self.released.trim();
        if !self.identity_locked()
            && !released.is_empty()
            && NaiveDate::parse_from_str(released, "%Y-%m-%d").is_err()
        {
            errors.released = Some("Release date must be YYYY-MM-DD".to_string());
        }

        let rating = match self.rating.trim() {
            "" => {
                errors.rating = Some("Rating is required".to_string());
                None
            }
            input => match input.parse::<f64>() {
                Ok(value) if value.is_nan() => {
                    errors.rating = Some("Rating must be a number".to_string());
                    None
                }
                Ok(value) if value < MIN_RATING => {
                    errors.rating = Some("Rating cannot be less than 0".to_string());
                    None
                }
                Ok(value) if value > MAX_RATING => {
                    errors.rating = Some("Rating cannot be more than 5".to_string());
                    None
                }
                Ok(value) => Some(value),
                Err(_) => {
                    errors.rating = Some("Rating must be a number".to_string());
                    None
                }
            },
        };

        let comment = self.comment.trim();
        if comment.chars().count() > MAX_COMMENT_LEN {
            errors.comment = Some(format!(
                "Comment cannot be longer than {MAX_COMMENT_LEN} characters"
            ));
        }

        let rating = match rating {
            Some(rating) if errors.is_empty() => rating,
            _ => return Err(errors),
        };
        let comment = Some(comment.to_string()).filter(|text| !text.is_empty());

        Ok(match &self.base {
            Some(base) => Game {
                rating,
                comment,
                ..base.clone()
            },
            None => Game {
                id: new_id,
                slug: slugify(name),
                name: name.to_string(),
                released: released.to_string(),
                background_image: String::new(),
                rating,
                rating_top: DEFAULT_RATING_TOP,
                comment,
                platforms: Vec::new(),
            },
        })
    }
}

/// Render a rating without a trailing `.0`.
pub fn format_rating(rating: f64) -> String {
    if rating.fract() == 0.0 {
        format!("{rating:.0}")
    } else {
        rating.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: i64) -> Value {
        json!({
            "id": id,
            "slug": format!("game-{id}"),
            "name": format!("Game {id}"),
            "released": "2020-01-01",
            "background_image": "https://media.example/cover.jpg",
            "rating": 4.2,
            "rating_top": 5,
            "platforms": [{ "id": 4, "slug": "pc", "name": "PC" }]
        })
    }

    #[test]
    fn accepts_well_formed_record() {
        let game = validate_record(&raw(1)).expect("record should validate");
        assert_eq!(game.id, 1);
        assert_eq!(game.rating_top, 5.0);
        assert_eq!(game.comment, None);
        assert_eq!(game.platforms[0].name, "PC");
    }

    #[test]
    fn rejects_wrong_types_with_field_names() {
        let mut record = raw(2);
        record["rating"] = json!("high");
        let failure = validate_record(&record).unwrap_err();
        assert_eq!(failure.id, Some(2));
        assert_eq!(failure.field, "rating");

        let mut record = raw(3);
        record["id"] = json!("3");
        assert_eq!(validate_record(&record).unwrap_err().field, "id");

        let mut record = raw(4);
        record["platforms"][0]["name"] = json!(null);
        assert_eq!(
            validate_record(&record).unwrap_err().field,
            "platforms[0].name"
        );

        assert_eq!(validate_record(&json!([1, 2])).unwrap_err().field, "record");
    }

    #[test]
    fn comment_is_optional_but_bounded() {
        let mut record = raw(5);
        record["comment"] = json!(null);
        assert_eq!(validate_record(&record).unwrap().comment, None);

        record["comment"] = json!("a".repeat(MAX_COMMENT_LEN));
        assert!(validate_record(&record).is_ok());

        record["comment"] = json!("a".repeat(MAX_COMMENT_LEN + 1));
        assert_eq!(validate_record(&record).unwrap_err().field, "comment");
    }

    #[test]
    fn invalid_record_does_not_drop_siblings() {
        let mut broken = raw(2);
        broken["name"] = json!("");
        let page = validate_page(vec![raw(1), broken, raw(3)]);
        let ids: Vec<i64> = page.games.iter().map(|game| game.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(page.rejected.len(), 1);
        assert_eq!(page.rejected[0].id, Some(2));
    }

    #[test]
    fn draft_reports_every_bad_field() {
        let draft = GameDraft {
            name: "  ".to_string(),
            released: "17/09/2013".to_string(),
            rating: "7".to_string(),
            comment: "x".repeat(MAX_COMMENT_LEN + 1),
            base: None,
        };
        let errors = draft.validate_with_id(1).unwrap_err();
        assert_eq!(errors.name.as_deref(), Some("Name is required"));
        assert!(errors.released.is_some());
        assert_eq!(errors.rating.as_deref(), Some("Rating cannot be more than 5"));
        assert!(errors.comment.is_some());
    }

    #[test]
    fn blank_draft_builds_new_game() {
        let mut draft = GameDraft::blank();
        draft.name = "Hollow Knight".to_string();
        draft.released = "2017-02-24".to_string();
        draft.rating = "4.5".to_string();
        let game = draft.validate_with_id(1700000000000).unwrap();
        assert_eq!(game.id, 1700000000000);
        assert_eq!(game.slug, "hollow-knight");
        assert_eq!(game.rating_top, DEFAULT_RATING_TOP);
        assert_eq!(game.comment, None);
        assert!(!draft.identity_locked());
    }

    #[test]
    fn draft_from_game_keeps_identity() {
        let base = validate_record(&raw(9)).unwrap();
        let mut draft = GameDraft::from_game(&base);
        assert!(draft.identity_locked());
        assert_eq!(draft.rating, "4.2");
        draft.rating = "-1".to_string();
        assert_eq!(
            draft.validate_with_id(0).unwrap_err().rating.as_deref(),
            Some("Rating cannot be less than 0")
        );

        draft.rating = "3".to_string();
        draft.comment = "finished twice".to_string();
        let game = draft.validate_with_id(0).unwrap();
        assert_eq!(game.id, 9);
        assert_eq!(game.slug, "game-9");
        assert_eq!(game.rating, 3.0);
        assert_eq!(game.comment.as_deref(), Some("finished twice"));
        assert_eq!(game.platforms, base.platforms);
    }

    #[test]
    fn locked_release_date_is_not_revalidated() {
        let mut record = raw(11);
        record["released"] = json!("TBA");
        let base = validate_record(&record).unwrap();
        let mut draft = GameDraft::from_game(&base);
        draft.rating = "4".to_string();

        let game = draft.validate_with_id(0).expect("stored date is kept as is");
        assert_eq!(game.released, "TBA");
        assert_eq!(game.rating, 4.0);

        let mut fresh = GameDraft::blank();
        fresh.name = "Untitled".to_string();
        fresh.released = "TBA".to_string();
        assert!(fresh.validate_with_id(1).unwrap_err().released.is_some());
    }
}
