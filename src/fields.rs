//! Which anime fields must be filled, which placeholders are acceptable
//! for each, and how hard the retry loop tries to fill them.

use crate::models::AnimeRecord;
use std::collections::BTreeMap;
use std::fmt;

/// Label → value pairs read from a labeled panel of the anime page.
pub type InfoPanel = BTreeMap<String, String>;

/// Values the site prints when it has nothing to show.
pub const PLACEHOLDERS: &[&str] = &["Unknown", "N/A"];

/// Labels the site renders singular or plural depending on the count.
pub const LABEL_ALIASES: &[(&str, &str)] = &[
    ("Genre", "Genres"),
    ("Theme", "Themes"),
    ("Studio", "Studios"),
    ("Producer", "Producers"),
    ("Licensor", "Licensors"),
    ("Demographic", "Demographics"),
];

pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.contains(&value.trim())
}

/// Present, non-blank and not a placeholder.
pub fn is_filled(value: &str) -> bool {
    !value.trim().is_empty() && !is_placeholder(value)
}

/// Copies a value from a label's alias when the label itself is absent
/// or unfilled. Returns `(label, alias)` for every copy made.
pub fn fix_aliases(panel: &mut InfoPanel) -> Vec<(String, String)> {
    let mut fixed = Vec::new();

    for (singular, plural) in LABEL_ALIASES {
        for (label, alias) in [(*singular, *plural), (*plural, *singular)] {
            let label_filled = panel.get(label).map(|v| is_filled(v)).unwrap_or(false);
            if label_filled {
                continue;
            }
            let alias_value = match panel.get(alias) {
                Some(v) if is_filled(v) => v.clone(),
                _ => continue,
            };
            panel.insert(label.to_string(), alias_value);
            fixed.push((label.to_string(), alias.to_string()));
        }
    }

    fixed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnimeField {
    Title,
    Description,
    Image,
    Type,
    Episodes,
    Status,
    Aired,
    Premiered,
    ReleasedSeason,
    ReleasedYear,
    Source,
    Genres,
    Themes,
    Studios,
    Producers,
    Demographic,
    Duration,
    Rating,
    Score,
    Ranked,
    Popularity,
    Members,
    Favorites,
    Characters,
}

impl AnimeField {
    /// Column name in the anime CSV.
    pub fn column(&self) -> &'static str {
        match self {
            AnimeField::Title => "title",
            AnimeField::Description => "description",
            AnimeField::Image => "image",
            AnimeField::Type => "Type",
            AnimeField::Episodes => "Episodes",
            AnimeField::Status => "Status",
            AnimeField::Aired => "Aired",
            AnimeField::Premiered => "Premiered",
            AnimeField::ReleasedSeason => "Released_Season",
            AnimeField::ReleasedYear => "Released_Year",
            AnimeField::Source => "Source",
            AnimeField::Genres => "Genres",
            AnimeField::Themes => "Themes",
            AnimeField::Studios => "Studios",
            AnimeField::Producers => "Producers",
            AnimeField::Demographic => "Demographic",
            AnimeField::Duration => "Duration",
            AnimeField::Rating => "Rating",
            AnimeField::Score => "Score",
            AnimeField::Ranked => "Ranked",
            AnimeField::Popularity => "Popularity",
            AnimeField::Members => "Members",
            AnimeField::Favorites => "Favorites",
            AnimeField::Characters => "characters",
        }
    }
}

impl fmt::Display for AnimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Many titles simply lack it; accepted as empty without retrying.
    SemiOptional,
    /// Retried with the short budget.
    Limited,
    /// Retried with the full budget.
    Full,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: AnimeField,
    pub policy: RetryPolicy,
    /// Whether `Unknown`/`N/A` counts as a real value for this field.
    pub placeholder_ok: bool,
}

const fn rule(field: AnimeField, policy: RetryPolicy, placeholder_ok: bool) -> FieldRule {
    FieldRule {
        field,
        policy,
        placeholder_ok,
    }
}

use AnimeField::*;
use RetryPolicy::*;

pub const FIELD_RULES: &[FieldRule] = &[
    rule(Title, Full, false),
    rule(Description, Full, false),
    rule(Image, Full, false),
    rule(Type, Full, false),
    rule(Episodes, Full, true),
    rule(Status, Full, true),
    rule(Aired, Full, true),
    rule(Premiered, SemiOptional, true),
    rule(ReleasedSeason, SemiOptional, true),
    rule(ReleasedYear, SemiOptional, true),
    rule(Source, Full, false),
    rule(Genres, Full, false),
    rule(Themes, SemiOptional, false),
    rule(Studios, Full, false),
    rule(Producers, Full, false),
    rule(Demographic, SemiOptional, false),
    rule(Duration, Full, false),
    rule(Rating, Full, false),
    rule(Score, Full, true),
    rule(Ranked, Full, false),
    rule(Popularity, Full, false),
    rule(Members, Full, false),
    rule(Favorites, Full, false),
    rule(Characters, Limited, false),
];

pub fn rule_for(field: AnimeField) -> FieldRule {
    FIELD_RULES
        .iter()
        .copied()
        .find(|r| r.field == field)
        .unwrap_or(rule(field, Full, false))
}

/// Fields of `record` that are missing, blank, an unaccepted placeholder,
/// or (for characters) an empty list. Empty for a complete record.
pub fn missing_fields(record: &AnimeRecord) -> Vec<AnimeField> {
    FIELD_RULES
        .iter()
        .filter(|rule| !record.has_field(rule))
        .map(|rule| rule.field)
        .collect()
}

impl AnimeRecord {
    fn text_field(&self, field: AnimeField) -> Option<&Option<String>> {
        Some(match field {
            Title => &self.title,
            Description => &self.description,
            Image => &self.image,
            Type => &self.media_type,
            Episodes => &self.episodes,
            Status => &self.status,
            Aired => &self.aired,
            Premiered => &self.premiered,
            ReleasedSeason => &self.released_season,
            Source => &self.source,
            Genres => &self.genres,
            Themes => &self.themes,
            Studios => &self.studios,
            Producers => &self.producers,
            Demographic => &self.demographic,
            Duration => &self.duration,
            Rating => &self.rating,
            Score => &self.score,
            Ranked => &self.ranked,
            Popularity => &self.popularity,
            Members => &self.members,
            Favorites => &self.favorites,
            ReleasedYear | Characters => return None,
        })
    }

    fn text_field_mut(&mut self, field: AnimeField) -> Option<&mut Option<String>> {
        Some(match field {
            Title => &mut self.title,
            Description => &mut self.description,
            Image => &mut self.image,
            Type => &mut self.media_type,
            Episodes => &mut self.episodes,
            Status => &mut self.status,
            Aired => &mut self.aired,
            Premiered => &mut self.premiered,
            ReleasedSeason => &mut self.released_season,
            Source => &mut self.source,
            Genres => &mut self.genres,
            Themes => &mut self.themes,
            Studios => &mut self.studios,
            Producers => &mut self.producers,
            Demographic => &mut self.demographic,
            Duration => &mut self.duration,
            Rating => &mut self.rating,
            Score => &mut self.score,
            Ranked => &mut self.ranked,
            Popularity => &mut self.popularity,
            Members => &mut self.members,
            Favorites => &mut self.favorites,
            ReleasedYear | Characters => return None,
        })
    }

    pub fn has_field(&self, rule: &FieldRule) -> bool {
        match rule.field {
            ReleasedYear => self.released_year.is_some(),
            Characters => !self.characters.is_empty(),
            field => match self.text_field(field).and_then(|v| v.as_deref()) {
                Some(value) if rule.placeholder_ok => !value.trim().is_empty(),
                Some(value) => is_filled(value),
                None => false,
            },
        }
    }

    /// Takes `field` from `other` if `other` has a valid value for it.
    /// Returns whether anything was copied.
    pub fn take_field_from(&mut self, other: &AnimeRecord, field: AnimeField) -> bool {
        let rule = rule_for(field);
        if !other.has_field(&rule) {
            return false;
        }
        match field {
            ReleasedYear => self.released_year = other.released_year,
            Characters => self.characters = other.characters.clone(),
            field => {
                let value = other.text_field(field).cloned().flatten();
                if let Some(slot) = self.text_field_mut(field) {
                    *slot = value;
                }
            }
        }
        if field == Aired {
            self.aired_from = other.aired_from;
            self.aired_to = other.aired_to;
        }
        true
    }

    /// Sets `field` to the empty marker.
    pub fn clear_field(&mut self, field: AnimeField) {
        match field {
            ReleasedYear => self.released_year = None,
            Characters => self.characters.clear(),
            field => {
                if let Some(slot) = self.text_field_mut(field) {
                    *slot = None;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::CharacterRef;

    pub(crate) fn complete_record() -> AnimeRecord {
        let mut r = AnimeRecord::new(1, "https://myanimelist.net/anime/1/Cowboy_Bebop");
        r.title = Some("Cowboy Bebop".into());
        r.description = Some("Crime is timeless.".into());
        r.image = Some("https://cdn.myanimelist.net/images/anime/4/19644.jpg".into());
        r.media_type = Some("TV".into());
        r.episodes = Some("26".into());
        r.status = Some("Finished Airing".into());
        r.aired = Some("Apr 3, 1998 to Apr 24, 1999".into());
        r.premiered = Some("Spring 1998".into());
        r.released_season = Some("Spring".into());
        r.released_year = Some(1998);
        r.source = Some("Original".into());
        r.genres = Some("Action, Award Winning, Sci-Fi".into());
        r.themes = Some("Adult Cast, Space".into());
        r.studios = Some("Sunrise".into());
        r.producers = Some("Bandai Visual".into());
        r.demographic = Some("Seinen".into());
        r.duration = Some("24 min. per ep.".into());
        r.rating = Some("R - 17+ (violence & profanity)".into());
        r.score = Some("8.75".into());
        r.ranked = Some("#46".into());
        r.popularity = Some("#43".into());
        r.members = Some("4,000,000".into());
        r.favorites = Some("85,000".into());
        r.characters.push(CharacterRef {
            id: Some(1),
            name: "Spiegel, Spike".into(),
            url: "https://myanimelist.net/character/1/Spike_Spiegel".into(),
        });
        r
    }

    #[test]
    fn complete_record_has_nothing_missing() {
        assert!(missing_fields(&complete_record()).is_empty());
    }

    #[test]
    fn legitimate_placeholders_are_not_missing() {
        let mut record = complete_record();
        record.episodes = Some("Unknown".into());
        record.status = Some("Unknown".into());
        record.score = Some("N/A".into());
        assert!(missing_fields(&record).is_empty());
    }

    #[test]
    fn disallowed_placeholders_and_blanks_are_missing() {
        let mut record = complete_record();
        record.source = Some("Unknown".into());
        record.rating = Some("  ".into());
        record.duration = None;
        record.characters.clear();
        assert_eq!(
            missing_fields(&record),
            vec![AnimeField::Source, AnimeField::Duration, AnimeField::Rating, AnimeField::Characters]
        );
    }

    #[test]
    fn alias_fills_empty_singular() {
        let mut panel = InfoPanel::new();
        panel.insert("Genre".into(), "".into());
        panel.insert("Genres".into(), "Action, Drama".into());

        let fixed = fix_aliases(&mut panel);

        assert_eq!(panel["Genre"], "Action, Drama");
        assert_eq!(fixed, vec![("Genre".to_string(), "Genres".to_string())]);
    }

    #[test]
    fn alias_fills_absent_plural() {
        let mut panel = InfoPanel::new();
        panel.insert("Studio".into(), "Madhouse".into());
        fix_aliases(&mut panel);
        assert_eq!(panel.get("Studios").map(String::as_str), Some("Madhouse"));
    }

    #[test]
    fn alias_never_overwrites_filled_label() {
        let mut panel = InfoPanel::new();
        panel.insert("Theme".into(), "Space".into());
        panel.insert("Themes".into(), "Mecha, Space".into());
        assert!(fix_aliases(&mut panel).is_empty());
        assert_eq!(panel["Theme"], "Space");
    }

    #[test]
    fn take_field_skips_invalid_values() {
        let mut target = AnimeRecord::new(1, "u");
        let mut source = AnimeRecord::new(1, "u");
        source.source = Some("Unknown".into());
        assert!(!target.take_field_from(&source, AnimeField::Source));
        assert_eq!(target.source, None);

        source.source = Some("Manga".into());
        assert!(target.take_field_from(&source, AnimeField::Source));
        assert_eq!(target.source.as_deref(), Some("Manga"));
    }

    #[test]
    fn every_field_has_exactly_one_rule() {
        let mut seen = std::collections::HashSet::new();
        for rule in FIELD_RULES {
            assert!(seen.insert(rule.field), "duplicate rule for {}", rule.field);
        }
        assert_eq!(seen.len(), 24);
    }
}
