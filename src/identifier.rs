//! Identifier normalization for table and column names.
//!
//! External names (dataset titles, form labels, GeoJSON property keys) are
//! turned into PostgreSQL-safe identifiers: ASCII only, bounded to
//! [`MAX_IDENTIFIER_LEN`] bytes, and optionally guaranteed to start with a
//! letter or underscore.

use std::{borrow::Cow, collections::HashSet, sync::LazyLock};

use regex::Regex;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::value::{ID_FIELD, Record};

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

const SEPARATORS: &[char] = &[' ', '-', '.', '/'];

static NON_IDENTIFIER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid identifier pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeparatorPolicy {
    /// Each separator becomes `_`.
    #[default]
    Underscore,
    /// Separators are deleted.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub maxlen: usize,
    pub make_snake: bool,
    pub ensure_leading_alpha: bool,
    pub separator_policy: SeparatorPolicy,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            maxlen: MAX_IDENTIFIER_LEN,
            make_snake: true,
            ensure_leading_alpha: true,
            separator_policy: SeparatorPolicy::Underscore,
        }
    }
}

impl NormalizeOptions {
    /// Settings used for column keys. Existing warehouse tables depend on
    /// these exact values.
    pub fn column_keys(maxlen: usize) -> Self {
        Self {
            maxlen,
            make_snake: false,
            ensure_leading_alpha: false,
            separator_policy: SeparatorPolicy::Remove,
        }
    }

    pub fn with_maxlen(mut self, maxlen: usize) -> Self {
        self.maxlen = maxlen;
        self
    }
}

/// Normalizes `raw` with the default options.
pub fn normalize(raw: &str) -> String {
    normalize_identifier(raw, &NormalizeOptions::default())
}

/// Turns an arbitrary string into a SQL-safe identifier.
///
/// The reserved `_id` is returned unchanged. The result is never empty and
/// never longer than `options.maxlen`, except that `maxlen == 0` yields `_`.
pub fn normalize_identifier(raw: &str, options: &NormalizeOptions) -> String {
    if raw == ID_FIELD {
        return raw.to_string();
    }

    let mut text: String = raw.nfd().filter(|ch| !is_combining_mark(*ch)).collect();

    if options.make_snake {
        text = camel_to_snake(&text);
    }

    text = text
        .chars()
        .filter_map(|ch| {
            if SEPARATORS.contains(&ch) {
                match options.separator_policy {
                    SeparatorPolicy::Underscore => Some('_'),
                    SeparatorPolicy::Remove => None,
                }
            } else {
                Some(ch)
            }
        })
        .collect();

    let stripped = NON_IDENTIFIER_CHARS.replace_all(&text, "");
    let mut identifier = stripped.trim_matches('_').to_string();

    if options.ensure_leading_alpha
        && !identifier
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
    {
        identifier.insert(0, '_');
    }

    let mut identifier = truncate_to(&identifier, options.maxlen).into_owned();
    if identifier.is_empty() {
        identifier.push('_');
    }
    identifier
}

/// Inserts `_` at CamelCase boundaries and lowercases the result.
///
/// A boundary sits between a lowercase and an uppercase letter, or before the
/// last capital of an acronym that is followed by a lowercase letter
/// (`XMLHttp` → `xml_http`). Existing underscores are kept as-is.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if idx > 0 {
            let prev = chars[idx - 1];
            let next = chars.get(idx + 1).copied();
            let lower_to_upper = prev.is_ascii_lowercase() && ch.is_ascii_uppercase();
            let acronym_end = prev.is_ascii_uppercase()
                && ch.is_ascii_uppercase()
                && next.is_some_and(|n| n.is_ascii_lowercase());
            if lower_to_upper || acronym_end {
                out.push('_');
            }
        }
        out.push(ch);
    }
    out.to_lowercase()
}

/// Returns the longest prefix of `value` that fits in `max_bytes` without
/// splitting a character.
pub fn truncate_to(value: &str, max_bytes: usize) -> Cow<'_, str> {
    if value.len() <= max_bytes {
        return Cow::Borrowed(value);
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Borrowed(&value[..end])
}

/// Derives a table name: lowercased and bounded to [`MAX_IDENTIFIER_LEN`].
///
/// With a suffix the base is shortened first so the result always ends in
/// `__<suffix>`.
pub fn table_name(raw: &str, suffix: Option<&str>) -> String {
    let lowered = raw.to_lowercase();
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => {
            let tail = format!("__{suffix}");
            let max_base = MAX_IDENTIFIER_LEN.saturating_sub(tail.len());
            format!("{}{tail}", truncate_to(&lowered, max_base))
        }
        None => truncate_to(&lowered, MAX_IDENTIFIER_LEN).into_owned(),
    }
}

/// Renames every key of `record` to a normalized snake_case identifier.
///
/// Keys listed in `special_keys` are kept verbatim. Collisions receive `_2`,
/// `_3`, ... suffixes. Keys whose normalized form exceeds the identifier limit
/// are truncated and always suffixed, starting at `_1`.
pub fn normalize_and_snakecase_keys(record: Record, special_keys: &[&str]) -> Record {
    let unbounded = NormalizeOptions::default().with_maxlen(usize::MAX);
    let mut used: HashSet<String> = special_keys.iter().map(|key| key.to_string()).collect();
    let mut output = Record::with_capacity(record.len());

    for (key, value) in record {
        if special_keys.contains(&key.as_str()) {
            output.insert(key, value);
            continue;
        }

        let base = normalize_identifier(&key, &unbounded);
        let suffixed = |counter: usize| {
            let suffix = format!("_{counter}");
            let keep = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
            format!("{}{suffix}", truncate_to(&base, keep))
        };

        let mut counter = 1;
        let mut candidate = if base.len() > MAX_IDENTIFIER_LEN {
            suffixed(counter)
        } else {
            base.clone()
        };
        while used.contains(&candidate) {
            counter += 1;
            candidate = suffixed(counter);
        }

        used.insert(candidate.clone());
        output.insert(candidate, value);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(maxlen: usize, snake: bool, leading: bool, policy: SeparatorPolicy) -> NormalizeOptions {
        NormalizeOptions {
            maxlen,
            make_snake: snake,
            ensure_leading_alpha: leading,
            separator_policy: policy,
        }
    }

    #[test]
    fn normalize_handles_common_dataset_titles() {
        assert_eq!(normalize("_id"), "_id");
        assert_eq!(normalize("kebab-case"), "kebab_case");
        assert_eq!(normalize("123project"), "_123project");
        assert_eq!(normalize(""), "_");
        assert_eq!(normalize("!@#$%"), "_");
        assert_eq!(normalize("___name___"), "name");
        assert_eq!(normalize("This is my dataset, ok?"), "this_is_my_dataset_ok");
        assert_eq!(normalize("Summary of results (Q1)"), "summary_of_results_q1");
        assert_eq!(normalize("2024 field survey data"), "_2024_field_survey_data");
        assert_eq!(normalize("Location 1 / Sector B"), "location_1___sector_b");
        assert_eq!(normalize("Foo bar's dataset!"), "foo_bars_dataset");
        assert_eq!(normalize("Table: Foo Bar 2"), "table_foo_bar_2");
        assert_eq!(normalize("Results - Phase 1"), "results___phase_1");
        assert_eq!(
            normalize("this is a very, very, very long dataset name that will get truncated safely"),
            "this_is_a_very_very_very_long_dataset_name_that_will_get_trunca"
        );
    }

    #[test]
    fn normalize_respects_maxlen() {
        let defaults = NormalizeOptions::default();
        assert_eq!(normalize_identifier("hello_world", &defaults.with_maxlen(5)), "hello");
        assert_eq!(normalize_identifier("a", &defaults.with_maxlen(1)), "a");
        assert_eq!(normalize_identifier("test", &defaults.with_maxlen(0)), "_");
        assert_eq!(normalize_identifier("?!", &defaults.with_maxlen(3)), "_");
        assert_eq!(normalize_identifier("123", &defaults.with_maxlen(2)), "_1");
        assert_eq!(normalize_identifier("123", &defaults.with_maxlen(1)), "_");
    }

    #[test]
    fn normalize_without_snake_keeps_case() {
        let options = with(63, false, true, SeparatorPolicy::Underscore);
        assert_eq!(normalize_identifier("CamelCaseString", &options), "CamelCaseString");
        assert_eq!(normalize_identifier("Camel-Case.String", &options), "Camel_Case_String");
        assert_eq!(normalize("CamelCaseString"), "camel_case_string");
    }

    #[test]
    fn normalize_leading_alpha_can_be_disabled() {
        let options = with(63, true, false, SeparatorPolicy::Underscore);
        assert_eq!(normalize_identifier("123name", &options), "123name");
        assert_eq!(normalize_identifier("", &options), "_");
        assert_eq!(normalize_identifier("!@#$%", &options), "_");
    }

    #[test]
    fn separator_policies() {
        let remove = with(63, true, true, SeparatorPolicy::Remove);
        assert_eq!(normalize("path/to/file"), "path_to_file");
        assert_eq!(normalize("hello   world"), "hello___world");
        assert_eq!(normalize_identifier("path/to/file", &remove), "pathtofile");
        assert_eq!(
            normalize_identifier("mixed-name with_spaces/and.dots", &remove),
            "mixednamewith_spacesanddots"
        );
        assert_eq!(normalize_identifier("   ", &remove), "_");
        assert_eq!(normalize("---...///"), "_");
    }

    #[test]
    fn diacritics_are_stripped() {
        assert_eq!(normalize("Vigilância Ambiental"), "vigilancia_ambiental");
        assert_eq!(normalize("naïve café"), "naive_cafe");
        assert_eq!(normalize("Müller"), "muller");
        assert_eq!(
            normalize_identifier(
                "VigilânciaAmbientalDaRegiãoMetropolitana",
                &NormalizeOptions::default().with_maxlen(25)
            ),
            "vigilancia_ambiental_da_r"
        );
        assert_eq!(
            normalize_identifier("123-my file.name", &with(63, false, true, SeparatorPolicy::Remove)),
            "_123myfilename"
        );
    }

    #[test]
    fn camel_to_snake_edge_cases() {
        assert_eq!(camel_to_snake(""), "");
        assert_eq!(camel_to_snake("A"), "a");
        assert_eq!(camel_to_snake("123"), "123");
        assert_eq!(camel_to_snake("_CamelCase_"), "_camel_case_");
        assert_eq!(camel_to_snake("XMLHttpRequest"), "xml_http_request");
        assert_eq!(camel_to_snake("HTTPSConnection"), "https_connection");
    }

    #[test]
    fn table_names_keep_suffix_within_limit() {
        let long = "this_is_an_extremely_long_table_name_that_exceeds_postgresql_limits_significantly_2023";
        let main = table_name(long, None);
        assert_eq!(main.len(), 63);
        assert_eq!(main, "this_is_an_extremely_long_table_name_that_exceeds_postgresql_li");

        let labels = table_name(long, Some("labels"));
        assert!(labels.ends_with("__labels"));
        assert!(labels.len() <= 63);

        assert_eq!(
            table_name(&main, Some("columns")),
            "this_is_an_extremely_long_table_name_that_exceeds_post__columns"
        );
        assert_eq!(table_name("ALL_CAPS_TABLE_NAME", None), "all_caps_table_name");
    }

    #[test]
    fn snakecase_keys_resolve_collisions() {
        let input: Record = [
            ("primaryKey", 1),
            ("camelCaseKey", 2),
            ("keyWith-Collision", 4),
            ("keyWithCollision", 5),
            ("KeyWithCollision", 6),
            ("key-with-collision", 7),
            ("key_with_collision", 8),
            ("key_with_collision_2", 9),
            ("aVeryLongKeyNameThatExceedsTheSixtyThreeCharacterLimitAndNeedsTruncation", 10),
            ("aVeryLongKeyNameThatExceedsTheSixtyThreeCharacterLimitAndNeedsTruncationAlso", 11),
        ]
        .into_iter()
        .map(|(k, v)| (k, i64::from(v)))
        .collect();

        let output = normalize_and_snakecase_keys(input, &["primaryKey"]);
        let keys: Vec<&str> = output.keys().collect();
        assert_eq!(
            keys,
            vec![
                "primaryKey",
                "camel_case_key",
                "key_with_collision",
                "key_with_collision_2",
                "key_with_collision_3",
                "key_with_collision_4",
                "key_with_collision_5",
                "key_with_collision_2_2",
                "a_very_long_key_name_that_exceeds_the_sixty_three_character_l_1",
                "a_very_long_key_name_that_exceeds_the_sixty_three_character_l_2",
            ]
        );
    }
}
