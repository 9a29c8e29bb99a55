use proptest::prelude::*;
use regex::Regex;
use structured_writer::{
    identifier::{NormalizeOptions, normalize_identifier, table_name},
    sanitize::{ColumnMapping, ColumnSanitizer, SanitizeOptions},
    Record,
};

fn identifier_pattern() -> Regex {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid pattern")
}

proptest! {
    #[test]
    fn normalized_names_fit_and_are_safe(raw in "\\PC{0,120}", maxlen in 1usize..80) {
        let options = NormalizeOptions::default().with_maxlen(maxlen);
        let name = normalize_identifier(&raw, &options);
        prop_assert!(name.len() <= maxlen);
        if raw != "_id" {
            prop_assert!(identifier_pattern().is_match(&name), "{name:?} from {raw:?}");
        }
    }

    #[test]
    fn column_keys_stay_within_maxlen(raw in "\\PC{0,120}", maxlen in 1usize..70) {
        let name = normalize_identifier(&raw, &NormalizeOptions::column_keys(maxlen));
        prop_assert!(name.len() <= maxlen);
        prop_assert!(!name.is_empty());
    }

    #[test]
    fn table_names_stay_within_limit(raw in "[a-zA-Z0-9_]{0,120}", suffix in "[a-z]{1,12}") {
        let plain = table_name(&raw, None);
        prop_assert!(plain.len() <= 63);
        let suffixed = table_name(&raw, Some(&suffix));
        prop_assert!(suffixed.len() <= 63);
        let tail = format!("__{suffix}");
        prop_assert!(suffixed.ends_with(&tail));
    }

    #[test]
    fn sanitizing_twice_is_stable(keys in prop::collection::vec("[a-z .?/-]{1,20}", 1..8)) {
        let mut sanitizer = ColumnSanitizer::new(ColumnMapping::new(), SanitizeOptions::default());
        let record: Record = keys.iter().map(|key| (key.as_str(), "v")).collect();
        let first: Vec<String> = sanitizer.sanitize(record.clone()).keys().map(str::to_string).collect();
        let second: Vec<String> = sanitizer.sanitize(record).keys().map(str::to_string).collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn distinct_keys_get_distinct_columns(
        keys in prop::collection::btree_set("[a-z.? ]{1,30}", 1..10),
        maxlen in 8usize..20,
    ) {
        let options = SanitizeOptions { maxlen, ..SanitizeOptions::default() };
        let mut sanitizer = ColumnSanitizer::new(ColumnMapping::new(), options);
        let record: Record = keys.iter().map(|key| (key.as_str(), "v")).collect();
        let sanitized = sanitizer.sanitize(record);
        let columns: Vec<&str> = sanitized.keys().collect();
        let unique: std::collections::HashSet<&str> = columns.iter().copied().collect();
        prop_assert_eq!(unique.len(), keys.len());
        prop_assert!(columns.iter().all(|column| column.len() <= maxlen));
    }
}
