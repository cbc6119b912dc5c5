use std::collections::BTreeMap;

/// Tag key/value mapping. BTreeMap keeps keys in ascending byte order,
/// which is the order InfluxDB expects for best write performance.
pub type TagSet = BTreeMap<String, String>;

/// Renders a tag set as a comma-prefixed line-protocol tag string:
/// `,key=value` per entry, keys sorted, entries with an empty value
/// skipped. An empty set renders as the empty string.
pub fn encode_tags(tags: &TagSet) -> String {
    let mut out = String::new();
    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

/// Merges `overrides` onto `base`, overrides winning on key collision.
pub fn merge_tags(base: &TagSet, overrides: &TagSet) -> TagSet {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
