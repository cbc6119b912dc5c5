use super::tags::{TagSet, encode_tags, merge_tags};
use tracing::debug;

/// Marker for in-line tag overrides embedded in the measurement name:
/// `cpu.eventtags.core.0.socket.1 42 1480697845` carries the tags
/// `core=0,socket=1` for the measurement `cpu`.
const EVENT_TAGS_SEPARATOR: &str = ".eventtags.";

/// Outcome of composing one check-output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeOutcome {
    /// A fully rendered line-protocol record, ready to buffer.
    Point(String),
    /// The line is not a valid measurement and is dropped. Never an
    /// event-level error.
    Skip,
}

/// Parses one line of check output (`measurement field_value [timestamp]`)
/// and renders it against the event's tag set.
///
/// `encoded` must be `encode_tags(tags)`; it is passed in so the common
/// case encodes the event tags once, not once per line. Lines with an
/// `.eventtags.` measurement re-encode with the in-line overrides merged.
pub fn compose(line: &str, tags: &TagSet, encoded: &str) -> ComposeOutcome {
    let mut tokens = line.split_whitespace();
    let Some(measurement) = tokens.next() else {
        return ComposeOutcome::Skip;
    };
    let Some(field_value) = tokens.next() else {
        debug!(line, "missing field value, skipping line");
        return ComposeOutcome::Skip;
    };
    let timestamp = tokens.next();

    // A timestamp token, when present, must be integer-parsable. The
    // legacy two-field format (no timestamp) is still accepted.
    if let Some(raw) = timestamp
        && raw.parse::<i64>().is_err()
    {
        debug!(line, timestamp = raw, "invalid timestamp, skipping line");
        return ComposeOutcome::Skip;
    }

    let (measurement, tag_string) = match measurement.split_once(EVENT_TAGS_SEPARATOR) {
        Some((base, tail)) => {
            let merged = merge_tags(tags, &parse_event_tags(tail));
            (base, encode_tags(&merged))
        }
        None => (measurement, encoded.to_string()),
    };

    let point = match timestamp {
        Some(ts) => format!("{measurement}{tag_string} value={field_value} {ts}"),
        None => format!("{measurement}{tag_string} value={field_value}"),
    };
    ComposeOutcome::Point(point)
}

/// Flattened `key.value.key.value` tail, taken two tokens at a time. A
/// dangling key with no value is ignored.
fn parse_event_tags(tail: &str) -> TagSet {
    let mut tags = TagSet::new();
    let mut tokens = tail.split('.');
    while let Some(key) = tokens.next() {
        let Some(value) = tokens.next() else {
            break;
        };
        tags.insert(key.to_string(), value.to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_set(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn compose_with(line: &str, tags: &TagSet) -> ComposeOutcome {
        let encoded = encode_tags(tags);
        compose(line, tags, &encoded)
    }

    #[test]
    fn test_round_trip_without_tags() {
        assert_eq!(
            compose_with("rspec 69 1480697845", &TagSet::new()),
            ComposeOutcome::Point("rspec value=69 1480697845".to_string())
        );
    }

    #[test]
    fn test_round_trip_with_merged_tags() {
        let tags = tag_set(&[
            ("a", "1"),
            ("b", "1"),
            ("c", "1"),
            ("x", "1"),
            ("y", "1"),
            ("z", "1"),
        ]);
        assert_eq!(
            compose_with("rspec 69 1480697845", &tags),
            ComposeOutcome::Point(
                "rspec,a=1,b=1,c=1,x=1,y=1,z=1 value=69 1480697845".to_string()
            )
        );
    }

    #[test]
    fn test_invalid_timestamp_skips_line() {
        assert_eq!(
            compose_with("rspec 69 invalid", &TagSet::new()),
            ComposeOutcome::Skip
        );
    }

    #[test]
    fn test_legacy_two_field_format_accepted() {
        assert_eq!(
            compose_with("rspec 69", &TagSet::new()),
            ComposeOutcome::Point("rspec value=69".to_string())
        );
    }

    #[test]
    fn test_empty_line_skipped() {
        assert_eq!(compose_with("", &TagSet::new()), ComposeOutcome::Skip);
        assert_eq!(compose_with("   ", &TagSet::new()), ComposeOutcome::Skip);
    }

    #[test]
    fn test_measurement_only_skipped() {
        assert_eq!(compose_with("rspec", &TagSet::new()), ComposeOutcome::Skip);
    }

    #[test]
    fn test_field_value_carried_as_literal_text() {
        // Downstream may use non-numeric string fields; no coercion.
        assert_eq!(
            compose_with("status up 1480697845", &TagSet::new()),
            ComposeOutcome::Point("status value=up 1480697845".to_string())
        );
    }

    #[test]
    fn test_negative_timestamp_accepted() {
        assert_eq!(
            compose_with("rspec 69 -1", &TagSet::new()),
            ComposeOutcome::Point("rspec value=69 -1".to_string())
        );
    }

    #[test]
    fn test_event_tags_merged_and_override() {
        let tags = tag_set(&[("host", "node1"), ("core", "9")]);
        assert_eq!(
            compose_with("cpu.eventtags.core.0.socket.1 42 1480697845", &tags),
            ComposeOutcome::Point(
                "cpu,core=0,host=node1,socket=1 value=42 1480697845".to_string()
            )
        );
    }

    #[test]
    fn test_event_tags_dangling_key_ignored() {
        assert_eq!(
            compose_with("cpu.eventtags.core.0.orphan 42 1480697845", &TagSet::new()),
            ComposeOutcome::Point("cpu,core=0 value=42 1480697845".to_string())
        );
    }

    #[test]
    fn test_extra_tokens_ignored() {
        // Only the first three whitespace-separated tokens matter.
        assert_eq!(
            compose_with("rspec 69 1480697845 trailing junk", &TagSet::new()),
            ComposeOutcome::Point("rspec value=69 1480697845".to_string())
        );
    }
}
