//! Wire encoding of list-valued forwarding headers.
//!
//! A list travels as one header line whose elements are separated by a comma
//! and optional whitespace. A comma inside an element is written as the
//! reserved token `%23` and restored on decode, so a single hop's query
//! string can carry several parameters without being split at chain level.
//! `%23` substitution is the only escape scheme on the wire.

use std::collections::BTreeMap;

/// Element separator on the wire.
pub const DELIMITER: char = ',';

/// Token standing in for a literal comma inside an element.
pub const ESCAPED_DELIMITER: &str = "%23";

const JOINER: &str = ", ";

/// One header of a [`HeaderSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEntry {
    Single(String),
    List(Vec<String>),
}

/// Header name to value, as sent to the next hop.
pub type HeaderSet = BTreeMap<String, HeaderEntry>;

/// Split a header value into its ordered elements.
pub fn decode_list(raw: &str) -> Vec<String> {
    raw.split(DELIMITER)
        .enumerate()
        .map(|(i, item)| if i == 0 { item } else { item.trim_start() })
        .map(|item| item.replace(ESCAPED_DELIMITER, ","))
        .collect()
}

/// Decode a header that may have arrived on several lines.
///
/// A single line is split with [`decode_list`]. Repeated lines already form
/// a sequence and are passed through one element per line.
pub fn decode_lines<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lines: Vec<&str> = lines.into_iter().collect();
    match lines.as_slice() {
        [single] => decode_list(single),
        many => many.iter().map(|line| line.to_string()).collect(),
    }
}

/// Join elements into one header value, escaping embedded commas.
pub fn encode_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| item.as_ref().replace(DELIMITER, ESCAPED_DELIMITER))
        .collect::<Vec<_>>()
        .join(JOINER)
}

/// Flatten a header set into wire pairs.
///
/// Lists are encoded with [`encode_list`]; scalars pass through. Headers whose
/// value ends up empty are omitted.
pub fn encode_header_set(headers: &HeaderSet) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, entry)| {
            let value = match entry {
                HeaderEntry::Single(value) => value.clone(),
                HeaderEntry::List(items) => encode_list(items),
            };
            (name.clone(), value)
        })
        .filter(|(_, value)| !value.is_empty())
        .collect()
}
