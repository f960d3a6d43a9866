//! Event name derivation from stream type tags.

/// Convert a hyphen-delimited type tag into a camel-cased event name.
///
/// The first word is kept as-is; every following word has its first
/// character uppercased. Empty segments (from doubled hyphens) are dropped.
///
/// ```
/// use gerrit_stream::naming::camelize;
///
/// assert_eq!(camelize("patchset-created"), "patchsetCreated");
/// assert_eq!(camelize("abandoned"), "abandoned");
/// ```
#[must_use]
pub fn camelize(tag: &str) -> String {
    let mut words = tag.split('-');
    let mut name = String::with_capacity(tag.len());

    if let Some(first) = words.next() {
        name.push_str(first);
    }

    for word in words {
        let mut chars = word.chars();
        if let Some(head) = chars.next() {
            name.extend(head.to_uppercase());
            name.push_str(chars.as_str());
        }
    }

    name
}
