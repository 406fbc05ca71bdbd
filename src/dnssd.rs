//! DNS-SD TXT record conventions (RFC 6763 section 6).
//!
//! TXT records published for DNS-SD carry `key=value` attributes. This
//! module parses them out of the raw strings a [`ServiceEntry`] keeps
//! in its `info` field.
//!
//! [`ServiceEntry`]: crate::ServiceEntry

use std::collections::HashMap;

/// Parsed TXT attributes.
///
/// Keys are case-insensitive and stored upper-case. A value of `None`
/// marks a boolean attribute, i.e. an item with no `=`.
pub type TxtProperties = HashMap<String, Option<String>>;

/// Parses DNS-SD TXT strings into attributes.
///
/// Empty items and items starting with `=` are skipped, and only the
/// first occurrence of a key is kept, per RFC 6763.
///
/// # Example
///
/// ```rust
/// use mdns_discovery::parse_txt_properties;
///
/// let props = parse_txt_properties(["path=/api", "tls"]);
/// assert_eq!(props["PATH"], Some("/api".to_string()));
/// assert_eq!(props["TLS"], None);
/// ```
pub fn parse_txt_properties<'a, I>(items: I) -> TxtProperties
where
    I: IntoIterator<Item = &'a str>,
{
    let mut properties = TxtProperties::new();
    for item in items {
        if item.is_empty() {
            continue;
        }
        if item.starts_with('=') {
            // A key cannot start with '='.
            continue;
        }
        let (key, value) = match item.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (item, None),
        };
        properties.entry(key.to_uppercase()).or_insert(value);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_items() {
        let props = parse_txt_properties(["path=/root", "version=1.2"]);
        assert_eq!(props.len(), 2);
        assert_eq!(props["PATH"], Some("/root".to_string()));
        assert_eq!(props["VERSION"], Some("1.2".to_string()));
    }

    #[test]
    fn test_boolean_items() {
        let props = parse_txt_properties(["tls"]);
        assert_eq!(props["TLS"], None);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let props = parse_txt_properties(["path=/first", "PATH=/second", "Path"]);
        assert_eq!(props.len(), 1);
        assert_eq!(props["PATH"], Some("/first".to_string()));
    }

    #[test]
    fn test_malformed_items_are_skipped() {
        let props = parse_txt_properties(["", "=orphan", "ok=1"]);
        assert_eq!(props.len(), 1);
        assert_eq!(props["OK"], Some("1".to_string()));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let props = parse_txt_properties(["token=a=b=c"]);
        assert_eq!(props["TOKEN"], Some("a=b=c".to_string()));
    }
}
