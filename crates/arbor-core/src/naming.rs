//! Property name conversion between wire keys and model fields.
//!
//! Part bodies use separator-delimited keys (`custom_data`, `source-url`);
//! models name their fields in camel form (`customData`, `sourceUrl`).

/// Converts a separator-delimited wire key to its camel-form field name.
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' || ch == '-' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a camel-form field name to a wire key joined by `separator`.
pub fn hyphenate(field: &str, separator: char) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for ch in field.chars() {
        if ch.is_uppercase() {
            if !out.is_empty() {
                out.push(separator);
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("custom_data"), "customData");
        assert_eq!(camel_case("source-mime-type"), "sourceMimeType");
        assert_eq!(camel_case("title"), "title");
        assert_eq!(camel_case("_private"), "private");
    }

    #[test]
    fn test_hyphenate() {
        assert_eq!(hyphenate("customData", '_'), "custom_data");
        assert_eq!(hyphenate("sourceMimeType", '-'), "source-mime-type");
        assert_eq!(hyphenate("title", '_'), "title");
    }

    #[test]
    fn test_conversion_is_reversible_for_fields() {
        for field in ["action", "customData", "sourceMimeType", "subtitle"] {
            assert_eq!(camel_case(&hyphenate(field, '_')), field);
        }
    }
}
