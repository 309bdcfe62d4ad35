//! Pure grouping-key functions shared by the chunk builders, the verifier and
//! the lookup path. Every shard an identifier is written to is derived here, so
//! the writers and readers cannot disagree on routing.

use crate::config::KeyConfig;
use memchr::memchr;
use std::borrow::Cow;

/// Namespace shard of an identifier: the text before the first separator, or
/// the catch-all key when there is no separator.
pub fn namespace_key<'a>(id: &'a str, keys: &'a KeyConfig) -> &'a str {
    let split = if keys.separator.is_ascii() {
        memchr(keys.separator as u8, id.as_bytes())
    } else {
        id.find(keys.separator)
    };
    match split {
        Some(pos) => &id[..pos],
        None => &keys.catch_all,
    }
}

/// Two-character alphabetic bucket of an identifier.
///
/// The first two characters are lowercased; a lone character is padded with the
/// filler. When the first character is not ASCII alphanumeric (including the
/// empty identifier) the whole identifier goes to the fallback bucket.
pub fn alpha_key(id: &str, keys: &KeyConfig) -> String {
    let mut chars = id.chars();
    let first = match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
        _ => return keys.fallback.clone(),
    };
    let second = chars
        .next()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .unwrap_or(keys.filler);

    let mut key = String::with_capacity(first.len_utf8() + second.len_utf8());
    key.push(first);
    key.push(second);
    key
}

/// Display name: the segment after the last separator, or the whole identifier.
pub fn display_name<'a>(id: &'a str, keys: &KeyConfig) -> &'a str {
    match id.rfind(keys.separator) {
        Some(pos) => &id[pos + keys.separator.len_utf8()..],
        None => id,
    }
}

/// Percent-encodes a shard key for use inside a file name. Bytes outside
/// `[a-z0-9._~-]` become `%XX`, so keys like `a/` stay in one path segment.
/// Uppercase letters are encoded too: `A` and `a` must not share a file on a
/// case-insensitive filesystem.
pub fn file_stem(key: &str) -> Cow<'_, str> {
    let is_plain = |b: u8| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'~' | b'-')
    };
    if key.bytes().all(is_plain) {
        return Cow::Borrowed(key);
    }

    let mut encoded = String::with_capacity(key.len() * 3);
    for b in key.bytes() {
        if is_plain(b) {
            encoded.push(b as char);
        } else {
            encoded.push('%');
            encoded.push_str(&format!("{b:02X}"));
        }
    }
    Cow::Owned(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeyConfig {
        KeyConfig::default()
    }

    #[test]
    fn namespace_of_owner_model() {
        assert_eq!(namespace_key("zera09/SmolVLM", &keys()), "zera09");
    }

    #[test]
    fn namespace_splits_on_first_separator() {
        assert_eq!(namespace_key("org/team/model", &keys()), "org");
    }

    #[test]
    fn namespace_without_separator_is_catch_all() {
        assert_eq!(namespace_key("standalone-model", &keys()), "_other");
        assert_eq!(namespace_key("", &keys()), "_other");
    }

    #[test]
    fn namespace_of_leading_separator_is_empty() {
        assert_eq!(namespace_key("/model", &keys()), "");
    }

    #[test]
    fn catch_all_containing_separator_is_exclusive() {
        let config = KeyConfig {
            catch_all: "/other".to_string(),
            ..KeyConfig::default()
        };
        assert_eq!(namespace_key("_other/x", &config), "_other");
        assert_eq!(namespace_key("standalone", &config), "/other");
        // default catch-all is shared with an owner of the same name
        assert_eq!(namespace_key("_other/x", &keys()), namespace_key("standalone", &keys()));
    }

    #[test]
    fn namespace_with_custom_separator() {
        let config = KeyConfig {
            separator: ':',
            ..KeyConfig::default()
        };
        assert_eq!(namespace_key("crate:item", &config), "crate");
    }

    #[test]
    fn alpha_key_lowercases_two_characters() {
        assert_eq!(alpha_key("Meta-llama/Llama-3", &keys()), "me");
        assert_eq!(alpha_key("7ab/model", &keys()), "7a");
    }

    #[test]
    fn alpha_key_pads_single_character() {
        assert_eq!(alpha_key("X", &keys()), "x0");
        assert_eq!(alpha_key("9", &keys()), "90");
    }

    #[test]
    fn alpha_key_routes_non_alphanumeric_to_fallback() {
        assert_eq!(alpha_key("!weird", &keys()), "__");
        assert_eq!(alpha_key("_private/model", &keys()), "__");
        assert_eq!(alpha_key("/model", &keys()), "__");
        assert_eq!(alpha_key("", &keys()), "__");
    }

    #[test]
    fn alpha_key_keeps_separator_as_second_character() {
        // one-letter owner names bucket on "<letter>/"
        assert_eq!(alpha_key("A/m1", &keys()), "a/");
        assert_eq!(alpha_key("a/m2", &keys()), "a/");
    }

    #[test]
    fn alpha_key_treats_non_ascii_first_character_as_fallback() {
        assert_eq!(alpha_key("Ébène/model", &keys()), "__");
        assert_eq!(alpha_key("日本/model", &keys()), "__");
    }

    #[test]
    fn alpha_key_lowercases_non_ascii_second_character() {
        assert_eq!(alpha_key("AÉ", &keys()), "aé");
    }

    #[test]
    fn natural_keys_never_equal_fallback() {
        for id in ["00model", "0", "__", "_0", "a", "zz/top"] {
            let key = alpha_key(id, &keys());
            if id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                assert_ne!(key, keys().fallback, "{id}");
            } else {
                assert_eq!(key, keys().fallback, "{id}");
            }
        }
    }

    #[test]
    fn display_name_is_last_segment() {
        assert_eq!(display_name("meta-llama/Llama-3-8B", &keys()), "Llama-3-8B");
        assert_eq!(display_name("org/team/model", &keys()), "model");
        assert_eq!(display_name("standalone", &keys()), "standalone");
        assert_eq!(display_name("trailing/", &keys()), "");
    }

    #[test]
    fn file_stem_passes_plain_keys_through() {
        assert!(matches!(file_stem("meta-llama"), Cow::Borrowed("meta-llama")));
        assert_eq!(file_stem("_other"), "_other");
        assert_eq!(file_stem("x0"), "x0");
    }

    #[test]
    fn file_stem_encodes_separator_and_specials() {
        assert_eq!(file_stem("a/"), "a%2F");
        assert_eq!(file_stem("a%"), "a%25");
        assert_eq!(file_stem(""), "");
        assert_eq!(file_stem("é"), "%C3%A9");
    }

    #[test]
    fn file_stems_differ_ignoring_case() {
        assert_eq!(file_stem("A"), "%41");
        assert_eq!(file_stem("Meta"), "%4Deta");
        let keys = ["A", "a", "Ab", "aB", "ab", "AB", "_other", "%41"];
        let folded: std::collections::BTreeSet<String> =
            keys.iter().map(|k| file_stem(k).to_lowercase()).collect();
        assert_eq!(folded.len(), keys.len());
    }
}
