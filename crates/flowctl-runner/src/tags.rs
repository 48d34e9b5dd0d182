use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 10;
const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

/// Generates a fresh 10-hex-character multi-instance suffix. Collisions
/// within a project are expected not to occur; callers rely on discovery,
/// not allocation-time deduplication, as the source of truth.
pub fn generate_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| HEX_ALPHABET[rng.gen_range(0..HEX_ALPHABET.len())] as char)
        .collect()
}

/// Generates a filler alphanumeric token, kept for parity with the
/// teacher's id-generation style where a wider alphabet is acceptable;
/// unused by the tag protocol itself, which requires hex.
#[allow(dead_code)]
pub fn generate_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Looks up the value of a `key:` tag within a tag set, e.g. `"job"` or
/// `"multi"`.
pub fn tag_value<'a>(tags: &'a [String], key: &str) -> Option<&'a str> {
    let prefix = format!("{key}:");
    tags.iter().find_map(|t| t.strip_prefix(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_ten_hex_chars() {
        let s = generate_suffix();
        assert_eq!(s.len(), SUFFIX_LEN);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn tag_value_extracts_prefix() {
        let tags = vec!["project:demo".to_string(), "job:train".to_string()];
        assert_eq!(tag_value(&tags, "job"), Some("train"));
        assert_eq!(tag_value(&tags, "multi"), None);
    }
}
