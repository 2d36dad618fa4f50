//! Variation codes.
//!
//! A variation is shown to the user as a bijective base-26 letter code:
//! 1 is "A", 26 is "Z", 27 is "AA". Codes are at most six letters long.

pub const MAX_LETTERS: usize = 6;
pub const MIN_VARIATION: i64 = 1;
/// Largest value representable in `MAX_LETTERS` letters.
pub const MAX_VARIATION: i64 = 321_272_406;

pub fn to_code(variation: i64) -> String {
    let mut v = variation.clamp(MIN_VARIATION, MAX_VARIATION);
    let mut letters = Vec::with_capacity(MAX_LETTERS);
    while v > 0 {
        v -= 1;
        letters.push(b'A' + (v % 26) as u8);
        v /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Parse a letter code, case-insensitively. `None` for empty, too long, or non-letter input.
pub fn from_code(code: &str) -> Option<i64> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_LETTERS {
        return None;
    }
    code.bytes().try_fold(0i64, |acc, b| {
        b.is_ascii_alphabetic()
            .then(|| acc * 26 + i64::from(b.to_ascii_uppercase() - b'A') + 1)
    })
}

pub fn next(variation: i64) -> i64 {
    let v = variation.saturating_add(1);
    if !(MIN_VARIATION..=MAX_VARIATION).contains(&v) {
        MIN_VARIATION
    } else {
        v
    }
}

pub fn prev(variation: i64) -> i64 {
    let v = variation.saturating_sub(1);
    if !(MIN_VARIATION..=MAX_VARIATION).contains(&v) {
        MAX_VARIATION
    } else {
        v
    }
}

/// Random variation of three letters, the range a fresh document starts in.
pub fn random() -> i64 {
    use rand::Rng;
    rand::thread_rng().gen_range(703..=18_278)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_double_letter_codes() {
        assert_eq!(to_code(1), "A");
        assert_eq!(to_code(26), "Z");
        assert_eq!(to_code(27), "AA");
        assert_eq!(to_code(702), "ZZ");
        assert_eq!(to_code(703), "AAA");
        assert_eq!(to_code(MAX_VARIATION), "ZZZZZZ");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(from_code("aa"), Some(27));
        assert_eq!(from_code(" Zz "), Some(702));
        assert_eq!(from_code("ZZZZZZ"), Some(MAX_VARIATION));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(from_code(""), None);
        assert_eq!(from_code("AB1"), None);
        assert_eq!(from_code("AAAAAAA"), None);
    }

    #[test]
    fn stepping_wraps_around_the_range() {
        assert_eq!(next(MAX_VARIATION), MIN_VARIATION);
        assert_eq!(prev(MIN_VARIATION), MAX_VARIATION);
        assert_eq!(next(5), 6);
        assert_eq!(prev(0), MAX_VARIATION);
    }

    #[test]
    fn random_starts_with_three_letters() {
        for _ in 0..32 {
            assert_eq!(to_code(random()).len(), 3);
        }
    }
}
