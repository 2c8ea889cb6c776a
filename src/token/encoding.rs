//! token::encoding
//!
//! How token handles are embedded in ordinary values.
//!
//! # Encodings
//!
//! - **String**: `${Token[<hint>.<id>]}`, freely embeddable in any string
//! - **List**: a one-element list holding `#{Token[<hint>.<id>]}`
//! - **Number**: an IEEE-754 double whose top 16 bits are `0xFBFF` and whose
//!   low 48 bits carry the id. The marker is a large finite negative
//!   number, so encoded values survive arithmetic-free plumbing intact.
//!
//! # Invariants
//!
//! - `split` never produces two adjacent literal fragments
//! - A sentinel whose body does not end in `.<digits>` is plain text

use std::fmt;

/// Opening of a string sentinel.
pub const STRING_START: &str = "${Token[";

/// Opening of a list sentinel.
pub const LIST_START: &str = "#{Token[";

/// Closing of either sentinel.
pub const END: &str = "]}";

const START_LEN: usize = 8;
const NUMBER_MARKER_BITS: u64 = 0xFBFF << 48;
const NUMBER_MARKER_MASK: u64 = 0xFFFF << 48;
const NUMBER_ID_MASK: u64 = (1 << 48) - 1;

/// Default hint used when a caller supplies none.
pub const DEFAULT_HINT: &str = "TOKEN";

/// Process-unique identifier of a registered token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub(crate) u64);

impl TokenId {
    /// Numeric value of the id.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One piece of a string that may contain sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    /// Verbatim text.
    Literal(&'a str),
    /// A `${Token[...]}` sentinel.
    Token(TokenId),
    /// A `#{Token[...]}` sentinel.
    ListToken(TokenId),
}

/// Replace characters that would break the sentinel grammar.
pub fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        DEFAULT_HINT.to_string()
    } else {
        cleaned
    }
}

/// Render a string sentinel.
pub fn string_sentinel(hint: &str, id: TokenId) -> String {
    format!("{STRING_START}{}.{id}{END}", sanitize_hint(hint))
}

/// Render a list sentinel.
pub fn list_sentinel(hint: &str, id: TokenId) -> String {
    format!("{LIST_START}{}.{id}{END}", sanitize_hint(hint))
}

/// Encode a token id as a reserved double.
///
/// # Example
///
/// ```
/// use cxsynth::token::encoding::{decode_number, encode_number};
/// use cxsynth::token::TokenId;
///
/// # fn id() -> TokenId { cxsynth::token::TokenRegistry::new().literal(serde_json::json!(1), cxsynth::token::ValueDomain::Number, "n").id() }
/// let id = id();
/// let n = encode_number(id);
/// assert!(n.is_finite());
/// assert_eq!(decode_number(n), Some(id));
/// assert_eq!(decode_number(42.0), None);
/// ```
pub fn encode_number(id: TokenId) -> f64 {
    f64::from_bits(NUMBER_MARKER_BITS | (id.0 & NUMBER_ID_MASK))
}

/// Decode a double produced by [`encode_number`].
pub fn decode_number(n: f64) -> Option<TokenId> {
    let bits = n.to_bits();
    if bits & NUMBER_MARKER_MASK == NUMBER_MARKER_BITS {
        Some(TokenId(bits & NUMBER_ID_MASK))
    } else {
        None
    }
}

/// Whether the string embeds anything that looks like a sentinel.
pub fn contains_sentinel(s: &str) -> bool {
    s.contains(STRING_START) || s.contains(LIST_START)
}

/// If the whole string is exactly one list sentinel, its id.
pub fn single_list_token(s: &str) -> Option<TokenId> {
    match split(s).as_slice() {
        [Fragment::ListToken(id)] => Some(*id),
        _ => None,
    }
}

/// Split a string around its sentinels.
///
/// # Example
///
/// ```
/// use cxsynth::token::encoding::{split, Fragment};
///
/// let frags = split("arn:${Token[Bucket.Arn.7]}/*");
/// assert_eq!(frags.len(), 3);
/// assert_eq!(frags[0], Fragment::Literal("arn:"));
/// assert!(matches!(frags[1], Fragment::Token(id) if id.value() == 7));
/// assert_eq!(frags[2], Fragment::Literal("/*"));
/// ```
pub fn split(s: &str) -> Vec<Fragment<'_>> {
    let mut fragments = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some((pos, is_list)) = find_start(s, cursor) {
        let body_start = pos + START_LEN;
        let Some(end_rel) = s[body_start..].find(END) else {
            break;
        };
        let body = &s[body_start..body_start + end_rel];

        match parse_body(body) {
            Some(id) => {
                if pos > literal_start {
                    fragments.push(Fragment::Literal(&s[literal_start..pos]));
                }
                fragments.push(if is_list {
                    Fragment::ListToken(id)
                } else {
                    Fragment::Token(id)
                });
                cursor = body_start + end_rel + END.len();
                literal_start = cursor;
            }
            None => cursor = body_start,
        }
    }

    if literal_start < s.len() {
        fragments.push(Fragment::Literal(&s[literal_start..]));
    }

    fragments
}

fn find_start(s: &str, from: usize) -> Option<(usize, bool)> {
    let rest = &s[from..];
    let string_pos = rest.find(STRING_START);
    let list_pos = rest.find(LIST_START);

    match (string_pos, list_pos) {
        (Some(a), Some(b)) if b < a => Some((from + b, true)),
        (Some(a), _) => Some((from + a, false)),
        (None, Some(b)) => Some((from + b, true)),
        (None, None) => None,
    }
}

fn parse_body(body: &str) -> Option<TokenId> {
    let (_, digits) = body.rsplit_once('.')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(TokenId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_sentinel_shape() {
        assert_eq!(
            string_sentinel("Bucket.Arn", TokenId(12)),
            "${Token[Bucket.Arn.12]}"
        );
    }

    #[test]
    fn hint_is_sanitized() {
        assert_eq!(sanitize_hint("a]}b c"), "a__b_c");
        assert_eq!(sanitize_hint(""), DEFAULT_HINT);
    }

    #[test]
    fn split_plain_string() {
        assert_eq!(split("hello"), vec![Fragment::Literal("hello")]);
        assert!(split("").is_empty());
    }

    #[test]
    fn split_pure_token() {
        assert_eq!(split("${Token[X.3]}"), vec![Fragment::Token(TokenId(3))]);
    }

    #[test]
    fn split_adjacent_tokens() {
        assert_eq!(
            split("${Token[A.1]}${Token[B.2]}"),
            vec![Fragment::Token(TokenId(1)), Fragment::Token(TokenId(2))]
        );
    }

    #[test]
    fn split_list_token() {
        assert_eq!(
            split("#{Token[L.9]}"),
            vec![Fragment::ListToken(TokenId(9))]
        );
        assert_eq!(single_list_token("#{Token[L.9]}"), Some(TokenId(9)));
        assert_eq!(single_list_token("x#{Token[L.9]}"), None);
    }

    #[test]
    fn malformed_sentinel_is_literal() {
        let s = "${Token[nope]} and ${Token[ok.5]}";
        assert_eq!(
            split(s),
            vec![
                Fragment::Literal("${Token[nope]} and "),
                Fragment::Token(TokenId(5)),
            ]
        );
    }

    #[test]
    fn unterminated_sentinel_is_literal() {
        assert_eq!(
            split("pre ${Token[A.1"),
            vec![Fragment::Literal("pre ${Token[A.1")]
        );
    }

    #[test]
    fn number_roundtrip() {
        for raw in [1u64, 2, 1000, NUMBER_ID_MASK] {
            let n = encode_number(TokenId(raw));
            assert!(n.is_finite());
            assert!(n < 0.0);
            assert_eq!(decode_number(n), Some(TokenId(raw)));
        }
    }

    #[test]
    fn ordinary_numbers_are_not_tokens() {
        for n in [0.0, -1.0, 1e300, -1e300, f64::MAX, f64::MIN] {
            assert_eq!(decode_number(n), None);
        }
    }
}
