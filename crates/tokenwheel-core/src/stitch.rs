//! Token stitching: joining a text prefix with generated tokens.
//!
//! One `StitchMode` is picked per session and used for every path that
//! builds text (accept, confirm, speculation prefixes, undo replay), so
//! `stitch_all` always reproduces what incremental `stitch` calls produced.

use serde::{Deserialize, Serialize};

/// Spacing rule used when appending a token to a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StitchMode {
    /// Plain concatenation. Provider tokens already carry their whitespace.
    #[default]
    Concat,
    /// Insert a single space between words unless punctuation or existing
    /// whitespace makes it unnecessary.
    Smart,
}

impl StitchMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            StitchMode::Concat => "concat",
            StitchMode::Smart => "smart",
        }
    }

    pub fn from_name(name: &str) -> Option<StitchMode> {
        match name.trim().to_lowercase().as_str() {
            "concat" => Some(StitchMode::Concat),
            "smart" => Some(StitchMode::Smart),
            _ => None,
        }
    }
}

/// Characters after which no space is inserted.
const OPENERS: &[char] = &[' ', '\n', '\t', '(', '[', '{', '"', '\'', '-'];

/// Characters before which no space is inserted.
const CLOSERS: &[char] = &['.', ',', '!', '?', ':', ';', ')', ']', '}', '"', '\''];

/// Appends `token` to `prefix` under `mode`.
pub fn stitch(mode: StitchMode, prefix: &str, token: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + token.len() + 1);
    out.push_str(prefix);
    push_token(mode, &mut out, token);
    out
}

/// Left fold of [`stitch`] over `tokens`.
pub fn stitch_all<S: AsRef<str>>(mode: StitchMode, prefix: &str, tokens: &[S]) -> String {
    let mut out = prefix.to_string();
    for token in tokens {
        push_token(mode, &mut out, token.as_ref());
    }
    out
}

fn push_token(mode: StitchMode, out: &mut String, token: &str) {
    if mode == StitchMode::Smart && needs_space(out, token) {
        out.push(' ');
    }
    out.push_str(token);
}

fn needs_space(prefix: &str, token: &str) -> bool {
    let (Some(last), Some(first)) = (prefix.chars().last(), token.chars().next()) else {
        // Empty prefix or empty token: nothing to separate.
        return false;
    };
    !(first.is_whitespace() || OPENERS.contains(&last) || CLOSERS.contains(&first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_joins_verbatim() {
        assert_eq!(
            stitch(StitchMode::Concat, "The cat sat on the", " mat"),
            "The cat sat on the mat"
        );
        assert_eq!(stitch(StitchMode::Concat, "foo", "bar"), "foobar");
    }

    #[test]
    fn test_smart_inserts_space_between_words() {
        assert_eq!(stitch(StitchMode::Smart, "hello", "world"), "hello world");
    }

    #[test]
    fn test_smart_respects_existing_whitespace() {
        assert_eq!(stitch(StitchMode::Smart, "hello", " world"), "hello world");
        assert_eq!(stitch(StitchMode::Smart, "hello ", "world"), "hello world");
        assert_eq!(stitch(StitchMode::Smart, "line\n", "next"), "line\nnext");
    }

    #[test]
    fn test_smart_skips_space_before_closing_punctuation() {
        for token in [".", ",", "!", "?", ":", ";", ")", "]", "}", "\"", "'"] {
            assert_eq!(
                stitch(StitchMode::Smart, "word", token),
                format!("word{token}"),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn test_smart_skips_space_after_openers() {
        for prefix in ["(", "[", "{", "\"", "'", "-"] {
            assert_eq!(
                stitch(StitchMode::Smart, prefix, "x"),
                format!("{prefix}x"),
                "prefix {prefix:?}"
            );
        }
    }

    #[test]
    fn test_smart_empty_prefix_and_empty_token() {
        assert_eq!(stitch(StitchMode::Smart, "", "word"), "word");
        assert_eq!(stitch(StitchMode::Smart, "word", ""), "word");
    }

    #[test]
    fn test_stitch_all_matches_incremental_stitch() {
        let tokens = ["The", " quick", "brown", ",", "fox", "(", "jumps", ")", "."];
        for mode in [StitchMode::Concat, StitchMode::Smart] {
            let mut incremental = String::from("Start:");
            for token in tokens {
                incremental = stitch(mode, &incremental, token);
            }
            assert_eq!(stitch_all(mode, "Start:", &tokens), incremental);
        }
    }

    mod props {
        use proptest::prelude::*;

        use super::super::*;

        fn arb_mode() -> impl Strategy<Value = StitchMode> {
            prop_oneof![Just(StitchMode::Concat), Just(StitchMode::Smart)]
        }

        /// Tokens biased toward the characters the smart rule looks at.
        fn arb_token() -> impl Strategy<Value = String> {
            prop_oneof![
                prop::sample::select(OPENERS).prop_map(String::from),
                prop::sample::select(CLOSERS).prop_map(String::from),
                "[a-z ]{0,4}",
                any::<String>(),
            ]
        }

        proptest! {
            #[test]
            fn stitch_all_is_split_invariant(
                mode in arb_mode(),
                prefix in arb_token(),
                tokens in prop::collection::vec(arb_token(), 0..12),
                split in any::<prop::sample::Index>(),
            ) {
                let whole = stitch_all(mode, &prefix, &tokens);
                let (head, tail) = tokens.split_at(split.index(tokens.len() + 1));
                let resumed = stitch_all(mode, &stitch_all(mode, &prefix, head), tail);
                prop_assert_eq!(&resumed, &whole);

                let incremental = tokens
                    .iter()
                    .fold(prefix.clone(), |acc, t| stitch(mode, &acc, t));
                prop_assert_eq!(&incremental, &whole);
            }

            #[test]
            fn concat_is_plain_concatenation(
                prefix in any::<String>(),
                tokens in prop::collection::vec(arb_token(), 0..12),
            ) {
                prop_assert_eq!(
                    stitch_all(StitchMode::Concat, &prefix, &tokens),
                    format!("{prefix}{}", tokens.concat())
                );
            }

            #[test]
            fn smart_only_ever_adds_single_spaces(
                prefix in arb_token(),
                token in arb_token(),
            ) {
                let out = stitch(StitchMode::Smart, &prefix, &token);
                let plain = format!("{prefix}{token}");
                let spaced = format!("{prefix} {token}");
                prop_assert!(out == plain || out == spaced);
            }
        }
    }

    #[test]
    fn test_stitch_mode_names() {
        assert_eq!(StitchMode::from_name("SMART"), Some(StitchMode::Smart));
        assert_eq!(StitchMode::from_name(" concat "), Some(StitchMode::Concat));
        assert_eq!(StitchMode::from_name("other"), None);
        assert_eq!(StitchMode::default().display_name(), "concat");
    }
}
