//! Shell-style matching of a single path segment.
//!
//! Selectors use `*` (any run of characters), `?` (one character), bracket
//! classes (`[abc]`, `[a-z]`, `[^0-9]`) and `\` escapes. The selector syntax is
//! checked in full and then rewritten into a [`::glob::Pattern`], which does
//! the matching. Separators never appear in a segment, so `*` and `?` match
//! any character.

use ::glob::{MatchOptions, Pattern};

/// A malformed glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error in pattern")]
pub struct BadPattern;

impl From<::glob::PatternError> for BadPattern {
    fn from(_: ::glob::PatternError) -> Self {
        Self
    }
}

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

/// `true` when `segment` contains glob syntax (`*`, `?` or `[`).
#[must_use]
pub fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Match `name` against `pattern`.
///
/// # Errors
///
/// Returns [`BadPattern`] when the pattern is malformed: an unclosed or empty
/// class, a dangling escape, or an inverted range.
pub fn matches(pattern: &str, name: &str) -> Result<bool, BadPattern> {
    Ok(compile(pattern)?.matches_with(name, OPTIONS))
}

/// Check that `pattern` is a well-formed glob.
///
/// # Errors
///
/// Returns [`BadPattern`] for malformed patterns.
pub fn validate(pattern: &str) -> Result<(), BadPattern> {
    compile(pattern).map(|_| ())
}

fn compile(pattern: &str) -> Result<Pattern, BadPattern> {
    let source: String = tokenize(pattern)?.iter().map(render).collect();
    Ok(Pattern::new(&source)?)
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, BadPattern> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if tokens.last() != Some(&Token::AnyRun) {
                    tokens.push(Token::AnyRun);
                }
            }
            '?' => tokens.push(Token::AnyOne),
            '\\' => tokens.push(Token::Literal(chars.next().ok_or(BadPattern)?)),
            '[' => {
                let negated = chars.next_if_eq(&'^').is_some();
                let mut ranges = Vec::new();
                loop {
                    if !ranges.is_empty() && chars.next_if_eq(&']').is_some() {
                        break;
                    }
                    let lo = class_char(&mut chars)?;
                    let hi = if chars.next_if_eq(&'-').is_some() {
                        let hi = class_char(&mut chars)?;
                        if hi < lo {
                            return Err(BadPattern);
                        }
                        hi
                    } else {
                        lo
                    };
                    ranges.push((lo, hi));
                }
                tokens.push(Token::Class { negated, ranges });
            }
            other => tokens.push(Token::Literal(other)),
        }
    }

    Ok(tokens)
}

fn class_char(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<char, BadPattern> {
    match chars.next() {
        None | Some('-' | ']') => Err(BadPattern),
        Some('\\') => chars.next().ok_or(BadPattern),
        Some(c) => Ok(c),
    }
}

/// Spell a token in [`Pattern`] syntax.
fn render(token: &Token) -> String {
    match token {
        Token::Literal(c @ ('*' | '?' | '[')) => format!("[{c}]"),
        Token::Literal(c) => c.to_string(),
        Token::AnyOne => "?".to_string(),
        Token::AnyRun => "*".to_string(),
        Token::Class { negated, ranges } => render_class(*negated, ranges),
    }
}

/// [`Pattern`] classes have no escapes: `]` is literal only in first
/// position, `!` there means negation, and `-` between two characters forms
/// a range. Those characters are split off range ends and placed where they
/// stay literal.
fn render_class(negated: bool, ranges: &[(char, char)]) -> String {
    let mut close = false;
    let mut bang = false;
    let mut dash = false;
    let mut body = String::new();

    let mut mark = |c: char| match c {
        ']' => close = true,
        '!' => bang = true,
        _ => dash = true,
    };

    'ranges: for &(mut lo, mut hi) in ranges {
        while is_class_special(lo) {
            mark(lo);
            if lo == hi {
                continue 'ranges;
            }
            lo = step_up(lo);
        }
        while is_class_special(hi) {
            mark(hi);
            hi = step_down(hi);
        }
        body.push(lo);
        if hi != lo {
            body.push('-');
            body.push(hi);
        }
    }

    let mut out = String::from(if negated { "[!" } else { "[" });
    if close {
        out.push(']');
    }
    out.push_str(&body);
    if bang && out == "[" {
        // A leading `!` would negate the class.
        return if dash { "[-!]".to_string() } else { "!".to_string() };
    }
    if bang {
        out.push('!');
    }
    if dash {
        out.push('-');
    }
    out.push(']');
    out
}

fn is_class_special(c: char) -> bool {
    matches!(c, ']' | '!' | '-')
}

fn step_up(c: char) -> char {
    match c {
        ']' => '^',
        '!' => '"',
        _ => '.',
    }
}

fn step_down(c: char) -> char {
    match c {
        ']' => '\\',
        '!' => ' ',
        _ => ',',
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn star_and_question() {
        assert_eq!(matches("*", "anything"), Ok(true));
        assert_eq!(matches("*", ""), Ok(true));
        assert_eq!(matches("a*", "alpha"), Ok(true));
        assert_eq!(matches("a*", "beta"), Ok(false));
        assert_eq!(matches("a?c", "abc"), Ok(true));
        assert_eq!(matches("a?c", "ac"), Ok(false));
        assert_eq!(matches("*-prod", "eu-prod"), Ok(true));
        assert_eq!(matches("a**b", "axyb"), Ok(true));
        assert_eq!(matches(".*", ".hidden"), Ok(true));
    }

    #[test]
    fn classes() {
        assert_eq!(matches("[abc]x", "bx"), Ok(true));
        assert_eq!(matches("[a-c]x", "dx"), Ok(false));
        assert_eq!(matches("[^a-c]x", "dx"), Ok(true));
        assert_eq!(matches("[^a-c]x", "bx"), Ok(false));
        assert_eq!(matches("v[0-9]", "v7"), Ok(true));
        assert_eq!(matches("[\\]]", "]"), Ok(true));
        assert_eq!(matches("[\\]a]", "a"), Ok(true));
    }

    #[test]
    fn class_characters_that_need_placement() {
        // `!` is an ordinary member, never negation.
        assert_eq!(matches("[!a]x", "!x"), Ok(true));
        assert_eq!(matches("[!a]x", "ax"), Ok(true));
        assert_eq!(matches("[!a]x", "bx"), Ok(false));
        assert_eq!(matches("[!]", "!"), Ok(true));
        assert_eq!(matches("[^!]", "!"), Ok(false));
        assert_eq!(matches("[^!]", "a"), Ok(true));
        // An escaped `-` is a member, not a range.
        assert_eq!(matches("[a\\-z]", "-"), Ok(true));
        assert_eq!(matches("[a\\-z]", "z"), Ok(true));
        assert_eq!(matches("[a\\-z]", "m"), Ok(false));
        assert_eq!(matches("[\\!\\-]", "-"), Ok(true));
        assert_eq!(matches("[\\!\\-]", "!"), Ok(true));
        // Ranges ending on `]` or starting at `!` keep both ends.
        assert_eq!(matches("[X-\\]]", "]"), Ok(true));
        assert_eq!(matches("[X-\\]]", "Z"), Ok(true));
        assert_eq!(matches("[\\!-#]", "!"), Ok(true));
        assert_eq!(matches("[\\!-#]", "\""), Ok(true));
        assert_eq!(matches("[\\!-#]", "$"), Ok(false));
    }

    #[test]
    fn escapes() {
        assert_eq!(matches("\\*", "*"), Ok(true));
        assert_eq!(matches("\\*", "a"), Ok(false));
        assert_eq!(matches("\\[x", "[x"), Ok(true));
        assert_eq!(matches("a\\?", "a?"), Ok(true));
        assert_eq!(matches("a\\?", "ab"), Ok(false));
    }

    #[test]
    fn malformed_patterns() {
        assert_eq!(matches("[", "a"), Err(BadPattern));
        assert_eq!(matches("[]", "a"), Err(BadPattern));
        assert_eq!(matches("[z-a]", "a"), Err(BadPattern));
        assert_eq!(matches("abc\\", "abc"), Err(BadPattern));
        // Rejected even though the first character already mismatches.
        assert_eq!(matches("x[", "abc"), Err(BadPattern));
        assert_eq!(validate("[a-]"), Err(BadPattern));
        assert_eq!(validate("r*-[0-9]"), Ok(()));
    }

    #[test]
    fn many_stars_finish_quickly() {
        let pattern = "*a".repeat(12) + "*b";
        let name = "a".repeat(60);
        let started = Instant::now();
        assert_eq!(matches(&pattern, &name), Ok(false));
        assert_eq!(matches(&pattern, &(name.clone() + "b")), Ok(true));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wildcard_detection() {
        assert!(has_wildcard("a*"));
        assert!(has_wildcard("v?"));
        assert!(has_wildcard("[ab]"));
        assert!(!has_wildcard("_"));
        assert!(!has_wildcard("clients"));
    }
}
