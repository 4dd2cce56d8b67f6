//! Single-segment glob patterns.
//!
//! Patterns use shell-style wildcards that never cross a path separator:
//! `*` matches any run of characters except `/`, `?` matches exactly one such
//! character and `[...]` matches one character from a class (`[!...]` or
//! `[^...]` negates it). Runs of `*` are collapsed before compiling, so `**`
//! behaves like `*` instead of recursing into subdirectories.

use glob::{MatchOptions, Pattern, PatternError};

/// Matching options shared by authorization and listing.
pub const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Rewrite a configured pattern into the dialect understood by [`glob`].
///
/// Outside character classes consecutive `*` collapse to one. Inside a class a
/// leading `^` becomes `!`. Everything else is passed through untouched.
pub fn normalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        if in_class {
            out.push(c);
            if c == ']' {
                in_class = false;
            }
            continue;
        }

        match c {
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push('*');
            }
            '[' => {
                out.push('[');
                in_class = true;
                match chars.peek() {
                    Some('^') | Some('!') => {
                        chars.next();
                        out.push('!');
                    }
                    _ => {}
                }
                // A `]` right after the opening bracket is a literal member.
                if chars.peek() == Some(&']') {
                    chars.next();
                    out.push(']');
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Compile a configured pattern.
pub fn compile(pattern: &str) -> Result<Pattern, PatternError> {
    Pattern::new(&normalize(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        compile(pattern).unwrap().matches_with(path, MATCH_OPTIONS)
    }

    #[test]
    fn test_normalize_collapses_stars() {
        assert_eq!(normalize("/var/**/x"), "/var/*/x");
        assert_eq!(normalize("/var/log/***.log"), "/var/log/*.log");
        assert_eq!(normalize("/plain/path"), "/plain/path");
    }

    #[test]
    fn test_normalize_classes() {
        assert_eq!(normalize("/a/[^x]"), "/a/[!x]");
        assert_eq!(normalize("/a/[!x]"), "/a/[!x]");
        assert_eq!(normalize("/a/[]]"), "/a/[]]");
        // Stars inside a class are literal members and left alone.
        assert_eq!(normalize("/a/[**]"), "/a/[**]");
    }

    #[test]
    fn test_star_stays_within_segment() {
        assert!(matches("/logs/*", "/logs/app.log"));
        assert!(!matches("/logs/*", "/logs/nested/app.log"));
        assert!(!matches("/logs/**", "/logs/nested/app.log"));
        assert!(matches("/logs/*/app.log", "/logs/nested/app.log"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        assert!(matches("/logs/app?.log", "/logs/app1.log"));
        assert!(!matches("/logs/app?.log", "/logs/app12.log"));
        assert!(!matches("/logs/?", "/logs//"));
        assert!(matches("/logs/app[0-9].log", "/logs/app7.log"));
        assert!(!matches("/logs/app[0-9].log", "/logs/appx.log"));
        assert!(matches("/logs/app[^0-9].log", "/logs/appx.log"));
        assert!(!matches("/logs/app[^0-9].log", "/logs/app7.log"));
    }

    #[test]
    fn test_star_matches_dotfiles() {
        assert!(matches("/logs/*", "/logs/.hidden"));
    }

    #[test]
    fn test_malformed_pattern() {
        assert!(compile("/logs/[abc").is_err());
    }
}
