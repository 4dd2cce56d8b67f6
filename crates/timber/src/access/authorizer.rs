//! Path authorization against a resolved pattern list.

use tracing::{debug, warn};

use super::identity::ResolvedAccess;
use super::pattern::{self, MATCH_OPTIONS};

/// Outcome of evaluating one candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Allowed by the pattern at this index of the resolved list.
    Allowed { pattern: usize },
    /// The path contains a `..` segment.
    Traversal,
    /// No pattern matched.
    NoMatch,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Whether `path` contains a `..` segment, with `/` and `\` both treated
/// as separators.
pub fn contains_traversal(path: &str) -> bool {
    if !path.contains("..") {
        return false;
    }
    path.split(['/', '\\']).any(|seg| seg == "..")
}

/// Evaluate `candidate` against `access`.
///
/// Traversal segments are rejected before any pattern is looked at. Patterns
/// are then tried in order and the first match wins. A malformed pattern is
/// reported and skipped.
pub fn evaluate(access: &ResolvedAccess, candidate: &str) -> Decision {
    if contains_traversal(candidate) {
        warn!(path = candidate, "rejected path with traversal segment");
        return Decision::Traversal;
    }

    for (index, raw) in access.patterns().iter().enumerate() {
        let compiled = match pattern::compile(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(pattern = %raw, error = %e, "path match evaluation failed");
                continue;
            }
        };
        if compiled.matches_with(candidate, MATCH_OPTIONS) {
            debug!(path = candidate, pattern = %raw, "path allowed");
            return Decision::Allowed { pattern: index };
        }
    }

    Decision::NoMatch
}

/// Whether `candidate` may be read under `access`.
pub fn authorize(access: &ResolvedAccess, candidate: &str) -> bool {
    evaluate(access, candidate).is_allowed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn access(patterns: &[&str]) -> ResolvedAccess {
        ResolvedAccess::from_patterns(patterns.iter().copied())
    }

    #[test]
    fn test_contains_traversal() {
        assert!(contains_traversal("/var/log/../etc/passwd"));
        assert!(contains_traversal(".."));
        assert!(contains_traversal("/var/log/.."));
        assert!(contains_traversal(r"C:\logs\..\secrets"));
        assert!(contains_traversal(r"/var/log/..\x"));
        assert!(!contains_traversal("/var/log/app..log"));
        assert!(!contains_traversal("/var/log/..."));
        assert!(!contains_traversal("/var/log/app.log"));
    }

    #[test]
    fn test_first_match_wins() {
        let access = access(&["/srv/*", "/var/log/*", "/var/log/app.log"]);
        assert_eq!(
            evaluate(&access, "/var/log/app.log"),
            Decision::Allowed { pattern: 1 }
        );
        assert_eq!(evaluate(&access, "/etc/passwd"), Decision::NoMatch);
    }

    #[test]
    fn test_traversal_denied_regardless_of_patterns() {
        let access = access(&["*", "/*", "/var/*/*", "/var/log/*/*/*"]);
        for path in [
            "/var/log/../shadow",
            "/var/../log/x",
            r"/var\..\log",
            r"/var/log/..\x",
            "../x",
        ] {
            assert_eq!(evaluate(&access, path), Decision::Traversal, "{path}");
            assert!(!authorize(&access, path));
        }
    }

    #[test]
    fn test_empty_access_denies_everything() {
        let access = ResolvedAccess::empty();
        assert!(!authorize(&access, "/var/log/app.log"));
        assert!(!authorize(&access, "/"));
        assert!(!authorize(&access, ""));
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let access = access(&["/var/log/[oops", "/var/log/*.log"]);
        assert_eq!(
            evaluate(&access, "/var/log/app.log"),
            Decision::Allowed { pattern: 1 }
        );

        let only_broken = ResolvedAccess::from_patterns(["/var/log/[oops"]);
        assert!(!authorize(&only_broken, "/var/log/[oops"));
    }

    #[test]
    fn test_wildcards_do_not_cross_segments() {
        let access = access(&["/var/log/*"]);
        assert!(authorize(&access, "/var/log/app.log"));
        assert!(!authorize(&access, "/var/log/nginx/access.log"));

        let access = ResolvedAccess::from_patterns(["/var/log/**"]);
        assert!(!authorize(&access, "/var/log/nginx/access.log"));
    }

    #[test]
    fn test_duplicate_patterns_harmless() {
        let access = access(&["/a/*", "/a/*", "/a/*"]);
        assert!(authorize(&access, "/a/b"));
        assert!(!authorize(&access, "/b/a"));
    }

    #[test]
    fn test_pattern_order_does_not_change_outcome() {
        let patterns = vec![
            "/var/log/*.log",
            "/var/log/[!a]*",
            "/srv/app/??.txt",
            "/broken/[x",
            "/home/*/notes",
        ];
        let candidates = [
            "/var/log/app.log",
            "/var/log/bpp",
            "/var/log/app",
            "/srv/app/ab.txt",
            "/srv/app/abc.txt",
            "/home/alice/notes",
            "/home/alice/x/notes",
            "/broken/[x",
        ];

        let expected: Vec<bool> = candidates
            .iter()
            .map(|c| authorize(&access(&patterns), c))
            .collect();

        let mut rng = rand::thread_rng();
        let mut shuffled = patterns.clone();
        for _ in 0..25 {
            shuffled.shuffle(&mut rng);
            let actual: Vec<bool> = candidates
                .iter()
                .map(|c| authorize(&access(&shuffled), c))
                .collect();
            assert_eq!(actual, expected, "order {shuffled:?}");
        }
    }
}
