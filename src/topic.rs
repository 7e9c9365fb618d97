//! Topic pattern validation and wildcard matching
//!
//! Patterns use the broker's wildcard syntax: `+` matches exactly one topic
//! level, `#` matches the remainder of the topic (including zero levels) and
//! is only valid as the final level. Topics arriving from the transport are
//! always concrete; matching walks pattern and topic levels in lockstep.

/// Returns true if `topic` is an instance of `pattern`.
///
/// `pattern` is assumed valid (see [`validate_pattern`]); an invalid pattern
/// simply fails to match anything it should not.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (None, None) => return true,
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            _ => return false,
        }
    }
}

/// Check that a pattern is well-formed before it enters the dispatch table.
///
/// Rules: non-empty; `#` may only appear as the entire final level; `+` may
/// only appear as an entire level.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern must not be empty".to_string());
    }

    let levels: Vec<&str> = pattern.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(format!("'#' must occupy an entire level, found '{level}'"));
            }
            if i != last {
                return Err("'#' is only allowed as the final level".to_string());
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(format!("'+' must occupy an entire level, found '{level}'"));
        }
    }
    Ok(())
}

/// True if the pattern contains any wildcard level.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.split('/').any(|level| level == "+" || level == "#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("/my/test/topic", "/my/test/topic"));
        assert!(!matches("/my/test/topic", "/my/test/other"));
        assert!(!matches("/my/test/topic", "/my/test"));
        assert!(!matches("/my/test", "/my/test/topic"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("/my/+/topic", "/my/test/topic"));
        assert!(matches("/my/+/topic", "/my/test2/topic"));
        assert!(!matches("/my/+/topic", "/my/test/topic2"));
        assert!(!matches("/my/+/topic", "/my/a/b/topic"));
        // '+' matches exactly one level, not zero
        assert!(!matches("/my/+", "/my"));
        assert!(matches("/my/+", "/my/x"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(matches("#", "/anything/at/all"));
        assert!(matches("/sensors/#", "/sensors/kitchen/temp"));
        assert!(matches("/sensors/#", "/sensors/kitchen"));
        // '#' also matches the parent level itself
        assert!(matches("/sensors/#", "/sensors"));
        assert!(!matches("/sensors/#", "/actuators/kitchen"));
    }

    #[test]
    fn test_combined_wildcards() {
        assert!(matches("/a/+/c/#", "/a/b/c/d/e"));
        assert!(!matches("/a/+/c/#", "/a/b/x/d"));
    }

    #[test]
    fn test_empty_levels_are_significant() {
        // A leading slash produces an empty first level on both sides
        assert!(matches("/my/topic", "/my/topic"));
        assert!(!matches("my/topic", "/my/topic"));
        assert!(matches("+/my/topic", "/my/topic"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("/my/test/topic").is_ok());
        assert!(validate_pattern("/my/+/topic").is_ok());
        assert!(validate_pattern("/my/test/#").is_ok());
        assert!(validate_pattern("#").is_ok());
        assert!(validate_pattern("+").is_ok());

        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("/my/#/topic").is_err());
        assert!(validate_pattern("/my/te#st").is_err());
        assert!(validate_pattern("/my/te+st/topic").is_err());
    }

    #[test]
    fn test_has_wildcards() {
        assert!(!has_wildcards("/my/test/topic"));
        assert!(has_wildcards("/my/+/topic"));
        assert!(has_wildcards("/my/test/#"));
        // embedded characters are not wildcard levels
        assert!(!has_wildcards("/my/a+b/topic"));
    }
}
