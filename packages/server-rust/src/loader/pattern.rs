//! File-name glob used to pick module files out of the deployment directory.

use regex::Regex;

use super::error::DiscoveryError;

/// Compiled file-name glob.
///
/// `*` matches any run of characters, `?` matches exactly one, everything
/// else is literal. Matching is case-sensitive and anchored to the whole
/// file name.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidPattern`] if the pattern is blank or
    /// contains a path separator.
    pub fn new(pattern: &str) -> Result<Self, DiscoveryError> {
        let invalid = |message: &str| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
        };

        if pattern.trim().is_empty() {
            return Err(invalid("pattern is blank"));
        }
        if pattern.contains(['/', '\\']) {
            return Err(invalid("pattern must match file names, not paths"));
        }

        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        let mut literal = [0u8; 4];
        for ch in pattern.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|err| invalid(&err.to_string()))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// Returns `true` if `file_name` matches.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    /// The pattern as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let pattern = GlobPattern::new("*-module*").unwrap();
        assert!(pattern.matches("hello-module"));
        assert!(pattern.matches("sp-module.exe"));
        assert!(pattern.matches("-module"));
        assert!(!pattern.matches("hello-plugin"));
        assert!(!pattern.matches("hello-Module"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let pattern = GlobPattern::new("mod?").unwrap();
        assert!(pattern.matches("mod1"));
        assert!(!pattern.matches("mod"));
        assert!(!pattern.matches("mod12"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let pattern = GlobPattern::new("a.b+(c)").unwrap();
        assert!(pattern.matches("a.b+(c)"));
        assert!(!pattern.matches("axbb(c)"));
    }

    #[test]
    fn rejects_blank_and_path_patterns() {
        assert!(matches!(
            GlobPattern::new("  "),
            Err(DiscoveryError::InvalidPattern { .. })
        ));
        assert!(matches!(
            GlobPattern::new("bin/*-module"),
            Err(DiscoveryError::InvalidPattern { .. })
        ));
    }
}
