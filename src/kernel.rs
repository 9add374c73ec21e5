//! Kernel command line and kernel version predicates.

use glob::Pattern;

use crate::error::ConditionError;
use crate::order::parse_order;
use crate::version::version_cmp;
use crate::words;

/// Whether `word` matches the condition parameter. With `=` in the
/// parameter the word must match exactly; a bare token matches itself or any
/// `token=...` assignment.
pub(crate) fn token_matches(word: &str, parameter: &str, has_assignment: bool) -> bool {
    if has_assignment {
        word == parameter
    } else {
        match word.strip_prefix(parameter) {
            Some(rest) => rest.is_empty() || rest.starts_with('='),
            None => false,
        }
    }
}

/// Whether the kernel command line contains the parameter, split into
/// shell-like words. The command line is not under our control, so quoting
/// issues are tolerated rather than rejected.
pub(crate) fn cmdline_matches(cmdline: &str, parameter: &str) -> Result<bool, ConditionError> {
    let has_assignment = parameter.contains('=');
    let words = words::extract_words(cmdline, true)
        .map_err(|reason| ConditionError::parse(cmdline, reason))?;
    Ok(words
        .iter()
        .any(|word| token_matches(word, parameter, has_assignment)))
}

/// Evaluates a kernel version expression list against the release string.
///
/// The parameter is a whitespace-separated sequence of sub-expressions that
/// must all hold. Each is either a comparison operator followed by a version
/// (compared in natural version order), or a bare glob matched against the
/// whole release. An operator may also be separated from its value by
/// whitespace, in which case the value is the following word.
pub(crate) fn kernel_version_matches(
    release: &str,
    parameter: &str,
) -> Result<bool, ConditionError> {
    let words = words::extract_words(parameter, false)
        .map_err(|reason| ConditionError::parse(parameter, reason))?;

    let mut i = 0;
    while i < words.len() {
        let word = words[i].trim();
        let mut rest = word;
        let matched = match parse_order(&mut rest, false) {
            Some(order) => {
                let rest = rest.trim_start();
                let value = if rest.is_empty() {
                    i += 1;
                    match words.get(i) {
                        Some(next) => next.as_str(),
                        None => {
                            return Err(ConditionError::parse(
                                parameter,
                                "unexpected end of expression",
                            ));
                        }
                    }
                } else {
                    rest
                };
                order.ordering_matches(version_cmp(release, value))
            }
            // No operator? Then the word is a glob for the whole release.
            None => Pattern::new(word)
                .map(|p| p.matches(release))
                .unwrap_or(false),
        };

        if !matched {
            return Ok(false);
        }
        i += 1;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_matching() {
        assert!(cmdline_matches("ro quiet splash", "quiet").unwrap());
        assert!(cmdline_matches("ro root=/dev/sda1", "root").unwrap());
        assert!(!cmdline_matches("ro rootwait", "root").unwrap());
        assert!(!cmdline_matches("ro quiet", "verbose").unwrap());
    }

    #[test]
    fn assignment_matching() {
        assert!(cmdline_matches("ro root=/dev/sda1 quiet", "root=/dev/sda1").unwrap());
        assert!(!cmdline_matches("ro root=/dev/sda1", "root=/dev/sda2").unwrap());
        // Quoted values are unquoted before matching.
        assert!(cmdline_matches(r#"opt="a b" ro"#, "opt=a b").unwrap());
    }

    #[test]
    fn version_expression_list_is_a_conjunction() {
        let release = "5.15.0-42-generic";
        assert!(kernel_version_matches(release, ">= 5.10 < 6.0 *-generic").unwrap());
        assert!(!kernel_version_matches("6.1.0", ">= 5.10 < 6.0 *-generic").unwrap());
        assert!(!kernel_version_matches("5.15.0-42-aws", ">= 5.10 < 6.0 *-generic").unwrap());
    }

    #[test]
    fn attached_and_quoted_operators() {
        assert!(kernel_version_matches("5.15.0", ">=5.10").unwrap());
        assert!(kernel_version_matches("5.15.0", "\">= 5.10\" \"<= 6.0\"").unwrap());
        assert!(!kernel_version_matches("4.4.0", ">=5.10").unwrap());
    }

    #[test]
    fn bare_globs() {
        assert!(kernel_version_matches("5.15.0-42-generic", "5.15.*").unwrap());
        assert!(kernel_version_matches("5.15.0-42-generic", "*").unwrap());
        assert!(!kernel_version_matches("5.15.0-42-generic", "4.*").unwrap());
    }

    #[test]
    fn dangling_operator_is_an_error() {
        assert!(kernel_version_matches("5.15.0", ">=").is_err());
        assert!(kernel_version_matches("5.15.0", ">= 5.10 >").is_err());
    }
}
