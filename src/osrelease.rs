//! os-release key/value comparisons, plus the env-file parser shared with
//! the update timestamp check.

use std::fs;
use std::io;

use crate::error::ConditionError;
use crate::facts;
use crate::order::{parse_order, OrderOp};
use crate::version::version_cmp;
use crate::words;

/// Extracts `key` from env-file formatted content (`KEY=VALUE` lines,
/// `#` comments, optional quoting of the value).
pub(crate) fn env_file_value(content: &str, key: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        if k != key {
            continue;
        }
        return Some(unquote(v).to_string());
    }
    None
}

fn unquote(v: &str) -> &str {
    let v = v.trim();
    for quote in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(quote) && v.ends_with(quote) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

/// Looks up a key in the system os-release file.
pub(crate) fn os_release_value(key: &str) -> Result<Option<String>, ConditionError> {
    for path in ["/etc/os-release", "/usr/lib/os-release"] {
        match fs::read_to_string(path) {
            Ok(content) => return Ok(env_file_value(&content, key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ConditionError::io(path, e)),
        }
    }
    Err(ConditionError::io(
        "/etc/os-release",
        io::Error::from(io::ErrorKind::NotFound),
    ))
}

/// Evaluates a sequence of `KEY<op>VALUE` items against os-release values
/// obtained from `lookup`. All items must match; the first mismatch fails
/// the predicate. `=`/`!=` compare exact strings (a missing key counts as
/// empty), the ordered operators compare in natural version order.
pub(crate) fn os_release_matches(
    parameter: &str,
    mut lookup: impl FnMut(&str) -> Result<Option<String>, ConditionError>,
) -> Result<bool, ConditionError> {
    let items = words::extract_words(parameter, false)
        .map_err(|reason| ConditionError::parse(parameter, reason))?;

    for item in &items {
        let Some(sep) = item.find(['!', '<', '=', '>']) else {
            return Err(ConditionError::parse(parameter, "key/value format expected"));
        };
        let key = &item[..sep];
        let mut rest = &item[sep..];
        if !facts::env_name_is_valid(key) {
            return Err(ConditionError::parse(parameter, "key/value format expected"));
        }

        let Some(order) = parse_order(&mut rest, false) else {
            return Err(ConditionError::parse(parameter, "key/value format expected"));
        };
        // os-release values never carry whitespace after the separator.
        if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            return Err(ConditionError::parse(parameter, "key/value format expected"));
        }

        let actual = lookup(key)?.unwrap_or_default();
        let matches = match order {
            OrderOp::Equal => actual == rest,
            OrderOp::Unequal => actual != rest,
            op => op.ordering_matches(version_cmp(&actual, rest)),
        };
        if !matches {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OS_RELEASE: &str = "\
# A typical os-release file.
NAME=\"Ubuntu\"
ID=ubuntu
ID_LIKE=debian
VERSION_ID=\"22.04\"
PRETTY_NAME='Ubuntu 22.04 LTS'
";

    fn lookup(key: &str) -> Result<Option<String>, ConditionError> {
        Ok(env_file_value(OS_RELEASE, key))
    }

    #[test]
    fn env_file_parsing() {
        assert_eq!(env_file_value(OS_RELEASE, "ID").as_deref(), Some("ubuntu"));
        assert_eq!(env_file_value(OS_RELEASE, "NAME").as_deref(), Some("Ubuntu"));
        assert_eq!(
            env_file_value(OS_RELEASE, "PRETTY_NAME").as_deref(),
            Some("Ubuntu 22.04 LTS")
        );
        assert_eq!(env_file_value(OS_RELEASE, "VERSION_ID").as_deref(), Some("22.04"));
        assert_eq!(env_file_value(OS_RELEASE, "MISSING"), None);
    }

    #[test]
    fn exact_and_versioned_comparisons() {
        assert!(os_release_matches("ID=ubuntu VERSION_ID>=20.04", lookup).unwrap());
        assert!(!os_release_matches("ID=debian", lookup).unwrap());
        // `=` is an exact string match, not a version comparison.
        assert!(!os_release_matches("VERSION_ID=22.4", lookup).unwrap());
        assert!(os_release_matches("VERSION_ID>=22.4", lookup).is_ok());
    }

    #[test]
    fn conjunction_fails_on_first_mismatch() {
        assert!(os_release_matches("ID=ubuntu ID_LIKE=debian", lookup).unwrap());
        assert!(!os_release_matches("ID=ubuntu VERSION_ID<21", lookup).unwrap());
    }

    #[test]
    fn missing_keys_compare_as_empty() {
        assert!(os_release_matches("MISSING!=x", lookup).unwrap());
        assert!(!os_release_matches("MISSING=x", lookup).unwrap());
        assert!(os_release_matches("MISSING<1", lookup).unwrap());
    }

    #[test]
    fn quoted_values_may_hold_spaces() {
        assert!(os_release_matches("\"PRETTY_NAME=Ubuntu 22.04 LTS\"", lookup).unwrap());
    }

    #[test]
    fn syntax_errors() {
        assert!(os_release_matches("novalue", lookup).is_err());
        assert!(os_release_matches("=x", lookup).is_err());
        assert!(os_release_matches("ID=", lookup).is_err());
        assert!(os_release_matches("bad-key=x", lookup).is_err());
        assert!(os_release_matches("\"ID= ubuntu\"", lookup).is_err());
    }
}
