//! Firmware conditions: device tree, EFI and SMBIOS field matching.

use std::fs;
use std::io;
use std::path::Path;

use glob::Pattern;
use tracing::debug;

use crate::error::ConditionError;
use crate::order::{parse_order, OrderOp};
use crate::security;
use crate::version::version_cmp;
use crate::words;

const DTCOMPAT_FILE: &str = "/proc/device-tree/compatible";

pub(crate) fn test_firmware(parameter: &str) -> Result<bool, ConditionError> {
    if parameter == "device-tree" {
        return Ok(fs::exists("/sys/firmware/device-tree").unwrap_or(false));
    }

    if let Some(arg) = parameter.strip_prefix("device-tree-compatible(") {
        let Some(compatible) = arg.strip_suffix(')') else {
            debug!("malformed firmware condition \"{parameter}\"");
            return Ok(false);
        };
        return Ok(devicetree_compatible(compatible));
    }

    if parameter == "uefi" {
        return Ok(security::is_efi_boot());
    }

    if let Some(arg) = parameter.strip_prefix("smbios-field(") {
        let Some(expression) = arg.strip_suffix(')') else {
            return Err(ConditionError::parse(parameter, "malformed smbios-field()"));
        };
        return smbios_field_matches(expression, read_dmi_field);
    }

    debug!("unsupported firmware condition \"{parameter}\"");
    Ok(false)
}

/// Whether the machine's device tree lists the given compatible string.
/// `/proc/device-tree/compatible` is a sequence of NUL-terminated strings.
fn devicetree_compatible(wanted: &str) -> bool {
    let data = match fs::read(DTCOMPAT_FILE) {
        Ok(data) => data,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("failed to read {DTCOMPAT_FILE}, assuming machine is incompatible: {e}");
            }
            return false;
        }
    };

    // One or more strings, each NUL terminated, so the last byte must be NUL.
    if data.last().copied() != Some(0) {
        debug!("{DTCOMPAT_FILE} is empty or in an unknown format, assuming machine is incompatible");
        return false;
    }

    data.split(|&b| b == 0)
        .any(|entry| entry == wanted.as_bytes())
}

fn read_dmi_field(field: &str) -> io::Result<String> {
    fs::read_to_string(Path::new("/sys/class/dmi/id").join(field))
}

/// Evaluates `FIELD OP VALUE` against an SMBIOS field. This is the one place
/// where the glob operators are part of the grammar.
pub(crate) fn smbios_field_matches(
    expression: &str,
    read_field: impl FnOnce(&str) -> io::Result<String>,
) -> Result<bool, ConditionError> {
    let malformed = || ConditionError::parse(expression, "expected FIELD OP VALUE");

    let sep = expression
        .find(['!', '<', '=', '>', '$'])
        .ok_or_else(malformed)?;
    let field = expression[..sep].trim_end();
    let mut rest = &expression[sep..];
    if field.is_empty() || rest.is_empty() {
        return Err(malformed());
    }

    let operator = parse_order(&mut rest, true).ok_or_else(malformed)?;

    let mut value_words =
        words::extract_words(rest, false).map_err(|reason| ConditionError::parse(rest, reason))?;
    if value_words.len() != 1 {
        return Err(malformed());
    }
    let expected = value_words.remove(0);

    if !field_name_valid(field) {
        return Err(ConditionError::parse(expression, "invalid SMBIOS field name"));
    }

    let actual = match read_field(field) {
        Ok(value) => value,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(ConditionError::io(format!("SMBIOS field {field}"), e)),
    };
    let actual = actual.trim_end();

    Ok(match operator {
        OrderOp::FnmatchEqual => Pattern::new(&expected)
            .map(|p| p.matches(actual))
            .unwrap_or(false),
        OrderOp::FnmatchUnequal => !Pattern::new(&expected)
            .map(|p| p.matches(actual))
            .unwrap_or(false),
        op => op.ordering_matches(version_cmp(actual, &expected)),
    })
}

fn field_name_valid(field: &str) -> bool {
    !field.is_empty()
        && field != "."
        && field != ".."
        && field.len() <= 255
        && !field.contains('/')
        && !field.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dell(field: &str) -> io::Result<String> {
        match field {
            "sys_vendor" => Ok("Dell Inc.\n".to_string()),
            "bios_version" => Ok("1.21.0\n".to_string()),
            _ => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    #[test]
    fn glob_comparison_strips_trailing_newline() {
        assert!(smbios_field_matches("sys_vendor =$ *Dell*", dell).unwrap());
        assert!(!smbios_field_matches("sys_vendor !=$ *Dell*", dell).unwrap());
        assert!(!smbios_field_matches("sys_vendor =$ *Lenovo*", dell).unwrap());
    }

    #[test]
    fn ordered_comparisons_use_version_order() {
        assert!(smbios_field_matches("bios_version >= 1.9.0", dell).unwrap());
        assert!(!smbios_field_matches("bios_version < 1.9.0", dell).unwrap());
        assert!(smbios_field_matches("sys_vendor = \"Dell Inc.\"", dell).unwrap());
    }

    #[test]
    fn missing_field_is_false() {
        assert!(!smbios_field_matches("product_name = XPS", dell).unwrap());
    }

    #[test]
    fn malformed_expressions() {
        assert!(smbios_field_matches("sys_vendor", dell).is_err());
        assert!(smbios_field_matches("= foo", dell).is_err());
        assert!(smbios_field_matches("sys_vendor =", dell).is_err());
        assert!(smbios_field_matches("a/b = x", dell).is_err());
        assert!(smbios_field_matches("sys_vendor = one two", dell).is_err());
    }

    #[test]
    fn devicetree_parameter_shapes() {
        // Malformed device-tree-compatible() is false, not an error.
        assert!(!test_firmware("device-tree-compatible(").unwrap());
        assert!(!test_firmware("not-a-firmware").unwrap());
        assert!(test_firmware("smbios-field(").is_err());
    }
}
