//! The needs-update check: whether `/usr/` has been updated more recently
//! than a target directory's `.updated` stamp.
//!
//! Unexpected failures make the check answer "yes": invoking an update tool
//! once too often is cheaper than missing an update.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tracing::debug;

use crate::error::ConditionError;
use crate::facts;
use crate::osrelease;
use crate::paths;

const CMDLINE_OVERRIDE: &str = "systemd.condition-needs-update";

pub(crate) fn test_needs_update(parameter: &str) -> Result<bool, ConditionError> {
    match facts::proc_cmdline_get_bool(CMDLINE_OVERRIDE) {
        Ok(Some(b)) => return Ok(b),
        Ok(None) => {}
        Err(e) => debug!("failed to parse {CMDLINE_OVERRIDE}= kernel command line argument, ignoring: {e}"),
    }

    if facts::in_initrd() {
        debug!("in an initrd, not doing any updates");
        return Ok(false);
    }

    if !Path::new(parameter).is_absolute() {
        debug!("condition parameter '{parameter}' is not absolute, assuming an update is needed");
        return Ok(true);
    }

    // A read-only file system cannot be updated anyway.
    match paths::path_is_read_only_fs(Path::new(parameter)) {
        Ok(true) => return Ok(false),
        Ok(false) => {}
        Err(e) => debug!("failed to determine if '{parameter}' is read-only, ignoring: {e}"),
    }

    Ok(stamp_is_outdated(Path::new(parameter), Path::new("/usr/")))
}

/// Compares the `.updated` stamp below `target` against the mtime of `usr`.
fn stamp_is_outdated(target: &Path, usr: &Path) -> bool {
    let stamp = target.join(".updated");

    let stamp_meta = match fs::symlink_metadata(&stamp) {
        Ok(meta) => meta,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(
                    "failed to stat '{}', assuming an update is needed: {e}",
                    stamp.display()
                );
            }
            return true;
        }
    };

    let usr_meta = match fs::symlink_metadata(usr) {
        Ok(meta) => meta,
        Err(e) => {
            debug!(
                "failed to stat '{}', assuming an update is needed: {e}",
                usr.display()
            );
            return true;
        }
    };

    // Seconds are always accurate.
    if usr_meta.mtime() != stamp_meta.mtime() {
        return usr_meta.mtime() > stamp_meta.mtime();
    }

    // Nanoseconds are only trustworthy when both filesystems record them: a
    // zero stamp nanosecond field may just mean the filesystem cannot store
    // them, unless /usr's own field is zero too.
    if usr_meta.mtime_nsec() == 0 || stamp_meta.mtime_nsec() > 0 {
        return usr_meta.mtime_nsec() > stamp_meta.mtime_nsec();
    }

    // Equal seconds and untrustworthy nanoseconds; the stamp file may carry
    // the exact update time instead.
    let timestamp = match fs::read_to_string(&stamp) {
        Ok(content) => match osrelease::env_file_value(&content, "TIMESTAMP_NSEC") {
            Some(value) => match value.parse::<u64>() {
                Ok(ns) => ns,
                Err(_) => {
                    debug!(
                        "failed to parse timestamp value '{value}' in '{}', using mtime",
                        stamp.display()
                    );
                    return true;
                }
            },
            None => {
                debug!("no timestamp in '{}', using mtime", stamp.display());
                return true;
            }
        },
        Err(e) => {
            debug!("failed to read '{}', using mtime: {e}", stamp.display());
            return true;
        }
    };

    let usr_nsec =
        i128::from(usr_meta.mtime()) * 1_000_000_000 + i128::from(usr_meta.mtime_nsec());
    usr_nsec > i128::from(timestamp)
}
