//! Target id selector resolution
//!
//! A selector is a full target id, a prefix of one, or the literal `all`.

use crate::error::{ErrorKind, FlashError, Result};
use crate::target::TargetRecord;

/// Selector that matches every enumerated target
pub const ALL_TARGETS: &str = "all";

/// Whether `selector` picks `target_id`
pub fn matches(selector: &str, target_id: &str) -> bool {
    selector == ALL_TARGETS || target_id.starts_with(selector)
}

/// Resolve selectors against enumerated targets
///
/// When `platform` is given, only targets of that platform are candidates.
/// Duplicates are collapsed and the result keeps enumeration order. Fails
/// with:
/// - `target_id_missing` when no selector (or only empty ones) was given
/// - `devices_missing` when nothing was enumerated at all
/// - `platform_mismatch` when selectors matched only other platforms
/// - `could_not_map_target_id_to_device` when nothing matched
/// - `target_id_conflict` when two resolved targets share an endpoint
pub fn resolve(
    selectors: &[String],
    platform: Option<&str>,
    targets: &[TargetRecord],
) -> Result<Vec<TargetRecord>> {
    let selectors: Vec<&str> = selectors
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if selectors.is_empty() {
        return Err(FlashError::new(
            ErrorKind::TargetIdMissing,
            "Target id is missing",
        ));
    }
    if targets.is_empty() {
        return Err(FlashError::new(
            ErrorKind::DevicesMissing,
            "Could not find any connected device",
        ));
    }

    let selected: Vec<&TargetRecord> = targets
        .iter()
        .filter(|t| selectors.iter().any(|s| matches(s, &t.target_id)))
        .collect();

    let resolved: Vec<&TargetRecord> = match platform {
        Some(p) => selected
            .iter()
            .copied()
            .filter(|t| t.platform_name.eq_ignore_ascii_case(p))
            .collect(),
        None => selected.clone(),
    };

    if resolved.is_empty() {
        if let (Some(p), Some(other)) = (platform, selected.first()) {
            return Err(FlashError::new(
                ErrorKind::PlatformMismatch,
                format!(
                    "Target {} is a {}, not a {}",
                    other.target_id, other.platform_name, p
                ),
            ));
        }
        return Err(FlashError::new(
            ErrorKind::CouldNotMapTargetIdToDevice,
            format!(
                "Could not map target id(s) {} to a device",
                selectors.join(", ")
            ),
        ));
    }

    let mut unique: Vec<TargetRecord> = Vec::with_capacity(resolved.len());
    for target in resolved {
        if unique.iter().any(|u| u == target) {
            continue;
        }
        check_conflicts(&unique, target)?;
        unique.push(target.clone());
    }
    Ok(unique)
}

fn check_conflicts(existing: &[TargetRecord], candidate: &TargetRecord) -> Result<()> {
    for other in existing {
        let shared = if other.target_id == candidate.target_id {
            Some("target id")
        } else if other.mount_point.is_some() && other.mount_point == candidate.mount_point {
            Some("mount point")
        } else if other.probe_usb_id.is_some() && other.probe_usb_id == candidate.probe_usb_id {
            Some("probe")
        } else {
            None
        };

        if let Some(what) = shared {
            return Err(FlashError::new(
                ErrorKind::TargetIdConflict,
                format!(
                    "Targets {} and {} share a {}",
                    other.target_id, candidate.target_id, what
                ),
            ));
        }
    }
    Ok(())
}
