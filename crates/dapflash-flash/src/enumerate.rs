//! Enumerating across back-ends
//!
//! A DAPLink board shows up twice: once as a volume and once as a CMSIS-DAP
//! probe with the same serial number. [`CompositeEnumerator`] folds such
//! pairs into one record carrying both the mount point and the probe id.

use dapflash_core::{Enumerator, Result, TargetRecord};
use std::sync::Arc;

/// Platform placeholder that a better-informed record may replace
const UNKNOWN_PLATFORM: &str = "unknown";

/// Merges the records of several enumerators by target id
pub struct CompositeEnumerator {
    sources: Vec<Arc<dyn Enumerator>>,
}

impl CompositeEnumerator {
    /// Merge `sources`, earlier sources taking precedence
    pub fn new(sources: Vec<Arc<dyn Enumerator>>) -> Self {
        Self { sources }
    }
}

/// Fold `other` into `into` if they describe complementary views of one
/// board
fn merge(into: &mut TargetRecord, other: &TargetRecord) -> bool {
    if into.target_id != other.target_id {
        return false;
    }
    if into.mount_point.is_some() && other.mount_point.is_some() {
        return false;
    }
    if into.probe_usb_id.is_some() && other.probe_usb_id.is_some() {
        return false;
    }

    if into.mount_point.is_none() {
        into.mount_point = other.mount_point.clone();
    }
    if into.serial_port.is_none() {
        into.serial_port = other.serial_port.clone();
    }
    if into.probe_usb_id.is_none() {
        into.probe_usb_id = other.probe_usb_id.clone();
    }
    if into.platform_name == UNKNOWN_PLATFORM {
        into.platform_name = other.platform_name.clone();
    }
    true
}

impl Enumerator for CompositeEnumerator {
    fn list_devices(&self) -> Result<Vec<TargetRecord>> {
        let mut merged: Vec<TargetRecord> = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;

        for source in &self.sources {
            let records = match source.list_devices() {
                Ok(records) => {
                    any_ok = true;
                    records
                }
                Err(e) => {
                    log::warn!("Device enumeration failed: {}", e);
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            for record in records {
                if !merged.iter_mut().any(|m| merge(m, &record)) {
                    merged.push(record);
                }
            }
        }

        match first_error {
            Some(e) if !any_ok => Err(e),
            _ => Ok(merged),
        }
    }
}
