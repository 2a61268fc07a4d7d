//! USB enumeration of debug probes

use crate::error::{ProbeError, Result};
use dapflash_core::platform::platform_for_target_id;
use dapflash_core::{DeviceType, Enumerator, FlashError, Settings, TargetRecord};
use nusb::MaybeFuture;

/// SEGGER vendor id (J-Link)
pub const SEGGER_VID: u16 = 0x1366;
/// STMicroelectronics vendor id
pub const ST_VID: u16 = 0x0483;
/// ST-LINK/V2, V2-1 and V3 product ids
pub const STLINK_PIDS: &[u16] = &[0x3748, 0x374b, 0x374d, 0x374e, 0x374f, 0x3752, 0x3753, 0x3754];
/// Arm (mbed) vendor id used by DAPLink
pub const ARM_VID: u16 = 0x0d28;
/// DAPLink CMSIS-DAP product id
pub const DAPLINK_PID: u16 = 0x0204;

/// Platform name used when nothing is known about the board behind a probe
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// A probe seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbProbe {
    /// Probe family
    pub device_type: DeviceType,
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// USB serial number string
    pub serial: String,
}

/// Probe family for a USB id pair
pub fn classify_usb(vendor_id: u16, product_id: u16) -> Option<DeviceType> {
    match vendor_id {
        SEGGER_VID => Some(DeviceType::Jlink),
        ST_VID if STLINK_PIDS.contains(&product_id) => Some(DeviceType::Stlink),
        ARM_VID if product_id == DAPLINK_PID => Some(DeviceType::Daplink),
        _ => None,
    }
}

/// Every probe on the bus that reports a serial number
pub fn list_usb_probes() -> Result<Vec<UsbProbe>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| ProbeError::Usb(e.to_string()))?;

    Ok(devices
        .filter_map(|d| {
            let device_type = classify_usb(d.vendor_id(), d.product_id())?;
            let Some(serial) = d.serial_number().filter(|s| !s.is_empty()) else {
                log::debug!(
                    "Ignoring {} probe {:04x}:{:04x} without serial number",
                    device_type,
                    d.vendor_id(),
                    d.product_id()
                );
                return None;
            };
            Some(UsbProbe {
                device_type,
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                serial: serial.to_string(),
            })
        })
        .collect())
}

/// Target record for a probe
///
/// DAPLink serial numbers are target ids and carry the board code; other
/// probes only know their platform through configuration.
pub fn probe_record(probe: &UsbProbe, settings: &Settings) -> TargetRecord {
    let platform = settings
        .probe_platform(&probe.serial)
        .or_else(|| match probe.device_type {
            DeviceType::Daplink => platform_for_target_id(&probe.serial),
            _ => None,
        })
        .unwrap_or(UNKNOWN_PLATFORM);
    TargetRecord::probe(
        probe.serial.clone(),
        probe.device_type,
        platform,
        probe.serial.clone(),
    )
}

/// Enumerates debug probes over USB
pub struct ProbeEnumerator {
    settings: Settings,
}

impl ProbeEnumerator {
    /// Enumerator using `settings` for probe platforms
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Enumerator for ProbeEnumerator {
    fn list_devices(&self) -> dapflash_core::Result<Vec<TargetRecord>> {
        let probes = list_usb_probes().map_err(FlashError::from)?;
        log::debug!("Found {} debug probe(s)", probes.len());
        Ok(probes
            .iter()
            .map(|p| probe_record(p, &self.settings))
            .collect())
    }
}
