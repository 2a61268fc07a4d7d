//! Board code to platform name table
//!
//! DAPLink target ids start with a four-digit board code assigned by the
//! firmware vendor. The table below covers the boards dapflash knows how to
//! drive over mass storage.

/// One board code entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Four-character board code
    pub code: &'static str,
    /// Platform name as used on the command line
    pub name: &'static str,
}

/// Known boards
pub const PLATFORMS: &[Platform] = &[
    Platform { code: "0200", name: "KL25Z" },
    Platform { code: "0210", name: "KL05Z" },
    Platform { code: "0220", name: "KL46Z" },
    Platform { code: "0230", name: "K20D50M" },
    Platform { code: "0231", name: "K22F" },
    Platform { code: "0240", name: "K64F" },
    Platform { code: "0250", name: "KW24D" },
    Platform { code: "0261", name: "KL27Z" },
    Platform { code: "0311", name: "K66F" },
    Platform { code: "0700", name: "NUCLEO_F103RB" },
    Platform { code: "0720", name: "NUCLEO_F401RE" },
    Platform { code: "0740", name: "NUCLEO_F411RE" },
    Platform { code: "0764", name: "DISCO_L475VG_IOT01A" },
    Platform { code: "0796", name: "NUCLEO_F429ZI" },
    Platform { code: "1070", name: "NRF51822" },
    Platform { code: "1100", name: "NRF51_DK" },
    Platform { code: "1101", name: "NRF52_DK" },
    Platform { code: "1234", name: "UBLOX_C027" },
    Platform { code: "5000", name: "ARM_MPS2" },
    Platform { code: "5001", name: "ARM_MPS2_M0" },
    Platform { code: "5002", name: "ARM_MPS2_M0P" },
    Platform { code: "5005", name: "ARM_MPS2_M4" },
    Platform { code: "5007", name: "ARM_MPS2_M7" },
    Platform { code: "9009", name: "ARCH_BLE" },
    Platform { code: "9900", name: "NRF51_MICROBIT" },
];

/// Platform name for a target id, by its board code prefix
pub fn platform_for_target_id(target_id: &str) -> Option<&'static str> {
    let code = target_id.get(..4)?;
    PLATFORMS
        .iter()
        .find(|p| p.code.eq_ignore_ascii_case(code))
        .map(|p| p.name)
}

/// Whether `name` is in the table
pub fn is_known_platform(name: &str) -> bool {
    PLATFORMS.iter().any(|p| p.name.eq_ignore_ascii_case(name))
}

/// MPS2 boards deploy through an SD card image and report through `LOG.TXT`
pub fn is_mps2(platform_name: &str) -> bool {
    platform_name.to_ascii_uppercase().contains("MPS2")
}
