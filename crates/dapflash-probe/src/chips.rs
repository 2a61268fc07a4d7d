//! Target chips behind each platform, as the probe tools name them

/// One platform's chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chip {
    /// Platform name
    pub platform: &'static str,
    /// Device name for J-Link Commander
    pub jlink_device: &'static str,
    /// Target name for probe-rs
    pub probe_rs_target: &'static str,
    /// Where `.bin` images are loaded
    pub flash_base: u32,
}

const fn chip(
    platform: &'static str,
    jlink_device: &'static str,
    probe_rs_target: &'static str,
    flash_base: u32,
) -> Chip {
    Chip {
        platform,
        jlink_device,
        probe_rs_target,
        flash_base,
    }
}

/// Chips for the platforms the probe back-ends can drive
pub const CHIPS: &[Chip] = &[
    chip("KL25Z", "MKL25Z128xxx4", "MKL25Z128VLK4", 0x0000_0000),
    chip("KL46Z", "MKL46Z256xxx4", "MKL46Z256VLL4", 0x0000_0000),
    chip("K22F", "MK22FN512xxx12", "MK22FN512VLH12", 0x0000_0000),
    chip("K64F", "MK64FN1M0xxx12", "MK64FN1M0VLL12", 0x0000_0000),
    chip("K66F", "MK66FN2M0xxx18", "MK66FN2M0VMD18", 0x0000_0000),
    chip("NRF51_DK", "nRF51422_xxAC", "nRF51422_xxAC", 0x0000_0000),
    chip("NRF52_DK", "nRF52832_xxAA", "nRF52832_xxAA", 0x0000_0000),
    chip("NRF52840_DK", "nRF52840_xxAA", "nRF52840_xxAA", 0x0000_0000),
    chip("NUCLEO_F103RB", "STM32F103RB", "STM32F103RBTx", 0x0800_0000),
    chip("NUCLEO_F401RE", "STM32F401RE", "STM32F401RETx", 0x0800_0000),
    chip("NUCLEO_F411RE", "STM32F411RE", "STM32F411RETx", 0x0800_0000),
    chip("NUCLEO_F429ZI", "STM32F429ZI", "STM32F429ZITx", 0x0800_0000),
    chip("DISCO_L475VG_IOT01A", "STM32L475VG", "STM32L475VGTx", 0x0800_0000),
];

/// Chip for `platform`, ignoring case
pub fn chip_for_platform(platform: &str) -> Option<&'static Chip> {
    CHIPS.iter().find(|c| c.platform.eq_ignore_ascii_case(platform))
}

/// Platform names with a known chip
pub fn platform_names() -> Vec<String> {
    CHIPS.iter().map(|c| c.platform.to_string()).collect()
}
