//! List commands implementation

use dapflash_core::TargetRecord;
use dapflash_flash::{available_backends, Orchestrator};

/// List the back-ends compiled into this build
pub fn list_flashers(orchestrator: &Orchestrator) {
    let compiled = available_backends();
    if compiled.is_empty() {
        println!("No flash back-ends compiled in.");
        return;
    }

    println!("Flash back-ends:");
    println!();
    println!("{:<10} {:<14} {:<10} {:<10}", "Name", "Kind", "Methods", "Installed");
    println!("{}", "-".repeat(48));

    for backend in orchestrator.backends() {
        let methods: Vec<&str> = backend.methods().iter().map(|m| m.as_str()).collect();
        let installed = if backend.flasher.is_executable_installed() {
            "yes"
        } else {
            "no"
        };
        println!(
            "{:<10} {:<14} {:<10} {:<10}",
            backend.info.name,
            backend.info.kind.to_string(),
            methods.join(","),
            installed
        );
    }

    println!();
    for info in compiled {
        println!("  {:<10} - {}", info.name, info.description);
    }
}

/// List connected targets, returning the exit code
pub fn list_targets(orchestrator: &Orchestrator) -> u8 {
    let targets = match orchestrator.list() {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("{}", e);
            return e.code();
        }
    };

    if targets.is_empty() {
        println!("No connected devices.");
        return 0;
    }

    println!(
        "{:<26} {:<16} {:<8} {:<28} {:<16}",
        "Target id", "Platform", "Type", "Mount point", "Serial port"
    );
    println!("{}", "-".repeat(98));
    for target in &targets {
        println!("{}", target_row(target));
    }
    0
}

fn target_row(target: &TargetRecord) -> String {
    let mount = target
        .mount_point
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<26} {:<16} {:<8} {:<28} {:<16}",
        target.target_id,
        target.platform_name,
        target.device_type.to_string(),
        mount,
        target.serial_port.as_deref().unwrap_or("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::DeviceType;

    #[test]
    fn test_target_row() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", Some("/dev/ttyACM0".into()));
        let row = target_row(&board);
        assert!(row.starts_with("0240AA "));
        assert!(row.contains("/mnt/a"));
        assert!(row.trim_end().ends_with("/dev/ttyACM0"));

        let probe = TargetRecord::probe("683", DeviceType::Jlink, "NRF52_DK", "683");
        let row = target_row(&probe);
        assert!(row.contains("jlink"));
        assert!(row.trim_end().ends_with('-'));
    }
}
