//! Man page generator for dapflash
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![("dapflash.1".to_string(), clap_mangen::Man::new(cmd.clone()))];
    for sub in cmd.get_subcommands() {
        let name = format!("dapflash-{}", sub.get_name());
        let page = clap_mangen::Man::new(sub.clone()).title(name.as_str());
        pages.push((format!("{}.1", name), page));
    }

    for (file, man) in pages {
        let mut buffer = Vec::new();
        man.render(&mut buffer)?;
        let output_path = output_dir.join(file);
        fs::write(&output_path, buffer)?;
        println!("Man page generated at: {}", output_path.display());
    }

    println!("\nTo view the man page:");
    println!("  man -l {}", output_dir.join("dapflash.1").display());
    Ok(())
}
