//! dapflash-dummy - Simulated DAPLink boards for testing
//!
//! [`SimulatedHost`] keeps one directory per board under a root directory
//! and plays the interface firmware's part: it consumes copied images,
//! writes `MBED.HTM` and `DETAILS.TXT`, leaves a `FAIL.TXT` when told to,
//! and can move a board to a new mount point and serial port the way a real
//! remount does. It implements both [`HostIo`] and [`Enumerator`], with
//! simulated by-id listings and a simulated mount table.

use dapflash_core::host::MountEntry;
use dapflash_core::{Enumerator, ErrorKind, FlashError, HostIo, Result, TargetRecord};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Name of the status page every board exposes
pub const STATUS_PAGE: &str = "MBED.HTM";

/// What the simulated firmware does with the next copied file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Consume the file and report nothing
    Succeed,
    /// Consume the file and write `FAIL.TXT` with this content
    Fail(String),
    /// Never consume the file
    Stuck,
    /// Consume the file and come back on a new mount point and serial port
    Remount,
}

/// Static description of a board
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Unique id reported in `DETAILS.TXT`
    pub target_id: String,
    /// Platform name reported by the enumerator
    pub platform_name: String,
    /// Whether `DETAILS.TXT` allows automation files
    pub automation_allowed: bool,
    /// Whether the board has a CDC serial port
    pub serial: bool,
    /// Whether opening the serial port fails
    pub busy_port: bool,
}

impl BoardConfig {
    /// A board with a serial port and automation enabled
    pub fn new(target_id: impl Into<String>, platform_name: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            platform_name: platform_name.into(),
            automation_allowed: true,
            serial: true,
            busy_port: false,
        }
    }
}

/// Counters for one board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardStats {
    /// Files copied onto the volume
    pub copies: u32,
    /// Serial breaks received
    pub resets: u32,
    /// `ERASE.ACT` requests received
    pub erases: u32,
    /// Times the volume moved
    pub remounts: u32,
    /// Last image programmed
    pub image: Option<Vec<u8>>,
}

#[derive(Debug)]
struct Board {
    config: BoardConfig,
    index: usize,
    generation: u32,
    mount_point: PathBuf,
    device: PathBuf,
    serial_port: Option<String>,
    script: VecDeque<Behavior>,
    stats: BoardStats,
}

impl Board {
    fn record(&self) -> TargetRecord {
        TargetRecord::daplink(
            self.config.target_id.clone(),
            self.config.platform_name.clone(),
            self.mount_point.clone(),
            self.serial_port.clone(),
        )
    }
}

/// A set of simulated boards rooted in one directory
#[derive(Debug)]
pub struct SimulatedHost {
    root: PathBuf,
    boards: Mutex<Vec<Board>>,
}

impl SimulatedHost {
    /// Create an empty host; volumes are created under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            boards: Mutex::new(Vec::new()),
        }
    }

    fn boards(&self) -> MutexGuard<'_, Vec<Board>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a board and return its mount point
    pub fn add_board(&self, config: BoardConfig) -> io::Result<PathBuf> {
        let mut boards = self.boards();
        let index = boards.len();
        let mut board = Board {
            serial_port: config
                .serial
                .then(|| format!("/dev/ttyACM{}", index)),
            config,
            index,
            generation: 0,
            mount_point: PathBuf::new(),
            device: PathBuf::new(),
            script: VecDeque::new(),
            stats: BoardStats::default(),
        };
        self.mount(&mut board)?;
        let mount_point = board.mount_point.clone();
        boards.push(board);
        Ok(mount_point)
    }

    /// Queue behaviors for the next copies onto `target_id`
    ///
    /// Copies beyond the script succeed.
    pub fn script(&self, target_id: &str, behaviors: impl IntoIterator<Item = Behavior>) {
        if let Some(board) = self
            .boards()
            .iter_mut()
            .find(|b| b.config.target_id == target_id)
        {
            board.script.extend(behaviors);
        }
    }

    /// Counters for `target_id`
    pub fn stats(&self, target_id: &str) -> Option<BoardStats> {
        self.boards()
            .iter()
            .find(|b| b.config.target_id == target_id)
            .map(|b| b.stats.clone())
    }

    /// Current record for `target_id`
    pub fn record(&self, target_id: &str) -> Option<TargetRecord> {
        self.boards()
            .iter()
            .find(|b| b.config.target_id == target_id)
            .map(Board::record)
    }

    fn mount(&self, board: &mut Board) -> io::Result<()> {
        let name = format!("{}-{}", board.config.target_id, board.generation);
        let mount_point = self.root.join(&name);
        fs::create_dir_all(&mount_point)?;
        fs::write(
            mount_point.join("DETAILS.TXT"),
            format!(
                "# DAPLink Firmware - simulated\r\nUnique ID: {}\r\nAutomation allowed: {}\r\n",
                board.config.target_id,
                u8::from(board.config.automation_allowed)
            ),
        )?;
        fs::write(mount_point.join(STATUS_PAGE), "<html></html>")?;
        board.mount_point = mount_point;
        board.device = PathBuf::from(format!("/dev/sim/{}", name));
        Ok(())
    }

    fn remount(&self, board: &mut Board, total: usize) -> io::Result<()> {
        let old = board.mount_point.clone();
        board.generation += 1;
        self.mount(board)?;
        fs::remove_dir_all(&old)?;
        if board.serial_port.is_some() {
            let port = board.index + total * board.generation as usize;
            board.serial_port = Some(format!("/dev/ttyACM{}", port));
        }
        board.stats.remounts += 1;
        log::debug!(
            "{} remounted at {}",
            board.config.target_id,
            board.mount_point.display()
        );
        Ok(())
    }
}

impl HostIo for SimulatedHost {
    fn copy_image(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let bytes = fs::read(src)?;
        let mut boards = self.boards();
        let total = boards.len();
        let board = boards
            .iter_mut()
            .find(|b| dst.parent() == Some(b.mount_point.as_path()))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{} is not a volume", dst.display()))
            })?;

        board.stats.copies += 1;
        let is_erase = dst
            .file_name()
            .is_some_and(|n| n.eq_ignore_ascii_case("ERASE.ACT"));
        let behavior = board.script.pop_front().unwrap_or(Behavior::Succeed);

        let fail = board.mount_point.join("FAIL.TXT");
        if fail.exists() {
            fs::remove_file(&fail)?;
        }

        match behavior {
            Behavior::Stuck => {
                fs::write(dst, &bytes)?;
                return Ok(());
            }
            Behavior::Fail(text) => fs::write(&fail, text)?,
            Behavior::Succeed => {}
            Behavior::Remount => self.remount(board, total)?,
        }

        if is_erase {
            board.stats.erases += 1;
            board.stats.image = None;
        } else {
            board.stats.image = Some(bytes);
        }
        Ok(())
    }

    fn has_by_id(&self) -> bool {
        true
    }

    fn list_by_id_serial(&self, target_id: &str) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .boards()
            .iter()
            .filter(|b| b.config.target_id.contains(target_id))
            .filter_map(|b| b.serial_port.as_ref().map(PathBuf::from))
            .collect())
    }

    fn list_by_id_block(&self, target_id: &str) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .boards()
            .iter()
            .filter(|b| b.config.target_id.contains(target_id))
            .map(|b| b.device.clone())
            .collect())
    }

    fn list_vfat_mounts(&self) -> io::Result<Vec<MountEntry>> {
        Ok(self
            .boards()
            .iter()
            .map(|b| MountEntry {
                device: b.device.clone(),
                mount_point: b.mount_point.clone(),
            })
            .collect())
    }

    fn send_serial_break(&self, port: &str, _duration: Duration) -> Result<()> {
        let mut boards = self.boards();
        let board = boards
            .iter_mut()
            .find(|b| b.serial_port.as_deref() == Some(port))
            .filter(|b| !b.config.busy_port)
            .ok_or_else(|| {
                FlashError::new(
                    ErrorKind::SerialPortOpenFailed,
                    format!("Failed to open serial port {}", port),
                )
            })?;
        board.stats.resets += 1;
        Ok(())
    }
}

impl Enumerator for SimulatedHost {
    fn list_devices(&self) -> Result<Vec<TargetRecord>> {
        Ok(self.boards().iter().map(Board::record).collect())
    }
}
