//! Input injection and screen capture for one Android device.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::detection::Point;
use crate::io::process::run_command_with_timeout;

/// PNG-encoded screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(pub Vec<u8>);

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

impl Frame {
    pub fn is_png(&self) -> bool {
        self.0.starts_with(PNG_MAGIC)
    }
}

/// Hardware keys the bot presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Back,
}

impl KeyCode {
    pub fn code(self) -> u32 {
        match self {
            KeyCode::Back => 4,
        }
    }
}

/// Input and capture primitives against one device.
///
/// Every call may fail (device disconnected, command timeout). Callers log the
/// error and treat it as "no progress"; nothing here is fatal to the loop.
pub trait Device {
    fn tap(&self, point: Point) -> Result<()>;
    fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<()>;
    fn press_key(&self, key: KeyCode) -> Result<()>;
    fn capture(&self) -> Result<Frame>;
    /// Force-stop and relaunch the application.
    fn restart_app(&self) -> Result<()>;
}

/// [`Device`] backed by the `adb` command-line tool.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: PathBuf,
    serial: String,
    package: String,
    timeout: Duration,
    capture_limit_bytes: usize,
}

/// Pause between force-stop and relaunch so the process is fully gone.
const RESTART_GAP: Duration = Duration::from_secs(2);

impl AdbDevice {
    pub fn new(
        adb_path: impl Into<PathBuf>,
        serial: impl Into<String>,
        package: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
            package: package.into(),
            timeout,
            capture_limit_bytes: 16 * 1024 * 1024,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        cmd.arg("-s").arg(&self.serial).args(args);
        cmd
    }

    fn shell(&self, label: &str, args: &[&str]) -> Result<()> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let out = run_command_with_timeout(self.command(&full), None, self.timeout, 64 * 1024)
            .with_context(|| format!("adb {label} on {}", self.serial))?;
        out.ensure_success(&format!("adb {label}"))
    }
}

impl Device for AdbDevice {
    #[instrument(skip_all, fields(serial = %self.serial, x = point.x, y = point.y))]
    fn tap(&self, point: Point) -> Result<()> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        self.shell("tap", &["input", "tap", &x, &y])
    }

    #[instrument(skip_all, fields(serial = %self.serial))]
    fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<()> {
        let args = [
            from.x.to_string(),
            from.y.to_string(),
            to.x.to_string(),
            to.y.to_string(),
            duration.as_millis().to_string(),
        ];
        let mut full = vec!["input", "swipe"];
        full.extend(args.iter().map(String::as_str));
        self.shell("swipe", &full)
    }

    #[instrument(skip_all, fields(serial = %self.serial, key = ?key))]
    fn press_key(&self, key: KeyCode) -> Result<()> {
        let code = key.code().to_string();
        self.shell("keyevent", &["input", "keyevent", &code])
    }

    #[instrument(skip_all, fields(serial = %self.serial))]
    fn capture(&self) -> Result<Frame> {
        let cmd = self.command(&["exec-out", "screencap", "-p"]);
        let out = run_command_with_timeout(cmd, None, self.timeout, self.capture_limit_bytes)
            .with_context(|| format!("adb screencap on {}", self.serial))?;
        out.ensure_success("adb screencap")?;
        let frame = Frame(out.stdout);
        if !frame.is_png() {
            bail!("adb screencap on {} returned non-PNG data", self.serial);
        }
        debug!(bytes = frame.0.len(), "captured frame");
        Ok(frame)
    }

    #[instrument(skip_all, fields(serial = %self.serial, package = %self.package))]
    fn restart_app(&self) -> Result<()> {
        self.shell("force-stop", &["am", "force-stop", &self.package])?;
        std::thread::sleep(RESTART_GAP);
        self.shell(
            "launch",
            &[
                "monkey",
                "-p",
                &self.package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ],
        )
    }
}
