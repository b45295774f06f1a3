//! Screenshots, window state and log files for failed tests.
//!
//! Like the guard, this only talks to the window manager and screenshot
//! tools, so artifacts can still be collected when the target is wedged.
//! Nothing in here returns an error: a failed capture is logged and the
//! original failure is handed back untouched.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::{self, Display, Write as _};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ProcessRunner};
use crate::config::Config;
use crate::wm::{Geometry, MousePosition, WindowManager};

const UNKNOWN_TEST: &str = "unknown";

fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn safe_name(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

/// Text of a panic payload from `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FocusedWindowInfo {
    pub window_id: Option<String>,
    pub window_name: Option<String>,
    pub window_class: Option<String>,
    pub window_geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSnapshot {
    pub timestamp: String,
    pub label: String,
    pub test_name: String,
    pub focused_window: FocusedWindowInfo,
    pub visible_windows: Vec<WindowEntry>,
    pub mouse_position: MousePosition,
}

impl Display for FailureSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let focused = &self.focused_window;
        writeln!(
            f,
            "  Focused window: {} ({})",
            focused.window_name.as_deref().unwrap_or("unknown"),
            focused.window_id.as_deref().unwrap_or("?")
        )?;
        if let Some(class) = &focused.window_class {
            writeln!(f, "    class: {class}")?;
        }
        if let Some(g) = &focused.window_geometry {
            writeln!(f, "    geometry: {}x{} at ({}, {})", g.width, g.height, g.x, g.y)?;
        }
        writeln!(
            f,
            "  Mouse: X={}, Y={}",
            self.mouse_position.x, self.mouse_position.y
        )?;
        writeln!(f, "  Visible windows ({}):", self.visible_windows.len())?;
        for w in &self.visible_windows {
            let name = if w.name.is_empty() { "unnamed" } else { &w.name };
            writeln!(f, "    - {name} ({})", w.id)?;
        }
        Ok(())
    }
}

pub struct FailureCapture {
    runner: Rc<dyn CommandRunner>,
    wm: WindowManager,
    out_dir: PathBuf,
    screenshot_timeout: Duration,
    test_name: RefCell<String>,
    lines: RefCell<Vec<String>>,
}

impl FailureCapture {
    pub fn new(config: &Config) -> Self {
        Self::with_runner(Rc::new(ProcessRunner), config)
    }

    pub fn with_runner(runner: Rc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            wm: WindowManager::new(runner.clone(), config.timeouts.probe()),
            runner,
            out_dir: config.out_dir.clone(),
            screenshot_timeout: config.timeouts.screenshot(),
            test_name: RefCell::new(UNKNOWN_TEST.to_string()),
            lines: RefCell::new(Vec::new()),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn test_name(&self) -> String {
        self.test_name.borrow().clone()
    }

    /// Starts a fresh log buffer for `name`.
    pub fn set_test_name(&self, name: &str) {
        *self.test_name.borrow_mut() = name.to_string();
        self.lines.borrow_mut().clear();
    }

    pub fn log(&self, message: impl Display) {
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S%.3f"));
        info!(test = %self.test_name.borrow(), "{message}");
        self.lines.borrow_mut().push(line);
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    fn ensure_out_dir(&self) -> bool {
        match fs::create_dir_all(&self.out_dir) {
            Ok(()) => true,
            Err(err) => {
                self.log(format!(
                    "Cannot create output directory {}: {err}",
                    self.out_dir.display()
                ));
                false
            }
        }
    }

    fn run_tool(&self, program: &str, args: &[&str]) -> bool {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        match self.runner.run(program, &args, self.screenshot_timeout) {
            Ok(result) => result.success(),
            Err(err) => {
                debug!(program, error = %err, "screenshot tool unavailable");
                false
            }
        }
    }

    /// Dimensions of the image at `path`; anything unreadable is removed.
    fn readable_image(&self, path: &Path) -> Option<(u32, u32)> {
        match image::image_dimensions(path) {
            Ok(dims) => Some(dims),
            Err(err) => {
                if path.exists() {
                    debug!(path = %path.display(), error = %err, "discarding unreadable screenshot");
                    let _ = fs::remove_file(path);
                }
                None
            }
        }
    }

    fn grab_screen(&self, path: &Path) -> Option<(u32, u32)> {
        let target = path.to_string_lossy();
        if self.run_tool("scrot", &[&target]) {
            if let Some(dims) = self.readable_image(path) {
                return Some(dims);
            }
        }
        if self.run_tool("import", &["-window", "root", &target]) {
            if let Some(dims) = self.readable_image(path) {
                return Some(dims);
            }
        }
        let xwd = path.with_extension("xwd");
        let xwd_path = xwd.to_string_lossy();
        if self.run_tool("xwd", &["-root", "-out", &xwd_path]) {
            self.run_tool("convert", &[&xwd_path, &target]);
        }
        let _ = fs::remove_file(&xwd);
        self.readable_image(path)
    }

    /// Full-screen screenshot named after `name` (or the current test),
    /// trying `scrot`, then ImageMagick `import`, then `xwd` + `convert`.
    /// A tool only counts when it leaves a readable image behind.
    pub fn take_screenshot(&self, name: Option<&str>) -> Option<PathBuf> {
        if !self.ensure_out_dir() {
            return None;
        }
        let label = name.map_or_else(|| self.test_name(), str::to_string);
        let path = self
            .out_dir
            .join(format!("{}_{}.png", file_timestamp(), safe_name(&label)));

        let Some((w, h)) = self.grab_screen(&path) else {
            self.log("WARNING: Could not capture screenshot (no tool available)");
            return None;
        };
        self.log(format!("Screenshot saved: {} ({w}x{h})", path.display()));
        Some(path)
    }

    pub fn focused_window_info(&self) -> FocusedWindowInfo {
        let Some(id) = self.wm.active_window_id() else {
            return FocusedWindowInfo::default();
        };
        let class = self.wm.wm_class(&id);
        let geometry = self.wm.window_geometry(&id);
        FocusedWindowInfo {
            window_name: self.wm.window_name(&id),
            window_class: class.contains("WM_CLASS").then_some(class),
            window_geometry: (geometry != Geometry::default()).then_some(geometry),
            window_id: Some(id),
        }
    }

    pub fn all_windows(&self) -> Vec<WindowEntry> {
        self.wm
            .visible_window_ids()
            .into_iter()
            .map(|id| WindowEntry {
                name: self.wm.window_name(&id).unwrap_or_default(),
                id,
            })
            .collect()
    }

    pub fn mouse_position(&self) -> MousePosition {
        self.wm.mouse_location().unwrap_or_default()
    }

    pub fn capture_state(&self, label: &str) -> FailureSnapshot {
        let snapshot = FailureSnapshot {
            timestamp: file_timestamp(),
            label: label.to_string(),
            test_name: self.test_name(),
            focused_window: self.focused_window_info(),
            visible_windows: self.all_windows(),
            mouse_position: self.mouse_position(),
        };
        self.log(format!("State captured: {label}"));
        self.log(format!(
            "  Focused: {}",
            snapshot
                .focused_window
                .window_name
                .as_deref()
                .unwrap_or("unknown")
        ));
        self.log(format!("  Windows: {} visible", snapshot.visible_windows.len()));
        snapshot
    }

    /// Writes the log buffer, `additional` and a fresh state snapshot to
    /// `<timestamp>_<test>_log.txt`.
    pub fn save_log(&self, additional: Option<&str>) -> Option<PathBuf> {
        if !self.ensure_out_dir() {
            return None;
        }
        let test_name = self.test_name();
        let timestamp = file_timestamp();
        let path = self
            .out_dir
            .join(format!("{timestamp}_{}_log.txt", safe_name(&test_name)));

        let mut body = String::new();
        let _ = writeln!(body, "Test: {test_name}");
        let _ = writeln!(body, "Timestamp: {timestamp}");
        let _ = writeln!(body, "{}\n", "=".repeat(60));
        let _ = writeln!(body, "LOG:");
        for line in self.lines.borrow().iter() {
            let _ = writeln!(body, "{line}");
        }
        body.push('\n');
        if let Some(info) = additional.filter(|s| !s.is_empty()) {
            let _ = writeln!(body, "ADDITIONAL INFO:\n{info}\n");
        }
        let state = self.capture_state("at_log_save");
        let _ = write!(body, "CURRENT STATE:\n{state}");

        match fs::write(&path, body) {
            Ok(()) => {
                self.log(format!("Log saved: {}", path.display()));
                Some(path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to save log");
                self.log(format!("Failed to save log: {err}"));
                None
            }
        }
    }

    fn record_failure(&self, name: &str, details: &str) {
        self.take_screenshot(Some(&format!("FAIL_{name}")));
        self.save_log(Some(details));
        self.log(format!(
            "Failure artifacts saved to: {}",
            self.out_dir.display()
        ));
    }

    /// Runs `test` under capture: on an error or a panic the screen, state
    /// and log are saved, then the failure is passed on unchanged.
    pub fn run_captured<T>(
        &self,
        name: &str,
        test: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        self.set_test_name(name);
        self.log(format!("Starting test: {name}"));

        match panic::catch_unwind(AssertUnwindSafe(test)) {
            Ok(Ok(value)) => {
                self.log(format!("Test passed: {name}"));
                Ok(value)
            }
            Ok(Err(err)) => {
                self.log(format!("Test FAILED: {name}"));
                self.log(format!("Error: {err:#}"));
                self.record_failure(name, &format!("{err:?}"));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.log(format!("Test FAILED: {name}"));
                self.log(format!("Panic: {message}"));
                self.record_failure(name, &message);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Records `err` against `test_name` and hands it back for the caller
    /// to return.
    pub fn capture_and_fail<E: Display>(&self, err: E, test_name: &str) -> E {
        self.set_test_name(test_name);
        self.log(format!("Exception caught: {err}"));
        self.record_failure(test_name, &err.to_string());
        err
    }
}
