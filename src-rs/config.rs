//! Runtime configuration.
//!
//! Every section defaults to the values the Workspace suite was tuned with,
//! and a JSON file only needs to name what it overrides. Environment
//! variables are applied after the file and CLI flags after that.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UiTestError};

pub const ENV_BRIDGE: &str = "UITEST_BIN";
pub const ENV_OUT_DIR: &str = "UITEST_OUT_DIR";
pub const ENV_TARGET: &str = "UITEST_TARGET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit bridge executable. Searched for when absent.
    pub bridge: Option<PathBuf>,
    /// Target application name, used for window activation and messages.
    pub target: String,
    /// Directory for screenshots and failure logs.
    pub out_dir: PathBuf,
    pub timeouts: Timeouts,
    pub pacing: Pacing,
    pub modal: ModalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: None,
            target: "Workspace".to_string(),
            out_dir: PathBuf::from("/tmp/uitest_failures"),
            timeouts: Timeouts::default(),
            pacing: Pacing::default(),
            modal: ModalConfig::default(),
        }
    }
}

impl Config {
    /// Loads a JSON config file (`-` reads stdin), then applies the
    /// environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|source| UiTestError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            buf
        } else {
            fs::read_to_string(path).map_err(|source| UiTestError::Io {
                path: path.to_path_buf(),
                source,
            })?
        };
        serde_json::from_str(&raw).map_err(|err| UiTestError::InvalidConfig {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn apply_env(&mut self) {
        if let Some(bin) = non_empty_env(ENV_BRIDGE) {
            self.bridge = Some(PathBuf::from(bin));
        }
        if let Some(dir) = non_empty_env(ENV_OUT_DIR) {
            self.out_dir = PathBuf::from(dir);
        }
        if let Some(target) = non_empty_env(ENV_TARGET) {
            self.target = target;
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Bridge UI commands.
    pub ui_command_secs: u64,
    /// Window-manager and other auxiliary probes.
    pub probe_secs: u64,
    pub screenshot_secs: u64,
    /// `help` probe issued when the client is constructed.
    pub bridge_verify_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ui_command_secs: 10,
            probe_secs: 5,
            screenshot_secs: 10,
            bridge_verify_secs: 5,
        }
    }
}

impl Timeouts {
    pub fn ui_command(&self) -> Duration {
        Duration::from_secs(self.ui_command_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn screenshot(&self) -> Duration {
        Duration::from_secs(self.screenshot_secs)
    }

    pub fn bridge_verify(&self) -> Duration {
        Duration::from_secs(self.bridge_verify_secs)
    }
}

/// Fixed delays inserted between UI-mutating actions.
///
/// These are the main source of flakiness against a slow target, which is
/// why they are configuration and not constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub settle_ms: u64,
    pub pre_click_ms: u64,
    pub drag_step_ms: u64,
    pub focus_pause_ms: u64,
    pub activate_pause_ms: u64,
    pub key_delay_ms: u64,
    pub type_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub interactive_pause_ms: u64,
    /// Smoothed mouse speed in pixels per second.
    pub mouse_speed: f64,
    /// Perpendicular wobble of the Bézier control point, 0 = straight line.
    pub curve_variation: f64,
    /// Sleep between intermediate mouse positions. Off means the path is
    /// still emitted, just without timing.
    pub animate_mouse: bool,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            pre_click_ms: 50,
            drag_step_ms: 50,
            focus_pause_ms: 200,
            activate_pause_ms: 300,
            key_delay_ms: 50,
            type_delay_ms: 20,
            poll_interval_ms: 200,
            interactive_pause_ms: 500,
            mouse_speed: 800.0,
            curve_variation: 0.1,
            animate_mouse: true,
        }
    }
}

impl Pacing {
    /// No sleeps at all. Used by unit tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            pre_click_ms: 0,
            drag_step_ms: 0,
            focus_pause_ms: 0,
            activate_pause_ms: 0,
            key_delay_ms: 0,
            type_delay_ms: 0,
            poll_interval_ms: 0,
            interactive_pause_ms: 0,
            animate_mouse: false,
            ..Self::default()
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn pre_click(&self) -> Duration {
        Duration::from_millis(self.pre_click_ms)
    }

    pub fn drag_step(&self) -> Duration {
        Duration::from_millis(self.drag_step_ms)
    }

    pub fn focus_pause(&self) -> Duration {
        Duration::from_millis(self.focus_pause_ms)
    }

    pub fn activate_pause(&self) -> Duration {
        Duration::from_millis(self.activate_pause_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn interactive_pause(&self) -> Duration {
        Duration::from_millis(self.interactive_pause_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissStrategy {
    /// Press Escape, succeed when the focused window changes.
    Escape,
    /// Press Return to accept the default button.
    Return,
    /// Click the right-hand (default) button computed from the dialog frame.
    ClickDefault,
    /// Click the left-hand (cancel) button.
    ClickCancel,
    /// Send the window-close key combination.
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalConfig {
    pub small_dialog_max_width: i64,
    pub small_dialog_max_height: i64,
    pub alert_keywords: Vec<String>,
    /// Narrower keyword set used by the pre-click focus check.
    pub focus_check_keywords: Vec<String>,
    /// Substrings of WM_CLASS that mark a target-application window.
    pub class_markers: Vec<String>,
    pub known_window_names: Vec<String>,
    /// Small target windows that are utility panels, not modals.
    pub safe_panels: Vec<String>,
    pub button_inset_x: i64,
    pub button_inset_bottom: i64,
    pub escape_attempts: u32,
    /// Fallback order tried by automatic dismissal.
    pub dismiss_order: Vec<DismissStrategy>,
    pub close_keys: String,
    /// Windows closed by the clean-state helper.
    pub utility_windows: Vec<String>,
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            small_dialog_max_width: 500,
            small_dialog_max_height: 400,
            alert_keywords: strings(&[
                "alert", "error", "warning", "confirm", "delete", "save", "open", "choose", "panel",
            ]),
            focus_check_keywords: strings(&["alert", "error", "warning", "confirm", "delete"]),
            class_markers: strings(&["GNUstep", "Workspace"]),
            known_window_names: strings(&[
                "Workspace",
                "Inspector",
                "Info",
                "Finder",
                "Run",
                "Workspace Preferences",
                "About",
                "Console",
                "Recycler",
                "Open With",
                "Go to Folder",
            ]),
            safe_panels: strings(&["Inspector", "Finder", "Preferences", "Run"]),
            button_inset_x: 80,
            button_inset_bottom: 40,
            escape_attempts: 2,
            dismiss_order: vec![
                DismissStrategy::Escape,
                DismissStrategy::ClickDefault,
                DismissStrategy::Close,
            ],
            close_keys: "alt+w".to_string(),
            utility_windows: strings(&[
                "Info",
                "Finder",
                "Workspace Preferences",
                "Run",
                "Open With",
                "Go to Folder",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
