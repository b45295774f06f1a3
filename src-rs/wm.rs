//! Window-manager queries and raw input events via `xdotool` and `xprop`.
//!
//! Nothing here goes through the bridge, so it keeps working while the
//! target is blocked behind a modal dialog. Queries are lenient (a failed
//! probe reads as "nothing there"); actions return errors.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;

use crate::command::{CommandResult, CommandRunner};
use crate::config::ModalConfig;
use crate::error::{Result, UiTestError};

pub const XDOTOOL: &str = "xdotool";
const XPROP: &str = "xprop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn code(self) -> &'static str {
        match self {
            MouseButton::Left => "1",
            MouseButton::Middle => "2",
            MouseButton::Right => "3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Which dialog button to aim for: right is usually OK/Accept, left Cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPosition {
    Left,
    Right,
    Center,
}

impl Geometry {
    /// Estimated centre of a dialog button, `inset_bottom` up from the
    /// bottom edge and `inset_x` in from the chosen side.
    pub fn button_point(&self, position: ButtonPosition, inset_x: i64, inset_bottom: i64) -> (i64, i64) {
        let y = self.y + self.height - inset_bottom;
        let x = match position {
            ButtonPosition::Right => self.x + self.width - inset_x,
            ButtonPosition::Left => self.x + inset_x,
            ButtonPosition::Center => self.x + self.width / 2,
        };
        (x, y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WindowInfo {
    pub window_id: String,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub wm_class: String,
}

impl WindowInfo {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_small_dialog(&self, modal: &ModalConfig) -> bool {
        self.width > 0
            && self.width < modal.small_dialog_max_width
            && self.height < modal.small_dialog_max_height
    }

    /// Keyword match against the window name or its WM_CLASS.
    pub fn looks_like_alert(&self, keywords: &[String]) -> bool {
        let name = self.name.to_lowercase();
        let class = self.wm_class.to_lowercase();
        keywords.iter().any(|kw| {
            let kw = kw.to_lowercase();
            name.contains(&kw) || class.contains(&kw)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MousePosition {
    #[serde(rename = "X")]
    pub x: i64,
    #[serde(rename = "Y")]
    pub y: i64,
}

/// Parses `KEY=value` lines (xdotool `--shell` output), keeping integer
/// values only.
pub fn parse_shell_kv(output: &str) -> HashMap<String, i64> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter_map(|(k, v)| Some((k.trim().to_string(), v.trim().parse().ok()?)))
        .collect()
}

fn window_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct WindowManager {
    runner: Rc<dyn CommandRunner>,
    timeout: Duration,
}

impl WindowManager {
    pub fn new(runner: Rc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn xdotool(&self, args: &[&str]) -> Result<CommandResult> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(XDOTOOL, &args, self.timeout)
    }

    fn act(&self, args: &[&str]) -> Result<String> {
        let result = self.xdotool(args)?;
        if !result.success() {
            return Err(UiTestError::command_failed(format!(
                "xdotool failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(result.stdout.trim().to_string())
    }

    fn probe(&self, args: &[&str]) -> Option<String> {
        let result = self.xdotool(args).ok()?;
        let out = result.stdout.trim();
        (result.success() && !out.is_empty()).then(|| out.to_string())
    }

    pub fn active_window_id(&self) -> Option<String> {
        self.probe(&["getactivewindow"])
    }

    pub fn window_name(&self, window_id: &str) -> Option<String> {
        self.probe(&["getwindowname", window_id])
    }

    /// Zeroes for any field the tool did not report.
    pub fn window_geometry(&self, window_id: &str) -> Geometry {
        let kv = self
            .probe(&["getwindowgeometry", "--shell", window_id])
            .map(|out| parse_shell_kv(&out))
            .unwrap_or_default();
        let get = |key: &str| kv.get(key).copied().unwrap_or(0);
        Geometry {
            x: get("X"),
            y: get("Y"),
            width: get("WIDTH"),
            height: get("HEIGHT"),
        }
    }

    /// Raw `xprop WM_CLASS` line, empty when unavailable.
    pub fn wm_class(&self, window_id: &str) -> String {
        let args = vec!["-id".to_string(), window_id.to_string(), "WM_CLASS".to_string()];
        match self.runner.run(XPROP, &args, self.timeout) {
            Ok(result) if result.success() => result.stdout.trim().to_string(),
            _ => String::new(),
        }
    }

    pub fn window_info(&self, window_id: &str) -> WindowInfo {
        let geometry = self.window_geometry(window_id);
        WindowInfo {
            window_id: window_id.to_string(),
            name: self.window_name(window_id).unwrap_or_default(),
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            wm_class: self.wm_class(window_id),
        }
    }

    pub fn focused_window(&self) -> Option<WindowInfo> {
        let id = self.active_window_id()?;
        Some(self.window_info(&id))
    }

    pub fn visible_window_ids(&self) -> Vec<String> {
        self.probe(&["search", "--onlyvisible", "--name", ""])
            .map(|out| window_ids(&out))
            .unwrap_or_default()
    }

    pub fn visible_windows(&self) -> Vec<WindowInfo> {
        self.visible_window_ids()
            .iter()
            .map(|id| self.window_info(id))
            .collect()
    }

    pub fn search_by_name(&self, name: &str) -> Vec<String> {
        self.probe(&["search", "--name", name])
            .map(|out| window_ids(&out))
            .unwrap_or_default()
    }

    pub fn search_by_class(&self, class_name: &str) -> Vec<String> {
        self.probe(&["search", "--class", class_name])
            .map(|out| window_ids(&out))
            .unwrap_or_default()
    }

    pub fn activate(&self, window_id: &str) -> Result<()> {
        self.act(&["windowactivate", window_id]).map(drop)
    }

    pub fn mouse_location(&self) -> Result<MousePosition> {
        let kv = parse_shell_kv(&self.act(&["getmouselocation", "--shell"])?);
        Ok(MousePosition {
            x: kv.get("X").copied().unwrap_or(0),
            y: kv.get("Y").copied().unwrap_or(0),
        })
    }

    pub fn mouse_move(&self, x: i64, y: i64) -> Result<()> {
        self.act(&["mousemove", &x.to_string(), &y.to_string()])
            .map(drop)
    }

    pub fn click(&self, button: MouseButton) -> Result<()> {
        self.act(&["click", button.code()]).map(drop)
    }

    pub fn double_click(&self, button: MouseButton) -> Result<()> {
        self.act(&["click", "--repeat", "2", "--delay", "50", button.code()])
            .map(drop)
    }

    pub fn mouse_down(&self, button: MouseButton) -> Result<()> {
        self.act(&["mousedown", button.code()]).map(drop)
    }

    pub fn mouse_up(&self, button: MouseButton) -> Result<()> {
        self.act(&["mouseup", button.code()]).map(drop)
    }

    /// Sends a key or chord, e.g. `Escape` or `alt+shift+n`.
    pub fn key(&self, spec: &str, delay_ms: u64) -> Result<()> {
        self.act(&["key", "--delay", &delay_ms.to_string(), spec])
            .map(drop)
    }

    pub fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        self.act(&["type", "--delay", &delay_ms.to_string(), text])
            .map(drop)
    }
}
