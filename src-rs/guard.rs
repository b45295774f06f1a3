//! Modal-dialog and focus-stealer handling.
//!
//! The bridge's `query` can hang while the target shows a modal, so every
//! check here is answered by the window manager alone. Dismissal is best
//! effort: failures come back as `false`, never as errors.

use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ProcessRunner};
use crate::config::{Config, DismissStrategy, ModalConfig, Pacing};
use crate::retry::{pause, RetryPolicy};
use crate::wm::{ButtonPosition, MouseButton, WindowInfo, WindowManager};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PreClickReport {
    pub ok: bool,
    pub focused_window: Option<String>,
    pub modal_detected: Option<String>,
    pub actions_taken: Vec<String>,
}

pub struct ModalGuard {
    wm: WindowManager,
    modal: ModalConfig,
    pacing: Pacing,
    target: String,
}

impl ModalGuard {
    pub fn new(config: &Config) -> Self {
        Self::with_runner(Rc::new(ProcessRunner), config)
    }

    pub fn with_runner(runner: Rc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            wm: WindowManager::new(runner, config.timeouts.probe()),
            modal: config.modal.clone(),
            pacing: config.pacing.clone(),
            target: config.target.clone(),
        }
    }

    pub fn window_manager(&self) -> &WindowManager {
        &self.wm
    }

    pub fn focused_window(&self) -> Option<WindowInfo> {
        self.wm.focused_window()
    }

    pub fn visible_windows(&self) -> Vec<WindowInfo> {
        self.wm.visible_windows()
    }

    /// WM_CLASS carries a target marker, or the name contains one of the
    /// target's known window names.
    pub fn is_target_window(&self, window: &WindowInfo) -> bool {
        self.modal
            .class_markers
            .iter()
            .any(|m| window.wm_class.contains(m.as_str()))
            || self
                .modal
                .known_window_names
                .iter()
                .any(|n| window.name.contains(n.as_str()))
    }

    fn looks_like_alert(&self, window: &WindowInfo) -> bool {
        window.looks_like_alert(&self.modal.alert_keywords)
    }

    fn is_small_dialog(&self, window: &WindowInfo) -> bool {
        window.is_small_dialog(&self.modal)
    }

    /// Whether something other than the expected window holds focus.
    ///
    /// With `expected`, a target window that looks modal counts as a
    /// stealer; without it only alert-looking target windows do. Foreign
    /// windows always do. Unknown focus reads as no stealer.
    pub fn has_focus_stealer(&self, expected: Option<&str>) -> bool {
        let Some(focused) = self.focused_window() else {
            return false;
        };
        match expected {
            Some(expected) => {
                if focused
                    .name
                    .to_lowercase()
                    .contains(&expected.to_lowercase())
                {
                    false
                } else if self.is_target_window(&focused) {
                    self.looks_like_alert(&focused) || self.is_small_dialog(&focused)
                } else {
                    true
                }
            }
            None => !self.is_target_window(&focused) || self.looks_like_alert(&focused),
        }
    }

    /// The focused window if it looks like a modal: alert keywords, or a
    /// small target window that is not one of the known utility panels.
    pub fn detect_modal_dialog(&self) -> Option<WindowInfo> {
        let focused = self.focused_window()?;
        if self.looks_like_alert(&focused) {
            return Some(focused);
        }
        let safe_panel = self
            .modal
            .safe_panels
            .iter()
            .any(|p| focused.name.contains(p.as_str()));
        (self.is_small_dialog(&focused) && self.is_target_window(&focused) && !safe_panel)
            .then_some(focused)
    }

    fn send_key(&self, spec: &str) -> bool {
        match self.wm.key(spec, self.pacing.key_delay_ms) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, key = spec, "key press failed");
                false
            }
        }
    }

    fn focus_moved_from(&self, initial: &Option<WindowInfo>) -> bool {
        match (initial, self.focused_window()) {
            (Some(before), Some(after)) => before.window_id != after.window_id,
            _ => false,
        }
    }

    /// Presses Escape up to `max_attempts` times; succeeds as soon as the
    /// focused window changes.
    pub fn dismiss_with_escape(&self, max_attempts: u32) -> bool {
        let initial = self.focused_window();
        RetryPolicy::attempts(max_attempts, std::time::Duration::ZERO).until(|| {
            self.send_key("Escape");
            pause(self.pacing.focus_pause());
            self.focus_moved_from(&initial)
        })
    }

    pub fn dismiss_with_return(&self) -> bool {
        let initial = self.focused_window();
        self.send_key("Return");
        pause(self.pacing.activate_pause());
        self.focus_moved_from(&initial)
    }

    /// Clicks where `position`'s button usually sits in the focused dialog.
    /// Returns whether a click was sent.
    pub fn click_button_in_dialog(&self, position: ButtonPosition) -> bool {
        let Some(focused) = self.focused_window() else {
            return false;
        };
        if focused.width == 0 {
            return false;
        }
        let (x, y) = focused.geometry().button_point(
            position,
            self.modal.button_inset_x,
            self.modal.button_inset_bottom,
        );
        debug!(x, y, window = %focused.name, "clicking dialog button");
        let clicked = self.wm.mouse_move(x, y).and_then(|()| {
            pause(self.pacing.pre_click());
            self.wm.click(MouseButton::Left)
        });
        if let Err(err) = clicked {
            warn!(error = %err, "dialog button click failed");
            return false;
        }
        pause(self.pacing.focus_pause());
        true
    }

    /// Sends the close-window chord. Returns whether it was sent.
    pub fn close_window(&self) -> bool {
        let sent = self.send_key(&self.modal.close_keys);
        pause(self.pacing.activate_pause());
        sent
    }

    /// One dismissal strategy. Clicks count only if no stealer remains.
    pub fn dismiss_with(&self, strategy: DismissStrategy) -> bool {
        let dismissed = match strategy {
            DismissStrategy::Escape => self.dismiss_with_escape(self.modal.escape_attempts),
            DismissStrategy::Return => self.dismiss_with_return(),
            DismissStrategy::ClickDefault | DismissStrategy::ClickCancel => {
                let position = if strategy == DismissStrategy::ClickDefault {
                    ButtonPosition::Right
                } else {
                    ButtonPosition::Left
                };
                self.click_button_in_dialog(position) && {
                    pause(self.pacing.focus_pause());
                    !self.has_focus_stealer(None)
                }
            }
            DismissStrategy::Close => self.close_window(),
        };
        debug!(?strategy, dismissed, "dismissal attempt");
        dismissed
    }

    /// Tries `strategy`, or with `None` each configured strategy in order
    /// until one succeeds.
    pub fn dismiss_focus_stealer(&self, strategy: Option<DismissStrategy>) -> bool {
        match strategy {
            Some(strategy) => self.dismiss_with(strategy),
            None => self
                .modal
                .dismiss_order
                .iter()
                .any(|&strategy| self.dismiss_with(strategy)),
        }
    }

    /// Converges on a normal target window having focus, dismissing modals
    /// and activating the target as needed. `false` after `max_attempts`
    /// means "proceed with caution", not a hard failure.
    pub fn ensure_target_focused(&self, max_attempts: u32) -> bool {
        RetryPolicy::attempts(max_attempts, std::time::Duration::ZERO).until(|| {
            match self.focused_window() {
                Some(focused) if self.is_target_window(&focused) => {
                    if !self.looks_like_alert(&focused) && !self.is_small_dialog(&focused) {
                        return true;
                    }
                    info!(window = %focused.name, "modal has focus, dismissing");
                    self.dismiss_focus_stealer(None);
                }
                _ => {
                    if let Some(id) = self.wm.search_by_name(&self.target).first() {
                        info!(window_id = %id, "activating {}", self.target);
                        if let Err(err) = self.wm.activate(id) {
                            warn!(error = %err, "window activation failed");
                        }
                        pause(self.pacing.activate_pause());
                    }
                }
            }
            false
        })
    }

    /// Detects and clears modals and focus stealers before a click.
    pub fn pre_click_check(&self) -> PreClickReport {
        let mut report = PreClickReport {
            ok: true,
            focused_window: self.focused_window().map(|w| w.name),
            ..PreClickReport::default()
        };

        if let Some(modal) = self.detect_modal_dialog() {
            report
                .actions_taken
                .push(format!("Detected modal: {}", modal.name));
            report.modal_detected = Some(modal.name);
            if self.dismiss_focus_stealer(None) {
                report.actions_taken.push("Dismissed modal".to_string());
            } else {
                report.ok = false;
                report
                    .actions_taken
                    .push("Failed to dismiss modal".to_string());
            }
        }

        if self.has_focus_stealer(None) {
            report
                .actions_taken
                .push("Focus stealer detected".to_string());
            if self.dismiss_focus_stealer(None) {
                report
                    .actions_taken
                    .push("Dismissed focus stealer".to_string());
            } else {
                report.ok = false;
            }
        }
        report
    }
}
