//! Everything a test needs, wired from one [`Config`].

use std::path::Path;
use std::rc::Rc;

use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::FailureCapture;
use crate::client::WorkspaceClient;
use crate::command::CommandRunner;
use crate::config::Config;
use crate::error::Result;
use crate::guard::ModalGuard;
use crate::input::InputSimulator;
use crate::retry::pause;

/// Focus attempts made by [`TestContext::activate_target`].
const ACTIVATE_ATTEMPTS: u32 = 5;
/// Modal dismissals tried by [`TestContext::ensure_clean_state`].
const CLEAN_STATE_MODALS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanStateReport {
    pub modals_dismissed: u32,
    pub windows_closed: Vec<String>,
    pub target_focused: bool,
}

pub struct TestContext {
    pub config: Config,
    pub client: WorkspaceClient,
    pub input: InputSimulator,
    pub guard: ModalGuard,
    pub capture: FailureCapture,
}

impl TestContext {
    /// Connects to the bridge and checks the input tools are installed.
    pub fn new(config: Config) -> Result<Self> {
        let client = WorkspaceClient::connect(&config)?;
        let input = InputSimulator::new(&config)?;
        let guard = ModalGuard::new(&config);
        let capture = FailureCapture::new(&config);
        Ok(Self {
            config,
            client,
            input,
            guard,
            capture,
        })
    }

    /// All parts share `runner`; nothing is verified up front.
    pub fn with_runner(
        runner: Rc<dyn CommandRunner>,
        bridge: &Path,
        config: Config,
        rng: StdRng,
    ) -> Self {
        Self {
            client: WorkspaceClient::with_runner(runner.clone(), bridge, &config),
            input: InputSimulator::with_runner(runner.clone(), &config, rng),
            guard: ModalGuard::with_runner(runner.clone(), &config),
            capture: FailureCapture::with_runner(runner, &config),
            config,
        }
    }

    /// Dismisses modals until none is detected, at most `max` times.
    /// Returns how many were handled.
    pub fn dismiss_all_modals(&self, max: u32) -> u32 {
        let mut dismissed = 0;
        while dismissed < max {
            let Some(modal) = self.guard.detect_modal_dialog() else {
                break;
            };
            info!(window = %modal.name, "dismissing modal");
            if !self.guard.dismiss_focus_stealer(None) {
                if let Err(err) = self.input.press_escape() {
                    warn!(error = %err, "escape fallback failed");
                }
                pause(self.config.pacing.focus_pause());
            }
            dismissed += 1;
        }
        dismissed
    }

    /// Closes open utility windows (Info, Finder and the like). Returns the
    /// names of the windows a close was sent to.
    pub fn close_utility_windows(&self) -> Vec<String> {
        let utility = &self.config.modal.utility_windows;
        let mut closed = Vec::new();
        for window in self.guard.visible_windows() {
            let name = window.name.to_lowercase();
            if !utility.iter().any(|t| name.contains(&t.to_lowercase())) {
                continue;
            }
            let sent = self
                .input
                .focus_window(&window.window_id)
                .and_then(|()| self.input.cmd("w"));
            match sent {
                Ok(()) => {
                    debug!(window = %window.name, "closed utility window");
                    closed.push(window.name);
                }
                Err(err) => warn!(error = %err, window = %window.name, "close failed"),
            }
            pause(self.config.pacing.settle());
        }
        closed
    }

    pub fn activate_target(&self) -> bool {
        let focused = self.guard.ensure_target_focused(ACTIVATE_ATTEMPTS);
        pause(self.config.pacing.activate_pause());
        focused
    }

    /// Modals dismissed, utility windows closed, target focused.
    pub fn ensure_clean_state(&self) -> CleanStateReport {
        let modals_dismissed = self.dismiss_all_modals(CLEAN_STATE_MODALS);
        let windows_closed = self.close_utility_windows();
        let target_focused = self.activate_target();
        CleanStateReport {
            modals_dismissed,
            windows_closed,
            target_focused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::testing::ScriptedRunner;
    use rand::SeedableRng;

    const WORKSPACE_CLASS: &str = "WM_CLASS(STRING) = \"Workspace\", \"GNUstep\"";

    fn context(runner: &Rc<ScriptedRunner>) -> TestContext {
        let config = Config {
            pacing: Pacing::immediate(),
            ..Config::default()
        };
        TestContext::with_runner(
            runner.clone(),
            Path::new("uitest"),
            config,
            StdRng::seed_from_u64(7),
        )
    }

    fn window(runner: &ScriptedRunner, id: &str, name: &str, w: i64, h: i64) {
        runner.respond(&["xdotool", "getwindowname", id], name, "", 0);
        runner.respond(
            &["xdotool", "getwindowgeometry", "--shell", id],
            &format!("WINDOW={id}\nX=100\nY=100\nWIDTH={w}\nHEIGHT={h}\n"),
            "",
            0,
        );
        runner.respond(&["xprop", "-id", id], WORKSPACE_CLASS, "", 0);
    }

    #[test]
    fn modal_dismissed_by_escape_counts_once() {
        let runner = Rc::new(ScriptedRunner::new());
        window(&runner, "1", "Delete Confirmation", 300, 200);
        window(&runner, "2", "Workspace", 1200, 800);
        runner.respond(&["xdotool", "getactivewindow"], "2", "", 0);
        // detection, then the escape strategy's starting focus
        runner.respond_once(&["xdotool", "getactivewindow"], "1", "", 0);
        runner.respond_once(&["xdotool", "getactivewindow"], "1", "", 0);

        let ctx = context(&runner);
        assert_eq!(ctx.dismiss_all_modals(5), 1);
        assert_eq!(runner.count(&["xdotool", "key", "--delay", "0", "Escape"]), 1);
    }

    #[test]
    fn stubborn_modal_stops_at_max() {
        let runner = Rc::new(ScriptedRunner::new());
        window(&runner, "1", "Error", 300, 200);
        runner.respond(&["xdotool", "getactivewindow"], "1", "", 0);

        let ctx = context(&runner);
        assert_eq!(ctx.dismiss_all_modals(3), 3);
    }

    #[test]
    fn no_modal_means_nothing_to_do() {
        let runner = Rc::new(ScriptedRunner::new());
        window(&runner, "2", "Workspace", 1200, 800);
        runner.respond(&["xdotool", "getactivewindow"], "2", "", 0);

        let ctx = context(&runner);
        assert_eq!(ctx.dismiss_all_modals(5), 0);
        assert_eq!(runner.count(&["xdotool", "key"]), 0);
    }

    #[test]
    fn utility_windows_are_closed_and_main_window_kept() {
        let runner = Rc::new(ScriptedRunner::new());
        window(&runner, "1", "Workspace", 1200, 800);
        window(&runner, "2", "Info", 300, 500);
        window(&runner, "3", "Workspace Preferences", 400, 300);
        runner.respond(
            &["xdotool", "search", "--onlyvisible", "--name", ""],
            "1\n2\n3\n",
            "",
            0,
        );

        let ctx = context(&runner);
        let closed = ctx.close_utility_windows();
        assert_eq!(closed, vec!["Info", "Workspace Preferences"]);
        assert_eq!(runner.count(&["xdotool", "windowactivate", "2"]), 1);
        assert_eq!(runner.count(&["xdotool", "windowactivate", "1"]), 0);
        assert_eq!(runner.count(&["xdotool", "key", "--delay", "0", "alt+w"]), 2);
    }

    #[test]
    fn clean_state_reports_each_step() {
        let runner = Rc::new(ScriptedRunner::new());
        window(&runner, "1", "Workspace", 1200, 800);
        runner.respond(&["xdotool", "getactivewindow"], "1", "", 0);
        runner.respond(&["xdotool", "search", "--onlyvisible", "--name", ""], "1\n", "", 0);

        let ctx = context(&runner);
        let report = ctx.ensure_clean_state();
        assert_eq!(report.modals_dismissed, 0);
        assert!(report.windows_closed.is_empty());
        assert!(report.target_focused);
    }
}
