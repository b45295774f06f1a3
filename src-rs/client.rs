//! UI state façade over the bridge tool.
//!
//! Raw commands propagate proxy and parse errors. Derived queries
//! (`window_exists`, `text_visible`, ...) swallow them and answer "not
//! found"; assertion helpers turn "not found" into
//! [`UiTestError::AssertionFailed`].

use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::command::{locate_bridge, BridgeProxy, CommandResult, CommandRunner, ProcessRunner};
use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::error::{Result, UiTestError};
use crate::extract::extract_json;
use crate::model::{ElementNode, UiState, WindowSnapshot};
use crate::retry::RetryPolicy;
use crate::tree;

const NO_ELEMENTS_MARKER: &str = "No UI elements found";

const MODAL_CLASSES: &[&str] = &[
    "NSPanel",
    "NSAlertPanel",
    "GSAlertPanel",
    "NSOpenPanel",
    "NSSavePanel",
    "NSFontPanel",
    "NSColorPanel",
];
const MODAL_TITLE_KEYWORDS: &[&str] = &[
    "alert", "error", "warning", "confirm", "delete", "save", "open", "choose", "select",
];
const MODAL_MAX_WIDTH: f64 = 400.0;
const MODAL_MAX_HEIGHT: f64 = 300.0;

pub struct WorkspaceClient {
    bridge: BridgeProxy,
    poll_interval: Duration,
    highlight_on_failure: bool,
    last_response: RefCell<Option<Value>>,
}

impl WorkspaceClient {
    /// Locates the bridge, checks it answers `help`, and returns a client
    /// that talks to it through real subprocesses.
    pub fn connect(config: &Config) -> Result<Self> {
        let program = locate_bridge(config.bridge.as_deref())?;
        let client = Self::with_runner(Rc::new(ProcessRunner), &program, config);
        client.bridge.verify(config.timeouts.bridge_verify())?;
        debug!(bridge = client.bridge.program(), "bridge verified");
        Ok(client)
    }

    pub fn with_runner(runner: Rc<dyn CommandRunner>, program: &Path, config: &Config) -> Self {
        Self {
            bridge: BridgeProxy::new(
                runner,
                program,
                config.target.clone(),
                config.timeouts.ui_command(),
            ),
            poll_interval: config.pacing.poll_interval(),
            highlight_on_failure: true,
            last_response: RefCell::new(None),
        }
    }

    pub fn set_highlight_on_failure(&mut self, enabled: bool) {
        self.highlight_on_failure = enabled;
    }

    pub fn bridge(&self) -> &BridgeProxy {
        &self.bridge
    }

    fn extract(&self, output: &str) -> Result<Value> {
        let value = extract_json(output)?;
        *self.last_response.borrow_mut() = Some(value.clone());
        Ok(value)
    }

    /// Commands whose nonzero exit means the query itself failed.
    pub(crate) fn checked(&self, args: &[&str], what: &str) -> Result<Value> {
        let result = self.bridge.run(args)?;
        if !result.success() {
            return Err(UiTestError::command_failed(format!(
                "failed to {what}: {}",
                result.stderr.trim()
            )));
        }
        self.extract(&result.stdout)
    }

    /// Commands that report success inside their JSON payload.
    fn command(&self, args: &[&str]) -> Result<Value> {
        let result = self.bridge.run(args)?;
        self.extract(&result.stdout)
    }

    pub fn open_about_dialog(&self) -> Result<Value> {
        self.checked(&["about"], "open About dialog")
    }

    pub fn query_ui_state_raw(&self) -> Result<Value> {
        self.checked(&["query", "--json"], "query UI state")
    }

    /// A fresh snapshot on every call; nothing is cached between queries.
    pub fn query_ui_state(&self) -> Result<UiState> {
        UiState::from_value(self.query_ui_state_raw()?)
    }

    /// Human-readable element tree at a screen coordinate, or an empty
    /// string when nothing is there.
    pub fn ui_at_coordinate(&self, x: f64, y: f64) -> Result<String> {
        let result = self
            .bridge
            .run(&["at-coordinate", &x.to_string(), &y.to_string()])?;
        if !result.success() {
            if result.stdout.contains(NO_ELEMENTS_MARKER) {
                return Ok(String::new());
            }
            return Err(UiTestError::command_failed(format!(
                "failed to query coordinate: {}",
                result.stderr.trim()
            )));
        }
        Ok(result.stdout)
    }

    /// Runs a script through the bridge, forwarding its output, and returns
    /// the bridge's exit code.
    pub fn run_script(&self, script: &Path) -> Result<i32> {
        let script = expand_home(script);
        if !script.exists() {
            return Err(UiTestError::not_found("script", script.display().to_string()));
        }
        let path = script.to_string_lossy();
        let CommandResult {
            stdout,
            stderr,
            exit_code,
        } = self.bridge.run(&["run-script", &path])?;
        if !stdout.is_empty() {
            print!("{stdout}");
        }
        if !stderr.is_empty() {
            eprint!("{stderr}");
        }
        Ok(exit_code)
    }

    pub fn click(&self, x: f64, y: f64) -> Result<Value> {
        self.command(&["click", &x.to_string(), &y.to_string()])
    }

    /// Invokes a menu item by path, e.g. `"Info > About"`.
    pub fn menu(&self, path: &str) -> Result<Value> {
        self.command(&["menu", path])
    }

    /// Sends a named shortcut, e.g. `"Cmd+i"`.
    pub fn shortcut(&self, keys: &str) -> Result<Value> {
        self.command(&["shortcut", keys])
    }

    /// Red overlay on the element showing `text`; `duration` 0 keeps it
    /// until cleared.
    pub fn highlight_failure(&self, window: &str, text: &str, duration: f64) -> Result<Value> {
        self.command(&["highlight", window, text, &duration.to_string()])
    }

    pub fn clear_highlights(&self) -> Result<Value> {
        self.command(&["clear-highlights"])
    }

    /// The bridge's own server-side wait. See [`Self::wait_for_window`] for
    /// the client-side polling variant.
    pub fn wait_window_command(&self, title: &str, timeout: f64) -> Result<Value> {
        self.command(&["wait-window", title, &timeout.to_string()])
    }

    pub fn close_window(&self, title: &str) -> Result<Value> {
        self.command(&["close-window", title])
    }

    pub fn find_element(&self, window: &str, text: &str) -> Result<Value> {
        self.command(&["find", window, text])
    }

    pub fn last_json_response(&self) -> Result<Value> {
        self.last_response
            .borrow()
            .clone()
            .ok_or_else(|| UiTestError::not_found("JSON response", "no previous query executed"))
    }

    fn snapshot(&self) -> Option<UiState> {
        match self.query_ui_state() {
            Ok(state) => Some(state),
            Err(err) => {
                debug!(error = %err, "UI state unavailable, treating as not found");
                None
            }
        }
    }

    pub fn window_exists(&self, title: &str) -> bool {
        self.snapshot()
            .map(|state| tree::window_exists(&state, title))
            .unwrap_or(false)
    }

    pub fn text_visible(&self, text: &str, case_sensitive: bool) -> bool {
        self.snapshot()
            .map(|state| tree::text_visible(&state, text, case_sensitive))
            .unwrap_or(false)
    }

    pub fn count_elements_by_class(&self, class_name: &str) -> usize {
        self.snapshot()
            .map(|state| tree::count_by_class(&state, class_name))
            .unwrap_or(0)
    }

    pub fn element_by_text(&self, text: &str) -> Option<ElementNode> {
        let state = self.snapshot()?;
        tree::find_by_text(&state, text).cloned()
    }

    pub fn visible_text_in_window(&self, title: &str) -> Vec<String> {
        self.snapshot()
            .and_then(|state| state.window(title).map(tree::window_texts))
            .unwrap_or_default()
    }

    pub fn is_target_running(&self) -> bool {
        self.query_ui_state_raw().is_ok()
    }

    pub fn visible_windows(&self) -> Result<Vec<WindowSnapshot>> {
        let state = self.query_ui_state()?;
        Ok(state.windows.into_iter().filter(|w| w.is_visible()).collect())
    }

    pub fn window_titles(&self) -> Result<Vec<String>> {
        let state = self.query_ui_state()?;
        Ok(state
            .windows
            .iter()
            .map(|w| w.display_title().to_string())
            .collect())
    }

    /// Elements of the window's root view.
    pub fn window_elements(&self, title: &str) -> Result<Vec<ElementNode>> {
        let state = self.query_ui_state()?;
        state
            .window(title)
            .map(|w| w.elements().to_vec())
            .ok_or_else(|| UiTestError::assertion(format!("Window not found: {title}")))
    }

    fn poll(&self, timeout: Duration) -> RetryPolicy {
        RetryPolicy::deadline(timeout, self.poll_interval)
    }

    /// Polls until the window appears. Never errors; `false` on timeout.
    pub fn wait_for_window(&self, title: &str, timeout: Duration) -> bool {
        self.poll(timeout).until(|| self.window_exists(title))
    }

    pub fn wait_for_window_closed(&self, title: &str, timeout: Duration) -> bool {
        self.poll(timeout).until(|| !self.window_exists(title))
    }

    pub fn wait_for_text(&self, text: &str, timeout: Duration) -> bool {
        self.poll(timeout).until(|| self.text_visible(text, false))
    }

    /// Best-effort highlight; failures are logged and reported, not raised.
    pub fn try_highlight(&self, window: &str, text: &str, duration: f64) -> Diagnostic {
        match self.highlight_failure(window, text, duration) {
            Ok(response) => {
                let highlighted = response
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if highlighted {
                    Diagnostic::ok_with(1, format!("highlighted '{text}' in '{window}'"))
                } else {
                    Diagnostic::failed(1, "highlight_rejected", format!("'{text}' not highlighted"))
                }
            }
            Err(err) => {
                warn!(error = %err, window, text, "highlight failed");
                Diagnostic::from_error(1, &err)
            }
        }
    }

    /// Highlights `text` in the first window that has a title.
    pub fn highlight_in_first_window(&self, text: &str) -> Diagnostic {
        let state = match self.query_ui_state() {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "cannot highlight without UI state");
                return Diagnostic::from_error(1, &err);
            }
        };
        match state.windows.iter().find(|w| !w.display_title().is_empty()) {
            Some(window) => self.try_highlight(window.display_title(), text, 0.0),
            None => Diagnostic::failed(1, "no_window", "no titled window to highlight in"),
        }
    }

    fn flag(&self, window: Option<&str>, text: &str) {
        if !self.highlight_on_failure {
            return;
        }
        match window {
            Some(window) => {
                self.try_highlight(window, text, 0.0);
            }
            None => {
                self.highlight_in_first_window(text);
            }
        }
    }

    pub fn assert_window_exists(&self, title: &str, msg: Option<&str>) -> Result<()> {
        if self.window_exists(title) {
            return Ok(());
        }
        Err(UiTestError::assertion(
            msg.map(str::to_string)
                .unwrap_or_else(|| format!("Window '{title}' not found")),
        ))
    }

    pub fn assert_text_visible(
        &self,
        text: &str,
        msg: Option<&str>,
        case_sensitive: bool,
    ) -> Result<()> {
        if self.text_visible(text, case_sensitive) {
            return Ok(());
        }
        self.flag(None, text);
        Err(UiTestError::assertion(
            msg.map(str::to_string)
                .unwrap_or_else(|| format!("Text '{text}' not found in UI")),
        ))
    }

    pub fn assert_element_exists(&self, class_name: &str, msg: Option<&str>) -> Result<()> {
        let state = self.query_ui_state().map_err(|err| {
            UiTestError::assertion(format!("Error searching for element: {err}"))
        })?;
        if tree::contains_class(&state, class_name) {
            return Ok(());
        }
        Err(UiTestError::assertion(msg.map(str::to_string).unwrap_or_else(
            || format!("Element with class '{class_name}' not found"),
        )))
    }

    /// With `actual`, checks `expected` is a substring of it (highlighting
    /// `actual` on failure); otherwise asks the bridge to find `expected` in
    /// the window.
    pub fn assert_text_contains(
        &self,
        window: &str,
        expected: &str,
        actual: Option<&str>,
        highlight_on_fail: bool,
    ) -> Result<()> {
        match actual {
            Some(actual) => {
                if actual.contains(expected) {
                    return Ok(());
                }
                if highlight_on_fail {
                    self.flag(Some(window), actual);
                }
                Err(UiTestError::assertion(format!(
                    "Expected text '{expected}' not found in '{actual}'"
                )))
            }
            None => {
                let found = self
                    .find_element(window, expected)?
                    .get("found")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if found {
                    return Ok(());
                }
                Err(UiTestError::assertion(format!(
                    "Text '{expected}' not found in window '{window}'"
                )))
            }
        }
    }

    /// Visible windows that look like modals by class, title or size.
    ///
    /// This goes through the bridge and can block while a modal is up; the
    /// window-manager based [`crate::guard::ModalGuard`] does not.
    pub fn modal_windows(&self) -> Result<Vec<WindowSnapshot>> {
        Ok(self
            .visible_windows()?
            .into_iter()
            .filter(looks_modal)
            .collect())
    }

    pub fn has_modal_dialog(&self) -> bool {
        self.modal_windows()
            .map(|modals| !modals.is_empty())
            .unwrap_or(false)
    }

    /// Joined text of the first modal window, if any.
    pub fn alert_text(&self) -> Option<String> {
        let modals = self.modal_windows().ok()?;
        let texts = tree::window_texts(modals.first()?);
        (!texts.is_empty()).then(|| texts.join(" "))
    }
}

fn looks_modal(window: &WindowSnapshot) -> bool {
    let class = window.class();
    if MODAL_CLASSES.iter().any(|mc| class.contains(mc)) {
        return true;
    }
    let title = window.display_title().to_lowercase();
    if MODAL_TITLE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        return true;
    }
    window
        .frame()
        .map(|f| f.width < MODAL_MAX_WIDTH && f.height < MODAL_MAX_HEIGHT)
        .unwrap_or(false)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::testing::ScriptedRunner;
    use serde_json::json;
    use std::time::Instant;

    const MAIN_ONLY: &str = r#"Querying Workspace...
{
  "uiTestingEnabled": true,
  "windows": [
    {"class": "NSWindow", "title": "Workspace", "visibility": "visible",
     "frame": {"x": 0, "y": 0, "width": 1200, "height": 800},
     "contentView": {"class": "NSView", "children": [
        {"class": "NSTextField", "text": "WORKSPACE"},
        {"class": "NSButton", "text": "Open"}
     ]}}
  ]
}"#;

    const WITH_INFO: &str = r#"{
  "uiTestingEnabled": true,
  "windows": [
    {"class": "NSWindow", "title": "Workspace", "visibility": "visible",
     "frame": {"x": 0, "y": 0, "width": 1200, "height": 800}},
    {"class": "NSPanel", "title": "Info", "visibility": "visible",
     "frame": {"x": 400, "y": 300, "width": 360, "height": 240},
     "views": [{"class": "NSView", "children": [
        {"class": "NSTextField", "text": "Version 0.9"},
        {"class": "NSTextField", "text": "GNUstep Workspace"}
     ]}]}
  ]
}"#;

    fn config() -> Config {
        Config {
            pacing: Pacing::immediate(),
            ..Config::default()
        }
    }

    fn client(runner: &Rc<ScriptedRunner>) -> WorkspaceClient {
        WorkspaceClient::with_runner(runner.clone(), Path::new("uitest"), &config())
    }

    #[test]
    fn fresh_target_reports_testing_enabled_with_a_window() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        let state = client(&runner).query_ui_state().unwrap();
        assert!(state.ui_testing_enabled);
        assert!(!state.windows.is_empty());
    }

    #[test]
    fn query_failure_is_command_failed() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query"], "", "internal error", 1);
        let err = client(&runner).query_ui_state().unwrap_err();
        assert!(matches!(err, UiTestError::CommandFailed { .. }));
        assert!(err.to_string().contains("internal error"));
    }

    #[test]
    fn window_exists_is_false_for_absent_titles_and_errors() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        let c = client(&runner);
        assert!(c.window_exists("Workspace"));
        assert!(!c.window_exists("Info"));

        runner.respond(&["uitest", "query"], "", "Cannot contact Workspace", 1);
        assert!(!c.window_exists("Workspace"));
        assert!(!c.is_target_running());
    }

    #[test]
    fn about_dialog_opens_then_closes() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "about"], "{\"success\": true}", "", 0);
        runner.respond_once(&["uitest", "query", "--json"], WITH_INFO, "", 0);
        runner.respond_once(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        runner.respond(
            &["uitest", "close-window", "Info"],
            "{\"success\": true, \"closed\": \"Info\"}",
            "",
            0,
        );
        let c = client(&runner);

        c.open_about_dialog().unwrap();
        assert!(c.window_exists("Info"));
        assert_eq!(c.close_window("Info").unwrap()["closed"], "Info");
        assert!(!c.window_exists("Info"));
    }

    #[test]
    fn text_search_is_case_insensitive_by_default() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        let c = client(&runner);
        assert!(c.text_visible("workspace", false));
        assert!(!c.text_visible("workspace", true));
        assert_eq!(c.count_elements_by_class("NSButton"), 1);
        assert!(c.element_by_text("Open").is_some());
        assert!(c.element_by_text("open").is_none());
    }

    #[test]
    fn visible_text_and_elements_of_a_window() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], WITH_INFO, "", 0);
        let c = client(&runner);
        assert_eq!(
            c.visible_text_in_window("Info"),
            vec!["Version 0.9".to_string(), "GNUstep Workspace".to_string()]
        );
        assert!(c.visible_text_in_window("Missing").is_empty());
        assert_eq!(c.window_elements("Info").unwrap().len(), 2);
        assert!(c.window_elements("Missing").unwrap_err().is_assertion());
        assert_eq!(c.window_titles().unwrap(), vec!["Workspace", "Info"]);
    }

    #[test]
    fn last_response_tracks_most_recent_parse() {
        let runner = Rc::new(ScriptedRunner::new());
        let c = client(&runner);
        assert!(matches!(
            c.last_json_response(),
            Err(UiTestError::NotFound { .. })
        ));
        runner.respond(&["uitest", "clear-highlights"], "{\"success\": true, \"cleared\": 0}", "", 0);
        c.clear_highlights().unwrap();
        assert_eq!(c.last_json_response().unwrap()["cleared"], 0);
    }

    #[test]
    fn highlight_then_clear_is_idempotent() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(
            &["uitest", "highlight", "Info", "Version", "2"],
            "{\"success\": true, \"highlighted\": \"Version\"}",
            "",
            0,
        );
        runner.respond_once(&["uitest", "clear-highlights"], "{\"success\": true, \"cleared\": 1}", "", 0);
        runner.respond(&["uitest", "clear-highlights"], "{\"success\": true, \"cleared\": 0}", "", 0);
        let c = client(&runner);

        assert!(c.try_highlight("Info", "Version", 2.0).ok);
        assert_eq!(c.clear_highlights().unwrap()["cleared"], 1);
        let again = c.clear_highlights().unwrap();
        assert_eq!(again["success"], true);
        assert_eq!(again["cleared"], 0);
    }

    #[test]
    fn failed_highlight_is_reported_not_raised() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "highlight"], "garbage", "", 1);
        let diag = client(&runner).try_highlight("Info", "x", 0.0);
        assert!(!diag.ok);
        assert_eq!(diag.error_code.as_deref(), Some("no_json_found"));
    }

    #[test]
    fn coordinate_query_with_nothing_there_is_empty() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "at-coordinate"], "No UI elements found at (5, 5)", "", 1);
        assert_eq!(client(&runner).ui_at_coordinate(5.0, 5.0).unwrap(), "");
    }

    #[test]
    fn missing_script_is_not_found() {
        let runner = Rc::new(ScriptedRunner::new());
        let err = client(&runner)
            .run_script(Path::new("/nonexistent/script.py"))
            .unwrap_err();
        assert!(matches!(err, UiTestError::NotFound { kind: "script", .. }));
        assert_eq!(runner.count(&["uitest", "run-script"]), 0);
    }

    #[test]
    fn wait_for_window_times_out_within_one_interval() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        let mut cfg = config();
        cfg.pacing.poll_interval_ms = 50;
        let c = WorkspaceClient::with_runner(runner.clone(), Path::new("uitest"), &cfg);

        let timeout = Duration::from_millis(250);
        let start = Instant::now();
        assert!(!c.wait_for_window("Never", timeout));
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(200));
    }

    #[test]
    fn wait_for_window_succeeds_once_it_appears() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond_once(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        runner.respond_once(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        runner.respond(&["uitest", "query", "--json"], WITH_INFO, "", 0);
        let c = client(&runner);
        assert!(c.wait_for_window("Info", Duration::from_secs(2)));
        assert_eq!(runner.count(&["uitest", "query"]), 3);
        assert!(c.wait_for_text("version 0.9", Duration::ZERO));
    }

    #[test]
    fn assertions_describe_what_was_sought() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        runner.respond(&["uitest", "highlight"], "{\"success\": true}", "", 0);
        let c = client(&runner);

        let err = c.assert_window_exists("Info", None).unwrap_err();
        assert_eq!(err.to_string(), "Window 'Info' not found");

        let err = c.assert_text_visible("Preferences", None, false).unwrap_err();
        assert_eq!(err.to_string(), "Text 'Preferences' not found in UI");
        assert_eq!(runner.count(&["uitest", "highlight", "Workspace", "Preferences"]), 1);

        let err = c.assert_element_exists("NSTableView", Some("no table")).unwrap_err();
        assert_eq!(err.to_string(), "no table");

        assert!(c.assert_element_exists("NSButton", None).is_ok());
        assert!(c.assert_window_exists("Workspace", None).is_ok());
    }

    #[test]
    fn text_contains_highlights_actual_on_mismatch() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "highlight"], "{\"success\": true}", "", 0);
        runner.respond(&["uitest", "find", "Info", "Version"], "{\"found\": true}", "", 0);
        runner.respond(&["uitest", "find", "Info", "Theme"], "{\"found\": false}", "", 0);
        let c = client(&runner);

        let err = c
            .assert_text_contains("Info", "1.0", Some("Version 0.9"), true)
            .unwrap_err();
        assert_eq!(err.to_string(), "Expected text '1.0' not found in 'Version 0.9'");
        assert_eq!(runner.count(&["uitest", "highlight", "Info", "Version 0.9", "0"]), 1);

        assert!(c.assert_text_contains("Info", "Version", None, true).is_ok());
        let err = c.assert_text_contains("Info", "Theme", None, true).unwrap_err();
        assert_eq!(err.to_string(), "Text 'Theme' not found in window 'Info'");
    }

    #[test]
    fn highlight_side_effect_can_be_disabled() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        let mut c = client(&runner);
        c.set_highlight_on_failure(false);
        assert!(c.assert_text_visible("Missing", None, false).is_err());
        assert_eq!(runner.count(&["uitest", "highlight"]), 0);
    }

    #[test]
    fn json_level_modal_detection() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query", "--json"], WITH_INFO, "", 0);
        let c = client(&runner);
        let modals = c.modal_windows().unwrap();
        assert_eq!(modals.len(), 1);
        assert_eq!(modals[0].display_title(), "Info");
        assert!(c.has_modal_dialog());
        assert_eq!(c.alert_text().as_deref(), Some("Version 0.9 GNUstep Workspace"));

        runner.respond(&["uitest", "query", "--json"], MAIN_ONLY, "", 0);
        assert!(!c.has_modal_dialog());
        assert!(c.alert_text().is_none());
    }

    #[test]
    fn commands_pass_arguments_through() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest"], "{\"success\": true}", "", 0);
        let c = client(&runner);
        c.menu("Info > About").unwrap();
        c.shortcut("Cmd+i").unwrap();
        c.click(10.0, 20.5).unwrap();
        c.wait_window_command("Info", 5.0).unwrap();
        let calls = runner.calls();
        assert_eq!(calls[0], vec!["uitest", "menu", "Info > About"]);
        assert_eq!(calls[1], vec!["uitest", "shortcut", "Cmd+i"]);
        assert_eq!(calls[2], vec!["uitest", "click", "10", "20.5"]);
        assert_eq!(calls[3], vec!["uitest", "wait-window", "Info", "5"]);
        assert_eq!(json!(c.last_json_response().unwrap()), json!({"success": true}));
    }
}
