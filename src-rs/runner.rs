//! Sequential test runner with pass/fail reporting.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::capture::panic_message;
use crate::client::WorkspaceClient;
use crate::error::UiTestError;
use crate::retry::pause;

pub type TestFn<'a> = Box<dyn FnMut() -> anyhow::Result<bool> + 'a>;

/// A named check. Returning `Ok(false)` and returning an error both fail
/// the test; only the printed line differs.
pub struct TestCase<'a> {
    pub name: String,
    pub run: TestFn<'a>,
}

impl<'a> TestCase<'a> {
    pub fn new(name: impl Into<String>, run: impl FnMut() -> anyhow::Result<bool> + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub verbose: bool,
    pub stop_on_failure: bool,
    /// Highlight the quoted text of an assertion failure in the target.
    pub highlight_failures: bool,
    pub pause_between: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            stop_on_failure: false,
            highlight_failures: true,
            pause_between: Duration::ZERO,
        }
    }
}

impl RunOptions {
    /// Stops at the first failure and pauses between tests so a person can
    /// follow along on screen.
    pub fn interactive(pause_between: Duration) -> Self {
        Self {
            stop_on_failure: true,
            pause_between,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    ReturnedFalse,
    AssertionFailed(String),
    Errored(String),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub outcomes: Vec<TestOutcome>,
}

impl RunSummary {
    pub fn executed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.passed()).count()
    }

    pub fn not_executed(&self) -> usize {
        self.total - self.executed()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.passed())
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// The text after the first single quote, up to the next one or the end
/// of the message.
pub fn extract_quoted(message: &str) -> Option<&str> {
    message.split('\'').nth(1).filter(|quoted| !quoted.is_empty())
}

pub struct TestRunner<'c> {
    client: Option<&'c WorkspaceClient>,
    options: RunOptions,
}

impl<'c> TestRunner<'c> {
    pub fn new(options: RunOptions) -> Self {
        Self {
            client: None,
            options,
        }
    }

    /// Client used to highlight assertion failures in the target.
    pub fn with_client(mut self, client: &'c WorkspaceClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn run(&self, tests: Vec<TestCase<'_>>) -> RunSummary {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_to(tests, &mut out)
    }

    /// Like [`Self::run`], writing the report to `out`.
    pub fn run_to(&self, tests: Vec<TestCase<'_>>, out: &mut dyn Write) -> RunSummary {
        let mut summary = RunSummary {
            total: tests.len(),
            outcomes: Vec::with_capacity(tests.len()),
        };
        let verbose = self.options.verbose;

        for mut test in tests {
            if verbose {
                let _ = write!(out, "▶ Running: {}", test.name);
                let _ = out.flush();
            }
            info!(test = %test.name, "running");

            let outcome = match panic::catch_unwind(AssertUnwindSafe(&mut test.run)) {
                Ok(Ok(true)) => Outcome::Passed,
                Ok(Ok(false)) => Outcome::ReturnedFalse,
                Ok(Err(err)) => match err.downcast_ref::<UiTestError>() {
                    Some(e) if e.is_assertion() => Outcome::AssertionFailed(e.to_string()),
                    _ => Outcome::Errored(format!("{err:#}")),
                },
                Err(payload) => {
                    Outcome::Errored(format!("panicked: {}", panic_message(payload.as_ref())))
                }
            };

            if verbose {
                let _ = match &outcome {
                    Outcome::Passed => writeln!(out, "\r✓ {}", test.name),
                    Outcome::ReturnedFalse => writeln!(out, "\r✗ {}", test.name),
                    Outcome::AssertionFailed(msg) | Outcome::Errored(msg) => {
                        writeln!(out, "\r✗ {}: {msg}", test.name)
                    }
                };
            }

            if let Outcome::AssertionFailed(msg) = &outcome {
                self.highlight(msg);
            }

            let failed = !outcome.passed();
            let error = match &outcome {
                Outcome::AssertionFailed(msg) | Outcome::Errored(msg) => Some(msg.clone()),
                _ => None,
            };
            summary.outcomes.push(TestOutcome {
                name: test.name.clone(),
                outcome,
            });

            if failed && self.options.stop_on_failure {
                let _ = writeln!(out, "\n⛔ STOPPED: Test failed - {}", test.name);
                if let Some(error) = error {
                    let _ = writeln!(out, "   Error: {error}");
                }
                break;
            }
            pause(self.options.pause_between);
        }

        if verbose {
            let _ = self.report(&summary, out);
        }
        summary
    }

    fn highlight(&self, message: &str) {
        if !self.options.highlight_failures {
            return;
        }
        let (Some(client), Some(text)) = (self.client, extract_quoted(message)) else {
            return;
        };
        let diagnostic = client.highlight_in_first_window(text);
        debug!(?diagnostic, text, "failure highlight");
    }

    fn report(&self, summary: &RunSummary, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        if summary.not_executed() > 0 {
            writeln!(
                out,
                "Results: {}/{} tests passed ({} not executed)",
                summary.passed(),
                summary.executed(),
                summary.not_executed()
            )?;
        } else {
            writeln!(
                out,
                "Results: {}/{} tests passed",
                summary.passed(),
                summary.total
            )?;
        }
        if summary.all_passed() {
            writeln!(out, "Status: PASSED ✓")
        } else {
            writeln!(out, "Status: FAILED ❌")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Pacing};
    use crate::testing::ScriptedRunner;
    use anyhow::bail;
    use std::cell::Cell;
    use std::path::Path;
    use std::rc::Rc;

    fn run(options: RunOptions, tests: Vec<TestCase<'_>>) -> (RunSummary, String) {
        let mut out = Vec::new();
        let summary = TestRunner::new(options).run_to(tests, &mut out);
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn all_passing_exits_zero() {
        let (summary, out) = run(
            RunOptions::default(),
            vec![
                TestCase::new("query works", || Ok(true)),
                TestCase::new("menus listed", || Ok(true)),
            ],
        );
        assert_eq!(summary.exit_code(), 0);
        assert!(out.contains("\r✓ query works\n"));
        assert!(out.contains("Results: 2/2 tests passed\n"));
        assert!(out.ends_with("Status: PASSED ✓\n"));
    }

    #[test]
    fn false_and_errors_both_fail_but_print_differently() {
        let (summary, out) = run(
            RunOptions::default(),
            vec![
                TestCase::new("returns false", || Ok(false)),
                TestCase::new("asserts", || Err(UiTestError::assertion("Window 'Info' not found").into())),
                TestCase::new("errors", || bail!("bridge exploded")),
                TestCase::new("passes", || Ok(true)),
            ],
        );
        assert_eq!(summary.executed(), 4);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.outcomes[0].outcome, Outcome::ReturnedFalse);
        assert_eq!(
            summary.outcomes[1].outcome,
            Outcome::AssertionFailed("Window 'Info' not found".to_string())
        );
        assert!(matches!(summary.outcomes[2].outcome, Outcome::Errored(_)));
        assert!(out.contains("\r✗ returns false\n"));
        assert!(out.contains("\r✗ asserts: Window 'Info' not found\n"));
        assert!(out.contains("\r✗ errors: bridge exploded\n"));
        assert!(out.contains("Status: FAILED ❌"));
    }

    #[test]
    fn panicking_test_fails_and_the_run_continues() {
        let (summary, out) = run(
            RunOptions::default(),
            vec![
                TestCase::new("out of bounds", || {
                    let items: Vec<i32> = Vec::new();
                    Ok(items[3] > 0)
                }),
                TestCase::new("after", || Ok(true)),
            ],
        );
        assert_eq!(summary.executed(), 2);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.exit_code(), 1);
        match &summary.outcomes[0].outcome {
            Outcome::Errored(msg) => assert!(msg.starts_with("panicked: index out of bounds")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(out.contains("\r✓ after\n"));
        assert!(out.contains("Results: 1/2 tests passed\n"));
    }

    #[test]
    fn stop_on_failure_skips_the_rest() {
        let ran_third = Cell::new(false);
        let (summary, out) = run(
            RunOptions {
                stop_on_failure: true,
                ..RunOptions::default()
            },
            vec![
                TestCase::new("first", || Ok(true)),
                TestCase::new("second", || bail!("boom")),
                TestCase::new("third", || {
                    ran_third.set(true);
                    Ok(true)
                }),
            ],
        );
        assert!(!ran_third.get());
        assert_eq!(summary.executed(), 2);
        assert_eq!(summary.not_executed(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert!(out.contains("⛔ STOPPED: Test failed - second\n   Error: boom\n"));
        assert!(out.contains("Results: 1/2 tests passed (1 not executed)"));
    }

    #[test]
    fn interactive_mode_stops_on_failure() {
        let options = RunOptions::interactive(Duration::from_millis(500));
        assert!(options.stop_on_failure);
        assert!(options.highlight_failures);
        assert_eq!(options.pause_between, Duration::from_millis(500));
    }

    #[test]
    fn empty_run_passes() {
        let (summary, _) = run(RunOptions::default(), Vec::new());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn quiet_mode_prints_nothing() {
        let (summary, out) = run(
            RunOptions {
                verbose: false,
                ..RunOptions::default()
            },
            vec![TestCase::new("fails", || Ok(false))],
        );
        assert_eq!(summary.exit_code(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn quoted_text_extraction() {
        assert_eq!(extract_quoted("Text 'Preferences' not found in UI"), Some("Preferences"));
        assert_eq!(extract_quoted("Window 'Info' not found"), Some("Info"));
        assert_eq!(extract_quoted("no quotes here"), None);
        assert_eq!(extract_quoted("Window 'About"), Some("About"));
        assert_eq!(extract_quoted("trailing '"), None);
    }

    #[test]
    fn assertion_failures_are_highlighted_in_first_titled_window() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(
            &["uitest", "query", "--json"],
            r#"{"windows": [{"class": "NSMenu"}, {"title": "Workspace", "class": "NSWindow"}]}"#,
            "",
            0,
        );
        runner.respond(&["uitest", "highlight"], "{\"success\": true}", "", 0);
        let config = Config {
            pacing: Pacing::immediate(),
            ..Config::default()
        };
        let client = WorkspaceClient::with_runner(runner.clone(), Path::new("uitest"), &config);

        let mut out = Vec::new();
        TestRunner::new(RunOptions::default())
            .with_client(&client)
            .run_to(
                vec![
                    TestCase::new("theme", || {
                        Err(UiTestError::assertion("Text 'Current Theme' not found in UI").into())
                    }),
                    TestCase::new("plain error", || bail!("Missing 'Other'")),
                ],
                &mut out,
            );

        assert_eq!(
            runner.count(&["uitest", "highlight", "Workspace", "Current Theme", "0"]),
            1
        );
        assert_eq!(runner.count(&["uitest", "highlight", "Workspace", "Other"]), 0);
    }

    #[test]
    fn highlight_errors_are_swallowed() {
        let runner = Rc::new(ScriptedRunner::new());
        runner.respond(&["uitest", "query"], "", "Cannot contact Workspace", 1);
        let config = Config::default();
        let client = WorkspaceClient::with_runner(runner.clone(), Path::new("uitest"), &config);

        let mut out = Vec::new();
        let summary = TestRunner::new(RunOptions::default())
            .with_client(&client)
            .run_to(
                vec![TestCase::new("x", || Err(UiTestError::assertion("Window 'A' not found").into()))],
                &mut out,
            );
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(runner.count(&["uitest", "highlight"]), 0);
    }
}
