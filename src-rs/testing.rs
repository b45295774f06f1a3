//! Scripted stand-in for external tools, used by unit tests across the crate.

use std::cell::RefCell;
use std::fs;
use std::time::Duration;

use crate::command::{CommandResult, CommandRunner};
use crate::error::{Result, UiTestError};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandResult),
    Fail(String),
    /// Succeeds after writing the bytes to the path in the last argument.
    WriteLast(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: Vec<String>,
    once: bool,
    reply: Reply,
}

/// Matches `[program, args...]` against registered prefixes.
///
/// One-shot rules are consumed first in registration order; among
/// persistent rules the most recently registered wins. Unmatched calls
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &[&str], stdout: &str, stderr: &str, exit_code: i32) {
        self.push(prefix, false, output(stdout, stderr, exit_code));
    }

    pub fn respond_once(&self, prefix: &[&str], stdout: &str, stderr: &str, exit_code: i32) {
        self.push(prefix, true, output(stdout, stderr, exit_code));
    }

    pub fn fail(&self, prefix: &[&str], reason: &str) {
        self.push(prefix, false, Reply::Fail(reason.to_string()));
    }

    pub fn respond_writing(&self, prefix: &[&str], contents: &[u8]) {
        self.push(prefix, false, Reply::WriteLast(contents.to_vec()));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|line| has_prefix(line, prefix))
            .count()
    }

    fn push(&self, prefix: &[&str], once: bool, reply: Reply) {
        self.rules.borrow_mut().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            once,
            reply,
        });
    }
}

fn output(stdout: &str, stderr: &str, exit_code: i32) -> Reply {
    Reply::Output(CommandResult {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    })
}

fn has_prefix(line: &[String], prefix: &[&str]) -> bool {
    prefix.len() <= line.len() && prefix.iter().zip(line).all(|(p, l)| *p == l)
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<CommandResult> {
        let mut line = vec![program.to_string()];
        line.extend(args.iter().cloned());
        self.calls.borrow_mut().push(line.clone());

        let mut rules = self.rules.borrow_mut();
        let matches = |rule: &Rule| {
            let prefix: Vec<&str> = rule.prefix.iter().map(String::as_str).collect();
            has_prefix(&line, &prefix)
        };

        let reply = if let Some(idx) = rules.iter().position(|r| r.once && matches(r)) {
            rules.remove(idx).reply
        } else if let Some(rule) = rules.iter().rev().find(|r| !r.once && matches(r)) {
            rule.reply.clone()
        } else {
            Reply::Output(CommandResult::default())
        };

        match reply {
            Reply::Output(result) => Ok(result),
            Reply::Fail(reason) => Err(UiTestError::command_failed(reason)),
            Reply::WriteLast(contents) => {
                if let Some(path) = args.last() {
                    fs::write(path, contents).map_err(|err| {
                        UiTestError::command_failed(format!("writing {path}: {err}"))
                    })?;
                }
                Ok(CommandResult::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(runner: &ScriptedRunner, line: &[&str]) -> Result<CommandResult> {
        let args: Vec<String> = line[1..].iter().map(|s| s.to_string()).collect();
        runner.run(line[0], &args, Duration::from_secs(1))
    }

    #[test]
    fn once_rules_are_consumed_before_persistent_ones() {
        let runner = ScriptedRunner::new();
        runner.respond(&["xdotool", "getactivewindow"], "1", "", 0);
        runner.respond_once(&["xdotool", "getactivewindow"], "2", "", 0);

        assert_eq!(run(&runner, &["xdotool", "getactivewindow"]).unwrap().stdout, "2");
        assert_eq!(run(&runner, &["xdotool", "getactivewindow"]).unwrap().stdout, "1");
        assert_eq!(runner.count(&["xdotool"]), 2);
    }

    #[test]
    fn unmatched_calls_succeed_empty() {
        let runner = ScriptedRunner::new();
        let result = run(&runner, &["scrot", "/tmp/x.png"]).unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }
}
