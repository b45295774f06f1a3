use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use workspace_uitest::capture::FailureCapture;
use workspace_uitest::client::WorkspaceClient;
use workspace_uitest::config::Config;
use workspace_uitest::diagnostic::Diagnostic;
use workspace_uitest::guard::ModalGuard;
use workspace_uitest::runner::{RunOptions, TestCase, TestRunner};
use workspace_uitest::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "workspace-uitest",
    version,
    about = "Query, guard and smoke-test the Workspace GUI through the uitest bridge"
)]
struct Cli {
    /// Bridge executable (default: $UITEST_BIN, ./uitest, then PATH)
    #[arg(long, global = true)]
    bridge: Option<PathBuf>,
    /// JSON configuration file, `-` for stdin
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for screenshots and failure logs
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
    /// Target application name
    #[arg(long, global = true)]
    target: Option<String>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print the target's UI state JSON
    Query,
    /// List window titles
    Windows(WindowsArgs),
    /// List menus or menu items as JSON
    Menus(MenusArgs),
    /// Report the focused window and any modal, optionally clearing it
    Focus(FocusArgs),
    /// Save a screenshot, window state and log file
    Capture(CaptureArgs),
    /// Run the built-in connection suite
    Smoke(SmokeArgs),
}

#[derive(Args, Debug)]
struct WindowsArgs {
    /// Only windows the bridge reports as visible
    #[arg(long, action = ArgAction::SetTrue)]
    visible: bool,
}

#[derive(Args, Debug)]
struct MenusArgs {
    /// Restrict to one menu
    #[arg(long)]
    menu: Option<String>,
    /// Only enabled items
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "disabled")]
    enabled: bool,
    /// Only disabled items
    #[arg(long, action = ArgAction::SetTrue)]
    disabled: bool,
}

#[derive(Args, Debug)]
struct FocusArgs {
    /// Try the configured dismissal strategies on a detected modal
    #[arg(long, action = ArgAction::SetTrue)]
    dismiss: bool,
    /// Converge on the target window having focus within N attempts
    #[arg(long, value_name = "N")]
    ensure: Option<u32>,
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Label used in artifact file names
    #[arg(long, default_value = "manual")]
    label: String,
}

#[derive(Args, Debug)]
struct SmokeArgs {
    /// Stop at the first failure and pause between tests
    #[arg(long, action = ArgAction::SetTrue)]
    interactive: bool,
    /// Run every test even after a failure
    #[arg(long, action = ArgAction::SetTrue)]
    keep_going: bool,
    /// Do not highlight failing text in the target
    #[arg(long, action = ArgAction::SetTrue)]
    no_highlight: bool,
}

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_level);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Commands => print_commands().map(|()| 0),
        Commands::Query => command_query(&config).map(|()| 0),
        Commands::Windows(args) => command_windows(&config, args).map(|()| 0),
        Commands::Menus(args) => command_menus(&config, args).map(|()| 0),
        Commands::Focus(args) => command_focus(&config, args).map(|()| 0),
        Commands::Capture(args) => command_capture(&config, args).map(|()| 0),
        Commands::Smoke(args) => command_smoke(&config, args),
    }
}

/// Defaults, then the config file, then the environment, then flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(bridge) = &cli.bridge {
        config.bridge = Some(bridge.clone());
    }
    if let Some(out_dir) = &cli.out_dir {
        config.out_dir = out_dir.clone();
    }
    if let Some(target) = &cli.target {
        config.target = target.clone();
    }
    Ok(config)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "query",
            "description": "Print the target's UI state as JSON.",
            "tools": ["uitest"]
        }),
        json!({
            "name": "windows",
            "description": "List window titles, optionally only visible ones.",
            "tools": ["uitest"]
        }),
        json!({
            "name": "menus",
            "description": "List menus or enabled/disabled menu items.",
            "tools": ["uitest"]
        }),
        json!({
            "name": "focus",
            "description": "Report focus and modal state without the bridge; dismiss or refocus.",
            "tools": ["xdotool", "xprop"]
        }),
        json!({
            "name": "capture",
            "description": "Save a screenshot, window state and log for later inspection.",
            "tools": ["scrot", "import", "xwd", "xdotool"]
        }),
        json!({
            "name": "smoke",
            "description": "Run the built-in connection suite; exit 1 on any failure.",
            "tools": ["uitest"]
        }),
    ];

    print_json(&json!({ "commands": rows }))
}

fn connect(config: &Config) -> Result<WorkspaceClient> {
    WorkspaceClient::connect(config)
        .with_context(|| format!("connecting to {} through the uitest bridge", config.target))
}

fn command_query(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let state = client.query_ui_state_raw()?;
    print_json(&state)
}

fn command_windows(config: &Config, args: WindowsArgs) -> Result<()> {
    let client = connect(config)?;
    let titles: Vec<String> = if args.visible {
        client
            .visible_windows()?
            .iter()
            .map(|w| w.display_title().to_string())
            .collect()
    } else {
        client.window_titles()?
    };
    print_json(&json!({ "windows": titles }))
}

fn command_menus(config: &Config, args: MenusArgs) -> Result<()> {
    let client = connect(config)?;
    let menu = args.menu.as_deref();
    let payload = if args.enabled {
        json!({ "items": client.enabled_menu_items(menu)? })
    } else if args.disabled {
        json!({ "items": client.disabled_menu_items(menu)? })
    } else if let Some(menu) = menu {
        json!({ "menu": menu, "items": client.menu_items(menu)? })
    } else {
        serde_json::to_value(client.menu_state()?)?
    };
    print_json(&payload)
}

fn command_focus(config: &Config, args: FocusArgs) -> Result<()> {
    let guard = ModalGuard::new(config);
    let focused = guard.focused_window();
    let modal = guard.detect_modal_dialog();

    let dismissed = match (&modal, args.dismiss) {
        (Some(window), true) => {
            info!(window = %window.name, "dismissing modal");
            let ok = guard.dismiss_focus_stealer(None);
            Some(if ok {
                Diagnostic::ok_with(1, format!("dismissed '{}'", window.name))
            } else {
                Diagnostic::failed(1, "dismiss_failed", format!("'{}' still focused", window.name))
            })
        }
        _ => None,
    };

    let target_focused = args.ensure.map(|attempts| {
        if guard.ensure_target_focused(attempts) {
            Diagnostic::ok(attempts)
        } else {
            Diagnostic::failed(
                attempts,
                "focus_not_converged",
                format!("{} did not take focus", config.target),
            )
        }
    });

    print_json(&json!({
        "focused_window": focused,
        "modal_detected": modal,
        "focus_stealer": guard.has_focus_stealer(None),
        "dismissed": dismissed,
        "target_focused": target_focused,
    }))
}

fn command_capture(config: &Config, args: CaptureArgs) -> Result<()> {
    let capture = FailureCapture::new(config);
    capture.set_test_name(&args.label);
    capture.log(format!("Capture requested: {}", args.label));

    let screenshot = capture.take_screenshot(Some(&args.label));
    let state = capture.capture_state(&args.label);
    let log = capture.save_log(None);

    print_json(&json!({
        "screenshot": screenshot,
        "log": log,
        "state": state,
    }))
}

fn smoke_suite<'a>(client: &'a WorkspaceClient, target: &'a str) -> Vec<TestCase<'a>> {
    vec![
        TestCase::new(format!("{target} is running"), move || {
            Ok(client.is_target_running())
        }),
        TestCase::new("UI state can be queried", move || {
            client.query_ui_state()?;
            Ok(true)
        }),
        TestCase::new("UI testing is enabled", move || {
            Ok(client.query_ui_state()?.ui_testing_enabled)
        }),
        TestCase::new("At least one window exists", move || {
            Ok(!client.query_ui_state()?.windows.is_empty())
        }),
        TestCase::new("Can get visible windows", move || {
            client.visible_windows()?;
            Ok(true)
        }),
        TestCase::new("Can get window titles", move || {
            client.window_titles()?;
            Ok(true)
        }),
        TestCase::new(format!("{target} main window exists"), move || {
            client.assert_window_exists(target, None)?;
            Ok(true)
        }),
        TestCase::new("Menus can be listed", move || {
            Ok(!client.menu_state()?.menus.is_empty())
        }),
    ]
}

fn command_smoke(config: &Config, args: SmokeArgs) -> Result<i32> {
    let client = connect(config)?;
    let mut options = if args.interactive {
        RunOptions::interactive(config.pacing.interactive_pause())
    } else {
        RunOptions::default()
    };
    if args.keep_going {
        options.stop_on_failure = false;
    }
    if args.no_highlight {
        options.highlight_failures = false;
    }

    let tests = smoke_suite(&client, &config.target);
    println!("Running {} smoke tests against {}\n", tests.len(), config.target);
    let summary = TestRunner::new(options).with_client(&client).run(tests);
    Ok(summary.exit_code())
}
