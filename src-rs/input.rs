//! Synthetic keyboard and mouse input.
//!
//! Events go straight to the X server through `xdotool`, so the target
//! sees them as ordinary user input.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::command::{command_exists, CommandRunner, ProcessRunner};
use crate::config::{Config, Pacing};
use crate::error::{Result, UiTestError};
use crate::retry::{pause, RetryPolicy};
use crate::wm::{ButtonPosition, Geometry, MouseButton, WindowManager, XDOTOOL};

pub type Point = (i64, i64);

const MIN_SMOOTH_DISTANCE: f64 = 5.0;
const MIN_MOVE_SECS: f64 = 0.1;
const MAX_MOVE_SECS: f64 = 1.5;
const PIXELS_PER_STEP: f64 = 20.0;
const MIN_STEPS: usize = 5;
const MAX_STEPS: usize = 30;
const LINEAR_STEPS_PER_SEC: f64 = 30.0;

/// Points to visit, in order, and the pause after each.
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    pub points: Vec<Point>,
    pub step_delay: Duration,
}

/// Straight-line path at roughly 30 samples per second, ending on `target`.
pub fn linear_path(start: Point, target: Point, duration: Duration) -> MovePlan {
    let steps = MIN_STEPS.max((duration.as_secs_f64() * LINEAR_STEPS_PER_SEC) as usize);
    let (dx, dy) = ((target.0 - start.0) as f64, (target.1 - start.1) as f64);
    let points = (1..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            (
                start.0 + (dx * t) as i64,
                start.1 + (dy * t) as i64,
            )
        })
        .collect();
    MovePlan {
        points,
        step_delay: duration / steps as u32,
    }
}

/// Quadratic Bézier path through a randomly nudged midpoint.
///
/// The last point is always exactly `target`, whatever the perturbation.
pub fn smoothed_plan<R: Rng + ?Sized>(
    start: Point,
    target: Point,
    speed: f64,
    variation: f64,
    rng: &mut R,
) -> MovePlan {
    let (x0, y0) = (start.0 as f64, start.1 as f64);
    let (x2, y2) = (target.0 as f64, target.1 as f64);
    let (dx, dy) = (x2 - x0, y2 - y0);
    let distance = dx.hypot(dy);

    if distance < MIN_SMOOTH_DISTANCE {
        return MovePlan {
            points: vec![target],
            step_delay: Duration::ZERO,
        };
    }

    let duration = (distance / speed).clamp(MIN_MOVE_SECS, MAX_MOVE_SECS);
    let x1 = (x0 + x2) / 2.0 - dy * variation * rng.gen_range(-1.0_f64..=1.0);
    let y1 = (y0 + y2) / 2.0 + dx * variation * rng.gen_range(-1.0_f64..=1.0);

    let steps = ((distance / PIXELS_PER_STEP) as usize).clamp(MIN_STEPS, MAX_STEPS);
    let mut points: Vec<Point> = (1..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let u = 1.0 - t;
            (
                (u * u * x0 + 2.0 * u * t * x1 + t * t * x2) as i64,
                (u * u * y0 + 2.0 * u * t * y1 + t * t * y2) as i64,
            )
        })
        .collect();
    points.push(target);

    MovePlan {
        points,
        step_delay: Duration::from_secs_f64(duration / steps as f64),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Left,
    Right,
}

impl Arrow {
    fn key(self) -> &'static str {
        match self {
            Arrow::Up => "Up",
            Arrow::Down => "Down",
            Arrow::Left => "Left",
            Arrow::Right => "Right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOptions {
    pub button: MouseButton,
    /// Move there along a smoothed path instead of jumping.
    pub smooth: bool,
    /// Dismiss an alert-looking focused window first.
    pub check_focus: bool,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            smooth: false,
            check_focus: false,
        }
    }
}

pub struct InputSimulator {
    wm: WindowManager,
    pacing: Pacing,
    focus_keywords: Vec<String>,
    button_inset_x: i64,
    button_inset_bottom: i64,
    rng: RefCell<StdRng>,
}

impl InputSimulator {
    /// Fails with [`UiTestError::InputToolMissing`] when `xdotool` is not
    /// installed; nothing in this type can work without it.
    pub fn new(config: &Config) -> Result<Self> {
        if !command_exists(XDOTOOL) {
            return Err(UiTestError::InputToolMissing {
                tool: XDOTOOL.to_string(),
            });
        }
        Ok(Self::with_runner(
            Rc::new(ProcessRunner),
            config,
            StdRng::from_entropy(),
        ))
    }

    pub fn with_runner(runner: Rc<dyn CommandRunner>, config: &Config, rng: StdRng) -> Self {
        Self {
            wm: WindowManager::new(runner, config.timeouts.ui_command()),
            pacing: config.pacing.clone(),
            focus_keywords: config.modal.focus_check_keywords.clone(),
            button_inset_x: config.modal.button_inset_x,
            button_inset_bottom: config.modal.button_inset_bottom,
            rng: RefCell::new(rng),
        }
    }

    pub fn window_manager(&self) -> &WindowManager {
        &self.wm
    }

    /// Sends a key or plus-joined chord such as `Return` or `alt+shift+n`.
    pub fn key(&self, spec: &str) -> Result<()> {
        self.wm.key(spec, self.pacing.key_delay_ms)?;
        pause(self.pacing.settle());
        Ok(())
    }

    pub fn type_text(&self, text: &str) -> Result<()> {
        self.wm.type_text(text, self.pacing.type_delay_ms)?;
        pause(self.pacing.settle());
        Ok(())
    }

    pub fn shortcut(&self, keys: &[&str]) -> Result<()> {
        self.key(&keys.join("+"))
    }

    /// Command+key. GNUstep maps Command to Alt.
    pub fn cmd(&self, key: &str) -> Result<()> {
        self.key(&format!("alt+{key}"))
    }

    pub fn cmd_shift(&self, key: &str) -> Result<()> {
        self.key(&format!("alt+shift+{key}"))
    }

    pub fn press_return(&self) -> Result<()> {
        self.key("Return")
    }

    pub fn press_escape(&self) -> Result<()> {
        self.key("Escape")
    }

    pub fn press_tab(&self) -> Result<()> {
        self.key("Tab")
    }

    pub fn press_backspace(&self) -> Result<()> {
        self.key("BackSpace")
    }

    pub fn press_delete(&self) -> Result<()> {
        self.key("Delete")
    }

    pub fn press_arrow(&self, arrow: Arrow) -> Result<()> {
        self.key(arrow.key())
    }

    fn current_position(&self) -> Result<Point> {
        let pos = self.wm.mouse_location()?;
        Ok((pos.x, pos.y))
    }

    fn follow(&self, plan: &MovePlan) -> Result<()> {
        for &(x, y) in &plan.points {
            self.wm.mouse_move(x, y)?;
            if self.pacing.animate_mouse {
                pause(plan.step_delay);
            }
        }
        Ok(())
    }

    /// Human-like move from the current cursor position to `(x, y)`.
    pub fn move_smoothly(&self, x: i64, y: i64) -> Result<()> {
        let start = self.current_position()?;
        let plan = smoothed_plan(
            start,
            (x, y),
            self.pacing.mouse_speed,
            self.pacing.curve_variation,
            &mut *self.rng.borrow_mut(),
        );
        self.follow(&plan)
    }

    pub fn move_linear(&self, x: i64, y: i64, duration: Duration) -> Result<()> {
        let start = self.current_position()?;
        self.follow(&linear_path(start, (x, y), duration))
    }

    pub fn move_mouse(&self, x: i64, y: i64, smooth: bool) -> Result<()> {
        if smooth {
            self.move_smoothly(x, y)
        } else {
            self.wm.mouse_move(x, y)
        }
    }

    pub fn click(&self, x: i64, y: i64, options: ClickOptions) -> Result<()> {
        if options.check_focus {
            self.check_focus_before_click()?;
        }
        self.move_mouse(x, y, options.smooth)?;
        pause(self.pacing.pre_click());
        self.wm.click(options.button)?;
        pause(self.pacing.settle());
        Ok(())
    }

    /// Smoothed left click preceded by the focus check.
    pub fn click_safe(&self, x: i64, y: i64) -> Result<()> {
        self.click(
            x,
            y,
            ClickOptions {
                smooth: true,
                check_focus: true,
                ..ClickOptions::default()
            },
        )
    }

    pub fn double_click(&self, x: i64, y: i64, options: ClickOptions) -> Result<()> {
        if options.check_focus {
            self.check_focus_before_click()?;
        }
        self.move_mouse(x, y, options.smooth)?;
        pause(self.pacing.pre_click());
        self.wm.double_click(options.button)?;
        pause(self.pacing.settle());
        Ok(())
    }

    pub fn right_click(&self, x: i64, y: i64, smooth: bool) -> Result<()> {
        self.click(
            x,
            y,
            ClickOptions {
                button: MouseButton::Right,
                smooth,
                check_focus: false,
            },
        )
    }

    pub fn drag(&self, from: Point, to: Point, smooth: bool) -> Result<()> {
        self.move_mouse(from.0, from.1, smooth)?;
        pause(self.pacing.drag_step());
        self.wm.mouse_down(MouseButton::Left)?;
        pause(self.pacing.drag_step());
        self.move_mouse(to.0, to.1, smooth)?;
        pause(self.pacing.drag_step());
        self.wm.mouse_up(MouseButton::Left)?;
        pause(self.pacing.settle());
        Ok(())
    }

    pub fn focused_window_name(&self) -> Option<String> {
        let id = self.wm.active_window_id()?;
        self.wm.window_name(&id)
    }

    /// Presses Escape if the focused window's name looks like an alert.
    /// Returns whether it did.
    pub fn check_focus_before_click(&self) -> Result<bool> {
        let Some(focused) = self.focused_window_name() else {
            return Ok(false);
        };
        debug!(focused = %focused, "focus check");
        let lower = focused.to_lowercase();
        if !self.focus_keywords.iter().any(|kw| lower.contains(kw.as_str())) {
            return Ok(false);
        }
        info!(focused = %focused, "alert has focus, pressing Escape");
        self.press_escape()?;
        pause(self.pacing.focus_pause());
        Ok(true)
    }

    pub fn active_window_id(&self) -> Option<String> {
        self.wm.active_window_id()
    }

    pub fn window_name(&self, window_id: &str) -> Option<String> {
        self.wm.window_name(window_id)
    }

    pub fn window_geometry(&self, window_id: &str) -> Geometry {
        self.wm.window_geometry(window_id)
    }

    pub fn focus_window(&self, window_id: &str) -> Result<()> {
        self.wm.activate(window_id)?;
        pause(self.pacing.focus_pause());
        Ok(())
    }

    pub fn search_window(&self, name: &str) -> Option<String> {
        self.wm.search_by_name(name).into_iter().next()
    }

    pub fn focus_window_by_name(&self, name: &str) -> bool {
        match self.search_window(name) {
            Some(id) => self.focus_window(&id).is_ok(),
            None => false,
        }
    }

    /// Window-manager level wait; works even when the bridge is blocked.
    pub fn wait_for_window(&self, name: &str, timeout: Duration) -> bool {
        RetryPolicy::deadline(timeout, self.pacing.poll_interval())
            .until(|| self.search_window(name).is_some())
    }

    /// Clicks where a button usually sits in the focused dialog. `false`
    /// when there is no focused window with a known size.
    pub fn click_dialog_button(&self, position: ButtonPosition) -> Result<bool> {
        let Some(id) = self.wm.active_window_id() else {
            return Ok(false);
        };
        let geometry = self.wm.window_geometry(&id);
        if geometry.width == 0 {
            return Ok(false);
        }
        let (x, y) = geometry.button_point(position, self.button_inset_x, self.button_inset_bottom);
        self.click(x, y, ClickOptions::default())?;
        Ok(true)
    }
}
