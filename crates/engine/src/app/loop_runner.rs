use std::sync::Arc;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::engine::Engine;
use super::input::{Button, InputState};
use super::metrics::FrameStatsAccumulator;
use super::rendering::Renderer;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Longest frame the simulation will integrate in one step.
    pub max_frame_delta: Duration,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_frame_delta: Duration::from_millis(250),
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Opens the configured window and runs frames until Escape, window close
/// or a frame error.
pub fn run_app(mut engine: Engine, config: LoopConfig) -> Result<(), AppError> {
    let window_config = engine.config().system.window.clone();
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(window_config.title.clone())
            .with_inner_size(LogicalSize::new(
                f64::from(window_config.width),
                f64::from(window_config.height),
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(
        Arc::clone(&window),
        window_config.width,
        window_config.height,
    )
    .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    info!(
        title = %window_config.title,
        width = window_config.width,
        height = window_config.height,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        "loop_config"
    );

    let mut input = InputState::new();
    let mut last_frame_instant = Instant::now();
    let mut frame_stats = FrameStatsAccumulator::new(metrics_log_interval, last_frame_instant);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(false) => input.release_all(),
                WindowEvent::KeyboardInput { event, .. } => {
                    let is_pressed = event.state == ElementState::Pressed;
                    if is_pressed && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                        info!(reason = "escape_key", "shutdown_requested");
                        window_target.exit();
                        return;
                    }
                    if let Some(button) = button_for_key(event.physical_key) {
                        input.set(button, is_pressed);
                    }
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    if let Some(button) = button_for_mouse(button) {
                        input.set(button, state == ElementState::Pressed);
                    }
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let frame_time = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;
                    let dt = clamp_frame_delta(frame_time, max_frame_delta).as_secs_f32();

                    if let Err(error) = engine.step(dt, &input) {
                        warn!(error = %error, "frame_update_failed");
                        window_target.exit();
                        return;
                    }
                    input.end_frame();

                    match engine.render() {
                        Ok(surface) => {
                            if let Err(error) = renderer.present(surface) {
                                warn!(error = %error, "renderer_draw_failed");
                                window_target.exit();
                            }
                        }
                        Err(error) => {
                            warn!(error = %error, "frame_render_failed");
                            window_target.exit();
                        }
                    }

                    frame_stats.record_frame(frame_time);
                    if let Some(stats) = frame_stats.maybe_finish(now) {
                        info!(
                            fps = stats.fps,
                            frame_time_ms = stats.frame_time_ms,
                            worst_frame_ms = stats.worst_frame_ms,
                            scene = ?engine.active_scene_id().map(|id| id.as_str()),
                            actor_count = engine.actors().len(),
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => info!("shutdown"),
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Escape is reserved for quitting and never reaches the engine.
fn button_for_key(key: PhysicalKey) -> Option<Button> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let button = match code {
        KeyCode::ArrowUp => Button::ArrowUp,
        KeyCode::ArrowDown => Button::ArrowDown,
        KeyCode::ArrowLeft => Button::ArrowLeft,
        KeyCode::ArrowRight => Button::ArrowRight,
        KeyCode::Enter | KeyCode::NumpadEnter => Button::Enter,
        KeyCode::Space => Button::Space,
        KeyCode::Tab => Button::Tab,
        KeyCode::Backspace => Button::Backspace,
        KeyCode::KeyW => Button::KeyW,
        KeyCode::KeyA => Button::KeyA,
        KeyCode::KeyS => Button::KeyS,
        KeyCode::KeyD => Button::KeyD,
        KeyCode::KeyE => Button::KeyE,
        KeyCode::KeyQ => Button::KeyQ,
        _ => return None,
    };
    Some(button)
}

fn button_for_mouse(button: MouseButton) -> Option<Button> {
    match button {
        MouseButton::Left => Some(Button::MouseLeft),
        MouseButton::Right => Some(Button::MouseRight),
        MouseButton::Middle => Some(Button::MouseMiddle),
        _ => None,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limits_long_frames() {
        let max = Duration::from_millis(250);
        assert_eq!(clamp_frame_delta(Duration::from_secs(3), max), max);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(16), max),
            Duration::from_millis(16)
        );
    }

    #[test]
    fn zero_durations_fall_back() {
        let fallback = Duration::from_secs(1);
        assert_eq!(normalize_non_zero_duration(Duration::ZERO, fallback), fallback);
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), fallback),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn keys_map_to_engine_buttons() {
        assert_eq!(
            button_for_key(PhysicalKey::Code(KeyCode::ArrowLeft)),
            Some(Button::ArrowLeft)
        );
        assert_eq!(
            button_for_key(PhysicalKey::Code(KeyCode::NumpadEnter)),
            Some(Button::Enter)
        );
        assert_eq!(button_for_key(PhysicalKey::Code(KeyCode::Escape)), None);
        assert_eq!(button_for_key(PhysicalKey::Code(KeyCode::F3)), None);
        assert_eq!(button_for_mouse(MouseButton::Left), Some(Button::MouseLeft));
        assert_eq!(button_for_mouse(MouseButton::Back), None);
    }
}
