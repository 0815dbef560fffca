//! Engine state machine and event dispatch.
//!
//! The window layer feeds [`Event`]s into an [`EventSystem`]; registered
//! callbacks act on a [`WorldContext`] of non-owning references. The engine
//! state is a single atomic so that either the main thread or the loader
//! thread may transition it.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::camera::CameraContainer;
use crate::engine_warn;

/// Lifecycle states of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Loader thread is ingesting the scene; main thread shows the
    /// waiting screen
    Loading = 0,
    /// Normal frame loop
    Running = 1,
    /// Window is 0×0; rendering paused until a non-zero resize
    Suspended = 2,
    /// Cooperative shutdown requested
    Shutdown = 3,
    /// A loader-time error occurred; finish the waiting loop, then exit
    ShutdownAfterLoad = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Loading,
            1 => EngineState::Running,
            2 => EngineState::Suspended,
            4 => EngineState::ShutdownAfterLoad,
            _ => EngineState::Shutdown,
        }
    }
}

/// Atomic cell holding the current [`EngineState`].
pub struct EngineStateCell(AtomicU8);

impl EngineStateCell {
    pub fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition only if currently in `from`. Returns whether it happened.
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Keys the engine reacts to. Anything else arrives as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    W,
    A,
    S,
    D,
    F1,
    F2,
    F3,
    F4,
    Other(u32),
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Events routed from the window layer into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    KeyPressed(Key),
    KeyReleased(Key),
    MouseMoved { dx: f32, dy: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    WindowResize { width: u32, height: u32 },
    ShutdownRequested,
}

/// Non-owning view of the subsystems event callbacks may touch.
///
/// Built fresh for each dispatch; holding it does not extend any lifetime.
pub struct WorldContext<'a> {
    pub cameras: &'a mut CameraContainer,
    pub state: &'a EngineStateCell,
}

/// Callback: returns `true` when the event was consumed.
pub type EventCallback = Box<dyn FnMut(&Event, &mut WorldContext) -> bool + Send>;

/// Ordered registry of event callbacks.
pub struct EventSystem {
    handlers: Vec<EventCallback>,
}

impl EventSystem {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, callback: EventCallback) {
        self.handlers.push(callback);
    }

    /// Dispatch to every handler until one consumes the event.
    pub fn fire(&mut self, event: &Event, ctx: &mut WorldContext) -> bool {
        for handler in &mut self.handlers {
            if handler(event, ctx) {
                return true;
            }
        }
        false
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the engine's default bindings:
///
/// - Escape → shutdown
/// - W/A/S/D → camera velocity (released key zeroes its axis)
/// - F1 → freeze culling frustum (detach camera)
/// - F2 → toggle occlusion culling
/// - F3 / F4 → raise / lower the pyramid debug level
/// - Resize 0×0 → suspend; non-zero → running + swapchain recreate
pub fn register_default_events(events: &mut EventSystem) {
    events.register(Box::new(|event, ctx| match event {
        Event::ShutdownRequested => {
            engine_warn!("comet::events", "engine shutdown event received");
            ctx.state.set(EngineState::Shutdown);
            true
        }
        _ => false,
    }));

    events.register(Box::new(|event, ctx| match event {
        Event::KeyPressed(key) => on_key_pressed(*key, ctx),
        Event::KeyReleased(key) => on_key_released(*key, ctx),
        _ => false,
    }));

    events.register(Box::new(|event, ctx| match event {
        Event::MouseMoved { dx, dy } => {
            ctx.cameras.moving_camera_mut().rotate(*dx, *dy);
            true
        }
        _ => false,
    }));

    events.register(Box::new(|event, ctx| match event {
        Event::WindowResize { width, height } => {
            if *width == 0 || *height == 0 {
                ctx.state.transition(EngineState::Running, EngineState::Suspended);
            } else {
                ctx.state.transition(EngineState::Suspended, EngineState::Running);
                ctx.cameras.on_window_resize(*width, *height);
            }
            true
        }
        _ => false,
    }));
}

fn on_key_pressed(key: Key, ctx: &mut WorldContext) -> bool {
    match key {
        Key::Escape => {
            ctx.state.set(EngineState::Shutdown);
            true
        }
        Key::W => {
            ctx.cameras.moving_camera_mut().set_velocity_z(1.0);
            true
        }
        Key::S => {
            ctx.cameras.moving_camera_mut().set_velocity_z(-1.0);
            true
        }
        Key::A => {
            ctx.cameras.moving_camera_mut().set_velocity_x(-1.0);
            true
        }
        Key::D => {
            ctx.cameras.moving_camera_mut().set_velocity_x(1.0);
            true
        }
        Key::F1 => {
            ctx.cameras.toggle_frustum_freeze();
            true
        }
        Key::F2 => {
            ctx.cameras.toggle_occlusion();
            true
        }
        Key::F3 => {
            ctx.cameras.raise_pyramid_debug_level();
            true
        }
        Key::F4 => {
            ctx.cameras.lower_pyramid_debug_level();
            true
        }
        _ => false,
    }
}

fn on_key_released(key: Key, ctx: &mut WorldContext) -> bool {
    match key {
        Key::W | Key::S => {
            ctx.cameras.moving_camera_mut().set_velocity_z(0.0);
            true
        }
        Key::A | Key::D => {
            ctx.cameras.moving_camera_mut().set_velocity_x(0.0);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
