//! Unit tests for the state machine and default event bindings.

use super::*;
use crate::camera::CameraContainer;

fn fixture() -> (EventSystem, CameraContainer, EngineStateCell) {
    let mut events = EventSystem::new();
    register_default_events(&mut events);
    let cameras = CameraContainer::new(1280, 720);
    let state = EngineStateCell::new(EngineState::Running);
    (events, cameras, state)
}

#[test]
fn state_cell_roundtrips() {
    let cell = EngineStateCell::new(EngineState::Loading);
    assert_eq!(cell.get(), EngineState::Loading);
    cell.set(EngineState::Running);
    assert_eq!(cell.get(), EngineState::Running);
}

#[test]
fn transition_is_conditional() {
    let cell = EngineStateCell::new(EngineState::Running);
    assert!(!cell.transition(EngineState::Suspended, EngineState::Running));
    assert!(cell.transition(EngineState::Running, EngineState::Suspended));
    assert_eq!(cell.get(), EngineState::Suspended);
}

#[test]
fn escape_requests_shutdown() {
    let (mut events, mut cameras, state) = fixture();
    let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
    events.fire(&Event::KeyPressed(Key::Escape), &mut ctx);
    assert_eq!(state.get(), EngineState::Shutdown);
}

#[test]
fn wasd_sets_and_clears_velocity() {
    let (mut events, mut cameras, state) = fixture();

    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyPressed(Key::W), &mut ctx);
    }
    assert_eq!(cameras.moving_camera().velocity.z, 1.0);

    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyReleased(Key::W), &mut ctx);
    }
    assert_eq!(cameras.moving_camera().velocity.z, 0.0);

    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyPressed(Key::A), &mut ctx);
    }
    assert_eq!(cameras.moving_camera().velocity.x, -1.0);
}

#[test]
fn zero_resize_suspends_until_a_real_resize() {
    let (mut events, mut cameras, state) = fixture();

    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::WindowResize { width: 0, height: 720 }, &mut ctx);
    }
    assert_eq!(state.get(), EngineState::Suspended);

    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::WindowResize { width: 1920, height: 1080 }, &mut ctx);
    }
    assert_eq!(state.get(), EngineState::Running);
    assert_eq!(cameras.main_camera().window_width, 1920);
}

#[test]
fn f1_toggles_the_frustum_freeze() {
    let (mut events, mut cameras, state) = fixture();
    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyPressed(Key::F1), &mut ctx);
    }
    assert!(cameras.frustum_frozen());
    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyPressed(Key::F1), &mut ctx);
    }
    assert!(!cameras.frustum_frozen());
}

#[test]
fn f3_f4_walk_the_pyramid_debug_level() {
    let (mut events, mut cameras, state) = fixture();
    {
        let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
        events.fire(&Event::KeyPressed(Key::F3), &mut ctx);
        events.fire(&Event::KeyPressed(Key::F3), &mut ctx);
        events.fire(&Event::KeyPressed(Key::F4), &mut ctx);
    }
    assert_eq!(cameras.flags.debug_pyramid_level, 1);
}

#[test]
fn unhandled_events_fall_through() {
    let (mut events, mut cameras, state) = fixture();
    let mut ctx = WorldContext { cameras: &mut cameras, state: &state };
    let consumed = events.fire(&Event::KeyPressed(Key::Other(42)), &mut ctx);
    assert!(!consumed);
}
