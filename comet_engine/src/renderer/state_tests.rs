//! Unit tests for the resource-state tracker, including the documented
//! per-frame transition discipline.

use super::*;

// Resource ids mirroring the frame graph's cast
const TRANSFORM_BUFFER: u32 = 0;
const INDIRECT_BUFFER: u32 = 1;
const COUNT_BUFFER: u32 = 2;
const DEPTH_TARGET: u32 = 3;
const PYRAMID: u32 = 4;
const SWAPCHAIN: u32 = 5;

fn declare_frame_resources(tracker: &mut ResourceStateTracker) {
    tracker.declare(TrackedResource::whole(TRANSFORM_BUFFER), ResourceState::CopyDest);
    tracker.declare(TrackedResource::whole(INDIRECT_BUFFER), ResourceState::IndirectArgument);
    tracker.declare(TrackedResource::whole(COUNT_BUFFER), ResourceState::IndirectArgument);
    tracker.declare(TrackedResource::whole(DEPTH_TARGET), ResourceState::DepthWrite);
    for mip in 0..4 {
        tracker.declare(TrackedResource::mip(PYRAMID, mip), ResourceState::NonPixelShaderResource);
    }
    tracker.declare(TrackedResource::whole(SWAPCHAIN), ResourceState::Present);
}

#[test]
fn transition_requires_the_declared_state() {
    let mut tracker = ResourceStateTracker::new();
    declare_frame_resources(&mut tracker);

    let result = tracker.transition(
        TrackedResource::whole(INDIRECT_BUFFER),
        ResourceState::UnorderedAccess,
        ResourceState::IndirectArgument,
    );
    assert!(result.is_err(), "wrong source state must be rejected");
}

#[test]
fn untracked_resources_are_rejected() {
    let mut tracker = ResourceStateTracker::new();
    let result = tracker.transition(
        TrackedResource::whole(99),
        ResourceState::Common,
        ResourceState::CopyDest,
    );
    assert!(result.is_err());
}

/// Walk a whole frame's transitions in order; every pair must match what
/// the previous pass left behind.
#[test]
fn full_frame_sequence_is_consistent() {
    let mut tracker = ResourceStateTracker::new();
    declare_frame_resources(&mut tracker);

    // Transfer pass copied transforms; culling reads them
    tracker
        .transition(
            TrackedResource::whole(TRANSFORM_BUFFER),
            ResourceState::CopyDest,
            ResourceState::NonPixelShaderResource,
        )
        .unwrap();

    // Indirect + count become UAV for the two culling dispatches
    for buffer in [INDIRECT_BUFFER, COUNT_BUFFER] {
        tracker
            .transition(
                TrackedResource::whole(buffer),
                ResourceState::IndirectArgument,
                ResourceState::UnorderedAccess,
            )
            .unwrap();
    }

    // Back to indirect-argument for the graphics pass
    for buffer in [INDIRECT_BUFFER, COUNT_BUFFER] {
        tracker
            .transition(
                TrackedResource::whole(buffer),
                ResourceState::UnorderedAccess,
                ResourceState::IndirectArgument,
            )
            .unwrap();
    }

    // Swapchain: present -> render target -> present
    tracker
        .transition(
            TrackedResource::whole(SWAPCHAIN),
            ResourceState::Present,
            ResourceState::RenderTarget,
        )
        .unwrap();

    // Depth: written by the draw, read by the pyramid build
    tracker
        .transition(
            TrackedResource::whole(DEPTH_TARGET),
            ResourceState::DepthWrite,
            ResourceState::NonPixelShaderResource,
        )
        .unwrap();

    // Pyramid mips: each written then read by the next reduction
    for mip in 0..4 {
        tracker
            .transition(
                TrackedResource::mip(PYRAMID, mip),
                ResourceState::NonPixelShaderResource,
                ResourceState::UnorderedAccess,
            )
            .unwrap();
        tracker
            .transition(
                TrackedResource::mip(PYRAMID, mip),
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            )
            .unwrap();
    }

    // Depth back for next frame's writes, transforms back for next upload
    tracker
        .transition(
            TrackedResource::whole(DEPTH_TARGET),
            ResourceState::NonPixelShaderResource,
            ResourceState::DepthWrite,
        )
        .unwrap();
    tracker
        .transition(
            TrackedResource::whole(TRANSFORM_BUFFER),
            ResourceState::NonPixelShaderResource,
            ResourceState::CopyDest,
        )
        .unwrap();

    tracker
        .transition(
            TrackedResource::whole(SWAPCHAIN),
            ResourceState::RenderTarget,
            ResourceState::Present,
        )
        .unwrap();

    // End-of-frame states equal start-of-frame states
    assert_eq!(
        tracker.current(TrackedResource::whole(TRANSFORM_BUFFER)),
        Some(ResourceState::CopyDest)
    );
    assert_eq!(
        tracker.current(TrackedResource::whole(INDIRECT_BUFFER)),
        Some(ResourceState::IndirectArgument)
    );
    assert_eq!(
        tracker.current(TrackedResource::whole(SWAPCHAIN)),
        Some(ResourceState::Present)
    );
    assert_eq!(
        tracker.current(TrackedResource::whole(DEPTH_TARGET)),
        Some(ResourceState::DepthWrite)
    );
}

#[test]
fn request_skips_redundant_transitions_but_not_uav() {
    let mut tracker = ResourceStateTracker::new();
    tracker.declare(TrackedResource::whole(0), ResourceState::UnorderedAccess);

    // Same non-UAV state: no barrier
    tracker.declare(TrackedResource::whole(1), ResourceState::IndexBuffer);
    let none = tracker
        .request(TrackedResource::whole(1), ResourceState::IndexBuffer)
        .unwrap();
    assert!(none.is_none());

    // UAV -> UAV still reports, the backend emits a self-barrier
    let uav = tracker
        .request(TrackedResource::whole(0), ResourceState::UnorderedAccess)
        .unwrap();
    assert!(uav.is_some());
}

#[test]
fn state_access_masks_cover_reads_and_writes() {
    assert!(ResourceState::UnorderedAccess
        .access()
        .contains(StateAccess::SHADER_WRITE));
    assert!(ResourceState::IndirectArgument
        .access()
        .contains(StateAccess::INDIRECT_READ));
    assert!(ResourceState::CopyDest
        .access()
        .contains(StateAccess::TRANSFER_WRITE));
    assert_eq!(ResourceState::Common.access(), StateAccess::empty());
}
