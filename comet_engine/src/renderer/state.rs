//! Resource-state tracking.
//!
//! Every GPU buffer and image has exactly one declared logical state between
//! any two passes. Backends route their transitions through a
//! [`ResourceStateTracker`] so a mismatch between what a pass expects and
//! what the previous pass left behind is caught on the host, not as a GPU
//! hazard.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::{EngineError, EngineResult};

/// Logical usage states, named after the transitions the frame graph makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    CopyDest,
    CopySource,
    IndexBuffer,
    /// Read by compute or vertex work
    NonPixelShaderResource,
    /// Sampled by fragment work
    PixelShaderResource,
    UnorderedAccess,
    IndirectArgument,
    RenderTarget,
    DepthWrite,
    Present,
}

bitflags! {
    /// Which pipeline stages may touch a resource in a given state.
    /// Backends use this to derive their barrier scopes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateAccess: u32 {
        const TRANSFER_READ   = 1 << 0;
        const TRANSFER_WRITE  = 1 << 1;
        const SHADER_READ     = 1 << 2;
        const SHADER_WRITE    = 1 << 3;
        const INDEX_READ      = 1 << 4;
        const INDIRECT_READ   = 1 << 5;
        const ATTACHMENT      = 1 << 6;
        const PRESENT_SRC     = 1 << 7;
    }
}

impl ResourceState {
    pub fn access(self) -> StateAccess {
        match self {
            ResourceState::Common => StateAccess::empty(),
            ResourceState::CopyDest => StateAccess::TRANSFER_WRITE,
            ResourceState::CopySource => StateAccess::TRANSFER_READ,
            ResourceState::IndexBuffer => StateAccess::INDEX_READ,
            ResourceState::NonPixelShaderResource | ResourceState::PixelShaderResource => {
                StateAccess::SHADER_READ
            }
            ResourceState::UnorderedAccess => {
                StateAccess::SHADER_READ | StateAccess::SHADER_WRITE
            }
            ResourceState::IndirectArgument => StateAccess::INDIRECT_READ,
            ResourceState::RenderTarget | ResourceState::DepthWrite => StateAccess::ATTACHMENT,
            ResourceState::Present => StateAccess::PRESENT_SRC,
        }
    }
}

/// Identifies a tracked resource. Subresource 0 is the whole resource;
/// depth-pyramid mips track individually as `mip + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedResource {
    pub id: u32,
    pub subresource: u32,
}

impl TrackedResource {
    pub fn whole(id: u32) -> Self {
        Self { id, subresource: 0 }
    }

    pub fn mip(id: u32, mip: u32) -> Self {
        Self { id, subresource: mip + 1 }
    }
}

/// A transition the backend must turn into an API barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub resource: TrackedResource,
    pub from: ResourceState,
    pub to: ResourceState,
}

/// Host-side ledger of every resource's current logical state.
pub struct ResourceStateTracker {
    states: FxHashMap<TrackedResource, ResourceState>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self {
            states: FxHashMap::default(),
        }
    }

    /// Register a resource in its creation state.
    pub fn declare(&mut self, resource: TrackedResource, state: ResourceState) {
        self.states.insert(resource, state);
    }

    pub fn current(&self, resource: TrackedResource) -> Option<ResourceState> {
        self.states.get(&resource).copied()
    }

    /// Record a transition. Fails if the resource is unknown or not in
    /// `from` — that means two passes disagree about the resource's state,
    /// which is exactly the bug this tracker exists to catch.
    pub fn transition(
        &mut self,
        resource: TrackedResource,
        from: ResourceState,
        to: ResourceState,
    ) -> EngineResult<StateTransition> {
        let current = self.states.get_mut(&resource).ok_or_else(|| {
            EngineError::InvalidResource(format!("untracked resource {:?}", resource))
        })?;
        if *current != from {
            return Err(EngineError::InvalidResource(format!(
                "resource {:?} is in state {:?}, transition expected {:?} -> {:?}",
                resource, current, from, to
            )));
        }
        *current = to;
        Ok(StateTransition { resource, from, to })
    }

    /// Transition from whatever state the resource is currently in.
    /// Returns `None` when it already is in `to` (no barrier needed);
    /// UAV-to-UAV still reports a transition so the backend can emit the
    /// write-write self-barrier.
    pub fn request(
        &mut self,
        resource: TrackedResource,
        to: ResourceState,
    ) -> EngineResult<Option<StateTransition>> {
        let current = self.states.get_mut(&resource).ok_or_else(|| {
            EngineError::InvalidResource(format!("untracked resource {:?}", resource))
        })?;
        let from = *current;
        if from == to && to != ResourceState::UnorderedAccess {
            return Ok(None);
        }
        *current = to;
        Ok(Some(StateTransition { resource, from, to }))
    }
}

impl Default for ResourceStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
