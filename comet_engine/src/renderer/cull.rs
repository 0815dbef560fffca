//! Culling and LOD-selection math.
//!
//! This is the host-side mirror of the culling compute kernels: the legacy
//! backend culls with it directly, the tests pin the GPU semantics with it,
//! and the shaders are written against the same formulas.

use glam::{Mat2, Vec2, Vec3, Vec4Swizzles};

use crate::camera::CameraViewData;
use crate::limits::MAX_DEPTH_PYRAMID_MIPS;
use crate::resource::{LodData, MeshTransform, PrimitiveSurface};
use crate::scene::RenderObject;
use super::indirect::IndirectDrawCommand;

/// Largest power of two ≤ `value` (`value` ≥ 1).
pub fn previous_power_of_two(value: u32) -> u32 {
    1 << (31 - value.leading_zeros())
}

/// Depth-pyramid shape for a given render-target size: dimensions clamp to
/// the nearest lower power of two, the mip count is `⌊log2(max(w,h))⌋ + 1`
/// capped at [`MAX_DEPTH_PYRAMID_MIPS`].
pub fn pyramid_dimensions(width: u32, height: u32) -> (u32, u32, u32) {
    let pw = previous_power_of_two(width.max(1));
    let ph = previous_power_of_two(height.max(1));
    let mips = (32 - pw.max(ph).leading_zeros()).min(MAX_DEPTH_PYRAMID_MIPS);
    (pw, ph, mips)
}

/// Frustum test for a view-space bounding sphere.
///
/// The four side planes come from the projection; near and far are the
/// `znear` plane and the draw distance. A sphere is dropped only when it is
/// outside some plane by more than its radius, so an object whose center is
/// inside and whose radius spans the whole view survives every test.
pub fn is_sphere_visible(view_data: &CameraViewData, center_view: Vec3, radius: f32) -> bool {
    let planes = [
        view_data.frustum_right,
        view_data.frustum_left,
        view_data.frustum_top,
        view_data.frustum_bottom,
    ];
    for plane in planes {
        if plane.xyz().dot(center_view) + plane.w < -radius {
            return false;
        }
    }
    let forward = -center_view.z;
    if forward + radius < view_data.znear {
        return false;
    }
    if forward - radius > view_data.draw_distance {
        return false;
    }
    true
}

/// Pick the coarsest LOD whose world-space error still projects under the
/// screen-space target at this distance. Equality keeps the coarser level.
pub fn select_lod(lods: &[LodData], distance: f32, lod_target: f32, lod_enabled: bool) -> usize {
    if !lod_enabled || lods.len() <= 1 {
        return 0;
    }
    let threshold = distance * lod_target;
    let mut chosen = 0;
    for (index, lod) in lods.iter().enumerate() {
        if lod.error <= threshold {
            chosen = index;
        }
    }
    chosen
}

/// Project a view-space sphere to a screen-space AABB in UV coordinates
/// (2D polar form of Mara & McGuire 2013). Returns `None` when the sphere
/// crosses the near plane, in which case the caller must treat it as
/// visible.
pub fn project_sphere(
    center_view: Vec3,
    radius: f32,
    znear: f32,
    p00: f32,
    p11: f32,
) -> Option<[f32; 4]> {
    let forward = -center_view.z;
    if forward < radius + znear {
        return None;
    }

    let cx = Vec2::new(-center_view.x, forward);
    let vx = Vec2::new((cx.dot(cx) - radius * radius).sqrt(), radius);
    let min_x = Mat2::from_cols(Vec2::new(vx.x, vx.y), Vec2::new(-vx.y, vx.x)) * cx;
    let max_x = Mat2::from_cols(Vec2::new(vx.x, -vx.y), Vec2::new(vx.y, vx.x)) * cx;

    let cy = Vec2::new(-center_view.y, forward);
    let vy = Vec2::new((cy.dot(cy) - radius * radius).sqrt(), radius);
    let min_y = Mat2::from_cols(Vec2::new(vy.x, vy.y), Vec2::new(-vy.y, vy.x)) * cy;
    let max_y = Mat2::from_cols(Vec2::new(vy.x, -vy.y), Vec2::new(vy.y, vy.x)) * cy;

    // Clip space, then remap to UV with a Y flip
    let aabb = [
        min_x.x / min_x.y * p00,
        min_y.x / min_y.y * p11,
        max_x.x / max_x.y * p00,
        max_y.x / max_y.y * p11,
    ];
    Some([
        aabb[0] * 0.5 + 0.5,
        aabb[3] * -0.5 + 0.5,
        aabb[2] * 0.5 + 0.5,
        aabb[1] * -0.5 + 0.5,
    ])
}

/// Host-side depth pyramid, the reference for the compute builder and the
/// data structure behind the occlusion tests.
///
/// Reverse-Z: mip 0 holds the max (nearest) of each 2×2 source block, every
/// further mip the max of the previous one.
pub struct CpuDepthPyramid {
    pub width: u32,
    pub height: u32,
    pub mips: Vec<Vec<f32>>,
}

impl CpuDepthPyramid {
    /// Reduce a full-resolution reverse-Z depth buffer.
    pub fn build(depth: &[f32], depth_width: u32, depth_height: u32) -> Self {
        let (width, height, mip_count) = pyramid_dimensions(depth_width, depth_height);

        let sample_source = |x: u32, y: u32| -> f32 {
            let sx = x.min(depth_width - 1);
            let sy = y.min(depth_height - 1);
            depth[(sy * depth_width + sx) as usize]
        };

        let mut mips = Vec::with_capacity(mip_count as usize);
        let mut mip0 = vec![0.0f32; (width * height) as usize];
        // Footprint of one pyramid texel in the source buffer
        let step_x = (depth_width as f32 / width as f32).ceil() as u32;
        let step_y = (depth_height as f32 / height as f32).ceil() as u32;
        for y in 0..height {
            for x in 0..width {
                let mut value = f32::MIN;
                for dy in 0..step_y.max(1) {
                    for dx in 0..step_x.max(1) {
                        value = value.max(sample_source(x * step_x + dx, y * step_y + dy));
                    }
                }
                mip0[(y * width + x) as usize] = value;
            }
        }
        mips.push(mip0);

        let mut mip_width = width;
        let mut mip_height = height;
        for _ in 1..mip_count {
            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);
            let previous = mips.last().expect("mip 0 exists");
            let mut next = vec![0.0f32; (next_width * next_height) as usize];
            for y in 0..next_height {
                for x in 0..next_width {
                    let sx = (x * 2).min(mip_width - 1);
                    let sy = (y * 2).min(mip_height - 1);
                    let sx1 = (sx + 1).min(mip_width - 1);
                    let sy1 = (sy + 1).min(mip_height - 1);
                    let a = previous[(sy * mip_width + sx) as usize];
                    let b = previous[(sy * mip_width + sx1) as usize];
                    let c = previous[(sy1 * mip_width + sx) as usize];
                    let d = previous[(sy1 * mip_width + sx1) as usize];
                    next[(y * next_width + x) as usize] = a.max(b).max(c).max(d);
                }
            }
            mips.push(next);
            mip_width = next_width;
            mip_height = next_height;
        }

        Self { width, height, mips }
    }

    /// Point-sample one mip at UV coordinates.
    pub fn sample(&self, level: u32, u: f32, v: f32) -> f32 {
        let level = (level as usize).min(self.mips.len() - 1);
        let mip_width = (self.width >> level).max(1);
        let mip_height = (self.height >> level).max(1);
        let x = ((u * mip_width as f32) as u32).min(mip_width - 1);
        let y = ((v * mip_height as f32) as u32).min(mip_height - 1);
        self.mips[level][(y * mip_width + x) as usize]
    }
}

/// Depth-pyramid occlusion test for a view-space sphere.
///
/// Samples the mip whose texel covers the sphere's screen footprint and
/// compares the sphere's nearest-point reverse-Z depth against it.
pub fn is_sphere_occluded(
    view_data: &CameraViewData,
    pyramid: &CpuDepthPyramid,
    center_view: Vec3,
    radius: f32,
) -> bool {
    let Some(aabb) = project_sphere(
        center_view,
        radius,
        view_data.znear,
        view_data.proj00,
        view_data.proj11,
    ) else {
        // Crossing the near plane: never occluded
        return false;
    };

    let width = (aabb[2] - aabb[0]) * view_data.pyramid_width;
    let height = (aabb[3] - aabb[1]) * view_data.pyramid_height;
    let level = (width.max(height).max(1.0)).log2().floor() as u32;

    let u = (aabb[0] + aabb[2]) * 0.5;
    let v = (aabb[1] + aabb[3]) * 0.5;
    let sampled = pyramid.sample(level, u, v);

    // Reverse-Z with an infinite projection: depth = znear / distance
    let sphere_depth = view_data.znear / (-center_view.z - radius);
    sphere_depth < sampled
}

/// Result of the CPU reference cull.
pub struct CullOutput {
    pub commands: Vec<IndirectDrawCommand>,
    /// The indirect buffer would have overflowed; the count was clamped
    pub overflowed: bool,
}

/// CPU mirror of the frustum + LOD culling kernel.
///
/// Produces the same indirect command stream the GPU pass writes (modulo
/// ordering, which the atomic allocator never guaranteed anyway).
pub fn cull_objects(
    objects: &[RenderObject],
    transforms: &[MeshTransform],
    surfaces: &[PrimitiveSurface],
    lods: &[LodData],
    view_data: &CameraViewData,
    max_commands: usize,
) -> CullOutput {
    let mut commands = Vec::new();
    let mut overflowed = false;

    for (object_index, object) in objects.iter().enumerate() {
        let transform = &transforms[object.transform_id as usize];
        let surface = &surfaces[object.surface_id as usize];

        let center_world = transform.transform_point(Vec3::from_array(surface.center));
        let radius = surface.radius * transform.scale;
        let center_view = view_data.cull_view.transform_point3(center_world);

        if !is_sphere_visible(view_data, center_view, radius) {
            continue;
        }

        let distance = (center_view.length() - radius).max(0.0);
        let surface_lods =
            &lods[surface.lod_offset as usize..(surface.lod_offset + surface.lod_count) as usize];
        let lod_index = select_lod(
            surface_lods,
            distance,
            view_data.lod_target,
            view_data.lod_enabled != 0,
        );
        let lod = &surface_lods[lod_index];

        if commands.len() >= max_commands {
            overflowed = true;
            break;
        }
        commands.push(IndirectDrawCommand::for_lod(
            object_index as u32,
            lod.first_index,
            lod.index_count,
        ));
    }

    CullOutput { commands, overflowed }
}

#[cfg(test)]
#[path = "cull_tests.rs"]
mod tests;
