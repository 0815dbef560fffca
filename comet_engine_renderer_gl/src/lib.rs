/*!
# Comet Engine - legacy OpenGL backend

Immediate-mode fallback renderer: one shader program, a bound index buffer
and an SSBO holding the vertices. Culling and LOD selection run on the CPU
with the exact math the Vulkan backend's compute kernels use, and every
visible object becomes one `glDrawElementsBaseVertex` call.

The host owns the GL context and buffer swap; this backend only records GL
calls on the thread the context is current on.
*/

mod gl_renderer;

pub use gl_renderer::GlRenderer;
