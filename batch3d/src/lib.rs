//! A batching bridge from legacy fixed-function render lists to WGPU.
//!
//! batch3d reproduces the frame model of a palette-era 3D engine on a
//! modern GPU: callers append screen-space vertices, flag-stamped
//! triangles, and lines to a fixed-capacity [`RenderList`] every frame,
//! and the renderer consumes the list in one pass, grouping contiguous
//! runs that share a texture and flag word into indexed draw batches.
//! Indexed-color art stays indexed on the GPU — 8-bit surfaces upload as
//! single-channel textures and resolve through a 256x1 palette strip in
//! the fragment shader, so palette swaps cost one tiny texture upload.
//!
//! The usual shape of a frame:
//! 1. [`Renderer::begin_scene`] — lazy one-time GPU setup, clear, palette
//!    refresh (uploads only when the color table actually changed).
//! 2. [`Renderer::add_vertices`] / [`Renderer::add_triangles`] from the
//!    simulation, in painter's order.
//! 3. [`Renderer::draw_render_list`] — batches and draws into the active
//!    offscreen target.
//! 4. [`Renderer::draw_menu`] — optional UI pass sampling the indexed
//!    menu buffer through the display palette.
//! 5. [`Renderer::end_scene`], then [`Renderer::swap_targets`] when a
//!    feedback effect wants last-frame content.
//!
//! Live engine state (window size, filter toggle, palettes) is pulled
//! through the [`RenderHost`] trait once per frame rather than cached.
//! The core renders offscreen and never touches a window; [`Gpu`] can be
//! initialized headless or wrapped around resources the application
//! already owns.

mod batch;
mod error;
mod gpu;
mod menu;
mod palette;
mod programs;
mod renderer;
mod scratch;
mod targets;
mod texcache;
mod world;

pub use batch::{
    plan_batches, Batch, DrawState, PipelineKey, BLEND_MODE_MODULATE, BLEND_MODE_TRANSLUCENT,
    TEX_MODE_DIRECT, TEX_MODE_DIRECT_BILINEAR, TEX_MODE_FLAT, TEX_MODE_INDEXED,
    TEX_MODE_INDEXED_BILINEAR,
};
pub use error::RenderError;
pub use gpu::Gpu;
pub use menu::{MenuBuffer, LOGICAL_HEIGHT, LOGICAL_WIDTH};
pub use palette::{PALETTE_BYTES, PALETTE_SIZE};
pub use programs::{DirShaders, EmbeddedShaders, ShaderLibrary};
pub use renderer::{RenderHost, Renderer};
pub use scratch::{Line, RenderList, Tri, TriFlags, Vertex, MAX_LINES, MAX_TRIS, MAX_VERTICES};
pub use targets::{RenderTarget, COLOR_FORMAT, DEPTH_FORMAT, TARGET_HEIGHT, TARGET_WIDTH};
pub use texcache::{
    valid_dimensions, SourceFormat, Surface, SurfacePixels, MAX_CACHED_SURFACES, MAX_SURFACE_DIM,
};
pub use wgpu;
