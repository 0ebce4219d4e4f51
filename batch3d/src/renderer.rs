//! [`Renderer`] is the main user-facing type of this crate: one explicit
//! value owning every piece of renderer state the legacy backend kept in
//! globals — the scratch list, the texture cache, the palette textures,
//! the offscreen target pair, and the world/menu draw paths.
//!
//! Frame shape: `begin_scene`, append geometry, `draw_render_list` (and
//! optionally `draw_menu`), `end_scene`, then `swap_targets` if a consumer
//! wants last-frame content. All calls must come from one thread in that
//! order; nothing here is `Send` or `Sync`.

use crate::batch::plan_batches;
use crate::error::RenderError;
use crate::gpu::Gpu;
use crate::menu::{build_native, build_stretch, MenuBuffer, MenuRenderer};
use crate::palette::{PaletteTexture, PALETTE_BYTES};
use crate::programs::{BindLayouts, EmbeddedShaders, ShaderLibrary};
use crate::scratch::{Line, RenderList, Tri, Vertex};
use crate::targets::{RenderTarget, TargetPair, TARGET_HEIGHT, TARGET_WIDTH};
use crate::texcache::{Surface, SurfacePixels, TextureCache};
use crate::world::WorldRenderer;

/// Live engine state the core pulls once per frame instead of caching:
/// window size, render toggles, and the current color tables.
pub trait RenderHost {
    /// Physical window size in pixels.
    fn window_size(&self) -> (u32, u32);

    /// The logical resolution world vertices are projected from.
    fn internal_resolution(&self) -> (u32, u32) {
        (TARGET_WIDTH, TARGET_HEIGHT)
    }

    /// Whether textures sample with bilinear filtering this frame.
    fn texture_filtering(&self) -> bool {
        false
    }

    /// Selects the native HUD layout over the stretched menu.
    fn hud_native_layout(&self) -> bool {
        false
    }

    /// False while an orthographic camera is active.
    fn camera_is_perspective(&self) -> bool {
        true
    }

    /// The level-specific palette, absent outside a loaded world.
    fn world_palette(&self) -> Option<&[u8; PALETTE_BYTES]> {
        None
    }

    /// The display palette; always present.
    fn display_palette(&self) -> &[u8; PALETTE_BYTES];
}

/// Everything that only exists after first-scene initialization.
struct SceneResources {
    world: WorldRenderer,
    menu: MenuRenderer,
    world_palette: PaletteTexture,
    display_palette: PaletteTexture,
    targets: TargetPair,
}

/// The renderer instance. See the module docs for the frame shape.
pub struct Renderer {
    gpu: Gpu,
    library: Box<dyn ShaderLibrary>,
    layouts: BindLayouts,
    textures: TextureCache,
    list: RenderList,
    scene: Option<SceneResources>,
}

impl Renderer {
    /// Creates a renderer using the shaders shipped with the crate.
    pub fn new(gpu: Gpu) -> Self {
        Self::with_shader_library(gpu, Box::new(EmbeddedShaders))
    }

    /// Creates a renderer that pulls shader stages from `library`.
    pub fn with_shader_library(gpu: Gpu, library: Box<dyn ShaderLibrary>) -> Self {
        let layouts = BindLayouts::new(gpu.device());
        let textures = TextureCache::new(gpu.device());
        Self {
            gpu,
            library,
            layouts,
            textures,
            list: RenderList::new(),
            scene: None,
        }
    }

    fn init_scene(&self) -> Result<SceneResources, RenderError> {
        log::info!("initializing scene resources");
        Ok(SceneResources {
            world: WorldRenderer::new(&self.gpu, &self.layouts, self.library.as_ref())?,
            menu: MenuRenderer::new(&self.gpu, &self.layouts, self.library.as_ref())?,
            world_palette: PaletteTexture::new(&self.gpu, &self.layouts.texture, "world palette"),
            display_palette: PaletteTexture::new(
                &self.gpu,
                &self.layouts.texture,
                "display palette",
            ),
            targets: TargetPair::new(self.gpu.device(), TARGET_WIDTH, TARGET_HEIGHT),
        })
    }

    /// Opens a frame: performs one-time GPU initialization on the first
    /// call (an error here is fatal — there is no fallback renderer),
    /// clears the active target, resets render state to the scene
    /// defaults, and re-uploads whichever palettes changed.
    pub fn begin_scene(&mut self, host: &impl RenderHost) -> Result<(), RenderError> {
        if self.scene.is_none() {
            self.scene = Some(self.init_scene()?);
        }
        self.list.reset_total();

        let scene = self.scene.as_mut().unwrap();
        let (w, h) = host.window_size();
        scene.targets.resize(self.gpu.device(), w, h);

        let target = scene.targets.active();
        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            ..Default::default()
        });
        self.gpu.queue().submit(Some(encoder.finish()));

        if let Some(palette) = host.world_palette() {
            scene.world_palette.refresh(&self.gpu, palette);
        }
        scene.display_palette.refresh(&self.gpu, host.display_palette());
        Ok(())
    }

    /// Closes a frame: forgets per-batch state and resets the render list.
    pub fn end_scene(&mut self) {
        self.list.reset();
    }

    /// Appends vertices; returns false (leaving the list untouched) when
    /// the submission would overflow the scratch capacity.
    pub fn add_vertices(&mut self, vertices: &[Vertex]) -> bool {
        self.list.add_vertices(vertices)
    }

    /// Appends triangles; an overflowing submission is silently dropped.
    pub fn add_triangles(&mut self, tris: &[Tri]) {
        self.list.add_tris(tris)
    }

    /// Appends lines; an overflowing submission is silently dropped.
    /// Lines accumulate with the list but are not currently drawn.
    pub fn add_lines(&mut self, lines: &[Line]) {
        self.list.add_lines(lines)
    }

    /// Empties the render list without drawing it.
    pub fn reset_render_list(&mut self) {
        self.list.reset();
    }

    /// Triangles consumed since `begin_scene`.
    pub fn triangles_rendered(&self) -> usize {
        self.list.total_tris()
    }

    /// Consumes the render list exactly once: plans batches over the
    /// triangle list and issues one indexed draw per batch into the active
    /// target. An empty list produces zero draw calls.
    pub fn draw_render_list(&mut self, host: &impl RenderHost) {
        let Self {
            scene,
            list,
            gpu,
            textures,
            ..
        } = self;
        let Some(scene) = scene.as_ref() else {
            return;
        };
        if !list.tris().is_empty() {
            let plan = plan_batches(list.tris(), host.texture_filtering());
            scene.world.draw(
                gpu,
                scene.targets.active(),
                list,
                &plan,
                textures,
                &scene.world_palette,
                host.internal_resolution(),
                host.window_size(),
                host.camera_is_perspective(),
            );
        }
        list.reset();
    }

    /// Draws the menu buffer over the scene, reusing the scratch storage
    /// for the quads. Layout mode comes from the host each call.
    pub fn draw_menu(&mut self, host: &impl RenderHost, menu: &MenuBuffer<'_>) {
        let Self {
            scene,
            list,
            gpu,
            layouts,
            ..
        } = self;
        let Some(scene) = scene.as_mut() else {
            return;
        };
        list.reset();
        let window = host.window_size();
        let window_f = (window.0 as f32, window.1 as f32);
        let buffer_f = (menu.width as f32, menu.height as f32);
        if host.hud_native_layout() {
            build_native(list, window_f, buffer_f);
        } else {
            build_stretch(list, window_f, buffer_f);
        }
        scene.menu.draw(
            gpu,
            layouts,
            scene.targets.active(),
            list,
            menu,
            &scene.display_palette,
            window,
        );
    }

    /// Uploads a decoded surface and registers it in the cache. Every call
    /// creates a fresh GPU texture; callers are responsible for not
    /// re-inserting surfaces they already cached. `_no_alpha` is accepted
    /// for signature compatibility with the legacy cache and ignored.
    pub fn add_texture(
        &mut self,
        surface: &Surface,
        pixels: SurfacePixels<'_>,
        is_alpha: bool,
        _no_alpha: bool,
    ) -> Result<(), RenderError> {
        self.textures
            .add(&self.gpu, &self.layouts.texture, surface, pixels, is_alpha)
    }

    /// Deletes every cached texture and clears the surfaces' cached
    /// fields; the next insertion starts over at slot zero.
    pub fn purge_texture_cache(&mut self) {
        self.textures.purge();
    }

    /// Deletes the tracked textures in bulk without touching surface-side
    /// fields (the legacy unload path, which diverges from purge).
    pub fn unload_all_textures(&mut self) {
        self.textures.unload_all();
    }

    /// Alternates the active offscreen target.
    pub fn swap_targets(&mut self) {
        if let Some(scene) = &mut self.scene {
            scene.targets.swap();
        }
    }

    /// The target frames are currently drawn into, once initialized.
    pub fn active_target(&self) -> Option<&RenderTarget> {
        self.scene.as_ref().map(|scene| scene.targets.active())
    }

    /// The other target of the pair, holding last-frame content.
    pub fn previous_target(&self) -> Option<&RenderTarget> {
        self.scene.as_ref().map(|scene| scene.targets.previous())
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }
}
