//! The menu/UI compositor: draws the indexed menu buffer through the
//! display palette, either stretched to a letterboxed 4:3 view or as a set
//! of fixed HUD subrects that stay pixel-crisp at any window size.
//!
//! Quads accumulate in the shared scratch storage and go out in a single
//! indexed draw. The whole menu buffer is re-uploaded every call; menus
//! redraw rarely enough that dirty tracking never paid for itself.

use ultraviolet::{Mat4, Vec4};

use crate::error::RenderError;
use crate::gpu::Gpu;
use crate::palette::PaletteTexture;
use crate::programs::{self, BindLayouts, ShaderLibrary, MENU_BINDINGS};
use crate::scratch::{RenderList, Tri, TriFlags, Vertex};
use crate::targets::{RenderTarget, COLOR_FORMAT, DEPTH_FORMAT};
use crate::world::{vertex_layout, SCENE_BLEND};

/// The logical resolution all legacy UI layout constants are authored in.
pub const LOGICAL_WIDTH: f32 = 640.0;
pub const LOGICAL_HEIGHT: f32 = 480.0;

// Native HUD layout, in logical menu-buffer pixels. These values are tied
// to the legacy UI atlas; they are not derivable and must not change.
/// Height of the text band above and the HUD band below the 3D view.
const VIEW_BAND: f32 = 128.0;
/// Side length of the left/right HUD corner boxes.
const CORNER: f32 = 64.0;
/// Width of the centered item bar and text band.
const BAR_WIDTH: f32 = 256.0;
/// Height of the item bar.
const BAR_HEIGHT: f32 = 64.0;

const MENU_MAX_VERTICES: usize = 32;
const MENU_MAX_TRIS: usize = 16;

/// The indexed menu buffer image, owned by the caller and sampled through
/// the display palette.
#[derive(Clone, Copy, Debug)]
pub struct MenuBuffer<'a> {
    pub width: u32,
    pub height: u32,
    /// One palette index per pixel, row-major.
    pub pixels: &'a [u8],
}

/// Appends one screen-space quad (two triangles, flat white color) to the
/// scratch list.
fn push_quad(list: &mut RenderList, origin: [f32; 2], size: [f32; 2], uv0: [f32; 2], uv1: [f32; 2]) {
    let base = list.vertices().len() as u16;
    let white = 0xFFFF_FFFF;
    let quad = [
        Vertex::new([origin[0], origin[1], 0.0], white, [uv0[0], uv0[1]]),
        Vertex::new([origin[0], origin[1] + size[1], 0.0], white, [uv0[0], uv1[1]]),
        Vertex::new(
            [origin[0] + size[0], origin[1] + size[1], 0.0],
            white,
            [uv1[0], uv1[1]],
        ),
        Vertex::new([origin[0] + size[0], origin[1], 0.0], white, [uv1[0], uv0[1]]),
    ];
    if !list.add_vertices(&quad) {
        return;
    }
    list.add_tris(&[
        Tri::new([base + 1, base, base + 2], None, TriFlags::empty()),
        Tri::new([base, base + 3, base + 2], None, TriFlags::empty()),
    ]);
}

/// Copies a menu-buffer subrect to the window. A zero scale stretches the
/// destination in proportion to the buffer-to-window ratio instead.
pub(crate) fn push_menu_subrect(
    list: &mut RenderList,
    buffer: (f32, f32),
    window: (f32, f32),
    src: [f32; 4],
    dst: [f32; 2],
    scale: f32,
) {
    let (tex_w, tex_h) = buffer;
    let [x, y, w, h] = src;
    let [mut dst_x, mut dst_y] = dst;
    let mut w_dst = w;
    let mut h_dst = h;
    let mut scale = scale;
    if scale == 0.0 {
        w_dst = (w / tex_w) * window.0;
        h_dst = (h / tex_h) * window.1;
        dst_x = (dst_x / tex_w) * window.0;
        dst_y = (dst_y / tex_h) * window.1;
        scale = 1.0;
    }
    let u1 = x / tex_w;
    let u2 = (x + w) / tex_w;
    let v1 = y / tex_h;
    let v2 = (y + h) / tex_h;
    push_quad(
        list,
        [dst_x, dst_y],
        [scale * w_dst, scale * h_dst],
        [u1, v1],
        [u2, v2],
    );
}

/// Stretch-mode extents: the letterboxed 4:3 destination strip and the UV
/// scale that maps the logical 640x480 view onto the menu buffer.
pub(crate) fn stretch_extents(window: (f32, f32), buffer: (f32, f32)) -> (f32, f32, f32, f32) {
    let menu_u = LOGICAL_WIDTH / buffer.0;
    let menu_v = LOGICAL_HEIGHT / buffer.1;
    let four_thirds = LOGICAL_WIDTH / LOGICAL_HEIGHT;
    let menu_x = (window.0 - (window.1 * four_thirds)) / 2.0;
    let menu_w = window.1 * four_thirds;
    (menu_x, menu_w, menu_u, menu_v)
}

/// One full-view quad, horizontally letterboxed to keep 4:3.
pub(crate) fn build_stretch(list: &mut RenderList, window: (f32, f32), buffer: (f32, f32)) {
    let (menu_x, menu_w, menu_u, menu_v) = stretch_extents(window, buffer);
    push_quad(
        list,
        [menu_x, 0.0],
        [menu_w, window.1],
        [0.0, 0.0],
        [menu_u, menu_v],
    );
}

/// The native HUD layout: the 3D view fills the space between the bands
/// while the six HUD pieces stay at integer multiples of their authored
/// size, scaled uniformly by window height.
pub(crate) fn build_native(list: &mut RenderList, window: (f32, f32), buffer: (f32, f32)) {
    let (bw, bh) = buffer;
    let (ww, wh) = window;
    let scale = wh / LOGICAL_HEIGHT;

    // main 3D view, minus the top and bottom bands
    push_menu_subrect(
        list,
        buffer,
        window,
        [0.0, VIEW_BAND, bw, bh - 2.0 * VIEW_BAND],
        [0.0, VIEW_BAND],
        0.0,
    );
    // left and right HUD corners
    push_menu_subrect(
        list,
        buffer,
        window,
        [0.0, bh - CORNER, CORNER, CORNER],
        [0.0, wh - CORNER * scale],
        scale,
    );
    push_menu_subrect(
        list,
        buffer,
        window,
        [bw - CORNER, bh - CORNER, CORNER, CORNER],
        [ww - CORNER * scale, wh - CORNER * scale],
        scale,
    );
    // item bar
    push_menu_subrect(
        list,
        buffer,
        window,
        [bw / 2.0 - BAR_WIDTH / 2.0, bh - BAR_HEIGHT, BAR_WIDTH, BAR_HEIGHT],
        [ww / 2.0 - (BAR_WIDTH / 2.0) * scale, wh - BAR_HEIGHT * scale],
        scale,
    );
    // text band
    push_menu_subrect(
        list,
        buffer,
        window,
        [bw / 2.0 - BAR_WIDTH / 2.0, 0.0, BAR_WIDTH, VIEW_BAND],
        [ww / 2.0 - (BAR_WIDTH / 2.0) * scale, 0.0],
        scale,
    );
    // active powers/items strip
    push_menu_subrect(
        list,
        buffer,
        window,
        [bw - CORNER, 0.0, CORNER, VIEW_BAND],
        [ww - CORNER * scale, 0.0],
        scale,
    );
}

/// Maps logical pixel coordinates straight to clip space with a top-left
/// origin. The coefficients are load-bearing for sub-pixel alignment and
/// must stay exactly as written.
pub(crate) fn menu_projection(w: f32, h: f32) -> Mat4 {
    Mat4::new(
        Vec4::new(2.0 / w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0 / h, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(-1.0, 1.0, -1.0, 1.0),
    )
}

struct MenuTexture {
    texture: wgpu::Texture,
    group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

pub(crate) struct MenuRenderer {
    pipeline: wgpu::RenderPipeline,
    globals_buf: wgpu::Buffer,
    globals_group: wgpu::BindGroup,
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
    sampler: wgpu::Sampler,
    buffer_tex: Option<MenuTexture>,
}

impl MenuRenderer {
    pub(crate) fn new(
        gpu: &Gpu,
        layouts: &BindLayouts,
        library: &dyn ShaderLibrary,
    ) -> Result<Self, RenderError> {
        let device = gpu.device();
        let program = programs::load_program(device, library, "menu", MENU_BINDINGS)?;

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("menu pipeline layout"),
            bind_group_layouts: &[&layouts.globals, &layouts.texture, &layouts.texture],
            push_constant_ranges: &[],
        });
        let pipeline = programs::link_pipeline(
            device,
            "menu",
            &wgpu::RenderPipelineDescriptor {
                label: Some("menu pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: "vs_main",
                    buffers: &[vertex_layout()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Front),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    // the menu always paints over the scene
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(SCENE_BLEND),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            },
        )?;

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("menu globals"),
            size: std::mem::size_of::<Mat4>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("menu globals"),
            layout: &layouts.globals,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });
        let vertex_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("menu vertices"),
            size: (MENU_MAX_VERTICES * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("menu indices"),
            size: (MENU_MAX_TRIS * 3 * std::mem::size_of::<u16>()) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("menu sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            pipeline,
            globals_buf,
            globals_group,
            vertex_buf,
            index_buf,
            sampler,
            buffer_tex: None,
        })
    }

    fn ensure_buffer_texture(&mut self, gpu: &Gpu, layouts: &BindLayouts, width: u32, height: u32) {
        if let Some(tex) = &self.buffer_tex {
            if tex.width == width && tex.height == height {
                return;
            }
        }
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("menu buffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let group = gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("menu buffer"),
            layout: &layouts.texture,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.buffer_tex = Some(MenuTexture {
            texture,
            group,
            width,
            height,
        });
    }

    /// Draws the quads accumulated in the scratch list, re-uploading the
    /// full menu buffer first.
    pub(crate) fn draw(
        &mut self,
        gpu: &Gpu,
        layouts: &BindLayouts,
        target: &RenderTarget,
        list: &RenderList,
        menu: &MenuBuffer<'_>,
        display_palette: &PaletteTexture,
        window: (u32, u32),
    ) {
        if list.tris().is_empty() || menu.width == 0 || menu.height == 0 {
            return;
        }

        self.ensure_buffer_texture(gpu, layouts, menu.width, menu.height);
        let tex = self.buffer_tex.as_ref().unwrap();
        gpu.queue().write_texture(
            tex.texture.as_image_copy(),
            menu.pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(menu.width),
                rows_per_image: Some(menu.height),
            },
            wgpu::Extent3d {
                width: menu.width,
                height: menu.height,
                depth_or_array_layers: 1,
            },
        );

        gpu.queue()
            .write_buffer(&self.vertex_buf, 0, bytemuck::cast_slice(list.vertices()));
        let mut indices: Vec<u16> = Vec::with_capacity(list.tris().len() * 3 + 1);
        for tri in list.tris() {
            indices.extend_from_slice(&tri.v);
        }
        if indices.len() % 2 != 0 {
            indices.push(0);
        }
        let index_count = list.tris().len() as u32 * 3;
        gpu.queue()
            .write_buffer(&self.index_buf, 0, bytemuck::cast_slice(&indices));

        let projection = menu_projection(window.0 as f32, window.1 as f32);
        gpu.queue()
            .write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&projection));

        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("menu pass"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("menu quads"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: target.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            });
            let (tw, th) = target.size();
            rpass.set_viewport(0.0, 0.0, tw as f32, th as f32, 0.0, 1.0);
            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.globals_group, &[]);
            rpass.set_bind_group(1, &tex.group, &[]);
            rpass.set_bind_group(2, display_palette.bind_group(), &[]);
            rpass.set_vertex_buffer(0, self.vertex_buf.slice(..));
            rpass.set_index_buffer(self.index_buf.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..index_count, 0, 0..1);
        }
        gpu.queue().submit(Some(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_uv_scale_is_logical_over_buffer() {
        let (_, _, u, v) = stretch_extents((1024.0, 768.0), (800.0, 600.0));
        assert_eq!(u, 0.8);
        assert_eq!(v, 0.8);
    }

    #[test]
    fn stretch_letterboxes_to_four_thirds() {
        let (x, w, _, _) = stretch_extents((1920.0, 1080.0), (640.0, 480.0));
        assert_eq!(w, 1080.0 * (4.0 / 3.0));
        assert_eq!(x, (1920.0 - w) / 2.0);
        // an exactly 4:3 window needs no letterbox
        let (x, w, _, _) = stretch_extents((640.0, 480.0), (640.0, 480.0));
        assert_eq!(x, 0.0);
        assert_eq!(w, 640.0);
    }

    #[test]
    fn stretch_builds_one_full_height_quad() {
        let mut list = RenderList::new();
        build_stretch(&mut list, (800.0, 600.0), (640.0, 480.0));
        assert_eq!(list.vertices().len(), 4);
        assert_eq!(list.tris().len(), 2);
        let vs = list.vertices();
        assert_eq!(vs[0].pos[1], 0.0);
        assert_eq!(vs[1].pos[1], 600.0);
        assert_eq!(vs[2].uv, [1.0, 1.0]);
        assert_eq!(vs[0].color, 0xFFFF_FFFF);
        assert_eq!(list.tris()[0].v, [1, 0, 2]);
        assert_eq!(list.tris()[1].v, [0, 3, 2]);
    }

    #[test]
    fn native_layout_builds_six_quads() {
        let mut list = RenderList::new();
        build_native(&mut list, (1280.0, 960.0), (640.0, 480.0));
        assert_eq!(list.vertices().len(), 24);
        assert_eq!(list.tris().len(), 12);
    }

    #[test]
    fn native_hud_scale_tracks_window_height() {
        let mut list = RenderList::new();
        // double-height window: HUD pieces scale by exactly 2
        build_native(&mut list, (1280.0, 960.0), (640.0, 480.0));
        let vs = list.vertices();
        // quad 1 is the left HUD corner: 64x64 at scale 2
        let corner = &vs[4..8];
        assert_eq!(corner[0].pos[..2], [0.0, 960.0 - 128.0]);
        assert_eq!(corner[2].pos[..2], [128.0, 960.0]);
        // its source rect samples the bottom-left 64x64 of the buffer
        assert_eq!(corner[0].uv, [0.0, (480.0 - 64.0) / 480.0]);
        assert_eq!(corner[2].uv, [64.0 / 640.0, 1.0]);
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn native_main_view_skips_the_bands() {
        let mut list = RenderList::new();
        build_native(&mut list, (640.0, 480.0), (640.0, 480.0));
        let vs = list.vertices();
        // at a logical-size window the view band lands at y=128 unscaled
        assert_eq!(vs[0].pos[0], 0.0);
        assert!(close(vs[0].pos[1], 128.0));
        assert!(close(vs[2].pos[0], 640.0));
        assert!(close(vs[2].pos[1], 480.0 - 128.0));
        assert_eq!(vs[0].uv, [0.0, 128.0 / 480.0]);
        assert_eq!(vs[2].uv, [1.0, (480.0 - 128.0) / 480.0]);
    }

    #[test]
    fn zero_scale_subrect_stretches_with_the_window() {
        let mut list = RenderList::new();
        // 2x window: a scale-0 subrect doubles both destination and origin
        push_menu_subrect(
            &mut list,
            (640.0, 480.0),
            (1280.0, 960.0),
            [0.0, 128.0, 640.0, 224.0],
            [0.0, 128.0],
            0.0,
        );
        let vs = list.vertices();
        assert_eq!(vs[0].pos[0], 0.0);
        assert!(close(vs[0].pos[1], 256.0));
        assert!(close(vs[2].pos[0], 1280.0));
        assert!(close(vs[2].pos[1], 256.0 + 448.0));
    }

    #[test]
    fn menu_projection_is_bit_exact() {
        let flat: [f32; 16] = bytemuck::cast(menu_projection(800.0, 600.0));
        let expected: [f32; 16] = [
            2.0 / 800.0,
            0.0,
            0.0,
            0.0,
            0.0,
            -2.0 / 600.0,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
            0.0,
            -1.0,
            1.0,
            -1.0,
            1.0,
        ];
        assert_eq!(flat, expected);
    }
}
