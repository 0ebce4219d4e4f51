//! GPU execution of the world pass: upload the render list, then walk the
//! batch plan issuing one indexed draw per batch.
//!
//! wgpu bakes depth compare and cull winding into pipelines, so the four
//! combinations a batch can ask for are built up front and selected per
//! batch; the sampling/blend mode pair rides in a small uniform bind group
//! cached per value pair. Depth clears can only happen at a render pass
//! boundary, so the plan is executed as one pass per background segment.

use std::collections::HashMap;

use ultraviolet::{Mat4, Vec4};
use wgpu::util::DeviceExt;

use crate::batch::{
    Batch, PipelineKey, BLEND_MODE_MODULATE, BLEND_MODE_TRANSLUCENT, TEX_MODE_DIRECT,
    TEX_MODE_DIRECT_BILINEAR, TEX_MODE_FLAT, TEX_MODE_INDEXED, TEX_MODE_INDEXED_BILINEAR,
};
use crate::error::RenderError;
use crate::gpu::Gpu;
use crate::palette::PaletteTexture;
use crate::programs::{self, BindLayouts, ShaderLibrary, WORLD_BINDINGS};
use crate::scratch::{RenderList, Vertex, MAX_TRIS, MAX_VERTICES};
use crate::targets::{RenderTarget, COLOR_FORMAT, DEPTH_FORMAT};
use crate::texcache::TextureCache;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Unorm8x4,
        offset: 12,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 16,
        shader_location: 2,
    },
];

pub(crate) fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// The alpha blend the legacy renderer keeps enabled for the whole scene:
/// src-alpha, one-minus-src-alpha, additive combine, on both channels.
pub(crate) const SCENE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// The screen-space projection of the world pass.
///
/// The legacy engine fixes its vertical FOV in the projection, which
/// squishes the view at wide aspect ratios; the y axis is zoomed by the
/// aspect to compensate (and x for portrait windows). The W column flips
/// sign for orthographic cameras.
pub(crate) fn world_projection(
    internal: (u32, u32),
    window: (u32, u32),
    perspective: bool,
) -> Mat4 {
    let iw = internal.0 as f32;
    let ih = internal.1 as f32;
    let w = window.0 as f32;
    let h = window.1 as f32;
    let scale_x = 1.0 / (iw / 2.0);
    let scale_y = 1.0 / (ih / 2.0);
    let mut zoom_y = w / h;
    let mut zoom_x = h / w;
    if h > w {
        zoom_y = 1.0;
    }
    if w > h {
        zoom_x = 1.0;
    }
    Mat4::new(
        Vec4::new(scale_x * zoom_x, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -scale_y * zoom_y, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(
            -(iw / 2.0) * scale_x * zoom_x,
            (ih / 2.0) * scale_y * zoom_y,
            if perspective { -1.0 } else { 1.0 },
            1.0,
        ),
    )
}

pub(crate) struct WorldRenderer {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    mode_groups: HashMap<(i32, i32), wgpu::BindGroup>,
    globals_buf: wgpu::Buffer,
    globals_group: wgpu::BindGroup,
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
}

impl WorldRenderer {
    pub(crate) fn new(
        gpu: &Gpu,
        layouts: &BindLayouts,
        library: &dyn ShaderLibrary,
    ) -> Result<Self, RenderError> {
        let device = gpu.device();
        let program = programs::load_program(device, library, "world", WORLD_BINDINGS)?;

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("world pipeline layout"),
            bind_group_layouts: &[
                &layouts.globals,
                &layouts.mode,
                &layouts.texture,
                &layouts.texture,
            ],
            push_constant_ranges: &[],
        });

        let mut pipelines = HashMap::new();
        for depth_always in [false, true] {
            for cull_back in [false, true] {
                let key = PipelineKey {
                    depth_always,
                    cull_back,
                };
                let pipeline = programs::link_pipeline(
                    device,
                    "world",
                    &wgpu::RenderPipelineDescriptor {
                        label: Some("world pipeline"),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &program.vertex,
                            entry_point: "vs_main",
                            buffers: &[vertex_layout()],
                        },
                        primitive: wgpu::PrimitiveState {
                            topology: wgpu::PrimitiveTopology::TriangleList,
                            front_face: wgpu::FrontFace::Ccw,
                            cull_mode: Some(if cull_back {
                                wgpu::Face::Back
                            } else {
                                // the default culls FRONT faces: the legacy
                                // winding convention is inverted on screen
                                wgpu::Face::Front
                            }),
                            ..Default::default()
                        },
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DEPTH_FORMAT,
                            depth_write_enabled: true,
                            depth_compare: if depth_always {
                                wgpu::CompareFunction::Always
                            } else {
                                wgpu::CompareFunction::Less
                            },
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
                pipelines.insert(key, pipeline);
            }
        }

        let mut mode_groups = HashMap::new();
        for tex_mode in [
            TEX_MODE_FLAT,
            TEX_MODE_INDEXED,
            TEX_MODE_INDEXED_BILINEAR,
            TEX_MODE_DIRECT,
            TEX_MODE_DIRECT_BILINEAR,
        ] {
            for blend_mode in [BLEND_MODE_MODULATE, BLEND_MODE_TRANSLUCENT] {
                // a vec4<i32> on the shader side; zw are padding
                let buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("world mode"),
                    contents: bytemuck::cast_slice(&[tex_mode, blend_mode, 0, 0]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("world mode"),
                    layout: &layouts.mode,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buf.as_entire_binding(),
                    }],
                });
                mode_groups.insert((tex_mode, blend_mode), group);
            }
        }

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("world globals"),
            size: std::mem::size_of::<Mat4>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("world globals"),
            layout: &layouts.globals,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });
        let vertex_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("world vertices"),
            size: (MAX_VERTICES * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("world indices"),
            size: (MAX_TRIS * 3 * std::mem::size_of::<u16>()) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipelines,
            mode_groups,
            globals_buf,
            globals_group,
            vertex_buf,
            index_buf,
        })
    }

    /// Consumes the planned batches: one vertex upload, one index upload,
    /// then an indexed draw per batch, split into render passes wherever a
    /// background batch needs the depth buffer cleared.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw(
        &self,
        gpu: &Gpu,
        target: &RenderTarget,
        list: &RenderList,
        plan: &[Batch],
        textures: &TextureCache,
        palette: &PaletteTexture,
        internal: (u32, u32),
        window: (u32, u32),
        perspective: bool,
    ) {
        if plan.is_empty() || list.vertices().is_empty() {
            return;
        }

        gpu.queue()
            .write_buffer(&self.vertex_buf, 0, bytemuck::cast_slice(list.vertices()));

        let mut indices: Vec<u16> = Vec::with_capacity(list.tris().len() * 3 + 1);
        for tri in list.tris() {
            indices.extend_from_slice(&tri.v);
        }
        if indices.len() % 2 != 0 {
            // uploads are 4-byte aligned; the pad index is never drawn
            indices.push(0);
        }
        gpu.queue()
            .write_buffer(&self.index_buf, 0, bytemuck::cast_slice(&indices));

        let projection = world_projection(internal, window, perspective);
        gpu.queue()
            .write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&projection));

        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("world pass"),
            });
        let (tw, th) = target.size();

        let mut start = 0;
        while start < plan.len() {
            let clear_depth = plan[start].state.clear_depth;
            let mut end = start + 1;
            while end < plan.len() && !plan[end].state.clear_depth {
                end += 1;
            }

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("world batches"),
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
                        load: if clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            });
            rpass.set_viewport(0.0, 0.0, tw as f32, th as f32, 0.0, 1.0);
            rpass.set_vertex_buffer(0, self.vertex_buf.slice(..));
            rpass.set_index_buffer(self.index_buf.slice(..), wgpu::IndexFormat::Uint16);
            rpass.set_bind_group(0, &self.globals_group, &[]);

            for batch in &plan[start..end] {
                if batch.is_empty() {
                    continue;
                }
                let pipeline = &self.pipelines[&batch.state.pipeline];
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(
                    1,
                    &self.mode_groups[&(batch.state.tex_mode, batch.state.blend_mode)],
                    &[],
                );
                let surface_group = batch
                    .texture
                    .as_ref()
                    .filter(|s| s.texture_id() != 0)
                    .and_then(|s| textures.entry(s.texture_id()))
                    .map(|entry| entry.bind_group(batch.state.linear_filter))
                    // flat batches sample nothing, but the slot stays
                    // bound; the palette strip stands in
                    .unwrap_or_else(|| palette.bind_group());
                rpass.set_bind_group(2, surface_group, &[]);
                rpass.set_bind_group(3, palette.bind_group(), &[]);
                rpass.draw_indexed(
                    (batch.start as u32 * 3)..(batch.end as u32 * 3),
                    0,
                    0..1,
                );
            }
            drop(rpass);
            start = end;
        }

        gpu.queue().submit(Some(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(m: Mat4) -> [[f32; 4]; 4] {
        let flat: [f32; 16] = bytemuck::cast(m);
        [
            [flat[0], flat[1], flat[2], flat[3]],
            [flat[4], flat[5], flat[6], flat[7]],
            [flat[8], flat[9], flat[10], flat[11]],
            [flat[12], flat[13], flat[14], flat[15]],
        ]
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn square_window_maps_logical_corners_to_clip_corners() {
        let m = columns(world_projection((640, 480), (480, 480), true));
        assert_eq!(m[0][0], 2.0 / 640.0);
        assert_eq!(m[1][1], -(2.0 / 480.0));
        assert_eq!(m[2], [0.0, 0.0, 1.0, 0.0]);
        assert!(close(m[3][0], -1.0));
        assert!(close(m[3][1], 1.0));
        assert_eq!(m[3][2], -1.0);
        assert_eq!(m[3][3], 1.0);
    }

    #[test]
    fn wide_window_zooms_the_y_axis() {
        let m = columns(world_projection((640, 480), (1920, 1080), true));
        let zoom = 1920.0f32 / 1080.0;
        assert_eq!(m[0][0], 2.0 / 640.0);
        assert!(close(m[1][1], -(2.0 / 480.0) * zoom));
        assert!(close(m[3][0], -1.0));
        assert!(close(m[3][1], zoom));
    }

    #[test]
    fn tall_window_zooms_the_x_axis() {
        let m = columns(world_projection((640, 480), (480, 960), true));
        let zoom = 480.0f32 / 960.0;
        assert!(close(m[0][0], (2.0 / 640.0) * zoom));
        assert_eq!(m[1][1], -(2.0 / 480.0));
        assert!(close(m[3][0], -zoom));
        assert!(close(m[3][1], 1.0));
    }

    #[test]
    fn orthographic_cameras_flip_the_w_column() {
        let m = columns(world_projection((640, 480), (640, 480), false));
        assert_eq!(m[3][2], 1.0);
        let m = columns(world_projection((640, 480), (640, 480), true));
        assert_eq!(m[3][2], -1.0);
    }
}
