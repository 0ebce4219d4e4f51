//! Offscreen render targets and the ping-pong pair.
//!
//! Two complete targets (color plus combined depth/stencil) exist so
//! callers needing last-frame content can alternate between them; this
//! module owns only the swap mechanics. Targets start at the legacy
//! logical resolution and are recreated at the physical window size when
//! it changes.

use crate::error::RenderError;

/// The legacy logical resolution targets start at.
pub const TARGET_WIDTH: u32 = 640;
pub const TARGET_HEIGHT: u32 = 480;

/// Color format of the offscreen targets.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Combined depth/stencil format, matching the legacy renderbuffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// One complete offscreen target.
pub struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub(crate) fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        // a zero-sized target cannot be attached; log and clamp rather
        // than escalate, matching the legacy incomplete-framebuffer path
        if width == 0 || height == 0 {
            log::error!("{}", RenderError::TargetIncomplete { width, height });
        }
        let width = width.max(1);
        let height = height.max(1);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("target color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[COLOR_FORMAT],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("target depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[DEPTH_FORMAT],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            color,
            color_view,
            depth_view,
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The color texture, for readback or feedback effects owned elsewhere.
    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color
    }

    pub(crate) fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub(crate) fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}

/// The double-buffered pair with one active target.
pub(crate) struct TargetPair {
    targets: [RenderTarget; 2],
    active: usize,
}

impl TargetPair {
    pub(crate) fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self {
            targets: [
                RenderTarget::create(device, width, height),
                RenderTarget::create(device, width, height),
            ],
            active: 0,
        }
    }

    /// Alternates the active target; the other one keeps last-frame
    /// content for feedback effects.
    pub(crate) fn swap(&mut self) {
        self.active ^= 1;
    }

    pub(crate) fn active(&self) -> &RenderTarget {
        &self.targets[self.active]
    }

    pub(crate) fn previous(&self) -> &RenderTarget {
        &self.targets[self.active ^ 1]
    }

    /// Recreates both targets when the window size changed.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.targets[0].size() == (width.max(1), height.max(1)) {
            return;
        }
        self.targets = [
            RenderTarget::create(device, width, height),
            RenderTarget::create(device, width, height),
        ];
    }
}
