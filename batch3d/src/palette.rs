//! Palette lookup textures: 256x1 strips mapping an 8-bit index to a
//! color, one for the world palette and one for the display palette.
//!
//! The color tables are owned elsewhere and polled once per frame; a
//! palette only reaches the GPU again when its 768-byte snapshot actually
//! changed, which the cache decides with a straight byte comparison.

use crate::gpu::Gpu;

/// Colors per palette.
pub const PALETTE_SIZE: usize = 256;
/// Bytes per palette snapshot (RGB triples).
pub const PALETTE_BYTES: usize = PALETTE_SIZE * 3;

/// Dirty tracking for one palette, separate from the GPU side so the
/// upload-skipping behavior is observable in tests.
pub(crate) struct PaletteCache {
    data: [u8; PALETTE_BYTES],
    uploads: usize,
}

impl PaletteCache {
    pub(crate) fn new() -> Self {
        Self {
            // fresh palettes read as white until the first real snapshot
            data: [0xFF; PALETTE_BYTES],
            uploads: 0,
        }
    }

    /// Absorbs a snapshot; returns true when it differed from the cached
    /// copy and therefore needs a GPU upload.
    pub(crate) fn refresh(&mut self, src: &[u8; PALETTE_BYTES]) -> bool {
        if self.data == *src {
            return false;
        }
        self.data = *src;
        self.uploads += 1;
        true
    }

    /// Expands the cached RGB triples to RGBA rows for the GPU.
    pub(crate) fn rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PALETTE_SIZE * 4);
        for rgb in self.data.chunks_exact(3) {
            out.extend_from_slice(rgb);
            out.push(0xFF);
        }
        out
    }

    /// How many snapshots have reached the GPU.
    pub(crate) fn uploads(&self) -> usize {
        self.uploads
    }
}

/// A palette cache bound to its GPU texture.
pub(crate) struct PaletteTexture {
    cache: PaletteCache,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl PaletteTexture {
    pub(crate) fn new(gpu: &Gpu, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let cache = PaletteCache::new();
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: PALETTE_SIZE as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        let palette = Self {
            cache,
            texture,
            bind_group,
        };
        palette.upload(gpu);
        palette
    }

    fn upload(&self, gpu: &Gpu) {
        gpu.queue().write_texture(
            self.texture.as_image_copy(),
            &self.cache.rgba(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(PALETTE_SIZE as u32 * 4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: PALETTE_SIZE as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Re-uploads only when the snapshot changed.
    pub(crate) fn refresh(&mut self, gpu: &Gpu, src: &[u8; PALETTE_BYTES]) {
        if self.cache.refresh(src) {
            self.upload(gpu);
        }
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_snapshot_skips_the_upload() {
        let mut cache = PaletteCache::new();
        let snapshot = [0x20u8; PALETTE_BYTES];
        assert!(cache.refresh(&snapshot));
        assert_eq!(cache.uploads(), 1);
        // second scene with the same bytes: no second upload
        assert!(!cache.refresh(&snapshot));
        assert_eq!(cache.uploads(), 1);
    }

    #[test]
    fn single_byte_change_triggers_an_upload() {
        let mut cache = PaletteCache::new();
        let mut snapshot = [0u8; PALETTE_BYTES];
        assert!(cache.refresh(&snapshot));
        snapshot[100] = 1;
        assert!(cache.refresh(&snapshot));
        assert_eq!(cache.uploads(), 2);
    }

    #[test]
    fn fresh_palette_reads_white_and_expands_to_rgba() {
        let cache = PaletteCache::new();
        let rgba = cache.rgba();
        assert_eq!(rgba.len(), PALETTE_SIZE * 4);
        assert!(rgba.iter().all(|&b| b == 0xFF));

        let mut cache = PaletteCache::new();
        let mut snapshot = [0u8; PALETTE_BYTES];
        snapshot[3] = 10;
        snapshot[4] = 20;
        snapshot[5] = 30;
        cache.refresh(&snapshot);
        let rgba = cache.rgba();
        assert_eq!(&rgba[4..8], &[10, 20, 30, 0xFF]);
    }
}
