//! The texture cache: uploads decoded surface pixels as GPU textures and
//! tracks a load/unload lifecycle per surface in a fixed 1024-slot table.
//!
//! A surface is a caller-owned handle; once cached it carries the GPU
//! texture id and a 16-bit tag maintained by the renderer. There is no
//! content dedup: inserting the same surface twice occupies two slots and
//! strands the older texture until the next purge, which is the caller's
//! responsibility to avoid.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RenderError;
use crate::gpu::Gpu;

/// Upper bound on live cached surfaces.
pub const MAX_CACHED_SURFACES: usize = 1024;
/// Largest texture dimension the legacy pipeline accepts.
pub const MAX_SURFACE_DIM: u32 = 256;

#[derive(Debug, Default)]
struct SurfaceState {
    texture_id: u32,
    texture_loaded: bool,
    is_16bit: bool,
}

/// A caller-owned surface descriptor. Clones share one identity; batching
/// compares surfaces by identity, never by content.
///
/// Not `Send`/`Sync` by design: the render core is single-threaded.
#[derive(Clone, Debug, Default)]
pub struct Surface {
    state: Rc<RefCell<SurfaceState>>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The GPU texture id once cached; zero means not loaded.
    pub fn texture_id(&self) -> u32 {
        self.state.borrow().texture_id
    }

    pub fn texture_loaded(&self) -> bool {
        self.state.borrow().texture_loaded
    }

    /// Whether the cached pixels came from a 16-bit direct-color source.
    pub fn is_16bit(&self) -> bool {
        self.state.borrow().is_16bit
    }

    /// Identity comparison; two handles are the same surface iff they share
    /// state.
    pub fn same(a: &Surface, b: &Surface) -> bool {
        Rc::ptr_eq(&a.state, &b.state)
    }

    pub(crate) fn set_loaded(&self, texture_id: u32, is_16bit: bool) {
        let mut state = self.state.borrow_mut();
        state.texture_id = texture_id;
        state.texture_loaded = true;
        state.is_16bit = is_16bit;
    }

    pub(crate) fn clear_loaded(&self) {
        let mut state = self.state.borrow_mut();
        state.texture_id = 0;
        state.texture_loaded = false;
    }
}

/// Source pixel format of a decoded surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// One byte per pixel, an index into the world palette.
    Indexed8,
    /// Two bytes per pixel, direct color (RGB565, or RGBA5551 when the
    /// caller requests alpha).
    Direct16,
}

/// Borrowed decoded pixels handed to the cache at insertion time.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePixels<'a> {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
    pub data: &'a [u8],
}

/// Clamps requested texture dimensions to what the pipeline accepts.
pub fn valid_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.min(MAX_SURFACE_DIM), height.min(MAX_SURFACE_DIM))
}

/// Expands RGB565 (red in the low bits) to RGBA8.
pub(crate) fn expand_rgb565(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for px in data.chunks_exact(2) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = (v & 0x1F) as u8;
        let g = ((v >> 5) & 0x3F) as u8;
        let b = ((v >> 11) & 0x1F) as u8;
        out.push((r << 3) | (r >> 2));
        out.push((g << 2) | (g >> 4));
        out.push((b << 3) | (b >> 2));
        out.push(0xFF);
    }
    out
}

/// Expands RGBA5551 (red in the low bits, alpha in the top bit) to RGBA8.
pub(crate) fn expand_rgba5551(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for px in data.chunks_exact(2) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = (v & 0x1F) as u8;
        let g = ((v >> 5) & 0x1F) as u8;
        let b = ((v >> 10) & 0x1F) as u8;
        out.push((r << 3) | (r >> 2));
        out.push((g << 3) | (g >> 2));
        out.push((b << 3) | (b >> 2));
        out.push(if v & 0x8000 != 0 { 0xFF } else { 0x00 });
    }
    out
}

/// Slot bookkeeping, separated from the GPU side so lifecycle semantics are
/// testable without a device.
pub(crate) struct SurfaceTable {
    slots: Vec<Option<(Surface, u32)>>,
    len: usize,
    next_id: u32,
}

impl SurfaceTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![None; MAX_CACHED_SURFACES],
            len: 0,
            next_id: 1,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&(Surface, u32)> {
        self.slots[index].as_ref()
    }

    /// Registers a surface in the next free slot, marking it loaded.
    pub(crate) fn insert(
        &mut self,
        surface: &Surface,
        is_16bit: bool,
    ) -> Result<u32, RenderError> {
        if self.len >= MAX_CACHED_SURFACES {
            return Err(RenderError::CapacityExceeded {
                what: "texture cache",
                capacity: MAX_CACHED_SURFACES,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.slots[self.len] = Some((surface.clone(), id));
        self.len += 1;
        surface.set_loaded(id, is_16bit);
        Ok(id)
    }

    /// Empties every slot, clearing each registered surface's cached
    /// fields. Returns the GPU ids to delete.
    pub(crate) fn purge(&mut self) -> Vec<u32> {
        let mut dead = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some((surface, id)) = slot.take() {
                surface.clear_loaded();
                if id != 0 {
                    dead.push(id);
                }
            }
        }
        self.len = 0;
        dead
    }

    /// Forgets the tracked textures in bulk WITHOUT touching surface-side
    /// fields; surfaces keep claiming their (now dead) texture ids. This
    /// mirrors the legacy unload path, which diverges from purge.
    pub(crate) fn unload_all(&mut self) -> Vec<u32> {
        let dead = self.slots[..self.len]
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(_, id)| *id))
            .collect();
        self.len = 0;
        dead
    }
}

pub(crate) struct TexEntry {
    nearest: wgpu::BindGroup,
    linear: wgpu::BindGroup,
}

impl TexEntry {
    pub(crate) fn bind_group(&self, linear: bool) -> &wgpu::BindGroup {
        if linear {
            &self.linear
        } else {
            &self.nearest
        }
    }
}

/// The cache proper: slot table plus the GPU textures keyed by id.
pub(crate) struct TextureCache {
    table: SurfaceTable,
    entries: HashMap<u32, TexEntry>,
    sampler_nearest: wgpu::Sampler,
    sampler_linear: wgpu::Sampler,
}

fn surface_sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("surface sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

impl TextureCache {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        Self {
            table: SurfaceTable::new(),
            entries: HashMap::new(),
            sampler_nearest: surface_sampler(device, wgpu::FilterMode::Nearest),
            sampler_linear: surface_sampler(device, wgpu::FilterMode::Linear),
        }
    }

    /// Uploads a surface's pixels and registers it. Each call creates a
    /// fresh GPU texture, exactly like the legacy cache.
    pub(crate) fn add(
        &mut self,
        gpu: &Gpu,
        layout: &wgpu::BindGroupLayout,
        surface: &Surface,
        pixels: SurfacePixels<'_>,
        is_alpha: bool,
    ) -> Result<(), RenderError> {
        if self.table.len() >= MAX_CACHED_SURFACES {
            return Err(RenderError::CapacityExceeded {
                what: "texture cache",
                capacity: MAX_CACHED_SURFACES,
            });
        }

        let (format, converted, is_16bit): (wgpu::TextureFormat, Vec<u8>, bool) =
            match pixels.format {
                SourceFormat::Direct16 => {
                    let rgba = if is_alpha {
                        expand_rgba5551(pixels.data)
                    } else {
                        expand_rgb565(pixels.data)
                    };
                    (wgpu::TextureFormat::Rgba8Unorm, rgba, true)
                }
                SourceFormat::Indexed8 => (
                    wgpu::TextureFormat::R8Unorm,
                    pixels.data.to_vec(),
                    false,
                ),
            };
        let bytes_per_pixel = converted.len() as u32 / (pixels.width * pixels.height).max(1);

        gpu.device()
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("cached surface"),
            size: wgpu::Extent3d {
                width: pixels.width,
                height: pixels.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue().write_texture(
            texture.as_image_copy(),
            &converted,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * pixels.width),
                rows_per_image: Some(pixels.height),
            },
            wgpu::Extent3d {
                width: pixels.width,
                height: pixels.height,
                depth_or_array_layers: 1,
            },
        );
        if let Some(err) = pollster::block_on(gpu.device().pop_error_scope()) {
            return Err(RenderError::TextureUpload {
                width: pixels.width,
                height: pixels.height,
                detail: err.to_string(),
            });
        }

        let id = self.table.insert(surface, is_16bit)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind = |sampler: &wgpu::Sampler| {
            gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cached surface"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        };
        self.entries.insert(
            id,
            TexEntry {
                nearest: bind(&self.sampler_nearest),
                linear: bind(&self.sampler_linear),
            },
        );
        Ok(())
    }

    pub(crate) fn entry(&self, id: u32) -> Option<&TexEntry> {
        self.entries.get(&id)
    }

    /// Drops every cached texture and clears the surfaces' cached fields.
    pub(crate) fn purge(&mut self) {
        for id in self.table.purge() {
            self.entries.remove(&id);
        }
    }

    /// Drops the tracked textures in bulk, leaving surface-side fields
    /// stale (the preserved legacy divergence from purge).
    pub(crate) fn unload_all(&mut self) {
        for id in self.table.unload_all() {
            self.entries.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_marks_surface_loaded_with_nonzero_id() {
        let mut table = SurfaceTable::new();
        let surface = Surface::new();
        assert!(!surface.texture_loaded());
        let id = table.insert(&surface, false).unwrap();
        assert_ne!(id, 0);
        assert!(surface.texture_loaded());
        assert_eq!(surface.texture_id(), id);
        assert!(!surface.is_16bit());
    }

    #[test]
    fn purge_clears_surface_fields_and_reuses_slot_zero() {
        let mut table = SurfaceTable::new();
        let first = Surface::new();
        let second = Surface::new();
        table.insert(&first, true).unwrap();
        table.insert(&second, false).unwrap();

        let dead = table.purge();
        assert_eq!(dead.len(), 2);
        assert_eq!(table.len(), 0);
        assert!(!first.texture_loaded());
        assert_eq!(first.texture_id(), 0);
        assert!(!second.texture_loaded());

        let again = Surface::new();
        let id = table.insert(&again, false).unwrap();
        assert_ne!(id, 0);
        let (stored, stored_id) = table.slot(0).unwrap();
        assert!(Surface::same(stored, &again));
        assert_eq!(*stored_id, id);
    }

    #[test]
    fn unload_all_leaves_surface_fields_stale() {
        let mut table = SurfaceTable::new();
        let surface = Surface::new();
        let id = table.insert(&surface, false).unwrap();

        let dead = table.unload_all();
        assert_eq!(dead, vec![id]);
        assert_eq!(table.len(), 0);
        // divergence from purge: the surface still claims its texture
        assert!(surface.texture_loaded());
        assert_eq!(surface.texture_id(), id);
    }

    #[test]
    fn duplicate_insertion_occupies_two_slots() {
        let mut table = SurfaceTable::new();
        let surface = Surface::new();
        let first = table.insert(&surface, false).unwrap();
        let second = table.insert(&surface, false).unwrap();
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
        // the handle tracks only the newest texture; the older one is
        // stranded until purge
        assert_eq!(surface.texture_id(), second);
    }

    #[test]
    fn table_rejects_the_1025th_surface() {
        let mut table = SurfaceTable::new();
        for _ in 0..MAX_CACHED_SURFACES {
            table.insert(&Surface::new(), false).unwrap();
        }
        let overflow = Surface::new();
        match table.insert(&overflow, false) {
            Err(RenderError::CapacityExceeded { capacity, .. }) => {
                assert_eq!(capacity, MAX_CACHED_SURFACES);
            }
            other => panic!("expected capacity error, got {:?}", other.map(|_| ())),
        }
        assert!(!overflow.texture_loaded());
    }

    #[test]
    fn rgb565_expands_with_low_red() {
        // red = 0x1F, green = 0, blue = 0 -> low five bits set
        let red = 0x001Fu16.to_le_bytes();
        assert_eq!(expand_rgb565(&red), vec![0xFF, 0x00, 0x00, 0xFF]);
        let green = 0x07E0u16.to_le_bytes();
        assert_eq!(expand_rgb565(&green), vec![0x00, 0xFF, 0x00, 0xFF]);
        let blue = 0xF800u16.to_le_bytes();
        assert_eq!(expand_rgb565(&blue), vec![0x00, 0x00, 0xFF, 0xFF]);
        // mid gray keeps its top bits in the expansion
        let gray = 0x8410u16.to_le_bytes();
        assert_eq!(expand_rgb565(&gray), vec![0x84, 0x82, 0x84, 0xFF]);
    }

    #[test]
    fn rgba5551_expands_alpha_bit() {
        let opaque_white = 0xFFFFu16.to_le_bytes();
        assert_eq!(expand_rgba5551(&opaque_white), vec![0xFF, 0xFF, 0xFF, 0xFF]);
        let clear_white = 0x7FFFu16.to_le_bytes();
        assert_eq!(expand_rgba5551(&clear_white), vec![0xFF, 0xFF, 0xFF, 0x00]);
        let opaque_red = 0x801Fu16.to_le_bytes();
        assert_eq!(expand_rgba5551(&opaque_red), vec![0xFF, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn dimensions_clamp_to_the_legacy_maximum() {
        assert_eq!(valid_dimensions(64, 300), (64, 256));
        assert_eq!(valid_dimensions(1024, 1024), (256, 256));
        assert_eq!(valid_dimensions(256, 256), (256, 256));
    }
}
