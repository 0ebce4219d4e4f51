//! The per-frame render list: a fixed-capacity scratch collection of
//! vertices, triangles, and lines.
//!
//! Simulation code appends geometry every frame; the batching rasterizer
//! consumes the whole list once and resets it. Appends that would overflow
//! a capacity reject the entire submission, leaving the list untouched.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::texcache::Surface;

/// Vertex scratch capacity. Triangle indices are `u16`, which bounds this.
pub const MAX_VERTICES: usize = 32768;
/// Triangle scratch capacity.
pub const MAX_TRIS: usize = 16384;
/// Line scratch capacity, sized by the vertex constant as in the legacy
/// renderer.
pub const MAX_LINES: usize = MAX_VERTICES;

/// A screen/world-space vertex as submitted by the rasterizer-facing caller.
///
/// Byte layout (24 bytes): position `f32x3`, packed color `u32`, uv `f32x2`.
/// The color is packed `0xAARRGGBB`; the GPU consumes it as normalized
/// `u8x4`, so the shader sees it in `(b, g, r, a)` order and swizzles.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: u32,
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(pos: [f32; 3], color: u32, uv: [f32; 2]) -> Self {
        Self { pos, color, uv }
    }

    /// Decodes the packed color channel as `[r, g, b, a]`.
    pub fn color_rgba(&self) -> [u8; 4] {
        [
            (self.color >> 16) as u8,
            (self.color >> 8) as u8,
            self.color as u8,
            (self.color >> 24) as u8,
        ]
    }
}

const TRANSLUCENT_BITS: u32 = 0x0000_0600;
const DEPTH_TEST_BIT: u32 = 0x0000_0800;
const DEPTH_WRITE_BIT: u32 = 0x0000_1000;
const CULL_BACK_BIT: u32 = 0x0001_0000;

bitflags! {
    /// Per-triangle render state, bit positions inherited from the legacy
    /// flag word. Triangles are grouped into batches by comparing the whole
    /// word, so unrecognized hint bits still split batches.
    pub struct TriFlags: u32 {
        /// Translucent-surface blending (two legacy bits, tested together).
        const TRANSLUCENT = TRANSLUCENT_BITS;
        /// Depth-test this triangle; unset marks a background layer.
        const DEPTH_TEST = DEPTH_TEST_BIT;
        /// Depth-write request.
        const DEPTH_WRITE = DEPTH_WRITE_BIT;
        /// Cull back faces instead of the renderer's default front faces.
        const CULL_BACK = CULL_BACK_BIT;
        /// Remaining renderer hint bits, carried through untouched.
        const HINTS = !(TRANSLUCENT_BITS | DEPTH_TEST_BIT | DEPTH_WRITE_BIT | CULL_BACK_BIT);
    }
}

impl Default for TriFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl TriFlags {
    /// True when the triangle uses the translucent blend program.
    pub fn translucent(self) -> bool {
        self.intersects(Self::TRANSLUCENT)
    }

    /// True when the triangle is depth-tested (less-than).
    pub fn tests_depth(self) -> bool {
        self.contains(Self::DEPTH_TEST)
    }

    /// True for "background" geometry drawn under a fresh depth buffer.
    pub fn background_layer(self) -> bool {
        !self.tests_depth()
    }

    /// True when the triangle requests depth writes.
    pub fn writes_depth(self) -> bool {
        self.contains(Self::DEPTH_WRITE)
    }

    /// True when back faces are culled; the default culls front faces
    /// (the legacy winding convention is inverted in screen space).
    pub fn culls_back_face(self) -> bool {
        self.contains(Self::CULL_BACK)
    }
}

/// Three vertex indices, an optional surface, and the render-state word.
///
/// `texture == None` draws in flat palette-color mode.
#[derive(Clone, Debug, Default)]
pub struct Tri {
    pub v: [u16; 3],
    pub texture: Option<Surface>,
    pub flags: TriFlags,
}

impl Tri {
    pub fn new(v: [u16; 3], texture: Option<Surface>, flags: TriFlags) -> Self {
        Self { v, texture, flags }
    }
}

/// Two vertex indices. Lines are accumulated with the list but the path
/// that consumes them is currently disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Line {
    pub v: [u16; 2],
}

/// The scratch buffer itself. Storage is allocated once at the fixed
/// capacities and never grows; `reset` only clears the counters.
pub struct RenderList {
    vertices: Vec<Vertex>,
    tris: Vec<Tri>,
    lines: Vec<Line>,
    total_tris: usize,
}

impl RenderList {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(MAX_VERTICES),
            tris: Vec::with_capacity(MAX_TRIS),
            lines: Vec::with_capacity(MAX_LINES),
            total_tris: 0,
        }
    }

    /// Appends vertices, or rejects the whole submission when it would
    /// overflow. The legacy bound is strict: a submission that would fill
    /// the buffer exactly is also rejected.
    pub fn add_vertices(&mut self, vertices: &[Vertex]) -> bool {
        if self.vertices.len() + vertices.len() >= MAX_VERTICES {
            return false;
        }
        self.vertices.extend_from_slice(vertices);
        true
    }

    /// Appends triangles; an overflowing submission is silently dropped.
    pub fn add_tris(&mut self, tris: &[Tri]) {
        if self.tris.len() + tris.len() > MAX_TRIS {
            return;
        }
        self.tris.extend_from_slice(tris);
    }

    /// Appends lines; an overflowing submission is silently dropped.
    pub fn add_lines(&mut self, lines: &[Line]) {
        if self.lines.len() + lines.len() > MAX_LINES {
            return;
        }
        self.lines.extend_from_slice(lines);
    }

    /// Empties the list without touching the backing storage, folding the
    /// consumed triangle count into the diagnostic total.
    pub fn reset(&mut self) {
        self.total_tris += self.tris.len();
        self.vertices.clear();
        self.tris.clear();
        self.lines.clear();
    }

    /// Restarts the diagnostic total, once per scene.
    pub fn reset_total(&mut self) {
        self.total_tris = 0;
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn tris(&self) -> &[Tri] {
        &self.tris
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Triangles consumed across resets since the last `reset_total`.
    pub fn total_tris(&self) -> usize {
        self.total_tris
    }
}

impl Default for RenderList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_vertices(n: usize) -> Vec<Vertex> {
        (0..n)
            .map(|i| Vertex::new([i as f32, 0.0, 0.0], 0xFF00_0000 | i as u32, [0.0, 0.0]))
            .collect()
    }

    #[test]
    fn appends_concatenate_in_order() {
        let mut list = RenderList::new();
        let first = quad_vertices(3);
        let second = quad_vertices(2);
        assert!(list.add_vertices(&first));
        assert!(list.add_vertices(&second));
        assert_eq!(list.vertices().len(), 5);
        assert_eq!(&list.vertices()[..3], &first[..]);
        assert_eq!(&list.vertices()[3..], &second[..]);

        list.add_tris(&[Tri::new([0, 1, 2], None, TriFlags::empty())]);
        list.add_tris(&[Tri::new([2, 3, 4], None, TriFlags::DEPTH_TEST)]);
        assert_eq!(list.tris().len(), 2);
        assert_eq!(list.tris()[1].v, [2, 3, 4]);
    }

    #[test]
    fn reset_clears_counters_and_keeps_capacity() {
        let mut list = RenderList::new();
        assert!(list.add_vertices(&quad_vertices(4)));
        list.add_tris(&[Tri::default(), Tri::default()]);
        list.add_lines(&[Line { v: [0, 1] }]);
        list.reset();
        assert_eq!(list.vertices().len(), 0);
        assert_eq!(list.tris().len(), 0);
        assert_eq!(list.lines().len(), 0);
        assert_eq!(list.total_tris(), 2);
        // storage unchanged: a full-size append still works
        assert!(list.add_vertices(&quad_vertices(MAX_VERTICES - 1)));
    }

    #[test]
    fn over_capacity_vertex_append_is_rejected_whole() {
        let mut list = RenderList::new();
        let baseline = quad_vertices(10);
        assert!(list.add_vertices(&baseline));
        let too_many = quad_vertices(MAX_VERTICES - 10);
        // would land exactly at capacity, which the legacy bound rejects
        assert!(!list.add_vertices(&too_many));
        assert_eq!(list.vertices().len(), 10);
        assert_eq!(list.vertices(), &baseline[..]);
    }

    #[test]
    fn vertex_bound_is_one_element_stricter_than_tris() {
        let mut list = RenderList::new();
        assert!(!list.add_vertices(&quad_vertices(MAX_VERTICES)));
        assert!(list.add_vertices(&quad_vertices(MAX_VERTICES - 1)));

        let mut list = RenderList::new();
        list.add_tris(&vec![Tri::default(); MAX_TRIS]);
        assert_eq!(list.tris().len(), MAX_TRIS);
    }

    #[test]
    fn overflowing_tri_append_is_dropped() {
        let mut list = RenderList::new();
        list.add_tris(&vec![Tri::default(); MAX_TRIS - 1]);
        list.add_tris(&[Tri::default(), Tri::default()]);
        assert_eq!(list.tris().len(), MAX_TRIS - 1);
    }

    #[test]
    fn total_accumulates_across_resets() {
        let mut list = RenderList::new();
        list.add_tris(&vec![Tri::default(); 3]);
        list.reset();
        list.add_tris(&vec![Tri::default(); 2]);
        list.reset();
        assert_eq!(list.total_tris(), 5);
        list.reset_total();
        assert_eq!(list.total_tris(), 0);
    }

    #[test]
    fn flag_bits_match_the_legacy_word() {
        assert_eq!(TriFlags::TRANSLUCENT.bits(), 0x600);
        assert_eq!(TriFlags::DEPTH_TEST.bits(), 0x800);
        assert_eq!(TriFlags::DEPTH_WRITE.bits(), 0x1000);
        assert_eq!(TriFlags::CULL_BACK.bits(), 0x10000);

        let flags = TriFlags::from_bits_truncate(0x600 | 0x10000);
        assert!(flags.translucent());
        assert!(flags.culls_back_face());
        assert!(flags.background_layer());
        assert!(!flags.tests_depth());
        assert!(!flags.writes_depth());
    }

    #[test]
    fn hint_bits_survive_round_trips() {
        let raw = 0x0000_0801 | 0x0020_0000;
        let flags = TriFlags::from_bits_truncate(raw);
        assert_eq!(flags.bits(), raw);
        assert!(flags.tests_depth());
        // differing hint bits compare unequal, which splits batches
        assert_ne!(flags, TriFlags::from_bits_truncate(0x0000_0801));
    }

    #[test]
    fn packed_color_decodes_argb() {
        let v = Vertex::new([0.0; 3], 0x80FF_2001, [0.0, 0.0]);
        assert_eq!(v.color_rgba(), [0xFF, 0x20, 0x01, 0x80]);
    }
}
