//! Batch planning: one linear scan over the triangle list, grouping
//! contiguous runs that share a texture and flag word into draw batches.
//!
//! Planning is pure so the grouping and flag translation can be tested
//! without a device; `world` executes the plan against the GPU.

use crate::scratch::{Tri, TriFlags};
use crate::texcache::Surface;

/// Sampling modes selected per batch; the discriminants are shared with the
/// fragment shader.
pub const TEX_MODE_FLAT: i32 = 0;
pub const TEX_MODE_INDEXED: i32 = 1;
pub const TEX_MODE_INDEXED_BILINEAR: i32 = 2;
pub const TEX_MODE_DIRECT: i32 = 5;
pub const TEX_MODE_DIRECT_BILINEAR: i32 = 6;

/// Blend programs selected per batch, also shared with the fragment shader.
pub const BLEND_MODE_MODULATE: i32 = 2;
pub const BLEND_MODE_TRANSLUCENT: i32 = 5;

/// Fixed pipeline state for a batch: the depth policy and cull winding.
/// Only four combinations exist, so all pipelines are built up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Depth compare Always instead of Less (background layers).
    pub depth_always: bool,
    /// Cull back faces; the default culls front faces.
    pub cull_back: bool,
}

/// GPU state derived from a batch's texture and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawState {
    pub tex_mode: i32,
    pub blend_mode: i32,
    /// Clear the depth buffer before this batch draws.
    pub clear_depth: bool,
    /// Sample the surface with a linear filter (filtered 16-bit only;
    /// 8-bit bilinear happens palette-aware in the shader).
    pub linear_filter: bool,
    pub pipeline: PipelineKey,
}

/// A contiguous run of triangles drawn with one indexed draw call.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Triangle index range `[start, end)` into the submitted list.
    pub start: usize,
    pub end: usize,
    pub texture: Option<Surface>,
    pub flags: TriFlags,
    pub state: DrawState,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn same_texture(a: &Option<Surface>, b: &Option<Surface>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Surface::same(a, b),
        _ => false,
    }
}

fn derive_state(texture: &Option<Surface>, flags: TriFlags, filtering: bool) -> DrawState {
    let (tex_mode, linear_filter) = match texture {
        // a surface whose cached id reads zero falls back to flat mode,
        // like a missing texture
        Some(surface) if surface.texture_id() != 0 => {
            if surface.is_16bit() {
                if filtering {
                    (TEX_MODE_DIRECT_BILINEAR, true)
                } else {
                    (TEX_MODE_DIRECT, false)
                }
            } else if filtering {
                (TEX_MODE_INDEXED_BILINEAR, false)
            } else {
                (TEX_MODE_INDEXED, false)
            }
        }
        _ => (TEX_MODE_FLAT, false),
    };
    DrawState {
        tex_mode,
        blend_mode: if flags.translucent() {
            BLEND_MODE_TRANSLUCENT
        } else {
            BLEND_MODE_MODULATE
        },
        clear_depth: flags.background_layer(),
        linear_filter,
        pipeline: PipelineKey {
            depth_always: flags.background_layer(),
            cull_back: flags.culls_back_face(),
        },
    }
}

/// Walks the triangle list once and opens a new batch wherever the texture
/// reference or the flag word changes. Triangle order is submission order;
/// nothing is reordered across batch boundaries.
pub fn plan_batches(tris: &[Tri], filtering: bool) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for (i, tri) in tris.iter().enumerate() {
        let boundary = match batches.last() {
            Some(batch) => {
                !same_texture(&batch.texture, &tri.texture) || batch.flags != tri.flags
            }
            None => true,
        };
        if boundary {
            if let Some(batch) = batches.last_mut() {
                batch.end = i;
            }
            batches.push(Batch {
                start: i,
                end: i,
                texture: tri.texture.clone(),
                flags: tri.flags,
                state: derive_state(&tri.texture, tri.flags, filtering),
            });
        }
    }
    if let Some(batch) = batches.last_mut() {
        batch.end = tris.len();
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(texture: Option<&Surface>, flags: TriFlags) -> Tri {
        Tri::new([0, 1, 2], texture.cloned(), flags)
    }

    #[test]
    fn empty_list_plans_no_batches() {
        assert!(plan_batches(&[], false).is_empty());
    }

    #[test]
    fn groups_contiguous_runs_by_texture_and_flags() {
        let a = Surface::new();
        let b = Surface::new();
        let f = TriFlags::DEPTH_TEST;
        let g = TriFlags::DEPTH_TEST | TriFlags::TRANSLUCENT;
        let tris = [
            tri(Some(&a), f),
            tri(Some(&a), f),
            tri(Some(&b), f),
            tri(Some(&b), g),
        ];
        let plan = plan_batches(&tris, false);
        assert_eq!(plan.len(), 3);
        assert_eq!((plan[0].start, plan[0].end), (0, 2));
        assert_eq!((plan[1].start, plan[1].end), (2, 3));
        assert_eq!((plan[2].start, plan[2].end), (3, 4));
        // rebinds happen exactly where the runs break
        assert!(Surface::same(plan[1].texture.as_ref().unwrap(), &b));
        assert_eq!(plan[2].flags, g);
    }

    #[test]
    fn either_texture_or_flags_changing_opens_a_batch() {
        let a = Surface::new();
        let tris = [
            tri(Some(&a), TriFlags::DEPTH_TEST),
            tri(Some(&a), TriFlags::DEPTH_TEST | TriFlags::CULL_BACK),
            tri(None, TriFlags::DEPTH_TEST | TriFlags::CULL_BACK),
        ];
        let plan = plan_batches(&tris, false);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn background_batches_clear_depth_and_compare_always() {
        let tris = [
            tri(None, TriFlags::empty()),
            tri(None, TriFlags::DEPTH_TEST),
        ];
        let plan = plan_batches(&tris, false);
        assert!(plan[0].state.clear_depth);
        assert!(plan[0].state.pipeline.depth_always);
        assert!(!plan[1].state.clear_depth);
        assert!(!plan[1].state.pipeline.depth_always);
    }

    #[test]
    fn null_texture_always_draws_flat() {
        let plan = plan_batches(&[tri(None, TriFlags::DEPTH_TEST)], true);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_FLAT);
        assert!(!plan[0].state.linear_filter);
    }

    #[test]
    fn unloaded_surface_draws_flat() {
        let orphan = Surface::new();
        let plan = plan_batches(&[tri(Some(&orphan), TriFlags::DEPTH_TEST)], false);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_FLAT);
    }

    #[test]
    fn sampling_mode_follows_surface_format_and_filter_toggle() {
        let indexed = Surface::new();
        indexed.set_loaded(7, false);
        let direct = Surface::new();
        direct.set_loaded(8, true);

        let plan = plan_batches(&[tri(Some(&indexed), TriFlags::DEPTH_TEST)], false);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_INDEXED);
        let plan = plan_batches(&[tri(Some(&indexed), TriFlags::DEPTH_TEST)], true);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_INDEXED_BILINEAR);
        // 8-bit bilinear still samples nearest; the shader filters
        assert!(!plan[0].state.linear_filter);

        let plan = plan_batches(&[tri(Some(&direct), TriFlags::DEPTH_TEST)], false);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_DIRECT);
        let plan = plan_batches(&[tri(Some(&direct), TriFlags::DEPTH_TEST)], true);
        assert_eq!(plan[0].state.tex_mode, TEX_MODE_DIRECT_BILINEAR);
        assert!(plan[0].state.linear_filter);
    }

    #[test]
    fn blend_and_cull_translate_from_flags() {
        let flags = TriFlags::DEPTH_TEST | TriFlags::TRANSLUCENT | TriFlags::CULL_BACK;
        let plan = plan_batches(&[tri(None, flags)], false);
        assert_eq!(plan[0].state.blend_mode, BLEND_MODE_TRANSLUCENT);
        assert!(plan[0].state.pipeline.cull_back);

        let plan = plan_batches(&[tri(None, TriFlags::DEPTH_TEST)], false);
        assert_eq!(plan[0].state.blend_mode, BLEND_MODE_MODULATE);
        assert!(!plan[0].state.pipeline.cull_back);
    }
}
