//! Shader program management.
//!
//! Programs are assembled from convention-named stage sources: a base name
//! `"world"` resolves to the `world_v` and `world_f` WGSL stages. Sources
//! come from a [`ShaderLibrary`], so the engine decides whether shaders
//! ship embedded or load from disk. Compilation and pipeline creation run
//! inside error scopes; a failed stage or link is fatal to scene setup,
//! while a missing binding name only logs a warning.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::path::PathBuf;

use crate::error::RenderError;

/// Supplies WGSL stage sources by name (`<base>_v` / `<base>_f`).
pub trait ShaderLibrary {
    fn source(&self, name: &str) -> Result<String, RenderError>;
}

/// The stages shipped with the crate, compiled in via `include_str!`.
pub struct EmbeddedShaders;

impl ShaderLibrary for EmbeddedShaders {
    fn source(&self, name: &str) -> Result<String, RenderError> {
        let src = match name {
            "world_v" => include_str!("shaders/world_v.wgsl"),
            "world_f" => include_str!("shaders/world_f.wgsl"),
            "menu_v" => include_str!("shaders/menu_v.wgsl"),
            "menu_f" => include_str!("shaders/menu_f.wgsl"),
            _ => {
                return Err(RenderError::ShaderCompile {
                    name: name.to_string(),
                    detail: "no embedded source with that name".to_string(),
                })
            }
        };
        Ok(src.to_string())
    }
}

/// Loads `<dir>/<name>.wgsl`, mirroring the legacy on-disk shader layout.
pub struct DirShaders {
    root: PathBuf,
}

impl DirShaders {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderLibrary for DirShaders {
    fn source(&self, name: &str) -> Result<String, RenderError> {
        let path = self.root.join(format!("{}.wgsl", name));
        std::fs::read_to_string(&path).map_err(|e| RenderError::ShaderCompile {
            name: name.to_string(),
            detail: format!("{}: {}", path.display(), e),
        })
    }
}

/// Binding identifiers each program is expected to expose. A missing name
/// is tolerated (the feature silently no-ops) but worth a warning, since it
/// usually means a hand-edited shader.
pub(crate) const WORLD_BINDINGS: &[&str] = &[
    "position",
    "color",
    "uv",
    "globals",
    "mode",
    "t_surface",
    "t_palette",
];
pub(crate) const MENU_BINDINGS: &[&str] = &[
    "position",
    "color",
    "uv",
    "globals",
    "t_menu",
    "t_palette",
];

/// Scans stage sources for an identifier; sources are authored in-tree so
/// a plain text match is as reliable as a reflection query here.
pub(crate) fn has_binding(vertex_src: &str, fragment_src: &str, name: &str) -> bool {
    vertex_src.contains(name) || fragment_src.contains(name)
}

fn check_bindings(base: &str, vertex_src: &str, fragment_src: &str, names: &[&str]) {
    for &name in names {
        if !has_binding(vertex_src, fragment_src, name) {
            log::warn!(
                "{}",
                RenderError::BindingNotFound {
                    program: base.to_string(),
                    name: name.to_string(),
                }
            );
        }
    }
}

/// A compiled vertex/fragment stage pair.
pub(crate) struct Program {
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
}

fn compile_stage(
    device: &wgpu::Device,
    name: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        let err = RenderError::ShaderCompile {
            name: name.to_string(),
            detail: err.to_string(),
        };
        log::error!("{}", err);
        return Err(err);
    }
    Ok(module)
}

/// Loads and compiles both stages of `base`, warning about any expected
/// binding the sources fail to mention.
pub(crate) fn load_program(
    device: &wgpu::Device,
    library: &dyn ShaderLibrary,
    base: &str,
    bindings: &[&str],
) -> Result<Program, RenderError> {
    let vs_name = format!("{}_v", base);
    let fs_name = format!("{}_f", base);
    let vs_src = library.source(&vs_name)?;
    let fs_src = library.source(&fs_name)?;
    check_bindings(base, &vs_src, &fs_src, bindings);
    Ok(Program {
        vertex: compile_stage(device, &vs_name, &vs_src)?,
        fragment: compile_stage(device, &fs_name, &fs_src)?,
    })
}

/// Creates a render pipeline inside an error scope, converting validation
/// failures into a link error instead of a crash.
pub(crate) fn link_pipeline(
    device: &wgpu::Device,
    name: &str,
    desc: &wgpu::RenderPipelineDescriptor<'_>,
) -> Result<wgpu::RenderPipeline, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(desc);
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        let err = RenderError::ProgramLink {
            name: name.to_string(),
            detail: err.to_string(),
        };
        log::error!("{}", err);
        return Err(err);
    }
    Ok(pipeline)
}

/// The bind group layouts shared by every pipeline in the core:
/// a vertex-stage uniform for the projection, a fragment-stage uniform for
/// the per-batch mode pair, and a texture/sampler pair reused for surfaces,
/// palettes, and the menu buffer.
pub(crate) struct BindLayouts {
    pub globals: wgpu::BindGroupLayout,
    pub mode: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
}

impl BindLayouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(64),
                },
                count: None,
            }],
        });
        let mode = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mode layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(16),
                },
                count: None,
            }],
        });
        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        Self {
            globals,
            mode,
            texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_stages_resolve_by_convention() {
        let lib = EmbeddedShaders;
        for name in ["world_v", "world_f", "menu_v", "menu_f"] {
            assert!(lib.source(name).is_ok(), "missing embedded stage {}", name);
        }
        assert!(lib.source("world").is_err());
        assert!(lib.source("overlay_f").is_err());
    }

    #[test]
    fn shipped_world_stages_mention_every_expected_binding() {
        let lib = EmbeddedShaders;
        let vs = lib.source("world_v").unwrap();
        let fs = lib.source("world_f").unwrap();
        for &name in WORLD_BINDINGS {
            assert!(has_binding(&vs, &fs, name), "world program lost {}", name);
        }
    }

    #[test]
    fn shipped_menu_stages_mention_every_expected_binding() {
        let lib = EmbeddedShaders;
        let vs = lib.source("menu_v").unwrap();
        let fs = lib.source("menu_f").unwrap();
        for &name in MENU_BINDINGS {
            assert!(has_binding(&vs, &fs, name), "menu program lost {}", name);
        }
        assert!(!has_binding(&vs, &fs, "t_surface"));
    }
}
