use batch3d::{
    Gpu, MenuBuffer, RenderHost, Renderer, SourceFormat, Surface, SurfacePixels, Tri, TriFlags,
    Vertex, PALETTE_BYTES,
};

struct Host {
    window: (u32, u32),
    world_palette: [u8; PALETTE_BYTES],
    display_palette: [u8; PALETTE_BYTES],
    native_hud: bool,
}

impl Host {
    fn new() -> Self {
        // a simple ramp palette so indexed pixels come out as a gradient
        let mut world_palette = [0u8; PALETTE_BYTES];
        let mut display_palette = [0u8; PALETTE_BYTES];
        for i in 0..256 {
            world_palette[i * 3] = i as u8;
            world_palette[i * 3 + 1] = i as u8;
            world_palette[i * 3 + 2] = 255 - i as u8;
            display_palette[i * 3] = i as u8;
            display_palette[i * 3 + 1] = 255 - i as u8;
            display_palette[i * 3 + 2] = i as u8;
        }
        Self {
            window: (800, 600),
            world_palette,
            display_palette,
            native_hud: false,
        }
    }
}

impl RenderHost for Host {
    fn window_size(&self) -> (u32, u32) {
        self.window
    }
    fn hud_native_layout(&self) -> bool {
        self.native_hud
    }
    fn world_palette(&self) -> Option<&[u8; PALETTE_BYTES]> {
        Some(&self.world_palette)
    }
    fn display_palette(&self) -> &[u8; PALETTE_BYTES] {
        &self.display_palette
    }
}

fn quad(verts: &mut Vec<Vertex>, tris: &mut Vec<Tri>, x: f32, y: f32, size: f32, texture: Option<&Surface>, flags: TriFlags) {
    let base = verts.len() as u16;
    let color = 0xFFFF_FFFF;
    verts.push(Vertex::new([x, y, 0.5], color, [0.0, 0.0]));
    verts.push(Vertex::new([x, y + size, 0.5], color, [0.0, 1.0]));
    verts.push(Vertex::new([x + size, y + size, 0.5], color, [1.0, 1.0]));
    verts.push(Vertex::new([x + size, y, 0.5], color, [1.0, 0.0]));
    tris.push(Tri::new([base + 1, base, base + 2], texture.cloned(), flags));
    tris.push(Tri::new([base, base + 3, base + 2], texture.cloned(), flags));
}

fn main() {
    env_logger::init();

    let gpu = match Gpu::headless_blocking() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no GPU available: {}", e);
            std::process::exit(1);
        }
    };
    let mut rend = Renderer::new(gpu);
    let mut host = Host::new();

    // an 8-bit checkerboard surface, resolved through the world palette
    let checker = Surface::new();
    let mut pixels = [0u8; 64 * 64];
    for y in 0..64 {
        for x in 0..64 {
            pixels[y * 64 + x] = if (x / 8 + y / 8) % 2 == 0 { 32 } else { 224 };
        }
    }
    rend.add_texture(
        &checker,
        SurfacePixels {
            width: 64,
            height: 64,
            format: SourceFormat::Indexed8,
            data: &pixels,
        },
        false,
        false,
    )
    .expect("texture upload failed");

    // a menu buffer with a vertical index ramp
    let mut menu_pixels = vec![0u8; 640 * 480];
    for (y, row) in menu_pixels.chunks_mut(640).enumerate() {
        row.fill(y as u8);
    }
    let menu = MenuBuffer {
        width: 640,
        height: 480,
        pixels: &menu_pixels,
    };

    for frame in 0..4 {
        host.native_hud = frame % 2 == 1;
        if let Err(e) = rend.begin_scene(&host) {
            eprintln!("failed to init renderer, exiting: {}", e);
            std::process::exit(1);
        }

        let mut verts = Vec::new();
        let mut tris = Vec::new();
        // background layer: flat, no depth test, cleared depth underneath
        quad(&mut verts, &mut tris, 0.0, 0.0, 640.0, None, TriFlags::empty());
        // textured world geometry
        quad(
            &mut verts,
            &mut tris,
            100.0,
            80.0,
            200.0,
            Some(&checker),
            TriFlags::DEPTH_TEST | TriFlags::DEPTH_WRITE,
        );
        // a translucent back-face-culled overlay on top
        quad(
            &mut verts,
            &mut tris,
            180.0,
            160.0,
            200.0,
            Some(&checker),
            TriFlags::DEPTH_TEST | TriFlags::TRANSLUCENT | TriFlags::CULL_BACK,
        );

        assert!(rend.add_vertices(&verts));
        rend.add_triangles(&tris);
        rend.draw_render_list(&host);
        rend.draw_menu(&host, &menu);
        log::info!(
            "frame {}: {} triangles submitted",
            frame,
            rend.triangles_rendered()
        );
        rend.end_scene();
        rend.swap_targets();
    }

    println!("rendered 4 frames offscreen");
}
