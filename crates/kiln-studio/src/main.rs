use anyhow::Result;
use glam::{Mat3, UVec2, Vec2};

use kiln_engine::coords::{Quad, Rect, RectI};
use kiln_engine::core::{App, AppControl};
use kiln_engine::device::{ClearInfo, RenderDevice, TextureFilter, TextureSampler, TextureWrap};
use kiln_engine::logging::{LoggingConfig, init_logging};
use kiln_engine::paint::{BlendMode, Color};
use kiln_engine::render::{Batcher, BatcherMode, SubTexture, Texture};
use kiln_engine::time::FrameTime;
use kiln_engine::window::{ElementState, KeyCode, PhysicalKey, Runtime, RuntimeConfig, WindowEvent};

const CHECKER_SIZE: u32 = 64;

/// Batcher showcase: shapes, outlines, dashes and a spinning sprite.
struct Studio {
    image_path: Option<String>,

    batcher: Option<Batcher>,
    checker: Option<Texture>,
    image: Option<Texture>,

    angle: f32,
    dash_offset: f32,
}

impl Studio {
    fn new(image_path: Option<String>) -> Self {
        Self {
            image_path,
            batcher: None,
            checker: None,
            image: None,
            angle: 0.0,
            dash_offset: 0.0,
        }
    }
}

fn checker_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / 8) + (y / 8)) % 2 == 0;
            let c = if light { Color::LIGHT_GRAY } else { Color::DARK_GRAY };
            pixels.extend_from_slice(&[c.r, c.g, c.b, c.a]);
        }
    }
    pixels
}

impl App for Studio {
    fn init(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        self.batcher = Some(Batcher::new(device)?);
        self.checker = Some(Texture::with_pixels(
            device,
            UVec2::splat(CHECKER_SIZE),
            &checker_pixels(CHECKER_SIZE),
        )?);

        if let Some(path) = &self.image_path {
            match Texture::load(device, path) {
                Ok(texture) => self.image = Some(texture),
                Err(e) => log::warn!("{e:#}"),
            }
        }
        Ok(())
    }

    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        if let WindowEvent::KeyboardInput { event, .. } = event
            && event.state == ElementState::Pressed
            && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
        {
            return AppControl::Exit;
        }
        AppControl::Continue
    }

    fn fixed_update(&mut self, step: f32) -> AppControl {
        self.angle = (self.angle + step * 1.5) % std::f32::consts::TAU;
        AppControl::Continue
    }

    fn update(&mut self, time: FrameTime) -> AppControl {
        self.dash_offset = (self.dash_offset + time.dt * 0.5).fract();
        AppControl::Continue
    }

    fn render(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        let (Some(batcher), Some(checker)) = (self.batcher.as_mut(), self.checker.as_ref()) else {
            return Ok(());
        };

        device.clear(None, ClearInfo::color(Color::CORNFLOWER_BLUE))?;
        batcher.clear();

        // Solid shapes.
        batcher.rect(Rect::new(32.0, 32.0, 160.0, 96.0), Color::RED.premultiply());
        batcher.rect_colors(
            Rect::new(224.0, 32.0, 160.0, 96.0),
            [Color::RED, Color::GREEN, Color::BLUE, Color::YELLOW],
        );
        batcher.rect_line(Rect::new(416.0, 32.0, 160.0, 96.0), 4.0, Color::WHITE);
        batcher.rect_dashed(Rect::new(608.0, 32.0, 160.0, 96.0), 3.0, Color::BLACK, 8.0, self.dash_offset);

        // Mitered outline of a skewed quad.
        let quad = Quad::new(
            Vec2::new(64.0, 192.0),
            Vec2::new(224.0, 176.0),
            Vec2::new(256.0, 288.0),
            Vec2::new(32.0, 304.0),
        );
        batcher.quad(&quad, Color::PURPLE);
        batcher.quad_line(&quad, 6.0, Color::WHITE);

        // Textured sprites, tiled with a repeating nearest sampler.
        batcher.push_sampler(TextureSampler::new(TextureFilter::Nearest, TextureWrap::Repeat, TextureWrap::Repeat));
        batcher.image(checker, Vec2::new(320.0, 192.0), Color::WHITE);

        let sub = SubTexture::with_source(checker, Rect::new(0.0, 0.0, 32.0, 32.0));
        batcher.push_mode(BatcherMode::Wash);
        batcher.image_transformed(
            &sub,
            Vec2::new(520.0, 240.0),
            sub.size() / 2.0,
            Vec2::splat(2.0),
            self.angle,
            Color::CYAN,
        );
        batcher.pop_mode();
        batcher.pop_sampler();

        if let Some(image) = &self.image {
            let fit = 256.0 / image.width().max(image.height()) as f32;
            batcher.push_matrix(Mat3::from_scale(Vec2::splat(fit)), true);
            batcher.image(image, Vec2::new(640.0, 176.0) / fit, Color::WHITE);
            batcher.pop_matrix();
        }

        // Additive glow clipped to a band.
        batcher.push_scissor(Some(RectI::new(0, 360, 800, 80)));
        batcher.push_blend(BlendMode::ADD);
        for i in 0..8 {
            let x = 32.0 + i as f32 * 96.0;
            batcher.rect(Rect::new(x, 340.0, 80.0, 120.0), Color::new(40, 20, 0, 0));
        }
        batcher.pop_blend();
        batcher.pop_scissor();

        batcher.line_dashed(
            Vec2::new(32.0, 480.0),
            Vec2::new(768.0, 480.0),
            2.0,
            Color::WHITE,
            12.0,
            self.dash_offset,
        );

        batcher.render_ortho(device, None, None, None)
    }

    fn dispose(&mut self, device: &mut dyn RenderDevice) {
        if let Some(batcher) = self.batcher.take() {
            batcher.dispose(device);
        }
        if let Some(checker) = self.checker.take() {
            checker.dispose(device);
        }
        if let Some(image) = self.image.take() {
            image.dispose(device);
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let image_path = std::env::args().nth(1);
    let config = RuntimeConfig {
        title: "kiln studio".to_string(),
        ..RuntimeConfig::default()
    };

    log::info!("starting kiln studio");
    Runtime::run(config, Studio::new(image_path))
}
