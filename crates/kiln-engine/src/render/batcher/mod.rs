//! Immediate-mode 2D batcher.
//!
//! Drawing calls append transformed quads to CPU-side vertex and index
//! arrays. Consecutive quads that share texture, sampler, material, blend and
//! scissor are merged into one [`Batch`]; any change of those starts a new
//! batch, so submission order is always preserved. [`Batcher::render`]
//! uploads the geometry once and issues one draw per batch.
//!
//! Typical frame:
//! 1. [`Batcher::clear`]
//! 2. drawing calls
//! 3. [`Batcher::render`] (or [`Batcher::render_ortho`])

mod vertex;

use anyhow::Result;
use glam::{Mat3, Mat4, Vec2};

use crate::coords::{Quad, Rect, RectI};
use crate::device::{RenderDevice, ShaderDef, ShaderHandle, ShaderStageDef, TextureHandle, TextureSampler};
use crate::paint::{BlendMode, Color};

use super::{BoundSampler, DrawCommand, Material, Mesh, SubTexture, Target, Texture};

pub use vertex::{BatcherMode, BatcherVertex};

const SHADER_SOURCE: &[u8] = include_bytes!("../shaders/batcher.wgsl");

/// A run of triangles drawn with identical state.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `None` draws with the batcher's default material.
    pub material: Option<Material>,
    pub blend: BlendMode,
    /// Null falls back to the device default texture.
    pub texture: TextureHandle,
    pub sampler: TextureSampler,
    pub scissor: Option<RectI>,
    /// First triangle.
    pub offset: u32,
    /// Triangle count.
    pub elements: u32,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            material: None,
            blend: BlendMode::PREMULTIPLY,
            texture: TextureHandle::NULL,
            sampler: TextureSampler::default(),
            scissor: None,
            offset: 0,
            elements: 0,
        }
    }
}

pub struct Batcher {
    shader: ShaderHandle,
    material: Material,
    mesh: Mesh<BatcherVertex, u32>,
    default_texture: TextureHandle,

    vertices: Vec<BatcherVertex>,
    indices: Vec<u32>,
    dirty: bool,

    batch: Batch,
    batches: Vec<Batch>,

    matrix: Mat3,
    mode: BatcherMode,

    matrix_stack: Vec<Mat3>,
    scissor_stack: Vec<Option<RectI>>,
    blend_stack: Vec<BlendMode>,
    sampler_stack: Vec<TextureSampler>,
    material_stack: Vec<Option<Material>>,
    mode_stack: Vec<BatcherMode>,
}

impl Batcher {
    /// Creates the default shader and the backing mesh on `device`.
    pub fn new(device: &mut dyn RenderDevice) -> Result<Self> {
        let shader = device.create_shader(&ShaderDef {
            name: "batcher",
            vertex: ShaderStageDef {
                code: SHADER_SOURCE,
                entrypoint: "vs_main",
                num_samplers: 0,
                num_uniform_buffers: 1,
            },
            fragment: ShaderStageDef {
                code: SHADER_SOURCE,
                entrypoint: "fs_main",
                num_samplers: 1,
                num_uniform_buffers: 0,
            },
        })?;

        let mesh = match Mesh::new(device) {
            Ok(mesh) => mesh,
            Err(e) => {
                device.dispose_shader(shader);
                return Err(e);
            }
        };

        Ok(Self {
            shader,
            material: Material::new(shader),
            mesh,
            default_texture: device.default_texture(),
            vertices: Vec::new(),
            indices: Vec::new(),
            dirty: true,
            batch: Batch::default(),
            batches: Vec::new(),
            matrix: Mat3::IDENTITY,
            mode: BatcherMode::Normal,
            matrix_stack: Vec::new(),
            scissor_stack: Vec::new(),
            blend_stack: Vec::new(),
            sampler_stack: Vec::new(),
            material_stack: Vec::new(),
            mode_stack: Vec::new(),
        })
    }

    // ── state ─────────────────────────────────────────────────────────────

    /// Closes the current batch and opens an empty one after it with the
    /// same state.
    fn split(&mut self) {
        let next = Batch {
            offset: self.batch.offset + self.batch.elements,
            elements: 0,
            ..self.batch.clone()
        };
        let done = std::mem::replace(&mut self.batch, next);
        self.batches.push(done);
    }

    pub fn set_texture(&mut self, texture: TextureHandle) {
        if self.batch.elements > 0 && texture != self.batch.texture {
            self.split();
        }
        self.batch.texture = texture;
    }

    pub fn set_sampler(&mut self, sampler: TextureSampler) {
        if self.batch.elements > 0 && sampler != self.batch.sampler {
            self.split();
        }
        self.batch.sampler = sampler;
    }

    /// `None` restores the default material.
    pub fn set_material(&mut self, material: Option<Material>) {
        if self.batch.elements > 0 && material != self.batch.material {
            self.split();
        }
        self.batch.material = material;
    }

    pub fn set_scissor(&mut self, scissor: Option<RectI>) {
        if self.batch.elements > 0 && scissor != self.batch.scissor {
            self.split();
        }
        self.batch.scissor = scissor;
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        if self.batch.elements > 0 && blend != self.batch.blend {
            self.split();
        }
        self.batch.blend = blend;
    }

    /// Pushes a transform. With `relative` it applies before the current
    /// one, otherwise it replaces it.
    pub fn push_matrix(&mut self, matrix: Mat3, relative: bool) {
        self.matrix_stack.push(self.matrix);
        self.matrix = if relative { self.matrix * matrix } else { matrix };
    }

    /// Restores the previous transform and returns the one popped.
    pub fn pop_matrix(&mut self) -> Mat3 {
        let popped = self.matrix;
        self.matrix = self.matrix_stack.pop().expect("pop_matrix without push_matrix");
        popped
    }

    pub fn push_scissor(&mut self, scissor: Option<RectI>) {
        self.scissor_stack.push(self.batch.scissor);
        self.set_scissor(scissor);
    }

    pub fn pop_scissor(&mut self) -> Option<RectI> {
        let popped = self.batch.scissor;
        let previous = self.scissor_stack.pop().expect("pop_scissor without push_scissor");
        self.set_scissor(previous);
        popped
    }

    pub fn push_blend(&mut self, blend: BlendMode) {
        self.blend_stack.push(self.batch.blend);
        self.set_blend(blend);
    }

    pub fn pop_blend(&mut self) -> BlendMode {
        let popped = self.batch.blend;
        let previous = self.blend_stack.pop().expect("pop_blend without push_blend");
        self.set_blend(previous);
        popped
    }

    pub fn push_sampler(&mut self, sampler: TextureSampler) {
        self.sampler_stack.push(self.batch.sampler);
        self.set_sampler(sampler);
    }

    pub fn pop_sampler(&mut self) -> TextureSampler {
        let popped = self.batch.sampler;
        let previous = self.sampler_stack.pop().expect("pop_sampler without push_sampler");
        self.set_sampler(previous);
        popped
    }

    pub fn push_material(&mut self, material: Material) {
        self.material_stack.push(self.batch.material.clone());
        self.set_material(Some(material));
    }

    pub fn pop_material(&mut self) -> Option<Material> {
        let previous = self.material_stack.pop().expect("pop_material without push_material");
        let popped = self.batch.material.clone();
        self.set_material(previous);
        popped
    }

    pub fn push_mode(&mut self, mode: BatcherMode) {
        self.mode_stack.push(self.mode);
        self.mode = mode;
    }

    pub fn pop_mode(&mut self) -> BatcherMode {
        let popped = self.mode;
        self.mode = self.mode_stack.pop().expect("pop_mode without push_mode");
        popped
    }

    // ── geometry ──────────────────────────────────────────────────────────

    /// Appends `vertex_count` vertices and `index_count` indices, returning
    /// the index of the first new vertex and the new tails to fill in.
    fn request(&mut self, vertex_count: usize, index_count: usize) -> (u32, &mut [BatcherVertex], &mut [u32]) {
        let base = self.vertices.len();
        let index_base = self.indices.len();

        grow(&mut self.vertices, vertex_count);
        grow(&mut self.indices, index_count);
        self.vertices.resize(base + vertex_count, BatcherVertex::default());
        self.indices.resize(index_base + index_count, 0);

        self.batch.elements += (index_count / 3) as u32;
        self.dirty = true;

        (base as u32, &mut self.vertices[base..], &mut self.indices[index_base..])
    }

    fn push_quad(&mut self, points: [Vec2; 4], tex: [Vec2; 4], colors: [Color; 4], mode: BatcherMode) {
        let matrix = self.matrix;
        let (base, vertices, indices) = self.request(4, 6);

        for (i, vertex) in vertices.iter_mut().enumerate() {
            *vertex = BatcherVertex::new(matrix.transform_point2(points[i]), tex[i], colors[i], mode);
        }
        indices.copy_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Solid quad; the bound texture is ignored.
    pub fn quad(&mut self, quad: &Quad, color: Color) {
        self.quad_colors(quad, [color; 4]);
    }

    pub fn quad_colors(&mut self, quad: &Quad, colors: [Color; 4]) {
        self.set_texture(self.default_texture);
        self.push_quad(quad.points(), [Vec2::ZERO; 4], colors, BatcherMode::Fill);
    }

    /// Quad sampling the current texture in the current mode.
    pub fn textured_quad(&mut self, quad: &Quad, tex: [Vec2; 4], color: Color) {
        self.textured_quad_colors(quad, tex, [color; 4]);
    }

    pub fn textured_quad_colors(&mut self, quad: &Quad, tex: [Vec2; 4], colors: [Color; 4]) {
        self.push_quad(quad.points(), tex, colors, self.mode);
    }

    pub fn rect(&mut self, rect: Rect, color: Color) {
        self.quad(&Quad::from(rect), color);
    }

    /// Corner colors run top-left, top-right, bottom-right, bottom-left.
    pub fn rect_colors(&mut self, rect: Rect, colors: [Color; 4]) {
        self.quad_colors(&Quad::from(rect), colors);
    }

    /// Outline drawn inside `rect`. Lines at least half as thick as the rect
    /// fill it instead.
    pub fn rect_line(&mut self, rect: Rect, line_width: f32, color: Color) {
        let Rect { x, y, w, h } = rect;
        if line_width >= w / 2.0 || line_width >= h / 2.0 {
            self.rect(rect, color);
        } else if line_width > 0.0 {
            let lw = line_width;
            self.rect(Rect::new(x, y, w, lw), color);
            self.rect(Rect::new(x, y + h - lw, w, lw), color);
            self.rect(Rect::new(x, y + lw, lw, h - lw * 2.0), color);
            self.rect(Rect::new(x + w - lw, y + lw, lw, h - lw * 2.0), color);
        }
    }

    pub fn rect_dashed(&mut self, rect: Rect, line_width: f32, color: Color, dash_length: f32, offset_percent: f32) {
        let r = rect.inflate(-line_width / 2.0);
        let corners = [r.top_left(), r.top_right(), r.bottom_right(), r.bottom_left()];
        for i in 0..4 {
            self.line_dashed(corners[i], corners[(i + 1) % 4], line_width, color, dash_length, offset_percent);
        }
    }

    /// Mitered outline of `quad`, `line_width` thick, grown outward from
    /// its edges.
    pub fn quad_line(&mut self, quad: &Quad, line_width: f32, color: Color) {
        let Quad { a, b, c, d } = *quad;
        let ab = quad.normal_ab() * line_width;
        let bc = quad.normal_bc() * line_width;
        let cd = quad.normal_cd() * line_width;
        let da = quad.normal_da() * line_width;

        let aa = intersection(d + da, a + da, a + ab, b + ab);
        let bb = intersection(a + ab, b + ab, b + bc, c + bc);
        let cc = intersection(b + bc, c + bc, c + cd, d + cd);
        let dd = intersection(c + cd, d + cd, d + da, a + da);

        self.quad(&Quad::new(aa, a, b, bb), color);
        self.quad(&Quad::new(bb, b, c, cc), color);
        self.quad(&Quad::new(cc, c, d, dd), color);
        self.quad(&Quad::new(dd, d, a, aa), color);
    }

    pub fn line(&mut self, from: Vec2, to: Vec2, line_width: f32, color: Color) {
        let axis = (to - from).normalize_or_zero();
        if axis == Vec2::ZERO {
            return;
        }
        let perp = Vec2::new(axis.y, -axis.x) * (line_width * 0.5);
        self.quad(&Quad::new(from + perp, to + perp, to - perp, from - perp), color);
    }

    /// Dashes of `dash_length` separated by equal gaps. Animating
    /// `offset_percent` over [0, 1) scrolls the pattern by one dash period.
    pub fn line_dashed(
        &mut self,
        from: Vec2,
        to: Vec2,
        line_width: f32,
        color: Color,
        dash_length: f32,
        offset_percent: f32,
    ) {
        let diff = to - from;
        let dist = diff.length();
        if dist < 0.0001 || dash_length <= 0.0 {
            return;
        }

        let axis = diff / dist;
        let perp = Vec2::new(axis.y, -axis.x) * (line_width * 0.5);

        let offset = offset_percent.rem_euclid(1.0);
        let mut d = dash_length * offset * 2.0;
        if d > dash_length {
            d -= dash_length * 2.0;
        }

        while d < dist {
            let start = from + axis * d.max(0.0);
            let end = from + axis * (d + dash_length).min(dist);
            self.quad(&Quad::new(start + perp, end + perp, end - perp, start - perp), color);
            d += dash_length * 2.0;
        }
    }

    /// The whole of `texture` with its top-left corner at `pos`.
    pub fn image(&mut self, texture: &Texture, pos: Vec2, color: Color) {
        self.image_handle(texture.handle(), Rect::from_pos_size(pos, texture.size().as_vec2()), color);
    }

    /// The whole of the texture behind `texture`, stretched over `dest`.
    pub fn image_handle(&mut self, texture: TextureHandle, dest: Rect, color: Color) {
        self.set_texture(texture);
        let tex = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        self.push_quad(Quad::from(dest).points(), tex, [color; 4], self.mode);
    }

    pub fn image_sub(&mut self, sub: &SubTexture, pos: Vec2, color: Color) {
        self.set_texture(sub.texture);
        let points = sub.draw_coords.map(|p| p + pos);
        self.push_quad(points, sub.tex_coords, [color; 4], self.mode);
    }

    /// `sub` scaled and rotated (radians) around `origin`, which lands on `pos`.
    pub fn image_transformed(
        &mut self,
        sub: &SubTexture,
        pos: Vec2,
        origin: Vec2,
        scale: Vec2,
        rotation: f32,
        color: Color,
    ) {
        let transform = Mat3::from_translation(pos)
            * Mat3::from_angle(rotation)
            * Mat3::from_scale(scale)
            * Mat3::from_translation(-origin);

        self.push_matrix(transform, true);
        self.image_sub(sub, Vec2::ZERO, color);
        self.pop_matrix();
    }

    // ── submission ────────────────────────────────────────────────────────

    /// Copies the CPU geometry into the mesh if it changed since the last
    /// upload.
    pub fn upload(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        if !self.dirty || self.indices.is_empty() || self.vertices.is_empty() {
            return Ok(());
        }

        self.mesh.clear();
        self.mesh.set_indices(device, &self.indices, 0)?;
        self.mesh.set_vertices(device, &self.vertices, 0)?;
        self.dirty = false;
        Ok(())
    }

    /// Draws every batch into `target` (the framebuffer when `None`).
    ///
    /// `scissor` overrides the scissor recorded in each batch.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        target: Option<&Target>,
        matrix: Mat4,
        scissor: Option<RectI>,
    ) -> Result<()> {
        if self.batch_count() == 0 || self.vertices.is_empty() {
            return Ok(());
        }

        self.upload(device)?;

        for batch in self.batches.iter().chain(std::iter::once(&self.batch)) {
            if batch.elements > 0 {
                self.render_batch(device, target, batch, matrix, scissor)?;
            }
        }
        Ok(())
    }

    /// [`render`](Self::render) with a top-left-origin orthographic
    /// projection over `viewport`, or over the whole target.
    pub fn render_ortho(
        &mut self,
        device: &mut dyn RenderDevice,
        target: Option<&Target>,
        viewport: Option<RectI>,
        scissor: Option<RectI>,
    ) -> Result<()> {
        let size = match (viewport, target) {
            (Some(v), _) => v.size().as_vec2(),
            (None, Some(t)) => t.size().as_vec2(),
            (None, None) => device.framebuffer().size().as_vec2(),
        };
        let matrix = Mat4::orthographic_rh(0.0, size.x, size.y, 0.0, -1.0, 1.0);
        self.render(device, target, matrix, scissor)
    }

    fn render_batch(
        &self,
        device: &mut dyn RenderDevice,
        target: Option<&Target>,
        batch: &Batch,
        matrix: Mat4,
        scissor: Option<RectI>,
    ) -> Result<()> {
        let mut material = batch.material.clone().unwrap_or_else(|| self.material.clone());
        material.vertex.set_uniform(&matrix, 0);
        if !batch.texture.is_null() {
            material.fragment.samplers[0] = BoundSampler::new(batch.texture, batch.sampler);
        }

        let mut cmd = DrawCommand::from_mesh(target, &self.mesh, &material);
        cmd.blend_mode = batch.blend;
        cmd.scissor = scissor.or(batch.scissor);
        cmd.index_offset = batch.offset * 3;
        cmd.index_count = batch.elements * 3;
        device.submit(&cmd)
    }

    /// Empties geometry, batches and stacks. Capacity is kept.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.dirty = true;

        self.batch = Batch::default();
        self.batches.clear();

        self.matrix = Mat3::IDENTITY;
        self.mode = BatcherMode::Normal;

        self.matrix_stack.clear();
        self.scissor_stack.clear();
        self.blend_stack.clear();
        self.sampler_stack.clear();
        self.material_stack.clear();
        self.mode_stack.clear();
    }

    pub fn dispose(self, device: &mut dyn RenderDevice) {
        self.mesh.dispose(device);
        device.dispose_shader(self.shader);
    }

    // ── queries ───────────────────────────────────────────────────────────

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Completed batches plus the current one if it has triangles.
    pub fn batch_count(&self) -> usize {
        self.batches.len() + usize::from(self.batch.elements > 0)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> + '_ {
        self.batches
            .iter()
            .chain(std::iter::once(&self.batch).filter(|b| b.elements > 0))
    }

    #[inline]
    pub fn vertices(&self) -> &[BatcherVertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn matrix(&self) -> Mat3 {
        self.matrix
    }

    #[inline]
    pub fn scissor(&self) -> Option<RectI> {
        self.batch.scissor
    }

    #[inline]
    pub fn mode(&self) -> BatcherMode {
        self.mode
    }

    /// Material used by batches that do not set their own.
    #[inline]
    pub fn default_material(&self) -> &Material {
        &self.material
    }
}

/// Reserves room for `extra` more elements, at least doubling capacity.
fn grow<T>(buffer: &mut Vec<T>, extra: usize) {
    let needed = buffer.len() + extra;
    if needed > buffer.capacity() {
        let target = needed.max(buffer.capacity() * 2);
        buffer.reserve_exact(target - buffer.len());
    }
}

/// Intersection of the lines through `p0 p1` and `q0 q1`. Parallel lines
/// yield `p1`.
fn intersection(p0: Vec2, p1: Vec2, q0: Vec2, q1: Vec2) -> Vec2 {
    let aa = p1 - p0;
    let bb = q0 - q1;
    let cc = q0 - p0;
    let denom = aa.y * bb.x - aa.x * bb.y;
    if denom.abs() < f32::EPSILON {
        return p1;
    }
    let t = (bb.x * cc.y - bb.y * cc.x) / denom;
    p0 + aa * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceConfig, HeadlessBackend, RenderCommand, TextureFilter};
    use glam::UVec2;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), DeviceConfig::default(), UVec2::new(64, 64)).unwrap()
    }

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    fn tex(n: u32) -> TextureHandle {
        TextureHandle::new(n, 0)
    }

    const UV: [Vec2; 4] = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];

    // ── emission ──────────────────────────────────────────────────────────

    #[test]
    fn rect_emits_two_triangles_at_its_corners() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::RED);

        assert_eq!(b.triangle_count(), 2);
        let positions: Vec<Vec2> = b.vertices().iter().map(BatcherVertex::position).collect();
        assert_eq!(
            positions,
            vec![Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0), Vec2::new(0.0, 10.0)]
        );
        assert_eq!(b.indices(), &[0, 1, 2, 0, 2, 3]);
        assert!(b.vertices().iter().all(|v| v.mode == BatcherMode::Fill.weights()));
    }

    #[test]
    fn indices_are_offset_per_quad() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::RED);
        b.rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::RED);
        assert_eq!(&b.indices()[6..], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn matrix_transforms_vertices() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.push_matrix(Mat3::from_translation(Vec2::new(5.0, 5.0)), true);
        b.push_matrix(Mat3::from_scale(Vec2::splat(2.0)), true);
        b.rect(Rect::new(1.0, 1.0, 1.0, 1.0), Color::WHITE);

        assert_eq!(b.vertices()[0].position(), Vec2::new(7.0, 7.0));
        assert_eq!(b.vertices()[2].position(), Vec2::new(9.0, 9.0));

        b.pop_matrix();
        b.push_matrix(Mat3::IDENTITY, false);
        assert_eq!(b.matrix(), Mat3::IDENTITY);
        b.pop_matrix();
        assert_eq!(b.matrix(), Mat3::from_translation(Vec2::new(5.0, 5.0)));
    }

    #[test]
    #[should_panic(expected = "pop_matrix without push_matrix")]
    fn unbalanced_pop_panics() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.pop_matrix();
    }

    #[test]
    fn rect_line_falls_back_to_fill() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect_line(Rect::new(0.0, 0.0, 10.0, 10.0), 5.0, Color::WHITE);
        assert_eq!(b.triangle_count(), 2);

        b.clear();
        b.rect_line(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0, Color::WHITE);
        assert_eq!(b.triangle_count(), 8);

        b.clear();
        b.rect_line(Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, Color::WHITE);
        assert_eq!(b.triangle_count(), 0);
    }

    #[test]
    fn quad_line_miters_corners() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.quad_line(&Quad::from(Rect::new(0.0, 0.0, 10.0, 10.0)), 1.0, Color::WHITE);

        assert_eq!(b.triangle_count(), 8);
        let first = b.vertices()[0].position();
        assert!(close(first, Vec2::new(-1.0, -1.0)), "got {first}");
        let bb = b.vertices()[3].position();
        assert!(close(bb, Vec2::new(11.0, -1.0)), "got {bb}");
    }

    #[test]
    fn dashes_alternate_with_gaps() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.line_dashed(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0, Color::WHITE, 2.0, 0.0);
        assert_eq!(b.triangle_count(), 6);

        let xs: Vec<f32> = b.vertices().iter().step_by(4).map(|v| v.pos[0]).collect();
        assert_eq!(xs, vec![0.0, 4.0, 8.0]);
        assert_eq!(b.vertices()[0].pos[1], -1.0);
    }

    #[test]
    fn dash_offset_scrolls_pattern() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        // Half a period: the first dash starts one dash length in.
        b.line_dashed(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0, Color::WHITE, 2.0, 0.5);
        assert_eq!(b.vertices()[0].pos[0], 2.0);

        // Past half a period the pattern enters from before the start.
        b.clear();
        b.line_dashed(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0, Color::WHITE, 2.0, 0.75);
        assert_eq!(b.vertices()[0].pos[0], 0.0);
        assert_eq!(b.vertices()[1].pos[0], 1.0);

        b.clear();
        b.line_dashed(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0, Color::WHITE, 2.0, -0.25);
        assert_eq!(b.vertices()[1].pos[0], 1.0);
    }

    #[test]
    fn degenerate_dashes_emit_nothing() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        let p = Vec2::new(3.0, 4.0);
        b.line_dashed(p, p, 1.0, Color::WHITE, 2.0, 0.0);
        b.line_dashed(Vec2::ZERO, p, 1.0, Color::WHITE, 0.0, 0.0);
        b.line_dashed(Vec2::ZERO, p, 1.0, Color::WHITE, -1.0, 0.3);
        assert_eq!(b.triangle_count(), 0);
        assert!(b.vertices().iter().all(|v| v.pos.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn rect_dashed_covers_four_edges() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect_dashed(Rect::new(0.0, 0.0, 11.0, 11.0), 1.0, Color::WHITE, 100.0, 0.0);
        assert_eq!(b.triangle_count(), 8);
    }

    #[test]
    fn image_uses_texture_and_mode() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.push_mode(BatcherMode::Wash);
        b.image_handle(tex(7), Rect::new(0.0, 0.0, 4.0, 4.0), Color::WHITE);
        assert_eq!(b.pop_mode(), BatcherMode::Wash);

        let batch = b.batches().next().unwrap();
        assert_eq!(batch.texture, tex(7));
        assert_eq!(b.vertices()[2].tex, [1.0, 1.0]);
        assert_eq!(b.vertices()[0].mode, BatcherMode::Wash.weights());
    }

    #[test]
    fn transformed_image_rotates_about_origin() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        let sub = SubTexture::from_parts(tex(1), UVec2::new(4, 4), Rect::new(0.0, 0.0, 4.0, 4.0), Rect::new(0.0, 0.0, 4.0, 4.0));

        b.image_transformed(&sub, Vec2::new(10.0, 10.0), Vec2::new(2.0, 2.0), Vec2::ONE, std::f32::consts::FRAC_PI_2, Color::WHITE);

        // Top-left corner (-2,-2 about the origin) rotates a quarter turn to (2,-2).
        assert!(close(b.vertices()[0].position(), Vec2::new(12.0, 8.0)));
        assert_eq!(b.matrix(), Mat3::IDENTITY);
    }

    // ── batching ──────────────────────────────────────────────────────────

    #[test]
    fn repeated_state_never_splits() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        for _ in 0..5 {
            b.set_texture(tex(1));
            b.set_sampler(TextureSampler::default());
            b.set_blend(BlendMode::PREMULTIPLY);
            b.set_scissor(None);
            b.set_material(None);
            b.textured_quad(&Quad::from(Rect::new(0.0, 0.0, 1.0, 1.0)), UV, Color::WHITE);
        }
        assert_eq!(b.batch_count(), 1);
        assert_eq!(b.batches().next().unwrap().elements, 10);
    }

    #[test]
    fn alternating_textures_split_every_quad() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        let n = 6;
        for i in 0..n {
            b.set_texture(tex(1 + i % 2));
            b.textured_quad(&Quad::from(Rect::new(0.0, 0.0, 1.0, 1.0)), UV, Color::WHITE);
        }

        assert_eq!(b.batch_count(), n as usize);
        for (i, batch) in b.batches().enumerate() {
            assert_eq!(batch.elements, 2);
            assert_eq!(batch.offset, i as u32 * 2);
        }
    }

    #[test]
    fn empty_batch_overwrites_state_in_place() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.set_texture(tex(1));
        b.set_texture(tex(2));
        b.set_sampler(TextureSampler::new(TextureFilter::Linear, Default::default(), Default::default()));
        b.set_texture(tex(3));
        b.textured_quad(&Quad::from(Rect::new(0.0, 0.0, 1.0, 1.0)), UV, Color::WHITE);

        assert_eq!(b.batch_count(), 1);
        let batch = b.batches().next().unwrap();
        assert_eq!(batch.texture, tex(3));
        assert_eq!(batch.sampler.filter, TextureFilter::Linear);
    }

    #[test]
    fn pushed_state_is_restored() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);

        let clip = Some(RectI::new(0, 0, 8, 8));
        b.push_scissor(clip);
        b.rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);
        assert_eq!(b.pop_scissor(), clip);
        b.rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);

        b.push_blend(BlendMode::ADD);
        assert_eq!(b.pop_blend(), BlendMode::ADD);

        let scissors: Vec<Option<RectI>> = b.batches().map(|b| b.scissor).collect();
        assert_eq!(scissors, vec![None, clip, None]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        for i in 0..100 {
            b.set_texture(tex(i % 3 + 1));
            b.textured_quad(&Quad::from(Rect::new(0.0, 0.0, 1.0, 1.0)), UV, Color::WHITE);
        }
        b.push_matrix(Mat3::from_scale(Vec2::splat(3.0)), false);
        let capacity = b.vertices.capacity();

        b.clear();
        assert_eq!(b.vertex_count(), 0);
        assert_eq!(b.batch_count(), 0);
        assert_eq!(b.matrix(), Mat3::IDENTITY);
        assert_eq!(b.vertices.capacity(), capacity);
        assert!(capacity >= 400);
    }

    // ── render ────────────────────────────────────────────────────────────

    #[test]
    fn one_draw_per_batch() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 4.0, 4.0), Color::RED);
        b.set_texture(tex(9));
        b.textured_quad(&Quad::from(Rect::new(0.0, 0.0, 4.0, 4.0)), UV, Color::WHITE);
        b.rect(Rect::new(4.0, 4.0, 4.0, 4.0), Color::BLUE);

        b.render_ortho(&mut d, None, None, None).unwrap();
        assert_eq!(d.backend().stats().draws, 3);

        let draws: Vec<(u32, u32)> = d
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::DrawIndexed { index_count, first_index, .. } => Some((*index_count, *first_index)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(6, 0), (6, 6), (6, 12)]);
    }

    #[test]
    fn empty_batcher_draws_nothing() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.set_texture(tex(1));
        b.render_ortho(&mut d, None, None, None).unwrap();
        assert_eq!(d.backend().stats().draws, 0);
    }

    #[test]
    fn scissor_override_wins() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.set_scissor(Some(RectI::new(0, 0, 8, 8)));
        b.rect(Rect::new(0.0, 0.0, 4.0, 4.0), Color::RED);

        let clip = RectI::new(1, 2, 3, 4);
        b.render(&mut d, None, Mat4::IDENTITY, Some(clip)).unwrap();
        assert!(d.backend().commands().contains(&RenderCommand::SetScissor(clip)));
        assert!(!d.backend().commands().contains(&RenderCommand::SetScissor(RectI::new(0, 0, 8, 8))));
    }

    #[test]
    fn projection_reaches_vertex_uniform() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 4.0, 4.0), Color::RED);

        let matrix = Mat4::from_scale(glam::Vec3::splat(0.5));
        b.render(&mut d, None, matrix, None).unwrap();

        let pushed = d.backend().commands().iter().any(|c| {
            matches!(c, RenderCommand::PushUniform { stage: crate::device::ShaderStage::Vertex, slot: 0, data }
                if data.as_slice() == bytemuck::bytes_of(&matrix))
        });
        assert!(pushed);
    }

    #[test]
    fn upload_skips_clean_geometry() {
        let mut d = device();
        let mut b = Batcher::new(&mut d).unwrap();
        b.rect(Rect::new(0.0, 0.0, 4.0, 4.0), Color::RED);
        b.upload(&mut d).unwrap();
        assert!(!b.dirty);

        let copies = d.backend().stats().copies;
        b.render_ortho(&mut d, None, None, None).unwrap();
        assert_eq!(d.backend().stats().copies, copies);
    }

    #[test]
    fn dispose_releases_shader_and_mesh() {
        let mut d = device();
        let before = d.backend().stats();
        let b = Batcher::new(&mut d).unwrap();
        b.dispose(&mut d);

        let after = d.backend().stats();
        assert_eq!(after.shaders_destroyed - before.shaders_destroyed, 1);
        assert_eq!(after.buffers_destroyed - before.buffers_destroyed, 2);
    }
}
