//! Per-primitive-kind batches: tessellation into vertex/index records plus
//! the draw paths that flush them.
//!
//! Each batch owns two [`VecBuffer`]s — one per opacity bucket — and, once
//! it has actually been drawn, the GL program and vertex-array state for
//! its layout. Submission (`add_*`) is pure CPU work: it tessellates the
//! shape and appends records. The first draw call lazily builds the GL
//! side; if that fails (shader compile/link, resource creation) the error
//! is logged once and the batch renders as a no-op from then on.
//!
//! Buffer disciplines follow the drawing addressing mode:
//!
//! * Vertex-array batches keep their opaque bucket in
//!   [`Growth::FromFront`] and their alpha bucket in [`Growth::FromBack`];
//!   the alpha bucket must grow upward so that the ranges recorded by the
//!   alpha-ordering machinery stay valid as more shapes arrive.
//! * The outline batch stores vertices [`Growth::FromBack`] in both
//!   buckets, because its index values reference absolute vertex slots
//!   and must not shift when the buffer grows.

use std::sync::Arc;

use glow::HasContext;

use crate::buffer::{Growth, VecBuffer};
use crate::gl::{BatchProgram, BufferObject, VertexStream, POINT_LAYOUT, SHAPE_LAYOUT, TEXTURE_LAYOUT};
use crate::shaders;
use crate::texture::Texture;

/// The primitive kinds the batching layer distinguishes.
///
/// Batches never merge across kinds; each kind has its own vertex layout,
/// shader, and draw topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Single-vertex points.
    Pixel,
    /// Two-vertex line segments.
    Line,
    /// Filled triangles.
    Tri,
    /// Filled axis-aligned rectangles (rotated in the shader).
    Rect,
    /// Filled ellipses, adaptively tessellated.
    Oval,
    /// Outline shapes drawn as indexed line loops.
    Lined,
    /// Textured quads (one batch per distinct texture).
    Texture,
}

/// Floats per vertex in the point layout (position + color).
pub(crate) const FLOATS_PER_POINT_VERTEX: usize = 7;
/// Floats per vertex in the shape layout (position + color + rotation).
pub(crate) const FLOATS_PER_SHAPE_VERTEX: usize = 10;
/// Floats per vertex in the textured layout (position + color + uv + rotation).
pub(crate) const FLOATS_PER_TEXTURE_VERTEX: usize = 12;

/// Sentinel index emitted after each outline loop so a single
/// `GL_LINE_LOOP` draw renders many disjoint outlines. Matches the fixed
/// restart index enabled via `GL_PRIMITIVE_RESTART_FIXED_INDEX`.
pub(crate) const PRIMITIVE_RESTART: u32 = u32::MAX;

/// Squared chord deviation (in pixels²) below which oval subdivision
/// stops. Larger values produce coarser ellipses.
pub(crate) const OVAL_FLATNESS_SQ: f32 = 2.0;

/// Hard bound on oval subdivision depth. The deviation test terminates on
/// its own for every finite input; this is a backstop against degenerate
/// radii (NaN, infinities).
pub(crate) const OVAL_MAX_DEPTH: u32 = 20;

/// Build one shape-layout vertex: `[x, y, z, r, g, b, a, cx, cy, angle]`.
///
/// `tail` is the per-shape constant part `[z, r, g, b, a, cx, cy, angle]`.
fn shape_vertex(x: f32, y: f32, tail: &[f32; 8]) -> [f32; 10] {
    [
        x, y, tail[0], tail[1], tail[2], tail[3], tail[4], tail[5], tail[6], tail[7],
    ]
}

/// A point on the ellipse boundary together with its parameter angle.
#[derive(Clone, Copy)]
struct ArcPoint {
    x: f32,
    y: f32,
    angle: f32,
}

fn ellipse_point(x: f32, y: f32, rx: f32, ry: f32, angle: f32) -> ArcPoint {
    ArcPoint {
        x: x + rx * angle.cos(),
        y: y + ry * angle.sin(),
        angle,
    }
}

/// Squared distance between the chord midpoint of `p0..p1` and the arc
/// point `p2` — the "maximum deviation" metric driving subdivision.
fn chord_deviation_sq(p0: ArcPoint, p1: ArcPoint, p2: ArcPoint) -> f32 {
    let mx = (p0.x + p1.x) / 2.0;
    let my = (p0.y + p1.y) / 2.0;
    (mx - p2.x) * (mx - p2.x) + (my - p2.y) * (my - p2.y)
}

/// Lazily-created GL state for a vertex-array batch.
struct ShapeGl {
    program: BatchProgram,
    opaque: VertexStream,
    alpha: VertexStream,
}

enum ShapeState {
    Pending,
    Ready(ShapeGl),
    Failed,
}

/// Build the GL side of a vertex-array batch on first use.
///
/// On failure the error is logged and the state latches to `Failed`;
/// subsequent draws return `None` without retrying.
///
/// # Safety
///
/// Requires a current GL context.
unsafe fn ensure_shape_gl<'a>(
    state: &'a mut ShapeState,
    gl: &Arc<glow::Context>,
    label: &str,
    vertex_src: &str,
    fragment_src: &str,
    stride: usize,
    layout: &[crate::gl::VertexAttrib],
) -> Option<&'a mut ShapeGl> {
    if matches!(state, ShapeState::Pending) {
        let built = unsafe { BatchProgram::build(gl, label, vertex_src, fragment_src) }.and_then(
            |program| {
                let opaque = unsafe { VertexStream::new(gl, stride, layout)? };
                let alpha = unsafe { VertexStream::new(gl, stride, layout)? };
                Ok(ShapeGl {
                    program,
                    opaque,
                    alpha,
                })
            },
        );
        *state = match built {
            Ok(ready) => ShapeState::Ready(ready),
            Err(e) => {
                log::error!("{label}: disabling batch after GL setup failure: {e}");
                ShapeState::Failed
            }
        };
    }
    match state {
        ShapeState::Ready(ready) => Some(ready),
        _ => None,
    }
}

/// A batch for one of the non-indexed kinds: pixel, line, tri, rect, oval.
pub(crate) struct ShapeBatch {
    kind: PrimitiveKind,
    floats_per_vertex: usize,
    mode: u32,
    opaque: VecBuffer<f32>,
    alpha: VecBuffer<f32>,
    state: ShapeState,
}

impl ShapeBatch {
    /// Create the CPU side of a batch. No GL work happens here.
    pub fn new(kind: PrimitiveKind) -> Self {
        let (floats_per_vertex, mode, initial_vertices) = match kind {
            PrimitiveKind::Pixel => (FLOATS_PER_POINT_VERTEX, glow::POINTS, 1),
            PrimitiveKind::Line => (FLOATS_PER_SHAPE_VERTEX, glow::LINES, 2),
            PrimitiveKind::Tri => (FLOATS_PER_SHAPE_VERTEX, glow::TRIANGLES, 3),
            PrimitiveKind::Rect => (FLOATS_PER_SHAPE_VERTEX, glow::TRIANGLES, 6),
            PrimitiveKind::Oval => (FLOATS_PER_SHAPE_VERTEX, glow::TRIANGLES, 12),
            PrimitiveKind::Lined | PrimitiveKind::Texture => {
                unreachable!("lined/texture kinds have dedicated batch types")
            }
        };
        let initial = floats_per_vertex * initial_vertices;
        Self {
            kind,
            floats_per_vertex,
            mode,
            opaque: VecBuffer::new(initial, floats_per_vertex, Growth::FromFront),
            alpha: VecBuffer::new(initial, floats_per_vertex, Growth::FromBack),
            state: ShapeState::Pending,
        }
    }

    fn bucket(&mut self, alpha_component: f32) -> &mut VecBuffer<f32> {
        // The one place the opacity routing decision is made for shapes.
        if alpha_component < 1.0 {
            &mut self.alpha
        } else {
            &mut self.opaque
        }
    }

    /// Append one point vertex.
    pub fn add_pixel(&mut self, x: f32, y: f32, z: f32, color: [f32; 4]) {
        debug_assert_eq!(self.kind, PrimitiveKind::Pixel);
        let [r, g, b, a] = color;
        self.bucket(a).add(&[x, y, z, r, g, b, a]);
    }

    /// Append one two-vertex line segment.
    #[allow(clippy::too_many_arguments)]
    pub fn add_line(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        debug_assert_eq!(self.kind, PrimitiveKind::Line);
        let tail = tail_of(z, color, pivot);
        let segment = [shape_vertex(x0, y0, &tail), shape_vertex(x1, y1, &tail)];
        self.bucket(color[3]).add(bytemuck::cast_slice(&segment));
    }

    /// Append one filled triangle.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tri(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        debug_assert_eq!(self.kind, PrimitiveKind::Tri);
        let tail = tail_of(z, color, pivot);
        let tri = [
            shape_vertex(x0, y0, &tail),
            shape_vertex(x1, y1, &tail),
            shape_vertex(x2, y2, &tail),
        ];
        self.bucket(color[3]).add(bytemuck::cast_slice(&tri));
    }

    /// Append one filled rectangle as two triangles.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        debug_assert_eq!(self.kind, PrimitiveKind::Rect);
        let tail = tail_of(z, color, pivot);
        let quad = [
            shape_vertex(x, y, &tail),
            shape_vertex(x + w, y, &tail),
            shape_vertex(x + w, y + h, &tail),
            shape_vertex(x, y, &tail),
            shape_vertex(x + w, y + h, &tail),
            shape_vertex(x, y + h, &tail),
        ];
        self.bucket(color[3]).add(bytemuck::cast_slice(&quad));
    }

    /// Append a filled ellipse.
    ///
    /// Starts from the inscribed quad at the four cardinal points, then
    /// adaptively bisects each quarter arc: a segment is split while the
    /// arc midpoint deviates from the chord midpoint by more than
    /// [`OVAL_FLATNESS_SQ`]. High-curvature regions get more triangles;
    /// nearly-flat stretches terminate early.
    #[allow(clippy::too_many_arguments)]
    pub fn add_oval(
        &mut self,
        x: f32,
        y: f32,
        x_radius: f32,
        y_radius: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        debug_assert_eq!(self.kind, PrimitiveKind::Oval);
        let tail = tail_of(z, color, pivot);
        let buf = self.bucket(color[3]);

        let quarter = std::f32::consts::FRAC_PI_2;
        let p0 = ellipse_point(x, y, x_radius, y_radius, 0.0);
        let p1 = ellipse_point(x, y, x_radius, y_radius, quarter);
        let p2 = ellipse_point(x, y, x_radius, y_radius, 2.0 * quarter);
        let p3 = ellipse_point(x, y, x_radius, y_radius, 3.0 * quarter);
        // Reusing p0's coordinates at the 360° parameter keeps the final
        // arc seam exactly closed.
        let p4 = ArcPoint {
            angle: 4.0 * quarter,
            ..p0
        };

        let quad = [
            shape_vertex(p0.x, p0.y, &tail),
            shape_vertex(p1.x, p1.y, &tail),
            shape_vertex(p2.x, p2.y, &tail),
            shape_vertex(p0.x, p0.y, &tail),
            shape_vertex(p2.x, p2.y, &tail),
            shape_vertex(p3.x, p3.y, &tail),
        ];
        buf.add(bytemuck::cast_slice(&quad));

        fill_arc(buf, x, y, x_radius, y_radius, &tail, p0, p1, 0);
        fill_arc(buf, x, y, x_radius, y_radius, &tail, p1, p2, 0);
        fill_arc(buf, x, y, x_radius, y_radius, &tail, p2, p3, 0);
        fill_arc(buf, x, y, x_radius, y_radius, &tail, p3, p4, 0);
    }

    /// Live float count in the opaque bucket.
    pub fn size_opaque(&self) -> usize {
        self.opaque.size()
    }

    /// Live float count in the alpha bucket.
    pub fn size_alpha(&self) -> usize {
        self.alpha.size()
    }

    /// Vertices in the opaque bucket.
    pub fn vertex_count_opaque(&self) -> usize {
        self.size_opaque() / self.floats_per_vertex
    }

    /// Vertices in the alpha bucket.
    pub fn vertex_count_alpha(&self) -> usize {
        self.size_alpha() / self.floats_per_vertex
    }

    /// Reset both buckets for a new frame.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.alpha.clear();
    }

    #[cfg(test)]
    pub fn opaque_live(&self) -> &[f32] {
        self.opaque.live()
    }

    #[cfg(test)]
    pub fn alpha_live(&self) -> &[f32] {
        self.alpha.live()
    }

    fn shader_sources(&self) -> (&'static str, &'static str, &'static [crate::gl::VertexAttrib]) {
        if self.kind == PrimitiveKind::Pixel {
            (shaders::POINT_VERTEX_SRC, shaders::FLAT_FRAGMENT_SRC, POINT_LAYOUT)
        } else {
            (shaders::SHAPE_VERTEX_SRC, shaders::FLAT_FRAGMENT_SRC, SHAPE_LAYOUT)
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            PrimitiveKind::Pixel => "PixelBatch",
            PrimitiveKind::Line => "LineBatch",
            PrimitiveKind::Tri => "TriBatch",
            PrimitiveKind::Rect => "RectBatch",
            PrimitiveKind::Oval => "OvalBatch",
            PrimitiveKind::Lined => "LinedBatch",
            PrimitiveKind::Texture => "TextureBatch",
        }
    }

    /// Draw the entire opaque bucket in one call.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_opaque(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
    ) {
        if self.opaque.is_empty() {
            return;
        }
        let (vert, frag, layout) = self.shader_sources();
        let label = self.label();
        let stride = self.floats_per_vertex;
        let Some(state) =
            (unsafe { ensure_shape_gl(&mut self.state, gl, label, vert, frag, stride, layout) })
        else {
            return;
        };
        self.opaque.sync(&mut state.opaque.vbo);
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.bind_vertex_array(Some(state.opaque.vao));
            gl.draw_arrays(
                self.mode,
                to_gl_count(self.opaque.front() / stride),
                to_gl_count(self.opaque.size() / stride),
            );
            gl.bind_vertex_array(None);
        }
    }

    /// Draw `count_floats` worth of the alpha bucket starting at float
    /// offset `first_floats`, as recorded by the alpha-ordering machinery.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_alpha(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
        first_floats: usize,
        count_floats: usize,
    ) {
        if self.alpha.is_empty() || count_floats == 0 {
            return;
        }
        let (vert, frag, layout) = self.shader_sources();
        let label = self.label();
        let stride = self.floats_per_vertex;
        let Some(state) =
            (unsafe { ensure_shape_gl(&mut self.state, gl, label, vert, frag, stride, layout) })
        else {
            return;
        };
        self.alpha.sync(&mut state.alpha.vbo);
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.bind_vertex_array(Some(state.alpha.vao));
            gl.draw_arrays(
                self.mode,
                to_gl_count(first_floats / stride),
                to_gl_count(count_floats / stride),
            );
            gl.bind_vertex_array(None);
        }
    }
}

fn tail_of(z: f32, color: [f32; 4], pivot: [f32; 3]) -> [f32; 8] {
    [
        z, color[0], color[1], color[2], color[3], pivot[0], pivot[1], pivot[2],
    ]
}

/// Vertex/element counts stay tiny relative to `i32`.
#[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn to_gl_count(value: usize) -> i32 {
    value as i32
}

/// Recursively fill the sliver between the chord `p0..p1` and the arc,
/// emitting one triangle per bisection step.
#[allow(clippy::too_many_arguments)]
fn fill_arc(
    buf: &mut VecBuffer<f32>,
    x: f32,
    y: f32,
    rx: f32,
    ry: f32,
    tail: &[f32; 8],
    p0: ArcPoint,
    p1: ArcPoint,
    depth: u32,
) {
    let mid = ellipse_point(x, y, rx, ry, (p0.angle + p1.angle) / 2.0);

    let tri = [
        shape_vertex(p0.x, p0.y, tail),
        shape_vertex(mid.x, mid.y, tail),
        shape_vertex(p1.x, p1.y, tail),
    ];
    buf.add(bytemuck::cast_slice(&tri));

    if chord_deviation_sq(p0, p1, mid) > OVAL_FLATNESS_SQ && depth < OVAL_MAX_DEPTH {
        fill_arc(buf, x, y, rx, ry, tail, p0, mid, depth + 1);
        fill_arc(buf, x, y, rx, ry, tail, p1, mid, depth + 1);
    }
}

/// Collect the outline polyline of a quarter arc in parameter order.
///
/// In-order traversal: refine the left half, emit the midpoint, refine the
/// right half. Endpoints are contributed by the caller.
fn outline_arc(
    points: &mut Vec<ArcPoint>,
    x: f32,
    y: f32,
    rx: f32,
    ry: f32,
    p0: ArcPoint,
    p1: ArcPoint,
    depth: u32,
) {
    let mid = ellipse_point(x, y, rx, ry, (p0.angle + p1.angle) / 2.0);
    if chord_deviation_sq(p0, p1, mid) > OVAL_FLATNESS_SQ && depth < OVAL_MAX_DEPTH {
        outline_arc(points, x, y, rx, ry, p0, mid, depth + 1);
        points.push(mid);
        outline_arc(points, x, y, rx, ry, mid, p1, depth + 1);
    }
}

/// Lazily-created GL state for the outline batch: each bucket pairs a
/// vertex stream with an element buffer.
struct LinedGl {
    program: BatchProgram,
    opaque: VertexStream,
    opaque_ebo: BufferObject,
    alpha: VertexStream,
    alpha_ebo: BufferObject,
}

enum LinedState {
    Pending,
    Ready(LinedGl),
    Failed,
}

/// The outline batch: triangles, rectangles, and ovals drawn as indexed
/// line loops, many per draw call thanks to the restart sentinel.
pub(crate) struct LinedBatch {
    opaque_vertices: VecBuffer<f32>,
    opaque_indices: VecBuffer<u32>,
    alpha_vertices: VecBuffer<f32>,
    alpha_indices: VecBuffer<u32>,
    state: LinedState,
}

impl LinedBatch {
    /// Create the CPU side of the outline batch.
    pub fn new() -> Self {
        let stride = FLOATS_PER_SHAPE_VERTEX;
        Self {
            // Index values reference absolute vertex slots, so vertex
            // storage must grow from the back in both buckets.
            opaque_vertices: VecBuffer::new(stride * 4, stride, Growth::FromBack),
            opaque_indices: VecBuffer::new(1, 1, Growth::FromFront),
            alpha_vertices: VecBuffer::new(stride * 4, stride, Growth::FromBack),
            alpha_indices: VecBuffer::new(1, 1, Growth::FromBack),
            state: LinedState::Pending,
        }
    }

    fn buckets(&mut self, alpha_component: f32) -> (&mut VecBuffer<f32>, &mut VecBuffer<u32>) {
        if alpha_component < 1.0 {
            (&mut self.alpha_vertices, &mut self.alpha_indices)
        } else {
            (&mut self.opaque_vertices, &mut self.opaque_indices)
        }
    }

    /// Append a triangle outline.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tri(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        let tail = tail_of(z, color, pivot);
        let (vertices, indices) = self.buckets(color[3]);
        let base = vertex_base(vertices);
        indices.add(&[base, base + 1, base + 2, PRIMITIVE_RESTART]);
        let loop_vertices = [
            shape_vertex(x0, y0, &tail),
            shape_vertex(x1, y1, &tail),
            shape_vertex(x2, y2, &tail),
        ];
        vertices.add(bytemuck::cast_slice(&loop_vertices));
    }

    /// Append a rectangle outline.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        let tail = tail_of(z, color, pivot);
        let (vertices, indices) = self.buckets(color[3]);
        let base = vertex_base(vertices);
        indices.add(&[base, base + 1, base + 2, base + 3, PRIMITIVE_RESTART]);
        let loop_vertices = [
            shape_vertex(x, y, &tail),
            shape_vertex(x + w, y, &tail),
            shape_vertex(x + w, y + h, &tail),
            shape_vertex(x, y + h, &tail),
        ];
        vertices.add(bytemuck::cast_slice(&loop_vertices));
    }

    /// Append an ellipse outline, adaptively subdivided with the same
    /// deviation metric as the filled oval.
    #[allow(clippy::too_many_arguments)]
    pub fn add_oval(
        &mut self,
        x: f32,
        y: f32,
        x_radius: f32,
        y_radius: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        let tail = tail_of(z, color, pivot);

        let quarter = std::f32::consts::FRAC_PI_2;
        let cardinals = [
            ellipse_point(x, y, x_radius, y_radius, 0.0),
            ellipse_point(x, y, x_radius, y_radius, quarter),
            ellipse_point(x, y, x_radius, y_radius, 2.0 * quarter),
            ellipse_point(x, y, x_radius, y_radius, 3.0 * quarter),
        ];
        let close = ArcPoint {
            angle: 4.0 * quarter,
            ..cardinals[0]
        };

        let mut chain = Vec::new();
        for i in 0..4 {
            let from = cardinals[i];
            let to = if i == 3 { close } else { cardinals[i + 1] };
            chain.push(from);
            outline_arc(&mut chain, x, y, x_radius, y_radius, from, to, 0);
        }

        let (vertices, indices) = self.buckets(color[3]);
        let base = vertex_base(vertices);
        let mut loop_indices: Vec<u32> = (0..chain.len())
            .map(|i| base + to_index(i))
            .collect();
        loop_indices.push(PRIMITIVE_RESTART);
        indices.add(&loop_indices);

        let loop_vertices: Vec<[f32; 10]> = chain
            .iter()
            .map(|p| shape_vertex(p.x, p.y, &tail))
            .collect();
        vertices.add(bytemuck::cast_slice(&loop_vertices));
    }

    /// Live index count in the opaque bucket. Outline sizes are measured
    /// in index elements, because that is the unit the draw call takes.
    pub fn size_opaque(&self) -> usize {
        self.opaque_indices.size()
    }

    /// Live index count in the alpha bucket.
    pub fn size_alpha(&self) -> usize {
        self.alpha_indices.size()
    }

    /// Index count doubles as the vertex-count diagnostic for outlines.
    pub fn vertex_count_opaque(&self) -> usize {
        self.size_opaque()
    }

    /// Index count doubles as the vertex-count diagnostic for outlines.
    pub fn vertex_count_alpha(&self) -> usize {
        self.size_alpha()
    }

    /// Reset all four buffers for a new frame.
    pub fn clear(&mut self) {
        self.opaque_vertices.clear();
        self.opaque_indices.clear();
        self.alpha_vertices.clear();
        self.alpha_indices.clear();
    }

    #[cfg(test)]
    pub fn alpha_indices_live(&self) -> &[u32] {
        self.alpha_indices.live()
    }

    #[cfg(test)]
    pub fn alpha_vertices_live(&self) -> &[f32] {
        self.alpha_vertices.live()
    }

    /// Draw every opaque outline in one restart-separated call.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_opaque(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
    ) {
        if self.opaque_indices.is_empty() {
            return;
        }
        let first = self.opaque_indices.front();
        let count = self.opaque_indices.size();
        let Some(state) = (unsafe { ensure_lined_gl(&mut self.state, gl) }) else {
            return;
        };
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.enable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
            // The VAO must be bound before the index sync: element-array
            // binding is VAO state.
            gl.bind_vertex_array(Some(state.opaque.vao));
            self.opaque_vertices.sync(&mut state.opaque.vbo);
            self.opaque_indices.sync(&mut state.opaque_ebo);
            gl.draw_elements(
                glow::LINE_LOOP,
                to_gl_count(count),
                glow::UNSIGNED_INT,
                to_gl_count(first * std::mem::size_of::<u32>()),
            );
            gl.bind_vertex_array(None);
            gl.disable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
        }
    }

    /// Draw `count` alpha indices starting at element `first`.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_alpha(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
        first: usize,
        count: usize,
    ) {
        if self.alpha_indices.is_empty() || count == 0 {
            return;
        }
        let Some(state) = (unsafe { ensure_lined_gl(&mut self.state, gl) }) else {
            return;
        };
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.enable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
            // The VAO must be bound before the index sync: element-array
            // binding is VAO state.
            gl.bind_vertex_array(Some(state.alpha.vao));
            self.alpha_vertices.sync(&mut state.alpha.vbo);
            self.alpha_indices.sync(&mut state.alpha_ebo);
            gl.draw_elements(
                glow::LINE_LOOP,
                to_gl_count(count),
                glow::UNSIGNED_INT,
                to_gl_count(first * std::mem::size_of::<u32>()),
            );
            gl.bind_vertex_array(None);
            gl.disable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
        }
    }
}

/// Build the GL side of the outline batch on first use, latching to
/// `Failed` (with one error log) if the driver refuses.
///
/// # Safety
///
/// Requires a current GL context.
unsafe fn ensure_lined_gl<'a>(
    state: &'a mut LinedState,
    gl: &Arc<glow::Context>,
) -> Option<&'a mut LinedGl> {
    if matches!(state, LinedState::Pending) {
        let built = unsafe {
            BatchProgram::build(
                gl,
                "LinedBatch",
                shaders::SHAPE_VERTEX_SRC,
                shaders::FLAT_FRAGMENT_SRC,
            )
        }
        .and_then(|program| {
            let (opaque, opaque_ebo) =
                unsafe { VertexStream::new_indexed(gl, FLOATS_PER_SHAPE_VERTEX, SHAPE_LAYOUT)? };
            let (alpha, alpha_ebo) =
                unsafe { VertexStream::new_indexed(gl, FLOATS_PER_SHAPE_VERTEX, SHAPE_LAYOUT)? };
            Ok(LinedGl {
                program,
                opaque,
                opaque_ebo,
                alpha,
                alpha_ebo,
            })
        });
        *state = match built {
            Ok(ready) => LinedState::Ready(ready),
            Err(e) => {
                log::error!("LinedBatch: disabling batch after GL setup failure: {e}");
                LinedState::Failed
            }
        };
    }
    match state {
        LinedState::Ready(ready) => Some(ready),
        _ => None,
    }
}

fn vertex_base(vertices: &VecBuffer<f32>) -> u32 {
    to_index(vertices.size() / FLOATS_PER_SHAPE_VERTEX)
}

/// Vertex slot counts stay far below `u32::MAX` (the restart sentinel).
#[expect(clippy::cast_possible_truncation)]
fn to_index(value: usize) -> u32 {
    value as u32
}

/// Lazily-created GL state for a texture batch.
struct TextureGl {
    program: BatchProgram,
    u_texture: Option<glow::UniformLocation>,
    opaque: VertexStream,
    alpha: VertexStream,
}

enum TextureState {
    Pending,
    Ready(TextureGl),
    Failed,
}

/// A batch of quads sampling one particular texture.
pub(crate) struct TextureBatch {
    texture: glow::Texture,
    x_px_unit: f32,
    y_px_unit: f32,
    fully_opaque: bool,
    opaque: VecBuffer<f32>,
    alpha: VecBuffer<f32>,
    state: TextureState,
}

impl TextureBatch {
    /// Create a batch for the given texture, caching the texel-to-UV
    /// conversion factors and the opacity flag.
    #[expect(clippy::cast_precision_loss)]
    pub fn new(texture: &Texture) -> Self {
        let stride = FLOATS_PER_TEXTURE_VERTEX;
        Self {
            texture: texture.raw(),
            x_px_unit: 1.0 / texture.width() as f32,
            y_px_unit: 1.0 / texture.height() as f32,
            fully_opaque: texture.fully_opaque(),
            opaque: VecBuffer::new(stride * 6, stride, Growth::FromFront),
            alpha: VecBuffer::new(stride * 6, stride, Growth::FromBack),
            state: TextureState::Pending,
        }
    }

    /// Whether quads with an opaque tint can skip blending entirely.
    pub fn fully_opaque(&self) -> bool {
        self.fully_opaque
    }

    /// Append one textured quad. `tx..th` select the texel sub-rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        tx: f32,
        ty: f32,
        tw: f32,
        th: f32,
        z: f32,
        color: [f32; 4],
        pivot: [f32; 3],
    ) {
        let [r, g, b, a] = color;
        let [cx, cy, angle] = pivot;
        let (u0, v0) = (self.x_px_unit * tx, self.y_px_unit * ty);
        let (u1, v1) = (self.x_px_unit * (tx + tw), self.y_px_unit * (ty + th));

        let vertex = |px: f32, py: f32, u: f32, v: f32| -> [f32; 12] {
            [px, py, z, r, g, b, a, u, v, cx, cy, angle]
        };
        let quad = [
            vertex(x, y, u0, v0),
            vertex(x + w, y, u1, v0),
            vertex(x + w, y + h, u1, v1),
            vertex(x, y, u0, v0),
            vertex(x + w, y + h, u1, v1),
            vertex(x, y + h, u0, v1),
        ];

        // Translucency can come from the tint or from the texture itself.
        let buf = if a < 1.0 || !self.fully_opaque {
            &mut self.alpha
        } else {
            &mut self.opaque
        };
        buf.add(bytemuck::cast_slice(&quad));
    }

    /// Live float count in the opaque bucket.
    pub fn size_opaque(&self) -> usize {
        self.opaque.size()
    }

    /// Live float count in the alpha bucket.
    pub fn size_alpha(&self) -> usize {
        self.alpha.size()
    }

    /// Vertices in the opaque bucket.
    pub fn vertex_count_opaque(&self) -> usize {
        self.size_opaque() / FLOATS_PER_TEXTURE_VERTEX
    }

    /// Vertices in the alpha bucket.
    pub fn vertex_count_alpha(&self) -> usize {
        self.size_alpha() / FLOATS_PER_TEXTURE_VERTEX
    }

    /// Reset both buckets for a new frame.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.alpha.clear();
    }

    #[cfg(test)]
    pub fn alpha_live(&self) -> &[f32] {
        self.alpha.live()
    }

    /// Draw the entire opaque bucket with the texture bound.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_opaque(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
    ) {
        if self.opaque.is_empty() {
            return;
        }
        let texture = self.texture;
        let first = self.opaque.front() / FLOATS_PER_TEXTURE_VERTEX;
        let count = self.opaque.size() / FLOATS_PER_TEXTURE_VERTEX;
        let Some(state) = (unsafe { ensure_texture_gl(&mut self.state, gl) }) else {
            return;
        };
        self.opaque.sync(&mut state.opaque.vbo);
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.uniform_1_i32(state.u_texture.as_ref(), 0);
            gl.bind_vertex_array(Some(state.opaque.vao));
            gl.draw_arrays(glow::TRIANGLES, to_gl_count(first), to_gl_count(count));
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    /// Draw a recorded alpha sub-range with the texture bound.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_alpha(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
        first_floats: usize,
        count_floats: usize,
    ) {
        if self.alpha.is_empty() || count_floats == 0 {
            return;
        }
        let texture = self.texture;
        let Some(state) = (unsafe { ensure_texture_gl(&mut self.state, gl) }) else {
            return;
        };
        self.alpha.sync(&mut state.alpha.vbo);
        unsafe {
            state.program.bind(gl, z_max, projection);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.uniform_1_i32(state.u_texture.as_ref(), 0);
            gl.bind_vertex_array(Some(state.alpha.vao));
            gl.draw_arrays(
                glow::TRIANGLES,
                to_gl_count(first_floats / FLOATS_PER_TEXTURE_VERTEX),
                to_gl_count(count_floats / FLOATS_PER_TEXTURE_VERTEX),
            );
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }
}

/// Build the GL side of a texture batch on first use, latching to
/// `Failed` (with one error log) if the driver refuses.
///
/// # Safety
///
/// Requires a current GL context.
unsafe fn ensure_texture_gl<'a>(
    state: &'a mut TextureState,
    gl: &Arc<glow::Context>,
) -> Option<&'a mut TextureGl> {
    if matches!(state, TextureState::Pending) {
        let built = unsafe {
            BatchProgram::build(
                gl,
                "TextureBatch",
                shaders::TEXTURE_VERTEX_SRC,
                shaders::TEXTURE_FRAGMENT_SRC,
            )
        }
        .and_then(|program| {
            let u_texture = unsafe { gl.get_uniform_location(program.raw, "u_texture") };
            let opaque = unsafe { VertexStream::new(gl, FLOATS_PER_TEXTURE_VERTEX, TEXTURE_LAYOUT)? };
            let alpha = unsafe { VertexStream::new(gl, FLOATS_PER_TEXTURE_VERTEX, TEXTURE_LAYOUT)? };
            Ok(TextureGl {
                program,
                u_texture,
                opaque,
                alpha,
            })
        });
        *state = match built {
            Ok(ready) => TextureState::Ready(ready),
            Err(e) => {
                log::error!("TextureBatch: disabling batch after GL setup failure: {e}");
                TextureState::Failed
            }
        };
    }
    match state {
        TextureState::Ready(ready) => Some(ready),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const OPAQUE: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    const TRANSLUCENT: [f32; 4] = [0.0, 0.0, 1.0, 0.5];
    const NO_PIVOT: [f32; 3] = [0.0, 0.0, 0.0];

    #[test]
    fn opaque_shapes_route_to_opaque_bucket_only() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Rect);
        batch.add_rect(0.0, 0.0, 10.0, 10.0, 1.0, OPAQUE, NO_PIVOT);
        assert_eq!(batch.vertex_count_opaque(), 6);
        assert_eq!(batch.vertex_count_alpha(), 0);
    }

    #[test]
    fn translucent_shapes_route_to_alpha_bucket_only() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Rect);
        batch.add_rect(0.0, 0.0, 10.0, 10.0, 1.0, TRANSLUCENT, NO_PIVOT);
        assert_eq!(batch.vertex_count_opaque(), 0);
        assert_eq!(batch.vertex_count_alpha(), 6);
    }

    #[test]
    fn rect_tessellates_into_two_triangles_with_shared_corners() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Rect);
        batch.add_rect(2.0, 3.0, 4.0, 5.0, 7.0, OPAQUE, [1.0, 1.0, 0.5]);
        let live = batch.opaque_live();
        assert_eq!(live.len(), 60);
        let corners: Vec<(f32, f32)> = live.chunks(10).map(|v| (v[0], v[1])).collect();
        assert_eq!(
            corners,
            vec![
                (2.0, 3.0),
                (6.0, 3.0),
                (6.0, 8.0),
                (2.0, 3.0),
                (6.0, 8.0),
                (2.0, 8.0)
            ]
        );
        // Every vertex carries z, color, and pivot unchanged.
        for v in live.chunks(10) {
            assert_eq!(&v[2..], &[7.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5]);
        }
    }

    #[test]
    fn pixel_vertices_are_seven_floats() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Pixel);
        batch.add_pixel(3.5, 4.5, 2.0, OPAQUE);
        assert_eq!(batch.opaque_live(), &[3.5, 4.5, 2.0, 1.0, 0.0, 0.0, 1.0]);
    }

    fn oval_vertex_count(radius: f32) -> usize {
        let mut batch = ShapeBatch::new(PrimitiveKind::Oval);
        batch.add_oval(0.0, 0.0, radius, radius, 1.0, OPAQUE, NO_PIVOT);
        batch.vertex_count_opaque()
    }

    #[test]
    fn oval_tessellation_terminates_across_radius_range() {
        // Termination is the assertion: any of these hanging would time
        // the test out. Also sanity-check that output is triangles.
        for radius in [1.0, 5.0, 50.0, 250.0, 500.0] {
            assert_eq!(oval_vertex_count(radius) % 3, 0);
        }
    }

    #[test]
    fn oval_vertex_count_grows_with_radius() {
        let counts: Vec<usize> = [1.0, 10.0, 100.0, 500.0]
            .iter()
            .map(|r| oval_vertex_count(*r))
            .collect();
        for pair in counts.windows(2) {
            assert!(pair[0] <= pair[1], "vertex counts not monotonic: {counts:?}");
        }
        // A big circle must be substantially finer than a small one.
        assert!(counts[3] > counts[0] * 4);
    }

    #[test]
    fn oval_vertices_lie_on_the_ellipse() {
        let (cx, cy, rx, ry) = (10.0, 20.0, 80.0, 40.0);
        let mut batch = ShapeBatch::new(PrimitiveKind::Oval);
        batch.add_oval(cx, cy, rx, ry, 1.0, OPAQUE, NO_PIVOT);
        for v in batch.opaque_live().chunks(10) {
            let nx = (v[0] - cx) / rx;
            let ny = (v[1] - cy) / ry;
            let residual = (nx * nx + ny * ny - 1.0).abs();
            assert!(residual < 1e-4, "vertex ({}, {}) off ellipse", v[0], v[1]);
        }
    }

    #[test]
    fn degenerate_oval_radii_hit_the_depth_guard_not_a_hang() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Oval);
        batch.add_oval(0.0, 0.0, f32::NAN, 10.0, 1.0, OPAQUE, NO_PIVOT);
        // NaN deviation comparisons are false, so this terminates at the
        // top level; the depth guard covers inputs that keep comparing
        // true forever.
        assert!(batch.vertex_count_opaque() >= 6);
    }

    #[test]
    fn lined_shapes_emit_restart_separated_index_loops() {
        let mut batch = LinedBatch::new();
        batch.add_tri(0.0, 0.0, 4.0, 0.0, 2.0, 3.0, 1.0, TRANSLUCENT, NO_PIVOT);
        batch.add_rect(1.0, 1.0, 2.0, 2.0, 2.0, TRANSLUCENT, NO_PIVOT);
        assert_eq!(
            batch.alpha_indices_live(),
            &[
                0,
                1,
                2,
                PRIMITIVE_RESTART,
                3,
                4,
                5,
                6,
                PRIMITIVE_RESTART
            ]
        );
        assert_eq!(batch.alpha_vertices_live().len(), 7 * 10);
    }

    #[test]
    fn lined_oval_outline_is_a_single_closed_loop_on_the_ellipse() {
        let mut batch = LinedBatch::new();
        batch.add_oval(0.0, 0.0, 60.0, 30.0, 1.0, TRANSLUCENT, NO_PIVOT);
        let indices = batch.alpha_indices_live();
        let restarts = indices
            .iter()
            .filter(|&&i| i == PRIMITIVE_RESTART)
            .count();
        assert_eq!(restarts, 1);
        assert_eq!(*indices.last().unwrap(), PRIMITIVE_RESTART);
        // More than just the four cardinal points for a big ellipse.
        assert!(indices.len() > 5);
        for v in batch.alpha_vertices_live().chunks(10) {
            let nx = v[0] / 60.0;
            let ny = v[1] / 30.0;
            assert!((nx * nx + ny * ny - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn texture_batch_routes_on_tint_and_texture_opacity() {
        let handle = glow::NativeTexture(std::num::NonZeroU32::new(1).unwrap());
        let opaque_tex = Texture::from_raw(handle, 64, 32, true);
        let translucent_tex = Texture::from_raw(handle, 64, 32, false);

        let mut batch = TextureBatch::new(&opaque_tex);
        batch.add(
            0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 64.0, 32.0, 1.0, OPAQUE, NO_PIVOT,
        );
        assert_eq!(batch.vertex_count_opaque(), 6);
        assert_eq!(batch.vertex_count_alpha(), 0);

        batch.add(
            0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 64.0, 32.0, 2.0, TRANSLUCENT, NO_PIVOT,
        );
        assert_eq!(batch.vertex_count_alpha(), 6);

        // A translucent texture forces the alpha bucket even with an
        // opaque tint.
        let mut batch = TextureBatch::new(&translucent_tex);
        batch.add(
            0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 64.0, 32.0, 1.0, OPAQUE, NO_PIVOT,
        );
        assert_eq!(batch.vertex_count_opaque(), 0);
        assert_eq!(batch.vertex_count_alpha(), 6);
    }

    #[test]
    fn texture_uvs_normalize_the_texel_rectangle() {
        let handle = glow::NativeTexture(std::num::NonZeroU32::new(1).unwrap());
        let tex = Texture::from_raw(handle, 128, 64, false);
        let mut batch = TextureBatch::new(&tex);
        batch.add(
            0.0, 0.0, 8.0, 8.0, 32.0, 16.0, 64.0, 32.0, 1.0, OPAQUE, NO_PIVOT,
        );
        let quad = batch.alpha_live();
        let uv: Vec<(f32, f32)> = quad.chunks(12).map(|v| (v[7], v[8])).collect();
        assert_eq!(
            uv,
            vec![
                (0.25, 0.25),
                (0.75, 0.25),
                (0.75, 0.75),
                (0.25, 0.25),
                (0.75, 0.75),
                (0.25, 0.75)
            ]
        );
    }

    #[test]
    fn clear_resets_every_bucket() {
        let mut batch = ShapeBatch::new(PrimitiveKind::Tri);
        batch.add_tri(0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, OPAQUE, NO_PIVOT);
        batch.add_tri(0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 2.0, TRANSLUCENT, NO_PIVOT);
        batch.clear();
        assert_eq!(batch.size_opaque(), 0);
        assert_eq!(batch.size_alpha(), 0);

        let mut lined = LinedBatch::new();
        lined.add_rect(0.0, 0.0, 1.0, 1.0, 1.0, TRANSLUCENT, NO_PIVOT);
        lined.clear();
        assert_eq!(lined.size_alpha(), 0);
        // Fresh submissions index from zero again.
        lined.add_rect(0.0, 0.0, 1.0, 1.0, 1.0, TRANSLUCENT, NO_PIVOT);
        assert_eq!(lined.alpha_indices_live()[0], 0);
    }
}
