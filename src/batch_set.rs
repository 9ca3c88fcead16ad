//! The batch aggregate for one render surface.
//!
//! A [`BatchSet`] owns one batch per primitive kind (created lazily on
//! first use) plus one texture batch per registered texture, assigns each
//! submitted shape a monotonically increasing z-level, and is the sole
//! authority on cross-batch alpha ordering.
//!
//! Opaque geometry needs no ordering: every shape carries its z-level into
//! the depth test, so one unordered draw per kind composites correctly.
//! Alpha-blended geometry is different — blending is not commutative — so
//! translucent shapes must be replayed in exactly the order they were
//! submitted, even when consecutive shapes belong to different batches.
//!
//! The bookkeeping is a small state machine, reset every [`BatchSet::clear`]:
//! while consecutive alpha submissions stay within one kind (or one
//! texture), they extend the current *open span*. When the kind changes,
//! the open span is closed and recorded as a plain [`AlphaSpan`]; replaying
//! the recorded spans in order, then flushing whichever span is still open,
//! reproduces the submission order exactly. The cost scales with the number
//! of kind switches, not the number of shapes — a long run of same-kind
//! translucent shapes is still one buffer range and one draw call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::batch::{LinedBatch, PrimitiveKind, ShapeBatch, TextureBatch};
use crate::color::Rgba;
use crate::error::Error;
use crate::texture::Texture;

/// Identity of an alpha span: a primitive kind, or one specific texture.
///
/// Texture batches get per-texture identity because each one binds a
/// different texture unit — two quads from different textures can never
/// share a draw call even though they share a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlphaKey {
    /// One of the shape/outline kinds. Never [`PrimitiveKind::Texture`];
    /// textured spans use the other variant.
    Kind(PrimitiveKind),
    /// The texture batch registered under this name.
    Texture(String),
}

/// One contiguous run of alpha geometry, recorded for ordered replay.
///
/// `first` and `count` are in the owning batch's native element units:
/// floats for vertex-array batches, index elements for outlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaSpan {
    /// Which batch the run lives in.
    pub key: AlphaKey,
    /// Element offset of the run's start in that batch's alpha buffer.
    pub first: usize,
    /// Element length of the run.
    pub count: usize,
}

/// All batches active for one render surface, plus the alpha-ordering
/// bookkeeping. See the module docs for the ordering scheme.
pub struct BatchSet {
    z_level: f32,

    pixels: Option<ShapeBatch>,
    lines: Option<ShapeBatch>,
    tris: Option<ShapeBatch>,
    rects: Option<ShapeBatch>,
    ovals: Option<ShapeBatch>,
    lined: Option<LinedBatch>,
    textures: HashMap<String, TextureBatch>,

    last_key: Option<AlphaKey>,
    span_starts: HashMap<AlphaKey, usize>,
    spans: Vec<AlphaSpan>,
}

impl Default for BatchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSet {
    /// Create an empty batch set. No GL work happens here or in any
    /// `add_*` call; GPU resources appear lazily at first draw.
    #[must_use]
    pub fn new() -> Self {
        Self {
            z_level: 1.0,
            pixels: None,
            lines: None,
            tris: None,
            rects: None,
            ovals: None,
            lined: None,
            textures: HashMap::new(),
            last_key: None,
            span_starts: HashMap::new(),
            spans: Vec::new(),
        }
    }

    /// Reset for a new frame: empty every batch, forget all alpha spans,
    /// and restart the z-level epoch. Buffer capacity is retained.
    pub fn clear(&mut self) {
        if let Some(b) = self.pixels.as_mut() {
            b.clear();
        }
        if let Some(b) = self.lines.as_mut() {
            b.clear();
        }
        if let Some(b) = self.tris.as_mut() {
            b.clear();
        }
        if let Some(b) = self.rects.as_mut() {
            b.clear();
        }
        if let Some(b) = self.ovals.as_mut() {
            b.clear();
        }
        if let Some(b) = self.lined.as_mut() {
            b.clear();
        }
        for batch in self.textures.values_mut() {
            batch.clear();
        }

        self.last_key = None;
        self.span_starts.clear();
        self.spans.clear();
        self.z_level = 1.0;
    }

    /// The z value the *next* submission will receive. Starts at 1.0 each
    /// frame and increments by 1 per shape; the draw passes feed it to the
    /// shaders as `u_z_max`.
    #[must_use]
    pub fn z_level(&self) -> f32 {
        self.z_level
    }

    /// Register a texture batch under `name`. Must precede any
    /// [`BatchSet::add_texture`] call for that name.
    pub fn create_texture_batch(&mut self, name: &str, texture: &Texture) {
        self.textures
            .insert(name.to_owned(), TextureBatch::new(texture));
    }

    /// Submit one pixel. Coordinates are nudged by +0.5 so integer inputs
    /// land on texel centers.
    pub fn add_pixel(&mut self, x: f32, y: f32, color: Rgba) {
        if self.pixels.is_none() {
            self.pixels = Some(ShapeBatch::new(PrimitiveKind::Pixel));
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Pixel));
        }
        let z = self.z_level;
        if let Some(batch) = self.pixels.as_mut() {
            batch.add_pixel(x + 0.5, y + 0.5, z, color.to_float());
        }
        self.z_level += 1.0;
    }

    /// Submit one line segment, rotated `angle` degrees about `(cx, cy)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_line(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.lines.is_none() {
            self.lines = Some(ShapeBatch::new(PrimitiveKind::Line));
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Line));
        }
        let z = self.z_level;
        if let Some(batch) = self.lines.as_mut() {
            batch.add_line(
                x0 + 0.5,
                y0 + 0.5,
                x1 + 0.5,
                y1 + 0.5,
                z,
                color.to_float(),
                [cx, cy, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Submit one filled triangle, rotated `angle` degrees about `(cx, cy)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tri(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.tris.is_none() {
            self.tris = Some(ShapeBatch::new(PrimitiveKind::Tri));
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Tri));
        }
        let z = self.z_level;
        if let Some(batch) = self.tris.as_mut() {
            batch.add_tri(
                x0,
                y0,
                x1,
                y1,
                x2,
                y2,
                z,
                color.to_float(),
                [cx, cy, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Submit one filled rectangle, rotated `angle` degrees about `(cx, cy)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.rects.is_none() {
            self.rects = Some(ShapeBatch::new(PrimitiveKind::Rect));
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Rect));
        }
        let z = self.z_level;
        if let Some(batch) = self.rects.as_mut() {
            batch.add_rect(x, y, w, h, z, color.to_float(), [cx, cy, angle.to_radians()]);
        }
        self.z_level += 1.0;
    }

    /// Submit one filled ellipse, rotated `angle` degrees about `(cx, cy)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_oval(
        &mut self,
        x: f32,
        y: f32,
        x_radius: f32,
        y_radius: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.ovals.is_none() {
            self.ovals = Some(ShapeBatch::new(PrimitiveKind::Oval));
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Oval));
        }
        let z = self.z_level;
        if let Some(batch) = self.ovals.as_mut() {
            batch.add_oval(
                x + 0.5,
                y + 0.5,
                x_radius + 0.5,
                y_radius + 0.5,
                z,
                color.to_float(),
                [cx + 0.5, cy + 0.5, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Submit one textured quad from the batch registered under `name`.
    ///
    /// `(tx, ty, tw, th)` select the source texel rectangle. The quad
    /// routes to the alpha bucket if either the tint or the texture itself
    /// is not fully opaque.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBatch`] if `name` was never registered with
    /// [`BatchSet::create_texture_batch`].
    #[allow(clippy::too_many_arguments)]
    pub fn add_texture(
        &mut self,
        name: &str,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        tx: f32,
        ty: f32,
        tw: f32,
        th: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) -> Result<(), Error> {
        let Some(fully_opaque) = self.textures.get(name).map(TextureBatch::fully_opaque) else {
            return Err(Error::UnknownBatch(name.to_owned()));
        };
        if !color.is_opaque() || !fully_opaque {
            self.note_alpha(AlphaKey::Texture(name.to_owned()));
        }
        let z = self.z_level;
        if let Some(batch) = self.textures.get_mut(name) {
            batch.add(
                x,
                y,
                w,
                h,
                tx,
                ty,
                tw,
                th,
                z,
                color.to_float(),
                [cx, cy, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
        Ok(())
    }

    /// Submit a triangle outline.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lined_tri(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.lined.is_none() {
            self.lined = Some(LinedBatch::new());
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Lined));
        }
        let z = self.z_level;
        if let Some(batch) = self.lined.as_mut() {
            batch.add_tri(
                x0 + 0.5,
                y0 + 0.5,
                x1 + 0.5,
                y1 + 0.5,
                x2 + 0.5,
                y2 + 0.5,
                z,
                color.to_float(),
                [cx, cy, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Submit a rectangle outline. The outline hugs the rect's pixel
    /// border, hence the half-texel nudge and the one-pixel shrink.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lined_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.lined.is_none() {
            self.lined = Some(LinedBatch::new());
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Lined));
        }
        let z = self.z_level;
        if let Some(batch) = self.lined.as_mut() {
            batch.add_rect(
                x + 0.5,
                y + 0.5,
                w - 1.0,
                h - 1.0,
                z,
                color.to_float(),
                [cx, cy, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Submit an ellipse outline.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lined_oval(
        &mut self,
        x: f32,
        y: f32,
        x_radius: f32,
        y_radius: f32,
        color: Rgba,
        cx: f32,
        cy: f32,
        angle: f32,
    ) {
        if self.lined.is_none() {
            self.lined = Some(LinedBatch::new());
        }
        if !color.is_opaque() {
            self.note_alpha(AlphaKey::Kind(PrimitiveKind::Lined));
        }
        let z = self.z_level;
        if let Some(batch) = self.lined.as_mut() {
            batch.add_oval(
                x + 0.5,
                y + 0.5,
                x_radius,
                y_radius,
                z,
                color.to_float(),
                [cx + 0.5, cy + 0.5, angle.to_radians()],
            );
        }
        self.z_level += 1.0;
    }

    /// Vertices currently in the opaque bucket of `kind` (summed over all
    /// texture batches for [`PrimitiveKind::Texture`]). Diagnostic counters
    /// for overlay display.
    #[must_use]
    pub fn vertex_count_opaque(&self, kind: PrimitiveKind) -> usize {
        match kind {
            PrimitiveKind::Pixel => self.pixels.as_ref().map_or(0, ShapeBatch::vertex_count_opaque),
            PrimitiveKind::Line => self.lines.as_ref().map_or(0, ShapeBatch::vertex_count_opaque),
            PrimitiveKind::Tri => self.tris.as_ref().map_or(0, ShapeBatch::vertex_count_opaque),
            PrimitiveKind::Rect => self.rects.as_ref().map_or(0, ShapeBatch::vertex_count_opaque),
            PrimitiveKind::Oval => self.ovals.as_ref().map_or(0, ShapeBatch::vertex_count_opaque),
            PrimitiveKind::Lined => self.lined.as_ref().map_or(0, LinedBatch::vertex_count_opaque),
            PrimitiveKind::Texture => self
                .textures
                .values()
                .map(TextureBatch::vertex_count_opaque)
                .sum(),
        }
    }

    /// Vertices currently in the alpha bucket of `kind`; see
    /// [`BatchSet::vertex_count_opaque`].
    #[must_use]
    pub fn vertex_count_alpha(&self, kind: PrimitiveKind) -> usize {
        match kind {
            PrimitiveKind::Pixel => self.pixels.as_ref().map_or(0, ShapeBatch::vertex_count_alpha),
            PrimitiveKind::Line => self.lines.as_ref().map_or(0, ShapeBatch::vertex_count_alpha),
            PrimitiveKind::Tri => self.tris.as_ref().map_or(0, ShapeBatch::vertex_count_alpha),
            PrimitiveKind::Rect => self.rects.as_ref().map_or(0, ShapeBatch::vertex_count_alpha),
            PrimitiveKind::Oval => self.ovals.as_ref().map_or(0, ShapeBatch::vertex_count_alpha),
            PrimitiveKind::Lined => self.lined.as_ref().map_or(0, LinedBatch::vertex_count_alpha),
            PrimitiveKind::Texture => self
                .textures
                .values()
                .map(TextureBatch::vertex_count_alpha)
                .sum(),
        }
    }

    /// The full replay plan for the current frame's alpha geometry: every
    /// recorded span in submission order, followed by the still-open tail
    /// span (if any). Expanding the spans back to shapes reproduces the
    /// exact order translucent shapes were submitted.
    #[must_use]
    pub fn alpha_spans(&self) -> Vec<AlphaSpan> {
        let mut plan = self.spans.clone();
        if let Some(last) = &self.last_key {
            let end = self.alpha_len(last);
            let start = self.span_starts.get(last).copied().unwrap_or(0);
            if end > start {
                plan.push(AlphaSpan {
                    key: last.clone(),
                    first: start,
                    count: end - start,
                });
            }
        }
        plan
    }

    /// Draw every non-empty opaque bucket, one call per batch, in a fixed
    /// kind order. Ordering is irrelevant here: the depth test arbitrates
    /// overlaps via each shape's z-level.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; expects depth testing enabled and
    /// blending disabled, as set up by the frame driver.
    pub unsafe fn draw_opaque(&mut self, gl: &Arc<glow::Context>, projection: &glam::Mat4) {
        let z_max = self.z_level;
        unsafe {
            for batch in self.textures.values_mut() {
                batch.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.ovals.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.rects.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.tris.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.lined.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.lines.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
            if let Some(b) = self.pixels.as_mut() {
                b.draw_opaque(gl, z_max, projection);
            }
        }
    }

    /// Replay the frame's translucent geometry in submission order: every
    /// recorded span, then the still-open tail.
    ///
    /// # Safety
    ///
    /// Requires a current GL context; expects blending enabled and depth
    /// writes disabled, as set up by the frame driver.
    pub unsafe fn draw_alpha(&mut self, gl: &Arc<glow::Context>, projection: &glam::Mat4) {
        let z_max = self.z_level;
        for span in self.alpha_spans() {
            unsafe { self.draw_span(gl, z_max, projection, &span) };
        }
    }

    /// # Safety
    ///
    /// Requires a current GL context.
    unsafe fn draw_span(
        &mut self,
        gl: &Arc<glow::Context>,
        z_max: f32,
        projection: &glam::Mat4,
        span: &AlphaSpan,
    ) {
        unsafe {
            match &span.key {
                AlphaKey::Kind(PrimitiveKind::Pixel) => {
                    if let Some(b) = self.pixels.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Line) => {
                    if let Some(b) = self.lines.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Tri) => {
                    if let Some(b) = self.tris.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Rect) => {
                    if let Some(b) = self.rects.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Oval) => {
                    if let Some(b) = self.ovals.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Lined) => {
                    if let Some(b) = self.lined.as_mut() {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
                AlphaKey::Kind(PrimitiveKind::Texture) => {
                    debug_assert!(false, "textured spans use AlphaKey::Texture");
                }
                AlphaKey::Texture(name) => {
                    if let Some(b) = self.textures.get_mut(name) {
                        b.draw_alpha(gl, z_max, projection, span.first, span.count);
                    }
                }
            }
        }
    }

    /// Record that an alpha shape of identity `key` is about to be
    /// appended. Closes the previous open span when the identity changed.
    fn note_alpha(&mut self, key: AlphaKey) {
        if let Some(last) = self.last_key.clone() {
            if last != key {
                self.close_open_span(&last);
            }
        }
        self.last_key = Some(key);
    }

    /// Record the open span for `key` and mark a fresh span start at the
    /// current end of that batch's alpha buffer.
    fn close_open_span(&mut self, key: &AlphaKey) {
        let end = self.alpha_len(key);
        let start = self.span_starts.get(key).copied().unwrap_or(0);
        if end > start {
            self.spans.push(AlphaSpan {
                key: key.clone(),
                first: start,
                count: end - start,
            });
        }
        self.span_starts.insert(key.clone(), end);
    }

    /// Current element length of the alpha bucket identified by `key`.
    fn alpha_len(&self, key: &AlphaKey) -> usize {
        match key {
            AlphaKey::Kind(PrimitiveKind::Pixel) => {
                self.pixels.as_ref().map_or(0, ShapeBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Line) => {
                self.lines.as_ref().map_or(0, ShapeBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Tri) => {
                self.tris.as_ref().map_or(0, ShapeBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Rect) => {
                self.rects.as_ref().map_or(0, ShapeBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Oval) => {
                self.ovals.as_ref().map_or(0, ShapeBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Lined) => {
                self.lined.as_ref().map_or(0, LinedBatch::size_alpha)
            }
            AlphaKey::Kind(PrimitiveKind::Texture) => 0,
            AlphaKey::Texture(name) => self.textures.get(name).map_or(0, TextureBatch::size_alpha),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::{rgb, rgba};

    const LINE_FLOATS: usize = 2 * 10;
    const TRI_FLOATS: usize = 3 * 10;
    const RECT_FLOATS: usize = 6 * 10;

    fn translucent() -> Rgba {
        rgba(0x0000ff80)
    }

    #[test]
    fn opaque_and_alpha_never_share_a_bucket() {
        let mut set = BatchSet::new();
        set.add_rect(0.0, 0.0, 10.0, 10.0, rgb(0xff0000), 0.0, 0.0, 0.0);
        set.add_rect(5.0, 5.0, 10.0, 10.0, translucent(), 0.0, 0.0, 0.0);
        assert_eq!(set.vertex_count_opaque(PrimitiveKind::Rect), 6);
        assert_eq!(set.vertex_count_alpha(PrimitiveKind::Rect), 6);
    }

    #[test]
    fn one_opaque_one_alpha_rect_yields_one_draw_each() {
        // End-to-end scenario: red opaque rect, then translucent blue rect.
        let mut set = BatchSet::new();
        set.add_rect(0.0, 0.0, 10.0, 10.0, rgb(0xff0000), 0.0, 0.0, 0.0);
        set.add_rect(5.0, 5.0, 10.0, 10.0, translucent(), 0.0, 0.0, 0.0);

        let spans = set.alpha_spans();
        assert_eq!(
            spans,
            vec![AlphaSpan {
                key: AlphaKey::Kind(PrimitiveKind::Rect),
                first: 0,
                count: RECT_FLOATS,
            }]
        );
        assert_eq!(set.vertex_count_opaque(PrimitiveKind::Rect), 6);
    }

    #[test]
    fn alpha_order_is_preserved_across_kind_switches() {
        // K1-A, K2-B, K1-C, K3-D: K1's geometry must split into two
        // non-contiguous spans that still replay in submission order.
        let mut set = BatchSet::new();
        set.add_line(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0); // A
        set.add_tri(0.0, 0.0, 1.0, 0.0, 0.0, 1.0, translucent(), 0.0, 0.0, 0.0); // B
        set.add_line(2.0, 2.0, 3.0, 3.0, translucent(), 0.0, 0.0, 0.0); // C
        set.add_rect(0.0, 0.0, 4.0, 4.0, translucent(), 0.0, 0.0, 0.0); // D

        let spans = set.alpha_spans();
        assert_eq!(
            spans,
            vec![
                AlphaSpan {
                    key: AlphaKey::Kind(PrimitiveKind::Line),
                    first: 0,
                    count: LINE_FLOATS,
                },
                AlphaSpan {
                    key: AlphaKey::Kind(PrimitiveKind::Tri),
                    first: 0,
                    count: TRI_FLOATS,
                },
                AlphaSpan {
                    key: AlphaKey::Kind(PrimitiveKind::Line),
                    first: LINE_FLOATS,
                    count: LINE_FLOATS,
                },
                AlphaSpan {
                    key: AlphaKey::Kind(PrimitiveKind::Rect),
                    first: 0,
                    count: RECT_FLOATS,
                },
            ]
        );
    }

    #[test]
    fn same_kind_runs_coalesce_into_one_span() {
        let mut set = BatchSet::new();
        for i in 0..5 {
            #[allow(clippy::cast_precision_loss)]
            set.add_rect(i as f32, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        }
        let spans = set.alpha_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].first, 0);
        assert_eq!(spans[0].count, 5 * RECT_FLOATS);
    }

    #[test]
    fn interleaved_opaque_shapes_do_not_split_alpha_spans() {
        let mut set = BatchSet::new();
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        set.add_rect(1.0, 0.0, 1.0, 1.0, rgb(0x00ff00), 0.0, 0.0, 0.0);
        set.add_rect(2.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        let spans = set.alpha_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].count, 2 * RECT_FLOATS);
    }

    #[test]
    fn alternating_kinds_produce_one_span_per_shape() {
        // End-to-end scenario: line/tri alternating, four of each.
        let mut set = BatchSet::new();
        for i in 0..4 {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f32;
            set.add_line(offset, 0.0, offset + 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
            set.add_tri(
                offset,
                0.0,
                offset + 1.0,
                0.0,
                offset,
                1.0,
                translucent(),
                0.0,
                0.0,
                0.0,
            );
        }
        let spans = set.alpha_spans();
        assert_eq!(spans.len(), 8);
        for (i, span) in spans.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(span.key, AlphaKey::Kind(PrimitiveKind::Line));
                assert_eq!(span.count, LINE_FLOATS);
                assert_eq!(span.first, (i / 2) * LINE_FLOATS);
            } else {
                assert_eq!(span.key, AlphaKey::Kind(PrimitiveKind::Tri));
                assert_eq!(span.count, TRI_FLOATS);
                assert_eq!(span.first, (i / 2) * TRI_FLOATS);
            }
        }
    }

    #[test]
    fn clear_then_empty_frame_draws_nothing() {
        let mut set = BatchSet::new();
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        set.add_pixel(0.0, 0.0, rgb(0xffffff));
        set.clear();

        assert!(set.alpha_spans().is_empty());
        for kind in [
            PrimitiveKind::Pixel,
            PrimitiveKind::Line,
            PrimitiveKind::Tri,
            PrimitiveKind::Rect,
            PrimitiveKind::Oval,
            PrimitiveKind::Lined,
            PrimitiveKind::Texture,
        ] {
            assert_eq!(set.vertex_count_opaque(kind), 0);
            assert_eq!(set.vertex_count_alpha(kind), 0);
        }
        assert!((set.z_level() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn spans_restart_from_zero_after_clear() {
        let mut set = BatchSet::new();
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        set.add_line(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        set.clear();
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        let spans = set.alpha_spans();
        assert_eq!(
            spans,
            vec![AlphaSpan {
                key: AlphaKey::Kind(PrimitiveKind::Rect),
                first: 0,
                count: RECT_FLOATS,
            }]
        );
    }

    #[test]
    fn z_level_increments_once_per_submission() {
        let mut set = BatchSet::new();
        assert!((set.z_level() - 1.0).abs() < f32::EPSILON);
        set.add_pixel(0.0, 0.0, rgb(0xffffff));
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        set.add_lined_tri(0.0, 0.0, 1.0, 0.0, 0.0, 1.0, rgb(0xff00ff), 0.0, 0.0, 0.0);
        assert!((set.z_level() - 4.0).abs() < f32::EPSILON);
    }

    fn fake_texture(fully_opaque: bool) -> Texture {
        let handle = glow::NativeTexture(std::num::NonZeroU32::new(1).unwrap());
        Texture::from_raw(handle, 64, 64, fully_opaque)
    }

    #[test]
    fn unregistered_texture_name_is_a_typed_error() {
        let mut set = BatchSet::new();
        let result = set.add_texture(
            "missing",
            0.0,
            0.0,
            8.0,
            8.0,
            0.0,
            0.0,
            8.0,
            8.0,
            rgb(0xffffff),
            0.0,
            0.0,
            0.0,
        );
        assert!(matches!(result, Err(Error::UnknownBatch(name)) if name == "missing"));
        // The failed call must not have advanced the z epoch.
        assert!((set.z_level() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn texture_spans_key_on_texture_identity() {
        let mut set = BatchSet::new();
        set.create_texture_batch("a", &fake_texture(false));
        set.create_texture_batch("b", &fake_texture(false));

        // Opaque tint + translucent texture still routes alpha.
        set.add_texture(
            "a", 0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 8.0, 8.0, rgb(0xffffff), 0.0, 0.0, 0.0,
        )
        .unwrap();
        set.add_texture(
            "b", 0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 8.0, 8.0, rgb(0xffffff), 0.0, 0.0, 0.0,
        )
        .unwrap();
        set.add_texture(
            "a", 8.0, 0.0, 8.0, 8.0, 0.0, 0.0, 8.0, 8.0, rgb(0xffffff), 0.0, 0.0, 0.0,
        )
        .unwrap();

        let spans = set.alpha_spans();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].key, AlphaKey::Texture("a".to_owned()));
        assert_eq!(spans[1].key, AlphaKey::Texture("b".to_owned()));
        assert_eq!(spans[2].key, AlphaKey::Texture("a".to_owned()));
        assert_eq!(spans[2].first, 6 * 12);
    }

    #[test]
    fn fully_opaque_texture_with_opaque_tint_skips_alpha() {
        let mut set = BatchSet::new();
        set.create_texture_batch("solid", &fake_texture(true));
        set.add_texture(
            "solid", 0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 8.0, 8.0, rgb(0xffffff), 0.0, 0.0, 0.0,
        )
        .unwrap();
        assert!(set.alpha_spans().is_empty());
        assert_eq!(set.vertex_count_opaque(PrimitiveKind::Texture), 6);
        assert_eq!(set.vertex_count_alpha(PrimitiveKind::Texture), 0);
    }

    #[test]
    fn lined_spans_measure_index_elements() {
        let mut set = BatchSet::new();
        set.add_lined_tri(0.0, 0.0, 4.0, 0.0, 2.0, 3.0, translucent(), 0.0, 0.0, 0.0);
        set.add_rect(0.0, 0.0, 1.0, 1.0, translucent(), 0.0, 0.0, 0.0);
        let spans = set.alpha_spans();
        assert_eq!(spans.len(), 2);
        // Three corner indices plus the restart sentinel.
        assert_eq!(spans[0].key, AlphaKey::Kind(PrimitiveKind::Lined));
        assert_eq!(spans[0].count, 4);
    }
}
