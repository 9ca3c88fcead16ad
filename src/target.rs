//! Render targets and the per-frame draw driver.
//!
//! A [`RenderTarget`] is one offscreen surface: a framebuffer (RGBA8 color
//! + float depth), an orthographic projection in y-down pixel coordinates,
//! and its own [`BatchSet`]. The [`Renderer`] owns every target and runs
//! the frame: clear each target, flush its opaque pass, flip GL into
//! blending with depth writes off for the alpha replay, then composite the
//! targets onto the window in ascending weight order.
//!
//! The GL state sequence around the alpha pass is the contract the
//! ordering machinery in [`BatchSet`] depends on: blending must be
//! enabled (premultiplied-alpha factors) and depth writes disabled so
//! translucent geometry composites in replay order without occluding
//! itself in the depth buffer.

use std::sync::Arc;

use glow::HasContext;

use crate::batch_set::BatchSet;
use crate::buffer::{Growth, VecBuffer};
use crate::color::Rgba;
use crate::error::Error;
use crate::gl::{BatchProgram, Framebuffer, VertexStream, TEXTURE_LAYOUT};
use crate::shaders;

/// Floats per composite-quad vertex (textured layout).
const COMPOSITE_STRIDE: usize = 12;

/// The composite draw sits above the frame's geometry; its quad carries
/// z = 1 and is drawn with this z-max.
const COMPOSITE_Z_MAX: f32 = 2.0;

/// One offscreen surface with its own projection and batch set.
pub struct RenderTarget {
    tag: String,
    weight: u64,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    clear_color: Rgba,

    fbo: Framebuffer,
    projection: glam::Mat4,
    batches: BatchSet,

    composite_program: BatchProgram,
    u_texture: Option<glow::UniformLocation>,
    composite_stream: VertexStream,
    composite_vertices: VecBuffer<f32>,
}

impl RenderTarget {
    /// Create a target covering `(x, y, w, h)` in window coordinates.
    ///
    /// `weight` orders compositing: lower weights are drawn first and end
    /// up underneath higher ones.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Propagates framebuffer or shader failures; a target that cannot
    /// composite is useless, so unlike batches this is not a silent skip.
    pub unsafe fn new(
        gl: &Arc<glow::Context>,
        tag: &str,
        weight: u64,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<Self, Error> {
        let fbo = unsafe { Framebuffer::new(gl, pixel_size(w), pixel_size(h))? };
        let composite_program = unsafe {
            BatchProgram::build(
                gl,
                "RenderTarget",
                shaders::TEXTURE_VERTEX_SRC,
                shaders::TEXTURE_FRAGMENT_SRC,
            )?
        };
        let u_texture = unsafe { gl.get_uniform_location(composite_program.raw, "u_texture") };
        let composite_stream = unsafe { VertexStream::new(gl, COMPOSITE_STRIDE, TEXTURE_LAYOUT)? };

        let mut target = Self {
            tag: tag.to_owned(),
            weight,
            x,
            y,
            w,
            h,
            clear_color: Rgba::TRANSPARENT,
            fbo,
            projection: ortho_projection(w, h),
            batches: BatchSet::new(),
            composite_program,
            u_texture,
            composite_stream,
            composite_vertices: VecBuffer::new(
                COMPOSITE_STRIDE * 6,
                COMPOSITE_STRIDE,
                Growth::FromFront,
            ),
        };
        target.rebuild_composite_quad();
        Ok(target)
    }

    /// The name this target was created under.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Compositing order; lower draws first.
    #[must_use]
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Width in pixels.
    #[must_use]
    pub fn w(&self) -> f32 {
        self.w
    }

    /// Height in pixels.
    #[must_use]
    pub fn h(&self) -> f32 {
        self.h
    }

    /// The batch set shapes are submitted to.
    pub fn batches(&mut self) -> &mut BatchSet {
        &mut self.batches
    }

    /// The color this target's framebuffer is cleared to each frame.
    /// Defaults to transparent black so lower targets show through.
    pub fn set_clear_color(&mut self, color: Rgba) {
        self.clear_color = color;
    }

    /// Move/resize the target, recreating its framebuffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Propagates framebuffer recreation failure.
    pub unsafe fn resize(
        &mut self,
        gl: &Arc<glow::Context>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<(), Error> {
        self.x = x;
        self.y = y;
        self.w = w;
        self.h = h;
        self.fbo = unsafe { Framebuffer::new(gl, pixel_size(w), pixel_size(h))? };
        self.projection = ortho_projection(w, h);
        self.rebuild_composite_quad();
        Ok(())
    }

    /// Regenerate the window-space quad used to composite this target.
    /// V coordinates are flipped because the framebuffer texture's origin
    /// is bottom-left while the projection is y-down.
    fn rebuild_composite_quad(&mut self) {
        let (x, y, w, h) = (self.x, self.y, self.w, self.h);
        self.composite_vertices.clear();
        self.composite_vertices.add(&[
            x,     y,     1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0,
            x + w, y,     1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0,
            x + w, y + h, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            x,     y,     1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0,
            x + w, y + h, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            x,     y + h, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ]);
    }

    /// Draw this target's color texture onto the current framebuffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    unsafe fn draw_composite(&mut self, gl: &Arc<glow::Context>, window_projection: &glam::Mat4) {
        self.composite_vertices
            .sync(&mut self.composite_stream.vbo);
        unsafe {
            self.composite_program
                .bind(gl, COMPOSITE_Z_MAX, window_projection);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.fbo.color));
            gl.uniform_1_i32(self.u_texture.as_ref(), 0);
            gl.bind_vertex_array(Some(self.composite_stream.vao));
            let first = self.composite_vertices.front() / COMPOSITE_STRIDE;
            let count = self.composite_vertices.size() / COMPOSITE_STRIDE;
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            gl.draw_arrays(glow::TRIANGLES, first as i32, count as i32);
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }
}

/// The frame driver: owns the GL context handle and every render target,
/// and runs the clear → opaque → alpha → composite sequence once per frame.
pub struct Renderer {
    gl: Arc<glow::Context>,
    targets: Vec<RenderTarget>,
    window_projection: glam::Mat4,
    window_width: f32,
    window_height: f32,
}

impl Renderer {
    /// Name of the target created automatically at construction.
    pub const DEFAULT_TARGET: &'static str = "default";

    /// Create the renderer and its default full-window target, and enable
    /// depth testing (the z-level scheme depends on it).
    ///
    /// # Safety
    ///
    /// Requires a current GL context that stays current for every later
    /// call on this renderer.
    ///
    /// # Errors
    ///
    /// Propagates default-target creation failure.
    pub unsafe fn new(gl: Arc<glow::Context>, width: f32, height: f32) -> Result<Self, Error> {
        unsafe {
            gl.enable(glow::DEPTH_TEST);
        }
        let default_target =
            unsafe { RenderTarget::new(&gl, Self::DEFAULT_TARGET, 0, 0.0, 0.0, width, height)? };
        Ok(Self {
            gl,
            targets: vec![default_target],
            window_projection: ortho_projection(width, height),
            window_width: width,
            window_height: height,
        })
    }

    /// The default target's batch set — where shapes usually go.
    pub fn batches(&mut self) -> &mut BatchSet {
        self.targets[0].batches()
    }

    /// Add another render target. Targets composite in ascending weight;
    /// equal weights keep creation order.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Propagates target creation failure.
    pub unsafe fn create_target(
        &mut self,
        tag: &str,
        weight: u64,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<(), Error> {
        let target = unsafe { RenderTarget::new(&self.gl, tag, weight, x, y, w, h)? };
        let insert_at = self
            .targets
            .iter()
            .position(|t| t.weight() > weight)
            .unwrap_or(self.targets.len());
        self.targets.insert(insert_at, target);
        Ok(())
    }

    /// Look up a target by tag.
    pub fn target_mut(&mut self, tag: &str) -> Option<&mut RenderTarget> {
        self.targets.iter_mut().find(|t| t.tag() == tag)
    }

    /// Reset every target's batch set for a new frame. Call once at frame
    /// start, before the application's draw callback submits shapes.
    pub fn clear_frame(&mut self) {
        for target in &mut self.targets {
            target.batches.clear();
        }
    }

    /// Flush the frame: for each target in weight order, clear its
    /// framebuffer, draw the opaque pass, replay the alpha pass under
    /// blending with depth writes off, then composite everything onto the
    /// window framebuffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn draw_frame(&mut self) {
        let gl = &self.gl;
        let window_projection = self.window_projection;

        unsafe {
            // Start the window from a real (non-transparent) black.
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            #[expect(clippy::cast_possible_truncation)]
            gl.viewport(0, 0, self.window_width as i32, self.window_height as i32);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }

        for target in &mut self.targets {
            unsafe {
                target.fbo.bind();
                let [r, g, b, a] = target.clear_color.to_float();
                gl.clear_color(r, g, b, a);
                gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);

                target.batches.draw_opaque(gl, &target.projection);

                gl.blend_func_separate(
                    glow::ONE,
                    glow::ONE_MINUS_SRC_ALPHA,
                    glow::ONE_MINUS_DST_ALPHA,
                    glow::ONE,
                );
                gl.enable(glow::BLEND);
                gl.depth_mask(false);

                target.batches.draw_alpha(gl, &target.projection);

                gl.depth_mask(true);
                gl.disable(glow::BLEND);

                target.fbo.unbind();
                #[expect(clippy::cast_possible_truncation)]
                gl.viewport(0, 0, self.window_width as i32, self.window_height as i32);

                // Each composite needs a clean depth slate, and blending in
                // case the target cleared to a transparent color.
                gl.clear(glow::DEPTH_BUFFER_BIT);
                gl.enable(glow::BLEND);
                gl.depth_mask(false);

                target.draw_composite(gl, &window_projection);

                gl.depth_mask(true);
                gl.disable(glow::BLEND);
            }
        }
    }

    /// Resize the window: rebuilds the window projection and the default
    /// target. Other targets keep their geometry; resize them individually
    /// via [`Renderer::target_mut`].
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Propagates framebuffer recreation failure.
    pub unsafe fn resize(&mut self, width: f32, height: f32) -> Result<(), Error> {
        log::info!("window resized to {width}x{height}");
        self.window_width = width;
        self.window_height = height;
        self.window_projection = ortho_projection(width, height);
        let gl = Arc::clone(&self.gl);
        unsafe { self.targets[0].resize(&gl, 0.0, 0.0, width, height) }
    }
}

/// Y-down pixel-space orthographic projection with the depth range the
/// z-mapping in the shaders expects.
fn ortho_projection(w: f32, h: f32) -> glam::Mat4 {
    glam::Mat4::orthographic_rh_gl(0.0, w, h, 0.0, 0.0, 1.0)
}

/// Window dimensions are small positive values; truncation is the intent.
#[expect(clippy::cast_possible_truncation)]
fn pixel_size(value: f32) -> i32 {
    value.max(1.0) as i32
}
