//! Thin wrappers over the raw GL objects the batches draw with.
//!
//! Everything here is a dumb resource: program compilation with cached
//! uniform locations, a buffer object that acts as the production
//! [`BufferSink`], vertex-attribute layout binding, and the offscreen
//! framebuffer used by render targets. Policy (what to draw, when to sync)
//! lives in the batch layer.
//!
//! # Safety
//!
//! All constructors and methods that touch GL require the context passed at
//! creation time to be current on the calling thread. The crate is
//! single-threaded by design (see the crate docs); resources are never
//! shared across contexts.

use std::sync::Arc;

use glow::HasContext;

use crate::buffer::BufferSink;
use crate::error::Error;

/// A compiled batch program with its two standing uniforms resolved.
///
/// Every batch shader exposes the same pair: `u_z_max` for mapping the
/// unbounded z-level counter into depth range, and `u_projection` for the
/// target's orthographic projection.
pub(crate) struct BatchProgram {
    pub raw: glow::Program,
    u_z_max: Option<glow::UniformLocation>,
    u_projection: Option<glow::UniformLocation>,
}

impl BatchProgram {
    /// Compile and link a batch program from GLSL sources.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns the compile or link failure, including the driver log.
    pub unsafe fn build(
        gl: &glow::Context,
        label: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self, Error> {
        let raw = unsafe { compile_program(gl, label, vertex_src, fragment_src)? };
        let (u_z_max, u_projection) = unsafe {
            (
                gl.get_uniform_location(raw, "u_z_max"),
                gl.get_uniform_location(raw, "u_projection"),
            )
        };
        Ok(Self {
            raw,
            u_z_max,
            u_projection,
        })
    }

    /// Bind the program and set both standing uniforms.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn bind(&self, gl: &glow::Context, z_max: f32, projection: &glam::Mat4) {
        unsafe {
            gl.use_program(Some(self.raw));
            gl.uniform_1_f32(self.u_z_max.as_ref(), z_max);
            gl.uniform_matrix_4_f32_slice(
                self.u_projection.as_ref(),
                false,
                &projection.to_cols_array(),
            );
        }
    }
}

/// Compile a shader program from vertex and fragment source strings.
///
/// The compiled shader objects are detached and deleted after successful
/// linking, so only the program handle needs cleanup by the caller.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns a typed error carrying the driver's info log if compilation or
/// linking fails.
pub(crate) unsafe fn compile_program(
    gl: &glow::Context,
    label: &str,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, Error> {
    let program = unsafe { gl.create_program() }.map_err(Error::CreateResource)?;

    let vs = unsafe { compile_shader(gl, label, "vertex", glow::VERTEX_SHADER, vertex_src)? };
    let fs = unsafe { compile_shader(gl, label, "fragment", glow::FRAGMENT_SHADER, fragment_src)? };

    unsafe {
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(Error::ProgramLink {
                label: label.to_owned(),
                log,
            });
        }

        // Shaders can be detached and deleted after successful linking.
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
    }

    Ok(program)
}

/// Compile a single shader stage from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    label: &str,
    stage: &'static str,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, Error> {
    unsafe {
        let shader = gl.create_shader(shader_type).map_err(Error::CreateResource)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(Error::ShaderCompile {
                label: label.to_owned(),
                stage,
                log,
            });
        }

        Ok(shader)
    }
}

/// A GL buffer object acting as the production [`BufferSink`].
///
/// The context must be current whenever the owning batch draws (and hence
/// syncs); that invariant is held by the frame driver, which is the only
/// caller of the draw paths.
pub(crate) struct BufferObject {
    gl: Arc<glow::Context>,
    pub raw: glow::Buffer,
    target: u32,
    usage: u32,
}

impl BufferObject {
    /// Create an empty buffer object for the given target
    /// (`glow::ARRAY_BUFFER` / `glow::ELEMENT_ARRAY_BUFFER`).
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateResource`] if the driver refuses.
    pub unsafe fn new(gl: &Arc<glow::Context>, target: u32, usage: u32) -> Result<Self, Error> {
        let raw = unsafe { gl.create_buffer() }.map_err(Error::CreateResource)?;
        Ok(Self {
            gl: Arc::clone(gl),
            raw,
            target,
            usage,
        })
    }
}

/// The sink binds its target and leaves it bound. Element-array bindings
/// are VAO state, so index-buffer syncs must run with the owning VAO
/// bound — an unbind here would strip the VAO's element binding.
impl BufferSink for BufferObject {
    fn reallocate(&mut self, bytes: &[u8]) {
        let gl = &self.gl;
        unsafe {
            gl.bind_buffer(self.target, Some(self.raw));
            gl.buffer_data_u8_slice(self.target, bytes, self.usage);
        }
    }

    fn write(&mut self, byte_offset: usize, bytes: &[u8]) {
        let gl = &self.gl;
        // Byte offsets stay far below i32::MAX for any realistic frame.
        #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let offset = byte_offset as i32;
        unsafe {
            gl.bind_buffer(self.target, Some(self.raw));
            gl.buffer_sub_data_u8_slice(self.target, offset, bytes);
        }
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        unsafe { self.gl.delete_buffer(self.raw) };
    }
}

/// One float-typed vertex attribute within an interleaved layout.
pub(crate) struct VertexAttrib {
    /// `layout (location = N)` slot in the shader.
    pub location: u32,
    /// Number of float components.
    pub components: i32,
    /// Offset into the record, in floats.
    pub offset_floats: i32,
}

/// Layout for point vertices: position (xyz) + color (rgba).
pub(crate) const POINT_LAYOUT: &[VertexAttrib] = &[
    VertexAttrib {
        location: 0,
        components: 3,
        offset_floats: 0,
    },
    VertexAttrib {
        location: 1,
        components: 4,
        offset_floats: 3,
    },
];

/// Layout for shape vertices: position + color + rotation pivot/angle.
pub(crate) const SHAPE_LAYOUT: &[VertexAttrib] = &[
    VertexAttrib {
        location: 0,
        components: 3,
        offset_floats: 0,
    },
    VertexAttrib {
        location: 1,
        components: 4,
        offset_floats: 3,
    },
    VertexAttrib {
        location: 2,
        components: 3,
        offset_floats: 7,
    },
];

/// Layout for textured vertices: position + color + uv + rotation.
pub(crate) const TEXTURE_LAYOUT: &[VertexAttrib] = &[
    VertexAttrib {
        location: 0,
        components: 3,
        offset_floats: 0,
    },
    VertexAttrib {
        location: 1,
        components: 4,
        offset_floats: 3,
    },
    VertexAttrib {
        location: 2,
        components: 2,
        offset_floats: 7,
    },
    VertexAttrib {
        location: 3,
        components: 3,
        offset_floats: 9,
    },
];

/// A VAO + vertex buffer pair for one bucket of a batch.
pub(crate) struct VertexStream {
    pub vao: glow::VertexArray,
    pub vbo: BufferObject,
}

impl VertexStream {
    /// Create the VAO and buffer, binding the interleaved `layout` with the
    /// given record stride (in floats).
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateResource`] on VAO/buffer creation failure.
    pub unsafe fn new(
        gl: &Arc<glow::Context>,
        stride_floats: usize,
        layout: &[VertexAttrib],
    ) -> Result<Self, Error> {
        let vao = unsafe { gl.create_vertex_array() }.map_err(Error::CreateResource)?;
        let vbo = unsafe { BufferObject::new(gl, glow::ARRAY_BUFFER, glow::DYNAMIC_DRAW)? };
        unsafe {
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo.raw));
            configure_attribs(gl, stride_floats, layout);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        Ok(Self { vao, vbo })
    }

    /// Same as [`VertexStream::new`] but with an element buffer attached to
    /// the VAO for indexed drawing.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateResource`] on VAO/buffer creation failure.
    pub unsafe fn new_indexed(
        gl: &Arc<glow::Context>,
        stride_floats: usize,
        layout: &[VertexAttrib],
    ) -> Result<(Self, BufferObject), Error> {
        let vao = unsafe { gl.create_vertex_array() }.map_err(Error::CreateResource)?;
        let vbo = unsafe { BufferObject::new(gl, glow::ARRAY_BUFFER, glow::DYNAMIC_DRAW)? };
        let ebo = unsafe { BufferObject::new(gl, glow::ELEMENT_ARRAY_BUFFER, glow::DYNAMIC_DRAW)? };
        unsafe {
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo.raw));
            configure_attribs(gl, stride_floats, layout);
            // Element binding is VAO state; it stays attached when the
            // VAO is unbound.
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo.raw));
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        Ok((Self { vao, vbo }, ebo))
    }
}

/// Enable and point every attribute of an interleaved float layout.
///
/// Expects the target VAO and `ARRAY_BUFFER` to be bound.
///
/// # Safety
///
/// Requires a current GL context.
unsafe fn configure_attribs(gl: &glow::Context, stride_floats: usize, layout: &[VertexAttrib]) {
    const FLOAT_SIZE: i32 = std::mem::size_of::<f32>() as i32;
    // Strides here are 7, 10, or 12 floats — nowhere near i32 range issues.
    #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let stride_bytes = stride_floats as i32 * FLOAT_SIZE;
    for attrib in layout {
        unsafe {
            gl.enable_vertex_attrib_array(attrib.location);
            gl.vertex_attrib_pointer_f32(
                attrib.location,
                attrib.components,
                glow::FLOAT,
                false,
                stride_bytes,
                attrib.offset_floats * FLOAT_SIZE,
            );
        }
    }
}

/// An offscreen framebuffer with an RGBA8 color texture and a 32-bit float
/// depth renderbuffer, as used by [`RenderTarget`](crate::RenderTarget).
pub(crate) struct Framebuffer {
    gl: Arc<glow::Context>,
    pub raw: glow::Framebuffer,
    pub color: glow::Texture,
    depth: glow::Renderbuffer,
    pub width: i32,
    pub height: i32,
}

impl Framebuffer {
    /// Create and completeness-check a framebuffer of the given pixel size.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateResource`] if any attachment cannot be
    /// created, or [`Error::FramebufferIncomplete`] if the combination is
    /// rejected by the driver.
    pub unsafe fn new(gl: &Arc<glow::Context>, width: i32, height: i32) -> Result<Self, Error> {
        // GL constant values are small enough that the cast is always safe.
        #[expect(clippy::cast_possible_wrap)]
        const RGBA8: i32 = glow::RGBA8 as i32;
        #[expect(clippy::cast_possible_wrap)]
        const LINEAR: i32 = glow::LINEAR as i32;

        let raw = unsafe { gl.create_framebuffer() }.map_err(Error::CreateResource)?;
        let color = unsafe { gl.create_texture() }.map_err(Error::CreateResource)?;
        let depth = unsafe { gl.create_renderbuffer() }.map_err(Error::CreateResource)?;

        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(color));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA8,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, LINEAR);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, LINEAR);

            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
            gl.renderbuffer_storage(glow::RENDERBUFFER, glow::DEPTH_COMPONENT32F, width, height);

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(raw));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color),
                0,
            );
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth),
            );

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(raw);
                gl.delete_texture(color);
                gl.delete_renderbuffer(depth);
                return Err(Error::FramebufferIncomplete { status });
            }
        }

        Ok(Self {
            gl: Arc::clone(gl),
            raw,
            color,
            depth,
            width,
            height,
        })
    }

    /// Bind this framebuffer as the draw target and set the viewport.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn bind(&self) {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.raw));
            self.gl.viewport(0, 0, self.width, self.height);
        }
    }

    /// Rebind the default framebuffer.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    pub unsafe fn unbind(&self) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_framebuffer(self.raw);
            self.gl.delete_texture(self.color);
            self.gl.delete_renderbuffer(self.depth);
        }
    }
}
