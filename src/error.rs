//! Error types for GPU resource creation and batch submission.
//!
//! Recoverable rendering problems (a shader that fails to compile, an
//! incomplete framebuffer) are reported through these types at *creation*
//! time and through the [`log`] crate afterwards; a batch whose resources
//! failed to build renders as a no-op rather than taking down the frame
//! loop. See the crate-level docs for the full policy.

use thiserror::Error;

/// Anything that can go wrong while building or feeding the renderer.
#[derive(Debug, Error)]
pub enum Error {
    /// A shader stage failed to compile.
    #[error("failed to compile {stage} shader for {label}: {log}")]
    ShaderCompile {
        /// Which program the shader belongs to (e.g. `"RectBatch"`).
        label: String,
        /// `"vertex"` or `"fragment"`.
        stage: &'static str,
        /// The driver's info log.
        log: String,
    },

    /// A shader program failed to link.
    #[error("failed to link program for {label}: {log}")]
    ProgramLink {
        /// Which program failed.
        label: String,
        /// The driver's info log.
        log: String,
    },

    /// The driver refused to create a GL object (buffer, VAO, texture, ...).
    #[error("failed to create GL resource: {0}")]
    CreateResource(String),

    /// An offscreen framebuffer did not pass the completeness check.
    #[error("framebuffer incomplete (status {status:#x})")]
    FramebufferIncomplete {
        /// The raw `glCheckFramebufferStatus` value.
        status: u32,
    },

    /// A textured quad was submitted for a name that was never registered
    /// with [`BatchSet::create_texture_batch`](crate::BatchSet::create_texture_batch).
    #[error("no texture batch named {0:?}; call create_texture_batch first")]
    UnknownBatch(String),

    /// An image could not be decoded for texture upload.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),
}
