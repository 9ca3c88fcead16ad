//! A batched immediate-mode 2D renderer for OpenGL via [glow].
//!
//! Application code issues draw calls one shape at a time — pixels, lines,
//! triangles, rectangles, ovals, outlines, textured quads — in arbitrary
//! z-order; this crate buckets them per primitive kind and opacity, defers
//! everything to frame end, and flushes each frame through a minimal number
//! of GPU buffer uploads and draw calls.
//!
//! # How a frame works
//!
//! - [`Renderer::clear_frame`] resets every target's [`BatchSet`] (buffer
//!   capacity is retained across frames).
//! - The application calls `add_*` on a batch set. Each submission gets a
//!   monotonically increasing z-level, is tessellated on the CPU, and lands
//!   in its batch's opaque or alpha bucket depending on the color's alpha
//!   (and, for textured quads, the texture's own opacity).
//! - [`Renderer::draw_frame`] draws each target: one unordered pass over
//!   the opaque buckets (the depth test resolves overlap via z-levels),
//!   then — with blending on and depth writes off — a replay of the
//!   translucent geometry in exact submission order. Alpha blending is not
//!   commutative, so [`BatchSet`] records a span whenever consecutive
//!   translucent submissions switch batches and replays those spans in
//!   order; runs of same-kind shapes still collapse into single draw calls.
//!
//! # Error handling
//!
//! Constructors that build GPU resources return [`Error`]; a batch whose
//! lazy GL setup fails logs once via [`log`] and renders as a no-op rather
//! than failing the frame loop. Submission calls are infallible, with one
//! deliberate exception: [`BatchSet::add_texture`] for a name that was
//! never registered returns [`Error::UnknownBatch`].
//!
//! # Threading
//!
//! Single-threaded by design. A [`Renderer`], its targets, and their GL
//! resources are exclusively owned by the thread driving the render loop;
//! nothing here is `Send` or synchronized.
//!
//! # Safety
//!
//! Methods that issue GL calls are `unsafe` and require the context passed
//! at creation time to be current on the calling thread.
//!
//! [glow]: https://docs.rs/glow

mod batch;
mod batch_set;
mod buffer;
mod color;
mod error;
mod gl;
mod shaders;
mod stroke;
mod target;
mod texture;

pub use batch::PrimitiveKind;
pub use batch_set::{AlphaKey, AlphaSpan, BatchSet};
pub use buffer::{BufferSink, Growth, VecBuffer};
pub use color::{rgb, rgba, Rgba};
pub use error::Error;
pub use stroke::{add_capsule_line, StrokeBand, StrokeTable};
pub use target::{RenderTarget, Renderer};
pub use texture::Texture;
