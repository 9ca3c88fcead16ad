//! Texture loading and the metadata the batching layer needs from it.
//!
//! The batching layer treats a texture as an opaque handle plus three
//! facts: its pixel dimensions (for texel-to-UV conversion) and whether
//! every texel is fully opaque (for alpha-bucket routing of textured
//! quads). The opacity flag is computed once here, at load time, by
//! scanning the decoded alpha channel.

use std::path::Path;
use std::sync::Arc;

use glow::HasContext;

use crate::error::Error;

/// A loaded GL texture with the metadata used for batching decisions.
pub struct Texture {
    raw: glow::Texture,
    width: u32,
    height: u32,
    fully_opaque: bool,
}

impl Texture {
    /// Decode an image file and upload it as a GL texture.
    ///
    /// `retro` selects nearest-neighbor filtering for pixel-art content;
    /// otherwise linear filtering is used. Mipmaps are generated either
    /// way.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageDecode`] if the file cannot be read or
    /// decoded, or [`Error::CreateResource`] if the driver refuses the
    /// texture object.
    pub unsafe fn load(
        gl: &Arc<glow::Context>,
        path: &Path,
        retro: bool,
    ) -> Result<Self, Error> {
        let decoded = image::open(path).map_err(|e| {
            log::error!("failed to load texture '{}': {e}", path.display());
            Error::ImageDecode(e.to_string())
        })?;
        let texture = unsafe { Self::from_image(gl, &decoded, retro)? };
        log::debug!(
            "loaded texture '{}' ({}x{})",
            path.display(),
            texture.width,
            texture.height
        );
        Ok(texture)
    }

    /// Decode an in-memory image (PNG/JPEG bytes) and upload it.
    ///
    /// # Safety
    ///
    /// Requires a current GL context.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Texture::load`].
    pub unsafe fn from_memory(
        gl: &Arc<glow::Context>,
        bytes: &[u8],
        retro: bool,
    ) -> Result<Self, Error> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
        unsafe { Self::from_image(gl, &decoded, retro) }
    }

    /// Wrap a texture created elsewhere.
    ///
    /// The caller vouches for the metadata: `fully_opaque` must only be
    /// `true` if every texel really has full alpha, since it decides
    /// whether quads drawn with this texture can skip blending.
    #[must_use]
    pub fn from_raw(raw: glow::Texture, width: u32, height: u32, fully_opaque: bool) -> Self {
        Self {
            raw,
            width,
            height,
            fully_opaque,
        }
    }

    unsafe fn from_image(
        gl: &Arc<glow::Context>,
        decoded: &image::DynamicImage,
        retro: bool,
    ) -> Result<Self, Error> {
        // GL constant values are small enough that the cast is always safe.
        #[expect(clippy::cast_possible_wrap)]
        const RGBA8: i32 = glow::RGBA8 as i32;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let fully_opaque = scan_fully_opaque(&rgba);

        let filter = if retro { glow::NEAREST } else { glow::LINEAR };
        // GL constant values are small enough that the casts are always safe.
        #[expect(clippy::cast_possible_wrap)]
        let (clamp, filter) = (glow::CLAMP_TO_EDGE as i32, filter as i32);

        let raw = unsafe { gl.create_texture() }.map_err(Error::CreateResource)?;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, clamp);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, clamp);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA8,
                gl_size(width),
                gl_size(height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(rgba.as_raw())),
            );
            gl.generate_mipmap(glow::TEXTURE_2D);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }

        Ok(Self {
            raw,
            width,
            height,
            fully_opaque,
        })
    }

    /// The GL texture name.
    #[must_use]
    pub fn raw(&self) -> glow::Texture {
        self.raw
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether every texel has full alpha. Quads drawn with a fully opaque
    /// texture (and an opaque tint) go to the opaque bucket.
    #[must_use]
    pub fn fully_opaque(&self) -> bool {
        self.fully_opaque
    }
}

/// Scan the alpha channel; bails out at the first translucent texel.
fn scan_fully_opaque(rgba: &image::RgbaImage) -> bool {
    rgba.pixels().all(|p| p.0[3] == 255)
}

/// Convert a `u32` dimension to the `i32` GL expects.
///
/// # Panics
///
/// Panics if `value > i32::MAX`, which is unreachable for decodable image
/// dimensions.
fn gl_size(value: u32) -> i32 {
    i32::try_from(value).expect("dimension exceeds i32::MAX")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn opacity_scan_accepts_all_opaque() {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        assert!(scan_fully_opaque(&img));
    }

    #[test]
    fn opacity_scan_rejects_single_translucent_texel() {
        let mut img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(7, 3, image::Rgba([0, 0, 0, 254]));
        assert!(!scan_fully_opaque(&img));
    }

    #[test]
    fn rgb_sources_convert_to_opaque_rgba() {
        let rgb = image::RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let dynamic = image::DynamicImage::ImageRgb8(rgb);
        assert!(scan_fully_opaque(&dynamic.to_rgba8()));
    }
}
