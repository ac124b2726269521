//! Lightweight row-major image buffers and bilinear sampling.
//!
//! Pixel `(x, y)` covers the unit square `[x, x+1) × [y, y+1)` and its value
//! sits at the pixel center `(x + 0.5, y + 0.5)`. Sampling at a pixel center
//! therefore returns the stored value exactly, which keeps integer-translation
//! warps lossless.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Borrowed 8-bit RGB frame, channels interleaved (`len = w*h*3`).
#[derive(Clone, Copy, Debug)]
pub struct RgbImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned 8-bit RGB frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// Image filled with a single color.
    pub fn filled(width: usize, height: usize, color: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap an existing interleaved buffer; `None` if the length does not match.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        let expected = width.checked_mul(height)?.checked_mul(3)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> RgbImageView<'_> {
        RgbImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, color: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&color);
    }
}

impl RgbImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Luma conversion (BT.601 weights).
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| luma([px[0], px[1], px[2]]))
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[inline]
pub fn luma(px: [u8; 3]) -> u8 {
    let v = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    v.round().clamp(0.0, 255.0) as u8
}

/// Channel values of pixel `(x, y)`, black outside the image.
#[inline]
fn texel<const N: usize>(data: &[u8], width: usize, height: usize, x: i32, y: i32) -> [f32; N] {
    if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
        return [0.0; N];
    }
    let at = (y as usize * width + x as usize) * N;
    std::array::from_fn(|c| data[at + c] as f32)
}

/// Bilinear blend of the four texels around `(x, y)` in pixel-center
/// coordinates (pixel `i` spans `[i, i + 1)`, center `i + 0.5`).
#[inline]
fn interpolate<const N: usize>(data: &[u8], width: usize, height: usize, x: f32, y: f32) -> [f32; N] {
    let (x, y) = (x - 0.5, y - 0.5);
    let (ix, iy) = (x.floor(), y.floor());
    let (tx, ty) = (x - ix, y - iy);
    let (ix, iy) = (ix as i32, iy as i32);
    let top_l = texel::<N>(data, width, height, ix, iy);
    let top_r = texel::<N>(data, width, height, ix + 1, iy);
    let bot_l = texel::<N>(data, width, height, ix, iy + 1);
    let bot_r = texel::<N>(data, width, height, ix + 1, iy + 1);
    std::array::from_fn(|c| {
        let top = top_l[c] * (1.0 - tx) + top_r[c] * tx;
        let bottom = bot_l[c] * (1.0 - tx) + bot_r[c] * tx;
        top * (1.0 - ty) + bottom * ty
    })
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Bilinear gray sample; outside pixels read as black.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    interpolate::<1>(src.data, src.width, src.height, x, y)[0]
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    to_u8(sample_bilinear(src, x, y))
}

/// Per-channel counterpart of [`sample_bilinear_u8`].
#[inline]
pub fn sample_bilinear_rgb(src: &RgbImageView<'_>, x: f32, y: f32) -> [u8; 3] {
    interpolate::<3>(src.data, src.width, src.height, x, y).map(to_u8)
}
