//! Global (Otsu) and background-relative thresholding.

use crate::{GrayImage, GrayImageView, RgbImageView};

fn histogram(samples: &[u8]) -> [u32; 256] {
    let mut hist = [0u32; 256];
    samples.iter().for_each(|&v| hist[v as usize] += 1);
    hist
}

/// Otsu's threshold of `samples`: the level maximizing the between-class
/// variance, with values `<= threshold` in the dark class.
///
/// A single gray level is returned as is; two levels split at their midpoint.
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    let hist = histogram(samples);
    let levels: Vec<usize> = (0..256).filter(|&i| hist[i] > 0).collect();
    match levels.as_slice() {
        [] => return 127,
        [only] => return *only as u8,
        [lo, hi] => return ((lo + hi) / 2) as u8,
        _ => {}
    }

    let n = samples.len() as f64;
    let mass: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    let (mut below, mut below_mass) = (0f64, 0f64);
    let mut best = (f64::MIN, 127u8);
    for (level, &count) in hist.iter().enumerate().take(255) {
        below += count as f64;
        below_mass += level as f64 * count as f64;
        let above = n - below;
        if below == 0.0 || above == 0.0 {
            continue;
        }
        let spread = below_mass / below - (mass - below_mass) / above;
        let score = below * above * spread * spread;
        if score > best.0 {
            best = (score, level as u8);
        }
    }
    best.1
}

/// Binary mask (255 = foreground) of pixels brighter than the Otsu threshold,
/// or darker when `dark_foreground` is set.
pub fn binarize_otsu(src: &GrayImageView<'_>, dark_foreground: bool) -> (GrayImage, u8) {
    let t = otsu_threshold(src.data);
    let data = src
        .data
        .iter()
        .map(|&v| if (v > t) != dark_foreground { 255 } else { 0 })
        .collect();
    (
        GrayImage {
            width: src.width,
            height: src.height,
            data,
        },
        t,
    )
}

fn median_from_histogram(hist: &[u32; 256], count: usize) -> u8 {
    let half = count.div_ceil(2) as u32;
    let mut acc = 0u32;
    for (v, &h) in hist.iter().enumerate() {
        acc += h;
        if acc >= half {
            return v as u8;
        }
    }
    255
}

/// Per-pixel color distance to the local background color, saturated to `u8`.
///
/// The background is the per-channel median of each `cell_size × cell_size`
/// cell, bilinearly interpolated between cell centers. Medians ignore objects
/// covering less than half a cell, so the reference follows slow illumination
/// changes without bleeding object colors into their surroundings.
pub fn background_distance_map(src: &RgbImageView<'_>, cell_size: usize) -> GrayImage {
    let (w, h) = (src.width, src.height);
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let cell = cell_size.max(1);
    let (gx, gy) = (w.div_ceil(cell), h.div_ceil(cell));

    let mut medians = vec![[0.0f32; 3]; gx * gy];
    for cy in 0..gy {
        for cx in 0..gx {
            let (x0, x1) = (cx * cell, ((cx + 1) * cell).min(w));
            let (y0, y1) = (cy * cell, ((cy + 1) * cell).min(h));
            let mut hist = [[0u32; 256]; 3];
            for y in y0..y1 {
                for x in x0..x1 {
                    let px = src.get(x, y);
                    for c in 0..3 {
                        hist[c][px[c] as usize] += 1;
                    }
                }
            }
            let count = (x1 - x0) * (y1 - y0);
            for c in 0..3 {
                medians[cy * gx + cx][c] = median_from_histogram(&hist[c], count) as f32;
            }
        }
    }

    // fractional cell coordinate of a pixel center, clamped to the outer cell centers
    let cell_coord = |p: usize, n: usize| {
        let f = ((p as f32 + 0.5) / cell as f32 - 0.5).clamp(0.0, (n - 1) as f32);
        let i0 = f.floor() as usize;
        (i0, (i0 + 1).min(n - 1), f - i0 as f32)
    };

    for y in 0..h {
        let (r0, r1, ty) = cell_coord(y, gy);
        for x in 0..w {
            let (c0, c1, tx) = cell_coord(x, gx);
            let px = src.get(x, y);
            let mut d2 = 0.0f32;
            for c in 0..3 {
                let top = medians[r0 * gx + c0][c] * (1.0 - tx) + medians[r0 * gx + c1][c] * tx;
                let bottom = medians[r1 * gx + c0][c] * (1.0 - tx) + medians[r1 * gx + c1][c] * tx;
                let bg = top * (1.0 - ty) + bottom * ty;
                let d = px[c] as f32 - bg;
                d2 += d * d;
            }
            out.data[y * w + x] = d2.sqrt().round().min(255.0) as u8;
        }
    }
    out
}

/// Binary mask of pixels whose value is at least `threshold`.
pub fn threshold_at_least(src: &GrayImageView<'_>, threshold: u8) -> GrayImage {
    GrayImage {
        width: src.width,
        height: src.height,
        data: src
            .data
            .iter()
            .map(|&v| if v >= threshold { 255 } else { 0 })
            .collect(),
    }
}
