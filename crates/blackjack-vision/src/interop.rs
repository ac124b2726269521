//! Conversions between the `image` crate and the core frame types.

use crate::FrameSource;
use blackjack_vision_core::{RgbImage, RgbImageView};
use log::warn;
use std::path::{Path, PathBuf};
use std::{fs, io};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Borrow an `image::RgbImage` as a core frame view.
pub fn rgb_view(img: &::image::RgbImage) -> RgbImageView<'_> {
    RgbImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

pub fn from_image(img: ::image::RgbImage) -> RgbImage {
    RgbImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    }
}

pub fn to_image(img: &RgbImage) -> Option<::image::RgbImage> {
    ::image::RgbImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
}

/// Decode any supported image file into a frame.
pub fn load_frame(path: impl AsRef<Path>) -> ::image::ImageResult<RgbImage> {
    Ok(from_image(::image::open(path)?.to_rgb8()))
}

/// Frames read from the image files of a directory in file name order.
///
/// Undecodable files are skipped with a warning.
#[derive(Clone, Debug)]
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();
        Ok(Self { files, next: 0 })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Path of the frame most recently returned.
    pub fn current(&self) -> Option<&Path> {
        self.next
            .checked_sub(1)
            .and_then(|i| self.files.get(i))
            .map(PathBuf::as_path)
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Option<RgbImage> {
        while let Some(path) = self.files.get(self.next) {
            self.next += 1;
            match load_frame(path) {
                Ok(frame) => return Some(frame),
                Err(err) => warn!("skipping frame {}: {err}", path.display()),
            }
        }
        None
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_pixels() {
        let img = ::image::RgbImage::from_fn(5, 3, |x, y| ::image::Rgb([x as u8, y as u8, 7]));
        let view = rgb_view(&img);
        assert_eq!((view.width, view.height), (5, 3));
        assert_eq!(view.get(4, 2), [4, 2, 7]);
        let frame = from_image(img.clone());
        assert_eq!(to_image(&frame), Some(img));
    }

    #[test]
    fn directory_source_skips_bad_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        ::image::RgbImage::from_pixel(4, 4, ::image::Rgb([9, 9, 9]))
            .save(dir.path().join("b.png"))
            .expect("save");
        ::image::RgbImage::from_pixel(2, 2, ::image::Rgb([1, 1, 1]))
            .save(dir.path().join("c.png"))
            .expect("save");
        fs::write(dir.path().join("a.png"), "garbage").expect("write");
        fs::write(dir.path().join("notes.txt"), "x").expect("write");

        let mut source = ImageDirSource::open(dir.path()).expect("open");
        assert_eq!(source.files().len(), 3);
        let first = source.next_frame().expect("frame");
        assert_eq!((first.width, first.height), (4, 4));
        assert_eq!(source.current(), Some(dir.path().join("b.png").as_path()));
        assert_eq!(source.next_frame().map(|f| f.width), Some(2));
        assert!(source.next_frame().is_none());
    }
}
