use crate::CardFace;
use blackjack_vision_core::{binarize_otsu, luma, GrayImage};
use image::imageops::FilterType;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(thiserror::Error, Debug)]
pub enum TemplateLibraryError {
    #[error("cannot read template directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template size must be non-zero")]
    ZeroSize,
    #[error("template {face} is {found:?}, library expects {expected:?}")]
    SizeMismatch {
        face: CardFace,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// A binarised reference glyph (255 = ink).
#[derive(Clone, Debug)]
pub struct Template {
    pub face: CardFace,
    pub glyph: GrayImage,
}

/// Immutable set of rank/suit glyph templates, all of one size, ordered by face.
///
/// The template index used for tie-breaking is the position in this order.
#[derive(Clone, Debug)]
pub struct TemplateLibrary {
    width: usize,
    height: usize,
    templates: Vec<Template>,
}

impl TemplateLibrary {
    /// Build a library from gray glyph images (dark ink on a light card).
    ///
    /// Each image is Otsu-binarised; a face given twice keeps its first image.
    pub fn from_templates(
        width: usize,
        height: usize,
        glyphs: impl IntoIterator<Item = (CardFace, GrayImage)>,
    ) -> Result<Self, TemplateLibraryError> {
        if width == 0 || height == 0 {
            return Err(TemplateLibraryError::ZeroSize);
        }
        let mut by_face = BTreeMap::new();
        for (face, img) in glyphs {
            if (img.width, img.height) != (width, height) {
                return Err(TemplateLibraryError::SizeMismatch {
                    face,
                    expected: (width, height),
                    found: (img.width, img.height),
                });
            }
            if by_face.contains_key(&face) {
                warn!("duplicate template for {face}, keeping the first one");
                continue;
            }
            let (glyph, _) = binarize_otsu(&img.view(), true);
            by_face.insert(face, glyph);
        }
        Ok(Self {
            width,
            height,
            templates: by_face
                .into_iter()
                .map(|(face, glyph)| Template { face, glyph })
                .collect(),
        })
    }

    /// Load `<rank>_<suit>.<ext>` images from a directory, resized to
    /// `width × height`.
    ///
    /// Files with unparsable names or undecodable contents are skipped with a
    /// warning, as are missing faces; only an unreadable directory is an error.
    pub fn load_dir(
        path: impl AsRef<Path>,
        width: usize,
        height: usize,
    ) -> Result<Self, TemplateLibraryError> {
        let dir = path.as_ref();
        let io_err = |source| TemplateLibraryError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();

        let mut glyphs = Vec::with_capacity(files.len());
        for file in &files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let face: CardFace = match stem.parse() {
                Ok(face) => face,
                Err(err) => {
                    warn!("skipping template {}: {err}", file.display());
                    continue;
                }
            };
            match read_glyph(file, width, height) {
                Ok(glyph) => glyphs.push((face, glyph)),
                Err(err) => warn!("skipping template {}: {err}", file.display()),
            }
        }

        let library = Self::from_templates(width, height, glyphs)?;
        let missing = library.missing_faces();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
            warn!(
                "{} face(s) have no template in {}: {}",
                missing.len(),
                dir.display(),
                names.join(" ")
            );
        }
        debug!(
            "loaded {} templates ({}x{}) from {}",
            library.len(),
            width,
            height,
            dir.display()
        );
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// `(width, height)` of every template.
    pub fn template_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, face: CardFace) -> Option<&Template> {
        self.templates.iter().find(|t| t.face == face)
    }

    /// Faces of the 52-card deck without a template.
    pub fn missing_faces(&self) -> Vec<CardFace> {
        CardFace::all().filter(|f| self.get(*f).is_none()).collect()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_glyph(path: &Path, width: usize, height: usize) -> image::ImageResult<GrayImage> {
    let mut img = image::open(path)?;
    if (img.width() as usize, img.height() as usize) != (width, height) {
        img = img.resize_exact(width as u32, height as u32, FilterType::Triangle);
    }
    let rgb = img.to_rgb8();
    Ok(GrayImage {
        width,
        height,
        data: rgb.pixels().map(|p| luma(p.0)).collect(),
    })
}
