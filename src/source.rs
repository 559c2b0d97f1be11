//! Pattern loading from SVG
//!
//! The pattern's physical size comes from the root `width`/`height`
//! attributes, which must carry an absolute unit. The raster is produced by
//! resvg at the document's natural pixel size.

use image::{Rgba, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::path::{Path, PathBuf};

/// Absolute units accepted for the document size, in millimetres per unit
const UNITS_MM: [(&str, f64); 3] = [("mm", 1.0), ("cm", 10.0), ("in", 25.4)];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("SVG is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to parse SVG: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("failed to load SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("SVG root has no {0} attribute")]
    MissingDimension(&'static str),
    #[error("invalid SVG {attribute} {value:?}: expected a positive length in mm, cm or in")]
    InvalidDimension {
        attribute: &'static str,
        value: String,
    },
    #[error("SVG has an empty raster size")]
    EmptyRaster,
}

/// Rasterized pattern plus its physical size
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub pixels: RgbaImage,
    /// Document width and height in millimetres
    pub size_mm: (f64, f64),
}

impl SourceImage {
    pub fn size_px(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Load and rasterize the SVG at `path`
pub fn load_svg(path: &Path) -> Result<SourceImage, SourceError> {
    let data = std::fs::read(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let image = parse_svg(&data)?;

    tracing::info!(
        "Loaded {:?}: {}x{} px, {}x{} mm",
        path,
        image.pixels.width(),
        image.pixels.height(),
        image.size_mm.0,
        image.size_mm.1
    );
    Ok(image)
}

pub fn parse_svg(data: &[u8]) -> Result<SourceImage, SourceError> {
    let text = std::str::from_utf8(data)?;
    let size_mm = physical_size(text)?;

    let tree = usvg::Tree::from_str(text, &usvg::Options::default())?;
    let pixels = rasterize(&tree)?;

    Ok(SourceImage { pixels, size_mm })
}

fn physical_size(text: &str) -> Result<(f64, f64), SourceError> {
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    Ok((parse_length(root, "width")?, parse_length(root, "height")?))
}

/// Parse a unit-suffixed length attribute into millimetres
fn parse_length(node: roxmltree::Node, attribute: &'static str) -> Result<f64, SourceError> {
    let value = node
        .attribute(attribute)
        .ok_or(SourceError::MissingDimension(attribute))?;
    let invalid = || SourceError::InvalidDimension {
        attribute,
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let (number, mm_per_unit) = UNITS_MM
        .iter()
        .find_map(|(suffix, scale)| trimmed.strip_suffix(suffix).map(|n| (n, *scale)))
        .ok_or_else(invalid)?;

    let number: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !(number.is_finite() && number > 0.0) {
        return Err(invalid());
    }
    Ok(number * mm_per_unit)
}

fn rasterize(tree: &usvg::Tree) -> Result<RgbaImage, SourceError> {
    let size = tree.size().to_int_size();
    let mut pixmap =
        tiny_skia::Pixmap::new(size.width(), size.height()).ok_or(SourceError::EmptyRaster)?;
    resvg::render(tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha
    let mut img = RgbaImage::new(size.width(), size.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(img)
}
