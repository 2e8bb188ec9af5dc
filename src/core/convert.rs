//! HEIC to JPEG conversion
//!
//! Decoding sits behind the [`ImageDecoder`] trait. The generic decoder uses
//! the `image` crate and sniffs the real format from the file content; the
//! libheif decoder (cargo feature `heif`) handles genuine HEIF files.
//!
//! Pixels are always presented upright before encoding. The metadata
//! written into the JPEG comes from [`crate::core::metadata::translate`].

use crate::core::error::ConvertError;
use crate::core::metadata::{self, CaptureMetadata};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, ImageReader};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions of the proprietary image container
pub const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Extension given to converted files
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Whether `path` names a HEIC/HEIF file
pub fn is_convertible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| HEIC_EXTENSIONS.iter().any(|h| ext.eq_ignore_ascii_case(h)))
}

/// Turns an image file into upright pixels
pub trait ImageDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `path`; `metadata` is the file's EXIF block, if any
    fn decode(
        &self,
        path: &Path,
        metadata: Option<&CaptureMetadata>,
    ) -> Result<DynamicImage, ConvertError>;
}

/// Decoder built on the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDecoder;

impl ImageDecoder for GenericDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn decode(
        &self,
        path: &Path,
        metadata: Option<&CaptureMetadata>,
    ) -> Result<DynamicImage, ConvertError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        if reader.format().is_none() {
            return Err(ConvertError::Unsupported(format!(
                "{} is not in a format this build can decode",
                path.display()
            )));
        }
        let img = reader.decode()?;
        let orientation = metadata.and_then(CaptureMetadata::orientation).unwrap_or(1);
        Ok(apply_orientation(img, orientation))
    }
}

/// Rotate or mirror pixels so an EXIF orientation of 1 is correct
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Decoder backed by libheif, falling back to the generic one
///
/// libheif applies the container's rotation and mirroring itself.
#[cfg(feature = "heif")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HeifDecoder {
    fallback: GenericDecoder,
}

#[cfg(feature = "heif")]
impl HeifDecoder {
    fn decode_heif(path: &Path) -> Result<DynamicImage, ConvertError> {
        use image::RgbImage;
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let path_str = path
            .to_str()
            .ok_or_else(|| ConvertError::Unsupported("non UTF-8 path".to_string()))?;
        let ctx = HeifContext::read_from_file(path_str)?;
        let lib = LibHeif::new();
        let handle = ctx.primary_image_handle()?;
        let decoded = lib.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;

        let plane = decoded
            .planes()
            .interleaved
            .ok_or_else(|| ConvertError::Unsupported("no interleaved RGB plane".to_string()))?;

        let row_len = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            pixels.extend_from_slice(&row[..row_len.min(row.len())]);
        }

        RgbImage::from_raw(plane.width, plane.height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ConvertError::Unsupported("truncated pixel data".to_string()))
    }
}

#[cfg(feature = "heif")]
impl ImageDecoder for HeifDecoder {
    fn name(&self) -> &'static str {
        "libheif"
    }

    fn decode(
        &self,
        path: &Path,
        metadata: Option<&CaptureMetadata>,
    ) -> Result<DynamicImage, ConvertError> {
        match Self::decode_heif(path) {
            Ok(img) => Ok(img),
            Err(e) => {
                debug!("libheif could not read {}: {}", path.display(), e);
                self.fallback.decode(path, metadata)
            }
        }
    }
}

/// The best decoder this build has
pub fn default_decoder() -> Box<dyn ImageDecoder> {
    #[cfg(feature = "heif")]
    {
        Box::new(HeifDecoder::default())
    }
    #[cfg(not(feature = "heif"))]
    {
        Box::new(GenericDecoder)
    }
}

/// Outcome of converting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub metadata_written: bool,
}

/// Converts HEIC files to JPEG
pub struct Converter {
    decoder: Box<dyn ImageDecoder>,
    quality: u8,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(default_decoder(), DEFAULT_JPEG_QUALITY)
    }
}

impl Converter {
    pub fn new(decoder: Box<dyn ImageDecoder>, quality: u8) -> Self {
        Self {
            decoder,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn with_quality(quality: u8) -> Self {
        Self::new(default_decoder(), quality)
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Convert `source` to a new JPEG next to it
    ///
    /// Never overwrites: if `IMG_0001.jpg` exists the output becomes
    /// `IMG_0001_1.jpg`. The source file is left untouched.
    pub fn convert(&self, source: &Path) -> Result<Conversion, ConvertError> {
        let output = unique_path(&source.with_extension(OUTPUT_EXTENSION));
        self.convert_to(source, &output)
    }

    /// Convert `source` into `output`
    pub fn convert_to(&self, source: &Path, output: &Path) -> Result<Conversion, ConvertError> {
        let source_meta = metadata::read_metadata(source)?;
        let img = self.decoder.decode(source, source_meta.as_ref())?;
        let (width, height) = (img.width(), img.height());

        let exif = match metadata::translate(source_meta.as_ref())
            .map(|translated| translated.to_tiff())
            .transpose()
        {
            Ok(exif) => exif,
            Err(e) => {
                warn!("Writing {} without metadata: {}", output.display(), e);
                None
            }
        };

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        let metadata_written = match exif {
            Some(tiff) => {
                encoder
                    .set_exif_metadata(tiff)
                    .map_err(ImageError::Unsupported)?;
                true
            }
            None => false,
        };
        img.to_rgb8().write_with_encoder(encoder)?;

        write_atomically(output, &jpeg)?;
        debug!(
            "Converted {} -> {} ({}x{})",
            source.display(),
            output.display(),
            width,
            height
        );

        Ok(Conversion {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            width,
            height,
            metadata_written,
        })
    }
}

/// Write through a `.part` file so a failed write leaves no broken JPEG
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), ConvertError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = fs::write(&partial, data).and_then(|_| fs::rename(&partial, path)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// `path` if it is free, otherwise the first free `stem_N.ext`
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut counter = 1;
    loop {
        let name = if extension.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, extension)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
