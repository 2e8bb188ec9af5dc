//! Fixture generator for fake device trees and test images
//!
//! Images are real, decodable JPEGs. Files named `.HEIC` get JPEG bytes too,
//! which the generic decoder reads by sniffing the content, so conversion
//! can be tested without a native HEIF library.
//!
//! EXIF blocks are assembled by hand here, independent of the writer in
//! `core::metadata`, so the two can be checked against each other.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, ImageFormat, Rgb, RgbImage};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// EXIF fixtures
// =============================================================================

const TAG_MAKE: u16 = 0x010f;
const TAG_MODEL: u16 = 0x0110;
const TAG_ORIENTATION: u16 = 0x0112;
const TAG_DATETIME: u16 = 0x0132;
const TAG_EXIF_POINTER: u16 = 0x8769;
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;
const TAG_MAKER_NOTE: u16 = 0x927c;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;

/// One raw IFD entry: tag, type, count and value bytes
struct RawEntry {
    tag: u16,
    kind: u16,
    count: u32,
    bytes: Vec<u8>,
}

impl RawEntry {
    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            kind: TYPE_SHORT,
            count: 1,
            bytes: value.to_le_bytes().to_vec(),
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self {
            tag,
            kind: TYPE_ASCII,
            count: bytes.len() as u32,
            bytes,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: TYPE_LONG,
            count: 1,
            bytes: value.to_le_bytes().to_vec(),
        }
    }

    fn undefined(tag: u16, bytes: Vec<u8>) -> Self {
        Self {
            tag,
            kind: TYPE_UNDEFINED,
            count: bytes.len() as u32,
            bytes,
        }
    }

    /// Bytes stored outside the entry, padded to an even length
    fn external_len(&self) -> usize {
        if self.bytes.len() <= 4 {
            0
        } else {
            self.bytes.len() + self.bytes.len() % 2
        }
    }
}

fn ifd_len(entries: &[RawEntry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(RawEntry::external_len).sum::<usize>()
}

/// Append one little-endian IFD followed by its value area
fn write_ifd(out: &mut Vec<u8>, entries: &[RawEntry]) {
    let start = out.len();
    let mut data_offset = start + 2 + 12 * entries.len() + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.kind.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.bytes.len() <= 4 {
            let mut inline = entry.bytes.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data.extend_from_slice(&entry.bytes);
            if entry.bytes.len() % 2 == 1 {
                data.push(0);
            }
            data_offset += entry.external_len();
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&data);
}

/// Capture metadata to put into a fixture image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureExif {
    pub make: Option<String>,
    pub model: Option<String>,
    pub orientation: Option<u16>,
    pub datetime: Option<String>,
    pub datetime_original: Option<String>,
    pub maker_note: Option<Vec<u8>>,
}

impl FixtureExif {
    /// Encode as a little-endian TIFF structure
    pub fn to_tiff(&self) -> Vec<u8> {
        let mut ifd0 = Vec::new();
        if let Some(make) = &self.make {
            ifd0.push(RawEntry::ascii(TAG_MAKE, make));
        }
        if let Some(model) = &self.model {
            ifd0.push(RawEntry::ascii(TAG_MODEL, model));
        }
        if let Some(orientation) = self.orientation {
            ifd0.push(RawEntry::short(TAG_ORIENTATION, orientation));
        }
        if let Some(datetime) = &self.datetime {
            ifd0.push(RawEntry::ascii(TAG_DATETIME, datetime));
        }

        let mut exif_ifd = Vec::new();
        if let Some(original) = &self.datetime_original {
            exif_ifd.push(RawEntry::ascii(TAG_DATETIME_ORIGINAL, original));
        }
        if let Some(note) = &self.maker_note {
            exif_ifd.push(RawEntry::undefined(TAG_MAKER_NOTE, note.clone()));
        }

        if !exif_ifd.is_empty() {
            // Pointer is inline, so adding it does not move the value area.
            ifd0.push(RawEntry::long(TAG_EXIF_POINTER, 0));
            let exif_offset = 8 + ifd_len(&ifd0);
            if let Some(pointer) = ifd0.last_mut() {
                pointer.bytes = (exif_offset as u32).to_le_bytes().to_vec();
            }
        }

        let mut tiff = vec![b'I', b'I', 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00];
        write_ifd(&mut tiff, &ifd0);
        if !exif_ifd.is_empty() {
            write_ifd(&mut tiff, &exif_ifd);
        }
        tiff
    }
}

// =============================================================================
// Fixture images
// =============================================================================

/// A small test picture with optional EXIF
///
/// The default image is 4x2 pixels, wider than tall, so rotation is
/// visible in the output dimensions.
#[derive(Debug, Clone)]
pub struct FixtureImage {
    pub width: u32,
    pub height: u32,
    pub exif: Option<FixtureExif>,
}

impl Default for FixtureImage {
    fn default() -> Self {
        Self {
            width: 4,
            height: 2,
            exif: None,
        }
    }
}

impl FixtureImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            exif: None,
        }
    }

    /// A typical iPhone capture: portrait orientation and a valid timestamp
    pub fn iphone_capture() -> Self {
        Self::default().with_exif(FixtureExif {
            make: Some("Apple".to_string()),
            model: Some("iPhone 15 Pro".to_string()),
            orientation: Some(6),
            datetime: Some("2023:05:01 10:15:00".to_string()),
            datetime_original: Some("2023:05:01 10:15:00".to_string()),
            maker_note: Some(vec![0x41, 0x70, 0x70, 0x6c, 0x65, 0x00, 0x01, 0x02]),
        })
    }

    pub fn with_exif(mut self, exif: FixtureExif) -> Self {
        self.exif = Some(exif);
        self
    }

    fn pixels(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([(x * 60) as u8, (y * 120) as u8, 200])
        })
    }

    /// JPEG bytes, with an APP1 EXIF segment when metadata is set
    pub fn jpeg_bytes(&self) -> Vec<u8> {
        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, 90);
        if let Some(exif) = &self.exif {
            encoder
                .set_exif_metadata(exif.to_tiff())
                .expect("JPEG encoder takes EXIF");
        }
        self.pixels()
            .write_with_encoder(encoder)
            .expect("fixture JPEG encodes");
        jpeg
    }

    /// PNG bytes without metadata
    pub fn png_bytes(&self) -> Vec<u8> {
        let mut png = Cursor::new(Vec::new());
        self.pixels()
            .write_to(&mut png, ImageFormat::Png)
            .expect("fixture PNG encodes");
        png.into_inner()
    }
}

/// Placeholder QuickTime bytes for video fixtures
pub fn video_bytes() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&20u32.to_be_bytes());
    data.extend_from_slice(b"ftypqt  ");
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(b"qt  ");
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data
}

/// Default content for a fixture file, chosen by extension
pub fn content_for(name: &str) -> Vec<u8> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "heic" | "heif" => FixtureImage::iphone_capture().jpeg_bytes(),
        "jpg" | "jpeg" => FixtureImage::default().jpeg_bytes(),
        "png" => FixtureImage::default().png_bytes(),
        "mov" | "mp4" => video_bytes(),
        _ => format!("fixture {}", name).into_bytes(),
    }
}

// =============================================================================
// Device trees
// =============================================================================

/// A fake device storage root on disk, deleted on drop
pub struct MediaTree {
    dir: TempDir,
    media_dir: PathBuf,
}

impl MediaTree {
    /// Root path (the parent of the media folder)
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The `DCIM` folder
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Path of a file relative to the media folder
    pub fn media_path(&self, relative: &str) -> PathBuf {
        self.media_dir.join(relative)
    }
}

/// Builds fake iPhone storage trees
///
/// ```text
/// <tmp>/
///   DCIM/
///     100APPLE/
///       IMG_0001.HEIC
/// ```
#[derive(Debug, Clone)]
pub struct MediaTreeBuilder {
    media_dir_name: String,
    folders: Vec<(String, Vec<(String, Vec<u8>)>)>,
    loose: Vec<(String, Vec<u8>)>,
    outside: Vec<(String, Vec<u8>)>,
}

impl Default for MediaTreeBuilder {
    fn default() -> Self {
        Self {
            media_dir_name: "DCIM".to_string(),
            folders: Vec::new(),
            loose: Vec::new(),
            outside: Vec::new(),
        }
    }
}

impl MediaTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different spelling for the media folder
    pub fn media_dir_name(mut self, name: &str) -> Self {
        self.media_dir_name = name.to_string();
        self
    }

    /// Add an empty subfolder such as `100APPLE`
    pub fn apple_folder(mut self, name: &str) -> Self {
        self.folder_entry(name);
        self
    }

    /// Add a subfolder holding files with default content
    pub fn folder_with_files(mut self, name: &str, files: &[&str]) -> Self {
        let folder = self.folder_entry(name);
        for file in files {
            folder.push((file.to_string(), content_for(file)));
        }
        self
    }

    /// Add a file with specific content to a subfolder
    pub fn file(mut self, folder: &str, name: &str, content: Vec<u8>) -> Self {
        self.folder_entry(folder).push((name.to_string(), content));
        self
    }

    /// Add files directly inside the media folder
    pub fn loose_files(mut self, files: &[&str]) -> Self {
        for file in files {
            self.loose.push((file.to_string(), content_for(file)));
        }
        self
    }

    /// Add a file under the root but outside the media folder
    pub fn outside_file(mut self, relative: &str, content: Vec<u8>) -> Self {
        self.outside.push((relative.to_string(), content));
        self
    }

    fn folder_entry(&mut self, name: &str) -> &mut Vec<(String, Vec<u8>)> {
        let index = match self.folders.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.folders.push((name.to_string(), Vec::new()));
                self.folders.len() - 1
            }
        };
        &mut self.folders[index].1
    }

    /// Write the tree to a fresh temporary directory
    pub fn build(self) -> MediaTree {
        let dir = tempfile::tempdir().expect("create temp dir");
        let media_dir = dir.path().join(&self.media_dir_name);
        fs::create_dir_all(&media_dir).expect("create media dir");

        for (folder, files) in &self.folders {
            let folder_path = media_dir.join(folder);
            fs::create_dir_all(&folder_path).expect("create folder");
            for (name, content) in files {
                fs::write(folder_path.join(name), content).expect("write fixture");
            }
        }
        for (name, content) in &self.loose {
            fs::write(media_dir.join(name), content).expect("write fixture");
        }
        for (relative, content) in &self.outside {
            let path = dir.path().join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::write(path, content).expect("write fixture");
        }

        MediaTree { dir, media_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_jpeg_decodes() {
        let bytes = FixtureImage::iphone_capture().jpeg_bytes();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
    }

    #[test]
    fn test_fixture_exif_is_readable() {
        let bytes = FixtureImage::iphone_capture().jpeg_bytes();
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .unwrap();

        let orientation = exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0));
        assert_eq!(orientation, Some(6));

        let original = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY);
        match original.map(|f| &f.value) {
            Some(exif::Value::Ascii(parts)) => {
                assert_eq!(parts[0].as_slice(), b"2023:05:01 10:15:00")
            }
            other => panic!("unexpected DateTimeOriginal: {:?}", other),
        }
        assert!(exif.get_field(exif::Tag::MakerNote, exif::In::PRIMARY).is_some());
    }

    #[test]
    fn test_tree_layout() {
        let tree = MediaTreeBuilder::new()
            .folder_with_files("100APPLE", &["IMG_0001.HEIC", "IMG_0002.MOV"])
            .loose_files(&["IMG_0003.JPG"])
            .outside_file("Other/readme.txt", b"x".to_vec())
            .build();

        assert!(tree.media_path("100APPLE/IMG_0001.HEIC").is_file());
        assert!(tree.media_path("IMG_0003.JPG").is_file());
        assert!(tree.root().join("Other/readme.txt").is_file());
        assert_eq!(tree.media_dir(), tree.root().join("DCIM"));
    }
}
