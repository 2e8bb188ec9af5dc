//! Capture metadata translation
//!
//! Reads the EXIF block of a source image and normalizes it for the converted
//! JPEG. The JPEG encoder frames the resulting TIFF block as an APP1 segment.
//!
//! Translation rules:
//! - no source block means no output block, never an empty one
//! - orientation is forced to 1 (upright), since pixels are rotated at decode time
//! - timestamps are kept only when they parse as `YYYY:MM:DD HH:MM:SS`
//! - IFD pointers, thumbnail fields, opaque binary values and tags
//!   unknown to the EXIF table are dropped
//!
//! The output depends only on the input fields, so converting the same file
//! twice yields byte-identical blocks.

use crate::core::error::ConvertError;
use chrono::NaiveDateTime;
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// Timestamp layout used by EXIF date fields
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Orientation value meaning "pixels are already upright"
pub const ORIENTATION_UPRIGHT: u16 = 1;

/// Largest TIFF block that fits one APP1 segment after its length field
/// and the `Exif\0\0` header
pub const MAX_EXIF_LEN: usize = u16::MAX as usize - 8;

const DATETIME_TAGS: [Tag; 3] = [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized];

const POINTER_TAGS: [Tag; 3] = [Tag::ExifIFDPointer, Tag::GPSInfoIFDPointer, Tag::InteropIFDPointer];

/// A structured EXIF block
#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    fields: Vec<Field>,
}

impl CaptureMetadata {
    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Primary-image field for `tag`
    pub fn get(&self, tag: Tag) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.tag == tag && f.ifd_num == In::PRIMARY)
    }

    /// Orientation tag value (1-8), if present
    pub fn orientation(&self) -> Option<u32> {
        self.get(Tag::Orientation).and_then(|f| f.value.get_uint(0))
    }

    /// Capture timestamp as stored, preferring `DateTimeOriginal`
    pub fn capture_datetime(&self) -> Option<String> {
        [Tag::DateTimeOriginal, Tag::DateTime]
            .iter()
            .find_map(|tag| self.get(*tag).and_then(|f| ascii_value(&f.value)))
    }

    /// Encode the fields as a little-endian TIFF structure
    ///
    /// Fails when the block would not fit into a JPEG APP1 segment.
    pub fn to_tiff(&self) -> Result<Vec<u8>, ConvertError> {
        let mut writer = Writer::new();
        for field in &self.fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, true)?;

        let tiff = tiff.into_inner();
        if tiff.len() > MAX_EXIF_LEN {
            return Err(ConvertError::MetadataTooLarge(tiff.len()));
        }
        Ok(tiff)
    }
}

/// Read the EXIF block of an image file
///
/// Returns `Ok(None)` when the file has no block or the block is unreadable.
/// Only failing to open the file is an error.
pub fn read_metadata(path: &Path) -> Result<Option<CaptureMetadata>, ConvertError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => {
            let fields: Vec<Field> = exif.fields().cloned().collect();
            debug!("{}: {} EXIF field(s)", path.display(), fields.len());
            Ok(Some(CaptureMetadata::from_fields(fields)))
        }
        Err(exif::Error::NotFound(_)) => Ok(None),
        Err(e) => {
            warn!("Ignoring unreadable metadata in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Normalize source metadata for the converted image
pub fn translate(source: Option<&CaptureMetadata>) -> Option<CaptureMetadata> {
    let source = source?;

    let mut fields: Vec<Field> = source
        .fields
        .iter()
        .filter(|field| keep_field(field))
        .cloned()
        .collect();

    match fields
        .iter_mut()
        .find(|f| f.tag == Tag::Orientation && f.ifd_num == In::PRIMARY)
    {
        Some(orientation) => orientation.value = Value::Short(vec![ORIENTATION_UPRIGHT]),
        None => fields.push(Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![ORIENTATION_UPRIGHT]),
        }),
    }

    fields.sort_by_key(|f| f.tag.number());
    fields.dedup_by_key(|f| f.tag);
    Some(CaptureMetadata::from_fields(fields))
}

fn keep_field(field: &Field) -> bool {
    if field.ifd_num != In::PRIMARY || POINTER_TAGS.contains(&field.tag) {
        return false;
    }
    if field.tag.description().is_none() {
        return false;
    }
    if matches!(field.value, Value::Undefined(..) | Value::Unknown(..)) {
        return false;
    }
    if DATETIME_TAGS.contains(&field.tag) {
        return ascii_value(&field.value).is_some_and(|s| is_valid_datetime(&s));
    }
    true
}

/// Whether `value` matches the fixed-width EXIF timestamp layout
pub fn is_valid_datetime(value: &str) -> bool {
    value.len() == 19 && NaiveDateTime::parse_from_str(value, EXIF_DATETIME_FORMAT).is_ok()
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::{FixtureExif, FixtureImage};
    use std::fs;

    fn metadata_of(image: FixtureImage) -> Option<CaptureMetadata> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_0001.HEIC");
        fs::write(&path, image.jpeg_bytes()).unwrap();
        read_metadata(&path).unwrap()
    }

    #[test]
    fn test_orientation_normalized_and_datetime_kept() {
        let source = metadata_of(FixtureImage::iphone_capture()).unwrap();
        assert_eq!(source.orientation(), Some(6));

        let out = translate(Some(&source)).unwrap();
        assert_eq!(out.orientation(), Some(1));
        assert_eq!(
            out.capture_datetime().as_deref(),
            Some("2023:05:01 10:15:00")
        );
        assert!(out.get(Tag::DateTime).is_some());
        assert_eq!(
            out.get(Tag::Model).and_then(|f| ascii_value(&f.value)).as_deref(),
            Some("iPhone 15 Pro")
        );
    }

    #[test]
    fn test_malformed_datetime_dropped() {
        let image = FixtureImage::default().with_exif(FixtureExif {
            orientation: Some(6),
            datetime: Some("2023-05-01 10:15".to_string()),
            ..Default::default()
        });
        let source = metadata_of(image).unwrap();

        let out = translate(Some(&source)).unwrap();
        assert_eq!(out.orientation(), Some(1));
        assert!(out.get(Tag::DateTime).is_none());
        assert_eq!(out.capture_datetime(), None);
    }

    #[test]
    fn test_no_metadata_yields_none() {
        assert!(metadata_of(FixtureImage::default()).is_none());
        assert!(translate(None).is_none());
    }

    #[test]
    fn test_opaque_and_pointer_fields_dropped() {
        let source = metadata_of(FixtureImage::iphone_capture()).unwrap();
        assert!(source.get(Tag::MakerNote).is_some());

        let out = translate(Some(&source)).unwrap();
        assert!(out.get(Tag::MakerNote).is_none());
        assert!(out.get(Tag::ExifIFDPointer).is_none());
        assert!(out.get(Tag::Make).is_some());
    }

    #[test]
    fn test_missing_orientation_is_added() {
        let image = FixtureImage::default().with_exif(FixtureExif {
            make: Some("Apple".to_string()),
            ..Default::default()
        });
        let out = translate(metadata_of(image).as_ref()).unwrap();
        assert_eq!(out.orientation(), Some(1));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let source = metadata_of(FixtureImage::iphone_capture()).unwrap();
        let first = translate(Some(&source)).unwrap().to_tiff().unwrap();
        let second = translate(Some(&source)).unwrap().to_tiff().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_translated_block_parses() {
        let source = metadata_of(FixtureImage::iphone_capture()).unwrap();
        let tiff = translate(Some(&source)).unwrap().to_tiff().unwrap();

        let exif = exif::Reader::new().read_raw(tiff).unwrap();
        let orientation = exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0));
        assert_eq!(orientation, Some(1));
        assert!(exif.get_field(Tag::MakerNote, In::PRIMARY).is_none());
    }

    #[test]
    fn test_oversized_block_rejected() {
        let metadata = CaptureMetadata::from_fields(vec![Field {
            tag: Tag::ImageDescription,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![vec![b'x'; MAX_EXIF_LEN]]),
        }]);
        assert!(matches!(
            metadata.to_tiff(),
            Err(ConvertError::MetadataTooLarge(_))
        ));
    }

    #[test]
    fn test_datetime_pattern() {
        assert!(is_valid_datetime("2023:05:01 10:15:00"));
        assert!(!is_valid_datetime("2023:13:01 10:15:00"));
        assert!(!is_valid_datetime("    :  :     :  :  "));
        assert!(!is_valid_datetime("2023:05:01"));
    }
}
