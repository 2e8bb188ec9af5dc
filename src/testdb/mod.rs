//! Test fixtures
//!
//! Lets discovery, transfer and conversion be exercised without a phone:
//!
//! - `generator` - fake device trees on disk and small test images with EXIF
//! - `mock_probe` - scripted probe strategies and bus signals with call counters
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let tree = MediaTreeBuilder::new()
//!     .folder_with_files("100APPLE", &["IMG_0001.HEIC", "IMG_0002.MOV"])
//!     .build();
//! let probe = ScriptedProbe::candidate("fake", tree.root().to_path_buf());
//! ```

pub mod generator;
pub mod mock_probe;

pub use generator::{FixtureExif, FixtureImage, MediaTree, MediaTreeBuilder};
pub use mock_probe::{CallCounter, ScriptedProbe, ScriptedSignal};
