//! Conversion of COLLADA documents into runtime geometry, scene, material and
//! animation files.
//!
//! [DaeDocument] holds the parsed document. [Converter] turns it into a scene
//! graph with shared vertex and index buffers and writes the output files.
pub mod config;
pub mod convert;
pub mod dae;
pub mod error;
pub mod export;

pub use config::{ConvertConfig, UpAxisConversion};
pub use convert::{convert_dae_file, ConvertedFiles, Converter};
pub use dae::DaeDocument;
pub use error::{ConvertError, ConvertResult};
