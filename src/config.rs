use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dae::UpAxis;
use crate::error::{ConvertError, ConvertResult};

/// How the document's up axis is mapped to the Y up runtime convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxisConversion {
    /// Use `asset/up_axis` of the document.
    #[default]
    FromDocument,
    /// Treat the document as if it declared this axis.
    Assume(UpAxis),
    NoConversion,
}

impl UpAxisConversion {
    pub fn resolve(self, document: UpAxis) -> UpAxis {
        match self {
            UpAxisConversion::FromDocument => document,
            UpAxisConversion::Assume(axis) => axis,
            UpAxisConversion::NoConversion => UpAxis::YUp,
        }
    }
}

/// Settings for converting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub output_directory: PathBuf,
    /// Directory of the assets relative to `output_directory`, also used in resource references.
    pub asset_path: String,
    /// File stem of the model and animation files. Empty means the input file stem.
    pub asset_name: String,
    /// Prefix for material file names.
    pub model_name: String,
    pub lod_distances: [f32; 4],
    pub optimize: bool,
    pub replace_materials: bool,
    pub scale_factor: f32,
    pub up_axis_conversion: UpAxisConversion,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            asset_path: String::new(),
            asset_name: String::new(),
            model_name: String::new(),
            lod_distances: [10.0, 20.0, 40.0, 80.0],
            optimize: true,
            replace_materials: false,
            scale_factor: 1.0,
            up_axis_conversion: UpAxisConversion::FromDocument,
        }
    }
}

impl ConvertConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<ConvertConfig> {
        let text = std::fs::read_to_string(path)?;
        let config: ConvertConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConvertResult<()> {
        let ascending = self.lod_distances.windows(2).all(|w| w[0] < w[1]);
        if !ascending {
            return Err(ConvertError::InvalidLodDistances(self.lod_distances));
        }
        Ok(())
    }
}
