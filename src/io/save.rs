//! Checkpoint saving

use super::checkpoint::Checkpoint;
use super::format::{CheckpointFormat, SaveConfig};
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Save a checkpoint to a file
///
/// ```no_run
/// use rkd::io::{save_checkpoint, Checkpoint, CheckpointMetadata, Parameter, SaveConfig, CheckpointFormat};
///
/// let params = vec![Parameter::new("head.bias", vec![2], vec![0.1, 0.2]).unwrap()];
/// let checkpoint = Checkpoint::new(CheckpointMetadata::new("student", "identity"), params);
///
/// save_checkpoint(&checkpoint, "student.json", &SaveConfig::new(CheckpointFormat::Json)).unwrap();
/// ```
pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();

    match config.format {
        CheckpointFormat::SafeTensors => save_safetensors(checkpoint, path)?,
        CheckpointFormat::Json => {
            let data = if config.pretty {
                serde_json::to_string_pretty(checkpoint)
            } else {
                serde_json::to_string(checkpoint)
            }
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
            std::fs::write(path, data)?;
        }
        CheckpointFormat::Yaml => {
            let data = serde_yaml::to_string(checkpoint)
                .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?;
            std::fs::write(path, data)?;
        }
    }

    debug!(path = %path.display(), format = ?config.format, "checkpoint saved");
    Ok(())
}

/// Save checkpoint in SafeTensors format (HuggingFace compatible)
fn save_safetensors(checkpoint: &Checkpoint, path: &Path) -> Result<()> {
    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = checkpoint
        .parameters
        .iter()
        .map(|p| {
            let bytes: Vec<u8> = bytemuck::cast_slice(&p.data).to_vec();
            (p.name.as_str(), bytes, p.shape.clone())
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| Error::Serialization(format!("SafeTensors tensor {name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), checkpoint.metadata.name.clone());
    metadata.insert(
        "architecture".to_string(),
        checkpoint.metadata.architecture.clone(),
    );
    metadata.insert("version".to_string(), checkpoint.metadata.version.clone());

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;

    Ok(())
}
