//! Checkpoint loading

use super::checkpoint::{Checkpoint, CheckpointMetadata, Parameter, StateDict};
use super::format::CheckpointFormat;
use crate::{Error, Result};
use safetensors::tensor::Dtype;
use std::path::Path;
use tracing::debug;

/// Load a checkpoint from a file
///
/// The format is detected from the file extension.
///
/// ```no_run
/// use rkd::io::load_checkpoint;
///
/// let checkpoint = load_checkpoint("teacher.safetensors").unwrap();
/// println!("Loaded checkpoint: {}", checkpoint.metadata.name);
/// ```
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();

    let format = CheckpointFormat::from_path(path).ok_or_else(|| {
        Error::Serialization(format!(
            "Unsupported checkpoint extension: {}",
            path.display()
        ))
    })?;

    let checkpoint = match format {
        CheckpointFormat::SafeTensors => load_safetensors(path)?,
        CheckpointFormat::Json => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?
        }
        CheckpointFormat::Yaml => {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?
        }
    };

    debug!(
        path = %path.display(),
        parameters = checkpoint.parameters.len(),
        "checkpoint loaded"
    );
    Ok(checkpoint)
}

/// Load a checkpoint and strip `prefix` from every parameter name
///
/// # Errors
///
/// `Error::Checkpoint` when no name carries the prefix; read and parse
/// failures are fatal too.
pub fn load_state_dict(path: impl AsRef<Path>, prefix: &str) -> Result<StateDict> {
    let path = path.as_ref();
    load_checkpoint(path)?
        .strip_prefix(prefix)
        .map_err(|e| Error::Checkpoint(format!("{}: {e}", path.display())))
}

/// Load checkpoint from SafeTensors format (HuggingFace compatible)
fn load_safetensors(path: &Path) -> Result<Checkpoint> {
    let data = std::fs::read(path)?;

    let (_, st_metadata) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let custom_meta = st_metadata.metadata().clone().unwrap_or_default();
    let field = |key: &str| custom_meta.get(key).cloned().unwrap_or_else(|| "unknown".to_string());
    let mut metadata = CheckpointMetadata::new(field("name"), field("architecture"));
    if let Some(version) = custom_meta.get("version") {
        metadata.version = version.clone();
    }

    let safetensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut names = safetensors.names();
    names.sort();

    let mut parameters = Vec::with_capacity(names.len());
    for name in names {
        let view = safetensors
            .tensor(name)
            .map_err(|e| Error::Serialization(format!("SafeTensors tensor {name}: {e}")))?;
        if view.dtype() != Dtype::F32 {
            return Err(Error::Checkpoint(format!(
                "tensor {name} has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        // Tensor bytes inside the buffer are not guaranteed to be 4-byte aligned
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| bytemuck::pod_read_unaligned::<f32>(b))
            .collect();
        parameters.push(Parameter::new(name.to_string(), view.shape().to_vec(), values)?);
    }

    Ok(Checkpoint::new(metadata, parameters))
}
