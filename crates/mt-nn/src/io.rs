// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Snapshot persistence for trained autoencoders.
//!
//! A snapshot bundles the model configuration with every named parameter so
//! a load can rebuild the exact architecture before restoring weights.
//! Writes go through a sibling temporary file and a rename, so a crashed
//! save never leaves a truncated snapshot behind.

use crate::error::{NnError, NnResult};
use crate::model::AutoencoderConfig;
use crate::module::Module;
use mt_tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl StoredTensor {
    fn from_tensor(tensor: &Tensor) -> StoredTensor {
        StoredTensor {
            rows: tensor.shape().0,
            cols: tensor.shape().1,
            data: tensor.data().to_vec(),
        }
    }

    fn into_tensor(self) -> NnResult<Tensor> {
        Ok(Tensor::from_vec(self.rows, self.cols, self.data)?)
    }
}

/// Serialized form of a trained autoencoder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSnapshot {
    config: AutoencoderConfig,
    parameters: HashMap<String, StoredTensor>,
}

impl ModelSnapshot {
    /// Captures the configuration and current parameters of a module.
    pub fn capture<M: Module + ?Sized>(config: &AutoencoderConfig, module: &M) -> NnResult<Self> {
        let state = module.state_dict()?;
        let mut parameters = HashMap::new();
        for (name, tensor) in state {
            parameters.insert(name, StoredTensor::from_tensor(&tensor));
        }
        Ok(Self {
            config: config.clone(),
            parameters,
        })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Restores the stored parameters into a freshly built module.
    pub fn restore<M: Module + ?Sized>(self, module: &mut M) -> NnResult<()> {
        let state = self.into_state()?;
        module.load_state_dict(&state)?;
        Ok(())
    }

    /// Converts the snapshot into a plain state dictionary.
    pub fn into_state(self) -> NnResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        for (name, tensor) in self.parameters.into_iter() {
            state.insert(name, tensor.into_tensor()?);
        }
        Ok(state)
    }
}

fn open_existing(path: &Path) -> NnResult<File> {
    File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            NnError::NotFound {
                path: PathBuf::from(path),
            }
        } else {
            NnError::from(err)
        }
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` to `path` through a temporary sibling and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> NnResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let staged = staging_path(path);
    fs::write(&staged, bytes)?;
    fs::rename(&staged, path)?;
    Ok(())
}

/// Saves a snapshot in the compact binary format.
pub fn save_snapshot<P: AsRef<Path>>(snapshot: &ModelSnapshot, path: P) -> NnResult<()> {
    let bytes = bincode::serialize(snapshot)
        .map_err(|err| NnError::serialization(err.to_string()))?;
    write_atomic(path.as_ref(), &bytes)
}

/// Loads a binary snapshot, reporting a missing file as [`NnError::NotFound`].
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> NnResult<ModelSnapshot> {
    let reader = BufReader::new(open_existing(path.as_ref())?);
    bincode::deserialize_from(reader).map_err(|err| NnError::serialization(err.to_string()))
}

/// Saves a snapshot as pretty-printed JSON for inspection.
pub fn save_snapshot_json<P: AsRef<Path>>(snapshot: &ModelSnapshot, path: P) -> NnResult<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)
        .map_err(|err| NnError::serialization(err.to_string()))?;
    write_atomic(path.as_ref(), &bytes)
}

/// Loads a JSON snapshot.
pub fn load_snapshot_json<P: AsRef<Path>>(path: P) -> NnResult<ModelSnapshot> {
    let reader = BufReader::new(open_existing(path.as_ref())?);
    serde_json::from_reader(reader).map_err(|err| NnError::serialization(err.to_string()))
}
