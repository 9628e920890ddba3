//! Laptop records to and from protobuf binary and JSON files.

use crate::pb::Laptop;
use prost::Message;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("cannot convert to JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pretty JSON rendering of a laptop, with enums as their numeric values.
pub fn to_json(laptop: &Laptop) -> Result<String, SerializerError> {
    Ok(serde_json::to_string_pretty(laptop)?)
}

pub fn from_json(json: &str) -> Result<Laptop, SerializerError> {
    Ok(serde_json::from_str(json)?)
}

pub fn write_binary_file(path: &Path, laptop: &Laptop) -> Result<(), SerializerError> {
    fs::write(path, laptop.encode_to_vec()).map_err(|source| SerializerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_binary_file(path: &Path) -> Result<Laptop, SerializerError> {
    let data = fs::read(path).map_err(|source| SerializerError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Laptop::decode(data.as_slice())?)
}

pub fn write_json_file(path: &Path, laptop: &Laptop) -> Result<(), SerializerError> {
    let json = to_json(laptop)?;
    fs::write(path, json).map_err(|source| SerializerError::Io {
        path: path.to_path_buf(),
        source,
    })
}
