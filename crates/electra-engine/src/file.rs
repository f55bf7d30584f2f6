//! Circuit file codec.
//!
//! A circuit file is either the JSON model document itself or a zip archive
//! holding that document as its first `.json` entry. The format is detected
//! from the content so uploads keep working whatever extension they carry,
//! and saves write back in the format that was read.

use std::{
    fs,
    io::{Cursor, Read, Write},
    path::Path,
};

use electra_core::{ElectraError, ElectraResult, GridModel};
use tempfile::NamedTempFile;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const DEFAULT_ENTRY: &str = "model.json";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CircuitFormat {
    #[default]
    Json,
    Zip {
        entry: String,
    },
}

impl CircuitFormat {
    pub fn zipped() -> Self {
        CircuitFormat::Zip {
            entry: DEFAULT_ENTRY.to_string(),
        }
    }
}

fn zip_error(err: zip::result::ZipError) -> ElectraError {
    ElectraError::Parse(format!("circuit archive: {err}"))
}

pub fn read_circuit(path: &Path) -> ElectraResult<(GridModel, CircuitFormat)> {
    let bytes = fs::read(path)?;
    parse_circuit(&bytes)
}

pub fn parse_circuit(bytes: &[u8]) -> ElectraResult<(GridModel, CircuitFormat)> {
    if !bytes.starts_with(ZIP_MAGIC) {
        let model = serde_json::from_slice(bytes)?;
        return Ok((model, CircuitFormat::Json));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_error)?;
        if !file.name().to_ascii_lowercase().ends_with(".json") {
            continue;
        }
        let entry = file.name().to_string();
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let model = serde_json::from_str(&contents)?;
        return Ok((model, CircuitFormat::Zip { entry }));
    }
    Err(ElectraError::Parse(
        "circuit archive contains no JSON model".into(),
    ))
}

pub fn encode_circuit(model: &GridModel, format: &CircuitFormat) -> ElectraResult<Vec<u8>> {
    let json = serde_json::to_vec_pretty(model)?;
    match format {
        CircuitFormat::Json => Ok(json),
        CircuitFormat::Zip { entry } => {
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            writer
                .start_file(
                    entry.as_str(),
                    FileOptions::default().compression_method(CompressionMethod::Deflated),
                )
                .map_err(zip_error)?;
            writer.write_all(&json)?;
            let cursor = writer.finish().map_err(zip_error)?;
            Ok(cursor.into_inner())
        }
    }
}

/// Write through a sibling temporary file so readers never see a torn circuit.
pub fn write_circuit(model: &GridModel, format: &CircuitFormat, path: &Path) -> ElectraResult<()> {
    let bytes = encode_circuit(model, format)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|e| ElectraError::Io(e.error))?;
    Ok(())
}
