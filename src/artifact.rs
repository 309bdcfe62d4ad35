use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Writes `value` as gzip-compressed JSON. Readers only ever observe the old
/// file or the complete new one: data goes to a `.tmp` sibling that is renamed
/// into place. Returns the compressed size in bytes.
pub fn write_json_gz<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let file = File::create(tmp_path)
        .with_context(|| format!("Failed to create temp artifact: {:?}", tmp_path))?;
    let mut encoder = GzEncoder::new(
        BufWriter::with_capacity(128 * 1024, file),
        Compression::default(),
    );
    serde_json::to_writer(&mut encoder, value)
        .with_context(|| format!("Failed to serialize artifact: {:?}", path))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("Failed to finish gzip stream: {:?}", tmp_path))?;
    writer.flush()?;
    drop(writer);

    fs::rename(tmp_path, path)
        .with_context(|| format!("Failed to rename temp artifact to: {:?}", path))?;

    let size = fs::metadata(path)
        .with_context(|| format!("Failed to get metadata for: {:?}", path))?
        .len();
    Ok(size)
}

pub fn read_json_gz<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("Failed to open artifact: {:?}", path))?;
    let reader = BufReader::with_capacity(256 * 1024, GzDecoder::new(file));
    serde_json::from_reader(reader).with_context(|| format!("Failed to parse artifact: {:?}", path))
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Rounds to two decimals for human-facing size fields.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
