use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::types::ClusterSnapshot;

/// Open a file for reading, decompressing transparently when the path ends
/// in `.gz`.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let file =
        File::open(path).with_context(|| format!("opening input file {}", path.display()))?;
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Create a file for writing, compressing transparently when the path ends
/// in `.gz`.
pub fn create_output(path: &Path) -> Result<Box<dyn Write>> {
    let file =
        File::create(path).with_context(|| format!("creating output file {}", path.display()))?;
    if is_gzip(path) {
        Ok(Box::new(GzEncoder::new(BufWriter::new(file), Compression::default())))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Load a kubectl-style document: the condenser's own output shape, keyed
/// by cluster name, ready for (re-)analysis.
pub fn load_condensed(reader: impl Read) -> Result<BTreeMap<String, ClusterSnapshot>> {
    serde_json::from_reader(reader).context("parsing condensed cluster document")
}

/// Load a model document: a stream of JSON records, either one top-level
/// array or newline-delimited objects.
pub fn load_model_records(mut reader: impl Read) -> Result<Vec<Value>> {
    let mut text = String::new();
    reader.read_to_string(&mut text).context("reading model document")?;
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("parsing model record array");
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).context("parsing model record line"))
        .collect()
}

/// Serialize the condensed snapshot map to `path` (gzipped JSON when the
/// path asks for it).
pub fn write_condensed(
    clusters: &BTreeMap<String, ClusterSnapshot>,
    path: &Path,
) -> Result<()> {
    let mut out = create_output(path)?;
    serde_json::to_writer(&mut out, clusters)
        .with_context(|| format!("writing condensed clusters to {}", path.display()))?;
    out.flush().context("flushing output")?;
    Ok(())
}
