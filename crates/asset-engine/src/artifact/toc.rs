//! Archive table-of-contents cache.
//!
//! A TOC is the newline-separated list of an archive's non-directory entry
//! paths, persisted under `tocs/<bucket>/<blobname>` in the cache bucket.
//! Archives are immutable once published, so a TOC is created once and never
//! invalidated; a cached TOC lets a lookup confirm absence without
//! re-downloading the archive.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use bytes::Bytes;
use zip::ZipArchive;
use zip::result::ZipError;

pub(crate) fn toc_key(bucket: &str, blobname: &str) -> String {
    format!("tocs/{bucket}/{blobname}")
}

/// Parse a persisted TOC into its path set.
pub(crate) fn parse(blob: &[u8]) -> HashSet<String> {
    String::from_utf8_lossy(blob)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encode entry paths for persistence, one per line.
pub(crate) fn encode(entries: &[String]) -> String {
    let mut toc = String::new();
    for entry in entries {
        toc.push_str(entry);
        toc.push('\n');
    }
    toc
}

/// List all non-directory entry paths of a zip archive held in memory.
pub(crate) fn list_entries(archive: &Bytes) -> Result<Vec<String>, ZipError> {
    let reader = Cursor::new(archive.as_ref());
    let zip = ZipArchive::new(reader)?;
    Ok(zip
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// Extract one entry's bytes from a zip archive held in memory.
pub(crate) fn read_entry(archive: &Bytes, path: &str) -> Result<Bytes, ZipError> {
    let reader = Cursor::new(archive.as_ref());
    let mut zip = ZipArchive::new(reader)?;
    let mut file = zip.by_name(path)?;
    let mut content = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut content)?;
    Ok(Bytes::from(content))
}
