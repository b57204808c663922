//! ZIP bundles produced by archiving and export.
//!
//! Entry names are the logical object paths, so extracting a bundle at the
//! store root reproduces the original folder layout.

use std::io::{Cursor, Read, Write};

use time::OffsetDateTime;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::{BundleCompression, BundleConfig};
use crate::error::{Error, Result};
use crate::lifecycle::sweep::Sweeper;
use crate::storage::join_path;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Upper bound on the buffer reserved from an entry's declared size. The
/// header is untrusted; larger entries grow the buffer as they are read.
const MAX_ENTRY_PREALLOC: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Archive,
    Export,
}

impl BundleKind {
    fn stem(self) -> &'static str {
        match self {
            BundleKind::Archive => "archive",
            BundleKind::Export => "export",
        }
    }
}

/// `<kind>_<YYYY-MM-DD>.zip`, with `_<n>` appended for the n-th bundle of
/// the same kind on the same day.
pub fn bundle_name(kind: BundleKind, at: OffsetDateTime, seq: u32) -> String {
    let date = format_date(at);
    if seq == 0 {
        format!("{}_{date}.zip", kind.stem())
    } else {
        format!("{}_{date}_{seq}.zip", kind.stem())
    }
}

fn format_date(at: OffsetDateTime) -> String {
    let date = at.date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    )
}

/// First free bundle path in `folder` for `kind` on the UTC day of `at`.
pub async fn unique_bundle_path(
    sweeper: &Sweeper,
    folder: &str,
    kind: BundleKind,
    at: OffsetDateTime,
) -> Result<String> {
    for seq in 0..MAX_NAME_ATTEMPTS {
        let path = join_path(folder, &bundle_name(kind, at, seq));
        if sweeper.head(&path).await?.is_none() {
            return Ok(path);
        }
    }
    Err(Error::Packaging(format!(
        "no free {} bundle name left in {folder}",
        kind.stem()
    )))
}

/// Finalized bundle ready for upload.
#[derive(Debug)]
pub struct FinishedBundle {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

/// In-memory ZIP writer. Nothing leaves memory until the caller uploads
/// the finished bytes, so dropping a writer discards the partial bundle.
pub struct BundleWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
    entries: Vec<String>,
}

impl BundleWriter {
    pub fn new(config: &BundleConfig) -> Self {
        let method = match config.compression {
            BundleCompression::Stored => CompressionMethod::Stored,
            BundleCompression::Deflated => CompressionMethod::Deflated,
            BundleCompression::Zstd => CompressionMethod::Zstd,
        };
        let options = FileOptions::default()
            .compression_method(method)
            .compression_level(config.level)
            .large_file(true)
            .unix_permissions(0o644);
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, bytes: &[u8], modified: Option<OffsetDateTime>) -> Result<()> {
        let mut options = self.options;
        if let Some(stamp) = modified.and_then(zip_time) {
            options = options.last_modified_time(stamp);
        }
        self.zip.start_file(name, options)?;
        self.zip.write_all(bytes)?;
        self.entries.push(name.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(mut self) -> Result<FinishedBundle> {
        let cursor = self.zip.finish()?;
        Ok(FinishedBundle {
            bytes: cursor.into_inner(),
            entries: self.entries,
        })
    }
}

/// ZIP timestamps cover 1980..=2107; anything else keeps the default.
fn zip_time(at: OffsetDateTime) -> Option<zip::DateTime> {
    let year = u16::try_from(at.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
    )
    .ok()
}

/// Entry names of a bundle, in archive order.
pub fn read_bundle_entries(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index(index)?.name().to_string());
    }
    Ok(names)
}

/// Contents of one bundle entry.
pub fn read_bundle_entry(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entry = archive.by_name(name)?;
    let mut out = Vec::with_capacity(entry.size().min(MAX_ENTRY_PREALLOC) as usize);
    entry.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_bundle_names() {
        let at = datetime!(2026-03-07 23:59:59 UTC);
        assert_eq!(bundle_name(BundleKind::Archive, at, 0), "archive_2026-03-07.zip");
        assert_eq!(bundle_name(BundleKind::Export, at, 2), "export_2026-03-07_2.zip");
    }

    #[test]
    fn test_entries_keep_logical_paths() -> anyhow::Result<()> {
        for compression in [
            BundleCompression::Stored,
            BundleCompression::Deflated,
            BundleCompression::Zstd,
        ] {
            let config = BundleConfig {
                compression,
                level: None,
            };
            let mut writer = BundleWriter::new(&config);
            writer.add("processed/a/one.json", br#"{"title":"one"}"#, None)?;
            writer.add("raw/manual.txt", &b"text ".repeat(200), Some(OffsetDateTime::now_utc()))?;
            assert_eq!(writer.len(), 2);

            let bundle = writer.finish()?;
            assert_eq!(
                read_bundle_entries(&bundle.bytes)?,
                vec!["processed/a/one.json".to_string(), "raw/manual.txt".to_string()]
            );
            assert_eq!(
                read_bundle_entry(&bundle.bytes, "raw/manual.txt")?,
                b"text ".repeat(200)
            );
        }
        Ok(())
    }

    #[test]
    fn test_out_of_range_time_is_ignored() {
        assert!(zip_time(datetime!(1970-01-01 00:00 UTC)).is_none());
        assert!(zip_time(datetime!(2024-02-29 12:30:15 UTC)).is_some());
    }

    #[test]
    fn test_entry_larger_than_prealloc_reads_fully() -> anyhow::Result<()> {
        let config = BundleConfig {
            compression: BundleCompression::Stored,
            level: None,
        };
        let body = vec![7u8; (MAX_ENTRY_PREALLOC as usize) * 3 + 11];
        let mut writer = BundleWriter::new(&config);
        writer.add("uploads/big.bin", &body, None)?;
        let bundle = writer.finish()?;

        assert_eq!(read_bundle_entry(&bundle.bytes, "uploads/big.bin")?, body);
        Ok(())
    }

    #[test]
    fn test_empty_bundle_is_valid_zip() -> anyhow::Result<()> {
        let bundle = BundleWriter::new(&BundleConfig::default()).finish()?;
        assert!(read_bundle_entries(&bundle.bytes)?.is_empty());
        Ok(())
    }
}
