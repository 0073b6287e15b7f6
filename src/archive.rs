//! Unwrapping fetched archives into text payloads.
//!
//! A bulk archive is usually a zip holding one concatenated-XML member, but
//! mirrors also serve single compressed streams or plain files. This module
//! turns the raw bytes into one [`SubFile`] per text payload.
//!
//! ## Detection
//! 1. Zip containers are recognized by their local-header magic and yield
//!    every non-directory member (feature: `archive-zip`).
//! 2. Single-stream codecs come from a pluggable registry, matched by magic
//!    bytes first and by the URL extension second:
//!    - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//!    - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//!    - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//!    - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//! 3. Anything else is taken as plain text.
//!
//! Payloads are decoded as UTF-8. Invalid sequences are replaced rather than
//! rejected, because archives occasionally switch encoding between records and
//! the damage stays local to the record that carries it.
//!
//! ## Custom codecs
//! ```
//! use ironsift::archive::{register_codec, CompressionCodec};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! struct Identity;
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn<'a>(&self, r: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
//!         Ok(r)
//!     }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use crate::partition::file_name_of;
use anyhow::{Context, Result};
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// One decoded text payload of an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubFile {
    /// Member name inside the archive, or the URL file name.
    pub name: String,
    pub text: String,
}

/// Global codec registry for pluggable decompression.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

/// Initialize the codec registry with built-in codecs.
fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec alongside the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// Pluggable single-stream decompression codec.
///
/// Implementations must be `Send + Sync`; they live in a global registry
/// shared by all workers.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Lowercase file extensions with the leading dot (e.g. `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>>;
}

fn detect_from_magic(bytes: &[u8]) -> Option<Arc<dyn CompressionCodec>> {
    get_registry()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| bytes.starts_with(magic)))
}

fn detect_from_extension(name: &str) -> Option<(Arc<dyn CompressionCodec>, usize)> {
    let lower = name.to_lowercase();
    get_registry().into_iter().find_map(|codec| {
        let ext_len = codec
            .extensions()
            .iter()
            .find(|ext| lower.ends_with(**ext))
            .map(|ext| ext.len())?;
        Some((codec, ext_len))
    })
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Decode fetched archive bytes into text payloads.
///
/// `url` is only used for naming and as a detection hint.
///
/// # Errors
/// Returns an error if a detected container or codec cannot be read.
pub fn decode_archive(bytes: &[u8], url: &str) -> Result<Vec<SubFile>> {
    let file_name = file_name_of(url);

    if bytes.starts_with(ZIP_MAGIC) {
        return decode_zip(bytes, file_name);
    }

    let by_magic = detect_from_magic(bytes);
    let by_ext = detect_from_extension(file_name);
    let codec = by_magic.or_else(|| by_ext.as_ref().map(|(c, _)| Arc::clone(c)));

    let Some(codec) = codec else {
        return Ok(vec![SubFile {
            name: file_name.to_string(),
            text: decode_text(bytes.to_vec(), file_name),
        }]);
    };

    let mut reader = codec
        .wrap_reader_dyn(Box::new(bytes))
        .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
    let mut raw = Vec::new();
    reader
        .read_to_end(&mut raw)
        .with_context(|| format!("decompress {file_name} with {}", codec.name()))?;

    let name = match &by_ext {
        Some((c, ext_len)) if c.name() == codec.name() => &file_name[..file_name.len() - ext_len],
        _ => file_name,
    };
    Ok(vec![SubFile {
        name: name.to_string(),
        text: decode_text(raw, name),
    }])
}

#[cfg(feature = "archive-zip")]
fn decode_zip(bytes: &[u8], file_name: &str) -> Result<Vec<SubFile>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .with_context(|| format!("open zip {file_name}"))?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .with_context(|| format!("zip member #{i} of {file_name}"))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        let mut raw = Vec::new();
        member
            .read_to_end(&mut raw)
            .with_context(|| format!("read {name} from {file_name}"))?;
        let text = decode_text(raw, &name);
        out.push(SubFile { name, text });
    }
    Ok(out)
}

#[cfg(not(feature = "archive-zip"))]
fn decode_zip(_bytes: &[u8], file_name: &str) -> Result<Vec<SubFile>> {
    anyhow::bail!("{file_name} is a zip archive but the `archive-zip` feature is disabled")
}

fn decode_text(raw: Vec<u8>, name: &str) -> String {
    match String::from_utf8(raw) {
        Ok(text) => text,
        Err(err) => {
            warn!(sub_file = name, valid_up_to = err.utf8_error().valid_up_to(), "invalid UTF-8, decoding lossily");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        // Bulk mirrors sometimes concatenate gzip members.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + 'a>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }
}
