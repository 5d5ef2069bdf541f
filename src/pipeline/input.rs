//! Input resolution: validate the user-supplied path, turn raw bytes into
//! UTF-8 text, and derive the output path.
//!
//! ## Why decode up front?
//!
//! FB2 files are frequently stored in `windows-1251` or `koi8-r` rather than
//! UTF-8. The output is always UTF-8, so the whole document is transcoded
//! once here and the XML layer only ever sees `&str`.

use crate::config::OUTPUT_PREFIX;
use crate::error::Fb2CompressError;
use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable regular file.
pub fn resolve_input(path: &Path) -> Result<PathBuf, Fb2CompressError> {
    if !path.is_file() {
        return Err(Fb2CompressError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Fb2CompressError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(Fb2CompressError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    debug!("Resolved local FB2: {}", path.display());
    Ok(path.to_path_buf())
}

/// Output path for `input`: same directory, file name prefixed with
/// [`OUTPUT_PREFIX`].
///
/// `books/war.fb2` → `books/compress_war.fb2`. An existing file at that path
/// is overwritten.
pub fn output_path_for(input: &Path) -> Result<PathBuf, Fb2CompressError> {
    let file_name = input
        .file_name()
        .ok_or_else(|| Fb2CompressError::InvalidOutputPath {
            path: input.to_path_buf(),
        })?;

    let mut name = OsString::from(OUTPUT_PREFIX);
    name.push(file_name);

    Ok(match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    })
}

/// Decode raw document bytes to UTF-8 text.
///
/// Precedence: byte-order mark, then the `encoding` pseudo-attribute of the
/// XML declaration, then UTF-8. The BOM is stripped from the result.
pub fn decode_document(bytes: &[u8]) -> Result<(String, &'static Encoding), Fb2CompressError> {
    let encoding = match Encoding::for_bom(bytes) {
        Some((enc, _)) => enc,
        None => match declared_encoding(bytes)? {
            Some(enc) => enc,
            None => UTF_8,
        },
    };

    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(Fb2CompressError::Parse {
            detail: format!("document contains invalid {} byte sequences", actual.name()),
        });
    }

    debug!("Document decoded as {}", actual.name());
    Ok((text.into_owned(), actual))
}

/// Encoding named by the XML declaration, if the document starts with one.
fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>, Fb2CompressError> {
    // The declaration is ASCII in every encoding we accept, so reading it
    // as UTF-8 is safe even before the real encoding is known.
    let mut reader = Reader::from_reader(bytes);
    let decl = match reader.read_event() {
        Ok(Event::Decl(decl)) => decl,
        _ => return Ok(None),
    };

    let label = match decl.encoding() {
        Some(Ok(label)) => label,
        _ => return Ok(None),
    };

    match Encoding::for_label(&label) {
        Some(enc) => Ok(Some(enc)),
        None => Err(Fb2CompressError::UnsupportedEncoding {
            label: String::from_utf8_lossy(&label).into_owned(),
        }),
    }
}
