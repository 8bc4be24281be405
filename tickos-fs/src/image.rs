//! Host image of a [`MemFs`](crate::MemFs)
//!
//! Lets the in-memory files outlive one run. The image is a single host
//! file holding every name, permission set and file body, encoded with
//! bincode behind a magic number and a format version.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tickos_api::Permissions;

/// "TKFS"
const MAGIC: u32 = 0x544b_4653;
const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageFile {
    name: String,
    permissions: u8,
    data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Image {
    magic: u32,
    version: u16,
    files: Vec<ImageFile>,
}

/// One file as stored in an image
pub(crate) type Entry = (String, Permissions, Vec<u8>);

#[derive(Debug)]
pub enum ImageError {
    Io(io::Error),
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
    /// The file does not start with the image magic number
    NotAnImage,
    UnsupportedVersion(u16),
    /// A stored file has an unusable name or permission bits
    BadEntry(String),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Io(err) => write!(f, "image I/O failed: {err}"),
            ImageError::Encode(err) => write!(f, "image encoding failed: {err}"),
            ImageError::Decode(err) => write!(f, "image is corrupt: {err}"),
            ImageError::NotAnImage => write!(f, "not a tickos file-system image"),
            ImageError::UnsupportedVersion(version) => {
                write!(f, "image format version {version} is not supported")
            }
            ImageError::BadEntry(name) => write!(f, "image entry `{name}` is invalid"),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageError::Io(err) => Some(err),
            ImageError::Encode(err) => Some(err),
            ImageError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        ImageError::Io(err)
    }
}

impl From<bincode::error::EncodeError> for ImageError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ImageError::Encode(err)
    }
}

impl From<bincode::error::DecodeError> for ImageError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ImageError::Decode(err)
    }
}

pub(crate) fn encode<'a>(
    entries: impl Iterator<Item = (&'a str, Permissions, &'a [u8])>,
) -> Result<Vec<u8>, ImageError> {
    let image = Image {
        magic: MAGIC,
        version: VERSION,
        files: entries
            .map(|(name, permissions, data)| ImageFile {
                name: name.to_string(),
                permissions: permissions.bits(),
                data: data.to_vec(),
            })
            .collect(),
    };
    Ok(bincode::serde::encode_to_vec(&image, bincode::config::standard())?)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Entry>, ImageError> {
    let (image, _): (Image, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|err| if bytes.len() < 4 { ImageError::NotAnImage } else { err.into() })?;
    if image.magic != MAGIC {
        return Err(ImageError::NotAnImage);
    }
    if image.version != VERSION {
        return Err(ImageError::UnsupportedVersion(image.version));
    }
    image
        .files
        .into_iter()
        .map(|file| match Permissions::from_bits(file.permissions) {
            Some(permissions) => Ok((file.name, permissions, file.data)),
            None => Err(ImageError::BadEntry(file.name)),
        })
        .collect()
}

/// Writes the image next to `path` first, then renames it into place
pub(crate) fn write(path: &Path, bytes: &[u8]) -> Result<(), ImageError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}
