//! In-memory scenario folder archives (tar, zstd-compressed).
use std::path::Path;

use tar::{Archive, Builder};
use zstd::{Decoder, Encoder};

use crate::error::{AppError, AppResult, DistributedError};

const COMPRESSION_LEVEL: i32 = 3;

fn archive_err(context: &'static str) -> impl Fn(std::io::Error) -> AppError {
    move |err| {
        AppError::distributed(DistributedError::Archive {
            context,
            source: err,
        })
    }
}

/// Packs every file under `folder` into a compressed tarball.
///
/// # Errors
///
/// Returns an error when the folder cannot be read or compressed.
pub fn pack_folder(folder: &Path) -> AppResult<Vec<u8>> {
    let encoder = Encoder::new(Vec::new(), COMPRESSION_LEVEL).map_err(archive_err("init zstd"))?;
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(true);
    builder
        .append_dir_all(".", folder)
        .map_err(archive_err("archive scenario folder"))?;
    let encoder = builder
        .into_inner()
        .map_err(archive_err("finish tar stream"))?;
    encoder.finish().map_err(archive_err("finish zstd stream"))
}

/// Unpacks a tarball produced by [`pack_folder`] into `dest`.
///
/// # Errors
///
/// Returns an error when the bytes are not a valid archive or the files
/// cannot be written.
pub fn unpack_into(bytes: &[u8], dest: &Path) -> AppResult<()> {
    let decoder = Decoder::new(bytes).map_err(archive_err("init zstd"))?;
    let mut archive = Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(archive_err("unpack scenario folder"))
}
