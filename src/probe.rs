use image::ImageReader;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::error::ImageDecodeError;
use crate::storage::models::ImageDetail;

/// Read width and height from an image's header without decoding pixels.
pub fn probe_dimensions<R: Read + Seek>(
    path: &Path,
    reader: R,
) -> Result<ImageDetail, ImageDecodeError> {
    let reader = ImageReader::new(BufReader::new(reader))
        .with_guessed_format()
        .map_err(|source| ImageDecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|source| ImageDecodeError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(ImageDetail { width, height })
}
