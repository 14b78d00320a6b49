//! Turns a captured frame buffer into a deliverable payload.

use crate::error::{CameraError, CameraResult};
use crate::fits::{write_fits, FitsHeader};

/// An encoded frame ready for compression or delivery. `format` is the file
/// suffix including the leading dot, e.g. `".fits"` or `".nef"`.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: String,
}

/// Encodes a frame buffer as FITS. The buffer length must match the stated
/// geometry exactly; a mismatch means the capture and the chip state
/// disagree and nothing gets delivered.
pub fn to_fits(
    width: u32,
    height: u32,
    planes: u8,
    bpp: u8,
    header: &FitsHeader,
    pixels: &[u8],
) -> CameraResult<EncodedImage> {
    let data = write_fits(width, height, planes, bpp, header, pixels)
        .map_err(CameraError::from)?;
    Ok(EncodedImage {
        data,
        format: ".fits".to_string(),
    })
}

/// Passes a vendor-native payload (e.g. raw DSLR formats) through untouched.
pub fn passthrough(pixels: &[u8], extension: &str) -> EncodedImage {
    EncodedImage {
        data: pixels.to_vec(),
        format: format!(".{extension}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::{read_fits, BLOCK_SIZE};

    #[test]
    fn fits_payload_is_block_aligned() {
        let pixels = vec![0u8; 64 * 48 * 2];
        let image = to_fits(64, 48, 1, 16, &FitsHeader::new(), &pixels).unwrap();
        assert_eq!(image.format, ".fits");
        assert_eq!(image.data.len() % BLOCK_SIZE, 0);
        assert_eq!(read_fits(&image.data).unwrap().width, 64);
    }

    #[test]
    fn geometry_mismatch_is_an_encoding_error() {
        let err = to_fits(64, 48, 1, 16, &FitsHeader::new(), &[0u8; 100]).unwrap_err();
        assert!(matches!(err, CameraError::Encoding(_)));
    }

    #[test]
    fn passthrough_keeps_bytes_and_names_the_format() {
        let image = passthrough(&[9, 8, 7], "nef");
        assert_eq!(image.format, ".nef");
        assert_eq!(image.data, vec![9, 8, 7]);
    }
}
