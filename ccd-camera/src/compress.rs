//! Optional compression stage between encoding and delivery.
//!
//! FITS payloads go through the external `fpack` tile compressor; anything
//! else gets zlib deflate. Either way a failure abandons the delivery, a
//! partially compressed or silently uncompressed image is worse than none.

use std::io::Read;
use std::process::Command;

use flate2::read::ZlibDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::debug;

use crate::encode::EncodedImage;
use crate::error::{CameraError, CameraResult};

/// Deflates a payload at maximum compression. The output bound mirrors
/// zlib's `compressBound` so a single pass always completes.
pub fn deflate(data: &[u8]) -> CameraResult<Vec<u8>> {
    let bound = data.len() + data.len() / 64 + 16 + 3;
    let mut out = Vec::with_capacity(bound);
    let mut compressor = Compress::new(Compression::best(), true);
    let status = compressor
        .compress_vec(data, &mut out, FlushCompress::Finish)
        .map_err(|e| CameraError::Compression(format!("deflate failed: {e}")))?;
    if status != Status::StreamEnd {
        return Err(CameraError::Compression(
            "deflate did not reach end of stream".to_string(),
        ));
    }
    Ok(out)
}

/// Inflates a payload produced by [`deflate`]. Client-side helper.
pub fn inflate(data: &[u8]) -> CameraResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CameraError::Compression(format!("inflate failed: {e}")))?;
    Ok(out)
}

/// True when the external `fpack` compressor can be spawned.
pub fn fpack_available() -> bool {
    Command::new("fpack").arg("-V").output().is_ok()
}

/// Tile-compresses a FITS payload with the external `fpack` tool. Scratch
/// files live in a temporary directory that is removed on every path.
pub fn fpack(fits_bytes: &[u8]) -> CameraResult<Vec<u8>> {
    let dir = tempfile::tempdir()
        .map_err(|e| CameraError::Compression(format!("cannot create scratch dir: {e}")))?;
    let src = dir.path().join("frame.fits");
    std::fs::write(&src, fits_bytes)
        .map_err(|e| CameraError::Compression(format!("cannot stage frame for fpack: {e}")))?;

    let status = Command::new("fpack")
        .arg(&src)
        .status()
        .map_err(|e| CameraError::Compression(format!("fpack is not available: {e}")))?;
    if !status.success() {
        return Err(CameraError::Compression(format!(
            "fpack exited with {status}"
        )));
    }

    let packed = dir.path().join("frame.fits.fz");
    std::fs::read(&packed)
        .map_err(|e| CameraError::Compression(format!("cannot read fpack output: {e}")))
}

/// Applies the stage to an encoded image: `.fits` becomes `.fits.fz`,
/// everything else gains a `.z` suffix.
pub fn compress_payload(image: EncodedImage) -> CameraResult<EncodedImage> {
    let before = image.data.len();
    let (data, format) = if image.format == ".fits" {
        (fpack(&image.data)?, ".fits.fz".to_string())
    } else {
        (deflate(&image.data)?, format!("{}.z", image.format))
    };
    debug!(before, after = data.len(), format, "compressed image payload");
    Ok(EncodedImage { data, format })
}
