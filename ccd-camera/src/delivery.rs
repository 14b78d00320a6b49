//! Routes finished images to the client, the local filesystem, or both.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::encode::EncodedImage;
use crate::error::{CameraError, CameraResult};
use crate::sink::{PropertySink, PropertyState, PropertyUpdate, StreamChannel};

/// Where finished images go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadMode {
    #[default]
    Client,
    Local,
    Both,
}

impl UploadMode {
    pub fn sends_to_client(self) -> bool {
        matches!(self, UploadMode::Client | UploadMode::Both)
    }

    pub fn saves_locally(self) -> bool {
        matches!(self, UploadMode::Local | UploadMode::Both)
    }
}

/// Local save location and filename template.
///
/// The prefix supports two placeholders: `XXX` expands to the next
/// zero-padded sequence index in the target directory, `ISO8601` to the
/// local wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    pub mode: UploadMode,
    pub directory: PathBuf,
    pub prefix: String,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            mode: UploadMode::Client,
            directory: PathBuf::from("."),
            prefix: "IMAGE_XXX".to_string(),
        }
    }
}

fn create_directory(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(dir)
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)
}

/// Next free sequence index for the given prefix: existing entries sharing
/// the static part of the prefix are scanned, the digits between the last
/// `_` and the last `.` parsed, and the maximum plus one returned. An empty
/// or fresh directory yields 1.
pub fn next_file_index(dir: &Path, prefix: &str) -> std::io::Result<u32> {
    let static_prefix = prefix.replace("_ISO8601", "").replace("_XXX", "");

    if !dir.exists() {
        // Creation failure is only logged; the scan below reports the
        // unusable directory.
        if let Err(e) = create_directory(dir) {
            error!(dir = %dir.display(), "cannot create upload directory: {e}");
        }
    }

    let mut max_index = 0u32;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.contains(static_prefix.as_str()) {
            continue;
        }
        if let Some(pos) = name.rfind('_') {
            let digits: String = name[pos + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(index) = digits.parse::<u32>() {
                max_index = max_index.max(index);
            }
        }
    }
    Ok(max_index + 1)
}

/// Expands the prefix placeholders and appends the payload format suffix.
pub fn resolve_filename(settings: &UploadSettings, format: &str, index: u32) -> String {
    let stamped = settings
        .prefix
        .replace("ISO8601", &Local::now().format("%Y-%m-%dT%H-%M-%S").to_string());
    let named = stamped.replace("XXX", &format!("{index:03}"));
    format!("{named}{format}")
}

/// Fans a finished image out to its destinations.
#[derive(Clone)]
pub struct DeliveryRouter {
    pub settings: UploadSettings,
    sink: Arc<dyn PropertySink>,
    stream: Option<Arc<dyn StreamChannel>>,
}

impl DeliveryRouter {
    pub fn new(sink: Arc<dyn PropertySink>) -> Self {
        Self {
            settings: UploadSettings::default(),
            sink,
            stream: None,
        }
    }

    pub fn set_stream(&mut self, stream: Option<Arc<dyn StreamChannel>>) {
        self.stream = stream;
    }

    pub fn sink(&self) -> Arc<dyn PropertySink> {
        Arc::clone(&self.sink)
    }

    /// Delivers one image. Returns the saved path when a local copy was
    /// written.
    pub fn deliver(
        &self,
        blob_property: &str,
        image: &EncodedImage,
        send: bool,
        save: bool,
    ) -> CameraResult<Option<PathBuf>> {
        let mut saved = None;
        if save {
            let path = self.save_locally(image)?;
            self.sink.notify(PropertyUpdate::with_message(
                "CCD_FILE_PATH",
                PropertyState::Ok,
                path.display().to_string(),
            ));
            saved = Some(path);
        }
        if send {
            let started = Instant::now();
            match &self.stream {
                Some(stream) => {
                    stream.send_text(&image.format)?;
                    stream.send_binary(&image.data)?;
                }
                None => self.sink.send_blob(blob_property, &image.format, &image.data),
            }
            debug!(
                bytes = image.data.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "image dispatched to client"
            );
        }
        Ok(saved)
    }

    fn save_locally(&self, image: &EncodedImage) -> CameraResult<PathBuf> {
        let dir = &self.settings.directory;
        let index = next_file_index(dir, &self.settings.prefix).map_err(|e| {
            CameraError::Delivery(format!(
                "error iterating directory {}: {e}",
                dir.display()
            ))
        })?;
        let path = dir.join(resolve_filename(&self.settings, &image.format, index));

        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = File::create(path)?;
            file.write_all(&image.data)
        };
        if let Err(e) = write(&path) {
            // A truncated image would poison the sequence index scan.
            let _ = std::fs::remove_file(&path);
            return Err(CameraError::Delivery(format!(
                "unable to save image file {}: {e}",
                path.display()
            )));
        }
        info!(path = %path.display(), "image saved");
        Ok(path)
    }
}
