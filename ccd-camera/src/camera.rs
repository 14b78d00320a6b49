//! The camera itself: chips, backend, sequencing and the completion
//! pipeline.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::chip::{BayerLayout, ChipState, ExposureStateHandle, FrameType};
use crate::compress;
use crate::config::CameraSettings;
use crate::context::{ObservationContext, SnoopEvent, SnoopSubscriptions, TelescopeSelection};
use crate::delivery::{DeliveryRouter, UploadSettings};
use crate::encode;
use crate::error::{CameraError, CameraResult};
use crate::exposure::{capture_pointing, ExposureLimits, PointingSnapshot, PollingControl};
use crate::fits::FitsHeader;
use crate::header::{synthesize, HeaderSettings};
use crate::sink::{PropertySink, PropertyState, PropertyUpdate, StreamChannel};
use crate::worker::CompletionWorker;

/// Which chip an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    Primary,
    Guide,
}

impl ChipSelect {
    pub fn exposure_property(self) -> &'static str {
        match self {
            ChipSelect::Primary => "CCD_EXPOSURE",
            ChipSelect::Guide => "GUIDER_EXPOSURE",
        }
    }

    pub fn abort_property(self) -> &'static str {
        match self {
            ChipSelect::Primary => "CCD_ABORT_EXPOSURE",
            ChipSelect::Guide => "GUIDER_ABORT_EXPOSURE",
        }
    }

    pub fn image_property(self) -> &'static str {
        match self {
            ChipSelect::Primary => "CCD1",
            ChipSelect::Guide => "CCD2",
        }
    }
}

/// What the vendor hardware can do. A plain descriptor; drivers fill it in
/// once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub can_abort: bool,
    pub can_bin: bool,
    pub can_subframe: bool,
    pub has_guide_head: bool,
    pub has_cooler: bool,
    pub has_bayer: bool,
    pub has_streaming: bool,
}

/// Vendor capture interface. The camera owns the backend; there is no
/// opaque callback pointer threading.
pub trait CaptureBackend: Send {
    fn start_exposure(&mut self, chip: ChipSelect, duration_s: f64) -> CameraResult<()>;
    fn abort_exposure(&mut self, chip: ChipSelect) -> CameraResult<()>;
}

/// Scripted backend for tests and bench setups.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub started: Vec<(ChipSelect, f64)>,
    pub aborts: u32,
    pub fail_start: bool,
    pub fail_abort: bool,
}

impl CaptureBackend for MockBackend {
    fn start_exposure(&mut self, chip: ChipSelect, duration_s: f64) -> CameraResult<()> {
        if self.fail_start {
            return Err(CameraError::DeviceIo("simulated start failure".to_string()));
        }
        self.started.push((chip, duration_s));
        Ok(())
    }

    fn abort_exposure(&mut self, _chip: ChipSelect) -> CameraResult<()> {
        self.aborts += 1;
        if self.fail_abort {
            return Err(CameraError::DeviceIo("simulated abort failure".to_string()));
        }
        Ok(())
    }
}

/// A CCD camera: one or two chips, a capture backend and the plumbing that
/// turns finished captures into delivered images.
pub struct CcdCamera<B: CaptureBackend> {
    name: String,
    capabilities: Capabilities,
    backend: B,
    primary: ChipState,
    guide: Option<ChipState>,
    pub context: ObservationContext,
    pub subscriptions: SnoopSubscriptions,
    limits: ExposureLimits,
    polling: PollingControl,
    router: DeliveryRouter,
    temperature: Option<f64>,
    bayer: Option<BayerLayout>,
    telescope: TelescopeSelection,
    wcs_enabled: bool,
    rotation: Option<f64>,
    telescope_name: Option<String>,
    observer: Option<String>,
    object_name: Option<String>,
    pointing: Option<PointingSnapshot>,
    loop_count: u32,
}

impl<B: CaptureBackend> CcdCamera<B> {
    pub fn new(
        name: &str,
        capabilities: Capabilities,
        backend: B,
        sink: Arc<dyn PropertySink>,
    ) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            backend,
            primary: ChipState::new(),
            guide: capabilities.has_guide_head.then(ChipState::new),
            context: ObservationContext::new(),
            subscriptions: SnoopSubscriptions::new(),
            limits: ExposureLimits::default(),
            polling: PollingControl::default(),
            router: DeliveryRouter::new(sink),
            temperature: None,
            bayer: None,
            telescope: TelescopeSelection::Primary,
            wcs_enabled: false,
            rotation: None,
            telescope_name: None,
            observer: None,
            object_name: None,
            pointing: None,
            loop_count: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn primary_chip(&self) -> &ChipState {
        &self.primary
    }

    pub fn primary_chip_mut(&mut self) -> &mut ChipState {
        &mut self.primary
    }

    pub fn guide_chip(&self) -> Option<&ChipState> {
        self.guide.as_ref()
    }

    pub fn guide_chip_mut(&mut self) -> Option<&mut ChipState> {
        self.guide.as_mut()
    }

    fn chip(&self, sel: ChipSelect) -> CameraResult<&ChipState> {
        match sel {
            ChipSelect::Primary => Ok(&self.primary),
            ChipSelect::Guide => self
                .guide
                .as_ref()
                .ok_or_else(|| CameraError::Validation("camera has no guide head".to_string())),
        }
    }

    fn chip_mut(&mut self, sel: ChipSelect) -> CameraResult<&mut ChipState> {
        match sel {
            ChipSelect::Primary => Ok(&mut self.primary),
            ChipSelect::Guide => self
                .guide
                .as_mut()
                .ok_or_else(|| CameraError::Validation("camera has no guide head".to_string())),
        }
    }

    pub fn set_exposure_limits(&mut self, limits: ExposureLimits) {
        self.limits = limits;
    }

    pub fn exposure_limits(&self) -> ExposureLimits {
        self.limits
    }

    pub fn set_polling_period_ms(&mut self, period_ms: u64) {
        self.polling = PollingControl::new(period_ms);
    }

    /// Polling cadence the host should use right now.
    pub fn polling_period_ms(&self) -> u64 {
        self.polling.current_ms()
    }

    pub fn set_stream_channel(&mut self, stream: Option<Arc<dyn StreamChannel>>) {
        self.router.set_stream(stream);
    }

    pub fn set_temperature(&mut self, celsius: Option<f64>) {
        self.temperature = celsius;
    }

    pub fn set_bayer(&mut self, bayer: Option<BayerLayout>) {
        self.bayer = bayer;
    }

    pub fn set_telescope_name(&mut self, name: Option<&str>) {
        self.telescope_name = name.map(str::to_string);
    }

    pub fn set_observer(&mut self, name: Option<&str>) {
        self.observer = name.map(str::to_string);
    }

    pub fn set_object_name(&mut self, name: Option<&str>) {
        self.object_name = name.map(str::to_string);
    }

    pub fn set_telescope_selection(&mut self, selection: TelescopeSelection) {
        self.telescope = selection;
    }

    /// Number of identical exposures to run back to back. Looping only
    /// continues while uploads finish faster than the exposure itself.
    pub fn set_loop_count(&mut self, count: u32) {
        self.loop_count = count.max(1);
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Sets the rotation used for the WCS block. Until this is called the
    /// rotation is unknown and no WCS keywords are written.
    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = Some(degrees);
    }

    pub fn rotation(&self) -> Option<f64> {
        self.rotation
    }

    /// Enables or disables WCS keywords. Either toggle invalidates the
    /// rotation; it must be set again before the block reappears.
    pub fn set_wcs(&mut self, enabled: bool) {
        self.wcs_enabled = enabled;
        self.rotation = None;
    }

    pub fn wcs_enabled(&self) -> bool {
        self.wcs_enabled
    }

    pub fn upload_settings(&self) -> &UploadSettings {
        &self.router.settings
    }

    pub fn upload_settings_mut(&mut self) -> &mut UploadSettings {
        &mut self.router.settings
    }

    pub fn last_pointing(&self) -> Option<PointingSnapshot> {
        self.pointing
    }

    fn sink(&self) -> Arc<dyn PropertySink> {
        self.router.sink()
    }

    /// Routes one published upstream property update into the context.
    /// Returns whether this camera was subscribed to it.
    pub fn handle_snoop(&mut self, device: &str, property: &str, event: SnoopEvent) -> bool {
        if !self.subscriptions.matches(device, property) {
            return false;
        }
        self.context.ingest(event);
        true
    }

    /// Starts an exposure on the selected chip.
    ///
    /// Bias frames ignore the requested duration and expose at the device
    /// minimum. Any in-flight exposure is aborted first; a failed abort is
    /// only a warning. On success the chip goes Busy, the pointing snapshot
    /// is taken for Light frames and short exposures shorten the polling
    /// period.
    pub fn start_exposure(&mut self, sel: ChipSelect, requested_s: f64) -> CameraResult<()> {
        let exposure_property = sel.exposure_property();
        let (frame_type, busy) = {
            let chip = self.chip(sel)?;
            (
                chip.frame_type(),
                chip.exposure_state() == PropertyState::Busy,
            )
        };

        let duration = if frame_type == FrameType::Bias {
            self.limits.min
        } else {
            requested_s
        };
        if frame_type != FrameType::Bias && !self.limits.contains(duration) {
            let message = format!(
                "requested exposure {duration}s is out of range ({}s to {}s)",
                self.limits.min, self.limits.max
            );
            error!("{message}");
            self.chip(sel)?.set_exposure_state(PropertyState::Alert);
            self.sink().notify(PropertyUpdate::with_message(
                exposure_property,
                PropertyState::Alert,
                message.clone(),
            ));
            return Err(CameraError::Validation(message));
        }

        if busy {
            if let Err(e) = self.backend.abort_exposure(sel) {
                warn!("aborting exposure failed: {e}");
            }
        }

        self.chip_mut(sel)?.prepare_buffer();

        if let Err(e) = self.backend.start_exposure(sel, duration) {
            self.chip(sel)?.set_exposure_state(PropertyState::Alert);
            self.sink().notify(PropertyUpdate::with_message(
                exposure_property,
                PropertyState::Alert,
                e.to_string(),
            ));
            return Err(e);
        }

        let start = Utc::now();
        self.chip_mut(sel)?.begin_exposure(duration, start);
        if frame_type == FrameType::Light {
            self.pointing = capture_pointing(&self.context, start);
        }
        self.sink()
            .notify(PropertyUpdate::new(exposure_property, PropertyState::Busy));
        self.polling.shorten_for(duration);
        Ok(())
    }

    /// Aborts the selected chip's exposure. Always clears the busy state,
    /// zeroes the duration and restores polling; a device-level failure is
    /// reported on the abort property and returned.
    pub fn abort_exposure(&mut self, sel: ChipSelect) -> CameraResult<()> {
        let result = if self.capabilities.can_abort {
            self.backend.abort_exposure(sel)
        } else {
            Ok(())
        };

        self.chip_mut(sel)?.end_exposure();
        self.polling.restore();

        match result {
            Ok(()) => {
                self.sink().notify(PropertyUpdate::new(
                    sel.abort_property(),
                    PropertyState::Ok,
                ));
                self.sink().notify(PropertyUpdate::new(
                    sel.exposure_property(),
                    PropertyState::Idle,
                ));
                Ok(())
            }
            Err(e) => {
                error!("device abort failed: {e}");
                self.sink().notify(PropertyUpdate::with_message(
                    sel.abort_property(),
                    PropertyState::Alert,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    fn header_settings(&self) -> HeaderSettings {
        HeaderSettings {
            device_name: self.name.clone(),
            telescope_name: self.telescope_name.clone(),
            observer: self.observer.clone(),
            object_name: self.object_name.clone(),
            temperature: self.temperature,
            bayer: self.bayer.clone(),
            telescope: self.telescope,
            wcs_enabled: self.wcs_enabled,
            rotation: self.rotation,
        }
    }

    /// Builds the self-contained finishing job for a completed capture.
    fn finish_job(&self, sel: ChipSelect, send: bool, save: bool) -> CameraResult<FinishJob> {
        let chip = self.chip(sel)?;
        let header = synthesize(
            chip,
            &self.context,
            &self.header_settings(),
            self.pointing.as_ref(),
        );
        Ok(FinishJob {
            exposure_property: sel.exposure_property(),
            blob_property: sel.image_property(),
            width: chip.binned_width(),
            height: chip.binned_height(),
            planes: chip.planes(),
            bpp: chip.bpp(),
            extension: chip.image_extension().to_string(),
            compress: chip.compress_enabled(),
            header,
            buffer: chip.buffer_handle(),
            state: chip.state_handle(),
            router: self.router.clone(),
            send,
            save,
        })
    }

    /// Finishes a completed capture on the calling thread: synthesize the
    /// header, encode, compress, deliver, update the exposure state. Runs
    /// the next loop iteration when one is configured.
    pub fn exposure_complete(&mut self, sel: ChipSelect) -> CameraResult<()> {
        self.polling.restore();
        let mode = self.router.settings.mode;
        let job = self.finish_job(sel, mode.sends_to_client(), mode.saves_locally())?;
        job.run()?;
        self.continue_loop(sel)
    }

    /// Like [`Self::exposure_complete`] but hands the finishing work to a
    /// background worker. Errors past submission surface through the sink.
    pub fn exposure_complete_async(
        &mut self,
        sel: ChipSelect,
        worker: &CompletionWorker,
    ) -> CameraResult<()> {
        self.polling.restore();
        let mode = self.router.settings.mode;
        let job = self.finish_job(sel, mode.sends_to_client(), mode.saves_locally())?;
        worker.submit(move || {
            let _ = job.run();
        })
    }

    fn continue_loop(&mut self, sel: ChipSelect) -> CameraResult<()> {
        if self.loop_count <= 1 {
            return Ok(());
        }
        let (duration, start) = {
            let chip = self.chip(sel)?;
            (chip.exposure_duration(), chip.exposure_start())
        };
        let elapsed = start
            .map(|s| (Utc::now() - s).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let upload_time = elapsed - duration;
        debug!(upload_time, "exposure loop upload time");
        if upload_time < duration {
            self.loop_count -= 1;
            debug!(remaining = self.loop_count, "restarting looped exposure");
            self.start_exposure(sel, duration)
        } else {
            self.loop_count = 1;
            let message = format!(
                "rapid exposure not possible, upload time is {upload_time:.2} seconds"
            );
            error!("{message}");
            self.sink().notify(PropertyUpdate::with_message(
                sel.exposure_property(),
                PropertyState::Alert,
                message,
            ));
            Ok(())
        }
    }

    /// Snapshot of the persistable settings.
    pub fn settings(&self) -> CameraSettings {
        CameraSettings {
            upload: self.router.settings.clone(),
            compress_primary: self.primary.compress_enabled(),
            compress_guide: self
                .guide
                .as_ref()
                .map(ChipState::compress_enabled)
                .unwrap_or(false),
            telescope: self.telescope,
            wcs_enabled: self.wcs_enabled,
        }
    }

    pub fn apply_settings(&mut self, settings: CameraSettings) {
        self.router.settings = settings.upload;
        self.primary.set_compress(settings.compress_primary);
        if let Some(guide) = self.guide.as_mut() {
            guide.set_compress(settings.compress_guide);
        }
        self.telescope = settings.telescope;
        self.wcs_enabled = settings.wcs_enabled;
    }

    pub fn save_settings(&self, path: &Path) -> io::Result<()> {
        self.settings().save(path)
    }

    pub fn load_settings(&mut self, path: &Path) {
        self.apply_settings(CameraSettings::load(path));
    }
}

/// Everything needed to finish one capture, detached from the camera so it
/// can run on a worker thread. The frame buffer mutex is held across
/// encode, compress and deliver; the backend must not write into it while a
/// job runs.
pub struct FinishJob {
    exposure_property: &'static str,
    blob_property: &'static str,
    width: u32,
    height: u32,
    planes: u8,
    bpp: u8,
    extension: String,
    compress: bool,
    header: FitsHeader,
    buffer: Arc<Mutex<Vec<u8>>>,
    state: ExposureStateHandle,
    router: DeliveryRouter,
    send: bool,
    save: bool,
}

impl FinishJob {
    pub fn run(self) -> CameraResult<()> {
        let sink = self.router.sink();
        let state = self.state.clone();
        let exposure_property = self.exposure_property;
        match self.finish() {
            Ok(()) => {
                state.set(PropertyState::Ok);
                sink.notify(PropertyUpdate::new(exposure_property, PropertyState::Ok));
                Ok(())
            }
            Err(e) => {
                error!("image finishing failed: {e}");
                state.set(PropertyState::Alert);
                sink.notify(PropertyUpdate::with_message(
                    exposure_property,
                    PropertyState::Alert,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    fn finish(self) -> CameraResult<()> {
        let buffer = self.buffer.lock().unwrap();
        let image = if self.extension == "fits" {
            encode::to_fits(
                self.width,
                self.height,
                self.planes,
                self.bpp,
                &self.header,
                &buffer,
            )?
        } else {
            encode::passthrough(&buffer, &self.extension)
        };
        let image = if self.compress {
            compress::compress_payload(image)?
        } else {
            image
        };
        self.router
            .deliver(self.blob_property, &image, self.send, self.save)?;
        Ok(())
    }
}
