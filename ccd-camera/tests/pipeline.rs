//! End-to-end pipeline scenarios: expose, finish, deliver.

use std::sync::Arc;

use tempfile::TempDir;

use ccd_camera::camera::{Capabilities, CcdCamera, ChipSelect, MockBackend};
use ccd_camera::compress;
use ccd_camera::context::SnoopEvent;
use ccd_camera::error::CameraError;
use ccd_camera::fits::read_fits;
use ccd_camera::sink::{PropertyState, RecordingSink};
use ccd_camera::{CompletionWorker, UploadMode};

fn test_camera(dir: &TempDir, mode: UploadMode) -> (CcdCamera<MockBackend>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let caps = Capabilities {
        can_abort: true,
        can_bin: true,
        can_subframe: true,
        ..Default::default()
    };
    let mut camera = CcdCamera::new("Apex 455", caps, MockBackend::default(), sink.clone());
    camera
        .primary_chip_mut()
        .configure(1920, 1080, 16, 3.8, 3.8)
        .unwrap();
    let settings = camera.upload_settings_mut();
    settings.mode = mode;
    settings.directory = dir.path().to_path_buf();
    settings.prefix = "img_XXX".to_string();
    (camera, sink)
}

fn gradient_u16(count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * 2);
    for i in 0..count {
        data.extend_from_slice(&((i % 65536) as u16).to_ne_bytes());
    }
    data
}

fn seed_site_and_pointing(camera: &mut CcdCamera<MockBackend>) {
    camera.subscriptions.subscribe("Mount", "EQUATORIAL_EOD_COORD");
    camera.subscriptions.subscribe("Mount", "GEOGRAPHIC_COORD");
    assert!(camera.handle_snoop(
        "Mount",
        "EQUATORIAL_EOD_COORD",
        SnoopEvent::Equatorial {
            ra_hours: 10.5,
            dec_deg: 20.0,
        },
    ));
    assert!(camera.handle_snoop(
        "Mount",
        "GEOGRAPHIC_COORD",
        SnoopEvent::GeographicCoord {
            latitude: 34.0,
            longitude: 242.0,
        },
    ));
}

#[test]
fn light_exposure_end_to_end_produces_a_complete_fits_file() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Local);
    seed_site_and_pointing(&mut camera);

    camera.start_exposure(ChipSelect::Primary, 2.0).unwrap();
    assert_eq!(
        camera.primary_chip().exposure_state(),
        PropertyState::Busy
    );

    camera
        .primary_chip_mut()
        .load_frame(&gradient_u16(1920 * 1080));
    camera.exposure_complete(ChipSelect::Primary).unwrap();

    assert_eq!(camera.primary_chip().exposure_state(), PropertyState::Ok);
    assert_eq!(
        sink.states_for("CCD_EXPOSURE"),
        vec![PropertyState::Busy, PropertyState::Ok]
    );

    let saved = dir.path().join("img_001.fits");
    assert!(saved.exists());
    let bytes = std::fs::read(&saved).unwrap();
    assert_eq!(bytes.len() % 2880, 0);

    let parsed = read_fits(&bytes).unwrap();
    assert_eq!((parsed.width, parsed.height), (1920, 1080));
    assert_eq!(parsed.bpp, 16);
    assert_eq!(parsed.card("EXPTIME"), Some("2.000000"));
    assert_eq!(parsed.card_i64("XBINNING"), Some(1));
    assert_eq!(parsed.card_str("INSTRUME").as_deref(), Some("Apex 455"));
    assert_eq!(parsed.card_str("FRAME").as_deref(), Some("Light"));
    assert!(parsed.card("DATE-OBS").is_some());

    // Pointing keywords: RA precessed to J2000 stays close to the snooped
    // 10.5 hours, and airmass is strictly above one.
    let objctra = parsed.card_str("OBJCTRA").unwrap();
    let fields: Vec<f64> = objctra
        .split_whitespace()
        .map(|f| f.parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 3);
    let ra_hours = fields[0] + fields[1] / 60.0 + fields[2] / 3600.0;
    assert!((ra_hours - 10.5).abs() < 0.1, "{objctra}");

    let airmass = parsed.card_f64("AIRMASS").unwrap();
    assert!(airmass > 1.0);
    assert_eq!(parsed.card_f64("SITELONG"), Some(-118.0));

    // Pixel data round-trips bit for bit.
    assert_eq!(parsed.data, gradient_u16(1920 * 1080));
}

#[test]
fn both_mode_saves_and_sends() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Both);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();

    camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
    camera.primary_chip_mut().load_frame(&gradient_u16(64 * 48));
    camera.exposure_complete(ChipSelect::Primary).unwrap();

    assert!(dir.path().join("img_001.fits").exists());
    let blobs = sink.blobs();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].property, "CCD1");
    assert_eq!(blobs[0].format, ".fits");
    assert_eq!(read_fits(&blobs[0].data).unwrap().width, 64);
    assert_eq!(
        sink.states_for("CCD_FILE_PATH"),
        vec![PropertyState::Ok]
    );
}

#[test]
fn background_worker_finishes_the_frame() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Both);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();

    let worker = CompletionWorker::new(4);
    camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
    camera.primary_chip_mut().load_frame(&gradient_u16(64 * 48));
    camera
        .exposure_complete_async(ChipSelect::Primary, &worker)
        .unwrap();
    worker.wait_for_completion();

    assert_eq!(camera.primary_chip().exposure_state(), PropertyState::Ok);
    assert!(dir.path().join("img_001.fits").exists());
    assert_eq!(sink.blobs().len(), 1);
}

#[test]
fn buffer_geometry_mismatch_fails_the_exposure() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Both);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();

    camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
    camera.primary_chip_mut().load_frame(&[0u8; 10]);
    let err = camera.exposure_complete(ChipSelect::Primary).unwrap_err();

    assert!(matches!(err, CameraError::Encoding(_)));
    assert_eq!(
        camera.primary_chip().exposure_state(),
        PropertyState::Alert
    );
    assert!(sink.blobs().is_empty());
    assert!(!dir.path().join("img_001.fits").exists());
    assert_eq!(
        sink.states_for("CCD_EXPOSURE"),
        vec![PropertyState::Busy, PropertyState::Alert]
    );
}

#[test]
fn vendor_payloads_pass_through_and_deflate() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Client);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();
    camera.primary_chip_mut().set_image_extension("nef");
    camera.primary_chip_mut().set_compress(true);

    let raw: Vec<u8> = vec![42; 4096];
    camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
    camera.primary_chip_mut().load_frame(&raw);
    camera.exposure_complete(ChipSelect::Primary).unwrap();

    let blobs = sink.blobs();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].format, ".nef.z");
    assert_eq!(compress::inflate(&blobs[0].data).unwrap(), raw);
}

#[test]
fn compressed_fits_uses_fpack_when_available() {
    let dir = TempDir::new().unwrap();
    let (mut camera, sink) = test_camera(&dir, UploadMode::Client);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();
    camera.primary_chip_mut().set_compress(true);

    camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
    camera.primary_chip_mut().load_frame(&gradient_u16(64 * 48));
    let result = camera.exposure_complete(ChipSelect::Primary);

    if compress::fpack_available() {
        result.unwrap();
        let blobs = sink.blobs();
        assert_eq!(blobs[0].format, ".fits.fz");
    } else {
        // No tool, no fallback: compression failure abandons the delivery.
        assert!(matches!(result.unwrap_err(), CameraError::Compression(_)));
        assert!(sink.blobs().is_empty());
        assert_eq!(
            camera.primary_chip().exposure_state(),
            PropertyState::Alert
        );
    }
}

#[test]
fn exposure_looping_restarts_while_uploads_keep_up() {
    let dir = TempDir::new().unwrap();
    let (mut camera, _sink) = test_camera(&dir, UploadMode::Local);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();
    camera.set_loop_count(3);

    camera.start_exposure(ChipSelect::Primary, 0.5).unwrap();
    camera.primary_chip_mut().load_frame(&gradient_u16(64 * 48));
    camera.exposure_complete(ChipSelect::Primary).unwrap();

    // Delivery was effectively instant, so the next loop iteration started.
    assert_eq!(camera.loop_count(), 2);
    assert_eq!(camera.backend().started.len(), 2);
    assert_eq!(
        camera.primary_chip().exposure_state(),
        PropertyState::Busy
    );
    assert!(dir.path().join("img_001.fits").exists());
}

#[test]
fn sequence_indices_advance_across_exposures() {
    let dir = TempDir::new().unwrap();
    let (mut camera, _sink) = test_camera(&dir, UploadMode::Local);
    camera
        .primary_chip_mut()
        .configure(64, 48, 16, 3.8, 3.8)
        .unwrap();

    for _ in 0..3 {
        camera.start_exposure(ChipSelect::Primary, 0.1).unwrap();
        camera.primary_chip_mut().load_frame(&gradient_u16(64 * 48));
        camera.exposure_complete(ChipSelect::Primary).unwrap();
    }
    assert!(dir.path().join("img_001.fits").exists());
    assert!(dir.path().join("img_002.fits").exists());
    assert!(dir.path().join("img_003.fits").exists());
}
