// ============================================================================
// sensing.rs — Luxtree
// Frame sensing loop: a fixed-period timer that captures, mirrors, encodes
// and analyzes one frame at a time. Ticks that arrive while a cycle is still
// outstanding are dropped, never queued.
// ============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, RgbImage};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::analyzer::{AnalyzeError, Analyzer, EncodedFrame, GeminiAnalyzer};
use crate::config::{AppConfig, Vision};
use crate::control::ControlContext;
use crate::mapper;

pub const JPEG_QUALITY: u8 = 60;
pub const MAX_FRAME_WIDTH: u32 = 320;
pub const MAX_FRAME_HEIGHT: u32 = 240;
/// Frames smaller than this are treated as not yet buffered.
pub const MIN_FRAME_DIM: u32 = 16;

pub const STATUS_WAITING: &str = "Camera active. Waiting for hand...";
pub const STATUS_ANALYZING: &str = "Analyzing...";
pub const STATUS_NOT_READY: &str = "Camera not ready";
pub const STATUS_STOPPED: &str = "Vision stopped";
pub const STATUS_NO_KEY: &str = "Vision disabled (no API key)";
pub const STATUS_DISABLED: &str = "Vision disabled";

// ======================== Frame Sources ========================

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("frame source not ready")]
    NotReady,
    #[error("frame source I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame decode: {0}")]
    Decode(#[from] ImageError),
}

/// A live image source owned exclusively by the sensing loop. Dropping the
/// source releases the underlying device.
pub trait FrameSource: Send + 'static {
    fn capture(&mut self) -> Result<RgbImage, CaptureError>;

    fn describe(&self) -> String {
        String::from("frame source")
    }
}

/// Reads the latest frame from a file that an external grabber keeps
/// overwriting.
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(CaptureError::NotReady),
            Err(e) => return Err(e.into()),
        };
        if !is_complete(&bytes) {
            return Err(CaptureError::NotReady);
        }

        let image = match image::load_from_memory(&bytes) {
            Ok(image) => image.to_rgb8(),
            // The grabber is mid-write
            Err(ImageError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(CaptureError::NotReady)
            }
            Err(e) => return Err(e.into()),
        };

        if image.width() < MIN_FRAME_DIM || image.height() < MIN_FRAME_DIM {
            return Err(CaptureError::NotReady);
        }
        Ok(image)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_IEND: [u8; 8] = [b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82];

/// False while a grabber is still writing the file. JPEG must end with EOI and
/// PNG with the IEND chunk; other formats are left to the decoder.
fn is_complete(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        false
    } else if bytes.starts_with(&JPEG_SOI) {
        bytes.len() > JPEG_SOI.len() && bytes.ends_with(&JPEG_EOI)
    } else if bytes.starts_with(&PNG_SIGNATURE) {
        bytes.ends_with(&PNG_IEND)
    } else {
        true
    }
}

// ======================== Frame Encoding ========================

#[derive(Debug, thiserror::Error)]
#[error("frame encode: {0}")]
pub struct EncodeError(#[from] ImageError);

#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Blocking half of a cycle: read the source and compress the frame.
fn capture_and_encode<S: FrameSource>(source: &Mutex<S>) -> Result<EncodedFrame, FrameError> {
    let frame = source
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .capture()?;
    Ok(encode_frame(&frame)?)
}

/// Mirror horizontally (so motion matches an on-screen mirror), downscale to
/// the capture budget, and compress to JPEG.
pub fn encode_frame(frame: &RgbImage) -> Result<EncodedFrame, EncodeError> {
    let mut mirrored = imageops::flip_horizontal(frame);

    let (w, h) = mirrored.dimensions();
    if w > MAX_FRAME_WIDTH || h > MAX_FRAME_HEIGHT {
        let scale = (MAX_FRAME_WIDTH as f32 / w as f32).min(MAX_FRAME_HEIGHT as f32 / h as f32);
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        mirrored = imageops::resize(&mirrored, nw, nh, FilterType::Triangle);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&mirrored)?;

    Ok(EncodedFrame {
        jpeg,
        width: mirrored.width(),
        height: mirrored.height(),
    })
}

// ======================== Cycle Guard ========================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensingPhase {
    Idle,
    Capturing,
    Analyzing,
}

const PHASE_IDLE: u8 = 0;
const PHASE_CAPTURING: u8 = 1;
const PHASE_ANALYZING: u8 = 2;

/// Single-slot guard: a cycle starts only from Idle.
#[derive(Debug, Default)]
pub struct CycleGuard {
    phase: AtomicU8,
}

impl CycleGuard {
    /// Claim the slot (Idle -> Capturing). Returns false if a cycle is outstanding.
    pub fn try_begin(&self) -> bool {
        self.phase
            .compare_exchange(PHASE_IDLE, PHASE_CAPTURING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn mark_analyzing(&self) {
        self.phase.store(PHASE_ANALYZING, Ordering::Release);
    }

    fn finish(&self) {
        self.phase.store(PHASE_IDLE, Ordering::Release);
    }

    pub fn phase(&self) -> SensingPhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_CAPTURING => SensingPhase::Capturing,
            PHASE_ANALYZING => SensingPhase::Analyzing,
            _ => SensingPhase::Idle,
        }
    }
}

/// Returns the slot to Idle when the owning cycle ends, panics included.
struct SlotRelease(Arc<CycleGuard>);

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.0.finish();
    }
}

// ======================== Stats ========================

#[derive(Debug, Default)]
pub struct SensingStats {
    pub ticks: AtomicU64,
    pub dropped_ticks: AtomicU64,
    pub not_ready: AtomicU64,
    pub capture_errors: AtomicU64,
    pub analyses_ok: AtomicU64,
    pub analyses_failed: AtomicU64,
    pub late_results: AtomicU64,
}

impl SensingStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// ======================== Sensing Loop ========================

#[derive(Clone, Debug)]
pub struct SensingConfig {
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct SensingLoop<S: FrameSource, A: Analyzer> {
    source: Arc<Mutex<S>>,
    analyzer: Arc<A>,
    control: Arc<ControlContext>,
    config: SensingConfig,
    guard: Arc<CycleGuard>,
    stats: Arc<SensingStats>,
}

impl<S: FrameSource, A: Analyzer> SensingLoop<S, A> {
    pub fn new(source: S, analyzer: A, control: Arc<ControlContext>, config: SensingConfig) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            analyzer: Arc::new(analyzer),
            control,
            config,
            guard: Arc::new(CycleGuard::default()),
            stats: Arc::new(SensingStats::default()),
        }
    }

    pub fn guard(&self) -> Arc<CycleGuard> {
        Arc::clone(&self.guard)
    }

    pub fn stats(&self) -> Arc<SensingStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `cancel` fires. The source is released once the last cycle
    /// holding it ends; an analysis still in flight finishes but is discarded.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.config.interval;
        // First attempt one period after start, like a plain repeating timer.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let description = self.describe_source();
        log::info!("Sensing loop started: {} every {:?}", description, period);
        self.control.set_status(STATUS_WAITING);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.on_tick(&cancel),
            }
        }

        self.control.set_status(STATUS_STOPPED);
        drop(self.source);
        log::info!("Sensing loop stopped: {}", description);
    }

    fn describe_source(&self) -> String {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .describe()
    }

    fn on_tick(&self, cancel: &CancellationToken) {
        SensingStats::bump(&self.stats.ticks);
        if !self.guard.try_begin() {
            SensingStats::bump(&self.stats.dropped_ticks);
            log::debug!("Sensing tick dropped: previous cycle still {:?}", self.guard.phase());
            return;
        }

        tokio::spawn(run_cycle(
            Arc::clone(&self.source),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.control),
            Arc::clone(&self.stats),
            cancel.clone(),
            self.config.request_timeout,
            SlotRelease(Arc::clone(&self.guard)),
        ));
    }
}

/// One capture-analyze cycle. Owns the slot until it returns, so the timer
/// loop never waits on file I/O, encoding, or the network.
async fn run_cycle<S: FrameSource, A: Analyzer>(
    source: Arc<Mutex<S>>,
    analyzer: Arc<A>,
    control: Arc<ControlContext>,
    stats: Arc<SensingStats>,
    cancel: CancellationToken,
    timeout: Duration,
    slot: SlotRelease,
) {
    let captured = tokio::task::spawn_blocking(move || capture_and_encode(&source)).await;
    if cancel.is_cancelled() {
        log::debug!("Dropping frame captured after shutdown");
        return;
    }

    let frame = match captured {
        Ok(Ok(frame)) => frame,
        Ok(Err(FrameError::Capture(CaptureError::NotReady))) => {
            SensingStats::bump(&stats.not_ready);
            control.set_status(STATUS_NOT_READY);
            return;
        }
        Ok(Err(e)) => {
            SensingStats::bump(&stats.capture_errors);
            log::warn!("Frame capture failed: {}", e);
            control.set_status(format!("Camera error: {e}"));
            return;
        }
        Err(e) => {
            SensingStats::bump(&stats.capture_errors);
            log::error!("Frame capture task failed: {}", e);
            control.set_status(format!("Camera error: {e}"));
            return;
        }
    };

    slot.0.mark_analyzing();
    control.set_status(STATUS_ANALYZING);
    log::debug!(
        "Analyzing {}x{} frame ({} bytes)",
        frame.width,
        frame.height,
        frame.jpeg.len()
    );

    let outcome = match tokio::time::timeout(timeout, analyzer.analyze(frame)).await {
        Ok(result) => result,
        Err(_) => Err(AnalyzeError::Timeout(timeout)),
    };

    if cancel.is_cancelled() {
        SensingStats::bump(&stats.late_results);
        log::debug!("Discarding analysis result that arrived after shutdown");
        return;
    }

    match outcome {
        Ok(reading) => {
            SensingStats::bump(&stats.analyses_ok);
            let status = mapper::apply_reading(&control, &reading);
            log::debug!(
                "Gesture {:?} at ({:.2}, {:.2})",
                reading.gesture,
                reading.position.x,
                reading.position.y
            );
            control.set_status(status);
        }
        Err(e) => {
            // Failure is treated as UNKNOWN: no state mutation.
            SensingStats::bump(&stats.analyses_failed);
            log::warn!("Gesture analysis failed: {}", e);
            control.set_status(format!("Error analyzing frame: {e}"));
        }
    }
}

// ======================== Handle ========================

/// A running sensing loop. Dropping the handle without `stop` leaves the
/// loop running until the runtime shuts down.
pub struct SensingHandle {
    cancel: CancellationToken,
    guard: Arc<CycleGuard>,
    stats: Arc<SensingStats>,
    task: tokio::task::JoinHandle<()>,
}

impl SensingHandle {
    pub fn spawn<S: FrameSource, A: Analyzer>(
        runtime: &tokio::runtime::Handle,
        sensing: SensingLoop<S, A>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let guard = sensing.guard();
        let stats = sensing.stats();
        let task = runtime.spawn(sensing.run(cancel.clone()));
        Self {
            cancel,
            guard,
            stats,
            task,
        }
    }

    pub fn phase(&self) -> SensingPhase {
        self.guard.phase()
    }

    #[cfg(test)]
    pub fn stats(&self) -> &SensingStats {
        &self.stats
    }

    /// Cancel the timer and release the source. Results still in flight are
    /// discarded when they land.
    pub fn stop(self) -> tokio::task::JoinHandle<()> {
        self.cancel.cancel();
        log::info!(
            "Stopping sensing: {} ticks, {} dropped, {} ok, {} failed",
            SensingStats::get(&self.stats.ticks),
            SensingStats::get(&self.stats.dropped_ticks),
            SensingStats::get(&self.stats.analyses_ok),
            SensingStats::get(&self.stats.analyses_failed),
        );
        self.task
    }
}

/// Start the file-fed Gemini loop described by `config`, or record why vision
/// is off.
pub fn start_sensing(
    runtime: &tokio::runtime::Handle,
    config: &AppConfig,
    control: Arc<ControlContext>,
) -> Option<SensingHandle> {
    let api_key = match &config.vision {
        Vision::Enabled { api_key } => api_key.clone(),
        Vision::DisabledByFlag => {
            log::info!("Gesture sensing disabled by flag");
            control.set_status(STATUS_DISABLED);
            return None;
        }
        Vision::MissingKey => {
            log::warn!("No API key (--api-key or GEMINI_API_KEY); gesture sensing disabled");
            control.set_status(STATUS_NO_KEY);
            return None;
        }
    };

    let settings = &config.scene.sensing;
    let analyzer = match GeminiAnalyzer::new(
        &settings.endpoint,
        &settings.model,
        api_key,
        settings.request_timeout(),
    ) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            log::error!("Cannot build analyzer client: {}", e);
            control.set_status(format!("Error analyzing frame: {e}"));
            return None;
        }
    };

    let sensing = SensingLoop::new(
        FileFrameSource::new(&settings.frame_path),
        analyzer,
        control,
        SensingConfig {
            interval: settings.interval(),
            request_timeout: settings.request_timeout(),
        },
    );
    Some(SensingHandle::spawn(runtime, sensing))
}
