//! Compile-time application configuration.
//!
//! Buffer sizes are derived here with `const fn`s so every statically placed
//! frame buffer matches the pipe that writes it.

use camview_overlay::OverlayConfig;
use camview_pipeline::{
    letterbox, pool_depth, CompositorLayout, MirrorFlip, PipeRequest, PixelFormat, Rect,
    Resolution, SensorConfig,
};

// ── Camera ───────────────────────────────────────────────────────────────

pub const CAMERA_FPS: u32 = 30;
pub const CAMERA_MIRROR_FLIP: MirrorFlip = MirrorFlip::Mirror;

/// Aspect ratio of the sensor image, used for the letterbox.
pub const CAMERA_ASPECT: (u32, u32) = (4, 3);

pub const SENSOR: SensorConfig = SensorConfig {
    fps: CAMERA_FPS,
    mirror_flip: CAMERA_MIRROR_FLIP,
};

// ── LCD ──────────────────────────────────────────────────────────────────

pub const LCD: Resolution = Resolution::new(800, 480);

/// Camera layer rectangle: 640×480 at x = 80.
pub const LETTERBOX: Rect = letterbox(LCD, CAMERA_ASPECT.0, CAMERA_ASPECT.1);

/// UI layer: the top half of the screen.
pub const UI_AREA: Rect = Rect::new(0, 0, LCD.width, LCD.height / 2);
pub const UI_FORMAT: PixelFormat = PixelFormat::Argb8888;
/// Each UI buffer covers the whole panel; the layer scans out its first
/// `UI_AREA` rows.
pub const UI_FRAME_BYTES: usize = LCD.frame_bytes(UI_FORMAT.bpp());

// ── Display pipe ─────────────────────────────────────────────────────────

/// Frames of latency between capture and display.
pub const DISPLAY_DELAY: usize = 1;
pub const POOL_DEPTH: usize = pool_depth(DISPLAY_DELAY);

pub const DISPLAY_FORMAT: PixelFormat = PixelFormat::Rgb565;
pub const DISPLAY_OUTPUT: Resolution = LETTERBOX.size();
pub const DISPLAY_FRAME_BYTES: usize = DISPLAY_OUTPUT.frame_bytes(DISPLAY_FORMAT.bpp());

pub const DISPLAY_REQUEST: PipeRequest = PipeRequest {
    output: DISPLAY_OUTPUT,
    format: DISPLAY_FORMAT,
    swap: false,
};

// ── Inference pipe ───────────────────────────────────────────────────────

pub const ML_FORMAT: PixelFormat = PixelFormat::Rgb888;
pub const ML_OUTPUT: Resolution = Resolution::new(480, 480);
pub const ML_FRAME_BYTES: usize = ML_OUTPUT.frame_bytes(ML_FORMAT.bpp());

pub const ML_REQUEST: PipeRequest = PipeRequest {
    output: ML_OUTPUT,
    format: ML_FORMAT,
    swap: true,
};

// ── Compositor ───────────────────────────────────────────────────────────

pub const LAYOUT: CompositorLayout = CompositorLayout {
    screen: LCD,
    camera: LETTERBOX,
    camera_format: DISPLAY_FORMAT,
    ui: UI_AREA,
    ui_format: UI_FORMAT,
};

/// UI layer opacity once the overlay is up.
pub const UI_ALPHA: u8 = 255;

// ── Tasks ────────────────────────────────────────────────────────────────

pub const OVERLAY_PERIOD_MS: u64 = 100;

/// Green LED toggle period.
pub const HEARTBEAT_PERIOD_MS: u64 = 250;

pub const BUTTON_POLL_MS: u64 = 20;

/// Default 160×240 panel in the top-left corner of the UI layer.
pub fn overlay_config() -> OverlayConfig {
    OverlayConfig {
        update_period_ms: OVERLAY_PERIOD_MS,
        ..OverlayConfig::default()
    }
}

const _: () = assert!(DISPLAY_OUTPUT.width == 640 && DISPLAY_OUTPUT.height == 480);
const _: () = assert!(POOL_DEPTH == 3);
const _: () = assert!(UI_AREA.size().frame_bytes(UI_FORMAT.bpp()) <= UI_FRAME_BYTES);
