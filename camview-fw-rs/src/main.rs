//! camview
//!
//! Live camera preview firmware for the STM32N6570-DK. Wires the two
//! library crates to the board:
//!
//! 1. The sensor streams through two pixel pipeline outputs: a 640×480
//!    RGB565 display pipe rotating through a three-slot pool in PSRAM, and a
//!    480×480 RGB888 inference pipe into its own buffer.
//! 2. On each display-pipe frame-complete interrupt the orchestrator points
//!    capture at the next slot and the camera layer at the frame just
//!    finished; the LCD picks it up on the next vertical blank.
//! 3. Each display-pipe vsync wakes the ISP task for one exposure / white
//!    balance step.
//! 4. The overlay task draws CPU load and runtime into the UI layer. The
//!    user button shows and hides it.
//!
//! Two executors:
//!
//! | executor              | context                  | tasks               |
//! |-----------------------|--------------------------|---------------------|
//! | `EXECUTOR_HIGH`       | `UART4` interrupt (P14)  | ISP, heartbeat      |
//! | thread-mode, in `main`| thread mode              | overlay, button     |
//!
//! A pending ISP step preempts an overlay redraw. The thread-mode executor
//! is driven from `main` so the time spent waiting for events can be
//! measured for the CPU load.

#![no_std]
#![no_main]

mod app_config;
mod bsp;
mod psram;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::*;
use embassy_executor::raw::Executor;
use embassy_executor::InterruptExecutor;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Timer;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use camview_overlay::{overlay_update_task, DiagnosticsOverlay, IdleMeter};
use camview_pipeline::fatal::set_fatal_hook;
use camview_pipeline::{
    isp_update_task, CaptureMode, CapturePipeline, Compositor, Fatal, FrameOrchestrator, OrHalt,
    Pipe, SharedCapture, SharedCompositor, UiFrames, VsyncSignal,
};

use app_config::{
    BUTTON_POLL_MS, DISPLAY_FRAME_BYTES, DISPLAY_REQUEST, HEARTBEAT_PERIOD_MS, LAYOUT, LCD,
    ML_REQUEST, POOL_DEPTH, SENSOR, UI_ALPHA, UI_AREA, UI_FRAME_BYTES,
};
use bsp::{BspLcd, CmwCamera, Dcache};

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

/// Counts display-pipe vsyncs for the ISP task.
static VSYNC: VsyncSignal = VsyncSignal::new();

/// Frame-complete handling over the PSRAM camera pool.
static ORCHESTRATOR: FrameOrchestrator<'static, POOL_DEPTH, DISPLAY_FRAME_BYTES> =
    FrameOrchestrator::new(&psram::CAMERA_POOL, &VSYNC);

/// Installed once the camera is configured; used by the frame interrupt.
static CAPTURE: SharedCapture<CmwCamera> = Mutex::new(RefCell::new(None));

/// Installed once the LCD is up; used by the frame interrupt and the
/// overlay task.
static COMPOSITOR: SharedCompositor<BspLcd> = Mutex::new(RefCell::new(None));

/// Cycles spent waiting in the thread-mode executor loop.
static IDLE: IdleMeter = IdleMeter::new();

/// Requested overlay visibility, toggled by the user button.
static OVERLAY_VISIBLE: AtomicBool = AtomicBool::new(true);

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

/// Pender context the cortex-m executor backend maps to `sev`.
const THREAD_PENDER: *mut () = usize::MAX as *mut ();

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn isp_task() {
    isp_update_task(&VSYNC, CmwCamera).await;
}

#[embassy_executor::task]
async fn heartbeat_task() {
    loop {
        bsp::heartbeat_toggle().or_halt("heartbeat LED failed");
        Timer::after_millis(HEARTBEAT_PERIOD_MS).await;
    }
}

#[embassy_executor::task]
async fn overlay_task(overlay: DiagnosticsOverlay<'static, UI_FRAME_BYTES>) {
    overlay_update_task(overlay, &COMPOSITOR, &IDLE, &OVERLAY_VISIBLE, bsp::cycle_count, Dcache)
        .await;
}

/// Toggle the overlay on each press of the user button.
#[embassy_executor::task]
async fn button_task() {
    let mut was_pressed = false;
    loop {
        let pressed = bsp::button_pressed();
        if pressed && !was_pressed {
            let visible = !OVERLAY_VISIBLE.fetch_xor(true, Ordering::Relaxed);
            info!("overlay {}", if visible { "shown" } else { "hidden" });
        }
        was_pressed = pressed;
        Timer::after_millis(BUTTON_POLL_MS).await;
    }
}

// ---------------------------------------------------------------------------
// Camera middleware callbacks (interrupt context)
// ---------------------------------------------------------------------------

/// End of a frame on `pipe`. Only the display pipe rotates buffers.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn CMW_CAMERA_PIPE_FrameEventCallback(pipe: u32) -> i32 {
    if let Some(pipe) = Pipe::from_hw_index(pipe) {
        ORCHESTRATOR.dispatch_frame_complete(pipe, &CAPTURE, &COMPOSITOR);
    }
    0
}

/// Start of a frame on `pipe`. Only the display pipe paces the ISP.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn CMW_CAMERA_PIPE_VsyncEventCallback(pipe: u32) -> i32 {
    if let Some(pipe) = Pipe::from_hw_index(pipe) {
        ORCHESTRATOR.on_vsync(pipe);
    }
    0
}

// ---------------------------------------------------------------------------
// Executor plumbing
// ---------------------------------------------------------------------------

/// Runs the high-priority executor. Its run time is busy time even when it
/// lands on the idle loop's `wfe`.
#[interrupt]
unsafe fn UART4() {
    let start = bsp::cycle_count();
    EXECUTOR_HIGH.on_interrupt();
    IDLE.discount(bsp::cycle_count().wrapping_sub(start));
}

fn halt(fatal: &Fatal) -> ! {
    cortex_m::interrupt::disable();
    defmt::panic!("{}", fatal)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[cortex_m_rt::entry]
fn main() -> ! {
    set_fatal_hook(halt);

    let mut cp = cortex_m::Peripherals::take().or_halt("core peripherals already taken");
    bsp::enable_caches(&mut cp.SCB, &mut cp.CPUID);
    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();

    let _p = embassy_stm32::init(Default::default());
    info!("camview starting");

    bsp::hal_init().or_halt("HAL init failed");
    bsp::led_init().or_halt("LED init failed");
    bsp::button_init().or_halt("button init failed");
    bsp::psram_init().or_halt("PSRAM init failed");

    // ── Buffers ───────────────────────────────────────────────────────────────

    psram::CAMERA_POOL.init(&Dcache);
    psram::ML_FRAME.init(&Dcache);
    let ui_slot = psram::take_ui_slot().or_halt("UI buffers already taken");
    let ui: &'static mut UiFrames<UI_FRAME_BYTES> = UiFrames::init_in_place(ui_slot, &Dcache);

    // ── Display ───────────────────────────────────────────────────────────────

    let shown = psram::CAMERA_POOL
        .buffer(psram::CAMERA_POOL.display_index())
        .or_halt("display slot out of range");

    let mut compositor = Compositor::new(BspLcd, LAYOUT);
    compositor.init(shown, ui.front()).or_halt("LCD init failed");
    compositor.set_ui_alpha(UI_ALPHA).or_halt("UI alpha failed");
    COMPOSITOR.lock(|c| *c.borrow_mut() = Some(compositor));
    info!("LCD up: {}x{}", LCD.width, LCD.height);

    let overlay = DiagnosticsOverlay::new(
        ui,
        UI_AREA.width(),
        UI_AREA.height(),
        app_config::overlay_config(),
    )
    .or_halt("overlay setup failed");

    // ── Executors and tasks ───────────────────────────────────────────────────

    // Below the capture interrupts, which must be able to preempt an ISP step.
    interrupt::UART4.set_priority(Priority::P14);
    let high = EXECUTOR_HIGH.start(interrupt::UART4);
    high.spawn(heartbeat_task().or_halt("heartbeat task spawn failed"));

    let executor: &'static Executor = EXECUTOR_LOW.init(Executor::new(THREAD_PENDER));
    let low = executor.spawner();
    low.spawn(overlay_task(overlay).or_halt("overlay task spawn failed"));
    low.spawn(button_task().or_halt("button task spawn failed"));

    high.spawn(isp_task().or_halt("ISP task spawn failed"));

    // ── Camera ────────────────────────────────────────────────────────────────

    let mut capture = CapturePipeline::new(CmwCamera);
    capture.init(&SENSOR).or_halt("camera init failed");
    capture
        .configure_pipe_for(Pipe::Display, &DISPLAY_REQUEST)
        .or_halt("display pipe config failed");
    capture
        .configure_pipe_for(Pipe::Inference, &ML_REQUEST)
        .or_halt("inference pipe config failed");

    let first = psram::CAMERA_POOL
        .buffer(psram::CAMERA_POOL.capture_index())
        .or_halt("capture slot out of range");

    // Installed before start: the first frame event needs the handle.
    CAPTURE.lock(|c| {
        let mut c = c.borrow_mut();
        let capture = c.insert(capture);
        capture
            .start_capture(Pipe::Display, first, CaptureMode::Continuous)
            .or_halt("display pipe start failed");
        capture
            .start_capture(Pipe::Inference, psram::ML_FRAME.addr(), CaptureMode::Continuous)
            .or_halt("inference pipe start failed");
    });

    info!("capture running");

    // ── Run ───────────────────────────────────────────────────────────────────

    loop {
        // SAFETY: polled only from this thread-mode loop.
        unsafe { executor.poll() };

        IDLE.enter(bsp::cycle_count());
        cortex_m::asm::wfe();
        IDLE.exit(bsp::cycle_count());
    }
}
