//! Board support: bindings to the vendor camera middleware, LCD BSP and HAL.
//!
//! The sensor driver, the pixel pipeline (DCMIPP) HAL and the LCD-TFT
//! controller (LTDC) HAL ship as C. This module declares the handful of
//! entry points the firmware needs and wraps them in the pipeline crate's
//! hardware traits. Status codes are passed through as the trait errors.

use core::ffi::c_void;

use camview_pipeline::{
    CacheMaintenance, CaptureHal, CaptureMode, FrameAddr, IspUpdate, Layer, LayerConfig, LcdHal,
    MirrorFlip, Pipe, PipeConfig, PixelFormat, ReloadMode, Resolution, SensorConfig,
};
use cortex_m::peripheral::{DWT, SCB};

// ── C types ──────────────────────────────────────────────────────────────

/// `CMW_CameraInit_t`
#[repr(C)]
#[derive(Default)]
struct CmwCameraInit {
    width: u32,
    height: u32,
    fps: i32,
    pixel_format: u32,
    anti_flicker: u32,
    mirror_flip: u32,
}

/// `CMW_Manual_roi_area_t`
#[repr(C)]
#[derive(Default)]
struct CmwRoi {
    width: u32,
    height: u32,
    offset_x: u32,
    offset_y: u32,
}

/// `CMW_DCMIPP_Conf_t`
#[repr(C)]
#[derive(Default)]
struct CmwPipeConf {
    output_width: u32,
    output_height: u32,
    output_format: i32,
    output_bpp: i32,
    mode: i32,
    manual_conf: CmwRoi,
    enable_swap: i32,
    enable_gamma_conversion: i32,
}

/// `BSP_LCD_LayerConfig_t`
#[repr(C)]
struct BspLayerConfig {
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
    pixel_format: u32,
    address: u32,
}

/// Opaque `DCMIPP_HandleTypeDef`.
#[repr(C)]
pub struct DcmippHandle {
    _private: [u8; 0],
}

/// Opaque `LTDC_HandleTypeDef`.
#[repr(C)]
pub struct LtdcHandle {
    _private: [u8; 0],
}

const CMW_ERROR_NONE: i32 = 0;
const BSP_ERROR_NONE: i32 = 0;
const HAL_OK: i32 = 0;

const CMW_ASPECT_RATIO_MANUAL_ROI: i32 = 3;
const CMW_MODE_CONTINUOUS: u32 = 0;
const CMW_MODE_SNAPSHOT: u32 = 4;

const DCMIPP_MEMORY_ADDRESS_0: u32 = 0;
const DCMIPP_PIXEL_PACKER_FORMAT_RGB888_YUV444_1: i32 = 0x0;
const DCMIPP_PIXEL_PACKER_FORMAT_RGB565_1: i32 = 0x1;
const DCMIPP_PIXEL_PACKER_FORMAT_ARGB8888: i32 = 0x2;

const LCD_INSTANCE: u32 = 0;
const LCD_ORIENTATION_LANDSCAPE: u32 = 1;
const LTDC_PIXEL_FORMAT_ARGB8888: u32 = 0x0;
const LTDC_PIXEL_FORMAT_RGB888: u32 = 0x1;
const LTDC_PIXEL_FORMAT_RGB565: u32 = 0x2;
const LTDC_RELOAD_IMMEDIATE: u32 = 0x1;
const LTDC_RELOAD_VERTICAL_BLANKING: u32 = 0x2;

const XSPI_RAM_INSTANCE: u32 = 0;

const LED_GREEN: u32 = 0;
const LED_RED: u32 = 1;

const BUTTON_USER: u32 = 0;
const BUTTON_MODE_GPIO: u32 = 0;

extern "C" {
    fn CMW_CAMERA_Init(init: *mut CmwCameraInit, advanced: *mut c_void) -> i32;
    fn CMW_CAMERA_SetPipeConfig(pipe: u32, conf: *mut CmwPipeConf, pitch: *mut u32) -> i32;
    fn CMW_CAMERA_Start(pipe: u32, buffer: *mut u8, mode: u32) -> i32;
    fn CMW_CAMERA_Run() -> i32;
    fn CMW_CAMERA_GetDCMIPPHandle() -> *mut DcmippHandle;

    fn HAL_Init() -> i32;
    fn HAL_DCMIPP_PIPE_SetMemoryAddress(h: *mut DcmippHandle, pipe: u32, index: u32, address: u32) -> i32;
    fn HAL_DCMIPP_IRQHandler(h: *mut DcmippHandle);
    fn HAL_DCMIPP_CSI_IRQHandler(h: *mut DcmippHandle);

    fn BSP_LCD_InitEx(instance: u32, orientation: u32, format: u32, width: u32, height: u32) -> i32;
    fn BSP_LCD_ConfigLayer(instance: u32, layer: u32, config: *mut BspLayerConfig) -> i32;
    fn BSP_LCD_SetLayerVisible(instance: u32, layer: u32, state: u32) -> i32;
    fn BSP_LCD_SetTransparency(instance: u32, layer: u32, alpha: u8) -> i32;
    fn BSP_LCD_Reload(instance: u32, reload: u32) -> i32;
    fn BSP_LCD_DisplayOn(instance: u32) -> i32;
    fn BSP_LCD_DisplayOff(instance: u32) -> i32;
    fn BSP_LCD_DeInit(instance: u32) -> i32;
    fn HAL_LTDC_SetAddress_NoReload(h: *mut LtdcHandle, address: u32, layer: u32) -> i32;
    fn HAL_LTDC_ReloadLayer(h: *mut LtdcHandle, reload: u32, layer: u32) -> i32;

    fn BSP_XSPI_RAM_Init(instance: u32) -> i32;
    fn BSP_XSPI_RAM_EnableMemoryMappedMode(instance: u32) -> i32;

    fn BSP_LED_Init(led: u32) -> i32;
    fn BSP_LED_Off(led: u32) -> i32;
    fn BSP_LED_Toggle(led: u32) -> i32;
    fn BSP_PB_Init(button: u32, mode: u32) -> i32;
    fn BSP_PB_GetState(button: u32) -> i32;

    static mut hlcd_ltdc: LtdcHandle;
}

fn check(status: i32, ok: i32) -> Result<(), i32> {
    if status == ok {
        Ok(())
    } else {
        Err(status)
    }
}

// Buses are 32-bit; every frame address fits.
fn bus_addr(addr: FrameAddr) -> u32 {
    addr.addr() as u32
}

// ── Board bring-up ───────────────────────────────────────────────────────

/// Vendor HAL init. Must precede any BSP call.
pub fn hal_init() -> Result<(), i32> {
    // SAFETY: plain C call, no pointers.
    check(unsafe { HAL_Init() }, HAL_OK)
}

/// Bring up the external PSRAM and map it at 0x9000_0000.
pub fn psram_init() -> Result<(), i32> {
    // SAFETY: plain C calls, no pointers.
    unsafe {
        check(BSP_XSPI_RAM_Init(XSPI_RAM_INSTANCE), BSP_ERROR_NONE)?;
        check(BSP_XSPI_RAM_EnableMemoryMappedMode(XSPI_RAM_INSTANCE), BSP_ERROR_NONE)
    }
}

/// Both user LEDs as outputs, switched off.
pub fn led_init() -> Result<(), i32> {
    // SAFETY: plain C calls, no pointers.
    unsafe {
        for led in [LED_GREEN, LED_RED] {
            check(BSP_LED_Init(led), BSP_ERROR_NONE)?;
            check(BSP_LED_Off(led), BSP_ERROR_NONE)?;
        }
    }
    Ok(())
}

pub fn heartbeat_toggle() -> Result<(), i32> {
    // SAFETY: plain C call.
    check(unsafe { BSP_LED_Toggle(LED_GREEN) }, BSP_ERROR_NONE)
}

/// User button as a polled input.
pub fn button_init() -> Result<(), i32> {
    // SAFETY: plain C call.
    check(unsafe { BSP_PB_Init(BUTTON_USER, BUTTON_MODE_GPIO) }, BSP_ERROR_NONE)
}

pub fn button_pressed() -> bool {
    // SAFETY: plain C call.
    unsafe { BSP_PB_GetState(BUTTON_USER) != 0 }
}

/// Free-running core cycle counter.
pub fn cycle_count() -> u32 {
    DWT::cycle_count()
}

// ── Cache maintenance ────────────────────────────────────────────────────

/// L1 data cache maintenance by address.
#[derive(Clone, Copy)]
pub struct Dcache;

impl CacheMaintenance for Dcache {
    fn clean_invalidate(&self, addr: usize, len: usize) {
        // SAFETY: by-address maintenance only touches the lines in range;
        // no other SCB state is read or written.
        let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
        scb.clean_invalidate_dcache_by_address(addr, len);
    }

    fn clean(&self, addr: usize, len: usize) {
        // SAFETY: as above.
        let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
        scb.clean_dcache_by_address(addr, len);
    }
}

/// Turn on both L1 caches.
pub fn enable_caches(scb: &mut SCB, cpuid: &mut cortex_m::peripheral::CPUID) {
    scb.enable_icache();
    scb.enable_dcache(cpuid);
}

// ── Camera ───────────────────────────────────────────────────────────────

fn mirror_flip_code(mirror_flip: MirrorFlip) -> u32 {
    match mirror_flip {
        MirrorFlip::None => 0,
        MirrorFlip::Flip => 1,
        MirrorFlip::Mirror => 2,
        MirrorFlip::MirrorFlip => 3,
    }
}

fn dcmipp_format(format: PixelFormat) -> i32 {
    match format {
        PixelFormat::Rgb565 => DCMIPP_PIXEL_PACKER_FORMAT_RGB565_1,
        PixelFormat::Rgb888 => DCMIPP_PIXEL_PACKER_FORMAT_RGB888_YUV444_1,
        PixelFormat::Argb8888 => DCMIPP_PIXEL_PACKER_FORMAT_ARGB8888,
    }
}

/// The camera middleware (sensor driver, ISP and DCMIPP).
pub struct CmwCamera;

impl CaptureHal for CmwCamera {
    type Error = i32;

    fn init(&mut self, config: &SensorConfig) -> Result<Resolution, i32> {
        // Width and height 0: the sensor driver picks its native mode and
        // writes it back.
        let mut init = CmwCameraInit {
            fps: config.fps as i32,
            mirror_flip: mirror_flip_code(config.mirror_flip),
            ..CmwCameraInit::default()
        };
        // SAFETY: `init` outlives the call; advanced config is optional.
        check(unsafe { CMW_CAMERA_Init(&mut init, core::ptr::null_mut()) }, CMW_ERROR_NONE)?;
        Ok(Resolution::new(init.width, init.height))
    }

    fn configure_pipe(&mut self, config: &PipeConfig) -> Result<u32, i32> {
        let mut conf = CmwPipeConf {
            output_width: config.output.width,
            output_height: config.output.height,
            output_format: dcmipp_format(config.format),
            output_bpp: config.bpp() as i32,
            mode: CMW_ASPECT_RATIO_MANUAL_ROI,
            manual_conf: CmwRoi {
                width: config.crop.width,
                height: config.crop.height,
                offset_x: config.crop.offset_x,
                offset_y: config.crop.offset_y,
            },
            enable_swap: config.swap as i32,
            enable_gamma_conversion: config.gamma as i32,
        };
        let mut pitch = 0;
        // SAFETY: both out-pointers are valid for the call.
        check(
            unsafe { CMW_CAMERA_SetPipeConfig(config.pipe.hw_index(), &mut conf, &mut pitch) },
            CMW_ERROR_NONE,
        )?;
        Ok(pitch)
    }

    fn start(&mut self, pipe: Pipe, buffer: FrameAddr, mode: CaptureMode) -> Result<(), i32> {
        let mode = match mode {
            CaptureMode::Continuous => CMW_MODE_CONTINUOUS,
            CaptureMode::Snapshot => CMW_MODE_SNAPSHOT,
        };
        // SAFETY: `buffer` is a static, 32-byte aligned frame of the pipe's size.
        check(unsafe { CMW_CAMERA_Start(pipe.hw_index(), buffer.as_ptr(), mode) }, CMW_ERROR_NONE)
    }

    fn set_capture_address(&mut self, pipe: Pipe, buffer: FrameAddr) -> Result<(), i32> {
        // SAFETY: the handle is owned by the middleware and lives forever
        // once the camera is initialised.
        let handle = unsafe { CMW_CAMERA_GetDCMIPPHandle() };
        if handle.is_null() {
            return Err(-1);
        }
        // SAFETY: non-null handle, plain register write.
        check(
            unsafe {
                HAL_DCMIPP_PIPE_SetMemoryAddress(handle, pipe.hw_index(), DCMIPP_MEMORY_ADDRESS_0, bus_addr(buffer))
            },
            HAL_OK,
        )
    }
}

impl IspUpdate for CmwCamera {
    type Error = i32;

    fn update(&mut self) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(unsafe { CMW_CAMERA_Run() }, CMW_ERROR_NONE)
    }
}

// ── LCD ──────────────────────────────────────────────────────────────────

fn ltdc_format(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Rgb565 => LTDC_PIXEL_FORMAT_RGB565,
        PixelFormat::Rgb888 => LTDC_PIXEL_FORMAT_RGB888,
        PixelFormat::Argb8888 => LTDC_PIXEL_FORMAT_ARGB8888,
    }
}

fn ltdc_reload(mode: ReloadMode) -> u32 {
    match mode {
        ReloadMode::Immediate => LTDC_RELOAD_IMMEDIATE,
        ReloadMode::VerticalBlanking => LTDC_RELOAD_VERTICAL_BLANKING,
    }
}

/// The LCD BSP over the LTDC.
pub struct BspLcd;

impl LcdHal for BspLcd {
    type Error = i32;

    fn init(&mut self, resolution: Resolution, _layer_count: u8) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(
            unsafe {
                BSP_LCD_InitEx(
                    LCD_INSTANCE,
                    LCD_ORIENTATION_LANDSCAPE,
                    LTDC_PIXEL_FORMAT_RGB565,
                    resolution.width,
                    resolution.height,
                )
            },
            BSP_ERROR_NONE,
        )
    }

    fn configure_layer(&mut self, layer: Layer, config: &LayerConfig) -> Result<(), i32> {
        let mut bsp = BspLayerConfig {
            x0: config.rect.x0,
            x1: config.rect.x1,
            y0: config.rect.y0,
            y1: config.rect.y1,
            pixel_format: ltdc_format(config.format),
            address: bus_addr(config.address),
        };
        // SAFETY: `bsp` outlives the call.
        check(
            unsafe { BSP_LCD_ConfigLayer(LCD_INSTANCE, layer.index() as u32, &mut bsp) },
            BSP_ERROR_NONE,
        )
    }

    fn set_layer_address_no_reload(&mut self, layer: Layer, address: FrameAddr) -> Result<(), i32> {
        // SAFETY: `hlcd_ltdc` is the BSP's handle, initialised by
        // `BSP_LCD_InitEx`; callers hold the compositor lock.
        check(
            unsafe {
                HAL_LTDC_SetAddress_NoReload(
                    core::ptr::addr_of_mut!(hlcd_ltdc),
                    bus_addr(address),
                    layer.index() as u32,
                )
            },
            HAL_OK,
        )
    }

    fn reload_layer(&mut self, layer: Layer, mode: ReloadMode) -> Result<(), i32> {
        // SAFETY: as above.
        check(
            unsafe {
                HAL_LTDC_ReloadLayer(
                    core::ptr::addr_of_mut!(hlcd_ltdc),
                    ltdc_reload(mode),
                    layer.index() as u32,
                )
            },
            HAL_OK,
        )
    }

    fn reload(&mut self, mode: ReloadMode) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(unsafe { BSP_LCD_Reload(LCD_INSTANCE, ltdc_reload(mode)) }, BSP_ERROR_NONE)
    }

    fn set_transparency(&mut self, layer: Layer, alpha: u8) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(
            unsafe { BSP_LCD_SetTransparency(LCD_INSTANCE, layer.index() as u32, alpha) },
            BSP_ERROR_NONE,
        )
    }

    fn set_visible(&mut self, layer: Layer, visible: bool) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(
            unsafe { BSP_LCD_SetLayerVisible(LCD_INSTANCE, layer.index() as u32, visible as u32) },
            BSP_ERROR_NONE,
        )
    }

    fn display_on(&mut self) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(unsafe { BSP_LCD_DisplayOn(LCD_INSTANCE) }, BSP_ERROR_NONE)
    }

    fn display_off(&mut self) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(unsafe { BSP_LCD_DisplayOff(LCD_INSTANCE) }, BSP_ERROR_NONE)
    }

    fn deinit(&mut self) -> Result<(), i32> {
        // SAFETY: plain C call.
        check(unsafe { BSP_LCD_DeInit(LCD_INSTANCE) }, BSP_ERROR_NONE)
    }
}

// ── Vendor HAL hooks ─────────────────────────────────────────────────────

/// The HAL's millisecond tick, served from the embassy time driver.
#[no_mangle]
pub extern "C" fn HAL_GetTick() -> u32 {
    embassy_time::Instant::now().as_millis() as u32
}

/// Busy-wait used by the BSP during bring-up.
#[no_mangle]
pub extern "C" fn HAL_Delay(ms: u32) {
    embassy_time::block_for(embassy_time::Duration::from_millis(ms as u64));
}

/// Keep the HAL off SysTick; the embassy time driver owns timekeeping.
#[no_mangle]
pub extern "C" fn HAL_InitTick(_priority: u32) -> i32 {
    HAL_OK
}

// ── Interrupt vectors ────────────────────────────────────────────────────

/// Pixel pipeline interrupt. The HAL decodes it and calls back into the
/// middleware, which ends in the frame and vsync callbacks in `main.rs`.
#[no_mangle]
pub extern "C" fn DCMIPP() {
    // SAFETY: the handle is null only before camera init, and the IRQ is
    // not enabled until then.
    unsafe {
        let handle = CMW_CAMERA_GetDCMIPPHandle();
        if !handle.is_null() {
            HAL_DCMIPP_IRQHandler(handle);
        }
    }
}

/// CSI-2 receiver interrupt.
#[no_mangle]
pub extern "C" fn CSI() {
    // SAFETY: as above.
    unsafe {
        let handle = CMW_CAMERA_GetDCMIPPHandle();
        if !handle.is_null() {
            HAL_DCMIPP_CSI_IRQHandler(handle);
        }
    }
}
