//! External PSRAM placement.
//!
//! This module is the only place that uses `#[link_section = ".psram_bss"]`.
//! Everything here lives in the NOLOAD section mapped over XSPI1, so its
//! contents are garbage until the XSPI is in memory-mapped mode and each
//! buffer has been scrubbed by its `init`.
//!
//! ```text
//! PSRAM (32 MB at 0x9000_0000)
//! ├─ camera pool:   3 × 640×480×2   1.8 MB
//! ├─ inference:     480×480×3       0.7 MB
//! └─ UI layer:      2 × 800×480×4   3.0 MB
//! ```

use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

use camview_pipeline::{DmaFrame, FramePool, UiFrames};

use crate::app_config::{DISPLAY_FRAME_BYTES, ML_FRAME_BYTES, POOL_DEPTH, UI_FRAME_BYTES};

pub type CameraPool = FramePool<POOL_DEPTH, DISPLAY_FRAME_BYTES>;
pub type MlFrame = DmaFrame<ML_FRAME_BYTES>;
pub type UiBuffers = UiFrames<UI_FRAME_BYTES>;

// The pool and the inference frame hold their state in atomics and
// `UnsafeCell`s, so a zero-filled image is a valid value; `init` scrubs the
// bytes the NOLOAD section leaves behind.
#[link_section = ".psram_bss"]
pub static CAMERA_POOL: CameraPool = FramePool::new();

#[link_section = ".psram_bss"]
pub static ML_FRAME: MlFrame = DmaFrame::new();

#[link_section = ".psram_bss"]
static mut UI_SLOT: MaybeUninit<UiBuffers> = MaybeUninit::uninit();

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Hand out the UI buffer slot, once.
///
/// Returns `None` on any later call.
pub fn take_ui_slot() -> Option<&'static mut MaybeUninit<UiBuffers>> {
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: guarded by TAKEN, so this is the only reference ever created.
    Some(unsafe { &mut *core::ptr::addr_of_mut!(UI_SLOT) })
}
