//! Production capture backend over the NvFBC driver library
//!
//! Implements [`CaptureBackend`] with the dynamically loaded function
//! list from [`sys`]. The zero-copy path leans on the substitution
//! layer: the Vulkan overrides installed here record the device and the
//! two frame-sized allocations the driver makes during session setup,
//! and `export_memory` turns a recorded allocation into an opaque fd
//! with `vkGetMemoryFdKHR`.

use std::ffi::{CStr, c_void};
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::raw::c_int;
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use crate::backend::sys::{
    NVFBC_BOX, NVFBC_BUFFER_FORMAT, NVFBC_CAPTURE_TYPE, NVFBC_CREATE_CAPTURE_SESSION_PARAMS,
    NVFBC_CREATE_HANDLE_PARAMS, NVFBC_DESTROY_CAPTURE_SESSION_PARAMS,
    NVFBC_DESTROY_HANDLE_PARAMS, NVFBC_FALSE, NVFBC_GET_STATUS_PARAMS, NVFBC_SESSION_HANDLE,
    NVFBC_SIZE, NVFBC_TOGL_GRAB_FRAME_PARAMS, NVFBC_TOGL_SETUP_PARAMS, NVFBC_TRACKING_TYPE,
    NVFBC_TRUE, NVFBCSTATUS, NvFbcLib,
};
use crate::backend::{BackendStatus, CaptureBackend, SessionParams, TrackingKind};
use crate::bridge::SLOT_COUNT;
use crate::error::{FbcError, Result};
use crate::interpose::registry;
use crate::types::{DeviceMemory, ExportedMemory, FrameSize, OutputInfo, SessionHandle};

const VULKAN_LIB: &str = "libvulkan.so.1";

const VK_SUCCESS: i32 = 0;
const VK_STRUCTURE_TYPE_MEMORY_GET_FD_INFO_KHR: u32 = 1000074002;
const VK_EXTERNAL_MEMORY_HANDLE_TYPE_OPAQUE_FD_BIT: u32 = 0x1;

#[repr(C)]
#[allow(non_snake_case)]
struct VkMemoryGetFdInfoKHR {
    sType: u32,
    pNext: *const c_void,
    memory: u64,
    handleType: u32,
}

#[repr(C)]
#[allow(non_snake_case)]
struct VkMemoryAllocateInfo {
    sType: u32,
    pNext: *const c_void,
    allocationSize: u64,
    memoryTypeIndex: u32,
}

type PfnVkGetMemoryFdKhr =
    unsafe extern "C" fn(device: u64, info: *const VkMemoryGetFdInfoKHR, fd: *mut c_int) -> i32;
type PfnVkCreateDevice = unsafe extern "C" fn(
    physical_device: u64,
    create_info: *const c_void,
    allocator: *const c_void,
    device: *mut u64,
) -> i32;
type PfnVkAllocateMemory = unsafe extern "C" fn(
    device: u64,
    allocate_info: *const VkMemoryAllocateInfo,
    allocator: *const c_void,
    memory: *mut u64,
) -> i32;

/// Capture backend backed by libnvidia-fbc.so.1
pub struct NvfbcBackend {
    lib: NvFbcLib,
}

impl NvfbcBackend {
    /// Load the driver library and install the Vulkan observers.
    ///
    /// The observers must be in place before the first session is
    /// created; they are what records the frame allocations the bridge
    /// later exports.
    pub fn new() -> Result<Self> {
        install_vulkan_overrides()?;
        let lib = NvFbcLib::load().map_err(FbcError::resource)?;
        Ok(Self { lib })
    }

    fn last_error(&self, handle: NVFBC_SESSION_HANDLE) -> String {
        // Safety: the driver returns a pointer to a NUL-terminated
        // string owned by the session; we copy it out immediately.
        if let Some(get_last_error) = self.lib.fns.nvFBCGetLastErrorStr {
            let ptr = unsafe { get_last_error(handle) };
            if !ptr.is_null() {
                return unsafe { CStr::from_ptr(ptr) }
                    .to_string_lossy()
                    .into_owned();
            }
        }
        "unknown driver error".to_string()
    }

    fn check(&self, handle: NVFBC_SESSION_HANDLE, status: NVFBCSTATUS) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(FbcError::backend(
                status as i32,
                format!("{} ({})", self.last_error(handle), status.to_error_string()),
            ))
        }
    }

    fn create_handle(&self) -> Result<NVFBC_SESSION_HANDLE> {
        let create = self
            .lib
            .fns
            .nvFBCCreateHandle
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;
        let mut handle: NVFBC_SESSION_HANDLE = 0;
        let mut params = NVFBC_CREATE_HANDLE_PARAMS::default();
        // Safety: params is the versioned struct this driver expects.
        let status = unsafe { create(&mut handle, &mut params) };
        self.check(handle, status)?;
        Ok(handle)
    }

    fn destroy_handle(&self, handle: NVFBC_SESSION_HANDLE) -> Result<()> {
        let destroy = self
            .lib
            .fns
            .nvFBCDestroyHandle
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;
        let mut params = NVFBC_DESTROY_HANDLE_PARAMS::default();
        let status = unsafe { destroy(handle, &mut params) };
        self.check(handle, status)
    }
}

impl CaptureBackend for NvfbcBackend {
    fn status(&self) -> Result<BackendStatus> {
        let get_status = self
            .lib
            .fns
            .nvFBCGetStatus
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;

        // Status queries need a handle of their own; it is released
        // before returning either way.
        let handle = self.create_handle()?;
        let mut params = NVFBC_GET_STATUS_PARAMS::default();
        let status = unsafe { get_status(handle, &mut params) };
        let checked = self.check(handle, status);
        let _ = self.destroy_handle(handle);
        checked?;

        let mut outputs = Vec::with_capacity(params.dwOutputNum as usize);
        for raw in params.outputs.iter().take(params.dwOutputNum as usize) {
            // Safety: the driver NUL-terminates names inside the fixed
            // buffer.
            let name = unsafe { CStr::from_ptr(raw.name.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            outputs.push(
                OutputInfo::new(raw.dwId, name)
                    .with_size(FrameSize::new(raw.trackedBox.w, raw.trackedBox.h)),
            );
        }

        Ok(BackendStatus {
            can_create_now: params.bCanCreateNow == NVFBC_TRUE,
            outputs,
        })
    }

    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle> {
        // New session, new driver allocations; forget the old ones.
        registry().driver_state().lock().reset();

        let handle = self.create_handle()?;
        let create = self
            .lib
            .fns
            .nvFBCCreateCaptureSession
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;

        let mut raw = NVFBC_CREATE_CAPTURE_SESSION_PARAMS {
            eCaptureType: NVFBC_CAPTURE_TYPE::CAPTURE_TO_GL,
            eTrackingType: match params.tracking {
                TrackingKind::Default => NVFBC_TRACKING_TYPE::TRACKING_DEFAULT,
                TrackingKind::Output => NVFBC_TRACKING_TYPE::TRACKING_OUTPUT,
                TrackingKind::Screen => NVFBC_TRACKING_TYPE::TRACKING_SCREEN,
            },
            dwOutputId: params.output_id,
            captureBox: params
                .capture_box
                .map(|b| NVFBC_BOX {
                    x: b.x,
                    y: b.y,
                    w: b.width,
                    h: b.height,
                })
                .unwrap_or_default(),
            frameSize: NVFBC_SIZE {
                w: params.frame_size.width,
                h: params.frame_size.height,
            },
            bWithCursor: if params.with_cursor { NVFBC_TRUE } else { NVFBC_FALSE },
            dwSamplingRateMs: params.sampling_ms,
            bPushModel: if params.push_model { NVFBC_TRUE } else { NVFBC_FALSE },
            bAllowDirectCapture: if params.allow_direct { NVFBC_TRUE } else { NVFBC_FALSE },
            ..Default::default()
        };

        let status = unsafe { create(handle, &mut raw) };
        if let Err(err) = self.check(handle, status) {
            let _ = self.destroy_handle(handle);
            return Err(err);
        }
        info!(handle, "driver capture session created");
        Ok(SessionHandle::from_raw(handle))
    }

    fn setup_buffers(&self, session: SessionHandle) -> Result<()> {
        let setup = self
            .lib
            .fns
            .nvFBCToGLSetUp
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;
        let handle = session.as_raw();
        let mut params = NVFBC_TOGL_SETUP_PARAMS {
            eBufferFormat: NVFBC_BUFFER_FORMAT::BGRA,
            ..Default::default()
        };
        let status = unsafe { setup(handle, &mut params) };
        self.check(handle, status)?;
        debug!(handle, "frame buffers negotiated (BGRA)");
        Ok(())
    }

    fn grab_frame(&self, session: SessionHandle) -> Result<usize> {
        let grab = self
            .lib
            .fns
            .nvFBCToGLGrabFrame
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;
        let handle = session.as_raw();
        let mut params = NVFBC_TOGL_GRAB_FRAME_PARAMS::default();
        let status = unsafe { grab(handle, &mut params) };
        self.check(handle, status)?;

        let slot = params.dwTextureIndex as usize;
        if slot >= SLOT_COUNT {
            return Err(FbcError::backend(
                0,
                format!("driver returned out-of-range texture index {}", slot),
            ));
        }
        Ok(slot)
    }

    fn destroy_session(&self, session: SessionHandle) -> Result<()> {
        let handle = session.as_raw();
        let destroy = self
            .lib
            .fns
            .nvFBCDestroyCaptureSession
            .ok_or_else(|| FbcError::resource("driver function list incomplete"))?;
        let mut params = NVFBC_DESTROY_CAPTURE_SESSION_PARAMS::default();
        let status = unsafe { destroy(handle, &mut params) };
        let session_result = self.check(handle, status);
        if let Err(ref err) = session_result {
            warn!(%err, "capture session destroy failed");
        }
        // The handle is released even when the session destroy failed.
        self.destroy_handle(handle)?;
        session_result
    }

    fn frame_memory(&self, _session: SessionHandle, slot: usize) -> Result<DeviceMemory> {
        registry()
            .driver_state()
            .lock()
            .frame_allocation(slot)
            .ok_or_else(|| {
                FbcError::bridge(format!("no driver allocation recorded for slot {}", slot))
            })
    }

    fn export_memory(
        &self,
        _session: SessionHandle,
        memory: DeviceMemory,
    ) -> Result<ExportedMemory> {
        let device = registry()
            .driver_state()
            .lock()
            .device
            .ok_or_else(|| FbcError::bridge("no Vulkan device recorded"))?;

        let get_fd = registry().resolve(VULKAN_LIB, "vkGetMemoryFdKHR")?;
        // Safety: the pointer came from the Vulkan loader and has the
        // vkGetMemoryFdKHR signature.
        let get_fd: PfnVkGetMemoryFdKhr = unsafe { std::mem::transmute(get_fd) };

        let info = VkMemoryGetFdInfoKHR {
            sType: VK_STRUCTURE_TYPE_MEMORY_GET_FD_INFO_KHR,
            pNext: std::ptr::null(),
            memory: memory.raw,
            handleType: VK_EXTERNAL_MEMORY_HANDLE_TYPE_OPAQUE_FD_BIT,
        };
        let mut fd: c_int = -1;
        let result = unsafe { get_fd(device, &info, &mut fd) };
        if result != VK_SUCCESS || fd < 0 {
            return Err(FbcError::bridge(format!(
                "vkGetMemoryFdKHR failed (VkResult {})",
                result
            )));
        }
        // Safety: a successful export hands us ownership of the fd.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        debug!(raw = memory.raw, size = memory.size, "exported frame memory");
        Ok(ExportedMemory {
            fd,
            size: memory.size,
        })
    }
}

static OVERRIDES_INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Vulkan observers into the substitution registry.
///
/// Installed once per process and never removed; the driver resolves
/// `vkCreateDevice` and `vkAllocateMemory` through the registry and gets
/// our recording wrappers, which forward to the real entry points.
fn install_vulkan_overrides() -> Result<()> {
    if OVERRIDES_INSTALLED.get().is_some() {
        return Ok(());
    }
    // Resolve the real symbols up front so a missing loader fails here,
    // not inside the driver.
    registry().resolve_real(VULKAN_LIB, "vkCreateDevice")?;
    registry().resolve_real(VULKAN_LIB, "vkAllocateMemory")?;
    unsafe {
        registry().install(
            VULKAN_LIB,
            "vkCreateDevice",
            vk_create_device_override as *const c_void,
        );
        registry().install(
            VULKAN_LIB,
            "vkAllocateMemory",
            vk_allocate_memory_override as *const c_void,
        );
    }
    let _ = OVERRIDES_INSTALLED.set(());
    info!("Vulkan observers installed");
    Ok(())
}

unsafe extern "C" fn vk_create_device_override(
    physical_device: u64,
    create_info: *const c_void,
    allocator: *const c_void,
    device: *mut u64,
) -> i32 {
    let real = match registry().resolve_real(VULKAN_LIB, "vkCreateDevice") {
        Ok(ptr) => ptr,
        Err(_) => return -1,
    };
    let real: PfnVkCreateDevice = unsafe { std::mem::transmute(real) };
    let result = unsafe { real(physical_device, create_info, allocator, device) };
    if result == VK_SUCCESS && !device.is_null() {
        let created = unsafe { *device };
        registry().driver_state().lock().device = Some(created);
        debug!(device = created, "recorded Vulkan device");
    }
    result
}

unsafe extern "C" fn vk_allocate_memory_override(
    device: u64,
    allocate_info: *const VkMemoryAllocateInfo,
    allocator: *const c_void,
    memory: *mut u64,
) -> i32 {
    let real = match registry().resolve_real(VULKAN_LIB, "vkAllocateMemory") {
        Ok(ptr) => ptr,
        Err(_) => return -1,
    };
    let real: PfnVkAllocateMemory = unsafe { std::mem::transmute(real) };
    let result = unsafe { real(device, allocate_info, allocator, memory) };
    if result == VK_SUCCESS && !memory.is_null() && !allocate_info.is_null() {
        let size = unsafe { (*allocate_info).allocationSize };
        let raw = unsafe { *memory };
        registry().driver_state().lock().record_allocation(raw, size);
    }
    result
}
