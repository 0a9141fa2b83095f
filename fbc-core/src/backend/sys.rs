//! Raw FFI bindings for the NVIDIA Frame Buffer Capture library
//!
//! These bindings are loaded dynamically at runtime from
//! libnvidia-fbc.so.1, shipped with the NVIDIA driver. The library
//! exposes a single entry point, `NvFBCCreateInstance`, which populates
//! a versioned function list; everything else goes through that list.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]

use std::ffi::c_void;
use std::os::raw::c_char;

/// Interface version the bindings target (driver API 1.8)
pub const NVFBC_VERSION_MAJOR: u32 = 1;
pub const NVFBC_VERSION_MINOR: u32 = 8;
pub const NVFBC_VERSION: u32 = NVFBC_VERSION_MINOR | (NVFBC_VERSION_MAJOR << 8);

/// Maximum outputs reported by a status query
pub const NVFBC_OUTPUT_MAX: usize = 5;

/// Size of the fixed output-name buffer, including the NUL
pub const NVFBC_OUTPUT_NAME_LEN: usize = 128;

/// Maximum GL textures a ToGL session cycles through
pub const NVFBC_TOGL_TEXTURES_MAX: usize = 16;

/// Compute the `dwVersion` tag for a parameter struct
pub const fn nvfbc_struct_version(struct_size: usize, ver: u32) -> u32 {
    struct_size as u32 | (ver << 16) | (NVFBC_VERSION << 24)
}

/// NvFBC API return status codes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NVFBCSTATUS {
    SUCCESS = 0,
    ERR_API_VERSION = 1,
    ERR_INTERNAL = 2,
    ERR_INVALID_PARAM = 3,
    ERR_INVALID_PTR = 4,
    ERR_INVALID_HANDLE = 5,
    ERR_MAX_CLIENTS = 6,
    ERR_UNSUPPORTED = 7,
    ERR_OUT_OF_MEMORY = 8,
    ERR_BAD_REQUEST = 9,
    ERR_X = 10,
    ERR_GLX = 11,
    ERR_GL = 12,
    ERR_CONTEXT = 13,
    ERR_MUST_RECREATE = 14,
    ERR_VULKAN = 15,
}

impl NVFBCSTATUS {
    /// Check if status indicates success
    pub fn is_success(&self) -> bool {
        *self == NVFBCSTATUS::SUCCESS
    }

    /// Convert to a human-readable error message
    pub fn to_error_string(&self) -> &'static str {
        match self {
            NVFBCSTATUS::SUCCESS => "Success",
            NVFBCSTATUS::ERR_API_VERSION => "API version mismatch",
            NVFBCSTATUS::ERR_INTERNAL => "Internal driver error",
            NVFBCSTATUS::ERR_INVALID_PARAM => "Invalid parameter",
            NVFBCSTATUS::ERR_INVALID_PTR => "Invalid pointer",
            NVFBCSTATUS::ERR_INVALID_HANDLE => "Invalid session handle",
            NVFBCSTATUS::ERR_MAX_CLIENTS => "Too many capture clients",
            NVFBCSTATUS::ERR_UNSUPPORTED => "Operation not supported",
            NVFBCSTATUS::ERR_OUT_OF_MEMORY => "Out of memory",
            NVFBCSTATUS::ERR_BAD_REQUEST => "Bad request for current session state",
            NVFBCSTATUS::ERR_X => "X server error",
            NVFBCSTATUS::ERR_GLX => "GLX error",
            NVFBCSTATUS::ERR_GL => "OpenGL error",
            NVFBCSTATUS::ERR_CONTEXT => "Wrong capture context",
            NVFBCSTATUS::ERR_MUST_RECREATE => "Modeset occurred, session must be recreated",
            NVFBCSTATUS::ERR_VULKAN => "Vulkan error",
        }
    }
}

/// What the frames are captured into
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NVFBC_CAPTURE_TYPE {
    /// System memory
    CAPTURE_TO_SYS = 0,
    /// CUDA device memory
    CAPTURE_SHARED_CUDA = 1,
    /// OpenGL textures backed by driver-internal Vulkan memory
    CAPTURE_TO_GL = 3,
}

/// How the session follows screen geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NVFBC_TRACKING_TYPE {
    /// Track the primary output
    TRACKING_DEFAULT = 0,
    /// Track the RandR output given by `dwOutputId`
    TRACKING_OUTPUT = 1,
    /// Track the entire X screen
    TRACKING_SCREEN = 2,
}

/// Pixel format of the captured frames
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NVFBC_BUFFER_FORMAT {
    ARGB = 0,
    RGB = 1,
    NV12 = 2,
    YUV444P = 3,
    RGBA = 4,
    BGRA = 5,
}

/// NvFBC boolean
pub type NVFBC_BOOL = u32;
pub const NVFBC_FALSE: NVFBC_BOOL = 0;
pub const NVFBC_TRUE: NVFBC_BOOL = 1;

/// Opaque session handle
pub type NVFBC_SESSION_HANDLE = u64;

/// Rectangle in desktop coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NVFBC_BOX {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Dimensions in pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NVFBC_SIZE {
    pub w: u32,
    pub h: u32,
}

/// One RandR output as reported by a status query
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NVFBC_RANDR_OUTPUT_INFO {
    /// RandR output id, usable as `dwOutputId`
    pub dwId: u32,
    /// NUL-terminated output name
    pub name: [c_char; NVFBC_OUTPUT_NAME_LEN],
    /// Tracked region of the X screen
    pub trackedBox: NVFBC_BOX,
}

impl Default for NVFBC_RANDR_OUTPUT_INFO {
    fn default() -> Self {
        Self {
            dwId: 0,
            name: [0; NVFBC_OUTPUT_NAME_LEN],
            trackedBox: NVFBC_BOX::default(),
        }
    }
}

/// Parameters for NvFBCCreateHandle
#[repr(C)]
pub struct NVFBC_CREATE_HANDLE_PARAMS {
    pub dwVersion: u32,
    /// Vendor private data, unused here
    pub privateData: *const c_void,
    pub privateDataSize: u32,
    /// Use the caller's GL context instead of creating one
    pub bExternallyManagedContext: NVFBC_BOOL,
    pub glxCtx: *mut c_void,
    pub glxFBConfig: *mut c_void,
}

impl Default for NVFBC_CREATE_HANDLE_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 2),
            privateData: std::ptr::null(),
            privateDataSize: 0,
            bExternallyManagedContext: NVFBC_FALSE,
            glxCtx: std::ptr::null_mut(),
            glxFBConfig: std::ptr::null_mut(),
        }
    }
}

/// Parameters for NvFBCDestroyHandle
#[repr(C)]
pub struct NVFBC_DESTROY_HANDLE_PARAMS {
    pub dwVersion: u32,
}

impl Default for NVFBC_DESTROY_HANDLE_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 1),
        }
    }
}

/// Parameters for NvFBCGetStatus
#[repr(C)]
pub struct NVFBC_GET_STATUS_PARAMS {
    pub dwVersion: u32,
    /// Out: capture is supported on this system
    pub bIsCapturePossible: NVFBC_BOOL,
    /// Out: a session is currently capturing on this handle
    pub bCurrentlyCapturing: NVFBC_BOOL,
    /// Out: a capture session can be created right now
    pub bCanCreateNow: NVFBC_BOOL,
    /// Out: size of the X screen
    pub screenSize: NVFBC_SIZE,
    /// Out: RandR extension available
    pub bXRandRAvailable: NVFBC_BOOL,
    /// Out: attached outputs
    pub outputs: [NVFBC_RANDR_OUTPUT_INFO; NVFBC_OUTPUT_MAX],
    /// Out: number of valid entries in `outputs`
    pub dwOutputNum: u32,
    /// Out: driver library version
    pub dwNvFBCVersion: u32,
    /// Out: a modeset is in progress
    pub bInModeset: NVFBC_BOOL,
}

impl Default for NVFBC_GET_STATUS_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 2),
            bIsCapturePossible: NVFBC_FALSE,
            bCurrentlyCapturing: NVFBC_FALSE,
            bCanCreateNow: NVFBC_FALSE,
            screenSize: NVFBC_SIZE::default(),
            bXRandRAvailable: NVFBC_FALSE,
            outputs: [NVFBC_RANDR_OUTPUT_INFO::default(); NVFBC_OUTPUT_MAX],
            dwOutputNum: 0,
            dwNvFBCVersion: 0,
            bInModeset: NVFBC_FALSE,
        }
    }
}

/// Parameters for NvFBCCreateCaptureSession
#[repr(C)]
pub struct NVFBC_CREATE_CAPTURE_SESSION_PARAMS {
    pub dwVersion: u32,
    pub eCaptureType: NVFBC_CAPTURE_TYPE,
    pub eTrackingType: NVFBC_TRACKING_TYPE,
    /// RandR output id; used with TRACKING_OUTPUT only
    pub dwOutputId: u32,
    /// Region to capture; all zeroes captures everything
    pub captureBox: NVFBC_BOX,
    /// Size frames are scaled to
    pub frameSize: NVFBC_SIZE,
    /// Composite the hardware cursor
    pub bWithCursor: NVFBC_BOOL,
    pub bDisableAutoModesetRecovery: NVFBC_BOOL,
    /// Round the frame size to driver-friendly values
    pub bRoundFrameSize: NVFBC_BOOL,
    /// Min interval between grabs in ms; ignored with push model
    pub dwSamplingRateMs: u32,
    /// Grabs block until the compositor produces a new frame
    pub bPushModel: NVFBC_BOOL,
    /// Let the driver capture fullscreen applications directly
    pub bAllowDirectCapture: NVFBC_BOOL,
}

impl Default for NVFBC_CREATE_CAPTURE_SESSION_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 6),
            eCaptureType: NVFBC_CAPTURE_TYPE::CAPTURE_TO_GL,
            eTrackingType: NVFBC_TRACKING_TYPE::TRACKING_DEFAULT,
            dwOutputId: 0,
            captureBox: NVFBC_BOX::default(),
            frameSize: NVFBC_SIZE::default(),
            bWithCursor: NVFBC_FALSE,
            bDisableAutoModesetRecovery: NVFBC_FALSE,
            bRoundFrameSize: NVFBC_FALSE,
            dwSamplingRateMs: 0,
            bPushModel: NVFBC_FALSE,
            bAllowDirectCapture: NVFBC_FALSE,
        }
    }
}

/// Parameters for NvFBCDestroyCaptureSession
#[repr(C)]
pub struct NVFBC_DESTROY_CAPTURE_SESSION_PARAMS {
    pub dwVersion: u32,
}

impl Default for NVFBC_DESTROY_CAPTURE_SESSION_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 1),
        }
    }
}

/// Parameters for NvFBCToGLSetUp
#[repr(C)]
pub struct NVFBC_TOGL_SETUP_PARAMS {
    pub dwVersion: u32,
    pub eBufferFormat: NVFBC_BUFFER_FORMAT,
    pub bWithDiffMap: NVFBC_BOOL,
    pub ppDiffMap: *mut *mut c_void,
    pub dwDiffMapScalingFactor: u32,
    /// Out: GL texture names the session cycles through
    pub dwTextures: [u32; NVFBC_TOGL_TEXTURES_MAX],
    /// Out: GL target and internal format of those textures
    pub dwTexTarget: u32,
    pub dwTexFormat: u32,
    pub dwTexType: u32,
}

impl Default for NVFBC_TOGL_SETUP_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 2),
            eBufferFormat: NVFBC_BUFFER_FORMAT::BGRA,
            bWithDiffMap: NVFBC_FALSE,
            ppDiffMap: std::ptr::null_mut(),
            dwDiffMapScalingFactor: 1,
            dwTextures: [0; NVFBC_TOGL_TEXTURES_MAX],
            dwTexTarget: 0,
            dwTexFormat: 0,
            dwTexType: 0,
        }
    }
}

/// Grab flags for NvFBCToGLGrabFrame
pub const NVFBC_TOGL_GRAB_FLAGS_NOFLAGS: u32 = 0;
pub const NVFBC_TOGL_GRAB_FLAGS_NOWAIT: u32 = 1;
pub const NVFBC_TOGL_GRAB_FLAGS_FORCE_REFRESH: u32 = 2;

/// Frame metadata written by a grab
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NVFBC_FRAME_GRAB_INFO {
    pub dwWidth: u32,
    pub dwHeight: u32,
    pub dwByteSize: u32,
    pub dwCurrentFrame: u32,
    pub bIsNewFrame: NVFBC_BOOL,
    pub ulTimestampUs: u64,
    pub dwMissedFrames: u32,
    pub bRequiredPostProcessing: NVFBC_BOOL,
    pub bDirectCapture: NVFBC_BOOL,
}

/// Parameters for NvFBCToGLGrabFrame
#[repr(C)]
pub struct NVFBC_TOGL_GRAB_FRAME_PARAMS {
    pub dwVersion: u32,
    pub dwFlags: u32,
    /// Out: index into the setup textures holding this frame
    pub dwTextureIndex: u32,
    /// Out: frame dimensions
    pub dwWidth: u32,
    pub dwHeight: u32,
    /// Optional out: frame metadata
    pub pFrameGrabInfo: *mut NVFBC_FRAME_GRAB_INFO,
    /// Grab timeout in ms; 0 waits forever
    pub dwTimeoutMs: u32,
}

impl Default for NVFBC_TOGL_GRAB_FRAME_PARAMS {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 2),
            dwFlags: NVFBC_TOGL_GRAB_FLAGS_NOFLAGS,
            dwTextureIndex: 0,
            dwWidth: 0,
            dwHeight: 0,
            pFrameGrabInfo: std::ptr::null_mut(),
            dwTimeoutMs: 0,
        }
    }
}

/// Function pointer types populated by NvFBCCreateInstance
pub type PNVFBC_GET_LAST_ERROR =
    unsafe extern "C" fn(sessionHandle: NVFBC_SESSION_HANDLE) -> *const c_char;

pub type PNVFBC_CREATE_HANDLE = unsafe extern "C" fn(
    pSessionHandle: *mut NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_CREATE_HANDLE_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_DESTROY_HANDLE = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_DESTROY_HANDLE_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_GET_STATUS = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_GET_STATUS_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_CREATE_CAPTURE_SESSION = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_CREATE_CAPTURE_SESSION_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_DESTROY_CAPTURE_SESSION = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_DESTROY_CAPTURE_SESSION_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_TOGL_SETUP = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_TOGL_SETUP_PARAMS,
) -> NVFBCSTATUS;

pub type PNVFBC_TOGL_GRAB_FRAME = unsafe extern "C" fn(
    sessionHandle: NVFBC_SESSION_HANDLE,
    pParams: *mut NVFBC_TOGL_GRAB_FRAME_PARAMS,
) -> NVFBCSTATUS;

/// Versioned function list filled in by NvFBCCreateInstance.
///
/// Field order matches the driver header; the ToSys and ToCuda entries
/// are never called here but must keep their slots for ABI layout.
#[repr(C)]
pub struct NVFBC_API_FUNCTION_LIST {
    pub dwVersion: u32,
    pub nvFBCGetLastErrorStr: Option<PNVFBC_GET_LAST_ERROR>,
    pub nvFBCCreateHandle: Option<PNVFBC_CREATE_HANDLE>,
    pub nvFBCDestroyHandle: Option<PNVFBC_DESTROY_HANDLE>,
    pub nvFBCGetStatus: Option<PNVFBC_GET_STATUS>,
    pub nvFBCBindContext: *mut c_void,
    pub nvFBCReleaseContext: *mut c_void,
    pub nvFBCCreateCaptureSession: Option<PNVFBC_CREATE_CAPTURE_SESSION>,
    pub nvFBCDestroyCaptureSession: Option<PNVFBC_DESTROY_CAPTURE_SESSION>,
    pub nvFBCToSysSetUp: *mut c_void,
    pub nvFBCToSysGrabFrame: *mut c_void,
    pub nvFBCToCudaSetUp: *mut c_void,
    pub nvFBCToCudaGrabFrame: *mut c_void,
    pub pad1: *mut c_void,
    pub pad2: *mut c_void,
    pub pad3: *mut c_void,
    pub nvFBCToGLSetUp: Option<PNVFBC_TOGL_SETUP>,
    pub nvFBCToGLGrabFrame: Option<PNVFBC_TOGL_GRAB_FRAME>,
}

impl Default for NVFBC_API_FUNCTION_LIST {
    fn default() -> Self {
        Self {
            dwVersion: nvfbc_struct_version(std::mem::size_of::<Self>(), 2),
            nvFBCGetLastErrorStr: None,
            nvFBCCreateHandle: None,
            nvFBCDestroyHandle: None,
            nvFBCGetStatus: None,
            nvFBCBindContext: std::ptr::null_mut(),
            nvFBCReleaseContext: std::ptr::null_mut(),
            nvFBCCreateCaptureSession: None,
            nvFBCDestroyCaptureSession: None,
            nvFBCToSysSetUp: std::ptr::null_mut(),
            nvFBCToSysGrabFrame: std::ptr::null_mut(),
            nvFBCToCudaSetUp: std::ptr::null_mut(),
            nvFBCToCudaGrabFrame: std::ptr::null_mut(),
            pad1: std::ptr::null_mut(),
            pad2: std::ptr::null_mut(),
            pad3: std::ptr::null_mut(),
            nvFBCToGLSetUp: None,
            nvFBCToGLGrabFrame: None,
        }
    }
}

/// The library's single exported entry point
pub type FnNvFBCCreateInstance =
    unsafe extern "C" fn(pFunctionList: *mut NVFBC_API_FUNCTION_LIST) -> NVFBCSTATUS;

/// Library name resolved through the dynamic loader search path
pub const NVFBC_LIB_NAME: &str = "libnvidia-fbc.so.1";

/// Dynamically loaded NvFBC library with a populated function list
pub struct NvFbcLib {
    _lib: libloading::Library,
    pub fns: NVFBC_API_FUNCTION_LIST,
}

impl NvFbcLib {
    /// Load libnvidia-fbc.so.1 and populate the function list
    ///
    /// # Safety
    /// This function uses unsafe to:
    /// 1. Load a dynamic library which could execute arbitrary code in its init
    /// 2. Look up NvFBCCreateInstance and call it with a versioned struct
    ///
    /// We mitigate risks by:
    /// - Loading only the driver's canonical soname (NVFBC_LIB_NAME)
    /// - Tagging the function list with the exact struct size and API
    ///   version so a mismatched driver rejects it instead of writing
    ///   past the end
    /// - Verifying the entries we call are non-null before returning
    pub fn load() -> Result<Self, String> {
        // SAFETY: libnvidia-fbc.so.1 is the NVIDIA driver's capture
        // library; NvFBCCreateInstance has the documented signature and
        // only writes inside the struct described by dwVersion.
        unsafe {
            let lib = libloading::Library::new(NVFBC_LIB_NAME)
                .map_err(|e| format!("Failed to load {}: {}", NVFBC_LIB_NAME, e))?;

            let create_instance: FnNvFBCCreateInstance = *lib
                .get::<FnNvFBCCreateInstance>(b"NvFBCCreateInstance")
                .map_err(|e| format!("Failed to get NvFBCCreateInstance: {}", e))?;

            let mut fns = NVFBC_API_FUNCTION_LIST::default();
            let status = create_instance(&mut fns);
            if !status.is_success() {
                return Err(format!(
                    "NvFBCCreateInstance failed: {}",
                    status.to_error_string()
                ));
            }

            for (name, present) in [
                ("nvFBCGetLastErrorStr", fns.nvFBCGetLastErrorStr.is_some()),
                ("nvFBCCreateHandle", fns.nvFBCCreateHandle.is_some()),
                ("nvFBCDestroyHandle", fns.nvFBCDestroyHandle.is_some()),
                ("nvFBCGetStatus", fns.nvFBCGetStatus.is_some()),
                (
                    "nvFBCCreateCaptureSession",
                    fns.nvFBCCreateCaptureSession.is_some(),
                ),
                (
                    "nvFBCDestroyCaptureSession",
                    fns.nvFBCDestroyCaptureSession.is_some(),
                ),
                ("nvFBCToGLSetUp", fns.nvFBCToGLSetUp.is_some()),
                ("nvFBCToGLGrabFrame", fns.nvFBCToGLGrabFrame.is_some()),
            ] {
                if !present {
                    return Err(format!("Driver did not provide {}", name));
                }
            }

            tracing::info!("Loaded NvFBC library: {}", NVFBC_LIB_NAME);
            Ok(Self { _lib: lib, fns })
        }
    }
}

// SAFETY: NvFbcLib holds function pointers into the NVIDIA capture
// library. The driver serializes per-session state internally; callers
// additionally serialize per-handle use. The library handle (_lib) is
// kept alive for the lifetime of this struct, ensuring the function
// pointers remain valid.
unsafe impl Send for NvFbcLib {}
unsafe impl Sync for NvFbcLib {}
