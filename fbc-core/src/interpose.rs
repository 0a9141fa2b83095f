//! Capability substitution layer
//!
//! The capture driver talks to Vulkan through dynamically resolved entry
//! points. This module owns a process-wide registry mapping
//! `(library, symbol)` to an override function pointer: resolution
//! consults the registry first and falls through to the real symbol via
//! `libloading` for anything not overridden. Overrides are installed
//! once at startup and never removed for the life of the process, so a
//! resolved pointer can be cached safely.
//!
//! The overrides exist to observe, not to change behavior: the Vulkan
//! hooks record the instance, the device and the frame-sized device
//! memory allocations the driver makes, into [`CapturedDriverState`].
//! That captured state is what lets the bridge export driver-internal
//! memory without any driver cooperation.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::bridge::SLOT_COUNT;
use crate::error::{FbcError, Result};
use crate::types::DeviceMemory;

/// Allocations at or below this size are scratch, not frame buffers.
///
/// The driver makes a handful of small allocations per session; the two
/// frame buffers are the only ones larger than this.
pub const MIN_FRAME_ALLOCATION: u64 = 10_000;

/// Vulkan driver state recorded by the substitution overrides
#[derive(Debug, Default)]
pub struct CapturedDriverState {
    /// Raw `VkInstance`, once the driver created one
    pub instance: Option<u64>,
    /// Raw `VkDevice`, once the driver created one
    pub device: Option<u64>,
    /// The frame-sized allocations, newest overwriting oldest in
    /// round-robin order
    memory: [Option<DeviceMemory>; SLOT_COUNT],
    next_memory: usize,
}

impl CapturedDriverState {
    /// Record a device-memory allocation; small scratch allocations are
    /// ignored
    pub fn record_allocation(&mut self, raw: u64, size: u64) {
        if size <= MIN_FRAME_ALLOCATION {
            trace!(size, "ignoring scratch allocation");
            return;
        }
        debug!(raw, size, slot = self.next_memory, "recorded frame allocation");
        self.memory[self.next_memory] = Some(DeviceMemory { raw, size });
        self.next_memory = (self.next_memory + 1) % SLOT_COUNT;
    }

    /// The allocation backing the given frame slot, if recorded
    pub fn frame_allocation(&self, slot: usize) -> Option<DeviceMemory> {
        self.memory.get(slot).copied().flatten()
    }

    /// Forget everything; called between sessions
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Process-wide symbol substitution registry
pub struct Registry {
    overrides: Mutex<HashMap<(String, String), usize>>,
    libraries: Mutex<HashMap<String, libloading::Library>>,
    driver_state: Mutex<CapturedDriverState>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, created on first use
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

impl Registry {
    fn new() -> Self {
        Self {
            overrides: Mutex::new(HashMap::new()),
            libraries: Mutex::new(HashMap::new()),
            driver_state: Mutex::new(CapturedDriverState::default()),
        }
    }

    /// Install an override for `symbol` in `library`.
    ///
    /// # Safety
    ///
    /// `func` must be a function pointer with the exact signature the
    /// real symbol has; callers resolved through the registry will call
    /// it as such.
    pub unsafe fn install(&self, library: &str, symbol: &str, func: *const c_void) {
        debug!(library, symbol, "installing symbol override");
        self.overrides
            .lock()
            .insert((library.to_string(), symbol.to_string()), func as usize);
    }

    /// Resolve `symbol` in `library`: the override if one is installed,
    /// otherwise the real symbol loaded with `libloading`.
    pub fn resolve(&self, library: &str, symbol: &str) -> Result<*const c_void> {
        if let Some(&ptr) = self
            .overrides
            .lock()
            .get(&(library.to_string(), symbol.to_string()))
        {
            return Ok(ptr as *const c_void);
        }
        self.resolve_real(library, symbol)
    }

    /// Resolve the real symbol, bypassing any override
    pub fn resolve_real(&self, library: &str, symbol: &str) -> Result<*const c_void> {
        let mut libraries = self.libraries.lock();
        if !libraries.contains_key(library) {
            // Safety: loading a shared library runs its initializers;
            // the libraries resolved here (Vulkan loader, capture
            // driver) are safe to load at any point.
            let lib = unsafe { libloading::Library::new(library) }.map_err(|e| {
                FbcError::resource(format!("failed to load {}: {}", library, e))
            })?;
            libraries.insert(library.to_string(), lib);
        }
        let lib = &libraries[library];

        let name = std::ffi::CString::new(symbol)
            .map_err(|_| FbcError::resource(format!("invalid symbol name {:?}", symbol)))?;
        // Safety: the symbol is only returned as an opaque pointer; the
        // caller transmutes it to the correct signature.
        let sym: libloading::Symbol<'_, *const c_void> =
            unsafe { lib.get(name.as_bytes_with_nul()) }.map_err(|e| {
                FbcError::resource(format!("failed to resolve {}::{}: {}", library, symbol, e))
            })?;
        Ok(*sym)
    }

    /// The driver state the Vulkan overrides record into
    pub fn driver_state(&self) -> &Mutex<CapturedDriverState> {
        &self.driver_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_takes_precedence() {
        let registry = Registry::new();
        let marker = 0xdead_beef_u64 as usize as *const c_void;
        unsafe { registry.install("libvulkan.so.1", "vkCreateDevice", marker) };
        let resolved = registry.resolve("libvulkan.so.1", "vkCreateDevice").unwrap();
        assert_eq!(resolved, marker);
    }

    #[test]
    fn test_missing_library_is_a_resource_error() {
        let registry = Registry::new();
        let err = registry
            .resolve("libdoes-not-exist.so.0", "nothing")
            .unwrap_err();
        assert!(matches!(err, FbcError::Resource(_)));
    }

    #[test]
    fn test_small_allocations_ignored() {
        let mut state = CapturedDriverState::default();
        state.record_allocation(0x1000, 4096);
        assert_eq!(state.frame_allocation(0), None);
    }

    #[test]
    fn test_frame_allocations_round_robin() {
        let mut state = CapturedDriverState::default();
        state.record_allocation(0x1000, 8_294_400);
        state.record_allocation(0x2000, 8_294_400);
        assert_eq!(state.frame_allocation(0).unwrap().raw, 0x1000);
        assert_eq!(state.frame_allocation(1).unwrap().raw, 0x2000);
        // A third allocation wraps around onto slot 0.
        state.record_allocation(0x3000, 8_294_400);
        assert_eq!(state.frame_allocation(0).unwrap().raw, 0x3000);
    }

    #[test]
    fn test_reset_clears_captured_state() {
        let mut state = CapturedDriverState::default();
        state.instance = Some(1);
        state.record_allocation(0x1000, 8_294_400);
        state.reset();
        assert_eq!(state.instance, None);
        assert_eq!(state.frame_allocation(0), None);
    }
}
