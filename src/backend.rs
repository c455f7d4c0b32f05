//! Backend selection module.
//!
//! This module defines where layer kernels run and provides functions to set
//! and get the active location.
//!
//! # Supported Backends
//!
//! - `Cpu`: Pure Rust reference kernels, parallelized with `rayon` (default).
//! - `Wgpu`: GPU compute shaders through `wgpu` (requires the `wgpu` feature).
//! - `Cuda`: Placeholder routed through the `wgpu` kernels (requires `cuda`).
//!
//! The backend is stored globally using an `AtomicU8`, enabling fast
//! switching between CPU and GPU modes at runtime.
//!
//! Selecting an accelerated backend never changes results beyond
//! floating-point tolerance. When the backend has no kernel for a given
//! element type, or the device is unavailable, the CPU reference runs instead.

use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Backend {
    /// Host memory, CPU reference kernels (default).
    #[default]
    Cpu = 0,
    /// GPU-accelerated kernels using `wgpu`.
    Wgpu,
    /// Placeholder for native CUDA kernels.
    Cuda,
}

impl Backend {
    /// Whether this backend launches device kernels rather than running on the host.
    pub const fn is_accelerated(self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Whether kernels for this backend were compiled into the crate.
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Wgpu => cfg!(feature = "wgpu"),
            Self::Cuda => cfg!(feature = "cuda"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
            Self::Cuda => "cuda",
        })
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            2 => Ok(Self::Cuda),
            _ => Err(()),
        }
    }
}

/// Internal global state for the active backend.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the active backend used by every subsequent layer call.
///
/// # Example
///
/// ```
/// use briny_layers::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Cpu);
/// assert_eq!(get_backend(), Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    if !b.is_compiled() {
        log::warn!("backend {b} selected but not compiled in; kernels will run on the cpu");
    } else {
        log::info!("backend set to {b}");
    }
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active computation backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
