//! GPU-accelerated layer kernels using WGPU.
//!
//! This module implements the `f32` compute kernels on the GPU using WGPU + WGSL.
//! It handles GPU context initialization, shader precompilation (via `lazy_static`),
//! and compute dispatch for every layer kernel:
//!
//! - `elementwise`: sigmoid / tanh / relu / power-affine forward and backward,
//!   plus the quadratic, softmax and log-softmax cross-entropy gradients
//! - `columns`: softmax / log-softmax forward, softmax backward and the
//!   unnormalized cross-entropy gradient, one invocation per column
//!
//! Every entry point returns `None` instead of failing: the context could not
//! be created, a shader failed validation, the buffer exceeds the device
//! limits, or the device reported an error. The dispatcher then runs the CPU
//! kernel on the untouched input.

use std::sync::mpsc;

use briny::prelude::*;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::activation::{Activation, PowerAffine};
use crate::loss::LossKind;

const ELEMENTWISE: &str = include_str!("shaders/elementwise.wgsl");
const COLUMNS: &str = include_str!("shaders/columns.wgsl");

const WORKGROUP_SIZE: u32 = 64;

/// Basic wrapper for common GPU errors.
#[derive(Debug)]
pub enum GpuError {
    /// An error in requesting the adapter.
    Adapter(wgpu::RequestAdapterError),
    /// An error in requesting the GPU (device).
    Device(wgpu::RequestDeviceError),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::Adapter(e) => write!(f, "Adapter error: {e}"),
            GpuError::Device(e) => write!(f, "Device error: {e}"),
        }
    }
}

/// Wrapper for a `GpuError` or `ValidationError` depending on how it fails.
#[derive(Debug)]
pub enum GpuFailureKind {
    /// An error resulting from the GPU.
    Gpu(GpuError),
    /// A shader source was rejected.
    Validation(ValidationError),
}

impl std::fmt::Display for GpuFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuFailureKind::Gpu(err) => write!(f, "GPU error: {err}"),
            GpuFailureKind::Validation(_) => write!(f, "shader source failed validation"),
        }
    }
}

/// A failure while launching a kernel.
#[derive(Debug)]
pub struct GpuFailure {
    /// The optional type of failure that occurred.
    pub kind: Option<GpuFailureKind>,
    /// The optional message explaining the failure.
    pub message: Option<String>,
}

impl From<GpuError> for GpuFailure {
    fn from(kind: GpuError) -> Self {
        Self {
            kind: Some(GpuFailureKind::Gpu(kind)),
            message: None,
        }
    }
}

impl From<ValidationError> for GpuFailure {
    fn from(kind: ValidationError) -> Self {
        Self {
            kind: Some(GpuFailureKind::Validation(kind)),
            message: None,
        }
    }
}

impl From<&str> for GpuFailure {
    fn from(msg: &str) -> Self {
        Self {
            kind: None,
            message: Some(msg.to_string()),
        }
    }
}

impl From<String> for GpuFailure {
    fn from(msg: String) -> Self {
        Self {
            kind: None,
            message: Some(msg),
        }
    }
}

impl std::fmt::Display for GpuFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "GPU failure: {kind}")
        } else if let Some(msg) = &self.message {
            write!(f, "GPU failure: {msg}")
        } else {
            write!(f, "Unknown GPU failure")
        }
    }
}

impl std::error::Error for GpuFailure {}

/// Holds the WGPU device and queue used for executing compute pipelines.
///
/// Initialized once globally and reused for all operations via `lazy_static`.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Selects the default adapter and creates a device + queue.
    ///
    /// # Errors
    /// `GpuError` if adapter or device acquisition fails.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("briny_layers"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        Ok(Self { device, queue })
    }
}

/// Secure wrapper for WGSL source code.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("fn main") {
            return Err(ValidationError);
        }

        // no source inclusion
        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Validates a WGSL shader and compiles it on `device`.
pub fn load_shader(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, GpuFailure> {
    WgslSource(source).validate()?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    }))
}

/// The two compute pipelines and the bind group layout they share.
///
/// Bindings: `0` uniform parameters, `1` read-only source (`x`, `y` or a
/// one-element placeholder), `2` the read-write buffer being overwritten.
struct Pipelines {
    layout: wgpu::BindGroupLayout,
    elementwise: wgpu::ComputePipeline,
    columns: wgpu::ComputePipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device) -> Result<Self, GpuFailure> {
        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layers_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),
                storage(2, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("layers_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, source: &str| -> Result<wgpu::ComputePipeline, GpuFailure> {
            let module = load_shader(device, label, source)?;
            Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                cache: None,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }))
        };

        Ok(Self {
            elementwise: pipeline("elementwise", ELEMENTWISE)?,
            columns: pipeline("columns", COLUMNS)?,
            layout,
        })
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new().map_err(GpuFailure::from) {
        Ok(ctx) => {
            log::info!("wgpu context initialized");
            Some(ctx)
        }
        Err(e) => {
            log::warn!("wgpu context unavailable, layer kernels stay on the cpu: {e}");
            None
        }
    };
    static ref PIPELINES: Option<Pipelines> = GPU_CONTEXT.as_ref().and_then(|ctx| {
        Pipelines::new(&ctx.device)
            .map_err(|e| log::warn!("wgpu pipelines unavailable: {e}"))
            .ok()
    });
}

/// Which pipeline a launch uses.
#[derive(Clone, Copy)]
enum Kernel {
    Elementwise,
    Columns,
}

/// Op codes understood by `elementwise.wgsl`.
mod elementwise {
    pub const SIGMOID_FORWARD: u32 = 0;
    pub const TANH_FORWARD: u32 = 1;
    pub const RELU_FORWARD: u32 = 2;
    pub const POWER_AFFINE_FORWARD: u32 = 3;
    pub const SIGMOID_BACKWARD: u32 = 4;
    pub const TANH_BACKWARD: u32 = 5;
    pub const RELU_BACKWARD: u32 = 6;
    pub const POWER_AFFINE_BACKWARD: u32 = 7;
    pub const QUADRATIC_GRADIENT: u32 = 8;
    pub const SOFTMAX_CE_GRADIENT: u32 = 9;
    pub const LOG_SOFTMAX_CE_GRADIENT: u32 = 10;
}

/// Op codes understood by `columns.wgsl`.
mod columns {
    pub const SOFTMAX_FORWARD: u32 = 0;
    pub const LOG_SOFTMAX_FORWARD: u32 = 1;
    pub const SOFTMAX_BACKWARD: u32 = 2;
    pub const XENT_GRADIENT: u32 = 3;
}

/// Mirror of the `Params` uniform in both shaders.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    op: u32,
    len: u32,
    features: u32,
    batch: u32,
    a: f32,
    p: f32,
    b: f32,
    scale: f32,
}

impl Params {
    fn new(op: u32, len: usize, features: usize) -> Option<Self> {
        Some(Self {
            op,
            len: u32::try_from(len).ok()?,
            features: u32::try_from(features).ok()?,
            batch: u32::try_from(len / features).ok()?,
            a: 0.0,
            p: 0.0,
            b: 0.0,
            scale: 1.0,
        })
    }

    fn with_power_affine(self, params: &PowerAffine) -> Self {
        Self {
            a: params.a as f32,
            p: params.p as f32,
            b: params.b as f32,
            ..self
        }
    }

    /// `1 / batch`, the normalization of every loss gradient.
    fn with_batch_scale(self) -> Self {
        Self {
            scale: (1.0 / f64::from(self.batch)) as f32,
            ..self
        }
    }
}

/// `pow` on the GPU is only defined for positive bases. Other inputs are
/// left to the CPU unless the exponent is a whole number no smaller than one,
/// which the shader evaluates with an explicit sign.
fn power_affine_fits(params: &PowerAffine, x: &[f32]) -> bool {
    let whole = params.p.fract() == 0.0 && params.p >= 1.0;
    whole || x.iter().all(|&v| v > 0.0)
}

/// Runs one kernel over `data`, overwriting it only if every step succeeded.
fn launch(
    kernel: Kernel,
    params: Params,
    source: &[f32],
    data: &mut [f32],
) -> Result<(), GpuFailure> {
    let ctx = GPU_CONTEXT.as_ref().ok_or("no GPU context")?;
    let pipelines = PIPELINES.as_ref().ok_or("no compute pipelines")?;
    let device = &ctx.device;
    let queue = &ctx.queue;

    let size = std::mem::size_of_val(data) as u64;
    let limit = u64::from(device.limits().max_storage_buffer_binding_size);
    if size > limit {
        return Err(format!("buffer of {size} bytes exceeds the device limit of {limit}").into());
    }

    let threads = match kernel {
        Kernel::Elementwise => params.len,
        Kernel::Columns => params.batch,
    };

    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let source: &[f32] = if source.is_empty() { &[0.0] } else { source };
    let source_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("source"),
        contents: bytemuck::cast_slice(source),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let data_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("data"),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("layers_bind_group"),
        layout: &pipelines.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: source_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: data_buffer.as_entire_binding(),
            },
        ],
    });

    let pipeline = match kernel {
        Kernel::Elementwise => &pipelines.elementwise,
        Kernel::Columns => &pipelines.columns,
    };

    // large launches wrap into a second grid dimension
    let groups = threads.div_ceil(WORKGROUP_SIZE);
    let groups_x = groups.min(device.limits().max_compute_workgroups_per_dimension);
    let groups_y = groups.div_ceil(groups_x);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("layers_encoder"),
    });

    {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("layers_pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
    }

    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    encoder.copy_buffer_to_buffer(&data_buffer, 0, &staging_buffer, 0, size);

    queue.submit(Some(encoder.finish()));
    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| format!("device poll failed: {e}"))?;
    rx.recv()
        .map_err(|_| "buffer map callback dropped")?
        .map_err(|e| format!("buffer map failed: {e}"))?;

    {
        let mapped = buffer_slice.get_mapped_range();
        let out: &[f32] = bytemuck::try_cast_slice(&mapped)
            .map_err(|e| format!("mapped buffer is not f32 data: {e}"))?;
        data.copy_from_slice(out);
    }
    staging_buffer.unmap();

    Ok(())
}

fn finish(op: &str, result: Result<(), GpuFailure>) -> Option<()> {
    result
        .map_err(|e| log::warn!("{op}: {e}, falling back to the cpu"))
        .ok()
}

/// Overwrites `data` (holding `x`) with the activation of `x`.
///
/// # Returns
/// - `Some(())` on success
/// - `None` if the kernel could not run; `data` is then unchanged
pub fn wgpu_activation_forward(act: &Activation, data: &mut [f32], features: usize) -> Option<()> {
    let (kernel, op) = match act {
        Activation::Sigmoid => (Kernel::Elementwise, elementwise::SIGMOID_FORWARD),
        Activation::Tanh => (Kernel::Elementwise, elementwise::TANH_FORWARD),
        Activation::Relu => (Kernel::Elementwise, elementwise::RELU_FORWARD),
        Activation::PowerAffine(_) => (Kernel::Elementwise, elementwise::POWER_AFFINE_FORWARD),
        Activation::Softmax => (Kernel::Columns, columns::SOFTMAX_FORWARD),
        Activation::LogSoftmax => (Kernel::Columns, columns::LOG_SOFTMAX_FORWARD),
    };

    let mut params = Params::new(op, data.len(), features)?;
    if let Activation::PowerAffine(pa) = act {
        if !power_affine_fits(pa, data) {
            return None;
        }
        params = params.with_power_affine(pa);
    }

    finish(act.info().forward_op, launch(kernel, params, &[], data))
}

/// Overwrites `grad` (holding `dy`) with `dx`.
///
/// `source` is the saved `x` (power-affine) or `y` (every other kind).
/// LogSoftmax backward is the identity and never touches the device.
pub fn wgpu_activation_backward(
    act: &Activation,
    grad: &mut [f32],
    source: &[f32],
    features: usize,
) -> Option<()> {
    let (kernel, op) = match act {
        Activation::Sigmoid => (Kernel::Elementwise, elementwise::SIGMOID_BACKWARD),
        Activation::Tanh => (Kernel::Elementwise, elementwise::TANH_BACKWARD),
        Activation::Relu => (Kernel::Elementwise, elementwise::RELU_BACKWARD),
        Activation::PowerAffine(_) => (Kernel::Elementwise, elementwise::POWER_AFFINE_BACKWARD),
        Activation::Softmax => (Kernel::Columns, columns::SOFTMAX_BACKWARD),
        Activation::LogSoftmax => return Some(()),
    };

    let mut params = Params::new(op, grad.len(), features)?;
    if let Activation::PowerAffine(pa) = act {
        if !power_affine_fits(pa, source) {
            return None;
        }
        params = params.with_power_affine(pa);
    }

    finish(act.info().backward_op, launch(kernel, params, source, grad))
}

/// Overwrites the target `z` with the loss gradient for output `y`.
pub fn wgpu_loss_gradient(kind: LossKind, y: &[f32], z: &mut [f32], features: usize) -> Option<()> {
    let (kernel, op) = match kind {
        LossKind::Quadratic => (Kernel::Elementwise, elementwise::QUADRATIC_GRADIENT),
        LossKind::SoftmaxCrossEntropy => (Kernel::Elementwise, elementwise::SOFTMAX_CE_GRADIENT),
        LossKind::LogSoftmaxCrossEntropy => {
            (Kernel::Elementwise, elementwise::LOG_SOFTMAX_CE_GRADIENT)
        }
        LossKind::UnnormalizedCrossEntropy => (Kernel::Columns, columns::XENT_GRADIENT),
    };

    let params = Params::new(op, z.len(), features)?.with_batch_scale();
    finish(kind.name(), launch(kernel, params, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_pass_validation() {
        assert!(WgslSource(ELEMENTWISE).validate().is_ok());
        assert!(WgslSource(COLUMNS).validate().is_ok());
    }

    #[test]
    fn validation_rejects_forbidden_source() {
        assert!(WgslSource("fn helper() {}").validate().is_err());
        assert!(WgslSource("fn main() { unsafe {} }").validate().is_err());
    }

    #[test]
    fn context_errors_become_gpu_failures() {
        let failure = GpuFailure::from(GpuError::Adapter(wgpu::RequestAdapterError::EnvNotSet));
        assert!(matches!(failure.kind, Some(GpuFailureKind::Gpu(_))));
        assert_eq!(
            failure.to_string(),
            "GPU failure: GPU error: Adapter error: WGPU_ADAPTER_NAME not set"
        );
    }

    #[test]
    fn params_layout_is_eight_words() {
        let params = Params::new(elementwise::SIGMOID_FORWARD, 6, 3)
            .map(Params::with_batch_scale)
            .expect("small launch fits in u32");
        let bytes = bytemuck::bytes_of(&params);
        assert_eq!(bytes.len(), 32);
        // batch, then the 0.5 scale in the last word
        let words: &[u32] = bytemuck::cast_slice(bytes);
        assert_eq!(words[..4], [elementwise::SIGMOID_FORWARD, 6, 3, 2]);
        assert_eq!(words[7], 0.5f32.to_bits());
    }

    #[test]
    fn power_affine_needs_positive_input_for_fractional_exponent() {
        let sqrt = PowerAffine {
            a: 1.0,
            p: 0.5,
            b: 0.0,
        };
        assert!(power_affine_fits(&sqrt, &[1.0, 4.0]));
        assert!(!power_affine_fits(&sqrt, &[-1.0, 4.0]));
        assert!(power_affine_fits(&PowerAffine::default(), &[-1.0, 0.0]));
    }
}
