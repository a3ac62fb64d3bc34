//! wgpu compute backend
//!
//! Owns a headless device and queue. Each compile turns generated WGSL into
//! two compute pipelines (one per entry point) sharing a fixed bind group
//! layout: bodies at binding 0, results at binding 1, params at binding 2.
//! Dispatch is a single workgroup; the thread-group shape lives in the
//! kernel's `@workgroup_size` directive.

use std::sync::Arc;

use wgpu::{ComputePipeline, Device, Queue};

use super::{ComputeBackend, DeviceBuffers, DispatchLimits, GpuBody, GpuForce, KernelParams};
use crate::error::{SimResult, SimulationError};
use crate::simulation::shader::{KernelEntry, KernelSource, ThreadGroupConfig};
use crate::wgpu_utils::{
    compute_entry, storage_buffer_read_only, storage_buffer_read_write, uniform, ArrayBuffer,
    UniformBuffer,
};

pub struct WgpuBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    layout: wgpu::BindGroupLayout,
    adapter_name: String,
}

impl WgpuBackend {
    /// Request a high-performance adapter and a device using its full limits
    pub async fn new() -> SimResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SimulationError::NoAdapter(e.to_string()))?;

        let adapter_name = adapter.get_info().name;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gravity Compute Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| SimulationError::Device(e.to_string()))?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Gravity Bind Group Layout"),
            entries: &[
                compute_entry(0, storage_buffer_read_only()),
                compute_entry(1, storage_buffer_read_write()),
                compute_entry(2, uniform()),
            ],
        });

        log::info!("Compute device ready on {}", adapter_name);
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            layout,
            adapter_name,
        })
    }

    pub fn new_blocking() -> SimResult<Self> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn create_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        entry: KernelEntry,
    ) -> ComputePipeline {
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Gravity Pipeline Layout"),
                bind_group_layouts: &[&self.layout],
                push_constant_ranges: &[],
            });

        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry.name()),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(entry.name()),
                compilation_options: Default::default(),
                cache: None,
            })
    }
}

/// Both entry-point pipelines of one generated kernel
pub struct WgpuKernel {
    config: ThreadGroupConfig,
    one_dimensional: ComputePipeline,
    two_dimensional: ComputePipeline,
}

impl WgpuKernel {
    pub fn config(&self) -> ThreadGroupConfig {
        self.config
    }

    fn pipeline(&self, entry: KernelEntry) -> &ComputePipeline {
        match entry {
            KernelEntry::OneDimensional => &self.one_dimensional,
            KernelEntry::TwoDimensional => &self.two_dimensional,
        }
    }
}

pub struct WgpuBuffers {
    bodies: ArrayBuffer<GpuBody>,
    results: ArrayBuffer<GpuForce>,
    staging: ArrayBuffer<GpuForce>,
    params: UniformBuffer<KernelParams>,
    bind_group: wgpu::BindGroup,
}

impl DeviceBuffers for WgpuBuffers {
    fn body_count(&self) -> usize {
        self.bodies.capacity()
    }

    fn result_len(&self) -> usize {
        self.results.capacity()
    }
}

impl ComputeBackend for WgpuBackend {
    type Kernel = WgpuKernel;
    type Buffers = WgpuBuffers;

    fn name(&self) -> &str {
        "wgpu"
    }

    fn limits(&self) -> DispatchLimits {
        let limits = self.device.limits();
        DispatchLimits {
            max_threads_per_group: limits.max_compute_invocations_per_workgroup,
            max_group_size_x: limits.max_compute_workgroup_size_x,
            max_group_size_y: limits.max_compute_workgroup_size_y,
            max_result_bytes: u64::from(limits.max_storage_buffer_binding_size),
        }
    }

    fn compile(&self, source: &KernelSource) -> SimResult<WgpuKernel> {
        // shapes the device cannot run would otherwise fail pipeline validation
        self.limits().check(source.config, 0)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.name()),
                source: wgpu::ShaderSource::Wgsl(source.text.as_str().into()),
            });
        let one_dimensional = self.create_pipeline(&module, KernelEntry::OneDimensional);
        let two_dimensional = self.create_pipeline(&module, KernelEntry::TwoDimensional);

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SimulationError::Kernel(format!("{}: {}", source.name(), error)));
        }

        log::info!("Compiled {} on {}", source.name(), self.adapter_name);
        Ok(WgpuKernel {
            config: source.config,
            one_dimensional,
            two_dimensional,
        })
    }

    fn allocate(&self, body_count: usize, result_len: usize) -> SimResult<WgpuBuffers> {
        let bodies = ArrayBuffer::<GpuBody>::new(&self.device, body_count, true);
        let results = ArrayBuffer::<GpuForce>::new(&self.device, result_len, false);
        let staging = ArrayBuffer::<GpuForce>::new_staging(&self.device, result_len);
        let params = UniformBuffer::<KernelParams>::new(&self.device);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Gravity Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bodies.binding_resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: results.binding_resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.binding_resource(),
                },
            ],
        });

        log::debug!(
            "Allocated device buffers for {} bodies / {} result slots",
            body_count,
            result_len
        );
        Ok(WgpuBuffers {
            bodies,
            results,
            staging,
            params,
            bind_group,
        })
    }

    fn dispatch(
        &self,
        kernel: &WgpuKernel,
        entry: KernelEntry,
        buffers: &mut WgpuBuffers,
        bodies: &[GpuBody],
    ) -> SimResult<Vec<GpuForce>> {
        buffers.bodies.write(&self.queue, bodies)?;
        buffers.params.update_content(
            &self.queue,
            KernelParams {
                body_count: bodies.len() as u32,
                _padding: [0; 3],
            },
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Gravity Step Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Gravity Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(kernel.pipeline(entry));
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        buffers.results.copy_to(&mut encoder, &buffers.staging);
        self.queue.submit(std::iter::once(encoder.finish()));

        buffers.staging.read_mapped(&self.device)
    }
}
