//! The GPU Dijkstra backend: `f32` distance matrices computed by a relaxation
//! kernel with one unit of work per source vertex, and a second kernel that
//! reconstructs paths in bounded batches. Kernels are WGSL, compiled from
//! source at runtime with the configured workgroup size spliced in.
//!
//! The backend is compiled behind the `gpu` cargo feature; without it the
//! kind still parses and selects, but computing reports the missing support.

use crate::config::RouteOpts;
use crate::routing::{RouteBackend, RouteError, RouteOutcome};
use crate::topology::Topology;

#[derive(Debug, Default)]
pub struct DijkstraGpuBackend;

impl RouteBackend for DijkstraGpuBackend {
    fn name(&self) -> &'static str {
        "dijkstra-gpu"
    }

    #[cfg(feature = "gpu")]
    fn compute(&self, topo: &Topology, opts: &RouteOpts) -> Result<RouteOutcome, RouteError> {
        imp::compute(topo, opts)
    }

    #[cfg(not(feature = "gpu"))]
    fn compute(&self, _topo: &Topology, _opts: &RouteOpts) -> Result<RouteOutcome, RouteError> {
        Err(RouteError::GpuUnavailable)
    }
}

#[cfg(feature = "gpu")]
mod imp {
    use tracing::warn;
    use wgpu::util::DeviceExt;

    use crate::compile::compile_path;
    use crate::config::{GpuOpts, RouteOpts};
    use crate::routing::dense::{DenseGraph, VertexId};
    use crate::routing::{host_pairs, RouteError, RouteOutcome};
    use crate::topology::{NodeId, Topology};

    /// Infinity sentinel shared with the kernels.
    const INFNTY: f32 = 1e9;

    pub(super) fn compute(topo: &Topology, opts: &RouteOpts) -> Result<RouteOutcome, RouteError> {
        let dense = DenseGraph::new(topo);
        let v = dense.nr_vertices();
        let pairs = host_pairs(topo);
        let mut outcome = RouteOutcome::default();
        outcome.stats.pairs = pairs.len();
        if v == 0 || pairs.is_empty() {
            return Ok(outcome);
        }
        let gpu = GpuOpts {
            max_path_length: opts.gpu.max_path_length.max(2),
            ..opts.gpu
        };

        let graph = dense.to_f32_with_sentinel(INFNTY);
        let ctx = GpuContext::acquire()?;
        let dist = ctx.all_pairs(&graph, v, &gpu)?;

        let mut indexed = Vec::with_capacity(pairs.len());
        for (src, dst) in &pairs {
            if topo.host_ip(src) == topo.host_ip(dst) {
                continue;
            }
            let found = dense
                .index_of(&NodeId::host(src.clone()))
                .zip(dense.index_of(&NodeId::host(dst.clone())));
            if let Some((s, t)) = found {
                indexed.push(((src, dst), s.inner() as u32, t.inner() as u32));
            }
        }

        let max_len = gpu.max_path_length as usize;
        for batch in indexed.chunks(gpu.batch_size.max(1)) {
            let flat = batch
                .iter()
                .flat_map(|&(_, s, t)| [s, t])
                .collect::<Vec<u32>>();
            let (hops, lens) = ctx.reconstruct(&graph, &dist, &flat, v, &gpu)?;
            for (i, ((src, dst), s, t)) in batch.iter().enumerate() {
                if lens[i] < 0 {
                    outcome.stats.no_path += 1;
                    warn!(src = %src, dst = %dst, "no path between hosts");
                    continue;
                }
                let n = lens[i] as usize;
                let ids = hops[i * max_len..i * max_len + n]
                    .iter()
                    .rev()
                    .map(|&ix| dense.node(VertexId::new(ix as usize)).clone())
                    .collect::<Vec<_>>();
                outcome.stats.routed += 1;
                outcome.stats.cost_sum += f64::from(dist[*s as usize * v + *t as usize]);
                let compiled = compile_path(topo, &ids, opts.priority, &mut outcome.rules);
                outcome.stats.port_missing += compiled.port_missing;
            }
        }
        Ok(outcome)
    }

    struct GpuContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
    }

    impl GpuContext {
        fn acquire() -> Result<Self, RouteError> {
            let instance = wgpu::Instance::default();
            let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            }))
            .ok_or(RouteError::NoAdapter)?;
            let (device, queue) = pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("routeforge"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            ))
            .map_err(|err| RouteError::Device(err.to_string()))?;
            Ok(Self { device, queue })
        }

        fn pipeline(&self, source: &str, entry: &'static str, block_size: u32) -> wgpu::ComputePipeline {
            let source = source.replace("WORKGROUP_SIZE", &block_size.max(1).to_string());
            let module = self
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(entry),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: None,
                    module: &module,
                    entry_point: entry,
                })
        }

        fn dispatch_width(items: usize, gpu: &GpuOpts) -> u32 {
            let groups = (items as u32).div_ceil(gpu.block_size.max(1));
            (groups * gpu.grid_multiplier.max(1)).max(1)
        }

        fn all_pairs(&self, graph: &[f32], v: usize, gpu: &GpuOpts) -> Result<Vec<f32>, RouteError> {
            let pipeline = self.pipeline(
                include_str!("shaders/dijkstra.wgsl"),
                "dijkstra",
                gpu.block_size,
            );
            let matrix_bytes = (v * v * std::mem::size_of::<f32>()) as wgpu::BufferAddress;
            let params = self.uniform(&[v as u32, 0, 0, 0]);
            let graph_buf = self.storage_init(bytemuck::cast_slice(graph));
            let dist_buf = self.storage(matrix_bytes, wgpu::BufferUsages::COPY_SRC);
            let visited_buf = self.storage(matrix_bytes, wgpu::BufferUsages::empty());

            let bind = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("dijkstra"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[
                    bind_entry(0, &params),
                    bind_entry(1, &graph_buf),
                    bind_entry(2, &dist_buf),
                    bind_entry(3, &visited_buf),
                ],
            });

            let staging = self.staging(matrix_bytes);
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("dijkstra") });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("dijkstra"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind, &[]);
                pass.dispatch_workgroups(Self::dispatch_width(v, gpu), 1, 1);
            }
            encoder.copy_buffer_to_buffer(&dist_buf, 0, &staging, 0, matrix_bytes);
            self.queue.submit(Some(encoder.finish()));
            self.read_back::<f32>(&staging)
        }

        fn reconstruct(
            &self,
            graph: &[f32],
            dist: &[f32],
            pairs: &[u32],
            v: usize,
            gpu: &GpuOpts,
        ) -> Result<(Vec<i32>, Vec<i32>), RouteError> {
            let nr_pairs = pairs.len() / 2;
            let max_len = gpu.max_path_length as usize;
            let pipeline = self.pipeline(
                include_str!("shaders/reconstruct.wgsl"),
                "reconstruct",
                gpu.block_size,
            );
            let hops_bytes = (nr_pairs * max_len * std::mem::size_of::<i32>()) as wgpu::BufferAddress;
            let lens_bytes = (nr_pairs * std::mem::size_of::<i32>()) as wgpu::BufferAddress;

            let params = self.uniform(&[v as u32, nr_pairs as u32, gpu.max_path_length, 0]);
            let graph_buf = self.storage_init(bytemuck::cast_slice(graph));
            let dist_buf = self.storage_init(bytemuck::cast_slice(dist));
            let pairs_buf = self.storage_init(bytemuck::cast_slice(pairs));
            let hops_buf = self.storage(hops_bytes, wgpu::BufferUsages::COPY_SRC);
            let lens_buf = self.storage(lens_bytes, wgpu::BufferUsages::COPY_SRC);

            let bind = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("reconstruct"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[
                    bind_entry(0, &params),
                    bind_entry(1, &graph_buf),
                    bind_entry(2, &dist_buf),
                    bind_entry(3, &pairs_buf),
                    bind_entry(4, &hops_buf),
                    bind_entry(5, &lens_buf),
                ],
            });

            let hops_staging = self.staging(hops_bytes);
            let lens_staging = self.staging(lens_bytes);
            let mut encoder = self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor { label: Some("reconstruct") },
            );
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("reconstruct"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind, &[]);
                pass.dispatch_workgroups(Self::dispatch_width(nr_pairs, gpu), 1, 1);
            }
            encoder.copy_buffer_to_buffer(&hops_buf, 0, &hops_staging, 0, hops_bytes);
            encoder.copy_buffer_to_buffer(&lens_buf, 0, &lens_staging, 0, lens_bytes);
            self.queue.submit(Some(encoder.finish()));

            let hops = self.read_back::<i32>(&hops_staging)?;
            let lens = self.read_back::<i32>(&lens_staging)?;
            Ok((hops, lens))
        }

        fn uniform(&self, words: &[u32; 4]) -> wgpu::Buffer {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("params"),
                    contents: bytemuck::cast_slice(words),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        }

        fn storage_init(&self, contents: &[u8]) -> wgpu::Buffer {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("storage"),
                    contents,
                    usage: wgpu::BufferUsages::STORAGE,
                })
        }

        fn storage(&self, size: wgpu::BufferAddress, extra: wgpu::BufferUsages) -> wgpu::Buffer {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("storage"),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        }

        fn staging(&self, size: wgpu::BufferAddress) -> wgpu::Buffer {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        }

        fn read_back<T: bytemuck::Pod>(&self, staging: &wgpu::Buffer) -> Result<Vec<T>, RouteError> {
            let slice = staging.slice(..);
            let (s, r) = crossbeam_channel::bounded(1);
            slice.map_async(wgpu::MapMode::Read, move |res| {
                let _ = s.send(res);
            });
            let _ = self.device.poll(wgpu::Maintain::Wait);
            r.recv()
                .map_err(|err| RouteError::Device(err.to_string()))?
                .map_err(|err| RouteError::Device(err.to_string()))?;
            let data = slice.get_mapped_range();
            let out = bytemuck::cast_slice::<u8, T>(&data).to_vec();
            drop(data);
            staging.unmap();
            Ok(out)
        }
    }

    fn bind_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        }
    }
}
