//! wgpu backend for [`RenderScene`]: one offscreen surface per gallery item,
//! all sharing a device, pipeline and sampler.

use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};
use wgpu::util::DeviceExt;

use crate::layout::SurfaceSize;
use crate::scene::{DecodedImage, RenderScene, SceneFactory, TextureId};
use crate::shader::{MeshVertex, QuadMesh, SceneUniforms, GALLERY_SHADER};

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const NEUTRAL_PIXEL: [u8; 4] = [128, 128, 128, 255];

pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    mesh: QuadMesh,
}

impl GpuContext {
    pub async fn new(mesh_segments: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gallery-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gallery-scene-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<SceneUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gallery-shader"),
            source: wgpu::ShaderSource::Wgsl(GALLERY_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gallery-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gallery-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: SURFACE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("gallery-image-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            mesh: QuadMesh::subdivided(mesh_segments),
        })
    }

    /// Largest width or height a texture or surface may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn upload_texture(&self, label: &str, width: u32, height: u32, rgba: &[u8]) -> Result<wgpu::Texture> {
        check_extent(label, width, height, self.max_texture_dimension())?;
        let bytes_per_row = NonZeroU32::new(width.saturating_mul(4))
            .ok_or_else(|| anyhow!("texture '{label}' has invalid width {width}"))?;
        let rows_per_image = NonZeroU32::new(height)
            .ok_or_else(|| anyhow!("texture '{label}' has invalid height {height}"))?;
        let expected = bytes_per_row.get() as usize * height as usize;
        if rgba.len() != expected {
            bail!(
                "texture '{label}' expects {expected} bytes of RGBA, got {}",
                rgba.len()
            );
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row.get()),
                rows_per_image: Some(rows_per_image.get()),
            },
            size,
        );
        Ok(texture)
    }
}

pub struct WgpuSceneFactory {
    context: Rc<GpuContext>,
}

impl WgpuSceneFactory {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context: Rc::new(context),
        }
    }
}

impl SceneFactory for WgpuSceneFactory {
    fn create_scene(&mut self, form_key: &str, size: SurfaceSize) -> Result<Box<dyn RenderScene>> {
        let scene = WgpuScene::new(Rc::clone(&self.context), form_key, size)?;
        Ok(Box::new(scene))
    }
}

struct SurfaceTarget {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl SurfaceTarget {
    fn new(device: &wgpu::Device, label: &str, size: SurfaceSize) -> Result<Self> {
        let (width, height) = size.pixels();
        check_extent(label, width, height, device.limits().max_texture_dimension_2d)?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("gallery-surface-{label}")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width
            .checked_mul(4)
            .ok_or_else(|| anyhow!("surface width overflow when computing row bytes"))?;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("gallery-readback-{label}")),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            width,
            height,
            texture,
            view,
            readback_buffer,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        })
    }

    fn destroy(&self) {
        self.texture.destroy();
        self.readback_buffer.destroy();
    }
}

struct BoundTexture {
    id: TextureId,
    texture: wgpu::Texture,
}

pub struct WgpuScene {
    context: Rc<GpuContext>,
    label: String,
    target: SurfaceTarget,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    neutral_texture: wgpu::Texture,
    bound: Option<BoundTexture>,
    bind_group: wgpu::BindGroup,
    last_uniforms: Option<SceneUniforms>,
    next_texture_id: u64,
    has_drawn: bool,
    disposed: bool,
}

impl WgpuScene {
    pub fn new(context: Rc<GpuContext>, form_key: &str, size: SurfaceSize) -> Result<Self> {
        let device = &context.device;
        let label = form_key.to_owned();
        let target = SurfaceTarget::new(device, &label, size)?;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("gallery-mesh-vertices-{label}")),
            contents: bytemuck::cast_slice(&context.mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("gallery-mesh-indices-{label}")),
            contents: bytemuck::cast_slice(&context.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let index_count = u32::try_from(context.mesh.indices.len())
            .context("mesh index count does not fit in u32")?;

        let uniforms = SceneUniforms {
            quad_size: size.as_array(),
            mouse_over_pos: [0.5, 0.5],
            ..SceneUniforms::default()
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("gallery-uniforms-{label}")),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let neutral_texture =
            context.upload_texture(&format!("gallery-neutral-{label}"), 1, 1, &NEUTRAL_PIXEL)?;
        let bind_group = build_bind_group(&context, &label, &uniform_buffer, &neutral_texture);

        Ok(Self {
            context,
            label,
            target,
            vertex_buffer,
            index_buffer,
            index_count,
            uniform_buffer,
            neutral_texture,
            bound: None,
            bind_group,
            last_uniforms: Some(uniforms),
            next_texture_id: 1,
            has_drawn: false,
            disposed: false,
        })
    }

    fn read_surface(&self) -> Result<DecodedImage> {
        let target = &self.target;
        let buffer_slice = target.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.context.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = target.unpadded_bytes_per_row as usize;
        let mut pixels = vec![0_u8; row_bytes * target.height as usize];
        for (row_index, chunk) in mapped
            .chunks(target.padded_bytes_per_row as usize)
            .take(target.height as usize)
            .enumerate()
        {
            let dst_start = row_index * row_bytes;
            pixels[dst_start..dst_start + row_bytes].copy_from_slice(&chunk[..row_bytes]);
        }

        drop(mapped);
        target.readback_buffer.unmap();
        Ok(DecodedImage {
            width: target.width,
            height: target.height,
            pixels,
        })
    }
}

impl RenderScene for WgpuScene {
    fn update(&mut self, uniforms: &SceneUniforms) {
        if self.disposed || self.last_uniforms.as_ref() == Some(uniforms) {
            return;
        }
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        self.last_uniforms = Some(*uniforms);
    }

    fn draw(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let context = &self.context;
        let target = &self.target;
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gallery-scene-encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gallery-scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&context.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.index_count, 0, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &target.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );

        context.queue.submit(Some(encoder.finish()));
        self.has_drawn = true;
        Ok(())
    }

    fn check_texture(&self, image: &DecodedImage) -> Result<()> {
        image.check_layout()?;
        check_extent(
            &self.label,
            image.width,
            image.height,
            self.context.max_texture_dimension(),
        )
    }

    fn bind_texture(&mut self, image: &DecodedImage) -> Result<TextureId> {
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        let texture = self.context.upload_texture(
            &format!("gallery-image-{}-{}", self.label, id.0),
            image.width,
            image.height,
            &image.flipped_rows(),
        )?;

        if let Some(previous) = self.bound.take() {
            log::warn!(
                "scene '{}' bound texture {} over undisposed texture {}",
                self.label,
                id.0,
                previous.id.0
            );
            previous.texture.destroy();
        }

        self.bind_group = build_bind_group(&self.context, &self.label, &self.uniform_buffer, &texture);
        self.bound = Some(BoundTexture { id, texture });
        Ok(id)
    }

    fn dispose_texture(&mut self, texture: TextureId) {
        if self.bound.as_ref().map(|bound| bound.id) != Some(texture) {
            return;
        }
        if let Some(bound) = self.bound.take() {
            bound.texture.destroy();
        }
        self.bind_group = build_bind_group(
            &self.context,
            &self.label,
            &self.uniform_buffer,
            &self.neutral_texture,
        );
    }

    fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        if size.pixels() == (self.target.width, self.target.height) {
            return Ok(());
        }
        let target = SurfaceTarget::new(&self.context.device, &self.label, size)?;
        self.target.destroy();
        self.target = target;
        self.has_drawn = false;
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(bound) = self.bound.take() {
            bound.texture.destroy();
        }
        self.neutral_texture.destroy();
        self.target.destroy();
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.uniform_buffer.destroy();
        self.disposed = true;
    }

    fn capture(&mut self) -> Result<Option<DecodedImage>> {
        if self.disposed || !self.has_drawn {
            return Ok(None);
        }
        self.read_surface().map(Some)
    }
}

/// Oversized textures are a wgpu validation error; reject them before creation.
fn check_extent(label: &str, width: u32, height: u32, max_dimension: u32) -> Result<()> {
    if width > max_dimension || height > max_dimension {
        bail!(
            "texture '{label}' is {width}x{height}, larger than the device limit of {max_dimension}"
        );
    }
    Ok(())
}

fn build_bind_group(
    context: &GpuContext,
    label: &str,
    uniform_buffer: &wgpu::Buffer,
    texture: &wgpu::Texture,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    context.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("gallery-bind-group-{label}")),
        layout: &context.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&context.sampler),
            },
        ],
    })
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
