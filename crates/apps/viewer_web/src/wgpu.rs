#[cfg(target_arch = "wasm32")]
mod imp {
    use ::wgpu::util::DeviceExt;
    use foundation::HandleSlots;
    use gallery::{
        Camera, LocalBoxFuture, Material, PlatformError, RenderContext, Scene, SphereGeometry,
        TextureHandle,
    };
    use image::RgbaImage;
    use image::imageops::{self, FilterType};
    use std::borrow::Cow;
    use tracing::debug;

    const PANORAMA_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var pano_tex: texture_2d<f32>;
@group(1) @binding(1)
var pano_sampler: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    return VsOut(globals.view_proj * vec4<f32>(position, 1.0), uv);
}

@fragment
fn fs_main(fs_in: VsOut) -> @location(0) vec4<f32> {
    // Flat materials sample the 1x1 white texture.
    return textureSample(pano_tex, pano_sampler, fs_in.uv) * globals.tint;
}
"#;

    const CAPTURE_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Rgba8UnormSrgb;

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Vertex {
        position: [f32; 3],
        uv: [f32; 2],
    }

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Globals {
        view_proj: [[f32; 4]; 4],
        tint: [f32; 4],
    }

    struct GpuTexture {
        _texture: ::wgpu::Texture,
        bind_group: ::wgpu::BindGroup,
    }

    struct MeshBuffers {
        geometry: SphereGeometry,
        vertex_buffer: ::wgpu::Buffer,
        index_buffer: ::wgpu::Buffer,
        index_count: u32,
    }

    thread_local! {
        // A `Surface` must not outlive its `Instance`; one leaked instance
        // serves every canvas.
        static INSTANCE: &'static ::wgpu::Instance = Box::leak(Box::new(
            ::wgpu::Instance::new(&::wgpu::InstanceDescriptor {
                backends: ::wgpu::Backends::BROWSER_WEBGPU | ::wgpu::Backends::GL,
                ..Default::default()
            }),
        ));
    }

    /// GPU state of one panorama canvas.
    pub struct WgpuContext {
        surface: ::wgpu::Surface<'static>,
        device: ::wgpu::Device,
        queue: ::wgpu::Queue,
        config: ::wgpu::SurfaceConfiguration,
        _canvas: web_sys::HtmlCanvasElement,
        surface_pipeline: ::wgpu::RenderPipeline,
        capture_pipeline: ::wgpu::RenderPipeline,
        globals_buffer: ::wgpu::Buffer,
        globals_bind_group: ::wgpu::BindGroup,
        texture_layout: ::wgpu::BindGroupLayout,
        sampler: ::wgpu::Sampler,
        blank: GpuTexture,
        textures: HandleSlots<GpuTexture>,
        mesh: Option<MeshBuffers>,
        disposed: bool,
    }

    fn create_pipeline(
        device: &::wgpu::Device,
        layout: &::wgpu::PipelineLayout,
        shader: &::wgpu::ShaderModule,
        format: ::wgpu::TextureFormat,
        label: &str,
    ) -> ::wgpu::RenderPipeline {
        device.create_render_pipeline(&::wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: ::wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[::wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as ::wgpu::BufferAddress,
                    step_mode: ::wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        ::wgpu::VertexAttribute {
                            format: ::wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        ::wgpu::VertexAttribute {
                            format: ::wgpu::VertexFormat::Float32x2,
                            offset: 12,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            fragment: Some(::wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(::wgpu::ColorTargetState {
                    format,
                    blend: Some(::wgpu::BlendState::REPLACE),
                    write_mask: ::wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: ::wgpu::PrimitiveState {
                topology: ::wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: ::wgpu::FrontFace::Ccw,
                // Viewed from inside; winding flips with the mirrored geometry.
                cull_mode: None,
                polygon_mode: ::wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            // One sphere, nothing to depth-sort.
            depth_stencil: None,
            multisample: ::wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    fn texture_bind_group(
        device: &::wgpu::Device,
        layout: &::wgpu::BindGroupLayout,
        sampler: &::wgpu::Sampler,
        view: &::wgpu::TextureView,
    ) -> ::wgpu::BindGroup {
        device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some("panorama-texture-bg"),
            layout,
            entries: &[
                ::wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ::wgpu::BindingResource::TextureView(view),
                },
                ::wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ::wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn upload(
        device: &::wgpu::Device,
        queue: &::wgpu::Queue,
        layout: &::wgpu::BindGroupLayout,
        sampler: &::wgpu::Sampler,
        image: &RgbaImage,
    ) -> GpuTexture {
        let (w, h) = image.dimensions();
        let size = ::wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&::wgpu::TextureDescriptor {
            label: Some("panorama-texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            format: ::wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: ::wgpu::TextureUsages::TEXTURE_BINDING | ::wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            ::wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: ::wgpu::Origin3d::ZERO,
                aspect: ::wgpu::TextureAspect::All,
            },
            image.as_raw(),
            ::wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * w),
                rows_per_image: Some(h),
            },
            size,
        );
        let view = texture.create_view(&::wgpu::TextureViewDescriptor::default());
        let bind_group = texture_bind_group(device, layout, sampler, &view);
        GpuTexture {
            _texture: texture,
            bind_group,
        }
    }

    /// Rows of a texture-to-buffer copy must be 256-byte aligned.
    fn padded_bytes_per_row(width: u32) -> u32 {
        let unpadded = width * 4;
        let align = ::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        unpadded.div_ceil(align) * align
    }

    /// Configures a surface on `canvas` and builds the panorama pipelines.
    pub async fn create_context(
        canvas: web_sys::HtmlCanvasElement,
        width: u32,
        height: u32,
    ) -> Result<WgpuContext, PlatformError> {
        let instance = INSTANCE.with(|i| *i);

        let surface = instance
            .create_surface(::wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(|e| PlatformError::new(format!("surface error: {e}")))?;

        let adapter = instance
            .request_adapter(&::wgpu::RequestAdapterOptions {
                power_preference: ::wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PlatformError::new(format!("adapter error: {e}")))?;

        let (device, queue) = adapter
            .request_device(&::wgpu::DeviceDescriptor {
                label: Some("panorama-device"),
                required_features: ::wgpu::Features::empty(),
                required_limits: ::wgpu::Limits::downlevel_webgl2_defaults(),
                ..Default::default()
            })
            .await
            .map_err(|e| PlatformError::new(format!("device error: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| PlatformError::new("surface reports no formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(::wgpu::CompositeAlphaMode::Auto);

        let config = ::wgpu::SurfaceConfiguration {
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            desired_maximum_frame_latency: 2,
            present_mode: ::wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(::wgpu::ShaderModuleDescriptor {
            label: Some("panorama-shader"),
            source: ::wgpu::ShaderSource::Wgsl(Cow::Borrowed(PANORAMA_SHADER)),
        });

        // WebGL2 has no storage buffers; globals go through a uniform.
        let globals_buffer = device.create_buffer(&::wgpu::BufferDescriptor {
            label: Some("panorama-globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: ::wgpu::BufferUsages::UNIFORM | ::wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("panorama-globals-bgl"),
            entries: &[::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: ::wgpu::BindingType::Buffer {
                    ty: ::wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let globals_bind_group = device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some("panorama-globals-bg"),
            layout: &globals_layout,
            entries: &[::wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("panorama-texture-bgl"),
            entries: &[
                ::wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ::wgpu::ShaderStages::FRAGMENT,
                    ty: ::wgpu::BindingType::Texture {
                        sample_type: ::wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: ::wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                ::wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ::wgpu::ShaderStages::FRAGMENT,
                    ty: ::wgpu::BindingType::Sampler(::wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&::wgpu::SamplerDescriptor {
            label: Some("panorama-sampler"),
            address_mode_u: ::wgpu::AddressMode::Repeat,
            address_mode_v: ::wgpu::AddressMode::ClampToEdge,
            address_mode_w: ::wgpu::AddressMode::ClampToEdge,
            mag_filter: ::wgpu::FilterMode::Linear,
            min_filter: ::wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
            label: Some("panorama-pipeline-layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            immediate_size: 0,
        });

        let surface_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            config.format,
            "panorama-surface-pipeline",
        );
        let capture_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            CAPTURE_FORMAT,
            "panorama-capture-pipeline",
        );

        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let blank = upload(&device, &queue, &texture_layout, &sampler, &white);

        debug!(width, height, ?format, "panorama context ready");

        Ok(WgpuContext {
            surface,
            device,
            queue,
            config,
            _canvas: canvas,
            surface_pipeline,
            capture_pipeline,
            globals_buffer,
            globals_bind_group,
            texture_layout,
            sampler,
            blank,
            textures: HandleSlots::new(),
            mesh: None,
            disposed: false,
        })
    }

    impl WgpuContext {
        fn ensure_mesh(&mut self, geometry: SphereGeometry) {
            if self.mesh.as_ref().is_some_and(|m| m.geometry == geometry) {
                return;
            }
            let built = geometry.build();
            let vertices: Vec<Vertex> = built
                .positions
                .iter()
                .zip(&built.uvs)
                .map(|(&position, &uv)| Vertex { position, uv })
                .collect();
            let vertex_buffer = self
                .device
                .create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some("panorama-sphere-vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: ::wgpu::BufferUsages::VERTEX,
                });
            let index_buffer = self
                .device
                .create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some("panorama-sphere-indices"),
                    contents: bytemuck::cast_slice(&built.indices),
                    usage: ::wgpu::BufferUsages::INDEX,
                });
            self.mesh = Some(MeshBuffers {
                geometry,
                vertex_buffer,
                index_buffer,
                index_count: built.indices.len() as u32,
            });
        }

        /// Builds the sphere on first use and writes this frame's globals.
        fn prepare(&mut self, scene: &Scene, camera: &Camera) -> Result<(), PlatformError> {
            if self.disposed {
                return Err(PlatformError::new("render context disposed"));
            }
            let tint = match scene.mesh {
                Some(mesh) => {
                    self.ensure_mesh(mesh.geometry);
                    match mesh.material {
                        Material::Textured(_) => [1.0; 4],
                        Material::Flat { color } => Material::color_rgba(color),
                    }
                }
                None => [0.0; 4],
            };
            let globals = Globals {
                view_proj: camera.view_proj(),
                tint,
            };
            self.queue
                .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
            Ok(())
        }

        fn encode_scene(
            &self,
            encoder: &mut ::wgpu::CommandEncoder,
            view: &::wgpu::TextureView,
            pipeline: &::wgpu::RenderPipeline,
            scene: &Scene,
        ) {
            let mut rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                label: Some("panorama-pass"),
                color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: ::wgpu::Operations {
                        load: ::wgpu::LoadOp::Clear(::wgpu::Color::BLACK),
                        store: ::wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            let (Some(mesh), Some(buffers)) = (scene.mesh, self.mesh.as_ref()) else {
                return;
            };
            let texture = match mesh.material {
                Material::Textured(handle) => self.textures.get(handle).unwrap_or(&self.blank),
                Material::Flat { .. } => &self.blank,
            };
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &self.globals_bind_group, &[]);
            rpass.set_bind_group(1, &texture.bind_group, &[]);
            rpass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
            rpass.set_index_buffer(buffers.index_buffer.slice(..), ::wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..buffers.index_count, 0, 0..1);
        }
    }

    impl RenderContext for WgpuContext {
        fn resize(&mut self, width: u32, height: u32) {
            if self.disposed {
                return;
            }
            self.config.width = width.max(1);
            self.config.height = height.max(1);
            self.surface.configure(&self.device, &self.config);
        }

        fn upload_texture(&mut self, image: &RgbaImage) -> Result<TextureHandle, PlatformError> {
            if self.disposed {
                return Err(PlatformError::new("render context disposed"));
            }
            if image.width() == 0 || image.height() == 0 {
                return Err(PlatformError::new("empty image"));
            }
            let max = self.device.limits().max_texture_dimension_2d;
            let texture = if image.width() > max || image.height() > max {
                let (w, h) = gallery::fit_within(image.width(), image.height(), max, max);
                debug!(from = ?image.dimensions(), to = ?(w, h), "downscaling texture to device limit");
                let resized = imageops::resize(image, w, h, FilterType::Triangle);
                upload(&self.device, &self.queue, &self.texture_layout, &self.sampler, &resized)
            } else {
                upload(&self.device, &self.queue, &self.texture_layout, &self.sampler, image)
            };
            Ok(self.textures.insert(texture))
        }

        fn release_texture(&mut self, texture: TextureHandle) {
            self.textures.remove(texture);
        }

        fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<(), PlatformError> {
            self.prepare(scene, camera)?;
            let frame = self
                .surface
                .get_current_texture()
                .map_err(|e| PlatformError::new(format!("surface acquire failed: {e}")))?;
            let view = frame
                .texture
                .create_view(&::wgpu::TextureViewDescriptor::default());
            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("panorama-frame-encoder"),
                });
            self.encode_scene(&mut encoder, &view, &self.surface_pipeline, scene);
            self.queue.submit(std::iter::once(encoder.finish()));
            frame.present();
            Ok(())
        }

        fn capture_frame(
            &mut self,
            scene: &Scene,
            camera: &Camera,
        ) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>> {
            if let Err(err) = self.prepare(scene, camera) {
                return Box::pin(async move { Err(err) });
            }
            let width = self.config.width;
            let height = self.config.height;
            let size = ::wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            };
            let target = self.device.create_texture(&::wgpu::TextureDescriptor {
                label: Some("panorama-capture-target"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: ::wgpu::TextureDimension::D2,
                format: CAPTURE_FORMAT,
                usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT | ::wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = target.create_view(&::wgpu::TextureViewDescriptor::default());
            let bytes_per_row = padded_bytes_per_row(width);
            let buffer = self.device.create_buffer(&::wgpu::BufferDescriptor {
                label: Some("panorama-capture-readback"),
                size: (bytes_per_row * height) as u64,
                usage: ::wgpu::BufferUsages::MAP_READ | ::wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("panorama-capture-encoder"),
                });
            self.encode_scene(&mut encoder, &view, &self.capture_pipeline, scene);
            encoder.copy_texture_to_buffer(
                ::wgpu::TexelCopyTextureInfo {
                    texture: &target,
                    mip_level: 0,
                    origin: ::wgpu::Origin3d::ZERO,
                    aspect: ::wgpu::TextureAspect::All,
                },
                ::wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: ::wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(bytes_per_row),
                        rows_per_image: Some(height),
                    },
                },
                size,
            );
            self.queue.submit(std::iter::once(encoder.finish()));

            let (tx, rx) = futures::channel::oneshot::channel();
            buffer
                .slice(..)
                .map_async(::wgpu::MapMode::Read, move |result| {
                    let _ = tx.send(result);
                });

            Box::pin(async move {
                match rx.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(PlatformError::new(format!("buffer map failed: {e}"))),
                    Err(_) => return Err(PlatformError::new("buffer map dropped")),
                }
                let row_bytes = (width * 4) as usize;
                let mut pixels = Vec::with_capacity(row_bytes * height as usize);
                {
                    let data = buffer.slice(..).get_mapped_range();
                    for row in 0..height {
                        let start = (row * bytes_per_row) as usize;
                        pixels.extend_from_slice(&data[start..start + row_bytes]);
                    }
                }
                buffer.unmap();
                drop(target);
                RgbaImage::from_raw(width, height, pixels)
                    .ok_or_else(|| PlatformError::new("readback size mismatch"))
            })
        }

        fn dispose(&mut self) {
            if self.disposed {
                return;
            }
            self.disposed = true;
            let released = self.textures.drain().len();
            self.mesh = None;
            debug!(released, "panorama context disposed");
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use gallery::{
        Camera, LocalBoxFuture, PlatformError, RenderContext, Scene, TextureHandle,
    };
    use image::RgbaImage;

    #[derive(Debug, Default)]
    pub struct WgpuContext;

    pub async fn create_context(
        _canvas: web_sys::HtmlCanvasElement,
        _width: u32,
        _height: u32,
    ) -> Result<WgpuContext, PlatformError> {
        Err(PlatformError::new(
            "wgpu initialization is only available on wasm32 targets",
        ))
    }

    impl RenderContext for WgpuContext {
        fn resize(&mut self, _width: u32, _height: u32) {}

        fn upload_texture(&mut self, _image: &RgbaImage) -> Result<TextureHandle, PlatformError> {
            Err(PlatformError::new(
                "wgpu rendering is only available on wasm32 targets",
            ))
        }

        fn release_texture(&mut self, _texture: TextureHandle) {}

        fn render(&mut self, _scene: &Scene, _camera: &Camera) -> Result<(), PlatformError> {
            Err(PlatformError::new(
                "wgpu rendering is only available on wasm32 targets",
            ))
        }

        fn capture_frame(
            &mut self,
            _scene: &Scene,
            _camera: &Camera,
        ) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>> {
            Box::pin(async {
                Err(PlatformError::new(
                    "wgpu readback is only available on wasm32 targets",
                ))
            })
        }

        fn dispose(&mut self) {}
    }
}

pub use imp::{WgpuContext, create_context};
