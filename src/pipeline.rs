// ============================================================================
// pipeline.rs — Luxtree
// GPU pipeline creation (particles & ornaments), per-group GPU buffers, and
// bind-group-layout helpers.
// ============================================================================

use wgpu::util::DeviceExt;

use crate::camera::CameraUniforms;
use crate::distribution::ShapeKind;
use crate::emitter::{OrnamentInstance, ParticleInstance};
use crate::mesh::{mesh_for, Mesh, MeshVertex};
use crate::scene::EntityGroup;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Near-black scene background.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0015,
    g: 0.0015,
    b: 0.0015,
    a: 1.0,
};

// ======================== GPU Structs ========================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub color: [f32; 4],
    /// x: roughness, y: metalness
    pub params: [f32; 4],
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, label: &str, mesh: &Mesh) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// GPU mirror of one entity group, rewritten from the CPU records each tick.
pub struct GpuGroup {
    pub kind: ShapeKind,
    pub instance_buffer: wgpu::Buffer,
    pub instance_count: u32,
    pub mesh: Option<GpuMesh>,
    pub material_bind_group: wgpu::BindGroup,
}

impl GpuGroup {
    pub fn new(device: &wgpu::Device, pipelines: &Pipelines, group: &EntityGroup) -> Self {
        let stride = if group.kind().is_particle() {
            std::mem::size_of::<ParticleInstance>()
        } else {
            std::mem::size_of::<OrnamentInstance>()
        };
        let size = (stride * group.len()).max(stride) as u64;

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}_instances", group.name())),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let c = group.config.color.0;
        let material = MaterialUniforms {
            color: [c[0], c[1], c[2], 1.0],
            params: [group.config.roughness, group.config.metalness, 0.0, 0.0],
        };
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}_material", group.name())),
            contents: bytemuck::bytes_of(&material),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_material_bg", group.name())),
            layout: &pipelines.material_bgl,
            entries: &[bg_buffer(0, &material_buffer)],
        });

        let mesh = mesh_for(group.kind()).map(|m| GpuMesh::new(device, group.name(), &m));

        Self {
            kind: group.kind(),
            instance_buffer,
            instance_count: 0,
            mesh,
            material_bind_group,
        }
    }

    /// Copy this tick's instance records to the GPU.
    pub fn upload(&mut self, queue: &wgpu::Queue, group: &EntityGroup) {
        let bytes = group.instances().as_bytes();
        self.instance_count = group.instances().len() as u32;
        if !bytes.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytes);
        }
    }
}

// ======================== Pipelines ========================

pub struct Pipelines {
    pub particle_pipeline: wgpu::RenderPipeline,
    pub ornament_pipeline: wgpu::RenderPipeline,
    pub material_bgl: wgpu::BindGroupLayout,
    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,
}

const PARTICLE_ATTRS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32];
const MESH_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
const ORNAMENT_ATTRS: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4];

pub fn create_pipelines(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Pipelines {
    let particle_shader = load_shader(device, "particles", include_str!("shaders/particles.wgsl"));
    let ornament_shader = load_shader(device, "ornament", include_str!("shaders/ornament.wgsl"));

    let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("camera_bgl"),
        entries: &[bgl_uniform(0)],
    });
    let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material_bgl"),
        entries: &[bgl_uniform(0)],
    });

    let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("camera_uniforms"),
        contents: bytemuck::bytes_of(&crate::camera::CameraRig::default().uniforms(0.0)),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("camera_bg"),
        layout: &camera_bgl,
        entries: &[bg_buffer(0, &camera_buffer)],
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("scene_pipeline_layout"),
        bind_group_layouts: &[&camera_bgl, &material_bgl],
        push_constant_ranges: &[],
    });

    // ================================================================
    // ORNAMENT PIPELINE: opaque, depth-writing
    // ================================================================
    let ornament_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("ornament_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &ornament_shader,
            entry_point: Some("vs_main"),
            buffers: &[
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<MeshVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &MESH_ATTRS,
                },
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<OrnamentInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &ORNAMENT_ATTRS,
                },
            ],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &ornament_shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(depth_state(true)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    // ================================================================
    // PARTICLE PIPELINE: additive, depth-tested but not written
    // ================================================================
    let additive = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    let particle_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("particle_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &particle_shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<ParticleInstance>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &PARTICLE_ATTRS,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &particle_shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(additive),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(false)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Pipelines {
        particle_pipeline,
        ornament_pipeline,
        material_bgl,
        camera_buffer,
        camera_bind_group,
    }
}

impl Pipelines {
    pub fn update_camera(&self, queue: &wgpu::Queue, uniforms: &CameraUniforms) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(uniforms));
    }
}

// ======================== Scene Pass ========================

pub fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Clear, draw opaque ornaments, then blend foliage on top.
pub fn encode_scene_pass(
    encoder: &mut wgpu::CommandEncoder,
    color_view: &wgpu::TextureView,
    depth_view: &wgpu::TextureView,
    pipelines: &Pipelines,
    groups: &[GpuGroup],
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("scene_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_bind_group(0, &pipelines.camera_bind_group, &[]);

    pass.set_pipeline(&pipelines.ornament_pipeline);
    for group in groups.iter().filter(|g| g.instance_count > 0) {
        let Some(mesh) = &group.mesh else { continue };
        pass.set_bind_group(1, &group.material_bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, group.instance_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..mesh.index_count, 0, 0..group.instance_count);
    }

    pass.set_pipeline(&pipelines.particle_pipeline);
    for group in groups
        .iter()
        .filter(|g| g.instance_count > 0 && g.kind.is_particle())
    {
        pass.set_bind_group(1, &group.material_bind_group, &[]);
        pass.set_vertex_buffer(0, group.instance_buffer.slice(..));
        pass.draw(0..6, 0..group.instance_count);
    }
}

// ======================== Helpers ========================

fn load_shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bg_buffer(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
