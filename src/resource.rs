use std::fmt;

use wgpu::{
    BufferUsages, Extent3d, TextureDimension, TextureFormat, TextureUsages, TextureViewDimension,
};

use crate::device::RenderDevice;
use crate::error::{RenderGraphError, Result};
use crate::handle::PassHandle;
use crate::pool::TransientPool;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub usage: TextureUsages,
    pub sample_count: u32,
    pub mip_level_count: u32,
    pub dimension: TextureDimension,
    pub depth_or_array_layers: u32,
    /// Array layers are cube faces, six per cube.
    pub cube: bool,
}

impl TextureDescriptor {
    pub fn new_2d(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            sample_count: 1,
            mip_level_count: 1,
            dimension: TextureDimension::D2,
            depth_or_array_layers: 1,
            cube: false,
        }
    }

    pub fn usage(mut self, usage: TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    pub fn sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    pub fn mip_levels(mut self, levels: u32) -> Self {
        self.mip_level_count = levels;
        self
    }

    pub fn cube_map(mut self) -> Self {
        self.dimension = TextureDimension::D2;
        self.depth_or_array_layers = 6;
        self.cube = true;
        self
    }

    /// `count` cubes in one texture.
    pub fn cube_map_array(mut self, count: u32) -> Self {
        self.dimension = TextureDimension::D2;
        self.depth_or_array_layers = count * 6;
        self.cube = true;
        self
    }

    pub fn array_layers(mut self, layers: u32) -> Self {
        self.depth_or_array_layers = layers;
        self.cube = false;
        self
    }

    pub fn dimension_3d(mut self, depth: u32) -> Self {
        self.dimension = TextureDimension::D3;
        self.depth_or_array_layers = depth;
        self.cube = false;
        self
    }

    /// Dimension of the view that covers the whole texture.
    pub fn view_dimension(&self) -> TextureViewDimension {
        match self.dimension {
            TextureDimension::D1 => TextureViewDimension::D1,
            TextureDimension::D3 => TextureViewDimension::D3,
            TextureDimension::D2 if self.cube && self.depth_or_array_layers > 6 => {
                TextureViewDimension::CubeArray
            }
            TextureDimension::D2 if self.cube => TextureViewDimension::Cube,
            TextureDimension::D2 if self.depth_or_array_layers > 1 => {
                TextureViewDimension::D2Array
            }
            TextureDimension::D2 => TextureViewDimension::D2,
        }
    }

    pub fn extent(&self) -> Extent3d {
        Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }

    pub fn to_wgpu_descriptor<'a>(&self, label: Option<&'a str>) -> wgpu::TextureDescriptor<'a> {
        wgpu::TextureDescriptor {
            label,
            size: self.extent(),
            mip_level_count: self.mip_level_count,
            sample_count: self.sample_count,
            dimension: self.dimension,
            format: self.format,
            usage: self.usage,
            view_formats: &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: BufferUsages,
    pub mapped_at_creation: bool,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsages) -> Self {
        Self {
            size,
            usage,
            mapped_at_creation: false,
        }
    }

    pub fn mapped_at_creation(mut self, mapped: bool) -> Self {
        self.mapped_at_creation = mapped;
        self
    }

    pub fn to_wgpu_descriptor<'a>(&self, label: Option<&'a str>) -> wgpu::BufferDescriptor<'a> {
        wgpu::BufferDescriptor {
            label,
            size: self.size,
            usage: self.usage,
            mapped_at_creation: self.mapped_at_creation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Texture => f.write_str("texture"),
            ResourceKind::Buffer => f.write_str("buffer"),
        }
    }
}

/// How a pass touches a resource. Recorded for barrier and transition purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceUsage {
    #[default]
    Undefined,
    ShaderRead,
    UnorderedAccess,
    RenderTarget,
    DepthStencil,
    CopySrc,
    CopyDst,
    Present,
}

/// GPU object backing a resource record once it is allocated or imported.
pub enum GpuResource<D: RenderDevice> {
    Texture {
        texture: D::Texture,
        view: D::TextureView,
        /// Descriptor the texture was created with; `None` when imported.
        origin: Option<TextureDescriptor>,
    },
    Buffer {
        buffer: D::Buffer,
        origin: Option<BufferDescriptor>,
    },
}

/// The graph's bookkeeping for one resource within a frame.
pub struct ResourceRecord<D: RenderDevice> {
    name: String,
    kind: ResourceKind,
    descriptor: Option<ResourceDescriptor>,
    imported: bool,
    gpu: Option<GpuResource<D>>,
    pub(crate) current_usage: ResourceUsage,
    generation: u32,
    pub(crate) ref_count: u32,
    pub(crate) first_writer: Option<PassHandle>,
    pub(crate) last_reader: Option<PassHandle>,
    pub(crate) first_use: Option<u32>,
    pub(crate) last_use: Option<u32>,
}

impl<D: RenderDevice> ResourceRecord<D> {
    pub(crate) fn transient(name: String, descriptor: ResourceDescriptor, generation: u32) -> Self {
        let kind = match &descriptor {
            ResourceDescriptor::Texture(_) => ResourceKind::Texture,
            ResourceDescriptor::Buffer(_) => ResourceKind::Buffer,
        };
        Self::with_parts(name, kind, Some(descriptor), false, None, generation)
    }

    pub(crate) fn imported(name: String, gpu: GpuResource<D>, generation: u32) -> Self {
        let kind = match &gpu {
            GpuResource::Texture { .. } => ResourceKind::Texture,
            GpuResource::Buffer { .. } => ResourceKind::Buffer,
        };
        Self::with_parts(name, kind, None, true, Some(gpu), generation)
    }

    fn with_parts(
        name: String,
        kind: ResourceKind,
        descriptor: Option<ResourceDescriptor>,
        imported: bool,
        gpu: Option<GpuResource<D>>,
        generation: u32,
    ) -> Self {
        Self {
            name,
            kind,
            descriptor,
            imported,
            gpu,
            current_usage: ResourceUsage::Undefined,
            generation,
            ref_count: 0,
            first_writer: None,
            last_reader: None,
            first_use: None,
            last_use: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Declared descriptor. Imported resources carry none.
    pub fn descriptor(&self) -> Option<&ResourceDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_imported(&self) -> bool {
        self.imported
    }

    pub fn is_transient(&self) -> bool {
        !self.imported
    }

    pub fn is_allocated(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu(&self) -> Option<&GpuResource<D>> {
        self.gpu.as_ref()
    }

    pub fn current_usage(&self) -> ResourceUsage {
        self.current_usage
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of live passes touching this resource after the last compile.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn first_writer(&self) -> Option<PassHandle> {
        self.first_writer
    }

    pub fn last_reader(&self) -> Option<PassHandle> {
        self.last_reader
    }

    pub(crate) fn reset_lifetime(&mut self) {
        self.ref_count = 0;
        self.first_writer = None;
        self.last_reader = None;
        self.first_use = None;
        self.last_use = None;
    }

    /// Realise the transient GPU object, reusing a pooled one when compatible.
    ///
    /// No-op for imported or already allocated records. On failure the record
    /// stays unallocated.
    pub fn allocate(&mut self, device: &D, pool: &mut TransientPool<D>) -> Result<()> {
        if self.imported || self.gpu.is_some() {
            return Ok(());
        }
        let Some(descriptor) = &self.descriptor else {
            return Ok(());
        };

        let gpu = match descriptor {
            ResourceDescriptor::Texture(requested) => {
                let (origin, texture) = match pool.take_texture(requested) {
                    Some(pooled) => {
                        log::debug!("Reusing pooled texture for '{}'", self.name);
                        pooled
                    }
                    None => {
                        let texture = device.create_texture(&self.name, requested).map_err(
                            |source| RenderGraphError::AllocationFailed {
                                resource: self.name.clone(),
                                source,
                            },
                        )?;
                        (requested.clone(), texture)
                    }
                };
                let view = device.create_texture_view(&texture, requested).map_err(|source| {
                    RenderGraphError::AllocationFailed {
                        resource: self.name.clone(),
                        source,
                    }
                })?;
                GpuResource::Texture {
                    texture,
                    view,
                    origin: Some(origin),
                }
            }
            ResourceDescriptor::Buffer(requested) => {
                let (origin, buffer) = match pool.take_buffer(requested) {
                    Some(pooled) => {
                        log::debug!("Reusing pooled buffer for '{}'", self.name);
                        pooled
                    }
                    None => {
                        let buffer = device.create_buffer(&self.name, requested).map_err(
                            |source| RenderGraphError::AllocationFailed {
                                resource: self.name.clone(),
                                source,
                            },
                        )?;
                        (requested.clone(), buffer)
                    }
                };
                GpuResource::Buffer {
                    buffer,
                    origin: Some(origin),
                }
            }
        };

        log::debug!("Allocated transient {} '{}'", self.kind, self.name);
        self.gpu = Some(gpu);
        Ok(())
    }

    /// Give the transient GPU object back to the pool. Safe to call repeatedly.
    pub fn release_transient(&mut self, pool: &mut TransientPool<D>) {
        if self.imported {
            return;
        }
        let Some(gpu) = self.gpu.take() else {
            return;
        };

        match gpu {
            GpuResource::Texture {
                texture,
                view,
                origin,
            } => {
                drop(view);
                if let Some(origin) = origin {
                    pool.recycle_texture(origin, texture);
                }
            }
            GpuResource::Buffer { buffer, origin } => {
                if let Some(origin) = origin {
                    pool.recycle_buffer(origin, buffer);
                }
            }
        }
        log::debug!("Released transient {} '{}'", self.kind, self.name);
    }
}
