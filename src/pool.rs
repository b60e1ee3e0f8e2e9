use crate::device::RenderDevice;
use crate::resource::{BufferDescriptor, TextureDescriptor};

/// Released transient GPU objects waiting to back a later, compatible resource.
///
/// Objects live here between a resource's release and the next allocation
/// that fits them, possibly in a later frame. A failed frame flushes the pool.
pub struct TransientPool<D: RenderDevice> {
    enabled: bool,
    textures: Vec<(TextureDescriptor, D::Texture)>,
    buffers: Vec<(BufferDescriptor, D::Buffer)>,
}

impl<D: RenderDevice> TransientPool<D> {
    /// A disabled pool drops everything it is given.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            textures: Vec::new(),
            buffers: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.textures.len() + self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if !self.is_empty() {
            log::debug!("Dropping {} pooled transient objects", self.len());
        }
        self.textures.clear();
        self.buffers.clear();
    }

    pub(crate) fn take_texture(
        &mut self,
        requested: &TextureDescriptor,
    ) -> Option<(TextureDescriptor, D::Texture)> {
        let position = self
            .textures
            .iter()
            .position(|(pooled, _)| can_alias_textures(pooled, requested))?;
        Some(self.textures.swap_remove(position))
    }

    pub(crate) fn take_buffer(
        &mut self,
        requested: &BufferDescriptor,
    ) -> Option<(BufferDescriptor, D::Buffer)> {
        let position = self
            .buffers
            .iter()
            .position(|(pooled, _)| can_alias_buffers(pooled, requested))?;
        Some(self.buffers.swap_remove(position))
    }

    pub(crate) fn recycle_texture(&mut self, descriptor: TextureDescriptor, texture: D::Texture) {
        if self.enabled {
            self.textures.push((descriptor, texture));
        }
    }

    pub(crate) fn recycle_buffer(&mut self, descriptor: BufferDescriptor, buffer: D::Buffer) {
        if self.enabled {
            self.buffers.push((descriptor, buffer));
        }
    }
}

fn can_alias_textures(pooled: &TextureDescriptor, requested: &TextureDescriptor) -> bool {
    pooled.format == requested.format
        && pooled.width == requested.width
        && pooled.height == requested.height
        && pooled.depth_or_array_layers == requested.depth_or_array_layers
        && pooled.dimension == requested.dimension
        && pooled.sample_count == requested.sample_count
        && pooled.mip_level_count == requested.mip_level_count
        && pooled.usage.contains(requested.usage)
}

// Mapped buffers carry initial contents, so they are never served from the pool.
fn can_alias_buffers(pooled: &BufferDescriptor, requested: &BufferDescriptor) -> bool {
    !requested.mapped_at_creation
        && pooled.size >= requested.size
        && pooled.usage == requested.usage
}
