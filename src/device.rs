//! The boundary between the graph and the GPU abstraction it drives.
//!
//! The graph never talks to a graphics API directly. Everything it needs to
//! realise transient resources and open render passes goes through
//! [`RenderDevice`], and everything a pass callback may look up goes through
//! [`PassResources`].

use crate::error::{DeviceError, RenderGraphError, Result};
use crate::handle::ResourceHandle;
use crate::pass::{ColorAttachment, DepthStencilAttachment, StoreOp};
use crate::resource::{
    BufferDescriptor, GpuResource, ResourceDescriptor, ResourceRecord, TextureDescriptor,
};

/// GPU device consumed by the render graph.
///
/// Creation calls are fallible and must not leave partially created objects
/// behind on failure.
pub trait RenderDevice {
    type Texture;
    type TextureView;
    type Buffer;
    /// Generic command recorder handed to compute and copy callbacks.
    type CommandEncoder;
    /// Graphics encoder bound to a pass's attachments. Dropping it ends the pass.
    type RenderPass;
    type CommandBuffer;

    fn create_texture(
        &self,
        label: &str,
        descriptor: &TextureDescriptor,
    ) -> std::result::Result<Self::Texture, DeviceError>;

    /// Whole-texture view with the dimension given by
    /// [`TextureDescriptor::view_dimension`].
    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        descriptor: &TextureDescriptor,
    ) -> std::result::Result<Self::TextureView, DeviceError>;

    fn create_buffer(
        &self,
        label: &str,
        descriptor: &BufferDescriptor,
    ) -> std::result::Result<Self::Buffer, DeviceError>;

    fn create_command_encoder(&self, label: &str) -> Self::CommandEncoder;

    fn begin_render_pass(
        &self,
        encoder: &mut Self::CommandEncoder,
        targets: &RenderTargets<'_, Self>,
    ) -> std::result::Result<Self::RenderPass, DeviceError>;

    fn finish(&self, encoder: Self::CommandEncoder) -> Self::CommandBuffer;
}

/// A color attachment resolved to live GPU objects.
pub struct ColorTarget<'a, D: RenderDevice + ?Sized> {
    pub texture: &'a D::Texture,
    pub view: &'a D::TextureView,
    pub attachment: &'a ColorAttachment,
    /// Store op after elision; may differ from `attachment.store_op`.
    pub store_op: StoreOp,
}

/// A depth-stencil attachment resolved to live GPU objects.
pub struct DepthTarget<'a, D: RenderDevice + ?Sized> {
    pub texture: &'a D::Texture,
    pub view: &'a D::TextureView,
    pub attachment: &'a DepthStencilAttachment,
    pub depth_store_op: StoreOp,
    pub stencil_store_op: StoreOp,
}

/// Everything a device needs to open the render pass of one graphics pass.
pub struct RenderTargets<'a, D: RenderDevice + ?Sized> {
    pub label: &'a str,
    pub color_attachments: Vec<Option<ColorTarget<'a, D>>>,
    pub depth_stencil_attachment: Option<DepthTarget<'a, D>>,
}

/// Read-only view of the graph's resources, valid for one callback invocation.
pub struct PassResources<'a, D: RenderDevice> {
    pass: &'a str,
    records: &'a [ResourceRecord<D>],
}

impl<'a, D: RenderDevice> PassResources<'a, D> {
    pub(crate) fn new(pass: &'a str, records: &'a [ResourceRecord<D>]) -> Self {
        Self { pass, records }
    }

    /// Name of the pass being executed.
    pub fn pass_name(&self) -> &'a str {
        self.pass
    }

    pub fn record(&self, handle: ResourceHandle) -> Result<&'a ResourceRecord<D>> {
        self.records
            .get(handle.slot())
            .filter(|record| record.generation() == handle.generation())
            .ok_or_else(|| RenderGraphError::ResourceNotBound {
                resource: format!("resource_{}", handle.index()),
                handle,
            })
    }

    pub fn texture(&self, handle: ResourceHandle) -> Result<&'a D::Texture> {
        match self.gpu(handle)? {
            GpuResource::Texture { texture, .. } => Ok(texture),
            GpuResource::Buffer { .. } => Err(self.type_mismatch(handle, "texture", "buffer")),
        }
    }

    pub fn texture_view(&self, handle: ResourceHandle) -> Result<&'a D::TextureView> {
        match self.gpu(handle)? {
            GpuResource::Texture { view, .. } => Ok(view),
            GpuResource::Buffer { .. } => {
                Err(self.type_mismatch(handle, "texture_view", "buffer"))
            }
        }
    }

    pub fn buffer(&self, handle: ResourceHandle) -> Result<&'a D::Buffer> {
        match self.gpu(handle)? {
            GpuResource::Buffer { buffer, .. } => Ok(buffer),
            GpuResource::Texture { .. } => Err(self.type_mismatch(handle, "buffer", "texture")),
        }
    }

    /// Width and height of a transient texture, as declared.
    pub fn texture_size(&self, handle: ResourceHandle) -> Result<(u32, u32)> {
        let record = self.record(handle)?;
        match record.descriptor() {
            Some(ResourceDescriptor::Texture(descriptor)) => {
                Ok((descriptor.width, descriptor.height))
            }
            Some(ResourceDescriptor::Buffer(_)) => {
                Err(self.type_mismatch(handle, "texture_size", "buffer"))
            }
            None => Err(self.type_mismatch(handle, "texture_size", "imported")),
        }
    }

    fn gpu(&self, handle: ResourceHandle) -> Result<&'a GpuResource<D>> {
        let record = self.record(handle)?;
        record
            .gpu()
            .ok_or_else(|| RenderGraphError::ResourceNotBound {
                resource: record.name().to_string(),
                handle,
            })
    }

    fn type_mismatch(
        &self,
        handle: ResourceHandle,
        operation: &str,
        actual: &str,
    ) -> RenderGraphError {
        let resource = self
            .record(handle)
            .map(|record| record.name().to_string())
            .unwrap_or_else(|_| format!("resource_{}", handle.index()));
        RenderGraphError::TypeMismatch {
            operation: operation.to_string(),
            actual_type: actual.to_string(),
            resource,
        }
    }
}

/// Device with unit GPU objects, for unit tests that only exercise bookkeeping.
#[cfg(test)]
pub(crate) mod null {
    use super::*;

    pub(crate) struct NullDevice;

    impl RenderDevice for NullDevice {
        type Texture = ();
        type TextureView = ();
        type Buffer = ();
        type CommandEncoder = Vec<String>;
        type RenderPass = ();
        type CommandBuffer = Vec<String>;

        fn create_texture(
            &self,
            _label: &str,
            _descriptor: &TextureDescriptor,
        ) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn create_texture_view(
            &self,
            _texture: &(),
            _descriptor: &TextureDescriptor,
        ) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn create_buffer(
            &self,
            _label: &str,
            _descriptor: &BufferDescriptor,
        ) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn create_command_encoder(&self, _label: &str) -> Vec<String> {
            Vec::new()
        }

        fn begin_render_pass(
            &self,
            encoder: &mut Vec<String>,
            targets: &RenderTargets<'_, Self>,
        ) -> std::result::Result<(), DeviceError> {
            encoder.push(targets.label.to_string());
            Ok(())
        }

        fn finish(&self, encoder: Vec<String>) -> Vec<String> {
            encoder
        }
    }
}
