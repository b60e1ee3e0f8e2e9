//! [`RenderDevice`] implementation for `wgpu::Device`.

use wgpu::{TextureDimension, TextureUsages, TextureViewDimension};

use crate::device::{ColorTarget, DepthTarget, RenderDevice, RenderTargets};
use crate::error::DeviceError;
use crate::pass::{LoadOp, StoreOp};
use crate::resource::{BufferDescriptor, TextureDescriptor};

impl RenderDevice for wgpu::Device {
    type Texture = wgpu::Texture;
    type TextureView = wgpu::TextureView;
    type Buffer = wgpu::Buffer;
    type CommandEncoder = wgpu::CommandEncoder;
    type RenderPass = wgpu::RenderPass<'static>;
    type CommandBuffer = wgpu::CommandBuffer;

    fn create_texture(
        &self,
        label: &str,
        descriptor: &TextureDescriptor,
    ) -> Result<wgpu::Texture, DeviceError> {
        validate_texture(label, descriptor, &self.limits())?;
        with_error_scope(self, label, || {
            wgpu::Device::create_texture(self, &descriptor.to_wgpu_descriptor(Some(label)))
        })
    }

    fn create_texture_view(
        &self,
        texture: &wgpu::Texture,
        descriptor: &TextureDescriptor,
    ) -> Result<wgpu::TextureView, DeviceError> {
        Ok(texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(descriptor.view_dimension()),
            ..Default::default()
        }))
    }

    fn create_buffer(
        &self,
        label: &str,
        descriptor: &BufferDescriptor,
    ) -> Result<wgpu::Buffer, DeviceError> {
        validate_buffer(label, descriptor, &self.limits())?;
        with_error_scope(self, label, || {
            wgpu::Device::create_buffer(self, &descriptor.to_wgpu_descriptor(Some(label)))
        })
    }

    fn create_command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        wgpu::Device::create_command_encoder(
            self,
            &wgpu::CommandEncoderDescriptor { label: Some(label) },
        )
    }

    fn begin_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets<'_, Self>,
    ) -> Result<wgpu::RenderPass<'static>, DeviceError> {
        for target in targets.color_attachments.iter().flatten() {
            require_render_attachment(targets.label, target.texture)?;
        }
        if let Some(target) = &targets.depth_stencil_attachment {
            require_render_attachment(targets.label, target.texture)?;
        }

        let color_views: Vec<Option<wgpu::TextureView>> = targets
            .color_attachments
            .iter()
            .map(|target| {
                target.as_ref().and_then(|target| {
                    attachment_view(
                        target.texture,
                        target.attachment.mip_level,
                        target.attachment.array_layer,
                    )
                })
            })
            .collect();
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = targets
            .color_attachments
            .iter()
            .zip(&color_views)
            .map(|(target, sub_view)| {
                target
                    .as_ref()
                    .map(|target| color_attachment(target, sub_view.as_ref()))
            })
            .collect();

        let depth_view = targets.depth_stencil_attachment.as_ref().and_then(|target| {
            attachment_view(
                target.texture,
                target.attachment.mip_level,
                target.attachment.array_layer,
            )
        });
        let depth_stencil_attachment = targets
            .depth_stencil_attachment
            .as_ref()
            .map(|target| depth_stencil_attachment(target, depth_view.as_ref()));

        let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(targets.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(render_pass.forget_lifetime())
    }

    fn finish(&self, encoder: wgpu::CommandEncoder) -> wgpu::CommandBuffer {
        encoder.finish()
    }
}

fn color_attachment<'a>(
    target: &ColorTarget<'a, wgpu::Device>,
    sub_view: Option<&'a wgpu::TextureView>,
) -> wgpu::RenderPassColorAttachment<'a> {
    let attachment = target.attachment;
    wgpu::RenderPassColorAttachment {
        view: sub_view.unwrap_or(target.view),
        resolve_target: None,
        ops: wgpu::Operations {
            load: match attachment.load_op {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(attachment.clear_color),
            },
            store: store_op(target.store_op),
        },
    }
}

fn depth_stencil_attachment<'a>(
    target: &DepthTarget<'a, wgpu::Device>,
    sub_view: Option<&'a wgpu::TextureView>,
) -> wgpu::RenderPassDepthStencilAttachment<'a> {
    let attachment = target.attachment;
    let format = target.texture.format();
    let writable = !attachment.read_only;

    wgpu::RenderPassDepthStencilAttachment {
        view: sub_view.unwrap_or(target.view),
        depth_ops: (writable && format.has_depth_aspect()).then(|| wgpu::Operations {
            load: match attachment.depth_load_op {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(attachment.clear_depth),
            },
            store: store_op(target.depth_store_op),
        }),
        stencil_ops: (writable && format.has_stencil_aspect()).then(|| wgpu::Operations {
            load: match attachment.stencil_load_op {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear | LoadOp::DontCare => {
                    wgpu::LoadOp::Clear(attachment.clear_stencil)
                }
            },
            store: store_op(target.stencil_store_op),
        }),
    }
}

fn store_op(store_op: StoreOp) -> wgpu::StoreOp {
    match store_op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}

/// Single-subresource view for attachments into textures with several mips
/// or layers. `None` when the default view already is one.
fn attachment_view(
    texture: &wgpu::Texture,
    mip_level: u32,
    array_layer: u32,
) -> Option<wgpu::TextureView> {
    let layered =
        texture.dimension() == TextureDimension::D2 && texture.depth_or_array_layers() > 1;
    if texture.mip_level_count() == 1 && !layered {
        return None;
    }

    let (dimension, array_layer_count) = match texture.dimension() {
        TextureDimension::D3 => (TextureViewDimension::D3, None),
        _ => (TextureViewDimension::D2, Some(1)),
    };
    Some(texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("RenderGraph Attachment View"),
        dimension: Some(dimension),
        base_mip_level: mip_level,
        mip_level_count: Some(1),
        base_array_layer: if layered { array_layer } else { 0 },
        array_layer_count,
        ..Default::default()
    }))
}

fn require_render_attachment(pass: &str, texture: &wgpu::Texture) -> Result<(), DeviceError> {
    if texture.usage().contains(TextureUsages::RENDER_ATTACHMENT) {
        Ok(())
    } else {
        Err(DeviceError::InvalidDescriptor {
            label: pass.to_string(),
            reason: "attachment texture lacks RENDER_ATTACHMENT usage".to_string(),
        })
    }
}

/// Creation happens inside validation and out-of-memory scopes so failures
/// surface as errors instead of the uncaptured error handler.
#[cfg(not(target_arch = "wasm32"))]
fn with_error_scope<T>(
    device: &wgpu::Device,
    label: &str,
    create: impl FnOnce() -> T,
) -> Result<T, DeviceError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = futures::executor::block_on(device.pop_error_scope());
    let out_of_memory = futures::executor::block_on(device.pop_error_scope());

    if out_of_memory.is_some() {
        return Err(DeviceError::OutOfMemory {
            label: label.to_string(),
        });
    }
    if let Some(error) = validation {
        return Err(DeviceError::Backend {
            label: label.to_string(),
            message: error.to_string(),
        });
    }
    Ok(value)
}

// Error scopes resolve asynchronously in the browser; blocking on them would stall.
#[cfg(target_arch = "wasm32")]
fn with_error_scope<T>(
    _device: &wgpu::Device,
    _label: &str,
    create: impl FnOnce() -> T,
) -> Result<T, DeviceError> {
    Ok(create())
}

pub(crate) fn validate_texture(
    label: &str,
    descriptor: &TextureDescriptor,
    limits: &wgpu::Limits,
) -> Result<(), DeviceError> {
    let invalid = |reason: String| DeviceError::InvalidDescriptor {
        label: label.to_string(),
        reason,
    };

    if descriptor.width == 0 || descriptor.height == 0 || descriptor.depth_or_array_layers == 0 {
        return Err(invalid(format!(
            "zero-sized extent {}x{}x{}",
            descriptor.width, descriptor.height, descriptor.depth_or_array_layers
        )));
    }
    if descriptor.usage.is_empty() {
        return Err(invalid("no usage flags".to_string()));
    }
    if descriptor.sample_count == 0 || descriptor.mip_level_count == 0 {
        return Err(invalid("sample and mip counts must be at least 1".to_string()));
    }
    if descriptor.cube
        && (descriptor.width != descriptor.height || descriptor.depth_or_array_layers % 6 != 0)
    {
        return Err(invalid(format!(
            "cube map must be square with a multiple of 6 layers, got {}x{}x{}",
            descriptor.width, descriptor.height, descriptor.depth_or_array_layers
        )));
    }

    let max_dimension = match descriptor.dimension {
        TextureDimension::D1 => limits.max_texture_dimension_1d,
        TextureDimension::D2 => limits.max_texture_dimension_2d,
        TextureDimension::D3 => limits.max_texture_dimension_3d,
    };
    if descriptor.width > max_dimension || descriptor.height > max_dimension {
        return Err(invalid(format!(
            "extent {}x{} exceeds device limit {max_dimension}",
            descriptor.width, descriptor.height
        )));
    }

    let largest = match descriptor.dimension {
        TextureDimension::D3 => {
            if descriptor.depth_or_array_layers > limits.max_texture_dimension_3d {
                return Err(invalid(format!(
                    "depth {} exceeds device limit {}",
                    descriptor.depth_or_array_layers, limits.max_texture_dimension_3d
                )));
            }
            descriptor
                .width
                .max(descriptor.height)
                .max(descriptor.depth_or_array_layers)
        }
        _ => {
            if descriptor.depth_or_array_layers > limits.max_texture_array_layers {
                return Err(invalid(format!(
                    "{} array layers exceed device limit {}",
                    descriptor.depth_or_array_layers, limits.max_texture_array_layers
                )));
            }
            descriptor.width.max(descriptor.height)
        }
    };
    let max_mips = u32::BITS - largest.leading_zeros();
    if descriptor.mip_level_count > max_mips {
        return Err(invalid(format!(
            "{} mip levels requested, at most {max_mips} fit",
            descriptor.mip_level_count
        )));
    }

    Ok(())
}

pub(crate) fn validate_buffer(
    label: &str,
    descriptor: &BufferDescriptor,
    limits: &wgpu::Limits,
) -> Result<(), DeviceError> {
    let invalid = |reason: String| DeviceError::InvalidDescriptor {
        label: label.to_string(),
        reason,
    };

    if descriptor.size == 0 {
        return Err(invalid("zero-sized buffer".to_string()));
    }
    if descriptor.usage.is_empty() {
        return Err(invalid("no usage flags".to_string()));
    }
    if descriptor.size > limits.max_buffer_size {
        return Err(invalid(format!(
            "size {} exceeds device limit {}",
            descriptor.size, limits.max_buffer_size
        )));
    }
    if descriptor.mapped_at_creation && descriptor.size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(invalid(format!(
            "mapped buffer size {} is not a multiple of {}",
            descriptor.size,
            wgpu::COPY_BUFFER_ALIGNMENT
        )));
    }

    Ok(())
}
