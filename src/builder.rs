use crate::device::{PassResources, RenderDevice};
use crate::graph::RenderGraph;
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::{ColorAttachment, DepthStencilAttachment, PassFlags, PassRecord};
use crate::resource::{ResourceKind, ResourceUsage};

/// Fluent configuration of one pass.
///
/// The builder only holds the graph and a pass handle; every call looks the
/// pass up again. When the handle no longer resolves the call does nothing.
///
/// ```ignore
/// let color = graph.create_texture("color", TextureDescriptor::new_2d(format, w, h));
/// graph
///     .add_graphics_pass("opaque")
///     .set_color_attachment(0, ColorAttachment::new(color).with_clear_color(wgpu::Color::BLACK))
///     .set_depth_attachment(depth)
///     .read_buffer(instances)
///     .set_execute(move |render_pass, resources| {
///         // record draws
///     });
/// ```
pub struct PassBuilder<'a, D: RenderDevice> {
    graph: &'a mut RenderGraph<D>,
    handle: PassHandle,
}

impl<'a, D: RenderDevice> PassBuilder<'a, D> {
    pub(crate) fn new(graph: &'a mut RenderGraph<D>, handle: PassHandle) -> Self {
        Self { graph, handle }
    }

    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    /// Writes `slot` as a render target, growing the slot list as needed.
    pub fn set_color_attachment(self, slot: u32, attachment: impl Into<ColorAttachment>) -> Self {
        let attachment = attachment.into();
        self.with_pass("set_color_attachment", |pass| {
            pass.set_color_attachment(slot as usize, attachment)
        })
    }

    pub fn set_depth_attachment(self, attachment: impl Into<DepthStencilAttachment>) -> Self {
        let attachment = attachment.into();
        self.with_pass("set_depth_attachment", |pass| {
            pass.set_depth_attachment(attachment)
        })
    }

    /// Depth test against `handle` without writing it. Registers a read.
    pub fn set_depth_attachment_read_only(self, handle: ResourceHandle) -> Self {
        self.with_pass("set_depth_attachment_read_only", |pass| {
            pass.set_depth_attachment(DepthStencilAttachment::read_only(handle))
        })
    }

    pub fn read_texture(self, handle: ResourceHandle) -> Self {
        self.read_texture_as(handle, ResourceUsage::ShaderRead)
    }

    pub fn read_texture_as(self, handle: ResourceHandle, usage: ResourceUsage) -> Self {
        self.with_pass("read_texture", |pass| {
            pass.add_read(handle, usage, ResourceKind::Texture)
        })
    }

    pub fn read_buffer(self, handle: ResourceHandle) -> Self {
        self.read_buffer_as(handle, ResourceUsage::ShaderRead)
    }

    pub fn read_buffer_as(self, handle: ResourceHandle, usage: ResourceUsage) -> Self {
        self.with_pass("read_buffer", |pass| {
            pass.add_read(handle, usage, ResourceKind::Buffer)
        })
    }

    pub fn write_texture(self, handle: ResourceHandle) -> Self {
        self.write_texture_as(handle, ResourceUsage::UnorderedAccess)
    }

    pub fn write_texture_as(self, handle: ResourceHandle, usage: ResourceUsage) -> Self {
        self.with_pass("write_texture", |pass| {
            pass.add_write(handle, usage, ResourceKind::Texture)
        })
    }

    pub fn write_buffer(self, handle: ResourceHandle) -> Self {
        self.write_buffer_as(handle, ResourceUsage::UnorderedAccess)
    }

    pub fn write_buffer_as(self, handle: ResourceHandle, usage: ResourceUsage) -> Self {
        self.with_pass("write_buffer", |pass| {
            pass.add_write(handle, usage, ResourceKind::Buffer)
        })
    }

    /// Replaces the pass flags.
    pub fn set_flags(self, flags: PassFlags) -> Self {
        self.with_pass("set_flags", |pass| pass.flags = flags)
    }

    /// Installs the graphics callback, dropping any previously installed one.
    pub fn set_execute(
        self,
        callback: impl FnOnce(&mut D::RenderPass, &PassResources<'_, D>) + 'static,
    ) -> Self {
        self.with_pass("set_execute", |pass| {
            pass.set_graphics_callback(Box::new(callback))
        })
    }

    /// Installs the compute/copy callback, dropping any previously installed one.
    pub fn set_compute_execute(
        self,
        callback: impl FnOnce(&mut D::CommandEncoder, &PassResources<'_, D>) + 'static,
    ) -> Self {
        self.with_pass("set_compute_execute", |pass| {
            pass.set_compute_callback(Box::new(callback))
        })
    }

    fn with_pass(self, operation: &str, configure: impl FnOnce(&mut PassRecord<D>)) -> Self {
        match self.graph.pass_record_mut(self.handle) {
            Some(pass) => {
                configure(pass);
                self.graph.invalidate();
            }
            None => self.graph.report_missing_pass(self.handle, operation),
        }
        self
    }
}
