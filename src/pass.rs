use std::fmt;

use bitflags::bitflags;

use crate::device::{PassResources, RenderDevice};
use crate::handle::{PassHandle, ResourceHandle};
use crate::resource::{ResourceKind, ResourceUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Graphics,
    Compute,
    Copy,
}

impl fmt::Display for PassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassType::Graphics => f.write_str("graphics"),
            PassType::Compute => f.write_str("compute"),
            PassType::Copy => f.write_str("copy"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PassFlags: u32 {
        /// Keep the pass even when nothing observes its outputs.
        const NEVER_CULL = 1 << 0;
        /// Pass may be recorded on an asynchronous compute queue.
        const ASYNC_COMPUTE = 1 << 1;
    }
}

impl PassFlags {
    pub fn never_cull(self) -> bool {
        self.contains(Self::NEVER_CULL)
    }

    pub fn is_async_compute(self) -> bool {
        self.contains(Self::ASYNC_COMPUTE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub handle: ResourceHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: wgpu::Color,
    pub mip_level: u32,
    pub array_layer: u32,
}

impl ColorAttachment {
    pub fn new(handle: ResourceHandle) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }

    pub fn with_clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_load_op(mut self, load_op: LoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn with_store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    pub fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }

    pub fn with_array_layer(mut self, array_layer: u32) -> Self {
        self.array_layer = array_layer;
        self
    }

    /// False for the placeholder slots created when a higher slot is set first.
    pub fn is_present(&self) -> bool {
        self.handle.is_valid()
    }
}

impl Default for ColorAttachment {
    fn default() -> Self {
        Self {
            handle: ResourceHandle::INVALID,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_color: wgpu::Color::BLACK,
            mip_level: 0,
            array_layer: 0,
        }
    }
}

impl From<ResourceHandle> for ColorAttachment {
    fn from(handle: ResourceHandle) -> Self {
        Self::new(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAttachment {
    pub handle: ResourceHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub read_only: bool,
    pub mip_level: u32,
    pub array_layer: u32,
}

impl DepthStencilAttachment {
    pub fn new(handle: ResourceHandle) -> Self {
        Self {
            handle,
            depth_load_op: LoadOp::Clear,
            depth_store_op: StoreOp::Store,
            stencil_load_op: LoadOp::Clear,
            stencil_store_op: StoreOp::Store,
            clear_depth: 1.0,
            clear_stencil: 0,
            read_only: false,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Depth test without depth writes: load the existing contents and never store.
    pub fn read_only(handle: ResourceHandle) -> Self {
        Self {
            depth_load_op: LoadOp::Load,
            depth_store_op: StoreOp::Discard,
            stencil_load_op: LoadOp::Load,
            stencil_store_op: StoreOp::Discard,
            read_only: true,
            ..Self::new(handle)
        }
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    pub fn with_clear_stencil(mut self, stencil: u32) -> Self {
        self.clear_stencil = stencil;
        self
    }

    pub fn with_depth_ops(mut self, load_op: LoadOp, store_op: StoreOp) -> Self {
        self.depth_load_op = load_op;
        self.depth_store_op = store_op;
        self
    }

    pub fn with_stencil_ops(mut self, load_op: LoadOp, store_op: StoreOp) -> Self {
        self.stencil_load_op = load_op;
        self.stencil_store_op = store_op;
        self
    }

    pub fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }

    pub fn with_array_layer(mut self, array_layer: u32) -> Self {
        self.array_layer = array_layer;
        self
    }

    fn loads_previous_contents(&self) -> bool {
        self.read_only
            || self.depth_load_op == LoadOp::Load
            || self.stencil_load_op == LoadOp::Load
    }
}

impl From<ResourceHandle> for DepthStencilAttachment {
    fn from(handle: ResourceHandle) -> Self {
        Self::new(handle)
    }
}

/// One read or write entry of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceAccess {
    pub handle: ResourceHandle,
    pub usage: ResourceUsage,
    /// Kind the pass expects the resource to be.
    pub kind: ResourceKind,
}

pub type GraphicsCallback<D> =
    Box<dyn FnOnce(&mut <D as RenderDevice>::RenderPass, &PassResources<'_, D>)>;

pub type ComputeCallback<D> =
    Box<dyn FnOnce(&mut <D as RenderDevice>::CommandEncoder, &PassResources<'_, D>)>;

pub(crate) enum PassExecute<D: RenderDevice> {
    None,
    Graphics(GraphicsCallback<D>),
    Compute(ComputeCallback<D>),
}

/// One unit of GPU work declared for the current frame.
pub struct PassRecord<D: RenderDevice> {
    name: String,
    pass_type: PassType,
    pub(crate) flags: PassFlags,
    color_attachments: Vec<ColorAttachment>,
    depth_stencil: Option<DepthStencilAttachment>,
    reads: Vec<ResourceAccess>,
    writes: Vec<ResourceAccess>,
    pub(crate) execute: PassExecute<D>,
    pub(crate) callback_conflict: bool,
    pub(crate) culled: bool,
    pub(crate) execution_order: Option<u32>,
    pub(crate) dependencies: Vec<PassHandle>,
    pub(crate) color_store_ops: Vec<StoreOp>,
    pub(crate) depth_store_ops: Option<(StoreOp, StoreOp)>,
}

impl<D: RenderDevice> PassRecord<D> {
    pub(crate) fn new(name: String, pass_type: PassType) -> Self {
        Self {
            name,
            pass_type,
            flags: PassFlags::empty(),
            color_attachments: Vec::new(),
            depth_stencil: None,
            reads: Vec::new(),
            writes: Vec::new(),
            execute: PassExecute::None,
            callback_conflict: false,
            culled: false,
            execution_order: None,
            dependencies: Vec::new(),
            color_store_ops: Vec::new(),
            depth_store_ops: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn flags(&self) -> PassFlags {
        self.flags
    }

    pub fn color_attachments(&self) -> &[ColorAttachment] {
        &self.color_attachments
    }

    pub fn depth_stencil_attachment(&self) -> Option<&DepthStencilAttachment> {
        self.depth_stencil.as_ref()
    }

    pub fn reads(&self) -> &[ResourceAccess] {
        &self.reads
    }

    pub fn writes(&self) -> &[ResourceAccess] {
        &self.writes
    }

    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// Position in the compiled order; `None` before compile or when culled.
    pub fn execution_order(&self) -> Option<u32> {
        self.execution_order
    }

    /// Live passes this pass must run after, filled in by compile.
    pub fn dependencies(&self) -> &[PassHandle] {
        &self.dependencies
    }

    pub fn has_graphics_callback(&self) -> bool {
        matches!(self.execute, PassExecute::Graphics(_))
    }

    pub fn has_compute_callback(&self) -> bool {
        matches!(self.execute, PassExecute::Compute(_))
    }

    /// A read-only depth attachment is a read and does not count.
    pub fn has_side_effects(&self) -> bool {
        !self.writes.is_empty() || self.writes_attachments()
    }

    pub fn never_cull(&self) -> bool {
        self.flags.never_cull()
    }

    pub fn is_async_compute(&self) -> bool {
        self.flags.is_async_compute()
    }

    pub fn has_attachments(&self) -> bool {
        self.color_attachments.iter().any(ColorAttachment::is_present)
            || self.depth_stencil.is_some()
    }

    /// Appends color attachments, the depth-stencil attachment (read-only or
    /// not), then every write entry.
    pub fn outputs(&self, out: &mut Vec<ResourceHandle>) {
        out.extend(
            self.color_attachments
                .iter()
                .filter(|attachment| attachment.is_present())
                .map(|attachment| attachment.handle),
        );
        if let Some(depth) = &self.depth_stencil {
            out.push(depth.handle);
        }
        out.extend(self.writes.iter().map(|access| access.handle));
    }

    /// Appends every read entry, then the depth-stencil handle if it is read-only.
    pub fn inputs(&self, out: &mut Vec<ResourceHandle>) {
        out.extend(self.reads.iter().map(|access| access.handle));
        if let Some(depth) = self.depth_stencil.filter(|depth| depth.read_only) {
            out.push(depth.handle);
        }
    }

    pub(crate) fn reads_resource(&self, handle: ResourceHandle) -> bool {
        self.reads.iter().any(|access| access.handle == handle)
    }

    pub(crate) fn writes_resource(&self, handle: ResourceHandle) -> bool {
        self.writes.iter().any(|access| access.handle == handle)
    }

    /// Whether an attachment of this pass starts from the previous contents of `handle`.
    pub(crate) fn loads_resource(&self, handle: ResourceHandle) -> bool {
        self.loaded_resources().any(|loaded| loaded == handle)
    }

    /// Attachments that start from their previous contents.
    pub(crate) fn loaded_resources(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.color_attachments
            .iter()
            .filter(|attachment| attachment.is_present() && attachment.load_op == LoadOp::Load)
            .map(|attachment| attachment.handle)
            .chain(
                self.depth_stencil
                    .filter(DepthStencilAttachment::loads_previous_contents)
                    .map(|depth| depth.handle),
            )
    }

    /// Renders into a color attachment or a writable depth attachment.
    pub fn writes_attachments(&self) -> bool {
        self.color_attachments.iter().any(ColorAttachment::is_present)
            || self.depth_stencil.is_some_and(|depth| !depth.read_only)
    }

    /// Replacing an occupied slot also drops the write entry of the texture it held.
    pub(crate) fn set_color_attachment(&mut self, slot: usize, attachment: ColorAttachment) {
        if self.color_attachments.len() <= slot {
            self.color_attachments.resize(slot + 1, ColorAttachment::default());
        }
        let previous = std::mem::replace(&mut self.color_attachments[slot], attachment);
        if previous.is_present() {
            remove_access(&mut self.writes, previous.handle, ResourceUsage::RenderTarget);
        }
        self.add_write(attachment.handle, ResourceUsage::RenderTarget, ResourceKind::Texture);
    }

    pub(crate) fn set_depth_attachment(&mut self, attachment: DepthStencilAttachment) {
        if let Some(previous) = self.depth_stencil.replace(attachment) {
            let accesses = if previous.read_only {
                &mut self.reads
            } else {
                &mut self.writes
            };
            remove_access(accesses, previous.handle, ResourceUsage::DepthStencil);
        }
        if attachment.read_only {
            self.add_read(attachment.handle, ResourceUsage::DepthStencil, ResourceKind::Texture);
        } else {
            self.add_write(attachment.handle, ResourceUsage::DepthStencil, ResourceKind::Texture);
        }
    }

    pub(crate) fn add_read(
        &mut self,
        handle: ResourceHandle,
        usage: ResourceUsage,
        kind: ResourceKind,
    ) {
        self.reads.push(ResourceAccess { handle, usage, kind });
    }

    pub(crate) fn add_write(
        &mut self,
        handle: ResourceHandle,
        usage: ResourceUsage,
        kind: ResourceKind,
    ) {
        self.writes.push(ResourceAccess { handle, usage, kind });
    }

    pub(crate) fn set_graphics_callback(&mut self, callback: GraphicsCallback<D>) {
        if matches!(self.execute, PassExecute::Compute(_)) {
            self.callback_conflict = true;
        }
        self.execute = PassExecute::Graphics(callback);
    }

    pub(crate) fn set_compute_callback(&mut self, callback: ComputeCallback<D>) {
        if matches!(self.execute, PassExecute::Graphics(_)) {
            self.callback_conflict = true;
        }
        self.execute = PassExecute::Compute(callback);
    }

    pub(crate) fn reset_compile_state(&mut self) {
        self.culled = false;
        self.execution_order = None;
        self.dependencies.clear();
        self.color_store_ops = self
            .color_attachments
            .iter()
            .map(|attachment| attachment.store_op)
            .collect();
        self.depth_store_ops = self
            .depth_stencil
            .map(|depth| (depth.depth_store_op, depth.stencil_store_op));
    }
}

fn remove_access(
    accesses: &mut Vec<ResourceAccess>,
    handle: ResourceHandle,
    usage: ResourceUsage,
) {
    if let Some(position) = accesses
        .iter()
        .position(|access| access.handle == handle && access.usage == usage)
    {
        accesses.remove(position);
    }
}
