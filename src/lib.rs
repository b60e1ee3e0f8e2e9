//! A per-frame render graph: declare resources and passes, let the graph
//! cull, order and validate them, then execute against a [`RenderDevice`].
//!
//! ```ignore
//! let mut graph = RenderGraph::<wgpu::Device>::new();
//! let backbuffer = graph.import_texture("backbuffer", surface_texture, surface_view);
//! let hdr = graph.create_texture(
//!     "hdr",
//!     TextureDescriptor::new_2d(wgpu::TextureFormat::Rgba16Float, width, height),
//! );
//!
//! graph
//!     .add_graphics_pass("scene")
//!     .set_color_attachment(0, hdr)
//!     .set_execute(|pass, _| draw_scene(pass));
//! graph
//!     .add_graphics_pass("tonemap")
//!     .read_texture(hdr)
//!     .set_color_attachment(0, backbuffer)
//!     .set_execute(move |pass, resources| tonemap(pass, resources.texture_view(hdr)));
//!
//! let commands = graph.execute(&device)?;
//! queue.submit([commands]);
//! ```

mod builder;
mod compile;
mod device;
mod error;
mod execute;
mod graph;
mod handle;
mod pass;
mod pool;
mod resource;
mod wgpu_device;

pub use builder::PassBuilder;
pub use device::{ColorTarget, DepthTarget, PassResources, RenderDevice, RenderTargets};
pub use error::{DeviceError, RenderGraphError, Result};
pub use graph::{RenderGraph, RenderGraphConfig};
pub use handle::{PassHandle, ResourceHandle};
pub use pass::{
    ColorAttachment, ComputeCallback, DepthStencilAttachment, GraphicsCallback, LoadOp, PassFlags,
    PassRecord, PassType, ResourceAccess, StoreOp,
};
pub use pool::TransientPool;
pub use resource::{
    BufferDescriptor, GpuResource, ResourceDescriptor, ResourceKind, ResourceRecord,
    ResourceUsage, TextureDescriptor,
};

/// Assigns consecutive color slots, starting at 0, on a pass builder.
///
/// ```ignore
/// let builder = color_attachments!(graph.add_graphics_pass("gbuffer"); albedo, normal, material);
/// ```
#[macro_export]
macro_rules! color_attachments {
    ($builder:expr; $($attachment:expr),+ $(,)?) => {{
        let builder = $builder;
        let mut slot = 0u32;
        $(
            let builder = builder.set_color_attachment(slot, $attachment);
            slot += 1;
        )+
        let _ = slot;
        builder
    }};
}
