use crate::builder::PassBuilder;
use crate::device::RenderDevice;
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::{PassRecord, PassType};
use crate::pool::TransientPool;
use crate::resource::{
    BufferDescriptor, GpuResource, ResourceDescriptor, ResourceRecord, TextureDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderGraphConfig {
    /// Remove passes whose results nobody observes.
    pub cull_passes: bool,
    /// Keep released transient objects around for compatible later allocations.
    pub alias_transients: bool,
    /// Discard attachment stores on transients that are not read afterwards.
    pub elide_stores: bool,
    /// Builder calls on a missing pass trip a debug assertion instead of only logging.
    pub strict_builder: bool,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            cull_passes: true,
            alias_transients: true,
            elide_stores: true,
            strict_builder: false,
        }
    }
}

/// Owns one frame's resources and passes, and the transient pool shared
/// across frames.
///
/// A frame goes through declaration (create/import resources, add passes),
/// [`compile`](RenderGraph::compile) and [`execute`](RenderGraph::execute).
/// Executing ends the frame: the tables are reset and every handle handed out
/// during the frame becomes stale.
pub struct RenderGraph<D: RenderDevice> {
    pub(crate) config: RenderGraphConfig,
    pub(crate) resources: Vec<ResourceRecord<D>>,
    slot_generations: Vec<u32>,
    pub(crate) passes: Vec<PassRecord<D>>,
    pub(crate) execution_order: Vec<PassHandle>,
    pub(crate) pool: TransientPool<D>,
    pub(crate) needs_recompile: bool,
    frame_index: u64,
}

impl<D: RenderDevice> RenderGraph<D> {
    pub fn new() -> Self {
        Self::with_config(RenderGraphConfig::default())
    }

    pub fn with_config(config: RenderGraphConfig) -> Self {
        Self {
            config,
            resources: Vec::new(),
            slot_generations: Vec::new(),
            passes: Vec::new(),
            execution_order: Vec::new(),
            pool: TransientPool::new(config.alias_transients),
            needs_recompile: true,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    /// Number of frames reset so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Declares a transient texture. Nothing is created until a live pass needs it.
    pub fn create_texture(&mut self, name: &str, descriptor: TextureDescriptor) -> ResourceHandle {
        self.register_resource(|generation| {
            ResourceRecord::transient(
                name.to_string(),
                ResourceDescriptor::Texture(descriptor),
                generation,
            )
        })
    }

    pub fn create_buffer(&mut self, name: &str, descriptor: BufferDescriptor) -> ResourceHandle {
        self.register_resource(|generation| {
            ResourceRecord::transient(
                name.to_string(),
                ResourceDescriptor::Buffer(descriptor),
                generation,
            )
        })
    }

    /// Wraps a caller-owned texture. The graph tracks its usage but never
    /// allocates or releases it.
    pub fn import_texture(
        &mut self,
        name: &str,
        texture: D::Texture,
        view: D::TextureView,
    ) -> ResourceHandle {
        self.register_resource(|generation| {
            ResourceRecord::imported(
                name.to_string(),
                GpuResource::Texture {
                    texture,
                    view,
                    origin: None,
                },
                generation,
            )
        })
    }

    pub fn import_buffer(&mut self, name: &str, buffer: D::Buffer) -> ResourceHandle {
        self.register_resource(|generation| {
            ResourceRecord::imported(
                name.to_string(),
                GpuResource::Buffer {
                    buffer,
                    origin: None,
                },
                generation,
            )
        })
    }

    fn register_resource(
        &mut self,
        create: impl FnOnce(u32) -> ResourceRecord<D>,
    ) -> ResourceHandle {
        let index = self.resources.len();
        if index == self.slot_generations.len() {
            self.slot_generations.push(0);
        }
        let generation = self.slot_generations[index];
        self.resources.push(create(generation));
        self.needs_recompile = true;
        ResourceHandle::new(index as u32, generation)
    }

    pub fn add_graphics_pass(&mut self, name: &str) -> PassBuilder<'_, D> {
        self.add_pass(name, PassType::Graphics)
    }

    pub fn add_compute_pass(&mut self, name: &str) -> PassBuilder<'_, D> {
        self.add_pass(name, PassType::Compute)
    }

    pub fn add_copy_pass(&mut self, name: &str) -> PassBuilder<'_, D> {
        self.add_pass(name, PassType::Copy)
    }

    pub fn add_pass(&mut self, name: &str, pass_type: PassType) -> PassBuilder<'_, D> {
        let handle = PassHandle::new(self.passes.len() as u32);
        self.passes.push(PassRecord::new(name.to_string(), pass_type));
        self.needs_recompile = true;
        PassBuilder::new(self, handle)
    }

    /// Builder over an already declared pass.
    pub fn pass_builder(&mut self, handle: PassHandle) -> PassBuilder<'_, D> {
        PassBuilder::new(self, handle)
    }

    pub fn pass(&self, handle: PassHandle) -> Option<&PassRecord<D>> {
        self.passes.get(handle.slot())
    }

    pub(crate) fn pass_record_mut(&mut self, handle: PassHandle) -> Option<&mut PassRecord<D>> {
        self.passes.get_mut(handle.slot())
    }

    /// Resolves a handle, rejecting stale generations.
    pub fn resource(&self, handle: ResourceHandle) -> Option<&ResourceRecord<D>> {
        self.resource_slot(handle).map(|slot| &self.resources[slot])
    }

    pub(crate) fn resource_slot(&self, handle: ResourceHandle) -> Option<usize> {
        self.resources
            .get(handle.slot())
            .filter(|record| record.generation() == handle.generation())
            .map(|_| handle.slot())
    }

    pub fn passes(&self) -> impl Iterator<Item = (PassHandle, &PassRecord<D>)> {
        self.passes
            .iter()
            .enumerate()
            .map(|(index, pass)| (PassHandle::new(index as u32), pass))
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Live passes in execution order. Empty until compiled.
    pub fn execution_order(&self) -> &[PassHandle] {
        &self.execution_order
    }

    pub fn culled_passes(&self) -> impl Iterator<Item = PassHandle> + '_ {
        self.passes()
            .filter(|(_, pass)| pass.is_culled())
            .map(|(handle, _)| handle)
    }

    pub fn is_compiled(&self) -> bool {
        !self.needs_recompile
    }

    /// Objects currently parked in the transient pool.
    pub fn pooled_object_count(&self) -> usize {
        self.pool.len()
    }

    /// Drops every pooled transient object.
    pub fn trim_pool(&mut self) {
        self.pool.clear();
    }

    /// Starts a new declaration phase.
    ///
    /// Transient objects go back to the pool, tables are cleared and every slot
    /// generation is bumped so handles from the previous frame no longer resolve.
    pub fn reset(&mut self) {
        for record in &mut self.resources {
            record.release_transient(&mut self.pool);
        }
        for generation in self.slot_generations.iter_mut().take(self.resources.len()) {
            *generation = generation.wrapping_add(1);
        }
        self.resources.clear();
        self.passes.clear();
        self.execution_order.clear();
        self.needs_recompile = true;
        self.frame_index += 1;
    }

    pub(crate) fn invalidate(&mut self) {
        self.needs_recompile = true;
    }

    pub(crate) fn report_missing_pass(&self, handle: PassHandle, operation: &str) {
        log::warn!(
            "{operation} ignored: pass {} does not exist (graph has {} passes)",
            handle.index(),
            self.passes.len()
        );
        debug_assert!(
            !self.config.strict_builder,
            "{operation} called on missing pass {}",
            handle.index()
        );
    }
}

impl<D: RenderDevice> Default for RenderGraph<D> {
    fn default() -> Self {
        Self::new()
    }
}
