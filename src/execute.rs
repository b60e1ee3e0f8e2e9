use crate::device::{ColorTarget, DepthTarget, PassResources, RenderDevice, RenderTargets};
use crate::error::{RenderGraphError, Result};
use crate::graph::RenderGraph;
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::{PassExecute, PassRecord};
use crate::resource::{GpuResource, ResourceRecord};

impl<D: RenderDevice> RenderGraph<D> {
    /// Runs the compiled frame and returns the recorded command buffer.
    ///
    /// Compiles first when needed. Transients are allocated right before
    /// their first user and released right after their last one. The frame
    /// always ends with [`reset`](RenderGraph::reset); on error nothing is
    /// returned for submission and the transient pool is flushed.
    pub fn execute(&mut self, device: &D) -> Result<D::CommandBuffer> {
        let result = if self.needs_recompile {
            self.compile().and_then(|()| self.execute_passes(device))
        } else {
            self.execute_passes(device)
        };

        if let Err(error) = &result {
            log::error!("Render graph frame aborted: {error}");
            for record in &mut self.resources {
                record.release_transient(&mut self.pool);
            }
            self.pool.clear();
        }
        self.reset();
        result
    }

    fn execute_passes(&mut self, device: &D) -> Result<D::CommandBuffer> {
        let mut encoder = device.create_command_encoder("RenderGraph Encoder");
        let order = self.execution_order.clone();

        for (position, &handle) in order.iter().enumerate() {
            let position = position as u32;

            for record in &mut self.resources {
                let first_use = record.first_use == Some(position);
                if first_use && record.is_transient() && record.ref_count > 0 {
                    record.allocate(device, &mut self.pool)?;
                }
            }

            self.transition_usages(handle);
            self.run_pass(device, &mut encoder, handle)?;

            for record in &mut self.resources {
                if record.last_use == Some(position) {
                    record.release_transient(&mut self.pool);
                }
            }
        }

        Ok(device.finish(encoder))
    }

    fn transition_usages(&mut self, handle: PassHandle) {
        let pass = &self.passes[handle.slot()];
        for access in pass.reads().iter().chain(pass.writes()) {
            let Some(slot) = self.resource_slot(access.handle) else {
                continue;
            };
            let record = &mut self.resources[slot];
            if record.current_usage != access.usage {
                log::trace!(
                    "'{}': {:?} -> {:?} for '{}'",
                    record.name(),
                    record.current_usage,
                    access.usage,
                    pass.name()
                );
                record.current_usage = access.usage;
            }
        }
    }

    fn run_pass(
        &mut self,
        device: &D,
        encoder: &mut D::CommandEncoder,
        handle: PassHandle,
    ) -> Result<()> {
        let execute = std::mem::replace(&mut self.passes[handle.slot()].execute, PassExecute::None);
        let pass = &self.passes[handle.slot()];
        let resources = PassResources::new(pass.name(), &self.resources);

        match execute {
            PassExecute::Graphics(callback) => {
                let targets = render_targets(pass, &self.resources)?;
                let mut render_pass = device.begin_render_pass(encoder, &targets).map_err(
                    |source| RenderGraphError::RenderPassFailed {
                        pass: pass.name().to_string(),
                        source,
                    },
                )?;
                callback(&mut render_pass, &resources);
                drop(render_pass);
            }
            PassExecute::Compute(callback) => callback(encoder, &resources),
            PassExecute::None => {
                return Err(RenderGraphError::MissingCallback {
                    pass: pass.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

fn render_targets<'a, D: RenderDevice>(
    pass: &'a PassRecord<D>,
    resources: &'a [ResourceRecord<D>],
) -> Result<RenderTargets<'a, D>> {
    let mut color_attachments = Vec::with_capacity(pass.color_attachments().len());
    for (slot, attachment) in pass.color_attachments().iter().enumerate() {
        if !attachment.is_present() {
            color_attachments.push(None);
            continue;
        }
        let (texture, view) = bound_texture(resources, attachment.handle)?;
        color_attachments.push(Some(ColorTarget {
            texture,
            view,
            attachment,
            store_op: pass
                .color_store_ops
                .get(slot)
                .copied()
                .unwrap_or(attachment.store_op),
        }));
    }

    let depth_stencil_attachment = match pass.depth_stencil_attachment() {
        Some(attachment) => {
            let (texture, view) = bound_texture(resources, attachment.handle)?;
            let (depth_store_op, stencil_store_op) = pass
                .depth_store_ops
                .unwrap_or((attachment.depth_store_op, attachment.stencil_store_op));
            Some(DepthTarget {
                texture,
                view,
                attachment,
                depth_store_op,
                stencil_store_op,
            })
        }
        None => None,
    };

    Ok(RenderTargets {
        label: pass.name(),
        color_attachments,
        depth_stencil_attachment,
    })
}

fn bound_texture<D: RenderDevice>(
    resources: &[ResourceRecord<D>],
    handle: ResourceHandle,
) -> Result<(&D::Texture, &D::TextureView)> {
    let record = resources
        .get(handle.slot())
        .filter(|record| record.generation() == handle.generation())
        .ok_or_else(|| RenderGraphError::ResourceNotBound {
            resource: format!("resource_{}", handle.index()),
            handle,
        })?;
    match record.gpu() {
        Some(GpuResource::Texture { texture, view, .. }) => Ok((texture, view)),
        Some(GpuResource::Buffer { .. }) => Err(RenderGraphError::TypeMismatch {
            operation: "attachment".to_string(),
            actual_type: "buffer".to_string(),
            resource: record.name().to_string(),
        }),
        None => Err(RenderGraphError::ResourceNotBound {
            resource: record.name().to_string(),
            handle,
        }),
    }
}
