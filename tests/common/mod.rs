#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use frame_graph::{
    BufferDescriptor, DeviceError, RenderDevice, RenderGraph, RenderTargets, StoreOp,
    TextureDescriptor,
};
use wgpu::TextureViewDimension;

pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// GPU object that reports its destruction to the event log.
pub struct MockObject {
    kind: &'static str,
    pub label: String,
    external: bool,
    events: EventLog,
}

impl Drop for MockObject {
    fn drop(&mut self) {
        if !self.external {
            self.events
                .borrow_mut()
                .push(format!("drop_{} {}", self.kind, self.label));
        }
    }
}

pub struct MockRenderPass {
    label: String,
    events: EventLog,
}

impl MockRenderPass {
    pub fn draw(&mut self, what: &str) {
        self.events
            .borrow_mut()
            .push(format!("draw {} {what}", self.label));
    }
}

impl Drop for MockRenderPass {
    fn drop(&mut self) {
        self.events
            .borrow_mut()
            .push(format!("end_pass {}", self.label));
    }
}

/// Device that records every call as a line in a shared event log.
#[derive(Default)]
pub struct MockDevice {
    events: EventLog,
    failing: RefCell<HashSet<String>>,
    view_dimensions: RefCell<Vec<TextureViewDimension>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every creation or render pass labelled `label` fail.
    pub fn fail_on(&self, label: &str) {
        self.failing.borrow_mut().insert(label.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn event_log(&self) -> EventLog {
        Rc::clone(&self.events)
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.borrow().iter().filter(|line| *line == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|line| line == event)
    }

    /// Dimension of every view created so far, in creation order.
    pub fn view_dimensions(&self) -> Vec<TextureViewDimension> {
        self.view_dimensions.borrow().clone()
    }

    /// Caller-owned texture and view, as handed to `import_texture`.
    pub fn external_texture(&self, label: &str) -> (MockObject, MockObject) {
        (
            self.object("texture", label, true),
            self.object("view", label, true),
        )
    }

    pub fn external_buffer(&self, label: &str) -> MockObject {
        self.object("buffer", label, true)
    }

    fn object(&self, kind: &'static str, label: &str, external: bool) -> MockObject {
        MockObject {
            kind,
            label: label.to_string(),
            external,
            events: Rc::clone(&self.events),
        }
    }

    fn create(&self, kind: &'static str, label: &str) -> Result<MockObject, DeviceError> {
        if self.failing.borrow().contains(label) {
            self.events
                .borrow_mut()
                .push(format!("fail_{kind} {label}"));
            return Err(DeviceError::OutOfMemory {
                label: label.to_string(),
            });
        }
        self.events
            .borrow_mut()
            .push(format!("create_{kind} {label}"));
        Ok(self.object(kind, label, false))
    }
}

impl RenderDevice for MockDevice {
    type Texture = MockObject;
    type TextureView = MockObject;
    type Buffer = MockObject;
    type CommandEncoder = Vec<String>;
    type RenderPass = MockRenderPass;
    type CommandBuffer = Vec<String>;

    fn create_texture(
        &self,
        label: &str,
        _descriptor: &TextureDescriptor,
    ) -> Result<MockObject, DeviceError> {
        self.create("texture", label)
    }

    fn create_texture_view(
        &self,
        texture: &MockObject,
        descriptor: &TextureDescriptor,
    ) -> Result<MockObject, DeviceError> {
        let view = self.create("view", &texture.label)?;
        self.view_dimensions
            .borrow_mut()
            .push(descriptor.view_dimension());
        Ok(view)
    }

    fn create_buffer(
        &self,
        label: &str,
        _descriptor: &BufferDescriptor,
    ) -> Result<MockObject, DeviceError> {
        self.create("buffer", label)
    }

    fn create_command_encoder(&self, _label: &str) -> Vec<String> {
        Vec::new()
    }

    fn begin_render_pass(
        &self,
        encoder: &mut Vec<String>,
        targets: &RenderTargets<'_, Self>,
    ) -> Result<MockRenderPass, DeviceError> {
        if self.failing.borrow().contains(targets.label) {
            return Err(DeviceError::Backend {
                label: targets.label.to_string(),
                message: "render pass rejected".to_string(),
            });
        }

        let mut events = self.events.borrow_mut();
        events.push(format!("begin_pass {}", targets.label));
        for (slot, target) in targets.color_attachments.iter().enumerate() {
            if let Some(target) = target {
                events.push(format!(
                    "color {} {slot} {} {}",
                    targets.label,
                    target.texture.label,
                    store_name(target.store_op)
                ));
            }
        }
        if let Some(target) = &targets.depth_stencil_attachment {
            events.push(format!(
                "depth {} {} {}",
                targets.label,
                target.texture.label,
                store_name(target.depth_store_op)
            ));
        }
        encoder.push(targets.label.to_string());

        Ok(MockRenderPass {
            label: targets.label.to_string(),
            events: Rc::clone(&self.events),
        })
    }

    fn finish(&self, encoder: Vec<String>) -> Vec<String> {
        encoder
    }
}

fn store_name(store_op: StoreOp) -> &'static str {
    match store_op {
        StoreOp::Store => "store",
        StoreOp::Discard => "discard",
    }
}

/// Graph without transient aliasing, so every release is an actual drop.
pub fn unpooled_graph() -> RenderGraph<MockDevice> {
    RenderGraph::with_config(frame_graph::RenderGraphConfig {
        alias_transients: false,
        ..Default::default()
    })
}

pub fn color_texture() -> TextureDescriptor {
    TextureDescriptor::new_2d(wgpu::TextureFormat::Rgba8Unorm, 64, 64)
}

/// Graphics callback that logs `run <pass>`.
pub fn logging_draw(
    events: EventLog,
) -> impl FnOnce(&mut MockRenderPass, &frame_graph::PassResources<'_, MockDevice>) + 'static {
    move |_, resources| {
        events
            .borrow_mut()
            .push(format!("run {}", resources.pass_name()));
    }
}

/// Compute callback that logs `run <pass>`.
pub fn logging_dispatch(
    events: EventLog,
) -> impl FnOnce(&mut Vec<String>, &frame_graph::PassResources<'_, MockDevice>) + 'static {
    move |encoder, resources| {
        encoder.push(format!("dispatch {}", resources.pass_name()));
        events
            .borrow_mut()
            .push(format!("run {}", resources.pass_name()));
    }
}
