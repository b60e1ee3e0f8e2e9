mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{
    MockDevice, color_texture, init_logging, logging_dispatch, logging_draw, unpooled_graph,
};
use frame_graph::{
    BufferDescriptor, ColorAttachment, PassFlags, RenderGraph, RenderGraphError, ResourceUsage,
    TextureDescriptor,
};
use wgpu::{BufferUsages, TextureFormat, TextureViewDimension};

#[test]
fn transient_is_allocated_and_released_exactly_once() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let t = graph.create_texture("T", color_texture());
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    graph
        .add_graphics_pass("write")
        .set_color_attachment(0, t)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_compute_pass("modify")
        .read_texture(t)
        .write_texture(t)
        .set_compute_execute(logging_dispatch(device.event_log()));
    graph
        .add_graphics_pass("read")
        .read_texture(t)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    let commands = graph.execute(&device).unwrap();
    assert_eq!(commands, vec!["write", "dispatch modify", "read"]);

    assert_eq!(device.count("create_texture T"), 1);
    assert_eq!(device.count("drop_texture T"), 1);
    assert_eq!(device.count("create_view T"), 1);
    assert_eq!(device.count("drop_view T"), 1);

    let created = device.position("create_texture T").unwrap();
    let first_use = device.position("run write").unwrap();
    let last_use = device.position("run read").unwrap();
    let dropped = device.position("drop_texture T").unwrap();
    assert!(created < first_use);
    assert!(last_use < dropped);
}

#[test]
fn culled_transient_is_never_allocated() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let unused = graph.create_texture("unused", color_texture());
    graph
        .add_compute_pass("dead")
        .write_texture(unused)
        .set_compute_execute(logging_dispatch(device.event_log()));
    graph
        .add_compute_pass("alive")
        .set_flags(PassFlags::NEVER_CULL)
        .set_compute_execute(logging_dispatch(device.event_log()));

    graph.execute(&device).unwrap();
    assert_eq!(device.events(), vec!["run alive"]);
}

#[test]
fn imported_resources_are_never_created_or_dropped() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let (texture, view) = device.external_texture("swapchain");
    let swapchain = graph.import_texture("swapchain", texture, view);
    let readback = graph.import_buffer("readback", device.external_buffer("readback"));

    graph
        .add_graphics_pass("present")
        .set_color_attachment(0, swapchain)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_copy_pass("copy_out")
        .read_texture_as(swapchain, ResourceUsage::CopySrc)
        .write_buffer_as(readback, ResourceUsage::CopyDst)
        .set_compute_execute(logging_dispatch(device.event_log()));

    graph.execute(&device).unwrap();
    let events = device.events();
    assert!(events.iter().all(|event| !event.starts_with("create_")));
    assert!(events.iter().all(|event| !event.starts_with("drop_")));
    assert!(events.contains(&"run copy_out".to_string()));
}

#[test]
fn replaced_attachment_is_never_allocated() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let a = graph.create_texture("A", color_texture());
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    let pass = graph
        .add_graphics_pass("P")
        .set_color_attachment(0, a)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()))
        .handle();

    graph.compile().unwrap();
    assert!(!graph.pass(pass).unwrap().writes().iter().any(|access| access.handle == a));
    assert_eq!(graph.resource(a).unwrap().ref_count(), 0);

    graph.execute(&device).unwrap();
    assert_eq!(
        device.events(),
        vec!["begin_pass P", "color P 0 out store", "run P", "end_pass P"]
    );
}

#[test]
fn successive_writers_of_transient_target_run_in_declaration_order() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let t = graph.create_texture("T", color_texture());

    for name in ["first", "second"] {
        graph
            .add_graphics_pass(name)
            .set_color_attachment(
                0,
                ColorAttachment::new(t).with_clear_color(wgpu::Color::BLACK),
            )
            .set_execute(logging_draw(device.event_log()));
    }

    let commands = graph.execute(&device).unwrap();
    assert_eq!(commands, vec!["first", "second"]);
    assert_eq!(device.count("create_texture T"), 1);
    assert_eq!(device.count("drop_texture T"), 1);
    let end_first = device.position("end_pass first").unwrap();
    assert!(end_first < device.position("begin_pass second").unwrap());
    assert!(device.position("run second").unwrap() < device.position("drop_texture T").unwrap());
}

#[test]
fn transient_views_follow_texture_layout() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = RenderGraph::new();
    let environment = graph.create_texture(
        "environment",
        TextureDescriptor::new_2d(TextureFormat::Rgba16Float, 64, 64).cube_map(),
    );
    graph
        .add_compute_pass("filter")
        .write_texture(environment)
        .set_flags(PassFlags::NEVER_CULL)
        .set_compute_execute(logging_dispatch(device.event_log()));
    graph.execute(&device).unwrap();

    // Same storage as the pooled cube, viewed as a plain array.
    let layers = graph.create_texture(
        "layers",
        TextureDescriptor::new_2d(TextureFormat::Rgba16Float, 64, 64).array_layers(6),
    );
    graph
        .add_compute_pass("fill")
        .write_texture(layers)
        .set_flags(PassFlags::NEVER_CULL)
        .set_compute_execute(logging_dispatch(device.event_log()));
    graph.execute(&device).unwrap();

    assert_eq!(device.count("create_texture environment"), 1);
    assert_eq!(device.count("create_texture layers"), 0);
    assert_eq!(
        device.view_dimensions(),
        vec![TextureViewDimension::Cube, TextureViewDimension::D2Array]
    );
}

#[test]
fn render_pass_ends_before_next_pass_begins() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    for name in ["opaque", "transparent"] {
        graph
            .add_graphics_pass(name)
            .set_color_attachment(0, out)
            .set_execute(logging_draw(device.event_log()));
    }

    graph.execute(&device).unwrap();
    let end_opaque = device.position("end_pass opaque").unwrap();
    let begin_transparent = device.position("begin_pass transparent").unwrap();
    assert!(device.position("run opaque").unwrap() < end_opaque);
    assert!(end_opaque < begin_transparent);
}

#[test]
fn allocation_failure_aborts_frame() {
    init_logging();
    let device = MockDevice::new();
    device.fail_on("bloom");
    let mut graph = RenderGraph::new();
    let hdr = graph.create_texture("hdr", color_texture());
    let bloom = graph.create_texture("bloom", color_texture());
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    graph
        .add_graphics_pass("scene")
        .set_color_attachment(0, hdr)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_compute_pass("bloom_pass")
        .read_texture(hdr)
        .write_texture(bloom)
        .set_compute_execute(logging_dispatch(device.event_log()));
    graph
        .add_graphics_pass("composite")
        .read_texture(hdr)
        .read_texture(bloom)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    let error = graph.execute(&device).unwrap_err();
    assert!(matches!(
        error,
        RenderGraphError::AllocationFailed { ref resource, .. } if resource == "bloom"
    ));

    let events = device.events();
    assert!(events.contains(&"run scene".to_string()));
    assert!(!events.contains(&"run bloom_pass".to_string()));
    assert!(!events.contains(&"run composite".to_string()));
    assert_eq!(device.count("create_texture hdr"), device.count("drop_texture hdr"));
    assert_eq!(graph.pooled_object_count(), 0);
    assert_eq!(graph.pass_count(), 0);
    assert!(graph.resource(hdr).is_none());
}

#[test]
fn render_pass_failure_is_reported() {
    init_logging();
    let device = MockDevice::new();
    device.fail_on("broken");
    let mut graph = unpooled_graph();
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    graph
        .add_graphics_pass("broken")
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    let error = graph.execute(&device).unwrap_err();
    assert!(matches!(
        error,
        RenderGraphError::RenderPassFailed { ref pass, .. } if pass == "broken"
    ));
    assert!(!device.events().contains(&"run broken".to_string()));
}

#[test]
fn pool_reuses_objects_with_disjoint_lifetimes() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = RenderGraph::new();
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);
    let ping = graph.create_texture("ping", color_texture());
    let pong = graph.create_texture("pong", color_texture());
    let final_color = graph.create_texture("final", color_texture());

    graph
        .add_graphics_pass("a")
        .set_color_attachment(0, ping)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_graphics_pass("b")
        .read_texture(ping)
        .set_color_attachment(0, pong)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_graphics_pass("c")
        .read_texture(pong)
        .set_color_attachment(0, final_color)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_graphics_pass("d")
        .read_texture(final_color)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    graph.execute(&device).unwrap();
    // `final` is allocated after `ping` was released and takes its texture.
    assert_eq!(device.count("create_texture ping"), 1);
    assert_eq!(device.count("create_texture pong"), 1);
    assert_eq!(device.count("create_texture final"), 0);
    assert_eq!(device.count("create_view ping"), 2);
    assert_eq!(graph.pooled_object_count(), 2);

    device.clear_events();
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);
    let next = graph.create_texture("next", color_texture());
    graph
        .add_graphics_pass("e")
        .set_color_attachment(0, next)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_graphics_pass("f")
        .read_texture(next)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    graph.execute(&device).unwrap();
    assert!(device.events().iter().all(|event| !event.starts_with("create_texture")));

    graph.trim_pool();
    assert_eq!(graph.pooled_object_count(), 0);
    assert_eq!(device.count("drop_texture ping"), 1);
    assert_eq!(device.count("drop_texture pong"), 1);
}

#[test]
fn unread_transient_store_is_discarded() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let color = graph.create_texture("color", color_texture());
    let velocity = graph.create_texture("velocity", color_texture());
    let depth = graph.create_texture(
        "depth",
        TextureDescriptor::new_2d(TextureFormat::Depth32Float, 64, 64),
    );
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    graph
        .add_graphics_pass("gbuffer")
        .set_color_attachment(0, color)
        .set_color_attachment(1, velocity)
        .set_depth_attachment(depth)
        .set_execute(logging_draw(device.event_log()));
    graph
        .add_graphics_pass("resolve")
        .read_texture(color)
        .set_color_attachment(0, out)
        .set_execute(logging_draw(device.event_log()));

    graph.execute(&device).unwrap();
    let events = device.events();
    assert!(events.contains(&"color gbuffer 0 color store".to_string()));
    assert!(events.contains(&"color gbuffer 1 velocity discard".to_string()));
    assert!(events.contains(&"depth gbuffer depth discard".to_string()));
    assert!(events.contains(&"color resolve 0 out store".to_string()));
}

#[test]
fn store_elision_can_be_disabled() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = RenderGraph::with_config(frame_graph::RenderGraphConfig {
        elide_stores: false,
        ..Default::default()
    });
    let scratch = graph.create_texture("scratch", color_texture());
    graph
        .add_graphics_pass("debug")
        .set_color_attachment(0, scratch)
        .set_flags(PassFlags::NEVER_CULL)
        .set_execute(logging_draw(device.event_log()));

    graph.execute(&device).unwrap();
    assert!(device.events().contains(&"color debug 0 scratch store".to_string()));
}

#[test]
fn callbacks_resolve_bound_resources() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let lights = graph.create_buffer("lights", BufferDescriptor::new(512, BufferUsages::STORAGE));
    let shadow = graph.create_texture(
        "shadow",
        TextureDescriptor::new_2d(TextureFormat::Depth32Float, 256, 128),
    );
    let (texture, view) = device.external_texture("out");
    let out = graph.import_texture("out", texture, view);

    let seen: Rc<RefCell<Vec<String>>> = Rc::default();

    let log = Rc::clone(&seen);
    graph
        .add_compute_pass("cull_lights")
        .write_buffer(lights)
        .set_compute_execute(move |_, resources| {
            let mut log = log.borrow_mut();
            log.push(format!("buffer {}", resources.buffer(lights).unwrap().label));
            log.push(format!("shadow bound {}", resources.texture(shadow).is_ok()));
        });
    graph
        .add_graphics_pass("shadow_map")
        .set_depth_attachment(shadow)
        .set_execute(|_, _| {});

    let log = Rc::clone(&seen);
    graph
        .add_graphics_pass("shade")
        .read_buffer(lights)
        .read_texture(shadow)
        .set_color_attachment(0, out)
        .set_execute(move |render_pass, resources| {
            render_pass.draw("fullscreen");
            let mut log = log.borrow_mut();
            log.push(format!("size {:?}", resources.texture_size(shadow).unwrap()));
            log.push(format!(
                "usage {:?}",
                resources.record(shadow).unwrap().current_usage()
            ));
            log.push(format!(
                "view {}",
                resources.texture_view(shadow).unwrap().label
            ));
            log.push(format!(
                "wrong kind {}",
                matches!(
                    resources.texture(lights),
                    Err(RenderGraphError::TypeMismatch { .. })
                )
            ));
        });

    graph.execute(&device).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            "buffer lights",
            "shadow bound false",
            "size (256, 128)",
            "usage ShaderRead",
            "view shadow",
            "wrong kind true",
        ]
    );
    assert!(device.events().contains(&"draw shade fullscreen".to_string()));
}

#[test]
fn handles_from_previous_frame_do_not_resolve_in_callbacks() {
    init_logging();
    let device = MockDevice::new();
    let mut graph = unpooled_graph();
    let old = graph.create_texture("old", color_texture());
    graph.reset();

    let result = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&result);
    graph
        .add_compute_pass("late_lookup")
        .set_flags(PassFlags::NEVER_CULL)
        .set_compute_execute(move |_, resources| {
            *slot.borrow_mut() = Some(matches!(
                resources.texture(old),
                Err(RenderGraphError::ResourceNotBound { .. })
            ));
        });

    graph.execute(&device).unwrap();
    assert_eq!(*result.borrow(), Some(true));
}
