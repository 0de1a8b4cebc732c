//! Integration tests for the frame loop on the headless backend.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flipchain_core::{Config, LogSink, ManualClock, MemorySink};
use flipchain_platform::{KeyCode, PlatformEvent, SizeMode};
use flipchain_renderer::{
    EventSource, Flow, FrameCallbacks, FrameDriver, FrameStats, FrameTime,
};
use flipchain_rhi::backend::headless::{
    DESCRIPTOR_INCREMENT, Headless, HeadlessConfig, HeadlessGpu, RecordedCommand, TraceEvent,
};
use flipchain_rhi::{
    CommandRecorder, ContextDesc, DeviceContext, DiagnosticCategory, DiagnosticMessage,
    DiagnosticSeverity, Rect, ResourceState, RhiError, Viewport, WindowTarget,
};

const CLEAR: [f32; 4] = [0.1, 0.2, 0.3, 1.0];

#[derive(Default)]
struct Recording {
    updates: Vec<FrameTime>,
    titles: Vec<String>,
    keys: Vec<KeyCode>,
}

impl FrameCallbacks<Headless> for Recording {
    fn update(&mut self, time: FrameTime) {
        self.updates.push(time);
    }

    fn draw(&mut self, recorder: &mut CommandRecorder<'_, Headless>, _time: FrameTime) {
        recorder.insert_marker("draw");
    }

    fn key_up(&mut self, key: KeyCode) {
        self.keys.push(key);
    }

    fn title_changed(&mut self, title: &str, _stats: &FrameStats) {
        self.titles.push(title.to_string());
    }
}

/// Scripted events: `None` lets one frame render. Quits when exhausted.
struct Script(VecDeque<Option<PlatformEvent>>);

impl EventSource for Script {
    fn poll(&mut self) -> Option<PlatformEvent> {
        self.0.pop_front().unwrap_or(Some(PlatformEvent::Quit))
    }
}

struct Harness {
    gpu: HeadlessGpu,
    clock: ManualClock,
    sink: Arc<MemorySink>,
    driver: FrameDriver<Headless, Recording, ManualClock>,
}

fn config(buffer_count: u32) -> Config {
    Config {
        width: 1280,
        height: 720,
        back_buffer_count: buffer_count,
        paused_sleep: Duration::from_millis(1),
        clear_color: CLEAR,
        ..Config::default()
    }
}

fn harness_with(gpu_config: HeadlessConfig, buffer_count: u32) -> Harness {
    let gpu = HeadlessGpu::new(gpu_config);
    let sink = Arc::new(MemorySink::new());
    let log: Arc<dyn LogSink> = sink.clone();
    let context = DeviceContext::<Headless>::select_and_create(
        gpu.instance(),
        ContextDesc {
            enable_validation: true,
            ..ContextDesc::default()
        },
        &*log,
    )
    .unwrap();

    let clock = ManualClock::new();
    let driver = FrameDriver::with_clock(
        context,
        &WindowTarget::Offscreen,
        &config(buffer_count),
        Recording::default(),
        log,
        clock.clone(),
    )
    .unwrap();

    Harness {
        gpu,
        clock,
        sink,
        driver,
    }
}

fn harness(buffer_count: u32) -> Harness {
    harness_with(HeadlessConfig::default(), buffer_count)
}

fn size(width: u32, height: u32, mode: SizeMode) -> PlatformEvent {
    PlatformEvent::Size {
        width,
        height,
        mode,
    }
}

#[test]
fn test_back_buffer_views_are_distinct_and_evenly_spaced() {
    for buffer_count in 2..=4 {
        let h = harness(buffer_count);
        let surface = h.driver.surface();
        let start = surface.render_target_heap().start();

        let handles: Vec<_> = (0..buffer_count).map(|i| surface.back_buffer_view(i)).collect();
        for (index, handle) in handles.iter().enumerate() {
            assert_eq!(handle.ptr, start + index * DESCRIPTOR_INCREMENT);
        }
        assert_eq!(
            handles.iter().map(|h| h.ptr).collect::<HashSet<_>>().len(),
            buffer_count as usize
        );
        assert_eq!(surface.current_back_buffer_view(), handles[0]);
    }
}

#[test]
fn test_two_presents_visit_indices_zero_one_zero() {
    let mut h = harness(2);
    let mut observed = vec![h.driver.surface().current_index()];

    for _ in 0..2 {
        h.driver.run_iteration().unwrap();
        observed.push(h.driver.surface().current_index());
    }

    assert_eq!(observed, vec![0, 1, 0]);
    assert_eq!(h.gpu.presented_indices(), vec![0, 1]);
    assert!(h.gpu.resize_calls().is_empty());
}

#[test]
fn test_index_after_k_presents_is_k_mod_n() {
    for buffer_count in 2..=4u32 {
        let mut h = harness(buffer_count);
        for k in 1..=10u32 {
            h.driver.run_iteration().unwrap();
            assert_eq!(h.driver.surface().current_index(), k % buffer_count);
        }
    }
}

#[test]
fn test_resize_recreates_every_view() {
    let mut h = harness(2);
    let surface = h.driver.surface();

    let old_rtvs: Vec<_> = (0..2).map(|i| surface.back_buffer_view(i)).collect();
    let old_dsv = surface.depth_stencil_view();
    let old_view_ids: HashSet<u64> = old_rtvs
        .iter()
        .map(|handle| surface.resolve_render_target(*handle).unwrap().id())
        .chain(std::iter::once(
            surface.resolve_depth_stencil(old_dsv).unwrap().id(),
        ))
        .collect();

    h.driver
        .handle_event(size(800, 600, SizeMode::Restored))
        .unwrap();
    let surface = h.driver.surface();

    assert_eq!(h.gpu.resize_calls(), vec![(800, 600)]);
    assert_eq!(surface.size(), (800, 600));
    assert_eq!(surface.current_index(), 0);

    for handle in &old_rtvs {
        assert!(surface.resolve_render_target(*handle).is_none());
    }
    assert!(surface.resolve_depth_stencil(old_dsv).is_none());

    let new_rtv = surface.current_back_buffer_view();
    let new_dsv = surface.depth_stencil_view();
    assert!(!old_rtvs.contains(&new_rtv));
    assert_ne!(new_dsv, old_dsv);

    let new_view_ids: HashSet<u64> = (0..2)
        .map(|i| {
            surface
                .resolve_render_target(surface.back_buffer_view(i))
                .unwrap()
                .id()
        })
        .chain(std::iter::once(
            surface.resolve_depth_stencil(new_dsv).unwrap().id(),
        ))
        .collect();
    assert!(old_view_ids.is_disjoint(&new_view_ids));

    assert_eq!(surface.depth_buffer().unwrap().size(), (800, 600));
    assert_eq!(surface.viewport(), Viewport::from_size(800, 600));
    assert_eq!(surface.scissor(), Rect::from_size(800, 600));

    h.gpu.clear_trace();
    h.driver.run_iteration().unwrap();
    let lists = h.gpu.executed_lists();
    assert_eq!(lists.len(), 1);
    assert!(lists[0].contains(&RecordedCommand::Viewport(Viewport::from_size(800, 600))));
    assert!(lists[0].contains(&RecordedCommand::Scissor(Rect::from_size(800, 600))));
}

#[test]
fn test_out_of_date_swap_chain_is_recreated_before_rendering() {
    let mut h = harness(2);
    h.driver.run_iteration().unwrap();
    assert_eq!(h.driver.surface().current_index(), 1);

    h.gpu.mark_out_of_date();
    h.driver.run_iteration().unwrap();

    assert_eq!(h.gpu.resize_calls(), vec![(1280, 720)]);
    assert!(!h.driver.surface().is_out_of_date());
    // The recreated chain starts over at buffer 0.
    assert_eq!(h.gpu.presented_indices(), vec![0, 0]);
    assert_eq!(h.driver.frames_rendered(), 2);
}

#[test]
fn test_resize_resets_index_to_zero() {
    let mut h = harness(3);
    h.driver.run_iteration().unwrap();
    assert_eq!(h.driver.surface().current_index(), 1);

    h.driver
        .handle_event(size(640, 480, SizeMode::Maximized))
        .unwrap();
    assert_eq!(h.driver.surface().current_index(), 0);

    h.driver.run_iteration().unwrap();
    assert_eq!(h.gpu.presented_indices(), vec![0, 0]);
}

#[test]
fn test_repeated_wait_does_not_block_again() {
    let mut h = harness_with(
        HeadlessConfig {
            signal_latency: Some(Duration::from_millis(5)),
            ..HeadlessConfig::default()
        },
        2,
    );
    h.driver.run_iteration().unwrap();

    let fence = h.driver.commands().fence();
    let value = fence.target_value();
    let waits = h.gpu.blocking_waits();

    fence.wait_until(value).unwrap();
    fence.wait_until(value).unwrap();
    assert_eq!(h.gpu.blocking_waits(), waits);
}

#[test]
fn test_drag_resizes_once_on_exit() {
    let mut h = harness(2);

    h.driver.handle_event(PlatformEvent::EnterSizeMove).unwrap();
    assert!(h.driver.timer().is_stopped());
    for width in [900, 1000, 1100] {
        h.driver
            .handle_event(size(width, 700, SizeMode::Restored))
            .unwrap();
    }
    assert!(h.gpu.resize_calls().is_empty());

    h.driver.handle_event(PlatformEvent::ExitSizeMove).unwrap();
    assert_eq!(h.gpu.resize_calls(), vec![(1100, 700)]);
    assert!(!h.driver.timer().is_stopped());
    assert!(!h.driver.state().paused);
}

#[test]
fn test_minimize_then_restore() {
    let mut h = harness(2);
    h.driver.run_iteration().unwrap();
    let index = h.driver.surface().current_index();

    h.driver.handle_event(size(0, 0, SizeMode::Minimized)).unwrap();
    assert_eq!(h.driver.surface().current_index(), index);
    assert!(h.gpu.resize_calls().is_empty());

    // Paused: iterations sleep instead of rendering.
    h.driver.run_iteration().unwrap();
    assert_eq!(h.gpu.presented_indices().len(), 1);

    h.driver
        .handle_event(size(1280, 720, SizeMode::Restored))
        .unwrap();
    assert_eq!(h.gpu.resize_calls(), vec![(1280, 720)]);
    assert_eq!(h.driver.client_size(), (1280, 720));
}

#[test]
fn test_deactivation_pauses_rendering_and_timer() {
    let mut h = harness(2);

    h.driver.handle_event(PlatformEvent::Activate(false)).unwrap();
    assert!(h.driver.timer().is_stopped());
    h.driver.run_iteration().unwrap();
    assert!(h.gpu.presented_indices().is_empty());

    h.driver.handle_event(PlatformEvent::Activate(true)).unwrap();
    h.driver.run_iteration().unwrap();
    assert_eq!(h.gpu.presented_indices(), vec![0]);
    assert!(!h.sink.contains("[WARNING]"));
}

#[test]
fn test_signal_values_increase_by_one() {
    let mut h = harness(2);
    for _ in 0..3 {
        h.driver.run_iteration().unwrap();
    }

    let signals: Vec<u64> = h
        .gpu
        .trace()
        .into_iter()
        .filter_map(|event| match event {
            TraceEvent::Signal(value) => Some(value),
            _ => None,
        })
        .collect();
    let expected: Vec<u64> = (1..=signals.len() as u64).collect();
    assert_eq!(signals, expected);
}

#[test]
fn test_frame_records_transitions_around_draw() {
    let mut h = harness(2);
    h.gpu.clear_trace();
    h.driver.run_iteration().unwrap();

    let surface = h.driver.surface();
    let back_buffer = surface
        .resolve_render_target(surface.back_buffer_view(0))
        .unwrap()
        .resource()
        .id();
    let depth = surface.depth_buffer().unwrap().resource().id();
    let rtv = surface
        .resolve_render_target(surface.back_buffer_view(0))
        .unwrap()
        .id();
    let dsv = surface
        .resolve_depth_stencil(surface.depth_stencil_view())
        .unwrap()
        .id();

    let lists = h.gpu.executed_lists();
    assert_eq!(lists.len(), 1);
    assert_eq!(
        lists[0],
        vec![
            RecordedCommand::Barrier {
                resource: back_buffer,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            },
            RecordedCommand::Viewport(surface.viewport()),
            RecordedCommand::Scissor(surface.scissor()),
            RecordedCommand::ClearRenderTarget {
                view: rtv,
                resource: back_buffer,
                color: CLEAR,
            },
            RecordedCommand::ClearDepthStencil {
                view: dsv,
                resource: depth,
                depth: 1.0,
                stencil: 0,
            },
            RecordedCommand::Marker("draw".to_string()),
            RecordedCommand::Barrier {
                resource: back_buffer,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            },
        ]
    );

    // Execute, signal, present, then the drain signal.
    let trace = h.gpu.trace();
    assert!(matches!(trace[0], TraceEvent::AllocatorReset));
    assert!(matches!(trace[1], TraceEvent::Execute(_)));
    assert!(matches!(trace[2], TraceEvent::Signal(_)));
    assert_eq!(trace[3], TraceEvent::Present { index: 0 });
    assert!(matches!(trace[4], TraceEvent::Signal(_)));
    assert!(h.driver.commands().is_idle().unwrap());
}

#[test]
fn test_fatal_diagnostic_stops_before_submission() {
    let mut h = harness(2);
    h.driver.run_iteration().unwrap();
    let executed = h.gpu.executed_lists().len();

    let gpu = h.gpu.clone();
    thread::spawn(move || {
        gpu.push_diagnostic(DiagnosticMessage::new(
            DiagnosticCategory::Execution,
            DiagnosticSeverity::Error,
            "descriptor heap overrun",
        ));
        gpu.push_diagnostic(DiagnosticMessage::new(
            DiagnosticCategory::Cleanup,
            DiagnosticSeverity::Corruption,
            "object freed twice",
        ));
    })
    .join()
    .unwrap();

    match h.driver.run_iteration() {
        Err(RhiError::DiagnosticFatal(message)) => {
            assert_eq!(
                message,
                "GPU Error: descriptor heap overrun\nGPU Corruption: object freed twice"
            );
        }
        other => panic!("expected DiagnosticFatal, got {:?}", other),
    }
    assert_eq!(h.gpu.executed_lists().len(), executed);
    assert!(h.sink.contains("GPU Error: descriptor heap overrun"));
}

#[test]
fn test_fatal_diagnostic_raised_on_event_dispatch() {
    let mut h = harness(2);
    h.gpu.push_diagnostic(DiagnosticMessage::new(
        DiagnosticCategory::Compilation,
        DiagnosticSeverity::Error,
        "bad shader",
    ));

    let result = h.driver.handle_event(size(800, 600, SizeMode::Restored));
    assert!(matches!(result, Err(RhiError::DiagnosticFatal(_))));
    assert!(h.gpu.resize_calls().is_empty());
}

#[test]
fn test_informational_diagnostics_are_not_fatal() {
    let mut h = harness(2);
    h.gpu.push_diagnostic(DiagnosticMessage::new(
        DiagnosticCategory::Execution,
        DiagnosticSeverity::Warning,
        "slow path",
    ));
    h.driver.run_iteration().unwrap();
}

#[test]
fn test_run_until_escape() {
    let mut h = harness(2);
    let mut script = Script(VecDeque::from([
        None,
        Some(PlatformEvent::Activate(true)),
        None,
        Some(PlatformEvent::KeyUp(KeyCode::Escape)),
        None,
    ]));

    h.driver.run(&mut script).unwrap();

    assert_eq!(h.gpu.presented_indices(), vec![0, 1]);
    assert_eq!(h.driver.callbacks().keys, vec![KeyCode::Escape]);
    assert!(h.driver.commands().is_idle().unwrap());
    // The event after Escape was never consumed.
    assert_eq!(script.0.len(), 1);
}

#[test]
fn test_quit_event_ends_run() {
    let mut h = harness(2);
    let mut script = Script(VecDeque::from([None, None, None]));

    h.driver.run(&mut script).unwrap();
    assert_eq!(h.driver.frames_rendered(), 3);
    assert_eq!(
        h.driver.handle_event(PlatformEvent::Quit).unwrap(),
        Flow::Quit
    );
}

#[test]
fn test_title_reports_frame_rate_each_second() {
    let mut h = harness(2);

    for _ in 0..4 {
        h.clock.advance(Duration::from_millis(250));
        h.driver.run_iteration().unwrap();
    }

    assert_eq!(
        h.driver.callbacks().titles,
        vec!["flipchain | FPS: 4 Frametime: 250.00".to_string()]
    );
    let updates = &h.driver.callbacks().updates;
    assert_eq!(updates.len(), 4);
    assert!((updates[0].delta - 0.25).abs() < 1e-6);
    assert!((updates[3].total - 1.0).abs() < 1e-6);
}

#[test]
fn test_paused_time_is_excluded_from_total() {
    let mut h = harness(2);

    h.clock.advance(Duration::from_millis(500));
    h.driver.run_iteration().unwrap();

    h.driver.handle_event(PlatformEvent::Activate(false)).unwrap();
    h.clock.advance(Duration::from_secs(10));
    h.driver.run_iteration().unwrap();
    h.driver.handle_event(PlatformEvent::Activate(true)).unwrap();

    h.clock.advance(Duration::from_millis(500));
    h.driver.run_iteration().unwrap();

    let updates = &h.driver.callbacks().updates;
    assert_eq!(updates.len(), 2);
    assert!((updates[1].total - 1.0).abs() < 1e-6);
    assert!((updates[1].delta - 0.5).abs() < 1e-6);
}

#[test]
fn test_missing_multisample_support_fails_startup() {
    let gpu = HeadlessGpu::new(HeadlessConfig {
        msaa_quality_levels: 0,
        ..HeadlessConfig::default()
    });
    let sink: Arc<dyn LogSink> = Arc::new(MemorySink::new());
    let context =
        DeviceContext::<Headless>::select_and_create(gpu.instance(), ContextDesc::default(), &*sink)
            .unwrap();

    let result = FrameDriver::new(
        context,
        &WindowTarget::Offscreen,
        &config(2),
        Recording::default(),
        sink,
    );
    assert!(matches!(result, Err(RhiError::FeatureUnsupported(_))));
}

#[test]
fn test_rejected_resize_is_fatal() {
    let mut h = harness(2);
    h.gpu.reject_next_resize();

    let result = h.driver.handle_event(size(800, 600, SizeMode::Maximized));
    match result {
        Err(err @ RhiError::ResizeRejected(_)) => assert!(err.is_fatal()),
        other => panic!("expected ResizeRejected, got {:?}", other),
    }
}

#[test]
fn test_drop_drains_outstanding_work() {
    let h = harness_with(
        HeadlessConfig {
            signal_latency: Some(Duration::from_millis(20)),
            ..HeadlessConfig::default()
        },
        2,
    );
    let gpu = h.gpu.clone();
    let signals_before = gpu
        .trace()
        .iter()
        .filter(|event| matches!(event, TraceEvent::Signal(_)))
        .count();

    drop(h);

    let signals_after = gpu
        .trace()
        .iter()
        .filter(|event| matches!(event, TraceEvent::Signal(_)))
        .count();
    assert_eq!(signals_after, signals_before + 1);
}
