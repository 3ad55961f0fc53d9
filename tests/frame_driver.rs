mod common;

use common::{test_config, Host, MockDevice, TestKernel};
use glam::{Vec3, Vec4};
use ray_tracing_lib::config::TracerConfig;
use ray_tracing_lib::error::RenderError;
use ray_tracing_lib::frame::{DriverState, FrameDriver, FrameOutcome, SkipReason};
use ray_tracing_lib::gpu::Extent;
use ray_tracing_lib::util::dispatch::DispatchGrid;

fn started(config: &TracerConfig) -> (MockDevice, FrameDriver<MockDevice>) {
    let mut device = MockDevice::default();
    let mut driver = FrameDriver::new(config);
    driver.init(&mut device).unwrap();
    (device, driver)
}

fn rendered(outcome: FrameOutcome) -> u32 {
    match outcome {
        FrameOutcome::Rendered { sample_index } => sample_index,
        other => panic!("expected a rendered frame, got {other:?}"),
    }
}

fn render_frames(
    driver: &mut FrameDriver<MockDevice>,
    device: &mut MockDevice,
    kernel: &mut TestKernel,
    host: &mut Host,
    frames: usize,
) -> Vec<u32> {
    (0..frames)
        .map(|_| rendered(driver.on_frame(device, kernel, &mut host.context()).unwrap()))
        .collect()
}

#[test]
fn sample_index_increases_while_nothing_moves() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 6);

    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(driver.sample_index(), 6);
    assert_eq!(driver.state(), DriverState::Accumulating { sample_index: 6 });
    assert_eq!(host.surface.frame_count(), 6);
    assert_eq!(device.targets_allocated, 1);
    let dispatched: Vec<u32> = kernel.dispatches.iter().map(|d| d.params.sample_index).collect();
    assert_eq!(dispatched, indices);
}

#[test]
fn camera_change_restarts_accumulation_once() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 4);

    host.camera.modify(|camera| camera.eye += Vec3::X);
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);

    assert_eq!(indices, vec![0, 1, 2]);
    // the target survives a reset
    assert_eq!(device.targets_allocated, 1);
}

#[test]
fn moving_and_restoring_in_one_frame_still_restarts() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);

    let original = host.camera.get().clone();
    host.camera.modify(|camera| camera.eye += Vec3::Y);
    host.camera.set(original);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn light_change_restarts_accumulation() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 5);

    let rotated = host.light.get().rotated_y(0.1);
    host.light.set(rotated);
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);

    assert_eq!(indices, vec![0, 1]);
    assert_eq!(kernel.last().params.directional_light, rotated.as_vec4());
}

#[test]
fn simultaneous_camera_and_light_change_resets_once() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);

    host.camera.modify(|camera| camera.eye += Vec3::Z);
    let rotated = host.light.get().rotated_y(-0.2);
    host.light.set(rotated);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(!host.camera.is_changed());
    assert!(!host.light.is_changed());
}

#[test]
fn resize_reallocates_and_restarts() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 4);
    let first_target = kernel.last().target_id;

    host.width = 32;
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);

    assert_eq!(indices, vec![0, 1]);
    assert_eq!(device.targets_allocated, 2);
    assert_eq!(device.targets_released, 1);
    assert_ne!(kernel.last().target_id, first_target);
    assert_eq!(host.surface.last_frame().unwrap().len(), 32 * 8);
}

#[test]
fn kernel_grid_covers_partial_tiles() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(17, 9);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);

    assert_eq!(kernel.last().grid, DispatchGrid { x: 3, y: 2, z: 1 });
}

#[test]
fn kernel_receives_frame_parameters() {
    let config = TracerConfig {
        ray_bounces: 5,
        ..test_config()
    };
    let (mut device, mut driver) = started(&config);
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(16, 8);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);

    let dispatch = kernel.last();
    assert_eq!(dispatch.params.ray_bounces, 5);
    assert_eq!(dispatch.params.camera_to_world, host.camera.camera_to_world());
    assert_eq!(
        dispatch.params.camera_inverse_projection,
        host.camera.inverse_projection()
    );
    assert_eq!(dispatch.params.directional_light, host.light.as_vec4());
    assert_eq!(dispatch.sphere_count, config.max_sphere_count);
}

#[test]
fn jitter_stays_inside_the_pixel_and_varies() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 64);

    let offsets: Vec<_> = kernel.dispatches.iter().map(|d| d.params.pixel_offset).collect();
    for offset in &offsets {
        assert!((0.0..1.0).contains(&offset.x), "{offset}");
        assert!((0.0..1.0).contains(&offset.y), "{offset}");
    }
    assert!(offsets.windows(2).any(|pair| pair[0] != pair[1]));
}

#[test]
fn identical_samples_never_drift() {
    let (mut device, mut driver) = started(&test_config());
    let value = 0.37;
    let mut kernel = TestKernel::constant(value);
    let mut host = Host::new(8, 4);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 50);

    for frame in host.surface.frames.borrow().iter() {
        assert!(frame.iter().all(|&pixel| pixel == Vec4::splat(value)));
    }
}

#[test]
fn first_sample_replaces_uninitialized_target() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.25);
    let mut host = Host::new(4, 4);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);

    let frame = host.surface.last_frame().unwrap();
    assert!(frame.iter().all(|&pixel| pixel == Vec4::splat(0.25)));
}

#[test]
fn composite_folds_in_running_mean() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::sequence(vec![2.0, 2.0, 2.0, 10.0]);
    let mut host = Host::new(4, 4);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 4);

    assert_eq!(indices, vec![0, 1, 2, 3]);
    let frame = host.surface.last_frame().unwrap();
    assert!(frame.iter().all(|&pixel| pixel == Vec4::splat(4.0)));
}

#[test]
fn accumulation_converges_to_sample_mean() {
    let (mut device, mut driver) = started(&test_config());
    let samples: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.0 } else { 1.0 }).collect();
    let mut kernel = TestKernel::sequence(samples);
    let mut host = Host::new(2, 2);

    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 200);

    let frame = host.surface.last_frame().unwrap();
    for pixel in frame {
        assert!((pixel.x - 0.5).abs() < 1e-3, "{pixel}");
    }
}

#[test]
fn dispatch_failure_presents_previous_image_and_reallocates() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::sequence(vec![0.5, 0.5, 0.5, 0.9]);
    kernel.failing = vec![3];
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);
    let converged = host.surface.last_frame().unwrap();

    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();

    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            reason: SkipReason::Dispatch(RenderError::KernelDispatchFailed(_))
        }
    ));
    assert_eq!(host.surface.frame_count(), 4);
    assert_eq!(host.surface.last_frame().unwrap(), converged);
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(!driver.resources().has_target());
    assert_eq!(device.targets_released, 1);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(device.targets_allocated, 2);
}

#[test]
fn dispatch_failure_on_first_sample_presents_nothing() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    kernel.failing = vec![0];
    let mut host = Host::new(8, 8);

    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();

    assert!(matches!(outcome, FrameOutcome::Skipped { .. }));
    assert_eq!(host.surface.frame_count(), 0);
}

#[test]
fn composite_failure_skips_frame() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);

    device.fail_composite = true;
    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();
    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            reason: SkipReason::Dispatch(_)
        }
    ));

    device.fail_composite = false;
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);
    assert_eq!(indices, vec![0]);
}

#[test]
fn transient_allocation_failure_recovers() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    device.failing_target_allocations = 1;

    let err = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap_err();
    assert!(matches!(err, RenderError::ResourceAllocationFailed { .. }));
    assert!(!err.is_fatal());
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(kernel.dispatches.is_empty());

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn repeated_allocation_failure_becomes_fatal() {
    let config = TracerConfig {
        allocation_retry_limit: 3,
        ..test_config()
    };
    let (mut device, mut driver) = started(&config);
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(64, 32);
    device.failing_target_allocations = u32::MAX;

    for _ in 0..2 {
        let err = driver
            .on_frame(&mut device, &mut kernel, &mut host.context())
            .unwrap_err();
        assert!(matches!(err, RenderError::ResourceAllocationFailed { .. }));
    }
    let err = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap_err();

    match err {
        RenderError::PersistentAllocationFailure {
            width,
            height,
            attempts,
        } => assert_eq!((width, height, attempts), (64, 32, 3)),
        ref other => panic!("unexpected error {other:?}"),
    }
    assert!(err.is_fatal());
}

#[test]
fn allocation_failures_at_different_sizes_are_counted_separately() {
    let config = TracerConfig {
        allocation_retry_limit: 2,
        ..test_config()
    };
    let (mut device, mut driver) = started(&config);
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(64, 32);
    device.failing_target_allocations = u32::MAX;

    for width in [64, 65, 66] {
        host.width = width;
        let err = driver
            .on_frame(&mut device, &mut kernel, &mut host.context())
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}

#[test]
fn empty_output_is_skipped_without_allocating() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(0, 600);

    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();

    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            reason: SkipReason::EmptyOutput
        }
    ));
    assert_eq!(device.targets_allocated, 0);
    assert!(kernel.dispatches.is_empty());
}

#[test]
fn teardown_releases_everything() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);

    driver.teardown(&mut device);
    driver.teardown(&mut device);

    assert_eq!(device.live_targets(), 0);
    assert_eq!(device.live_scene_buffers(), 0);
    assert_eq!(device.targets_released, 1);
    assert_eq!(device.scene_buffers_released, 1);
    assert_eq!(driver.state(), DriverState::Idle);
    assert_eq!(driver.sample_index(), 0);
}

#[test]
fn reenabling_after_teardown_starts_over() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);
    driver.teardown(&mut device);

    driver.init(&mut device).unwrap();
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);

    assert_eq!(indices, vec![0, 1]);
    assert_eq!(device.live_targets(), 1);
    assert_eq!(device.live_scene_buffers(), 1);
    driver.teardown(&mut device);
}

#[test]
fn regenerating_scene_replaces_buffer_and_restarts() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 3);

    driver.regenerate_scene(&mut device).unwrap();
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);

    assert_eq!(indices, vec![0]);
    assert_eq!(device.scene_buffers_allocated, 2);
    assert_eq!(device.live_scene_buffers(), 1);
}

#[test]
fn crowded_scene_fails_to_initialize() {
    let config = TracerConfig {
        sphere_radius_range: [1.0, 1.0],
        max_sphere_count: 2,
        sphere_placement_radius: 0.0,
        max_placement_attempts: 50,
        ..test_config()
    };
    let mut device = MockDevice::default();
    let mut driver = FrameDriver::<MockDevice>::new(&config);

    let err = driver.init(&mut device).unwrap_err();

    assert!(matches!(
        err,
        RenderError::SceneGenerationExhausted {
            attempts: 50,
            placed: 1,
            requested: 2
        }
    ));
    assert!(!err.is_fatal());
    assert_eq!(device.scene_buffers_allocated, 0);
}

#[test]
fn frame_without_scene_generates_one() {
    let mut device = MockDevice::default();
    let mut driver = FrameDriver::new(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);

    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);

    assert_eq!(indices, vec![0]);
    assert_eq!(device.scene_buffers_allocated, 1);
}

#[test]
fn seeded_drivers_generate_identical_jitter() {
    let config = test_config();
    let (mut device_a, mut driver_a) = started(&config);
    let (mut device_b, mut driver_b) = started(&config);
    let mut kernel_a = TestKernel::constant(0.5);
    let mut kernel_b = TestKernel::constant(0.5);
    let mut host_a = Host::new(8, 8);
    let mut host_b = Host::new(8, 8);

    render_frames(&mut driver_a, &mut device_a, &mut kernel_a, &mut host_a, 4);
    render_frames(&mut driver_b, &mut device_b, &mut kernel_b, &mut host_b, 4);

    let offsets = |kernel: &TestKernel| -> Vec<_> {
        kernel.dispatches.iter().map(|d| d.params.pixel_offset).collect()
    };
    assert_eq!(offsets(&kernel_a), offsets(&kernel_b));
}

#[test]
fn unplaceable_scene_becomes_fatal_after_retry_limit() {
    let config = TracerConfig {
        sphere_radius_range: [1.0, 1.0],
        max_sphere_count: 2,
        sphere_placement_radius: 0.0,
        max_placement_attempts: 50,
        generation_retry_limit: 3,
        ..test_config()
    };
    assert!(config.validate().is_ok());
    let mut device = MockDevice::default();
    let mut driver = FrameDriver::new(&config);
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);

    let err = driver.init(&mut device).unwrap_err();
    assert!(matches!(err, RenderError::SceneGenerationExhausted { .. }));
    assert!(!err.is_fatal());
    let err = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap_err();
    assert!(!err.is_fatal());
    let err = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap_err();

    assert!(matches!(
        err,
        RenderError::PersistentGenerationFailure { attempts: 3 }
    ));
    assert!(err.is_fatal());
    assert!(kernel.dispatches.is_empty());
    assert_eq!(device.scene_buffers_allocated, 0);
}

#[test]
fn regeneration_after_teardown_holds_no_resources() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    driver.teardown(&mut device);

    driver.regenerate_scene(&mut device).unwrap();
    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();

    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            reason: SkipReason::Disabled
        }
    ));
    assert_eq!(device.scene_buffers_allocated, 1);
    assert_eq!(device.live_scene_buffers(), 0);
    assert_eq!(device.live_targets(), 0);
    assert_eq!(kernel.dispatches.len(), 2);
}

#[test]
fn dispatch_failure_releases_target_when_present_fails() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    kernel.failing = vec![2];
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    device.fail_present = true;

    let outcome = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap();

    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            reason: SkipReason::Dispatch(RenderError::KernelDispatchFailed(_))
        }
    ));
    assert!(!driver.resources().has_target());
    assert_eq!(device.live_targets(), 0);
    assert_eq!(driver.state(), DriverState::Idle);

    device.fail_present = false;
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);
    assert_eq!(indices, vec![0]);
}

#[test]
fn mismatched_target_is_dropped_before_dispatch() {
    let (mut device, mut driver) = started(&test_config());
    let mut kernel = TestKernel::constant(0.5);
    let mut host = Host::new(8, 8);
    render_frames(&mut driver, &mut device, &mut kernel, &mut host, 2);
    device.reported_extent = Some(Extent::new(4, 4));

    let err = driver
        .on_frame(&mut device, &mut kernel, &mut host.context())
        .unwrap_err();

    assert!(matches!(err, RenderError::ResourceAllocationFailed { .. }));
    assert_eq!(kernel.dispatches.len(), 2);
    assert_eq!(host.surface.frame_count(), 2);
    assert!(!driver.resources().has_target());
    assert_eq!(device.live_targets(), 0);
    assert_eq!(driver.state(), DriverState::Idle);
    assert_eq!(driver.sample_index(), 0);

    device.reported_extent = None;
    let indices = render_frames(&mut driver, &mut device, &mut kernel, &mut host, 1);
    assert_eq!(indices, vec![0]);
}
