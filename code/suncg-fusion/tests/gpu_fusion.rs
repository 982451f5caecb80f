use glam::Vec3;
use suncg_fusion::gpu::check_storage_size;
use suncg_fusion::{
    CameraInfo, CameraIntrinsics, CameraPose, ComputeError, DepthFrame, GpuFusion,
    VoxelGridParams, VoxelVolume, integrate,
};

/// 需要适配器的测试默认忽略，用 `cargo test -- --ignored` 运行
async fn init_gpu() -> GpuFusion {
    let _ = env_logger::builder().is_test(true).try_init();
    GpuFusion::request()
        .await
        .expect("Failed to find an appropriate adapter")
}

fn scene() -> (VoxelGridParams, CameraInfo) {
    let grid = VoxelGridParams::new(0.05, 0.12, [16, 16, 16], Vec3::new(-0.4, -0.4, 0.613))
        .expect("grid");
    // 宽画面，所有体素都落在视野内
    let cam = CameraInfo::new(
        CameraIntrinsics::new(100.0, 100.0, 320.0, 240.0, 640, 480),
        CameraPose::IDENTITY,
    );
    (grid, cam)
}

fn assert_volumes_close(cpu: &VoxelVolume<f32>, gpu: &VoxelVolume<f32>) {
    assert_eq!(cpu.weight(), gpu.weight());
    for (i, (a, b)) in cpu.tsdf().iter().zip(gpu.tsdf()).enumerate() {
        assert!((a - b).abs() < 1e-4, "tsdf[{i}]: cpu {a}, gpu {b}");
    }
    for (i, (a, b)) in cpu
        .height()
        .unwrap()
        .iter()
        .zip(gpu.height().unwrap())
        .enumerate()
    {
        assert!((a - b).abs() < 1e-5, "height[{i}]: cpu {a}, gpu {b}");
    }
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_matches_cpu() {
    let gpu = init_gpu().await;
    let (grid, cam) = scene();

    let mut cpu_volume = VoxelVolume::<f32>::new(&grid, true);
    let mut gpu_volume = gpu.create_volume(&grid, true).expect("create volume");
    for depth in [1.0, 1.23, 0.2, 0.87] {
        let frame = DepthFrame::filled(640, 480, depth);
        integrate(&frame, &cam, &grid, &mut cpu_volume).expect("cpu integrate");
        gpu.integrate(&frame, &cam, &grid, &mut gpu_volume)
            .expect("gpu integrate");
    }
    let downloaded = gpu.download(&gpu_volume, &grid).expect("download");

    assert!(cpu_volume.weight().iter().any(|&w| w > 0.0));
    assert_volumes_close(&cpu_volume, &downloaded);
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_skip_leaves_volume_untouched() {
    let gpu = init_gpu().await;
    let (grid, cam) = scene();
    let n = grid.num_voxels();
    let before = VoxelVolume::from_buffers(
        &grid,
        (0..n).map(|i| (i % 7) as f32 / 7.0).collect(),
        (0..n).map(|i| (i % 3) as f32).collect(),
        Some((0..n).map(|i| (i % 11) as f32 / 11.0).collect()),
    )
    .expect("volume");

    // 相机在体积上方 10m，全部体素在相机后方
    let behind = CameraInfo::new(
        cam.intrinsics,
        CameraPose::from_translation(Vec3::new(0.0, 0.0, 10.0)),
    );
    let mut volume = before.clone();
    gpu.integrate_volume(&DepthFrame::filled(640, 480, 1.0), &behind, &grid, &mut volume)
        .expect("integrate");
    assert_eq!(volume, before);

    // 深度越界
    let mut volume = before.clone();
    gpu.integrate_volume(&DepthFrame::filled(640, 480, 11.0), &cam, &grid, &mut volume)
        .expect("integrate");
    assert_eq!(volume, before);
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_missing_depth_sentinel() {
    let gpu = init_gpu().await;
    let (grid, cam) = scene();
    let mut volume = VoxelVolume::<f32>::new(&grid, false);
    gpu.integrate_volume(&DepthFrame::filled(640, 480, 0.3), &cam, &grid, &mut volume)
        .expect("integrate");
    assert!(volume.tsdf().iter().all(|&t| t == -1.0));
    assert!(volume.weight().iter().all(|&w| w == 0.0));
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_fill_and_reset() {
    let gpu = init_gpu().await;
    let grid = VoxelGridParams::new(0.1, 0.1, [33, 17, 9], Vec3::ZERO).expect("grid");
    let volume = gpu.create_volume(&grid, true).expect("create volume");
    let zeros = gpu.read_buffer(&volume.tsdf, volume.len()).expect("read");
    assert_eq!(zeros.len(), grid.num_voxels());
    assert!(zeros.iter().all(|&v| v == 0.0));

    gpu.fill(&volume.weight, volume.len() as u32, 3.5)
        .expect("fill");
    let filled = gpu.read_buffer(&volume.weight, volume.len()).expect("read");
    assert!(filled.iter().all(|&v| v == 3.5));

    // 只填前缀
    gpu.fill(&volume.tsdf, 100, -1.0).expect("fill");
    let prefix = gpu.read_buffer(&volume.tsdf, volume.len()).expect("read");
    assert!(prefix[..100].iter().all(|&v| v == -1.0));
    assert!(prefix[100..].iter().all(|&v| v == 0.0));

    gpu.reset(&volume).expect("reset");
    let cleared = gpu.read_buffer(&volume.weight, volume.len()).expect("read");
    assert!(cleared.iter().all(|&v| v == 0.0));
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_fill_rejects_oversized_len() {
    let gpu = init_gpu().await;
    let grid = VoxelGridParams::new(0.1, 0.1, [4, 4, 4], Vec3::ZERO).expect("grid");
    let volume = gpu.create_volume(&grid, false).expect("create volume");
    assert!(gpu.fill(&volume.tsdf, 65, 1.0).is_err());
}

#[tokio::test]
#[ignore = "requires a GPU adapter"]
async fn test_gpu_create_volume_over_limit() {
    let gpu = init_gpu().await;
    let max = gpu.device.limits().max_storage_buffer_binding_size as u64;
    // 超出绑定上限的最小 1024x1024xN 网格
    let nz = (max / 4 / (1024 * 1024) + 1) as u32;
    let grid = VoxelGridParams::new(0.01, 0.04, [1024, 1024, nz], Vec3::ZERO).expect("grid");

    let err = gpu.create_volume(&grid, false).unwrap_err();
    assert!(
        matches!(err, ComputeError::BufferTooLarge { requested, limit } if requested > limit),
        "{err}"
    );
}

// ============================================================================
// 缓冲区上限（无需适配器）
// ============================================================================

#[test]
fn test_storage_size_within_default_limits() {
    let limits = wgpu::Limits::default();
    let limit = limits
        .max_buffer_size
        .min(limits.max_storage_buffer_binding_size as u64);
    assert!(check_storage_size(4, &limits).is_ok());
    assert!(check_storage_size(limit, &limits).is_ok());
}

#[test]
fn test_storage_size_over_default_limits() {
    let limits = wgpu::Limits::default();
    let limit = limits
        .max_buffer_size
        .min(limits.max_storage_buffer_binding_size as u64);
    assert!(matches!(
        check_storage_size(limit + 4, &limits),
        Err(ComputeError::BufferTooLarge { requested, limit: l }) if requested == limit + 4 && l == limit
    ));

    // 240x144x240 体积在默认上限内，1024^2x64 则超出
    assert!(check_storage_size(240 * 144 * 240 * 4, &limits).is_ok());
    assert!(check_storage_size(1024 * 1024 * 64 * 4, &limits).is_err());
}

#[test]
fn test_storage_size_uses_smaller_limit() {
    let limits = wgpu::Limits {
        max_buffer_size: 1024,
        max_storage_buffer_binding_size: 4096,
        ..wgpu::Limits::default()
    };
    assert!(check_storage_size(1024, &limits).is_ok());
    assert!(matches!(
        check_storage_size(1028, &limits),
        Err(ComputeError::BufferTooLarge { limit: 1024, .. })
    ));
}
