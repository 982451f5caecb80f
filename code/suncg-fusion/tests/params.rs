use glam::{Mat4, Quat, Vec3};
use suncg_fusion::{
    CAM_INFO_LEN, CameraInfo, CameraIntrinsics, CameraPose, ConfigError, Snorm16, VOX_INFO_LEN,
    VoxelGridParams, VoxelStorage,
};

fn sample_camera() -> CameraInfo {
    CameraInfo::new(
        CameraIntrinsics::from_matrix(&[518.8579, 0.0, 320.0, 0.0, 518.8579, 240.0, 0.0, 0.0, 1.0], 640, 480),
        CameraPose::from_row_major([
            0.0, 0.0, 1.0, 0.5, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 1.25, //
            0.0, 0.0, 0.0, 1.0,
        ]),
    )
}

// ============================================================================
// cam_info
// ============================================================================

#[test]
fn test_cam_info_layout() {
    let packed = sample_camera().to_packed();
    assert_eq!(packed.len(), CAM_INFO_LEN);
    assert_eq!(&packed[..2], &[640.0, 480.0]);
    assert_eq!(packed[2], 518.8579);
    assert_eq!(packed[4], 320.0);
    assert_eq!(packed[7], 240.0);
    // 位姿平移 x 位于 pose[3]
    assert_eq!(packed[11 + 3], 0.5);

    let parsed = CameraInfo::from_packed(&packed).expect("parse");
    assert_eq!(parsed, sample_camera());
}

#[test]
fn test_cam_info_wrong_length() {
    let packed = sample_camera().to_packed();
    let err = CameraInfo::from_packed(&packed[..26]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::PackedLength {
            expected: 27,
            actual: 26,
            ..
        }
    ));
}

#[test]
fn test_cam_info_bad_dimensions() {
    let mut packed = sample_camera().to_packed();
    packed[0] = 640.5;
    assert!(matches!(
        CameraInfo::from_packed(&packed),
        Err(ConfigError::NotIntegral { .. })
    ));
    packed[0] = 0.0;
    assert!(matches!(
        CameraInfo::from_packed(&packed),
        Err(ConfigError::NotPositive { .. })
    ));
    packed[0] = -640.0;
    assert!(CameraInfo::from_packed(&packed).is_err());
}

// ============================================================================
// vox_info
// ============================================================================

#[test]
fn test_vox_info_roundtrip() {
    let grid = VoxelGridParams::new(0.02, 0.08, [240, 144, 240], Vec3::new(-1.0, 0.5, -0.05))
        .expect("grid");
    let packed = grid.to_packed();
    assert_eq!(packed.len(), VOX_INFO_LEN);
    assert_eq!(packed, [0.02, 0.08, 240.0, 144.0, 240.0, -1.0, 0.5, -0.05]);
    assert_eq!(VoxelGridParams::from_packed(&packed).expect("parse"), grid);
    assert_eq!(grid.num_voxels(), 240 * 144 * 240);
}

#[test]
fn test_vox_info_errors() {
    assert!(matches!(
        VoxelGridParams::from_packed(&[0.02; 7]),
        Err(ConfigError::PackedLength { .. })
    ));
    assert!(matches!(
        VoxelGridParams::from_packed(&[0.02, 0.08, 4.0, 0.0, 4.0, 0.0, 0.0, 0.0]),
        Err(ConfigError::NotPositive { name: "ny", .. })
    ));
    assert!(matches!(
        VoxelGridParams::from_packed(&[0.02, 0.08, 4.0, 4.5, 4.0, 0.0, 0.0, 0.0]),
        Err(ConfigError::NotIntegral { name: "ny", .. })
    ));
    assert!(matches!(
        VoxelGridParams::from_packed(&[0.0, 0.08, 4.0, 4.0, 4.0, 0.0, 0.0, 0.0]),
        Err(ConfigError::NotPositive { name: "vox_unit", .. })
    ));
    assert!(matches!(
        VoxelGridParams::new(0.1, 0.1, [70_000, 70_000, 2], Vec3::ZERO),
        Err(ConfigError::GridTooLarge { .. })
    ));
}

// ============================================================================
// 网格索引
// ============================================================================

#[test]
fn test_grid_index_and_coords() {
    let grid = VoxelGridParams::new(0.1, 0.2, [5, 3, 2], Vec3::ZERO).expect("grid");
    assert_eq!(grid.index(0, 0, 1), 1);
    assert_eq!(grid.index(0, 1, 0), 5);
    assert_eq!(grid.index(1, 0, 0), 15);
    for idx in 0..grid.num_voxels() {
        let (z, y, x) = grid.coords(idx);
        assert_eq!(grid.index(z, y, x), idx);
    }
}

#[test]
fn test_world_point_axis_permutation() {
    let grid = VoxelGridParams::new(0.5, 0.2, [4, 4, 4], Vec3::new(1.0, 2.0, 3.0)).expect("grid");
    // 存储 z -> 世界 x，存储 x -> 世界 y，存储 y -> 世界 z
    assert_eq!(grid.world_point(1, 0, 0), Vec3::new(1.5, 2.0, 3.0));
    assert_eq!(grid.world_point(0, 0, 1), Vec3::new(1.0, 2.5, 3.0));
    assert_eq!(grid.world_point(0, 1, 0), Vec3::new(1.0, 2.0, 3.5));
}

// ============================================================================
// 相机
// ============================================================================

#[test]
fn test_world_to_camera_inverts_pose() {
    let pose = sample_camera().pose;
    assert_eq!(pose.translation(), Vec3::new(0.5, 0.0, 1.25));
    // 相机光轴指向世界 +x
    let p = pose.world_to_camera(Vec3::new(2.5, 0.0, 1.25));
    assert!((p - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6, "{p}");
    // 相机 x 轴对应世界 y
    let p = pose.world_to_camera(Vec3::new(0.5, 1.0, 1.25));
    assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6, "{p}");
}

#[test]
fn test_pose_matches_glam_inverse() {
    let m = Mat4::from_rotation_translation(
        Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.0),
        Vec3::new(0.4, -2.0, 1.5),
    );
    let pose = CameraPose::from_mat4(m);
    assert!(pose.to_mat4().abs_diff_eq(m, 1e-6));
    let inv = m.inverse();
    for p in [Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0), Vec3::new(-4.0, 0.5, 0.25)] {
        let a = pose.world_to_camera(p);
        let b = inv.transform_point3(p);
        assert!((a - b).length() < 1e-5, "{a} vs {b}");
    }
}

#[test]
fn test_projection_rounds_half_away_from_zero() {
    let k = CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0, 4, 4);
    assert_eq!(k.project(Vec3::new(1.5, 2.5, 1.0)), Some((2, 3)));
    assert_eq!(k.project(Vec3::new(0.49, 0.0, 1.0)), Some((0, 0)));
    assert_eq!(k.project(Vec3::new(-0.49, 0.0, 1.0)), Some((0, 0)));
    assert_eq!(k.project(Vec3::new(-0.5, 0.0, 1.0)), None);
    assert_eq!(k.project(Vec3::new(3.5, 0.0, 1.0)), None);
    assert_eq!(k.project(Vec3::new(3.49, 3.49, 1.0)), Some((3, 3)));
}

// ============================================================================
// 存储表示
// ============================================================================

#[test]
fn test_snorm16_exact_values() {
    for v in [-1.0, 0.0, 1.0] {
        assert_eq!(Snorm16::from_working(v).to_working(), v);
    }
    assert_eq!(Snorm16::from_working(-1.0), Snorm16(-32767));
    // 越界值截断
    assert_eq!(Snorm16::from_working(3.0), Snorm16(i16::MAX));
    assert_eq!(Snorm16::from_working(-3.0), Snorm16(-32767));
}

#[test]
fn test_snorm16_precision() {
    for i in -100..=100 {
        let v = i as f32 / 100.0;
        let back = Snorm16::from_working(v).to_working();
        assert!((back - v).abs() <= 0.5 / Snorm16::SCALE + f32::EPSILON, "{v} -> {back}");
    }
}

#[test]
fn test_passthrough_storage() {
    assert_eq!(<f32 as VoxelStorage>::from_working(0.125), 0.125);
    assert_eq!(<f64 as VoxelStorage>::from_working(-0.5).to_working(), -0.5);
}
