use crate::pose::KeypointIndex;

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)
///
/// プレビューのデバッグ表示で、配置に使う上半身・下半身の骨格のみ描く。
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 12] = [
    // 顔
    (KeypointIndex::LeftEye, KeypointIndex::Nose),
    (KeypointIndex::Nose, KeypointIndex::RightEye),
    // 上半身
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    // 胴体
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    // 下半身
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

/// キーポイントの色 (RGB)
pub const KEYPOINT_COLOR: u32 = 0x00FF00; // 緑

/// 骨格線の色 (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFF00; // 黄色
