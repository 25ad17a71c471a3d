/// MoveNet の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 外部モデルが使うキーポイント名 (e.g. "leftShoulder")
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// 単一キーポイント（フレームのピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値以上かつ座標が有限か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold && self.x.is_finite() && self.y.is_finite()
    }

    /// 整数ピクセル座標に丸める
    pub fn to_pixel(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 1人分の姿勢。検出されなかったキーポイントは `None`。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    keypoints: [Option<Keypoint>; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Option<Keypoint>; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// モデル出力から作成。閾値未満・非有限のキーポイントは欠損扱い。
    pub fn from_scores(raw: &[Keypoint; KeypointIndex::COUNT], threshold: f32) -> Self {
        let mut keypoints = [None; KeypointIndex::COUNT];
        for (slot, kp) in keypoints.iter_mut().zip(raw.iter()) {
            if kp.is_valid(threshold) {
                *slot = Some(*kp);
            }
        }
        Self { keypoints }
    }

    /// 名前付きキーポイントから作成（テスト・外部連携用）
    pub fn from_named<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Keypoint)>,
    {
        let mut pose = Self::default();
        for (name, kp) in points {
            if let Some(index) = KeypointIndex::from_name(name) {
                pose.set(index, kp);
            }
        }
        pose
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints[index as usize].as_ref()
    }

    pub fn set(&mut self, index: KeypointIndex, keypoint: Keypoint) {
        self.keypoints[index as usize] = Some(keypoint);
    }

    pub fn remove(&mut self, index: KeypointIndex) -> Option<Keypoint> {
        self.keypoints[index as usize].take()
    }

    /// 検出済みキーポイント数
    pub fn detected_count(&self) -> usize {
        self.keypoints.iter().filter(|k| k.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.detected_count() == 0
    }

    /// 正規化座標 (0.0〜1.0) のポーズをピクセル座標に変換
    pub fn scaled(&self, width: u32, height: u32) -> Self {
        let mut keypoints = self.keypoints;
        for kp in keypoints.iter_mut().flatten() {
            kp.x *= width as f32;
            kp.y *= height as f32;
        }
        Self { keypoints }
    }
}
