//! Frame-driven render loop: sample pose, compute placement, composite.
//!
//! One tokio task per run. A run is bound to a `LoopConfig`; any change to
//! it means stop and start again, so per-run state (smoothing, the cached
//! asset handle) never leaks across garments or adjustments.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::FrameSource;
use crate::config::{Config, SmoothingConfig};
use crate::garment::{AssetProcessor, FitAdjustment, GarmentAsset, GarmentCategory};
use crate::notify::Notifier;
use crate::placement::compute_placement;
use crate::pose::{Pose, PoseProvider};
use crate::render::{Compositor, PixelCanvas, RenderOutcome};
use crate::smoothing::PlacementFilter;

/// Inputs of one run. Equal configs never restart the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub item_id: String,
    pub category: GarmentCategory,
    pub adjustment: FitAdjustment,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Idle,
    Running,
}

/// Loop tuning taken from `[render]` and `[smoothing]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub refresh_hz: f32,
    pub confidence_threshold: f32,
    pub clip_to_body: bool,
    pub smoothing: SmoothingConfig,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_hz: config.render.refresh_hz,
            confidence_threshold: config.render.confidence_threshold,
            clip_to_body: config.render.clip_to_body,
            smoothing: config.smoothing.clone(),
        }
    }

    fn tick_period(&self) -> Duration {
        let hz = if self.refresh_hz.is_finite() && self.refresh_hz > 0.0 {
            self.refresh_hz
        } else {
            60.0
        };
        Duration::from_secs_f32(1.0 / hz)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The latest composited overlay and how it was produced.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub canvas: PixelCanvas,
    pub outcome: Option<RenderOutcome>,
    pub frame_id: Option<u64>,
    pub item_id: Option<String>,
    /// 描画に使ったポーズ（フレーム座標、非ミラー）
    pub pose: Option<Pose>,
}

impl Default for RenderOutput {
    fn default() -> Self {
        Self {
            canvas: PixelCanvas::new(1, 1),
            outcome: None,
            frame_id: None,
            item_id: None,
            pose: None,
        }
    }
}

pub type SharedOutput = Arc<Mutex<RenderOutput>>;

struct ActiveRun {
    config: LoopConfig,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything a run task needs, shared with the controller.
#[derive(Clone)]
struct LoopContext {
    source: Arc<dyn FrameSource>,
    provider: Arc<dyn PoseProvider>,
    assets: Arc<AssetProcessor>,
    output: SharedOutput,
    notifier: Notifier,
    settings: LoopSettings,
    status: Arc<watch::Sender<LoopStatus>>,
}

pub struct RenderLoopController {
    ctx: LoopContext,
    active: Option<ActiveRun>,
}

impl RenderLoopController {
    pub fn new(
        source: Arc<dyn FrameSource>,
        provider: Arc<dyn PoseProvider>,
        assets: Arc<AssetProcessor>,
        settings: LoopSettings,
        notifier: Notifier,
    ) -> Self {
        let (status, _) = watch::channel(LoopStatus::Idle);
        Self {
            ctx: LoopContext {
                source,
                provider,
                assets,
                output: Arc::new(Mutex::new(RenderOutput::default())),
                notifier,
                settings,
                status: Arc::new(status),
            },
            active: None,
        }
    }

    pub fn status(&self) -> LoopStatus {
        *self.ctx.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopStatus> {
        self.ctx.status.subscribe()
    }

    pub fn output(&self) -> SharedOutput {
        Arc::clone(&self.ctx.output)
    }

    pub fn config(&self) -> Option<&LoopConfig> {
        self.active.as_ref().map(|run| &run.config)
    }

    /// Start a run. Returns false (and stays idle) while the camera feed or
    /// the model is not ready. Must be called inside a tokio runtime.
    ///
    /// A run ends by itself and reports `Idle` when either gate drops later.
    pub fn start(&mut self, config: LoopConfig) -> bool {
        self.stop();

        if !self.ctx.source.is_active() {
            tracing::debug!("render loop not started: camera inactive");
            return false;
        }
        if !self.ctx.provider.is_ready() {
            tracing::debug!("render loop not started: model not ready");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.ctx.clone(), config.clone(), token.clone()));
        tracing::info!(item_id = %config.item_id, category = ?config.category, "render loop started");

        self.active = Some(ActiveRun { config, token, handle });
        self.ctx.status.send_replace(LoopStatus::Running);
        true
    }

    /// Cancel the current run. An in-flight sample is discarded.
    pub fn stop(&mut self) {
        if let Some(run) = self.active.take() {
            run.token.cancel();
            tracing::info!(item_id = %run.config.item_id, "render loop stopped");
        }
        self.ctx.status.send_replace(LoopStatus::Idle);
    }

    /// Stop and start again with `config`.
    pub fn restart(&mut self, config: LoopConfig) -> bool {
        self.stop();
        self.start(config)
    }

    /// Restart only when `config` differs from the running one.
    pub fn update(&mut self, config: LoopConfig) -> bool {
        if self.config() == Some(&config) && self.status() == LoopStatus::Running {
            return true;
        }
        self.restart(config)
    }

    /// Stop and wait for the run task to exit.
    pub async fn shutdown(mut self) {
        if let Some(run) = self.active.take() {
            run.token.cancel();
            if let Err(e) = run.handle.await {
                tracing::warn!("render loop task failed: {e}");
            }
        }
        self.ctx.status.send_replace(LoopStatus::Idle);
    }
}

impl Drop for RenderLoopController {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.token.cancel();
        }
    }
}

/// Poisoned locks are recovered; the output is overwritten every frame.
pub fn lock_output(output: &SharedOutput) -> MutexGuard<'_, RenderOutput> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Populate the asset cache off the async runtime.
fn spawn_asset_load(ctx: &LoopContext, url: String, token: CancellationToken) {
    let assets = Arc::clone(&ctx.assets);
    let notifier = ctx.notifier.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = assets.load(&url) {
            if !token.is_cancelled() {
                notifier.error(&e);
            }
        }
    });
}

async fn run_loop(ctx: LoopContext, config: LoopConfig, token: CancellationToken) {
    let compositor = Compositor::new(ctx.settings.clip_to_body);
    let mut filter = PlacementFilter::from_config(&ctx.settings.smoothing);
    let mut asset: Option<Arc<GarmentAsset>> = ctx.assets.get(&config.image_url);
    if asset.is_none() {
        spawn_asset_load(&ctx, config.image_url.clone(), token.clone());
    }

    let mut ticker = interval(ctx.settings.tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !ctx.source.is_active() || !ctx.provider.is_ready() {
            tracing::info!(item_id = %config.item_id, "camera or model no longer ready, render loop going idle");
            // stop() が先に走っていれば次の run の状態を上書きしない
            ctx.status.send_if_modified(|status| {
                if token.is_cancelled() || *status == LoopStatus::Idle {
                    return false;
                }
                *status = LoopStatus::Idle;
                true
            });
            break;
        }

        if asset.is_none() {
            asset = ctx.assets.get(&config.image_url);
        }

        let Some(frame) = ctx.source.current_frame() else {
            tracing::debug!("no camera frame yet");
            continue;
        };

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = ctx.provider.estimate(&frame, ctx.settings.confidence_threshold) => result,
        };
        if token.is_cancelled() {
            tracing::debug!(frame_id = frame.id, "dropping sample from a stopped run");
            break;
        }
        let sample = match result {
            Ok(sample) => sample,
            Err(e) => {
                tracing::debug!(frame_id = frame.id, "pose estimation failed: {e:#}");
                continue;
            }
        };

        let pose = sample.primary();
        let aspect = asset.as_ref().map_or(1.0, |a| a.aspect_ratio());
        let placement = pose
            .and_then(|p| compute_placement(config.category, p, &config.adjustment, frame.size().into(), aspect))
            .map(|p| match filter.as_mut() {
                Some(f) => f.apply(p),
                None => p,
            });

        let outcome = {
            let mut output = lock_output(&ctx.output);
            // ロック待ちの間に stop() された場合は次の run の出力を汚さない
            if token.is_cancelled() {
                break;
            }
            let (width, height) = frame.size();
            output.canvas.resize(width, height);
            let outcome = compositor.render(
                &mut output.canvas,
                pose,
                sample.segmentation.as_ref(),
                asset.as_deref(),
                placement,
            );
            output.outcome = Some(outcome);
            output.frame_id = Some(frame.id);
            output.item_id = Some(config.item_id.clone());
            output.pose = pose.cloned();
            outcome
        };

        if outcome != RenderOutcome::Drawn {
            tracing::debug!(frame_id = frame.id, ?outcome, "frame not drawn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::VideoFrame;
    use crate::notify::Notification;
    use crate::pose::{Keypoint, KeypointIndex, PoseSample};
    use futures::future::{BoxFuture, FutureExt};
    use image::{DynamicImage, RgbImage, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const URL: &str = "shirt.png";

    struct StaticSource {
        active: AtomicBool,
    }

    impl FrameSource for StaticSource {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn current_frame(&self) -> Option<VideoFrame> {
            Some(VideoFrame::new(7, RgbImage::new(300, 400)))
        }
    }

    /// Returns a torso pose, optionally waiting for `gate` first.
    struct MockProvider {
        ready: bool,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                ready: true,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    impl PoseProvider for MockProvider {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn estimate<'a>(&'a self, _frame: &'a VideoFrame, _threshold: f32) -> BoxFuture<'a, anyhow::Result<PoseSample>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                let mut pose = Pose::default();
                pose.set(KeypointIndex::LeftShoulder, Keypoint::new(100.0, 100.0, 0.9));
                pose.set(KeypointIndex::RightShoulder, Keypoint::new(200.0, 100.0, 0.9));
                pose.set(KeypointIndex::LeftHip, Keypoint::new(110.0, 300.0, 0.9));
                pose.set(KeypointIndex::RightHip, Keypoint::new(190.0, 300.0, 0.9));
                Ok(PoseSample::single(pose))
            }
            .boxed()
        }
    }

    fn assets_with_shirt() -> Arc<AssetProcessor> {
        let assets = Arc::new(AssetProcessor::with_defaults(0));
        let shirt = RgbaImage::from_pixel(10, 14, Rgba([200, 40, 40, 255]));
        assets.insert_image(URL, &DynamicImage::ImageRgba8(shirt)).unwrap();
        assets
    }

    fn loop_config(url: &str) -> LoopConfig {
        LoopConfig {
            item_id: "shirt-1".to_string(),
            category: GarmentCategory::Torso,
            adjustment: FitAdjustment::default(),
            image_url: url.to_string(),
        }
    }

    fn source(active: bool) -> Arc<StaticSource> {
        Arc::new(StaticSource {
            active: AtomicBool::new(active),
        })
    }

    fn controller_with(
        source: Arc<StaticSource>,
        provider: Arc<MockProvider>,
        assets: Arc<AssetProcessor>,
        smoothing: bool,
    ) -> (RenderLoopController, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        let settings = LoopSettings {
            smoothing: SmoothingConfig {
                enabled: smoothing,
                ..SmoothingConfig::default()
            },
            ..LoopSettings::default()
        };
        (RenderLoopController::new(source, provider, assets, settings, notifier), rx)
    }

    fn controller(active: bool, provider: Arc<MockProvider>, assets: Arc<AssetProcessor>) -> (RenderLoopController, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        controller_with(source(active), provider, assets, false)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_start_requires_camera_and_model() {
        let (mut ctl, _rx) = controller(false, Arc::new(MockProvider::new()), assets_with_shirt());
        assert!(!ctl.start(loop_config(URL)));
        assert_eq!(ctl.status(), LoopStatus::Idle);

        let provider = Arc::new(MockProvider {
            ready: false,
            ..MockProvider::new()
        });
        let (mut ctl, _rx) = controller(true, provider, assets_with_shirt());
        assert!(!ctl.start(loop_config(URL)));
        assert_eq!(ctl.status(), LoopStatus::Idle);
    }

    #[tokio::test]
    async fn test_running_loop_draws_garment() {
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, _rx) = controller(true, Arc::clone(&provider), assets_with_shirt());
        let status = ctl.subscribe();

        assert!(ctl.start(loop_config(URL)));
        assert_eq!(*status.borrow(), LoopStatus::Running);

        let output = ctl.output();
        wait_for(|| lock_output(&output).outcome == Some(RenderOutcome::Drawn)).await;

        let out = lock_output(&output);
        assert_eq!(out.frame_id, Some(7));
        assert_eq!(out.canvas.pixels().dimensions(), (300, 400));
        // torso center x = 150 on a 300 px frame stays at 150 after mirroring
        assert_eq!(out.canvas.pixels().get_pixel(150, 150)[3], 255);
        drop(out);

        ctl.stop();
        assert_eq!(*status.borrow(), LoopStatus::Idle);
    }

    #[tokio::test]
    async fn test_stale_sample_is_dropped() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider {
            gate: Some(Arc::clone(&gate)),
            ..MockProvider::new()
        });
        let (mut ctl, _rx) = controller(true, Arc::clone(&provider), assets_with_shirt());
        assert!(ctl.start(loop_config(URL)));

        wait_for(|| provider.calls.load(Ordering::SeqCst) == 1).await;
        ctl.stop();
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(lock_output(&ctl.output()).outcome, None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_sample_in_flight() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider {
            gate: Some(Arc::clone(&gate)),
            ..MockProvider::new()
        });
        let (mut ctl, _rx) = controller(true, Arc::clone(&provider), assets_with_shirt());
        assert!(ctl.start(loop_config(URL)));

        // many ticks pass while the first sample is pending
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_restarts_only_on_change() {
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, _rx) = controller(true, provider, assets_with_shirt());
        let mut status = ctl.subscribe();

        assert!(ctl.update(loop_config(URL)));
        status.borrow_and_update();
        assert!(ctl.update(loop_config(URL)));
        assert!(!status.has_changed().unwrap());

        let mut changed = loop_config(URL);
        changed.adjustment.scale = 1.2;
        assert!(ctl.update(changed.clone()));
        assert!(status.has_changed().unwrap());
        assert_eq!(ctl.config(), Some(&changed));
        assert_eq!(ctl.status(), LoopStatus::Running);
    }

    #[tokio::test]
    async fn test_asset_failure_is_notified_and_loop_keeps_running() {
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, mut rx) = controller(true, provider, Arc::new(AssetProcessor::with_defaults(0)));
        assert!(ctl.start(loop_config("/nonexistent/garment.png")));

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(notification.is_error());

        let output = ctl.output();
        wait_for(|| lock_output(&output).outcome == Some(RenderOutcome::AssetPending)).await;
        assert_eq!(ctl.status(), LoopStatus::Running);
    }

    #[tokio::test]
    async fn test_camera_loss_ends_run_as_idle() {
        let camera = source(true);
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, _rx) = controller_with(Arc::clone(&camera), Arc::clone(&provider), assets_with_shirt(), false);
        assert!(ctl.start(loop_config(URL)));
        wait_for(|| provider.calls.load(Ordering::SeqCst) >= 1).await;

        camera.active.store(false, Ordering::SeqCst);
        wait_for(|| ctl.status() == LoopStatus::Idle).await;

        let calls = provider.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);

        // update() starts a fresh run once the camera is back
        camera.active.store(true, Ordering::SeqCst);
        assert!(ctl.update(loop_config(URL)));
        assert_eq!(ctl.status(), LoopStatus::Running);
    }

    #[tokio::test]
    async fn test_restart_reports_running() {
        let camera = source(true);
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, _rx) = controller_with(Arc::clone(&camera), Arc::clone(&provider), assets_with_shirt(), false);
        assert!(ctl.start(loop_config(URL)));
        wait_for(|| provider.calls.load(Ordering::SeqCst) >= 1).await;

        let mut changed = loop_config(URL);
        changed.adjustment.x_offset = 4.0;
        assert!(ctl.restart(changed));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ctl.status(), LoopStatus::Running);
        ctl.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stopped_run_does_not_write_after_waiting_on_output() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider {
            gate: Some(Arc::clone(&gate)),
            ..MockProvider::new()
        });
        let (mut ctl, _rx) = controller(true, Arc::clone(&provider), assets_with_shirt());
        let output = ctl.output();
        assert!(ctl.start(loop_config(URL)));
        wait_for(|| provider.calls.load(Ordering::SeqCst) == 1).await;

        // the run finishes its sample and blocks on the output lock
        let guard = lock_output(&output);
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.stop();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let out = lock_output(&output);
        assert_eq!(out.outcome, None);
        assert_eq!(out.frame_id, None);
    }

    #[tokio::test]
    async fn test_smoothed_loop_draws_garment() {
        let provider = Arc::new(MockProvider::new());
        let (mut ctl, _rx) = controller_with(source(true), Arc::clone(&provider), assets_with_shirt(), true);
        assert!(ctl.start(loop_config(URL)));

        let output = ctl.output();
        // a steady pose stays put through the filter after the first frame
        wait_for(|| provider.calls.load(Ordering::SeqCst) >= 3).await;
        wait_for(|| lock_output(&output).outcome == Some(RenderOutcome::Drawn)).await;
        assert_eq!(lock_output(&output).canvas.pixels().get_pixel(150, 150)[3], 255);
        ctl.shutdown().await;
    }
}
