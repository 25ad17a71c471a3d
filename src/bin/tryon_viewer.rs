use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use talava_tryon::calibration::{CalibrationSession, CalibrationStore, FileStorage, SessionError};
use talava_tryon::camera::{FrameSource, ThreadedCamera};
use talava_tryon::config::Config;
use talava_tryon::controller::{lock_output, LoopConfig, LoopSettings, RenderLoopController};
use talava_tryon::garment::{AdjustmentField, AssetProcessor, GarmentCategory};
use talava_tryon::notify::{Notification, Notifier};
use talava_tryon::pose::MoveNetProvider;
use talava_tryon::render::{Key, MinifbRenderer};

const CONFIG_PATH: &str = "config.toml";

/// キー1回あたりの変化量
const OFFSET_STEP: f32 = 1.0;
const SCALE_STEP: f32 = 0.05;
const ROTATION_STEP: f32 = 1.0;

fn parse_args() -> Option<(String, GarmentCategory)> {
    // Usage: tryon_viewer <image> <category>
    // e.g.  tryon_viewer garments/shirt.png tops
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        return None;
    }
    let category = GarmentCategory::from_catalog(&args[2])?;
    Some((args[1].clone(), category))
}

fn item_id_for(image: &str) -> String {
    Path::new(image)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.to_string())
}

fn loop_config(session: &CalibrationSession, category: GarmentCategory, image: &str) -> Option<LoopConfig> {
    let viewing = session.viewing()?;
    Some(LoopConfig {
        item_id: viewing.item_id.clone(),
        category,
        adjustment: viewing.active,
        image_url: image.to_string(),
    })
}

/// 押されたキーをセッション操作に反映する
fn handle_key(
    key: Key,
    session: &mut CalibrationSession,
    store: &mut CalibrationStore,
    notifier: &Notifier,
) -> Result<(), SessionError> {
    let Some(adj) = session.active_adjustment() else {
        return Err(SessionError::NoSelection);
    };
    match key {
        Key::Left => session.adjust(AdjustmentField::XOffset, adj.x_offset - OFFSET_STEP).map(drop),
        Key::Right => session.adjust(AdjustmentField::XOffset, adj.x_offset + OFFSET_STEP).map(drop),
        Key::Up => session.adjust(AdjustmentField::YOffset, adj.y_offset - OFFSET_STEP).map(drop),
        Key::Down => session.adjust(AdjustmentField::YOffset, adj.y_offset + OFFSET_STEP).map(drop),
        Key::Equal | Key::NumPadPlus => session.adjust(AdjustmentField::Scale, adj.scale + SCALE_STEP).map(drop),
        Key::Minus | Key::NumPadMinus => session.adjust(AdjustmentField::Scale, adj.scale - SCALE_STEP).map(drop),
        Key::LeftBracket => session.adjust(AdjustmentField::Rotation, adj.rotation - ROTATION_STEP).map(drop),
        Key::RightBracket => session.adjust(AdjustmentField::Rotation, adj.rotation + ROTATION_STEP).map(drop),
        Key::R => session.reset(store),
        Key::S => {
            session.save(store)?;
            notifier.success("キャリブレーションを保存しました");
            Ok(())
        }
        Key::D => {
            session.delete_saved(store)?;
            notifier.success("保存済みのキャリブレーションを削除しました");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some((image, category)) = parse_args() else {
        eprintln!("Usage: tryon_viewer <image> <category>");
        eprintln!("  category: tops, shirts, pants, dresses, accessories ...");
        std::process::exit(2);
    };

    let config = Config::load_or_default(CONFIG_PATH);
    println!("Try-on Viewer {}", env!("TRYON_VERSION"));
    println!("  [←→↑↓] 位置  [+/-] 拡大縮小  [ [ ] ] 回転");
    println!("  [S] 保存  [R] リセット  [D] 削除  [K] 骨格表示  [ESC] 終了");

    let storage = FileStorage::open(&config.storage.dir)
        .with_context(|| format!("保存先を開けません: {}", config.storage.dir))?;
    let mut store = CalibrationStore::open(Box::new(storage));
    let mut session = CalibrationSession::new();
    session.select(&item_id_for(&image), &store);

    println!("Opening camera {}...", config.camera.index);
    let camera = Arc::new(ThreadedCamera::start(
        config.camera.index,
        Some(config.camera.width),
        Some(config.camera.height),
    )?);
    let (width, height) = camera.resolution();
    println!("Camera resolution: {}x{}", width, height);

    println!("Loading model from {}...", config.model.path);
    let provider = Arc::new(MoveNetProvider::new(&config.model.path)?);

    let (notifier, mut notifications) = Notifier::channel();
    let assets = Arc::new(AssetProcessor::with_defaults(config.assets.cache_budget_bytes));
    let mut controller = RenderLoopController::new(
        camera.clone(),
        provider,
        assets,
        LoopSettings::from_config(&config),
        notifier.clone(),
    );
    let output = controller.output();

    let mut renderer = MinifbRenderer::new("Try-on Viewer", width as usize, height as usize)?;
    let mut show_skeleton = false;
    let mut status_until: Option<Instant> = None;
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(1.0 / config.render.refresh_hz.max(1.0)));

    while renderer.is_open() {
        ticker.tick().await;

        for key in renderer.pressed_keys() {
            if key == Key::K {
                show_skeleton = !show_skeleton;
                continue;
            }
            if let Err(e) = handle_key(key, &mut session, &mut store, &notifier) {
                match e {
                    SessionError::NotDirty => {}
                    other => notifier.error(&other),
                }
            }
        }

        if let Some(cfg) = loop_config(&session, category, &image) {
            controller.update(cfg);
        }

        while let Ok(notification) = notifications.try_recv() {
            match &notification {
                Notification::Success(_) => println!("{notification}"),
                Notification::Error(_) => eprintln!("{notification}"),
            }
            renderer.set_status(Some(notification.message()));
            status_until = Some(Instant::now() + Duration::from_secs(3));
        }

        let Some(frame) = camera.current_frame() else {
            renderer.update()?;
            continue;
        };

        let (buffer, hint, pose) = {
            let out = lock_output(&output);
            (
                out.canvas.over_mirrored_frame(&frame.image),
                out.canvas.hint().map(str::to_owned),
                out.pose.clone(),
            )
        };
        renderer.set_buffer(buffer);
        if show_skeleton {
            if let Some(pose) = &pose {
                renderer.draw_pose(pose);
            }
        }

        if status_until.is_some_and(|t| Instant::now() >= t) {
            status_until = None;
        }
        if status_until.is_none() {
            let dirty = if session.is_dirty() { " *" } else { "" };
            let text = hint.unwrap_or_else(|| format!("{}{}", item_id_for(&image), dirty));
            renderer.set_status(Some(&text));
        }
        renderer.update()?;
    }

    println!("Shutting down...");
    controller.shutdown().await;
    camera.stop();
    Ok(())
}
