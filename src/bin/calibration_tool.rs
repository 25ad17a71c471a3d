use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use talava_tryon::calibration::{CalibrationStore, FileStorage};
use talava_tryon::config::Config;
use talava_tryon::garment::AdjustmentField;
use talava_tryon::notify::{Notification, Notifier};

const CONFIG_PATH: &str = "config.toml";

fn usage() -> ! {
    eprintln!("Usage: calibration_tool <command>");
    eprintln!();
    eprintln!("  list            保存済みアイテム一覧");
    eprintln!("  show <id>       調整値を表示");
    eprintln!("  delete <id>     調整値を削除");
    eprintln!("  export [path]   JSON にエクスポート（省略時は日付入りファイル名）");
    eprintln!("  import <path>   JSON からインポート（既存の値は置き換え）");
    std::process::exit(2);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else { usage() };

    let config = Config::load_or_default(CONFIG_PATH);
    let storage = FileStorage::open(&config.storage.dir)
        .with_context(|| format!("保存先を開けません: {}", config.storage.dir))?;
    let mut store = CalibrationStore::open(Box::new(storage));
    let (notifier, mut notifications) = Notifier::channel();

    let result = run(command, args.get(1), &mut store, &notifier);
    while let Ok(notification) = notifications.try_recv() {
        match notification {
            Notification::Success(_) => println!("{notification}"),
            Notification::Error(_) => eprintln!("{notification}"),
        }
    }
    result
}

fn run(command: &str, arg: Option<&String>, store: &mut CalibrationStore, notifier: &Notifier) -> Result<()> {
    match (command, arg) {
        ("list", None) => {
            if store.is_empty() {
                println!("保存済みのキャリブレーションはありません");
            }
            for (item_id, adj) in store.get_all() {
                let marker = if adj.is_default() { " (default)" } else { "" };
                println!("{item_id}{marker}");
            }
        }
        ("show", Some(item_id)) => {
            let Some(adj) = store.get(item_id) else {
                bail!("{item_id} は保存されていません");
            };
            println!("{item_id}:");
            for field in AdjustmentField::ALL {
                println!("  {:<15} {:>7.2}", field.name(), adj.get(field));
            }
        }
        ("delete", Some(item_id)) => {
            if store.delete(item_id)? {
                println!("{item_id} を削除しました");
            } else {
                bail!("{item_id} は保存されていません");
            }
        }
        ("export", path) => {
            let file = store.export(Utc::now(), notifier)?;
            let path = path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(&file.file_name));
            fs::write(&path, &file.bytes).with_context(|| format!("書き込めません: {}", path.display()))?;
            println!("-> {}", path.display());
        }
        ("import", Some(path)) => {
            let bytes = fs::read(path).with_context(|| format!("読み込めません: {path}"))?;
            store
                .import(&bytes, notifier)
                .with_context(|| format!("インポートできません: {path}"))?;
        }
        _ => usage(),
    }

    Ok(())
}
