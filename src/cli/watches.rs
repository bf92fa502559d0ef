use anyhow::Context;

use crate::daemon;
use crate::daemon::scheduler::{Clock, SystemClock};
use crate::models::{ServerConfig, WatchView};
use crate::storage::JsonWatchStore;

/// Render watches as a fixed-width table.
pub fn format_watch_table(watches: &[WatchView]) -> String {
    if watches.is_empty() {
        return "No watches found.\n".to_string();
    }

    let mut out = format!(
        "{:<38}{:<24}{:<9}{:<8}{:<7}{:<22}\n",
        "ID", "NAME", "ENABLED", "ACTIVE", "EVERY", "LAST RUN"
    );
    for view in watches {
        let w = &view.watch;
        let name: String = if w.name.chars().count() > 22 {
            let mut short: String = w.name.chars().take(21).collect();
            short.push('~');
            short
        } else {
            w.name.clone()
        };
        out.push_str(&format!(
            "{:<38}{:<24}{:<9}{:<8}{:<7}{:<22}\n",
            w.id,
            name,
            if w.enabled { "yes" } else { "no" },
            if view.active { "yes" } else { "no" },
            format!("{}h", w.interval_hours),
            w.last_run.as_deref().unwrap_or("never"),
        ));
    }
    out
}

/// `archiver watches`
pub async fn cmd_watches(config: &ServerConfig, json: bool) -> anyhow::Result<()> {
    let store = JsonWatchStore::new(daemon::watches_file(config));
    let today = SystemClock.today();
    let views: Vec<WatchView> = store
        .load()
        .await
        .into_iter()
        .map(|w| WatchView::new(w, today))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        print!("{}", format_watch_table(&views));
    }
    Ok(())
}

/// `archiver tick`
pub async fn cmd_tick(config: ServerConfig) -> anyhow::Result<()> {
    let downloader = daemon::build_downloader(&config)?;
    let state = daemon::build_state(config, downloader);
    let scheduler = daemon::build_scheduler(&state);

    let ran = scheduler
        .tick()
        .await
        .context("Scheduler pass failed")?;
    state.downloader.wait_for_rescans().await;
    println!(
        "Ran {} watch(es) from {}",
        ran,
        state.store.file_path().display()
    );
    Ok(())
}
