// main.rs
//
// Headless dump: drives the table engine against a live server and prints
// the rows that would be on screen.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracker_frontend::persist::FileStore;
use tracker_frontend::shared::Session;
use tracker_frontend::telemetry_table::columns::{ColumnVisibility, format_cell};
use tracker_frontend::telemetry_table::render::RenderPatch;
use tracker_frontend::telemetry_table::{
    HttpDataSource, LoadOutcome, RowSink, TableOptions, VirtualTable,
};

/// Logs patches instead of drawing them.
struct LogSink;

impl RowSink for LogSink {
    fn apply(&self, patch: &RenderPatch) {
        tracing::debug!(
            range = ?patch.range,
            created = patch.created.len(),
            replaced = patch.replaced.len(),
            removed = patch.removed.len(),
            placeholders = patch.new_placeholders().len(),
            "render patch"
        );
    }

    fn scroll_to(&self, scroll_top: f64) {
        tracing::debug!(scroll_top, "scroll");
    }

    fn loading_changed(&self, loading: bool) {
        tracing::trace!(loading, "loading");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    // usage: tracker_table_dump [session_id] [datetime_unix]
    let mut args = std::env::args().skip(1);
    let session_id = args
        .next()
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .context("session id must be an integer")?;
    let datetime_unix = args
        .next()
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .context("datetime must be unix seconds or milliseconds")?;

    let options = TableOptions::from_env().context("failed to load table options")?;
    let source = HttpDataSource::new(&options).context("failed to build http client")?;
    tracing::info!(api_url = source.api_url(), "probing table api");

    let table = VirtualTable::new(options, Arc::new(source), Arc::new(LogSink))
        .context("invalid table options")?;
    match session_id {
        Some(id) => {
            table.select_session(&Session { id, name: None });
            let deadline = tokio::time::Instant::now() + table.options().request_timeout();
            while table.stats().loaded_rows == 0 && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(table.options().timings.scroll_poll()).await;
            }
        }
        None => {
            if let LoadOutcome::Failed = table.load_initial_data().await {
                anyhow::bail!("initial page request failed");
            }
        }
    }

    if let Some(datetime_unix) = datetime_unix {
        let found = table.navigate_to_datetime_unix(datetime_unix).await;
        tracing::info!(datetime_unix, found, "datetime navigation");
        tokio::time::sleep(table.options().timings.deferred_render() * 2).await;
    }

    let columns = ColumnVisibility::load(&FileStore::default_location());
    let visible = columns.visible_columns();
    let header: Vec<&str> = visible.iter().map(|key| key.title()).collect();
    println!("{}", header.join("\t"));

    if let Some(range) = table.visible_range() {
        for id in range.ids() {
            match table.cached_row(id) {
                Some(row) => {
                    let cells: Vec<String> =
                        visible.iter().map(|key| format_cell(&row, *key)).collect();
                    println!("{}", cells.join("\t"));
                }
                None => println!("#{id}\tloading"),
            }
        }
    }

    let stats = table.stats();
    tracing::info!(
        loaded = stats.loaded_rows,
        total = stats.total_visible_count,
        has_more_down = stats.has_more_down,
        "done"
    );
    table.destroy();
    Ok(())
}
