//! `search` and `download`: one-shot commands that run without the HTTP API

use std::sync::Arc;

use chapterbox::app::App;
use chapterbox::config::{Config, StorageConfig, StorageProvider};
use chapterbox::delivery::Destination;
use chapterbox::fetch::build_http_client;
use chapterbox::intake::{DownloadOrder, Intake};
use chapterbox::notify::{ChannelNotifier, Notification};
use chapterbox::queue::Packaging;
use chapterbox::selection::{ChapterOrder, ChapterSelection};
use chapterbox::source::SourceRegistry;
use chapterbox::worker::JobState;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::{DownloadArgs, Mode, SearchArgs};
use crate::server::shutdown_signal;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn search(config: Config, args: SearchArgs) -> Result<(), AnyError> {
    let client = build_http_client(&config.fetch)?;
    let registry = SourceRegistry::from_config(&config.sources, client);
    let intake = Intake::new(Arc::new(registry), config.fetch.request_timeout());

    let results = intake.search(&args.source, &args.query).await?;
    if results.is_empty() {
        println!("no results for '{}'", args.query);
    }
    for entry in results {
        println!("{}\t{}", entry.catalog_id, entry.title);
    }
    Ok(())
}

pub async fn download(mut config: Config, args: DownloadArgs) -> Result<(), AnyError> {
    // One-shot runs never leave a backlog behind
    config.server.mirror_path = None;
    if let Some(out) = &args.out {
        config.storage = StorageConfig {
            provider: StorageProvider::Local,
            root: out.clone(),
        };
    }

    let order = DownloadOrder {
        submitter_id: "cli".to_string(),
        selection: selection(args.mode, args.chapter)?,
        order: if args.descending {
            ChapterOrder::Descending
        } else {
            ChapterOrder::Ascending
        },
        packaging: match args.volume_size {
            Some(chapters_per_volume) => Packaging::Volumes {
                chapters_per_volume,
            },
            None => Packaging::PerChapter,
        },
        source: args.source,
        catalog_id: args.catalog_id,
        destination: Destination::new(args.destination),
    };

    let (notifier, mut events) = ChannelNotifier::new();
    let app = App::build(config, Arc::new(notifier))?;

    let submission = app.intake.prepare(order).await?;
    println!(
        "{}: {} chapter(s) queued",
        submission.catalog_title,
        submission.chapters.len()
    );
    let request_id = app.broker.submit(submission)?.request_id;

    let pool = app.start_pool(CancellationToken::new());

    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some((_, Notification::ChapterSkipped { chapter_label, reason, .. })) => {
                    eprintln!("skipped {chapter_label}: {reason}");
                }
                Some((_, Notification::JobCompleted { request_id: id, state, delivered, skipped }))
                    if id == request_id =>
                {
                    break Some((state, delivered, skipped));
                }
                Some(_) => {}
                None => break None,
            },
            _ = shutdown_signal(), if !interrupted => {
                interrupted = true;
                warn!(%request_id, "Interrupted, stopping after the current chapter");
                app.broker.cancel(request_id).await?;
            }
        }
    };

    pool.shutdown().await?;

    match outcome {
        Some((JobState::Completed, delivered, skipped)) => {
            println!("done: {delivered} delivered, {skipped} skipped");
            Ok(())
        }
        Some((state, delivered, skipped)) => {
            Err(format!("job {state}: {delivered} delivered, {skipped} skipped").into())
        }
        None => Err("notification channel closed before the job finished".into()),
    }
}

fn selection(mode: Mode, chapter: Option<String>) -> Result<ChapterSelection, AnyError> {
    let require = |chapter: Option<String>| {
        chapter.ok_or_else(|| AnyError::from("--chapter is required for this mode"))
    };

    Ok(match mode {
        Mode::All => ChapterSelection::All,
        Mode::Single => ChapterSelection::Single {
            chapter_id: require(chapter)?,
        },
        Mode::From => ChapterSelection::From {
            chapter_id: require(chapter)?,
        },
    })
}
