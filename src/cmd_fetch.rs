pub mod pipeline;
pub mod resolver;
pub mod thumbnail;

use std::fs;
use std::path;
use std::time::Duration;

use log;

use crate::common::{self, Cancel, Error};
use crate::common::dispatch::{Completion, Dispatcher, Report};
use crate::common::ffmpeg::Ffmpeg;
use crate::common::tags::Id3Writer;
use pipeline::{DownloadConfig, Pipeline};
use resolver::{ContentResolver, PlaylistItem, YtDlp};
use thumbnail::HttpThumbnails;

/// Command line values for `fetch`; anything left unset falls back to
/// `mixtape.toml`, then to the defaults.
#[derive(Debug, Default)]
pub struct FetchOptions {
    pub overwrite : Option<bool>,
    pub output_dir : Option<path::PathBuf>,
    pub workers : Option<usize>,
    pub retries : Option<u32>,
    pub timeout : Option<u64>,
}

impl DownloadConfig {
    pub fn load(options : &FetchOptions) -> Self {
        let defaults = Self::default();
        let output_dir = options.output_dir.clone()
                .or_else(|| common::find_config("output-dir").map(path::PathBuf::from))
                .unwrap_or(defaults.output_dir);
        let workers = options.workers
                .or_else(|| common::find_config_integer("workers").and_then(|x| usize::try_from(x).ok()))
                .unwrap_or(defaults.workers)
                .max(1);
        let max_attempts = options.retries
                .or_else(|| common::find_config_integer("retries").and_then(|x| u32::try_from(x).ok()))
                .unwrap_or(defaults.retry.max_attempts)
                .max(1);
        let timeout = options.timeout
                .or_else(|| common::find_config_integer("timeout"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout);
        Self {
            overwrite : options.overwrite.unwrap_or(defaults.overwrite),
            output_dir,
            workers,
            retry : common::dispatch::RetryPolicy { max_attempts, ..defaults.retry },
            timeout,
        }
    }
}

pub fn run(playlist_uri : &str, options : &FetchOptions, cancel : &Cancel) -> common::Result<()> {
    let config = DownloadConfig::load(options);
    let Some(ytdlp_path) = common::find_ytdlp_path() else {
        log::info!("make sure `yt-dlp` or `youtube-dl` is in your PATH\n\
                    alternatively, add `yt-dlp = <path>` to your `mixtape.toml`");
        return Err(Error::MissingTool("yt-dlp"));
    };
    let Some(ffmpeg_path) = common::find_ffmpeg_path() else {
        log::info!("make sure `ffmpeg` is in your PATH\n\
                    alternatively, add `ffmpeg = <path>` to your `mixtape.toml`");
        return Err(Error::MissingTool("ffmpeg"));
    };
    log::info!("downloading files using installation: {}", ytdlp_path.display());
    let resolver = YtDlp::new(ytdlp_path, config.timeout);
    let transcoder = Ffmpeg::new(ffmpeg_path, common::find_ffprobe_path(), config.timeout);
    let thumbnails = HttpThumbnails::new(config.timeout)?;

    let playlist = resolver.playlist(playlist_uri, cancel)?;
    let playlist_title = playlist.title.clone().unwrap_or_else(|| "Playlist".to_string());
    let items = playlist.entries.iter()
            .filter_map(|entry| {
                let item = entry.item();
                if item.is_none() {
                    log::warn!("skipping playlist entry without a url: {:?}", entry.title);
                }
                item
            })
            .collect::<Vec<_>>();
    let target_dir = config.output_dir.join(common::file_name_from(&playlist_title));
    fs::create_dir_all(&target_dir)?;
    log::info!(
        "fetching {} items of '{}' into {} with {} worker(s)",
        items.len(), playlist_title, target_dir.display(), config.workers
    );

    let pipeline = Pipeline::new(
        &config, target_dir, &resolver, &thumbnails, &transcoder, &Id3Writer, cancel.clone(),
    );
    let dispatcher = Dispatcher::new(config.workers, config.retry, cancel.clone());
    let report = dispatcher.run(items, |item| pipeline.process(item))?;
    summarise(&report)
}

fn summarise(report : &Report<PlaylistItem>) -> common::Result<()> {
    let skipped = report.succeeded.iter().filter(|(_, x)| *x == Completion::AlreadyDone).count();
    log::info!(
        "{} downloaded, {} already present, {} failed, {} cancelled",
        report.succeeded.len() - skipped, skipped, report.failed.len(), report.cancelled.len()
    );
    for failure in &report.failed {
        log::error!("failed after {} attempt(s): {}\n{}", failure.attempts, failure.item, failure.error);
    }
    for item in &report.cancelled {
        log::warn!("not processed: {}", item);
    }
    if report.is_complete() {
        Ok(())
    } else {
        Err(Error::Incomplete {
            failed : report.failed.len() + report.cancelled.len(),
            total : report.total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::dispatch::Failure;

    #[test]
    fn cli_values_take_precedence() {
        let options = FetchOptions {
            overwrite : Some(true),
            output_dir : Some(path::PathBuf::from("music")),
            workers : Some(0),
            retries : Some(7),
            timeout : Some(30),
        };
        let config = DownloadConfig::load(&options);
        assert!(config.overwrite);
        assert_eq!(config.output_dir, path::PathBuf::from("music"));
        assert_eq!(config.workers, 1);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn complete_report() {
        let report = Report {
            succeeded : vec![
                (PlaylistItem::new("a"), Completion::Done),
                (PlaylistItem::new("b"), Completion::AlreadyDone),
            ],
            failed : Vec::new(),
            cancelled : Vec::new(),
        };
        assert!(summarise(&report).is_ok());
    }

    #[test]
    fn failures_make_the_run_incomplete() {
        let report = Report {
            succeeded : vec![(PlaylistItem::new("a"), Completion::Done)],
            failed : vec![Failure { item : PlaylistItem::new("b"), attempts : 4, error : "gone".to_string() }],
            cancelled : vec![PlaylistItem::new("c")],
        };
        match summarise(&report) {
            Err(Error::Incomplete { failed, total }) => assert_eq!((failed, total), (2, 3)),
            other => panic!("expected an incomplete run, got {:?}", other),
        }
    }
}
