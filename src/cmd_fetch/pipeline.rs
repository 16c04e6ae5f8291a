//! Turns one playlist item into a tagged MP3.
//!
//! Stages run in order and are not rolled back: an item that fails halfway
//! is simply attempted again from the top, overwriting its leftovers.

use std::fmt;
use std::fs;
use std::path;
use std::time::Duration;

use log;

use crate::common::{self, Cancel};
use crate::common::dispatch::{Completion, RetryPolicy};
use crate::common::ffmpeg::{self, TranscodeJob, Transcoder};
use crate::common::tags::{TagWriter, TrackTags};
use super::resolver::{ContentResolver, ItemInfo, OriginDetector, PlaylistItem};
use super::thumbnail::{self, ThumbnailSource};

/// Settings of one fetch run.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub overwrite : bool,
    /// Directory the finished files are written to.
    pub output_dir : path::PathBuf,
    pub workers : usize,
    pub retry : RetryPolicy,
    /// Upper bound on every external call made while processing an item.
    pub timeout : Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            overwrite : false,
            output_dir : path::PathBuf::from("downloads"),
            workers : 5,
            retry : RetryPolicy::default(),
            timeout : Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Downloading,
    Converting,
    Tagging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Resolving => "resolving",
            Stage::Downloading => "downloading",
            Stage::Converting => "converting",
            Stage::Tagging => "tagging",
        })
    }
}

/// Name of the finished file for an item.
pub fn mp3_file_name(title : &str, artist : &str) -> String {
    let title = title.replace(['/', '\\'], "");
    common::file_name_from(&format!("{} - {}.mp3", title.trim(), artist.trim()))
}

/// Files produced while an item is in flight. Whatever exists is removed
/// when the item finishes, successfully or not.
struct Scratch {
    paths : Vec<path::PathBuf>,
}

impl Scratch {
    fn new(mp3_path : &path::Path) -> Self {
        let stem = mp3_path.file_stem().map(|x| x.to_string_lossy().into_owned()).unwrap_or_default();
        let dir = mp3_path.parent().unwrap_or(path::Path::new("."));
        Self {
            paths : vec![
                dir.join(format!("{}.download", stem)),
                dir.join(format!("{}.unfixed.mp3", stem)),
                dir.join(format!("{}.jpeg", stem)),
            ],
        }
    }

    fn download(&self) -> &path::Path { &self.paths[0] }
    fn unfixed(&self) -> &path::Path { &self.paths[1] }
    fn thumbnail(&self) -> &path::Path { &self.paths[2] }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for scratch_path in &self.paths {
            match fs::remove_file(scratch_path) {
                Ok(()) => log::debug!("{} removed", scratch_path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
                Err(err) => log::warn!("failed to remove '{}': {}", scratch_path.display(), err),
            }
        }
    }
}

pub struct Pipeline<'a> {
    pub config : &'a DownloadConfig,
    /// Directory of this playlist, inside the output directory.
    pub target_dir : path::PathBuf,
    pub resolver : &'a dyn ContentResolver,
    pub thumbnails : &'a dyn ThumbnailSource,
    pub transcoder : &'a dyn Transcoder,
    pub tagger : &'a dyn TagWriter,
    pub cancel : Cancel,
    detector : OriginDetector,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config : &'a DownloadConfig,
        target_dir : path::PathBuf,
        resolver : &'a dyn ContentResolver,
        thumbnails : &'a dyn ThumbnailSource,
        transcoder : &'a dyn Transcoder,
        tagger : &'a dyn TagWriter,
        cancel : Cancel,
    ) -> Self {
        Self {
            config,
            target_dir,
            resolver,
            thumbnails,
            transcoder,
            tagger,
            cancel,
            detector : OriginDetector::new(),
        }
    }

    /// Where an item's finished file goes.
    fn destination(&self, info : &ItemInfo) -> path::PathBuf {
        let origin = self.detector.detect(info);
        self.target_dir.join(mp3_file_name(&info.title, &origin.artist))
    }

    fn already_present(&self, mp3_path : &path::Path) -> bool {
        if self.config.overwrite || !mp3_path.exists() {
            return false;
        }
        log::info!("audio file {} already exists, skipping...", mp3_path.display());
        true
    }

    /// Processes a single item from start to finish.
    ///
    /// When the playlist listing named the title and uploader, an existing
    /// file is found without any network call. Otherwise the item has to be
    /// resolved before its destination is known.
    pub fn process(&self, item : &PlaylistItem) -> common::Result<Completion> {
        let uri = item.uri.as_str();
        if let Some(listed) = item.listed_info() {
            if self.already_present(&self.destination(&listed)) {
                return Ok(Completion::AlreadyDone);
            }
        }
        log::info!("{} {}", Stage::Resolving, uri);
        let info = self.resolver.resolve(uri, &self.cancel)?;
        let origin = self.detector.detect(&info);
        let mp3_path = self.destination(&info);
        if self.already_present(&mp3_path) {
            return Ok(Completion::AlreadyDone);
        }
        log::info!("preparing '{}' [{}] from {}", info.title, info.id, uri);
        let scratch = Scratch::new(&mp3_path);
        let cover = self.fetch_cover(&info, origin.is_music, scratch.thumbnail());

        log::info!("{} {}", Stage::Downloading, uri);
        self.resolver.download_audio(uri, scratch.download(), &self.cancel)?;

        log::info!("{} {}", Stage::Converting, scratch.download().display());
        self.convert(&info, scratch.download(), scratch.unfixed(), &mp3_path)?;

        log::info!("{} {}", Stage::Tagging, mp3_path.display());
        let tags = TrackTags {
            artist : Some(origin.artist),
            title : Some(info.title.clone()),
            album : origin.album,
            track_number : None,
            cover,
        };
        self.tagger.write(&mp3_path, &tags)?;
        log::info!("{} done", mp3_path.display());
        Ok(Completion::Done)
    }

    /// A missing cover is not worth failing the item over.
    fn fetch_cover(&self, info : &ItemInfo, is_music : bool, thumbnail_path : &path::Path) -> Option<Vec<u8>> {
        let url = info.thumbnail.as_deref()?;
        let result = self.thumbnails.fetch(url, &self.cancel)
                .and_then(|data| thumbnail::make_cover(&data, is_music))
                .and_then(|cover| {
                    fs::write(thumbnail_path, &cover)?;
                    Ok(cover)
                });
        match result {
            Ok(cover) => Some(cover),
            Err(err) => {
                log::warn!("no cover art for '{}': {}", info.title, err);
                None
            },
        }
    }

    /// Re-encodes the download to MP3. If the result reports a length well
    /// beyond the source's, a second pass rewrites it with the length the
    /// source claims.
    fn convert(
        &self,
        info : &ItemInfo,
        download : &path::Path,
        unfixed : &path::Path,
        mp3_path : &path::Path,
    ) -> common::Result<()> {
        let mut job = TranscodeJob::new(download, unfixed);
        job.strip_video = true;
        self.transcoder.transcode(&job, &self.cancel)?;
        let actual = match info.duration {
            Some(_) => self.transcoder.probe_duration(unfixed, &self.cancel)?,
            None => None,
        };
        match (info.duration, actual) {
            (Some(expected), Some(actual)) if ffmpeg::duration_inflated(expected, actual) => {
                log::warn!(
                    "{} reports {:.0}s but the source is {:.0}s long, re-encoding",
                    unfixed.display(), actual, expected
                );
                let mut fix = TranscodeJob::new(unfixed, mp3_path);
                fix.duration = Some(expected.ceil() as u64);
                self.transcoder.transcode(&fix, &self.cancel)?;
            },
            (Some(expected), Some(actual)) => {
                if ffmpeg::duration_truncated(expected, actual) {
                    log::warn!(
                        "{} reports {:.0}s but the source is {:.0}s long, keeping it as is",
                        unfixed.display(), actual, expected
                    );
                }
                fs::rename(unfixed, mp3_path)?;
            },
            _ => fs::rename(unfixed, mp3_path)?,
        }
        Ok(())
    }
}
