use std::fmt;
use std::path;
use std::process;
use std::time::Duration;

use log;
use regex;
use serde::Deserialize;

use crate::common::{self, process as proc_util, Cancel, Error};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub title : Option<String>,
    #[serde(default)]
    pub entries : Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id : Option<String>,
    #[serde(default)]
    pub url : Option<String>,
    #[serde(default)]
    pub title : Option<String>,
    #[serde(default)]
    pub uploader : Option<String>,
    #[serde(default)]
    pub channel : Option<String>,
}

impl PlaylistEntry {
    /// URL used to fetch this entry, reconstructed from the id if needed.
    pub fn uri(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={}", id))
    }

    pub fn item(&self) -> Option<PlaylistItem> {
        Some(PlaylistItem {
            uri : self.uri()?,
            title : self.title.clone(),
            uploader : self.uploader.clone().or_else(|| self.channel.clone()),
        })
    }
}

/// A playlist entry queued for download, along with what the flat listing
/// already says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub uri : String,
    pub title : Option<String>,
    pub uploader : Option<String>,
}

impl PlaylistItem {
    pub fn new(uri : &str) -> Self {
        Self { uri : uri.to_string(), title : None, uploader : None }
    }

    /// Metadata for naming the item without resolving it, if the listing
    /// carried enough of it.
    pub fn listed_info(&self) -> Option<ItemInfo> {
        let title = self.title.as_deref().map(str::trim).filter(|x| !x.is_empty())?;
        let uploader = self.uploader.as_deref().map(str::trim).filter(|x| !x.is_empty())?;
        Some(ItemInfo {
            title : title.to_string(),
            uploader : Some(uploader.to_string()),
            ..ItemInfo::default()
        })
    }
}

impl fmt::Display for PlaylistItem {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Metadata of a single playlist item as reported by yt-dlp.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemInfo {
    #[serde(default)]
    pub id : String,
    pub title : String,
    #[serde(default)]
    pub uploader : Option<String>,
    #[serde(default)]
    pub channel : Option<String>,
    #[serde(default)]
    pub artist : Option<String>,
    #[serde(default)]
    pub album : Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration : Option<f64>,
    #[serde(default)]
    pub thumbnail : Option<String>,
    #[serde(default)]
    pub description : Option<String>,
}

pub trait ContentResolver : Sync {
    fn playlist(&self, uri : &str, cancel : &Cancel) -> common::Result<Playlist>;
    fn resolve(&self, uri : &str, cancel : &Cancel) -> common::Result<ItemInfo>;
    /// Downloads the best audio-only stream of `uri` to exactly `destination`.
    fn download_audio(&self, uri : &str, destination : &path::Path, cancel : &Cancel) -> common::Result<()>;
}

pub struct YtDlp {
    ytdlp_path : path::PathBuf,
    timeout : Duration,
}

impl YtDlp {
    pub fn new(ytdlp_path : path::PathBuf, timeout : Duration) -> Self {
        Self { ytdlp_path, timeout }
    }

    fn command(&self) -> process::Command {
        let mut proc = process::Command::new(&self.ytdlp_path);
        proc.args(["--no-warnings", "--no-progress"]);
        proc
    }

    fn dump_json(&self, uri : &str, args : &[&str], cancel : &Cancel) -> common::Result<serde_json::Value> {
        let mut proc = self.command();
        proc.arg("--dump-single-json");
        proc.args(args);
        proc.arg(uri);
        let output = proc_util::run(&mut proc, self.timeout, cancel).map_err(|err| match err {
            Error::Process { stderr, .. } => Error::Resolve { uri : uri.to_string(), reason : stderr },
            err => err,
        })?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl ContentResolver for YtDlp {
    fn playlist(&self, uri : &str, cancel : &Cancel) -> common::Result<Playlist> {
        let value = self.dump_json(uri, &["--flat-playlist", "--yes-playlist"], cancel)?;
        Ok(serde_json::from_value(value)?)
    }

    fn resolve(&self, uri : &str, cancel : &Cancel) -> common::Result<ItemInfo> {
        let value = self.dump_json(uri, &["--no-playlist"], cancel)?;
        Ok(serde_json::from_value(value)?)
    }

    fn download_audio(&self, uri : &str, destination : &path::Path, cancel : &Cancel) -> common::Result<()> {
        let mut proc = self.command();
        proc.args([
            "--no-playlist",
            "--no-part",
            "--force-overwrites",
            // skip video download, we don't need it
            "-f", "ba/b",
        ]);
        proc.arg("-o");
        // literal path, so `%` in titles can't be read as a template field
        proc.arg(destination.to_string_lossy().replace('%', "%%"));
        proc.arg(uri);
        proc_util::run(&mut proc, self.timeout, cancel)?;
        log::info!("{} successfully downloaded", destination.display());
        Ok(())
    }
}

const TOPIC_SUFFIX : &'static str = " - Topic";

/// Who made an item and whether it is a YouTube Music upload, derived from
/// the uploader name and the description text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub artist : String,
    pub album : Option<String>,
    pub is_music : bool,
}

pub struct OriginDetector {
    re_provided : regex::Regex,
}

impl OriginDetector {
    pub fn new() -> Self {
        Self {
            re_provided : regex::Regex::new(r"(?i)^\s*provided to youtube by\b").unwrap(),
        }
    }

    pub fn detect(&self, info : &ItemInfo) -> Origin {
        let uploader = info.artist.as_deref()
                .or(info.uploader.as_deref())
                .or(info.channel.as_deref())
                .unwrap_or("Unknown")
                .trim();
        let (artist, from_topic) = match uploader.strip_suffix(TOPIC_SUFFIX) {
            Some(artist) => (artist.trim(), true),
            None => (uploader, false),
        };
        let description = info.description.as_deref().unwrap_or("");
        let is_music = from_topic || self.re_provided.is_match(description);
        let album = info.album.as_deref()
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .map(String::from)
                .or_else(|| if is_music { self.infer_album(description) } else { None });
        Origin {
            // slashes screw with filepaths
            artist : artist.replace(['/', '\\'], ""),
            album,
            is_music,
        }
    }

    /// Auto-generated music descriptions read
    ///
    /// ```text
    /// Provided to YouTube by <label>
    ///
    /// <title> · <artist>
    ///
    /// <album>
    /// ```
    ///
    /// Anything that doesn't look like that yields no album.
    pub fn infer_album(&self, description : &str) -> Option<String> {
        let mut lines = description.lines().map(str::trim).filter(|x| !x.is_empty());
        let first = lines.next()?;
        if !self.re_provided.is_match(first) {
            return None;
        }
        let credits = lines.next()?;
        if !credits.contains('·') {
            return None;
        }
        let album = lines.next()?;
        if album.starts_with('℗') || album.starts_with("Released on:") {
            return None;
        }
        Some(album.to_string())
    }
}
