pub mod dispatch;
pub mod ffmpeg;
pub mod process;
pub mod tags;

use std::fs;
use std::path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use which::which;
use toml;
use log;

use crate::cmd_slice::description::ParseError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not resolve '{uri}': {reason}")]
    Resolve { uri : String, reason : String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("`{program}` exited with {status}\n{stderr}")]
    Process { program : String, status : String, stderr : String },
    #[error("`{program}` timed out after {}s", .after.as_secs())]
    Timeout { program : String, after : Duration },
    #[error("cancelled")]
    Cancelled,
    #[error("failed to write tags: {0}")]
    Tag(#[from] audiotags::Error),
    #[error("failed to process thumbnail: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("an executable to `{0}` is required for this command")]
    MissingTool(&'static str),
    #[error("{failed} of {total} items did not complete")]
    Incomplete { failed : usize, total : usize },
}

const CONFIG_PATH : &'static str = "mixtape.toml";

fn config_table() -> Option<toml::Table> {
    let file = fs::read_to_string(CONFIG_PATH).ok()?;
    match file.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(err) => {
            log::warn!("ignoring malformed config file '{}'\n{}", CONFIG_PATH, err);
            None
        },
    }
}

pub fn find_config(key : &str) -> Option<String> {
    let value = config_table()?;
    let toml_value = value.get(key)?.as_str()?;
    return Some(toml_value.to_owned());
}

pub fn find_config_integer(key : &str) -> Option<u64> {
    let value = config_table()?;
    let toml_value = value.get(key)?.as_integer()?;
    u64::try_from(toml_value).ok()
}

fn find_tool_in_config(key : &str) -> Option<path::PathBuf> {
    let config_path = find_config(key)?;
    match fs::exists(&config_path) {
        Ok(true) => return Some(config_path.into()),
        Ok(false) => (),
        Err(msg) => log::error!("{}", msg),
    }
    log::warn!("installation does not exist at: {}\n\
                looking for installation in PATH", config_path);
    None
}

pub fn find_ytdlp_path() -> Option<path::PathBuf> {
    if let Some(ytdlp_path) = find_tool_in_config("yt-dlp") {
        return Some(ytdlp_path);
    }
    if let Ok(ytdlp_path) = which("yt-dlp") {
        return Some(ytdlp_path);
    }
    log::warn!("cannot find executable to `yt-dlp`, falling back to `youtube-dl`...");
    if let Ok(youtubedl_path) = which("youtube-dl") {
        return Some(youtubedl_path);
    }
    return None;
}

pub fn find_ffmpeg_path() -> Option<path::PathBuf> {
    if let Some(ffmpeg_path) = find_tool_in_config("ffmpeg") {
        return Some(ffmpeg_path);
    }
    which("ffmpeg").ok()
}

pub fn find_ffprobe_path() -> Option<path::PathBuf> {
    if let Some(ffprobe_path) = find_tool_in_config("ffprobe") {
        return Some(ffprobe_path);
    }
    if let Ok(ffprobe_path) = which("ffprobe") {
        return Some(ffprobe_path);
    }
    log::warn!("cannot find executable to `ffprobe`, output durations will not be checked");
    return None;
}

/// Shared flag raised on interrupt. Work that has not started yet is dropped,
/// running subprocesses are killed.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises the flag when the process receives Ctrl-C.
    pub fn install_handler(&self) {
        let flag = self.clone();
        let result = ctrlc::set_handler(move || {
            log::warn!("interrupt received, waiting for running tasks to stop...");
            flag.cancel();
        });
        if let Err(err) = result {
            log::warn!("failed to install interrupt handler: {}", err);
        }
    }
}

/// Turns arbitrary text into something safe to use as a single path component.
pub fn file_name_from(text : &str) -> String {
    sanitise_file_name::sanitise_with_options(text,
        &sanitise_file_name::Options { trim_more_punctuation : false, ..sanitise_file_name::Options::DEFAULT }
    )
}
