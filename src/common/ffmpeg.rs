use std::ffi::OsString;
use std::path;
use std::process;
use std::time::Duration;

use log;

use crate::common::{self, process as proc_util, Cancel};

/// One invocation of the transcoder: read `input`, write `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input : path::PathBuf,
    pub output : path::PathBuf,
    /// Drop any video streams.
    pub strip_video : bool,
    /// Start reading the input at this many seconds.
    pub offset : Option<u64>,
    /// Stop after this many seconds of output.
    pub duration : Option<u64>,
    /// Copy the audio stream instead of re-encoding it.
    pub codec_copy : bool,
    /// Write a Xing/LAME header. Disabled for slices so players don't trust
    /// a stale frame count.
    pub write_xing : bool,
}

impl TranscodeJob {
    pub fn new(input : impl Into<path::PathBuf>, output : impl Into<path::PathBuf>) -> Self {
        Self {
            input : input.into(),
            output : output.into(),
            strip_video : false,
            offset : None,
            duration : None,
            codec_copy : false,
            write_xing : true,
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args : Vec<OsString> = vec!["-y".into(), "-hide_banner".into(), "-nostdin".into()];
        if let Some(offset) = self.offset {
            // as an input option, so ffmpeg seeks instead of decoding up to the offset
            args.push("-ss".into());
            args.push(offset.to_string().into());
        }
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());
        if let Some(duration) = self.duration {
            args.push("-t".into());
            args.push(duration.to_string().into());
        }
        if self.strip_video {
            args.push("-vn".into());
        }
        if self.codec_copy {
            args.push("-c:a".into());
            args.push("copy".into());
        }
        if !self.write_xing {
            args.push("-write_xing".into());
            args.push("0".into());
        }
        args.push(self.output.clone().into_os_string());
        args
    }
}

pub trait Transcoder : Sync {
    fn transcode(&self, job : &TranscodeJob, cancel : &Cancel) -> common::Result<()>;

    /// Duration of a media file in seconds, if it can be determined.
    fn probe_duration(&self, file : &path::Path, cancel : &Cancel) -> common::Result<Option<f64>>;
}

pub struct Ffmpeg {
    ffmpeg_path : path::PathBuf,
    ffprobe_path : Option<path::PathBuf>,
    timeout : Duration,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path : path::PathBuf, ffprobe_path : Option<path::PathBuf>, timeout : Duration) -> Self {
        Self { ffmpeg_path, ffprobe_path, timeout }
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(&self, job : &TranscodeJob, cancel : &Cancel) -> common::Result<()> {
        let mut proc = process::Command::new(&self.ffmpeg_path);
        proc.args(job.args());
        proc_util::run(&mut proc, self.timeout, cancel)?;
        log::info!("{} created", job.output.display());
        Ok(())
    }

    fn probe_duration(&self, file : &path::Path, cancel : &Cancel) -> common::Result<Option<f64>> {
        let Some(ffprobe_path) = &self.ffprobe_path else {
            return Ok(None);
        };
        let mut proc = process::Command::new(ffprobe_path);
        proc.args([
            "-v", "error",
            "-show_entries", "format=duration",
            "-of", "default=noprint_wrappers=1:nokey=1",
        ]);
        proc.arg(file);
        let output = proc_util::run(&mut proc, self.timeout, cancel)?;
        Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_duration(text : &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|x| x.is_finite() && *x >= 0.0)
}

fn duration_tolerance(expected : f64) -> f64 {
    const TOLERANCE_SECS : f64 = 2.0;
    const TOLERANCE_RATIO : f64 = 0.05;
    TOLERANCE_SECS.max(expected * TOLERANCE_RATIO)
}

/// Whether a produced file is suspiciously longer than its source claims to
/// be. YouTube audio streams sometimes come out reporting twice their length.
pub fn duration_inflated(expected : f64, actual : f64) -> bool {
    actual - expected > duration_tolerance(expected)
}

/// Whether a produced file is noticeably shorter than its source. A second
/// pass bounded to the source length cannot lengthen it, so this is only
/// worth a warning.
pub fn duration_truncated(expected : f64, actual : f64) -> bool {
    expected - actual > duration_tolerance(expected)
}

#[cfg(test)]
mod tests;
