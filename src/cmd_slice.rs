pub mod description;

use std::fs;
use std::path;
use std::time::Duration;

use log;

use crate::common::{self, Cancel, Error};
use crate::common::ffmpeg::{Ffmpeg, TranscodeJob, Transcoder};
use crate::common::tags::{Id3Writer, TagWriter, TrackTags};
use description::{AlbumDescription, Grammar, TrackSpan};

const SLICE_TIMEOUT : Duration = Duration::from_secs(30 * 60);

pub struct SliceOptions {
    pub grammar : Grammar,
    pub output_dir : path::PathBuf,
    pub codec_copy : bool,
}

pub fn run(mp3_path : &path::Path, options : &SliceOptions, cancel : &Cancel) -> common::Result<()> {
    let description_path = mp3_path.with_extension("description");
    log::info!("reading track list from: {}", description_path.display());
    let text = fs::read_to_string(&description_path)?;
    let description = description::parse(&text, options.grammar)?;
    log::info!(
        "found {} tracks of '{}' by '{}'",
        description.tracks.len(), description.album, description.artist
    );
    let Some(ffmpeg_path) = common::find_ffmpeg_path() else {
        log::info!("make sure `ffmpeg` is in your PATH\n\
                    alternatively, add `ffmpeg = <path>` to your `mixtape.toml`");
        return Err(Error::MissingTool("ffmpeg"));
    };
    let transcoder = Ffmpeg::new(ffmpeg_path, None, SLICE_TIMEOUT);
    slice_album(mp3_path, &description, options, &transcoder, &Id3Writer, cancel)
}

/// Name of the file a track is written to, relative to the album directory.
pub fn track_file_name(album : &str, number : Option<u32>, title : &str) -> String {
    let file_name = match number {
        Some(number) => format!("{} - {} - {}.mp3", album, number, title),
        None => format!("{} - {}.mp3", album, title),
    };
    common::file_name_from(&file_name)
}

fn slice_job(source : &path::Path, output : path::PathBuf, span : &TrackSpan, codec_copy : bool) -> TranscodeJob {
    let mut job = TranscodeJob::new(source, output);
    job.offset = Some(span.start);
    job.duration = span.duration();
    job.codec_copy = codec_copy;
    job.write_xing = false;
    job
}

pub fn slice_album(
    source : &path::Path,
    description : &AlbumDescription,
    options : &SliceOptions,
    transcoder : &dyn Transcoder,
    tagger : &dyn TagWriter,
    cancel : &Cancel,
) -> common::Result<()> {
    let album_dir = options.output_dir.join(common::file_name_from(&description.album));
    fs::create_dir_all(&album_dir)?;
    let tracks_n = description.tracks.len();
    for (i, span) in description.spans().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let track = span.track;
        log::info!("track [{} / {}] '{}'", i + 1, tracks_n, track.title);
        let output = album_dir.join(track_file_name(&description.album, track.number, &track.title));
        let job = slice_job(source, output.clone(), &span, options.codec_copy);
        transcoder.transcode(&job, cancel)?;
        let tags = TrackTags {
            artist : Some(description.artist.clone()),
            title : Some(track.title.clone()),
            album : Some(description.album.clone()),
            track_number : track.number.and_then(|x| u16::try_from(x).ok()),
            cover : None,
        };
        tagger.write(&output, &tags)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
