mod common;
mod cmd_fetch;
mod cmd_slice;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colog;

/// Playlist to MP3 helper.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command : Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Downloads every item of a YouTube playlist as a tagged mp3 file, with
    /// the thumbnail embedded as cover art.
    ///
    /// Requires `yt-dlp` and `ffmpeg`. Items that fail are retried with
    /// backoff; the exit code is non-zero if any item never succeeded.
    Fetch {
        /// Link to a public or unlisted playlist.
        playlist : String,
        /// Replace mp3 files that already exist.
        #[arg(long, overrides_with = "_no_overwrite")]
        overwrite : bool,
        /// Keep mp3 files that already exist (enabled by default).
        #[arg(long = "no-overwrite")]
        _no_overwrite : bool,
        /// Directory the playlist folder is created in (default: `downloads`).
        #[arg(short, long)]
        output_dir : Option<PathBuf>,
        /// Number of items processed at the same time (default: 5).
        #[arg(short = 'j', long)]
        workers : Option<usize>,
        /// Attempts per item before giving up on it (default: 4).
        #[arg(short, long)]
        retries : Option<u32>,
        /// Seconds any single download or conversion may take (default: 600).
        #[arg(long)]
        timeout : Option<u64>,
    },
    /// Splits one long mp3 into a file per track, using a `.description`
    /// file next to it that lists the album, the artist and the start time of
    /// every track.
    Slice {
        /// The mp3 to split; `<name>.description` is read alongside it.
        mp3_path : PathBuf,
        /// Track lines read `<time> - <title>` instead of `<title> - <time>`.
        #[arg(long)]
        time_first : bool,
        /// Track titles are not preceded by a track number.
        #[arg(long)]
        no_track_numbers : bool,
        /// Directory the album folder is created in.
        #[arg(short, long, default_value = ".")]
        output_dir : PathBuf,
        /// Copy the audio stream instead of re-encoding each track.
        #[arg(long)]
        copy : bool,
    },
}

fn main() -> ExitCode {
    colog::init();
    let cli = Cli::parse();
    let cancel = common::Cancel::new();
    cancel.install_handler();
    let result = match cli.command {
        Commands::Fetch { playlist, overwrite, _no_overwrite, output_dir, workers, retries, timeout } => {
            let options = cmd_fetch::FetchOptions {
                overwrite : if overwrite { Some(true) } else if _no_overwrite { Some(false) } else { None },
                output_dir,
                workers,
                retries,
                timeout,
            };
            cmd_fetch::run(&playlist, &options, &cancel)
        },
        Commands::Slice { mp3_path, time_first, no_track_numbers, output_dir, copy } => {
            let options = cmd_slice::SliceOptions {
                grammar : cmd_slice::description::Grammar {
                    time_first,
                    track_numbers : !no_track_numbers,
                },
                output_dir,
                codec_copy : copy,
            };
            cmd_slice::run(&mp3_path, &options, &cancel)
        },
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            log::error!("fatal error encountered:\n{}", msg);
            ExitCode::FAILURE
        },
    }
}
