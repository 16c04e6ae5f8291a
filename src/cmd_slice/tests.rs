use std::sync::Mutex;

use super::*;

#[derive(Default)]
struct RecordingTranscoder {
    jobs : Mutex<Vec<TranscodeJob>>,
}

impl Transcoder for RecordingTranscoder {
    fn transcode(&self, job : &TranscodeJob, _ : &Cancel) -> common::Result<()> {
        fs::write(&job.output, b"mp3")?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    fn probe_duration(&self, _ : &path::Path, _ : &Cancel) -> common::Result<Option<f64>> {
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingTagger {
    written : Mutex<Vec<(path::PathBuf, TrackTags)>>,
}

impl TagWriter for RecordingTagger {
    fn write(&self, file_path : &path::Path, tags : &TrackTags) -> common::Result<()> {
        self.written.lock().unwrap().push((file_path.to_path_buf(), tags.clone()));
        Ok(())
    }
}

fn sample() -> AlbumDescription {
    let text = "Album\nArtist\n1 Intro - 0:00\n2 Main - 1:30\n3 Outro - 3:45\n";
    description::parse(text, Grammar::default()).unwrap()
}

#[test]
fn file_names() {
    assert_eq!(track_file_name("Album", Some(2), "Main"), "Album - 2 - Main.mp3");
    assert_eq!(track_file_name("Album", None, "Main"), "Album - Main.mp3");
    assert_eq!(
        track_file_name("AC/DC Live", Some(1), "Intro"),
        track_file_name("AC/DC Live", Some(1), "Intro"),
    );
    assert!(!track_file_name("AC/DC Live", Some(1), "Intro").contains('/'));
}

#[test]
fn slices_every_track() {
    let dir = tempfile::tempdir().unwrap();
    let options = SliceOptions {
        grammar : Grammar::default(),
        output_dir : dir.path().to_path_buf(),
        codec_copy : false,
    };
    let transcoder = RecordingTranscoder::default();
    let tagger = RecordingTagger::default();
    let source = dir.path().join("whole.mp3");
    slice_album(&source, &sample(), &options, &transcoder, &tagger, &Cancel::new()).unwrap();

    let jobs = transcoder.jobs.into_inner().unwrap();
    let ranges = jobs.iter().map(|x| (x.offset, x.duration)).collect::<Vec<_>>();
    assert_eq!(ranges, [(Some(0), Some(90)), (Some(90), Some(135)), (Some(225), None)]);
    assert!(jobs.iter().all(|x| x.input == source && !x.write_xing));
    assert_eq!(jobs[1].output, dir.path().join("Album").join("Album - 2 - Main.mp3"));
    assert!(jobs[2].output.exists());

    let written = tagger.written.into_inner().unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written[2].1, TrackTags {
        artist : Some("Artist".to_string()),
        title : Some("Outro".to_string()),
        album : Some("Album".to_string()),
        track_number : Some(3),
        cover : None,
    });
}

#[test]
fn cancelled_before_first_track() {
    let dir = tempfile::tempdir().unwrap();
    let options = SliceOptions {
        grammar : Grammar::default(),
        output_dir : dir.path().to_path_buf(),
        codec_copy : true,
    };
    let cancel = Cancel::new();
    cancel.cancel();
    let transcoder = RecordingTranscoder::default();
    let result = slice_album(
        &dir.path().join("whole.mp3"), &sample(), &options, &transcoder, &RecordingTagger::default(), &cancel,
    );
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(transcoder.jobs.into_inner().unwrap().is_empty());
}

#[test]
fn missing_description_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = SliceOptions {
        grammar : Grammar::default(),
        output_dir : dir.path().to_path_buf(),
        codec_copy : false,
    };
    let result = run(&dir.path().join("nothing.mp3"), &options, &Cancel::new());
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn malformed_description_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("whole.description"), "Album\nArtist\n1 Intro 0:00\n").unwrap();
    let options = SliceOptions {
        grammar : Grammar::default(),
        output_dir : dir.path().to_path_buf(),
        codec_copy : false,
    };
    let result = run(&dir.path().join("whole.mp3"), &options, &Cancel::new());
    match result {
        Err(Error::Parse(err)) => assert_eq!(err.line, 3),
        other => panic!("expected a parse error, got {:?}", other),
    }
    assert!(!dir.path().join("Album").exists());
}
