use super::*;

fn as_strings(args : Vec<OsString>) -> Vec<String> {
    args.into_iter().map(|x| x.to_string_lossy().into_owned()).collect()
}

#[test]
fn strip_video_job() {
    let mut job = TranscodeJob::new("in.webm", "out.mp3");
    job.strip_video = true;
    assert_eq!(
        as_strings(job.args()),
        ["-y", "-hide_banner", "-nostdin", "-i", "in.webm", "-vn", "out.mp3"],
    );
}

#[test]
fn bounded_slice_job() {
    let mut job = TranscodeJob::new("album.mp3", "Album/Album - 2 - Main.mp3");
    job.offset = Some(90);
    job.duration = Some(135);
    job.write_xing = false;
    assert_eq!(
        as_strings(job.args()),
        [
            "-y", "-hide_banner", "-nostdin",
            "-ss", "90",
            "-i", "album.mp3",
            "-t", "135",
            "-write_xing", "0",
            "Album/Album - 2 - Main.mp3",
        ],
    );
}

#[test]
fn unbounded_copy_job() {
    let mut job = TranscodeJob::new("album.mp3", "last.mp3");
    job.offset = Some(225);
    job.codec_copy = true;
    let args = as_strings(job.args());
    assert!(!args.contains(&"-t".to_string()));
    let copy = args.iter().position(|x| x == "-c:a").unwrap();
    assert_eq!(args[copy + 1], "copy");
    assert_eq!(args.last().unwrap(), "last.mp3");
}

#[test]
fn parse_probe_output() {
    assert_eq!(parse_duration("213.456000\n"), Some(213.456));
    assert_eq!(parse_duration("N/A\n"), None);
    assert_eq!(parse_duration(""), None);
}

#[test]
fn doubled_duration_is_inflated() {
    assert!(duration_inflated(200.0, 400.0));
    assert!(!duration_inflated(200.0, 201.5));
    // long sources get a proportional tolerance
    assert!(!duration_inflated(3600.0, 3650.0));
    assert!(duration_inflated(3600.0, 7200.0));
}

#[test]
fn shorter_output_is_not_inflated() {
    assert!(!duration_inflated(400.0, 200.0));
    assert!(duration_truncated(400.0, 200.0));
    assert!(!duration_truncated(200.0, 198.5));
    assert!(!duration_truncated(200.0, 400.0));
}
