use std::path;

use audiotags::{self, AudioTag, AudioTagEdit, AudioTagWrite, MimeType, Picture, TagType};
use log;

use crate::common::{self, Error};

/// Fields written into a produced MP3. Absent fields are left untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TrackTags {
    pub artist : Option<String>,
    pub title : Option<String>,
    pub album : Option<String>,
    pub track_number : Option<u16>,
    /// JPEG encoded front cover.
    pub cover : Option<Vec<u8>>,
}

pub trait TagWriter : Sync {
    fn write(&self, file_path : &path::Path, tags : &TrackTags) -> common::Result<()>;
}

/// Writes ID3v2 tags through `audiotags`.
pub struct Id3Writer;

impl TagWriter for Id3Writer {
    fn write(&self, file_path : &path::Path, tags : &TrackTags) -> common::Result<()> {
        let mut tag : Box<dyn AudioTag + Send + Sync> = match audiotags::Tag::new()
                .with_tag_type(TagType::Id3v2)
                .read_from_path(file_path) {
            Ok(tag) => tag,
            Err(audiotags::Error::IOError(err)) => return Err(Error::Io(err)),
            Err(err) => {
                log::debug!("no existing tag in '{}' ({}), creating one", file_path.display(), err);
                Box::new(audiotags::Id3v2Tag::new())
            },
        };
        if let Some(artist) = &tags.artist {
            tag.set_artist(artist);
        }
        if let Some(title) = &tags.title {
            tag.set_title(title);
        }
        if let Some(album) = &tags.album {
            tag.set_album_title(album);
        }
        if let Some(track_number) = tags.track_number {
            tag.set_track_number(track_number);
        }
        if let Some(cover) = &tags.cover {
            tag.set_album_cover(Picture::new(cover, MimeType::Jpeg));
        }
        let file_path = file_path.to_str().ok_or_else(|| Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path is not valid UTF-8: {}", file_path.display()),
        )))?;
        tag.write_to_path(file_path)?;
        Ok(())
    }
}
