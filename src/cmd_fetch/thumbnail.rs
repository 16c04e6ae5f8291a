use std::time::Duration;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::common::{self, Cancel, Error};

/// Largest edge of an embedded cover.
pub const COVER_SIZE : u32 = 300;
const JPEG_QUALITY : u8 = 90;

pub trait ThumbnailSource : Sync {
    fn fetch(&self, url : &str, cancel : &Cancel) -> common::Result<Vec<u8>>;
}

pub struct HttpThumbnails {
    client : reqwest::blocking::Client,
}

impl HttpThumbnails {
    pub fn new(timeout : Duration) -> common::Result<Self> {
        let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
        Ok(Self { client })
    }
}

impl ThumbnailSource for HttpThumbnails {
    fn fetch(&self, url : &str, cancel : &Cancel) -> common::Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

/// Pixel rectangle as `(x, y, width, height)`.
pub type Region = (u32, u32, u32, u32);

/// Picks the part of a thumbnail worth keeping. 4:3 thumbnails carry the
/// 16:9 picture between black bars, which are cut off. Music uploads show
/// square cover art in the middle of that picture.
pub fn cover_region(width : u32, height : u32, is_music : bool) -> Region {
    let picture_height = (width * 9 / 16).min(height);
    let top = (height - picture_height) / 2;
    if is_music {
        let side = picture_height.min(width);
        ((width - side) / 2, top, side, side)
    } else {
        (0, top, width, picture_height)
    }
}

/// Crops a downloaded thumbnail, shrinks it to fit the cover size and
/// re-encodes it as JPEG.
pub fn make_cover(data : &[u8], is_music : bool) -> common::Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let (x, y, width, height) = cover_region(img.width(), img.height(), is_music);
    let mut cropped = img.crop_imm(x, y, width, height);
    if cropped.width() > COVER_SIZE || cropped.height() > COVER_SIZE {
        cropped = cropped.resize(COVER_SIZE, COVER_SIZE, FilterType::Lanczos3);
    }
    // jpeg has no alpha channel
    let rgb = cropped.to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(buffer)
}
