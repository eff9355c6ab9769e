use anyhow::{Context, Result, bail};
use image::{RgbaImage, imageops};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Pacing for a still image, roughly a 30 fps camera.
const STILL_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Where frames come from. Every frame is mirrored horizontally and handed
/// out as RGBA, which is what the pipeline expects from a user-facing camera.
pub enum FrameSource {
    Camera { capture: VideoCapture, raw: Mat },
    Still { image: RgbaImage },
}

impl FrameSource {
    pub fn camera(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("opening camera {index}"))?;
        if !capture.is_opened()? {
            bail!("camera {index} could not be opened");
        }
        info!(
            index,
            width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
            "camera opened"
        );
        Ok(FrameSource::Camera {
            capture,
            raw: Mat::default(),
        })
    }

    pub fn still(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("loading image {}", path.display()))?
            .to_rgba8();
        info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "using still image as video source"
        );
        Ok(FrameSource::Still {
            image: imageops::flip_horizontal(&image),
        })
    }

    /// Blocks until the next frame is available. `None` once the source is
    /// exhausted. A camera hiccup yields an empty image rather than an error.
    pub fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        match self {
            FrameSource::Camera { capture, raw } => {
                if !capture.read(raw)? {
                    return Ok(None);
                }
                if raw.empty() {
                    return Ok(Some(RgbaImage::new(0, 0)));
                }
                mirrored_rgba(raw).map(Some)
            }
            FrameSource::Still { image } => {
                std::thread::sleep(STILL_FRAME_INTERVAL);
                Ok(Some(image.clone()))
            }
        }
    }
}

/// Converts an OpenCV BGR frame into a mirrored RGBA image.
fn mirrored_rgba(bgr: &Mat) -> Result<RgbaImage> {
    let mut mirrored = Mat::default();
    core::flip(bgr, &mut mirrored, 1)?;
    let mut rgba = Mat::default();
    imgproc::cvt_color(&mirrored, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)?;

    let width = u32::try_from(rgba.cols()).context("negative frame width")?;
    let height = u32::try_from(rgba.rows()).context("negative frame height")?;
    let buffer = rgba.data_bytes()?.to_vec();
    RgbaImage::from_raw(width, height, buffer).context("converted frame has an unexpected size")
}
