// THEORY:
// The `Frame` module is the only place in the engine that knows how pixels are
// laid out in memory. The capture side hands us a flat byte buffer plus its
// dimensions and channel count; everything downstream asks for one number per
// pixel through `intensity_at(x, y)` and never does stride math itself.
//
// Key architectural principles:
// 1.  **Borrowed, Never Retained**: A `Frame` is a view over the caller's buffer.
//     It lives for one tick and the engine never keeps it.
// 2.  **One Channel of Truth**: Color is not processed. A gray frame reports its
//     single channel; an RGB(A) frame reports its Rec. 709 luma, which is the
//     same weighting the thresholding stage of the camera filter uses.
// 3.  **Checked Access**: Coordinates outside the frame yield `None` instead of
//     indexing past the buffer. The buffer length is validated once, up front.
//
// `BinaryFrame` is the owned, single-channel result of the thresholding stage.
// Its pixels are always 0 or 255.

pub mod frame {
    use crate::error::FrameError;
    use image::{GrayImage, RgbaImage};

    pub type Channel = u8;
    pub type Intensity = u8;

    pub const GRAY: usize = 1;
    pub const RGB: usize = 3;
    pub const RGBA: usize = 4;

    /// A borrowed view of one captured frame.
    #[derive(Debug, Clone, Copy)]
    pub struct Frame<'a> {
        data: &'a [Channel],
        width: u32,
        height: u32,
        channels: usize,
    }

    impl<'a> Frame<'a> {
        /// Wraps a tightly packed buffer of `width * height * channels` bytes.
        /// Extra trailing bytes are ignored.
        pub fn new(
            data: &'a [Channel],
            width: u32,
            height: u32,
            channels: usize,
        ) -> Result<Self, FrameError> {
            if !matches!(channels, GRAY | RGB | RGBA) {
                return Err(FrameError::UnsupportedChannels(channels));
            }
            let expected = width as usize * height as usize * channels;
            if data.len() < expected {
                return Err(FrameError::Truncated {
                    expected,
                    actual: data.len(),
                });
            }
            Ok(Self {
                data,
                width,
                height,
                channels,
            })
        }

        pub fn rgba(data: &'a [Channel], width: u32, height: u32) -> Result<Self, FrameError> {
            Self::new(data, width, height, RGBA)
        }

        pub fn gray(data: &'a [Channel], width: u32, height: u32) -> Result<Self, FrameError> {
            Self::new(data, width, height, GRAY)
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn channels(&self) -> usize {
            self.channels
        }

        pub fn is_empty(&self) -> bool {
            self.width == 0 || self.height == 0
        }

        /// Intensity of the pixel at `(x, y)`, or `None` outside the frame.
        pub fn intensity_at(&self, x: u32, y: u32) -> Option<Intensity> {
            if x >= self.width || y >= self.height {
                return None;
            }
            let offset = (y as usize * self.width as usize + x as usize) * self.channels;
            let pixel = self.data.get(offset..offset + self.channels)?;
            Some(match pixel {
                [value] => *value,
                [red, green, blue, ..] => luma(*red, *green, *blue),
                _ => return None,
            })
        }
    }

    impl<'a> From<&'a RgbaImage> for Frame<'a> {
        fn from(image: &'a RgbaImage) -> Self {
            Frame {
                data: image.as_raw(),
                width: image.width(),
                height: image.height(),
                channels: RGBA,
            }
        }
    }

    impl<'a> From<&'a GrayImage> for Frame<'a> {
        fn from(image: &'a GrayImage) -> Self {
            Frame {
                data: image.as_raw(),
                width: image.width(),
                height: image.height(),
                channels: GRAY,
            }
        }
    }

    /// Rec. 709 luma, rounded to the nearest byte.
    pub fn luma(red: Channel, green: Channel, blue: Channel) -> Intensity {
        let value = 0.2126_f32 * f32::from(red)
            + 0.7152_f32 * f32::from(green)
            + 0.0722_f32 * f32::from(blue);
        value.round().clamp(0.0, 255.0) as Intensity
    }

    /// Output of the thresholding stage: a single channel that is either 0 or 255.
    #[derive(Debug, Clone, PartialEq)]
    pub struct BinaryFrame {
        image: GrayImage,
    }

    impl BinaryFrame {
        pub(crate) fn from_image(image: GrayImage) -> Self {
            Self { image }
        }

        pub fn empty() -> Self {
            Self {
                image: GrayImage::new(0, 0),
            }
        }

        pub fn width(&self) -> u32 {
            self.image.width()
        }

        pub fn height(&self) -> u32 {
            self.image.height()
        }

        pub fn is_empty(&self) -> bool {
            self.width() == 0 || self.height() == 0
        }

        pub fn intensity_at(&self, x: u32, y: u32) -> Option<Intensity> {
            self.image.get_pixel_checked(x, y).map(|pixel| pixel.0[0])
        }

        /// The thresholded pixels, e.g. for saving a preview.
        pub fn into_image(self) -> GrayImage {
            self.image
        }
    }
}
