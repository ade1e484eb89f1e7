use ndarray::{ArrayView3, ShapeError};

/// Number of interleaved color channels every frame carries.
pub const FRAME_CHANNELS: usize = 3;

/// A single captured frame: contiguous RGB bytes in row-major order plus
/// the monotonic capture timestamp it was taken at.
///
/// Pixel-format conversion happens at the host boundary; the pipeline
/// only ever sees flat 3-channel 8-bit data.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    timestamp_ns: u64,
}

impl Frame {
    /// Wraps `data` without validating it; see [`Frame::is_well_formed`].
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, timestamp_ns: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Buffer length implied by the declared dimensions.
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * FRAME_CHANNELS
    }

    /// Non-empty, and the buffer holds exactly `width * height * 3` bytes.
    pub fn is_well_formed(&self) -> bool {
        !self.is_empty() && self.data.len() == self.expected_len()
    }

    /// Copies the pixels into an `image` buffer for resampling.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// `[height, width, channel]` view; fails unless the frame is well formed.
    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>, ShapeError> {
        ArrayView3::from_shape(self.shape(), &self.data)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, FRAME_CHANNELS)
    }
}
