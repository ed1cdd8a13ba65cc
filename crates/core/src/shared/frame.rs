use ndarray::ArrayView3;

/// A single decoded frame: contiguous RGB bytes in row-major order.
///
/// `index` is the frame's position in the source stream, which is what
/// timestamps and clip ranges are derived from.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
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

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `[x1, y1, x2, y2]`, clamped to the frame.
    ///
    /// Returns `None` when the clamped box is empty.
    pub fn crop(&self, bbox: &[f64; 4]) -> Option<Frame> {
        let x1 = bbox[0].floor().clamp(0.0, self.width as f64) as usize;
        let y1 = bbox[1].floor().clamp(0.0, self.height as f64) as usize;
        let x2 = bbox[2].ceil().clamp(0.0, self.width as f64) as usize;
        let y2 = bbox[3].ceil().clamp(0.0, self.height as f64) as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let channels = self.channels as usize;
        let row_len = self.width as usize * channels;
        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * channels);
        for row in y1..y2 {
            let start = row * row_len + x1 * channels;
            data.extend_from_slice(&self.data[start..start + (x2 - x1) * channels]);
        }

        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
