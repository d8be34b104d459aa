use chrono::{DateTime, Utc};
use soulwave_types::{
    vision::{ImageFrame, RGBA_CHANNELS},
    Result,
};

use crate::vision_error;

/// Owned RGBA drawing surface reused across captures and resized on use.
#[derive(Debug, Clone, Default)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize in place. Returns true when the dimensions changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let changed = (width, height) != (self.width, self.height);
        self.width = width;
        self.height = height;
        self.data
            .resize(width as usize * height as usize * RGBA_CHANNELS, 0);
        changed
    }

    /// Copy a frame into the buffer. The buffer must already match the frame size.
    pub fn draw(&mut self, frame: &ImageFrame) -> Result<()> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(vision_error(format!(
                "frame {}x{} does not match raster buffer {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if !frame.is_consistent() {
            return Err(vision_error(format!(
                "frame data length {} does not match {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }
        self.data.copy_from_slice(&frame.data);
        Ok(())
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn to_frame(&self, captured_at: DateTime<Utc>) -> ImageFrame {
        ImageFrame {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
            captured_at,
        }
    }
}
