//! Decoded camera frames and the conversion from raw image messages.

use anyhow::{bail, ensure, Result};
use opencv::{
    core::{Scalar, Vec3b, VecN, CV_32FC1, CV_8UC3},
    prelude::*,
};
use std::time::Duration;

/// A borrowed view of a `sensor_msgs/Image` message.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub height: u32,
    pub width: u32,
    pub encoding: &'a str,
    pub is_bigendian: bool,
    pub step: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeader {
    /// Time since the Unix epoch as stamped by the sender.
    pub stamp: Duration,
    pub frame_id: String,
}

/// A BGR 8-bit color frame.
#[derive(Debug)]
pub struct ColorFrame {
    pub image: Mat,
    pub header: FrameHeader,
}

/// A single-channel depth frame in meters.
///
/// Samples without a sensor return are NaN or infinite.
#[derive(Debug)]
pub struct DepthFrame {
    image: Mat,
    header: FrameHeader,
}

impl DepthFrame {
    pub fn new(image: Mat, header: FrameHeader) -> Result<Self> {
        ensure!(
            image.typ() == CV_32FC1,
            "depth image must be CV_32FC1, but got type {}",
            image.typ()
        );
        Ok(Self { image, header })
    }

    /// Builds a depth frame from row-major samples in meters.
    pub fn from_samples(
        height: usize,
        width: usize,
        samples: &[f32],
        header: FrameHeader,
    ) -> Result<Self> {
        ensure!(
            samples.len() == height * width,
            "expect {} depth samples, but got {}",
            height * width,
            samples.len()
        );

        let mut image = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            CV_32FC1,
            Scalar::all(f64::NAN),
        )?;
        for (idx, &value) in samples.iter().enumerate() {
            let row = idx / width;
            let col = idx % width;
            *image.at_2d_mut::<f32>(row as i32, col as i32)? = value;
        }

        Self::new(image, header)
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    /// Returns the sample at the given pixel, or NaN if the pixel is
    /// not addressable.
    pub fn sample(&self, row: i32, col: i32) -> f32 {
        if !(0..self.height()).contains(&row) || !(0..self.width()).contains(&col) {
            return f32::NAN;
        }

        self.image
            .at_2d::<f32>(row, col)
            .map(|value| *value)
            .unwrap_or(f32::NAN)
    }
}

/// Converts a raw image message into a BGR color frame.
pub fn decode_color(view: &ImageView<'_>, header: FrameHeader) -> Result<ColorFrame> {
    let pixel_step: usize = match view.encoding {
        "rgb8" | "bgr8" => 3,
        "rgba8" | "bgra8" => 4,
        "mono8" => 1,
        encoding => bail!("unsupported color encoding '{}'", encoding),
    };
    let rows = checked_rows(view, pixel_step)?;
    let width = view.width as usize;

    let mut mat = Mat::new_rows_cols_with_default(
        view.height as i32,
        view.width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    for (row, row_bytes) in rows.enumerate() {
        let pixels = row_bytes[..width * pixel_step].chunks_exact(pixel_step);

        for (col, bytes) in pixels.enumerate() {
            let bgr = match view.encoding {
                "rgb8" | "rgba8" => [bytes[2], bytes[1], bytes[0]],
                "bgr8" | "bgra8" => [bytes[0], bytes[1], bytes[2]],
                _ => [bytes[0]; 3],
            };
            let pixel: &mut Vec3b = mat.at_2d_mut(row as i32, col as i32)?;
            *pixel = VecN(bgr);
        }
    }

    Ok(ColorFrame { image: mat, header })
}

/// Converts a raw image message into a depth frame in meters.
///
/// `16UC1` images are taken as millimeters, and a zero reading is
/// treated as a missing return.
pub fn decode_depth(view: &ImageView<'_>, header: FrameHeader) -> Result<DepthFrame> {
    let pixel_step: usize = match view.encoding {
        "32FC1" => 4,
        "16UC1" => 2,
        encoding => bail!("unsupported depth encoding '{}'", encoding),
    };
    let rows = checked_rows(view, pixel_step)?;
    let width = view.width as usize;

    let mut mat = Mat::new_rows_cols_with_default(
        view.height as i32,
        view.width as i32,
        CV_32FC1,
        Scalar::all(f64::NAN),
    )?;

    for (row, row_bytes) in rows.enumerate() {
        let pixels = row_bytes[..width * pixel_step].chunks_exact(pixel_step);

        for (col, bytes) in pixels.enumerate() {
            let meters = if pixel_step == 4 {
                let bytes: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
                if view.is_bigendian {
                    f32::from_be_bytes(bytes)
                } else {
                    f32::from_le_bytes(bytes)
                }
            } else {
                let bytes: [u8; 2] = [bytes[0], bytes[1]];
                let millis = if view.is_bigendian {
                    u16::from_be_bytes(bytes)
                } else {
                    u16::from_le_bytes(bytes)
                };
                if millis == 0 {
                    f32::NAN
                } else {
                    millis as f32 / 1000.0
                }
            };
            *mat.at_2d_mut::<f32>(row as i32, col as i32)? = meters;
        }
    }

    DepthFrame::new(mat, header)
}

/// Validates the buffer layout and splits it into rows.
fn checked_rows<'a>(
    view: &ImageView<'a>,
    pixel_step: usize,
) -> Result<impl Iterator<Item = &'a [u8]>> {
    let ImageView {
        height,
        width,
        step,
        data,
        ..
    } = *view;

    ensure!(height > 0 && width > 0, "empty {}x{} image", width, height);
    ensure!(
        step as usize >= width as usize * pixel_step,
        "row step {} is smaller than {} pixels of {} bytes",
        step,
        width,
        pixel_step
    );
    ensure!(
        data.len() >= step as usize * height as usize,
        "expect at least {} bytes of image data, but got {}",
        step as usize * height as usize,
        data.len()
    );

    Ok(data.chunks(step as usize).take(height as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(encoding: &'a str, height: u32, width: u32, step: u32, data: &'a [u8]) -> ImageView<'a> {
        ImageView {
            height,
            width,
            encoding,
            is_bigendian: false,
            step,
            data,
        }
    }

    #[test]
    fn rgb8_is_swapped_to_bgr() {
        let data = [10, 20, 30, 40, 50, 60];
        let frame = decode_color(&view("rgb8", 1, 2, 6, &data), FrameHeader::default()).unwrap();

        assert_eq!(frame.image.rows(), 1);
        assert_eq!(frame.image.cols(), 2);
        assert_eq!(frame.image.at_2d::<Vec3b>(0, 0).unwrap().0, [30, 20, 10]);
        assert_eq!(frame.image.at_2d::<Vec3b>(0, 1).unwrap().0, [60, 50, 40]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 1x2 bgr8 rows padded to 8 bytes
        let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        let frame = decode_color(&view("bgr8", 2, 2, 8, &data), FrameHeader::default()).unwrap();

        assert_eq!(frame.image.at_2d::<Vec3b>(1, 0).unwrap().0, [7, 8, 9]);
        assert_eq!(frame.image.at_2d::<Vec3b>(1, 1).unwrap().0, [10, 11, 12]);
    }

    #[test]
    fn mono8_is_replicated() {
        let data = [42];
        let frame = decode_color(&view("mono8", 1, 1, 1, &data), FrameHeader::default()).unwrap();
        assert_eq!(frame.image.at_2d::<Vec3b>(0, 0).unwrap().0, [42, 42, 42]);
    }

    #[test]
    fn color_decode_failures() {
        let data = [0u8; 6];
        let header = FrameHeader::default;

        assert!(decode_color(&view("yuv422", 1, 2, 6, &data), header()).is_err());
        assert!(decode_color(&view("rgb8", 2, 2, 6, &data), header()).is_err());
        assert!(decode_color(&view("rgb8", 1, 2, 4, &data), header()).is_err());
        assert!(decode_color(&view("rgb8", 0, 2, 6, &data), header()).is_err());
    }

    #[test]
    fn decode_32fc1_depth() {
        let data: Vec<u8> = [1.5f32, f32::NAN]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        let header = FrameHeader {
            stamp: Duration::from_secs(3),
            frame_id: "zed_left".to_string(),
        };
        let frame = decode_depth(&view("32FC1", 1, 2, 8, &data), header.clone()).unwrap();

        assert_eq!(frame.sample(0, 0), 1.5);
        assert!(frame.sample(0, 1).is_nan());
        assert_eq!(frame.header(), &header);
    }

    #[test]
    fn decode_big_endian_32fc1_depth() {
        let data = 2.25f32.to_be_bytes();
        let mut view = view("32FC1", 1, 1, 4, &data);
        view.is_bigendian = true;
        let frame = decode_depth(&view, FrameHeader::default()).unwrap();

        assert_eq!(frame.sample(0, 0), 2.25);
    }

    #[test]
    fn decode_16uc1_depth_as_millimeters() {
        let data: Vec<u8> = [1500u16, 0]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        let frame = decode_depth(&view("16UC1", 1, 2, 4, &data), FrameHeader::default()).unwrap();

        assert_eq!(frame.sample(0, 0), 1.5);
        assert!(frame.sample(0, 1).is_nan());
    }

    #[test]
    fn depth_decode_rejects_color_encoding() {
        let data = [0u8; 3];
        assert!(decode_depth(&view("rgb8", 1, 1, 3, &data), FrameHeader::default()).is_err());
    }

    #[test]
    fn out_of_range_sample_is_nan() {
        let frame = DepthFrame::from_samples(1, 1, &[1.0], FrameHeader::default()).unwrap();
        assert!(frame.sample(1, 0).is_nan());
        assert!(frame.sample(0, -1).is_nan());
    }
}
