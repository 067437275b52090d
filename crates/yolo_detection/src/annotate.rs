//! Draws detections onto color frames.

use crate::{depth::Distance, sampling::DetectedObject};
use anyhow::Result;
use opencv::{
    core::{Point2i, Rect, Scalar},
    imgproc,
    prelude::*,
};

/// Drawing parameters. The defaults follow the look of the detection
/// windows: green boxes with black text on a green strip.
#[derive(Debug, Clone)]
pub struct Annotator {
    pub box_color: Scalar,
    pub box_thickness: i32,
    pub text_color: Scalar,
    pub font_face: i32,
    pub font_scale: f64,
    pub font_thickness: i32,
    /// Gap between the label strip and the top edge of the box.
    pub label_offset: i32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            box_color: Scalar::new(0.0, 255.0, 0.0, 0.0),
            box_thickness: 3,
            text_color: Scalar::new(0.0, 0.0, 0.0, 0.0),
            font_face: imgproc::FONT_HERSHEY_SIMPLEX,
            font_scale: 0.5,
            font_thickness: 1,
            label_offset: 10,
        }
    }
}

impl Annotator {
    /// Draws every object onto `canvas`.
    pub fn draw(&self, canvas: &mut Mat, objects: &[DetectedObject]) -> Result<()> {
        for object in objects {
            self.draw_one(canvas, object)?;
        }
        Ok(())
    }

    fn draw_one(&self, canvas: &mut Mat, object: &DetectedObject) -> Result<()> {
        let text = label_text(object);
        let bbox = object.detection.bbox;

        imgproc::rectangle(
            canvas,
            bbox.to_rect(),
            self.box_color,
            self.box_thickness,
            imgproc::LINE_8,
            0, // shift
        )?;

        let mut baseline = 0;
        let text_size = imgproc::get_text_size(
            &text,
            self.font_face,
            self.font_scale,
            self.font_thickness,
            &mut baseline,
        )?;

        // Label strip above the top-left corner
        let origin = Point2i::new(bbox.xmin as i32, bbox.ymin as i32 - self.label_offset);
        let strip = Rect {
            x: origin.x,
            y: origin.y - text_size.height,
            width: text_size.width,
            height: text_size.height,
        };
        imgproc::rectangle(
            canvas,
            strip,
            self.box_color,
            imgproc::FILLED,
            imgproc::LINE_8,
            0, // shift
        )?;
        imgproc::put_text(
            canvas,
            &text,
            origin,
            self.font_face,
            self.font_scale,
            self.text_color,
            self.font_thickness,
            imgproc::LINE_8,
            false, // bottom_left_origin
        )?;

        Ok(())
    }
}

/// Formats the label as `<name>: <confidence>`, followed by the
/// distance in meters when one was estimated.
pub fn label_text(object: &DetectedObject) -> String {
    let mut text = format!("{}: {:.2}", object.label, object.detection.confidence);
    if let Some(distance) = object.distance {
        if distance.is_finite() {
            text.push_str(&format!(" {}m", Distance(distance)));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection};
    use opencv::core::{Vec3b, CV_8UC3};

    fn object(distance: Option<f32>) -> DetectedObject {
        DetectedObject {
            detection: Detection {
                bbox: BBox::new(20.0, 40.0, 60.0, 80.0),
                confidence: 0.876,
                class_id: 0,
            },
            label: "person".to_string(),
            distance,
        }
    }

    #[test]
    fn label_formats() {
        assert_eq!(label_text(&object(None)), "person: 0.88");
        assert_eq!(label_text(&object(Some(1.5))), "person: 0.88 1.50m");
        assert_eq!(label_text(&object(Some(f32::NAN))), "person: 0.88");
    }

    #[test]
    fn draws_box_and_label_strip() {
        let mut canvas =
            Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap();
        Annotator::default()
            .draw(&mut canvas, &[object(None)])
            .unwrap();

        // Box outline
        assert_eq!(canvas.at_2d::<Vec3b>(40, 40).unwrap().0, [0, 255, 0]);
        // Box interior is untouched
        assert_eq!(canvas.at_2d::<Vec3b>(60, 40).unwrap().0, [0, 0, 0]);
        // Label strip ends above the offset line
        let strip_pixels = (0..30)
            .flat_map(|row| (20..100).map(move |col| (row, col)))
            .filter(|&(row, col)| canvas.at_2d::<Vec3b>(row, col).unwrap().0 == [0, 255, 0])
            .count();
        assert!(strip_pixels > 100);
        assert_eq!(canvas.at_2d::<Vec3b>(35, 21).unwrap().0, [0, 0, 0]);
    }

    #[test]
    fn boxes_at_the_border_are_drawn() {
        let mut canvas =
            Mat::new_rows_cols_with_default(50, 50, CV_8UC3, Scalar::all(0.0)).unwrap();
        let mut object = object(None);
        object.detection.bbox = BBox::new(-10.0, -10.0, 70.0, 70.0);

        Annotator::default().draw(&mut canvas, &[object]).unwrap();
    }
}
