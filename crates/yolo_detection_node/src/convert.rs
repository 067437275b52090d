//! Conversions between ROS messages and pipeline types.

use r2r::{
    builtin_interfaces::msg::Time,
    geometry_msgs::msg::{Point, Pose, Pose2D, PoseWithCovariance, Quaternion},
    sensor_msgs::msg::Image,
    std_msgs::msg::Header,
    vision_msgs::msg::{
        BoundingBox2D, Detection2D, Detection2DArray, ObjectHypothesis, ObjectHypothesisWithPose,
    },
};
use std::time::Duration;
use yolo_detection::{DetectedObject, FrameHeader, ImageView, TickReport};

pub fn image_view(image: &Image) -> ImageView<'_> {
    let Image {
        height,
        width,
        ref encoding,
        is_bigendian,
        step,
        ref data,
        ..
    } = *image;

    ImageView {
        height,
        width,
        encoding,
        is_bigendian: is_bigendian != 0,
        step,
        data,
    }
}

pub fn frame_header(header: &Header) -> FrameHeader {
    let Time { sec, nanosec } = header.stamp;
    FrameHeader {
        stamp: Duration::new(sec.max(0) as u64, nanosec),
        frame_id: header.frame_id.clone(),
    }
}

pub fn ros_header(header: &FrameHeader) -> Header {
    Header {
        stamp: Time {
            sec: header.stamp.as_secs() as i32,
            nanosec: header.stamp.subsec_nanos(),
        },
        frame_id: header.frame_id.clone(),
    }
}

/// Builds the detection message for one processed tick.
///
/// The hypothesis pose holds the box center in pixels. Its `z`
/// component is the distance in meters, or NaN if there is none.
pub fn detection_array(report: &TickReport) -> Detection2DArray {
    let header = ros_header(&report.header);
    let detections = report
        .objects
        .iter()
        .map(|object| detection_2d(&header, object))
        .collect();

    Detection2DArray { header, detections }
}

fn detection_2d(header: &Header, object: &DetectedObject) -> Detection2D {
    let DetectedObject {
        ref detection,
        ref label,
        distance,
    } = *object;
    let (cx, cy) = detection.bbox.center();
    let (cx, cy) = (cx as f64, cy as f64);
    let distance = distance.unwrap_or(f32::NAN) as f64;

    Detection2D {
        header: header.clone(),
        results: vec![ObjectHypothesisWithPose {
            hypothesis: ObjectHypothesis {
                class_id: label.clone(),
                score: detection.confidence as f64,
            },
            pose: PoseWithCovariance {
                pose: Pose {
                    position: Point {
                        x: cx,
                        y: cy,
                        z: distance,
                    },
                    orientation: Quaternion {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        w: 1.0,
                    },
                },
                covariance: identity_covariance(),
            },
        }],
        bbox: BoundingBox2D {
            center: Pose2D {
                x: cx,
                y: cy,
                theta: 0.0,
            },
            size_x: detection.bbox.width() as f64,
            size_y: detection.bbox.height() as f64,
        },
        id: "".to_string(),
    }
}

/// Generates a flattened 6x6 identity matrix.
fn identity_covariance() -> Vec<f64> {
    // Diagonal entries sit every 7 elements in row-major order
    (0..36)
        .map(|idx| if idx % 7 == 0 { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yolo_detection::{BBox, Detection};

    #[test]
    fn header_round_trip() {
        let header = Header {
            stamp: Time {
                sec: 12,
                nanosec: 500,
            },
            frame_id: "zed_left_camera_frame".to_string(),
        };
        let converted = frame_header(&header);

        assert_eq!(converted.stamp, Duration::new(12, 500));
        assert_eq!(ros_header(&converted), header);
    }

    #[test]
    fn image_view_borrows_message() {
        let image = Image {
            height: 1,
            width: 2,
            encoding: "rgb8".to_string(),
            is_bigendian: 1,
            step: 6,
            data: vec![0; 6],
            ..Default::default()
        };
        let view = image_view(&image);

        assert_eq!(view.encoding, "rgb8");
        assert!(view.is_bigendian);
        assert_eq!(view.data.len(), 6);
    }

    #[test]
    fn covariance_is_identity() {
        let matrix = identity_covariance();

        assert_eq!(matrix.len(), 36);
        for row in 0..6 {
            for col in 0..6 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert_eq!(matrix[row * 6 + col], expected);
            }
        }
    }

    #[test]
    fn detections_carry_label_and_distance() {
        let report = TickReport {
            header: FrameHeader::default(),
            objects: vec![DetectedObject {
                detection: Detection {
                    bbox: BBox::new(10.0, 20.0, 30.0, 60.0),
                    confidence: 0.5,
                    class_id: 0,
                },
                label: "person".to_string(),
                distance: Some(1.5),
            }],
            quit_requested: false,
        };
        let msg = detection_array(&report);
        let det = &msg.detections[0];

        assert_eq!(det.results[0].hypothesis.class_id, "person");
        assert_eq!(det.results[0].pose.pose.position.z, 1.5);
        assert_eq!(det.bbox.center.x, 20.0);
        assert_eq!(det.bbox.center.y, 40.0);
        assert_eq!(det.bbox.size_x, 20.0);
        assert_eq!(det.bbox.size_y, 40.0);
    }
}
