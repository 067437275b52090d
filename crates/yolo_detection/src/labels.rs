use std::borrow::Cow;

/// Class names of the COCO dataset, which the stock YOLO models are
/// trained on.
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Maps class IDs to human readable names.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    names: Vec<String>,
}

impl LabelResolver {
    /// Uses the given names, or the COCO names if none or an empty
    /// list is given.
    pub fn new(names: Option<Vec<String>>) -> Self {
        let names = match names {
            Some(names) if !names.is_empty() => names,
            _ => COCO_NAMES.iter().map(|name| name.to_string()).collect(),
        };
        Self { names }
    }

    pub fn resolve(&self, class_id: usize) -> Cow<'_, str> {
        match self.names.get(class_id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("class {}", class_id)),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(None)
    }
}
