use anyhow::Result;
use yolo_detection::Mode;

#[async_std::main]
async fn main() -> Result<()> {
    yolo_detection_node::run(Mode::Color, "yolo_rgb_detection").await
}
