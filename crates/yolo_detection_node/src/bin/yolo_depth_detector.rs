use anyhow::Result;
use yolo_detection::Mode;

#[async_std::main]
async fn main() -> Result<()> {
    yolo_detection_node::run(Mode::ColorDepth, "yolo_depth_detection").await
}
