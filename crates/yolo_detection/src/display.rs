use anyhow::Result;
use opencv::{highgui, prelude::*};

/// The ESC key code.
const KEY_ESC: i32 = 27;

/// A sink that presents frames and reports key presses.
pub trait Display: Send {
    fn show(&mut self, window: &str, image: &Mat) -> Result<()>;

    /// Polls for a key press without blocking.
    fn poll_key(&mut self) -> Result<Option<i32>>;

    /// Returns true if the key asks the program to stop.
    fn is_quit_key(&self, key: i32) -> bool {
        key == KEY_ESC || key == 'q' as i32
    }

    /// Returns true if nothing is ever presented, so frames need not be
    /// rendered at all.
    fn is_headless(&self) -> bool {
        false
    }
}

/// Discards every frame and never reports a key press.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessDisplay;

impl Display for HeadlessDisplay {
    fn show(&mut self, _window: &str, _image: &Mat) -> Result<()> {
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<i32>> {
        Ok(None)
    }

    fn is_headless(&self) -> bool {
        true
    }
}

/// Shows frames in OpenCV HighGUI windows.
#[derive(Debug, Default)]
pub struct HighguiDisplay {
    windows: Vec<String>,
}

impl Display for HighguiDisplay {
    fn show(&mut self, window: &str, image: &Mat) -> Result<()> {
        if !self.windows.iter().any(|name| name == window) {
            self.windows.push(window.to_string());
        }
        highgui::imshow(window, image)?;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<i32>> {
        let key = highgui::wait_key(1)?;
        Ok((key >= 0).then(|| key & 0xff))
    }
}

impl Drop for HighguiDisplay {
    fn drop(&mut self) {
        for window in &self.windows {
            let _ = highgui::destroy_window(window);
        }
    }
}
