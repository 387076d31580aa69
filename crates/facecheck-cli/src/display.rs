//! Display sinks: a desktop window and a headless stand-in.

use crate::engine::DisplaySink;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open window: {0}")]
    Open(String),
    #[error("failed to update window: {0}")]
    Update(String),
}

/// Sink for machines without a desktop session.
///
/// Frames are dropped and the quit poll just waits out its timeout, so the
/// loop only ends once a match's grace period has run.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    presented: u64,
}

impl DisplaySink for HeadlessDisplay {
    fn present(&mut self, _frame: &RgbImage) -> Result<(), DisplayError> {
        self.presented += 1;
        Ok(())
    }

    fn poll_quit(&mut self, timeout: Duration) -> Result<bool, DisplayError> {
        std::thread::sleep(timeout);
        Ok(false)
    }

    fn close(&mut self) {
        tracing::debug!(frames = self.presented, "headless display closed");
    }
}

#[cfg(feature = "window")]
pub use window::WindowDisplay;

#[cfg(feature = "window")]
mod window {
    use super::DisplayError;
    use crate::engine::DisplaySink;
    use image::RgbImage;
    use minifb::{Key, KeyRepeat, Window, WindowOptions};
    use std::time::{Duration, Instant};

    const POLL_SLICE: Duration = Duration::from_millis(5);
    const QUIT_KEYS: [Key; 2] = [Key::Q, Key::Escape];

    /// A titled desktop window; `q`, `Esc` or closing the window requests quit.
    ///
    /// The window is created on the first presented frame so its size matches
    /// whatever the camera negotiated. A quit key tapped while a frame is
    /// being processed is picked up by the next `present` and held until the
    /// following poll.
    pub struct WindowDisplay {
        title: String,
        window: Option<Window>,
        buffer: Vec<u32>,
        size: (usize, usize),
        quit_pending: bool,
    }

    impl WindowDisplay {
        pub fn new(title: &str) -> Self {
            Self {
                title: title.to_string(),
                window: None,
                buffer: Vec::new(),
                size: (0, 0),
                quit_pending: false,
            }
        }

        /// Checks keys pressed since the last update as well as keys held now.
        fn quit_requested(window: &Window) -> bool {
            !window.is_open()
                || has_quit_key(&window.get_keys_pressed(KeyRepeat::No))
                || has_quit_key(&window.get_keys())
        }
    }

    pub(super) fn has_quit_key(keys: &[Key]) -> bool {
        keys.iter().any(|key| QUIT_KEYS.contains(key))
    }

    /// Pack RGB pixels into minifb's `0RGB` words.
    pub(super) fn pack_0rgb(frame: &RgbImage, out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            frame
                .pixels()
                .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
        );
    }

    impl DisplaySink for WindowDisplay {
        fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
            let size = (frame.width() as usize, frame.height() as usize);
            if self.window.is_none() || self.size != size {
                let mut window = Window::new(&self.title, size.0, size.1, WindowOptions::default())
                    .map_err(|e| DisplayError::Open(e.to_string()))?;
                window.set_target_fps(0);
                tracing::debug!(width = size.0, height = size.1, "opened display window");
                self.window = Some(window);
                self.size = size;
            }

            pack_0rgb(frame, &mut self.buffer);
            if let Some(window) = self.window.as_mut() {
                window
                    .update_with_buffer(&self.buffer, size.0, size.1)
                    .map_err(|e| DisplayError::Update(e.to_string()))?;
                self.quit_pending |= Self::quit_requested(window);
            }
            Ok(())
        }

        fn poll_quit(&mut self, timeout: Duration) -> Result<bool, DisplayError> {
            if self.quit_pending {
                return Ok(true);
            }
            let Some(window) = self.window.as_mut() else {
                std::thread::sleep(timeout);
                return Ok(false);
            };

            let deadline = Instant::now() + timeout;
            loop {
                window.update();
                if Self::quit_requested(window) {
                    return Ok(true);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                std::thread::sleep(POLL_SLICE.min(deadline - now));
            }
        }

        fn close(&mut self) {
            if self.window.take().is_some() {
                tracing::debug!(title = %self.title, "closed display window");
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_never_quits() {
        let mut display = HeadlessDisplay::default();
        display.present(&RgbImage::new(4, 4)).unwrap();
        assert!(!display.poll_quit(Duration::from_millis(1)).unwrap());
        assert_eq!(display.presented, 1);
        display.close();
    }

    #[cfg(feature = "window")]
    #[test]
    fn test_pack_0rgb_layout() {
        let frame = RgbImage::from_raw(2, 1, vec![0x12, 0x34, 0x56, 255, 0, 1]).unwrap();
        let mut out = Vec::new();
        window::pack_0rgb(&frame, &mut out);
        assert_eq!(out, vec![0x0012_3456, 0x00ff_0001]);
    }

    #[cfg(feature = "window")]
    #[test]
    fn test_quit_keys_are_recognised_in_pressed_list() {
        use minifb::Key;
        assert!(window::has_quit_key(&[Key::A, Key::Q]));
        assert!(window::has_quit_key(&[Key::Escape]));
        assert!(!window::has_quit_key(&[Key::A, Key::Space]));
        assert!(!window::has_quit_key(&[]));
    }
}
