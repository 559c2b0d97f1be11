//! Projector window and input events
//!
//! The controller only sees the [`DisplaySurface`] trait; [`ProjectorWindow`]
//! backs it with a minifb window. minifb is polled, so discrete events are
//! synthesized from key presses and left-button release edges.

use anyhow::{Context, Result};
use image::RgbaImage;
use minifb::{KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::collections::VecDeque;

/// Title shown while not calibrating
pub const DEFAULT_TITLE: &str = "c=calibrate, i=invert, q=quit";

/// Input pump rate while waiting for events
const POLL_FPS: usize = 60;

/// A key press, reduced to what the controller binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Window closed
    Quit,
    /// Left button released at canvas pixel `(x, y)`
    PointerUp { x: f64, y: f64 },
    KeyDown(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Arrow,
    /// Targeting cursor used while picking corners
    Crosshair,
}

/// Full-canvas output surface with a blocking event source
pub trait DisplaySurface {
    /// Canvas size in pixels
    fn size(&self) -> (u32, u32);

    /// Copy `frame` into the back buffer with its top-left corner at `origin`
    fn blit(&mut self, frame: &RgbaImage, origin: (u32, u32));

    /// Show the back buffer
    fn present(&mut self) -> Result<()>;

    fn set_title(&mut self, title: &str);

    fn set_cursor(&mut self, cursor: CursorStyle);

    /// Block until the next input event
    fn wait_event(&mut self) -> Result<Event>;
}

/// minifb window sized to the projector resolution
pub struct ProjectorWindow {
    window: Window,
    /// 0RGB back buffer
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    pending: VecDeque<Event>,
    pointer: PointerTracker,
}

impl ProjectorWindow {
    pub fn open(width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        let mut window = Window::new(
            DEFAULT_TITLE,
            w,
            h,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .with_context(|| format!("Failed to open {}x{} projector window", width, height))?;

        window.set_target_fps(POLL_FPS);
        tracing::info!("Opened projector window {}x{}", width, height);

        Ok(Self {
            window,
            buffer: vec![0; w * h],
            width: w,
            height: h,
            pending: VecDeque::new(),
            pointer: PointerTracker::default(),
        })
    }

    /// Turn the state seen by the last window update into events
    fn collect_input(&mut self) {
        if !self.window.is_open() {
            self.pending.push_back(Event::Quit);
            return;
        }

        for key in self.window.get_keys_pressed(KeyRepeat::No) {
            self.pending.push_back(Event::KeyDown(map_key(key)));
        }

        let position = self.window.get_mouse_pos(MouseMode::Clamp);
        let down = self.window.get_mouse_down(MouseButton::Left);
        if let Some(event) = self.pointer.observe(down, position) {
            self.pending.push_back(event);
        }
    }
}

/// Left-button release detection over sampled button state.
///
/// minifb only samples the mouse on window updates, at [`POLL_FPS`]. A press
/// and release that both fall between two updates, such as a very quick
/// touchpad tap, is never observed and produces no click.
#[derive(Debug, Default)]
struct PointerTracker {
    down: bool,
    position: (f32, f32),
}

impl PointerTracker {
    /// Feed one sample; yields `PointerUp` on a down-to-up transition at the
    /// last known position, floored to whole pixels
    fn observe(&mut self, down: bool, position: Option<(f32, f32)>) -> Option<Event> {
        if let Some(pos) = position {
            self.position = pos;
        }

        let released = self.down && !down;
        self.down = down;

        released.then(|| Event::PointerUp {
            x: self.position.0.floor() as f64,
            y: self.position.1.floor() as f64,
        })
    }
}

fn map_key(key: minifb::Key) -> Key {
    match key {
        minifb::Key::C => Key::Char('c'),
        minifb::Key::I => Key::Char('i'),
        minifb::Key::Q => Key::Char('q'),
        _ => Key::Other,
    }
}

impl DisplaySurface for ProjectorWindow {
    fn size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn blit(&mut self, frame: &RgbaImage, origin: (u32, u32)) {
        let (ox, oy) = (origin.0 as usize, origin.1 as usize);
        for (x, y, pixel) in frame.enumerate_pixels() {
            let (dx, dy) = (ox + x as usize, oy + y as usize);
            if dx >= self.width || dy >= self.height {
                continue;
            }
            let [r, g, b, _] = pixel.0;
            self.buffer[dy * self.width + dx] = (r as u32) << 16 | (g as u32) << 8 | b as u32;
        }
    }

    fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .context("Failed to update projector window")?;
        self.collect_input();
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.window.set_cursor_style(match cursor {
            CursorStyle::Arrow => minifb::CursorStyle::Arrow,
            CursorStyle::Crosshair => minifb::CursorStyle::Crosshair,
        });
    }

    fn wait_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            self.window.update();
            self.collect_input();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_edge_yields_pointer_up() {
        let mut tracker = PointerTracker::default();

        assert_eq!(tracker.observe(false, Some((3.0, 4.0))), None);
        assert_eq!(tracker.observe(true, Some((10.7, 20.2))), None);
        assert_eq!(tracker.observe(true, None), None);
        assert_eq!(
            tracker.observe(false, None),
            Some(Event::PointerUp { x: 10.0, y: 20.0 })
        );
        assert_eq!(tracker.observe(false, Some((1.0, 1.0))), None);
    }

    #[test]
    fn test_release_uses_latest_position() {
        let mut tracker = PointerTracker::default();

        tracker.observe(true, Some((5.0, 5.0)));
        assert_eq!(
            tracker.observe(false, Some((40.9, 30.1))),
            Some(Event::PointerUp { x: 40.0, y: 30.0 })
        );
    }

    #[test]
    fn test_unsampled_tap_is_missed() {
        let mut tracker = PointerTracker::default();

        // Press and release both happened between two samples
        assert_eq!(tracker.observe(false, Some((8.0, 8.0))), None);
        assert_eq!(tracker.observe(false, Some((8.0, 8.0))), None);
    }

    #[test]
    fn test_bound_keys() {
        assert_eq!(map_key(minifb::Key::C), Key::Char('c'));
        assert_eq!(map_key(minifb::Key::I), Key::Char('i'));
        assert_eq!(map_key(minifb::Key::Q), Key::Char('q'));
        assert_eq!(map_key(minifb::Key::Escape), Key::Other);
    }
}
