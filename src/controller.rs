//! Interactive calibration loop
//!
//! One event is handled to completion, including any re-render, before the
//! next one is read. A degenerate pick never crashes the loop: the previous
//! frame stays on screen and the operator can simply pick again.

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, error, info, warn};

use crate::calibration::CalibrationModel;
use crate::config::{ConfigStore, Point};
use crate::display::{CursorStyle, DisplaySurface, Event, Key, DEFAULT_TITLE};
use crate::render::render_model;

const KEY_CALIBRATE: char = 'c';
const KEY_INVERT: char = 'i';
const KEY_QUIT: char = 'q';

/// What the loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Controller<S: DisplaySurface> {
    model: CalibrationModel,
    source: RgbaImage,
    surface: S,
}

impl<S: DisplaySurface> Controller<S> {
    pub fn new(model: CalibrationModel, source: RgbaImage, surface: S) -> Self {
        Self {
            model,
            source,
            surface,
        }
    }

    /// Put `frame` on the canvas
    pub fn show(&mut self, frame: &RgbaImage) -> Result<()> {
        self.surface.blit(frame, (0, 0));
        self.surface.present()
    }

    /// Render the current state, keeping the last good frame if the
    /// destination quad is degenerate
    fn rerender(&mut self) -> Result<()> {
        match render_model(&self.source, &self.model) {
            Ok(frame) => self.show(&frame),
            Err(e) => {
                warn!("Not re-rendering, keeping previous frame: {}", e);
                Ok(())
            }
        }
    }

    fn status_for_next_pick(&mut self) {
        let corner = self.model.current_corner();
        self.surface.set_title(corner.name());
    }

    /// Apply a single input event
    pub fn handle_event(&mut self, event: Event) -> Result<Flow> {
        match event {
            Event::Quit | Event::KeyDown(Key::Char(KEY_QUIT)) => return Ok(Flow::Quit),

            Event::KeyDown(Key::Char(KEY_CALIBRATE)) => {
                if self.model.toggle_calibrating() {
                    info!("Calibrating, pick order {:?}", self.model.pick_order());
                    self.status_for_next_pick();
                    self.surface.set_cursor(CursorStyle::Crosshair);
                } else {
                    info!("Calibration finished: {:?}", self.model.destination());
                    self.surface.set_title(DEFAULT_TITLE);
                    self.surface.set_cursor(CursorStyle::Arrow);
                }
            }

            Event::KeyDown(Key::Char(KEY_INVERT)) => {
                let inverted = self.model.toggle_inverted();
                debug!("Inverted: {}", inverted);
                self.rerender()?;
            }

            Event::PointerUp { x, y } => {
                if let Some(corner) = self.model.record_pick(Point::new(x, y)) {
                    debug!(
                        "Set {} to ({}, {}), next pick #{}",
                        corner.label(),
                        x,
                        y,
                        self.model.selection_index()
                    );
                    self.rerender()?;
                    self.status_for_next_pick();
                }
            }

            Event::KeyDown(_) => {}
        }

        Ok(Flow::Continue)
    }

    fn event_loop(&mut self) -> Result<()> {
        loop {
            let event = self.surface.wait_event()?;
            debug!(?event, mode = ?self.model.mode(), "Input");
            if self.handle_event(event)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Process events until quit, then persist the calibration.
    ///
    /// The save is attempted even when the loop ends with an error. A failed
    /// save is logged and does not turn a clean quit into an error.
    pub fn run(mut self, store: &mut ConfigStore) -> Result<CalibrationModel> {
        let outcome = self.event_loop();
        info!("Exiting, saving calibration");

        if let Err(e) = self.model.save(store) {
            error!("Failed to save calibration: {:#}", e);
        }

        outcome.map(|()| self.model)
    }
}
