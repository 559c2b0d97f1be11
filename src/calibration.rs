//! Calibration point management and picking state

use anyhow::Result;

use crate::config::{ConfigStore, Corner, PickOrder, Point, Quad};

/// Canvas and source-image geometry, fixed for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    /// Projector canvas size in pixels
    pub canvas_size: (u32, u32),
    /// Physical cutting mat size in millimetres
    pub mat_size_mm: (f64, f64),
    /// Source image pixels per millimetre along x and y
    pub pixels_per_mm: (f64, f64),
}

impl DisplayGeometry {
    /// Derive the geometry from the canvas, the mat and the source image's
    /// pixel and physical sizes
    pub fn new(
        canvas_size: (u32, u32),
        mat_size_mm: (f64, f64),
        image_size_px: (u32, u32),
        image_size_mm: (f64, f64),
    ) -> Self {
        Self {
            canvas_size,
            mat_size_mm,
            pixels_per_mm: (
                image_size_px.0 as f64 / image_size_mm.0,
                image_size_px.1 as f64 / image_size_mm.1,
            ),
        }
    }

    /// Region of the source image that covers the cutting mat, anchored at
    /// the image's top-left pixel. Extents are truncated to whole pixels.
    pub fn source_quad(&self) -> Quad {
        let right = (self.mat_size_mm.0 * self.pixels_per_mm.0).trunc();
        let bottom = (self.mat_size_mm.1 * self.pixels_per_mm.1).trunc();
        Quad::from_rect(0.0, 0.0, right, bottom)
    }

    /// The four corners of the projector canvas
    pub fn canvas_quad(&self) -> Quad {
        let (w, h) = self.canvas_size;
        Quad::from_rect(0.0, 0.0, w as f64, h as f64)
    }
}

/// Whether clicks are currently being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    /// Index into the pick order of the next corner to record
    Calibrating(usize),
}

/// Calibration state owned by the controller
#[derive(Debug, Clone)]
pub struct CalibrationModel {
    geometry: DisplayGeometry,
    source_quad: Quad,
    destination: Quad,
    pick_order: PickOrder,
    selection: usize,
    inverted: bool,
    calibrating: bool,
}

impl CalibrationModel {
    pub fn new(
        geometry: DisplayGeometry,
        destination: Quad,
        pick_order: PickOrder,
        inverted: bool,
    ) -> Self {
        Self {
            source_quad: geometry.source_quad(),
            geometry,
            destination,
            pick_order,
            selection: 0,
            inverted,
            calibrating: false,
        }
    }

    /// Build the model from persisted settings, falling back to the canvas
    /// corners when no destination quad has been saved yet
    pub fn load(store: &ConfigStore, geometry: DisplayGeometry) -> Self {
        let settings = store.settings();
        let destination = settings
            .selected_coords
            .unwrap_or_else(|| geometry.canvas_quad());

        Self::new(
            geometry,
            destination,
            settings.coord_order.clone(),
            settings.inverted,
        )
    }

    /// Write the destination quad and inversion flag back to the store and
    /// persist it. The pick order is left as configured.
    pub fn save(&self, store: &mut ConfigStore) -> Result<()> {
        let settings = store.settings_mut();
        settings.selected_coords = Some(self.destination);
        settings.inverted = self.inverted;
        store.save()
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn source_quad(&self) -> &Quad {
        &self.source_quad
    }

    pub fn destination(&self) -> &Quad {
        &self.destination
    }

    pub fn pick_order(&self) -> &PickOrder {
        &self.pick_order
    }

    pub fn selection_index(&self) -> usize {
        self.selection
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn mode(&self) -> Mode {
        if self.calibrating {
            Mode::Calibrating(self.selection)
        } else {
            Mode::Idle
        }
    }

    /// Corner the next pick will assign
    pub fn current_corner(&self) -> Corner {
        self.pick_order.get(self.selection)
    }

    /// Assign `point` to the current corner and advance to the next one.
    ///
    /// Returns the corner that was set, or `None` when not calibrating.
    pub fn record_pick(&mut self, point: Point) -> Option<Corner> {
        if !self.calibrating {
            return None;
        }

        let corner = self.current_corner();
        self.destination.set(corner, point);
        self.selection = (self.selection + 1) % self.pick_order.len();
        Some(corner)
    }

    /// Enter or leave calibration mode. Entering always starts from the
    /// first corner of the pick order.
    pub fn toggle_calibrating(&mut self) -> bool {
        self.calibrating = !self.calibrating;
        if self.calibrating {
            self.selection = 0;
        }
        self.calibrating
    }

    pub fn toggle_inverted(&mut self) -> bool {
        self.inverted = !self.inverted;
        self.inverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> DisplayGeometry {
        // A 420x270mm pattern rasterized at 2 px/mm
        DisplayGeometry::new((640, 480), (420.0, 270.0), (840, 540), (420.0, 270.0))
    }

    fn empty_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("settings.toml")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_source_quad_from_density() {
        let geo = geometry();
        assert_eq!(geo.pixels_per_mm, (2.0, 2.0));
        assert_eq!(geo.source_quad(), Quad::from_rect(0.0, 0.0, 840.0, 540.0));

        // Mat smaller than the document, with a fractional density
        let geo = DisplayGeometry::new((640, 480), (100.0, 50.0), (1000, 700), (297.0, 210.0));
        let quad = geo.source_quad();
        assert_eq!(quad.bottom_right, Point::new(336.0, 166.0));
        assert_eq!(quad.top_left, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_load_defaults() {
        let (_dir, store) = empty_store();
        let model = CalibrationModel::load(&store, geometry());

        assert_eq!(*model.destination(), Quad::from_rect(0.0, 0.0, 640.0, 480.0));
        assert_eq!(*model.pick_order(), PickOrder::default());
        assert!(!model.is_inverted());
        assert_eq!(model.mode(), Mode::Idle);
    }

    #[test]
    fn test_pick_ignored_when_idle() {
        let (_dir, store) = empty_store();
        let mut model = CalibrationModel::load(&store, geometry());
        let before = *model.destination();

        assert_eq!(model.record_pick(Point::new(1.0, 2.0)), None);
        assert_eq!(*model.destination(), before);
        assert_eq!(model.selection_index(), 0);
    }

    #[test]
    fn test_picks_cycle_through_order() {
        let (_dir, store) = empty_store();
        let mut model = CalibrationModel::load(&store, geometry());
        model.toggle_calibrating();

        let mut visited = Vec::new();
        for i in 0..4 {
            visited.push(model.selection_index());
            let corner = model.record_pick(Point::new(i as f64, 10.0 * i as f64));
            assert_eq!(corner, Some(model.pick_order().get(i)));
        }

        assert_eq!(visited, vec![0, 1, 2, 3]);
        assert_eq!(model.selection_index(), 0);
        assert_eq!(model.destination().top_left, Point::new(0.0, 0.0));
        assert_eq!(model.destination().bottom_left, Point::new(1.0, 10.0));
        assert_eq!(model.destination().bottom_right, Point::new(2.0, 20.0));
        assert_eq!(model.destination().top_right, Point::new(3.0, 30.0));
    }

    #[test]
    fn test_reentering_calibration_restarts_order() {
        let (_dir, store) = empty_store();
        let mut model = CalibrationModel::load(&store, geometry());

        assert!(model.toggle_calibrating());
        model.record_pick(Point::new(5.0, 5.0));
        model.record_pick(Point::new(6.0, 6.0));
        assert_eq!(model.mode(), Mode::Calibrating(2));

        assert!(!model.toggle_calibrating());
        assert_eq!(model.mode(), Mode::Idle);

        assert!(model.toggle_calibrating());
        assert_eq!(model.mode(), Mode::Calibrating(0));
    }

    #[test]
    fn test_repeated_label_last_write_wins() {
        let order =
            PickOrder::new(vec![Corner::TopLeft, Corner::TopRight, Corner::TopLeft]).unwrap();
        let mut model =
            CalibrationModel::new(geometry(), geometry().canvas_quad(), order, false);
        model.toggle_calibrating();

        model.record_pick(Point::new(1.0, 1.0));
        model.record_pick(Point::new(2.0, 2.0));
        model.record_pick(Point::new(3.0, 3.0));

        assert_eq!(model.destination().top_left, Point::new(3.0, 3.0));
        assert_eq!(model.destination().top_right, Point::new(2.0, 2.0));
        assert_eq!(model.selection_index(), 0);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (dir, mut store) = empty_store();
        let mut model = CalibrationModel::load(&store, geometry());
        model.toggle_calibrating();
        model.record_pick(Point::new(17.5, 3.25));
        model.record_pick(Point::new(0.1, 470.7));
        model.toggle_inverted();
        model.save(&mut store).unwrap();

        let reloaded_store = ConfigStore::load(&dir.path().join("settings.toml")).unwrap();
        let reloaded = CalibrationModel::load(&reloaded_store, geometry());

        assert_eq!(reloaded.destination(), model.destination());
        assert!(reloaded.is_inverted());
        assert_eq!(reloaded.pick_order(), model.pick_order());
        assert_eq!(reloaded.mode(), Mode::Idle);
    }
}
