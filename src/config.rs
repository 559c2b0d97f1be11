//! Configuration management for ProjectPatterns
//!
//! Settings live in one TOML document. Key names are short and lowercase so
//! files written by earlier versions of the tool still load.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Settings file name under `~/.config`
const SETTINGS_FILE: &str = "ProjectPatterns.toml";

/// A 2D point in pixel coordinates
///
/// Stored in the settings file as a two element array `[x, y]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Corner label of a quadrilateral
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Corner {
    #[serde(rename = "tl")]
    TopLeft,
    #[serde(rename = "tr")]
    TopRight,
    #[serde(rename = "bl")]
    BottomLeft,
    #[serde(rename = "br")]
    BottomRight,
}

impl Corner {
    /// Order in which corners are paired when estimating a homography.
    /// Both quads must be read in this same order.
    pub const CANONICAL: [Corner; 4] = [
        Corner::BottomLeft,
        Corner::BottomRight,
        Corner::TopRight,
        Corner::TopLeft,
    ];

    /// Short label used as the settings key
    pub fn label(&self) -> &'static str {
        match self {
            Corner::TopLeft => "tl",
            Corner::TopRight => "tr",
            Corner::BottomLeft => "bl",
            Corner::BottomRight => "br",
        }
    }

    /// Human readable name, shown in the window title while calibrating
    pub fn name(&self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Four labeled corner points. Every corner is always present.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Quad {
    #[serde(rename = "tl")]
    pub top_left: Point,
    #[serde(rename = "tr")]
    pub top_right: Point,
    #[serde(rename = "bl")]
    pub bottom_left: Point,
    #[serde(rename = "br")]
    pub bottom_right: Point,
}

impl Quad {
    /// Axis-aligned rectangle spanning `(left, top)` to `(right, bottom)`
    pub fn from_rect(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            top_left: Point::new(left, top),
            top_right: Point::new(right, top),
            bottom_left: Point::new(left, bottom),
            bottom_right: Point::new(right, bottom),
        }
    }

    pub fn get(&self, corner: Corner) -> Point {
        match corner {
            Corner::TopLeft => self.top_left,
            Corner::TopRight => self.top_right,
            Corner::BottomLeft => self.bottom_left,
            Corner::BottomRight => self.bottom_right,
        }
    }

    pub fn set(&mut self, corner: Corner, point: Point) {
        let slot = match corner {
            Corner::TopLeft => &mut self.top_left,
            Corner::TopRight => &mut self.top_right,
            Corner::BottomLeft => &mut self.bottom_left,
            Corner::BottomRight => &mut self.bottom_right,
        };
        *slot = point;
    }

    /// Corner points in [`Corner::CANONICAL`] order
    pub fn canonical_points(&self) -> [Point; 4] {
        Corner::CANONICAL.map(|c| self.get(c))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PickOrderError {
    #[error("coordorder must name at least one corner")]
    Empty,
}

/// Sequence in which clicks assign corners during calibration.
///
/// Labels may repeat; a repeated label is simply overwritten again on its
/// next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Corner>", into = "Vec<Corner>")]
pub struct PickOrder(Vec<Corner>);

impl PickOrder {
    pub fn new(corners: Vec<Corner>) -> Result<Self, PickOrderError> {
        if corners.is_empty() {
            return Err(PickOrderError::Empty);
        }
        Ok(Self(corners))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false once constructed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Corner at `index`, wrapping around the sequence
    pub fn get(&self, index: usize) -> Corner {
        self.0[index % self.0.len()]
    }
}

impl Default for PickOrder {
    /// Anticlockwise starting at the top-left corner
    fn default() -> Self {
        Self(vec![
            Corner::TopLeft,
            Corner::BottomLeft,
            Corner::BottomRight,
            Corner::TopRight,
        ])
    }
}

impl TryFrom<Vec<Corner>> for PickOrder {
    type Error = PickOrderError;

    fn try_from(corners: Vec<Corner>) -> Result<Self, Self::Error> {
        Self::new(corners)
    }
}

impl From<PickOrder> for Vec<Corner> {
    fn from(order: PickOrder) -> Self {
        order.0
    }
}

fn default_projector_res() -> (u32, u32) {
    (640, 480)
}

fn default_cutting_mat() -> (f64, f64) {
    (420.0, 270.0)
}

/// Persisted settings document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Projector resolution in pixels
    #[serde(rename = "projectorres", default = "default_projector_res")]
    pub projector_res: (u32, u32),

    /// Cutting mat size in millimetres
    #[serde(rename = "cuttingmat", default = "default_cutting_mat")]
    pub cutting_mat: (f64, f64),

    #[serde(rename = "coordorder", default)]
    pub coord_order: PickOrder,

    #[serde(default)]
    pub inverted: bool,

    /// Operator-picked destination corners; canvas corners when absent
    #[serde(
        rename = "selectedcoords",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_coords: Option<Quad>,

    /// Keys this program does not use, written back as loaded
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projector_res: default_projector_res(),
            cutting_mat: default_cutting_mat(),
            coord_order: PickOrder::default(),
            inverted: false,
            selected_coords: None,
            extra: toml::Table::new(),
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<()> {
        let (w, h) = self.projector_res;
        ensure!(w > 0 && h > 0, "projectorres must be non-zero, got ({w}, {h})");

        let (cw, ch) = self.cutting_mat;
        ensure!(
            cw.is_finite() && ch.is_finite() && cw > 0.0 && ch > 0.0,
            "cuttingmat must be positive, got ({cw}, {ch})"
        );

        if let Some(quad) = &self.selected_coords {
            ensure!(
                quad.canonical_points()
                    .iter()
                    .all(|p| p.x.is_finite() && p.y.is_finite()),
                "selectedcoords must be finite numbers"
            );
        }
        Ok(())
    }
}

/// Settings document bound to its file on disk
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// `~/.config/ProjectPatterns.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = home::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join(SETTINGS_FILE))
    }

    /// Load settings from a file. A missing file yields defaults; a present
    /// but malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let settings: Settings = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            settings
                .validate()
                .with_context(|| format!("Invalid config in {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            settings
        } else {
            tracing::info!("No configuration at {:?}, using defaults", path);
            Settings::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Write the whole settings document back to its file
    pub fn save(&self) -> Result<()> {
        let content =
            toml::to_string_pretty(&self.settings).context("Failed to serialize configuration")?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config to {:?}", self.path))?;

        tracing::info!("Saved configuration to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(content: &str) -> (tempfile::TempDir, Result<ConfigStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, content).unwrap();
        let store = ConfigStore::load(&path);
        (dir, store)
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(store.settings(), &Settings::default());
        assert_eq!(store.settings().projector_res, (640, 480));
        assert_eq!(store.settings().cutting_mat, (420.0, 270.0));
        assert!(!store.settings().inverted);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let (_dir, store) = store_with("inverted = true\n");
        let settings = store.unwrap().settings().clone();
        assert!(settings.inverted);
        assert_eq!(settings.coord_order, PickOrder::default());
        assert_eq!(settings.selected_coords, None);
    }

    #[test]
    fn test_integer_coordinates_load() {
        let (_dir, store) = store_with(
            r#"
projectorres = [1024, 768]
cuttingmat = [600, 450]
coordorder = ["tl", "tr", "br", "bl"]
inverted = false

[selectedcoords]
tl = [12, 7]
tr = [1000, 3]
bl = [20, 760]
br = [1010, 750]
"#,
        );
        let settings = store.unwrap().settings().clone();
        assert_eq!(settings.projector_res, (1024, 768));
        assert_eq!(settings.cutting_mat, (600.0, 450.0));
        assert_eq!(settings.coord_order.get(1), Corner::TopRight);
        let quad = settings.selected_coords.unwrap();
        assert_eq!(quad.top_left, Point::new(12.0, 7.0));
        assert_eq!(quad.bottom_right, Point::new(1010.0, 750.0));
    }

    #[test]
    fn test_malformed_value_is_error() {
        let (_dir, store) = store_with("inverted = \"yes\"\n");
        assert!(store.is_err());
    }

    #[test]
    fn test_unknown_corner_label_is_error() {
        let (_dir, store) = store_with("coordorder = [\"tl\", \"middle\"]\n");
        assert!(store.is_err());
    }

    #[test]
    fn test_empty_pick_order_is_error() {
        let (_dir, store) = store_with("coordorder = []\n");
        assert!(store.is_err());
        assert_eq!(PickOrder::new(Vec::new()), Err(PickOrderError::Empty));
    }

    #[test]
    fn test_partial_quad_is_error() {
        let (_dir, store) = store_with("[selectedcoords]\ntl = [0, 0]\ntr = [5, 0]\n");
        assert!(store.is_err());
    }

    #[test]
    fn test_zero_resolution_is_error() {
        let (_dir, store) = store_with("projectorres = [0, 480]\n");
        assert!(store.is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut store = ConfigStore::load(&path).unwrap();
        store.settings_mut().inverted = true;
        store.settings_mut().selected_coords = Some(Quad {
            top_left: Point::new(0.1, 0.2),
            top_right: Point::new(633.25, 1.0 / 3.0),
            bottom_left: Point::new(4.0, 479.0),
            bottom_right: Point::new(640.0, 480.0),
        });
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.settings(), store.settings());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let (dir, store) = store_with(
            "brightness = 3\ninverted = true\n\n[keystone]\nmode = \"manual\"\n",
        );
        let mut store = store.unwrap();
        assert_eq!(store.settings().extra.len(), 2);

        store.settings_mut().inverted = false;
        store.save().unwrap();

        let reloaded = ConfigStore::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        let settings = reloaded.settings();
        assert!(!settings.inverted);
        assert_eq!(settings.extra.get("brightness"), Some(&toml::Value::Integer(3)));
        assert_eq!(
            settings
                .extra
                .get("keystone")
                .and_then(|t| t.get("mode"))
                .and_then(|v| v.as_str()),
            Some("manual")
        );
        assert!(!settings.extra.contains_key("inverted"));
    }

    #[test]
    fn test_pick_order_wraps() {
        let order = PickOrder::default();
        assert_eq!(order.len(), 4);
        assert!(!order.is_empty());
        assert_eq!(order.get(0), Corner::TopLeft);
        assert_eq!(order.get(4), Corner::TopLeft);
        assert_eq!(order.get(6), Corner::BottomRight);
    }

    #[test]
    fn test_quad_canonical_order() {
        let quad = Quad::from_rect(0.0, 0.0, 100.0, 50.0);
        assert_eq!(
            quad.canonical_points(),
            [
                Point::new(0.0, 50.0),
                Point::new(100.0, 50.0),
                Point::new(100.0, 0.0),
                Point::new(0.0, 0.0),
            ]
        );
    }
}
