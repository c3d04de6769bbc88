//! PNG scatter maps drawn with plotters' bitmap backend.
//!
//! The backend is built without font support, so maps carry no text: the
//! legend is a column of color swatches in strategy order and the
//! code/name/color mapping is logged alongside.
use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;

use crate::providers::nominatim::Coordinates;

/// Coarse Germany border as `(lon, lat)` pairs.
pub const GERMANY_OUTLINE: &[(f64, f64)] = &[
    (5.99, 51.85),
    (6.83, 51.97),
    (6.98, 52.45),
    (7.06, 52.65),
    (7.20, 53.24),
    (7.02, 53.68),
    (8.12, 53.53),
    (8.80, 54.02),
    (8.57, 54.40),
    (8.53, 55.05),
    (9.42, 54.83),
    (9.94, 54.60),
    (10.95, 54.36),
    (11.10, 54.01),
    (12.34, 54.47),
    (13.65, 54.08),
    (14.12, 53.76),
    (14.38, 53.25),
    (14.12, 52.98),
    (14.64, 52.42),
    (14.60, 51.75),
    (15.04, 51.11),
    (14.31, 51.12),
    (14.06, 50.93),
    (12.24, 50.27),
    (12.41, 49.97),
    (12.52, 49.55),
    (13.03, 49.31),
    (13.84, 48.77),
    (13.60, 48.05),
    (12.76, 47.67),
    (13.02, 47.47),
    (12.14, 47.70),
    (11.43, 47.52),
    (10.45, 47.56),
    (9.60, 47.53),
    (8.52, 47.83),
    (8.32, 47.61),
    (7.59, 47.58),
    (7.47, 48.35),
    (8.10, 49.02),
    (6.66, 49.20),
    (6.19, 49.46),
    (6.24, 49.90),
    (6.04, 50.13),
    (6.16, 50.80),
    (5.99, 51.85),
];

/// Outline for a country name, if one is bundled.
pub fn outline_for(country: &str) -> Option<&'static [(f64, f64)]> {
    match country.trim().to_ascii_lowercase().as_str() {
        "germany" | "deutschland" => Some(GERMANY_OUTLINE),
        _ => None,
    }
}

/// Sample of the matplotlib "coolwarm" map at `t` in `[0, 1]`.
pub fn coolwarm(t: f64) -> RGBColor {
    const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const MID: (f64, f64, f64) = (221.0, 221.0, 221.0);
    const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);
    let t = t.clamp(0.0, 1.0);
    let (a, b, u) = if t < 0.5 {
        (COOL, MID, t * 2.0)
    } else {
        (MID, WARM, (t - 0.5) * 2.0)
    };
    let lerp = |x: f64, y: f64| (x + (y - x) * u).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// `n` evenly spaced colors from the coolwarm map.
pub fn palette(n: usize) -> Vec<RGBColor> {
    match n {
        0 => Vec::new(),
        1 => vec![coolwarm(0.0)],
        _ => (0..n).map(|i| coolwarm(i as f64 / (n - 1) as f64)).collect(),
    }
}

/// One strategy's points: coordinates plus number of companies there.
#[derive(Debug, Clone)]
pub struct Layer {
    pub code: String,
    pub name: String,
    pub color: RGBColor,
    pub points: Vec<(Coordinates, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
}

impl Bounds {
    fn fit(outline: Option<&[(f64, f64)]>, layers: &[Layer]) -> Option<Self> {
        let lon_lat = outline
            .into_iter()
            .flatten()
            .copied()
            .chain(
                layers
                    .iter()
                    .flat_map(|l| l.points.iter().map(|((lat, lon), _)| (*lon, *lat))),
            );
        let mut bounds: Option<Bounds> = None;
        for (lon, lat) in lon_lat {
            let b = bounds.get_or_insert(Bounds {
                min_lon: lon,
                max_lon: lon,
                min_lat: lat,
                max_lat: lat,
            });
            b.min_lon = b.min_lon.min(lon);
            b.max_lon = b.max_lon.max(lon);
            b.min_lat = b.min_lat.min(lat);
            b.max_lat = b.max_lat.max(lat);
        }
        bounds.map(|b| {
            // half a degree of margin, and never a zero-size box
            Bounds {
                min_lon: b.min_lon - 0.5,
                max_lon: b.max_lon + 0.5,
                min_lat: b.min_lat - 0.5,
                max_lat: b.max_lat + 0.5,
            }
        })
    }
}

/// Equirectangular projection onto a pixel canvas, longitudes scaled by the
/// cosine of the mid latitude.
#[derive(Debug, Clone, Copy)]
struct Projection {
    bounds: Bounds,
    scale: f64,
    lon_factor: f64,
    offset: (f64, f64),
}

impl Projection {
    fn new(bounds: Bounds, size: (u32, u32), margin: u32) -> Self {
        let mid_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
        let lon_factor = mid_lat.to_radians().cos().max(0.1);
        let width = (bounds.max_lon - bounds.min_lon) * lon_factor;
        let height = bounds.max_lat - bounds.min_lat;
        let avail_w = f64::from(size.0.saturating_sub(2 * margin).max(1));
        let avail_h = f64::from(size.1.saturating_sub(2 * margin).max(1));
        let scale = (avail_w / width).min(avail_h / height);
        let offset = (
            f64::from(margin) + (avail_w - width * scale) / 2.0,
            f64::from(margin) + (avail_h - height * scale) / 2.0,
        );
        Self {
            bounds,
            scale,
            lon_factor,
            offset,
        }
    }

    fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        let x = (lon - self.bounds.min_lon) * self.lon_factor * self.scale + self.offset.0;
        let y = (self.bounds.max_lat - lat) * self.scale + self.offset.1;
        (x.round() as i32, y.round() as i32)
    }
}

/// Marker radius in pixels; area grows linearly with the company count.
pub fn marker_radius(count: usize) -> i32 {
    (4.0 * (count.max(1) as f64).sqrt()).round() as i32
}

const CANVAS: (u32, u32) = (1200, 1200);
const MARGIN: u32 = 40;
const LAND: RGBColor = RGBColor(211, 211, 211);

/// Draw `layers` over the optional country outline and save the PNG to `path`.
pub fn render_map(path: &Path, outline: Option<&[(f64, f64)]>, layers: &[Layer]) -> Result<()> {
    let bounds = Bounds::fit(outline, layers)
        .ok_or_else(|| anyhow!("nothing to draw for {}", path.display()))?;
    let projection = Projection::new(bounds, CANVAS, MARGIN);
    let draw_err = |e: DrawingAreaErrorKind<_>| anyhow!("drawing {}: {e}", path.display());

    let root = BitMapBackend::new(path, CANVAS).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    if let Some(outline) = outline {
        let px: Vec<(i32, i32)> = outline
            .iter()
            .map(|(lon, lat)| projection.project(*lon, *lat))
            .collect();
        root.draw(&Polygon::new(px.clone(), LAND.filled()))
            .map_err(draw_err)?;
        root.draw(&PathElement::new(px, BLACK.stroke_width(1)))
            .map_err(draw_err)?;
    }

    for layer in layers {
        for ((lat, lon), count) in &layer.points {
            let center = projection.project(*lon, *lat);
            let r = marker_radius(*count);
            root.draw(&Circle::new(center, r, layer.color.mix(0.6).filled()))
                .map_err(draw_err)?;
            root.draw(&Circle::new(center, r, BLACK.stroke_width(1)))
                .map_err(draw_err)?;
        }
    }

    // legend swatches, top right
    let (w, _) = CANVAS;
    for (i, layer) in layers.iter().enumerate() {
        let top = MARGIN as i32 + i as i32 * 24;
        let left = w as i32 - MARGIN as i32 - 18;
        root.draw(&Rectangle::new(
            [(left, top), (left + 18, top + 18)],
            layer.color.filled(),
        ))
        .map_err(draw_err)?;
        root.draw(&Rectangle::new(
            [(left, top), (left + 18, top + 18)],
            BLACK.stroke_width(1),
        ))
        .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coolwarm_endpoints() {
        assert_eq!(coolwarm(0.0), RGBColor(59, 76, 192));
        assert_eq!(coolwarm(0.5), RGBColor(221, 221, 221));
        assert_eq!(coolwarm(1.0), RGBColor(180, 4, 38));
        assert_eq!(palette(3).len(), 3);
        assert_eq!(palette(0).len(), 0);
    }

    #[test]
    fn projection_keeps_north_up() {
        let bounds = Bounds::fit(Some(GERMANY_OUTLINE), &[]).unwrap();
        let p = Projection::new(bounds, CANVAS, MARGIN);
        let (_, kiel_y) = p.project(10.13, 54.32);
        let (_, munich_y) = p.project(11.58, 48.14);
        assert!(kiel_y < munich_y);
        let (berlin_x, _) = p.project(13.40, 52.52);
        let (cologne_x, _) = p.project(6.96, 50.94);
        assert!(cologne_x < berlin_x);
        for (lon, lat) in GERMANY_OUTLINE {
            let (x, y) = p.project(*lon, *lat);
            assert!((0..CANVAS.0 as i32).contains(&x));
            assert!((0..CANVAS.1 as i32).contains(&y));
        }
    }

    #[test]
    fn marker_area_tracks_count() {
        assert_eq!(marker_radius(1), 4);
        assert_eq!(marker_radius(4), 8);
        assert_eq!(marker_radius(0), 4);
    }

    #[test]
    fn renders_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map_all.png");
        let layers = vec![Layer {
            code: "R8".into(),
            name: "Recycle".into(),
            color: coolwarm(0.0),
            points: vec![((52.52, 13.40), 3), ((48.14, 11.58), 1)],
        }];
        render_map(&path, outline_for("Germany"), &layers).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn empty_map_without_outline_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(render_map(&dir.path().join("x.png"), None, &[]).is_err());
    }
}
