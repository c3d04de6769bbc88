//! Geocode the cities of categorized companies and render one map per
//! strategy plus a combined map.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tracing::{info, warn};

use crate::models::{read_csv, CategorizedCompany};
use crate::providers::nominatim::{Coordinates, GeocodeOutcome, Geocoder};
use crate::taxonomy::STRATEGIES;

pub mod render;

use render::{outline_for, palette, render_map, Layer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSummary {
    pub companies: usize,
    pub cities: usize,
    pub dropped_cities: Vec<String>,
    pub maps: Vec<PathBuf>,
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("geocoding {bar:40} {pos}/{len} cities ({eta})")
    {
        pb.set_style(style);
    }
    pb
}

/// Map file name for one strategy, e.g. `map_R8_Recycle.png`.
pub fn map_file_name(code: &str, name: &str) -> String {
    format!("map_{code}_{}.png", name.replace(char::is_whitespace, "_"))
}

/// Companies per `(city, strategy code)`, skipping rows without a city.
pub fn count_by_city(rows: &[CategorizedCompany]) -> HashMap<(String, String), usize> {
    rows.iter()
        .filter_map(|r| r.city.as_deref().map(|city| (city, r)))
        .flat_map(|(city, r)| r.codes().into_iter().map(move |code| (city.to_string(), code)))
        .counts()
}

/// Group counts into one layer per strategy, in taxonomy order, with colors
/// spread over the palette. Cities without coordinates are left out.
pub fn build_layers(
    counts: &HashMap<(String, String), usize>,
    coords: &HashMap<String, Coordinates>,
) -> Vec<Layer> {
    let present: Vec<_> = STRATEGIES
        .iter()
        .filter(|s| counts.keys().any(|(_, code)| code == s.code))
        .collect();
    let colors = palette(present.len());
    present
        .into_iter()
        .zip(colors)
        .map(|(strategy, color)| {
            let points = counts
                .iter()
                .filter(|((_, code), _)| code == strategy.code)
                .sorted_by(|((city_a, _), a), ((city_b, _), b)| b.cmp(a).then(city_a.cmp(city_b)))
                .filter_map(|((city, _), n)| coords.get(city).map(|c| (*c, *n)))
                .collect();
            Layer {
                code: strategy.code.to_string(),
                name: strategy.name.to_string(),
                color,
                points,
            }
        })
        .collect()
}

/// Geocode, count and render. Returns `Ok(None)` when the input has no rows
/// for `country`.
pub async fn run(
    geocoder: &mut Geocoder,
    input: &Path,
    country: &str,
    output_dir: &Path,
) -> Result<Option<MappingSummary>> {
    info!(path = %input.display(), %country, "loading categorized companies");
    let rows: Vec<CategorizedCompany> = read_csv::<CategorizedCompany>(input)?
        .into_iter()
        .filter(|r| r.country.as_deref() == Some(country))
        .collect();
    if rows.is_empty() {
        warn!(%country, "no categorized companies to map");
        return Ok(None);
    }

    let cities: Vec<String> = rows
        .iter()
        .filter_map(|r| r.city.clone())
        .filter(|c| !c.trim().is_empty())
        .unique()
        .collect();

    let pb = progress_bar(cities.len() as u64);
    let mut coords = HashMap::new();
    let mut dropped = Vec::new();
    for city in &cities {
        match geocoder.resolve(city, country).await {
            GeocodeOutcome::Cached(c) | GeocodeOutcome::Resolved(c) => {
                coords.insert(city.clone(), c);
            }
            GeocodeOutcome::NotFound | GeocodeOutcome::Failed => {
                warn!(%city, "could not geocode city, dropping it from the maps");
                dropped.push(city.clone());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    geocoder.save()?;
    info!(
        cities = cities.len(),
        resolved = coords.len(),
        network_calls = geocoder.network_calls(),
        "geocoding done"
    );

    let counts = count_by_city(&rows);
    let layers = build_layers(&counts, &coords);
    for layer in &layers {
        let (r, g, b) = (layer.color.0, layer.color.1, layer.color.2);
        info!(code = %layer.code, name = %layer.name, color = %format!("#{r:02x}{g:02x}{b:02x}"), "legend");
    }

    std::fs::create_dir_all(output_dir)?;
    let outline = outline_for(country);
    let mut maps = Vec::new();
    for layer in layers.iter().filter(|l| !l.points.is_empty()) {
        let path = output_dir.join(map_file_name(&layer.code, &layer.name));
        render_map(&path, outline, std::slice::from_ref(layer))?;
        info!(path = %path.display(), points = layer.points.len(), "map saved");
        maps.push(path);
    }
    if layers.iter().any(|l| !l.points.is_empty()) {
        let path = output_dir.join("map_all.png");
        render_map(&path, outline, &layers)?;
        info!(path = %path.display(), "combined map saved");
        maps.push(path);
    } else {
        warn!("no geocoded points, skipping maps");
    }

    Ok(Some(MappingSummary {
        companies: rows.len(),
        cities: cities.len(),
        dropped_cities: dropped,
        maps,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(city: &str, codes: &str) -> CategorizedCompany {
        CategorizedCompany {
            company_name: format!("{city}-{codes}"),
            strategy_codes: codes.into(),
            city: Some(city.into()),
            country: Some("Germany".into()),
            ..Default::default()
        }
    }

    #[test]
    fn counts_per_city_and_code() {
        let rows = vec![row("Berlin", "R3, R8"), row("Berlin", "R8"), row("Munich", "R5")];
        let counts = count_by_city(&rows);
        let key = |city: &str, code: &str| (city.to_string(), code.to_string());
        assert_eq!(counts[&key("Berlin", "R8")], 2);
        assert_eq!(counts[&key("Berlin", "R3")], 1);
        assert_eq!(counts[&key("Munich", "R5")], 1);
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn layers_follow_taxonomy_order_and_skip_unresolved_cities() {
        let rows = vec![row("Berlin", "R8"), row("Atlantis", "R8"), row("Munich", "R3")];
        let counts = count_by_city(&rows);
        let coords = HashMap::from([
            ("Berlin".to_string(), (52.52, 13.40)),
            ("Munich".to_string(), (48.14, 11.58)),
        ]);
        let layers = build_layers(&counts, &coords);
        let codes: Vec<&str> = layers.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, ["R3", "R8"]);
        assert_eq!(layers[1].points, vec![((52.52, 13.40), 1)]);
        assert_ne!(layers[0].color, layers[1].color);
    }

    #[test]
    fn points_with_equal_counts_are_ordered_by_city() {
        let rows = vec![
            row("Munich", "R8"),
            row("Berlin", "R8"),
            row("Hamburg", "R8"),
            row("Hamburg", "R8"),
        ];
        let counts = count_by_city(&rows);
        let coords = HashMap::from([
            ("Berlin".to_string(), (52.52, 13.40)),
            ("Hamburg".to_string(), (53.55, 9.99)),
            ("Munich".to_string(), (48.14, 11.58)),
        ]);
        for _ in 0..5 {
            let layers = build_layers(&counts, &coords);
            assert_eq!(
                layers[0].points,
                vec![((53.55, 9.99), 2), ((52.52, 13.40), 1), ((48.14, 11.58), 1)]
            );
        }
    }

    #[test]
    fn file_names_have_no_spaces() {
        assert_eq!(map_file_name("R8", "Recycle"), "map_R8_Recycle.png");
        assert_eq!(map_file_name("R9", "Energy Recovery"), "map_R9_Energy_Recovery.png");
    }
}
