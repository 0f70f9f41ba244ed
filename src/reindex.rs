use std::collections::BTreeSet;

use crate::data::model::{Catalog, PixelSet};
use crate::data::store::PixelSource;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    pub pixel_sets: usize,
    pub pixels: usize,
    /// References in pixel files with no omics unit record.
    pub unknown_omics_units: usize,
}

struct Cached {
    species: Vec<String>,
    omics_unit_types: Vec<String>,
    omics_areas: Vec<String>,
    omics_units: Vec<String>,
}

/// Recompute the cached fields of every Pixel Set from its pixel file.
///
/// Stops at the first pixel file that cannot be read; the catalog is left
/// untouched in that case.
pub fn reindex(catalog: &mut Catalog, source: &dyn PixelSource) -> Result<ReindexSummary, StoreError> {
    let mut summary = ReindexSummary::default();
    let mut updates = Vec::with_capacity(catalog.pixel_sets.len());
    for ps in &catalog.pixel_sets {
        let (cached, pixels, unknown) = compute(catalog, ps, source)?;
        log::debug!(
            "reindex: {} has {pixels} pixels over {} omics units",
            ps.filename(),
            cached.omics_units.len()
        );
        summary.pixel_sets += 1;
        summary.pixels += pixels;
        summary.unknown_omics_units += unknown;
        updates.push(cached);
    }

    for (ps, cached) in catalog.pixel_sets.iter_mut().zip(updates) {
        ps.cached_species = cached.species;
        ps.cached_omics_unit_types = cached.omics_unit_types;
        ps.cached_omics_areas = cached.omics_areas;
        ps.cached_omics_units = cached.omics_units;
    }
    log::info!(
        "reindexed {} Pixel Sets ({} pixels, {} unknown omics unit references)",
        summary.pixel_sets,
        summary.pixels,
        summary.unknown_omics_units
    );
    Ok(summary)
}

fn compute(
    catalog: &Catalog,
    ps: &PixelSet,
    source: &dyn PixelSource,
) -> Result<(Cached, usize, usize), StoreError> {
    let pixels = source.read_pixels(ps)?;
    let units = catalog.omics_units_by_reference();

    let references: BTreeSet<String> = pixels.iter().map(|p| p.omics_unit.clone()).collect();
    let mut species = BTreeSet::new();
    let mut types = BTreeSet::new();
    let mut unknown = 0;
    for reference in &references {
        let Some(unit) = units.get(reference.as_str()) else {
            unknown += 1;
            continue;
        };
        if let Some(s) = catalog.species.iter().find(|s| s.id == unit.species) {
            species.insert(s.name.clone());
        }
        if let Some(t) = catalog.omics_unit_types.iter().find(|t| t.id == unit.type_id) {
            types.insert(t.name.clone());
        }
    }

    let mut areas = BTreeSet::new();
    if let Some(analysis) = catalog.analyses.iter().find(|a| a.id == ps.analysis) {
        for exp in catalog
            .experiments
            .iter()
            .filter(|e| analysis.experiments.contains(&e.id))
        {
            if let Some(area) = catalog.omics_areas.iter().find(|a| a.id == exp.omics_area) {
                areas.insert(area.name.clone());
            }
        }
    }

    let cached = Cached {
        species: species.into_iter().collect(),
        omics_unit_types: types.into_iter().collect(),
        omics_areas: areas.into_iter().collect(),
        omics_units: references.into_iter().collect(),
    };
    Ok((cached, pixels.len(), unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::CatalogBuilder;
    use crate::data::store::FsPixelSource;

    #[test]
    fn recomputes_cached_fields_from_pixel_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        b.add_pixels(ps, &[("YAL002W", 1.0, None), ("YAL001C", 2.0, Some(0.5))]);
        b.add_pixels_of_type(ps, "protein", &[("P12345", 3.0, None)]);
        let mut catalog = b.write_to(dir.path()).unwrap();
        let expected = catalog.pixel_sets[0].clone();

        for set in &mut catalog.pixel_sets {
            set.cached_species.clear();
            set.cached_omics_unit_types.clear();
            set.cached_omics_areas.clear();
            set.cached_omics_units.clear();
        }
        let summary = reindex(&mut catalog, &FsPixelSource::new(dir.path())).unwrap();

        assert_eq!(summary, ReindexSummary { pixel_sets: 1, pixels: 3, unknown_omics_units: 0 });
        let set = &catalog.pixel_sets[0];
        assert_eq!(set.cached_species, vec!["Saccharomyces cerevisiae"]);
        assert_eq!(set.cached_omics_unit_types, vec!["mRNA", "protein"]);
        assert_eq!(set.cached_omics_units, vec!["P12345", "YAL001C", "YAL002W"]);
        assert_eq!(set.cached_omics_areas, expected.cached_omics_areas);
    }

    #[test]
    fn missing_file_stops_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        b.add_pixels(ps, &[("YAL001C", 1.0, None)]);
        let mut catalog = b.finish();
        let before = catalog.clone();

        let err = reindex(&mut catalog, &FsPixelSource::new(dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::MissingPixelFile { .. }));
        assert_eq!(catalog, before);
    }
}
