//! Programmatic catalog construction, used by `generate_sample` and tests.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Days, NaiveDate};
use uuid::Uuid;

use super::loader::{save_catalog, save_pixels};
use super::model::{
    Analysis, Catalog, Experiment, Id, OmicsArea, OmicsUnit, OmicsUnitType, Pixel, PixelSet,
    Pixeler, Species, Tag, short_id,
};

/// Name of the catalog file written by [`CatalogBuilder::write_to`].
pub const CATALOG_FILENAME: &str = "catalog.json";

const DEFAULT_OMICS_UNIT_TYPE: &str = "mRNA";

/// Builds a consistent [`Catalog`] one Pixel Set at a time.
///
/// Each Pixel Set gets its own analysis and experiment so that tags,
/// descriptions and omics areas can be tuned per set.
pub struct CatalogBuilder {
    catalog: Catalog,
    pixels: HashMap<Id, Vec<Pixel>>,
    pixeler: Id,
    default_area: Id,
    extension: String,
    base_date: NaiveDate,
    ids: IdSource,
}

/// Where record ids come from.
enum IdSource {
    Random,
    /// splitmix64 state; the same seed gives the same ids.
    Seeded(u64),
}

impl IdSource {
    fn next(&mut self) -> Id {
        match self {
            IdSource::Random => Uuid::new_v4(),
            IdSource::Seeded(state) => {
                let hi = splitmix64(state) as u128;
                let lo = splitmix64(state) as u128;
                uuid::Builder::from_random_bytes(((hi << 64) | lo).to_be_bytes()).into_uuid()
            }
        }
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    /// Random ids.
    pub fn new() -> Self {
        Self::with_ids(IdSource::Random)
    }

    /// Ids drawn from `seed`, so equal call sequences build equal catalogs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_ids(IdSource::Seeded(seed))
    }

    fn with_ids(mut ids: IdSource) -> Self {
        let mut catalog = Catalog::default();
        let pixeler = ids.next();
        catalog.pixelers.push(Pixeler {
            id: pixeler,
            username: "pixeler".to_string(),
        });
        let default_area = ids.next();
        catalog.omics_areas.push(OmicsArea {
            id: default_area,
            name: "omics".to_string(),
            description: String::new(),
            parent: None,
        });

        let mut builder = Self {
            catalog,
            pixels: HashMap::new(),
            pixeler,
            default_area,
            extension: "csv".to_string(),
            base_date: NaiveDate::from_ymd_opt(2018, 1, 12).unwrap_or(NaiveDate::MIN),
            ids,
        };
        builder.omics_unit_type(DEFAULT_OMICS_UNIT_TYPE);
        builder
    }

    /// Extension (and thus format) of pixel files created from now on.
    pub fn set_file_extension(&mut self, extension: &str) {
        self.extension = extension.trim_start_matches('.').to_string();
    }

    // -- Reference records (get-or-create by name) --

    pub fn species(&mut self, name: &str) -> Id {
        if let Some(s) = self.catalog.species.iter().find(|s| s.name == name) {
            return s.id;
        }
        let id = self.ids.next();
        self.catalog.species.push(Species {
            id,
            name: name.to_string(),
            description: String::new(),
        });
        id
    }

    pub fn omics_unit_type(&mut self, name: &str) -> Id {
        if let Some(t) = self.catalog.omics_unit_types.iter().find(|t| t.name == name) {
            return t.id;
        }
        let id = self.ids.next();
        self.catalog.omics_unit_types.push(OmicsUnitType {
            id,
            name: name.to_string(),
            description: String::new(),
        });
        id
    }

    pub fn tag(&mut self, name: &str) -> Id {
        let name = name.to_lowercase();
        if let Some(t) = self.catalog.tags.iter().find(|t| t.name == name) {
            return t.id;
        }
        self.distinct_tag(&name)
    }

    /// A new tag record even if one with the same name exists.
    pub fn distinct_tag(&mut self, name: &str) -> Id {
        let id = self.ids.next();
        self.catalog.tags.push(Tag {
            id,
            name: name.to_lowercase(),
        });
        id
    }

    /// Always creates a new area.
    pub fn omics_area(&mut self, name: &str, parent: Option<Id>) -> Id {
        let id = self.ids.next();
        self.catalog.omics_areas.push(OmicsArea {
            id,
            name: name.to_string(),
            description: String::new(),
            parent,
        });
        id
    }

    // -- Pixel sets --

    /// Add a Pixel Set for `species` with a fresh analysis and experiment.
    pub fn pixel_set(&mut self, species: &str) -> Id {
        self.species(species);
        let n = self.catalog.pixel_sets.len() as u64;
        let completed = self
            .base_date
            .checked_add_days(Days::new(n))
            .unwrap_or(self.base_date);
        let released = completed
            .checked_add_days(Days::new(30))
            .unwrap_or(completed);

        let experiment = self.ids.next();
        self.catalog.experiments.push(Experiment {
            id: experiment,
            description: format!("Experiment on {species}"),
            omics_area: self.default_area,
            tags: Vec::new(),
            completed_at: completed,
            released_at: released,
        });

        let analysis = self.ids.next();
        self.catalog.analyses.push(Analysis {
            id: analysis,
            description: format!("Analysis number {}", n + 1),
            pixeler: self.pixeler,
            experiments: vec![experiment],
            tags: Vec::new(),
            completed_at: completed,
        });

        let id = self.ids.next();
        let area_name = self.area_name(&self.default_area);
        self.catalog.pixel_sets.push(PixelSet {
            id,
            pixels_file: PathBuf::from("pixelsets").join(format!(
                "{}_{}.{}",
                short_id(&analysis),
                short_id(&id),
                self.extension
            )),
            description: format!("Pixel Set number {}", n + 1),
            analysis,
            cached_species: vec![species.to_string()],
            cached_omics_unit_types: Vec::new(),
            cached_omics_areas: area_name.into_iter().collect(),
            cached_omics_units: Vec::new(),
        });
        self.pixels.insert(id, Vec::new());
        id
    }

    /// Append pixels of the default omics unit type.
    pub fn add_pixels(&mut self, pixel_set: Id, rows: &[(&str, f64, Option<f64>)]) {
        self.add_pixels_of_type(pixel_set, DEFAULT_OMICS_UNIT_TYPE, rows);
    }

    /// Append pixels; omics units missing from the catalog are created for
    /// the Pixel Set's species.
    pub fn add_pixels_of_type(
        &mut self,
        pixel_set: Id,
        type_name: &str,
        rows: &[(&str, f64, Option<f64>)],
    ) {
        let type_id = self.omics_unit_type(type_name);
        let Some(species_name) = self
            .pixel_set_mut(pixel_set)
            .and_then(|ps| ps.cached_species.first().cloned())
        else {
            return;
        };
        let species = self.species(&species_name);

        for (reference, value, quality_score) in rows {
            if !self.catalog.omics_units.iter().any(|u| u.reference == *reference) {
                let id = self.ids.next();
                self.catalog.omics_units.push(OmicsUnit {
                    id,
                    reference: reference.to_string(),
                    description: format!("Gene {reference}"),
                    species,
                    type_id,
                });
            }
            self.pixels.entry(pixel_set).or_default().push(Pixel {
                omics_unit: reference.to_string(),
                value: *value,
                quality_score: *quality_score,
            });
        }

        if let Some(ps) = self.pixel_set_mut(pixel_set) {
            push_unique(&mut ps.cached_omics_unit_types, type_name);
            for (reference, _, _) in rows {
                push_unique(&mut ps.cached_omics_units, reference);
            }
        }
    }

    pub fn set_omics_area(&mut self, pixel_set: Id, area: Id) {
        let name = self.area_name(&area);
        if let Some(exp) = self.experiment_mut(pixel_set) {
            exp.omics_area = area;
        }
        if let Some(ps) = self.pixel_set_mut(pixel_set) {
            ps.cached_omics_areas = name.into_iter().collect();
        }
    }

    pub fn tag_analysis(&mut self, pixel_set: Id, tag: Id) {
        if let Some(analysis) = self.analysis_mut(pixel_set) {
            analysis.tags.push(tag);
        }
    }

    pub fn tag_experiment(&mut self, pixel_set: Id, tag: Id) {
        if let Some(exp) = self.experiment_mut(pixel_set) {
            exp.tags.push(tag);
        }
    }

    pub fn describe_analysis(&mut self, pixel_set: Id, description: &str) {
        if let Some(analysis) = self.analysis_mut(pixel_set) {
            analysis.description = description.to_string();
        }
    }

    pub fn describe_experiment(&mut self, pixel_set: Id, description: &str) {
        if let Some(exp) = self.experiment_mut(pixel_set) {
            exp.description = description.to_string();
        }
    }

    /// Pixel rows recorded so far for a set.
    pub fn pixels(&self, pixel_set: Id) -> &[Pixel] {
        self.pixels.get(&pixel_set).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn finish(self) -> Catalog {
        self.catalog
    }

    /// Write every pixel file plus `catalog.json` under `dir`.
    pub fn write_to(self, dir: &Path) -> Result<Catalog> {
        for ps in &self.catalog.pixel_sets {
            save_pixels(&dir.join(&ps.pixels_file), self.pixels(ps.id))?;
        }
        std::fs::create_dir_all(dir)?;
        save_catalog(&dir.join(CATALOG_FILENAME), &self.catalog)?;
        Ok(self.catalog)
    }

    // -- internals --

    fn area_name(&self, id: &Id) -> Option<String> {
        self.catalog
            .omics_areas
            .iter()
            .find(|a| &a.id == id)
            .map(|a| a.name.clone())
    }

    fn pixel_set_mut(&mut self, id: Id) -> Option<&mut PixelSet> {
        self.catalog.pixel_sets.iter_mut().find(|ps| ps.id == id)
    }

    fn analysis_mut(&mut self, pixel_set: Id) -> Option<&mut Analysis> {
        let analysis = self.pixel_set_mut(pixel_set)?.analysis;
        self.catalog.analyses.iter_mut().find(|a| a.id == analysis)
    }

    fn experiment_mut(&mut self, pixel_set: Id) -> Option<&mut Experiment> {
        let experiments: BTreeSet<Id> = self
            .analysis_mut(pixel_set)?
            .experiments
            .iter()
            .copied()
            .collect();
        self.catalog
            .experiments
            .iter_mut()
            .find(|e| experiments.contains(&e.id))
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
        list.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(mut b: CatalogBuilder) -> Catalog {
        let area = b.omics_area("transcriptomics", None);
        for species in ["Saccharomyces cerevisiae", "Candida glabrata"] {
            let ps = b.pixel_set(species);
            b.set_omics_area(ps, area);
            let tag = b.tag("stress/heat");
            b.tag_experiment(ps, tag);
            b.add_pixels(ps, &[("YAL001C", 1.0, None)]);
        }
        b.finish()
    }

    #[test]
    fn same_seed_builds_same_catalog() {
        let first = build(CatalogBuilder::seeded(42));
        assert_eq!(first, build(CatalogBuilder::seeded(42)));
        assert_ne!(first, build(CatalogBuilder::seeded(43)));
        assert!(first.pixel_sets.iter().all(|ps| ps.id.get_version_num() == 4));
    }

    #[test]
    fn seeded_ids_do_not_repeat() {
        let catalog = build(CatalogBuilder::seeded(7));
        let mut ids: Vec<Id> = catalog.pixel_sets.iter().map(|p| p.id).collect();
        ids.extend(catalog.analyses.iter().map(|a| a.id));
        ids.extend(catalog.experiments.iter().map(|e| e.id));
        ids.extend(catalog.omics_units.iter().map(|u| u.id));
        let distinct: BTreeSet<Id> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), ids.len());
    }
}
