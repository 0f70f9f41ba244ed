use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::filter::{filtered_indices, Choice, FilterOptions, FilterSpec};
use super::loader;
use super::model::{
    Analysis, Catalog, Experiment, Id, OmicsArea, OmicsUnit, OmicsUnitType, Pixel, PixelSet,
    Pixeler, Species, Tag, short_id,
};
use super::tags::merge_tag_ids;
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Pixel source: where pixel rows come from
// ---------------------------------------------------------------------------

/// Access to the pixel rows behind a Pixel Set.
pub trait PixelSource: Send + Sync {
    /// Fail if the pixel file cannot be reached at all.
    fn ensure_available(&self, pixel_set: &PixelSet) -> Result<(), StoreError>;

    /// Read every pixel row of the set, in file order.
    fn read_pixels(&self, pixel_set: &PixelSet) -> Result<Vec<Pixel>, StoreError>;
}

/// Pixel files laid out under a data directory.
#[derive(Debug, Clone)]
pub struct FsPixelSource {
    data_dir: PathBuf,
}

impl FsPixelSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path_of(&self, pixel_set: &PixelSet) -> PathBuf {
        self.data_dir.join(&pixel_set.pixels_file)
    }
}

impl PixelSource for FsPixelSource {
    fn ensure_available(&self, pixel_set: &PixelSet) -> Result<(), StoreError> {
        let path = self.path_of(pixel_set);
        if path.is_file() {
            Ok(())
        } else {
            Err(StoreError::MissingPixelFile {
                pixel_set: short_id(&pixel_set.id),
                path,
            })
        }
    }

    fn read_pixels(&self, pixel_set: &PixelSet) -> Result<Vec<Pixel>, StoreError> {
        self.ensure_available(pixel_set)?;
        let path = self.path_of(pixel_set);
        loader::load_pixels(&path).map_err(|e| StoreError::UnreadablePixelFile {
            pixel_set: short_id(&pixel_set.id),
            reason: format!("{e:#}"),
        })
    }
}

/// Pixel source with no files behind it; every set reads as empty.
#[derive(Debug, Clone, Default)]
pub struct EmptyPixelSource;

impl PixelSource for EmptyPixelSource {
    fn ensure_available(&self, _pixel_set: &PixelSet) -> Result<(), StoreError> {
        Ok(())
    }

    fn read_pixels(&self, _pixel_set: &PixelSet) -> Result<Vec<Pixel>, StoreError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// CatalogStore – the Pixel Set store
// ---------------------------------------------------------------------------

/// One page of a filtered listing.
#[derive(Debug)]
pub struct PixelSetPage<'a> {
    pub items: Vec<&'a PixelSet>,
    /// Pixel Sets in the whole store.
    pub total: usize,
    /// Pixel Sets passing the filter.
    pub matched: usize,
    /// 1-based, already clamped to `1..=num_pages`.
    pub page: usize,
    pub num_pages: usize,
}

impl PixelSetPage<'_> {
    /// Rows on this page.
    pub fn displayed(&self) -> usize {
        self.items.len()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }
}

/// Read-only Pixel Set store built from a [`Catalog`], with id indices
/// pre-computed so filtering never scans the reference tables.
pub struct CatalogStore {
    catalog: Catalog,
    source: Box<dyn PixelSource>,
    pixel_sets: HashMap<Id, usize>,
    analyses: HashMap<Id, usize>,
    experiments: HashMap<Id, usize>,
    species: HashMap<Id, usize>,
    omics_unit_types: HashMap<Id, usize>,
    omics_areas: HashMap<Id, usize>,
    tags: HashMap<Id, usize>,
    pixelers: HashMap<Id, usize>,
    omics_units: HashMap<String, usize>,
    area_children: HashMap<Id, Vec<Id>>,
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> Id) -> HashMap<Id, usize> {
    items.iter().enumerate().map(|(i, it)| (key(it), i)).collect()
}

impl CatalogStore {
    /// Build the store, refusing catalogs with dangling references.
    pub fn new(catalog: Catalog, source: impl PixelSource + 'static) -> Result<Self, StoreError> {
        catalog.check_references().map_err(StoreError::Integrity)?;

        let mut area_children: HashMap<Id, Vec<Id>> = HashMap::new();
        for area in &catalog.omics_areas {
            if let Some(parent) = area.parent {
                area_children.entry(parent).or_default().push(area.id);
            }
        }

        Ok(Self {
            pixel_sets: index_by(&catalog.pixel_sets, |p| p.id),
            analyses: index_by(&catalog.analyses, |a| a.id),
            experiments: index_by(&catalog.experiments, |e| e.id),
            species: index_by(&catalog.species, |s| s.id),
            omics_unit_types: index_by(&catalog.omics_unit_types, |t| t.id),
            omics_areas: index_by(&catalog.omics_areas, |a| a.id),
            tags: index_by(&catalog.tags, |t| t.id),
            pixelers: index_by(&catalog.pixelers, |p| p.id),
            omics_units: catalog
                .omics_units
                .iter()
                .enumerate()
                .map(|(i, u)| (u.reference.clone(), i))
                .collect(),
            area_children,
            catalog,
            source: Box::new(source),
        })
    }

    /// Store whose pixel files live under `data_dir`.
    pub fn open(catalog: Catalog, data_dir: &Path) -> Result<Self, StoreError> {
        Self::new(catalog, FsPixelSource::new(data_dir))
    }

    /// Store without pixel files, for listings only.
    pub fn in_memory(catalog: Catalog) -> Result<Self, StoreError> {
        Self::new(catalog, EmptyPixelSource)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.catalog.pixel_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.pixel_sets.is_empty()
    }

    /// All Pixel Sets in insertion order.
    pub fn pixel_sets(&self) -> &[PixelSet] {
        &self.catalog.pixel_sets
    }

    pub fn pixel_set(&self, id: &Id) -> Option<&PixelSet> {
        self.pixel_sets.get(id).map(|&i| &self.catalog.pixel_sets[i])
    }

    pub fn analysis_of(&self, ps: &PixelSet) -> Option<&Analysis> {
        self.analyses.get(&ps.analysis).map(|&i| &self.catalog.analyses[i])
    }

    pub fn experiments_of(&self, analysis: &Analysis) -> Vec<&Experiment> {
        analysis
            .experiments
            .iter()
            .filter_map(|id| self.experiments.get(id))
            .map(|&i| &self.catalog.experiments[i])
            .collect()
    }

    pub fn species(&self, id: &Id) -> Option<&Species> {
        self.species.get(id).map(|&i| &self.catalog.species[i])
    }

    pub fn omics_unit_type(&self, id: &Id) -> Option<&OmicsUnitType> {
        self.omics_unit_types
            .get(id)
            .map(|&i| &self.catalog.omics_unit_types[i])
    }

    pub fn omics_area(&self, id: &Id) -> Option<&OmicsArea> {
        self.omics_areas.get(id).map(|&i| &self.catalog.omics_areas[i])
    }

    pub fn tag(&self, id: &Id) -> Option<&Tag> {
        self.tags.get(id).map(|&i| &self.catalog.tags[i])
    }

    pub fn pixeler(&self, id: &Id) -> Option<&Pixeler> {
        self.pixelers.get(id).map(|&i| &self.catalog.pixelers[i])
    }

    pub fn omics_unit(&self, reference: &str) -> Option<&OmicsUnit> {
        self.omics_units
            .get(reference)
            .map(|&i| &self.catalog.omics_units[i])
    }

    /// Merged analysis + experiment tags of a Pixel Set.
    pub fn tags_of(&self, ps: &PixelSet) -> Vec<&Tag> {
        let Some(analysis) = self.analysis_of(ps) else {
            return Vec::new();
        };
        let experiments = self.experiments_of(analysis);
        merge_tag_ids(
            &analysis.tags,
            experiments.iter().map(|e| e.tags.as_slice()),
        )
        .iter()
        .filter_map(|id| self.tag(id))
        .collect()
    }

    /// Omics areas of the experiments behind a Pixel Set.
    pub fn omics_area_ids_of(&self, ps: &PixelSet) -> Vec<Id> {
        let Some(analysis) = self.analysis_of(ps) else {
            return Vec::new();
        };
        let mut ids = Vec::new();
        for exp in self.experiments_of(analysis) {
            if !ids.contains(&exp.omics_area) {
                ids.push(exp.omics_area);
            }
        }
        ids
    }

    /// `id` and every area below it.
    pub fn omics_area_descendants(&self, id: &Id) -> BTreeSet<Id> {
        let mut out = BTreeSet::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            if !out.insert(current) {
                continue;
            }
            if let Some(children) = self.area_children.get(&current) {
                stack.extend(children.iter().copied());
            }
        }
        out
    }

    fn area_depth(&self, area: &OmicsArea) -> usize {
        let mut depth = 0;
        let mut parent = area.parent;
        while let Some(id) = parent {
            depth += 1;
            if depth > self.catalog.omics_areas.len() {
                break; // cycle guard
            }
            parent = self.omics_area(&id).and_then(|a| a.parent);
        }
        depth
    }

    /// Options the filter form may choose from, sorted by label.
    pub fn filter_options(&self) -> FilterOptions {
        let sorted = |mut choices: Vec<Choice>| {
            choices.sort_by(|a, b| a.label.cmp(&b.label));
            choices
        };
        FilterOptions {
            species: sorted(
                self.catalog
                    .species
                    .iter()
                    .map(|s| Choice { id: s.id, label: s.name.clone(), depth: 0 })
                    .collect(),
            ),
            omics_unit_types: sorted(
                self.catalog
                    .omics_unit_types
                    .iter()
                    .map(|t| Choice { id: t.id, label: t.name.clone(), depth: 0 })
                    .collect(),
            ),
            omics_areas: sorted(
                self.catalog
                    .omics_areas
                    .iter()
                    .map(|a| Choice {
                        id: a.id,
                        label: a.name.clone(),
                        depth: self.area_depth(a),
                    })
                    .collect(),
            ),
            tags: sorted(
                self.catalog
                    .tags
                    .iter()
                    .map(|t| Choice {
                        id: t.id,
                        label: t.name.clone(),
                        depth: t.name.matches('/').count(),
                    })
                    .collect(),
            ),
        }
    }

    /// Pixel Sets passing `filter` (everything when `None`), in store order.
    pub fn select(&self, filter: Option<&FilterSpec>) -> Vec<&PixelSet> {
        match filter {
            Some(spec) => filtered_indices(self, spec)
                .into_iter()
                .map(|i| &self.catalog.pixel_sets[i])
                .collect(),
            None => self.catalog.pixel_sets.iter().collect(),
        }
    }

    /// Filter then paginate. `page` is 1-based and clamped into range.
    pub fn query(
        &self,
        filter: Option<&FilterSpec>,
        page: usize,
        page_size: usize,
    ) -> PixelSetPage<'_> {
        let matching = self.select(filter);
        let page_size = page_size.max(1);
        let num_pages = matching.len().div_ceil(page_size).max(1);
        let page = page.clamp(1, num_pages);
        let items = matching
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .copied()
            .collect();
        PixelSetPage {
            items,
            total: self.len(),
            matched: matching.len(),
            page,
            num_pages,
        }
    }

    pub fn ensure_available(&self, ps: &PixelSet) -> Result<(), StoreError> {
        self.source.ensure_available(ps)
    }

    pub fn read_pixels(&self, ps: &PixelSet) -> Result<Vec<Pixel>, StoreError> {
        self.source.read_pixels(ps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::matches;
    use crate::data::sample::CatalogBuilder;

    fn yeast_and_others(matching: usize, others: usize) -> (CatalogStore, Id) {
        let mut b = CatalogBuilder::new();
        for i in 0..matching + others {
            // interleave so order checks mean something
            if i % 3 == 2 && i / 3 < others {
                b.pixel_set("Candida glabrata");
            } else {
                b.pixel_set("Saccharomyces cerevisiae");
            }
        }
        let yeast = b.species("Saccharomyces cerevisiae");
        (CatalogStore::in_memory(b.finish()).unwrap(), yeast)
    }

    #[test]
    fn query_reports_total_matched_displayed() {
        let (store, yeast) = yeast_and_others(10, 5);
        let mut spec = FilterSpec::default();
        spec.species.insert(yeast);

        let page = store.query(Some(&spec), 1, 10);
        assert_eq!(page.total, 15);
        assert_eq!(page.matched, 10);
        assert_eq!(page.displayed(), 10);
        assert!(page.items.iter().all(|ps| matches(&store, ps, &spec)));
    }

    #[test]
    fn query_paginates_and_clamps() {
        let mut b = CatalogBuilder::new();
        for _ in 0..12 {
            b.pixel_set("Saccharomyces cerevisiae");
        }
        let store = CatalogStore::in_memory(b.finish()).unwrap();

        let first = store.query(None, 1, 10);
        assert_eq!(first.displayed(), 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let beyond = store.query(None, 9, 10);
        assert_eq!(beyond.page, 2);
        assert_eq!(beyond.displayed(), 2);
        assert_eq!(beyond.items[0].id, store.pixel_sets()[10].id);
        assert!(beyond.displayed() <= beyond.matched && beyond.matched <= beyond.total);
    }

    #[test]
    fn empty_store_has_one_empty_page() {
        let store = CatalogStore::in_memory(Catalog::default()).unwrap();
        let page = store.query(None, 1, 10);
        assert_eq!((page.total, page.matched, page.displayed()), (0, 0, 0));
        assert_eq!(page.num_pages, 1);
    }

    #[test]
    fn tags_of_merges_analysis_and_experiment_tags() {
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        let shared = b.tag("candida");
        let own = b.tag("msms/time");
        b.tag_analysis(ps, shared);
        b.tag_experiment(ps, shared);
        b.tag_experiment(ps, own);
        let store = CatalogStore::in_memory(b.finish()).unwrap();

        let set = store.pixel_set(&ps).unwrap();
        let names: Vec<&str> = store.tags_of(set).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["candida", "msms/time"]);
    }

    #[test]
    fn area_descendants_walk_the_tree() {
        let mut b = CatalogBuilder::new();
        let root = b.omics_area("omics", None);
        let mid = b.omics_area("transcriptomics", Some(root));
        let leaf = b.omics_area("rna-seq", Some(mid));
        let store = CatalogStore::in_memory(b.finish()).unwrap();

        let below_root = store.omics_area_descendants(&root);
        assert!(below_root.contains(&mid) && below_root.contains(&leaf));
        assert_eq!(store.omics_area_descendants(&leaf).len(), 1);

        let options = store.filter_options();
        let leaf_choice = options.omics_areas.iter().find(|c| c.id == leaf).unwrap();
        assert_eq!(leaf_choice.depth, 2);
    }

    #[test]
    fn missing_pixel_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        let store = CatalogStore::open(b.finish(), dir.path()).unwrap();

        let set = store.pixel_set(&ps).unwrap();
        let err = store.read_pixels(set).unwrap_err();
        assert!(matches!(err, StoreError::MissingPixelFile { .. }));
    }

    #[test]
    fn dangling_catalog_is_rejected() {
        let mut b = CatalogBuilder::new();
        b.pixel_set("Saccharomyces cerevisiae");
        let mut catalog = b.finish();
        catalog.analyses.clear();
        assert!(matches!(
            CatalogStore::in_memory(catalog),
            Err(StoreError::Integrity(_))
        ));
    }
}
