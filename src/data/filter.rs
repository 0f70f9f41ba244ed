use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::model::{Id, PixelSet};
use super::store::CatalogStore;
use super::tags::is_same_or_descendant;

// ---------------------------------------------------------------------------
// Filter specification: what the user asked for
// ---------------------------------------------------------------------------

/// Validated Pixel Set filter.
///
/// Fields are ANDed together; ids inside one field are ORed. An empty field
/// is no constraint, so `FilterSpec::default()` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub species: BTreeSet<Id>,
    #[serde(default)]
    pub omics_unit_types: BTreeSet<Id>,
    #[serde(default)]
    pub omics_areas: BTreeSet<Id>,
    #[serde(default)]
    pub tags: BTreeSet<Id>,
    /// Whitespace-separated keywords, already trimmed.
    #[serde(default)]
    pub search: Option<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
            && self.omics_unit_types.is_empty()
            && self.omics_areas.is_empty()
            && self.tags.is_empty()
            && self.search.is_none()
    }

    /// Id set of a choice field by form name.
    pub fn ids(&self, field: &str) -> Option<&BTreeSet<Id>> {
        match field {
            "species" => Some(&self.species),
            "omics_unit_types" => Some(&self.omics_unit_types),
            "omics_areas" => Some(&self.omics_areas),
            "tags" => Some(&self.tags),
            _ => None,
        }
    }

    pub fn ids_mut(&mut self, field: &str) -> Option<&mut BTreeSet<Id>> {
        match field {
            "species" => Some(&mut self.species),
            "omics_unit_types" => Some(&mut self.omics_unit_types),
            "omics_areas" => Some(&mut self.omics_areas),
            "tags" => Some(&mut self.tags),
            _ => None,
        }
    }

    /// Lowercased search keywords.
    pub fn keywords(&self) -> Vec<String> {
        self.search
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

/// What gets stored in a selection context: a Pixel Set filter plus an
/// optional restriction on the omics units whose pixels are shown/exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerms {
    #[serde(default)]
    pub filter: FilterSpec,
    /// Omics unit references; empty means every pixel.
    #[serde(default)]
    pub omics_units: Vec<String>,
}

impl SearchTerms {
    pub fn omics_units(omics_units: Vec<String>) -> Self {
        Self {
            filter: FilterSpec::default(),
            omics_units,
        }
    }

    /// Pixel-level restriction, `None` when every pixel is wanted.
    pub fn omics_unit_set(&self) -> Option<HashSet<String>> {
        if self.omics_units.is_empty() {
            None
        } else {
            Some(self.omics_units.iter().cloned().collect())
        }
    }
}

// ---------------------------------------------------------------------------
// Options the form may choose from
// ---------------------------------------------------------------------------

/// One selectable value of a filter field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: Id,
    pub label: String,
    /// Tree depth for omics areas and tags, 0 otherwise.
    pub depth: usize,
}

/// The enumerated option set the filter form validates against.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub species: Vec<Choice>,
    pub omics_unit_types: Vec<Choice>,
    pub omics_areas: Vec<Choice>,
    pub tags: Vec<Choice>,
}

impl FilterOptions {
    pub fn field(&self, name: &str) -> &[Choice] {
        match name {
            "species" => &self.species,
            "omics_unit_types" => &self.omics_unit_types,
            "omics_areas" => &self.omics_areas,
            "tags" => &self.tags,
            _ => &[],
        }
    }

    pub fn contains(&self, field: &str, id: &Id) -> bool {
        self.field(field).iter().any(|c| &c.id == id)
    }
}

// ---------------------------------------------------------------------------
// Predicate evaluation
// ---------------------------------------------------------------------------

/// A [`FilterSpec`] with ids resolved to the names stored on Pixel Sets and
/// tree fields expanded to their descendants.
struct ResolvedFilter {
    species: Option<HashSet<String>>,
    omics_unit_types: Option<HashSet<String>>,
    omics_areas: Option<BTreeSet<Id>>,
    tag_names: Option<Vec<String>>,
    keywords: Vec<String>,
}

impl ResolvedFilter {
    fn resolve(store: &CatalogStore, spec: &FilterSpec) -> Self {
        let non_empty = |set: &BTreeSet<Id>| !set.is_empty();

        let species = non_empty(&spec.species).then(|| {
            spec.species
                .iter()
                .filter_map(|id| store.species(id))
                .map(|s| s.name.clone())
                .collect()
        });
        let omics_unit_types = non_empty(&spec.omics_unit_types).then(|| {
            spec.omics_unit_types
                .iter()
                .filter_map(|id| store.omics_unit_type(id))
                .map(|t| t.name.clone())
                .collect()
        });
        let omics_areas = non_empty(&spec.omics_areas).then(|| {
            spec.omics_areas
                .iter()
                .flat_map(|id| store.omics_area_descendants(id))
                .collect()
        });
        let tag_names = non_empty(&spec.tags).then(|| {
            spec.tags
                .iter()
                .filter_map(|id| store.tag(id))
                .map(|t| t.name.clone())
                .collect()
        });

        ResolvedFilter {
            species,
            omics_unit_types,
            omics_areas,
            tag_names,
            keywords: spec.keywords(),
        }
    }

    fn matches(&self, store: &CatalogStore, ps: &PixelSet) -> bool {
        if let Some(wanted) = &self.species {
            if !ps.cached_species.iter().any(|s| wanted.contains(s)) {
                return false;
            }
        }
        if let Some(wanted) = &self.omics_unit_types {
            if !ps.cached_omics_unit_types.iter().any(|t| wanted.contains(t)) {
                return false;
            }
        }
        if let Some(wanted) = &self.omics_areas {
            if !store.omics_area_ids_of(ps).iter().any(|a| wanted.contains(a)) {
                return false;
            }
        }
        if let Some(wanted) = &self.tag_names {
            let tags = store.tags_of(ps);
            let hit = tags.iter().any(|tag| {
                wanted
                    .iter()
                    .any(|ancestor| is_same_or_descendant(&tag.name, ancestor))
            });
            if !hit {
                return false;
            }
        }
        if !self.keywords.is_empty() && !self.matches_keywords(store, ps) {
            return false;
        }
        true
    }

    /// Every keyword must appear in a description or name an omics unit of
    /// the set.
    fn matches_keywords(&self, store: &CatalogStore, ps: &PixelSet) -> bool {
        let mut haystacks = vec![ps.description.to_lowercase()];
        if let Some(analysis) = store.analysis_of(ps) {
            haystacks.push(analysis.description.to_lowercase());
            for exp in store.experiments_of(analysis) {
                haystacks.push(exp.description.to_lowercase());
            }
        }
        self.keywords.iter().all(|kw| {
            haystacks.iter().any(|h| h.contains(kw.as_str()))
                || ps
                    .cached_omics_units
                    .iter()
                    .any(|unit| unit.to_lowercase() == *kw)
        })
    }
}

/// Whether a single Pixel Set passes `spec`.
pub fn matches(store: &CatalogStore, ps: &PixelSet, spec: &FilterSpec) -> bool {
    ResolvedFilter::resolve(store, spec).matches(store, ps)
}

/// Return indices (store insertion order) of Pixel Sets passing `spec`.
pub fn filtered_indices(store: &CatalogStore, spec: &FilterSpec) -> Vec<usize> {
    let resolved = ResolvedFilter::resolve(store, spec);
    store
        .pixel_sets()
        .iter()
        .enumerate()
        .filter(|(_, ps)| resolved.matches(store, ps))
        .map(|(i, _)| i)
        .collect()
}
