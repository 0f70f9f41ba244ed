use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every catalog record is keyed by a UUID.
pub type Id = Uuid;

/// First 8 hex characters of a UUID, as shown in tables and export headers.
pub fn short_id(id: &Id) -> String {
    id.simple().to_string()[..8].to_string()
}

// ---------------------------------------------------------------------------
// Reference records
// ---------------------------------------------------------------------------

/// Canonical species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Omics unit type: promoter, gene, mRNA, protein, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmicsUnitType {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A biological entity referenced by pixel rows (usually a gene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmicsUnit {
    pub id: Id,
    /// Public identifier used inside pixel files, e.g. `YAL001C`.
    pub reference: String,
    #[serde(default)]
    pub description: String,
    pub species: Id,
    #[serde(rename = "type")]
    pub type_id: Id,
}

/// Omics areas form a tree through `parent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmicsArea {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent: Option<Id>,
}

/// Lowercase, `/`-separated hierarchical tag (`candida/glabrata`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixeler {
    pub id: Id,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Experiments, analyses, pixel sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Id,
    #[serde(default)]
    pub description: String,
    pub omics_area: Id,
    #[serde(default)]
    pub tags: Vec<Id>,
    pub completed_at: NaiveDate,
    pub released_at: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Id,
    #[serde(default)]
    pub description: String,
    pub pixeler: Id,
    #[serde(default)]
    pub experiments: Vec<Id>,
    #[serde(default)]
    pub tags: Vec<Id>,
    pub completed_at: NaiveDate,
}

/// A file of measured pixels produced by one analysis.
///
/// The `cached_*` lists are derived from the pixel file and the analysis;
/// they are recomputed by `reindex` rather than on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelSet {
    pub id: Id,
    /// Path relative to the data directory.
    pub pixels_file: PathBuf,
    #[serde(default)]
    pub description: String,
    pub analysis: Id,
    #[serde(default)]
    pub cached_species: Vec<String>,
    #[serde(default)]
    pub cached_omics_unit_types: Vec<String>,
    #[serde(default)]
    pub cached_omics_areas: Vec<String>,
    #[serde(default)]
    pub cached_omics_units: Vec<String>,
}

impl PixelSet {
    /// File name component of `pixels_file`, used as the row label.
    pub fn filename(&self) -> String {
        self.pixels_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.pixels_file.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Pixel – one row of a pixel file
// ---------------------------------------------------------------------------

/// The smallest measurement unit: one value for one omics unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    /// Omics unit reference identifier.
    #[serde(alias = "Omics Unit")]
    pub omics_unit: String,
    #[serde(alias = "Value")]
    pub value: f64,
    /// p-value, confidence index, ... when the producer supplied one.
    #[serde(default, alias = "QS")]
    pub quality_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Catalog – the complete persisted record set
// ---------------------------------------------------------------------------

/// Everything the explorer knows about, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub species: Vec<Species>,
    #[serde(default)]
    pub omics_unit_types: Vec<OmicsUnitType>,
    #[serde(default)]
    pub omics_units: Vec<OmicsUnit>,
    #[serde(default)]
    pub omics_areas: Vec<OmicsArea>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub pixelers: Vec<Pixeler>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub analyses: Vec<Analysis>,
    /// Insertion order of this list is the default listing order.
    #[serde(default)]
    pub pixel_sets: Vec<PixelSet>,
}

/// A catalog record referencing something that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub from: String,
    pub kind: &'static str,
    pub id: Id,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} references unknown {} {}", self.from, self.kind, self.id)
    }
}

impl Catalog {
    /// Number of pixel sets.
    pub fn len(&self) -> usize {
        self.pixel_sets.len()
    }

    /// Whether the catalog holds no pixel set.
    pub fn is_empty(&self) -> bool {
        self.pixel_sets.is_empty()
    }

    /// Check every cross-record reference, returning the first broken one.
    pub fn check_references(&self) -> Result<(), DanglingReference> {
        let species = id_set(self.species.iter().map(|s| s.id));
        let types = id_set(self.omics_unit_types.iter().map(|t| t.id));
        let areas = id_set(self.omics_areas.iter().map(|a| a.id));
        let tags = id_set(self.tags.iter().map(|t| t.id));
        let pixelers = id_set(self.pixelers.iter().map(|p| p.id));
        let experiments = id_set(self.experiments.iter().map(|e| e.id));
        let analyses = id_set(self.analyses.iter().map(|a| a.id));

        let check = |set: &BTreeSet<Id>, from: String, kind: &'static str, id: Id| {
            if set.contains(&id) {
                Ok(())
            } else {
                Err(DanglingReference { from, kind, id })
            }
        };

        for unit in &self.omics_units {
            let from = format!("omics unit {}", unit.reference);
            check(&species, from.clone(), "species", unit.species)?;
            check(&types, from, "omics unit type", unit.type_id)?;
        }
        for area in &self.omics_areas {
            if let Some(parent) = area.parent {
                check(&areas, format!("omics area {}", area.name), "omics area", parent)?;
            }
        }
        for exp in &self.experiments {
            let from = format!("experiment {}", exp.id);
            check(&areas, from.clone(), "omics area", exp.omics_area)?;
            for tag in &exp.tags {
                check(&tags, from.clone(), "tag", *tag)?;
            }
        }
        for analysis in &self.analyses {
            let from = format!("analysis {}", analysis.id);
            check(&pixelers, from.clone(), "pixeler", analysis.pixeler)?;
            for exp in &analysis.experiments {
                check(&experiments, from.clone(), "experiment", *exp)?;
            }
            for tag in &analysis.tags {
                check(&tags, from.clone(), "tag", *tag)?;
            }
        }
        for ps in &self.pixel_sets {
            check(&analyses, format!("pixel set {}", ps.id), "analysis", ps.analysis)?;
        }
        Ok(())
    }

    /// Omics unit lookup by reference identifier.
    pub fn omics_units_by_reference(&self) -> BTreeMap<&str, &OmicsUnit> {
        self.omics_units
            .iter()
            .map(|u| (u.reference.as_str(), u))
            .collect()
    }
}

fn id_set(ids: impl Iterator<Item = Id>) -> BTreeSet<Id> {
    ids.collect()
}
