//! Typed view models, one per page. Rendering consumes only these structs.

use std::collections::HashSet;

use crate::data::filter::{Choice, FilterOptions, SearchTerms};
use crate::data::model::{Pixel, PixelSet, short_id};
use crate::data::store::{CatalogStore, PixelSetPage};
use crate::state::Message;

use super::form::{FilterForm, FormErrors, CHOICE_FIELDS};

// ---------------------------------------------------------------------------
// Filter form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub depth: usize,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub options: Vec<OptionView>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormView {
    pub fields: Vec<FieldView>,
    pub search: String,
    pub omics_units: String,
    pub non_field_errors: Vec<String>,
}

fn field_label(name: &str) -> &'static str {
    match name {
        "species" => "Species",
        "omics_unit_types" => "Omics unit types",
        "omics_areas" => "Omics areas",
        "tags" => "Tags",
        _ => "",
    }
}

impl FormView {
    /// The form as the stored terms describe it (blank without terms).
    pub fn from_terms(options: &FilterOptions, terms: Option<&SearchTerms>) -> Self {
        let selected = |field: &str| -> HashSet<String> {
            terms
                .and_then(|t| t.filter.ids(field))
                .map(|ids| ids.iter().map(|id| id.to_string()).collect())
                .unwrap_or_default()
        };
        Self::build(
            options,
            selected,
            terms
                .and_then(|t| t.filter.search.clone())
                .unwrap_or_default(),
            terms.map(|t| t.omics_units.join(", ")).unwrap_or_default(),
            FormErrors::default(),
        )
    }

    /// The form echoing a rejected submission, with its errors.
    pub fn from_submission(options: &FilterOptions, form: &FilterForm, errors: FormErrors) -> Self {
        let selected =
            |field: &str| -> HashSet<String> { form.values(field).map(str::to_string).collect() };
        Self::build(
            options,
            selected,
            form.search().unwrap_or_default(),
            form.omics_units_text(),
            errors,
        )
    }

    fn build(
        options: &FilterOptions,
        selected: impl Fn(&str) -> HashSet<String>,
        search: String,
        omics_units: String,
        mut errors: FormErrors,
    ) -> Self {
        let fields = CHOICE_FIELDS
            .iter()
            .map(|&name| {
                let chosen = selected(name);
                FieldView {
                    name,
                    label: field_label(name),
                    options: options
                        .field(name)
                        .iter()
                        .map(|c: &Choice| {
                            let value = c.id.to_string();
                            OptionView {
                                selected: chosen.contains(&value),
                                value,
                                label: c.label.clone(),
                                depth: c.depth,
                            }
                        })
                        .collect(),
                    errors: errors.fields.remove(name).unwrap_or_default(),
                }
            })
            .collect();
        Self {
            fields,
            search,
            omics_units,
            non_field_errors: errors.non_field,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.non_field_errors.is_empty() || self.fields.iter().any(|f| !f.errors.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Pixel Set rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentView {
    pub description: String,
    pub omics_area: String,
    pub completed_at: String,
    pub released_at: String,
}

/// One Pixel Set as shown in the list and at the top of its detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSetRow {
    pub id: String,
    pub short_id: String,
    pub filename: String,
    pub description: String,
    pub species: Vec<String>,
    pub omics_unit_types: Vec<String>,
    pub omics_areas: Vec<String>,
    pub tags: Vec<String>,
    pub pixeler: String,
    pub analysis_description: String,
    pub analysis_completed_at: String,
    pub experiments: Vec<ExperimentView>,
}

impl PixelSetRow {
    pub fn build(store: &CatalogStore, ps: &PixelSet) -> Self {
        let analysis = store.analysis_of(ps);
        let experiments = analysis
            .map(|a| store.experiments_of(a))
            .unwrap_or_default()
            .into_iter()
            .map(|e| ExperimentView {
                description: e.description.clone(),
                omics_area: store
                    .omics_area(&e.omics_area)
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                completed_at: e.completed_at.to_string(),
                released_at: e.released_at.to_string(),
            })
            .collect();

        Self {
            id: ps.id.to_string(),
            short_id: short_id(&ps.id),
            filename: ps.filename(),
            description: ps.description.clone(),
            species: ps.cached_species.clone(),
            omics_unit_types: ps.cached_omics_unit_types.clone(),
            omics_areas: ps.cached_omics_areas.clone(),
            tags: store.tags_of(ps).iter().map(|t| t.name.clone()).collect(),
            pixeler: analysis
                .and_then(|a| store.pixeler(&a.pixeler))
                .map(|p| p.username.clone())
                .unwrap_or_default(),
            analysis_description: analysis.map(|a| a.description.clone()).unwrap_or_default(),
            analysis_completed_at: analysis
                .map(|a| a.completed_at.to_string())
                .unwrap_or_default(),
            experiments,
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ListPage {
    pub form: FormView,
    pub rows: Vec<PixelSetRow>,
    pub total: usize,
    pub matched: usize,
    pub displayed: usize,
    pub page: usize,
    pub num_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
    /// Stored selection terms exist and can be cleared.
    pub has_selection: bool,
    pub messages: Vec<Message>,
}

impl ListPage {
    pub fn build(
        store: &CatalogStore,
        page: &PixelSetPage<'_>,
        form: FormView,
        has_selection: bool,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            form,
            rows: page
                .items
                .iter()
                .map(|ps| PixelSetRow::build(store, ps))
                .collect(),
            total: page.total,
            matched: page.matched,
            displayed: page.displayed(),
            page: page.page,
            num_pages: page.num_pages,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            has_selection,
            messages,
        }
    }

    pub fn show_export(&self) -> bool {
        self.matched > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelRow {
    pub omics_unit: String,
    pub description: String,
    pub value: f64,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DetailPage {
    pub pixel_set: PixelSetRow,
    /// At most `preview_limit` rows.
    pub pixels: Vec<PixelRow>,
    /// Pixels passing the omics unit restriction.
    pub pixel_count: usize,
    pub preview_limit: usize,
    pub omics_units: String,
    /// An omics unit restriction is stored for this Pixel Set.
    pub subset: bool,
    pub errors: FormErrors,
    pub messages: Vec<Message>,
}

impl DetailPage {
    pub fn build(
        store: &CatalogStore,
        ps: &PixelSet,
        pixels: &[Pixel],
        terms: Option<&SearchTerms>,
        preview_limit: usize,
        errors: FormErrors,
        messages: Vec<Message>,
    ) -> Self {
        let wanted = terms.and_then(SearchTerms::omics_unit_set);
        let matching: Vec<&Pixel> = pixels
            .iter()
            .filter(|p| wanted.as_ref().map_or(true, |w| w.contains(&p.omics_unit)))
            .collect();

        Self {
            pixel_set: PixelSetRow::build(store, ps),
            pixels: matching
                .iter()
                .take(preview_limit)
                .map(|p| PixelRow {
                    omics_unit: p.omics_unit.clone(),
                    description: store
                        .omics_unit(&p.omics_unit)
                        .map(|u| u.description.clone())
                        .unwrap_or_default(),
                    value: p.value,
                    quality_score: p.quality_score,
                })
                .collect(),
            pixel_count: matching.len(),
            preview_limit,
            omics_units: terms.map(|t| t.omics_units.join(", ")).unwrap_or_default(),
            subset: wanted.is_some(),
            errors,
            messages,
        }
    }

    /// Echo a rejected submission in the omics units field.
    pub fn with_submitted_omics_units(mut self, text: String) -> Self {
        self.omics_units = text;
        self
    }

    /// A stored restriction that keeps at least one pixel.
    pub fn show_subset_export(&self) -> bool {
        self.subset && self.pixel_count > 0
    }
}

/// Body of a 4xx/5xx HTML response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub status: u16,
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::CatalogBuilder;

    #[test]
    fn form_from_terms_marks_selected_options() {
        let mut b = CatalogBuilder::new();
        b.pixel_set("Saccharomyces cerevisiae");
        b.pixel_set("Candida glabrata");
        let yeast = b.species("Saccharomyces cerevisiae");
        let store = CatalogStore::in_memory(b.finish()).unwrap();

        let mut terms = SearchTerms::omics_units(vec!["YAL001C".into(), "YKL001C".into()]);
        terms.filter.species.insert(yeast);
        let form = FormView::from_terms(&store.filter_options(), Some(&terms));

        let species = &form.fields[0];
        assert_eq!(species.name, "species");
        let selected: Vec<&str> = species
            .options
            .iter()
            .filter(|o| o.selected)
            .map(|o| o.label.as_str())
            .collect();
        assert_eq!(selected, vec!["Saccharomyces cerevisiae"]);
        assert_eq!(form.omics_units, "YAL001C, YKL001C");
        assert!(!form.has_errors());
    }

    #[test]
    fn detail_preview_honours_subset_and_limit() {
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        let rows: Vec<(String, f64)> = (0..5).map(|i| (format!("YAL00{i}C"), i as f64)).collect();
        let rows: Vec<(&str, f64, Option<f64>)> =
            rows.iter().map(|(r, v)| (r.as_str(), *v, None)).collect();
        b.add_pixels(ps, &rows);
        let pixels = b.pixels(ps).to_vec();
        let store = CatalogStore::in_memory(b.finish()).unwrap();
        let set = store.pixel_set(&ps).unwrap();

        let all = DetailPage::build(&store, set, &pixels, None, 3, FormErrors::default(), vec![]);
        assert_eq!(all.pixels.len(), 3);
        assert_eq!(all.pixel_count, 5);
        assert!(!all.show_subset_export());

        let terms = SearchTerms::omics_units(vec!["YAL004C".into(), "UNKNOWN".into()]);
        let subset =
            DetailPage::build(&store, set, &pixels, Some(&terms), 3, FormErrors::default(), vec![]);
        assert_eq!(subset.pixels.len(), 1);
        assert_eq!(subset.pixels[0].description, "Gene YAL004C");
        assert!(subset.show_subset_export());

        let unknown = SearchTerms::omics_units(vec!["invalid".into()]);
        let empty =
            DetailPage::build(&store, set, &pixels, Some(&unknown), 3, FormErrors::default(), vec![]);
        assert!(empty.subset);
        assert!(empty.pixels.is_empty());
        assert!(!empty.show_subset_export());
    }

    #[test]
    fn rejected_detail_submission_is_echoed() {
        let mut b = CatalogBuilder::new();
        let ps = b.pixel_set("Saccharomyces cerevisiae");
        let store = CatalogStore::in_memory(b.finish()).unwrap();
        let set = store.pixel_set(&ps).unwrap();
        let stored = SearchTerms::omics_units(vec!["YAL001C".into()]);

        let page = DetailPage::build(&store, set, &[], Some(&stored), 3, FormErrors::default(), vec![])
            .with_submitted_omics_units("U1\nU2".into());
        assert_eq!(page.omics_units, "U1\nU2");
        assert!(page.subset);
    }
}
