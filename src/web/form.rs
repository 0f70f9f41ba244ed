use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::data::filter::{FilterOptions, FilterSpec, SearchTerms};

/// Upper bound on omics unit references accepted by one submission.
pub const MAX_OMICS_UNITS: usize = 1000;

/// Multi-valued choice fields, in display order.
pub const CHOICE_FIELDS: [&str; 4] = ["species", "omics_unit_types", "omics_areas", "tags"];

const SEARCH: &str = "search";
const OMICS_UNITS: &str = "omics_units";
const PAGE: &str = "page";

/// Validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn add(&mut self, field: &str, message: String) {
        self.fields.entry(field.to_string()).or_default().push(message);
    }
}

/// Raw filter parameters from a query string or urlencoded body.
#[derive(Debug, Clone, Default)]
pub struct FilterForm {
    pairs: Vec<(String, String)>,
}

impl FilterForm {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Parse `application/x-www-form-urlencoded` data, keeping repeated keys.
    pub fn parse(encoded: &str) -> Self {
        Self::new(
            form_urlencoded::parse(encoded.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Whether any filter field was sent; a lone `page` is navigation.
    pub fn is_submission(&self) -> bool {
        CHOICE_FIELDS
            .iter()
            .chain([SEARCH, OMICS_UNITS].iter())
            .any(|key| self.has(key))
    }

    /// Requested page, 1 when absent or unparseable.
    pub fn page(&self) -> usize {
        self.values(PAGE)
            .next()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|&p| p > 0)
            .unwrap_or(1)
    }

    pub fn search(&self) -> Option<String> {
        self.values(SEARCH)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Raw text of the omics unit field(s), as typed.
    pub fn omics_units_text(&self) -> String {
        self.values(OMICS_UNITS).collect::<Vec<_>>().join("\n")
    }

    /// Validate the whole filter against the enumerated `options`.
    pub fn validate(&self, options: &FilterOptions) -> Result<SearchTerms, FormErrors> {
        let mut errors = FormErrors::default();
        let mut filter = FilterSpec::default();

        for field in CHOICE_FIELDS {
            for raw in self.values(field).map(str::trim).filter(|v| !v.is_empty()) {
                match Uuid::parse_str(raw) {
                    Err(_) => errors.add(field, format!("'{raw}' is not a valid UUID.")),
                    Ok(id) if !options.contains(field, &id) => errors.add(
                        field,
                        format!("Select a valid choice. {raw} is not one of the available choices."),
                    ),
                    Ok(id) => {
                        if let Some(set) = filter.ids_mut(field) {
                            set.insert(id);
                        }
                    }
                }
            }
        }
        filter.search = self.search();

        let omics_units = match self.omics_units() {
            Ok(units) => units,
            Err(e) => {
                errors.non_field.extend(e.non_field);
                Vec::new()
            }
        };

        if errors.is_empty() {
            Ok(SearchTerms {
                filter,
                omics_units,
            })
        } else {
            Err(errors)
        }
    }

    /// Validate only the omics unit field.
    ///
    /// Stops at the first reference past `MAX_OMICS_UNITS`.
    pub fn omics_units(&self) -> Result<Vec<String>, FormErrors> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();
        // references split on commas and whitespace; blanks and repeats drop out
        for unit in self.values(OMICS_UNITS).flat_map(split_references) {
            if !seen.insert(unit) {
                continue;
            }
            if units.len() == MAX_OMICS_UNITS {
                let mut errors = FormErrors::default();
                errors.non_field.push(format!(
                    "Too many omics units (at most {MAX_OMICS_UNITS} are allowed)."
                ));
                return Err(errors);
            }
            units.push(unit.to_string());
        }
        Ok(units)
    }
}

fn split_references(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::Choice;

    fn options() -> (FilterOptions, Uuid, Uuid) {
        let yeast = Uuid::new_v4();
        let tag = Uuid::new_v4();
        let options = FilterOptions {
            species: vec![Choice {
                id: yeast,
                label: "Saccharomyces cerevisiae".into(),
                depth: 0,
            }],
            tags: vec![Choice {
                id: tag,
                label: "candida".into(),
                depth: 0,
            }],
            ..FilterOptions::default()
        };
        (options, yeast, tag)
    }

    #[test]
    fn valid_submission_is_normalized() {
        let (options, yeast, tag) = options();
        let form = FilterForm::parse(&format!(
            "species={yeast}&species={yeast}&tags={tag}&search=++qapla++&omics_units=YAL001C%2C+YKL001C"
        ));
        assert!(form.is_submission());

        let terms = form.validate(&options).unwrap();
        assert_eq!(terms.filter.species.len(), 1);
        assert!(terms.filter.tags.contains(&tag));
        assert_eq!(terms.filter.search.as_deref(), Some("qapla"));
        assert_eq!(terms.omics_units, vec!["YAL001C", "YKL001C"]);
    }

    #[test]
    fn malformed_uuid_is_a_field_error() {
        let (options, _, _) = options();
        let errors = FilterForm::parse("species=fakeid")
            .validate(&options)
            .unwrap_err();
        assert_eq!(errors.field("species"), ["'fakeid' is not a valid UUID."]);
    }

    #[test]
    fn unknown_choice_is_a_field_error() {
        let (options, _, _) = options();
        let stranger = Uuid::new_v4();
        let errors = FilterForm::parse(&format!("tags={stranger}"))
            .validate(&options)
            .unwrap_err();
        assert_eq!(
            errors.field("tags"),
            [format!(
                "Select a valid choice. {stranger} is not one of the available choices."
            )]
        );
    }

    #[test]
    fn too_many_omics_units_is_a_non_field_error() {
        let (options, _, _) = options();
        let units: Vec<String> = (0..=MAX_OMICS_UNITS).map(|i| format!("U{i}")).collect();
        let form = FilterForm::new(vec![("omics_units".into(), units.join(","))]);
        let errors = form.validate(&options).unwrap_err();
        assert_eq!(errors.non_field.len(), 1);
        assert!(errors.fields.is_empty());
    }

    #[test]
    fn page_alone_is_not_a_submission() {
        let form = FilterForm::parse("page=2");
        assert!(!form.is_submission());
        assert_eq!(form.page(), 2);
        assert_eq!(FilterForm::parse("page=zero").page(), 1);
        assert_eq!(FilterForm::parse("page=0").page(), 1);
    }

    #[test]
    fn empty_values_are_ignored() {
        let (options, _, _) = options();
        let terms = FilterForm::parse("species=&search=&omics_units=")
            .validate(&options)
            .unwrap();
        assert_eq!(terms, SearchTerms::default());
    }

    #[test]
    fn omics_units_split_on_commas_and_whitespace() {
        let form = FilterForm::new(vec![
            ("omics_units".into(), "YAL001C, YAL002W\nYKL001C\tYAL001C,,".into()),
            ("omics_units".into(), "YAL002W YBR001C".into()),
        ]);
        assert_eq!(
            form.omics_units().unwrap(),
            vec!["YAL001C", "YAL002W", "YKL001C", "YBR001C"]
        );
    }

    #[test]
    fn repeated_references_count_once_toward_the_limit() {
        let distinct: Vec<String> = (0..MAX_OMICS_UNITS).map(|i| format!("U{i}")).collect();
        let text = vec![distinct.join(" "); 50].join("\n");
        let units = FilterForm::new(vec![("omics_units".into(), text)])
            .omics_units()
            .unwrap();
        assert_eq!(units.len(), MAX_OMICS_UNITS);
        assert_eq!(units[0], "U0");
    }

    #[test]
    fn huge_reference_list_is_rejected() {
        let text: Vec<String> = (0..200_000).map(|i| format!("YAL{i:06}C")).collect();
        let form = FilterForm::new(vec![("omics_units".into(), text.join(","))]);
        let errors = form.omics_units().unwrap_err();
        assert_eq!(
            errors.non_field,
            vec!["Too many omics units (at most 1000 are allowed).".to_string()]
        );
    }
}
