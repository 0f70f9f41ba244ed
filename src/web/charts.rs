//! Distribution tables for the chart widgets.
//!
//! The JSON shape is a charting DataTable:
//!
//! ```text
//! {"cols": [{"label": "id", "type": "string"}, {"label": "value", "type": "number"}],
//!  "rows": [{"c": [{"v": "YAL001C"}, {"v": 0.5}]}, ...]}
//! ```
//!
//! Every builder takes the omics unit restriction stored in the session; a
//! restriction keeps only the pixels of those units.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::data::model::Pixel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTable {
    pub cols: Vec<Column>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub c: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub v: Value,
}

impl Column {
    fn string(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: "string",
        }
    }

    fn number(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: "number",
        }
    }
}

impl Cell {
    fn text(text: &str) -> Self {
        Self {
            v: Value::String(text.to_string()),
        }
    }

    /// `null` for a missing (or non-finite) number.
    fn number(n: Option<f64>) -> Self {
        Self {
            v: n.map(Value::from).unwrap_or(Value::Null),
        }
    }
}

/// Which pixel column a table plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Value,
    QualityScore,
}

impl Measure {
    pub fn label(&self) -> &'static str {
        match self {
            Measure::Value => "value",
            Measure::QualityScore => "quality_score",
        }
    }

    fn of(&self, pixel: &Pixel) -> Option<f64> {
        match self {
            Measure::Value => Some(pixel.value),
            Measure::QualityScore => pixel.quality_score,
        }
    }
}

fn kept<'a>(
    pixels: &'a [Pixel],
    wanted: Option<&'a HashSet<String>>,
) -> impl Iterator<Item = &'a Pixel> + 'a {
    pixels
        .iter()
        .filter(move |p| wanted.map_or(true, |w| w.contains(&p.omics_unit)))
}

/// One row per pixel of a single Pixel Set.
pub fn pixel_set_table(
    pixels: &[Pixel],
    measure: Measure,
    wanted: Option<&HashSet<String>>,
) -> DataTable {
    DataTable {
        cols: vec![Column::string("id"), Column::number(measure.label())],
        rows: kept(pixels, wanted)
            .map(|p| Row {
                c: vec![Cell::text(&p.omics_unit), Cell::number(measure.of(p))],
            })
            .collect(),
    }
}

/// One column per Pixel Set, one row per omics unit (sorted by reference).
///
/// `sets` pairs a column label with the pixels of that set. A unit missing
/// from a set gives a `null` cell; when a set holds a unit twice the last
/// pixel wins.
pub fn selection_table(
    sets: &[(String, Vec<Pixel>)],
    measure: Measure,
    wanted: Option<&HashSet<String>>,
) -> DataTable {
    let mut by_unit: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for (column, (_, pixels)) in sets.iter().enumerate() {
        for pixel in kept(pixels, wanted) {
            let cells = by_unit
                .entry(pixel.omics_unit.as_str())
                .or_insert_with(|| vec![None; sets.len()]);
            cells[column] = measure.of(pixel);
        }
    }

    let mut cols = vec![Column::string("id")];
    cols.extend(sets.iter().map(|(label, _)| Column::number(label)));
    DataTable {
        cols,
        rows: by_unit
            .into_iter()
            .map(|(unit, values)| {
                let mut c = vec![Cell::text(unit)];
                c.extend(values.into_iter().map(Cell::number));
                Row { c }
            })
            .collect(),
    }
}

/// Every pixel of every set pooled into a single series.
pub fn cumulative_table(
    sets: &[(String, Vec<Pixel>)],
    measure: Measure,
    wanted: Option<&HashSet<String>>,
) -> DataTable {
    DataTable {
        cols: vec![Column::string("id"), Column::number(measure.label())],
        rows: sets
            .iter()
            .flat_map(|(_, pixels)| kept(pixels, wanted))
            .map(|p| Row {
                c: vec![Cell::text(&p.omics_unit), Cell::number(measure.of(p))],
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pixel(unit: &str, value: f64, qs: Option<f64>) -> Pixel {
        Pixel {
            omics_unit: unit.to_string(),
            value,
            quality_score: qs,
        }
    }

    fn pixels() -> Vec<Pixel> {
        vec![pixel("YAL001C", 0.5, Some(0.01)), pixel("YAL002W", -1.0, None)]
    }

    #[test]
    fn pixel_set_table_serializes_as_data_table() {
        let table = pixel_set_table(&pixels(), Measure::Value, None);
        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            json!({
                "cols": [
                    {"label": "id", "type": "string"},
                    {"label": "value", "type": "number"}
                ],
                "rows": [
                    {"c": [{"v": "YAL001C"}, {"v": 0.5}]},
                    {"c": [{"v": "YAL002W"}, {"v": -1.0}]}
                ]
            })
        );
    }

    #[test]
    fn missing_quality_score_is_null() {
        let table = pixel_set_table(&pixels(), Measure::QualityScore, None);
        assert_eq!(table.cols[1].label, "quality_score");
        assert_eq!(table.rows[0].c[1].v, json!(0.01));
        assert_eq!(table.rows[1].c[1].v, Value::Null);
    }

    #[test]
    fn restriction_keeps_only_wanted_units() {
        let wanted: HashSet<String> = ["YAL002W".to_string()].into();
        let table = pixel_set_table(&pixels(), Measure::Value, Some(&wanted));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].c[0].v, json!("YAL002W"));

        let nothing: HashSet<String> = ["invalid".to_string()].into();
        assert!(pixel_set_table(&pixels(), Measure::Value, Some(&nothing)).rows.is_empty());
    }

    #[test]
    fn selection_table_has_a_column_per_set() {
        let sets = vec![
            ("aaaa0001".to_string(), pixels()),
            ("bbbb0002".to_string(), vec![pixel("YAL001C", 2.0, None)]),
        ];
        let table = selection_table(&sets, Measure::Value, None);
        let labels: Vec<&str> = table.cols.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["id", "aaaa0001", "bbbb0002"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            serde_json::to_value(&table.rows[1]).unwrap(),
            json!({"c": [{"v": "YAL002W"}, {"v": -1.0}, {"v": null}]})
        );
    }

    #[test]
    fn cumulative_table_pools_every_set() {
        let sets = vec![
            ("aaaa0001".to_string(), pixels()),
            ("bbbb0002".to_string(), vec![pixel("YAL001C", 2.0, None)]),
        ];
        assert_eq!(cumulative_table(&sets, Measure::Value, None).rows.len(), 3);

        let wanted: HashSet<String> = ["YAL001C".to_string()].into();
        let table = cumulative_table(&sets, Measure::Value, Some(&wanted));
        let values: Vec<&Value> = table.rows.iter().map(|r| &r.c[1].v).collect();
        assert_eq!(values, vec![&json!(0.5), &json!(2.0)]);
    }
}
