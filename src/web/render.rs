use std::fmt::{self, Display, Formatter};

use crate::state::Message;

use super::form::FormErrors;
use super::views::{DetailPage, ErrorPage, FieldView, FormView, ListPage, PixelSetRow};

pub const NO_MATCH: &str = "No Pixel Set matches your query";
const NO_PIXEL: &str = "No Pixel matches your query";
const LIST_COLUMNS: usize = 8;

/// HTML-escaped text.
pub struct Escaped<'a>(pub &'a str);

impl Display for Escaped<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&#x27;")?,
                c => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}

fn esc(text: &str) -> Escaped<'_> {
    Escaped(text)
}

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

fn open_page(f: &mut Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "<!DOCTYPE html>")?;
    writeln!(f, "<html lang=\"en\">")?;
    writeln!(f, "<head>")?;
    writeln!(f, "<meta charset=\"utf-8\">")?;
    writeln!(f, "<title>{} | Pixel Explorer</title>", esc(title))?;
    writeln!(f, "</head>")?;
    writeln!(f, "<body>")?;
    writeln!(f, "<h1>{}</h1>", esc(title))
}

fn close_page(f: &mut Formatter<'_>) -> fmt::Result {
    writeln!(f, "</body>")?;
    writeln!(f, "</html>")
}

fn messages(f: &mut Formatter<'_>, messages: &[Message]) -> fmt::Result {
    if messages.is_empty() {
        return Ok(());
    }
    writeln!(f, "<ul class=\"messages\">")?;
    for m in messages {
        writeln!(f, "<li class=\"{}\">{}</li>", m.level.as_str(), esc(&m.text))?;
    }
    writeln!(f, "</ul>")
}

fn error_list(f: &mut Formatter<'_>, class: &str, errors: &[String]) -> fmt::Result {
    if errors.is_empty() {
        return Ok(());
    }
    writeln!(f, "<ul class=\"{class}\">")?;
    for e in errors {
        writeln!(f, "<li>{}</li>", esc(e))?;
    }
    writeln!(f, "</ul>")
}

fn joined(list: &[String]) -> String {
    list.join(", ")
}

fn choice_field(f: &mut Formatter<'_>, field: &FieldView) -> fmt::Result {
    writeln!(f, "<fieldset class=\"{}\">", field.name)?;
    writeln!(f, "<legend>{}</legend>", field.label)?;
    error_list(f, "errorlist", &field.errors)?;
    writeln!(f, "<select name=\"{}\" multiple>", field.name)?;
    for opt in &field.options {
        write!(f, "<option value=\"{}\"", esc(&opt.value))?;
        if opt.selected {
            write!(f, " selected")?;
        }
        writeln!(
            f,
            ">{}{}</option>",
            "&nbsp;&nbsp;".repeat(opt.depth),
            esc(&opt.label)
        )?;
    }
    writeln!(f, "</select>")?;
    writeln!(f, "</fieldset>")
}

fn filter_form(f: &mut Formatter<'_>, form: &FormView) -> fmt::Result {
    writeln!(f, "<form method=\"post\" action=\"/pixelsets/\" class=\"filters\">")?;
    error_list(f, "errorlist nonfield", &form.non_field_errors)?;
    for field in &form.fields {
        choice_field(f, field)?;
    }
    writeln!(f, "<label for=\"id_search\">Search</label>")?;
    writeln!(
        f,
        "<input type=\"text\" id=\"id_search\" name=\"search\" value=\"{}\">",
        esc(&form.search)
    )?;
    writeln!(f, "<label for=\"id_omics_units\">Omics units</label>")?;
    writeln!(
        f,
        "<textarea id=\"id_omics_units\" name=\"omics_units\">{}</textarea>",
        esc(&form.omics_units)
    )?;
    writeln!(f, "<button type=\"submit\">Filter</button>")?;
    writeln!(f, "</form>")
}

fn pixel_set_row(f: &mut Formatter<'_>, row: &PixelSetRow) -> fmt::Result {
    writeln!(f, "<tr class=\"pixelset\">")?;
    writeln!(
        f,
        "<td class=\"filename\"><a href=\"/pixelsets/{}\">{}</a></td>",
        row.id,
        esc(&row.filename)
    )?;
    writeln!(f, "<td class=\"description\">{}</td>", esc(&row.description))?;
    writeln!(f, "<td class=\"species\">{}</td>", esc(&joined(&row.species)))?;
    writeln!(
        f,
        "<td class=\"omics-unit-types\">{}</td>",
        esc(&joined(&row.omics_unit_types))
    )?;
    writeln!(f, "<td class=\"omics-areas\">{}</td>", esc(&joined(&row.omics_areas)))?;
    write!(f, "<td class=\"tags\">")?;
    for tag in &row.tags {
        write!(f, "<span class=\"tag\">{}</span>", esc(tag))?;
    }
    writeln!(f, "</td>")?;
    writeln!(f, "<td class=\"pixeler\">{}</td>", esc(&row.pixeler))?;
    write!(f, "<td class=\"dates\">Analysis: {}", esc(&row.analysis_completed_at))?;
    for exp in &row.experiments {
        write!(
            f,
            "<br>Experiment: {} (released {})",
            esc(&exp.completed_at),
            esc(&exp.released_at)
        )?;
    }
    writeln!(f, "</td>")?;
    writeln!(f, "</tr>")
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

impl Display for ListPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        open_page(f, "Pixel Sets")?;
        messages(f, &self.messages)?;
        filter_form(f, &self.form)?;
        if self.has_selection {
            writeln!(
                f,
                "<form method=\"post\" action=\"/pixelsets/selection/clear\" class=\"clear\">\
                 <button type=\"submit\">Clear selection</button></form>"
            )?;
        }

        writeln!(
            f,
            "<p class=\"counts\">Displaying <span class=\"displayed\">{}</span> of \
             <span class=\"matched\">{}</span> matching Pixel Sets \
             (<span class=\"total\">{}</span> in total)</p>",
            self.displayed, self.matched, self.total
        )?;
        if self.show_export() {
            writeln!(f, "<p class=\"export\">")?;
            writeln!(
                f,
                "<a href=\"/pixelsets/export?only-subset=1\">Download a CSV file with the selected Pixel Sets</a>"
            )?;
            writeln!(
                f,
                "<a href=\"/pixelsets/export\">Download a CSV file with all Pixel Sets</a>"
            )?;
            writeln!(f, "</p>")?;
            writeln!(
                f,
                "<div class=\"charts\" \
                 data-values=\"/pixelsets/selection/values\" \
                 data-quality-scores=\"/pixelsets/selection/quality-scores\" \
                 data-cumulative-values=\"/pixelsets/selection/cumulative-values\" \
                 data-cumulative-quality-scores=\"/pixelsets/selection/cumulative-quality-scores\"></div>"
            )?;
        }

        writeln!(f, "<table class=\"pixelsets\">")?;
        writeln!(
            f,
            "<thead><tr><th>File</th><th>Description</th><th>Species</th>\
             <th>Omics unit types</th><th>Omics areas</th><th>Tags</th>\
             <th>Pixeler</th><th>Dates</th></tr></thead>"
        )?;
        writeln!(f, "<tbody>")?;
        if self.rows.is_empty() {
            writeln!(
                f,
                "<tr><td colspan=\"{LIST_COLUMNS}\" class=\"empty\">{NO_MATCH}</td></tr>"
            )?;
        }
        for row in &self.rows {
            pixel_set_row(f, row)?;
        }
        writeln!(f, "</tbody>")?;
        writeln!(f, "</table>")?;

        if self.num_pages > 1 {
            writeln!(f, "<nav class=\"pagination\">")?;
            if self.has_previous {
                writeln!(
                    f,
                    "<a rel=\"prev\" href=\"/pixelsets/?page={}\">Previous</a>",
                    self.page - 1
                )?;
            }
            writeln!(f, "<span>Page {} of {}</span>", self.page, self.num_pages)?;
            if self.has_next {
                writeln!(
                    f,
                    "<a rel=\"next\" href=\"/pixelsets/?page={}\">Next</a>",
                    self.page + 1
                )?;
            }
            writeln!(f, "</nav>")?;
        }
        close_page(f)
    }
}

fn detail_form(f: &mut Formatter<'_>, page: &DetailPage) -> fmt::Result {
    let id = &page.pixel_set.id;
    writeln!(f, "<form method=\"post\" action=\"/pixelsets/{id}\" class=\"filters\">")?;
    let FormErrors { fields, non_field } = &page.errors;
    error_list(f, "errorlist nonfield", non_field)?;
    for errors in fields.values() {
        error_list(f, "errorlist", errors)?;
    }
    writeln!(f, "<label for=\"id_omics_units\">Omics units</label>")?;
    writeln!(
        f,
        "<textarea id=\"id_omics_units\" name=\"omics_units\">{}</textarea>",
        esc(&page.omics_units)
    )?;
    writeln!(f, "<button type=\"submit\">Filter</button>")?;
    writeln!(f, "</form>")?;
    if page.subset {
        writeln!(
            f,
            "<form method=\"post\" action=\"/pixelsets/{id}/clear\" class=\"clear\">\
             <button type=\"submit\">Clear selection</button></form>"
        )?;
    }
    Ok(())
}

impl Display for DetailPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ps = &self.pixel_set;
        open_page(f, &format!("Pixel Set {}", ps.filename))?;
        messages(f, &self.messages)?;

        writeln!(f, "<p class=\"description\">{}</p>", esc(&ps.description))?;
        writeln!(f, "<dl class=\"pixelset\">")?;
        let facts = [
            ("Identifier", ps.id.clone()),
            ("Species", joined(&ps.species)),
            ("Omics unit types", joined(&ps.omics_unit_types)),
            ("Omics areas", joined(&ps.omics_areas)),
            ("Pixeler", ps.pixeler.clone()),
            ("Analysis", ps.analysis_description.clone()),
            ("Analysis completed", ps.analysis_completed_at.clone()),
        ];
        for (term, value) in &facts {
            writeln!(f, "<dt>{term}</dt><dd>{}</dd>", esc(value))?;
        }
        writeln!(f, "</dl>")?;

        writeln!(f, "<h2>Experiments</h2>")?;
        writeln!(f, "<ul class=\"experiments\">")?;
        for exp in &ps.experiments {
            writeln!(
                f,
                "<li>{} <span class=\"omics-area\">{}</span> completed {}, released {}</li>",
                esc(&exp.description),
                esc(&exp.omics_area),
                esc(&exp.completed_at),
                esc(&exp.released_at)
            )?;
        }
        writeln!(f, "</ul>")?;

        writeln!(f, "<h2>Tags</h2>")?;
        write!(f, "<p class=\"tags\">")?;
        for tag in &ps.tags {
            write!(f, "<span class=\"tag\">{}</span>", esc(tag))?;
        }
        writeln!(f, "</p>")?;

        writeln!(f, "<h2>Pixels</h2>")?;
        detail_form(f, self)?;
        writeln!(f, "<p class=\"export\">")?;
        writeln!(
            f,
            "<a href=\"/pixelsets/{}/export\">Download a CSV file with all Pixels</a>",
            ps.id
        )?;
        if self.show_subset_export() {
            writeln!(
                f,
                "<a href=\"/pixelsets/{}/export?only-subset=1\">Download a CSV file with the selected Pixels</a>",
                ps.id
            )?;
        }
        writeln!(f, "</p>")?;
        writeln!(
            f,
            "<p class=\"counts\">Showing {} of {} Pixels (at most {})</p>",
            self.pixels.len(),
            self.pixel_count,
            self.preview_limit
        )?;
        writeln!(
            f,
            "<div class=\"charts\" data-values=\"/pixelsets/{id}/values\" \
             data-quality-scores=\"/pixelsets/{id}/quality-scores\"></div>",
            id = ps.id
        )?;

        writeln!(f, "<table class=\"pixels\">")?;
        writeln!(
            f,
            "<thead><tr><th>Omics Unit</th><th>Description</th><th>Value</th><th>QS</th></tr></thead>"
        )?;
        writeln!(f, "<tbody>")?;
        if self.pixels.is_empty() {
            writeln!(f, "<tr><td colspan=\"4\" class=\"empty\">{NO_PIXEL}</td></tr>")?;
        }
        for pixel in &self.pixels {
            writeln!(f, "<tr class=\"pixel\">")?;
            writeln!(f, "<td class=\"omics-unit\">{}</td>", esc(&pixel.omics_unit))?;
            writeln!(f, "<td class=\"description\">{}</td>", esc(&pixel.description))?;
            writeln!(f, "<td class=\"value\">{}</td>", pixel.value)?;
            match pixel.quality_score {
                Some(qs) => writeln!(f, "<td class=\"quality-score\">{qs}</td>")?,
                None => writeln!(f, "<td class=\"quality-score\"></td>")?,
            }
            writeln!(f, "</tr>")?;
        }
        writeln!(f, "</tbody>")?;
        writeln!(f, "</table>")?;
        writeln!(f, "<p><a href=\"/pixelsets/\">Back to Pixel Sets</a></p>")?;
        close_page(f)
    }
}

impl Display for ErrorPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        open_page(f, &self.title)?;
        writeln!(f, "<p class=\"error\" data-status=\"{}\">{}</p>", self.status, esc(&self.message))?;
        writeln!(f, "<p><a href=\"/pixelsets/\">Back to Pixel Sets</a></p>")?;
        close_page(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::FilterOptions;
    use crate::state::Level;

    fn empty_list() -> ListPage {
        ListPage {
            form: FormView::from_terms(&FilterOptions::default(), None),
            rows: Vec::new(),
            total: 0,
            matched: 0,
            displayed: 0,
            page: 1,
            num_pages: 1,
            has_previous: false,
            has_next: false,
            has_selection: false,
            messages: Vec::new(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            Escaped("<b>\"Tom\" & 'Jerry'</b>").to_string(),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn empty_list_renders_no_match_row_without_export() {
        let html = empty_list().to_string();
        assert!(html.contains(
            "<td colspan=\"8\" class=\"empty\">No Pixel Set matches your query</td>"
        ));
        assert!(!html.contains("/pixelsets/export"));
        assert!(!html.contains("<tr class=\"pixelset\">"));
        assert!(!html.contains("pagination"));
    }

    #[test]
    fn messages_and_clear_button_render() {
        let mut page = empty_list();
        page.has_selection = true;
        page.messages.push(Message {
            level: Level::Success,
            text: "Pixel Set selection has been cleared.".into(),
        });
        let html = page.to_string();
        assert!(html.contains("<li class=\"success\">Pixel Set selection has been cleared.</li>"));
        assert!(html.contains("action=\"/pixelsets/selection/clear\""));
    }

    #[test]
    fn error_page_escapes_message() {
        let html = ErrorPage {
            status: 500,
            title: "Server error".into(),
            message: "pixel file <a.csv> is missing".into(),
        }
        .to_string();
        assert!(html.contains("pixel file &lt;a.csv&gt; is missing"));
    }
}
