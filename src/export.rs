use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDateTime;
use tokio::sync::mpsc;

use crate::data::model::{Id, PixelSet, short_id};
use crate::data::store::CatalogStore;
use crate::error::{ExportError, StoreError};

/// Chunks in flight between the blocking producer and the response body.
pub const CHANNEL_CAPACITY: usize = 4;

pub const SELECTION_HEADER: [&str; 5] = ["Pixel Set", "Omics Unit", "Description", "Value", "QS"];
pub const SINGLE_HEADER: [&str; 3] = ["Omics Unit", "Value", "QS"];

/// Shape of the exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Many Pixel Sets, one row per pixel tagged with its set.
    Selection,
    /// A single Pixel Set.
    Single,
}

impl ExportKind {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            ExportKind::Selection => &SELECTION_HEADER,
            ExportKind::Single => &SINGLE_HEADER,
        }
    }

    /// Attachment name stamped with `now`.
    pub fn filename(&self, now: NaiveDateTime) -> String {
        let stem = match self {
            ExportKind::Selection => "pixelsets",
            ExportKind::Single => "pixels",
        };
        format!("{stem}_{}.csv", now.format("%Y%m%d_%Hh%Mm%Ss"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub pixel_sets: usize,
    pub rows: usize,
}

// ---------------------------------------------------------------------------
// Export plan
// ---------------------------------------------------------------------------

/// The Pixel Sets (and optional omics unit restriction) of one export,
/// resolved at request time.
pub struct ExportPlan {
    store: Arc<CatalogStore>,
    kind: ExportKind,
    pixel_sets: Vec<Id>,
    omics_units: Option<HashSet<String>>,
}

impl ExportPlan {
    pub fn selection(
        store: Arc<CatalogStore>,
        pixel_sets: Vec<Id>,
        omics_units: Option<HashSet<String>>,
    ) -> Self {
        Self {
            store,
            kind: ExportKind::Selection,
            pixel_sets,
            omics_units,
        }
    }

    pub fn single(
        store: Arc<CatalogStore>,
        pixel_set: Id,
        omics_units: Option<HashSet<String>>,
    ) -> Self {
        Self {
            store,
            kind: ExportKind::Single,
            pixel_sets: vec![pixel_set],
            omics_units,
        }
    }

    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.pixel_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_sets.is_empty()
    }

    fn resolve(&self, id: &Id) -> Result<&PixelSet, StoreError> {
        self.store.pixel_set(id).ok_or(StoreError::NotFound(*id))
    }

    /// Every selected pixel file must be reachable before streaming starts.
    pub fn preflight(&self) -> Result<(), ExportError> {
        for id in &self.pixel_sets {
            let ps = self.resolve(id)?;
            self.store.ensure_available(ps)?;
        }
        Ok(())
    }

    pub fn header_chunk(&self) -> Result<Vec<u8>, ExportError> {
        let mut writer = csv_writer();
        writer.write_record(self.kind.header())?;
        finish(writer)
    }

    /// CSV rows of the `index`-th Pixel Set, with the row count.
    pub fn chunk(&self, index: usize) -> Result<(Vec<u8>, usize), ExportError> {
        let Some(id) = self.pixel_sets.get(index) else {
            return Ok((Vec::new(), 0));
        };
        let ps = self.resolve(id)?;
        let pixels = self.store.read_pixels(ps)?;
        let short = short_id(&ps.id);

        let mut writer = csv_writer();
        let mut rows = 0;
        for pixel in &pixels {
            if let Some(wanted) = &self.omics_units {
                if !wanted.contains(&pixel.omics_unit) {
                    continue;
                }
            }
            let value = pixel.value.to_string();
            let qs = pixel
                .quality_score
                .map(|q| q.to_string())
                .unwrap_or_default();
            match self.kind {
                ExportKind::Selection => {
                    let description = self
                        .store
                        .omics_unit(&pixel.omics_unit)
                        .map(|u| u.description.as_str())
                        .unwrap_or("");
                    writer.write_record([
                        short.as_str(),
                        pixel.omics_unit.as_str(),
                        description,
                        value.as_str(),
                        qs.as_str(),
                    ])?;
                }
                ExportKind::Single => {
                    writer.write_record([pixel.omics_unit.as_str(), value.as_str(), qs.as_str()])?;
                }
            }
            rows += 1;
        }
        log::debug!("export: Pixel Set {short} contributed {rows} rows");
        Ok((finish(writer)?, rows))
    }

    /// Write the whole export synchronously.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<ExportSummary, ExportError> {
        out.write_all(&self.header_chunk()?)?;
        let mut summary = ExportSummary::default();
        for index in 0..self.pixel_sets.len() {
            let (bytes, rows) = self.chunk(index)?;
            out.write_all(&bytes)?;
            summary.pixel_sets += 1;
            summary.rows += rows;
        }
        out.flush()?;
        Ok(summary)
    }

    /// Produce the export on a blocking worker, one chunk per Pixel Set.
    ///
    /// A failure is sent as the last item. Dropping the receiver stops the
    /// worker at its next send.
    pub fn spawn_stream(self) -> mpsc::Receiver<Result<Bytes, ExportError>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || {
            let header = match self.header_chunk() {
                Ok(h) => h,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            if tx.blocking_send(Ok(Bytes::from(header))).is_err() {
                return;
            }

            let mut summary = ExportSummary::default();
            for index in 0..self.pixel_sets.len() {
                match self.chunk(index) {
                    Ok((bytes, rows)) => {
                        summary.pixel_sets += 1;
                        summary.rows += rows;
                        if tx.blocking_send(Ok(Bytes::from(bytes))).is_err() {
                            log::info!(
                                "export cancelled by client after {} of {} Pixel Sets",
                                summary.pixel_sets,
                                self.pixel_sets.len()
                            );
                            return;
                        }
                    }
                    Err(e) => {
                        log::error!("export aborted: {e}");
                        let _ = tx.blocking_send(Err(e));
                        return;
                    }
                }
            }
            log::info!(
                "exported {} rows from {} Pixel Sets",
                summary.rows,
                summary.pixel_sets
            );
        });
        rx
    }
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}
