/// Data layer: catalog records, loading, the Pixel Set store and filtering.
///
/// Architecture:
/// ```text
///  catalog.json          pixel files (.csv / .tsv / .json / .parquet)
///        │                        │
///        ▼                        ▼
///   ┌──────────┐          ┌──────────────┐
///   │  loader  │          │ PixelSource  │  ensure_available / read_pixels
///   └──────────┘          └──────────────┘
///        │                        │
///        ▼                        │
///   ┌──────────────┐              │
///   │ CatalogStore │◄─────────────┘  id indices, area tree, tag merge
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter  │  FilterSpec → matching Pixel Sets, in store order
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod sample;
pub mod store;
pub mod tags;
