/// Data layer: core types, loading, and the filter → aggregate → reshape pipeline.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RecordTable (cached by path)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  per-dimension selections → subset table
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  group by 1–3 dimensions, sum / mean
///   └───────────┘
///        │
///        ├──────────────┐
///        ▼              ▼
///   ┌────────┐    ┌─────────┐
///   │ pivot   │    │ reindex  │  canonical order from the DomainRegistry
///   └────────┘    └─────────┘
///        │
///        ▼
///   ┌─────────┐
///   │ cluster  │  Ward linkage, dendrogram leaf order
///   └─────────┘
/// ```
///
/// `pipeline` wires the stages together for the heatmap and bar views.

pub mod aggregate;
pub mod cluster;
pub mod compare;
pub mod domain;
pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod pivot;
pub mod reindex;
pub mod stats;
