use std::collections::{BTreeMap, BTreeSet};

use super::model::{Dimension, RecordTable};

// ---------------------------------------------------------------------------
// Selection: which values are permitted per dimension
// ---------------------------------------------------------------------------

/// Per-dimension selection state: maps dimension → set of permitted values.
///
/// Callers rely on three cases:
/// - a dimension absent from the map is unconstrained;
/// - a dimension mapped to an empty set matches no record, so the filtered
///   table is empty (this is what "None" in the side panel produces);
/// - a set holding the whole observed domain keeps every record.
///
/// To lift a constraint, remove the key instead of clearing its set.
pub type Selection = BTreeMap<Dimension, BTreeSet<String>>;

/// Initialise a [`Selection`] with every observed value of the filterable
/// dimensions selected (i.e., show everything).
pub fn init_selection(table: &RecordTable) -> Selection {
    Dimension::FILTERABLE
        .into_iter()
        .map(|dim| (dim, table.domain(dim)))
        .collect()
}

/// Return indices of records that pass all active filters.
///
/// A record passes a dimension's filter when:
/// * The dimension is not present in `selection` → passes (no constraint)
/// * The selection covers the whole observed domain → passes
/// * The record's value for that dimension is in the selected set → passes
///
/// Selected values that never occur in the table are harmless.
pub fn filtered_indices(table: &RecordTable, selection: &Selection) -> Vec<usize> {
    // Dimensions whose selection covers the observed domain are no-ops.
    let active: Vec<(Dimension, &BTreeSet<String>)> = selection
        .iter()
        .filter(|(dim, selected)| match table.unique_values.get(dim) {
            Some(all_vals) => !all_vals.is_subset(selected),
            None => true,
        })
        .map(|(dim, selected)| (*dim, selected))
        .collect();

    table
        .records
        .iter()
        .enumerate()
        .filter(|(_, rec)| {
            active.iter().all(|(dim, selected)| match rec.category(*dim) {
                Some(val) => selected.contains(val),
                None => false,
            })
        })
        .map(|(i, _)| i)
        .collect()
}

/// Return the subset table of records passing `selection`, in original order.
pub fn apply_filter(table: &RecordTable, selection: &Selection) -> RecordTable {
    let indices = filtered_indices(table, selection);
    log::debug!(
        "filter kept {} of {} records",
        indices.len(),
        table.len()
    );
    if indices.len() == table.len() {
        return table.clone();
    }
    let records = indices
        .into_iter()
        .map(|i| table.records[i].clone())
        .collect();
    RecordTable::from_records(records)
}
