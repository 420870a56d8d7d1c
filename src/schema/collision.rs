//! Shape and type collision renaming

use crate::document::ValueKind;
use crate::flatten::{FlatDocument, FlatField};
use crate::naming::NameRegistry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Outcome of a collision pass over one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionReport {
    /// Names that occurred with more than one kind
    pub colliding: BTreeSet<String>,
    /// Number of leaves that were renamed
    pub renamed: usize,
}

impl CollisionReport {
    /// Check if the batch had no collisions
    pub fn is_clean(&self) -> bool {
        self.colliding.is_empty()
    }
}

/// Rename every column that occurs with more than one kind in the batch
///
/// Integer and double values share a kind here; nulls have none. A colliding
/// scalar `N` becomes `N_<KIND>`, where all numbers at `N` take one suffix:
/// `INT` when every one is an integer, `DOUBLE` otherwise. A colliding
/// container `N` inserts its kind after its own segment in every descendant
/// (`N_A` -> `N_STRUCT_A`). Null leaves at a colliding name are dropped since
/// they carry no type.
///
/// Names that were not renamed keep their columns. A suffixed name that
/// lands on one of them is numbered once for the whole batch, so each
/// output column holds a single source field in every document.
pub fn resolve_collisions(docs: &mut [FlatDocument]) -> CollisionReport {
    let colliding = find_colliding(docs);
    let mut report = CollisionReport {
        colliding: colliding.keys().cloned().collect(),
        renamed: 0,
    };
    if colliding.is_empty() {
        return report;
    }

    let mut pending: Vec<Vec<(FlatField, Option<String>)>> = Vec::with_capacity(docs.len());
    for doc in docs.iter_mut() {
        let fields = std::mem::take(&mut doc.fields);
        let renamed = fields
            .into_iter()
            .filter(|field| !(colliding.contains_key(&field.name) && field.value.is_null()))
            .map(|field| {
                let target = suffixed_name(&field, &colliding);
                (field, target)
            })
            .collect();
        pending.push(renamed);
    }

    // Kept names are claimed before any suffixed one is handed out
    let mut batch = NameRegistry::new();
    for (field, _) in pending.iter().flatten().filter(|(_, target)| target.is_none()) {
        if !batch.contains(&field.name) {
            batch.uniquify(&field.name);
        }
    }
    let targets: BTreeSet<&String> = pending.iter().flatten().filter_map(|(_, t)| t.as_ref()).collect();
    let assigned: HashMap<String, String> = targets
        .into_iter()
        .map(|target| (target.clone(), batch.uniquify(target)))
        .collect();

    for (doc, fields) in docs.iter_mut().zip(pending) {
        for (mut field, target) in fields {
            if let Some(name) = target.and_then(|t| assigned.get(&t).cloned()) {
                report.renamed += 1;
                field.name = name;
            }
            doc.fields.push(field);
        }
    }

    report
}

/// The collision-free name of a field, `None` if it keeps its own
fn suffixed_name(field: &FlatField, colliding: &BTreeMap<String, ValueKind>) -> Option<String> {
    let mut name = field.name.clone();
    // Deepest first, so outer prefixes are still intact
    for (ancestor, kind) in field.ancestors.iter().rev() {
        if !colliding.contains_key(ancestor) {
            continue;
        }
        if let Some(rest) = name.strip_prefix(ancestor.as_str()) {
            if rest.starts_with('_') {
                name = format!("{ancestor}_{}{rest}", kind.suffix());
            }
        }
    }
    if let Some(numeric) = colliding.get(&field.name) {
        let kind = match field.kind() {
            ValueKind::Int | ValueKind::Double => *numeric,
            other => other,
        };
        name = format!("{name}_{}", kind.suffix());
    }
    (name != field.name).then_some(name)
}

/// Colliding names, each with the suffix its numbers share
fn find_colliding(docs: &[FlatDocument]) -> BTreeMap<String, ValueKind> {
    let mut classes: BTreeMap<&str, (BTreeSet<ValueKind>, ValueKind)> = BTreeMap::new();

    for doc in docs {
        for field in &doc.fields {
            let kind = field.kind();
            if let Some(class) = kind.collision_class() {
                let entry = classes
                    .entry(field.name.as_str())
                    .or_insert_with(|| (BTreeSet::new(), ValueKind::Int));
                entry.0.insert(class);
                if kind == ValueKind::Double {
                    entry.1 = ValueKind::Double;
                }
            }
        }
        for (name, kind) in &doc.containers {
            classes
                .entry(name.as_str())
                .or_insert_with(|| (BTreeSet::new(), ValueKind::Int))
                .0
                .insert(*kind);
        }
    }

    classes
        .into_iter()
        .filter(|(_, (kinds, _))| kinds.len() > 1)
        .map(|(name, (_, numeric))| (name.to_string(), numeric))
        .collect()
}
