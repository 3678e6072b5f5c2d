//! Child-set planning: declared children → minimal row operations.
//!
//! Used for the aspects of one dimension (keyed by name) and for the
//! dimensions on one ficha (keyed by dimension id). Display orders are always
//! the 1-based position in the declared list.

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
};

/// A row already persisted under one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingChild<K> {
  pub id:    i64,
  pub key:   K,
  pub order: i64,
}

/// The operations that take the persisted children to the declared ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPlan<K> {
  /// Declared but not persisted, with their target order.
  pub insert:    Vec<(K, i64)>,
  /// Persisted and declared, at the wrong position: `(id, new_order)`.
  pub reorder:   Vec<(i64, i64)>,
  /// Persisted and declared at the right position.
  pub unchanged: Vec<i64>,
  /// Persisted but no longer declared, by current order. Whether each one is
  /// actually deleted is the caller's call.
  pub remove:    Vec<ExistingChild<K>>,
}

impl<K> ChildPlan<K> {
  pub fn is_noop(&self) -> bool {
    self.insert.is_empty() && self.reorder.is_empty() && self.remove.is_empty()
  }
}

/// Compute the [`ChildPlan`] that transitions `existing` to `declared`.
///
/// `declared` must not contain duplicate keys.
pub fn plan_children<K>(existing: &[ExistingChild<K>], declared: &[K]) -> ChildPlan<K>
where
  K: Eq + Hash + Clone,
{
  let by_key: HashMap<&K, &ExistingChild<K>> =
    existing.iter().map(|c| (&c.key, c)).collect();
  let wanted: HashSet<&K> = declared.iter().collect();

  let mut insert = vec![];
  let mut reorder = vec![];
  let mut unchanged = vec![];

  for (idx, key) in declared.iter().enumerate() {
    let order = idx as i64 + 1;
    match by_key.get(key) {
      Some(child) if child.order == order => unchanged.push(child.id),
      Some(child) => reorder.push((child.id, order)),
      None => insert.push((key.clone(), order)),
    }
  }

  let mut remove: Vec<ExistingChild<K>> = existing
    .iter()
    .filter(|c| !wanted.contains(&c.key))
    .cloned()
    .collect();
  remove.sort_by_key(|c| (c.order, c.id));

  ChildPlan { insert, reorder, unchanged, remove }
}

/// Orders for rows that stay persisted after the declared ones (retained
/// aspects, undeclared dimensions). They continue the sequence from
/// `declared + 1` in their current relative order, so the scope stays
/// contiguous. Only rows whose order actually changes are returned.
pub fn renumber_trailing<K>(declared: usize, kept: &[ExistingChild<K>]) -> Vec<(i64, i64)> {
  let mut kept: Vec<&ExistingChild<K>> = kept.iter().collect();
  kept.sort_by_key(|c| (c.order, c.id));

  kept
    .into_iter()
    .enumerate()
    .filter_map(|(idx, child)| {
      let order = (declared + idx) as i64 + 1;
      (child.order != order).then_some((child.id, order))
    })
    .collect()
}
