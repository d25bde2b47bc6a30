use std::collections::BTreeSet;

use super::{form::IngredientLine, schema::Id};

/// Changes that turn the `current` association set into the `requested` one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    pub remove: BTreeSet<T>,
    pub insert: BTreeSet<T>,
}

impl<T: Ord + Clone> SetDiff<T> {
    pub fn plan(current: &BTreeSet<T>, requested: &BTreeSet<T>) -> Self {
        Self {
            remove: current.difference(requested).cloned().collect(),
            insert: requested.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.insert.is_empty()
    }

    pub fn apply(&self, current: &BTreeSet<T>) -> BTreeSet<T> {
        current
            .difference(&self.remove)
            .chain(self.insert.iter())
            .cloned()
            .collect()
    }
}

/// Ingredient rows are never diffed: every existing row goes, then the submitted lines go in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientReplace {
    pub recipe_id: Id,
    pub rows: Vec<(Id, i32)>,
}

impl IngredientReplace {
    pub fn plan(recipe_id: Id, lines: &[IngredientLine]) -> Self {
        Self {
            recipe_id,
            rows: lines.iter().map(|line| (line.id, line.amount)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[Id]) -> BTreeSet<Id> {
        ids.iter().copied().collect()
    }

    #[test]
    fn plan_touches_only_changes() {
        let diff = SetDiff::plan(&set(&[1, 2, 3]), &set(&[2, 3, 4]));
        assert_eq!(diff.remove, set(&[1]));
        assert_eq!(diff.insert, set(&[4]));
    }

    #[test]
    fn applying_plan_yields_requested() {
        let cases = [
            (set(&[]), set(&[1, 2])),
            (set(&[1, 2]), set(&[1, 2])),
            (set(&[1, 2]), set(&[5])),
            (set(&[1, 3, 5, 7]), set(&[2, 3, 7, 8])),
        ];
        for (current, requested) in cases {
            let diff = SetDiff::plan(&current, &requested);
            assert_eq!(diff.apply(&current), requested);
        }
    }

    #[test]
    fn identical_sets_need_no_work() {
        assert!(SetDiff::plan(&set(&[4, 5]), &set(&[5, 4])).is_empty());
    }

    #[test]
    fn ingredient_replace_keeps_submission_order() {
        let lines = [
            IngredientLine { id: 9, amount: 1 },
            IngredientLine { id: 3, amount: 250 },
        ];
        let replace = IngredientReplace::plan(12, &lines);
        assert_eq!(replace.recipe_id, 12);
        assert_eq!(replace.rows, vec![(9, 1), (3, 250)]);
    }
}
