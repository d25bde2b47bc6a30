use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;

use super::{error::ServiceError, schema::Id};

/// One (recipe, ingredient) row of a cart, joined with the ingredient's name and unit.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub recipe_id: Id,
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {} ({}) - {}",
            self.name, self.measurement_unit, self.amount
        )
    }
}

/// Aggregated shopping list. Lines are sorted by name, then unit, then ingredient id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub lines: Vec<ReportLine>,
}

impl Report {
    /// Aggregates the ingredient lines of a cart holding `cart_recipes` recipes.
    ///
    /// Only a cart with no recipes is empty. Recipes whose ingredients were all
    /// removed from the catalog contribute no lines.
    pub fn from_cart<I>(cart_recipes: i64, lines: I) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = CartLine>,
    {
        if cart_recipes <= 0 {
            return Err(ServiceError::EmptyCart);
        }

        let mut groups: BTreeMap<(String, String, Id), i64> = BTreeMap::new();
        for line in lines {
            *groups
                .entry((line.name, line.measurement_unit, line.ingredient_id))
                .or_insert(0) += i64::from(line.amount);
        }

        let lines = groups
            .into_iter()
            .map(|((name, measurement_unit, ingredient_id), amount)| ReportLine {
                ingredient_id,
                name,
                measurement_unit,
                amount,
            })
            .collect();

        Ok(Self { lines })
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(recipe_id: Id, ingredient_id: Id, name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            recipe_id,
            ingredient_id,
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            amount,
        }
    }

    #[test]
    fn sums_across_recipes() {
        let report = Report::from_cart(2, vec![
            line(1, 10, "sugar", "g", 100),
            line(1, 11, "flour", "g", 200),
            line(2, 11, "flour", "g", 300),
        ])
        .unwrap();

        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.render(), "- flour (g) - 500\n- sugar (g) - 100\n");
    }

    #[test]
    fn empty_cart_is_an_error() {
        let result = Report::from_cart(0, Vec::new());
        assert!(matches!(result, Err(ServiceError::EmptyCart)));
    }

    #[test]
    fn cart_without_ingredient_lines_is_not_empty() {
        let report = Report::from_cart(1, Vec::new()).unwrap();
        assert!(report.lines.is_empty());
        assert_eq!(report.render(), "");
    }

    #[test]
    fn order_is_independent_of_input() {
        let lines = vec![
            line(3, 5, "milk", "ml", 250),
            line(1, 2, "eggs", "pcs", 2),
            line(2, 5, "milk", "ml", 100),
            line(2, 7, "butter", "g", 30),
        ];
        let mut reversed = lines.clone();
        reversed.reverse();

        let forward = Report::from_cart(3, lines).unwrap();
        let backward = Report::from_cart(3, reversed).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(
            forward.render(),
            "- butter (g) - 30\n- eggs (pcs) - 2\n- milk (ml) - 350\n"
        );
    }

    #[test]
    fn units_are_not_merged() {
        let report = Report::from_cart(2, vec![
            line(1, 1, "salt", "g", 5),
            line(2, 2, "salt", "pinch", 1),
        ])
        .unwrap();

        assert_eq!(report.render(), "- salt (g) - 5\n- salt (pinch) - 1\n");
    }

    #[test]
    fn sums_past_i32() {
        let report = Report::from_cart(2, vec![
            line(1, 1, "water", "ml", i32::MAX),
            line(2, 1, "water", "ml", i32::MAX),
        ])
        .unwrap();

        assert_eq!(report.lines[0].amount, 2 * i64::from(i32::MAX));
    }
}
