//! Renders a [`Predicate`] into a parameterised `WHERE` fragment.

use sqlx::{Postgres, QueryBuilder};

use super::{Band, Clause, Predicate, RegionScope};

impl Predicate {
    /// Append the predicate to `qb` with every value bound, never inlined.
    /// Columns are qualified with `alias`. An empty predicate renders `TRUE`.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        if self.clauses.is_empty() {
            qb.push("TRUE");
            return;
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                qb.push(" AND ");
            }
            push_clause(qb, alias, clause);
        }
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, clause: &Clause) {
    match clause {
        Clause::Region(RegionScope::Exact(code)) => {
            qb.push(format!("{alias}.region_code = ")).push_bind(*code);
        }
        Clause::Region(RegionScope::Within { lower, upper }) => {
            qb.push(format!("({alias}.region_code >= "))
                .push_bind(*lower)
                .push(format!(" AND {alias}.region_code < "))
                .push_bind(*upper)
                .push(")");
        }
        Clause::AnyBand { measure, bands } => {
            let column = format!("{alias}.{}", measure.column());
            qb.push("(");
            for (i, band) in bands.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_band(qb, &column, band);
            }
            qb.push(")");
        }
        Clause::OneOf { facet, values } => {
            qb.push(format!("{alias}.{} = ANY(", facet.column()))
                .push_bind(values.clone())
                .push(")");
        }
    }
}

fn push_band(qb: &mut QueryBuilder<'_, Postgres>, column: &str, band: &Band) {
    qb.push(format!("({column} >= ")).push_bind(band.lower);
    if let Some(upper) = band.upper {
        qb.push(format!(" AND {column} < ")).push_bind(upper);
    }
    qb.push(")");
}
