//! Console output utilities
//!
//! This module prints run summaries for the command line tool.

use std::time::Duration;

use crate::output::Cohort;
use crate::study::StudyDefinition;

/// Print the size of a cohort and how often each column is populated
pub fn print_cohort_summary(cohort: &Cohort, elapsed: Duration) {
    println!("Produced {} rows in {:?}", cohort.len(), elapsed);
    if cohort.is_empty() {
        return;
    }
    println!("Columns:");
    for (index, column) in cohort.columns.iter().enumerate() {
        let present = cohort
            .rows
            .iter()
            .filter(|r| !r.values[index].is_null())
            .count();
        println!(
            "  - {} ({}): {present} non-null ({:.1}%)",
            column.name,
            column.shape,
            100.0 * present as f64 / cohort.len() as f64
        );
    }
}

/// Print every declaration with the variables it depends on
pub fn print_dependencies(definition: &StudyDefinition) {
    println!("Declarations in evaluation order:");
    for (name, depends_on) in definition.dependencies() {
        if depends_on.is_empty() {
            println!("  {name}");
        } else {
            println!("  {name} <- {}", depends_on.join(", "));
        }
    }
    println!("  population: {}", definition.population().predicate);
}
