use crate::statement::{Operation, Parameters, Statement, label_fragment, quote};

/// Counts nodes carrying every one of `labels`.
pub fn count_by_labels(labels: &[String]) -> Statement {
    Statement::new(
        format!("MATCH (n{}) RETURN COUNT(n)", label_fragment(labels)),
        Parameters::new(),
        Operation::Count {
            labels: labels.to_vec(),
        },
    )
}

pub fn count_relationships(rel_type: &str) -> Statement {
    Statement::new(
        format!("MATCH ()-[r0:{}]->() RETURN COUNT(r0)", quote(rel_type)),
        Parameters::new(),
        Operation::CountRelationships {
            rel_type: rel_type.to_string(),
        },
    )
}
