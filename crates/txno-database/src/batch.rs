//! Pending statement batch.

use crate::SqlValue;

/// Statements queued on a transaction but not yet sent to the database.
///
/// Consecutive statements with the same SQL are grouped so an adapter can
/// prepare once and bind many times.
#[derive(Debug, Default)]
pub struct BatchedStatements {
    groups: Vec<(String, Vec<Vec<SqlValue>>)>,
    len: usize,
}

impl BatchedStatements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sql: &str, params: Vec<SqlValue>) {
        match self.groups.last_mut() {
            Some((last_sql, rows)) if last_sql == sql => rows.push(params),
            _ => self.groups.push((sql.to_string(), vec![params])),
        }
        self.len += 1;
    }

    /// Number of queued statements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Take every queued statement, grouped by SQL, in insertion order.
    pub fn take(&mut self) -> Vec<(String, Vec<Vec<SqlValue>>)> {
        self.len = 0;
        std::mem::take(&mut self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_statements_share_a_group() {
        let mut batch = BatchedStatements::new();
        batch.push("INSERT A", vec![SqlValue::Integer(1)]);
        batch.push("INSERT A", vec![SqlValue::Integer(2)]);
        batch.push("INSERT B", vec![]);
        batch.push("INSERT A", vec![SqlValue::Integer(3)]);

        assert_eq!(batch.len(), 4);
        let groups = batch.take();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[2].0, "INSERT A");
        assert!(batch.is_empty());
    }
}
