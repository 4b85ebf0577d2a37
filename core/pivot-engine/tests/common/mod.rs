//! FILENAME: tests/common/mod.rs
//! Fixtures for pivot-engine integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use pivot_engine::{ExecutionError, GenerationCounter, QueryExecutor, Row};
use workflow_engine::{Literal, MeasureSpec, ViewQuery};

/// Sales rows: Region x Category x Year.
pub struct SalesFixture;

impl SalesFixture {
    pub fn rows() -> Vec<Row> {
        let data = [
            ("East", "Tech", 2023.0, 10.0),
            ("East", "Tech", 2024.0, 20.0),
            ("East", "Office", 2023.0, 5.0),
            ("East", "Office", 2024.0, 7.0),
            ("West", "Tech", 2023.0, 30.0),
            ("West", "Tech", 2024.0, 1.0),
            ("West", "Office", 2023.0, 2.0),
            ("West", "Office", 2024.0, 4.0),
        ];
        data.iter()
            .map(|(region, category, year, sales)| {
                let mut row = Row::new();
                row.insert("Region".to_string(), Literal::text(*region));
                row.insert("Category".to_string(), Literal::text(*category));
                row.insert("Year".to_string(), Literal::Number(*year));
                row.insert("Sales".to_string(), Literal::Number(*sales));
                row
            })
            .collect()
    }

    pub fn sales_sum() -> MeasureSpec {
        MeasureSpec::new("Sales", "sum")
    }
}

/// Executes view queries over an in-memory table, summing measures.
pub struct MemoryExecutor {
    rows: Vec<Row>,
    fail_group_by: Option<Vec<String>>,
    panic_group_by: Option<Vec<String>>,
    advance_on_call: Option<GenerationCounter>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ViewQuery>>,
}

impl MemoryExecutor {
    pub fn new(rows: Vec<Row>) -> Self {
        MemoryExecutor {
            rows,
            fail_group_by: None,
            panic_group_by: None,
            advance_on_call: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, group_by: &[&str]) -> Self {
        self.fail_group_by = Some(group_by.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn panicking_on(mut self, group_by: &[&str]) -> Self {
        self.panic_group_by = Some(group_by.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Starts a newer batch whenever a query runs.
    pub fn advancing(mut self, counter: GenerationCounter) -> Self {
        self.advance_on_call = Some(counter);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ViewQuery> {
        self.seen.lock().unwrap().clone()
    }

    fn run(&self, query: &ViewQuery) -> Result<Vec<Row>, ExecutionError> {
        let ViewQuery::Aggregate { group_by, measures } = query else {
            return Ok(self.rows.clone());
        };
        if self.fail_group_by.as_ref() == Some(group_by) {
            return Err(ExecutionError::Failed(format!("cannot group by {:?}", group_by)));
        }
        if self.panic_group_by.as_ref() == Some(group_by) {
            panic!("executor crashed on {:?}", group_by);
        }

        let mut groups: Vec<(Vec<Literal>, Vec<f64>)> = Vec::new();
        for row in &self.rows {
            let key: Vec<Literal> = group_by.iter().map(|fid| row[fid].clone()).collect();
            let values: Vec<f64> = measures
                .iter()
                .map(|m| row.get(&m.field).and_then(Literal::as_f64).unwrap_or(0.0))
                .collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, sums)) => sums.iter_mut().zip(values).for_each(|(s, v)| *s += v),
                None => groups.push((key, values)),
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, sums)| {
                let mut out = Row::new();
                for (fid, value) in group_by.iter().zip(key) {
                    out.insert(fid.clone(), value);
                }
                for (measure, sum) in measures.iter().zip(sums) {
                    out.insert(measure.as_field_key.clone(), Literal::Number(sum));
                }
                out
            })
            .collect())
    }
}

impl QueryExecutor for MemoryExecutor {
    fn execute(
        &self,
        query: ViewQuery,
    ) -> impl Future<Output = Result<Vec<Row>, ExecutionError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(query.clone());
        if let Some(counter) = &self.advance_on_call {
            counter.advance();
        }
        let result = self.run(&query);
        async move { result }
    }
}
