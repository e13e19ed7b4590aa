use serde::Serialize;
use thiserror::Error;

use crate::attributes::{AttributeRegistry, ResolvedAttribute};
use crate::config::{Config, FailurePolicy};
use crate::datasource::{Datasource, DatasourceError};
use crate::interrupt::InterruptFlag;
use crate::repository::RepositoryTarget;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttributeContribution {
    pub name: String,
    pub raw: f64,      // Value returned by the attribute
    pub weight: f64,   // Configured weight
    pub weighted: f64, // raw * weight, added to the total
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum SkipReason {
    Disabled,
    Unresolved,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedAttribute {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScoreBreakdown {
    pub contributions: Vec<AttributeContribution>,
    pub skipped: Vec<SkippedAttribute>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreResult {
    pub total: f64,
    pub breakdown: ScoreBreakdown,
    /// Cursors handed out during the run (one per invoked attribute)
    pub cursors_issued: u64,
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("the {name} attribute failed: {reason}")]
    AttributeFailed { name: String, reason: String },

    #[error("scoring interrupted")]
    Interrupted,

    #[error(transparent)]
    Datasource(#[from] DatasourceError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Connect(DatasourceError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Drives attribute invocation over one datasource connection
#[derive(Debug, Clone)]
pub struct Scorer<'a> {
    target: &'a RepositoryTarget,
    policy: FailurePolicy,
    interrupt: InterruptFlag,
}

impl<'a> Scorer<'a> {
    pub fn new(target: &'a RepositoryTarget) -> Self {
        Self {
            target,
            policy: FailurePolicy::default(),
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Invoke every resolved attribute in order and sum `result * weight`.
    ///
    /// Takes ownership of the datasource and closes it before returning, on
    /// success, on an aborting attribute failure and on interrupt alike.
    pub fn score(
        &self,
        datasource: Datasource,
        attributes: &[ResolvedAttribute<'_>],
    ) -> Result<ScoreResult, ScoreError> {
        let outcome = self.accumulate(&datasource, attributes);
        let cursors_issued = datasource.cursors_issued();
        let closed = datasource.close();

        match (outcome, closed) {
            (Ok((total, breakdown)), Ok(())) => Ok(ScoreResult {
                total,
                breakdown,
                cursors_issued,
            }),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!("{}", close_err);
                }
                Err(e)
            }
        }
    }

    fn accumulate(
        &self,
        datasource: &Datasource,
        attributes: &[ResolvedAttribute<'_>],
    ) -> Result<(f64, ScoreBreakdown), ScoreError> {
        let mut total = 0.0;
        let mut breakdown = ScoreBreakdown::default();

        for attribute in attributes {
            if self.interrupt.is_set() {
                return Err(ScoreError::Interrupted);
            }

            let name = attribute.name().to_string();
            let spec = attribute.spec;

            if !spec.enabled {
                breakdown.skipped.push(SkippedAttribute {
                    name,
                    reason: SkipReason::Disabled,
                });
                continue;
            }
            let Some(implementation) = attribute.implementation() else {
                breakdown.skipped.push(SkippedAttribute {
                    name,
                    reason: SkipReason::Unresolved,
                });
                continue;
            };

            let mut cursor = datasource.cursor();
            tracing::debug!(attribute = %name, cursor = cursor.id(), "Running attribute");
            let outcome = implementation
                .run(self.target, &mut cursor, &spec.options)
                .and_then(|raw| {
                    if !raw.is_finite() {
                        anyhow::bail!("returned a non-finite result ({})", raw);
                    }
                    let weighted = raw * spec.weight;
                    if !weighted.is_finite() || !(total + weighted).is_finite() {
                        anyhow::bail!("weighted result {} x {} overflows the total", raw, spec.weight);
                    }
                    Ok((raw, weighted))
                });
            drop(cursor);

            match outcome {
                Ok((raw, weighted)) => {
                    total += weighted;
                    tracing::debug!(attribute = %name, raw, weight = spec.weight, weighted, "Attribute scored");
                    breakdown.contributions.push(AttributeContribution {
                        name,
                        raw,
                        weight: spec.weight,
                        weighted,
                    });
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    match self.policy {
                        FailurePolicy::Abort => {
                            return Err(ScoreError::AttributeFailed { name, reason });
                        }
                        FailurePolicy::Skip => {
                            tracing::warn!("The {} attribute failed and was skipped: {}", name, reason);
                            breakdown.skipped.push(SkippedAttribute {
                                name,
                                reason: SkipReason::Failed(reason),
                            });
                        }
                    }
                }
            }
        }

        // An interrupt raised during the last attribute still fails the run
        if self.interrupt.is_set() {
            return Err(ScoreError::Interrupted);
        }

        Ok((total, breakdown))
    }
}

/// Score a repository end to end: connect, resolve attributes, invoke them, close.
///
/// The connection is opened before any attribute is resolved, so a bad
/// datasource fails the run without touching the registry.
pub fn score_repository(
    config: &Config,
    target: &RepositoryTarget,
    registry: &AttributeRegistry,
    interrupt: &InterruptFlag,
) -> Result<ScoreResult, RunError> {
    let datasource = Datasource::connect(&config.options.datasource).map_err(RunError::Connect)?;
    let attributes = registry.resolve(&config.attributes);

    let result = Scorer::new(target)
        .with_policy(config.options.on_attribute_error)
        .with_interrupt(interrupt.clone())
        .score(datasource, &attributes)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::config::{AttributeOptions, AttributeSpec, Options};
    use crate::datasource::Cursor;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Returns a fixed value and records the id of every cursor it was given
    struct Recording {
        value: f64,
        cursors: Rc<RefCell<Vec<u64>>>,
    }

    impl Attribute for Recording {
        fn run(
            &self,
            _target: &RepositoryTarget,
            cursor: &mut Cursor<'_>,
            _options: &AttributeOptions,
        ) -> anyhow::Result<f64> {
            self.cursors.borrow_mut().push(cursor.id());
            Ok(self.value)
        }
    }

    struct Failing;

    impl Attribute for Failing {
        fn run(
            &self,
            _target: &RepositoryTarget,
            _cursor: &mut Cursor<'_>,
            _options: &AttributeOptions,
        ) -> anyhow::Result<f64> {
            anyhow::bail!("query exploded")
        }
    }

    /// Raises the interrupt flag while running, like a Ctrl+C mid-attribute
    struct Interrupting(InterruptFlag);

    impl Attribute for Interrupting {
        fn run(
            &self,
            _target: &RepositoryTarget,
            _cursor: &mut Cursor<'_>,
            _options: &AttributeOptions,
        ) -> anyhow::Result<f64> {
            self.0.trigger();
            Ok(1.0)
        }
    }

    /// Takes and keeps an exclusive write lock on the database, then fails
    /// or raises the interrupt flag. The lock is only released by closing
    /// the connection.
    struct Locking(Option<InterruptFlag>);

    impl Attribute for Locking {
        fn run(
            &self,
            _target: &RepositoryTarget,
            cursor: &mut Cursor<'_>,
            _options: &AttributeOptions,
        ) -> anyhow::Result<f64> {
            cursor.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |row| {
                row.get::<_, String>(0)
            })?;
            cursor.execute("INSERT INTO t VALUES (1)", [])?;
            match &self.0 {
                Some(flag) => {
                    flag.trigger();
                    Ok(1.0)
                }
                None => anyhow::bail!("gave up holding the lock"),
            }
        }
    }

    struct Harness {
        registry: AttributeRegistry,
        cursors: Rc<RefCell<Vec<u64>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: AttributeRegistry::new(),
                cursors: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn fixed(mut self, name: &str, value: f64) -> Self {
            let cursors = self.cursors.clone();
            self.registry.register(name, move || {
                Box::new(Recording {
                    value,
                    cursors: cursors.clone(),
                })
            });
            self
        }

        fn invoked(&self) -> usize {
            self.cursors.borrow().len()
        }
    }

    fn config(attributes: Vec<AttributeSpec>) -> Config {
        Config {
            options: Options {
                datasource: json!({ "database": ":memory:" }),
                on_attribute_error: FailurePolicy::Skip,
            },
            attributes,
        }
    }

    fn target() -> RepositoryTarget {
        RepositoryTarget::new(1, ".")
    }

    fn run(config: &Config, registry: &AttributeRegistry) -> Result<ScoreResult, RunError> {
        score_repository(config, &target(), registry, &InterruptFlag::new())
    }

    #[test]
    fn test_weighted_single_attribute() {
        let harness = Harness::new().fixed("loc", 5.0);
        let config = config(vec![AttributeSpec::new("loc", 2.0)]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 10.0);
        assert_eq!(
            result.breakdown.contributions,
            vec![AttributeContribution {
                name: "loc".to_string(),
                raw: 5.0,
                weight: 2.0,
                weighted: 10.0,
            }]
        );
    }

    #[test]
    fn test_disabled_attribute_is_not_invoked() {
        let harness = Harness::new().fixed("loc", 5.0);
        let config = config(vec![AttributeSpec::new("loc", 2.0).disabled()]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 0.0);
        assert_eq!(harness.invoked(), 0);
        assert_eq!(result.cursors_issued, 0);
        assert_eq!(result.breakdown.skipped[0].reason, SkipReason::Disabled);
    }

    #[test]
    fn test_unresolved_attribute_contributes_nothing() {
        let harness = Harness::new().fixed("loc", 5.0);
        let config = config(vec![
            AttributeSpec::new("community", 10.0),
            AttributeSpec::new("loc", 1.5),
        ]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 7.5);
        assert_eq!(
            result.breakdown.skipped,
            vec![SkippedAttribute {
                name: "community".to_string(),
                reason: SkipReason::Unresolved,
            }]
        );
    }

    #[test]
    fn test_zero_enabled_attributes() {
        let harness = Harness::new().fixed("loc", 5.0);
        let config = config(vec![]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 0.0);
        assert_eq!(result.cursors_issued, 0);
        assert!(result.breakdown.contributions.is_empty());
    }

    #[test]
    fn test_sum_is_independent_of_order() {
        let harness = Harness::new()
            .fixed("a", 3.0)
            .fixed("b", 0.25)
            .fixed("c", -4.0);
        let forward = vec![
            AttributeSpec::new("a", 2.0),
            AttributeSpec::new("b", 8.0),
            AttributeSpec::new("c", 0.5),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let first = run(&config(forward), &harness.registry).unwrap();
        let second = run(&config(backward), &harness.registry).unwrap();
        // 3*2 + 0.25*8 + -4*0.5
        assert_eq!(first.total, 6.0);
        assert_eq!(second.total, first.total);
    }

    #[test]
    fn test_each_invocation_gets_its_own_cursor() {
        let harness = Harness::new().fixed("a", 1.0).fixed("b", 1.0).fixed("c", 1.0);
        let config = config(vec![
            AttributeSpec::new("a", 1.0),
            AttributeSpec::new("b", 1.0).disabled(),
            AttributeSpec::new("c", 1.0),
        ]);

        let result = run(&config, &harness.registry).unwrap();
        let cursors = harness.cursors.borrow();
        assert_eq!(*cursors, vec![1, 2]);
        assert_eq!(result.cursors_issued, 2);
    }

    #[test]
    fn test_failing_attribute_is_skipped() {
        let mut harness = Harness::new().fixed("loc", 5.0);
        harness.registry.register("broken", || Box::new(Failing));
        let config = config(vec![
            AttributeSpec::new("broken", 100.0),
            AttributeSpec::new("loc", 1.0),
        ]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 5.0);
        match &result.breakdown.skipped[0].reason {
            SkipReason::Failed(reason) => assert!(reason.contains("query exploded")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_failing_attribute_aborts() {
        let mut harness = Harness::new().fixed("loc", 5.0);
        harness.registry.register("broken", || Box::new(Failing));
        let mut config = config(vec![
            AttributeSpec::new("broken", 1.0),
            AttributeSpec::new("loc", 1.0),
        ]);
        config.options.on_attribute_error = FailurePolicy::Abort;

        let err = run(&config, &harness.registry).unwrap_err();
        match err {
            RunError::Score(ScoreError::AttributeFailed { name, reason }) => {
                assert_eq!(name, "broken");
                assert!(reason.contains("query exploded"));
            }
            other => panic!("expected attribute failure, got {:?}", other),
        }
        assert_eq!(harness.invoked(), 0);
    }

    #[test]
    fn test_non_finite_result_is_a_failure() {
        let harness = Harness::new().fixed("nan", f64::NAN).fixed("loc", 2.0);
        let config = config(vec![
            AttributeSpec::new("nan", 1.0),
            AttributeSpec::new("loc", 1.0),
        ]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 2.0);
        assert!(matches!(result.breakdown.skipped[0].reason, SkipReason::Failed(_)));
    }

    #[test]
    fn test_interrupt_stops_before_next_attribute() {
        let interrupt = InterruptFlag::new();
        let mut harness = Harness::new().fixed("loc", 5.0);
        let flag = interrupt.clone();
        harness
            .registry
            .register("ctrl-c", move || Box::new(Interrupting(flag.clone())));
        let config = config(vec![
            AttributeSpec::new("ctrl-c", 1.0),
            AttributeSpec::new("loc", 1.0),
        ]);

        let err = score_repository(&config, &target(), &harness.registry, &interrupt).unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::Interrupted)));
        assert_eq!(harness.invoked(), 0);
    }

    #[test]
    fn test_interrupt_during_last_attribute() {
        let interrupt = InterruptFlag::new();
        let mut harness = Harness::new().fixed("loc", 5.0);
        let flag = interrupt.clone();
        harness
            .registry
            .register("ctrl-c", move || Box::new(Interrupting(flag.clone())));
        let config = config(vec![
            AttributeSpec::new("loc", 1.0),
            AttributeSpec::new("ctrl-c", 1.0),
        ]);

        let err = score_repository(&config, &target(), &harness.registry, &interrupt).unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::Interrupted)));
        assert_eq!(harness.invoked(), 1);
    }

    #[test]
    fn test_interrupt_with_no_attributes() {
        let interrupt = InterruptFlag::new();
        interrupt.trigger();
        let harness = Harness::new();

        let err = score_repository(&config(vec![]), &target(), &harness.registry, &interrupt)
            .unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::Interrupted)));

        let skipped_only = config(vec![AttributeSpec::new("loc", 1.0).disabled()]);
        let err = score_repository(&skipped_only, &target(), &harness.registry, &interrupt)
            .unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::Interrupted)));
    }

    #[test]
    fn test_weighted_overflow_is_a_failure() {
        let harness = Harness::new().fixed("huge", 1e308).fixed("loc", 2.0);
        let config = config(vec![
            AttributeSpec::new("huge", 10.0),
            AttributeSpec::new("loc", 1.0),
        ]);

        let result = run(&config, &harness.registry).unwrap();
        assert_eq!(result.total, 2.0);
        match &result.breakdown.skipped[0].reason {
            SkipReason::Failed(reason) => assert!(reason.contains("overflows")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_total_overflow_is_a_failure() {
        let harness = Harness::new().fixed("a", 1e308).fixed("b", 1e308);
        let mut config = config(vec![
            AttributeSpec::new("a", 1.5),
            AttributeSpec::new("b", 1.5),
        ]);
        config.options.on_attribute_error = FailurePolicy::Abort;

        match run(&config, &harness.registry).unwrap_err() {
            RunError::Score(ScoreError::AttributeFailed { name, reason }) => {
                assert_eq!(name, "b");
                assert!(reason.contains("overflows"));
            }
            other => panic!("expected attribute failure, got {:?}", other),
        }
    }

    fn locking_database(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("lock.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();
        conn.close().unwrap();
        path
    }

    fn writable_config(path: &std::path::Path) -> Config {
        let mut config = config(vec![AttributeSpec::new("locking", 1.0)]);
        config.options.datasource = json!({
            "database": path.to_str().unwrap(),
            "read_only": false,
        });
        config
    }

    fn assert_lock_released(path: &std::path::Path) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.busy_timeout(std::time::Duration::from_millis(0)).unwrap();
        conn.execute("INSERT INTO t VALUES (2)", []).unwrap();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_connection_closed_after_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = locking_database(&dir);
        let mut registry = AttributeRegistry::new();
        registry.register("locking", || Box::new(Locking(None)));
        let mut config = writable_config(&path);
        config.options.on_attribute_error = FailurePolicy::Abort;

        let err = run(&config, &registry).unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::AttributeFailed { .. })));
        assert_lock_released(&path);
    }

    #[test]
    fn test_connection_closed_after_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = locking_database(&dir);
        let interrupt = InterruptFlag::new();
        let flag = interrupt.clone();
        let mut registry = AttributeRegistry::new();
        registry.register("locking", move || Box::new(Locking(Some(flag.clone()))));
        let config = writable_config(&path);

        let err = score_repository(&config, &target(), &registry, &interrupt).unwrap_err();
        assert!(matches!(err, RunError::Score(ScoreError::Interrupted)));
        assert_lock_released(&path);
    }

    #[test]
    fn test_bad_datasource_invokes_nothing() {
        let harness = Harness::new().fixed("loc", 5.0);
        let mut config = config(vec![AttributeSpec::new("loc", 1.0)]);
        config.options.datasource = json!({ "database": "/nonexistent/dir/ghtorrent.db" });

        let err = run(&config, &harness.registry).unwrap_err();
        assert!(matches!(err, RunError::Connect(DatasourceError::Connect { .. })));
        assert_eq!(harness.invoked(), 0);
    }

    #[test]
    fn test_scorer_directly_with_builtin_registry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        let target = RepositoryTarget::new(3, dir.path());
        let registry = AttributeRegistry::with_builtins();
        let specs = vec![AttributeSpec::new("license", 4.0)];
        let attributes = registry.resolve(&specs);
        let datasource = Datasource::connect(&json!({ "database": ":memory:" })).unwrap();

        let result = Scorer::new(&target).score(datasource, &attributes).unwrap();
        assert_eq!(result.total, 4.0);
    }
}
