//! Materializing and running forked test cases.

use crate::error::{CaseOutcome, ForkcaseError, PathEntry, Report, Result};
use crate::fork::chain::Chain;
use crate::fork::{ForkItem, Forker};
use crate::kit::{Slot, TestKit, Var};
use std::any::Any;
use std::fmt;
use std::ops::RangeInclusive;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Which generated cases to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunConfig {
    /// 1-based case indices to skip; single indices are one-element ranges.
    pub skip: Vec<RangeInclusive<usize>>,

    /// Run only this case.
    pub only: Option<usize>,

    /// Stop materializing after this many cases.
    pub limit: Option<usize>,

    /// Stop at the first failing case.
    pub fail_fast: bool,
}

impl RunConfig {
    pub fn with_skip(mut self, index: usize) -> Self {
        self.skip.push(index..=index);
        self
    }

    pub fn with_skip_range(mut self, range: RangeInclusive<usize>) -> Self {
        self.skip.push(range);
        self
    }

    pub fn with_only(mut self, index: usize) -> Self {
        self.only = Some(index);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Defaults overlaid with `FORKCASE_ONLY` and `FORKCASE_SKIP`
    /// (`3,7-9`).
    pub fn from_env() -> Result<Self> {
        let mut config = RunConfig::default();
        if let Ok(only) = std::env::var("FORKCASE_ONLY") {
            config.only = Some(parse_index(&only)?);
        }
        if let Ok(skip) = std::env::var("FORKCASE_SKIP") {
            config.skip.extend(parse_skip_list(&skip)?);
        }
        Ok(config)
    }

    pub fn is_skipped(&self, index: usize) -> bool {
        if let Some(only) = self.only {
            if only != index {
                return true;
            }
        }
        self.skip.iter().any(|range| range.contains(&index))
    }
}

fn parse_index(text: &str) -> Result<usize> {
    text.trim()
        .parse()
        .map_err(|_| ForkcaseError::usage(format!("not a case index: {:?}", text)))
}

/// Parse `n` and `a-b` items separated by commas.
pub fn parse_skip_list(text: &str) -> Result<Vec<RangeInclusive<usize>>> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_index(lo)?, parse_index(hi)?);
                if lo > hi {
                    return Err(ForkcaseError::usage(format!("empty skip range: {}", item)));
                }
                Ok(lo..=hi)
            }
            None => parse_index(item).map(|index| index..=index),
        })
        .collect()
}

/// One materialized case: the ordered slots the body consumes on replay.
#[derive(Clone)]
pub struct Case {
    pub index: usize,
    pub name: String,
    slots: Vec<Slot>,
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl Case {
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Replay `body` on this case's slots.
    ///
    /// Errors and panics of the body are caught here and turned into a
    /// failed outcome carrying the execute path. Deferred cleanups always run.
    pub fn run<F>(&self, body: &F) -> CaseOutcome
    where
        F: Fn(&mut TestKit) -> Result<()>,
    {
        let mut kit = TestKit::executor(self.slots.clone());
        let outcome = catch_unwind(AssertUnwindSafe(|| body(&mut kit)))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        let (mut runtime, finished) = kit.finish();
        let outcome = outcome.and(finished);
        let cleanup = catch_unwind(AssertUnwindSafe(|| runtime.run_defers()))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        let path = runtime.take_path();
        match outcome.and(cleanup) {
            Ok(()) => {
                tracing::debug!(index = self.index, name = %self.name, "case passed");
                CaseOutcome::Pass {
                    index: self.index,
                    name: self.name.clone(),
                }
            }
            Err(error) => {
                tracing::debug!(index = self.index, name = %self.name, error = %error, "case failed");
                self.failure(error, path)
            }
        }
    }

    fn failure(&self, error: ForkcaseError, path: Vec<PathEntry>) -> CaseOutcome {
        CaseOutcome::Fail {
            index: self.index,
            name: self.name.clone(),
            error: error.to_string(),
            path,
        }
    }
}

/// Turn a caught panic payload into an error.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> ForkcaseError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    };
    ForkcaseError::failed(format!("panicked: {}", message))
}

/// Run `body` in the build phase and enumerate its cases.
///
/// Build-phase errors are usage errors of the body and are returned at once.
pub fn case_forker<F>(body: &F) -> Result<Forker<Case>>
where
    F: Fn(&mut TestKit) -> Result<()>,
{
    let mut kit = TestKit::builder();
    body(&mut kit)?;
    let name: Option<Var<String>> = kit.name().cloned();
    let forkers = kit.into_forkers()?;
    tracing::debug!(forkers = forkers.len(), "test body built");

    let product = Chain::of(forkers).build();
    let forker = Forker::from_fn(move |context| {
        let name = name.clone();
        // error items are not cases and take no index
        let mut count = 0;
        product.do_fork(context).map(move |item| {
            count += 1;
            let index = count;
            let name = match name.as_ref().map(|name| name.eval_in(&item.context)) {
                Some(Ok(name)) => name,
                Some(Err(error)) => {
                    tracing::warn!(index, %error, "case name could not be rendered");
                    format!("c_{}", index)
                }
                None => format!("c_{}", index),
            };
            let case = Case {
                index,
                name,
                slots: item.value,
            };
            ForkItem::new(item.context, case)
        })
    });
    Ok(forker.named("cases"))
}

/// A test body plus the configuration to run its cases with.
pub struct ForkTest<F> {
    name: String,
    body: F,
    config: RunConfig,
}

impl<F> ForkTest<F>
where
    F: Fn(&mut TestKit) -> Result<()>,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        ForkTest {
            name: name.into(),
            body,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cases(&self) -> Result<Forker<Case>> {
        case_forker(&self.body)
    }

    /// Run every case not excluded by the configuration.
    pub fn run(&self) -> Result<Report> {
        let mut report = Report::new(self.name.clone());
        for (count, case) in self.cases()?.fork().enumerate() {
            if self.config.limit.map_or(false, |limit| count >= limit) {
                break;
            }
            let case = case?.value;
            if self.config.is_skipped(case.index) {
                tracing::debug!(index = case.index, name = %case.name, "case skipped");
                report.outcomes.push(CaseOutcome::Skipped {
                    index: case.index,
                    name: case.name,
                });
                continue;
            }
            let outcome = case.run(&self.body);
            let failed = outcome.is_failure();
            report.outcomes.push(outcome);
            if failed && self.config.fail_fast {
                break;
            }
        }
        tracing::info!(
            test = %self.name,
            cases = report.outcomes.len(),
            passed = report.passed(),
            "forked test finished"
        );
        Ok(report)
    }
}

/// Run a forked test with the environment's configuration and panic with
/// the rendered report if any case fails.
pub fn fork_test<F>(name: &str, body: F)
where
    F: Fn(&mut TestKit) -> Result<()>,
{
    let report = RunConfig::from_env()
        .and_then(|config| ForkTest::new(name, body).with_config(config).run());
    match report {
        Ok(report) => report.assert_success(),
        Err(error) => panic!("{}: {}", name, error),
    }
}
