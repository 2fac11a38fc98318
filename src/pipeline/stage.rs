use async_trait::async_trait;

use crate::report::classify::ItemError;

/// What a stage hands to the next one.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<O> {
    /// Continue with this value.
    Proceed(O),
    /// Stop here without failing, e.g. a check answered "no" or a row did
    /// not parse. Later stages are not run.
    Halt,
}

impl<O> Step<O> {
    pub fn map<N>(self, f: impl FnOnce(O) -> N) -> Step<N> {
        match self {
            Step::Proceed(value) => Step::Proceed(f(value)),
            Step::Halt => Step::Halt,
        }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Step::Halt)
    }
}

pub type StageResult<O> = std::result::Result<Step<O>, ItemError>;

/// One step of a per-item operation, typically a remote call.
///
/// Failures are returned as [`ItemError`]s and are terminal for the item;
/// they never abort the pipeline.
#[async_trait]
pub trait Stage<I: Send + 'static>: Send + Sync {
    type Output: Send + 'static;

    fn stage_name(&self) -> &'static str {
        "stage"
    }

    async fn run(&self, input: I) -> StageResult<Self::Output>;
}
