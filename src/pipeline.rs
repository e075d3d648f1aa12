use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use crate::error::{FailureKind, ProcessorFailure};
use crate::message::Message;
use crate::processors::{ProcessResult, Processor};

/// A processor's result paired with the processor's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub processor: String,
    pub result: ProcessResult,
}

/// Run every processor against the same message, in order. A failure or
/// panic in one processor never prevents the next one from running.
pub fn dispatch(message: &Message, processors: &[Box<dyn Processor>]) -> Vec<DispatchOutcome> {
    processors
        .iter()
        .map(|processor| DispatchOutcome {
            processor: processor.name().to_string(),
            result: run_isolated(processor.as_ref(), message),
        })
        .collect()
}

fn run_isolated(processor: &dyn Processor, message: &Message) -> ProcessResult {
    match panic::catch_unwind(AssertUnwindSafe(|| processor.process(message))) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ProcessResult::Failed(ProcessorFailure::new(FailureKind::Panicked, detail))
        }
    }
}

/// Ordered list of enabled processors.
pub struct Pipeline {
    processors: Vec<Box<dyn Processor>>,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn dispatch(&self, message: &Message) -> Vec<DispatchOutcome> {
        dispatch(message, &self.processors)
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Processor names paired with the directories they write into.
    pub fn output_dirs(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.processors
            .iter()
            .filter_map(|p| p.output_dir().map(|dir| (p.name(), dir)))
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
