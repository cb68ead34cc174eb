//! Pipeline stage abstraction
//!
//! A stage turns one input item into zero or more output items. Pure 1:1
//! transforms, 1:N transforms, and terminal side effects all fit the same
//! trait through the adapters below, so stages can be unit-tested on their
//! own and chained at run time.

use std::marker::PhantomData;

use crate::error::{IngestError, Result};
use crate::filter::StreamFilter;

/// One unit of work in a [`Pipeline`](super::Pipeline)
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used for the worker thread and in logs
    fn name(&self) -> &str;

    /// Process one item, handing each produced item to `emit`
    fn process(&mut self, input: Self::Input, emit: &mut dyn FnMut(Self::Output)) -> Result<()>;

    /// Called once after the input queue is closed and drained.
    ///
    /// Stages with internal state flush it here and report a truncated input
    /// as [`IngestError::IncompleteStream`].
    fn finish(&mut self, _emit: &mut dyn FnMut(Self::Output)) -> Result<()> {
        Ok(())
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    type Input = S::Input;
    type Output = S::Output;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&mut self, input: Self::Input, emit: &mut dyn FnMut(Self::Output)) -> Result<()> {
        (**self).process(input, emit)
    }

    fn finish(&mut self, emit: &mut dyn FnMut(Self::Output)) -> Result<()> {
        (**self).finish(emit)
    }
}

/// Boxed byte-chunk stage, used when the stage list is decided at run time
pub type ByteStage = Box<dyn Stage<Input = Vec<u8>, Output = Vec<u8>>>;

/// 1:1 transform
pub struct Map<I, O, F> {
    name: String,
    func: F,
    _types: PhantomData<fn(I) -> O>,
}

pub fn map<I, O, F>(name: impl Into<String>, func: F) -> Map<I, O, F>
where
    F: FnMut(I) -> O + Send + 'static,
{
    Map {
        name: name.into(),
        func,
        _types: PhantomData,
    }
}

impl<I, O, F> Stage for Map<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> O + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: I, emit: &mut dyn FnMut(O)) -> Result<()> {
        emit((self.func)(input));
        Ok(())
    }
}

/// 1:N transform with access to the emitter
pub struct FlatMap<I, O, F> {
    name: String,
    func: F,
    _types: PhantomData<fn(I) -> O>,
}

pub fn flat_map<I, O, F>(name: impl Into<String>, func: F) -> FlatMap<I, O, F>
where
    F: FnMut(I, &mut dyn FnMut(O)) -> Result<()> + Send + 'static,
{
    FlatMap {
        name: name.into(),
        func,
        _types: PhantomData,
    }
}

impl<I, O, F> Stage for FlatMap<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I, &mut dyn FnMut(O)) -> Result<()> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: I, emit: &mut dyn FnMut(O)) -> Result<()> {
        (self.func)(input, emit)
    }
}

/// Terminal side effect
pub struct Sink<I, F> {
    name: String,
    func: F,
    _types: PhantomData<fn(I)>,
}

pub fn sink<I, F>(name: impl Into<String>, func: F) -> Sink<I, F>
where
    F: FnMut(I) -> Result<()> + Send + 'static,
{
    Sink {
        name: name.into(),
        func,
        _types: PhantomData,
    }
}

impl<I, F> Stage for Sink<I, F>
where
    I: Send + 'static,
    F: FnMut(I) -> Result<()> + Send + 'static,
{
    type Input = I;
    type Output = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: I, _emit: &mut dyn FnMut(())) -> Result<()> {
        (self.func)(input)
    }
}

/// Runs a [`StreamFilter`] over byte chunks, checking completeness at the end
pub struct FilterStage<F> {
    filter: F,
}

impl<F: StreamFilter + 'static> FilterStage<F> {
    pub fn new(filter: F) -> Self {
        Self { filter }
    }

    pub fn boxed(filter: F) -> ByteStage {
        Box::new(Self::new(filter))
    }
}

impl<F: StreamFilter + 'static> Stage for FilterStage<F> {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        self.filter.name()
    }

    fn process(&mut self, input: Vec<u8>, emit: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
        let out = self.filter.feed(&input)?;
        if !out.is_empty() {
            emit(out);
        }
        Ok(())
    }

    fn finish(&mut self, emit: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
        let out = self.filter.feed(&[])?;
        if !out.is_empty() {
            emit(out);
        }
        if self.filter.finished() {
            Ok(())
        } else {
            Err(IngestError::incomplete(self.filter.name()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn run<S: Stage>(stage: &mut S, inputs: Vec<S::Input>) -> Result<Vec<S::Output>> {
        let mut out = Vec::new();
        for input in inputs {
            stage.process(input, &mut |o| out.push(o))?;
        }
        stage.finish(&mut |o| out.push(o))?;
        Ok(out)
    }

    /// Holds back everything until it sees a terminating zero byte
    struct UntilZero {
        seen_zero: bool,
        pending: Vec<u8>,
    }

    impl StreamFilter for UntilZero {
        fn name(&self) -> &'static str {
            "until-zero"
        }

        fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
            self.pending.extend_from_slice(input);
            if self.pending.contains(&0) {
                self.seen_zero = true;
                self.pending.retain(|&b| b != 0);
                return Ok(std::mem::take(&mut self.pending));
            }
            Ok(Vec::new())
        }

        fn finished(&self) -> bool {
            self.seen_zero && self.pending.is_empty()
        }
    }

    #[test]
    fn test_map_is_one_to_one() {
        let mut stage = map("double", |x: i32| x * 2);
        assert_eq!(run(&mut stage, vec![1, 2, 3]).unwrap(), vec![2, 4, 6]);
        assert_eq!(stage.name(), "double");
    }

    #[test]
    fn test_flat_map_emits_many_or_none() {
        let mut stage = flat_map("repeat", |x: usize, emit: &mut dyn FnMut(usize)| {
            for _ in 0..x {
                emit(x);
            }
            Ok(())
        });
        assert_eq!(run(&mut stage, vec![0, 2, 1]).unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn test_sink_propagates_errors() {
        let mut stage = sink("reject-odd", |x: u8| {
            if x % 2 == 1 {
                Err(IngestError::config(format!("odd {}", x)))
            } else {
                Ok(())
            }
        });
        assert!(run(&mut stage, vec![2, 4]).is_ok());
        assert!(run(&mut stage, vec![2, 3]).is_err());
    }

    #[test]
    fn test_filter_stage_reports_incomplete_input() {
        let mut stage = FilterStage::new(UntilZero {
            seen_zero: false,
            pending: Vec::new(),
        });
        let err = run(&mut stage, vec![b"abc".to_vec()]).unwrap_err();
        assert!(matches!(err, IngestError::IncompleteStream { stage: "until-zero" }));

        let mut stage = FilterStage::new(UntilZero {
            seen_zero: false,
            pending: Vec::new(),
        });
        let out = run(&mut stage, vec![b"ab".to_vec(), b"c\0".to_vec()]).unwrap();
        assert_eq!(out, vec![b"abc".to_vec()]);
    }
}
