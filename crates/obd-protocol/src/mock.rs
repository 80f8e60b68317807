//! Scripted parameter source for tests and simulations

use crate::error::ObdError;
use crate::pid::ParameterId;
use crate::source::ParameterSource;
use std::collections::{HashMap, VecDeque};

/// What the scripted source answers for one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scripted {
    /// Successful read with this value
    Value(f64),
    /// ECU answered `NO DATA`
    NoData,
    /// Link failure
    Transport,
    /// Never completes; the caller's timeout has to fire
    Hang,
}

/// A `ParameterSource` that answers from per-parameter scripts.
///
/// Queued answers are consumed first; once a queue is empty the parameter's
/// steady answer is used, and parameters with neither answer `NoData`.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queued: HashMap<ParameterId, VecDeque<Scripted>>,
    steady: HashMap<ParameterId, Scripted>,
    reads: Vec<ParameterId>,
    reconnects: usize,
    fail_reconnect: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `value` for `parameter` from now on
    pub fn set(&mut self, parameter: ParameterId, value: f64) -> &mut Self {
        self.steady.insert(parameter, Scripted::Value(value));
        self
    }

    /// Answer `answer` for `parameter` from now on
    pub fn set_answer(&mut self, parameter: ParameterId, answer: Scripted) -> &mut Self {
        self.steady.insert(parameter, answer);
        self
    }

    /// Queue one-shot answers ahead of the steady answer
    pub fn push(&mut self, parameter: ParameterId, answer: Scripted) -> &mut Self {
        self.queued.entry(parameter).or_default().push_back(answer);
        self
    }

    /// Make every parameter answer `answer` (e.g. a dead link)
    pub fn set_all(&mut self, answer: Scripted) -> &mut Self {
        for p in ParameterId::ALL {
            self.steady.insert(p, answer);
        }
        self
    }

    /// Make `reconnect` fail
    pub fn fail_reconnect(&mut self, fail: bool) -> &mut Self {
        self.fail_reconnect = fail;
        self
    }

    /// Parameters read so far, in call order
    pub fn reads(&self) -> &[ParameterId] {
        &self.reads
    }

    /// Number of reconnect calls
    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    fn next_answer(&mut self, parameter: ParameterId) -> Scripted {
        if let Some(answer) = self.queued.get_mut(&parameter).and_then(VecDeque::pop_front) {
            return answer;
        }
        self.steady
            .get(&parameter)
            .copied()
            .unwrap_or(Scripted::NoData)
    }
}

impl ParameterSource for ScriptedSource {
    async fn read(&mut self, parameter: ParameterId) -> Result<f64, ObdError> {
        self.reads.push(parameter);
        match self.next_answer(parameter) {
            Scripted::Value(v) => Ok(v),
            Scripted::NoData => Err(ObdError::NoData(parameter.name())),
            Scripted::Transport => Err(ObdError::AdapterNotResponding),
            Scripted::Hang => std::future::pending().await,
        }
    }

    async fn reconnect(&mut self) -> Result<(), ObdError> {
        self.reconnects += 1;
        if self.fail_reconnect {
            Err(ObdError::AdapterNotResponding)
        } else {
            Ok(())
        }
    }
}
