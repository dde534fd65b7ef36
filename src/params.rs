//! Run parameters and run identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Parameter key injected by the launcher for jobs with a run-id incrementer.
pub const RUN_ID_KEY: &str = "run.id";

/// A typed job parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamValue {
    String(String),
    Int(i32),
    Long(i64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Long(l) => write!(f, "{}", l),
        }
    }
}

/// An immutable mapping from parameter name to typed value, supplied at
/// job submission.
///
/// Two submissions with the same job name and equal parameters denote the
/// same run instance. The map is ordered so identity comparison and the
/// run-log representation are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunParameters {
    values: BTreeMap<String, ParamValue>,
}

impl RunParameters {
    /// Start building a parameter set.
    pub fn builder() -> RunParametersBuilder {
        RunParametersBuilder::default()
    }

    /// Look up a string parameter.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ParamValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up an integer parameter.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key) {
            Some(ParamValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Look up a long parameter. Int values widen.
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ParamValue::Long(l)) => Some(*l),
            Some(ParamValue::Int(i)) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// True if no parameters were supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of these parameters with `run.id` set.
    ///
    /// Used by the launcher to force a fresh run identity for jobs built
    /// with an incrementer.
    pub(crate) fn with_run_id(&self, run_id: i64) -> Self {
        let mut values = self.values.clone();
        values.insert(RUN_ID_KEY.to_string(), ParamValue::Long(run_id));
        Self { values }
    }
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "{{")?;
        for (key, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        write!(f, "}}")
    }
}

/// Builder for [`RunParameters`].
#[derive(Debug, Default)]
pub struct RunParametersBuilder {
    values: BTreeMap<String, ParamValue>,
}

impl RunParametersBuilder {
    pub fn string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(key.into(), ParamValue::String(value.into()));
        self
    }

    pub fn int(mut self, key: impl Into<String>, value: i32) -> Self {
        self.values.insert(key.into(), ParamValue::Int(value));
        self
    }

    pub fn long(mut self, key: impl Into<String>, value: i64) -> Self {
        self.values.insert(key.into(), ParamValue::Long(value));
        self
    }

    pub fn build(self) -> RunParameters {
        RunParameters {
            values: self.values,
        }
    }
}

/// The uniqueness key distinguishing one run instance from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentity {
    job_name: String,
    parameters: RunParameters,
}

impl RunIdentity {
    pub fn new(job_name: impl Into<String>, parameters: RunParameters) -> Self {
        Self {
            job_name: job_name.into(),
            parameters,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.parameters
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.job_name, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_parameters_yield_equal_identities() {
        let a = RunParameters::builder()
            .string("source", "orgs.csv")
            .long("min.employees", 1000)
            .build();
        let b = RunParameters::builder()
            .long("min.employees", 1000)
            .string("source", "orgs.csv")
            .build();

        assert_eq!(
            RunIdentity::new("import", a),
            RunIdentity::new("import", b)
        );
    }

    #[test]
    fn run_id_forces_a_new_identity() {
        let params = RunParameters::builder().long("min.employees", 1000).build();
        let first = RunIdentity::new("import", params.with_run_id(1));
        let second = RunIdentity::new("import", params.with_run_id(2));

        assert_ne!(first, second);
    }

    #[test]
    fn int_widens_to_long() {
        let params = RunParameters::builder().int("chunk", 500).build();
        assert_eq!(params.get_long("chunk"), Some(500));
        assert_eq!(params.get_int("chunk"), Some(500));
        assert_eq!(params.get_string("chunk"), None);
    }
}
