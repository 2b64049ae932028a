//! # Magnet script interpreter module
//!
//! This module provides an interpreter for magnet scripts, allowing requests to be executed at
//! fixed times after the start of the session. Each entry in a script is
//!
//! ```text
//! <seconds>: <request>;
//! ```
//!
//! for example `5.0: set radius 0.5;`. Anything not matching this form (such as `#` comments) is
//! ignored.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use magnet_if::request::{Request, RequestError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const ENTRY_PATTERN: &str = r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A request which is scripted to occur at a specific time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedRequest {
    /// The time the request is supposed to execute at
    pub exec_time_s: f64,

    /// The request to run
    pub request: Request,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending` to
/// acquire a list of requests that need executing.
#[derive(Debug)]
pub struct ScriptInterpreter {
    script_path: PathBuf,
    requests: VecDeque<ScriptedRequest>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid timestamp: {0}. Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Could not build the script pattern: {0}")]
    PatternError(regex::Error),

    #[error("Script contains an invalid request at {0} s: {1}")]
    InvalidRequest(f64, RequestError),
}

#[derive(Debug, PartialEq)]
pub enum PendingRequests {
    None,
    Some(Vec<Request>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => return Err(ScriptError::ScriptLoadError(e)),
        };

        let requests = parse_script(&script)?;

        Ok(ScriptInterpreter {
            script_path: path,
            requests,
        })
    }

    /// Create an interpreter directly from the text of a script.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {
        Ok(ScriptInterpreter {
            script_path: PathBuf::new(),
            requests: parse_script(script)?,
        })
    }

    /// Return the requests which are due at `elapsed_s` seconds into the session.
    pub fn get_pending(&mut self, elapsed_s: f64) -> PendingRequests {
        // If the queue is empty the script is over
        if self.requests.is_empty() {
            return PendingRequests::EndOfScript;
        }

        let mut due = vec![];

        while let Some(front) = self.requests.front() {
            if front.exec_time_s > elapsed_s {
                break;
            }
            if let Some(r) = self.requests.pop_front() {
                due.push(r.request);
            }
        }

        if due.is_empty() {
            PendingRequests::None
        } else {
            PendingRequests::Some(due)
        }
    }

    /// Get the number of requests remaining in the script
    pub fn get_num_requests(&self) -> usize {
        self.requests.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.requests.back() {
            Some(r) => r.exec_time_s,
            None => 0f64,
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_script(script: &str) -> Result<VecDeque<ScriptedRequest>, ScriptError> {
    let re = match RegexBuilder::new(ENTRY_PATTERN).multi_line(true).build() {
        Ok(r) => r,
        Err(e) => return Err(ScriptError::PatternError(e)),
    };

    let mut requests: Vec<ScriptedRequest> = vec![];

    for cap in re.captures_iter(script) {
        let time_str = cap.get(1).map_or("", |m| m.as_str());
        let exec_time_s: f64 = match time_str.parse() {
            Ok(t) => t,
            Err(e) => return Err(ScriptError::InvalidTimestamp(format!("{}: {}", time_str, e))),
        };

        let request = match Request::parse(cap.get(3).map_or("", |m| m.as_str())) {
            Ok(r) => r,
            Err(e) => return Err(ScriptError::InvalidRequest(exec_time_s, e)),
        };

        requests.push(ScriptedRequest {
            exec_time_s,
            request,
        });
    }

    if requests.is_empty() {
        return Err(ScriptError::ScriptEmpty);
    }

    // Entries may be written out of order, execution must not be
    requests.sort_by(|a, b| {
        a.exec_time_s
            .partial_cmp(&b.exec_time_s)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(requests.into())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use magnet_if::quantity::{Quantity, QuantityValue, VectorAttr};

    const SCRIPT: &str = "\
# Sweep the radius at a fixed angle
0.0: set constant_theta 90;
5.0: set radius 0.5;
5.0: get radius;
60: stop;
";

    #[test]
    fn test_parse_script() -> Result<(), ScriptError> {
        let si = ScriptInterpreter::from_script(SCRIPT)?;
        assert_eq!(si.get_num_requests(), 4);
        assert_eq!(si.get_duration(), 60.0);
        Ok(())
    }

    #[test]
    fn test_pending() -> Result<(), ScriptError> {
        let mut si = ScriptInterpreter::from_script(SCRIPT)?;

        assert_eq!(
            si.get_pending(0.1),
            PendingRequests::Some(vec![Request::Set(
                Quantity::Vector(VectorAttr::ConstantTheta),
                QuantityValue::Float(90.0)
            )])
        );
        assert_eq!(si.get_pending(4.9), PendingRequests::None);

        match si.get_pending(5.0) {
            PendingRequests::Some(r) => assert_eq!(r.len(), 2),
            p => panic!("Expected two requests, got {:?}", p),
        }

        assert_eq!(si.get_pending(100.0), PendingRequests::Some(vec![Request::Stop]));
        assert_eq!(si.get_pending(101.0), PendingRequests::EndOfScript);

        Ok(())
    }

    #[test]
    fn test_script_errors() {
        assert!(matches!(
            ScriptInterpreter::from_script("# nothing here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_script("1.0: set radius fast;"),
            Err(ScriptError::InvalidRequest(t, _)) if t == 1.0
        ));
        assert!(matches!(
            ScriptInterpreter::new("/no/such/script.ms"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
