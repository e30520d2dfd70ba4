//! Error types for the cluster-operations engine

use std::fmt;

/// Errors produced while running cluster operations.
///
/// Per-host failures inside one operation are joined into a single
/// `Multiple` value so the caller sees every host that went wrong.
#[derive(Debug, Clone)]
pub enum OpError {
    /// Malformed JSON or a missing required field in a per-host response
    Parse { host: String, detail: String },

    /// Connection refused, TLS handshake failure, read timeout
    Transport { host: String, detail: String },

    /// HTTP 401 or an equivalent credential/certificate rejection
    Unauthorized { host: String },

    /// Endpoint returned non-2xx or a domain-specific failure code
    Application { host: String, detail: String },

    /// An operation's prepare detected missing inputs
    Precondition { op: String, detail: String },

    /// Fewer than a strict majority of primary nodes succeeded
    Quorum { op: String, success: usize, total: usize },

    /// Poller deadline expired before the predicate returned done
    Timeout { op: String, elapsed_secs: u64 },

    /// Invariant violation
    Internal { detail: String },

    /// Several per-host errors joined into one operation error
    Multiple(Vec<OpError>),
}

impl OpError {
    /// Join `err` into `acc`, flattening nested aggregates.
    pub fn join(acc: Option<OpError>, err: OpError) -> OpError {
        match (acc, err) {
            (None, e) => e,
            (Some(OpError::Multiple(mut list)), OpError::Multiple(more)) => {
                list.extend(more);
                OpError::Multiple(list)
            }
            (Some(OpError::Multiple(mut list)), e) => {
                list.push(e);
                OpError::Multiple(list)
            }
            (Some(prev), OpError::Multiple(mut more)) => {
                more.insert(0, prev);
                OpError::Multiple(more)
            }
            (Some(prev), e) => OpError::Multiple(vec![prev, e]),
        }
    }

    /// True if this error, or any joined member, is an unauthorized rejection.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            OpError::Unauthorized { .. } => true,
            OpError::Multiple(list) => list.iter().any(OpError::is_unauthorized),
            _ => false,
        }
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::Parse { host, detail } => {
                write!(f, "fail to parse response on host {}: {}", host, detail)
            }
            OpError::Transport { host, detail } => {
                write!(f, "transport failure on host {}: {}", host, detail)
            }
            OpError::Unauthorized { host } => {
                write!(f, "wrong password/certificate for host {}", host)
            }
            OpError::Application { host, detail } => {
                write!(f, "request failed on host {}: {}", host, detail)
            }
            OpError::Precondition { op, detail } => {
                write!(f, "[{}] {}", op, detail)
            }
            OpError::Quorum { op, success, total } => {
                write!(
                    f,
                    "[{}] fail to get enough primary nodes. Success count: {} out of {}",
                    op, success, total
                )
            }
            OpError::Timeout { op, elapsed_secs } => {
                write!(f, "[{}] timed out after {} seconds", op, elapsed_secs)
            }
            OpError::Internal { detail } => write!(f, "internal error: {}", detail),
            OpError::Multiple(list) => {
                let joined: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", joined.join("; "))
            }
        }
    }
}

impl std::error::Error for OpError {}

/// Accumulator realizing the error-join aggregation rule: collect every
/// per-host error, short-circuit knowledge left to the caller.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Vec<OpError>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, err: OpError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into a single operation error, or `Ok(())` if nothing failed.
    pub fn into_result(self) -> Result<(), OpError> {
        let mut errors = self.errors;
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(OpError::Multiple(errors)),
        }
    }

    /// Collapse into an error value regardless of emptiness; used when the
    /// caller already knows the operation failed.
    pub fn into_error(self) -> OpError {
        match self.into_result() {
            Ok(()) => OpError::Internal {
                detail: "empty error collection".to_string(),
            },
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_flattens_aggregates() {
        let a = OpError::Transport {
            host: "h1".into(),
            detail: "refused".into(),
        };
        let b = OpError::Parse {
            host: "h2".into(),
            detail: "bad json".into(),
        };
        let joined = OpError::join(Some(a), b);
        match joined {
            OpError::Multiple(list) => assert_eq!(list.len(), 2),
            other => panic!("expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn test_unauthorized_detected_through_aggregate() {
        let agg = OpError::Multiple(vec![
            OpError::Transport {
                host: "h1".into(),
                detail: "eof".into(),
            },
            OpError::Unauthorized { host: "h2".into() },
        ]);
        assert!(agg.is_unauthorized());
    }

    #[test]
    fn test_collection_single_error_not_wrapped() {
        let mut coll = ErrorCollection::new();
        coll.push(OpError::Internal {
            detail: "x".into(),
        });
        match coll.into_result() {
            Err(OpError::Internal { .. }) => {}
            other => panic!("expected bare Internal, got {:?}", other),
        }
    }
}
