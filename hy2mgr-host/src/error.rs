use thiserror::Error;

/// Failures talking to host tools.
#[derive(Debug, Error)]
pub enum HostError {
    /// The program could not be started at all (missing binary, EACCES, ...).
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero.
    #[error("{command} failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },
}
