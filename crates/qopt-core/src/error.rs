use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A node violates the arity or payload shape its kind requires.
    #[error("Malformed plan at {node}: {reason}")]
    MalformedPlan { node: String, reason: String },

    /// An expression references a column its input does not produce.
    #[error("Unresolved column {column} in {node}")]
    UnresolvedColumn { node: String, column: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Planning error: {0}")]
    Plan(String),

    /// JSON encoding of a plan or trace failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    /// Error with context chain for better debugging
    #[error("Error in {context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn malformed(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedPlan {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Add context to an error, creating an error chain.
    ///
    /// # Example
    /// ```rust,no_run
    /// use qopt_core::error::Error;
    /// let err = Error::Schema("unknown column".into());
    /// let err = err.with_context("while building the plan");
    /// ```
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self) as Box<dyn std::error::Error + Send + Sync>,
        }
    }

    /// Get suggestions for common errors.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::Schema(msg) if msg.contains("column") => vec![
                "Check that the column name is spelled correctly".into(),
                "Qualify the column with its table alias when it is ambiguous".into(),
            ],
            Error::UnresolvedColumn { .. } => vec![
                "Disable the last enabled rule to locate the rewrite that lost the column".into(),
            ],
            Error::MalformedPlan { .. } => {
                vec!["Check the number of inputs given to the operator".into()]
            }
            Error::Catalog(msg) if msg.contains("table") => {
                vec!["Declare the table under `tables:` before scanning it".into()]
            }
            Error::Config(msg) if msg.contains("rule") => {
                vec!["Run `qopt rules` to list the known rule names".into()]
            }
            Error::Context { source, .. } => source
                .downcast_ref::<Error>()
                .map(Error::suggestions)
                .unwrap_or_default(),
            _ => vec![],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
