use chrono::NaiveDateTime;

/// Positional argument passed to a stored procedure.
///
/// Builds read from a manifest never carry arguments; library callers can pass them through
/// [`ConnectionHandle::call_stored_procedure`](crate::connection::ConnectionHandle::call_stored_procedure):
/// ```rust
/// use db_builder::prelude::*;
///
/// let args = vec![
///     ProcArg::Int(2024),
///     ProcArg::Text("eu-west".into()),
///     ProcArg::Null,
/// ];
/// # let _ = args;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ProcArg {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
}

impl ProcArg {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for ProcArg {
    fn from(value: i64) -> Self {
        ProcArg::Int(value)
    }
}

impl From<f64> for ProcArg {
    fn from(value: f64) -> Self {
        ProcArg::Float(value)
    }
}

impl From<bool> for ProcArg {
    fn from(value: bool) -> Self {
        ProcArg::Bool(value)
    }
}

impl From<&str> for ProcArg {
    fn from(value: &str) -> Self {
        ProcArg::Text(value.to_string())
    }
}

impl From<String> for ProcArg {
    fn from(value: String) -> Self {
        ProcArg::Text(value)
    }
}

impl From<NaiveDateTime> for ProcArg {
    fn from(value: NaiveDateTime) -> Self {
        ProcArg::Timestamp(value)
    }
}

impl<T: Into<ProcArg>> From<Option<T>> for ProcArg {
    fn from(value: Option<T>) -> Self {
        value.map_or(ProcArg::Null, Into::into)
    }
}
