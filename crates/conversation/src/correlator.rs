use serde_json::Value;
use thiserror::Error;

/// The single tool call currently awaiting its result.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenToolCall {
    pub id: String,
    pub name: String,
    /// Concatenated argument fragments as received.
    pub args_buffer: String,
    /// Last successful parse of `args_buffer`; `Null` while still streaming.
    pub args: Value,
    /// Structured fragments that arrived as JSON values rather than text.
    pub raw_data: Vec<Value>,
}

impl OpenToolCall {
    pub(crate) fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            args_buffer: String::new(),
            args: Value::Null,
            raw_data: Vec::new(),
        }
    }

    /// Appends one fragment and reparses the buffer. Returns the parsed
    /// arguments when the buffer is complete JSON.
    pub(crate) fn push_fragment(&mut self, fragment: &Value) -> Option<&Value> {
        match fragment {
            Value::Null => {}
            Value::String(text) => self.args_buffer.push_str(text),
            other => {
                self.raw_data.push(other.clone());
                self.args_buffer.push_str(&other.to_string());
            }
        }

        if self.args_buffer.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(&self.args_buffer) {
            Ok(parsed) => {
                self.args = parsed;
                Some(&self.args)
            }
            Err(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("tool return {return_id:?} arrived with no open tool call")]
    NoOpenCall { return_id: Option<String> },

    #[error("tool return {found} does not match open tool call {expected}")]
    IdMismatch { expected: String, found: String },
}

/// Tracks at most one open tool call and matches its result.
#[derive(Debug, Default)]
pub struct ToolCallCorrelator {
    open: Option<OpenToolCall>,
    synthetic_ids: u64,
}

impl ToolCallCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn open_call(&self) -> Option<&OpenToolCall> {
        self.open.as_ref()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether a tool-call chunk carrying `id` continues the open call.
    ///
    /// Chunks without an id continue whatever call is open.
    #[must_use]
    pub fn continues(&self, id: Option<&str>) -> bool {
        match (&self.open, id) {
            (Some(_), None) => true,
            (Some(open), Some(id)) => open.id == id,
            (None, _) => false,
        }
    }

    /// Opens a new call, replacing any unresolved one.
    ///
    /// Returns the superseded call so the caller can finalize it as pending.
    /// A call without an id is given a synthetic `call-N` id.
    pub fn open(
        &mut self,
        id: Option<&str>,
        name: Option<&str>,
        fragment: Option<&Value>,
    ) -> Option<OpenToolCall> {
        let id = match id {
            Some(id) => id.to_string(),
            None => {
                self.synthetic_ids += 1;
                format!("call-{}", self.synthetic_ids)
            }
        };
        let mut call = OpenToolCall::new(id, name.unwrap_or_default().to_string());
        if let Some(fragment) = fragment {
            call.push_fragment(fragment);
        }
        self.open.replace(call)
    }

    /// Appends an argument fragment to the open call.
    ///
    /// Returns `Ok(Some(args))` once the accumulated buffer parses and
    /// `Ok(None)` while it is still streaming.
    pub fn append(&mut self, fragment: &Value) -> Result<Option<&Value>, CorrelationError> {
        let open = self
            .open
            .as_mut()
            .ok_or(CorrelationError::NoOpenCall { return_id: None })?;
        Ok(open.push_fragment(fragment))
    }

    /// Fills in the tool name if the opening fragment omitted it.
    pub fn name_if_missing(&mut self, name: &str) {
        if let Some(open) = self.open.as_mut() {
            if open.name.is_empty() {
                open.name = name.to_string();
            }
        }
    }

    /// Matches a tool return against the open call and closes it.
    ///
    /// A return without an id matches the single open call.
    pub fn resolve(&mut self, return_id: Option<&str>) -> Result<OpenToolCall, CorrelationError> {
        let Some(open) = self.open.as_ref() else {
            return Err(CorrelationError::NoOpenCall {
                return_id: return_id.map(ToOwned::to_owned),
            });
        };

        if let Some(found) = return_id {
            if found != open.id {
                return Err(CorrelationError::IdMismatch {
                    expected: open.id.clone(),
                    found: found.to_string(),
                });
            }
        }

        self.open
            .take()
            .ok_or(CorrelationError::NoOpenCall { return_id: None })
    }

    pub fn clear(&mut self) -> Option<OpenToolCall> {
        self.open.take()
    }
}
