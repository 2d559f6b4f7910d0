//! DispatchError - aggregated outcome of one dispatch
//!
//! Built once per message, filled in as filters run and delivery tasks report.
//!
//! ## Wire format
//! ```json
//! {"BackendErrs": {"SMS": ["gateway down"]}, "FilterInfo": "", "FilterErr": ""}
//! ```
//! Backend errors render as strings; an absent filter error renders as `""`.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::{DeliveryError, FilterError};

/// Outcome of routing one message
#[derive(Debug, Default)]
pub struct DispatchError {
    /// Backend name -> errors reported for that backend, in report order
    pub backend_errs: BTreeMap<String, Vec<DeliveryError>>,

    /// Diagnostic text left by filters
    pub filter_info: String,

    /// Set when a non-terminal filter aborted the chain
    pub filter_err: Option<FilterError>,
}

impl DispatchError {
    pub fn new() -> Self {
        Self::default()
    }

    /// No backend errors and not filtered
    pub fn is_ok(&self) -> bool {
        self.backend_errs.is_empty() && self.filter_err.is_none()
    }

    /// A filter aborted the chain
    pub fn is_filtered(&self) -> bool {
        self.filter_err.is_some()
    }

    /// Record errors for a backend; an empty list records nothing
    pub fn record_backend_errors(&mut self, backend: &str, errs: Vec<DeliveryError>) {
        if errs.is_empty() {
            return;
        }
        self.backend_errs
            .entry(backend.to_string())
            .or_default()
            .extend(errs);
    }

    /// Record a single backend error
    pub fn record_backend_error(&mut self, backend: &str, err: DeliveryError) {
        self.record_backend_errors(backend, vec![err]);
    }

    /// Mark the dispatch as aborted by a filter
    pub fn set_filtered(&mut self, info: impl Into<String>, err: FilterError) {
        self.filter_info = info.into();
        self.filter_err = Some(err);
    }

    /// Total number of backend errors
    pub fn backend_error_count(&self) -> usize {
        self.backend_errs.values().map(Vec::len).sum()
    }

    /// Names of backends that reported errors
    pub fn failed_backends(&self) -> impl Iterator<Item = &str> {
        self.backend_errs.keys().map(String::as_str)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.filter_err {
            return write!(f, "filtered: {err}");
        }
        if self.backend_errs.is_empty() {
            return f.write_str("ok");
        }
        let mut first = true;
        for (backend, errs) in &self.backend_errs {
            for err in errs {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{backend}: {err}")?;
            }
        }
        Ok(())
    }
}

struct ErrorStrings<'a>(&'a BTreeMap<String, Vec<DeliveryError>>);

impl Serialize for ErrorStrings<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (backend, errs) in self.0 {
            let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
            map.serialize_entry(backend, &messages)?;
        }
        map.end()
    }
}

impl Serialize for DispatchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let filter_err = self
            .filter_err
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        let mut state = serializer.serialize_struct("DispatchError", 3)?;
        state.serialize_field("BackendErrs", &ErrorStrings(&self.backend_errs))?;
        state.serialize_field("FilterInfo", &self.filter_info)?;
        state.serialize_field("FilterErr", &filter_err)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_is_ok() {
        let outcome = DispatchError::new();
        assert!(outcome.is_ok());
        assert!(!outcome.is_filtered());
        assert_eq!(outcome.to_string(), "ok");
    }

    #[test]
    fn test_empty_error_list_records_nothing() {
        let mut outcome = DispatchError::new();
        outcome.record_backend_errors("EMAIL", Vec::new());
        assert!(outcome.is_ok());
        assert!(outcome.backend_errs.is_empty());
    }

    #[test]
    fn test_backend_errors_accumulate_in_order() {
        let mut outcome = DispatchError::new();
        outcome.record_backend_error("SMS", DeliveryError::publish("first"));
        outcome.record_backend_error("SMS", DeliveryError::publish("second"));

        assert!(!outcome.is_ok());
        assert_eq!(outcome.backend_error_count(), 2);
        let messages: Vec<String> = outcome.backend_errs["SMS"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_failed_backends_are_sorted_by_name() {
        let mut outcome = DispatchError::new();
        outcome.record_backend_error("SMS", DeliveryError::publish("down"));
        outcome.record_backend_error("EMAIL", DeliveryError::publish("bounced"));
        outcome.record_backend_errors("PUSH", Vec::new());

        assert_eq!(outcome.failed_backends().collect::<Vec<_>>(), vec!["EMAIL", "SMS"]);
    }

    #[test]
    fn test_filtered_is_not_ok() {
        let mut outcome = DispatchError::new();
        outcome.set_filtered("webhook", FilterError::new("webhook", "no subscribers"));
        assert!(outcome.is_filtered());
        assert!(!outcome.is_ok());
        assert!(outcome.to_string().starts_with("filtered:"));
    }

    #[test]
    fn test_serializes_errors_as_strings() {
        let mut outcome = DispatchError::new();
        outcome.record_backend_error("X", DeliveryError::publish("e"));

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["BackendErrs"], json!({"X": ["e"]}));
        assert_eq!(value["FilterErr"], json!(""));
        assert_eq!(value["FilterInfo"], json!(""));
    }

    #[test]
    fn test_serializes_filter_error_text() {
        let mut outcome = DispatchError::new();
        outcome.set_filtered("registry", FilterError::new("registry", "unknown key"));

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["BackendErrs"], json!({}));
        assert_eq!(value["FilterInfo"], json!("registry"));
        assert_eq!(
            value["FilterErr"],
            json!("filter 'registry' rejected message: unknown key")
        );
    }
}
