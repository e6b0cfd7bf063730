//! Pluggable logging façade.
//!
//! A [`logging::Registry`] owns a set of named sinks, routes every record to the active one and
//! drops records below its threshold. When the active sink reports it isn't ready, records go to
//! an optional fallback sink instead. [`control`] exposes the registry over HTTP so sinks and
//! levels can be inspected and switched at runtime.

pub mod control;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;
