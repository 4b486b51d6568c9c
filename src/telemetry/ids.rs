// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace and span identifiers.
//!
//! The identity types are OpenTelemetry's. This module adds id generation
//! through the SDK's random generator and strict hex parsing.

pub use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};

/// Generate a random, valid trace id.
pub fn new_trace_id() -> TraceId {
    let generator = RandomIdGenerator::default();
    loop {
        let id = generator.new_trace_id();
        if id != TraceId::INVALID {
            return id;
        }
    }
}

/// Generate a random, valid span id.
pub fn new_span_id() -> SpanId {
    let generator = RandomIdGenerator::default();
    loop {
        let id = generator.new_span_id();
        if id != SpanId::INVALID {
            return id;
        }
    }
}

/// Build a sampled, local span context.
pub fn sampled_context(trace_id: TraceId, span_id: SpanId) -> SpanContext {
    SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        false,
        TraceState::default(),
    )
}

/// W3C `traceparent` header value for a span context.
pub fn traceparent(sc: &SpanContext) -> String {
    format!(
        "00-{}-{}-{:02x}",
        sc.trace_id(),
        sc.span_id(),
        sc.trace_flags().to_u8()
    )
}

fn check_hex(s: &str, expected: usize) -> Result<(), IdParseError> {
    if s.len() != expected {
        return Err(IdParseError::Length {
            expected,
            actual: s.len(),
        });
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IdParseError::NotHex);
    }
    Ok(())
}

/// Parse a 32 character hex trace id.
pub fn parse_trace_id(s: &str) -> Result<TraceId, IdParseError> {
    check_hex(s, 32)?;
    let value = u128::from_str_radix(s, 16).map_err(|_| IdParseError::NotHex)?;
    Ok(TraceId::from_bytes(value.to_be_bytes()))
}

/// Parse a 16 character hex span id.
pub fn parse_span_id(s: &str) -> Result<SpanId, IdParseError> {
    check_hex(s, 16)?;
    let value = u64::from_str_radix(s, 16).map_err(|_| IdParseError::NotHex)?;
    Ok(SpanId::from_bytes(value.to_be_bytes()))
}

/// Error returned when parsing a hex trace or span id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("expected {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("id is not valid hex")]
    NotHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = new_trace_id();
        let b = new_trace_id();
        assert_ne!(a, TraceId::INVALID);
        assert_ne!(a, b);
        assert_ne!(new_span_id(), SpanId::INVALID);
    }

    #[test]
    fn test_parse_and_display() {
        let trace = parse_trace_id("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        assert_eq!(trace.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");

        let span = parse_span_id("00f067aa0ba902b7").unwrap();
        assert_eq!(span.to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_traceparent_format() {
        let sc = sampled_context(
            parse_trace_id("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            parse_span_id("00f067aa0ba902b7").unwrap(),
        );
        assert!(sc.is_valid());
        assert_eq!(
            traceparent(&sc),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
        assert!(!SpanContext::empty_context().is_valid());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_span_id("abc"),
            Err(IdParseError::Length {
                expected: 16,
                actual: 3
            })
        );
        assert_eq!(parse_span_id("zzzzzzzzzzzzzzzz"), Err(IdParseError::NotHex));
    }

    #[test]
    fn test_sign_prefix_is_not_hex() {
        // from_str_radix alone would accept a leading '+'.
        let trace = format!("+{}", "a".repeat(31));
        assert_eq!(parse_trace_id(&trace), Err(IdParseError::NotHex));
        let span = format!("+{}", "1".repeat(15));
        assert_eq!(parse_span_id(&span), Err(IdParseError::NotHex));
    }
}
