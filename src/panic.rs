use std::any::Any;

/// Converts a panic payload into a string.
///
/// `panic!` produces either a `&'static str` or a `String`, anything else is
/// shown as a placeholder.
pub(crate) fn payload_as_string(payload: Box<dyn Any + Send + 'static>) -> String {
    payload
        .downcast::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|payload| payload.downcast::<String>().map(|s| *s))
        .unwrap_or_else(|_| String::from("Box<dyn Any>"))
}
