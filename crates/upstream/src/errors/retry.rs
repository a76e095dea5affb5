/// Classification for how the gateway treats a failed upstream call.
///
/// | Class | Record circuit breaker failure? |
/// |-------|--------------------------------|
/// | `Never` | No |
/// | `FailoverWithPenalty` | Yes |
/// | `NextProvider` | No |
/// | `CircuitOpen` | No (already open) |
///
/// Whatever the class, the caller is free to fall back to cached or mock data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The request itself is bad (unknown resource, client error).
    /// Asking again will not change the answer.
    Never,

    /// Transient upstream trouble: 429, timeout, 5xx, transport failure.
    /// Counts against the provider's circuit.
    FailoverWithPenalty,

    /// The call never reached the provider (local throttle, not configured).
    NextProvider,

    /// The provider's circuit is open; the call was short-circuited.
    CircuitOpen,
}
