/// Direction of data flow or event propagation relative to an element.
///
/// `In` points upstream (toward the producer), `Out` points downstream
/// (toward the consumer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// Out-of-band control events traveling along links.
///
/// `StreamStart` and `StreamClose` are idempotent per link: a second
/// occurrence through the same link is a no-op, which guards against
/// cycles re-delivering the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The upstream stage is ready; consumers may start their one-shot
    /// work or main loops.
    StreamStart,
    /// One direction of the connection is finished. Receivers release
    /// buffers and stop main loops.
    StreamClose,
    /// Switches the receiving link and its upstream chain to pull mode.
    SwitchToPullMode,
}
