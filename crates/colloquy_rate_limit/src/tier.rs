//! The `Tier` abstraction used to configure a `RateLimiter`.

/// Rate limits of one provider tier.
///
/// `None` means the corresponding dimension is unlimited.
pub trait Tier: Send + Sync {
    /// Requests per minute.
    fn rpm(&self) -> Option<u32>;

    /// Tokens per minute.
    fn tpm(&self) -> Option<u64>;

    /// Maximum requests in flight at once.
    fn max_concurrent(&self) -> Option<u32>;

    /// Human-readable tier name.
    fn name(&self) -> &str;
}
