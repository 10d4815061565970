use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs sort by creation time and carry 80 random bits, so two IDs minted in
/// the same millisecond still differ.
///
/// # Examples
/// ```
/// let id = minitalk_common::id::prefixed_ulid("msg");
/// assert!(id.starts_with("msg_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate_id() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
    pub const MESSAGE: &str = "msg";
}
