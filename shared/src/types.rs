//! Small type aliases shared across crates so call sites read as intent
//! rather than as bare integers.

/// Unix timestamp, seconds.
pub type Timestamp = u64;

/// 1-based block number (genesis is block 0, derived from configuration and
/// never stored).
pub type BlockHeight = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_plain_integers() {
        let _t: Timestamp = 0;
        let _h: BlockHeight = 0;
    }
}
