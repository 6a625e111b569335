//! Lua scripts for atomic multi-key store operations.
//!
//! A session owns many keys (record, membership set, participant and
//! selection records, results, presence). They must live and die on one
//! expiry clock: a partial refresh would let submitted data vanish while
//! the session still looks alive. `EXPIRE_ALL_AT` applies one absolute
//! expiry to every owned key inside a single script execution.

/// Lua script applying one absolute expiry to a batch of keys.
///
/// Arguments:
/// - `KEYS[..]`: every key owned by the session
/// - `ARGV[1]`: absolute expiry in unix milliseconds
///
/// Returns the number of keys that existed and received the expiry.
/// Missing keys are skipped (e.g. a results set before any round has
/// completed).
pub const EXPIRE_ALL_AT: &str = r"
local touched = 0
for i = 1, #KEYS do
    if redis.call('PEXPIREAT', KEYS[i], ARGV[1]) == 1 then
        touched = touched + 1
    end
end
return touched
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_script_shape() {
        assert!(EXPIRE_ALL_AT.contains("redis.call"));
        assert!(EXPIRE_ALL_AT.contains("PEXPIREAT"));
        assert!(EXPIRE_ALL_AT.contains("for i = 1, #KEYS do"));
    }

    #[test]
    fn expire_script_uses_single_deadline() {
        // Every key gets ARGV[1]; no per-key deadline exists.
        assert_eq!(EXPIRE_ALL_AT.matches("ARGV").count(), 1);
    }
}
