/// How a gateway close affects the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseClassification {
    /// Locally initiated clean shutdown.
    Normal,
    /// Terminal: credentials or configuration are wrong. Do not reconnect.
    Unrecoverable,
    /// Reconnect with a fresh identify; the stored session is gone.
    Unresumable,
    /// Reconnect and resume the stored session.
    Recoverable,
}

/// Authentication failed.
pub const AUTHENTICATION_FAILED: u16 = 4004;
/// Invalid shard.
pub const INVALID_SHARD: u16 = 4010;
/// Sharding required.
pub const SHARDING_REQUIRED: u16 = 4011;
/// Invalid API version.
pub const INVALID_API_VERSION: u16 = 4012;
/// Invalid intents.
pub const INVALID_INTENTS: u16 = 4013;
/// Disallowed intents.
pub const DISALLOWED_INTENTS: u16 = 4014;

/// Session no longer valid.
pub const SESSION_INVALID: u16 = 4006;
/// Invalid sequence number on resume.
pub const INVALID_SEQUENCE: u16 = 4007;
/// Session timed out.
pub const SESSION_TIMED_OUT: u16 = 4009;

pub const UNRECOVERABLE_CLOSE_CODES: [u16; 6] = [
    AUTHENTICATION_FAILED,
    INVALID_SHARD,
    SHARDING_REQUIRED,
    INVALID_API_VERSION,
    INVALID_INTENTS,
    DISALLOWED_INTENTS,
];

pub const UNRESUMABLE_CLOSE_CODES: [u16; 3] =
    [SESSION_INVALID, INVALID_SEQUENCE, SESSION_TIMED_OUT];

pub const NORMAL_CLOSURE: u16 = 1000;

/// Code used when closing locally to force a resume (reconnect request,
/// missed heartbeat ack). Not 1000, which would invalidate the session.
pub const RECONNECT_CLOSE_CODE: u16 = 4000;

/// Classify a close code. `intentional` is true when the local side asked for
/// the shutdown; a 1000 from the far end is treated as recoverable.
pub fn classify_close(code: u16, intentional: bool) -> CloseClassification {
    if UNRECOVERABLE_CLOSE_CODES.contains(&code) {
        CloseClassification::Unrecoverable
    } else if UNRESUMABLE_CLOSE_CODES.contains(&code) {
        CloseClassification::Unresumable
    } else if code == NORMAL_CLOSURE && intentional {
        CloseClassification::Normal
    } else {
        CloseClassification::Recoverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecoverable_codes_win_regardless_of_intent() {
        for code in UNRECOVERABLE_CLOSE_CODES {
            assert_eq!(classify_close(code, false), CloseClassification::Unrecoverable);
            assert_eq!(classify_close(code, true), CloseClassification::Unrecoverable);
        }
    }

    #[test]
    fn unresumable_codes() {
        for code in UNRESUMABLE_CLOSE_CODES {
            assert_eq!(classify_close(code, false), CloseClassification::Unresumable);
        }
    }

    #[test]
    fn normal_only_when_intentional() {
        assert_eq!(classify_close(1000, true), CloseClassification::Normal);
        assert_eq!(classify_close(1000, false), CloseClassification::Recoverable);
    }

    #[test]
    fn everything_else_is_recoverable() {
        for code in [1001, 1006, 4000, 4001, 4008, 4999] {
            assert_eq!(classify_close(code, false), CloseClassification::Recoverable);
        }
    }
}
