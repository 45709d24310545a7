//! Verification error codes, stable identifiers for rule failures.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationError {
    Gen1,
    Gen2,
    Gen3,
    Int1,
    Int2,
    Int3,
    Int4,
    Int5,
    Int6,
    Int7,
    Int8,
    Int9,
    Int10,
    Int11,
    Int12,
    Int13,
    Int14,
    Int15,
    Int16,
    Int17,
    Cal1,
    Cal2,
    Cal3,
    Cal4,
    Key1,
    Key2,
    Key3,
    Pub1,
    Pub2,
    Pub3,
    Pub4,
    Pub5,
}

impl VerificationError {
    pub fn code(self) -> &'static str {
        use VerificationError::*;
        match self {
            Gen1 => "GEN-1",
            Gen2 => "GEN-2",
            Gen3 => "GEN-3",
            Int1 => "INT-1",
            Int2 => "INT-2",
            Int3 => "INT-3",
            Int4 => "INT-4",
            Int5 => "INT-5",
            Int6 => "INT-6",
            Int7 => "INT-7",
            Int8 => "INT-8",
            Int9 => "INT-9",
            Int10 => "INT-10",
            Int11 => "INT-11",
            Int12 => "INT-12",
            Int13 => "INT-13",
            Int14 => "INT-14",
            Int15 => "INT-15",
            Int16 => "INT-16",
            Int17 => "INT-17",
            Cal1 => "CAL-1",
            Cal2 => "CAL-2",
            Cal3 => "CAL-3",
            Cal4 => "CAL-4",
            Key1 => "KEY-1",
            Key2 => "KEY-2",
            Key3 => "KEY-3",
            Pub1 => "PUB-1",
            Pub2 => "PUB-2",
            Pub3 => "PUB-3",
            Pub4 => "PUB-4",
            Pub5 => "PUB-5",
        }
    }

    pub fn message(self) -> &'static str {
        use VerificationError::*;
        match self {
            Gen1 => "wrong document",
            Gen2 => "verification inconclusive",
            Gen3 => "input hash level too large",
            Int1 => "inconsistent aggregation hash chains",
            Int2 => "inconsistent aggregation chain times",
            Int3 => "calendar chain input hash mismatch",
            Int4 => "calendar chain aggregation time mismatch",
            Int5 => "calendar chain shape inconsistent with aggregation time",
            Int6 => "calendar chain time differs from authentication record time",
            Int7 => "calendar chain time differs from publication record time",
            Int8 => "calendar root differs from authentication record hash",
            Int9 => "calendar root differs from publication record hash",
            Int10 => "aggregation chain index does not match its shape",
            Int11 => "untrusted metadata record in aggregation chain",
            Int12 => "inconsistent chain indexes",
            Int13 => "document hash algorithm deprecated at signing time",
            Int14 => "compatibility record algorithm deprecated at signing time",
            Int15 => "aggregation chain algorithm no longer trusted at signing time",
            Int16 => "calendar chain algorithm obsolete at publication time",
            Int17 => "compatibility record output algorithm deprecated at signing time",
            Cal1 => "calendar root differs from the calendar database",
            Cal2 => "aggregation root differs from the calendar database input",
            Cal3 => "aggregation time differs from the calendar database",
            Cal4 => "calendar chain right links are inconsistent",
            Key1 => "certificate not found",
            Key2 => "PKI signature not verified with certificate",
            Key3 => "certificate not valid at aggregation time",
            Pub1 => "extender response calendar root mismatch",
            Pub2 => "extender response inconsistent",
            Pub3 => "extender response input hash mismatch",
            Pub4 => "publication differs from the user-provided publication",
            Pub5 => "publication differs from the publications file",
        }
    }
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}
