use std::error::{self, Error as StdError};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::txn_verify_error::TxnVerifyError;

pub type BlockVerifyResult<T> = std::result::Result<T, BlockVerifyError>;

pub type BlockVerifyError = Box<ErrorKind>;

#[derive(Debug, Serialize, Deserialize)]
pub enum ErrorKind {
    FailedProofOfWork,
    TooFewTxs(usize),
    TxnError(TxnVerifyError, String),
    InvalidCoinbase,
    InvalidCoinbaseAmount(u64, u64),
    InvalidMerkleRoot,
    DuplicateInputPointer,
    /// The block's `prev_hash` isn't the hash of any block currently in the
    /// chain; filed under orphan blocks, not rejected outright.
    UnknownParent,
    /// A one-deep fork where the current tip's hash won the tie.
    LostTieBreak,
    /// A competing block more than one block behind the tip.
    DeepFork,
}

impl StdError for ErrorKind {
    fn description(&self) -> &str {
        match *self {
            ErrorKind::FailedProofOfWork => "block hash does not meet the required target",
            ErrorKind::TooFewTxs(_) => "block must contain at least a coinbase and one other tx",
            ErrorKind::TxnError(_, _) => "invalid transaction in block",
            ErrorKind::InvalidCoinbase => "first transaction is not a valid coinbase",
            ErrorKind::InvalidCoinbaseAmount(_, _) => "coinbase output does not match fixed reward plus fees",
            ErrorKind::InvalidMerkleRoot => "merkle root does not match the block's tx list",
            ErrorKind::DuplicateInputPointer => "two transactions in the block reference the same input pointer",
            ErrorKind::UnknownParent => "prev_hash does not match any known block",
            ErrorKind::LostTieBreak => "current tip's hash numerically smaller; one-deep fork rejected",
            ErrorKind::DeepFork => "competing block is more than one block behind the tip",
        }
    }

    fn cause(&self) -> Option<&dyn error::Error> {
        None
    }
}

impl fmt::Display for ErrorKind {
    #[allow(deprecated)]
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &*self {
            ErrorKind::FailedProofOfWork => write!(fmt, "{}", self.description()),
            ErrorKind::TooFewTxs(n) => write!(fmt, "{}: got {}", self.description(), n),
            ErrorKind::TxnError(err, tx_id) => {
                write!(fmt, "{}: tx {}: {}", self.description(), tx_id, err)
            }
            ErrorKind::InvalidCoinbase => write!(fmt, "{}", self.description()),
            ErrorKind::InvalidCoinbaseAmount(expected, actual) => write!(
                fmt,
                "{}: expected {}, actual {}",
                self.description(),
                expected,
                actual
            ),
            ErrorKind::InvalidMerkleRoot => write!(fmt, "{}", self.description()),
            ErrorKind::DuplicateInputPointer => write!(fmt, "{}", self.description()),
            ErrorKind::UnknownParent => write!(fmt, "{}", self.description()),
            ErrorKind::LostTieBreak => write!(fmt, "{}", self.description()),
            ErrorKind::DeepFork => write!(fmt, "{}", self.description()),
        }
    }
}
