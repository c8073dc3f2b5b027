use std::error::{self, Error as StdError};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::block_verify_error::BlockVerifyError;
use super::txn_verify_error::TxnVerifyError;

pub type NodeResult<T> = std::result::Result<T, NodeError>;

pub type NodeError = Box<ErrorKind>;

#[derive(Debug, Serialize, Deserialize)]
pub enum ErrorKind {
    NoWallet,
    InsufficientFunds(u64, u64),
    Txn(TxnVerifyError),
    Block(BlockVerifyError),
}

impl StdError for ErrorKind {
    fn description(&self) -> &str {
        match *self {
            ErrorKind::NoWallet => "node has no signing key loaded",
            ErrorKind::InsufficientFunds(_, _) => "spendable balance is less than the requested amount",
            ErrorKind::Txn(_) => "transaction rejected",
            ErrorKind::Block(_) => "block rejected",
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
            ErrorKind::NoWallet => write!(fmt, "{}", self.description()),
            ErrorKind::InsufficientFunds(available, needed) => write!(
                fmt,
                "{}: have {}, need {}",
                self.description(),
                available,
                needed
            ),
            ErrorKind::Txn(err) => write!(fmt, "{}: {}", self.description(), err),
            ErrorKind::Block(err) => write!(fmt, "{}: {}", self.description(), err),
        }
    }
}
