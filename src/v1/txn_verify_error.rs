use std::error::{self, Error as StdError};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::script_error::ScriptError;

use super::transaction::Pointer;

pub type TxnVerifyResult<T> = std::result::Result<T, TxnVerifyError>;

pub type TxnVerifyError = Box<ErrorKind>;

#[derive(Debug, Serialize, Deserialize)]
pub enum ErrorKind {
    EmptyInputs,
    EmptyOutputs,
    /// A non-coinbase input with no spend pointer set.
    MissingInputPointer,
    /// Validation stalled on a missing input UTXO; the tx has been filed
    /// under the orphan tx pool, not rejected outright.
    Orphan(Pointer),
    Script(ScriptError),
    BadUnlockScript(Pointer),
    AddressMismatch(Pointer),
    Overspend(u64, u64),
    DoubleSpendInPool(Pointer),
    AlreadyInMemPool,
    BadCoinbase,
}

impl StdError for ErrorKind {
    fn description(&self) -> &str {
        match *self {
            ErrorKind::EmptyInputs => "transaction has no inputs",
            ErrorKind::EmptyOutputs => "transaction has no outputs",
            ErrorKind::MissingInputPointer => "non-coinbase input has no spend pointer",
            ErrorKind::Orphan(_) => "transaction references an unresolvable input",
            ErrorKind::Script(_) => "transaction script did not authorize the spend",
            ErrorKind::BadUnlockScript(_) => "unlock script failed to run against the lock script",
            ErrorKind::AddressMismatch(_) => "pubkey does not hash to the UTXO's owning address",
            ErrorKind::Overspend(_, _) => "sum of outputs exceeds sum of inputs",
            ErrorKind::DoubleSpendInPool(_) => "input pointer already claimed by a mem-pool transaction",
            ErrorKind::AlreadyInMemPool => "transaction id already present in mem-pool",
            ErrorKind::BadCoinbase => "coinbase transaction does not pay the computed reward",
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
            ErrorKind::EmptyInputs => write!(fmt, "{}", self.description()),
            ErrorKind::EmptyOutputs => write!(fmt, "{}", self.description()),
            ErrorKind::MissingInputPointer => write!(fmt, "{}", self.description()),
            ErrorKind::Orphan(pointer) => {
                write!(fmt, "{}: {:?}", self.description(), pointer)
            }
            ErrorKind::Script(err) => write!(fmt, "{}: {}", self.description(), err),
            ErrorKind::BadUnlockScript(pointer) => {
                write!(fmt, "{}: {:?}", self.description(), pointer)
            }
            ErrorKind::AddressMismatch(pointer) => {
                write!(fmt, "{}: {:?}", self.description(), pointer)
            }
            ErrorKind::Overspend(input_amt, output_amt) => write!(
                fmt,
                "{}: inputs totaled {}, outputs demanded {}",
                self.description(),
                input_amt,
                output_amt
            ),
            ErrorKind::DoubleSpendInPool(pointer) => {
                write!(fmt, "{}: {:?}", self.description(), pointer)
            }
            ErrorKind::AlreadyInMemPool => write!(fmt, "{}", self.description()),
            ErrorKind::BadCoinbase => write!(fmt, "{}", self.description()),
        }
    }
}
