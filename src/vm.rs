//! Script VM: a small stack machine evaluating lock/unlock scripts for
//! input authorization.

use std::fmt::Debug;

use crate::hash::{address_from, sha256d_raw};
use crate::script_error::ErrorKind::{
    IntegerOverflow, InvalidOpcodeArgs, InvalidScriptToken, InvalidTokenType,
    ScriptStackOverflow, ScriptStackUnderflow, ScriptTooLong,
};
use crate::script_error::ScriptResult;
use crate::wallet;

/// Scripts longer than this (in bytes of source text) are rejected outright.
const MAX_SCRIPT_LEN: usize = 1024;

/// Stack depth ceiling.
const MAX_STACK_SIZE: usize = 2048;

#[derive(Clone, PartialEq, Eq)]
pub enum Token {
    Int(i128),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
}

impl Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Int(n) => write!(f, "Int({})", n),
            Token::Bool(b) => write!(f, "Bool({})", b),
            Token::Bytes(b) => write!(f, "Bytes({})", hex::encode(b)),
            Token::Str(s) => write!(f, "Str({})", s),
        }
    }
}

impl Token {
    fn truthy(&self) -> bool {
        match self {
            Token::Int(n) => *n != 0,
            Token::Bool(b) => *b,
            Token::Bytes(b) => !b.is_empty(),
            Token::Str(s) => !s.is_empty(),
        }
    }

    fn as_int(&self) -> ScriptResult<i128> {
        match self {
            Token::Int(n) => Ok(*n),
            _ => Err(Box::new(InvalidTokenType)),
        }
    }

    fn as_bytes(&self) -> ScriptResult<&[u8]> {
        match self {
            Token::Bytes(b) => Ok(b),
            _ => Err(Box::new(InvalidTokenType)),
        }
    }
}

pub struct ExecutionResult {
    pub top: Option<Token>,
    pub stack: Vec<Token>,
    /// Set by `OP_EQ` on mismatch; once set, the script is considered failed
    /// regardless of what ends up on top of the stack.
    pub failed: bool,
}

impl ExecutionResult {
    /// Per §4.4: the VM succeeds iff no `OP_EQ` failed and the final top is
    /// truthy.
    pub fn succeeded(&self) -> bool {
        !self.failed && self.top.as_ref().map(Token::truthy).unwrap_or(false)
    }
}

fn split(script: &str) -> Vec<String> {
    script
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned())
        .collect()
}

/// Tokenize a textual lock/unlock script such as
/// `OP_DUP OP_ADDR <addr> OP_EQ OP_CHECKSIG`. Opcodes and booleans are
/// recognized by name; anything else is either an integer or a literal
/// string token (addresses flow through as strings).
pub fn tokenize(script: &str) -> ScriptResult<Vec<ScriptToken>> {
    let mut out = vec![];
    for raw in split(script) {
        out.push(tokenize_one(&raw)?);
    }
    Ok(out)
}

/// A script token prior to execution: either an opcode name or a literal
/// value to be pushed verbatim.
pub enum ScriptToken {
    Op(&'static str),
    Literal(Token),
}

fn tokenize_one(raw: &str) -> ScriptResult<ScriptToken> {
    if let Some(op) = OPCODES.iter().find(|op| **op == raw) {
        return Ok(ScriptToken::Op(op));
    }

    if raw == "TRUE" {
        return Ok(ScriptToken::Literal(Token::Bool(true)));
    }
    if raw == "FALSE" {
        return Ok(ScriptToken::Literal(Token::Bool(false)));
    }

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        match raw.parse::<i128>() {
            Ok(n) => return Ok(ScriptToken::Literal(Token::Int(n))),
            Err(_) => return Err(Box::new(InvalidScriptToken(raw.to_owned()))),
        }
    }

    Ok(ScriptToken::Literal(Token::Str(raw.to_owned())))
}

const OPCODES: &[&str] = &[
    "OP_ADD",
    "OP_MINUS",
    "OP_MUL",
    "OP_EQ",
    "OP_EQUAL",
    "OP_DUP",
    "OP_NDUP",
    "OP_ADDR",
    "OP_CHECKSIG",
    "OP_MULHASH",
    "OP_CHECKMULSIG",
];

/// Run a lock script with an already-primed stack (the unlock half: the
/// signature and pubkey byte tokens pushed by the caller) against `message`,
/// the ECDSA message `OP_CHECKSIG`/`OP_CHECKMULSIG` verify against.
pub fn execute(
    lock_script: &str,
    stack_init: Vec<Token>,
    message: &[u8],
) -> ScriptResult<ExecutionResult> {
    let script_len = lock_script.as_bytes().len();
    if script_len > MAX_SCRIPT_LEN {
        return Err(Box::new(ScriptTooLong(MAX_SCRIPT_LEN, script_len)));
    }

    let tokens = tokenize(lock_script)?;
    let mut stack = stack_init;
    let mut failed = false;

    for token in tokens {
        match token {
            ScriptToken::Literal(lit) => stack.push(lit),
            ScriptToken::Op(op) => run_op(op, &mut stack, message, &mut failed)?,
        }

        if stack.len() > MAX_STACK_SIZE {
            return Err(Box::new(ScriptStackOverflow));
        }
    }

    Ok(ExecutionResult {
        top: stack.last().cloned(),
        stack,
        failed,
    })
}

fn pop(stack: &mut Vec<Token>) -> ScriptResult<Token> {
    stack.pop().ok_or_else(|| Box::new(ScriptStackUnderflow) as Box<_>)
}

fn run_op(
    op: &str,
    stack: &mut Vec<Token>,
    message: &[u8],
    failed: &mut bool,
) -> ScriptResult<()> {
    match op {
        "OP_ADD" => {
            let a = pop(stack)?.as_int()?;
            let b = pop(stack)?.as_int()?;
            let result = a.checked_add(b).ok_or_else(|| Box::new(IntegerOverflow))?;
            stack.push(Token::Int(result));
        }
        "OP_MINUS" => {
            // First popped is the right operand.
            let a = pop(stack)?.as_int()?;
            let b = pop(stack)?.as_int()?;
            let result = b.checked_sub(a).ok_or_else(|| Box::new(IntegerOverflow))?;
            stack.push(Token::Int(result));
        }
        "OP_MUL" => {
            let a = pop(stack)?.as_int()?;
            let b = pop(stack)?.as_int()?;
            let result = a.checked_mul(b).ok_or_else(|| Box::new(IntegerOverflow))?;
            stack.push(Token::Int(result));
        }
        "OP_EQ" => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            if a != b {
                *failed = true;
            }
        }
        "OP_EQUAL" => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            stack.push(Token::Bool(a == b));
        }
        "OP_DUP" => {
            let top = stack.last().cloned().ok_or_else(|| Box::new(ScriptStackUnderflow))?;
            stack.push(top);
        }
        "OP_NDUP" => {
            let n = pop(stack)?.as_int()?;
            if n < 0 || n as usize > stack.len() {
                return Err(Box::new(InvalidOpcodeArgs("OP_NDUP".to_owned())));
            }
            let n = n as usize;
            let dup = stack[stack.len() - n..].to_vec();
            stack.extend(dup);
            stack.push(Token::Int(n as i128));
        }
        "OP_ADDR" => {
            let pubkey = pop(stack)?;
            let bytes = pubkey.as_bytes()?;
            stack.push(Token::Str(address_from(bytes)));
        }
        "OP_CHECKSIG" => {
            let pubkey = pop(stack)?;
            let sig = pop(stack)?;
            let pubkey = pubkey.as_bytes()?;
            let sig = sig.as_bytes()?;
            stack.push(Token::Bool(wallet::verify(pubkey, message, sig)));
        }
        "OP_MULHASH" => {
            let n = pop(stack)?.as_int()?;
            if n < 0 || n as usize > stack.len() {
                return Err(Box::new(InvalidOpcodeArgs("OP_MULHASH".to_owned())));
            }
            let n = n as usize;
            let mut popped = Vec::with_capacity(n);
            for _ in 0..n {
                popped.push(pop(stack)?);
            }
            // `popped` is in pop order (newest pushed first); the reverse of
            // pop order restores original push order: pk_n || ... || pk_1.
            popped.reverse();
            let mut joined = vec![];
            for tok in &popped {
                joined.extend_from_slice(tok.as_bytes()?);
            }
            stack.push(Token::Bytes(sha256d_raw(&joined).to_vec()));
        }
        "OP_CHECKMULSIG" => {
            let n = pop(stack)?.as_int()?;
            if n < 0 {
                return Err(Box::new(InvalidOpcodeArgs("OP_CHECKMULSIG".to_owned())));
            }
            let n = n as usize;
            let mut pks = Vec::with_capacity(n);
            for _ in 0..n {
                pks.push(pop(stack)?);
            }
            let m = pop(stack)?.as_int()?;
            if m < 0 || m as usize > n {
                return Err(Box::new(InvalidOpcodeArgs("OP_CHECKMULSIG".to_owned())));
            }
            let m = m as usize;
            let mut sigs = Vec::with_capacity(m);
            for _ in 0..m {
                sigs.push(pop(stack)?);
            }
            let pks = &pks[n - m..];
            for i in 0..m {
                let pk = pks[i].as_bytes()?;
                let sig = sigs[i].as_bytes()?;
                let ok = wallet::verify(pk, message, sig);
                stack.push(Token::Bool(ok));
                if !ok {
                    break;
                }
            }
        }
        _ => return Err(Box::new(InvalidScriptToken(op.to_owned()))),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
    use rand_core::OsRng;

    fn key() -> (SigningKey, VerifyingKey) {
        let sk = SigningKey::random(&mut OsRng);
        let pk = VerifyingKey::from(&sk);
        (sk, pk)
    }

    #[test]
    fn p2pkh_script_succeeds_for_matching_key_and_address() {
        let (sk, pk) = key();
        let pk_bytes = pk.to_encoded_point(true).as_bytes().to_vec();
        let addr = address_from(&pk_bytes);
        let message = b"spend this";
        let sig: Signature = sk.sign(message);
        let sig_bytes = sig.to_der().as_bytes().to_vec();

        let lock_script = format!("OP_DUP OP_ADDR {} OP_EQ OP_CHECKSIG", addr);
        let stack_init = vec![Token::Bytes(sig_bytes), Token::Bytes(pk_bytes)];

        let result = execute(&lock_script, stack_init, message).unwrap();
        assert!(result.succeeded());
    }

    #[test]
    fn p2pkh_script_fails_for_wrong_address() {
        let (sk, pk) = key();
        let pk_bytes = pk.to_encoded_point(true).as_bytes().to_vec();
        let message = b"spend this";
        let sig: Signature = sk.sign(message);
        let sig_bytes = sig.to_der().as_bytes().to_vec();

        let lock_script = "OP_DUP OP_ADDR not-the-real-address OP_EQ OP_CHECKSIG";
        let stack_init = vec![Token::Bytes(sig_bytes), Token::Bytes(pk_bytes)];

        let result = execute(lock_script, stack_init, message).unwrap();
        assert!(result.failed);
        assert!(!result.succeeded());
    }

    #[test]
    fn op_ndup_duplicates_top_n_preserving_order() {
        let lock_script = "2 OP_NDUP";
        let stack_init = vec![Token::Int(1), Token::Int(2)];
        let result = execute(lock_script, stack_init, b"").unwrap();
        assert_eq!(
            result.stack,
            vec![
                Token::Int(1),
                Token::Int(2),
                Token::Int(1),
                Token::Int(2),
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn op_minus_subtracts_in_correct_order() {
        let lock_script = "OP_MINUS";
        let stack_init = vec![Token::Int(10), Token::Int(3)];
        let result = execute(lock_script, stack_init, b"").unwrap();
        assert_eq!(result.top, Some(Token::Int(7)));
    }

    #[test]
    fn op_equal_pushes_boolean() {
        let lock_script = "OP_EQUAL";
        let stack_init = vec![Token::Int(5), Token::Int(5)];
        let result = execute(lock_script, stack_init, b"").unwrap();
        assert_eq!(result.top, Some(Token::Bool(true)));
    }

    #[test]
    fn op_mulhash_concatenates_in_push_order() {
        let lock_script = "2 OP_MULHASH";
        let stack_init = vec![Token::Bytes(vec![1, 2]), Token::Bytes(vec![3, 4])];
        let result = execute(lock_script, stack_init, b"").unwrap();
        let expected = sha256d_raw(&[1, 2, 3, 4]).to_vec();
        assert_eq!(result.top, Some(Token::Bytes(expected)));
    }

    #[test]
    fn stack_underflow_is_reported() {
        let lock_script = "OP_ADD";
        let result = execute(lock_script, vec![Token::Int(1)], b"");
        assert!(result.is_err());
    }
}
