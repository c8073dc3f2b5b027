use serde::{Deserialize, Serialize};

use crate::hash::sha256d;

/// Reward paid to the coinbase output, before fees. Overridden by
/// [`crate::config::Config::fixed_reward`] at runtime; this is only the
/// fallback used by tests and by code that doesn't carry a `Config` handle.
pub const FIXED_REWARD: u64 = 500;

/// Unique identifier of a transaction output: which transaction, and which
/// position in its `tx_out` list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub tx_id: String,
    pub n: u32,
}

impl Pointer {
    pub fn new(tx_id: String, n: u32) -> Self {
        Pointer { tx_id, n }
    }

    /// Deterministic textual rendering used as part of the VM's signature
    /// message. Pinned here since it is effectively a wire format: any
    /// change breaks every signature computed against it.
    pub fn canonical_text(&self) -> String {
        format!("Pointer(tx_id={},n={})", self.tx_id, self.n)
    }
}

/// A transaction output. `pubkey_script` is derived, not stored: it is
/// always `OP_DUP OP_ADDR <to_addr> OP_EQ OP_CHECKSIG`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vout {
    pub to_addr: String,
    pub value: u64,
}

impl Vout {
    pub fn pubkey_script(&self) -> String {
        format!("OP_DUP OP_ADDR {} OP_EQ OP_CHECKSIG", self.to_addr)
    }

    pub fn canonical_text(&self) -> String {
        format!("Vout(to_addr={},value={})", self.to_addr, self.value)
    }
}

pub fn canonical_text_vouts(vouts: &[Vout]) -> String {
    let mut out = String::from("[");
    for (i, v) in vouts.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.canonical_text());
    }
    out.push(']');
    out
}

/// A transaction input. `to_spend` is `None` for coinbase inputs, which also
/// carry an arbitrary signature and no pubkey.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vin {
    pub to_spend: Option<Pointer>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    #[serde(with = "hex_opt")]
    pub pubkey: Option<Vec<u8>>,
}

/// Serializes `Option<Vec<u8>>` as a lowercase hex string, or `null` when
/// absent.
mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        match opt {
            Some(s) => hex::decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

impl Vin {
    /// Unlock-script half of the concatenated script the VM runs: signature
    /// bytes, then pubkey bytes (or empty if absent, as for coinbase).
    pub fn sig_script(&self) -> (Vec<u8>, Vec<u8>) {
        (self.signature.clone(), self.pubkey.clone().unwrap_or_default())
    }

    pub fn canonical_text(&self) -> String {
        let to_spend = self
            .to_spend
            .as_ref()
            .map(|p| p.canonical_text())
            .unwrap_or_else(|| "None".to_owned());
        let pubkey = self
            .pubkey
            .as_ref()
            .map(hex::encode)
            .unwrap_or_else(|| "None".to_owned());
        format!(
            "Vin(to_spend={},signature={},pubkey={})",
            to_spend,
            hex::encode(&self.signature),
            pubkey
        )
    }
}

pub fn canonical_text_vins(vins: &[Vin]) -> String {
    let mut out = String::from("[");
    for (i, v) in vins.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.canonical_text());
    }
    out.push(']');
    out
}

/// A transaction: ordered inputs, ordered outputs, a declared fee, and a
/// locktime. `locktime` is carried and round-tripped but not yet enforced
/// anywhere in this codebase (see DESIGN.md).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tx {
    pub tx_in: Vec<Vin>,
    pub tx_out: Vec<Vout>,
    pub fee: u64,
    pub locktime: i64,
}

impl Tx {
    /// `sha256d(canonical_text(tx_in) + canonical_text(tx_out) + fee)`.
    pub fn id(&self) -> String {
        let text = format!(
            "{}{}{}",
            canonical_text_vins(&self.tx_in),
            canonical_text_vouts(&self.tx_out),
            self.fee
        );
        sha256d(text.as_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_in.len() == 1 && self.tx_in[0].to_spend.is_none()
    }

    pub fn input_pointers(&self) -> Vec<&Pointer> {
        self.tx_in.iter().filter_map(|v| v.to_spend.as_ref()).collect()
    }

    pub fn total_out(&self) -> u64 {
        self.tx_out.iter().map(|v| v.value).sum()
    }
}

/// Build a coinbase transaction paying `reward` to `to_addr`. The coinbase
/// input carries a filler signature and no pubkey or spend target.
pub fn make_coinbase(to_addr: &str, reward: u64, nonce_hint: u64) -> Tx {
    let filler_sig = sha256d(format!("coinbase-{}-{}", to_addr, nonce_hint).as_bytes())
        .into_bytes();

    Tx {
        tx_in: vec![Vin {
            to_spend: None,
            signature: filler_sig,
            pubkey: None,
        }],
        tx_out: vec![Vout {
            to_addr: to_addr.to_owned(),
            value: reward,
        }],
        fee: 0,
        locktime: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_is_recognized() {
        let tx = make_coinbase("addr1", 500, 0);
        assert!(tx.is_coinbase());
        assert_eq!(tx.tx_out[0].value, 500);
    }

    #[test]
    fn id_is_deterministic() {
        let tx = make_coinbase("addr1", 500, 7);
        assert_eq!(tx.id(), tx.id());
    }

    #[test]
    fn different_fee_changes_id() {
        let mut tx1 = make_coinbase("addr1", 500, 0);
        let mut tx2 = tx1.clone();
        tx1.fee = 0;
        tx2.fee = 1;
        assert_ne!(tx1.id(), tx2.id());
    }

    #[test]
    fn pubkey_script_matches_p2pkh_template() {
        let vout = Vout {
            to_addr: "abc123".to_owned(),
            value: 10,
        };
        assert_eq!(vout.pubkey_script(), "OP_DUP OP_ADDR abc123 OP_EQ OP_CHECKSIG");
    }
}
